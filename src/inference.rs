use crate::error::{PodnnError, Result};
use crate::io::{load_matrix, save_matrix};
use crate::model::{Network, NetworkConfig};
use crate::pod::PodBasis;
use crate::scaling::InputScaling;
use crate::training::{InferBackend, RegressionModel, TrainBackend, predict_with};
use burn::config::Config;
use burn::module::Module;
use burn::optim::Optimizer;
use burn::record::{DoublePrecisionSettings, NamedMpkFileRecorder};
use log::info;
use nalgebra::DMatrix;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// ネットワークの重みを保存するファイル名 (拡張子はレコーダが付けます)
pub const NETWORK_FILENAME: &str = "network";
pub const NETWORK_CONFIG_FILENAME: &str = "network_config.json";
pub const SCALING_FILENAME: &str = "scaling.json";
pub const BASIS_FILENAME: &str = "basis.txt";

/// 学習済みの縮約モデルを `dir` に保存します。
pub fn save_surrogate<O>(model: &RegressionModel<O>, basis: &PodBasis, dir: &Path) -> Result<()>
where
    O: Optimizer<Network<TrainBackend>, TrainBackend>,
{
    if basis.rank() != model.network_config().d_output {
        return Err(PodnnError::shape(
            "基底の本数",
            model.network_config().d_output,
            basis.rank(),
        ));
    }
    fs::create_dir_all(dir)?;
    model
        .network_config()
        .save(dir.join(NETWORK_CONFIG_FILENAME))?;
    model
        .inference_network()
        .save_file(
            dir.join(NETWORK_FILENAME),
            &NamedMpkFileRecorder::<DoublePrecisionSettings>::new(),
        )
        .map_err(|e| PodnnError::Recorder(format!("{e:?}")))?;
    serde_json::to_writer_pretty(
        BufWriter::new(File::create(dir.join(SCALING_FILENAME))?),
        model.scaling(),
    )?;
    save_matrix(dir.join(BASIS_FILENAME), basis.vectors())?;
    info!("=> モデルを '{}' に保存しました。", dir.display());
    Ok(())
}

/// 推論専用に読み込んだ縮約モデル。
pub struct Surrogate {
    config: NetworkConfig,
    scaling: InputScaling,
    network: Network<InferBackend>,
    basis: PodBasis,
}

/// `save_surrogate` で保存したモデルを読み込みます。
pub fn load_surrogate(dir: &Path) -> Result<Surrogate> {
    let weights = dir.join(NETWORK_FILENAME).with_extension("mpk");
    if !weights.exists() {
        return Err(PodnnError::config(format!(
            "モデルファイル '{}' が見つかりません。先に学習を実行してください。",
            weights.display()
        )));
    }

    info!("保存済みモデルを '{}' からロード中...", dir.display());
    let config = NetworkConfig::load(dir.join(NETWORK_CONFIG_FILENAME))
        .map_err(|e| PodnnError::Recorder(format!("{e:?}")))?;
    let scaling: InputScaling =
        serde_json::from_reader(BufReader::new(File::open(dir.join(SCALING_FILENAME))?))?;

    // 重みは直後にファイルの値で上書きされる
    let device = Default::default();
    let network = config
        .init::<InferBackend, _>(&mut StdRng::seed_from_u64(0), &device)?
        .load_file(
            dir.join(NETWORK_FILENAME),
            &NamedMpkFileRecorder::<DoublePrecisionSettings>::new(),
            &device,
        )
        .map_err(|e| PodnnError::Recorder(format!("{e:?}")))?;

    let basis = PodBasis::from_vectors(load_matrix(dir.join(BASIS_FILENAME))?);
    if basis.rank() != config.d_output {
        return Err(PodnnError::shape("基底の本数", config.d_output, basis.rank()));
    }

    Ok(Surrogate {
        config,
        scaling,
        network,
        basis,
    })
}

impl Surrogate {
    pub fn basis(&self) -> &PodBasis {
        &self.basis
    }

    /// 縮約係数 (サンプル数 × n_L) を予測します。
    pub fn predict(&self, x: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        predict_with(&self.network, &self.config, &self.scaling, x)
    }

    /// 全場 (n_h × サンプル数) を予測します。
    pub fn predict_field(&self, x: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        self.basis.reconstruct(&self.predict(x)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::{TrainingConfig, build_regressor};
    use tempfile::tempdir;

    #[test]
    fn saved_surrogate_predicts_like_the_trained_model() {
        let x = DMatrix::from_fn(12, 2, |i, j| (i as f64 * 0.1 + j as f64).cos());
        let u_h = DMatrix::from_fn(30, 12, |r, c| ((r + 1) as f64 * x[(c, 0)]).sin() + x[(c, 1)]);
        let basis = PodBasis::extract(&u_h, 1e-8).unwrap();
        let u_rb = basis.project(&u_h).unwrap().transpose();

        let mut model = build_regressor(
            NetworkConfig::new(2, basis.rank(), vec![8]),
            TrainingConfig::new().with_log_frequency(0),
            StdRng::seed_from_u64(3),
        )
        .unwrap()
        .with_scaling(InputScaling::min_max(&x).unwrap());
        model.fit(&x, &u_rb, 20).unwrap();

        let dir = tempdir().unwrap();
        save_surrogate(&model, &basis, dir.path()).unwrap();
        let loaded = load_surrogate(dir.path()).unwrap();

        // 倍精度のまま保存されるので予測は完全に一致する
        let expected = model.predict(&x).unwrap();
        assert_eq!(loaded.predict(&x).unwrap(), expected);

        let field = loaded.predict_field(&x).unwrap();
        assert_eq!(field.shape(), (30, 12));
        assert!((field - basis.reconstruct(&expected).unwrap()).amax() < 1e-10);
    }

    #[test]
    fn missing_model_is_a_configuration_error() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            load_surrogate(dir.path()),
            Err(PodnnError::Configuration(_))
        ));
    }
}
