use crate::cli::Cli;
use crate::config::HyperParams;
use crate::data::{FileSnapshotSource, SnapshotSource, load_test_statistics};
use crate::error::{PodnnError, Result};
use crate::handling::{split, train_count};
use crate::inference::save_surrogate;
use crate::io::save_matrix;
use crate::mesh::linear_mesh;
use crate::metrics::{FieldStatistics, field_statistics, reconstructed_statistics, relative_error};
use crate::model::{Network, NetworkConfig};
use crate::pod::PodBasis;
use crate::report::{plot_loss_history, write_json};
use crate::scaling::InputScaling;
use crate::sweep::run_sweep;
use crate::training::{RegressionModel, TrainBackend, TrainingConfig, build_regressor};
use burn::optim::Optimizer;
use log::info;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use std::fs;
use std::time::Instant;

/// 1回の実験の結果。誤差はすべて百分率です。
#[derive(Debug, Clone, Serialize)]
pub struct ExperimentReport {
    pub n_s: usize,
    pub n_t: usize,
    pub n_h: usize,
    pub n_d: usize,
    /// 縮約基底の本数 n_L。
    pub n_l: usize,
    pub n_train: usize,
    pub n_val: usize,
    pub epochs: usize,
    pub final_loss: Option<f64>,
    /// 検証データの全場に対する相対誤差。
    pub val_error: Option<f64>,
    /// 平均場の相対誤差。
    pub mean_error: Option<f64>,
    /// 標準偏差場の相対誤差。
    pub std_error: Option<f64>,
    pub elapsed_secs: f64,
}

/// 実験の成果物。
pub struct Experiment<O> {
    pub report: ExperimentReport,
    pub basis: PodBasis,
    pub model: RegressionModel<O>,
}

fn training_config(hp: &HyperParams) -> TrainingConfig {
    TrainingConfig::new()
        .with_batch_size(hp.batch_size)
        .with_learning_rate(hp.learning_rate)
        .with_decay(hp.decay)
        .with_beta_1(hp.beta_1)
        .with_epsilon(hp.adam_epsilon())
        .with_lambda(hp.lambda)
        .with_log_frequency(hp.log_frequency)
}

/// 時刻依存 (`n_t > 1`) の入力は先頭列が時刻です。`mu_min`/`mu_max` がパラメータ列だけの
/// 境界なら、時刻の範囲は学習入力から補います。
fn input_scaling(hp: &HyperParams, x_train: &nalgebra::DMatrix<f64>) -> Result<InputScaling> {
    if !hp.normalize {
        return Ok(InputScaling::Identity);
    }
    let Some((lb, ub)) = hp.parameter_bounds() else {
        return InputScaling::min_max(x_train);
    };
    let n_d = x_train.ncols();
    if lb.len() == n_d {
        return InputScaling::from_bounds(lb, ub);
    }
    if hp.n_t == 1 || lb.len() + 1 != n_d {
        return Err(PodnnError::shape("mu_min / mu_max の次元", n_d, lb.len()));
    }
    if x_train.nrows() == 0 {
        return Err(PodnnError::config(
            "空の入力からは時刻の範囲を決められません",
        ));
    }
    let t = x_train.column(0);
    let lb: Vec<f64> = std::iter::once(t.min()).chain(lb.iter().copied()).collect();
    let ub: Vec<f64> = std::iter::once(t.max()).chain(ub.iter().copied()).collect();
    InputScaling::from_bounds(&lb, &ub)
}

/// 基底抽出 → 射影 → 分割 → 学習 → 予測 → 再構成 → 誤差評価 を順に実行します。
///
/// どの段階で失敗しても、その時点でエラーを返して実験を打ち切ります。
/// `test` がなければ検証データの高精度場から求めた統計量を参照に使います。
pub fn run_experiment<S>(
    hp: &HyperParams,
    source: &S,
    test: Option<&FieldStatistics>,
) -> Result<Experiment<impl Optimizer<Network<TrainBackend>, TrainBackend> + use<S>>>
where
    S: SnapshotSource + ?Sized,
{
    hp.validate()?;
    let start = Instant::now();

    let set = source.snapshots(hp.n_s)?;
    if set.n_h() != hp.n_h() {
        return Err(PodnnError::shape("スナップショットの長さ", hp.n_h(), set.n_h()));
    }
    if set.n_t != hp.n_t {
        return Err(PodnnError::shape("時刻数", hp.n_t, set.n_t));
    }

    // u_L(x, mu) = V.u_rb(x, mu) ~= u_h(x, mu)
    let basis = PodBasis::extract(&set.fields, hp.eps)?;
    let n_l = basis.rank();
    let n_d = set.n_d();
    info!("POD基底: n_L = {}, n_d = {}, n_h = {}", n_l, n_d, set.n_h());

    let u_rb = basis.project(&set.fields)?.transpose();
    let n_train = train_count(hp.n_s, hp.train_val_ratio)? * hp.n_t;
    let data = split(&set.inputs, &u_rb, n_train)?;
    let u_h_val = basis.reconstruct(&data.y_val)?;

    let scaling = input_scaling(hp, &data.x_train)?;
    let network = NetworkConfig::new(n_d, n_l, hp.h_layers.clone());
    let mut model = build_regressor(network, training_config(hp), StdRng::seed_from_u64(hp.seed))?
        .with_scaling(scaling);

    let summary = if data.n_val() > 0 {
        model.fit_with_validation(&data.x_train, &data.y_train, hp.epochs, |m| {
            let u_h_pred = basis.reconstruct(&m.predict(&data.x_val)?)?;
            relative_error(&u_h_val, &u_h_pred)
        })?
    } else {
        model.fit(&data.x_train, &data.y_train, hp.epochs)?
    };

    let mut report = ExperimentReport {
        n_s: hp.n_s,
        n_t: hp.n_t,
        n_h: set.n_h(),
        n_d,
        n_l,
        n_train: data.n_train(),
        n_val: data.n_val(),
        epochs: summary.epochs,
        final_loss: summary.final_loss,
        val_error: None,
        mean_error: None,
        std_error: None,
        elapsed_secs: 0.0,
    };

    if data.n_val() > 0 {
        let u_rb_pred = model.predict(&data.x_val)?;
        let u_h_pred = basis.reconstruct(&u_rb_pred)?;
        report.val_error = Some(100.0 * relative_error(&u_h_val, &u_h_pred)?);

        let predicted = reconstructed_statistics(&basis, &u_rb_pred, hp.n_t)?;
        let (mean_error, std_error) = match test {
            Some(reference) => predicted.errors_against(reference)?,
            None => predicted.errors_against(&field_statistics(&u_h_val, hp.n_t)?)?,
        };
        info!("平均場の誤差: {:.4}%", mean_error);
        info!("標準偏差場の誤差: {:.4}%", std_error);
        report.mean_error = Some(mean_error);
        report.std_error = Some(std_error);
    }

    report.elapsed_secs = start.elapsed().as_secs_f64();
    Ok(Experiment {
        report,
        basis,
        model,
    })
}

/// コマンドラインから呼ばれる入口。
///
/// 設定に `sweep` があれば格子スイープを、なければ1回の実験を実行し、結果を
/// `cli.output` に書き出します。
pub fn run(cli: &Cli) -> Result<()> {
    let hp = HyperParams::load(cli.config.as_deref())?;
    let source = FileSnapshotSource::from_config(&hp.data, hp.n_t);
    let test = load_test_statistics(&hp.data)?;

    fs::create_dir_all(&cli.output)?;
    write_json(cli.output.join("hp.json"), &hp)?;
    save_matrix(cli.output.join("mesh.txt"), &linear_mesh(&hp.mesh_axes())?)?;

    if let Some(grid) = &hp.sweep {
        let report = run_sweep(&hp, grid, &source, test.as_ref());
        report.save(&cli.output)?;
        info!(
            "スイープ完了: {} セル中 {} セルが失敗",
            report.n_s.len() * report.epochs.len(),
            report.failures.len()
        );
        return Ok(());
    }

    let experiment = run_experiment(&hp, &source, test.as_ref())?;
    write_json(cli.output.join("report.json"), &experiment.report)?;
    save_surrogate(&experiment.model, &experiment.basis, &cli.output)?;
    if hp.plot_loss {
        let path = cli.output.join("loss_history.png");
        plot_loss_history(experiment.model.loss_history(), &path)?;
        info!("=> 損失グラフを '{}' に保存しました。", path.display());
    }
    info!("=> 結果を '{}' に保存しました。", cli.output.display());
    Ok(())
}
