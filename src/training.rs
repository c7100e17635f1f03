use crate::error::{PodnnError, Result as PodnnResult};
use crate::loss::regression_loss;
use crate::model::{Network, NetworkConfig};
use crate::scaling::InputScaling;
use burn::backend::ndarray::NdArrayDevice;
use burn::backend::{Autodiff, NdArray};
use burn::config::Config;
use burn::module::AutodiffModule;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::prelude::Backend;
use burn::tensor::{ElementConversion, Tensor, TensorData};
use log::info;
use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::time::{Duration, Instant};

/// 学習に使うバックエンド (CPU, 倍精度)。
pub type TrainBackend = Autodiff<NdArray<f64>>;
/// 推論に使うバックエンド。
pub type InferBackend = NdArray<f64>;

/// 最適化と学習ループの設定。ステップ数は `fit` の呼び出しごとに与えます。
#[derive(Config, Debug)]
pub struct TrainingConfig {
    /// ミニバッチの大きさ。0 なら毎ステップ学習データ全体を使います。
    #[config(default = 0)]
    pub batch_size: usize,
    #[config(default = 1e-3)]
    pub learning_rate: f64,
    /// 学習率の減衰 `lr / (1 + decay · step)`。
    #[config(default = 0.0)]
    pub decay: f64,
    /// Adam の一次モーメントの減衰率。
    #[config(default = 0.9)]
    pub beta_1: f64,
    /// Adam の数値安定化項。
    #[config(default = 1e-7)]
    pub epsilon: f64,
    /// 重み行列の L2 正則化係数。
    #[config(default = 0.0)]
    pub lambda: f64,
    /// 損失をログに出す間隔 (エポック)。0 なら出力しません。
    #[config(default = 1000)]
    pub log_frequency: usize,
}

impl TrainingConfig {
    pub fn validate(&self) -> PodnnResult<()> {
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(PodnnError::config("learning_rate は正の有限値が必要です"));
        }
        if !(self.decay >= 0.0) {
            return Err(PodnnError::config("decay は0以上が必要です"));
        }
        if !(0.0..1.0).contains(&self.beta_1) {
            return Err(PodnnError::config("beta_1 は [0, 1) の範囲が必要です"));
        }
        if !(self.epsilon > 0.0) {
            return Err(PodnnError::config("epsilon は正の値が必要です"));
        }
        if !(self.lambda >= 0.0) {
            return Err(PodnnError::config("lambda は0以上が必要です"));
        }
        Ok(())
    }
}

/// 1回の `fit` 呼び出しの結果。
#[derive(Debug, Clone)]
pub struct TrainingSummary {
    pub epochs: usize,
    pub final_loss: Option<f64>,
    pub elapsed: Duration,
}

/// パラメータから縮約係数への回帰モデル。
///
/// ネットワークの構造 ([`NetworkConfig`]) は不変で、重み・最適化器の状態・乱数生成器は
/// このインスタンスだけが所有します。`fit` を繰り返し呼ぶと現在の重みから学習を続けます。
pub struct RegressionModel<O> {
    config: NetworkConfig,
    training: TrainingConfig,
    scaling: InputScaling,
    network: Network<TrainBackend>,
    optim: O,
    rng: StdRng,
    device: NdArrayDevice,
    step: usize,
    loss_history: Vec<f64>,
}

/// Adam を最適化器とする回帰モデルを作ります。
pub fn build_regressor(
    config: NetworkConfig,
    training: TrainingConfig,
    rng: StdRng,
) -> PodnnResult<RegressionModel<impl Optimizer<Network<TrainBackend>, TrainBackend>>> {
    training.validate()?;
    let optim = AdamConfig::new()
        .with_beta_1(training.beta_1 as f32)
        .with_epsilon(training.epsilon as f32)
        .init::<TrainBackend, Network<TrainBackend>>();
    RegressionModel::new(config, training, optim, rng)
}

impl<O> RegressionModel<O>
where
    O: Optimizer<Network<TrainBackend>, TrainBackend>,
{
    /// 重みを `rng` から初期化してモデルを作ります。
    pub fn new(
        config: NetworkConfig,
        training: TrainingConfig,
        optim: O,
        mut rng: StdRng,
    ) -> PodnnResult<Self> {
        training.validate()?;
        let device = NdArrayDevice::default();
        let network = config.init::<TrainBackend, _>(&mut rng, &device)?;
        Ok(Self {
            config,
            training,
            scaling: InputScaling::Identity,
            network,
            optim,
            rng,
            device,
            step: 0,
            loss_history: Vec::new(),
        })
    }

    /// 入力の正規化を設定します。学習と推論の両方に適用されます。
    pub fn with_scaling(mut self, scaling: InputScaling) -> Self {
        self.scaling = scaling;
        self
    }

    pub fn network_config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn training_config(&self) -> &TrainingConfig {
        &self.training
    }

    pub fn scaling(&self) -> &InputScaling {
        &self.scaling
    }

    /// これまでに実行した勾配ステップの総数。
    pub fn steps(&self) -> usize {
        self.step
    }

    /// ステップごとの損失 (正則化項を含む)。
    pub fn loss_history(&self) -> &[f64] {
        &self.loss_history
    }

    /// 推論用バックエンドへ写したネットワーク。
    pub fn inference_network(&self) -> Network<InferBackend> {
        self.network.valid()
    }

    /// 学習データで `epochs` 回の勾配ステップを実行します。
    pub fn fit(
        &mut self,
        x: &DMatrix<f64>,
        y: &DMatrix<f64>,
        epochs: usize,
    ) -> PodnnResult<TrainingSummary> {
        self.train(x, y, epochs, None::<fn(&Self) -> PodnnResult<f64>>)
    }

    /// `fit` と同じですが、ログ出力のたびに `validation` を呼んで検証誤差も記録します。
    pub fn fit_with_validation<F>(
        &mut self,
        x: &DMatrix<f64>,
        y: &DMatrix<f64>,
        epochs: usize,
        validation: F,
    ) -> PodnnResult<TrainingSummary>
    where
        F: FnMut(&Self) -> PodnnResult<f64>,
    {
        self.train(x, y, epochs, Some(validation))
    }

    fn train<F>(
        &mut self,
        x: &DMatrix<f64>,
        y: &DMatrix<f64>,
        epochs: usize,
        mut validation: Option<F>,
    ) -> PodnnResult<TrainingSummary>
    where
        F: FnMut(&Self) -> PodnnResult<f64>,
    {
        if x.nrows() == 0 {
            return Err(PodnnError::config("学習データが空です"));
        }
        if y.nrows() != x.nrows() {
            return Err(PodnnError::shape("出力のサンプル数", x.nrows(), y.nrows()));
        }
        if x.ncols() != self.config.d_input {
            return Err(PodnnError::shape("入力の次元", self.config.d_input, x.ncols()));
        }
        if y.ncols() != self.config.d_output {
            return Err(PodnnError::shape("出力の次元", self.config.d_output, y.ncols()));
        }

        let x = self.scaling.apply(x)?;
        let n = x.nrows();
        let batch_size = match self.training.batch_size {
            0 => n,
            b => b.min(n),
        };
        let x_full = matrix_to_tensor::<TrainBackend>(&x, &self.device);
        let y_full = matrix_to_tensor::<TrainBackend>(y, &self.device);
        let mut indices: Vec<usize> = (0..n).collect();

        info!(
            "学習を開始します: サンプル数 {}, バッチ {}, エポック {}",
            n, batch_size, epochs
        );
        let start = Instant::now();
        let mut final_loss = None;

        for epoch in 1..=epochs {
            let (x_batch, y_batch) = if batch_size == n {
                (x_full.clone(), y_full.clone())
            } else {
                indices.shuffle(&mut self.rng);
                let chosen = &indices[..batch_size];
                (
                    matrix_to_tensor::<TrainBackend>(&x.select_rows(chosen), &self.device),
                    matrix_to_tensor::<TrainBackend>(&y.select_rows(chosen), &self.device),
                )
            };

            let loss = regression_loss(&self.network, x_batch, y_batch, self.training.lambda);
            let loss_value: f64 = loss.clone().into_scalar().elem();
            if !loss_value.is_finite() {
                return Err(PodnnError::NumericalDivergence {
                    step: self.step + 1,
                    loss: loss_value,
                });
            }

            let grads = GradientsParams::from_grads(loss.backward(), &self.network);
            let lr = self.learning_rate();
            self.network = self.optim.step(lr, self.network.clone(), grads);
            self.step += 1;
            self.loss_history.push(loss_value);
            final_loss = Some(loss_value);

            let log_frequency = self.training.log_frequency;
            if log_frequency > 0 && (epoch % log_frequency == 0 || epoch == epochs) {
                match validation.as_mut() {
                    Some(error_fn) => {
                        let error = error_fn(&*self)?;
                        info!(
                            "[Epoch {}] 損失: {:.6e}, 検証誤差: {:.4}%",
                            epoch,
                            loss_value,
                            100.0 * error
                        );
                    }
                    None => info!("[Epoch {}] 損失: {:.6e}", epoch, loss_value),
                }
            }
        }

        // 最後のステップの更新はまだ損失で確かめていない
        if epochs > 0 && !self.network.parameters_are_finite() {
            return Err(PodnnError::NumericalDivergence {
                step: self.step,
                loss: f64::NAN,
            });
        }

        let elapsed = start.elapsed();
        info!("学習が完了しました。=> 学習時間: {:.2?}", elapsed);
        Ok(TrainingSummary {
            epochs,
            final_loss,
            elapsed,
        })
    }

    /// 縮約係数を予測します (サンプル数 × n_L)。モデルの状態は変更しません。
    pub fn predict(&self, x: &DMatrix<f64>) -> PodnnResult<DMatrix<f64>> {
        predict_with(&self.inference_network(), &self.config, &self.scaling, x)
    }

    fn learning_rate(&self) -> f64 {
        self.training.learning_rate / (1.0 + self.training.decay * self.step as f64)
    }
}

/// 推論用ネットワークで予測します。
pub(crate) fn predict_with(
    network: &Network<InferBackend>,
    config: &NetworkConfig,
    scaling: &InputScaling,
    x: &DMatrix<f64>,
) -> PodnnResult<DMatrix<f64>> {
    if x.ncols() != config.d_input {
        return Err(PodnnError::shape("入力の次元", config.d_input, x.ncols()));
    }
    if x.nrows() == 0 {
        return Ok(DMatrix::zeros(0, config.d_output));
    }
    let x = scaling.apply(x)?;
    let device = NdArrayDevice::default();
    tensor_to_matrix(network.forward(matrix_to_tensor::<InferBackend>(&x, &device)))
}

pub(crate) fn matrix_to_tensor<B: Backend>(m: &DMatrix<f64>, device: &B::Device) -> Tensor<B, 2> {
    let row_major = m.transpose().as_slice().to_vec();
    Tensor::from_data(TensorData::new(row_major, [m.nrows(), m.ncols()]), device)
}

pub(crate) fn tensor_to_matrix<B: Backend>(
    tensor: Tensor<B, 2>,
) -> PodnnResult<DMatrix<f64>> {
    let [rows, cols] = tensor.dims();
    let values = tensor
        .into_data()
        .convert::<f64>()
        .to_vec::<f64>()
        .map_err(|e| PodnnError::Tensor(format!("{e:?}")))?;
    Ok(DMatrix::from_row_slice(rows, cols, &values))
}
