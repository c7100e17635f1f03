use crate::model::Network;
use burn::nn::loss::{MseLoss, Reduction};
use burn::prelude::Backend;
use burn::tensor::Tensor;

/// 回帰損失を計算します。
///
/// 予測した縮約係数と正解との平均二乗誤差に、重み行列の L2 正則化項
/// `lambda · Σ‖W‖²` を加えたものを返します。
pub fn regression_loss<B: Backend>(
    network: &Network<B>,
    input: Tensor<B, 2>,
    target: Tensor<B, 2>,
    lambda: f64,
) -> Tensor<B, 1> {
    let prediction = network.forward(input);
    let mse = MseLoss::new().forward(prediction, target, Reduction::Mean);
    if lambda > 0.0 {
        mse + network.squared_weight_norm().mul_scalar(lambda)
    } else {
        mse
    }
}
