use crate::error::{PodnnError, Result as PodnnResult};
use burn::config::Config;
use burn::module::{Module, Param};
use burn::nn::{Linear, Tanh};
use burn::prelude::Backend;
use burn::tensor::{ElementConversion, Tensor, TensorData};
use rand::Rng;
use rand_distr::{Distribution, Normal};

/// 回帰ネットワークの構造。学習済みの重みとは独立した、変更されない記述子です。
#[derive(Config, Debug)]
pub struct NetworkConfig {
    /// 入力の幅 n_d (パラメータ次元)。
    pub d_input: usize,
    /// 出力の幅 n_L (縮約基底の本数)。
    pub d_output: usize,
    /// 隠れ層の幅。
    pub hidden: Vec<usize>,
}

impl NetworkConfig {
    /// 各層の (fan_in, fan_out)。
    pub fn layer_dims(&self) -> Vec<(usize, usize)> {
        let mut widths = Vec::with_capacity(self.hidden.len() + 2);
        widths.push(self.d_input);
        widths.extend_from_slice(&self.hidden);
        widths.push(self.d_output);
        widths.windows(2).map(|w| (w[0], w[1])).collect()
    }

    pub fn validate(&self) -> PodnnResult<()> {
        if self.d_input == 0 || self.d_output == 0 {
            return Err(PodnnError::config(format!(
                "ネットワークの入出力幅は正の値が必要です ({} -> {})",
                self.d_input, self.d_output
            )));
        }
        if self.hidden.iter().any(|&w| w == 0) {
            return Err(PodnnError::config("隠れ層の幅はすべて正の値が必要です"));
        }
        Ok(())
    }

    /// 新しい重みを初期化します。
    ///
    /// 重みは平均0・分散 1/fan_in の正規分布、バイアスは0で初期化します。
    /// 乱数は呼び出し側が渡した生成器からのみ取り出します。
    pub fn init<B: Backend, R: Rng>(
        &self,
        rng: &mut R,
        device: &B::Device,
    ) -> PodnnResult<Network<B>> {
        self.validate()?;
        let mut linears = Vec::new();
        for (fan_in, fan_out) in self.layer_dims() {
            let normal = Normal::new(0.0, 1.0 / (fan_in as f64).sqrt())
                .map_err(|e| PodnnError::Numerical(e.to_string()))?;
            let weights: Vec<f64> = (0..fan_in * fan_out).map(|_| normal.sample(rng)).collect();
            let weight = Tensor::<B, 2>::from_data(TensorData::new(weights, [fan_in, fan_out]), device);
            let bias = Tensor::<B, 1>::zeros([fan_out], device);
            linears.push(Linear {
                weight: Param::from_tensor(weight.require_grad()),
                bias: Some(Param::from_tensor(bias.require_grad())),
            });
        }
        Ok(Network {
            linears,
            activation: Tanh::new(),
        })
    }
}

/// パラメータから縮約係数を予測する多層パーセプトロン。
///
/// 隠れ層は tanh、出力層は恒等写像です。
#[derive(Module, Debug)]
pub struct Network<B: Backend> {
    linears: Vec<Linear<B>>,
    activation: Tanh,
}

impl<B: Backend> Network<B> {
    /// 順伝播を実行します。
    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let last = self.linears.len().saturating_sub(1);
        let mut x = input;
        for (i, linear) in self.linears.iter().enumerate() {
            x = linear.forward(x);
            if i < last {
                x = self.activation.forward(x);
            }
        }
        x
    }

    /// すべての重み行列の二乗和 (バイアスは含みません)。
    pub fn squared_weight_norm(&self) -> Tensor<B, 1> {
        self.linears
            .iter()
            .map(|linear| {
                let w = linear.weight.val();
                (w.clone() * w).sum()
            })
            .reduce(|acc, term| acc + term)
            .unwrap_or_else(|| {
                let device = self.devices().first().cloned().unwrap_or_default();
                Tensor::zeros([1], &device)
            })
    }

    /// すべての重みとバイアスの絶対値和が有限かどうか。
    pub fn parameters_are_finite(&self) -> bool {
        self.linears.iter().all(|linear| {
            let weight: f64 = linear.weight.val().abs().sum().into_scalar().elem();
            let bias: f64 = linear
                .bias
                .as_ref()
                .map_or(0.0, |b| b.val().abs().sum().into_scalar().elem());
            weight.is_finite() && bias.is_finite()
        })
    }

    pub fn num_layers(&self) -> usize {
        self.linears.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    type TestBackend = NdArray<f64>;

    #[test]
    fn layer_dims_chain_input_hidden_output() {
        let config = NetworkConfig::new(3, 5, vec![64, 32]);
        assert_eq!(config.layer_dims(), vec![(3, 64), (64, 32), (32, 5)]);
        assert_eq!(NetworkConfig::new(2, 1, vec![]).layer_dims(), vec![(2, 1)]);
    }

    #[test]
    fn forward_produces_one_row_per_sample() {
        let device = Default::default();
        let mut rng = StdRng::seed_from_u64(1);
        let network = NetworkConfig::new(2, 4, vec![8, 8])
            .init::<TestBackend, _>(&mut rng, &device)
            .unwrap();
        assert_eq!(network.num_layers(), 3);

        let input = Tensor::<TestBackend, 2>::zeros([6, 2], &device);
        assert_eq!(network.forward(input).dims(), [6, 4]);
    }

    #[test]
    fn weights_have_inverse_fan_in_variance() {
        let device = Default::default();
        let mut rng = StdRng::seed_from_u64(9);
        let network = NetworkConfig::new(400, 50, vec![])
            .init::<TestBackend, _>(&mut rng, &device)
            .unwrap();
        // E[Σw²] = fan_out
        let norm: f64 = network.squared_weight_norm().into_scalar();
        assert!((norm / 50.0 - 1.0).abs() < 0.1, "norm = {norm}");
    }

    #[test]
    fn zero_widths_are_configuration_errors() {
        let device = Default::default();
        let mut rng = StdRng::seed_from_u64(0);
        for config in [
            NetworkConfig::new(0, 1, vec![4]),
            NetworkConfig::new(1, 0, vec![4]),
            NetworkConfig::new(1, 1, vec![4, 0]),
        ] {
            assert!(matches!(
                config.init::<TestBackend, _>(&mut rng, &device),
                Err(PodnnError::Configuration(_))
            ));
        }
    }

    #[test]
    fn config_round_trips_through_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("network_config.json");
        let config = NetworkConfig::new(3, 7, vec![32, 16]);
        config.save(&path).unwrap();

        let loaded = NetworkConfig::load(&path).unwrap();
        assert_eq!(loaded.layer_dims(), config.layer_dims());
        assert!(NetworkConfig::load(dir.path().join("missing.json")).is_err());
    }
}
