//! ハイパーパラメータ設定。
//!
//! 設定はJSON文書として受け渡します。省略されたキーは組み込みの既定値
//! (1次元Burgers方程式の実験設定) で補われます。

use crate::error::{PodnnError, Result};
use crate::mesh::Axis;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Adam の数値安定化項の既定値。
pub const DEFAULT_ADAM_EPS: f64 = 1e-7;

/// スナップショットとテスト統計量のファイル配置。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DataConfig {
    /// 入力行列 (1行1スナップショット、列はパラメータ/時刻)。
    pub inputs: PathBuf,
    /// スナップショット行列 (1列1スナップショット)。
    pub snapshots: PathBuf,
    /// 高精度解の平均場 (任意)。
    pub test_mean: Option<PathBuf>,
    /// 高精度解の標準偏差場 (任意)。
    pub test_std: Option<PathBuf>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            inputs: PathBuf::from("data/inputs.txt"),
            snapshots: PathBuf::from("data/snapshots.txt"),
            test_mean: None,
            test_std: None,
        }
    }
}

/// スナップショット数 × エポック数のスイープ格子。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SweepGrid {
    pub n_s: Vec<usize>,
    #[serde(alias = "tf_epochs")]
    pub epochs: Vec<usize>,
}

/// 実験全体のハイパーパラメータ。読み込み後は変更しません。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HyperParams {
    // 空間離散化
    pub n_x: usize,
    pub n_y: usize,
    pub n_z: usize,
    /// 場の成分数。
    pub n_v: usize,
    /// 1パラメータサンプルあたりの時刻数。
    pub n_t: usize,
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
    pub z_min: f64,
    pub z_max: f64,

    // パラメータ空間
    pub mu_min: Option<Vec<f64>>,
    pub mu_max: Option<Vec<f64>>,

    pub n_s: usize,
    pub eps: f64,
    pub train_val_ratio: f64,
    pub h_layers: Vec<usize>,
    pub batch_size: usize,
    #[serde(alias = "tf_epochs")]
    pub epochs: usize,
    #[serde(alias = "tf_lr", alias = "lr")]
    pub learning_rate: f64,
    #[serde(alias = "tf_decay")]
    pub decay: f64,
    #[serde(alias = "tf_b1")]
    pub beta_1: f64,
    #[serde(alias = "tf_eps")]
    pub adam_eps: Option<f64>,
    pub lambda: f64,
    pub log_frequency: usize,
    pub seed: u64,
    pub normalize: bool,
    pub plot_loss: bool,

    pub data: DataConfig,
    pub sweep: Option<SweepGrid>,
}

impl Default for HyperParams {
    fn default() -> Self {
        Self {
            n_x: 256,
            n_y: 0,
            n_z: 0,
            n_v: 1,
            n_t: 1,
            x_min: -1.0,
            x_max: 1.0,
            y_min: 0.0,
            y_max: 0.0,
            z_min: 0.0,
            z_max: 0.0,
            mu_min: None,
            mu_max: None,
            n_s: 20,
            eps: 1e-10,
            train_val_ratio: 0.5,
            h_layers: vec![64, 64],
            batch_size: 0,
            epochs: 20000,
            learning_rate: 0.003,
            decay: 0.0,
            beta_1: 0.9,
            adam_eps: None,
            lambda: 1e-4,
            log_frequency: 1000,
            seed: 1111,
            normalize: false,
            plot_loss: false,
            data: DataConfig::default(),
            sweep: None,
        }
    }
}

impl HyperParams {
    /// JSONファイルから設定を読み込み、検証します。
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let hp: HyperParams = serde_json::from_reader(BufReader::new(file))?;
        hp.validate()?;
        Ok(hp)
    }

    /// パスが与えられればファイルから、なければ既定値を返します。
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => {
                let hp = Self::default();
                hp.validate()?;
                Ok(hp)
            }
        }
    }

    /// スナップショットベクトルの長さ。
    pub fn n_h(&self) -> usize {
        self.n_v * self.n_x * self.n_y.max(1) * self.n_z.max(1)
    }

    /// 空間格子の軸。`n_y`、`n_z` が0の軸は省きます。
    pub fn mesh_axes(&self) -> Vec<Axis> {
        let mut axes = vec![Axis::new(self.x_min, self.x_max, self.n_x)];
        if self.n_y > 0 {
            axes.push(Axis::new(self.y_min, self.y_max, self.n_y));
            if self.n_z > 0 {
                axes.push(Axis::new(self.z_min, self.z_max, self.n_z));
            }
        }
        axes
    }

    pub fn adam_epsilon(&self) -> f64 {
        self.adam_eps.unwrap_or(DEFAULT_ADAM_EPS)
    }

    /// パラメータ空間の境界 (両方指定されている場合のみ)。
    pub fn parameter_bounds(&self) -> Option<(&[f64], &[f64])> {
        match (&self.mu_min, &self.mu_max) {
            (Some(lb), Some(ub)) => Some((lb.as_slice(), ub.as_slice())),
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("n_s", self.n_s),
            ("n_t", self.n_t),
            ("n_x", self.n_x),
            ("n_v", self.n_v),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(PodnnError::config(format!("{name} は正の値が必要です")));
            }
        }
        if !(0.0..1.0).contains(&self.eps) {
            return Err(PodnnError::config(format!(
                "eps は [0, 1) の範囲が必要です (eps = {})",
                self.eps
            )));
        }
        if !(0.0..=1.0).contains(&self.train_val_ratio) {
            return Err(PodnnError::config(format!(
                "train_val_ratio は [0, 1] の範囲が必要です ({})",
                self.train_val_ratio
            )));
        }
        if self.h_layers.iter().any(|&w| w == 0) {
            return Err(PodnnError::config("h_layers の幅はすべて正の値が必要です"));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(PodnnError::config("learning_rate は正の有限値が必要です"));
        }
        if !(self.decay >= 0.0) {
            return Err(PodnnError::config("decay は0以上が必要です"));
        }
        if !(0.0..1.0).contains(&self.beta_1) {
            return Err(PodnnError::config("beta_1 は [0, 1) の範囲が必要です"));
        }
        if !(self.adam_epsilon() > 0.0) {
            return Err(PodnnError::config("adam_eps は正の値が必要です"));
        }
        if !(self.lambda >= 0.0) {
            return Err(PodnnError::config("lambda は0以上が必要です"));
        }
        match (&self.mu_min, &self.mu_max) {
            (Some(lb), Some(ub)) => {
                if lb.len() != ub.len() {
                    return Err(PodnnError::shape("mu_max の次元", lb.len(), ub.len()));
                }
                if lb.iter().zip(ub).any(|(l, u)| l > u) {
                    return Err(PodnnError::config("mu_min は mu_max 以下が必要です"));
                }
            }
            (None, None) => {}
            _ => {
                return Err(PodnnError::config(
                    "mu_min と mu_max は両方指定する必要があります",
                ));
            }
        }
        if let Some(grid) = &self.sweep {
            if grid.n_s.is_empty() || grid.epochs.is_empty() {
                return Err(PodnnError::config("sweep の各軸は空にできません"));
            }
            if grid.n_s.iter().any(|&n| n == 0) {
                return Err(PodnnError::config("sweep.n_s はすべて正の値が必要です"));
            }
        }
        Ok(())
    }
}
