//! 学習用・検証用データへの分割。

use crate::error::{PodnnError, Result};
use nalgebra::DMatrix;

/// 学習用と検証用に分けた、行同士が対応する4つの行列。
#[derive(Debug, Clone, PartialEq)]
pub struct Split {
    pub x_train: DMatrix<f64>,
    pub y_train: DMatrix<f64>,
    pub x_val: DMatrix<f64>,
    pub y_val: DMatrix<f64>,
}

impl Split {
    pub fn n_train(&self) -> usize {
        self.x_train.nrows()
    }

    pub fn n_val(&self) -> usize {
        self.x_val.nrows()
    }
}

/// 学習に使うサンプル数 `floor(ratio · n_s)`。
pub fn train_count(n_s: usize, train_val_ratio: f64) -> Result<usize> {
    if !(0.0..=1.0).contains(&train_val_ratio) {
        return Err(PodnnError::config(format!(
            "train_val_ratio は [0, 1] の範囲が必要です ({train_val_ratio})"
        )));
    }
    Ok(((train_val_ratio * n_s as f64).floor() as usize).min(n_s))
}

/// 先頭 `n_train` 行を学習用、残りを検証用に分けます。
///
/// 各分割の中の行の順序は元の順序のままです。`n_train` が0または全行数の場合は
/// 片方が空になります。
pub fn split(x: &DMatrix<f64>, y: &DMatrix<f64>, n_train: usize) -> Result<Split> {
    let n_s = x.nrows();
    if y.nrows() != n_s {
        return Err(PodnnError::shape("出力のスナップショット数", n_s, y.nrows()));
    }
    if n_train > n_s {
        return Err(PodnnError::config(format!(
            "学習サンプル数 {n_train} がスナップショット数 {n_s} を超えています"
        )));
    }
    let n_val = n_s - n_train;
    Ok(Split {
        x_train: x.rows(0, n_train).into_owned(),
        y_train: y.rows(0, n_train).into_owned(),
        x_val: x.rows(n_train, n_val).into_owned(),
        y_val: y.rows(n_train, n_val).into_owned(),
    })
}
