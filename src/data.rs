//! 高精度スナップショットの受け取り口。
//!
//! スナップショットの生成 (解析解や数値解法) はこのクレートの外側で行い、
//! [`SnapshotSource`] を通じて受け取ります。

use crate::config::DataConfig;
use crate::error::{PodnnError, Result};
use crate::io::load_matrix;
use crate::metrics::FieldStatistics;
use log::info;
use nalgebra::DMatrix;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// 入力行列とスナップショット行列の組。
///
/// `inputs` の第 k 行が `fields` の第 k 列に対応します。1つの実現値 (パラメータサンプル) は
/// 連続する `n_t` 個のスナップショットからなります。
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotSet {
    pub inputs: DMatrix<f64>,
    pub fields: DMatrix<f64>,
    pub n_t: usize,
}

impl SnapshotSet {
    pub fn new(inputs: DMatrix<f64>, fields: DMatrix<f64>, n_t: usize) -> Result<Self> {
        if n_t == 0 {
            return Err(PodnnError::config("n_t は正の値が必要です"));
        }
        if inputs.nrows() != fields.ncols() {
            return Err(PodnnError::shape(
                "入力の行数 (スナップショット数)",
                fields.ncols(),
                inputs.nrows(),
            ));
        }
        if fields.ncols() % n_t != 0 {
            return Err(PodnnError::shape(
                "時刻数で割り切れるスナップショット数",
                (fields.ncols() / n_t + 1) * n_t,
                fields.ncols(),
            ));
        }
        Ok(Self {
            inputs,
            fields,
            n_t,
        })
    }

    /// 実現値の数 n_s。
    pub fn n_realizations(&self) -> usize {
        self.fields.ncols() / self.n_t
    }

    /// 入力の次元 n_d。
    pub fn n_d(&self) -> usize {
        self.inputs.ncols()
    }

    /// スナップショットの長さ n_h。
    pub fn n_h(&self) -> usize {
        self.fields.nrows()
    }

    /// 先頭から `n_s` 個の実現値を取り出します。
    pub fn take(&self, n_s: usize) -> Result<Self> {
        let available = self.n_realizations();
        if n_s > available {
            return Err(PodnnError::config(format!(
                "{n_s} 個のスナップショットが要求されましたが {available} 個しかありません"
            )));
        }
        let cols = n_s * self.n_t;
        Ok(Self {
            inputs: self.inputs.rows(0, cols).into_owned(),
            fields: self.fields.columns(0, cols).into_owned(),
            n_t: self.n_t,
        })
    }
}

/// 高精度スナップショットの供給元。
///
/// スイープでは複数のワーカーから同時に呼ばれるため `Sync` が必要です。
/// 返す `SnapshotSet` は呼び出し側が専有します。
pub trait SnapshotSource: Sync {
    /// 先頭から `n_s` 個の実現値を返します。
    fn snapshots(&self, n_s: usize) -> Result<SnapshotSet>;
}

impl SnapshotSource for SnapshotSet {
    fn snapshots(&self, n_s: usize) -> Result<SnapshotSet> {
        self.take(n_s)
    }
}

/// テキストファイルに保存されたスナップショット。
#[derive(Debug, Clone)]
pub struct FileSnapshotSource {
    inputs: PathBuf,
    snapshots: PathBuf,
    n_t: usize,
}

impl FileSnapshotSource {
    pub fn new(inputs: impl Into<PathBuf>, snapshots: impl Into<PathBuf>, n_t: usize) -> Self {
        Self {
            inputs: inputs.into(),
            snapshots: snapshots.into(),
            n_t,
        }
    }

    pub fn from_config(data: &DataConfig, n_t: usize) -> Self {
        Self::new(&data.inputs, &data.snapshots, n_t)
    }
}

impl SnapshotSource for FileSnapshotSource {
    fn snapshots(&self, n_s: usize) -> Result<SnapshotSet> {
        let start = Instant::now();
        let inputs = load_logged(&self.inputs)?;
        let fields = load_logged(&self.snapshots)?;
        info!("読み込み完了 ({:.2?})", start.elapsed());
        SnapshotSet::new(inputs, fields, self.n_t)?.take(n_s)
    }
}

fn load_logged(path: &Path) -> Result<DMatrix<f64>> {
    info!("{} を読み込み中...", path.display());
    load_matrix(path)
}

/// 高精度解の平均場・標準偏差場を読み込みます。どちらも指定がなければ `None` です。
pub fn load_test_statistics(data: &DataConfig) -> Result<Option<FieldStatistics>> {
    match (&data.test_mean, &data.test_std) {
        (Some(mean), Some(std)) => {
            let mean = load_logged(mean)?;
            let std = load_logged(std)?;
            if mean.shape() != std.shape() {
                return Err(PodnnError::shape("標準偏差場の要素数", mean.len(), std.len()));
            }
            Ok(Some(FieldStatistics { mean, std }))
        }
        (None, None) => Ok(None),
        _ => Err(PodnnError::config(
            "test_mean と test_std は両方指定する必要があります",
        )),
    }
}
