//! スナップショット数 × エポック数の格子スイープ。

use crate::config::{HyperParams, SweepGrid};
use crate::data::SnapshotSource;
use crate::error::{PodnnError, Result};
use crate::io::{save_matrix, save_vector};
use crate::metrics::FieldStatistics;
use crate::pipeline::run_experiment;
use log::{error, info};
use nalgebra::DMatrix;
use rayon::prelude::*;
use serde::Serialize;
use std::path::Path;

/// 失敗したセルの記録。
#[derive(Debug, Clone, Serialize)]
pub struct CellFailure {
    pub n_s: usize,
    pub epochs: usize,
    pub error: String,
}

/// スイープの結果。行がスナップショット数、列がエポック数に対応します。
///
/// 失敗したセルの誤差は NaN です。
#[derive(Debug, Clone)]
pub struct SweepReport {
    pub n_s: Vec<usize>,
    pub epochs: Vec<usize>,
    pub mean_errors: DMatrix<f64>,
    pub std_errors: DMatrix<f64>,
    pub failures: Vec<CellFailure>,
}

impl SweepReport {
    /// `n_s.txt`、`epochs.txt`、`err_t_mean.txt`、`err_t_std.txt`、`failures.json` を書き出します。
    pub fn save(&self, dir: &Path) -> Result<()> {
        let as_f64 = |v: &[usize]| v.iter().map(|&x| x as f64).collect::<Vec<_>>();
        save_vector(dir.join("n_s.txt"), &as_f64(&self.n_s))?;
        save_vector(dir.join("epochs.txt"), &as_f64(&self.epochs))?;
        save_matrix(dir.join("err_t_mean.txt"), &self.mean_errors)?;
        save_matrix(dir.join("err_t_std.txt"), &self.std_errors)?;
        crate::report::write_json(dir.join("failures.json"), &self.failures)
    }
}

/// 格子の各セルで独立に実験を実行します。
///
/// セル同士は状態を共有しません。各セルは自分のスナップショット・基底・モデルを持ち、
/// 同じ `seed` から乱数を作るので、実行順序によらず結果が決まります。
/// 失敗したセルはログに記録して NaN とし、残りのセルを続行します。
pub fn run_sweep<S>(
    hp: &HyperParams,
    grid: &SweepGrid,
    source: &S,
    test: Option<&FieldStatistics>,
) -> SweepReport
where
    S: SnapshotSource + ?Sized,
{
    let cells: Vec<(usize, usize)> = (0..grid.n_s.len())
        .flat_map(|i| (0..grid.epochs.len()).map(move |j| (i, j)))
        .collect();

    let outcomes: Vec<(usize, usize, Result<(f64, f64)>)> = cells
        .par_iter()
        .map(|&(i, j)| {
            let cell = HyperParams {
                n_s: grid.n_s[i],
                epochs: grid.epochs[j],
                sweep: None,
                ..hp.clone()
            };
            info!("n_s = {}, epochs = {} を実行中...", cell.n_s, cell.epochs);
            (i, j, run_cell(&cell, source, test))
        })
        .collect();

    let mut mean_errors = DMatrix::from_element(grid.n_s.len(), grid.epochs.len(), f64::NAN);
    let mut std_errors = mean_errors.clone();
    let mut failures = Vec::new();
    for (i, j, outcome) in outcomes {
        match outcome {
            Ok((mean, std)) => {
                mean_errors[(i, j)] = mean;
                std_errors[(i, j)] = std;
            }
            Err(e) => {
                error!(
                    "n_s = {}, epochs = {} のセルが失敗しました: {}",
                    grid.n_s[i], grid.epochs[j], e
                );
                failures.push(CellFailure {
                    n_s: grid.n_s[i],
                    epochs: grid.epochs[j],
                    error: e.to_string(),
                });
            }
        }
    }

    SweepReport {
        n_s: grid.n_s.clone(),
        epochs: grid.epochs.clone(),
        mean_errors,
        std_errors,
        failures,
    }
}

fn run_cell<S>(hp: &HyperParams, source: &S, test: Option<&FieldStatistics>) -> Result<(f64, f64)>
where
    S: SnapshotSource + ?Sized,
{
    let report = run_experiment(hp, source, test)?.report;
    match (report.mean_error, report.std_error) {
        (Some(mean), Some(std)) => Ok((mean, std)),
        _ => Err(PodnnError::config(
            "検証データが空のため誤差を計算できません",
        )),
    }
}
