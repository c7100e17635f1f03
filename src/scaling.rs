//! 回帰モデルへの入力の正規化。

use crate::error::{PodnnError, Result};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

/// 入力列ごとの変換。学習時と推論時で同じものを使います。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InputScaling {
    /// 入力をそのまま使います。
    #[default]
    Identity,
    /// 各列を `[lb, ub]` から `[-1, 1]` へ線形に写します。幅0の列は0になります。
    MinMax { lb: Vec<f64>, ub: Vec<f64> },
}

impl InputScaling {
    pub fn identity() -> Self {
        InputScaling::Identity
    }

    /// 境界を明示して min-max 変換を作ります。
    pub fn from_bounds(lb: &[f64], ub: &[f64]) -> Result<Self> {
        if lb.len() != ub.len() {
            return Err(PodnnError::shape("上限の次元", lb.len(), ub.len()));
        }
        if lb.iter().zip(ub).any(|(l, u)| !(l <= u)) {
            return Err(PodnnError::config("下限は上限以下である必要があります"));
        }
        Ok(InputScaling::MinMax {
            lb: lb.to_vec(),
            ub: ub.to_vec(),
        })
    }

    /// 学習データの列ごとの最小値・最大値から min-max 変換を作ります。
    pub fn min_max(x: &DMatrix<f64>) -> Result<Self> {
        if x.nrows() == 0 {
            return Err(PodnnError::config(
                "空の入力からは正規化の境界を決められません",
            ));
        }
        let lb: Vec<f64> = x.column_iter().map(|c| c.min()).collect();
        let ub: Vec<f64> = x.column_iter().map(|c| c.max()).collect();
        Self::from_bounds(&lb, &ub)
    }

    pub fn apply(&self, x: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        match self {
            InputScaling::Identity => Ok(x.clone()),
            InputScaling::MinMax { lb, ub } => {
                if x.ncols() != lb.len() {
                    return Err(PodnnError::shape("入力の次元", lb.len(), x.ncols()));
                }
                Ok(DMatrix::from_fn(x.nrows(), x.ncols(), |i, j| {
                    let width = ub[j] - lb[j];
                    if width > 0.0 {
                        2.0 * (x[(i, j)] - lb[j]) / width - 1.0
                    } else {
                        0.0
                    }
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn identity_leaves_inputs_untouched() {
        let x = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(InputScaling::identity().apply(&x).unwrap(), x);
    }

    #[test]
    fn min_max_maps_training_range_onto_unit_interval() {
        let x = DMatrix::from_row_slice(3, 2, &[0.0, 5.0, 1.0, 5.0, 4.0, 5.0]);
        let scaled = InputScaling::min_max(&x).unwrap().apply(&x).unwrap();

        assert_relative_eq!(scaled[(0, 0)], -1.0);
        assert_relative_eq!(scaled[(1, 0)], -0.5);
        assert_relative_eq!(scaled[(2, 0)], 1.0);
        // 定数列
        assert_eq!(scaled.column(1).iter().copied().collect::<Vec<_>>(), vec![0.0; 3]);
    }

    #[test]
    fn explicit_bounds_extrapolate_linearly() {
        let s = InputScaling::from_bounds(&[0.0], &[2.0]).unwrap();
        let out = s.apply(&DMatrix::from_row_slice(1, 1, &[3.0])).unwrap();
        assert_relative_eq!(out[(0, 0)], 2.0);
    }

    #[test]
    fn column_count_is_checked() {
        let s = InputScaling::from_bounds(&[0.0, 0.0], &[1.0, 1.0]).unwrap();
        assert!(matches!(
            s.apply(&DMatrix::zeros(2, 3)),
            Err(PodnnError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn serializes_with_a_kind_tag() {
        let s = InputScaling::from_bounds(&[0.0], &[1.0]).unwrap();
        let json = serde_json::to_string(&s).unwrap();
        assert!(json.contains("\"kind\":\"min_max\""));
        let back: InputScaling = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }
}
