//! 等間隔の構造格子。

use crate::error::{PodnnError, Result};
use nalgebra::DMatrix;

/// 1つの空間軸 `[min, max]` を `n` 点で等分割したもの。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Axis {
    pub min: f64,
    pub max: f64,
    pub n: usize,
}

impl Axis {
    pub fn new(min: f64, max: f64, n: usize) -> Self {
        Self { min, max, n }
    }

    /// `linspace(min, max, n)`。
    pub fn points(&self) -> Vec<f64> {
        match self.n {
            0 => Vec::new(),
            1 => vec![self.min],
            n => (0..n)
                .map(|i| self.min + (self.max - self.min) * i as f64 / (n - 1) as f64)
                .collect(),
        }
    }
}

/// 1〜3次元の格子点を `[idx, x, (y), (z)]` の行として並べます。
///
/// `idx` は1始まりの通し番号です。2次元以上では numpy の `meshgrid` (xy 添字) を平坦化した
/// 順序、すなわち y が最も外側、次に x、最も内側が z になります。
pub fn linear_mesh(axes: &[Axis]) -> Result<DMatrix<f64>> {
    if axes.is_empty() || axes.len() > 3 {
        return Err(PodnnError::config(format!(
            "格子の次元は1〜3が必要です ({})",
            axes.len()
        )));
    }
    if axes.iter().any(|a| a.n == 0) {
        return Err(PodnnError::config("格子の各軸は1点以上が必要です"));
    }

    let points: Vec<Vec<f64>> = axes.iter().map(Axis::points).collect();
    let coords: Vec<Vec<f64>> = match points.as_slice() {
        [x] => x.iter().map(|&x| vec![x]).collect(),
        [x, y] => y
            .iter()
            .flat_map(|&y| x.iter().map(move |&x| vec![x, y]))
            .collect(),
        [x, y, z] => {
            let mut out = Vec::with_capacity(x.len() * y.len() * z.len());
            for &yv in y {
                for &xv in x {
                    for &zv in z {
                        out.push(vec![xv, yv, zv]);
                    }
                }
            }
            out
        }
        _ => unreachable!(),
    };

    let dim = axes.len();
    Ok(DMatrix::from_fn(coords.len(), dim + 1, |i, j| {
        if j == 0 { (i + 1) as f64 } else { coords[i][j - 1] }
    }))
}
