//! 誤差指標とアンサンブル統計量。

use crate::error::{PodnnError, Result};
use crate::pod::PodBasis;
use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;

/// Frobenius ノルムによる相対誤差 `‖reference − prediction‖ / ‖reference‖`。
///
/// 両者が完全に一致する場合は参照が0でも0を返します。
pub fn relative_error(reference: &DMatrix<f64>, prediction: &DMatrix<f64>) -> Result<f64> {
    if reference.nrows() != prediction.nrows() {
        return Err(PodnnError::shape("予測の行数", reference.nrows(), prediction.nrows()));
    }
    if reference.ncols() != prediction.ncols() {
        return Err(PodnnError::shape("予測の列数", reference.ncols(), prediction.ncols()));
    }
    let diff = (reference - prediction).norm();
    if diff == 0.0 {
        return Ok(0.0);
    }
    Ok(diff / reference.norm())
}

/// アンサンブル方向に集約した平均場と標準偏差場 (n_h × n_t)。
#[derive(Debug, Clone, PartialEq)]
pub struct FieldStatistics {
    pub mean: DMatrix<f64>,
    pub std: DMatrix<f64>,
}

impl FieldStatistics {
    /// 参照統計量に対する平均・標準偏差それぞれの相対誤差 (%)。
    pub fn errors_against(&self, reference: &FieldStatistics) -> Result<(f64, f64)> {
        Ok((
            100.0 * relative_error(&reference.mean, &self.mean)?,
            100.0 * relative_error(&reference.std, &self.std)?,
        ))
    }
}

/// 要素ごとの和・二乗和・有限値の個数。足し合わせる順序に依らず結果は同じです。
struct Moments {
    sum: DMatrix<f64>,
    sum_sq: DMatrix<f64>,
    count: DMatrix<f64>,
}

impl Moments {
    fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            sum: DMatrix::zeros(rows, cols),
            sum_sq: DMatrix::zeros(rows, cols),
            count: DMatrix::zeros(rows, cols),
        }
    }

    fn add(mut self, block: &DMatrix<f64>) -> Self {
        for (idx, &v) in block.iter().enumerate() {
            if v.is_finite() {
                self.sum[idx] += v;
                self.sum_sq[idx] += v * v;
                self.count[idx] += 1.0;
            }
        }
        self
    }

    fn merge(mut self, other: Self) -> Self {
        self.sum += other.sum;
        self.sum_sq += other.sum_sq;
        self.count += other.count;
        self
    }

    fn finish(self) -> FieldStatistics {
        let (rows, cols) = self.sum.shape();
        let mut mean = DMatrix::zeros(rows, cols);
        let mut std = DMatrix::zeros(rows, cols);
        for idx in 0..rows * cols {
            let c = self.count[idx];
            if c > 0.0 {
                let m = self.sum[idx] / c;
                mean[idx] = m;
                std[idx] = (self.sum_sq[idx] / c - m * m).max(0.0).sqrt();
            }
        }
        FieldStatistics { mean, std }
    }
}

/// 実現値 `i` ごとのブロック (rows × cols) を並列に生成し、統計量へ集約します。
fn ensemble_statistics<F>(n_realizations: usize, rows: usize, cols: usize, block: F) -> FieldStatistics
where
    F: Fn(usize) -> DMatrix<f64> + Sync,
{
    (0..n_realizations)
        .into_par_iter()
        .fold(
            || Moments::zeros(rows, cols),
            |acc, i| acc.add(&block(i)),
        )
        .reduce(|| Moments::zeros(rows, cols), Moments::merge)
        .finish()
}

fn realizations(len: usize, n_t: usize) -> Result<usize> {
    if n_t == 0 {
        return Err(PodnnError::config("n_t は正の値が必要です"));
    }
    if len % n_t != 0 {
        return Err(PodnnError::shape(
            "時刻数で割り切れるスナップショット数",
            (len / n_t + 1) * n_t,
            len,
        ));
    }
    let n = len / n_t;
    if n == 0 {
        return Err(PodnnError::config("統計量を計算するスナップショットがありません"));
    }
    Ok(n)
}

/// 全場スナップショット (n_h × n_s·n_t) の、実現値方向の平均と標準偏差。
///
/// 各実現値は連続する `n_t` 列です。非有限値は要素ごとに除外します。
pub fn field_statistics(u_h: &DMatrix<f64>, n_t: usize) -> Result<FieldStatistics> {
    let n = realizations(u_h.ncols(), n_t)?;
    Ok(ensemble_statistics(n, u_h.nrows(), n_t, |i| {
        u_h.columns(i * n_t, n_t).into_owned()
    }))
}

/// 予測した縮約係数 (n_s·n_t × n_L) を実現値ごとに `V·U_rbᵗ` で全場へ戻しながら
/// 平均と標準偏差を求めます。全場の行列全体は組み立てません。
pub fn reconstructed_statistics(
    basis: &PodBasis,
    u_rb: &DMatrix<f64>,
    n_t: usize,
) -> Result<FieldStatistics> {
    if u_rb.ncols() != basis.rank() {
        return Err(PodnnError::shape("縮約係数の次元", basis.rank(), u_rb.ncols()));
    }
    let n = realizations(u_rb.nrows(), n_t)?;
    let v = basis.vectors();
    Ok(ensemble_statistics(n, basis.n_h(), n_t, |i| {
        v * u_rb.rows(i * n_t, n_t).transpose()
    }))
}

/// 列方向 (アンサンブル軸) の NaN を除外した平均と標準偏差。
pub fn nan_mean_std(m: &DMatrix<f64>) -> Result<(DVector<f64>, DVector<f64>)> {
    let stats = field_statistics(m, 1)?;
    Ok((stats.mean.column(0).into_owned(), stats.std.column(0).into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn identical_fields_have_zero_error() {
        let u = DMatrix::from_fn(5, 4, |i, j| (i + 2 * j) as f64);
        assert_eq!(relative_error(&u, &u).unwrap(), 0.0);

        let zeros = DMatrix::zeros(3, 3);
        assert_eq!(relative_error(&zeros, &zeros).unwrap(), 0.0);

        let stats = field_statistics(&u, 2).unwrap();
        assert_eq!(stats.errors_against(&stats).unwrap(), (0.0, 0.0));
    }

    #[test]
    fn relative_error_uses_frobenius_norms() {
        let reference = DMatrix::from_row_slice(2, 2, &[3.0, 0.0, 0.0, 4.0]);
        let prediction = DMatrix::from_row_slice(2, 2, &[3.0, 1.0, 0.0, 4.0]);
        assert_relative_eq!(relative_error(&reference, &prediction).unwrap(), 0.2);
    }

    #[test]
    fn relative_error_checks_shapes() {
        assert!(matches!(
            relative_error(&DMatrix::zeros(2, 3), &DMatrix::zeros(3, 2)),
            Err(PodnnError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn statistics_group_consecutive_columns_per_realization() {
        // 2 実現値 × n_t = 2
        let u_h = DMatrix::from_row_slice(1, 4, &[1.0, 10.0, 3.0, 30.0]);
        let stats = field_statistics(&u_h, 2).unwrap();
        assert_relative_eq!(stats.mean[(0, 0)], 2.0);
        assert_relative_eq!(stats.mean[(0, 1)], 20.0);
        assert_relative_eq!(stats.std[(0, 0)], 1.0);
        assert_relative_eq!(stats.std[(0, 1)], 10.0);
    }

    #[test]
    fn missing_values_are_excluded_from_aggregates() {
        let m = DMatrix::from_row_slice(
            3,
            3,
            &[
                1.0,
                f64::NAN,
                3.0,
                2.0,
                2.0,
                2.0,
                f64::NAN,
                f64::NAN,
                f64::NAN,
            ],
        );
        let (mean, std) = nan_mean_std(&m).unwrap();
        assert_relative_eq!(mean[0], 2.0);
        assert_relative_eq!(std[0], 1.0);
        assert_relative_eq!(std[1], 0.0);
        assert!(mean.iter().chain(std.iter()).all(|v| v.is_finite()));
    }

    #[test]
    fn reconstructed_statistics_match_statistics_of_the_full_field() {
        let u_h = DMatrix::from_fn(40, 12, |i, j| ((i * (j + 1)) as f64 * 0.07).sin());
        let basis = PodBasis::extract(&u_h, 1e-6).unwrap();
        let coeffs = basis.project(&u_h).unwrap().transpose();

        let direct = field_statistics(&basis.reconstruct(&coeffs).unwrap(), 3).unwrap();
        let streamed = reconstructed_statistics(&basis, &coeffs, 3).unwrap();
        assert_eq!(streamed.mean.shape(), (40, 3));
        assert!((&direct.mean - &streamed.mean).amax() < 1e-10);
        assert!((&direct.std - &streamed.std).amax() < 1e-8);
    }

    #[test]
    fn uneven_time_blocks_are_rejected() {
        assert!(matches!(
            field_statistics(&DMatrix::zeros(2, 5), 2),
            Err(PodnnError::ShapeMismatch { .. })
        ));
        assert!(matches!(
            field_statistics(&DMatrix::zeros(2, 0), 1),
            Err(PodnnError::Configuration(_))
        ));
    }
}
