//! 固有直交分解 (POD) による縮約基底の抽出。

use crate::error::{PodnnError, Result};
use log::debug;
use nalgebra::DMatrix;

/// スナップショット行列から得た正規直交基底 `V` (n_h × n_L)。
///
/// 実験ごとに一度だけ作り、その後は読み取り専用です。
#[derive(Debug, Clone)]
pub struct PodBasis {
    vectors: DMatrix<f64>,
    singular_values: Vec<f64>,
}

impl PodBasis {
    /// 特異値分解を行い、捨てるエネルギーの割合が `eps` 以下になる最小の `k` 本の
    /// 左特異ベクトルを基底として返します。
    ///
    /// `k` は `1 - Σ_{i≤k} σ_i² / Σ_i σ_i² ≤ eps` を満たす最小値です。
    pub fn extract(u_h: &DMatrix<f64>, eps: f64) -> Result<Self> {
        if !(0.0..1.0).contains(&eps) {
            return Err(PodnnError::config(format!(
                "eps は [0, 1) の範囲が必要です (eps = {eps})"
            )));
        }
        if u_h.nrows() == 0 || u_h.ncols() == 0 {
            return Err(PodnnError::config("スナップショット行列が空です"));
        }
        if let Some(bad) = u_h.iter().find(|v| !v.is_finite()) {
            return Err(PodnnError::Numerical(format!(
                "スナップショット行列に非有限値 ({bad}) が含まれています"
            )));
        }

        let svd = u_h
            .clone()
            .try_svd(true, false, f64::EPSILON, 0)
            .ok_or_else(|| PodnnError::Numerical("SVD が収束しませんでした".into()))?;
        let u = svd
            .u
            .ok_or_else(|| PodnnError::Numerical("左特異ベクトルが得られませんでした".into()))?;
        let sigma = svd.singular_values;

        // 降順に並べ替える
        let mut order: Vec<usize> = (0..sigma.len()).collect();
        order.sort_by(|&a, &b| sigma[b].total_cmp(&sigma[a]));

        let energy: Vec<f64> = order.iter().map(|&i| sigma[i] * sigma[i]).collect();
        let total: f64 = energy.iter().sum();
        if !(total > 0.0) || !total.is_finite() {
            return Err(PodnnError::Numerical(
                "スナップショット行列のエネルギーが0です".into(),
            ));
        }

        let k = truncation_rank(&energy, total, eps);
        let vectors = DMatrix::from_fn(u_h.nrows(), k, |r, c| u[(r, order[c])]);
        debug!(
            "POD: {} 本中 {} 本の基底を採用 (eps = {:e})",
            energy.len(),
            k,
            eps
        );

        Ok(Self {
            vectors,
            singular_values: order.iter().map(|&i| sigma[i]).collect(),
        })
    }

    /// 保存済みの基底ベクトルから復元します。特異値は保持しません。
    pub fn from_vectors(vectors: DMatrix<f64>) -> Self {
        Self {
            vectors,
            singular_values: Vec::new(),
        }
    }

    /// 縮約次元 n_L。
    pub fn rank(&self) -> usize {
        self.vectors.ncols()
    }

    /// 場の自由度 n_h。
    pub fn n_h(&self) -> usize {
        self.vectors.nrows()
    }

    pub fn vectors(&self) -> &DMatrix<f64> {
        &self.vectors
    }

    /// 降順に並んだ全特異値。
    pub fn singular_values(&self) -> &[f64] {
        &self.singular_values
    }

    /// `Vᵗ·U_h` を返します (n_L × スナップショット数)。
    pub fn project(&self, u_h: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        if u_h.nrows() != self.n_h() {
            return Err(PodnnError::shape("スナップショットの長さ", self.n_h(), u_h.nrows()));
        }
        Ok(self.vectors.tr_mul(u_h))
    }

    /// サンプル行ごとの縮約係数 (n × n_L) から全場 `V·U_rbᵗ` (n_h × n) を再構成します。
    pub fn reconstruct(&self, u_rb: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        if u_rb.ncols() != self.rank() {
            return Err(PodnnError::shape("縮約係数の次元", self.rank(), u_rb.ncols()));
        }
        Ok(&self.vectors * u_rb.transpose())
    }
}

fn truncation_rank(energy: &[f64], total: f64, eps: f64) -> usize {
    let mut cumulative = 0.0;
    for (i, e) in energy.iter().enumerate() {
        cumulative += e;
        if 1.0 - cumulative / total <= eps {
            return i + 1;
        }
    }
    energy.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::relative_error;
    use approx::assert_abs_diff_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rand_distr::{Distribution, StandardNormal};

    fn gaussian(rows: usize, cols: usize, seed: u64) -> DMatrix<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        DMatrix::from_fn(rows, cols, |_, _| StandardNormal.sample(&mut rng))
    }

    /// 特異値が 1, 1/2, 1/4, ... と減衰するスナップショット。
    fn decaying(rows: usize, cols: usize) -> DMatrix<f64> {
        let q = gaussian(rows, cols, 3).qr().q();
        let scale = DMatrix::from_fn(cols, cols, |i, j| {
            if i == j { 0.5f64.powi(i as i32) } else { 0.0 }
        });
        q * scale * gaussian(cols, cols, 4).qr().q()
    }

    #[test]
    fn independent_snapshots_give_full_basis_and_exact_reconstruction() {
        let u_h = gaussian(100, 10, 7);
        let basis = PodBasis::extract(&u_h, 1e-10).unwrap();
        assert_eq!(basis.rank(), 10);

        let coeffs = basis.project(&u_h).unwrap();
        let rebuilt = basis.reconstruct(&coeffs.transpose()).unwrap();
        assert!(100.0 * relative_error(&u_h, &rebuilt).unwrap() < 1e-8);
    }

    #[test]
    fn basis_is_orthonormal() {
        let basis = PodBasis::extract(&decaying(60, 8), 1e-4).unwrap();
        let gram = basis.vectors().tr_mul(basis.vectors());
        let identity = DMatrix::<f64>::identity(basis.rank(), basis.rank());
        assert_abs_diff_eq!((gram - identity).amax(), 0.0, epsilon = 1e-10);
    }

    #[test]
    fn tiny_eps_recovers_numerical_rank() {
        let generators = gaussian(50, 3, 11);
        let mixing = gaussian(3, 8, 12);
        let u_h = &generators * mixing;

        let basis = PodBasis::extract(&u_h, 1e-12).unwrap();
        assert_eq!(basis.rank(), 3);
        assert_eq!(basis.singular_values().len(), 8);
    }

    #[test]
    fn smaller_eps_never_shrinks_basis_or_worsens_reconstruction() {
        let u_h = decaying(40, 12);
        let mut last_rank = 0;
        let mut last_error = f64::INFINITY;
        for eps in [0.5, 0.1, 1e-2, 1e-4, 1e-8] {
            let basis = PodBasis::extract(&u_h, eps).unwrap();
            let coeffs = basis.project(&u_h).unwrap();
            let rebuilt = basis.reconstruct(&coeffs.transpose()).unwrap();
            let error = relative_error(&u_h, &rebuilt).unwrap();

            assert!(basis.rank() >= last_rank);
            assert!(error <= last_error + 1e-12);
            // 捨てたエネルギーは eps 以下
            assert!(error * error <= eps + 1e-12);
            last_rank = basis.rank();
            last_error = error;
        }
    }

    #[test]
    fn vectors_in_the_span_round_trip() {
        let u_h = gaussian(30, 5, 21);
        let basis = PodBasis::extract(&u_h, 1e-12).unwrap();
        let u = &u_h * DMatrix::from_column_slice(5, 1, &[0.3, -1.0, 2.0, 0.0, 0.5]);

        let back = basis.vectors() * basis.project(&u).unwrap();
        assert!(relative_error(&u, &back).unwrap() < 1e-10);
    }

    #[test]
    fn single_snapshot_gives_one_vector() {
        let u_h = gaussian(20, 1, 5);
        let basis = PodBasis::extract(&u_h, 0.3).unwrap();
        assert_eq!(basis.rank(), 1);
    }

    #[test]
    fn non_finite_snapshots_are_rejected() {
        let mut u_h = gaussian(10, 3, 1);
        u_h[(4, 1)] = f64::NAN;
        assert!(matches!(
            PodBasis::extract(&u_h, 1e-6),
            Err(PodnnError::Numerical(_))
        ));
    }

    #[test]
    fn zero_snapshots_are_rejected() {
        let u_h = DMatrix::<f64>::zeros(10, 3);
        assert!(matches!(
            PodBasis::extract(&u_h, 1e-6),
            Err(PodnnError::Numerical(_))
        ));
    }

    #[test]
    fn projection_checks_lengths() {
        let basis = PodBasis::extract(&gaussian(10, 3, 2), 1e-6).unwrap();
        assert!(matches!(
            basis.project(&DMatrix::zeros(9, 2)),
            Err(PodnnError::ShapeMismatch { .. })
        ));
        assert!(matches!(
            basis.reconstruct(&DMatrix::zeros(2, basis.rank() + 1)),
            Err(PodnnError::ShapeMismatch { .. })
        ));
    }
}
