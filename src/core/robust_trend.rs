use crate::core::stats::{f_test_q, median, MAD_NORMALIZE};
use crate::types::{SarError, SarResult, ScatterPoint};
use serde::{Deserialize, Serialize};

/// Smallest batch for which the reduced chi-squared `sum(w r^2) / (N - 3)` is defined
pub const MIN_TREND_POINTS: usize = 4;

/// Robust trend fitting parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RobustTrendParams {
    /// MAD to standard deviation factor for normally distributed residuals
    pub mad_scale: f64,
    /// Multiple of the robust scale above which residuals are downweighted
    pub tuning: f64,
    /// Iteration stops once the F-test significance drops below this value
    pub significance_threshold: f64,
    /// Safety bound on reweighting iterations
    pub max_iterations: usize,
}

impl Default for RobustTrendParams {
    fn default() -> Self {
        Self {
            mad_scale: MAD_NORMALIZE,
            tuning: 1.5,
            significance_threshold: 0.51,
            max_iterations: 100,
        }
    }
}

/// Trend model order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrendRank {
    /// z = a
    Constant,
    /// z = a + b x
    Linear,
    /// z = a + b x + c y
    Planar,
}

impl TrendRank {
    /// Number of model coefficients
    pub fn coefficient_count(self) -> usize {
        match self {
            TrendRank::Constant => 1,
            TrendRank::Linear => 2,
            TrendRank::Planar => 3,
        }
    }
}

impl TryFrom<usize> for TrendRank {
    type Error = SarError;

    fn try_from(rank: usize) -> SarResult<Self> {
        match rank {
            1 => Ok(TrendRank::Constant),
            2 => Ok(TrendRank::Linear),
            3 => Ok(TrendRank::Planar),
            _ => Err(SarError::InvalidArgument(format!(
                "number of model parameters (rank) must be 1, 2 or 3, got {}",
                rank
            ))),
        }
    }
}

/// Linear map of an observed `[min, max]` interval onto `[-1, +1]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisBounds {
    pub min: f64,
    pub max: f64,
}

impl AxisBounds {
    pub fn from_values<I: IntoIterator<Item = f64>>(values: I) -> Self {
        values.into_iter().fold(
            AxisBounds { min: f64::INFINITY, max: f64::NEG_INFINITY },
            |b, v| AxisBounds { min: b.min.min(v), max: b.max.max(v) },
        )
    }

    pub fn span(&self) -> f64 {
        self.max - self.min
    }

    /// Map `v` into `[-1, +1]`; a zero-width interval maps everything to 0
    pub fn normalize(&self, v: f64) -> f64 {
        let span = self.span();
        if span > 0.0 {
            -1.0 + 2.0 * (v - self.min) / span
        } else {
            0.0
        }
    }
}

/// Result of a robust trend fit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendFit {
    pub rank: TrendRank,
    /// `[intercept, slope_x, slope_y]`, truncated to the rank, in normalized coordinates
    pub coefficients: Vec<f64>,
    /// Bounds used to normalize `x` (rank >= 2)
    pub x_bounds: Option<AxisBounds>,
    /// Bounds used to normalize `y` (rank 3)
    pub y_bounds: Option<AxisBounds>,
    pub iterations: usize,
    /// Reduced chi-squared of the retained fit
    pub chisq: f64,
    /// False when the iteration bound was reached before the F-test settled
    pub converged: bool,
    /// Robustness weights from the final iteration
    pub weights: Vec<f64>,
}

impl TrendFit {
    /// Evaluate the fitted trend at original (unnormalized) coordinates
    pub fn predict(&self, x: f64, y: f64) -> f64 {
        let mut z = self.coefficients[0];
        if let (Some(b), Some(slope)) = (self.x_bounds, self.coefficients.get(1)) {
            z += slope * b.normalize(x);
        }
        if let (Some(b), Some(slope)) = (self.y_bounds, self.coefficients.get(2)) {
            z += slope * b.normalize(y);
        }
        z
    }

    /// Mean squared error of the trend over a set of points
    pub fn mse(&self, points: &[ScatterPoint]) -> f64 {
        if points.is_empty() {
            return 0.0;
        }
        let sum: f64 = points
            .iter()
            .map(|p| {
                let e = p.z - self.predict(p.x, p.y);
                e * e
            })
            .sum();
        sum / points.len() as f64
    }
}

/// Robustness weight of a residual given the scale threshold `k`.
///
/// Residuals at or below `k` keep full weight; above it the weight is
/// `2k/r - k^2/r^2`, which stays within (0, 1) and decreases with `r`.
pub fn robust_weight(abs_residual: f64, k: f64) -> f64 {
    if abs_residual <= k {
        1.0
    } else {
        2.0 * k / abs_residual - (k * k) / (abs_residual * abs_residual)
    }
}

/// Iteratively reweighted least-squares fitter for constant, linear or
/// planar trends through scattered `(x, y, z)` data.
pub struct RobustTrendFitter {
    params: RobustTrendParams,
}

impl Default for RobustTrendFitter {
    fn default() -> Self {
        Self::standard()
    }
}

impl RobustTrendFitter {
    pub fn new(params: RobustTrendParams) -> Self {
        Self { params }
    }

    /// Fitter with the standard M-estimator settings
    pub fn standard() -> Self {
        Self::new(RobustTrendParams::default())
    }

    pub fn params(&self) -> &RobustTrendParams {
        &self.params
    }

    /// Fit a trend of the given rank (1, 2 or 3) to `points`
    pub fn fit(&self, points: &[ScatterPoint], rank: usize) -> SarResult<TrendFit> {
        let rank = TrendRank::try_from(rank)?;
        self.fit_rank(points, rank)
    }

    pub fn fit_rank(&self, points: &[ScatterPoint], rank: TrendRank) -> SarResult<TrendFit> {
        let n = points.len();
        if n < MIN_TREND_POINTS {
            return Err(SarError::InsufficientData { found: n, required: MIN_TREND_POINTS });
        }
        if self.params.max_iterations == 0 {
            return Err(SarError::InvalidArgument(
                "max_iterations must be at least 1".to_string(),
            ));
        }

        log::debug!("Robust {:?} trend fit over {} points", rank, n);

        let x_bounds = match rank {
            TrendRank::Constant => None,
            _ => Some(AxisBounds::from_values(points.iter().map(|p| p.x))),
        };
        let y_bounds = match rank {
            TrendRank::Planar => Some(AxisBounds::from_values(points.iter().map(|p| p.y))),
            _ => None,
        };

        // One row of normalized regressors per point
        let regressors: Vec<Vec<f64>> = points
            .iter()
            .map(|p| {
                let mut row = Vec::with_capacity(2);
                if let Some(b) = x_bounds {
                    row.push(b.normalize(p.x));
                }
                if let Some(b) = y_bounds {
                    row.push(b.normalize(p.y));
                }
                row
            })
            .collect();
        let z: Vec<f64> = points.iter().map(|p| p.z).collect();

        let nu = (n - 3) as f64;
        let mut weights = vec![1.0; n];
        let mut residuals = vec![0.0; n];
        let mut prev_chisq: Option<f64> = None;
        let mut retained: Option<(Vec<f64>, f64)> = None;
        let mut iterations = 0;
        let mut converged = false;

        while iterations < self.params.max_iterations {
            iterations += 1;

            let coefficients = weighted_least_squares(&regressors, &z, &weights)?;

            for (i, row) in regressors.iter().enumerate() {
                residuals[i] = (z[i] - evaluate(&coefficients, row)).abs();
            }

            let chisq = residuals
                .iter()
                .zip(weights.iter())
                .map(|(r, w)| r * r * w)
                .sum::<f64>()
                / nu;
            if !chisq.is_finite() {
                return Err(SarError::Processing(format!(
                    "non-finite chi-squared at iteration {}",
                    iterations
                )));
            }

            let k = self.params.tuning * self.params.mad_scale * median(&residuals);
            for (w, &r) in weights.iter_mut().zip(residuals.iter()) {
                *w = robust_weight(r, k);
            }

            let sig = match prev_chisq {
                None => 1.0,
                Some(prev) => f_test_q(chisq, nu, prev, nu)?,
            };

            // Fall back to the previous model unless chi-squared improved
            if prev_chisq.map_or(true, |prev| prev > chisq) {
                retained = Some((coefficients, chisq));
            }

            log::debug!(
                "Iteration {}: chisq={:.6e}, k={:.6e}, significance={:.4}",
                iterations, chisq, k, sig
            );

            prev_chisq = Some(chisq);
            // An exact fit cannot improve further
            if chisq == 0.0 || sig < self.params.significance_threshold {
                converged = true;
                break;
            }
        }

        if !converged {
            log::warn!(
                "Robust trend fit stopped at the {} iteration bound without converging",
                self.params.max_iterations
            );
        }

        let (mut coefficients, chisq) = retained.ok_or_else(|| {
            SarError::Processing("robust trend fit produced no model".to_string())
        })?;
        coefficients.truncate(rank.coefficient_count());

        Ok(TrendFit {
            rank,
            coefficients,
            x_bounds,
            y_bounds,
            iterations,
            chisq,
            converged,
            weights,
        })
    }
}

/// Robust trend coefficients `[intercept, slope_x, slope_y]` (truncated to
/// `rank`) of `data` in normalized coordinates, with standard settings.
pub fn robust_trend2d(data: &[ScatterPoint], rank: usize) -> SarResult<Vec<f64>> {
    RobustTrendFitter::standard()
        .fit(data, rank)
        .map(|fit| fit.coefficients)
}

fn evaluate(coefficients: &[f64], row: &[f64]) -> f64 {
    coefficients[0]
        + coefficients[1..]
            .iter()
            .zip(row.iter())
            .map(|(c, v)| c * v)
            .sum::<f64>()
}

/// Weighted least squares with intercept, solved on weighted-mean centred
/// data. Returns `[intercept, slopes...]`. Rank-deficient systems get the
/// minimum-norm solution, so a constant regressor gets a zero slope.
fn weighted_least_squares(regressors: &[Vec<f64>], z: &[f64], weights: &[f64]) -> SarResult<Vec<f64>> {
    let p = regressors.first().map_or(0, |row| row.len());

    let sum_w: f64 = weights.iter().sum();
    if !(sum_w > 0.0) {
        return Err(SarError::Processing(format!(
            "weights must have a positive sum, got {}",
            sum_w
        )));
    }

    let z_mean = z.iter().zip(weights).map(|(v, w)| v * w).sum::<f64>() / sum_w;
    let mut x_mean = vec![0.0; p];
    for (row, w) in regressors.iter().zip(weights) {
        for (m, v) in x_mean.iter_mut().zip(row) {
            *m += w * v;
        }
    }
    for m in x_mean.iter_mut() {
        *m /= sum_w;
    }

    // Centred normal equations A beta = b
    let mut a = [[0.0; 2]; 2];
    let mut b = [0.0; 2];
    for ((row, &zi), &w) in regressors.iter().zip(z).zip(weights) {
        let dz = zi - z_mean;
        for j in 0..p {
            let dj = row[j] - x_mean[j];
            b[j] += w * dj * dz;
            for l in 0..p {
                a[j][l] += w * dj * (row[l] - x_mean[l]);
            }
        }
    }

    let slopes = match p {
        0 => Vec::new(),
        1 => vec![if a[0][0] > 0.0 { b[0] / a[0][0] } else { 0.0 }],
        _ => solve_symmetric_2x2(a, b).to_vec(),
    };

    let intercept = z_mean - slopes.iter().zip(&x_mean).map(|(s, m)| s * m).sum::<f64>();

    let mut coefficients = Vec::with_capacity(p + 1);
    coefficients.push(intercept);
    coefficients.extend(slopes);
    Ok(coefficients)
}

fn solve_symmetric_2x2(a: [[f64; 2]; 2], b: [f64; 2]) -> [f64; 2] {
    let det = a[0][0] * a[1][1] - a[0][1] * a[1][0];
    let trace = a[0][0] + a[1][1];
    if trace <= 0.0 {
        return [0.0, 0.0];
    }
    if det.abs() > 1e-12 * trace * trace {
        return [
            (a[1][1] * b[0] - a[0][1] * b[1]) / det,
            (a[0][0] * b[1] - a[1][0] * b[0]) / det,
        ];
    }

    // Singular PSD matrix: A = trace * v v^T, pseudo-inverse gives v (v.b) / trace
    let v = if a[0][0] >= a[1][1] {
        [a[0][0], a[1][0]]
    } else {
        [a[0][1], a[1][1]]
    };
    let norm = (v[0] * v[0] + v[1] * v[1]).sqrt();
    let v = [v[0] / norm, v[1] / norm];
    let proj = (v[0] * b[0] + v[1] * b[1]) / trace;
    [v[0] * proj, v[1] * proj]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plane(n: usize, a: f64, bx: f64, cy: f64) -> Vec<ScatterPoint> {
        (0..n)
            .map(|i| {
                let x = (i % 10) as f64 * 10.0;
                let y = (i / 10) as f64 * 25.0;
                ScatterPoint::new(x, y, a + bx * x + cy * y)
            })
            .collect()
    }

    #[test]
    fn test_rank_validation() {
        assert!(TrendRank::try_from(0).is_err());
        assert!(TrendRank::try_from(4).is_err());
        assert_eq!(TrendRank::try_from(3).unwrap(), TrendRank::Planar);
    }

    #[test]
    fn test_axis_bounds_normalize() {
        let b = AxisBounds::from_values(vec![10.0, 30.0, 20.0]);
        assert_eq!(b.normalize(10.0), -1.0);
        assert_eq!(b.normalize(30.0), 1.0);
        assert_eq!(b.normalize(20.0), 0.0);
        let flat = AxisBounds::from_values(vec![5.0, 5.0]);
        assert_eq!(flat.normalize(5.0), 0.0);
    }

    #[test]
    fn test_weighted_least_squares_exact_line() {
        let regressors: Vec<Vec<f64>> = (0..5).map(|i| vec![i as f64]).collect();
        let z: Vec<f64> = (0..5).map(|i| 1.0 + 2.0 * i as f64).collect();
        let coef = weighted_least_squares(&regressors, &z, &[1.0; 5]).unwrap();
        assert!((coef[0] - 1.0).abs() < 1e-12);
        assert!((coef[1] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_weighted_least_squares_collinear_columns() {
        // Identical columns: minimum-norm solution splits the slope evenly
        let regressors: Vec<Vec<f64>> = (0..6).map(|i| vec![i as f64, i as f64]).collect();
        let z: Vec<f64> = (0..6).map(|i| 3.0 * i as f64).collect();
        let coef = weighted_least_squares(&regressors, &z, &[1.0; 6]).unwrap();
        assert!((coef[1] - 1.5).abs() < 1e-9);
        assert!((coef[2] - 1.5).abs() < 1e-9);
        assert!(coef[0].abs() < 1e-9);
    }

    #[test]
    fn test_robust_weight_bounds() {
        assert_eq!(robust_weight(0.5, 1.0), 1.0);
        assert_eq!(robust_weight(1.0, 1.0), 1.0);
        let w = robust_weight(4.0, 1.0);
        assert!((w - (0.5 - 1.0 / 16.0)).abs() < 1e-12);
        assert_eq!(robust_weight(1.0, 0.0), 0.0);
    }

    #[test]
    fn test_fit_recovers_plane() {
        let points = plane(40, 3.0, 0.05, -0.02);
        let fit = RobustTrendFitter::standard().fit(&points, 3).unwrap();
        assert_eq!(fit.coefficients.len(), 3);
        for p in &points {
            assert!((fit.predict(p.x, p.y) - p.z).abs() < 1e-8);
        }
        assert!(fit.mse(&points) < 1e-12);
    }

    #[test]
    fn test_too_few_points() {
        let points = plane(3, 1.0, 0.0, 0.0);
        match RobustTrendFitter::standard().fit(&points, 1) {
            Err(SarError::InsufficientData { found, required }) => {
                assert_eq!(found, 3);
                assert_eq!(required, MIN_TREND_POINTS);
            }
            other => panic!("expected InsufficientData, got {:?}", other),
        }
    }
}
