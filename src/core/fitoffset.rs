use crate::core::robust_trend::{AxisBounds, RobustTrendFitter, RobustTrendParams, TrendFit, TrendRank};
use crate::io::offset_reader::OffsetReader;
use crate::io::prm_format::round_general;
use crate::types::{
    OffsetMatrix, OffsetParameters, SarError, SarResult, ScatterPoint, COL_AZIMUTH_OFFSET,
    COL_AZIMUTH_PIXEL, COL_RANGE_OFFSET, COL_RANGE_PIXEL, COL_SNR, OFFSET_MATRIX_COLUMNS,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Offset estimation parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitOffsetParams {
    /// Rows with SNR at or below this value are discarded
    pub snr_threshold: f64,
    /// Minimum number of SNR-passing rows needed for a fit
    pub min_points: usize,
    /// Settings for the range and azimuth trend fits
    pub trend: RobustTrendParams,
}

impl Default for FitOffsetParams {
    fn default() -> Self {
        Self {
            snr_threshold: 20.0,
            min_points: 8,
            trend: RobustTrendParams::default(),
        }
    }
}

/// Where the raw offset table comes from
#[derive(Debug, Clone, Copy)]
pub enum MeasurementSource<'a> {
    Matrix(&'a OffsetMatrix),
    File(&'a Path),
}

impl<'a> MeasurementSource<'a> {
    /// Pick the source from a pair of optional inputs; exactly one must be set
    pub fn from_options(
        matrix: Option<&'a OffsetMatrix>,
        matrix_fromfile: Option<&'a Path>,
    ) -> SarResult<Self> {
        match (matrix, matrix_fromfile) {
            (Some(m), None) => Ok(MeasurementSource::Matrix(m)),
            (None, Some(p)) => Ok(MeasurementSource::File(p)),
            _ => Err(SarError::InvalidArgument(
                "exactly one of matrix or matrix_fromfile must be given".to_string(),
            )),
        }
    }
}

/// Split a shift into an integer pixel part and a fraction, floor style:
/// non-negative shifts truncate, negative shifts step one pixel further
/// down so the fraction is non-negative (-0.3 -> (-1, 0.7)).
pub fn split_shift(shift: f64) -> (i64, f64) {
    let whole = shift.trunc();
    let frac = shift - whole;
    if shift >= 0.0 {
        (whole as i64, frac)
    } else {
        (whole as i64 - 1, frac + 1.0)
    }
}

/// Range and azimuth trend fits behind an `OffsetParameters` record
#[derive(Debug, Clone)]
pub struct OffsetFit {
    pub parameters: OffsetParameters,
    pub range_fit: TrendFit,
    pub azimuth_fit: TrendFit,
    /// Number of rows that passed the SNR filter
    pub points_used: usize,
}

/// Estimates co-registration offsets between two SLCs from correlation
/// offsets measured on a grid of windows.
pub struct OffsetEstimator {
    params: FitOffsetParams,
}

impl Default for OffsetEstimator {
    fn default() -> Self {
        Self::standard()
    }
}

impl OffsetEstimator {
    pub fn new(params: FitOffsetParams) -> Self {
        Self { params }
    }

    pub fn standard() -> Self {
        Self::new(FitOffsetParams::default())
    }

    /// Estimator with the standard settings and a custom SNR cutoff
    pub fn with_snr_threshold(snr_threshold: f64) -> Self {
        Self::new(FitOffsetParams {
            snr_threshold,
            ..FitOffsetParams::default()
        })
    }

    pub fn params(&self) -> &FitOffsetParams {
        &self.params
    }

    /// Estimate offsets from either an in-memory table or a file
    pub fn estimate_from(
        &self,
        rank_rng: usize,
        rank_azi: usize,
        source: MeasurementSource<'_>,
    ) -> SarResult<OffsetParameters> {
        match source {
            MeasurementSource::Matrix(matrix) => self.estimate(rank_rng, rank_azi, matrix),
            MeasurementSource::File(path) => self.estimate_from_file(rank_rng, rank_azi, path),
        }
    }

    /// Estimate offsets from an offset table stored on disk
    pub fn estimate_from_file<P: AsRef<Path>>(
        &self,
        rank_rng: usize,
        rank_azi: usize,
        path: P,
    ) -> SarResult<OffsetParameters> {
        let matrix = OffsetReader::read_offset_file(path)?;
        self.estimate(rank_rng, rank_azi, &matrix)
    }

    /// Estimate offsets from an in-memory offset table
    pub fn estimate(
        &self,
        rank_rng: usize,
        rank_azi: usize,
        matrix: &OffsetMatrix,
    ) -> SarResult<OffsetParameters> {
        self.fit(rank_rng, rank_azi, matrix).map(|fit| fit.parameters)
    }

    /// Estimate offsets and keep the underlying trend fits
    pub fn fit(&self, rank_rng: usize, rank_azi: usize, matrix: &OffsetMatrix) -> SarResult<OffsetFit> {
        let rank_rng = TrendRank::try_from(rank_rng)?;
        let rank_azi = TrendRank::try_from(rank_azi)?;

        if matrix.ncols() < OFFSET_MATRIX_COLUMNS {
            return Err(SarError::InvalidArgument(format!(
                "offset table needs at least {} columns, got {}",
                OFFSET_MATRIX_COLUMNS,
                matrix.ncols()
            )));
        }

        log::info!(
            "Fitting offsets: {} rows, range rank {:?}, azimuth rank {:?}, SNR > {}",
            matrix.nrows(), rank_rng, rank_azi, self.params.snr_threshold
        );

        let (rng, azi) = self.select_points(matrix);
        if rng.len() < self.params.min_points {
            return Err(SarError::InsufficientData {
                found: rng.len(),
                required: self.params.min_points,
            });
        }
        log::debug!("{} of {} rows pass the SNR filter", rng.len(), matrix.nrows());

        // Both fits are rescaled with the range point set bounds
        let x_bounds = AxisBounds::from_values(rng.iter().map(|p| p.x));
        let y_bounds = AxisBounds::from_values(rng.iter().map(|p| p.y));
        let needs_x = rank_rng != TrendRank::Constant || rank_azi != TrendRank::Constant;
        let needs_y = rank_rng == TrendRank::Planar || rank_azi == TrendRank::Planar;
        if needs_x && x_bounds.span() <= 0.0 {
            return Err(SarError::InvalidArgument(
                "range pixel coordinates span zero width, cannot fit a range trend".to_string(),
            ));
        }
        if needs_y && y_bounds.span() <= 0.0 {
            return Err(SarError::InvalidArgument(
                "azimuth pixel coordinates span zero width, cannot fit an azimuth trend".to_string(),
            ));
        }

        let fitter = RobustTrendFitter::new(self.params.trend.clone());
        let range_fit = fitter.fit_rank(&rng, rank_rng)?;
        let azimuth_fit = fitter.fit_rank(&azi, rank_azi)?;

        let range = PhysicalTrend::from_coefficients(&range_fit.coefficients, x_bounds, y_bounds);
        let azimuth = PhysicalTrend::from_coefficients(&azimuth_fit.coefficients, x_bounds, y_bounds);

        let (rshift, sub_int_r) = split_shift(range.shift);
        let (ashift, sub_int_a) = split_shift(azimuth.shift);

        let parameters = OffsetParameters {
            rshift,
            sub_int_r: round_general(sub_int_r),
            stretch_r: round_general(range.stretch),
            a_stretch_r: round_general(range.a_stretch),
            ashift,
            sub_int_a: round_general(sub_int_a),
            stretch_a: round_general(azimuth.stretch),
            a_stretch_a: round_general(azimuth.a_stretch),
        };

        log::info!(
            "Offsets: range shift {:.4} (stretch {:e}), azimuth shift {:.4} (stretch {:e})",
            range.shift, range.stretch, azimuth.shift, azimuth.stretch
        );

        Ok(OffsetFit {
            parameters,
            range_fit,
            azimuth_fit,
            points_used: rng.len(),
        })
    }

    /// Estimate offsets for many independent tables (one per pair or
    /// subswath). Results are returned in input order.
    pub fn estimate_batch(
        &self,
        rank_rng: usize,
        rank_azi: usize,
        matrices: &[OffsetMatrix],
    ) -> Vec<SarResult<OffsetParameters>> {
        log::info!("Fitting offsets for {} tables", matrices.len());

        #[cfg(feature = "parallel")]
        let results: Vec<SarResult<OffsetParameters>> = {
            use rayon::prelude::*;
            matrices
                .par_iter()
                .map(|matrix| self.estimate(rank_rng, rank_azi, matrix))
                .collect()
        };

        #[cfg(not(feature = "parallel"))]
        let results: Vec<SarResult<OffsetParameters>> = matrices
            .iter()
            .map(|matrix| self.estimate(rank_rng, rank_azi, matrix))
            .collect();

        let failed = results.iter().filter(|r| r.is_err()).count();
        if failed > 0 {
            log::warn!("{} of {} offset tables could not be fitted", failed, matrices.len());
        }
        results
    }

    /// SNR-filtered range and azimuth point sets, both as
    /// `(x = range_pixel, y = azimuth_pixel, z = offset)`
    fn select_points(&self, matrix: &OffsetMatrix) -> (Vec<ScatterPoint>, Vec<ScatterPoint>) {
        matrix
            .rows()
            .into_iter()
            .filter(|row| row[COL_SNR] > self.params.snr_threshold)
            .map(|row| {
                let x = row[COL_RANGE_PIXEL];
                let y = row[COL_AZIMUTH_PIXEL];
                (
                    ScatterPoint::new(x, y, row[COL_RANGE_OFFSET]),
                    ScatterPoint::new(x, y, row[COL_AZIMUTH_OFFSET]),
                )
            })
            .unzip()
    }
}

/// Trend coefficients converted from normalized to pixel coordinates
struct PhysicalTrend {
    shift: f64,
    stretch: f64,
    a_stretch: f64,
}

impl PhysicalTrend {
    /// Slope terms absent from lower-rank fits count as zero
    fn from_coefficients(coef: &[f64], x: AxisBounds, y: AxisBounds) -> Self {
        let mut trend = PhysicalTrend {
            shift: coef[0],
            stretch: 0.0,
            a_stretch: 0.0,
        };
        if let Some(&slope_x) = coef.get(1) {
            trend.shift -= slope_x * (x.max + x.min) / x.span();
            trend.stretch = slope_x * 2.0 / x.span();
        }
        if let Some(&slope_y) = coef.get(2) {
            trend.shift -= slope_y * (y.max + y.min) / y.span();
            trend.a_stretch = slope_y * 2.0 / y.span();
        }
        trend
    }
}

/// Estimate offsets with standard settings from exactly one of an
/// in-memory table or a file
pub fn fitoffset(
    rank_rng: usize,
    rank_azi: usize,
    matrix: Option<&OffsetMatrix>,
    matrix_fromfile: Option<&Path>,
    snr_threshold: f64,
) -> SarResult<OffsetParameters> {
    let source = MeasurementSource::from_options(matrix, matrix_fromfile)?;
    OffsetEstimator::with_snr_threshold(snr_threshold).estimate_from(rank_rng, rank_azi, source)
}
