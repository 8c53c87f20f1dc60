use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Raw correlation-offset table (`freq_xcorr.dat` layout), one row per
/// correlation window:
/// `[range_pixel, range_offset, azimuth_pixel, azimuth_offset, snr, ...]`
pub type OffsetMatrix = Array2<f64>;

/// Column layout of an offset table
pub const COL_RANGE_PIXEL: usize = 0;
pub const COL_RANGE_OFFSET: usize = 1;
pub const COL_AZIMUTH_PIXEL: usize = 2;
pub const COL_AZIMUTH_OFFSET: usize = 3;
pub const COL_SNR: usize = 4;

/// Minimum number of columns an offset table must carry
pub const OFFSET_MATRIX_COLUMNS: usize = 5;

/// One scattered measurement `z` observed at `(x, y)`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScatterPoint {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl ScatterPoint {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

impl From<(f64, f64, f64)> for ScatterPoint {
    fn from((x, y, z): (f64, f64, f64)) -> Self {
        Self { x, y, z }
    }
}

/// Co-registration parameters between a reference and a repeat SLC.
///
/// Shifts are split into an integer pixel part and a sub-pixel fraction in
/// [0, 1); stretches are per-pixel rates along range (`stretch_*`) and
/// azimuth (`a_stretch_*`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OffsetParameters {
    pub rshift: i64,
    pub sub_int_r: f64,
    pub stretch_r: f64,
    pub a_stretch_r: f64,
    pub ashift: i64,
    pub sub_int_a: f64,
    pub stretch_a: f64,
    pub a_stretch_a: f64,
}

impl OffsetParameters {
    /// Total range shift in pixels
    pub fn range_shift(&self) -> f64 {
        self.rshift as f64 + self.sub_int_r
    }

    /// Total azimuth shift in lines
    pub fn azimuth_shift(&self) -> f64 {
        self.ashift as f64 + self.sub_int_a
    }
}

/// Error types for offset estimation
#[derive(Debug, thiserror::Error)]
pub enum SarError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Insufficient data: {found} points available, at least {required} required")]
    InsufficientData { found: usize, required: usize },

    #[error("Processing error: {0}")]
    Processing(String),
}

/// Result type for SAR operations
pub type SarResult<T> = Result<T, SarError>;
