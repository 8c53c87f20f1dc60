//! Core offset estimation modules

pub mod stats;
pub mod robust_trend;
pub mod fitoffset;

// Re-export main types
pub use robust_trend::{
    robust_trend2d, robust_weight, AxisBounds, RobustTrendFitter, RobustTrendParams, TrendFit,
    TrendRank,
};
pub use fitoffset::{
    fitoffset, split_shift, FitOffsetParams, MeasurementSource, OffsetEstimator, OffsetFit,
};
