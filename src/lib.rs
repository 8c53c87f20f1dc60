//! sarfit: robust trend fitting and co-registration offset estimation
//!
//! Fits range and azimuth offsets measured by cross-correlating two SLC
//! images with an iteratively reweighted least-squares trend, and converts
//! the fit into the shift and stretch parameters GMTSAR stores in PRM files.

pub mod types;
pub mod io;
pub mod core;

// Re-export main types and functions for easier access
pub use types::{OffsetMatrix, OffsetParameters, SarError, SarResult, ScatterPoint};

pub use crate::core::{
    fitoffset, robust_trend2d, FitOffsetParams, OffsetEstimator, RobustTrendFitter,
    RobustTrendParams, TrendFit, TrendRank,
};
pub use crate::io::OffsetReader;
