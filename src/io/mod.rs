//! I/O modules for offset tables and PRM parameter output

pub mod offset_reader;
pub mod prm_format;

pub use offset_reader::OffsetReader;
pub use prm_format::{format_general, round_general};
