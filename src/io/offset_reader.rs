use crate::types::{OffsetMatrix, SarResult, OFFSET_MATRIX_COLUMNS};
use ndarray::Array2;
use std::fs::File;
use std::io::{BufRead, BufReader, Error, ErrorKind, Read};
use std::path::Path;

/// Reader for whitespace-delimited correlation offset tables
/// (`freq_xcorr.dat` and friends).
///
/// Blank lines and `#` comments are skipped; every data row must have the
/// same number of columns, at least five.
pub struct OffsetReader;

impl OffsetReader {
    /// Read an offset table from disk
    pub fn read_offset_file<P: AsRef<Path>>(path: P) -> SarResult<OffsetMatrix> {
        log::info!("Reading offset table: {}", path.as_ref().display());
        let file = File::open(path.as_ref())?;
        Self::read_offset_table(file)
    }

    /// Read an offset table from any byte stream
    pub fn read_offset_table<R: Read>(reader: R) -> SarResult<OffsetMatrix> {
        let mut values = Vec::new();
        let mut ncols: Option<usize> = None;
        let mut nrows = 0;

        for (index, line) in BufReader::new(reader).lines().enumerate() {
            let line = line?;
            let line_no = index + 1;
            let content = line.split('#').next().unwrap_or("").trim();
            if content.is_empty() {
                continue;
            }

            let row = content
                .split_whitespace()
                .map(|token| {
                    token.parse::<f64>().map_err(|e| {
                        invalid_data(format!("line {}: cannot parse '{}': {}", line_no, token, e))
                    })
                })
                .collect::<Result<Vec<f64>, Error>>()?;

            match ncols {
                None if row.len() < OFFSET_MATRIX_COLUMNS => {
                    return Err(invalid_data(format!(
                        "line {}: expected at least {} columns, found {}",
                        line_no,
                        OFFSET_MATRIX_COLUMNS,
                        row.len()
                    ))
                    .into());
                }
                None => ncols = Some(row.len()),
                Some(n) if n != row.len() => {
                    return Err(invalid_data(format!(
                        "line {}: expected {} columns, found {}",
                        line_no,
                        n,
                        row.len()
                    ))
                    .into());
                }
                Some(_) => {}
            }

            values.extend(row);
            nrows += 1;
        }

        let ncols = ncols.unwrap_or(OFFSET_MATRIX_COLUMNS);
        log::debug!("Offset table: {} rows x {} columns", nrows, ncols);

        Array2::from_shape_vec((nrows, ncols), values)
            .map_err(|e| invalid_data(format!("failed to shape offset table: {}", e)).into())
    }
}

fn invalid_data(message: String) -> Error {
    Error::new(ErrorKind::InvalidData, message)
}
