//! Submitted CSV reading through Polars.
//!
//! Every column is read as text so monetary cells keep the exact characters
//! the agency sent; type decisions happen at staging, not at parse. Files at
//! or above a size threshold go through the lazy streaming engine instead of
//! the eager reader.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use polars::prelude::*;

use crate::error::{IngestError, Result};

/// Files at or above this size are read through the streaming engine.
pub const STREAMING_THRESHOLD_BYTES: u64 = 10 * 1024 * 1024;

/// Hard ceiling on submitted file size (500 MB).
pub const MAX_FILE_SIZE_BYTES: u64 = 500 * 1024 * 1024;

/// Checks the file exists and is under the size ceiling; returns its size.
pub fn check_file_size(path: &Path) -> Result<u64> {
    let metadata = std::fs::metadata(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            IngestError::FileNotFound {
                path: path.to_path_buf(),
            }
        } else {
            IngestError::FileRead {
                path: path.to_path_buf(),
                source: e,
            }
        }
    })?;

    if metadata.len() > MAX_FILE_SIZE_BYTES {
        return Err(IngestError::FileTooLarge {
            path: path.to_path_buf(),
            size: metadata.len(),
            max_size: MAX_FILE_SIZE_BYTES,
        });
    }

    Ok(metadata.len())
}

/// Whether a file of `size` bytes should go through the streaming engine.
pub fn should_stream(size: u64) -> bool {
    size >= STREAMING_THRESHOLD_BYTES
}

/// Rejects UTF-16 input by checking for its byte order marks. A UTF-8 BOM is
/// acceptable and stripped during header handling.
fn validate_encoding(path: &Path) -> Result<()> {
    let mut file = File::open(path).map_err(|e| IngestError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut buffer = [0u8; 4];
    let bytes_read = file.read(&mut buffer).map_err(|e| IngestError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    if bytes_read >= 2 {
        if buffer[0..2] == [0xFF, 0xFE] {
            return Err(IngestError::UnsupportedEncoding {
                path: path.to_path_buf(),
                encoding: "UTF-16 LE",
            });
        }
        if buffer[0..2] == [0xFE, 0xFF] {
            return Err(IngestError::UnsupportedEncoding {
                path: path.to_path_buf(),
                encoding: "UTF-16 BE",
            });
        }
    }

    Ok(())
}

/// Reads the first line and checks it holds at least one named column.
fn validate_header_line(path: &Path) -> Result<()> {
    let file = File::open(path).map_err(|e| IngestError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut reader = BufReader::new(file);
    let mut line = String::new();
    let read = reader
        .read_line(&mut line)
        .map_err(|e| IngestError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;

    if read == 0 {
        return Err(IngestError::EmptyCsv {
            path: path.to_path_buf(),
        });
    }

    let cleaned = line.strip_prefix('\u{feff}').unwrap_or(&line);
    if cleaned.trim().is_empty() {
        return Err(IngestError::NoHeaderDetected {
            path: path.to_path_buf(),
        });
    }

    Ok(())
}

fn read_eager(path: &Path) -> Result<DataFrame> {
    CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .map_err(|e| IngestError::CsvParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?
        .finish()
        .map_err(|e| IngestError::CsvParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

fn read_streaming(path: &Path) -> Result<DataFrame> {
    let path_str = path.to_string_lossy().to_string();
    LazyCsvReader::new(PlPath::new(&path_str))
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .with_low_memory(true)
        .finish()
        .map_err(|e| IngestError::CsvParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?
        .collect()
        .map_err(|e| IngestError::CsvParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

/// Reads a submitted CSV with every column typed as text.
///
/// A header row is required; zero data rows is not an error (an agency can
/// legitimately submit a file with no award activity).
pub fn read_submitted_csv(path: &Path) -> Result<DataFrame> {
    let size = check_file_size(path)?;
    validate_encoding(path)?;
    validate_header_line(path)?;

    let df = if should_stream(size) {
        tracing::debug!(
            path = %path.display(),
            size,
            "reading submission through the streaming engine"
        );
        read_streaming(path)?
    } else {
        read_eager(path)?
    };

    for name in df.get_column_names() {
        if name.trim().is_empty() {
            return Err(IngestError::EmptyColumnName {
                path: path.to_path_buf(),
            });
        }
    }

    tracing::debug!(
        path = %path.display(),
        rows = df.height(),
        columns = df.width(),
        "submitted file read"
    );
    Ok(df)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn temp_csv(content: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content).unwrap();
        file
    }

    #[test]
    fn columns_stay_text_and_leading_zeros_survive() {
        let file = temp_csv(b"AgencyIdentifier,Amount\n097,12.50\n021,0\n");
        let df = read_submitted_csv(file.path()).unwrap();

        let col = df.column("AgencyIdentifier").unwrap();
        let cast = col.cast(&DataType::String).unwrap();
        let values = cast.str().unwrap();
        assert_eq!(values.get(0), Some("097"));
        assert_eq!(values.get(1), Some("021"));
    }

    #[test]
    fn utf16_files_are_rejected() {
        let file = temp_csv(&[0xFF, 0xFE, 0x41, 0x00]);
        let err = read_submitted_csv(file.path()).unwrap_err();
        assert!(matches!(
            err,
            IngestError::UnsupportedEncoding {
                encoding: "UTF-16 LE",
                ..
            }
        ));
    }

    #[test]
    fn empty_file_is_reported_as_empty() {
        let file = temp_csv(b"");
        let err = read_submitted_csv(file.path()).unwrap_err();
        assert!(matches!(err, IngestError::EmptyCsv { .. }));
    }

    #[test]
    fn blank_first_line_has_no_header() {
        let file = temp_csv(b"   \nPIID,FAIN\n");
        let err = read_submitted_csv(file.path()).unwrap_err();
        assert!(matches!(err, IngestError::NoHeaderDetected { .. }));
    }

    #[test]
    fn header_only_file_reads_as_zero_rows() {
        let file = temp_csv(b"PIID,FAIN,URI\n");
        let df = read_submitted_csv(file.path()).unwrap();
        assert_eq!(df.height(), 0);
        assert_eq!(df.width(), 3);
    }

    #[test]
    fn utf8_bom_is_tolerated() {
        let file = temp_csv("\u{feff}PIID,FAIN\nabc,def\n".as_bytes());
        let df = read_submitted_csv(file.path()).unwrap();
        assert_eq!(df.height(), 1);
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = read_submitted_csv(Path::new("/nonexistent/file_c.csv")).unwrap_err();
        assert!(matches!(err, IngestError::FileNotFound { .. }));
    }

    #[test]
    fn streaming_cutover_is_at_the_threshold() {
        assert!(!should_stream(STREAMING_THRESHOLD_BYTES - 1));
        assert!(should_stream(STREAMING_THRESHOLD_BYTES));
    }
}
