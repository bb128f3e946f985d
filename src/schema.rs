use std::fs::File;
use std::io::{BufRead, BufReader};

use camino::{Utf8Path, Utf8PathBuf};
use tracing::warn;

use crate::error::SfaError;

pub fn normalize_column(name: &str) -> String {
    name.trim().to_lowercase()
}

pub fn read_header_columns(path: &Utf8Path) -> Result<Vec<String>, SfaError> {
    let file = File::open(path.as_std_path())
        .map_err(|err| SfaError::Filesystem(format!("open {path}: {err}")))?;
    let mut reader = BufReader::new(file);
    let mut raw = Vec::new();
    reader
        .read_until(b'\n', &mut raw)
        .map_err(|err| SfaError::Filesystem(format!("read header of {path}: {err}")))?;
    let line = String::from_utf8_lossy(&raw);

    let mut columns = Vec::new();
    for field in line.split(',') {
        let normalized = normalize_column(field);
        if !columns.contains(&normalized) {
            columns.push(normalized);
        }
    }
    Ok(columns)
}

pub fn common_columns(paths: &[Utf8PathBuf]) -> Result<Vec<String>, SfaError> {
    let mut common: Option<Vec<String>> = None;
    for path in paths {
        let columns = match read_header_columns(path) {
            Ok(columns) => columns,
            Err(err) => {
                warn!("excluding {} from schema reconciliation: {}", path, err);
                continue;
            }
        };
        match common.as_mut() {
            None => common = Some(columns),
            Some(kept) => kept.retain(|name| columns.contains(name)),
        }
        if let Some(kept) = &common {
            if kept.is_empty() {
                return Err(SfaError::NoCommonColumns);
            }
        }
    }
    common
        .filter(|kept| !kept.is_empty())
        .ok_or(SfaError::NoCommonColumns)
}
