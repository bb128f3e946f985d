use std::fs;
use std::io;
use std::path::Path;

use camino::Utf8PathBuf;
use zip::ZipArchive;

use crate::error::SfaError;

pub fn extract_zip(zip_path: &Path, target_dir: &Path) -> Result<Vec<Utf8PathBuf>, SfaError> {
    let file = fs::File::open(zip_path)
        .map_err(|err| SfaError::Filesystem(format!("open zip {}: {err}", zip_path.display())))?;
    let mut archive = ZipArchive::new(file).map_err(|err| SfaError::Filesystem(err.to_string()))?;

    let mut extracted = Vec::new();
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| SfaError::Filesystem(err.to_string()))?;
        let entry_path = match entry.enclosed_name() {
            Some(path) => target_dir.join(path),
            None => {
                return Err(SfaError::Filesystem(
                    "zip entry path traversal detected".to_string(),
                ));
            }
        };

        if entry.is_dir() {
            fs::create_dir_all(&entry_path)
                .map_err(|err| SfaError::Filesystem(err.to_string()))?;
            continue;
        }

        if let Some(parent) = entry_path.parent() {
            fs::create_dir_all(parent).map_err(|err| SfaError::Filesystem(err.to_string()))?;
        }
        let mut outfile =
            fs::File::create(&entry_path).map_err(|err| SfaError::Filesystem(err.to_string()))?;
        io::copy(&mut entry, &mut outfile).map_err(|err| SfaError::Filesystem(err.to_string()))?;
        let entry_path = Utf8PathBuf::from_path_buf(entry_path)
            .map_err(|_| SfaError::Filesystem("non-utf8 zip entry path".to_string()))?;
        extracted.push(entry_path);
    }
    Ok(extracted)
}

pub fn validate_zip(zip_path: &Path) -> Result<(), SfaError> {
    let file = fs::File::open(zip_path)
        .map_err(|err| SfaError::Filesystem(format!("open zip {}: {err}", zip_path.display())))?;
    let mut archive = ZipArchive::new(file).map_err(|err| SfaError::Filesystem(err.to_string()))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| SfaError::Filesystem(err.to_string()))?;
        if entry.is_dir() {
            continue;
        }
        io::copy(&mut entry, &mut io::sink())
            .map_err(|err| SfaError::Filesystem(err.to_string()))?;
    }
    Ok(())
}
