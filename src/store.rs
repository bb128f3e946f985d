use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::error::SfaError;

#[derive(Debug, Clone)]
pub struct SfaStore {
    data_root: Utf8PathBuf,
}

impl SfaStore {
    pub fn new() -> Result<Self, SfaError> {
        let data_root = BaseDirs::new()
            .and_then(|dirs| Utf8PathBuf::from_path_buf(dirs.home_dir().join("IPEDS_Data")).ok())
            .ok_or_else(|| SfaError::Filesystem("unable to resolve data directory".to_string()))?;
        Ok(Self { data_root })
    }

    pub fn new_with_root(data_root: Utf8PathBuf) -> Self {
        Self { data_root }
    }

    pub fn data_root(&self) -> &Utf8Path {
        &self.data_root
    }

    pub fn survey_dir(&self) -> Utf8PathBuf {
        self.data_root.join("sfa")
    }

    pub fn dictionary_dir(&self) -> Utf8PathBuf {
        self.data_root.join("dict")
    }

    pub fn header_dir(&self) -> Utf8PathBuf {
        self.data_root.join("hd")
    }

    pub fn output_dir(&self) -> Utf8PathBuf {
        self.data_root.join("output")
    }

    pub fn survey_archive_path(&self, name: &str) -> Utf8PathBuf {
        self.survey_dir().join(name)
    }

    pub fn dictionary_archive_path(&self, name: &str) -> Utf8PathBuf {
        self.dictionary_dir().join(name)
    }

    pub fn header_archive_path(&self, name: &str) -> Utf8PathBuf {
        self.header_dir().join(name)
    }

    pub fn merged_csv_path(&self) -> Utf8PathBuf {
        self.output_dir().join("combined_ipeds_sfa.csv")
    }

    pub fn renamed_csv_path(&self) -> Utf8PathBuf {
        self.output_dir().join("combined_ipeds_sfa_renamed.csv")
    }

    pub fn named_csv_path(&self) -> Utf8PathBuf {
        self.output_dir().join("combined_ipeds_sfa_with_name.csv")
    }

    pub fn ensure_layout(&self) -> Result<(), SfaError> {
        for dir in [
            self.survey_dir(),
            self.dictionary_dir(),
            self.header_dir(),
            self.output_dir(),
        ] {
            fs::create_dir_all(dir.as_std_path())
                .map_err(|err| SfaError::Filesystem(err.to_string()))?;
        }
        Ok(())
    }

    pub fn local_size(path: &Utf8Path) -> Option<u64> {
        fs::metadata(path.as_std_path()).ok().map(|meta| meta.len())
    }

    pub fn metadata_path(archive_path: &Utf8Path) -> Utf8PathBuf {
        archive_path.with_extension("meta.json")
    }

    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), SfaError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent.as_std_path())
                .map_err(|err| SfaError::Filesystem(err.to_string()))?;
        }
        let tmp_path = path.with_extension("tmp");
        fs::write(tmp_path.as_std_path(), content)
            .map_err(|err| SfaError::Filesystem(err.to_string()))?;
        fs::rename(tmp_path.as_std_path(), path.as_std_path())
            .map_err(|err| SfaError::Filesystem(err.to_string()))?;
        Ok(())
    }

    pub fn write_metadata(path: &Utf8Path, metadata: &ArchiveMetadata) -> Result<(), SfaError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent.as_std_path())
                .map_err(|err| SfaError::Filesystem(err.to_string()))?;
        }
        let tmp_path = path.with_extension("json.tmp");
        let content = serde_json::to_vec_pretty(metadata)
            .map_err(|err| SfaError::Filesystem(err.to_string()))?;
        fs::write(tmp_path.as_std_path(), &content)
            .map_err(|err| SfaError::Filesystem(err.to_string()))?;
        fs::rename(tmp_path.as_std_path(), path.as_std_path())
            .map_err(|err| SfaError::Filesystem(err.to_string()))?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveMetadata {
    pub archive: String,
    pub source_url: String,
    pub size: u64,
    pub downloaded_at: String,
    pub tool: String,
}
