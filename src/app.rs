use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{info, warn};

use crate::dictionary::{self, RenameOutcome};
use crate::domain::{AcademicYear, YearRange};
use crate::error::SfaError;
use crate::fs_util;
use crate::institutions;
use crate::merge;
use crate::nces::{self, NcesClient};
use crate::schema;
use crate::select;
use crate::store::{ArchiveMetadata, SfaStore};
use crate::table::Table;

#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub force: bool,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchResult {
    pub items: Vec<FetchItemResult>,
    pub downloaded: usize,
    pub unchanged: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchItemResult {
    pub year: String,
    pub archive: String,
    pub action: String,
    pub remote_size: Option<u64>,
    pub local_path: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CombineResult {
    pub files_selected: usize,
    pub common_columns: usize,
    pub rows: usize,
    pub output: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RenameResult {
    pub applied: bool,
    pub dictionary: Option<String>,
    pub renamed_columns: usize,
    pub output: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct JoinResult {
    pub joined: bool,
    pub reference_institutions: usize,
    pub matched_rows: usize,
    pub rows: usize,
    pub output: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub fetch: FetchResult,
    pub combine: CombineResult,
    pub rename: RenameResult,
    pub join: JoinResult,
}

#[derive(Clone)]
pub struct App<C: NcesClient> {
    store: SfaStore,
    client: C,
}

impl<C: NcesClient> App<C> {
    pub fn new(store: SfaStore, client: C) -> Self {
        Self { store, client }
    }

    pub fn fetch(&self, range: &YearRange, options: FetchOptions) -> Result<FetchResult, SfaError> {
        if !options.dry_run {
            self.store.ensure_layout()?;
        }

        let mut items = Vec::new();
        for year in range.years() {
            items.push(self.fetch_year(&year, &options));
        }

        let downloaded = items
            .iter()
            .filter(|item| item.action == "download")
            .count();
        let unchanged = items
            .iter()
            .filter(|item| item.action == "unchanged")
            .count();
        let skipped = items
            .iter()
            .filter(|item| item.action.starts_with("skipped"))
            .count();
        info!(
            "fetch finished: {} downloaded, {} unchanged, {} skipped",
            downloaded, unchanged, skipped
        );
        Ok(FetchResult {
            items,
            downloaded,
            unchanged,
            skipped,
        })
    }

    fn fetch_year(&self, year: &AcademicYear, options: &FetchOptions) -> FetchItemResult {
        let archive = nces::survey_archive_name(year);
        let url = nces::survey_url(year);
        let path = self.store.survey_archive_path(&archive);

        let probe = match self.client.probe(&url) {
            Ok(probe) => probe,
            Err(err) => {
                warn!("probe failed for {}: {}", url, err);
                return Self::fetch_item(year, &archive, "skipped-error", None, None);
            }
        };

        if !probe.available() {
            info!("{} is not published (status {})", archive, probe.status);
            return Self::fetch_item(year, &archive, "skipped-missing", None, None);
        }

        let remote_size = match probe.size {
            Some(size) => size,
            None => {
                warn!(
                    "no content length for {}; cannot compare against the local copy",
                    url
                );
                return Self::fetch_item(year, &archive, "skipped-error", None, None);
            }
        };

        if !options.force && SfaStore::local_size(&path) == Some(remote_size) {
            if !options.dry_run {
                match fs_util::extract_zip(
                    path.as_std_path(),
                    self.store.survey_dir().as_std_path(),
                ) {
                    Ok(_) => info!("{} unchanged ({} bytes)", archive, remote_size),
                    Err(err) => warn!("could not refresh extraction of {}: {}", path, err),
                }
            }
            return Self::fetch_item(year, &archive, "unchanged", Some(remote_size), Some(&path));
        }

        if options.dry_run {
            return Self::fetch_item(year, &archive, "would-download", Some(remote_size), None);
        }

        if let Err(err) = nces::download_archive(&self.client, &url, &path) {
            warn!("download failed for {}: {}", url, err);
            return Self::fetch_item(year, &archive, "skipped-error", Some(remote_size), None);
        }

        let metadata = ArchiveMetadata {
            archive: archive.clone(),
            source_url: url.clone(),
            size: remote_size,
            downloaded_at: iso_timestamp(),
            tool: format!("ipeds-sfa/{}", env!("CARGO_PKG_VERSION")),
        };
        if let Err(err) = SfaStore::write_metadata(&SfaStore::metadata_path(&path), &metadata) {
            warn!("could not record metadata for {}: {}", archive, err);
        }

        match fs_util::extract_zip(path.as_std_path(), self.store.survey_dir().as_std_path()) {
            Ok(members) => {
                info!("downloaded {} and extracted {} files", archive, members.len());
            }
            Err(err) => {
                warn!("could not extract {}: {}", path, err);
                return Self::fetch_item(
                    year,
                    &archive,
                    "skipped-error",
                    Some(remote_size),
                    Some(&path),
                );
            }
        }

        Self::fetch_item(year, &archive, "download", Some(remote_size), Some(&path))
    }

    fn fetch_item(
        year: &AcademicYear,
        archive: &str,
        action: &str,
        remote_size: Option<u64>,
        local_path: Option<&Utf8Path>,
    ) -> FetchItemResult {
        FetchItemResult {
            year: year.label(),
            archive: archive.to_string(),
            action: action.to_string(),
            remote_size,
            local_path: local_path.map(|path| path.to_string()),
        }
    }

    pub fn combine(&self) -> Result<CombineResult, SfaError> {
        let (_, result) = self.combine_stage()?;
        Ok(result)
    }

    pub fn rename(&self) -> Result<RenameResult, SfaError> {
        let merged_path = self.store.merged_csv_path();
        if SfaStore::local_size(&merged_path).is_none() {
            return Err(SfaError::MissingInput(merged_path.to_string()));
        }
        let mut table = Table::from_csv(&merged_path)?;
        let (_, result) = self.rename_stage(&mut table)?;
        Ok(result)
    }

    pub fn join(&self) -> Result<JoinResult, SfaError> {
        let renamed_path = self.store.renamed_csv_path();
        if SfaStore::local_size(&renamed_path).is_none() {
            return Err(SfaError::MissingInput(renamed_path.to_string()));
        }
        let mut table = Table::from_csv(&renamed_path)?;
        let outcome = match dictionary::resolve(&self.client, &self.store) {
            Some(source) => RenameOutcome::Applied(source.map),
            None => RenameOutcome::NotApplied,
        };
        self.join_stage(&mut table, &outcome)
    }

    pub fn run(&self, range: &YearRange, options: FetchOptions) -> Result<RunResult, SfaError> {
        let fetch = self.fetch(range, options)?;
        let (mut table, combine) = self.combine_stage()?;
        let (outcome, rename) = self.rename_stage(&mut table)?;
        let join = self.join_stage(&mut table, &outcome)?;
        Ok(RunResult {
            fetch,
            combine,
            rename,
            join,
        })
    }

    fn combine_stage(&self) -> Result<(Table, CombineResult), SfaError> {
        self.store.ensure_layout()?;
        let survey_dir = self.store.survey_dir();
        let selection = select::select_survey_files(&survey_dir)?;
        if selection.is_empty() {
            return Err(SfaError::NoSurveyFiles(survey_dir.to_string()));
        }

        let paths: Vec<Utf8PathBuf> = selection
            .values()
            .map(|candidate| candidate.path.clone())
            .collect();
        let common = schema::common_columns(&paths)?;
        info!(
            "{} columns shared by {} selected files",
            common.len(),
            selection.len()
        );

        let table = merge::merge_files(&selection, &common)?;
        let output = self.store.merged_csv_path();
        SfaStore::write_bytes_atomic(&output, &table.to_csv_bytes()?)?;
        info!("wrote {} rows to {}", table.row_count(), output);

        let result = CombineResult {
            files_selected: selection.len(),
            common_columns: common.len(),
            rows: table.row_count(),
            output: output.to_string(),
        };
        Ok((table, result))
    }

    fn rename_stage(&self, table: &mut Table) -> Result<(RenameOutcome, RenameResult), SfaError> {
        let (outcome, dictionary_path, renamed_columns) =
            match dictionary::resolve(&self.client, &self.store) {
                Some(source) => {
                    let renamed = source.map.apply(table);
                    info!("relabelled {} columns using {}", renamed, source.path);
                    (
                        RenameOutcome::Applied(source.map),
                        Some(source.path.to_string()),
                        renamed,
                    )
                }
                None => {
                    info!("no usable dictionary; columns keep their short names");
                    (RenameOutcome::NotApplied, None, 0)
                }
            };

        let output = self.store.renamed_csv_path();
        SfaStore::write_bytes_atomic(&output, &table.to_csv_bytes()?)?;
        info!("wrote {} rows to {}", table.row_count(), output);

        let result = RenameResult {
            applied: matches!(outcome, RenameOutcome::Applied(_)),
            dictionary: dictionary_path,
            renamed_columns,
            output: output.to_string(),
        };
        Ok((outcome, result))
    }

    fn join_stage(&self, table: &mut Table, rename: &RenameOutcome) -> Result<JoinResult, SfaError> {
        let reference = match institutions::resolve(&self.client, &self.store)? {
            Some(reference) => reference,
            None => {
                warn!("no institution reference available; skipping the name join");
                return Ok(JoinResult {
                    joined: false,
                    reference_institutions: 0,
                    matched_rows: 0,
                    rows: table.row_count(),
                    output: None,
                });
            }
        };

        let matched = institutions::attach_names(table, &reference, rename)?;
        let output = self.store.named_csv_path();
        SfaStore::write_bytes_atomic(&output, &table.to_csv_bytes()?)?;
        info!(
            "matched {} of {} rows against {} institutions",
            matched,
            table.row_count(),
            reference.len()
        );

        Ok(JoinResult {
            joined: true,
            reference_institutions: reference.len(),
            matched_rows: matched,
            rows: table.row_count(),
            output: Some(output.to_string()),
        })
    }
}

fn iso_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}
