use std::collections::BTreeMap;

use tracing::{info, warn};

use crate::domain::{self, AcademicYear};
use crate::error::SfaError;
use crate::select::CandidateFile;
use crate::table::Table;

pub const YEAR_COLUMN: &str = "year";

pub fn merge_files(
    selection: &BTreeMap<String, CandidateFile>,
    common: &[String],
) -> Result<Table, SfaError> {
    let mut columns = common.to_vec();
    if !columns.iter().any(|column| column == YEAR_COLUMN) {
        columns.push(YEAR_COLUMN.to_string());
    }
    let mut merged = Table::new(columns);

    let mut loaded = 0usize;
    for candidate in selection.values() {
        let mut table = match Table::from_csv_projected(&candidate.path, common) {
            Ok(table) => table,
            Err(err) => {
                warn!("excluding {} from the merge: {}", candidate.path, err);
                continue;
            }
        };
        let name = candidate.path.file_name().unwrap_or_default();
        let label = domain::year_label(AcademicYear::from_filename(name));
        table.set_constant_column(YEAR_COLUMN, &label);
        let rows = table.row_count();
        merged.extend_rows(table)?;
        info!("merged {} rows from {} as {}", rows, candidate.path, label);
        loaded += 1;
    }

    if loaded == 0 {
        return Err(SfaError::NoFilesLoaded);
    }
    Ok(merged)
}
