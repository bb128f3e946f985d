use std::collections::HashMap;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{info, warn};

use crate::dictionary::RenameOutcome;
use crate::domain;
use crate::error::SfaError;
use crate::fs_util;
use crate::nces::{self, NcesClient};
use crate::schema;
use crate::store::SfaStore;
use crate::table::Table;

pub const JOIN_KEY: &str = "unitid";
pub const NAME_COLUMN: &str = "instnm";

const OLDEST_HEADER_YEAR: u16 = 2011;

pub fn locate_header_file<C: NcesClient + ?Sized>(
    client: &C,
    store: &SfaStore,
) -> Option<Utf8PathBuf> {
    for year in (OLDEST_HEADER_YEAR..=domain::current_calendar_year()).rev() {
        let archive = nces::header_archive_name(year);
        let url = nces::header_url(year);
        let zip_path = store.header_archive_path(&archive);

        match client.probe(&url) {
            Ok(info) if info.available() => {}
            Ok(_) => continue,
            Err(err) => {
                warn!("header probe failed for {}: {}", url, err);
                continue;
            }
        }

        if SfaStore::local_size(&zip_path).is_none() {
            if let Err(err) = nces::download_archive(client, &url, &zip_path) {
                warn!("header download failed for {}: {}", url, err);
                continue;
            }
        }

        match fs_util::extract_zip(zip_path.as_std_path(), store.header_dir().as_std_path()) {
            Ok(members) => {
                let csv = members.into_iter().find(|member| is_header_csv(member));
                if let Some(csv) = csv {
                    info!("using institution reference {}", csv);
                    return Some(csv);
                }
                warn!("no hd csv member inside {}", zip_path);
            }
            Err(err) => {
                warn!("could not extract {}: {}", zip_path, err);
            }
        }
    }
    warn!("no header archive found in the probed range");
    None
}

fn is_header_csv(path: &Utf8Path) -> bool {
    match path.file_name() {
        Some(name) => {
            let name = name.to_lowercase();
            name.starts_with("hd") && name.ends_with(".csv")
        }
        None => false,
    }
}

#[derive(Debug, Clone, Default)]
pub struct InstitutionNames {
    names: HashMap<String, String>,
}

impl InstitutionNames {
    pub fn from_reference_csv(path: &Utf8Path) -> Result<Self, SfaError> {
        let header = schema::read_header_columns(path)?;
        for column in [JOIN_KEY, NAME_COLUMN] {
            if !header.iter().any(|name| name == column) {
                return Err(SfaError::MissingReferenceColumn(column.to_string()));
            }
        }

        let wanted = [JOIN_KEY.to_string(), NAME_COLUMN.to_string()];
        let table = Table::from_csv_projected(path, &wanted)?;
        let mut names = HashMap::new();
        for row in table.rows() {
            let unitid = row[0].trim();
            if unitid.is_empty() {
                continue;
            }
            names
                .entry(unitid.to_string())
                .or_insert_with(|| row[1].clone());
        }
        Ok(Self { names })
    }

    pub fn name_for(&self, unitid: &str) -> Option<&str> {
        self.names.get(unitid).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

pub fn resolve<C: NcesClient + ?Sized>(
    client: &C,
    store: &SfaStore,
) -> Result<Option<InstitutionNames>, SfaError> {
    match locate_header_file(client, store) {
        Some(path) => Ok(Some(InstitutionNames::from_reference_csv(&path)?)),
        None => Ok(None),
    }
}

pub fn attach_names(
    table: &mut Table,
    reference: &InstitutionNames,
    rename: &RenameOutcome,
) -> Result<usize, SfaError> {
    if let Some(map) = rename.applied_map() {
        if let Some(label) = map.label_for(JOIN_KEY) {
            if table.rename_column(label, JOIN_KEY) {
                info!("renamed {:?} back to {} for the join", label, JOIN_KEY);
            } else {
                warn!(
                    "column {:?} not found; falling back to a bare {} column",
                    label, JOIN_KEY
                );
            }
        }
    }

    let key_index = match table.column_index(JOIN_KEY) {
        Some(index) => index,
        None => return Err(SfaError::MissingJoinKey(JOIN_KEY.to_string())),
    };

    let mut matched = 0usize;
    table.push_column_with(NAME_COLUMN, |row| {
        match reference.name_for(row[key_index].trim()) {
            Some(name) => {
                matched += 1;
                name.to_string()
            }
            None => String::new(),
        }
    });
    Ok(matched)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use assert_matches::assert_matches;
    use camino::Utf8PathBuf;

    use super::*;
    use crate::dictionary::RenameMap;

    fn write_csv(dir: &std::path::Path, name: &str, content: &str) -> Utf8PathBuf {
        let path = Utf8PathBuf::from_path_buf(dir.join(name)).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn reference_keeps_first_name_per_identifier() {
        let temp = tempfile::tempdir().unwrap();
        let path = write_csv(
            temp.path(),
            "hd2023.csv",
            "UNITID,INSTNM,STABBR\n100654,Alabama A & M University,AL\n100654,Duplicate Entry,AL\n100663,University of Alabama at Birmingham,AL\n",
        );

        let reference = InstitutionNames::from_reference_csv(&path).unwrap();

        assert_eq!(reference.len(), 2);
        assert_eq!(
            reference.name_for("100654"),
            Some("Alabama A & M University")
        );
    }

    #[test]
    fn reference_requires_name_column() {
        let temp = tempfile::tempdir().unwrap();
        let path = write_csv(temp.path(), "hd2023.csv", "UNITID,STABBR\n100654,AL\n");

        let result = InstitutionNames::from_reference_csv(&path);

        assert_matches!(result, Err(SfaError::MissingReferenceColumn(column)) if column == "instnm");
    }

    #[test]
    fn join_leaves_unmatched_rows_blank() {
        let temp = tempfile::tempdir().unwrap();
        let reference_path = write_csv(
            temp.path(),
            "hd2023.csv",
            "UNITID,INSTNM\n1,Alpha College\n3,Gamma Institute\n",
        );
        let working_path = write_csv(
            temp.path(),
            "combined.csv",
            "unitid,year\n1,2013-2014\n2,2013-2014\n3,2013-2014\n",
        );
        let reference = InstitutionNames::from_reference_csv(&reference_path).unwrap();
        let mut table = Table::from_csv(&working_path).unwrap();

        let matched = attach_names(&mut table, &reference, &RenameOutcome::NotApplied).unwrap();

        assert_eq!(matched, 2);
        assert_eq!(table.columns(), ["unitid", "year", "instnm"]);
        let names: Vec<&str> = table.rows().iter().map(|row| row[2].as_str()).collect();
        assert_eq!(names, ["Alpha College", "", "Gamma Institute"]);
    }

    #[test]
    fn join_reverses_the_recorded_identifier_label() {
        let temp = tempfile::tempdir().unwrap();
        let reference_path = write_csv(temp.path(), "hd2023.csv", "UNITID,INSTNM\n1,Alpha College\n");
        let working_path = write_csv(
            temp.path(),
            "combined.csv",
            "UNITID - Unique identification number of the institution,year\n1,2013-2014\n",
        );
        let reference = InstitutionNames::from_reference_csv(&reference_path).unwrap();
        let mut table = Table::from_csv(&working_path).unwrap();
        let mut map = RenameMap::default();
        map.insert("unitid", "Unique identification number of the institution");

        let matched =
            attach_names(&mut table, &reference, &RenameOutcome::Applied(map)).unwrap();

        assert_eq!(matched, 1);
        assert_eq!(table.columns()[0], JOIN_KEY);
        assert_eq!(table.rows()[0][2], "Alpha College");
    }

    #[test]
    fn join_without_identifier_column_fails() {
        let temp = tempfile::tempdir().unwrap();
        let reference_path = write_csv(temp.path(), "hd2023.csv", "UNITID,INSTNM\n1,Alpha College\n");
        let working_path = write_csv(temp.path(), "combined.csv", "stabbr,year\nAL,2013-2014\n");
        let reference = InstitutionNames::from_reference_csv(&reference_path).unwrap();
        let mut table = Table::from_csv(&working_path).unwrap();

        let result = attach_names(&mut table, &reference, &RenameOutcome::NotApplied);

        assert_matches!(result, Err(SfaError::MissingJoinKey(key)) if key == JOIN_KEY);
    }

    #[test]
    fn header_csv_names() {
        assert!(is_header_csv(Utf8Path::new("/data/hd/hd2023.csv")));
        assert!(is_header_csv(Utf8Path::new("HD2023.CSV")));
        assert!(!is_header_csv(Utf8Path::new("/data/hd/hd2023.xlsx")));
        assert!(!is_header_csv(Utf8Path::new("/data/hd/sfa1314.csv")));
    }
}
