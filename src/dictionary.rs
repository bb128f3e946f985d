use std::collections::BTreeMap;

use calamine::Reader;
use camino::{Utf8Path, Utf8PathBuf};
use tracing::{info, warn};

use crate::domain::{self, AcademicYear};
use crate::fs_util;
use crate::nces::{self, NcesClient};
use crate::schema::normalize_column;
use crate::store::SfaStore;
use crate::table::Table;

const OLDEST_DICTIONARY_YEAR: u16 = 2013;

const VARNAME_COLUMN: &str = "varname";
const VARTITLE_COLUMN: &str = "vartitle";
const VARLIST_SHEET: &str = "varlist";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenameMap {
    labels: BTreeMap<String, String>,
}

impl RenameMap {
    pub fn insert(&mut self, varname: &str, vartitle: &str) {
        let short = normalize_column(varname);
        let title = vartitle.trim();
        if short.is_empty() || title.is_empty() {
            return;
        }
        let label = format!("{} - {}", short.to_uppercase(), title);
        if self.labels.insert(short.clone(), label).is_some() {
            warn!("duplicate dictionary entry for {}; keeping the last one", short);
        }
    }

    pub fn label_for(&self, column: &str) -> Option<&str> {
        self.labels.get(column).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn apply(&self, table: &mut Table) -> usize {
        table.rename_columns(|name| self.label_for(&normalize_column(name)).map(str::to_string))
    }
}

#[derive(Debug, Clone, Default)]
pub enum RenameOutcome {
    #[default]
    NotApplied,
    Applied(RenameMap),
}

impl RenameOutcome {
    pub fn applied_map(&self) -> Option<&RenameMap> {
        match self {
            RenameOutcome::Applied(map) => Some(map),
            RenameOutcome::NotApplied => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DictionarySource {
    pub path: Utf8PathBuf,
    pub map: RenameMap,
}

pub fn locate_dictionary<C: NcesClient + ?Sized>(
    client: &C,
    store: &SfaStore,
) -> Option<Utf8PathBuf> {
    for start in (OLDEST_DICTIONARY_YEAR..=domain::current_calendar_year()).rev() {
        let year = AcademicYear::from_start(start);
        let archive = nces::dictionary_archive_name(&year);
        let url = nces::dictionary_url(&year);
        let zip_path = store.dictionary_archive_path(&archive);

        match client.probe(&url) {
            Ok(info) if info.available() => {}
            Ok(_) => continue,
            Err(err) => {
                warn!("dictionary probe failed for {}: {}", url, err);
                continue;
            }
        }

        if SfaStore::local_size(&zip_path).is_none() {
            if let Err(err) = nces::download_archive(client, &url, &zip_path) {
                warn!("dictionary download failed for {}: {}", url, err);
                continue;
            }
        }

        match fs_util::extract_zip(zip_path.as_std_path(), store.dictionary_dir().as_std_path()) {
            Ok(members) => {
                let dictionary = members.into_iter().find(|member| {
                    member
                        .extension()
                        .map(|ext| {
                            ext.eq_ignore_ascii_case("xlsx") || ext.eq_ignore_ascii_case("csv")
                        })
                        .unwrap_or(false)
                });
                if let Some(dictionary) = dictionary {
                    info!("using dictionary {}", dictionary);
                    return Some(dictionary);
                }
                warn!("no xlsx or csv member inside {}", zip_path);
            }
            Err(err) => {
                warn!("could not extract {}: {}", zip_path, err);
            }
        }
    }
    warn!("no dictionary archive found in the probed range");
    None
}

pub fn load_mapping(path: &Utf8Path) -> Option<RenameMap> {
    let excel = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("xlsx"))
        .unwrap_or(false);
    if excel {
        load_excel_mapping(path)
    } else {
        load_csv_mapping(path)
    }
}

fn load_csv_mapping(path: &Utf8Path) -> Option<RenameMap> {
    let wanted = [VARNAME_COLUMN.to_string(), VARTITLE_COLUMN.to_string()];
    let table = match Table::from_csv_projected(path, &wanted) {
        Ok(table) => table,
        Err(err) => {
            warn!("unusable dictionary {}: {}", path, err);
            return None;
        }
    };
    let mut map = RenameMap::default();
    for row in table.rows() {
        map.insert(&row[0], &row[1]);
    }
    Some(map)
}

fn load_excel_mapping(path: &Utf8Path) -> Option<RenameMap> {
    let mut workbook = match calamine::open_workbook_auto(path.as_std_path()) {
        Ok(workbook) => workbook,
        Err(err) => {
            warn!("unusable dictionary {}: {}", path, err);
            return None;
        }
    };
    let sheet_names = workbook.sheet_names();
    let sheet = sheet_names
        .iter()
        .find(|name| name.eq_ignore_ascii_case(VARLIST_SHEET))
        .or_else(|| sheet_names.first())
        .cloned();
    let Some(sheet) = sheet else {
        warn!("unusable dictionary {}: workbook has no sheets", path);
        return None;
    };
    let range = match workbook.worksheet_range(&sheet) {
        Ok(range) => range,
        Err(err) => {
            warn!("unusable dictionary {}: {}", path, err);
            return None;
        }
    };
    let mut rows = range.rows();
    let header: Vec<String> = rows
        .next()
        .map(|row| {
            row.iter()
                .map(|cell| normalize_column(&cell.to_string()))
                .collect()
        })
        .unwrap_or_default();
    let name_index = header.iter().position(|column| column == VARNAME_COLUMN);
    let title_index = header.iter().position(|column| column == VARTITLE_COLUMN);
    let (Some(name_index), Some(title_index)) = (name_index, title_index) else {
        warn!(
            "unusable dictionary {}: missing {} or {} column",
            path, VARNAME_COLUMN, VARTITLE_COLUMN
        );
        return None;
    };
    let mut map = RenameMap::default();
    for row in rows {
        let varname = row
            .get(name_index)
            .map(ToString::to_string)
            .unwrap_or_default();
        let vartitle = row
            .get(title_index)
            .map(ToString::to_string)
            .unwrap_or_default();
        map.insert(&varname, &vartitle);
    }
    Some(map)
}

pub fn resolve<C: NcesClient + ?Sized>(client: &C, store: &SfaStore) -> Option<DictionarySource> {
    let path = locate_dictionary(client, store)?;
    let map = load_mapping(&path)?;
    Some(DictionarySource { path, map })
}
