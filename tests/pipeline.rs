use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

use camino::Utf8PathBuf;
use rust_xlsxwriter::Workbook;
use zip::write::SimpleFileOptions;

use ipeds_sfa_pipeline::app::{App, FetchOptions};
use ipeds_sfa_pipeline::domain::{StartYear, YearRange};
use ipeds_sfa_pipeline::error::SfaError;
use ipeds_sfa_pipeline::nces::{self, NcesClient, ProbeInfo};
use ipeds_sfa_pipeline::store::SfaStore;

#[derive(Default, Clone)]
struct MockNces {
    archives: HashMap<String, Vec<u8>>,
    downloads: Arc<Mutex<Vec<String>>>,
}

impl MockNces {
    fn with_archive(mut self, name: &str, bytes: Vec<u8>) -> Self {
        self.archives
            .insert(format!("{}{}", nces::BASE_URL, name), bytes);
        self
    }

    fn download_count(&self) -> usize {
        self.downloads.lock().unwrap().len()
    }
}

impl NcesClient for MockNces {
    fn probe(&self, url: &str) -> Result<ProbeInfo, SfaError> {
        match self.archives.get(url) {
            Some(bytes) => Ok(ProbeInfo {
                status: 200,
                size: Some(bytes.len() as u64),
            }),
            None => Ok(ProbeInfo {
                status: 404,
                size: None,
            }),
        }
    }

    fn download(&self, url: &str, destination: &Path) -> Result<(), SfaError> {
        let bytes = self.archives.get(url).ok_or_else(|| SfaError::NcesStatus {
            status: 404,
            message: "not found".to_string(),
        })?;
        self.downloads.lock().unwrap().push(url.to_string());
        fs::write(destination, bytes).map_err(|err| SfaError::Filesystem(err.to_string()))
    }
}

fn zip_archive_raw(members: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for (name, content) in members {
        writer
            .start_file(*name, SimpleFileOptions::default())
            .unwrap();
        writer.write_all(content).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

fn zip_archive(members: &[(&str, &str)]) -> Vec<u8> {
    let raw: Vec<(&str, &[u8])> = members
        .iter()
        .map(|(name, content)| (*name, content.as_bytes()))
        .collect();
    zip_archive_raw(&raw)
}

fn survey_archives(client: MockNces) -> MockNces {
    client
        .with_archive(
            "SFA1314.zip",
            zip_archive(&[("sfa1314.csv", "UNITID,SCUGRAD,EXTRA_A\n1,100,x\n2,200,x\n")]),
        )
        .with_archive(
            "SFA1415.zip",
            zip_archive(&[
                ("sfa1415.csv", "UNITID,SCUGRAD\n8,800\n"),
                ("sfa1415_rv.csv", "UNITID,SCUGRAD,EXTRA_B\n9,900,y\n"),
            ]),
        )
}

fn dictionary_archive(client: MockNces) -> MockNces {
    client.with_archive(
        "SFA2223_Dict.zip",
        zip_archive(&[(
            "sfa2223_dict.csv",
            "varnumber,varname,vartitle\n\
             1,UNITID,Unique identification number of the institution\n\
             2,SCUGRAD,Total number of undergraduates awarded aid\n",
        )]),
    )
}

fn excel_dictionary_bytes() -> Vec<u8> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name("varlist").unwrap();
    let rows = [
        ["varnumber", "varname", "varTitle"],
        ["1", "UNITID", "Unique identification number of the institution"],
        ["2", "SCUGRAD", "Total number of undergraduates awarded aid"],
    ];
    for (row_index, row) in rows.iter().enumerate() {
        for (column_index, value) in row.iter().enumerate() {
            worksheet
                .write_string(row_index as u32, column_index as u16, *value)
                .unwrap();
        }
    }
    workbook.save_to_buffer().unwrap()
}

fn excel_dictionary_archive(client: MockNces) -> MockNces {
    let bytes = excel_dictionary_bytes();
    client.with_archive(
        "SFA2223_Dict.zip",
        zip_archive_raw(&[("sfa2223_dict.xlsx", bytes.as_slice())]),
    )
}

fn header_archive(client: MockNces) -> MockNces {
    client.with_archive(
        "HD2023.zip",
        zip_archive(&[(
            "hd2023.csv",
            "UNITID,INSTNM,STABBR\n1,Alpha College,AL\n2,Beta University,NY\n",
        )]),
    )
}

fn older_reference_archives(client: MockNces) -> MockNces {
    client
        .with_archive(
            "SFA2122_Dict.zip",
            zip_archive(&[(
                "sfa2122_dict.csv",
                "varnumber,varname,vartitle\n1,UNITID,Legacy identifier\n2,SCUGRAD,Legacy count\n",
            )]),
        )
        .with_archive(
            "HD2022.zip",
            zip_archive(&[(
                "hd2022.csv",
                "UNITID,INSTNM,STABBR\n1,Renamed College,AL\n2,Closed University,NY\n",
            )]),
        )
}

fn test_store(temp: &tempfile::TempDir) -> SfaStore {
    SfaStore::new_with_root(Utf8PathBuf::from_path_buf(temp.path().join("IPEDS_Data")).unwrap())
}

fn year_range(first: &str, last: &str) -> YearRange {
    YearRange::new(
        first.parse::<StartYear>().unwrap(),
        last.parse::<StartYear>().unwrap(),
    )
    .unwrap()
}

fn options() -> FetchOptions {
    FetchOptions {
        force: false,
        dry_run: false,
    }
}

const COMBINED: &str =
    "unitid,scugrad,year\n1,100,2013-2014\n2,200,2013-2014\n9,900,2014-2015\n";

const RENAMED: &str = "UNITID - Unique identification number of the institution,\
SCUGRAD - Total number of undergraduates awarded aid,year\n\
1,100,2013-2014\n2,200,2013-2014\n9,900,2014-2015\n";

const WITH_NAME: &str = "unitid,SCUGRAD - Total number of undergraduates awarded aid,year,instnm\n\
1,100,2013-2014,Alpha College\n2,200,2013-2014,Beta University\n9,900,2014-2015,\n";

#[test]
fn run_builds_all_three_outputs() {
    let temp = tempfile::tempdir().unwrap();
    let store = test_store(&temp);
    let client = header_archive(dictionary_archive(survey_archives(MockNces::default())));
    let app = App::new(store.clone(), client);

    let result = app.run(&year_range("2013", "2014"), options()).unwrap();

    assert_eq!(result.fetch.downloaded, 2);
    assert_eq!(result.combine.files_selected, 2);
    assert_eq!(result.combine.common_columns, 2);
    assert_eq!(result.combine.rows, 3);
    assert!(result.rename.applied);
    assert_eq!(result.rename.renamed_columns, 2);
    assert!(result.join.joined);
    assert_eq!(result.join.matched_rows, 2);
    assert_eq!(result.join.reference_institutions, 2);

    let combined = fs::read_to_string(store.merged_csv_path().as_std_path()).unwrap();
    let renamed = fs::read_to_string(store.renamed_csv_path().as_std_path()).unwrap();
    let with_name = fs::read_to_string(store.named_csv_path().as_std_path()).unwrap();
    assert_eq!(combined, COMBINED);
    assert_eq!(renamed, RENAMED);
    assert_eq!(with_name, WITH_NAME);
}

#[test]
fn standalone_commands_chain_through_the_data_directory() {
    let temp = tempfile::tempdir().unwrap();
    let store = test_store(&temp);
    let client = header_archive(dictionary_archive(survey_archives(MockNces::default())));
    let app = App::new(store.clone(), client.clone());

    let fetch = app.fetch(&year_range("2013", "2014"), options()).unwrap();
    let combine = app.combine().unwrap();
    let rename = app.rename().unwrap();
    let join = app.join().unwrap();

    assert_eq!(fetch.downloaded, 2);
    assert_eq!(combine.rows, 3);
    assert!(rename.applied);
    assert!(join.joined);

    let with_name = fs::read_to_string(store.named_csv_path().as_std_path()).unwrap();
    assert_eq!(with_name, WITH_NAME);

    assert_eq!(client.download_count(), 4);
}

#[test]
fn missing_dictionary_still_writes_the_renamed_output() {
    let temp = tempfile::tempdir().unwrap();
    let store = test_store(&temp);
    let client = header_archive(survey_archives(MockNces::default()));
    let app = App::new(store.clone(), client);

    let result = app.run(&year_range("2013", "2014"), options()).unwrap();

    assert!(!result.rename.applied);
    assert_eq!(result.rename.renamed_columns, 0);
    let renamed = fs::read_to_string(store.renamed_csv_path().as_std_path()).unwrap();
    assert_eq!(renamed, COMBINED);

    assert!(result.join.joined);
    assert_eq!(result.join.matched_rows, 2);
}

#[test]
fn missing_header_archive_skips_the_join() {
    let temp = tempfile::tempdir().unwrap();
    let store = test_store(&temp);
    let client = dictionary_archive(survey_archives(MockNces::default()));
    let app = App::new(store.clone(), client);

    let result = app.run(&year_range("2013", "2014"), options()).unwrap();

    assert!(result.rename.applied);
    assert!(!result.join.joined);
    assert!(result.join.output.is_none());
    assert!(!store.named_csv_path().as_std_path().exists());
    assert!(store.renamed_csv_path().as_std_path().exists());
}

#[test]
fn excel_dictionary_relabels_the_combined_columns() {
    let temp = tempfile::tempdir().unwrap();
    let store = test_store(&temp);
    let client = header_archive(excel_dictionary_archive(survey_archives(MockNces::default())));
    let app = App::new(store.clone(), client);

    let result = app.run(&year_range("2013", "2014"), options()).unwrap();

    assert!(result.rename.applied);
    assert_eq!(result.rename.renamed_columns, 2);
    assert!(result.rename.dictionary.unwrap().ends_with("sfa2223_dict.xlsx"));
    let renamed = fs::read_to_string(store.renamed_csv_path().as_std_path()).unwrap();
    assert_eq!(renamed, RENAMED);
}

#[test]
fn newest_dictionary_and_header_years_win() {
    let temp = tempfile::tempdir().unwrap();
    let store = test_store(&temp);
    let client = older_reference_archives(header_archive(dictionary_archive(survey_archives(
        MockNces::default(),
    ))));
    let app = App::new(store.clone(), client.clone());

    let result = app.run(&year_range("2013", "2014"), options()).unwrap();

    assert!(result.rename.applied);
    assert!(result.join.joined);
    let renamed = fs::read_to_string(store.renamed_csv_path().as_std_path()).unwrap();
    let with_name = fs::read_to_string(store.named_csv_path().as_std_path()).unwrap();
    assert_eq!(renamed, RENAMED);
    assert_eq!(with_name, WITH_NAME);
    assert_eq!(client.download_count(), 4);
}
