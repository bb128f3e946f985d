use std::fs;
use std::fs::File;
use std::path::Path;
use std::time::Duration;

use camino::Utf8Path;
use reqwest::blocking::Client;
use reqwest::header::{CONTENT_LENGTH, HeaderMap, HeaderValue, USER_AGENT};

use crate::domain::AcademicYear;
use crate::error::SfaError;

pub const BASE_URL: &str = "https://nces.ed.gov/ipeds/datacenter/data/";

const HEAD_TIMEOUT: Duration = Duration::from_secs(10);
const GET_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy)]
pub struct ProbeInfo {
    pub status: u16,
    pub size: Option<u64>,
}

impl ProbeInfo {
    pub fn available(&self) -> bool {
        self.status == 200
    }
}

pub trait NcesClient: Send + Sync {
    fn probe(&self, url: &str) -> Result<ProbeInfo, SfaError>;
    fn download(&self, url: &str, destination: &Path) -> Result<(), SfaError>;
}

pub fn survey_archive_name(year: &AcademicYear) -> String {
    format!(
        "SFA{:02}{:02}.zip",
        year.start_two_digit(),
        year.end_two_digit()
    )
}

pub fn dictionary_archive_name(year: &AcademicYear) -> String {
    format!(
        "SFA{:02}{:02}_Dict.zip",
        year.start_two_digit(),
        year.end_two_digit()
    )
}

pub fn header_archive_name(year: u16) -> String {
    format!("HD{year}.zip")
}

pub fn survey_url(year: &AcademicYear) -> String {
    format!("{BASE_URL}{}", survey_archive_name(year))
}

pub fn dictionary_url(year: &AcademicYear) -> String {
    format!("{BASE_URL}{}", dictionary_archive_name(year))
}

pub fn header_url(year: u16) -> String {
    format!("{BASE_URL}{}", header_archive_name(year))
}

pub fn download_archive<C: NcesClient + ?Sized>(
    client: &C,
    url: &str,
    destination: &Utf8Path,
) -> Result<(), SfaError> {
    let parent = destination
        .parent()
        .ok_or_else(|| SfaError::Filesystem(format!("no parent directory for {destination}")))?;
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| SfaError::Filesystem(err.to_string()))?;
    let temp_dir = tempfile::Builder::new()
        .prefix("ipeds-sfa-download")
        .tempdir_in(parent.as_std_path())
        .map_err(|err| SfaError::Filesystem(err.to_string()))?;
    let temp_path = temp_dir.path().join("archive.zip");
    client.download(url, &temp_path)?;
    crate::fs_util::validate_zip(&temp_path)?;
    if destination.as_std_path().exists() {
        fs::remove_file(destination.as_std_path())
            .map_err(|err| SfaError::Filesystem(err.to_string()))?;
    }
    fs::rename(&temp_path, destination.as_std_path())
        .map_err(|err| SfaError::Filesystem(err.to_string()))?;
    Ok(())
}

#[derive(Clone)]
pub struct NcesHttpClient {
    client: Client,
}

impl NcesHttpClient {
    pub fn new() -> Result<Self, SfaError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("ipeds-sfa/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| SfaError::Filesystem(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(GET_TIMEOUT)
            .build()
            .map_err(|err| SfaError::NcesHttp(err.to_string()))?;
        Ok(Self { client })
    }

    fn write_response_to_file(
        &self,
        mut response: reqwest::blocking::Response,
        destination: &Path,
    ) -> Result<(), SfaError> {
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "NCES request failed".to_string());
            return Err(SfaError::NcesStatus { status, message });
        }
        let mut file =
            File::create(destination).map_err(|err| SfaError::Filesystem(err.to_string()))?;
        std::io::copy(&mut response, &mut file)
            .map_err(|err| SfaError::Filesystem(err.to_string()))?;
        Ok(())
    }
}

impl NcesClient for NcesHttpClient {
    fn probe(&self, url: &str) -> Result<ProbeInfo, SfaError> {
        let response = self
            .client
            .head(url)
            .timeout(HEAD_TIMEOUT)
            .send()
            .map_err(|err| SfaError::NcesHttp(err.to_string()))?;
        let status = response.status().as_u16();
        let size = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u64>().ok());
        Ok(ProbeInfo { status, size })
    }

    fn download(&self, url: &str, destination: &Path) -> Result<(), SfaError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| SfaError::NcesHttp(err.to_string()))?;
        self.write_response_to_file(response, destination)
    }
}
