use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;

use crate::error::SfaError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFile {
    pub key: String,
    pub revised: bool,
    pub path: Utf8PathBuf,
}

impl CandidateFile {
    pub fn from_name(dir: &Utf8Path, name: &str) -> Option<Self> {
        let lowered = name.to_lowercase();
        let re = Regex::new(r"^(sfa\d{4})(_rv)?\.csv$").unwrap();
        let caps = re.captures(&lowered)?;
        Some(Self {
            key: caps[1].to_uppercase(),
            revised: caps.get(2).is_some(),
            path: dir.join(name),
        })
    }
}

fn displaces(current: &CandidateFile, candidate: &CandidateFile) -> bool {
    if candidate.revised != current.revised {
        return candidate.revised;
    }
    candidate.path < current.path
}

pub fn choose(
    candidates: impl IntoIterator<Item = CandidateFile>,
) -> BTreeMap<String, CandidateFile> {
    let mut chosen = BTreeMap::new();
    for candidate in candidates {
        match chosen.entry(candidate.key.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(candidate);
            }
            Entry::Occupied(mut slot) => {
                if displaces(slot.get(), &candidate) {
                    slot.insert(candidate);
                }
            }
        }
    }
    chosen
}

pub fn select_survey_files(dir: &Utf8Path) -> Result<BTreeMap<String, CandidateFile>, SfaError> {
    let entries =
        fs::read_dir(dir.as_std_path()).map_err(|err| SfaError::Filesystem(err.to_string()))?;
    let mut candidates = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| SfaError::Filesystem(err.to_string()))?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if let Some(candidate) = CandidateFile::from_name(dir, name) {
            candidates.push(candidate);
        }
    }
    Ok(choose(candidates))
}
