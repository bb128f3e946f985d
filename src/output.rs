use std::io::{self, Write};

use serde::Serialize;

use crate::app::{CombineResult, FetchResult, JoinResult, RenameResult, RunResult};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Human,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_fetch(result: &FetchResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_combine(result: &CombineResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_rename(result: &RenameResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_join(result: &JoinResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_run(result: &RunResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value)
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}
