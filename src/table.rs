use std::fs::File;

use camino::Utf8Path;
use csv::{ReaderBuilder, WriterBuilder};

use crate::error::SfaError;
use crate::schema::normalize_column;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    pub fn from_csv(path: &Utf8Path) -> Result<Self, SfaError> {
        let file = File::open(path.as_std_path())
            .map_err(|err| SfaError::Filesystem(format!("open {path}: {err}")))?;
        let mut reader = ReaderBuilder::new().flexible(true).from_reader(file);
        let columns: Vec<String> = reader
            .byte_headers()
            .map_err(|err| SfaError::Csv(err.to_string()))?
            .iter()
            .map(|field| String::from_utf8_lossy(field).into_owned())
            .collect();
        let width = columns.len();

        let mut rows = Vec::new();
        for record in reader.byte_records() {
            let record = record.map_err(|err| SfaError::Csv(err.to_string()))?;
            let mut row: Vec<String> = record
                .iter()
                .map(|field| String::from_utf8_lossy(field).into_owned())
                .collect();
            row.resize(width, String::new());
            rows.push(row);
        }
        Ok(Self { columns, rows })
    }

    pub fn from_csv_projected(path: &Utf8Path, wanted: &[String]) -> Result<Self, SfaError> {
        let file = File::open(path.as_std_path())
            .map_err(|err| SfaError::Filesystem(format!("open {path}: {err}")))?;
        let mut reader = ReaderBuilder::new().flexible(true).from_reader(file);
        let normalized: Vec<String> = reader
            .byte_headers()
            .map_err(|err| SfaError::Csv(err.to_string()))?
            .iter()
            .map(|field| normalize_column(&String::from_utf8_lossy(field)))
            .collect();

        let mut indices = Vec::with_capacity(wanted.len());
        for name in wanted {
            let Some(index) = normalized.iter().position(|column| column == name) else {
                return Err(SfaError::Csv(format!("column {name} not present in {path}")));
            };
            indices.push(index);
        }

        let mut rows = Vec::new();
        for record in reader.byte_records() {
            let record = record.map_err(|err| SfaError::Csv(err.to_string()))?;
            let row: Vec<String> = indices
                .iter()
                .map(|&index| {
                    record
                        .get(index)
                        .map(|field| String::from_utf8_lossy(field).into_owned())
                        .unwrap_or_default()
                })
                .collect();
            rows.push(row);
        }
        Ok(Self {
            columns: wanted.to_vec(),
            rows,
        })
    }

    pub fn push_constant_column(&mut self, name: &str, value: &str) {
        self.columns.push(name.to_string());
        for row in &mut self.rows {
            row.push(value.to_string());
        }
    }

    pub fn set_constant_column(&mut self, name: &str, value: &str) {
        match self.column_index(name) {
            Some(index) => {
                for row in &mut self.rows {
                    row[index] = value.to_string();
                }
            }
            None => self.push_constant_column(name, value),
        }
    }

    pub fn push_column_with<F>(&mut self, name: &str, mut value_for: F)
    where
        F: FnMut(&[String]) -> String,
    {
        let values: Vec<String> = self.rows.iter().map(|row| value_for(row)).collect();
        self.columns.push(name.to_string());
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.push(value);
        }
    }

    pub fn rename_column(&mut self, from: &str, to: &str) -> bool {
        match self.column_index(from) {
            Some(index) => {
                self.columns[index] = to.to_string();
                true
            }
            None => false,
        }
    }

    pub fn rename_columns<F>(&mut self, mut rename: F) -> usize
    where
        F: FnMut(&str) -> Option<String>,
    {
        let mut renamed = 0;
        for column in &mut self.columns {
            if let Some(new_name) = rename(column) {
                *column = new_name;
                renamed += 1;
            }
        }
        renamed
    }

    pub fn extend_rows(&mut self, other: Table) -> Result<(), SfaError> {
        if other.columns != self.columns {
            return Err(SfaError::Csv(
                "column mismatch while appending rows".to_string(),
            ));
        }
        self.rows.extend(other.rows);
        Ok(())
    }

    pub fn to_csv_bytes(&self) -> Result<Vec<u8>, SfaError> {
        let mut writer = WriterBuilder::new().from_writer(vec![]);
        writer
            .write_record(&self.columns)
            .map_err(|err| SfaError::Csv(err.to_string()))?;
        for row in &self.rows {
            writer
                .write_record(row)
                .map_err(|err| SfaError::Csv(err.to_string()))?;
        }
        writer
            .into_inner()
            .map_err(|err| SfaError::Csv(err.to_string()))
    }
}
