//! Plain comma-separated tables.
//!
//! Every artifact in the pipeline, raw or derived, is a header row followed by
//! data rows. Fields are trimmed on read because the raw logs pad around
//! their commas.

pub mod fields;

use anyhow::{anyhow, Result};

use crate::error::PipelineError;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CsvTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl CsvTable {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    pub fn parse(text: &str, artifact: &str) -> Result<Self, PipelineError> {
        let mut lines = text
            .lines()
            .map(|line| line.trim_end_matches('\r'))
            .filter(|line| !line.trim().is_empty());

        let headers: Vec<String> = match lines.next() {
            Some(line) => split_fields(line),
            None => return Err(PipelineError::malformed(artifact, "missing header row")),
        };

        let mut rows = Vec::new();
        for (line_no, line) in lines.enumerate() {
            let fields = split_fields(line);
            if fields.len() != headers.len() {
                return Err(PipelineError::malformed(
                    artifact,
                    format!(
                        "data row {} has {} fields, header has {}",
                        line_no + 1,
                        fields.len(),
                        headers.len()
                    ),
                ));
            }
            rows.push(fields);
        }

        Ok(Self { headers, rows })
    }

    pub fn to_csv_string(&self) -> String {
        let mut out = self.headers.join(",");
        out.push('\n');
        for row in &self.rows {
            out.push_str(&row.join(","));
            out.push('\n');
        }
        out
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|header| header == name)
    }

    pub fn rename_columns(&mut self, renames: &[(&str, &str)]) {
        for header in &mut self.headers {
            if let Some((_, to)) = renames.iter().find(|(from, _)| from == header) {
                *header = (*to).to_string();
            }
        }
    }

    pub fn row_views<'a>(&'a self, artifact: &'a str) -> impl Iterator<Item = RowView<'a>> + 'a {
        (0..self.rows.len()).map(move |index| RowView {
            table: self,
            index,
            artifact,
        })
    }
}

fn split_fields(line: &str) -> Vec<String> {
    line.split(',').map(|field| field.trim().to_string()).collect()
}

/// One data row, addressed by column name.
pub struct RowView<'a> {
    table: &'a CsvTable,
    index: usize,
    artifact: &'a str,
}

impl<'a> RowView<'a> {
    pub fn get(&self, name: &str) -> Result<&'a str> {
        let column = self.table.column(name).ok_or_else(|| {
            anyhow!(PipelineError::malformed(
                self.artifact,
                format!("missing column {name}")
            ))
        })?;
        Ok(self.table.rows[self.index][column].as_str())
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

/// A typed row that round-trips through a `CsvTable`.
pub trait TableRecord: Sized {
    const HEADERS: &'static [&'static str];

    fn to_fields(&self) -> Vec<String>;

    fn from_row(row: &RowView<'_>) -> Result<Self>;
}

pub fn encode<T: TableRecord>(records: &[T]) -> String {
    let mut table = CsvTable::new(T::HEADERS.iter().map(|h| h.to_string()).collect());
    table.rows = records.iter().map(TableRecord::to_fields).collect();
    table.to_csv_string()
}

pub fn decode<T: TableRecord>(text: &str, artifact: &str) -> Result<Vec<T>> {
    let table = CsvTable::parse(text, artifact)?;
    decode_table(&table, artifact)
}

pub fn decode_table<T: TableRecord>(table: &CsvTable, artifact: &str) -> Result<Vec<T>> {
    table
        .row_views(artifact)
        .map(|row| {
            let index = row.index();
            T::from_row(&row).map_err(|err| {
                err.context(format!("{artifact}: data row {}", index + 1))
            })
        })
        .collect()
}
