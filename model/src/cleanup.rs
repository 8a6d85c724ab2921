//! Cleaning up raw CSV exports into small, regular tables.

use anyhow::{Context, Error};
use csv::{ReaderBuilder, Writer};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

mod sniff;

pub use sniff::{sniff_csv_metadata, sniff_csv_text, CsvMetadata};

/// A function rewriting every value of a column.
pub type Transformation = fn(&str) -> String;

/// An in-memory table. Empty cells are null.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl Table {
    /// Read a table from CSV text, skipping preamble as described by `meta`.
    ///
    /// Records with more fields than the header are skipped. Records with fewer fields are padded
    /// with nulls.
    pub fn parse(text: &str, meta: &CsvMetadata) -> Result<Self, Error> {
        let mut reader = ReaderBuilder::new()
            .delimiter(meta.delimiter)
            .flexible(true)
            .from_reader(skip_lines(text, meta.skip_rows).as_bytes());
        let columns = reader
            .headers()?
            .iter()
            .map(str::to_string)
            .collect::<Vec<_>>();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = match record {
                Ok(record) => record,
                Err(err) => {
                    tracing::debug!("skipping malformed record: {err}");
                    continue;
                }
            };
            if record.len() > columns.len() {
                tracing::debug!(
                    "skipping bad line {}: expected {} fields, saw {}",
                    record.position().map(|pos| pos.line()).unwrap_or_default() as usize
                        + meta.skip_rows,
                    columns.len(),
                    record.len()
                );
                continue;
            }
            let mut row = record
                .iter()
                .map(|value| (!value.is_empty()).then(|| value.to_string()))
                .collect::<Vec<_>>();
            row.resize(columns.len(), None);
            rows.push(row);
        }

        Ok(Self { columns, rows })
    }

    /// The position of the column called `name`.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|col| col == name)
    }

    /// A new table with just the columns at `indices`, in that order.
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            columns: indices.iter().map(|&i| self.columns[i].clone()).collect(),
            rows: self
                .rows
                .iter()
                .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
                .collect(),
        }
    }

    /// The number of non-null values in each column.
    pub fn non_null_counts(&self) -> Vec<usize> {
        (0..self.columns.len())
            .map(|i| self.rows.iter().filter(|row| row[i].is_some()).count())
            .collect()
    }

    /// How often each value occurs in column `i`, most frequent first.
    ///
    /// Nulls are not counted.
    pub fn value_counts(&self, i: usize) -> Vec<(String, usize)> {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for value in self.rows.iter().filter_map(|row| row[i].as_deref()) {
            *counts.entry(value).or_default() += 1;
        }
        let mut counts = counts
            .into_iter()
            .map(|(value, count)| (value.to_string(), count))
            .collect::<Vec<_>>();
        counts.sort_by(|(a, m), (b, n)| n.cmp(m).then_with(|| a.cmp(b)));
        counts
    }

    /// Write this table as a comma-delimited CSV file with a header row.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        let path = path.as_ref();
        let mut writer = Writer::from_path(path)
            .with_context(|| format!("unable to create {}", path.display()))?;
        writer.write_record(&self.columns)?;
        for row in &self.rows {
            writer.write_record(row.iter().map(|value| value.as_deref().unwrap_or("")))?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// What [`simplify_csv`] did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SimplifyReport {
    /// Target columns present in the input, in output order.
    pub columns: Vec<String>,
    /// Target columns absent from the input.
    pub missing: Vec<String>,
    /// Rows written.
    pub rows: usize,
    /// Non-null values in each output column.
    pub non_null: Vec<usize>,
}

/// Clean up the CSV file at `input` and write the selected columns to `output`.
///
/// Preamble before the header is skipped, only `target_columns` are kept, at most `max_rows` rows
/// are written (`0` means no limit), and each column named in `transformations` is rewritten
/// value by value. Null values are transformed as empty strings.
///
/// # Errors
///
/// Fails if none of `target_columns` is present, or on I/O errors. Missing columns are reported
/// but are not an error as long as at least one target column exists.
pub fn simplify_csv(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    target_columns: &[&str],
    max_rows: usize,
    transformations: &[(&str, Transformation)],
) -> Result<SimplifyReport, Error> {
    let input = input.as_ref();
    tracing::info!("processing CSV file {}", input.display());

    let bytes = fs::read(input).with_context(|| format!("unable to read {}", input.display()))?;
    let text = String::from_utf8_lossy(&bytes);
    let meta = sniff_csv_text(&text)
        .ok_or_else(|| Error::msg(format!("CSV file {} is empty", input.display())))?;

    tracing::warn!("reading CSV file, skipping {} rows", meta.skip_rows);
    let table = Table::parse(&text, &meta)?;
    tracing::info!(
        "read CSV with shape ({}, {})",
        table.rows.len(),
        table.columns.len()
    );
    tracing::info!("columns found: {}", table.columns.len());

    let mut existing = Vec::new();
    let mut missing = Vec::new();
    for &col in target_columns {
        match table.column_index(col) {
            Some(i) => existing.push(i),
            None => missing.push(col.to_string()),
        }
    }
    tracing::info!(
        "found {} of {} target columns",
        existing.len(),
        target_columns.len()
    );

    if !missing.is_empty() {
        tracing::error!("{}", format_missing(&missing));
        for col in &missing {
            let similar = similar_columns(col, &table.columns);
            if !similar.is_empty() {
                tracing::info!("{}", format_similar(col, &similar));
            }
        }
    }

    if existing.is_empty() {
        return Err(Error::msg("No target columns found! Cannot proceed."));
    }

    let mut filtered = table.select(&existing);

    if max_rows > 0 && filtered.rows.len() > max_rows {
        tracing::info!(
            "truncating data from {} to {max_rows} rows",
            filtered.rows.len()
        );
        filtered.rows.truncate(max_rows);
    }

    for &(name, transform) in transformations {
        let Some(i) = filtered.column_index(name) else {
            continue;
        };
        tracing::info!("applying transformation to column {name:?}");
        for row in &mut filtered.rows {
            row[i] = Some(transform(row[i].as_deref().unwrap_or("")));
        }
        tracing::info!(
            "column {name:?} values after transformation: {}",
            format_counts(&filtered.value_counts(i))
        );
    }

    let non_null = filtered.non_null_counts();
    let total = filtered.rows.len();
    tracing::info!(
        "filtered data shape: ({total}, {})",
        filtered.columns.len()
    );
    tracing::info!("non-null values per column:");
    for (col, count) in filtered.columns.iter().zip(&non_null) {
        let percent = if total == 0 {
            0.0
        } else {
            *count as f64 / total as f64 * 100.0
        };
        tracing::info!("  {col}: {count}/{total} ({percent:.1}%)");
    }

    filtered.write(output)?;

    Ok(SimplifyReport {
        columns: filtered.columns,
        missing,
        rows: total,
        non_null,
    })
}

/// Collapse a free-text answer about AI into `excited`, `concerned`, `neutral` or `""`.
pub fn simplify_sentiment(value: &str) -> String {
    let value = value.to_lowercase();
    if value.contains("more excited") {
        "excited".into()
    } else if value.contains("more concerned") {
        "concerned".into()
    } else if value.contains("equally") {
        "neutral".into()
    } else {
        String::new()
    }
}

/// Columns whose names overlap with `name`, ignoring case.
fn similar_columns<'a>(name: &str, columns: &'a [String]) -> Vec<&'a str> {
    let name = name.to_lowercase();
    columns
        .iter()
        .filter(|col| {
            let col = col.to_lowercase();
            name.contains(&col) || col.contains(&name)
        })
        .map(String::as_str)
        .collect()
}

fn format_missing(missing: &[String]) -> String {
    let lines = missing
        .iter()
        .map(|col| format!("  - '{col}'"))
        .collect::<Vec<_>>();
    format!("missing columns:\n{}", lines.join("\n"))
}

fn format_similar(col: &str, similar: &[&str]) -> String {
    let names = similar
        .iter()
        .map(|name| format!("'{name}'"))
        .collect::<Vec<_>>();
    format!("for '{col}', found similar: [{}]", names.join(", "))
}

fn format_counts(counts: &[(String, usize)]) -> String {
    let entries = counts
        .iter()
        .map(|(value, count)| format!("{value:?}: {count}"))
        .collect::<Vec<_>>();
    format!("{{{}}}", entries.join(", "))
}

/// The rest of `text` after its first `n` lines.
fn skip_lines(text: &str, n: usize) -> &str {
    let mut rest = text;
    for _ in 0..n {
        match rest.find('\n') {
            Some(i) => rest = &rest[i + 1..],
            None => return "",
        }
    }
    rest
}
