//! Detecting the layout of a CSV file.
//!
//! Survey exports often start with a few lines of preamble (a title, an export date, a blank line)
//! before the real header. We find the header by looking for the first line whose field count
//! matches the most common field count in the file.

use anyhow::{Context, Error};
use csv::ReaderBuilder;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Lines to examine when sniffing.
const SAMPLE_LINES: usize = 100;

/// Delimiters we try, in order of preference.
const DELIMITERS: [u8; 4] = [b',', b'\t', b';', b'|'];

/// The layout of a CSV file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CsvMetadata {
    pub delimiter: u8,
    /// Lines of preamble before the header.
    pub skip_rows: usize,
    /// The names in the header row.
    pub columns: Vec<String>,
}

/// Comma-delimited with the header on the first line, as [`Table::write`](super::Table::write)
/// produces. The header names are left for the reader to discover.
impl Default for CsvMetadata {
    fn default() -> Self {
        Self {
            delimiter: b',',
            skip_rows: 0,
            columns: vec![],
        }
    }
}

/// Sniff the layout of the CSV file at `path`.
pub fn sniff_csv_metadata(path: impl AsRef<Path>) -> Result<CsvMetadata, Error> {
    let path = path.as_ref();
    let bytes = fs::read(path).with_context(|| format!("unable to read {}", path.display()))?;
    sniff_csv_text(&String::from_utf8_lossy(&bytes))
        .with_context(|| format!("CSV file {} is empty", path.display()))
}

/// Sniff the layout of CSV `text`.
///
/// Returns [`None`] if the text contains no data.
pub fn sniff_csv_text(text: &str) -> Option<CsvMetadata> {
    let sample = text
        .lines()
        .take(SAMPLE_LINES)
        .collect::<Vec<_>>()
        .join("\n");

    let mut best: Option<(Layout, u8)> = None;
    for delimiter in DELIMITERS {
        let Some(layout) = Layout::of(&sample, delimiter) else {
            continue;
        };
        tracing::debug!(
            "delimiter {:?}: {} fields on {} lines",
            delimiter as char,
            layout.fields,
            layout.frequency
        );
        let better = match &best {
            Some((current, _)) => layout.rank() > current.rank(),
            None => true,
        };
        if better {
            best = Some((layout, delimiter));
        }
    }

    let (layout, delimiter) = best?;
    Some(CsvMetadata {
        delimiter,
        skip_rows: layout.header_line,
        columns: layout.header,
    })
}

/// How a sample splits into fields with a given delimiter.
struct Layout {
    /// The most common number of fields per record.
    fields: usize,
    /// How many records have that many fields.
    frequency: usize,
    /// Zero-based line index of the first record with that many fields.
    header_line: usize,
    header: Vec<String>,
}

impl Layout {
    /// Delimiters that actually split the lines beat those that don't. After that, the layout
    /// most lines agree on wins, and only then the wider one.
    fn rank(&self) -> (bool, usize, usize) {
        (self.fields > 1, self.frequency, self.fields)
    }

    fn of(sample: &str, delimiter: u8) -> Option<Self> {
        let records = ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(false)
            .flexible(true)
            .from_reader(sample.as_bytes())
            .into_records()
            .filter_map(Result::ok)
            .collect::<Vec<_>>();

        let mut counts: HashMap<usize, usize> = HashMap::new();
        for record in &records {
            *counts.entry(record.len()).or_default() += 1;
        }
        // Most frequent field count; the wider layout wins ties.
        let (fields, frequency) = counts
            .into_iter()
            .max_by_key(|&(fields, frequency)| (frequency, fields))?;

        let header = records.iter().find(|record| record.len() == fields)?;
        let header_line = header
            .position()
            .map(|pos| line_index(sample, pos.byte() as usize))
            .unwrap_or(0);
        Some(Self {
            fields,
            frequency,
            header_line,
            header: header.iter().map(str::to_string).collect(),
        })
    }
}

/// Zero-based index of the first non-blank line at or after byte `offset`.
///
/// A record's position is where the reader stopped after the previous record, so any blank lines
/// the reader skipped on the way to the record come first.
fn line_index(sample: &str, offset: usize) -> usize {
    let mut start = offset.min(sample.len());
    loop {
        let rest = &sample.as_bytes()[start..];
        if rest.starts_with(b"\n") {
            start += 1;
        } else if rest.starts_with(b"\r\n") {
            start += 2;
        } else {
            break;
        }
    }
    sample.as_bytes()[..start]
        .iter()
        .filter(|&&b| b == b'\n')
        .count()
}
