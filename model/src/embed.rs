//! Embedding the rows of a table as vectors.

use crate::{
    cleanup::{CsvMetadata, Table},
    workspace::{Format, Item, Workspace},
};
use anyhow::{Context, Error};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use strum::{Display, EnumIter, EnumString};

mod hashing;
mod openai;

pub use hashing::HashingEmbedder;
pub use openai::{OpenAiEmbedder, OpenAiOptions};

/// Something that turns documents into vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// A short description of this embedder, recorded with its output.
    fn name(&self) -> String;

    /// Embed each of `texts`, returning one vector per text, in order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, Error>;
}

/// The available embedding backends.
#[derive(Clone, Copy, Debug, Default, Display, EnumIter, EnumString, PartialEq, Eq)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum EmbedderKind {
    /// Local feature hashing; needs no network access.
    #[default]
    Hashing,
    /// An OpenAI-compatible embeddings API.
    OpenAi,
}

/// A table with an embedding for each row.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct EmbeddingTable {
    /// The embedder which produced the vectors.
    pub embedder: String,
    pub columns: Vec<String>,
    pub rows: Vec<EmbeddedRow>,
}

impl EmbeddingTable {
    /// Load an embeddings item from a workspace.
    pub fn load(ws: &Workspace, item: &Item) -> Result<Self, Error> {
        let path = ws.path_of(item)?;
        let file = File::open(&path).with_context(|| format!("unable to open {}", path.display()))?;
        serde_json::from_reader(file)
            .with_context(|| format!("embeddings file {} is malformed", path.display()))
    }
}

/// A single row of a table together with its embedding.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct EmbeddedRow {
    /// Position of the row in the source table.
    pub key: usize,
    /// Cell values, empty for nulls.
    pub values: Vec<String>,
    /// The document that was embedded.
    pub text: String,
    pub embedding: Vec<f32>,
}

/// The document embedded for a row: one `column: value` line per non-null cell.
pub fn row_document(columns: &[String], row: &[Option<String>]) -> String {
    columns
        .iter()
        .zip(row)
        .filter_map(|(col, value)| {
            let value = value.as_deref()?.trim();
            if value.is_empty() {
                None
            } else {
                Some(format!("{col}: {value}"))
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Embed each row of the table in `item`, storing the result as a new JSON item.
pub async fn embed_table_rows(
    ws: &Workspace,
    item: &Item,
    embedder: &dyn Embedder,
) -> Result<Item, Error> {
    let path = ws.path_of(item)?;
    let bytes = fs::read(&path).with_context(|| format!("unable to read {}", path.display()))?;
    let text = String::from_utf8_lossy(&bytes);
    let table = Table::parse(&text, &CsvMetadata::default())?;
    if table.columns.is_empty() {
        return Err(Error::msg(format!("CSV file {} is empty", path.display())));
    }

    let documents = table
        .rows
        .iter()
        .map(|row| row_document(&table.columns, row))
        .collect::<Vec<_>>();
    tracing::warn!(
        "embedding {} rows of {} with {}",
        documents.len(),
        item.title,
        embedder.name()
    );
    let vectors = embedder.embed(&documents).await?;
    if vectors.len() != documents.len() {
        return Err(Error::msg(format!(
            "embedder returned {} vectors for {} inputs",
            vectors.len(),
            documents.len()
        )));
    }

    let rows = table
        .rows
        .into_iter()
        .zip(documents)
        .zip(vectors)
        .enumerate()
        .map(|(key, ((values, text), embedding))| EmbeddedRow {
            key,
            values: values.into_iter().map(Option::unwrap_or_default).collect(),
            text,
            embedding,
        })
        .collect();
    let embeddings = EmbeddingTable {
        embedder: embedder.name(),
        columns: table.columns,
        rows,
    };

    let mut embedded = item.derived_copy(format!("{}_embeddings", item.title), Format::Json);
    let target = ws.target_path_for(&embedded);
    let file =
        File::create(&target).with_context(|| format!("unable to create {}", target.display()))?;
    serde_json::to_writer(file, &embeddings)?;
    ws.save(&mut embedded)?;
    Ok(embedded)
}

/// Cosine similarity of two vectors; zero if either is all zeros.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
