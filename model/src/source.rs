//! Facilities for pulling raw data into a workspace.

use anyhow::{Context, Error};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fs;
use std::io::{Cursor, Read};
use std::path::Path;
use zip::ZipArchive;

mod client;
mod local;

pub use client::Client;
pub use local::LocalClient;

/// Participants table of the September 2024 Global AI Dialogues round.
///
/// The upstream file name really is spelled `particpants.csv`.
pub const PARTICIPANTS_URL: &str = "https://huggingface.co/datasets/collective-intelligence-project/Global-AI-Dialogues/raw/main/Global%20AI%20Dialogues%20Data%20-%20September%202024/particpants.csv";

/// Somewhere raw data can be loaded from.
#[async_trait]
pub trait Source {
    /// Resolve `location` to metadata about the resource, without loading its contents.
    async fn describe(&self, location: &str) -> Result<ResourceMetadata, Error>;

    /// Load the full contents of a resource.
    async fn load(&self, meta: &ResourceMetadata) -> Result<Resource, Error>;
}

/// Succinct metadata about a resource.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct ResourceMetadata {
    /// Where the resource lives: a URL or a local path.
    pub location: String,
    /// The file name of the resource.
    pub name: String,
}

impl ResourceMetadata {
    /// A title for this resource: its file name without the extension.
    pub fn title(&self) -> String {
        match Path::new(&self.name).file_stem() {
            Some(stem) => stem.to_string_lossy().into_owned(),
            None => self.name.clone(),
        }
    }
}

/// The raw contents of a resource.
#[derive(Clone, Debug)]
pub struct Resource {
    meta: ResourceMetadata,
    bytes: Vec<u8>,
}

impl Resource {
    pub fn new(meta: ResourceMetadata, bytes: Vec<u8>) -> Self {
        Self { meta, bytes }
    }

    pub fn metadata(&self) -> &ResourceMetadata {
        &self.meta
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Is this resource a Zip archive rather than a plain table?
    pub fn is_zip(&self) -> bool {
        self.bytes.starts_with(b"PK\x03\x04")
    }

    /// The CSV content of this resource.
    ///
    /// Plain resources are returned as is. For a Zip archive, this is the first `.csv` entry.
    pub fn csv_bytes(&self) -> Result<Cow<'_, [u8]>, Error> {
        if !self.is_zip() {
            return Ok(Cow::Borrowed(&self.bytes));
        }

        let mut zip = ZipArchive::new(Cursor::new(self.bytes.as_slice()))?;
        for i in 0..zip.len() {
            let mut file = match zip.by_index(i) {
                Ok(file) => file,
                Err(err) => {
                    tracing::error!("unable to load entry {i} of {}: {err}", self.meta.name);
                    continue;
                }
            };
            if !file.is_file() || !file.name().to_lowercase().ends_with(".csv") {
                continue;
            }
            tracing::info!("extracting {} from {}", file.name(), self.meta.name);
            let mut bytes = Vec::new();
            file.read_to_end(&mut bytes)?;
            return Ok(Cow::Owned(bytes));
        }

        Err(Error::msg(format!(
            "archive {} contains no CSV file",
            self.meta.name
        )))
    }

    /// Write the CSV content of this resource to `path`.
    pub fn extract(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        let path = path.as_ref();
        fs::write(path, self.csv_bytes()?)
            .with_context(|| format!("unable to write {}", path.display()))
    }
}
