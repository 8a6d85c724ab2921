//! A directory of items produced by the pipeline.
//!
//! Each item is a file (a table, an embeddings document, an HTML page) with a JSON sidecar next
//! to it recording where it came from:
//!
//! ```text
//! <root>/
//!     resources/
//!         particpants.csv
//!         particpants.csv.meta.json
//!         participants_simple.csv
//!         participants_simple.csv.meta.json
//!     exports/
//!         participants_simple_embeddings_graph_3d.html
//!         participants_simple_embeddings_graph_3d.html.meta.json
//! ```

use crate::source::Source;
use anyhow::{Context, Error};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use strum::{Display, EnumString};

const RESOURCES_DIR: &str = "resources";
const EXPORTS_DIR: &str = "exports";
const SIDECAR_SUFFIX: &str = ".meta.json";

/// The kind of content an item holds.
#[derive(
    Clone, Copy, Debug, Display, EnumString, PartialEq, Eq, Hash, Deserialize, Serialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Csv,
    Json,
    Html,
}

impl Format {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
            Self::Html => "html",
        }
    }

    fn dir(&self) -> &'static str {
        match self {
            Self::Csv | Self::Json => RESOURCES_DIR,
            Self::Html => EXPORTS_DIR,
        }
    }
}

/// A file stored in a workspace, together with its provenance.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Item {
    pub title: String,
    pub format: Format,
    /// Location of the content, relative to the workspace root. Unset until the item is saved.
    pub store_path: Option<PathBuf>,
    /// The URL or path this item was imported from, if it was imported.
    pub source_url: Option<String>,
    /// The store path of the item this one was derived from, if any.
    pub derived_from: Option<PathBuf>,
}

impl Item {
    pub fn new(title: impl Into<String>, format: Format) -> Self {
        Self {
            title: title.into(),
            format,
            store_path: None,
            source_url: None,
            derived_from: None,
        }
    }

    /// A new, unsaved item derived from this one.
    pub fn derived_copy(&self, title: impl Into<String>, format: Format) -> Self {
        Self {
            derived_from: self.store_path.clone(),
            ..Self::new(title, format)
        }
    }
}

impl Display for Item {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{} ({})", self.title, self.format)?;
        if let Some(path) = &self.store_path {
            write!(f, " at {}", path.display())?;
        }
        if let Some(url) = &self.source_url {
            write!(f, " from {url}")?;
        }
        Ok(())
    }
}

/// A workspace directory.
#[derive(Clone, Debug)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Open the workspace at `root`, creating it if necessary.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, Error> {
        let root = root.as_ref();
        for dir in [RESOURCES_DIR, EXPORTS_DIR] {
            let dir = root.join(dir);
            fs::create_dir_all(&dir)
                .with_context(|| format!("unable to create {}", dir.display()))?;
        }
        let root = fs::canonicalize(root)
            .with_context(|| format!("unable to resolve {}", root.display()))?;
        Ok(Self { root })
    }

    /// The absolute path of the workspace root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The absolute path where the content of `item` belongs.
    pub fn target_path_for(&self, item: &Item) -> PathBuf {
        self.root.join(relative_path_for(item))
    }

    /// The absolute path of a saved item's content.
    pub fn path_of(&self, item: &Item) -> Result<PathBuf, Error> {
        let store_path = item
            .store_path
            .as_ref()
            .ok_or_else(|| Error::msg(format!("item {} has not been saved", item.title)))?;
        Ok(self.root.join(store_path))
    }

    /// Record `item` in the workspace.
    ///
    /// The item's content must already be at [`target_path_for`](Self::target_path_for) (or at its
    /// `store_path`, if that is set).
    pub fn save(&self, item: &mut Item) -> Result<(), Error> {
        if item.store_path.is_none() {
            item.store_path = Some(relative_path_for(item));
        }
        let path = self.path_of(item)?;
        if !path.is_file() {
            return Err(Error::msg(format!(
                "cannot save item {}: {} does not exist",
                item.title,
                path.display()
            )));
        }
        let sidecar = sidecar_path(&path);
        let file = File::create(&sidecar)
            .with_context(|| format!("unable to create {}", sidecar.display()))?;
        serde_json::to_writer_pretty(file, item)?;
        tracing::debug!("saved item {item}");
        Ok(())
    }

    /// Load every item recorded in this workspace.
    pub fn items(&self) -> Vec<Item> {
        [RESOURCES_DIR, EXPORTS_DIR]
            .into_iter()
            .flat_map(|dir| {
                let dir = self.root.join(dir);
                match dir.read_dir() {
                    Ok(entries) => entries
                        .filter_map(|dirent| match dirent {
                            Ok(de) => Some(de.path()),
                            Err(err) => {
                                tracing::error!("unable to read {}: {err}", dir.display());
                                None
                            }
                        })
                        .collect::<Vec<_>>(),
                    Err(err) => {
                        tracing::error!("unable to read directory {}: {err}", dir.display());
                        vec![]
                    }
                }
            })
            .filter(|path| path.to_string_lossy().ends_with(SIDECAR_SUFFIX))
            .filter_map(|path| {
                let file = match File::open(&path) {
                    Ok(file) => file,
                    Err(err) => {
                        tracing::error!("unable to open {}: {err}", path.display());
                        return None;
                    }
                };
                match serde_json::from_reader(file) {
                    Ok(item) => Some(item),
                    Err(err) => {
                        tracing::error!("item sidecar {} is malformed: {err}", path.display());
                        None
                    }
                }
            })
            .collect()
    }

    /// Find a previously imported item whose content is still present.
    pub fn find_by_source(&self, location: &str) -> Option<Item> {
        self.items().into_iter().find(|item| {
            item.source_url.as_deref() == Some(location)
                && self.path_of(item).map(|path| path.is_file()).unwrap_or(false)
        })
    }

    /// Fetch `location` from `source` into this workspace.
    ///
    /// A copy imported earlier from the same location is reused unless `refresh` is set.
    pub async fn import<S: Source + ?Sized>(
        &self,
        source: &S,
        location: &str,
        refresh: bool,
    ) -> Result<Item, Error> {
        let meta = source.describe(location).await?;
        if !refresh {
            if let Some(item) = self.find_by_source(&meta.location) {
                tracing::info!("using cached copy of {}: {item}", meta.location);
                return Ok(item);
            }
        }

        let resource = source.load(&meta).await?;
        let mut item = Item::new(meta.title(), Format::Csv);
        item.source_url = Some(meta.location.clone());
        resource.extract(self.target_path_for(&item))?;
        self.save(&mut item)?;
        Ok(item)
    }

    /// Show the user where the workspace is and what it holds.
    pub fn log_info(&self) {
        let items = self.items();
        tracing::warn!(
            "workspace {} ({} items)",
            self.root.display(),
            items.len()
        );
        for item in &items {
            tracing::info!("  {item}");
        }
    }
}

/// Turn a title into a file name stem.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
    }
    let slug = slug.trim_matches('_');
    if slug.is_empty() {
        "item".into()
    } else {
        slug.into()
    }
}

fn relative_path_for(item: &Item) -> PathBuf {
    Path::new(item.format.dir()).join(format!(
        "{}.{}",
        slugify(&item.title),
        item.format.extension()
    ))
}

fn sidecar_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(SIDECAR_SUFFIX);
    name.into()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::source::LocalClient;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("participants_simple"), "participants_simple");
        assert_eq!(slugify("Global AI -- Dialogues!"), "global_ai_dialogues");
        assert_eq!(slugify("  "), "item");
        assert_eq!(slugify("Ünïcode"), "n_code");
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::open(dir.path().join("ws")).unwrap();
        assert!(ws.items().is_empty());

        let mut item = Item::new("Some Table", Format::Csv);
        let target = ws.target_path_for(&item);
        assert_eq!(target, ws.root().join("resources/some_table.csv"));

        // Saving requires the content to exist.
        ws.save(&mut item.clone()).unwrap_err();

        fs::write(&target, "a\n1\n").unwrap();
        ws.save(&mut item).unwrap();
        assert_eq!(
            item.store_path.as_deref(),
            Some(Path::new("resources/some_table.csv"))
        );
        assert_eq!(ws.items(), [item.clone()]);
        assert_eq!(ws.path_of(&item).unwrap(), target);

        let derived = item.derived_copy("page", Format::Html);
        assert_eq!(derived.derived_from, item.store_path);
        assert_eq!(derived.store_path, None);
        assert_eq!(
            ws.target_path_for(&derived),
            ws.root().join("exports/page.html")
        );
    }

    #[async_std::test]
    async fn test_import_reuses_cached_copy() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("data.csv");
        fs::write(&input, "a,b\n1,2\n").unwrap();
        let location = input.display().to_string();

        let ws = Workspace::open(dir.path().join("ws")).unwrap();
        let item = ws.import(&LocalClient, &location, false).await.unwrap();
        assert_eq!(item.title, "data");
        let stored = ws.path_of(&item).unwrap();
        assert_eq!(fs::read_to_string(&stored).unwrap(), "a,b\n1,2\n");

        // Change the original; the cached copy is used until we ask for a refresh.
        fs::write(&input, "a,b\n3,4\n").unwrap();
        let cached = ws.import(&LocalClient, &location, false).await.unwrap();
        assert_eq!(cached, item);
        assert_eq!(fs::read_to_string(&stored).unwrap(), "a,b\n1,2\n");

        ws.import(&LocalClient, &location, true).await.unwrap();
        assert_eq!(fs::read_to_string(&stored).unwrap(), "a,b\n3,4\n");
        assert_eq!(ws.items().len(), 1);
    }

    #[async_std::test]
    async fn test_corrupt_sidecar_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("data.csv");
        fs::write(&input, "a,b\n1,2\n").unwrap();
        let location = input.display().to_string();

        let ws = Workspace::open(dir.path().join("ws")).unwrap();
        let item = ws.import(&LocalClient, &location, false).await.unwrap();
        let stored = ws.path_of(&item).unwrap();
        fs::write(sidecar_path(&stored), "{ not json").unwrap();
        assert!(ws.items().is_empty());
        assert_eq!(ws.find_by_source(&location), None);

        // Without a usable record of the earlier import, the data is fetched again.
        fs::write(&input, "a,b\n3,4\n").unwrap();
        let item = ws.import(&LocalClient, &location, false).await.unwrap();
        assert_eq!(fs::read_to_string(ws.path_of(&item).unwrap()).unwrap(), "a,b\n3,4\n");
        assert_eq!(ws.items(), [item]);
    }
}
