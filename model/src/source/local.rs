//! A source which reads from the local file system.

use super::{Resource, ResourceMetadata, Source};
use anyhow::{Context, Error};
use async_trait::async_trait;
use std::fs;
use std::path::Path;

/// A source which reads resources from the local file system instead of the network.
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalClient;

#[async_trait]
impl Source for LocalClient {
    async fn describe(&self, location: &str) -> Result<ResourceMetadata, Error> {
        let path = Path::new(location);
        if !path.is_file() {
            return Err(Error::msg(format!("{location} is not a file")));
        }
        let path = fs::canonicalize(path).with_context(|| format!("unable to resolve {location}"))?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| Error::msg(format!("{location} has no file name")))?;
        Ok(ResourceMetadata {
            location: path.display().to_string(),
            name,
        })
    }

    async fn load(&self, meta: &ResourceMetadata) -> Result<Resource, Error> {
        tracing::info!(path = %meta.location, "reading resource");
        let bytes =
            fs::read(&meta.location).with_context(|| format!("unable to read {}", meta.location))?;
        Ok(Resource::new(meta.clone(), bytes))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[async_std::test]
    async fn test_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("people.csv");
        fs::write(&path, "a,b\n1,2\n").unwrap();

        let meta = LocalClient
            .describe(&path.display().to_string())
            .await
            .unwrap();
        assert_eq!(meta.name, "people.csv");
        assert_eq!(meta.title(), "people");

        let res = LocalClient.load(&meta).await.unwrap();
        assert_eq!(res.bytes(), b"a,b\n1,2\n");
    }

    #[async_std::test]
    async fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.csv");
        let err = LocalClient
            .describe(&path.display().to_string())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("is not a file"), "{err}");
    }
}
