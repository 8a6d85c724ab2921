//! An HTTP client for remote resources.

use super::{Resource, ResourceMetadata, Source};
use anyhow::Error;
use async_trait::async_trait;
use percent_encoding::percent_decode_str;
use surf::{middleware::Redirect, Url};

/// A source which downloads resources over HTTP.
#[derive(Clone, Debug)]
pub struct Client {
    client: surf::Client,
}

impl Client {
    pub fn new() -> Self {
        Self {
            client: surf::Client::new().with(Redirect::default()),
        }
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Source for Client {
    async fn describe(&self, location: &str) -> Result<ResourceMetadata, Error> {
        let url: Url = location.parse()?;
        let name = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|segment| !segment.is_empty())
            .map(percent_decode)
            .unwrap_or_else(|| url.host_str().unwrap_or("download").to_string());
        Ok(ResourceMetadata {
            location: url.to_string(),
            name,
        })
    }

    async fn load(&self, meta: &ResourceMetadata) -> Result<Resource, Error> {
        tracing::info!(url = %meta.location, "fetching resource");
        let mut res = self
            .client
            .get(&meta.location)
            .await
            .map_err(Error::msg)?;
        if !res.status().is_success() {
            return Err(Error::msg(format!(
                "failed to fetch {}: {}",
                meta.location,
                res.status()
            )));
        }
        let bytes = res.body_bytes().await.map_err(Error::msg)?;
        tracing::info!("fetched {} bytes from {}", bytes.len(), meta.location);
        Ok(Resource::new(meta.clone(), bytes))
    }
}

/// Decode `%XX` escapes in a URL path segment.
///
/// Malformed escapes are kept verbatim.
fn percent_decode(segment: &str) -> String {
    percent_decode_str(segment).decode_utf8_lossy().into_owned()
}
