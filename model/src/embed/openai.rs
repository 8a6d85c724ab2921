//! Embeddings from an OpenAI-compatible API.

use super::Embedder;
use anyhow::Error;
use async_trait::async_trait;
use clap::Args;
use derive_more::Into;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use surf::Url;

/// Inputs per request.
const MAX_BATCH: usize = 100;

/// Requests in flight at once.
const MAX_CONCURRENT_REQUESTS: usize = 4;

/// Options for connecting to an embeddings API.
#[derive(Clone, Debug, Args)]
pub struct OpenAiOptions {
    /// API key for the embeddings API.
    #[clap(long = "openai-api-key", env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Embedding model to request.
    #[clap(
        long = "openai-model",
        env = "GDVIZ_OPENAI_MODEL",
        default_value = "text-embedding-3-small"
    )]
    pub model: String,

    /// Base URL of the API. Requests go to `<URL>/embeddings`.
    #[clap(
        long = "openai-base-url",
        env = "GDVIZ_OPENAI_BASE_URL",
        default_value = "https://api.openai.com/v1/"
    )]
    pub base_url: Url,
}

impl OpenAiOptions {
    /// Build an embedder from these options.
    pub fn connect(&self) -> Result<OpenAiEmbedder, Error> {
        let api_key = self.api_key.clone().ok_or_else(|| {
            Error::msg("an OpenAI API key is required for the openai embedder")
        })?;
        OpenAiEmbedder::new(self.base_url.clone(), api_key, self.model.clone())
    }
}

/// An embedder backed by an OpenAI-compatible `/embeddings` endpoint.
pub struct OpenAiEmbedder {
    client: surf::Client,
    api_key: String,
    model: String,
}

impl OpenAiEmbedder {
    pub fn new(mut base_url: Url, api_key: String, model: String) -> Result<Self, Error> {
        // Relative paths only resolve under the base if it ends in a slash.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let client: surf::Client = surf::Config::new()
            .set_base_url(base_url)
            .try_into()
            .map_err(|err| Error::msg(format!("unable to build HTTP client: {err:?}")))?;
        Ok(Self {
            client,
            api_key,
            model,
        })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, Error> {
        tracing::debug!("requesting {} embeddings from {}", texts.len(), self.model);
        let mut res = self
            .client
            .post("embeddings")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .body_json(&EmbeddingRequest {
                model: &self.model,
                input: texts,
            })
            .map_err(Error::msg)?
            .await
            .map_err(Error::msg)?;
        let status = res.status();
        let body: Response = res.body_json().await.map_err(|err| {
            Error::msg(format!("cannot parse embeddings response ({status}): {err}"))
        })?;

        let mut data = match body {
            Response::Ok(data) => Vec::<Embedding>::from(data),
            Response::Err { error } => {
                return Err(Error::msg(format!("OpenAI API error: {}", error.message)))
            }
        };
        if data.len() != texts.len() {
            return Err(Error::msg(format!(
                "embedder returned {} vectors for {} inputs",
                data.len(),
                texts.len()
            )));
        }
        data.sort_by_key(|embedding| embedding.index);
        Ok(data.into_iter().map(|embedding| embedding.embedding).collect())
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn name(&self) -> String {
        format!("openai:{}", self.model)
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, Error> {
        let requests = texts
            .chunks(MAX_BATCH)
            .map(|batch| self.embed_batch(batch))
            .collect::<Vec<_>>();
        let batches = stream::iter(requests)
            .buffered(MAX_CONCURRENT_REQUESTS)
            .try_collect::<Vec<_>>()
            .await?;
        Ok(batches.into_iter().flatten().collect())
    }
}

#[derive(Clone, Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

/// The body of an embeddings response.
///
/// Successful responses have the form
/// ```json
/// {
///     "object": "list",
///     "data": [{ "object": "embedding", "index": 0, "embedding": [...] }, ...],
///     "model": "..."
/// }
/// ```
/// while errors carry `{ "error": { "message": "..." } }`.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
enum Response {
    Ok(EmbeddingList),
    Err { error: ApiError },
}

#[derive(Clone, Debug, Deserialize, Into)]
struct EmbeddingList {
    data: Vec<Embedding>,
}

#[derive(Clone, Debug, Deserialize)]
struct Embedding {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Clone, Debug, Deserialize)]
struct ApiError {
    message: String,
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testing::serve;
    use serde_json::{json, Value};

    /// An embeddings server which returns `[index, len(input)]` for each input, listed in reverse.
    fn mock_app() -> tide::Server<()> {
        let mut app = tide::new();
        app.at("/v1/embeddings")
            .post(|mut req: tide::Request<()>| async move {
                let auth = req
                    .header("Authorization")
                    .map(|values| values.last().as_str().to_string());
                if auth.as_deref() != Some("Bearer secret") {
                    let mut res = tide::Response::new(401);
                    res.set_body(json!({ "error": { "message": "invalid API key" } }));
                    return Ok(res);
                }

                let body: Value = req.body_json().await?;
                let inputs = body["input"].as_array().cloned().unwrap_or_default();
                let data = inputs
                    .iter()
                    .enumerate()
                    .rev()
                    .map(|(i, input)| {
                        json!({
                            "object": "embedding",
                            "index": i,
                            "embedding": [i as f32, input.as_str().unwrap_or("").len() as f32]
                        })
                    })
                    .collect::<Vec<_>>();
                let mut res = tide::Response::new(200);
                res.set_body(json!({ "object": "list", "data": data, "model": body["model"] }));
                Ok(res)
            });
        app
    }

    fn embedder(base: &str, key: &str) -> OpenAiEmbedder {
        let options = OpenAiOptions {
            api_key: Some(key.into()),
            model: "test-model".into(),
            base_url: format!("{base}/v1").parse().unwrap(),
        };
        options.connect().unwrap()
    }

    #[test]
    fn test_missing_key() {
        let options = OpenAiOptions {
            api_key: None,
            model: "test-model".into(),
            base_url: "https://api.openai.com/v1/".parse().unwrap(),
        };
        let err = options.connect().err().unwrap();
        assert!(err.to_string().contains("API key is required"), "{err}");
    }

    #[async_std::test]
    async fn test_embed() {
        let base = serve(mock_app()).await.unwrap();
        let embedder = embedder(&base, "secret");
        assert_eq!(embedder.name(), "openai:test-model");

        // More than one batch, to exercise reordering within and across batches.
        let texts = (0..MAX_BATCH + 5)
            .map(|i| "x".repeat(i % 7))
            .collect::<Vec<_>>();
        let vectors = embedder.embed(&texts).await.unwrap();
        assert_eq!(vectors.len(), texts.len());
        for (i, vector) in vectors.iter().enumerate() {
            let index_in_batch = (i % MAX_BATCH) as f32;
            assert_eq!(vector, &[index_in_batch, (i % 7) as f32]);
        }
    }

    #[async_std::test]
    async fn test_api_error() {
        let base = serve(mock_app()).await.unwrap();
        let embedder = embedder(&base, "wrong");
        let err = embedder.embed(&["hi".to_string()]).await.unwrap_err();
        assert_eq!(err.to_string(), "OpenAI API error: invalid API key");
    }
}
