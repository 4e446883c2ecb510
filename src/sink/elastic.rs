use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;

use crate::error::{Error, Result};
use crate::sink::{BulkApi, BulkResponse};

/// Thin Elasticsearch HTTP client. Connection pooling, TLS and timeouts are
/// reqwest's business; retry policy belongs to the operator re-running the
/// tool.
pub struct ElasticClient {
    http: reqwest::Client,
    base: String,
}

impl ElasticClient {
    pub fn new(base_uri: impl Into<String>) -> Self {
        let base = base_uri.into().trim_end_matches('/').to_owned();
        Self {
            http: reqwest::Client::new(),
            base,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base, path)
    }
}

#[async_trait]
impl BulkApi for ElasticClient {
    async fn bulk(&self, index: &str, body: String) -> Result<BulkResponse> {
        let response = self
            .http
            .post(self.url(&format!("{index}/_bulk")))
            .header(CONTENT_TYPE, "application/x-ndjson")
            .body(body)
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json::<BulkResponse>().await?)
    }

    async fn create_index(&self, name: &str, mappings: &serde_json::Value) -> Result<()> {
        let response = self
            .http
            .put(self.url(name))
            .json(mappings)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        if status.as_u16() == 401 {
            return Err(Error::Unauthorized {
                context: format!("creating index {name:?}"),
            });
        }

        let reason = response.text().await.unwrap_or_default();
        if status.as_u16() == 400
            && (reason.contains("already exists")
                || reason.contains("resource_already_exists_exception"))
        {
            #[cfg(feature = "tracing")]
            tracing::info!(index = name, "index already exists, continuing");
            return Ok(());
        }

        // Anything else is suspicious but not worth stopping the run over.
        eprintln!(
            "index creation for {name:?} returned status {status}: {}",
            if reason.is_empty() { "<no body>" } else { reason.as_str() }
        );
        Ok(())
    }
}
