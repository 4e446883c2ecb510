//! The write side: the bulk API seam, the Elasticsearch client behind it,
//! and the dispatching sink stage.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::Result;

pub mod bulk;
pub mod elastic;

pub use bulk::BulkSink;
pub use elastic::ElasticClient;

/// What the pipeline needs from a search-engine client. Tests substitute
/// their own implementation at this seam.
#[async_trait]
pub trait BulkApi: Send + Sync {
    /// Submits one NDJSON bulk body against `index`; a single network
    /// exchange regardless of how many operations it carries.
    async fn bulk(&self, index: &str, body: String) -> Result<BulkResponse>;

    /// Creates `name` with the given mappings. "Already exists" responses
    /// are not an error; 401 is fatal.
    async fn create_index(&self, name: &str, mappings: &serde_json::Value) -> Result<()>;
}

/// Response of one bulk call; `items` is aligned 1:1 with the operations
/// that were sent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BulkResponse {
    #[serde(default)]
    pub errors: bool,
    #[serde(default)]
    pub items: Vec<BulkItem>,
}

/// One response item, keyed by its action name (`create` or `update`) the
/// way the wire protocol frames it.
#[derive(Debug, Clone, Deserialize)]
pub struct BulkItem(pub BTreeMap<String, ItemDetail>);

impl BulkItem {
    pub fn ok(action: &str, status: u16) -> Self {
        Self(BTreeMap::from([(
            action.to_owned(),
            ItemDetail {
                status,
                error: None,
            },
        )]))
    }

    pub fn failed(action: &str, status: u16, kind: &str, reason: Option<&str>) -> Self {
        Self(BTreeMap::from([(
            action.to_owned(),
            ItemDetail {
                status,
                error: Some(BulkError {
                    kind: kind.to_owned(),
                    reason: reason.map(str::to_owned),
                }),
            },
        )]))
    }

    fn detail(&self) -> Option<&ItemDetail> {
        self.0.values().next()
    }

    pub fn status(&self) -> u16 {
        self.detail().map(|d| d.status).unwrap_or(0)
    }

    pub fn error(&self) -> Option<&BulkError> {
        self.detail().and_then(|d| d.error.as_ref())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ItemDetail {
    #[serde(default)]
    pub status: u16,
    #[serde(default)]
    pub error: Option<BulkError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BulkError {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub reason: Option<String>,
}
