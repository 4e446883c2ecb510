use crate::error::{Error, Result};

pub const DEFAULT_BATCH_SIZE: usize = 500;
pub const DEFAULT_MAX_IN_FLIGHT: usize = 4;

/// Everything the ingestion pipeline needs to know about a run.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Base URI of the Elasticsearch node.
    pub elastic_uri: String,
    /// Target index for every bulk operation.
    pub index: String,
    /// Documents per batch; the final batch may be smaller.
    pub batch_size: usize,
    /// Top-level keys ignored by the content hash.
    pub exclude_keys: Vec<String>,
    /// Upsert by `id_field` instead of create-by-content-hash.
    pub upsert: bool,
    /// Designated id field; required when `upsert` is set.
    pub id_field: String,
    /// Count skipped duplicates in the aggregate summary.
    pub verbose: bool,
    /// Maximum concurrent in-flight bulk requests.
    pub max_in_flight: usize,
}

impl IngestConfig {
    pub fn new(elastic_uri: impl Into<String>, index: impl Into<String>) -> Self {
        Self {
            elastic_uri: elastic_uri.into(),
            index: index.into(),
            batch_size: DEFAULT_BATCH_SIZE,
            exclude_keys: Vec::new(),
            upsert: false,
            id_field: String::new(),
            verbose: false,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }

    pub fn batch_size(mut self, n: usize) -> Self {
        self.batch_size = n.max(1);
        self
    }

    pub fn exclude_keys(mut self, keys: Vec<String>) -> Self {
        self.exclude_keys = keys;
        self
    }

    pub fn upsert(mut self, id_field: impl Into<String>) -> Self {
        self.upsert = true;
        self.id_field = id_field.into();
        self
    }

    pub fn verbose(mut self, yes: bool) -> Self {
        self.verbose = yes;
        self
    }

    pub fn max_in_flight(mut self, n: usize) -> Self {
        self.max_in_flight = n.max(1);
        self
    }

    /// Pre-flight validation; fails before any I/O happens.
    pub fn validate(&self) -> Result<()> {
        if self.index.is_empty() {
            return Err(Error::MissingIndex);
        }
        if self.upsert && self.id_field.is_empty() {
            return Err(Error::config("upsert mode requires an id field"));
        }
        Ok(())
    }
}
