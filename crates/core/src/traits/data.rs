//! Data backend trait

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::DataQueryFailure;

/// HTTP method a query definition uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QueryMethod {
    Get,
    Post,
}

impl std::fmt::Display for QueryMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryMethod::Get => write!(f, "GET"),
            QueryMethod::Post => write!(f, "POST"),
        }
    }
}

/// The external data service the query gateway talks to.
///
/// `url` already has path parameters substituted; `params` carries the
/// remaining query/body parameters (one value per key).
#[async_trait]
pub trait DataBackend: Send + Sync + 'static {
    async fn execute(
        &self,
        method: QueryMethod,
        url: &str,
        params: &serde_json::Map<String, serde_json::Value>,
    ) -> std::result::Result<serde_json::Map<String, serde_json::Value>, DataQueryFailure>;

    /// Reachability check. Backends without a health surface report true.
    async fn probe(&self) -> bool {
        true
    }
}
