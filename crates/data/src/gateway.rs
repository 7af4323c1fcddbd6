//! Data Query Gateway
//!
//! The authoritative gate in front of the external data backend: verifies
//! required entities (again, independently of extraction), serves from the
//! TTL cache, executes the call, and remaps response fields. Every failure
//! path is typed; nothing escapes uncaught.

use std::sync::Arc;
use std::time::Duration;

use callflow_core::{
    entity_value_present, DataBackend, DataQueryFailure, EntityMap, Error, QueryMethod, Result,
};
use callflow_config::DataApiConfig;
use serde_json::{Map, Value};

use crate::cache::{CacheInfo, QueryCache};
use crate::query::definition_for;

/// Cache-fronted query executor
pub struct DataQueryGateway {
    backend: Arc<dyn DataBackend>,
    cache: QueryCache,
}

impl DataQueryGateway {
    pub fn new(backend: Arc<dyn DataBackend>, cache_ttl: Duration) -> Self {
        Self {
            backend,
            cache: QueryCache::new(cache_ttl),
        }
    }

    /// Execute the query for `intent`, cache-first.
    pub async fn query(&self, intent: &str, entities: &EntityMap) -> Result<Map<String, Value>> {
        let def = definition_for(intent).ok_or_else(|| Error::UnknownIntent(intent.to_string()))?;

        let missing: Vec<String> = def
            .required_params
            .iter()
            .filter(|p| !entity_value_present(entities, p))
            .map(|p| p.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(Error::MissingEntities(missing));
        }

        let key = QueryCache::canonical_key(intent, entities);
        if let Some(hit) = self.cache.get(&key) {
            tracing::debug!(intent, "query served from cache");
            return Ok(hit);
        }

        let (url, params) = build_request(def.endpoint_template, def, entities);
        let raw = self.backend.execute(def.method, &url, &params).await?;
        let mapped = apply_mapping(raw, def.response_mapping);

        self.cache.store(key, mapped.clone());
        tracing::info!(intent, method = %def.method, "query executed");
        Ok(mapped)
    }

    /// Readiness check against the backend's health surface
    pub async fn validate_connection(&self) -> bool {
        self.backend.probe().await
    }

    pub fn cache_info(&self) -> CacheInfo {
        self.cache.info()
    }

    pub fn clear_cache(&self) -> usize {
        self.cache.clear()
    }
}

/// Substitute path placeholders and collect the remaining parameters.
/// List-valued entities collapse to their first element.
fn build_request(
    template: &str,
    def: &crate::query::QueryDefinition,
    entities: &EntityMap,
) -> (String, Map<String, Value>) {
    let first_value = |param: &str| -> Option<String> {
        entities
            .get(param)
            .and_then(|vs| vs.iter().find(|v| !v.trim().is_empty()))
            .cloned()
    };

    let mut url = template.to_string();
    let mut params = Map::new();

    for &param in def.required_params.iter().chain(def.optional_params) {
        let Some(value) = first_value(param) else {
            continue;
        };
        let placeholder = format!("{{{param}}}");
        if url.contains(&placeholder) {
            url = url.replace(&placeholder, &value);
        } else {
            params.insert(param.to_string(), Value::String(value));
        }
    }

    (url, params)
}

/// Rename known backend fields to canonical names, pass the rest through
fn apply_mapping(
    raw: Map<String, Value>,
    mapping: &[(&'static str, &'static str)],
) -> Map<String, Value> {
    let mut mapped = Map::new();
    for (field, value) in raw {
        let target = mapping
            .iter()
            .find(|(source, _)| *source == field)
            .map(|(_, target)| target.to_string())
            .unwrap_or(field);
        mapped.insert(target, value);
    }
    mapped
}

/// REST client for the external data backend
pub struct RestDataBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl RestDataBackend {
    pub fn new(config: &DataApiConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Internal(format!("failed to build data client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            timeout,
        })
    }
}

#[async_trait::async_trait]
impl DataBackend for RestDataBackend {
    async fn execute(
        &self,
        method: QueryMethod,
        url: &str,
        params: &Map<String, Value>,
    ) -> std::result::Result<Map<String, Value>, DataQueryFailure> {
        let full_url = format!("{}{}", self.base_url, url);

        let mut request = match method {
            QueryMethod::Get => {
                let query: Vec<(String, String)> = params
                    .iter()
                    .map(|(k, v)| (k.clone(), v.as_str().unwrap_or_default().to_string()))
                    .collect();
                self.client.get(&full_url).query(&query)
            }
            QueryMethod::Post => self.client.post(&full_url).json(params),
        };
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                DataQueryFailure::Timeout(self.timeout)
            } else {
                DataQueryFailure::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(DataQueryFailure::Status {
                status: status.as_u16(),
                detail,
            });
        }

        response
            .json()
            .await
            .map_err(|e| DataQueryFailure::Transport(format!("malformed response body: {e}")))
    }

    async fn probe(&self) -> bool {
        match self.client.get(format!("{}/health", self.base_url)).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                tracing::warn!(error = %e, "data backend not reachable");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingBackend {
        calls: AtomicUsize,
        urls: parking_lot::Mutex<Vec<String>>,
    }

    impl CountingBackend {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                urls: parking_lot::Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait::async_trait]
    impl DataBackend for CountingBackend {
        async fn execute(
            &self,
            _method: QueryMethod,
            url: &str,
            _params: &Map<String, Value>,
        ) -> std::result::Result<Map<String, Value>, DataQueryFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.urls.lock().push(url.to_string());
            let mut body = Map::new();
            body.insert(
                "current_status".to_string(),
                Value::String("in transit".to_string()),
            );
            body.insert("carrier".to_string(), Value::String("aramex".to_string()));
            Ok(body)
        }
    }

    fn shipment_entities() -> EntityMap {
        let mut entities = EntityMap::new();
        entities.insert("tracking_id".to_string(), vec!["ab12345".to_string()]);
        entities
    }

    #[tokio::test]
    async fn test_second_query_hits_cache() {
        let backend = CountingBackend::new();
        let gateway = DataQueryGateway::new(backend.clone(), Duration::from_secs(60));

        let first = gateway
            .query("shipment_inquiry", &shipment_entities())
            .await
            .unwrap();
        let second = gateway
            .query("shipment_inquiry", &shipment_entities())
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_ttl_requeries() {
        let backend = CountingBackend::new();
        let gateway = DataQueryGateway::new(backend.clone(), Duration::from_millis(0));

        gateway
            .query("shipment_inquiry", &shipment_entities())
            .await
            .unwrap();
        gateway
            .query("shipment_inquiry", &shipment_entities())
            .await
            .unwrap();

        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_response_mapping_renames_and_passes_through() {
        let gateway = DataQueryGateway::new(CountingBackend::new(), Duration::from_secs(60));
        let result = gateway
            .query("shipment_inquiry", &shipment_entities())
            .await
            .unwrap();

        assert_eq!(result["status"], Value::String("in transit".to_string()));
        // unmapped fields survive untouched
        assert_eq!(result["carrier"], Value::String("aramex".to_string()));
        assert!(!result.contains_key("current_status"));
    }

    #[tokio::test]
    async fn test_path_parameter_substitution() {
        let backend = CountingBackend::new();
        let gateway = DataQueryGateway::new(backend.clone(), Duration::from_secs(60));

        gateway
            .query("shipment_inquiry", &shipment_entities())
            .await
            .unwrap();

        assert_eq!(backend.urls.lock()[0], "/shipments/ab12345");
    }

    #[tokio::test]
    async fn test_unknown_intent() {
        let gateway = DataQueryGateway::new(CountingBackend::new(), Duration::from_secs(60));
        let err = gateway.query("greeting", &EntityMap::new()).await.unwrap_err();
        assert!(matches!(err, Error::UnknownIntent(_)));
    }

    #[tokio::test]
    async fn test_missing_required_entities_block_the_call() {
        let backend = CountingBackend::new();
        let gateway = DataQueryGateway::new(backend.clone(), Duration::from_secs(60));

        let mut entities = EntityMap::new();
        entities.insert("date".to_string(), vec!["12/05/2026".to_string()]);
        // present but blank still counts as missing
        entities.insert("time".to_string(), vec![" ".to_string()]);

        let err = gateway
            .query("appointment_booking", &entities)
            .await
            .unwrap_err();
        match err {
            Error::MissingEntities(missing) => {
                assert_eq!(missing, vec!["time".to_string(), "service_type".to_string()]);
            }
            other => panic!("expected MissingEntities, got {other:?}"),
        }
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_list_values_collapse_to_first() {
        let backend = CountingBackend::new();
        let gateway = DataQueryGateway::new(backend.clone(), Duration::from_secs(60));

        let mut entities = EntityMap::new();
        entities.insert(
            "tracking_id".to_string(),
            vec!["ab12345".to_string(), "cd67890".to_string()],
        );

        gateway.query("shipment_inquiry", &entities).await.unwrap();
        assert_eq!(backend.urls.lock()[0], "/shipments/ab12345");
    }
}
