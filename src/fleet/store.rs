//! Remote table storage for transformers and communication logs

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, error};
use uuid::Uuid;

use crate::config::StorageConfig;

use super::models::{
    CommunicationLogEntry, EscalationStatus, NewLogEntry, Transformer, TransformerStatus,
};
use super::StoreError;

const TRANSFORMERS_TABLE: &str = "transformers";
const LOG_TABLE: &str = "communication_logs";

/// Remote storage abstraction
///
/// Reads are by primary key or by equality on the transformer id. Writes
/// are single-row inserts or targeted field updates.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn get_transformer(&self, id: &str) -> Result<Transformer, StoreError>;

    async fn list_log_entries(
        &self,
        transformer_id: &str,
    ) -> Result<Vec<CommunicationLogEntry>, StoreError>;

    async fn get_log_entry(&self, entry_id: Uuid) -> Result<CommunicationLogEntry, StoreError>;

    async fn insert_log_entry(&self, new: NewLogEntry) -> Result<CommunicationLogEntry, StoreError>;

    async fn update_escalation(
        &self,
        entry_id: Uuid,
        status: EscalationStatus,
    ) -> Result<CommunicationLogEntry, StoreError>;

    async fn update_transformer_status(
        &self,
        id: &str,
        status: TransformerStatus,
    ) -> Result<Transformer, StoreError>;
}

/// PostgREST-style table API client
pub struct RestStore {
    http: Client,
    base_url: String,
    api_key: Option<SecretString>,
}

impl RestStore {
    pub fn new(config: &StorageConfig) -> Result<Self, StoreError> {
        let base_url = config
            .url
            .clone()
            .ok_or_else(|| StoreError::InvalidInput("storage.url is not set".to_string()))?;

        let http = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| StoreError::Request(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => req
                .header("apikey", key.expose_secret().as_str())
                .bearer_auth(key.expose_secret()),
            None => req,
        }
    }

    async fn rows<T: DeserializeOwned>(
        &self,
        req: RequestBuilder,
        what: &str,
    ) -> Result<Vec<T>, StoreError> {
        let response = self.authorize(req).send().await?;
        let response = check_status(response, what).await?;
        Ok(response.json::<Vec<T>>().await?)
    }

    async fn single<T: DeserializeOwned>(
        &self,
        req: RequestBuilder,
        what: &str,
    ) -> Result<T, StoreError> {
        self.rows(req, what)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::NotFound(what.to_string()))
    }
}

async fn check_status(response: Response, what: &str) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    error!("Storage error for {}: {} {}", what, status, body);

    if status == reqwest::StatusCode::NOT_FOUND {
        Err(StoreError::NotFound(what.to_string()))
    } else {
        Err(StoreError::Upstream(format!("Status {}: {}", status, body)))
    }
}

#[async_trait]
impl RemoteStore for RestStore {
    async fn get_transformer(&self, id: &str) -> Result<Transformer, StoreError> {
        debug!(id, "Fetching transformer");
        let req = self
            .http
            .get(self.table_url(TRANSFORMERS_TABLE))
            .query(&[("id", format!("eq.{}", id)), ("select", "*".to_string())]);
        self.single(req, &format!("transformer {}", id)).await
    }

    async fn list_log_entries(
        &self,
        transformer_id: &str,
    ) -> Result<Vec<CommunicationLogEntry>, StoreError> {
        let req = self.http.get(self.table_url(LOG_TABLE)).query(&[
            ("transformer_id", format!("eq.{}", transformer_id)),
            ("order", "created_at.asc".to_string()),
        ]);
        self.rows(req, &format!("log of {}", transformer_id)).await
    }

    async fn get_log_entry(&self, entry_id: Uuid) -> Result<CommunicationLogEntry, StoreError> {
        let req = self
            .http
            .get(self.table_url(LOG_TABLE))
            .query(&[("id", format!("eq.{}", entry_id))]);
        self.single(req, &format!("log entry {}", entry_id)).await
    }

    async fn insert_log_entry(&self, new: NewLogEntry) -> Result<CommunicationLogEntry, StoreError> {
        let entry = new.into_entry();
        let req = self
            .http
            .post(self.table_url(LOG_TABLE))
            .header("Prefer", "return=representation")
            .json(&entry);
        self.single(req, "inserted log entry").await
    }

    async fn update_escalation(
        &self,
        entry_id: Uuid,
        status: EscalationStatus,
    ) -> Result<CommunicationLogEntry, StoreError> {
        let req = self
            .http
            .patch(self.table_url(LOG_TABLE))
            .query(&[("id", format!("eq.{}", entry_id))])
            .header("Prefer", "return=representation")
            .json(&json!({ "escalation_status": status }));
        self.single(req, &format!("log entry {}", entry_id)).await
    }

    async fn update_transformer_status(
        &self,
        id: &str,
        status: TransformerStatus,
    ) -> Result<Transformer, StoreError> {
        let req = self
            .http
            .patch(self.table_url(TRANSFORMERS_TABLE))
            .query(&[("id", format!("eq.{}", id))])
            .header("Prefer", "return=representation")
            .json(&json!({ "status": status }));
        self.single(req, &format!("transformer {}", id)).await
    }
}

/// Process-local store for development and tests
#[derive(Default)]
pub struct InMemoryStore {
    transformers: RwLock<HashMap<String, Transformer>>,
    entries: RwLock<Vec<CommunicationLogEntry>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transformers(transformers: Vec<Transformer>) -> Self {
        Self {
            transformers: RwLock::new(
                transformers.into_iter().map(|t| (t.id.clone(), t)).collect(),
            ),
            entries: RwLock::new(Vec::new()),
        }
    }
}

#[async_trait]
impl RemoteStore for InMemoryStore {
    async fn get_transformer(&self, id: &str) -> Result<Transformer, StoreError> {
        self.transformers
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("transformer {}", id)))
    }

    async fn list_log_entries(
        &self,
        transformer_id: &str,
    ) -> Result<Vec<CommunicationLogEntry>, StoreError> {
        let mut entries: Vec<CommunicationLogEntry> = self
            .entries
            .read()
            .await
            .iter()
            .filter(|e| e.transformer_id == transformer_id)
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.created_at);
        Ok(entries)
    }

    async fn get_log_entry(&self, entry_id: Uuid) -> Result<CommunicationLogEntry, StoreError> {
        self.entries
            .read()
            .await
            .iter()
            .find(|e| e.id == entry_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("log entry {}", entry_id)))
    }

    async fn insert_log_entry(&self, new: NewLogEntry) -> Result<CommunicationLogEntry, StoreError> {
        let entry = new.into_entry();
        self.entries.write().await.push(entry.clone());
        Ok(entry)
    }

    async fn update_escalation(
        &self,
        entry_id: Uuid,
        status: EscalationStatus,
    ) -> Result<CommunicationLogEntry, StoreError> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .iter_mut()
            .find(|e| e.id == entry_id)
            .ok_or_else(|| StoreError::NotFound(format!("log entry {}", entry_id)))?;
        entry.escalation_status = status;
        Ok(entry.clone())
    }

    async fn update_transformer_status(
        &self,
        id: &str,
        status: TransformerStatus,
    ) -> Result<Transformer, StoreError> {
        let mut transformers = self.transformers.write().await;
        let transformer = transformers
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("transformer {}", id)))?;
        transformer.status = status;
        Ok(transformer.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet::models::Role;
    use mockito::Matcher;

    fn transformer_json() -> serde_json::Value {
        json!({
            "id": "TX-101",
            "name": "Harbor T1",
            "location": "Harbor Rd",
            "zone": "North",
            "coordinates": {"lat": 51.5, "lng": -0.12},
            "status": "Operational",
            "criticality": "Medium",
            "last_inspection": "2024-01-15",
            "next_service_date": "2024-07-15",
            "manufacturer": "ABB",
            "serviced_by": "GridCare",
            "load": 61.0
        })
    }

    fn store_for(server: &mockito::Server) -> RestStore {
        RestStore::new(&StorageConfig {
            url: Some(format!("{}/", server.url())),
            api_key: Some(SecretString::new("anon-key".to_string())),
            ..StorageConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_rest_get_transformer_by_key() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/rest/v1/transformers")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("id".into(), "eq.TX-101".into()),
                Matcher::UrlEncoded("select".into(), "*".into()),
            ]))
            .match_header("apikey", "anon-key")
            .match_header("authorization", "Bearer anon-key")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!([transformer_json()]).to_string())
            .create_async()
            .await;

        let transformer = store_for(&server).get_transformer("TX-101").await.unwrap();
        assert_eq!(transformer.manufacturer, "ABB");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rest_empty_result_is_not_found() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/rest/v1/transformers")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let result = store_for(&server).get_transformer("TX-404").await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_rest_insert_returns_representation() {
        let mut server = mockito::Server::new_async().await;
        let row = json!([{
            "id": "6f1c1b2e-8a0c-4d43-9c55-2b6f2b3a1e10",
            "transformer_id": "TX-101",
            "author_name": "Dana",
            "author_role": "Technician",
            "created_at": "2024-02-01T09:00:00Z",
            "content": "Oil sample taken",
            "parent_id": null,
            "escalation_status": "none"
        }]);
        let mock = server
            .mock("POST", "/rest/v1/communication_logs")
            .match_header("prefer", "return=representation")
            .match_body(Matcher::PartialJson(json!({
                "transformer_id": "TX-101",
                "content": "Oil sample taken"
            })))
            .with_status(201)
            .with_body(row.to_string())
            .create_async()
            .await;

        let entry = store_for(&server)
            .insert_log_entry(NewLogEntry {
                transformer_id: "TX-101".to_string(),
                author_name: "Dana".to_string(),
                author_role: Role::Technician,
                content: "Oil sample taken".to_string(),
                parent_id: None,
            })
            .await
            .unwrap();
        assert_eq!(entry.author_name, "Dana");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rest_server_error_is_upstream() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("PATCH", "/rest/v1/communication_logs")
            .match_query(Matcher::Any)
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let result = store_for(&server)
            .update_escalation(Uuid::new_v4(), EscalationStatus::Escalated)
            .await;
        assert!(matches!(result, Err(StoreError::Upstream(_))));
    }

    #[test]
    fn test_rest_store_requires_url() {
        assert!(RestStore::new(&StorageConfig::default()).is_err());
    }

    #[tokio::test]
    async fn test_in_memory_escalation_roundtrip() {
        let store = InMemoryStore::new();
        let entry = store
            .insert_log_entry(NewLogEntry {
                transformer_id: "TX-1".to_string(),
                author_name: "Sam".to_string(),
                author_role: Role::Engineer,
                content: "Bushing hot spot".to_string(),
                parent_id: None,
            })
            .await
            .unwrap();

        let updated = store
            .update_escalation(entry.id, EscalationStatus::Escalated)
            .await
            .unwrap();
        assert_eq!(updated.escalation_status, EscalationStatus::Escalated);
        assert_eq!(store.list_log_entries("TX-1").await.unwrap().len(), 1);
        assert!(store.list_log_entries("TX-2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_in_memory_store_seeded_with_transformers() {
        let transformer: Transformer = serde_json::from_value(transformer_json()).unwrap();
        let store = InMemoryStore::with_transformers(vec![transformer.clone()]);

        assert_eq!(store.get_transformer("TX-101").await.unwrap(), transformer);
        assert!(matches!(
            store.get_transformer("TX-999").await,
            Err(StoreError::NotFound(_))
        ));

        let updated = store
            .update_transformer_status("TX-101", TransformerStatus::UnderMaintenance)
            .await
            .unwrap();
        assert_eq!(updated.status, TransformerStatus::UnderMaintenance);
    }
}
