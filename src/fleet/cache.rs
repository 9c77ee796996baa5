//! Local persisted fleet cache
//!
//! A JSON file holding the transformer list that backs list and map views.
//! Every mutation rewrites the file. It is never reconciled with remote
//! storage and may drift from it.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::analysis::Criticality;

use super::models::{Transformer, TransformerStatus};
use super::StoreError;

/// List/map view filter; all set fields must match
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FleetFilter {
    pub zone: Option<String>,
    pub status: Option<TransformerStatus>,
    pub criticality: Option<Criticality>,
    /// Case-insensitive substring of id, name or location
    pub search: Option<String>,
}

impl FleetFilter {
    pub fn matches(&self, transformer: &Transformer) -> bool {
        if let Some(zone) = &self.zone {
            if !transformer.zone.eq_ignore_ascii_case(zone.trim()) {
                return false;
            }
        }
        if self.status.is_some_and(|s| s != transformer.status) {
            return false;
        }
        if self.criticality.is_some_and(|c| c != transformer.criticality) {
            return false;
        }
        if let Some(search) = &self.search {
            let needle = search.trim().to_lowercase();
            if !needle.is_empty()
                && ![&transformer.id, &transformer.name, &transformer.location]
                    .iter()
                    .any(|field| field.to_lowercase().contains(&needle))
            {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct FleetSummary {
    pub total: usize,
    pub operational: usize,
    pub needs_attention: usize,
    pub under_maintenance: usize,
}

pub struct FleetCache {
    path: PathBuf,
    transformers: Vec<Transformer>,
}

impl FleetCache {
    /// Read the cache file; a missing file is an empty fleet
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let transformers = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<Vec<Transformer>>(&bytes)
                .map_err(|e| StoreError::Decode(format!("{}: {}", path.display(), e)))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        info!(path = %path.display(), count = transformers.len(), "Fleet cache loaded");
        Ok(Self { path, transformers })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn all(&self) -> &[Transformer] {
        &self.transformers
    }

    pub fn get(&self, id: &str) -> Option<&Transformer> {
        self.transformers.iter().find(|t| t.id == id)
    }

    pub fn list(&self, filter: &FleetFilter) -> Vec<Transformer> {
        self.transformers
            .iter()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect()
    }

    pub fn summary(&self) -> FleetSummary {
        self.transformers
            .iter()
            .fold(FleetSummary::default(), |mut summary, t| {
                summary.total += 1;
                match t.status {
                    TransformerStatus::Operational => summary.operational += 1,
                    TransformerStatus::NeedsAttention => summary.needs_attention += 1,
                    TransformerStatus::UnderMaintenance => summary.under_maintenance += 1,
                }
                summary
            })
    }

    pub async fn upsert(&mut self, transformer: Transformer) -> Result<(), StoreError> {
        match self.transformers.iter_mut().find(|t| t.id == transformer.id) {
            Some(existing) => *existing = transformer,
            None => self.transformers.push(transformer),
        }
        self.persist().await
    }

    pub async fn set_status(
        &mut self,
        id: &str,
        status: TransformerStatus,
    ) -> Result<Transformer, StoreError> {
        let transformer = self
            .transformers
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("transformer {}", id)))?;
        transformer.status = status;
        let updated = transformer.clone();
        self.persist().await?;
        Ok(updated)
    }

    pub async fn remove(&mut self, id: &str) -> Result<Option<Transformer>, StoreError> {
        let removed = self
            .transformers
            .iter()
            .position(|t| t.id == id)
            .map(|idx| self.transformers.remove(idx));
        if removed.is_some() {
            self.persist().await?;
        }
        Ok(removed)
    }

    /// Write the whole list to a temp file and rename it into place
    pub async fn persist(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let bytes = serde_json::to_vec_pretty(&self.transformers)
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!(path = %self.path.display(), count = self.transformers.len(), "Fleet cache written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet::models::Coordinates;
    use chrono::NaiveDate;

    fn transformer(id: &str, zone: &str, status: TransformerStatus, criticality: Criticality) -> Transformer {
        Transformer {
            id: id.to_string(),
            name: format!("{} Substation", id),
            location: "Ring Road".to_string(),
            zone: zone.to_string(),
            coordinates: Coordinates { lat: 12.97, lng: 77.59 },
            status,
            criticality,
            last_inspection: NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
            next_service_date: NaiveDate::from_ymd_opt(2024, 7, 10).unwrap(),
            manufacturer: "Hitachi".to_string(),
            serviced_by: "GridCare".to_string(),
            load: 55.0,
        }
    }

    #[tokio::test]
    async fn test_missing_file_is_empty_fleet() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FleetCache::load(dir.path().join("fleet.json")).await.unwrap();
        assert!(cache.all().is_empty());
        assert_eq!(cache.summary().total, 0);
    }

    #[tokio::test]
    async fn test_mutations_are_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("fleet.json");

        let mut cache = FleetCache::load(&path).await.unwrap();
        cache
            .upsert(transformer("TX-1", "North", TransformerStatus::Operational, Criticality::High))
            .await
            .unwrap();
        cache
            .upsert(transformer("TX-2", "South", TransformerStatus::Operational, Criticality::Low))
            .await
            .unwrap();
        cache.set_status("TX-2", TransformerStatus::UnderMaintenance).await.unwrap();

        let reloaded = FleetCache::load(&path).await.unwrap();
        assert_eq!(reloaded.all().len(), 2);
        assert_eq!(
            reloaded.get("TX-2").unwrap().status,
            TransformerStatus::UnderMaintenance
        );

        cache.remove("TX-1").await.unwrap();
        let reloaded = FleetCache::load(&path).await.unwrap();
        assert!(reloaded.get("TX-1").is_none());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fleet.json");
        std::fs::write(&path, b"{not json").unwrap();
        assert!(matches!(FleetCache::load(&path).await, Err(StoreError::Decode(_))));
    }

    #[tokio::test]
    async fn test_filter_and_summary() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = FleetCache::load(dir.path().join("fleet.json")).await.unwrap();
        for t in [
            transformer("TX-1", "North", TransformerStatus::Operational, Criticality::High),
            transformer("TX-2", "North", TransformerStatus::NeedsAttention, Criticality::High),
            transformer("TX-3", "South", TransformerStatus::NeedsAttention, Criticality::Low),
        ] {
            cache.upsert(t).await.unwrap();
        }

        let north_attention = cache.list(&FleetFilter {
            zone: Some("north".to_string()),
            status: Some(TransformerStatus::NeedsAttention),
            ..FleetFilter::default()
        });
        assert_eq!(north_attention.len(), 1);
        assert_eq!(north_attention[0].id, "TX-2");

        let search = cache.list(&FleetFilter {
            search: Some("tx-3 sub".to_string()),
            ..FleetFilter::default()
        });
        assert_eq!(search.len(), 1);

        assert_eq!(
            cache.summary(),
            FleetSummary {
                total: 3,
                operational: 1,
                needs_attention: 2,
                under_maintenance: 0
            }
        );
    }
}
