//! Per-login operator context

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use super::cache::FleetCache;
use super::models::Role;
use super::StoreError;

/// Who is acting
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Operator {
    pub name: String,
    pub role: Role,
}

impl Operator {
    pub fn new(name: impl Into<String>, role: Role) -> Result<Self, StoreError> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(StoreError::InvalidInput("operator name is empty".to_string()));
        }
        Ok(Self { name, role })
    }
}

/// Explicit session state passed to request handling
///
/// Holds the operator's identity and the shared fleet cache. Ending the
/// session with [`OperatorContext::logout`] persists the cache.
#[derive(Clone)]
pub struct OperatorContext {
    operator: Operator,
    fleet: Arc<RwLock<FleetCache>>,
    started_at: DateTime<Utc>,
}

impl OperatorContext {
    pub fn new(operator: Operator, fleet: Arc<RwLock<FleetCache>>) -> Self {
        Self {
            operator,
            fleet,
            started_at: Utc::now(),
        }
    }

    pub fn operator(&self) -> &Operator {
        &self.operator
    }

    pub fn role(&self) -> Role {
        self.operator.role
    }

    pub fn fleet(&self) -> &Arc<RwLock<FleetCache>> {
        &self.fleet
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Persist the fleet cache and end the session
    pub async fn logout(self) -> Result<(), StoreError> {
        self.fleet.read().await.persist().await?;
        info!(
            operator = %self.operator.name,
            role = %self.operator.role,
            duration_secs = (Utc::now() - self.started_at).num_seconds(),
            "Operator logged out"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_requires_name() {
        assert!(Operator::new("  ", Role::Manager).is_err());
        assert_eq!(Operator::new(" Ana ", Role::Engineer).unwrap().name, "Ana");
    }

    #[tokio::test]
    async fn test_logout_persists_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fleet.json");
        let fleet = Arc::new(RwLock::new(FleetCache::load(&path).await.unwrap()));

        let context = OperatorContext::new(Operator::new("Ana", Role::Manager).unwrap(), fleet);
        assert_eq!(context.role(), Role::Manager);
        context.logout().await.unwrap();

        assert!(path.exists());
    }
}
