//! Communication log service
//!
//! Mutations are last-write-wins: no version check is made, so two
//! operators changing the same entry concurrently both succeed and the
//! later write is what remains.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::metrics::METRICS;

use super::context::Operator;
use super::models::{CommunicationLogEntry, EscalationStatus, LogThread, NewLogEntry};
use super::store::RemoteStore;
use super::StoreError;

/// Longest note accepted
pub const MAX_NOTE_CHARS: usize = 5_000;

#[derive(Clone)]
pub struct CommunicationLog {
    store: Arc<dyn RemoteStore>,
}

impl CommunicationLog {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self { store }
    }

    /// Top-level notes newest first, each with its replies oldest first
    pub async fn thread(&self, transformer_id: &str) -> Result<Vec<LogThread>, StoreError> {
        let entries = self.store.list_log_entries(transformer_id).await?;
        Ok(build_threads(entries))
    }

    pub async fn post_note(
        &self,
        operator: &Operator,
        transformer_id: &str,
        content: &str,
    ) -> Result<CommunicationLogEntry, StoreError> {
        let content = check_content(content)?;
        let result = self
            .store
            .insert_log_entry(NewLogEntry {
                transformer_id: transformer_id.to_string(),
                author_name: operator.name.clone(),
                author_role: operator.role,
                content,
                parent_id: None,
            })
            .await;
        METRICS.record_log_mutation("note", result.is_ok());
        result
    }

    /// Replies always attach to the top-level note of the thread
    pub async fn reply(
        &self,
        operator: &Operator,
        transformer_id: &str,
        parent_id: Uuid,
        content: &str,
    ) -> Result<CommunicationLogEntry, StoreError> {
        let content = check_content(content)?;

        let parent = self.store.get_log_entry(parent_id).await?;
        if parent.transformer_id != transformer_id {
            return Err(StoreError::InvalidInput(format!(
                "entry {} belongs to transformer {}",
                parent_id, parent.transformer_id
            )));
        }

        let result = self
            .store
            .insert_log_entry(NewLogEntry {
                transformer_id: transformer_id.to_string(),
                author_name: operator.name.clone(),
                author_role: operator.role,
                content,
                parent_id: Some(parent.parent_id.unwrap_or(parent.id)),
            })
            .await;
        METRICS.record_log_mutation("reply", result.is_ok());
        result
    }

    /// Any role may escalate an entry that is not already escalated
    pub async fn escalate(
        &self,
        operator: &Operator,
        entry_id: Uuid,
    ) -> Result<CommunicationLogEntry, StoreError> {
        let entry = self.store.get_log_entry(entry_id).await?;
        if entry.escalation_status == EscalationStatus::Escalated {
            METRICS.record_log_mutation("escalate", false);
            return Err(StoreError::Conflict(format!("entry {} is already escalated", entry_id)));
        }

        let result = self
            .store
            .update_escalation(entry_id, EscalationStatus::Escalated)
            .await;
        METRICS.record_log_mutation("escalate", result.is_ok());
        if result.is_ok() {
            info!(entry_id = %entry_id, operator = %operator.name, "Log entry escalated");
        }
        result
    }

    /// Managers and engineers close an escalated entry
    pub async fn resolve(
        &self,
        operator: &Operator,
        entry_id: Uuid,
    ) -> Result<CommunicationLogEntry, StoreError> {
        if !operator.role.can_resolve() {
            METRICS.record_log_mutation("resolve", false);
            return Err(StoreError::Forbidden(format!(
                "{} cannot resolve escalations",
                operator.role
            )));
        }

        let entry = self.store.get_log_entry(entry_id).await?;
        if entry.escalation_status != EscalationStatus::Escalated {
            METRICS.record_log_mutation("resolve", false);
            return Err(StoreError::Conflict(format!("entry {} is not escalated", entry_id)));
        }

        let result = self
            .store
            .update_escalation(entry_id, EscalationStatus::Resolved)
            .await;
        METRICS.record_log_mutation("resolve", result.is_ok());
        if result.is_ok() {
            info!(entry_id = %entry_id, operator = %operator.name, "Log entry resolved");
        }
        result
    }
}

fn check_content(content: &str) -> Result<String, StoreError> {
    let content = content.trim();
    if content.is_empty() {
        return Err(StoreError::InvalidInput("note is empty".to_string()));
    }
    if content.chars().count() > MAX_NOTE_CHARS {
        return Err(StoreError::InvalidInput(format!(
            "note longer than {} characters",
            MAX_NOTE_CHARS
        )));
    }
    Ok(content.to_string())
}

fn build_threads(entries: Vec<CommunicationLogEntry>) -> Vec<LogThread> {
    let ids: std::collections::HashSet<Uuid> = entries.iter().map(|e| e.id).collect();

    let mut roots = Vec::new();
    let mut replies: HashMap<Uuid, Vec<CommunicationLogEntry>> = HashMap::new();
    for entry in entries {
        match entry.parent_id {
            Some(parent) if ids.contains(&parent) => replies.entry(parent).or_default().push(entry),
            // Orphaned replies are shown as top-level notes
            _ => roots.push(entry),
        }
    }

    roots.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    roots
        .into_iter()
        .map(|entry| {
            let mut children = replies.remove(&entry.id).unwrap_or_default();
            children.sort_by_key(|c| c.created_at);
            LogThread {
                entry,
                replies: children,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet::models::Role;
    use crate::fleet::store::InMemoryStore;
    use chrono::{Duration, Utc};

    fn operator(role: Role) -> Operator {
        Operator::new("Ravi", role).unwrap()
    }

    fn log() -> CommunicationLog {
        CommunicationLog::new(Arc::new(InMemoryStore::new()))
    }

    #[tokio::test]
    async fn test_threads_order_and_nesting() {
        let log = log();
        let tech = operator(Role::Technician);

        let pause = || tokio::time::sleep(std::time::Duration::from_millis(2));

        let first = log.post_note(&tech, "TX-1", "Humming noise").await.unwrap();
        pause().await;
        let second = log.post_note(&tech, "TX-1", "Oil level low").await.unwrap();
        pause().await;
        let reply = log.reply(&tech, "TX-1", first.id, "Checked clamps").await.unwrap();
        pause().await;
        let nested = log.reply(&tech, "TX-1", reply.id, "Re-torqued").await.unwrap();
        assert_eq!(nested.parent_id, Some(first.id));

        let threads = log.thread("TX-1").await.unwrap();
        assert_eq!(threads.len(), 2);
        assert_eq!(threads[0].entry.id, second.id);
        assert_eq!(threads[1].entry.id, first.id);
        let reply_ids: Vec<Uuid> = threads[1].replies.iter().map(|r| r.id).collect();
        assert_eq!(reply_ids, vec![reply.id, nested.id]);
    }

    #[test]
    fn test_orphan_reply_is_top_level() {
        let now = Utc::now();
        let orphan = CommunicationLogEntry {
            id: Uuid::new_v4(),
            transformer_id: "TX-1".to_string(),
            author_name: "Ravi".to_string(),
            author_role: Role::Engineer,
            created_at: now - Duration::minutes(5),
            content: "Follow-up".to_string(),
            parent_id: Some(Uuid::new_v4()),
            escalation_status: EscalationStatus::None,
        };
        let threads = build_threads(vec![orphan.clone()]);
        assert_eq!(threads.len(), 1);
        assert_eq!(threads[0].entry, orphan);
    }

    #[tokio::test]
    async fn test_reply_must_match_transformer() {
        let log = log();
        let tech = operator(Role::Technician);
        let note = log.post_note(&tech, "TX-1", "Note").await.unwrap();

        let result = log.reply(&tech, "TX-2", note.id, "Wrong asset").await;
        assert!(matches!(result, Err(StoreError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_escalation_permissions() {
        let log = log();
        let tech = operator(Role::Technician);
        let note = log.post_note(&tech, "TX-1", "Partial discharge").await.unwrap();

        let escalated = log.escalate(&tech, note.id).await.unwrap();
        assert_eq!(escalated.escalation_status, EscalationStatus::Escalated);
        assert!(matches!(log.escalate(&tech, note.id).await, Err(StoreError::Conflict(_))));

        assert!(matches!(log.resolve(&tech, note.id).await, Err(StoreError::Forbidden(_))));

        let resolved = log.resolve(&operator(Role::Engineer), note.id).await.unwrap();
        assert_eq!(resolved.escalation_status, EscalationStatus::Resolved);
        assert!(matches!(
            log.resolve(&operator(Role::Manager), note.id).await,
            Err(StoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_note_rejected() {
        let log = log();
        let result = log.post_note(&operator(Role::Manager), "TX-1", "   ").await;
        assert!(matches!(result, Err(StoreError::InvalidInput(_))));
    }
}
