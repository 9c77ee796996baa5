//! Fleet data models

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::analysis::Criticality;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TransformerStatus {
    Operational,
    NeedsAttention,
    UnderMaintenance,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

/// Monitored transformer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transformer {
    pub id: String,
    pub name: String,
    pub location: String,
    pub zone: String,
    pub coordinates: Coordinates,
    pub status: TransformerStatus,
    pub criticality: Criticality,
    pub last_inspection: NaiveDate,
    pub next_service_date: NaiveDate,
    pub manufacturer: String,
    pub serviced_by: String,
    /// Load in percent of rating
    pub load: f64,
}

/// Operator role
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Role {
    Manager,
    Engineer,
    Technician,
}

impl Role {
    /// Closing an escalation
    pub fn can_resolve(&self) -> bool {
        matches!(self, Self::Manager | Self::Engineer)
    }

    pub fn can_update_status(&self) -> bool {
        matches!(self, Self::Manager | Self::Engineer)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Manager => "Manager",
            Self::Engineer => "Engineer",
            Self::Technician => "Technician",
        };
        f.write_str(name)
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "manager" => Ok(Self::Manager),
            "engineer" => Ok(Self::Engineer),
            "technician" => Ok(Self::Technician),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EscalationStatus {
    #[default]
    None,
    Escalated,
    Resolved,
}

/// Note or reply on a transformer's communication log
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommunicationLogEntry {
    pub id: Uuid,
    pub transformer_id: String,
    pub author_name: String,
    pub author_role: Role,
    pub created_at: DateTime<Utc>,
    pub content: String,
    #[serde(default)]
    pub parent_id: Option<Uuid>,
    #[serde(default)]
    pub escalation_status: EscalationStatus,
}

/// Insert payload for a log entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewLogEntry {
    pub transformer_id: String,
    pub author_name: String,
    pub author_role: Role,
    pub content: String,
    #[serde(default)]
    pub parent_id: Option<Uuid>,
}

impl NewLogEntry {
    /// Assign identity and timestamp
    pub fn into_entry(self) -> CommunicationLogEntry {
        CommunicationLogEntry {
            id: Uuid::new_v4(),
            transformer_id: self.transformer_id,
            author_name: self.author_name,
            author_role: self.author_role,
            created_at: Utc::now(),
            content: self.content,
            parent_id: self.parent_id,
            escalation_status: EscalationStatus::None,
        }
    }
}

/// Top-level note with its replies
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LogThread {
    pub entry: CommunicationLogEntry,
    pub replies: Vec<CommunicationLogEntry>,
}
