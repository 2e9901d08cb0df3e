use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::RwLock;

/// Audited access events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditAction {
    #[serde(rename = "SALIDA_VEHICULO")]
    VehicleExit,
    #[serde(rename = "ENTRADA_VEHICULO")]
    VehicleEntry,
    #[serde(rename = "ENTRADA_INVITADO")]
    GuestEntry,
}

impl AuditAction {
    /// Action code as stored in the audit log
    pub fn code(&self) -> &'static str {
        match self {
            AuditAction::VehicleExit => "SALIDA_VEHICULO",
            AuditAction::VehicleEntry => "ENTRADA_VEHICULO",
            AuditAction::GuestEntry => "ENTRADA_INVITADO",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Guard who operated the control point
    pub guard_id: String,
    /// Audited entity kind (always "ACCESO" for the access workflow)
    pub entity: String,
    /// Access record id, when one is known
    pub entity_id: Option<u64>,
    pub action: AuditAction,
    pub details: serde_json::Value,
    pub recorded_at: NaiveDateTime,
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: AuditEntry) -> Result<()>;
}

/// Audit sink that keeps entries in memory
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    entries: RwLock<Vec<AuditEntry>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries(&self) -> Vec<AuditEntry> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, entry: AuditEntry) -> Result<()> {
        tracing::debug!(
            action = %entry.action,
            guard_id = %entry.guard_id,
            entity_id = ?entry.entity_id,
            "Audit entry recorded"
        );
        self.entries.write().await.push(entry);
        Ok(())
    }
}
