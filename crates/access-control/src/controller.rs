//! Access decisions at the control point.
//!
//! A request carries a frame, the requested direction and the guard on duty.
//! The plate is read from the frame, then the vehicle's access state decides
//! the outcome. Every authorized decision is persisted and audited.

use crate::audit::{AuditAction, AuditEntry, AuditSink};
use crate::locks::PlateLocks;
use crate::restriction::{check_driving_restriction, RestrictionStatus};
use crate::source::PlateSource;
use crate::store::{AccessStore, EntryOutcome, EventCalendar};
use anyhow::Result;
use chrono::NaiveDateTime;
use common::access::{AccessAction, AccessRequest};
use common::validation::validate_non_empty;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use telemetry::metrics::ACCESS_DECISIONS;
use thiserror::Error;

/// Audited entity for access records
const AUDIT_ENTITY: &str = "ACCESO";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grant {
    EntryRecorded,
    ExitRecorded,
    GuestEntry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    /// No plate could be read from the frame
    Illegible,
    /// Exit requested for a vehicle that is not inside
    NoEntryRecorded,
    /// Entry requested for a vehicle that never left
    AlreadyInside,
    /// Plate not on file and no event allows guests
    Unregistered,
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            DenialReason::Illegible => "plate not legible",
            DenialReason::NoEntryRecorded => "no entry recorded for this vehicle",
            DenialReason::AlreadyInside => "vehicle is already inside",
            DenialReason::Unregistered => "vehicle not registered",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "detail")]
pub enum Verdict {
    Authorized(Grant),
    Denied(DenialReason),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessDecision {
    pub action: AccessAction,
    pub plate: Option<String>,
    pub verdict: Verdict,
    /// Driving restriction at decision time, advisory only
    pub restriction: Option<RestrictionStatus>,
}

impl AccessDecision {
    pub fn is_authorized(&self) -> bool {
        matches!(self.verdict, Verdict::Authorized(_))
    }

    pub fn message(&self) -> String {
        let plate = self.plate.as_deref().unwrap_or("-");
        match self.verdict {
            Verdict::Authorized(Grant::EntryRecorded) => format!("Entry recorded for {}", plate),
            Verdict::Authorized(Grant::ExitRecorded) => format!("Exit recorded for {}", plate),
            Verdict::Authorized(Grant::GuestEntry) => {
                format!("Guest entry recorded for {}", plate)
            }
            Verdict::Denied(reason) => format!("Access denied for {}: {}", plate, reason),
        }
    }
}

#[derive(Debug, Error)]
pub enum AccessError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Failed to register exit for access {0}")]
    ExitNotRecorded(u64),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Decides and records access for one control point
#[derive(Clone)]
pub struct AccessController {
    plates: Arc<dyn PlateSource>,
    store: Arc<dyn AccessStore>,
    calendar: Arc<dyn EventCalendar>,
    audit: Arc<dyn AuditSink>,
    locks: PlateLocks,
}

impl AccessController {
    pub fn new(
        plates: Arc<dyn PlateSource>,
        store: Arc<dyn AccessStore>,
        calendar: Arc<dyn EventCalendar>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            plates,
            store,
            calendar,
            audit,
            locks: PlateLocks::new(),
        }
    }

    pub async fn process(&self, request: AccessRequest) -> Result<AccessDecision, AccessError> {
        self.process_at(request, chrono::Local::now().naive_local())
            .await
    }

    /// Process a request as if it happened at local time `now`.
    pub async fn process_at(
        &self,
        request: AccessRequest,
        now: NaiveDateTime,
    ) -> Result<AccessDecision, AccessError> {
        validate_non_empty(&request.guard_id, "guard_id")
            .map_err(|e| AccessError::InvalidRequest(e.to_string()))?;

        let action = request.action;
        let Some(plate) = self.plates.read_plate(request.image).await else {
            tracing::info!(action = %action, guard_id = %request.guard_id, "Plate not legible");
            return Ok(self.finish(action, None, Verdict::Denied(DenialReason::Illegible), None));
        };

        let restriction = check_driving_restriction(&plate, now);
        if restriction.restricted {
            tracing::info!(plate = %plate, reason = %restriction.reason, "Driving restriction active");
        }

        let _guard = self.locks.lock(&plate).await;
        let verdict = match action {
            AccessAction::Exit => self.decide_exit(&plate, &request.guard_id, now).await?,
            AccessAction::Entry => self.decide_entry(&plate, &request.guard_id, now).await?,
        };

        Ok(self.finish(action, Some(plate), verdict, Some(restriction)))
    }

    async fn decide_exit(
        &self,
        plate: &str,
        guard_id: &str,
        now: NaiveDateTime,
    ) -> Result<Verdict, AccessError> {
        let Some(access_id) = self.store.open_access(plate).await? else {
            return Ok(Verdict::Denied(DenialReason::NoEntryRecorded));
        };

        if !self.store.register_exit(access_id).await? {
            return Err(AccessError::ExitNotRecorded(access_id));
        }

        self.audit(
            guard_id,
            Some(access_id),
            AuditAction::VehicleExit,
            serde_json::json!({ "plate": plate }),
            now,
        )
        .await;
        Ok(Verdict::Authorized(Grant::ExitRecorded))
    }

    async fn decide_entry(
        &self,
        plate: &str,
        guard_id: &str,
        now: NaiveDateTime,
    ) -> Result<Verdict, AccessError> {
        if self.store.open_access(plate).await?.is_some() {
            return Ok(Verdict::Denied(DenialReason::AlreadyInside));
        }

        if let EntryOutcome::Registered { access_id } =
            self.store.register_entry(plate, guard_id).await?
        {
            self.audit(
                guard_id,
                Some(access_id),
                AuditAction::VehicleEntry,
                serde_json::json!({ "plate": plate }),
                now,
            )
            .await;
            return Ok(Verdict::Authorized(Grant::EntryRecorded));
        }

        if !self.calendar.has_active_event(now).await? {
            return Ok(Verdict::Denied(DenialReason::Unregistered));
        }

        if !self.store.register_guest_vehicle(plate).await? {
            tracing::warn!(plate = %plate, "Guest vehicle could not be registered");
            return Ok(Verdict::Denied(DenialReason::Unregistered));
        }

        match self.store.register_entry(plate, guard_id).await? {
            EntryOutcome::Registered { access_id } => {
                self.audit(
                    guard_id,
                    Some(access_id),
                    AuditAction::GuestEntry,
                    serde_json::json!({ "plate": plate, "guest": true }),
                    now,
                )
                .await;
                Ok(Verdict::Authorized(Grant::GuestEntry))
            }
            EntryOutcome::UnknownVehicle => {
                tracing::warn!(plate = %plate, "Guest vehicle missing right after registration");
                Ok(Verdict::Denied(DenialReason::Unregistered))
            }
        }
    }

    async fn audit(
        &self,
        guard_id: &str,
        entity_id: Option<u64>,
        action: AuditAction,
        details: serde_json::Value,
        now: NaiveDateTime,
    ) {
        let entry = AuditEntry {
            guard_id: guard_id.to_string(),
            entity: AUDIT_ENTITY.to_string(),
            entity_id,
            action,
            details,
            recorded_at: now,
        };
        // The decision is already persisted; a lost audit line must not undo it
        if let Err(e) = self.audit.record(entry).await {
            tracing::warn!(error = %e, action = %action, "Failed to record audit entry");
        }
    }

    fn finish(
        &self,
        action: AccessAction,
        plate: Option<String>,
        verdict: Verdict,
        restriction: Option<RestrictionStatus>,
    ) -> AccessDecision {
        let decision = AccessDecision {
            action,
            plate,
            verdict,
            restriction,
        };
        let result = if decision.is_authorized() {
            "authorized"
        } else {
            "denied"
        };
        ACCESS_DECISIONS
            .with_label_values(&[action.as_str(), result])
            .inc();
        tracing::info!(
            action = %action,
            plate = ?decision.plate,
            result,
            "{}",
            decision.message()
        );
        decision
    }
}
