use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

/// Result of trying to record an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryOutcome {
    Registered { access_id: u64 },
    /// No vehicle with this plate is on file
    UnknownVehicle,
}

/// Persistence for vehicles and their access records
#[async_trait]
pub trait AccessStore: Send + Sync {
    /// Id of the access record with an entry but no exit, if any
    async fn open_access(&self, plate: &str) -> Result<Option<u64>>;

    async fn register_entry(&self, plate: &str, guard_id: &str) -> Result<EntryOutcome>;

    /// Close an open access record. `false` when nothing was updated.
    async fn register_exit(&self, access_id: u64) -> Result<bool>;

    /// File a temporary guest vehicle. `false` when it could not be created.
    async fn register_guest_vehicle(&self, plate: &str) -> Result<bool>;
}

/// Calendar of events that allow guest access
#[async_trait]
pub trait EventCalendar: Send + Sync {
    async fn has_active_event(&self, now: NaiveDateTime) -> Result<bool>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRecord {
    pub id: u64,
    pub plate: String,
    pub guard_id: String,
    pub guest: bool,
    pub entered_at: NaiveDateTime,
    pub exited_at: Option<NaiveDateTime>,
}

#[derive(Default)]
struct StoreInner {
    vehicles: HashSet<String>,
    guests: HashSet<String>,
    records: HashMap<u64, AccessRecord>,
    next_id: u64,
}

/// In-memory access store
#[derive(Default)]
pub struct InMemoryAccessStore {
    inner: RwLock<StoreInner>,
}

impl InMemoryAccessStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store with the given plates already registered
    pub fn with_vehicles<I, S>(plates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let inner = StoreInner {
            vehicles: plates.into_iter().map(Into::into).collect(),
            ..StoreInner::default()
        };
        Self {
            inner: RwLock::new(inner),
        }
    }

    pub async fn register_vehicle(&self, plate: &str) {
        self.inner.write().await.vehicles.insert(plate.to_string());
    }

    /// Every access record, oldest first
    pub async fn records(&self) -> Vec<AccessRecord> {
        let inner = self.inner.read().await;
        let mut records: Vec<AccessRecord> = inner.records.values().cloned().collect();
        records.sort_by_key(|r| r.id);
        records
    }

    pub async fn is_guest(&self, plate: &str) -> bool {
        self.inner.read().await.guests.contains(plate)
    }

    fn now() -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }
}

#[async_trait]
impl AccessStore for InMemoryAccessStore {
    async fn open_access(&self, plate: &str) -> Result<Option<u64>> {
        let inner = self.inner.read().await;
        Ok(inner
            .records
            .values()
            .filter(|r| r.plate == plate && r.exited_at.is_none())
            .map(|r| r.id)
            .max())
    }

    async fn register_entry(&self, plate: &str, guard_id: &str) -> Result<EntryOutcome> {
        let mut inner = self.inner.write().await;
        if !inner.vehicles.contains(plate) {
            return Ok(EntryOutcome::UnknownVehicle);
        }

        inner.next_id += 1;
        let access_id = inner.next_id;
        let guest = inner.guests.contains(plate);
        inner.records.insert(
            access_id,
            AccessRecord {
                id: access_id,
                plate: plate.to_string(),
                guard_id: guard_id.to_string(),
                guest,
                entered_at: Self::now(),
                exited_at: None,
            },
        );
        Ok(EntryOutcome::Registered { access_id })
    }

    async fn register_exit(&self, access_id: u64) -> Result<bool> {
        let mut inner = self.inner.write().await;
        match inner.records.get_mut(&access_id) {
            Some(record) if record.exited_at.is_none() => {
                record.exited_at = Some(Self::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn register_guest_vehicle(&self, plate: &str) -> Result<bool> {
        let mut inner = self.inner.write().await;
        let plate = plate.to_uppercase();
        if inner.vehicles.contains(&plate) {
            // Same plate on file twice would violate the unique constraint
            return Ok(false);
        }
        inner.vehicles.insert(plate.clone());
        inner.guests.insert(plate);
        Ok(true)
    }
}

/// A scheduled event window, inclusive on both ends
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventWindow {
    pub name: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl EventWindow {
    pub fn new(name: impl Into<String>, start: NaiveDateTime, end: NaiveDateTime) -> Result<Self> {
        if end < start {
            return Err(anyhow!("Event ends before it starts"));
        }
        Ok(Self {
            name: name.into(),
            start,
            end,
        })
    }

    pub fn contains(&self, at: NaiveDateTime) -> bool {
        self.start <= at && at <= self.end
    }
}

/// Calendar backed by a fixed list of events
#[derive(Debug, Default)]
pub struct StaticCalendar {
    events: RwLock<Vec<EventWindow>>,
}

impl StaticCalendar {
    pub fn new(events: Vec<EventWindow>) -> Self {
        Self {
            events: RwLock::new(events),
        }
    }

    pub async fn add(&self, event: EventWindow) {
        self.events.write().await.push(event);
    }
}

#[async_trait]
impl EventCalendar for StaticCalendar {
    async fn has_active_event(&self, now: NaiveDateTime) -> Result<bool> {
        Ok(self.events.read().await.iter().any(|e| e.contains(now)))
    }
}
