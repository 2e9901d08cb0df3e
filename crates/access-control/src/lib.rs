//! Vehicle access workflow for a gated control point.
//!
//! Reads the plate from a captured frame and decides whether the vehicle may
//! enter or leave, recording the access and an audit line for every
//! authorized movement.

pub mod audit;
pub mod controller;
pub mod locks;
pub mod restriction;
pub mod source;
pub mod store;

pub use audit::{AuditAction, AuditEntry, AuditSink, MemoryAuditSink};
pub use controller::{AccessController, AccessDecision, AccessError, DenialReason, Grant, Verdict};
pub use locks::{PlateGuard, PlateLocks};
pub use restriction::{check_driving_restriction, RestrictionReason, RestrictionStatus};
pub use source::{FixedPlateSource, PlateSource};
pub use store::{
    AccessRecord, AccessStore, EntryOutcome, EventCalendar, EventWindow, InMemoryAccessStore,
    StaticCalendar,
};
