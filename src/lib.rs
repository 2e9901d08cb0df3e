//! Plate recognition and vehicle access control for gated control points.

pub use access_control;
pub use common;
pub use plate_engine;
pub use telemetry;
