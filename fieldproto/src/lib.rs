//! Shared protocol types for the field telemetry pipeline: the length-framed
//! wire codec exchanged between node clients and the collector, the
//! `Reading`/`Value` data model, and small environment-parsing helpers used
//! by both binaries' `Config::from_env`.

pub mod env;
pub mod error;
pub mod framing;
pub mod model;

pub use error::ProtocolError;
pub use model::{Reading, SensorKind, Value};
