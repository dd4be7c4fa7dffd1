//! Shared tracing setup for the DxMonitor binaries.

mod tracing;

pub use self::tracing::{LogFormat, LogOptions, init, init_tracing};
