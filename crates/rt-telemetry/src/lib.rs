//! Logging bootstrap for the retention daemon.
//!
//! Wraps `tracing-subscriber` so binaries and tests install the same
//! formatter: human-readable for terminals, JSON for log shippers.

pub mod logging;
