//! Shared pieces of the broker CLI that are useful outside the binary,
//! currently just the logging setup.

pub mod logging;
