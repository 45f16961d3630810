//! Infrastructure health-check agent.
//!
//! Periodically probes a dynamic set of network targets, detects status
//! transitions, and publishes alerts on the shared message bus. The
//! schedule is rebuilt on the fly when the admin side announces a
//! configuration change, so targets can be added, removed, or retimed
//! without restarting the process.

pub mod bus;
pub mod config;
pub mod db;
pub mod monitoring;
pub mod version;
