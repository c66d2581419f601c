//! Domain types shared by every scribeflow crate.
//!
//! - [`job`]: the job record, its status machine, and submission DTO.
//! - [`error_info`]: user-facing classification of pipeline failures.
//! - [`job_events`]: WebSocket message type names.
//! - [`error`]: the domain error type surfaced by registry and gateway.

pub mod error;
pub mod error_info;
pub mod job;
pub mod job_events;
pub mod types;
