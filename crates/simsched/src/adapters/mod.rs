//! Adapters Layer - Ports & Adapters Pattern
//!
//! Outbound adapters for the domain's ports.
//!
//! # Ports
//! - [`ProgressSink`](crate::domain::explorer::ProgressSink): periodic
//!   exploration progress

pub mod progress;

pub use progress::{LogProgress, StderrProgress};
