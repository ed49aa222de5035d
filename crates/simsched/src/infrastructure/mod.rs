//! Infrastructure Layer - External Technology Stack
//!
//! Integrations with crates outside the engine proper.
//!
//! # Responsibilities
//! - Logging subscriber setup (`tracing-subscriber`)

pub mod logging;
