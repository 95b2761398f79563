//! Core domain types and shared logic for the tally view counter.
//!
//! This crate defines the canonical data model used across the other
//! crates:
//! - Domain keys (normalized hostnames) and their derivation rules
//! - UTC calendar-date helpers for daily aggregation
//! - Configuration types for every subsystem

pub mod config;
pub mod dates;
pub mod domain;
pub mod error;

pub use config::AppConfig;
pub use dates::{format_date, parse_date, today_utc};
pub use domain::DomainKey;
pub use error::{Error, Result};
