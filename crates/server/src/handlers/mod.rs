//! HTTP request handlers.

pub mod common;
pub mod views;

pub use common::*;
pub use views::*;
