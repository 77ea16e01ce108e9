//! Cash movements and work orders over a JSON API.

pub mod api;
pub mod config;
pub mod logging;
pub mod service;
pub mod storage;

pub use cashbook_core::{date, models, money};
