//! Core types and traits for cashbook storage backends.
//!
//! This crate provides the calendar-date utility, the record types, and the
//! `StorageBackend` trait implemented by the backend crates.

pub mod date;
pub mod models;
pub mod money;
pub mod storage;

// Re-export key types at crate root for convenience
pub use date::{CalendarDate, DateError, DisplayZone};
pub use models::{CashEntry, DailyReport, DailyTotals, EntryId, RecordCounts, WorkOrderEntry};
pub use models::write::{CashEntryCommand, WorkOrderCommand};
pub use storage::{StorageBackend, StorageError, Table};
