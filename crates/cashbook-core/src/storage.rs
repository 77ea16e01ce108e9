use std::fmt;

use crate::{
    date::CalendarDate,
    models::{
        write::{CashEntryCommand, WorkOrderCommand},
        CashEntry, EntryId, RecordCounts, WorkOrderEntry,
    },
};

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    CashEntries,
    WorkOrders,
}

impl Table {
    pub fn name(&self) -> &'static str {
        match self {
            Table::CashEntries => "cash_entries",
            Table::WorkOrders => "work_orders",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{0}")]
    Other(String),
    #[error("{table} record not found: {id}")]
    NotFound { table: Table, id: EntryId },
    #[error("corrupt row in {table}: {detail}")]
    Corrupt { table: Table, detail: String },
}

/// Persistence contract shared by every backend.
///
/// Lists are ordered by date, then id. Inserts assign the id and both
/// timestamps; updates replace every writable field and refresh `updated_at`.
pub trait StorageBackend: Send + Sync {
    fn backend_name(&self) -> &'static str;
    /// Version string of the database engine behind the backend.
    fn server_version(&self) -> Result<String, StorageError>;

    fn insert_cash_entry(&self, command: &CashEntryCommand) -> Result<CashEntry, StorageError>;
    fn list_cash_entries(&self, date: Option<CalendarDate>) -> Result<Vec<CashEntry>, StorageError>;
    fn get_cash_entry(&self, id: EntryId) -> Result<CashEntry, StorageError>;
    fn update_cash_entry(&self, id: EntryId, command: &CashEntryCommand) -> Result<CashEntry, StorageError>;
    fn delete_cash_entry(&self, id: EntryId) -> Result<(), StorageError>;

    fn insert_work_order(&self, command: &WorkOrderCommand) -> Result<WorkOrderEntry, StorageError>;
    fn list_work_orders(&self, date: Option<CalendarDate>) -> Result<Vec<WorkOrderEntry>, StorageError>;
    fn get_work_order(&self, id: EntryId) -> Result<WorkOrderEntry, StorageError>;
    fn update_work_order(&self, id: EntryId, command: &WorkOrderCommand) -> Result<WorkOrderEntry, StorageError>;
    fn delete_work_order(&self, id: EntryId) -> Result<(), StorageError>;

    fn record_counts(&self) -> Result<RecordCounts, StorageError>;
}
