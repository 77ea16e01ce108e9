use rust_decimal::Decimal;
use time::OffsetDateTime;

use crate::{date::CalendarDate, money};

pub mod report;
pub mod write;

pub use report::{DailyReport, DailyTotals};

pub type EntryId = i64;

/// One cash movement for a business day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CashEntry {
    pub id: EntryId,
    pub date: CalendarDate,
    pub work_order: String,
    pub credit: Decimal,
    pub debit: Decimal,
    pub debit_note: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl CashEntry {
    pub fn net(&self) -> Decimal {
        money::net(self.credit, self.debit)
    }
}

/// A work order leaving the shop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkOrderEntry {
    pub id: EntryId,
    pub date: CalendarDate,
    pub number: String,
    pub released_by: String,
    pub collected_by: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecordCounts {
    pub cash_entries: u64,
    pub work_orders: u64,
}
