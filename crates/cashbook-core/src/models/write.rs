use rust_decimal::Decimal;

use crate::date::CalendarDate;

/// Full set of writable cash-entry fields. Used for both insert and update;
/// an update replaces every field.
#[derive(Debug, Clone, PartialEq)]
pub struct CashEntryCommand {
    pub date: CalendarDate,
    pub work_order: String,
    pub credit: Decimal,
    pub debit: Decimal,
    pub debit_note: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkOrderCommand {
    pub date: CalendarDate,
    pub number: String,
    pub released_by: String,
    pub collected_by: String,
}
