//! Request-level operations shared by the HTTP API and the CLI.
//!
//! Every date coming in is normalized here before it reaches storage, and
//! every record going out carries both the canonical and the display form of
//! its date, so callers never reformat dates themselves.

use std::sync::Arc;

use cashbook_core::{
    money, CalendarDate, CashEntry, CashEntryCommand, DailyReport, DateError, DisplayZone, EntryId,
    StorageBackend, StorageError, Table, WorkOrderCommand, WorkOrderEntry,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

const MAX_WORK_ORDER_LEN: usize = 50;
const MAX_NAME_LEN: usize = 255;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid date: {0}")]
    InvalidDate(#[from] DateError),
    #[error("{0}")]
    Validation(String),
    #[error("{0} record {1} not found")]
    NotFound(Table, EntryId),
    #[error("storage error: {0}")]
    Storage(StorageError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StorageError> for ServiceError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound { table, id } => ServiceError::NotFound(table, id),
            other => ServiceError::Storage(other),
        }
    }
}

/// How incoming dates are interpreted.
#[derive(Debug, Clone, Copy, Default)]
pub struct DatePolicy {
    pub zone: DisplayZone,
    /// A write without a date lands on today instead of being rejected.
    pub allow_missing_date: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CashEntryInput {
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub work_order: Option<String>,
    #[serde(default)]
    pub credit: Option<Decimal>,
    #[serde(default)]
    pub debit: Option<Decimal>,
    #[serde(default)]
    pub debit_note: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkOrderInput {
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub number: Option<String>,
    #[serde(default)]
    pub released_by: Option<String>,
    #[serde(default)]
    pub collected_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CashEntryView {
    pub id: EntryId,
    pub date: CalendarDate,
    pub date_display: String,
    pub work_order: String,
    pub credit: Decimal,
    pub debit: Decimal,
    pub net: Decimal,
    pub debit_note: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    pub created_at_display: String,
    pub updated_at_display: String,
}

impl CashEntryView {
    pub fn new(entry: &CashEntry, zone: DisplayZone) -> Self {
        Self {
            id: entry.id,
            date: entry.date,
            date_display: entry.date.to_display_string(),
            work_order: entry.work_order.clone(),
            credit: money::to_cents(entry.credit),
            debit: money::to_cents(entry.debit),
            net: entry.net(),
            debit_note: entry.debit_note.clone(),
            created_at: entry.created_at,
            updated_at: entry.updated_at,
            created_at_display: zone.format_time(entry.created_at),
            updated_at_display: zone.format_time(entry.updated_at),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkOrderView {
    pub id: EntryId,
    pub date: CalendarDate,
    pub date_display: String,
    pub number: String,
    pub released_by: String,
    pub collected_by: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    pub created_at_display: String,
    pub updated_at_display: String,
}

impl WorkOrderView {
    pub fn new(order: &WorkOrderEntry, zone: DisplayZone) -> Self {
        Self {
            id: order.id,
            date: order.date,
            date_display: order.date.to_display_string(),
            number: order.number.clone(),
            released_by: order.released_by.clone(),
            collected_by: order.collected_by.clone(),
            created_at: order.created_at,
            updated_at: order.updated_at,
            created_at_display: zone.format_time(order.created_at),
            updated_at_display: zone.format_time(order.updated_at),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TotalsView {
    pub credit: Decimal,
    pub debit: Decimal,
    pub net: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportView {
    pub date: CalendarDate,
    pub date_display: String,
    pub cash_entries: Vec<CashEntryView>,
    pub work_orders: Vec<WorkOrderView>,
    pub totals: TotalsView,
}

impl ReportView {
    pub fn new(report: &DailyReport, zone: DisplayZone) -> Self {
        Self {
            date: report.date,
            date_display: report.date.to_display_string(),
            cash_entries: report.cash_entries.iter().map(|e| CashEntryView::new(e, zone)).collect(),
            work_orders: report.work_orders.iter().map(|w| WorkOrderView::new(w, zone)).collect(),
            totals: TotalsView {
                credit: report.totals.credit,
                debit: report.totals.debit,
                net: report.totals.net,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableStatus {
    pub records: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TablesStatus {
    pub cash_entries: TableStatus,
    pub work_orders: TableStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatabaseStatus {
    pub connected: bool,
    pub backend: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tables: Option<TablesStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostics {
    pub status: &'static str,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub today: CalendarDate,
    pub database: DatabaseStatus,
}

impl Diagnostics {
    pub fn is_healthy(&self) -> bool {
        self.database.connected
    }
}

#[derive(Clone)]
pub struct Cashbook {
    storage: Arc<dyn StorageBackend>,
    policy: DatePolicy,
}

impl Cashbook {
    pub fn new(storage: Arc<dyn StorageBackend>, policy: DatePolicy) -> Self {
        Self { storage, policy }
    }

    pub fn zone(&self) -> DisplayZone {
        self.policy.zone
    }

    /// Date for an insert or update.
    fn write_date(&self, input: Option<&str>) -> Result<CalendarDate, ServiceError> {
        match input.map(str::trim) {
            None | Some("") if self.policy.allow_missing_date => Ok(self.policy.zone.today()),
            None | Some("") => Err(ServiceError::Validation("date is required".to_string())),
            Some(text) => Ok(CalendarDate::parse(text)?),
        }
    }

    /// An empty filter means "every day".
    fn filter_date(&self, input: Option<&str>) -> Result<Option<CalendarDate>, ServiceError> {
        match input.map(str::trim) {
            None | Some("") => Ok(None),
            Some(text) => Ok(Some(CalendarDate::parse(text)?)),
        }
    }

    fn cash_command(&self, input: CashEntryInput) -> Result<CashEntryCommand, ServiceError> {
        let date = self.write_date(input.date.as_deref())?;
        let work_order = bounded_text("work_order", input.work_order, MAX_WORK_ORDER_LEN)?;
        Ok(CashEntryCommand {
            date,
            work_order,
            credit: amount("credit", input.credit)?,
            debit: amount("debit", input.debit)?,
            debit_note: input.debit_note.unwrap_or_default().trim().to_string(),
        })
    }

    fn work_order_command(&self, input: WorkOrderInput) -> Result<WorkOrderCommand, ServiceError> {
        let date = self.write_date(input.date.as_deref())?;
        let number = bounded_text("number", input.number, MAX_WORK_ORDER_LEN)?;
        if number.is_empty() {
            return Err(ServiceError::Validation("number is required".to_string()));
        }
        Ok(WorkOrderCommand {
            date,
            number,
            released_by: bounded_text("released_by", input.released_by, MAX_NAME_LEN)?,
            collected_by: bounded_text("collected_by", input.collected_by, MAX_NAME_LEN)?,
        })
    }

    pub fn list_cash(&self, date: Option<&str>) -> Result<Vec<CashEntryView>, ServiceError> {
        let filter = self.filter_date(date)?;
        let entries = self.storage.list_cash_entries(filter)?;
        Ok(entries.iter().map(|e| CashEntryView::new(e, self.zone())).collect())
    }

    pub fn get_cash(&self, id: EntryId) -> Result<CashEntryView, ServiceError> {
        let entry = self.storage.get_cash_entry(id)?;
        Ok(CashEntryView::new(&entry, self.zone()))
    }

    pub fn create_cash(&self, input: CashEntryInput) -> Result<CashEntryView, ServiceError> {
        let command = self.cash_command(input)?;
        let entry = self.storage.insert_cash_entry(&command)?;
        tracing::info!(id = entry.id, date = %entry.date, "Cash entry created");
        metrics::increment_counter!("cashbook_records_created_total", "table" => Table::CashEntries.name());
        Ok(CashEntryView::new(&entry, self.zone()))
    }

    pub fn update_cash(&self, id: EntryId, input: CashEntryInput) -> Result<CashEntryView, ServiceError> {
        let command = self.cash_command(input)?;
        let entry = self.storage.update_cash_entry(id, &command)?;
        tracing::info!(id, date = %entry.date, "Cash entry updated");
        metrics::increment_counter!("cashbook_records_updated_total", "table" => Table::CashEntries.name());
        Ok(CashEntryView::new(&entry, self.zone()))
    }

    pub fn delete_cash(&self, id: EntryId) -> Result<(), ServiceError> {
        self.storage.delete_cash_entry(id)?;
        tracing::info!(id, "Cash entry deleted");
        metrics::increment_counter!("cashbook_records_deleted_total", "table" => Table::CashEntries.name());
        Ok(())
    }

    pub fn list_work_orders(&self, date: Option<&str>) -> Result<Vec<WorkOrderView>, ServiceError> {
        let filter = self.filter_date(date)?;
        let orders = self.storage.list_work_orders(filter)?;
        Ok(orders.iter().map(|w| WorkOrderView::new(w, self.zone())).collect())
    }

    pub fn get_work_order(&self, id: EntryId) -> Result<WorkOrderView, ServiceError> {
        let order = self.storage.get_work_order(id)?;
        Ok(WorkOrderView::new(&order, self.zone()))
    }

    pub fn create_work_order(&self, input: WorkOrderInput) -> Result<WorkOrderView, ServiceError> {
        let command = self.work_order_command(input)?;
        let order = self.storage.insert_work_order(&command)?;
        tracing::info!(id = order.id, date = %order.date, number = %order.number, "Work order created");
        metrics::increment_counter!("cashbook_records_created_total", "table" => Table::WorkOrders.name());
        Ok(WorkOrderView::new(&order, self.zone()))
    }

    pub fn update_work_order(&self, id: EntryId, input: WorkOrderInput) -> Result<WorkOrderView, ServiceError> {
        let command = self.work_order_command(input)?;
        let order = self.storage.update_work_order(id, &command)?;
        tracing::info!(id, date = %order.date, "Work order updated");
        metrics::increment_counter!("cashbook_records_updated_total", "table" => Table::WorkOrders.name());
        Ok(WorkOrderView::new(&order, self.zone()))
    }

    pub fn delete_work_order(&self, id: EntryId) -> Result<(), ServiceError> {
        self.storage.delete_work_order(id)?;
        tracing::info!(id, "Work order deleted");
        metrics::increment_counter!("cashbook_records_deleted_total", "table" => Table::WorkOrders.name());
        Ok(())
    }

    /// Report for one business day; no date means today in the business zone.
    pub fn daily_report(&self, date: Option<&str>) -> Result<DailyReport, ServiceError> {
        let date = self.policy.zone.normalize(date)?;
        let cash_entries = self.storage.list_cash_entries(Some(date))?;
        let work_orders = self.storage.list_work_orders(Some(date))?;
        DailyReport::new(date, cash_entries, work_orders)
            .map_err(|e| ServiceError::Internal(format!("report for {}: {}", date, e)))
    }

    pub fn daily_report_view(&self, date: Option<&str>) -> Result<ReportView, ServiceError> {
        let report = self.daily_report(date)?;
        Ok(ReportView::new(&report, self.zone()))
    }

    pub fn diagnostics(&self) -> Diagnostics {
        let backend = self.storage.backend_name();
        let tables = match self.storage.record_counts() {
            Ok(counts) => Some(TablesStatus {
                cash_entries: TableStatus { records: counts.cash_entries },
                work_orders: TableStatus { records: counts.work_orders },
            }),
            Err(e) => {
                tracing::error!(backend, error = %e, "Storage health check failed");
                None
            }
        };
        let connected = tables.is_some();
        let version = match self.storage.server_version() {
            Ok(version) => Some(version),
            Err(e) => {
                tracing::warn!(backend, error = %e, "Cannot read database version");
                None
            }
        };
        Diagnostics {
            status: if connected { "online" } else { "error" },
            timestamp: OffsetDateTime::now_utc(),
            today: self.policy.zone.today(),
            database: DatabaseStatus {
                connected,
                backend,
                version,
                tables,
            },
        }
    }
}

fn amount(field: &'static str, value: Option<Decimal>) -> Result<Decimal, ServiceError> {
    money::checked_amount(field, value.unwrap_or(Decimal::ZERO)).map_err(|e| ServiceError::Validation(e.to_string()))
}

fn bounded_text(field: &str, value: Option<String>, max_len: usize) -> Result<String, ServiceError> {
    let value = value.unwrap_or_default().trim().to_string();
    if value.chars().count() > max_len {
        return Err(ServiceError::Validation(format!(
            "{} must be at most {} characters",
            field, max_len
        )));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cashbook_memory::InMemoryStorage;
    use rust_decimal_macros::dec;

    fn cashbook(allow_missing_date: bool) -> Cashbook {
        Cashbook::new(
            Arc::new(InMemoryStorage::new()),
            DatePolicy {
                zone: DisplayZone::SAO_PAULO,
                allow_missing_date,
            },
        )
    }

    #[test]
    fn test_missing_date_is_rejected_by_default() {
        let book = cashbook(false);
        let err = book.create_cash(CashEntryInput::default()).unwrap_err();
        assert!(matches!(err, ServiceError::Validation(ref m) if m == "date is required"));
    }

    #[test]
    fn test_missing_date_defaults_to_today_when_allowed() {
        let book = cashbook(true);
        let view = book
            .create_cash(CashEntryInput {
                date: Some("   ".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(view.date, DisplayZone::SAO_PAULO.today());
    }

    #[test]
    fn test_negative_amounts_are_rejected() {
        let book = cashbook(false);
        let err = book
            .create_cash(CashEntryInput {
                date: Some("2025-09-10".to_string()),
                debit: Some(dec!(-1)),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[test]
    fn test_defaults_fill_optional_fields() {
        let book = cashbook(false);
        let view = book
            .create_cash(CashEntryInput {
                date: Some("2025-09-10".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(view.work_order, "");
        assert_eq!(view.credit.to_string(), "0.00");
        assert_eq!(view.net.to_string(), "0.00");
        assert_eq!(view.date_display, "10/09/2025");
    }

    #[test]
    fn test_amount_above_column_limit_is_rejected() {
        let book = cashbook(false);
        let err = book
            .create_cash(CashEntryInput {
                date: Some("2025-09-10".to_string()),
                credit: Some(dec!(40000000000000000000000000000)),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(ref m) if m.starts_with("credit must be at most")));

        let view = book
            .create_cash(CashEntryInput {
                date: Some("2025-09-10".to_string()),
                credit: Some(dec!(9999999999.99)),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(view.credit.to_string(), "9999999999.99");
        assert!(book.daily_report(Some("2025-09-10")).is_ok());
    }

    #[test]
    fn test_get_returns_one_record() {
        let book = cashbook(false);
        let created = book
            .create_cash(CashEntryInput {
                date: Some("2025-09-10".to_string()),
                credit: Some(dec!(5)),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(book.get_cash(created.id).unwrap(), created);
        assert!(matches!(book.get_work_order(1), Err(ServiceError::NotFound(Table::WorkOrders, 1))));
    }

    #[test]
    fn test_work_order_number_is_required() {
        let book = cashbook(false);
        let err = book
            .create_work_order(WorkOrderInput {
                date: Some("2025-09-10".to_string()),
                number: Some("  ".to_string()),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(ref m) if m == "number is required"));

        let err = book
            .create_work_order(WorkOrderInput {
                date: Some("2025-09-10".to_string()),
                number: Some("9".repeat(51)),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[test]
    fn test_unknown_id_maps_to_not_found() {
        let book = cashbook(false);
        let err = book.delete_work_order(5).unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(Table::WorkOrders, 5)));
    }

    #[test]
    fn test_malformed_filter_is_rejected() {
        let book = cashbook(false);
        assert!(matches!(book.list_cash(Some("2025/09")), Err(ServiceError::InvalidDate(_))));
        assert!(book.list_cash(Some("")).unwrap().is_empty());
    }

    #[test]
    fn test_diagnostics_reports_counts() {
        let book = cashbook(false);
        book.create_work_order(WorkOrderInput {
            date: Some("2025-09-10".to_string()),
            number: Some("1111".to_string()),
            ..Default::default()
        })
        .unwrap();
        let d = book.diagnostics();
        assert!(d.is_healthy());
        assert_eq!(d.database.backend, "memory");
        assert!(d.database.version.as_deref().unwrap_or_default().starts_with("cashbook-memory"));
        assert_eq!(d.database.tables.unwrap().work_orders.records, 1);
    }
}
