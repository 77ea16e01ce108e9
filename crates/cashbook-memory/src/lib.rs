//! In-memory storage backend. Nothing survives a restart; used for tests and
//! for running the API without a database.

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicI64, Ordering},
        RwLock, RwLockReadGuard, RwLockWriteGuard,
    },
};

use cashbook_core::{
    CalendarDate, CashEntry, CashEntryCommand, EntryId, RecordCounts, StorageBackend, StorageError,
    Table, WorkOrderCommand, WorkOrderEntry,
};
use time::OffsetDateTime;

#[derive(Default)]
struct Tables {
    cash_entries: BTreeMap<EntryId, CashEntry>,
    work_orders: BTreeMap<EntryId, WorkOrderEntry>,
}

pub struct InMemoryStorage {
    tables: RwLock<Tables>,
    cash_sequence: AtomicI64,
    work_order_sequence: AtomicI64,
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            cash_sequence: AtomicI64::new(1),
            work_order_sequence: AtomicI64::new(1),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StorageError> {
        self.tables
            .read()
            .map_err(|_| StorageError::Other("in-memory tables lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StorageError> {
        self.tables
            .write()
            .map_err(|_| StorageError::Other("in-memory tables lock poisoned".to_string()))
    }
}

fn sorted_by_date<T: Clone>(rows: impl Iterator<Item = T>, date_of: impl Fn(&T) -> CalendarDate) -> Vec<T> {
    // BTreeMap iteration is already in id order, and the sort is stable.
    let mut rows: Vec<T> = rows.collect();
    rows.sort_by_key(|r| date_of(r));
    rows
}

impl StorageBackend for InMemoryStorage {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    fn server_version(&self) -> Result<String, StorageError> {
        Ok(concat!("cashbook-memory ", env!("CARGO_PKG_VERSION")).to_string())
    }

    fn insert_cash_entry(&self, command: &CashEntryCommand) -> Result<CashEntry, StorageError> {
        let mut tables = self.write()?;
        let id = self.cash_sequence.fetch_add(1, Ordering::SeqCst);
        let now = OffsetDateTime::now_utc();
        let entry = CashEntry {
            id,
            date: command.date,
            work_order: command.work_order.clone(),
            credit: command.credit,
            debit: command.debit,
            debit_note: command.debit_note.clone(),
            created_at: now,
            updated_at: now,
        };
        tables.cash_entries.insert(id, entry.clone());
        tracing::debug!(id, date = %entry.date, "cash entry stored in memory");
        Ok(entry)
    }

    fn list_cash_entries(&self, date: Option<CalendarDate>) -> Result<Vec<CashEntry>, StorageError> {
        let tables = self.read()?;
        let rows = tables
            .cash_entries
            .values()
            .filter(|e| date.map_or(true, |d| e.date == d))
            .cloned();
        Ok(sorted_by_date(rows, |e| e.date))
    }

    fn get_cash_entry(&self, id: EntryId) -> Result<CashEntry, StorageError> {
        self.read()?
            .cash_entries
            .get(&id)
            .cloned()
            .ok_or(StorageError::NotFound { table: Table::CashEntries, id })
    }

    fn update_cash_entry(&self, id: EntryId, command: &CashEntryCommand) -> Result<CashEntry, StorageError> {
        let mut tables = self.write()?;
        let entry = tables
            .cash_entries
            .get_mut(&id)
            .ok_or(StorageError::NotFound { table: Table::CashEntries, id })?;
        entry.date = command.date;
        entry.work_order = command.work_order.clone();
        entry.credit = command.credit;
        entry.debit = command.debit;
        entry.debit_note = command.debit_note.clone();
        entry.updated_at = OffsetDateTime::now_utc();
        Ok(entry.clone())
    }

    fn delete_cash_entry(&self, id: EntryId) -> Result<(), StorageError> {
        self.write()?
            .cash_entries
            .remove(&id)
            .map(|_| ())
            .ok_or(StorageError::NotFound { table: Table::CashEntries, id })
    }

    fn insert_work_order(&self, command: &WorkOrderCommand) -> Result<WorkOrderEntry, StorageError> {
        let mut tables = self.write()?;
        let id = self.work_order_sequence.fetch_add(1, Ordering::SeqCst);
        let now = OffsetDateTime::now_utc();
        let order = WorkOrderEntry {
            id,
            date: command.date,
            number: command.number.clone(),
            released_by: command.released_by.clone(),
            collected_by: command.collected_by.clone(),
            created_at: now,
            updated_at: now,
        };
        tables.work_orders.insert(id, order.clone());
        tracing::debug!(id, date = %order.date, "work order stored in memory");
        Ok(order)
    }

    fn list_work_orders(&self, date: Option<CalendarDate>) -> Result<Vec<WorkOrderEntry>, StorageError> {
        let tables = self.read()?;
        let rows = tables
            .work_orders
            .values()
            .filter(|w| date.map_or(true, |d| w.date == d))
            .cloned();
        Ok(sorted_by_date(rows, |w| w.date))
    }

    fn get_work_order(&self, id: EntryId) -> Result<WorkOrderEntry, StorageError> {
        self.read()?
            .work_orders
            .get(&id)
            .cloned()
            .ok_or(StorageError::NotFound { table: Table::WorkOrders, id })
    }

    fn update_work_order(&self, id: EntryId, command: &WorkOrderCommand) -> Result<WorkOrderEntry, StorageError> {
        let mut tables = self.write()?;
        let order = tables
            .work_orders
            .get_mut(&id)
            .ok_or(StorageError::NotFound { table: Table::WorkOrders, id })?;
        order.date = command.date;
        order.number = command.number.clone();
        order.released_by = command.released_by.clone();
        order.collected_by = command.collected_by.clone();
        order.updated_at = OffsetDateTime::now_utc();
        Ok(order.clone())
    }

    fn delete_work_order(&self, id: EntryId) -> Result<(), StorageError> {
        self.write()?
            .work_orders
            .remove(&id)
            .map(|_| ())
            .ok_or(StorageError::NotFound { table: Table::WorkOrders, id })
    }

    fn record_counts(&self) -> Result<RecordCounts, StorageError> {
        let tables = self.read()?;
        Ok(RecordCounts {
            cash_entries: tables.cash_entries.len() as u64,
            work_orders: tables.work_orders.len() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(s: &str) -> CalendarDate {
        CalendarDate::parse(s).unwrap()
    }

    fn cash(d: &str, work_order: &str) -> CashEntryCommand {
        CashEntryCommand {
            date: date(d),
            work_order: work_order.to_string(),
            credit: dec!(100.00),
            debit: dec!(0.00),
            debit_note: String::new(),
        }
    }

    #[test]
    fn test_memory_list_is_ordered_by_date_then_id() {
        let storage = InMemoryStorage::new();
        storage.insert_cash_entry(&cash("2025-09-10", "a")).unwrap();
        storage.insert_cash_entry(&cash("2025-09-09", "b")).unwrap();
        storage.insert_cash_entry(&cash("2025-09-10", "c")).unwrap();

        let all = storage.list_cash_entries(None).unwrap();
        let order: Vec<&str> = all.iter().map(|e| e.work_order.as_str()).collect();
        assert_eq!(order, vec!["b", "a", "c"]);

        let day = storage.list_cash_entries(Some(date("2025-09-10"))).unwrap();
        assert_eq!(day.len(), 2);
    }

    #[test]
    fn test_memory_update_and_delete_unknown_id() {
        let storage = InMemoryStorage::new();
        let err = storage.update_cash_entry(42, &cash("2025-09-10", "x")).unwrap_err();
        assert!(matches!(err, StorageError::NotFound { table: Table::CashEntries, id: 42 }));
        assert!(storage.delete_work_order(7).is_err());
    }

    #[test]
    fn test_memory_update_replaces_fields() {
        let storage = InMemoryStorage::new();
        let created = storage.insert_cash_entry(&cash("2025-09-10", "a")).unwrap();
        let mut replacement = cash("2025-09-11", "b");
        replacement.debit = dec!(12.50);
        let updated = storage.update_cash_entry(created.id, &replacement).unwrap();

        assert_eq!(updated.id, created.id);
        assert_eq!(updated.date, date("2025-09-11"));
        assert_eq!(updated.work_order, "b");
        assert_eq!(updated.debit, dec!(12.50));
        assert_eq!(updated.created_at, created.created_at);
        assert!(updated.updated_at >= created.updated_at);
    }

    #[test]
    fn test_memory_counts() {
        let storage = InMemoryStorage::new();
        storage.insert_cash_entry(&cash("2025-09-10", "a")).unwrap();
        storage
            .insert_work_order(&WorkOrderCommand {
                date: date("2025-09-10"),
                number: "1111".to_string(),
                released_by: "Joao".to_string(),
                collected_by: "Maria".to_string(),
            })
            .unwrap();
        let counts = storage.record_counts().unwrap();
        assert_eq!(counts, RecordCounts { cash_entries: 1, work_orders: 1 });
    }
}
