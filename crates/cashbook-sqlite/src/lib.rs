//! SQLite storage backend.
//!
//! Dates are kept as `YYYY-MM-DD` text, amounts as decimal text and
//! timestamps as RFC 3339 text, so every value round-trips exactly.

use std::{
    str::FromStr,
    sync::{Mutex, MutexGuard},
};

use cashbook_core::{
    CalendarDate, CashEntry, CashEntryCommand, EntryId, RecordCounts, StorageBackend, StorageError,
    Table, WorkOrderCommand, WorkOrderEntry,
};
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

const CASH_COLUMNS: &str = "id, date, work_order, credit, debit, debit_note, created_at, updated_at";
const WORK_ORDER_COLUMNS: &str = "id, date, number, released_by, collected_by, created_at, updated_at";

pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    pub fn new(path: &str) -> Result<Self, StorageError> {
        let conn = if path == ":memory:" {
            Connection::open_in_memory()
        } else {
            Connection::open(path)
        }
        .map_err(sql_err)?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(sql_err)?;

        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.init_schema()?;
        tracing::debug!(path, "SQLite storage opened");
        Ok(storage)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Other("SQLite connection lock poisoned".to_string()))
    }

    fn init_schema(&self) -> Result<(), StorageError> {
        let conn = self.lock()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS cash_entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                date TEXT NOT NULL,
                work_order TEXT NOT NULL DEFAULT '',
                credit TEXT NOT NULL,
                debit TEXT NOT NULL,
                debit_note TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS work_orders (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                date TEXT NOT NULL,
                number TEXT NOT NULL,
                released_by TEXT NOT NULL DEFAULT '',
                collected_by TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_cash_entries_date
                ON cash_entries(date, id);

            CREATE INDEX IF NOT EXISTS idx_work_orders_date
                ON work_orders(date, id);
            ",
        )
        .map_err(sql_err)?;
        Ok(())
    }
}

fn sql_err(e: rusqlite::Error) -> StorageError {
    StorageError::Other(e.to_string())
}

fn timestamp_to_str(ts: OffsetDateTime) -> Result<String, StorageError> {
    ts.format(&Rfc3339)
        .map_err(|e| StorageError::Other(format!("cannot format timestamp: {}", e)))
}

fn str_to_timestamp(table: Table, s: &str) -> Result<OffsetDateTime, StorageError> {
    OffsetDateTime::parse(s, &Rfc3339).map_err(|e| StorageError::Corrupt {
        table,
        detail: format!("timestamp '{}': {}", s, e),
    })
}

fn str_to_date(table: Table, s: &str) -> Result<CalendarDate, StorageError> {
    CalendarDate::from_storage(s).map_err(|e| StorageError::Corrupt {
        table,
        detail: e.to_string(),
    })
}

fn str_to_amount(table: Table, s: &str) -> Result<Decimal, StorageError> {
    Decimal::from_str(s).map_err(|e| StorageError::Corrupt {
        table,
        detail: format!("amount '{}': {}", s, e),
    })
}

// Columns come out as text first; decoding happens outside rusqlite so a bad
// value surfaces as `StorageError::Corrupt` instead of a driver error.
struct RawCashRow {
    id: EntryId,
    date: String,
    work_order: String,
    credit: String,
    debit: String,
    debit_note: String,
    created_at: String,
    updated_at: String,
}

impl RawCashRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            date: row.get(1)?,
            work_order: row.get(2)?,
            credit: row.get(3)?,
            debit: row.get(4)?,
            debit_note: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }

    fn decode(self) -> Result<CashEntry, StorageError> {
        let t = Table::CashEntries;
        Ok(CashEntry {
            id: self.id,
            date: str_to_date(t, &self.date)?,
            work_order: self.work_order,
            credit: str_to_amount(t, &self.credit)?,
            debit: str_to_amount(t, &self.debit)?,
            debit_note: self.debit_note,
            created_at: str_to_timestamp(t, &self.created_at)?,
            updated_at: str_to_timestamp(t, &self.updated_at)?,
        })
    }
}

struct RawWorkOrderRow {
    id: EntryId,
    date: String,
    number: String,
    released_by: String,
    collected_by: String,
    created_at: String,
    updated_at: String,
}

impl RawWorkOrderRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            date: row.get(1)?,
            number: row.get(2)?,
            released_by: row.get(3)?,
            collected_by: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }

    fn decode(self) -> Result<WorkOrderEntry, StorageError> {
        let t = Table::WorkOrders;
        Ok(WorkOrderEntry {
            id: self.id,
            date: str_to_date(t, &self.date)?,
            number: self.number,
            released_by: self.released_by,
            collected_by: self.collected_by,
            created_at: str_to_timestamp(t, &self.created_at)?,
            updated_at: str_to_timestamp(t, &self.updated_at)?,
        })
    }
}

fn fetch_cash_entry(conn: &Connection, id: EntryId) -> Result<CashEntry, StorageError> {
    conn.query_row(
        &format!("SELECT {} FROM cash_entries WHERE id = ?1", CASH_COLUMNS),
        params![id],
        RawCashRow::from_row,
    )
    .optional()
    .map_err(sql_err)?
    .ok_or(StorageError::NotFound { table: Table::CashEntries, id })?
    .decode()
}

fn fetch_work_order(conn: &Connection, id: EntryId) -> Result<WorkOrderEntry, StorageError> {
    conn.query_row(
        &format!("SELECT {} FROM work_orders WHERE id = ?1", WORK_ORDER_COLUMNS),
        params![id],
        RawWorkOrderRow::from_row,
    )
    .optional()
    .map_err(sql_err)?
    .ok_or(StorageError::NotFound { table: Table::WorkOrders, id })?
    .decode()
}

impl StorageBackend for SqliteStorage {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    fn server_version(&self) -> Result<String, StorageError> {
        let conn = self.lock()?;
        let version: String = conn
            .query_row("SELECT sqlite_version()", [], |r| r.get(0))
            .map_err(sql_err)?;
        Ok(format!("SQLite {}", version))
    }

    fn insert_cash_entry(&self, command: &CashEntryCommand) -> Result<CashEntry, StorageError> {
        let conn = self.lock()?;
        let now = timestamp_to_str(OffsetDateTime::now_utc())?;
        conn.execute(
            "INSERT INTO cash_entries (date, work_order, credit, debit, debit_note, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![
                command.date.to_storage_string(),
                command.work_order,
                command.credit.to_string(),
                command.debit.to_string(),
                command.debit_note,
                now
            ],
        )
        .map_err(sql_err)?;

        let id = conn.last_insert_rowid();
        tracing::debug!(id, date = %command.date, "cash entry inserted");
        fetch_cash_entry(&conn, id)
    }

    fn list_cash_entries(&self, date: Option<CalendarDate>) -> Result<Vec<CashEntry>, StorageError> {
        let conn = self.lock()?;
        let raw: Vec<RawCashRow> = match date {
            Some(d) => {
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT {} FROM cash_entries WHERE date = ?1 ORDER BY date, id",
                        CASH_COLUMNS
                    ))
                    .map_err(sql_err)?;
                let rows = stmt
                    .query_map(params![d.to_storage_string()], RawCashRow::from_row)
                    .map_err(sql_err)?;
                rows.collect::<Result<_, _>>().map_err(sql_err)?
            }
            None => {
                let mut stmt = conn
                    .prepare(&format!("SELECT {} FROM cash_entries ORDER BY date, id", CASH_COLUMNS))
                    .map_err(sql_err)?;
                let rows = stmt.query_map([], RawCashRow::from_row).map_err(sql_err)?;
                rows.collect::<Result<_, _>>().map_err(sql_err)?
            }
        };
        raw.into_iter().map(RawCashRow::decode).collect()
    }

    fn get_cash_entry(&self, id: EntryId) -> Result<CashEntry, StorageError> {
        let conn = self.lock()?;
        fetch_cash_entry(&conn, id)
    }

    fn update_cash_entry(&self, id: EntryId, command: &CashEntryCommand) -> Result<CashEntry, StorageError> {
        let conn = self.lock()?;
        let now = timestamp_to_str(OffsetDateTime::now_utc())?;
        let changed = conn
            .execute(
                "UPDATE cash_entries
                 SET date = ?1, work_order = ?2, credit = ?3, debit = ?4, debit_note = ?5, updated_at = ?6
                 WHERE id = ?7",
                params![
                    command.date.to_storage_string(),
                    command.work_order,
                    command.credit.to_string(),
                    command.debit.to_string(),
                    command.debit_note,
                    now,
                    id
                ],
            )
            .map_err(sql_err)?;
        if changed == 0 {
            return Err(StorageError::NotFound { table: Table::CashEntries, id });
        }
        fetch_cash_entry(&conn, id)
    }

    fn delete_cash_entry(&self, id: EntryId) -> Result<(), StorageError> {
        let conn = self.lock()?;
        let changed = conn
            .execute("DELETE FROM cash_entries WHERE id = ?1", params![id])
            .map_err(sql_err)?;
        if changed == 0 {
            return Err(StorageError::NotFound { table: Table::CashEntries, id });
        }
        Ok(())
    }

    fn insert_work_order(&self, command: &WorkOrderCommand) -> Result<WorkOrderEntry, StorageError> {
        let conn = self.lock()?;
        let now = timestamp_to_str(OffsetDateTime::now_utc())?;
        conn.execute(
            "INSERT INTO work_orders (date, number, released_by, collected_by, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![
                command.date.to_storage_string(),
                command.number,
                command.released_by,
                command.collected_by,
                now
            ],
        )
        .map_err(sql_err)?;

        let id = conn.last_insert_rowid();
        tracing::debug!(id, date = %command.date, "work order inserted");
        fetch_work_order(&conn, id)
    }

    fn list_work_orders(&self, date: Option<CalendarDate>) -> Result<Vec<WorkOrderEntry>, StorageError> {
        let conn = self.lock()?;
        let raw: Vec<RawWorkOrderRow> = match date {
            Some(d) => {
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT {} FROM work_orders WHERE date = ?1 ORDER BY date, id",
                        WORK_ORDER_COLUMNS
                    ))
                    .map_err(sql_err)?;
                let rows = stmt
                    .query_map(params![d.to_storage_string()], RawWorkOrderRow::from_row)
                    .map_err(sql_err)?;
                rows.collect::<Result<_, _>>().map_err(sql_err)?
            }
            None => {
                let mut stmt = conn
                    .prepare(&format!("SELECT {} FROM work_orders ORDER BY date, id", WORK_ORDER_COLUMNS))
                    .map_err(sql_err)?;
                let rows = stmt.query_map([], RawWorkOrderRow::from_row).map_err(sql_err)?;
                rows.collect::<Result<_, _>>().map_err(sql_err)?
            }
        };
        raw.into_iter().map(RawWorkOrderRow::decode).collect()
    }

    fn get_work_order(&self, id: EntryId) -> Result<WorkOrderEntry, StorageError> {
        let conn = self.lock()?;
        fetch_work_order(&conn, id)
    }

    fn update_work_order(&self, id: EntryId, command: &WorkOrderCommand) -> Result<WorkOrderEntry, StorageError> {
        let conn = self.lock()?;
        let now = timestamp_to_str(OffsetDateTime::now_utc())?;
        let changed = conn
            .execute(
                "UPDATE work_orders
                 SET date = ?1, number = ?2, released_by = ?3, collected_by = ?4, updated_at = ?5
                 WHERE id = ?6",
                params![
                    command.date.to_storage_string(),
                    command.number,
                    command.released_by,
                    command.collected_by,
                    now,
                    id
                ],
            )
            .map_err(sql_err)?;
        if changed == 0 {
            return Err(StorageError::NotFound { table: Table::WorkOrders, id });
        }
        fetch_work_order(&conn, id)
    }

    fn delete_work_order(&self, id: EntryId) -> Result<(), StorageError> {
        let conn = self.lock()?;
        let changed = conn
            .execute("DELETE FROM work_orders WHERE id = ?1", params![id])
            .map_err(sql_err)?;
        if changed == 0 {
            return Err(StorageError::NotFound { table: Table::WorkOrders, id });
        }
        Ok(())
    }

    fn record_counts(&self) -> Result<RecordCounts, StorageError> {
        let conn = self.lock()?;
        let cash_entries: i64 = conn
            .query_row("SELECT COUNT(*) FROM cash_entries", [], |r| r.get(0))
            .map_err(sql_err)?;
        let work_orders: i64 = conn
            .query_row("SELECT COUNT(*) FROM work_orders", [], |r| r.get(0))
            .map_err(sql_err)?;
        Ok(RecordCounts {
            cash_entries: cash_entries as u64,
            work_orders: work_orders as u64,
        })
    }
}
