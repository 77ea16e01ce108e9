//! PostgreSQL storage backend.
//!
//! Uses native `DATE`, `NUMERIC(12,2)` and `TIMESTAMPTZ` columns. A `DATE`
//! carries no offset, so the calendar date written is the one read back
//! regardless of the server's or the session's timezone.

use std::sync::{Mutex, MutexGuard};

use cashbook_core::{
    CalendarDate, CashEntry, CashEntryCommand, EntryId, RecordCounts, StorageBackend, StorageError,
    Table, WorkOrderCommand, WorkOrderEntry,
};
use postgres::{Client, NoTls, Row};
use rust_decimal::Decimal;
use time::{Date, OffsetDateTime};

const CASH_COLUMNS: &str = "id, date, work_order, credit, debit, debit_note, created_at, updated_at";
const WORK_ORDER_COLUMNS: &str = "id, date, number, released_by, collected_by, created_at, updated_at";

pub struct PostgresStorage {
    client: Mutex<Client>,
}

impl PostgresStorage {
    /// Must be called outside an async context: the blocking client drives
    /// its own runtime.
    pub fn new(connection_string: &str) -> Result<Self, StorageError> {
        let client = Client::connect(connection_string, NoTls)
            .map_err(|e| StorageError::Other(format!("PostgreSQL connection failed: {}", e)))?;

        let storage = Self {
            client: Mutex::new(client),
        };
        storage.init_schema()?;
        tracing::debug!("PostgreSQL storage ready");
        Ok(storage)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Client>, StorageError> {
        self.client
            .lock()
            .map_err(|_| StorageError::Other("PostgreSQL client lock poisoned".to_string()))
    }

    fn init_schema(&self) -> Result<(), StorageError> {
        let mut client = self.lock()?;
        client
            .batch_execute(
                "
            CREATE TABLE IF NOT EXISTS cash_entries (
                id BIGSERIAL PRIMARY KEY,
                date DATE NOT NULL,
                work_order VARCHAR(50) NOT NULL DEFAULT '',
                credit NUMERIC(12,2) NOT NULL DEFAULT 0 CHECK (credit >= 0),
                debit NUMERIC(12,2) NOT NULL DEFAULT 0 CHECK (debit >= 0),
                debit_note TEXT NOT NULL DEFAULT '',
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            );

            CREATE TABLE IF NOT EXISTS work_orders (
                id BIGSERIAL PRIMARY KEY,
                date DATE NOT NULL,
                number VARCHAR(50) NOT NULL,
                released_by VARCHAR(255) NOT NULL DEFAULT '',
                collected_by VARCHAR(255) NOT NULL DEFAULT '',
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            );

            CREATE INDEX IF NOT EXISTS idx_pg_cash_entries_date
                ON cash_entries(date, id);

            CREATE INDEX IF NOT EXISTS idx_pg_work_orders_date
                ON work_orders(date, id);
            ",
            )
            .map_err(pg_err)?;
        Ok(())
    }
}

fn pg_err(e: postgres::Error) -> StorageError {
    StorageError::Other(e.to_string())
}

fn corrupt(table: Table) -> impl Fn(postgres::Error) -> StorageError {
    move |e| StorageError::Corrupt {
        table,
        detail: e.to_string(),
    }
}

fn cash_from_row(row: &Row) -> Result<CashEntry, StorageError> {
    let bad = corrupt(Table::CashEntries);
    Ok(CashEntry {
        id: row.try_get("id").map_err(&bad)?,
        date: CalendarDate::from(row.try_get::<_, Date>("date").map_err(&bad)?),
        work_order: row.try_get("work_order").map_err(&bad)?,
        credit: row.try_get::<_, Decimal>("credit").map_err(&bad)?,
        debit: row.try_get::<_, Decimal>("debit").map_err(&bad)?,
        debit_note: row.try_get("debit_note").map_err(&bad)?,
        created_at: row.try_get::<_, OffsetDateTime>("created_at").map_err(&bad)?,
        updated_at: row.try_get::<_, OffsetDateTime>("updated_at").map_err(&bad)?,
    })
}

fn work_order_from_row(row: &Row) -> Result<WorkOrderEntry, StorageError> {
    let bad = corrupt(Table::WorkOrders);
    Ok(WorkOrderEntry {
        id: row.try_get("id").map_err(&bad)?,
        date: CalendarDate::from(row.try_get::<_, Date>("date").map_err(&bad)?),
        number: row.try_get("number").map_err(&bad)?,
        released_by: row.try_get("released_by").map_err(&bad)?,
        collected_by: row.try_get("collected_by").map_err(&bad)?,
        created_at: row.try_get::<_, OffsetDateTime>("created_at").map_err(&bad)?,
        updated_at: row.try_get::<_, OffsetDateTime>("updated_at").map_err(&bad)?,
    })
}

impl StorageBackend for PostgresStorage {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    fn server_version(&self) -> Result<String, StorageError> {
        let mut client = self.lock()?;
        let row = client.query_one("SHOW server_version", &[]).map_err(pg_err)?;
        let version: String = row.try_get(0).map_err(pg_err)?;
        Ok(format!("PostgreSQL {}", version))
    }

    fn insert_cash_entry(&self, command: &CashEntryCommand) -> Result<CashEntry, StorageError> {
        let mut client = self.lock()?;
        let row = client
            .query_one(
                &format!(
                    "INSERT INTO cash_entries (date, work_order, credit, debit, debit_note)
                     VALUES ($1, $2, $3, $4, $5) RETURNING {}",
                    CASH_COLUMNS
                ),
                &[
                    &command.date.as_date(),
                    &command.work_order,
                    &command.credit,
                    &command.debit,
                    &command.debit_note,
                ],
            )
            .map_err(pg_err)?;
        let entry = cash_from_row(&row)?;
        tracing::debug!(id = entry.id, date = %entry.date, "cash entry inserted");
        Ok(entry)
    }

    fn list_cash_entries(&self, date: Option<CalendarDate>) -> Result<Vec<CashEntry>, StorageError> {
        let mut client = self.lock()?;
        let rows = match date {
            Some(d) => client.query(
                &format!("SELECT {} FROM cash_entries WHERE date = $1 ORDER BY date, id", CASH_COLUMNS),
                &[&d.as_date()],
            ),
            None => client.query(
                &format!("SELECT {} FROM cash_entries ORDER BY date, id", CASH_COLUMNS),
                &[],
            ),
        }
        .map_err(pg_err)?;
        rows.iter().map(cash_from_row).collect()
    }

    fn get_cash_entry(&self, id: EntryId) -> Result<CashEntry, StorageError> {
        let mut client = self.lock()?;
        let row = client
            .query_opt(&format!("SELECT {} FROM cash_entries WHERE id = $1", CASH_COLUMNS), &[&id])
            .map_err(pg_err)?
            .ok_or(StorageError::NotFound { table: Table::CashEntries, id })?;
        cash_from_row(&row)
    }

    fn update_cash_entry(&self, id: EntryId, command: &CashEntryCommand) -> Result<CashEntry, StorageError> {
        let mut client = self.lock()?;
        let row = client
            .query_opt(
                &format!(
                    "UPDATE cash_entries
                     SET date = $1, work_order = $2, credit = $3, debit = $4, debit_note = $5, updated_at = now()
                     WHERE id = $6 RETURNING {}",
                    CASH_COLUMNS
                ),
                &[
                    &command.date.as_date(),
                    &command.work_order,
                    &command.credit,
                    &command.debit,
                    &command.debit_note,
                    &id,
                ],
            )
            .map_err(pg_err)?
            .ok_or(StorageError::NotFound { table: Table::CashEntries, id })?;
        cash_from_row(&row)
    }

    fn delete_cash_entry(&self, id: EntryId) -> Result<(), StorageError> {
        let mut client = self.lock()?;
        let changed = client
            .execute("DELETE FROM cash_entries WHERE id = $1", &[&id])
            .map_err(pg_err)?;
        if changed == 0 {
            return Err(StorageError::NotFound { table: Table::CashEntries, id });
        }
        Ok(())
    }

    fn insert_work_order(&self, command: &WorkOrderCommand) -> Result<WorkOrderEntry, StorageError> {
        let mut client = self.lock()?;
        let row = client
            .query_one(
                &format!(
                    "INSERT INTO work_orders (date, number, released_by, collected_by)
                     VALUES ($1, $2, $3, $4) RETURNING {}",
                    WORK_ORDER_COLUMNS
                ),
                &[
                    &command.date.as_date(),
                    &command.number,
                    &command.released_by,
                    &command.collected_by,
                ],
            )
            .map_err(pg_err)?;
        let order = work_order_from_row(&row)?;
        tracing::debug!(id = order.id, date = %order.date, "work order inserted");
        Ok(order)
    }

    fn list_work_orders(&self, date: Option<CalendarDate>) -> Result<Vec<WorkOrderEntry>, StorageError> {
        let mut client = self.lock()?;
        let rows = match date {
            Some(d) => client.query(
                &format!("SELECT {} FROM work_orders WHERE date = $1 ORDER BY date, id", WORK_ORDER_COLUMNS),
                &[&d.as_date()],
            ),
            None => client.query(
                &format!("SELECT {} FROM work_orders ORDER BY date, id", WORK_ORDER_COLUMNS),
                &[],
            ),
        }
        .map_err(pg_err)?;
        rows.iter().map(work_order_from_row).collect()
    }

    fn get_work_order(&self, id: EntryId) -> Result<WorkOrderEntry, StorageError> {
        let mut client = self.lock()?;
        let row = client
            .query_opt(&format!("SELECT {} FROM work_orders WHERE id = $1", WORK_ORDER_COLUMNS), &[&id])
            .map_err(pg_err)?
            .ok_or(StorageError::NotFound { table: Table::WorkOrders, id })?;
        work_order_from_row(&row)
    }

    fn update_work_order(&self, id: EntryId, command: &WorkOrderCommand) -> Result<WorkOrderEntry, StorageError> {
        let mut client = self.lock()?;
        let row = client
            .query_opt(
                &format!(
                    "UPDATE work_orders
                     SET date = $1, number = $2, released_by = $3, collected_by = $4, updated_at = now()
                     WHERE id = $5 RETURNING {}",
                    WORK_ORDER_COLUMNS
                ),
                &[
                    &command.date.as_date(),
                    &command.number,
                    &command.released_by,
                    &command.collected_by,
                    &id,
                ],
            )
            .map_err(pg_err)?
            .ok_or(StorageError::NotFound { table: Table::WorkOrders, id })?;
        work_order_from_row(&row)
    }

    fn delete_work_order(&self, id: EntryId) -> Result<(), StorageError> {
        let mut client = self.lock()?;
        let changed = client
            .execute("DELETE FROM work_orders WHERE id = $1", &[&id])
            .map_err(pg_err)?;
        if changed == 0 {
            return Err(StorageError::NotFound { table: Table::WorkOrders, id });
        }
        Ok(())
    }

    fn record_counts(&self) -> Result<RecordCounts, StorageError> {
        let mut client = self.lock()?;
        let row = client
            .query_one(
                "SELECT (SELECT COUNT(*) FROM cash_entries), (SELECT COUNT(*) FROM work_orders)",
                &[],
            )
            .map_err(pg_err)?;
        let cash_entries: i64 = row.get(0);
        let work_orders: i64 = row.get(1);
        Ok(RecordCounts {
            cash_entries: cash_entries as u64,
            work_orders: work_orders as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    // Needs a scratch database: CASHBOOK_TEST_DATABASE_URL=postgres://... cargo test -- --ignored
    fn connect() -> PostgresStorage {
        let url = std::env::var("CASHBOOK_TEST_DATABASE_URL")
            .expect("CASHBOOK_TEST_DATABASE_URL must point at a scratch database");
        let storage = PostgresStorage::new(&url).unwrap();
        storage
            .lock()
            .unwrap()
            .batch_execute("TRUNCATE cash_entries, work_orders RESTART IDENTITY")
            .unwrap();
        storage
    }

    #[test]
    #[ignore]
    fn test_postgres_date_survives_session_timezone() {
        let storage = connect();
        storage
            .lock()
            .unwrap()
            .batch_execute("SET TIME ZONE 'Asia/Tokyo'")
            .unwrap();

        let date = CalendarDate::parse("2025-09-10").unwrap();
        let created = storage
            .insert_cash_entry(&CashEntryCommand {
                date,
                work_order: "1111".to_string(),
                credit: dec!(200.00),
                debit: dec!(50.00),
                debit_note: String::new(),
            })
            .unwrap();

        storage
            .lock()
            .unwrap()
            .batch_execute("SET TIME ZONE 'America/Sao_Paulo'")
            .unwrap();
        let fetched = storage.get_cash_entry(created.id).unwrap();
        assert_eq!(fetched.date.to_storage_string(), "2025-09-10");
        assert_eq!(fetched.net().to_string(), "150.00");
    }

    #[test]
    #[ignore]
    fn test_postgres_update_unknown_id() {
        let storage = connect();
        let err = storage
            .update_work_order(
                999,
                &WorkOrderCommand {
                    date: CalendarDate::parse("2025-09-10").unwrap(),
                    number: "1".to_string(),
                    released_by: String::new(),
                    collected_by: String::new(),
                },
            )
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound { table: Table::WorkOrders, id: 999 }));
    }

    #[test]
    #[ignore]
    fn test_postgres_round_trip_across_dst() {
        let storage = connect();
        storage
            .lock()
            .unwrap()
            .batch_execute("SET TIME ZONE 'America/New_York'")
            .unwrap();

        let mut date = CalendarDate::parse("2025-02-20").unwrap();
        let mut written = Vec::new();
        for _ in 0..100 {
            storage
                .insert_work_order(&WorkOrderCommand {
                    date,
                    number: "1".to_string(),
                    released_by: String::new(),
                    collected_by: String::new(),
                })
                .unwrap();
            written.push(date.to_storage_string());
            date = date.next_day().unwrap();
        }

        let read: Vec<String> = storage
            .list_work_orders(None)
            .unwrap()
            .iter()
            .map(|w| w.date.to_storage_string())
            .collect();
        assert_eq!(read, written);
    }
}
