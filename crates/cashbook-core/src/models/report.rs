use std::fmt::Display;

use prettytable::{row, Table};
use rust_decimal::Decimal;

use crate::{
    date::CalendarDate,
    money::{self, AmountError},
};

use super::{CashEntry, WorkOrderEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyTotals {
    pub credit: Decimal,
    pub debit: Decimal,
    pub net: Decimal,
}

/// Everything recorded for one business day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyReport {
    pub date: CalendarDate,
    pub cash_entries: Vec<CashEntry>,
    pub work_orders: Vec<WorkOrderEntry>,
    pub totals: DailyTotals,
}

impl DailyReport {
    /// Rows dated on other days are left out. Fails only if the totals overflow.
    pub fn new(
        date: CalendarDate,
        cash_entries: Vec<CashEntry>,
        work_orders: Vec<WorkOrderEntry>,
    ) -> Result<Self, AmountError> {
        let cash_entries: Vec<CashEntry> = cash_entries.into_iter().filter(|e| e.date == date).collect();
        let work_orders: Vec<WorkOrderEntry> = work_orders.into_iter().filter(|w| w.date == date).collect();

        let credit = money::total(cash_entries.iter().map(|e| e.credit))?;
        let debit = money::total(cash_entries.iter().map(|e| e.debit))?;
        let net = credit
            .checked_sub(debit)
            .map(money::to_cents)
            .ok_or(AmountError::Overflow)?;

        Ok(Self {
            date,
            cash_entries,
            work_orders,
            totals: DailyTotals { credit, debit, net },
        })
    }
}

impl Display for DailyReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Daily report {}", self.date.to_display_string())?;

        let mut cash = Table::new();
        cash.add_row(row!["Date", "Work order", "Credit", "Debit", "Net", "Note"]);
        cash.add_empty_row();
        for e in &self.cash_entries {
            cash.add_row(row![
                e.date.to_display_string(),
                e.work_order,
                money::format_amount(e.credit),
                money::format_amount(e.debit),
                money::format_amount(e.net()),
                e.debit_note
            ]);
        }
        cash.add_empty_row();
        cash.add_row(row![
            "Total",
            "",
            money::format_amount(self.totals.credit),
            money::format_amount(self.totals.debit),
            money::format_amount(self.totals.net),
            ""
        ]);

        let mut orders = Table::new();
        orders.add_row(row!["Work order", "Released by", "Collected by", "Date"]);
        orders.add_empty_row();
        for w in &self.work_orders {
            orders.add_row(row![w.number, w.released_by, w.collected_by, w.date.to_display_string()]);
        }

        write!(f, "\nCash movements\n{}\nWork orders leaving\n{}", cash, orders)
    }
}
