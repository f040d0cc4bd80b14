//! Period reports for admins
//!
//! Aggregates closings per operator over an inclusive date range. Pure over
//! the rows it is given; the facade fetches them.

use chrono::NaiveDate;
use reconciliation_core::{closing_totals, CashClosing, Money, OperatorCode, UserProfile};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// One operator's figures for the period
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorPeriodRow {
    /// Operator
    pub user_id: Uuid,
    /// Operator code; `None` once the profile has been deleted
    pub operator_code: Option<OperatorCode>,
    /// Operator name
    pub name: Option<String>,
    /// Closings in the period
    pub closings: usize,
    /// Closings already closed
    pub closed: usize,
    /// Σ commission
    pub commission: Money,
    /// Σ product sales
    pub product_sales: Money,
    /// Σ vault and transport withdrawals
    pub withdrawals: Money,
    /// Σ difference
    pub difference: Money,
    /// Closings with a negative difference
    pub shortages: usize,
    /// Most negative difference (zero without shortages)
    pub largest_shortage: Money,
}

impl OperatorPeriodRow {
    fn empty(user_id: Uuid, profile: Option<&UserProfile>) -> Self {
        Self {
            user_id,
            operator_code: profile.map(|p| p.operator_code.clone()),
            name: profile.map(|p| p.name.clone()),
            closings: 0,
            closed: 0,
            commission: Decimal::ZERO,
            product_sales: Decimal::ZERO,
            withdrawals: Decimal::ZERO,
            difference: Decimal::ZERO,
            shortages: 0,
            largest_shortage: Decimal::ZERO,
        }
    }

    fn add(&mut self, closing: &CashClosing) {
        let totals = closing_totals(&closing.fields);

        self.closings += 1;
        if closing.is_closed() {
            self.closed += 1;
        }
        self.commission += closing.fields.commission;
        self.product_sales += closing.fields.product_sales;
        self.withdrawals += totals.total_withdrawals;
        self.difference += closing.difference;
        if closing.difference < Decimal::ZERO {
            self.shortages += 1;
            self.largest_shortage = self.largest_shortage.min(closing.difference);
        }
    }
}

/// Grand totals of a period
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportTotals {
    /// Closings in the period
    pub closings: usize,
    /// Σ commission
    pub commission: Money,
    /// Σ product sales
    pub product_sales: Money,
    /// Σ withdrawals
    pub withdrawals: Money,
    /// Σ difference
    pub difference: Money,
    /// Closings with a negative difference
    pub shortages: usize,
}

/// Per-operator report over a date range
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodReport {
    /// First date (inclusive)
    pub from: NaiveDate,
    /// Last date (inclusive)
    pub to: NaiveDate,
    /// One row per operator with closings, ordered by operator code
    pub rows: Vec<OperatorPeriodRow>,
    /// Sum of every row
    pub totals: ReportTotals,
}

/// Build a period report from the closings of the range
pub fn build_period_report(
    from: NaiveDate,
    to: NaiveDate,
    profiles: &[UserProfile],
    closings: &[CashClosing],
) -> PeriodReport {
    let mut rows: BTreeMap<Uuid, OperatorPeriodRow> = BTreeMap::new();

    for closing in closings.iter().filter(|c| c.date >= from && c.date <= to) {
        rows.entry(closing.user_id)
            .or_insert_with(|| {
                let profile = profiles.iter().find(|p| p.id == closing.user_id);
                OperatorPeriodRow::empty(closing.user_id, profile)
            })
            .add(closing);
    }

    let mut rows: Vec<OperatorPeriodRow> = rows.into_values().collect();
    // Deleted operators (no code) sort last
    rows.sort_by(|a, b| match (&a.operator_code, &b.operator_code) {
        (Some(x), Some(y)) => x.cmp(y),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.user_id.cmp(&b.user_id),
    });

    let totals = rows.iter().fold(ReportTotals::default(), |mut acc, row| {
        acc.closings += row.closings;
        acc.commission += row.commission;
        acc.product_sales += row.product_sales;
        acc.withdrawals += row.withdrawals;
        acc.difference += row.difference;
        acc.shortages += row.shortages;
        acc
    });

    PeriodReport {
        from,
        to,
        rows,
        totals,
    }
}
