//! Reconciliation calculator
//!
//! Turns the raw inputs of a closing into derived totals and the signed
//! difference between counted and expected cash.
//!
//! # Formula
//!
//! ```text
//! opening  = initial_coin + initial_pool_float + initial_supply_float
//! revenue  = commission + product_sales
//! expected = opening + revenue − prizes_paid − Σ withdrawals
//! counted  = cash_drawer_1 + cash_drawer_2
//!          + final_coin + final_pool_float + final_supply_float
//! difference = counted − expected
//! ```
//!
//! A non-negative difference means the counted cash meets or exceeds the
//! expectation; a negative one is a shortage. Every function here is pure.

use crate::{
    fields::{ClosingFields, SlotGroup},
    types::{DenominationCount, Money, ProductCount},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Derived totals of a closing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosingTotals {
    /// Sum of both cash-drawer totals
    pub total_cash_drawers: Money,
    /// Sum of vault and transport withdrawal slots
    pub total_withdrawals: Money,
    /// Sum of received-at-drawer slots
    pub total_received: Money,
    /// Sum of opening balances
    pub opening_balance: Money,
    /// Commission plus product sales
    pub revenue: Money,
    /// Balance the drawer should hold
    pub expected_balance: Money,
    /// Balance actually counted
    pub counted_balance: Money,
    /// Counted minus expected
    pub difference: Money,
}

impl ClosingTotals {
    /// Counted cash is below expectation
    pub fn is_short(&self) -> bool {
        self.difference < Decimal::ZERO
    }
}

/// Compute closing totals
pub fn closing_totals(fields: &ClosingFields) -> ClosingTotals {
    let total_cash_drawers = fields.cash_drawer_1 + fields.cash_drawer_2;
    let total_withdrawals = sum(fields.slots(SlotGroup::VaultWithdrawal))
        + sum(fields.slots(SlotGroup::TransportWithdrawal));
    let total_received = sum(fields.slots(SlotGroup::Received));

    let opening_balance =
        fields.initial_coin + fields.initial_pool_float + fields.initial_supply_float;
    let revenue = fields.commission + fields.product_sales;

    let expected_balance = opening_balance + revenue - fields.prizes_paid - total_withdrawals;
    let counted_balance = total_cash_drawers
        + fields.final_coin
        + fields.final_pool_float
        + fields.final_supply_float;

    ClosingTotals {
        total_cash_drawers,
        total_withdrawals,
        total_received,
        opening_balance,
        revenue,
        expected_balance,
        counted_balance,
        difference: counted_balance - expected_balance,
    }
}

fn sum(values: &[Money]) -> Money {
    values.iter().copied().sum()
}

/// One product's derived values
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductLineSummary {
    /// Product name
    pub product: String,
    /// initial + received − returned − final (signed)
    pub net_consumed: i64,
    /// unit_price × net_consumed (signed)
    pub sold_value: Money,
}

/// Derived values of all product movements of a closing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSummary {
    /// Per-product lines, in input order
    pub lines: Vec<ProductLineSummary>,
    /// Sum of net consumed units
    pub total_net_consumed: i64,
    /// Sum of sold values
    pub total_sold_value: Money,
}

impl ProductSummary {
    /// Lines whose net consumption is negative
    pub fn anomalous_lines(&self) -> impl Iterator<Item = &ProductLineSummary> {
        self.lines.iter().filter(|line| line.net_consumed < 0)
    }
}

/// Compute product totals
pub fn product_summary(products: &[ProductCount]) -> ProductSummary {
    let lines: Vec<ProductLineSummary> = products
        .iter()
        .map(|p| ProductLineSummary {
            product: p.product.clone(),
            net_consumed: p.net_consumed(),
            sold_value: p.sold_value(),
        })
        .collect();

    ProductSummary {
        total_net_consumed: lines.iter().map(|l| l.net_consumed).sum(),
        total_sold_value: lines.iter().map(|l| l.sold_value).sum(),
        lines,
    }
}

/// Derived values of the vault supply count
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultSummary {
    /// Σ face_value × count
    pub vault_total: Money,
    /// Σ count
    pub total_count: i64,
}

/// Compute vault supply totals
pub fn vault_summary(denominations: &[DenominationCount]) -> VaultSummary {
    VaultSummary {
        vault_total: denominations.iter().map(DenominationCount::line_total).sum(),
        total_count: denominations.iter().map(|d| d.count).sum(),
    }
}

/// Full reconciliation of one closing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reconciliation {
    /// Cash totals and difference
    pub totals: ClosingTotals,
    /// Product movement totals
    pub products: ProductSummary,
    /// Vault supply totals
    pub vault: VaultSummary,
}

/// Reconcile a closing with its product movements and vault count
pub fn reconcile(
    fields: &ClosingFields,
    products: &[ProductCount],
    denominations: &[DenominationCount],
) -> Reconciliation {
    Reconciliation {
        totals: closing_totals(fields),
        products: product_summary(products),
        vault: vault_summary(denominations),
    }
}
