//! Cash Office Reconciliation Core
//!
//! Records and pure arithmetic for end-of-day cash closings at lottery
//! retail outlets.
//!
//! # Architecture
//!
//! - **Records**: user profiles, closings, product movements and vault
//!   denominations, all money held as exact `Decimal`
//! - **Fields**: every closing input is addressed through an enumerated
//!   `ClosingField`, never through string keys
//! - **Calculator**: totals, expected/counted balances and the signed
//!   difference of a closing
//! - **Anomalies**: shortages, surpluses and inventory anomalies surfaced
//!   alongside the numbers
//!
//! # Invariants
//!
//! - Deterministic: same inputs always produce the same totals
//! - Exact: no binary floating point anywhere on the money path
//! - Unclamped: negative intermediate values are reported, never corrected

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod anomaly;
pub mod calculator;
pub mod error;
pub mod fields;
pub mod types;
pub mod validation;

// Re-exports
pub use anomaly::{
    detect, detect_with_denominations, AnomalyConfig, AnomalyKind, AnomalyWarning, Severity,
};
pub use calculator::{
    closing_totals, product_summary, reconcile, vault_summary, ClosingTotals, ProductLineSummary,
    ProductSummary, Reconciliation, VaultSummary,
};
pub use error::{Error, FieldError, Result, ValidationErrors};
pub use fields::{ClosingField, ClosingFields, Slot, SlotGroup};
pub use types::{
    CashClosing, ClosingStatus, DenominationCount, Money, OperatorCode, ProductCount,
    ProductMovement, Role, SupplyDenomination, UserProfile,
};
pub use validation::{validate_closing, MAX_AMOUNT, MAX_COUNT};
