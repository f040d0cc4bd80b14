//! Cash Office
//!
//! End-of-day cash closing service for lottery retail outlets: operators
//! record their drawer counts, withdrawals, product movements and vault
//! supply; the service reconciles them and admins review the results.
//!
//! # Architecture
//!
//! - **Gateways**: record store ([`PersistenceGateway`]) and authentication
//!   ([`IdentityGateway`]) behind async traits
//! - **Single Writer**: every closing mutation goes through one Tokio task,
//!   so concurrent saves for the same day never interleave
//! - **Facade**: [`CashOffice`] resolves the caller from a session token and
//!   enforces ownership and roles
//!
//! # Invariants
//!
//! - One closing per (operator, date)
//! - Stored `difference` always equals the reconciliation of the stored fields
//! - Closed closings are read-only
//! - Operators never see another operator's closings

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod actor;
pub mod config;
pub mod error;
pub mod identity;
pub mod metrics;
pub mod office;
pub mod report;
#[cfg(feature = "rocksdb")]
pub mod rocks;
pub mod storage;

// Re-exports
pub use actor::{spawn_closing_writer, ClosingWriterHandle, StoredClosing};
pub use config::{Config, IdentityConfig, StoreBackend, StoreConfig, WriterConfig};
pub use error::{AuthError, Error, Result};
pub use identity::{
    Identity, IdentityGateway, LocalIdentityProvider, Session, SessionToken, SignInOutcome,
    SignUpOutcome,
};
pub use metrics::Metrics;
pub use office::{
    evaluate_closing, CashOffice, ClosingDetail, ClosingDraft, ClosingEvaluation, Registration,
    RegistrationRequest, SignedIn,
};
pub use report::{build_period_report, OperatorPeriodRow, PeriodReport, ReportTotals};
#[cfg(feature = "rocksdb")]
pub use rocks::RocksStore;
pub use storage::{ClosingFilter, MemoryStore, PersistenceGateway, ProfileFilter};
