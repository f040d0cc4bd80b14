//! Core records
//!
//! All types are designed for:
//! - Deterministic serialization (serde, bincode-compatible: no skipped fields)
//! - Exact arithmetic (Decimal for money, signed integers for counts)

use crate::{fields::ClosingFields, Error, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Money amount (exact decimal)
pub type Money = Decimal;

/// Unique operator code printed on the outlet's paperwork
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OperatorCode(String);

impl OperatorCode {
    /// Parse an operator code; trims and upper-cases, allows A-Z, 0-9 and '-'
    pub fn new(code: impl AsRef<str>) -> Result<Self> {
        let normalized = code.as_ref().trim().to_uppercase();
        let valid = !normalized.is_empty()
            && normalized.len() <= 32
            && normalized
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-');
        if !valid {
            return Err(Error::InvalidOperatorCode(code.as_ref().to_string()));
        }
        Ok(Self(normalized))
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperatorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Account role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Reviews reports and manages operator accounts
    Admin,
    /// Records their own daily closings
    Operator,
}

impl Role {
    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Operator => "operator",
        }
    }

    /// Whether this role may manage other profiles and read every closing
    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// User profile bound to an identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Profile ID (same as the identity ID)
    pub id: Uuid,

    /// Full name
    pub name: String,

    /// Tax identifier (CPF/CNPJ digits)
    pub tax_id: String,

    /// Login e-mail
    pub email: String,

    /// Contact phone
    pub phone: String,

    /// Unique operator code
    pub operator_code: OperatorCode,

    /// Role
    pub role: Role,

    /// Inactive profiles cannot sign in
    pub active: bool,

    /// Created timestamp
    pub created_at: DateTime<Utc>,

    /// Last updated timestamp
    pub updated_at: DateTime<Utc>,
}

/// Closing status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClosingStatus {
    /// Editable by its owner
    Open,
    /// Read-only
    Closed,
}

/// One operator's end-of-day closing for one calendar date
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashClosing {
    /// Closing ID
    pub id: Uuid,

    /// Owning operator
    pub user_id: Uuid,

    /// Calendar date; (user_id, date) is unique
    pub date: NaiveDate,

    /// Status
    pub status: ClosingStatus,

    /// Raw inputs
    pub fields: ClosingFields,

    /// Counted minus expected balance, stored on every save
    pub difference: Money,

    /// Free-text notes
    pub notes: String,

    /// Created timestamp
    pub created_at: DateTime<Utc>,

    /// Last updated timestamp
    pub updated_at: DateTime<Utc>,

    /// Set when the closing becomes read-only
    pub closed_at: Option<DateTime<Utc>>,
}

impl CashClosing {
    /// Empty open closing for (user, date)
    pub fn new(user_id: Uuid, date: NaiveDate) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            user_id,
            date,
            status: ClosingStatus::Open,
            fields: ClosingFields::default(),
            difference: Decimal::ZERO,
            notes: String::new(),
            created_at: now,
            updated_at: now,
            closed_at: None,
        }
    }

    /// Check if the closing is read-only
    pub fn is_closed(&self) -> bool {
        self.status == ClosingStatus::Closed
    }
}

/// Product inventory counts for one day, as entered on the form
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductCount {
    /// Product name (game or ticket type)
    pub product: String,

    /// Unit price
    pub unit_price: Money,

    /// Units on hand at opening
    pub initial: i64,

    /// Units received during the day
    pub received: i64,

    /// Units returned to the distributor
    pub returned: i64,

    /// Units on hand at closing
    pub final_count: i64,
}

impl ProductCount {
    /// Units no longer in stock: initial + received − returned − final.
    /// Negative values are data-entry anomalies and are kept as-is.
    pub fn net_consumed(&self) -> i64 {
        self.initial + self.received - self.returned - self.final_count
    }

    /// Unit price × net consumed (signed)
    pub fn sold_value(&self) -> Money {
        self.unit_price * Decimal::from(self.net_consumed())
    }
}

/// Counted quantity of one currency denomination in the vault supply
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DenominationCount {
    /// Face value of one note or coin
    pub face_value: Money,

    /// Number of notes or coins counted
    pub count: i64,
}

impl DenominationCount {
    /// Face value × count
    pub fn line_total(&self) -> Money {
        self.face_value * Decimal::from(self.count)
    }
}

/// Stored product movement row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductMovement {
    /// Owning closing
    pub closing_id: Uuid,

    /// Entered counts
    pub line: ProductCount,
}

/// Stored vault denomination row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplyDenomination {
    /// Owning closing
    pub closing_id: Uuid,

    /// Entered count
    pub line: DenominationCount,
}
