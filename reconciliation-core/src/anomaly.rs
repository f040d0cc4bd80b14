//! Anomaly detection for reconciled closings
//!
//! Classifies a [`Reconciliation`] into warnings that must be shown to the
//! operator and the reviewing admin. Warnings never alter the numbers.
//!
//! # Levels
//!
//! - **Shortage**: difference below −`shortage_tolerance`; critical from
//!   `critical_difference` on, significant otherwise
//! - **Surplus**: difference above `surplus_tolerance`; significant from
//!   `critical_difference` on, minor otherwise
//! - **Negative net consumed**: more units returned/left than available
//! - **Negative vault count**: a denomination counted below zero

use crate::{calculator::Reconciliation, types::Money};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Thresholds for difference anomalies
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    /// Shortages up to this amount are tolerated
    pub shortage_tolerance: Money,

    /// Surpluses up to this amount are tolerated
    pub surplus_tolerance: Money,

    /// Absolute difference from which a shortage is critical and a
    /// surplus significant
    pub critical_difference: Money,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            shortage_tolerance: Decimal::ZERO,
            surplus_tolerance: Decimal::new(5000, 2),  // 50.00
            critical_difference: Decimal::new(10000, 2), // 100.00
        }
    }
}

/// Warning severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Worth a look
    Minor,
    /// Needs an explanation from the operator
    Significant,
    /// Needs admin review before the day is accepted
    Critical,
}

/// Anomaly category, used as a metrics label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    /// Counted cash below expectation
    Shortage,
    /// Counted cash above expectation
    Surplus,
    /// Product stock grew without being received
    NegativeNetConsumed,
    /// Vault denomination counted below zero
    NegativeVaultCount,
}

impl AnomalyKind {
    /// Label value
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyKind::Shortage => "shortage",
            AnomalyKind::Surplus => "surplus",
            AnomalyKind::NegativeNetConsumed => "negative_net_consumed",
            AnomalyKind::NegativeVaultCount => "negative_vault_count",
        }
    }
}

/// A reconciliation anomaly
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnomalyWarning {
    /// Counted cash below expectation
    Shortage {
        /// Signed difference (negative)
        difference: Money,
        /// Severity
        severity: Severity,
    },
    /// Counted cash above expectation
    Surplus {
        /// Signed difference (positive)
        difference: Money,
        /// Severity
        severity: Severity,
    },
    /// Product with negative net consumption
    NegativeNetConsumed {
        /// Product name
        product: String,
        /// Computed net consumed units
        net_consumed: i64,
    },
    /// Denomination with negative count
    NegativeVaultCount {
        /// Face value
        face_value: Money,
        /// Counted quantity
        count: i64,
    },
}

impl AnomalyWarning {
    /// Category
    pub fn kind(&self) -> AnomalyKind {
        match self {
            AnomalyWarning::Shortage { .. } => AnomalyKind::Shortage,
            AnomalyWarning::Surplus { .. } => AnomalyKind::Surplus,
            AnomalyWarning::NegativeNetConsumed { .. } => AnomalyKind::NegativeNetConsumed,
            AnomalyWarning::NegativeVaultCount { .. } => AnomalyKind::NegativeVaultCount,
        }
    }

    /// Severity
    pub fn severity(&self) -> Severity {
        match self {
            AnomalyWarning::Shortage { severity, .. } | AnomalyWarning::Surplus { severity, .. } => {
                *severity
            }
            AnomalyWarning::NegativeNetConsumed { .. } => Severity::Significant,
            AnomalyWarning::NegativeVaultCount { .. } => Severity::Significant,
        }
    }
}

impl fmt::Display for AnomalyWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnomalyWarning::Shortage { difference, .. } => {
                write!(f, "cash shortage of {}", -*difference)
            }
            AnomalyWarning::Surplus { difference, .. } => {
                write!(f, "cash surplus of {}", difference)
            }
            AnomalyWarning::NegativeNetConsumed {
                product,
                net_consumed,
            } => write!(f, "{} has negative net consumption ({})", product, net_consumed),
            AnomalyWarning::NegativeVaultCount { face_value, count } => {
                write!(f, "denomination {} counted as {}", face_value, count)
            }
        }
    }
}

/// Detect anomalies in a reconciliation
pub fn detect(rec: &Reconciliation, config: &AnomalyConfig) -> Vec<AnomalyWarning> {
    let mut warnings = Vec::new();
    let difference = rec.totals.difference;

    if difference < -config.shortage_tolerance {
        let severity = if -difference >= config.critical_difference {
            Severity::Critical
        } else {
            Severity::Significant
        };
        warnings.push(AnomalyWarning::Shortage {
            difference,
            severity,
        });
    } else if difference > config.surplus_tolerance {
        let severity = if difference >= config.critical_difference {
            Severity::Significant
        } else {
            Severity::Minor
        };
        warnings.push(AnomalyWarning::Surplus {
            difference,
            severity,
        });
    }

    for line in rec.products.anomalous_lines() {
        warnings.push(AnomalyWarning::NegativeNetConsumed {
            product: line.product.clone(),
            net_consumed: line.net_consumed,
        });
    }

    warnings
}

/// Detect anomalies including per-denomination checks
pub fn detect_with_denominations(
    rec: &Reconciliation,
    denominations: &[crate::types::DenominationCount],
    config: &AnomalyConfig,
) -> Vec<AnomalyWarning> {
    let mut warnings = detect(rec, config);
    warnings.extend(
        denominations
            .iter()
            .filter(|d| d.count < 0)
            .map(|d| AnomalyWarning::NegativeVaultCount {
                face_value: d.face_value,
                count: d.count,
            }),
    );
    warnings
}
