//! Form validation for closing submissions
//!
//! Runs before the calculator and collects every rejected field instead of
//! stopping at the first one:
//! - Money fields: non-negative, at most two decimal places, at most
//!   [`MAX_AMOUNT`]
//! - Products: named, unique, price and counts within bounds
//! - Denominations: positive face value, unique, count within bounds
//!
//! The upper bounds keep every sum and product the calculator forms far
//! inside `i64` and `Decimal` range.

use crate::{
    error::ValidationErrors,
    fields::ClosingFields,
    types::{DenominationCount, Money, ProductCount},
};
use rust_decimal::Decimal;
use std::collections::HashSet;

/// Maximum number of decimal places for money amounts
pub const MONEY_SCALE: u32 = 2;

/// Largest accepted money amount (one trillion)
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(3_567_587_328, 232, 0, false, 0);

/// Largest accepted unit count (one billion)
pub const MAX_COUNT: i64 = 1_000_000_000;

/// Validate a closing submission; returns every rejected field
pub fn validate_closing(
    fields: &ClosingFields,
    products: &[ProductCount],
    denominations: &[DenominationCount],
) -> ValidationErrors {
    let mut errors = ValidationErrors::new();

    for (field, value) in fields.entries() {
        check_money(&mut errors, &field.label(), value);
    }

    let mut seen_products = HashSet::new();
    for (i, product) in products.iter().enumerate() {
        let prefix = format!("products[{}]", i);
        let name = product.product.trim();

        if name.is_empty() {
            errors.push(format!("{}.product", prefix), "must not be empty");
        } else if !seen_products.insert(name.to_lowercase()) {
            errors.push(format!("{}.product", prefix), format!("duplicate product {:?}", name));
        }

        check_money(&mut errors, &format!("{}.unit_price", prefix), product.unit_price);

        for (label, count) in [
            ("initial", product.initial),
            ("received", product.received),
            ("returned", product.returned),
            ("final_count", product.final_count),
        ] {
            check_count(&mut errors, &format!("{}.{}", prefix, label), count);
        }
    }

    let mut seen_faces = HashSet::new();
    for (i, denomination) in denominations.iter().enumerate() {
        let prefix = format!("denominations[{}]", i);

        if denomination.face_value <= Decimal::ZERO {
            errors.push(format!("{}.face_value", prefix), "must be positive");
        } else if denomination.face_value > MAX_AMOUNT {
            errors.push(
                format!("{}.face_value", prefix),
                format!("must not exceed {}", MAX_AMOUNT),
            );
        } else if denomination.face_value.normalize().scale() > MONEY_SCALE {
            errors.push(
                format!("{}.face_value", prefix),
                format!("at most {} decimal places", MONEY_SCALE),
            );
        } else if !seen_faces.insert(denomination.face_value.normalize()) {
            errors.push(
                format!("{}.face_value", prefix),
                format!("duplicate denomination {}", denomination.face_value),
            );
        }

        check_count(&mut errors, &format!("{}.count", prefix), denomination.count);
    }

    errors
}

fn check_money(errors: &mut ValidationErrors, field: &str, value: Money) {
    if value < Decimal::ZERO {
        errors.push(field, "must not be negative");
    } else if value > MAX_AMOUNT {
        errors.push(field, format!("must not exceed {}", MAX_AMOUNT));
    } else if value.normalize().scale() > MONEY_SCALE {
        errors.push(field, format!("at most {} decimal places", MONEY_SCALE));
    }
}

fn check_count(errors: &mut ValidationErrors, field: &str, count: i64) {
    if count < 0 {
        errors.push(field, "must not be negative");
    } else if count > MAX_COUNT {
        errors.push(field, format!("must not exceed {}", MAX_COUNT));
    }
}
