//! End-to-end tests of the cash office facade
//!
//! Every test runs against the in-memory store and a local identity
//! provider with cheap password hashing.

use cash_office::{
    evaluate_closing, AuthError, CashOffice, ClosingDraft, ClosingFilter, Config, Error,
    IdentityConfig, LocalIdentityProvider, MemoryStore, ProfileFilter, RegistrationRequest,
    SessionToken,
};
use chrono::NaiveDate;
use reconciliation_core::{
    AnomalyConfig, AnomalyKind, ClosingField, ClosingFields, ClosingStatus, DenominationCount,
    ProductCount, Role, Severity, Slot, SlotGroup,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

const PASSWORD: &str = "segredo123";

struct Harness {
    office: CashOffice,
    identity: Arc<LocalIdentityProvider>,
}

fn harness(require_email_confirmation: bool) -> Harness {
    let config = Config {
        identity: IdentityConfig {
            require_email_confirmation,
            hash_memory_kib: 1024,
            hash_iterations: 1,
            ..IdentityConfig::default()
        },
        ..Config::default()
    };
    let identity = Arc::new(LocalIdentityProvider::new(config.identity.clone()).unwrap());
    let office =
        CashOffice::with_gateways(config, Arc::new(MemoryStore::new()), identity.clone()).unwrap();
    Harness { office, identity }
}

fn request(code: &str) -> RegistrationRequest {
    RegistrationRequest {
        name: format!("Operator {}", code),
        tax_id: "123.456.789-09".to_string(),
        email: format!("{}@loja.com", code.to_lowercase()),
        phone: "(11) 98765-4321".to_string(),
        operator_code: code.to_string(),
        password: PASSWORD.to_string(),
    }
}

/// Register and sign in; returns the session token
async fn enrol(office: &CashOffice, code: &str) -> SessionToken {
    office.register(request(code)).await.unwrap();
    office
        .sign_in(&format!("{}@loja.com", code.to_lowercase()), PASSWORD)
        .await
        .unwrap()
        .session
        .token
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 7, d).unwrap()
}

fn product(name: &str, final_count: i64) -> ProductCount {
    ProductCount {
        product: name.to_string(),
        unit_price: dec!(2.50),
        initial: 10,
        received: 5,
        returned: 2,
        final_count,
    }
}

fn draft(date: NaiveDate) -> ClosingDraft {
    let mut fields = ClosingFields {
        initial_coin: dec!(50.00),
        commission: dec!(120.00),
        product_sales: dec!(300.00),
        prizes_paid: dec!(80.00),
        cash_drawer_1: dec!(240.00),
        cash_drawer_2: dec!(50.00),
        final_coin: dec!(50.00),
        ..ClosingFields::default()
    };
    fields.set(
        ClosingField::Slot(Slot::new(SlotGroup::VaultWithdrawal, 1).unwrap()),
        dec!(50.00),
    );

    ClosingDraft {
        closing_id: None,
        date,
        fields,
        notes: "fechamento normal".to_string(),
        products: vec![product("Raspadinha", 3)],
        denominations: vec![
            DenominationCount {
                face_value: dec!(200),
                count: 1,
            },
            DenominationCount {
                face_value: dec!(50),
                count: 2,
            },
            DenominationCount {
                face_value: dec!(10),
                count: 3,
            },
        ],
    }
}

#[tokio::test]
async fn test_first_profile_is_admin() {
    let h = harness(false);
    let admin = h.office.register(request("ADM-1")).await.unwrap();
    let operator = h.office.register(request("OP-1")).await.unwrap();

    assert_eq!(admin.profile.role, Role::Admin);
    assert_eq!(operator.profile.role, Role::Operator);
    assert_eq!(operator.profile.tax_id, "12345678909");
    assert_eq!(operator.profile.operator_code.as_str(), "OP-1");
    assert!(operator.session.is_some());
}

#[tokio::test]
async fn test_registration_validation() {
    let h = harness(false);
    let mut bad = request("OP 1");
    bad.email = "not-an-email".to_string();
    bad.tax_id = "123".to_string();
    bad.name = "  ".to_string();

    match h.office.register(bad).await {
        Err(Error::Validation(errors)) => {
            assert!(errors.contains("name"));
            assert!(errors.contains("tax_id"));
            assert!(errors.contains("email"));
            assert!(errors.contains("operator_code"));
            assert!(!errors.contains("phone"));
        }
        other => panic!("expected validation error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_duplicate_operator_code_conflicts() {
    let h = harness(false);
    h.office.register(request("OP-1")).await.unwrap();

    let mut same_code = request("op-1");
    same_code.email = "outra@loja.com".to_string();
    assert!(matches!(
        h.office.register(same_code).await,
        Err(Error::Conflict(_))
    ));

    let mut same_email = request("OP-2");
    same_email.email = "OP-1@LOJA.COM".to_string();
    assert!(matches!(
        h.office.register(same_email).await,
        Err(Error::Conflict(_))
    ));
}

#[tokio::test]
async fn test_unconfirmed_email_cannot_sign_in() {
    let h = harness(true);
    let registration = h.office.register(request("OP-1")).await.unwrap();
    assert!(registration.session.is_none());

    let err = h.office.sign_in("op-1@loja.com", PASSWORD).await.unwrap_err();
    assert!(matches!(err, Error::Auth(AuthError::EmailNotConfirmed)));
    assert_eq!(h.office.metrics().sign_in_failures.get(), 1);

    h.office.confirm_email("op-1@loja.com").await.unwrap();
    let signed_in = h.office.sign_in("op-1@loja.com", PASSWORD).await.unwrap();
    assert_eq!(signed_in.profile.id, registration.profile.id);
}

#[tokio::test]
async fn test_save_round_trip() {
    let h = harness(false);
    let token = enrol(&h.office, "OP-1").await;

    let saved = h.office.save_closing(&token, draft(day(1))).await.unwrap();
    // expected = 50 + 420 − 80 − 50 = 340; counted = 290 + 50 = 340
    assert_eq!(saved.reconciliation.totals.difference, dec!(0.00));
    assert_eq!(saved.closing.difference, dec!(0.00));
    assert_eq!(saved.reconciliation.products.total_sold_value, dec!(25.00));
    assert_eq!(saved.reconciliation.vault.vault_total, dec!(330));
    assert!(saved.anomalies.is_empty());

    let read = h.office.closing_detail(&token, saved.closing.id).await.unwrap();
    assert_eq!(read, saved);
    assert_eq!(read.closing.fields, draft(day(1)).fields);
    assert_eq!(read.closing.notes, "fechamento normal");
    assert_eq!(h.office.metrics().closings_saved.get(), 1);
}

#[tokio::test]
async fn test_second_save_fully_replaces_first() {
    let h = harness(false);
    let token = enrol(&h.office, "OP-1").await;

    let first = h.office.save_closing(&token, draft(day(2))).await.unwrap();

    let mut second = draft(day(2));
    second.fields.commission = dec!(100.00);
    second.notes = "corrigido".to_string();
    second.products = vec![product("Mega", 0), product("Quina", 1)];
    second.denominations = vec![];
    let second = h.office.save_closing(&token, second).await.unwrap();

    assert_eq!(second.closing.id, first.closing.id);
    assert_eq!(second.closing.created_at, first.closing.created_at);

    let read = h.office.closing_detail(&token, first.closing.id).await.unwrap();
    assert_eq!(read.closing.fields.commission, dec!(100.00));
    assert_eq!(read.closing.notes, "corrigido");
    let names: Vec<&str> = read.products.iter().map(|m| m.line.product.as_str()).collect();
    assert_eq!(names, vec!["Mega", "Quina"]);
    assert!(read.denominations.is_empty());

    let listed = h.office.list_closings(&token, ClosingFilter::default()).await.unwrap();
    assert_eq!(listed.len(), 1);
}

#[tokio::test]
async fn test_shortage_and_negative_stock_surface_as_anomalies() {
    let h = harness(false);
    let token = enrol(&h.office, "OP-1").await;

    let mut short = draft(day(3));
    short.fields.cash_drawer_1 = dec!(90.00);
    short.products.push(ProductCount {
        product: "Lotofacil".to_string(),
        unit_price: dec!(3.00),
        initial: 0,
        received: 0,
        returned: 0,
        final_count: 2,
    });

    let saved = h.office.save_closing(&token, short).await.unwrap();
    assert_eq!(saved.closing.difference, dec!(-150.00));

    let kinds: Vec<AnomalyKind> = saved.anomalies.iter().map(|w| w.kind()).collect();
    assert_eq!(
        kinds,
        vec![AnomalyKind::Shortage, AnomalyKind::NegativeNetConsumed]
    );
    assert_eq!(saved.anomalies[0].severity(), Severity::Critical);
    assert_eq!(saved.reconciliation.products.lines[1].net_consumed, -2);
    assert_eq!(
        h.office
            .metrics()
            .anomalies
            .with_label_values(&["shortage"])
            .get(),
        1
    );
}

#[tokio::test]
async fn test_invalid_draft_is_not_stored() {
    let h = harness(false);
    let token = enrol(&h.office, "OP-1").await;

    let mut bad = draft(day(4));
    bad.denominations[0].face_value = dec!(0);
    assert!(matches!(
        h.office.save_closing(&token, bad).await,
        Err(Error::Validation(_))
    ));
    assert!(h
        .office
        .list_closings(&token, ClosingFilter::default())
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_out_of_range_draft_is_rejected_not_reconciled() {
    let h = harness(false);
    let token = enrol(&h.office, "OP-1").await;

    let mut huge_count = draft(day(5));
    huge_count.products[0].initial = i64::MAX;
    huge_count.products[0].received = 1;
    let mut huge_amount = draft(day(5));
    huge_amount.fields.commission = Decimal::MAX;
    huge_amount.fields.product_sales = Decimal::MAX;

    for bad in [huge_count, huge_amount] {
        assert!(matches!(
            evaluate_closing(&bad, &AnomalyConfig::default()),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            h.office.save_closing(&token, bad).await,
            Err(Error::Validation(_))
        ));
    }
    assert!(h
        .office
        .list_closings(&token, ClosingFilter::default())
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_operator_isolation() {
    let h = harness(false);
    let _admin = enrol(&h.office, "ADM-1").await;
    let ana = enrol(&h.office, "OP-1").await;
    let bia = enrol(&h.office, "OP-2").await;

    let anas = h.office.save_closing(&ana, draft(day(5))).await.unwrap();
    h.office.save_closing(&bia, draft(day(5))).await.unwrap();

    assert!(matches!(
        h.office.closing_detail(&bia, anas.closing.id).await,
        Err(Error::Forbidden(_))
    ));

    let mut hijack = draft(day(5));
    hijack.closing_id = Some(anas.closing.id);
    assert!(matches!(
        h.office.save_closing(&bia, hijack).await,
        Err(Error::Forbidden(_))
    ));
    assert!(matches!(
        h.office.close_closing(&bia, anas.closing.id).await,
        Err(Error::Forbidden(_))
    ));

    let bias = h.office.list_closings(&bia, ClosingFilter::default()).await.unwrap();
    assert_eq!(bias.len(), 1);
    assert_ne!(bias[0].id, anas.closing.id);

    let snooping = ClosingFilter {
        user_id: Some(anas.closing.user_id),
        ..ClosingFilter::default()
    };
    assert!(matches!(
        h.office.list_closings(&bia, snooping).await,
        Err(Error::Forbidden(_))
    ));
}

#[tokio::test]
async fn test_closed_closing_rejects_saves() {
    let h = harness(false);
    let token = enrol(&h.office, "OP-1").await;

    let saved = h.office.save_closing(&token, draft(day(6))).await.unwrap();
    let closed = h.office.close_closing(&token, saved.closing.id).await.unwrap();
    assert_eq!(closed.closing.status, ClosingStatus::Closed);

    // Same day without an id
    assert!(matches!(
        h.office.save_closing(&token, draft(day(6))).await,
        Err(Error::ClosingLocked(id)) if id == saved.closing.id
    ));

    // Same day with the id
    let mut edit = draft(day(6));
    edit.closing_id = Some(saved.closing.id);
    assert!(matches!(
        h.office.save_closing(&token, edit).await,
        Err(Error::ClosingLocked(_))
    ));

    assert!(matches!(
        h.office.discard_closing(&token, saved.closing.id).await,
        Err(Error::ClosingLocked(_))
    ));

    let read = h.office.closing_detail(&token, saved.closing.id).await.unwrap();
    assert_eq!(read.closing.fields, saved.closing.fields);
}

#[tokio::test]
async fn test_closing_id_must_match_date() {
    let h = harness(false);
    let token = enrol(&h.office, "OP-1").await;
    let saved = h.office.save_closing(&token, draft(day(7))).await.unwrap();

    let mut moved = draft(day(8));
    moved.closing_id = Some(saved.closing.id);
    assert!(matches!(
        h.office.save_closing(&token, moved).await,
        Err(Error::Conflict(_))
    ));
}

#[tokio::test]
async fn test_open_day_and_discard() {
    let h = harness(false);
    let token = enrol(&h.office, "OP-1").await;

    let opened = h.office.open_day(&token, day(9)).await.unwrap();
    assert_eq!(opened.closing.status, ClosingStatus::Open);
    assert_eq!(opened.closing.difference, dec!(0));

    let again = h.office.open_day(&token, day(9)).await.unwrap();
    assert_eq!(again.closing.id, opened.closing.id);

    h.office.discard_closing(&token, opened.closing.id).await.unwrap();
    assert!(matches!(
        h.office.closing_detail(&token, opened.closing.id).await,
        Err(Error::NotFound(_))
    ));
}

#[tokio::test]
async fn test_admin_operations() {
    let h = harness(false);
    let admin = enrol(&h.office, "ADM-1").await;
    let operator = enrol(&h.office, "OP-1").await;

    // Operators are not admins
    assert!(matches!(
        h.office.list_profiles(&operator, &ProfileFilter::default()).await,
        Err(Error::Forbidden(_))
    ));

    let profiles = h.office.list_profiles(&admin, &ProfileFilter::default()).await.unwrap();
    assert_eq!(profiles.len(), 2);
    let admin_id = profiles[0].id;
    let operator_id = profiles[1].id;

    assert!(matches!(
        h.office.delete_profile(&admin, admin_id).await,
        Err(Error::Forbidden(_))
    ));

    // Deactivation takes effect on live sessions and on new sign-ins
    h.office.set_active(&admin, operator_id, false).await.unwrap();
    assert!(matches!(
        h.office.open_day(&operator, day(10)).await,
        Err(Error::Forbidden(_))
    ));
    let sessions = h.identity.session_count();
    assert!(matches!(
        h.office.sign_in("op-1@loja.com", PASSWORD).await,
        Err(Error::Forbidden(_))
    ));
    // The session opened for the refused sign-in is revoked
    assert_eq!(h.identity.session_count(), sessions);

    h.office.set_active(&admin, operator_id, true).await.unwrap();
    let promoted = h.office.set_role(&admin, operator_id, Role::Admin).await.unwrap();
    assert_eq!(promoted.role, Role::Admin);

    h.office.delete_profile(&admin, operator_id).await.unwrap();
    assert!(matches!(
        h.office.delete_profile(&admin, operator_id).await,
        Err(Error::NotFound(_))
    ));
}

#[tokio::test]
async fn test_period_report() {
    let h = harness(false);
    let admin = enrol(&h.office, "ADM-1").await;
    let ana = enrol(&h.office, "OP-1").await;

    h.office.save_closing(&ana, draft(day(11))).await.unwrap();
    let mut short = draft(day(12));
    short.fields.cash_drawer_2 = dec!(20.00);
    h.office.save_closing(&ana, short).await.unwrap();
    h.office.save_closing(&ana, draft(day(20))).await.unwrap();

    let report = h.office.period_report(&admin, day(11), day(12)).await.unwrap();
    assert_eq!(report.rows.len(), 1);
    assert_eq!(report.rows[0].closings, 2);
    assert_eq!(report.rows[0].shortages, 1);
    assert_eq!(report.rows[0].difference, dec!(-30.00));
    assert_eq!(report.totals.commission, dec!(240.00));
    assert_eq!(report.totals.withdrawals, dec!(100.00));

    assert!(matches!(
        h.office.period_report(&admin, day(12), day(11)).await,
        Err(Error::Validation(_))
    ));
    assert!(matches!(
        h.office.period_report(&ana, day(11), day(12)).await,
        Err(Error::Forbidden(_))
    ));
}

#[tokio::test]
async fn test_sign_out_invalidates_token() {
    let h = harness(false);
    let token = enrol(&h.office, "OP-1").await;

    h.office.sign_out(&token).await.unwrap();
    assert!(matches!(
        h.office.open_day(&token, day(13)).await,
        Err(Error::Auth(AuthError::InvalidSession))
    ));
    assert_eq!(h.identity.session_count(), 1);
}

#[tokio::test]
async fn test_deleted_profile_email_can_register_again() {
    let h = harness(false);
    let admin = enrol(&h.office, "ADM-1").await;
    let operator = enrol(&h.office, "OP-1").await;
    let old = h.office.principal(&operator).await.unwrap();
    h.office.save_closing(&operator, draft(day(14))).await.unwrap();

    h.office.delete_profile(&admin, old.id).await.unwrap();
    assert!(matches!(
        h.office.open_day(&operator, day(15)).await,
        Err(Error::Auth(AuthError::InvalidSession))
    ));

    let again = h.office.register(request("OP-1")).await.unwrap();
    assert_ne!(again.profile.id, old.id);
    assert_eq!(again.profile.role, Role::Operator);
    h.office.sign_in("op-1@loja.com", PASSWORD).await.unwrap();

    // The old closing stays for audit under the old id
    let closings = h
        .office
        .list_closings(&admin, ClosingFilter::default())
        .await
        .unwrap();
    assert_eq!(closings.len(), 1);
    assert_eq!(closings[0].user_id, old.id);
}

#[tokio::test]
async fn test_concurrent_first_registrations_elect_one_admin() {
    let h = harness(false);
    let office = Arc::new(h.office);

    let mut tasks = Vec::new();
    for i in 0..8 {
        let office = office.clone();
        tasks.push(tokio::spawn(async move {
            office.register(request(&format!("OP-{}", i))).await.unwrap()
        }));
    }
    let mut admins = 0;
    for task in tasks {
        if task.await.unwrap().profile.role == Role::Admin {
            admins += 1;
        }
    }
    assert_eq!(admins, 1);
}

#[tokio::test]
async fn test_concurrent_duplicate_registration_leaves_no_orphan_identity() {
    let h = harness(false);
    let office = Arc::new(h.office);

    let mut tasks = Vec::new();
    for _ in 0..6 {
        let office = office.clone();
        tasks.push(tokio::spawn(async move { office.register(request("OP-1")).await }));
    }
    let mut created = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => created += 1,
            Err(Error::Conflict(_)) | Err(Error::Auth(AuthError::EmailAlreadyRegistered)) => {}
            Err(e) => panic!("unexpected error: {}", e),
        }
    }
    assert_eq!(created, 1);

    // Exactly one identity: the registered e-mail signs in
    office.sign_in("op-1@loja.com", PASSWORD).await.unwrap();
}
