//! Persistence gateway
//!
//! Record store behind an async trait so the facade never knows which
//! backend it talks to.
//!
//! # Tables
//!
//! - `users` - User profiles (key: id; unique: operator_code, email)
//! - `closings` - Cash closings (key: id; unique: user_id || date)
//! - `product_movements` - Product rows, replaced wholesale per closing
//! - `supply_denominations` - Vault rows, replaced wholesale per closing
//!
//! Deleting a closing deletes its rows. Deleting a profile keeps its closings.

use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::RwLock;
use reconciliation_core::{
    CashClosing, ClosingStatus, DenominationCount, OperatorCode, ProductCount, ProductMovement,
    Role, SupplyDenomination, UserProfile,
};
use std::collections::HashMap;
use uuid::Uuid;

/// Conjunctive profile filter; `None` matches anything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileFilter {
    /// Profile ID
    pub id: Option<Uuid>,
    /// Operator code
    pub operator_code: Option<OperatorCode>,
    /// E-mail (case-insensitive)
    pub email: Option<String>,
    /// Role
    pub role: Option<Role>,
    /// Active flag
    pub active: Option<bool>,
}

impl ProfileFilter {
    /// Match a single profile by ID
    pub fn by_id(id: Uuid) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }

    /// Match by e-mail
    pub fn by_email(email: impl Into<String>) -> Self {
        Self {
            email: Some(email.into()),
            ..Self::default()
        }
    }

    /// Check a profile against the filter
    pub fn matches(&self, profile: &UserProfile) -> bool {
        self.id.map_or(true, |id| profile.id == id)
            && self
                .operator_code
                .as_ref()
                .map_or(true, |code| &profile.operator_code == code)
            && self
                .email
                .as_ref()
                .map_or(true, |email| profile.email.eq_ignore_ascii_case(email))
            && self.role.map_or(true, |role| profile.role == role)
            && self.active.map_or(true, |active| profile.active == active)
    }
}

/// Conjunctive closing filter; `None` matches anything, dates inclusive
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClosingFilter {
    /// Closing ID
    pub id: Option<Uuid>,
    /// Owning operator
    pub user_id: Option<Uuid>,
    /// First date
    pub date_from: Option<NaiveDate>,
    /// Last date
    pub date_to: Option<NaiveDate>,
    /// Status
    pub status: Option<ClosingStatus>,
}

impl ClosingFilter {
    /// Match a single closing by ID
    pub fn by_id(id: Uuid) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }

    /// Match the closing of one operator on one date
    pub fn for_day(user_id: Uuid, date: NaiveDate) -> Self {
        Self {
            user_id: Some(user_id),
            date_from: Some(date),
            date_to: Some(date),
            ..Self::default()
        }
    }

    /// Match every closing in a date range
    pub fn between(date_from: NaiveDate, date_to: NaiveDate) -> Self {
        Self {
            date_from: Some(date_from),
            date_to: Some(date_to),
            ..Self::default()
        }
    }

    /// Check a closing against the filter
    pub fn matches(&self, closing: &CashClosing) -> bool {
        self.id.map_or(true, |id| closing.id == id)
            && self.user_id.map_or(true, |user| closing.user_id == user)
            && self.date_from.map_or(true, |from| closing.date >= from)
            && self.date_to.map_or(true, |to| closing.date <= to)
            && self.status.map_or(true, |status| closing.status == status)
    }
}

/// Record store used by the facade and the closing writer
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Insert or replace a profile by ID.
    /// Another profile holding the same operator code or e-mail → `Conflict`.
    async fn upsert_profile(&self, profile: UserProfile) -> Result<UserProfile>;

    /// Profiles matching the filter, ordered by operator code
    async fn select_profiles(&self, filter: &ProfileFilter) -> Result<Vec<UserProfile>>;

    /// Delete matching profiles; returns how many were removed
    async fn delete_profiles(&self, filter: &ProfileFilter) -> Result<usize>;

    /// Insert or replace a closing by (user_id, date). A colliding row is
    /// replaced wholesale but keeps its stored `id` and `created_at`.
    async fn upsert_closing(&self, closing: CashClosing) -> Result<CashClosing>;

    /// Closings matching the filter, ordered by date then user
    async fn select_closings(&self, filter: &ClosingFilter) -> Result<Vec<CashClosing>>;

    /// Delete matching closings and their rows; returns how many were removed
    async fn delete_closings(&self, filter: &ClosingFilter) -> Result<usize>;

    /// Replace every product row of a closing
    async fn replace_movements(
        &self,
        closing_id: Uuid,
        lines: Vec<ProductCount>,
    ) -> Result<Vec<ProductMovement>>;

    /// Product rows of a closing, in entry order
    async fn select_movements(&self, closing_id: Uuid) -> Result<Vec<ProductMovement>>;

    /// Replace every vault row of a closing
    async fn replace_denominations(
        &self,
        closing_id: Uuid,
        lines: Vec<DenominationCount>,
    ) -> Result<Vec<SupplyDenomination>>;

    /// Vault rows of a closing, in entry order
    async fn select_denominations(&self, closing_id: Uuid) -> Result<Vec<SupplyDenomination>>;
}

/// Check profile uniqueness against every other stored profile
pub(crate) fn check_profile_unique<'a>(
    incoming: &UserProfile,
    existing: impl IntoIterator<Item = &'a UserProfile>,
) -> Result<()> {
    for other in existing.into_iter().filter(|p| p.id != incoming.id) {
        if other.operator_code == incoming.operator_code {
            return Err(Error::Conflict(format!(
                "operator code {} already in use",
                incoming.operator_code
            )));
        }
        if other.email.eq_ignore_ascii_case(&incoming.email) {
            return Err(Error::Conflict(format!(
                "e-mail {} already in use",
                incoming.email
            )));
        }
    }
    Ok(())
}

/// Merge an incoming profile with the stored one (keeps `created_at`)
pub(crate) fn merge_profile(stored: Option<&UserProfile>, mut incoming: UserProfile) -> UserProfile {
    if let Some(stored) = stored {
        incoming.created_at = stored.created_at;
    }
    incoming
}

/// Merge an incoming closing with the row holding its (user, date) key
pub(crate) fn merge_closing(stored: Option<&CashClosing>, mut incoming: CashClosing) -> CashClosing {
    if let Some(stored) = stored {
        incoming.id = stored.id;
        incoming.created_at = stored.created_at;
    }
    incoming
}

pub(crate) fn sort_profiles(profiles: &mut [UserProfile]) {
    profiles.sort_by(|a, b| a.operator_code.cmp(&b.operator_code));
}

pub(crate) fn sort_closings(closings: &mut [CashClosing]) {
    closings.sort_by(|a, b| (a.date, a.user_id).cmp(&(b.date, b.user_id)));
}

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<Uuid, UserProfile>,
    closings: HashMap<Uuid, CashClosing>,
    closing_keys: HashMap<(Uuid, NaiveDate), Uuid>,
    movements: HashMap<Uuid, Vec<ProductMovement>>,
    denominations: HashMap<Uuid, Vec<SupplyDenomination>>,
}

/// In-process record store
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PersistenceGateway for MemoryStore {
    async fn upsert_profile(&self, profile: UserProfile) -> Result<UserProfile> {
        let mut tables = self.tables.write();
        check_profile_unique(&profile, tables.users.values())?;

        let profile = merge_profile(tables.users.get(&profile.id), profile);
        tables.users.insert(profile.id, profile.clone());

        tracing::debug!(user_id = %profile.id, operator_code = %profile.operator_code, "Profile stored");
        Ok(profile)
    }

    async fn select_profiles(&self, filter: &ProfileFilter) -> Result<Vec<UserProfile>> {
        let tables = self.tables.read();
        let mut profiles: Vec<UserProfile> = tables
            .users
            .values()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();
        sort_profiles(&mut profiles);
        Ok(profiles)
    }

    async fn delete_profiles(&self, filter: &ProfileFilter) -> Result<usize> {
        let mut tables = self.tables.write();
        let before = tables.users.len();
        tables.users.retain(|_, p| !filter.matches(p));
        Ok(before - tables.users.len())
    }

    async fn upsert_closing(&self, closing: CashClosing) -> Result<CashClosing> {
        let mut tables = self.tables.write();
        let key = (closing.user_id, closing.date);

        if let Some(previous) = tables.closings.get(&closing.id) {
            if (previous.user_id, previous.date) != key {
                return Err(Error::Conflict(format!(
                    "closing {} belongs to {} on {}",
                    closing.id, previous.user_id, previous.date
                )));
            }
        }

        let stored = tables
            .closing_keys
            .get(&key)
            .and_then(|id| tables.closings.get(id));
        let closing = merge_closing(stored, closing);

        tables.closing_keys.insert(key, closing.id);
        tables.closings.insert(closing.id, closing.clone());

        tracing::debug!(
            closing_id = %closing.id,
            user_id = %closing.user_id,
            date = %closing.date,
            "Closing stored"
        );
        Ok(closing)
    }

    async fn select_closings(&self, filter: &ClosingFilter) -> Result<Vec<CashClosing>> {
        let tables = self.tables.read();
        let mut closings: Vec<CashClosing> = tables
            .closings
            .values()
            .filter(|c| filter.matches(c))
            .cloned()
            .collect();
        sort_closings(&mut closings);
        Ok(closings)
    }

    async fn delete_closings(&self, filter: &ClosingFilter) -> Result<usize> {
        let mut tables = self.tables.write();
        let doomed: Vec<(Uuid, (Uuid, NaiveDate))> = tables
            .closings
            .values()
            .filter(|c| filter.matches(c))
            .map(|c| (c.id, (c.user_id, c.date)))
            .collect();

        for (id, key) in &doomed {
            tables.closings.remove(id);
            tables.closing_keys.remove(key);
            tables.movements.remove(id);
            tables.denominations.remove(id);
        }

        Ok(doomed.len())
    }

    async fn replace_movements(
        &self,
        closing_id: Uuid,
        lines: Vec<ProductCount>,
    ) -> Result<Vec<ProductMovement>> {
        let mut tables = self.tables.write();
        if !tables.closings.contains_key(&closing_id) {
            return Err(Error::NotFound(format!("closing {}", closing_id)));
        }

        let rows: Vec<ProductMovement> = lines
            .into_iter()
            .map(|line| ProductMovement { closing_id, line })
            .collect();
        tables.movements.insert(closing_id, rows.clone());
        Ok(rows)
    }

    async fn select_movements(&self, closing_id: Uuid) -> Result<Vec<ProductMovement>> {
        let tables = self.tables.read();
        Ok(tables.movements.get(&closing_id).cloned().unwrap_or_default())
    }

    async fn replace_denominations(
        &self,
        closing_id: Uuid,
        lines: Vec<DenominationCount>,
    ) -> Result<Vec<SupplyDenomination>> {
        let mut tables = self.tables.write();
        if !tables.closings.contains_key(&closing_id) {
            return Err(Error::NotFound(format!("closing {}", closing_id)));
        }

        let rows: Vec<SupplyDenomination> = lines
            .into_iter()
            .map(|line| SupplyDenomination { closing_id, line })
            .collect();
        tables.denominations.insert(closing_id, rows.clone());
        Ok(rows)
    }

    async fn select_denominations(&self, closing_id: Uuid) -> Result<Vec<SupplyDenomination>> {
        let tables = self.tables.read();
        Ok(tables
            .denominations
            .get(&closing_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    pub(crate) fn profile(code: &str, email: &str) -> UserProfile {
        let now = Utc::now();
        UserProfile {
            id: Uuid::now_v7(),
            name: format!("Operator {}", code),
            tax_id: "12345678909".to_string(),
            email: email.to_string(),
            phone: "11987654321".to_string(),
            operator_code: OperatorCode::new(code).unwrap(),
            role: Role::Operator,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub(crate) fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
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

    #[tokio::test]
    async fn test_profile_uniqueness() {
        let store = MemoryStore::new();
        let first = store.upsert_profile(profile("OP-1", "ana@loja.com")).await.unwrap();

        let same_code = store.upsert_profile(profile("op-1", "bia@loja.com")).await;
        assert!(matches!(same_code, Err(Error::Conflict(_))));

        let same_email = store.upsert_profile(profile("OP-2", "ANA@loja.com")).await;
        assert!(matches!(same_email, Err(Error::Conflict(_))));

        // Updating the holder itself is fine
        let mut renamed = first.clone();
        renamed.name = "Ana Souza".to_string();
        let stored = store.upsert_profile(renamed).await.unwrap();
        assert_eq!(stored.name, "Ana Souza");
        assert_eq!(stored.created_at, first.created_at);
    }

    #[tokio::test]
    async fn test_profile_filters_and_order() {
        let store = MemoryStore::new();
        store.upsert_profile(profile("OP-3", "c@loja.com")).await.unwrap();
        store.upsert_profile(profile("OP-1", "a@loja.com")).await.unwrap();
        let mut inactive = profile("OP-2", "b@loja.com");
        inactive.active = false;
        store.upsert_profile(inactive).await.unwrap();

        let all = store.select_profiles(&ProfileFilter::default()).await.unwrap();
        let codes: Vec<&str> = all.iter().map(|p| p.operator_code.as_str()).collect();
        assert_eq!(codes, vec!["OP-1", "OP-2", "OP-3"]);

        let active = store
            .select_profiles(&ProfileFilter {
                active: Some(true),
                ..ProfileFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(active.len(), 2);

        let by_email = store
            .select_profiles(&ProfileFilter::by_email("B@LOJA.COM"))
            .await
            .unwrap();
        assert_eq!(by_email[0].operator_code.as_str(), "OP-2");

        assert_eq!(
            store
                .delete_profiles(&ProfileFilter::by_id(by_email[0].id))
                .await
                .unwrap(),
            1
        );
        assert_eq!(store.select_profiles(&ProfileFilter::default()).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_closing_upsert_replaces_on_user_date() {
        let store = MemoryStore::new();
        let user = Uuid::now_v7();

        let mut first = CashClosing::new(user, date(4));
        first.notes = "first".to_string();
        let first = store.upsert_closing(first).await.unwrap();

        let mut second = CashClosing::new(user, date(4));
        second.notes = "second".to_string();
        second.fields.commission = dec!(12.00);
        let second = store.upsert_closing(second).await.unwrap();

        assert_eq!(second.id, first.id);
        assert_eq!(second.created_at, first.created_at);

        let rows = store.select_closings(&ClosingFilter::for_day(user, date(4))).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].notes, "second");
        assert_eq!(rows[0].fields.commission, dec!(12.00));
    }

    #[tokio::test]
    async fn test_closing_cannot_move_to_other_day() {
        let store = MemoryStore::new();
        let stored = store
            .upsert_closing(CashClosing::new(Uuid::now_v7(), date(4)))
            .await
            .unwrap();

        let mut moved = stored.clone();
        moved.date = date(5);
        assert!(matches!(
            store.upsert_closing(moved).await,
            Err(Error::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_closing_filters_and_order() {
        let store = MemoryStore::new();
        let (ana, bia) = (Uuid::now_v7(), Uuid::now_v7());
        for (user, day) in [(ana, 3), (bia, 1), (ana, 1), (bia, 9)] {
            store.upsert_closing(CashClosing::new(user, date(day))).await.unwrap();
        }

        let march_1_to_5 = store
            .select_closings(&ClosingFilter::between(date(1), date(5)))
            .await
            .unwrap();
        assert_eq!(march_1_to_5.len(), 3);
        assert!(march_1_to_5.windows(2).all(|w| w[0].date <= w[1].date));

        let ana_only = store
            .select_closings(&ClosingFilter {
                user_id: Some(ana),
                ..ClosingFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(ana_only.len(), 2);
        assert!(ana_only.iter().all(|c| c.user_id == ana));

        let closed = store
            .select_closings(&ClosingFilter {
                status: Some(ClosingStatus::Closed),
                ..ClosingFilter::default()
            })
            .await
            .unwrap();
        assert!(closed.is_empty());
    }

    #[tokio::test]
    async fn test_rows_replaced_wholesale_and_cascade() {
        let store = MemoryStore::new();
        let closing = store
            .upsert_closing(CashClosing::new(Uuid::now_v7(), date(2)))
            .await
            .unwrap();

        store
            .replace_movements(closing.id, vec![product("Mega", 3), product("Quina", 1)])
            .await
            .unwrap();
        store
            .replace_movements(closing.id, vec![product("Lotofacil", 0)])
            .await
            .unwrap();
        store
            .replace_denominations(
                closing.id,
                vec![DenominationCount {
                    face_value: dec!(50),
                    count: 2,
                }],
            )
            .await
            .unwrap();

        let movements = store.select_movements(closing.id).await.unwrap();
        assert_eq!(movements.len(), 1);
        assert_eq!(movements[0].line.product, "Lotofacil");
        assert_eq!(movements[0].closing_id, closing.id);

        let deleted = store.delete_closings(&ClosingFilter::by_id(closing.id)).await.unwrap();
        assert_eq!(deleted, 1);
        assert!(store.select_movements(closing.id).await.unwrap().is_empty());
        assert!(store.select_denominations(closing.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rows_need_a_closing() {
        let store = MemoryStore::new();
        let result = store.replace_movements(Uuid::now_v7(), vec![]).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }
}
