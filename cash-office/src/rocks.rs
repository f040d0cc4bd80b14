//! RocksDB record store
//!
//! # Column Families
//!
//! - `users` - User profiles (key: id)
//! - `closings` - Cash closings (key: id)
//! - `product_movements` - Product rows of a closing (key: closing_id)
//! - `supply_denominations` - Vault rows of a closing (key: closing_id)
//! - `indices` - `user_id || yyyymmdd` → closing id
//!
//! Values are bincode. Every mutation that touches more than one column
//! family goes through a single `WriteBatch`.

use crate::{
    config::StoreConfig,
    error::{Error, Result},
    storage::{
        check_profile_unique, merge_closing, merge_profile, sort_closings, sort_profiles,
        ClosingFilter, PersistenceGateway, ProfileFilter,
    },
};
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use parking_lot::Mutex;
use reconciliation_core::{
    CashClosing, DenominationCount, ProductCount, ProductMovement, SupplyDenomination,
    UserProfile,
};
use rocksdb::{BoundColumnFamily, ColumnFamilyDescriptor, IteratorMode, Options, WriteBatch, DB};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use uuid::Uuid;

/// Column family names
const CF_USERS: &str = "users";
const CF_CLOSINGS: &str = "closings";
const CF_MOVEMENTS: &str = "product_movements";
const CF_DENOMINATIONS: &str = "supply_denominations";
const CF_INDICES: &str = "indices";

/// Record store backed by RocksDB
pub struct RocksStore {
    db: Arc<DB>,
    // Serializes check-then-write sequences (uniqueness, key lookups)
    write_lock: Mutex<()>,
}

impl std::fmt::Debug for RocksStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RocksStore").finish_non_exhaustive()
    }
}

impl RocksStore {
    /// Open or create database
    pub fn open(config: &StoreConfig) -> Result<Self> {
        let path = &config.data_dir;
        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_USERS, Self::cf_options_records()),
            ColumnFamilyDescriptor::new(CF_CLOSINGS, Self::cf_options_records()),
            ColumnFamilyDescriptor::new(CF_MOVEMENTS, Self::cf_options_records()),
            ColumnFamilyDescriptor::new(CF_DENOMINATIONS, Self::cf_options_records()),
            ColumnFamilyDescriptor::new(CF_INDICES, Self::cf_options_indices()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;
        tracing::info!(path = ?path, "Opened RocksDB record store");

        Ok(Self {
            db: Arc::new(db),
            write_lock: Mutex::new(()),
        })
    }

    fn cf_options_records() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_options_indices() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    /// Index key: user_id (16 bytes) || date as big-endian yyyymmdd
    fn index_key_closing(user_id: &Uuid, date: NaiveDate) -> Vec<u8> {
        let mut key = Vec::with_capacity(20);
        key.extend_from_slice(user_id.as_bytes());
        let packed = date.year() as u32 * 10_000 + date.month() * 100 + date.day();
        key.extend_from_slice(&packed.to_be_bytes());
        key
    }

    fn get<T: DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf_handle(cf_name)?;
        match self.db.get_cf(&cf, key)? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    fn scan<T: DeserializeOwned>(&self, cf_name: &str) -> Result<Vec<T>> {
        let cf = self.cf_handle(cf_name)?;
        let mut records = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_, value) = item?;
            records.push(bincode::deserialize(&value)?);
        }
        Ok(records)
    }

    fn closing_exists(&self, closing_id: Uuid) -> Result<bool> {
        let cf = self.cf_handle(CF_CLOSINGS)?;
        Ok(self.db.get_pinned_cf(&cf, closing_id.as_bytes())?.is_some())
    }
}

#[async_trait]
impl PersistenceGateway for RocksStore {
    async fn upsert_profile(&self, profile: UserProfile) -> Result<UserProfile> {
        let _guard = self.write_lock.lock();

        let existing: Vec<UserProfile> = self.scan(CF_USERS)?;
        check_profile_unique(&profile, existing.iter())?;

        let stored = existing.iter().find(|p| p.id == profile.id);
        let profile = merge_profile(stored, profile);

        let cf = self.cf_handle(CF_USERS)?;
        self.db
            .put_cf(&cf, profile.id.as_bytes(), bincode::serialize(&profile)?)?;

        tracing::debug!(user_id = %profile.id, operator_code = %profile.operator_code, "Profile stored");
        Ok(profile)
    }

    async fn select_profiles(&self, filter: &ProfileFilter) -> Result<Vec<UserProfile>> {
        let mut profiles: Vec<UserProfile> = match filter.id {
            Some(id) => self.get(CF_USERS, id.as_bytes())?.into_iter().collect(),
            None => self.scan(CF_USERS)?,
        };
        profiles.retain(|p| filter.matches(p));
        sort_profiles(&mut profiles);
        Ok(profiles)
    }

    async fn delete_profiles(&self, filter: &ProfileFilter) -> Result<usize> {
        let _guard = self.write_lock.lock();

        let doomed: Vec<UserProfile> = self
            .scan::<UserProfile>(CF_USERS)?
            .into_iter()
            .filter(|p| filter.matches(p))
            .collect();

        let cf = self.cf_handle(CF_USERS)?;
        let mut batch = WriteBatch::default();
        for profile in &doomed {
            batch.delete_cf(&cf, profile.id.as_bytes());
        }
        self.db.write(batch)?;

        Ok(doomed.len())
    }

    async fn upsert_closing(&self, closing: CashClosing) -> Result<CashClosing> {
        let _guard = self.write_lock.lock();

        if let Some(previous) = self.get::<CashClosing>(CF_CLOSINGS, closing.id.as_bytes())? {
            if (previous.user_id, previous.date) != (closing.user_id, closing.date) {
                return Err(Error::Conflict(format!(
                    "closing {} belongs to {} on {}",
                    closing.id, previous.user_id, previous.date
                )));
            }
        }

        let index_key = Self::index_key_closing(&closing.user_id, closing.date);
        let cf_indices = self.cf_handle(CF_INDICES)?;
        let stored: Option<CashClosing> = match self.db.get_cf(&cf_indices, &index_key)? {
            Some(id_bytes) => self.get(CF_CLOSINGS, &id_bytes)?,
            None => None,
        };
        let closing = merge_closing(stored.as_ref(), closing);

        let mut batch = WriteBatch::default();
        let cf_closings = self.cf_handle(CF_CLOSINGS)?;
        batch.put_cf(&cf_closings, closing.id.as_bytes(), bincode::serialize(&closing)?);
        batch.put_cf(&cf_indices, &index_key, closing.id.as_bytes());
        self.db.write(batch)?;

        tracing::debug!(
            closing_id = %closing.id,
            user_id = %closing.user_id,
            date = %closing.date,
            "Closing stored"
        );
        Ok(closing)
    }

    async fn select_closings(&self, filter: &ClosingFilter) -> Result<Vec<CashClosing>> {
        let mut closings: Vec<CashClosing> = match filter.id {
            Some(id) => self.get(CF_CLOSINGS, id.as_bytes())?.into_iter().collect(),
            None => self.scan(CF_CLOSINGS)?,
        };
        closings.retain(|c| filter.matches(c));
        sort_closings(&mut closings);
        Ok(closings)
    }

    async fn delete_closings(&self, filter: &ClosingFilter) -> Result<usize> {
        let _guard = self.write_lock.lock();

        let doomed: Vec<CashClosing> = self
            .scan::<CashClosing>(CF_CLOSINGS)?
            .into_iter()
            .filter(|c| filter.matches(c))
            .collect();

        let cf_closings = self.cf_handle(CF_CLOSINGS)?;
        let cf_indices = self.cf_handle(CF_INDICES)?;
        let cf_movements = self.cf_handle(CF_MOVEMENTS)?;
        let cf_denominations = self.cf_handle(CF_DENOMINATIONS)?;

        let mut batch = WriteBatch::default();
        for closing in &doomed {
            let key = closing.id.as_bytes();
            batch.delete_cf(&cf_closings, key);
            batch.delete_cf(&cf_movements, key);
            batch.delete_cf(&cf_denominations, key);
            batch.delete_cf(
                &cf_indices,
                Self::index_key_closing(&closing.user_id, closing.date),
            );
        }
        self.db.write(batch)?;

        Ok(doomed.len())
    }

    async fn replace_movements(
        &self,
        closing_id: Uuid,
        lines: Vec<ProductCount>,
    ) -> Result<Vec<ProductMovement>> {
        let _guard = self.write_lock.lock();
        if !self.closing_exists(closing_id)? {
            return Err(Error::NotFound(format!("closing {}", closing_id)));
        }

        let rows: Vec<ProductMovement> = lines
            .into_iter()
            .map(|line| ProductMovement { closing_id, line })
            .collect();
        let cf = self.cf_handle(CF_MOVEMENTS)?;
        self.db
            .put_cf(&cf, closing_id.as_bytes(), bincode::serialize(&rows)?)?;
        Ok(rows)
    }

    async fn select_movements(&self, closing_id: Uuid) -> Result<Vec<ProductMovement>> {
        Ok(self
            .get(CF_MOVEMENTS, closing_id.as_bytes())?
            .unwrap_or_default())
    }

    async fn replace_denominations(
        &self,
        closing_id: Uuid,
        lines: Vec<DenominationCount>,
    ) -> Result<Vec<SupplyDenomination>> {
        let _guard = self.write_lock.lock();
        if !self.closing_exists(closing_id)? {
            return Err(Error::NotFound(format!("closing {}", closing_id)));
        }

        let rows: Vec<SupplyDenomination> = lines
            .into_iter()
            .map(|line| SupplyDenomination { closing_id, line })
            .collect();
        let cf = self.cf_handle(CF_DENOMINATIONS)?;
        self.db
            .put_cf(&cf, closing_id.as_bytes(), bincode::serialize(&rows)?)?;
        Ok(rows)
    }

    async fn select_denominations(&self, closing_id: Uuid) -> Result<Vec<SupplyDenomination>> {
        Ok(self
            .get(CF_DENOMINATIONS, closing_id.as_bytes())?
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::tests::{date, profile};
    use reconciliation_core::ClosingStatus;
    use rust_decimal_macros::dec;

    fn open_temp() -> (tempfile::TempDir, RocksStore) {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            data_dir: temp_dir.path().to_path_buf(),
            ..StoreConfig::default()
        };
        let store = RocksStore::open(&config).unwrap();
        (temp_dir, store)
    }

    #[tokio::test]
    async fn test_closing_round_trip() {
        let (_dir, store) = open_temp();
        let mut closing = CashClosing::new(Uuid::now_v7(), date(7));
        closing.fields.commission = dec!(15.50);
        closing.fields.cash_drawer_2 = dec!(0.05);
        closing.notes = "troco conferido".to_string();
        closing.status = ClosingStatus::Closed;

        let stored = store.upsert_closing(closing.clone()).await.unwrap();
        let read = store
            .select_closings(&ClosingFilter::by_id(stored.id))
            .await
            .unwrap();
        assert_eq!(read, vec![closing]);
    }

    #[tokio::test]
    async fn test_upsert_replaces_on_user_date() {
        let (_dir, store) = open_temp();
        let user = Uuid::now_v7();

        let first = store.upsert_closing(CashClosing::new(user, date(8))).await.unwrap();
        let mut second = CashClosing::new(user, date(8));
        second.notes = "again".to_string();
        let second = store.upsert_closing(second).await.unwrap();

        assert_eq!(second.id, first.id);
        let all = store.select_closings(&ClosingFilter::default()).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].notes, "again");
    }

    #[tokio::test]
    async fn test_delete_cascades_rows() {
        let (_dir, store) = open_temp();
        let closing = store
            .upsert_closing(CashClosing::new(Uuid::now_v7(), date(9)))
            .await
            .unwrap();
        store
            .replace_denominations(
                closing.id,
                vec![DenominationCount {
                    face_value: dec!(100),
                    count: 1,
                }],
            )
            .await
            .unwrap();
        assert_eq!(store.select_denominations(closing.id).await.unwrap().len(), 1);

        store.delete_closings(&ClosingFilter::by_id(closing.id)).await.unwrap();
        assert!(store.select_denominations(closing.id).await.unwrap().is_empty());

        // The (user, date) key is free again
        let fresh = store
            .upsert_closing(CashClosing::new(closing.user_id, date(9)))
            .await
            .unwrap();
        assert_ne!(fresh.id, closing.id);
    }

    #[tokio::test]
    async fn test_profile_conflict_survives_reopen() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            data_dir: temp_dir.path().to_path_buf(),
            ..StoreConfig::default()
        };

        {
            let store = RocksStore::open(&config).unwrap();
            store.upsert_profile(profile("OP-9", "z@loja.com")).await.unwrap();
        }

        let store = RocksStore::open(&config).unwrap();
        let result = store.upsert_profile(profile("OP-9", "y@loja.com")).await;
        assert!(matches!(result, Err(Error::Conflict(_))));
    }
}
