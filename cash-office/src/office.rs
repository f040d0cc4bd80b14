//! Cash office facade
//!
//! Ties the identity gateway, the record store and the closing writer into
//! the operations the screens call. Every operation takes the caller's
//! session token; there is no ambient "current user".
//!
//! # Example
//!
//! ```no_run
//! use cash_office::{CashOffice, ClosingDraft, Config};
//!
//! #[tokio::main]
//! async fn main() -> cash_office::Result<()> {
//!     let office = CashOffice::open(Config::default()).await?;
//!
//!     // let signed_in = office.sign_in("ana@loja.com", "segredo123").await?;
//!     // let detail = office.save_closing(&signed_in.session.token, draft).await?;
//!
//!     office.shutdown().await
//! }
//! ```

use crate::{
    actor::{spawn_closing_writer, ClosingWriterHandle, StoredClosing},
    config::{Config, StoreBackend, StoreConfig},
    identity::{Identity, IdentityGateway, LocalIdentityProvider, Session, SessionToken},
    metrics::Metrics,
    report::{build_period_report, PeriodReport},
    storage::{ClosingFilter, MemoryStore, PersistenceGateway, ProfileFilter},
    Error, Result,
};
use chrono::{NaiveDate, Utc};
use reconciliation_core::{
    detect_with_denominations, reconcile, validate_closing, AnomalyConfig, AnomalyWarning,
    CashClosing, ClosingFields, ClosingStatus, DenominationCount, OperatorCode, ProductCount,
    ProductMovement, Reconciliation, Role, SupplyDenomination, UserProfile, ValidationErrors,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Sign-up form
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationRequest {
    /// Full name
    pub name: String,
    /// CPF (11 digits) or CNPJ (14 digits), punctuation allowed
    pub tax_id: String,
    /// Login e-mail
    pub email: String,
    /// Contact phone
    pub phone: String,
    /// Requested operator code
    pub operator_code: String,
    /// Password
    pub password: String,
}

/// Result of a registration
#[derive(Debug, Clone)]
pub struct Registration {
    /// Created profile
    pub profile: UserProfile,
    /// Absent while the e-mail awaits confirmation
    pub session: Option<Session>,
}

/// Result of a sign-in
#[derive(Debug, Clone)]
pub struct SignedIn {
    /// Caller's profile
    pub profile: UserProfile,
    /// New session
    pub session: Session,
}

/// Closing form as submitted by an operator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosingDraft {
    /// Existing closing being edited, if any
    #[serde(default)]
    pub closing_id: Option<Uuid>,

    /// Calendar date
    pub date: NaiveDate,

    /// Money inputs; omitted fields are zero
    #[serde(default)]
    pub fields: ClosingFields,

    /// Free-text notes
    #[serde(default)]
    pub notes: String,

    /// Product counts
    #[serde(default)]
    pub products: Vec<ProductCount>,

    /// Vault denomination counts
    #[serde(default)]
    pub denominations: Vec<DenominationCount>,
}

/// Reconciliation of a draft plus its anomalies
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosingEvaluation {
    /// Derived totals
    pub reconciliation: Reconciliation,
    /// Anomaly warnings
    pub anomalies: Vec<AnomalyWarning>,
}

/// Validate and reconcile a draft without storing anything
pub fn evaluate_closing(draft: &ClosingDraft, config: &AnomalyConfig) -> Result<ClosingEvaluation> {
    validate_closing(&draft.fields, &draft.products, &draft.denominations).into_result()?;

    let reconciliation = reconcile(&draft.fields, &draft.products, &draft.denominations);
    let anomalies = detect_with_denominations(&reconciliation, &draft.denominations, config);

    Ok(ClosingEvaluation {
        reconciliation,
        anomalies,
    })
}

/// A stored closing with its rows, summary and warnings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosingDetail {
    /// Closing record
    pub closing: CashClosing,
    /// Product rows
    pub products: Vec<ProductMovement>,
    /// Vault rows
    pub denominations: Vec<SupplyDenomination>,
    /// Derived totals
    pub reconciliation: Reconciliation,
    /// Anomaly warnings
    pub anomalies: Vec<AnomalyWarning>,
}

/// Cash office interface
pub struct CashOffice {
    store: Arc<dyn PersistenceGateway>,
    identity: Arc<dyn IdentityGateway>,
    writer: ClosingWriterHandle,
    metrics: Metrics,
    config: Config,
    email_pattern: Regex,
    /// Serializes registration (uniqueness checks, first-admin choice)
    registration: Mutex<()>,
}

impl std::fmt::Debug for CashOffice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CashOffice")
            .field("service_name", &self.config.service_name)
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}

#[cfg(feature = "rocksdb")]
fn open_rocks(config: &StoreConfig) -> Result<Arc<dyn PersistenceGateway>> {
    Ok(Arc::new(crate::rocks::RocksStore::open(config)?))
}

#[cfg(not(feature = "rocksdb"))]
fn open_rocks(_config: &StoreConfig) -> Result<Arc<dyn PersistenceGateway>> {
    Err(Error::Config(
        "rocksdb store requested but built without the rocksdb feature".to_string(),
    ))
}

impl CashOffice {
    /// Open with the configured store and the local identity provider
    pub async fn open(config: Config) -> Result<Self> {
        let store: Arc<dyn PersistenceGateway> = match config.store.backend {
            StoreBackend::Memory => Arc::new(MemoryStore::new()),
            StoreBackend::Rocksdb => open_rocks(&config.store)?,
        };
        let identity = Arc::new(LocalIdentityProvider::new(config.identity.clone())?);

        Self::with_gateways(config, store, identity)
    }

    /// Assemble from explicit gateways. Spawns the closing writer, so it must
    /// be called from within a Tokio runtime.
    pub fn with_gateways(
        config: Config,
        store: Arc<dyn PersistenceGateway>,
        identity: Arc<dyn IdentityGateway>,
    ) -> Result<Self> {
        let email_pattern = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$")
            .map_err(|e| Error::Config(format!("Invalid e-mail pattern: {}", e)))?;
        let writer = spawn_closing_writer(store.clone(), config.writer.mailbox_capacity);

        tracing::info!(
            service = %config.service_name,
            version = %config.service_version,
            "Cash office opened"
        );

        Ok(Self {
            store,
            identity,
            writer,
            metrics: Metrics::new()?,
            config,
            email_pattern,
            registration: Mutex::new(()),
        })
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Stop the closing writer
    pub async fn shutdown(&self) -> Result<()> {
        self.writer.shutdown().await
    }

    // Accounts

    /// Create an identity and its profile. The first profile ever created is
    /// an admin; every later one an operator.
    pub async fn register(&self, request: RegistrationRequest) -> Result<Registration> {
        let (operator_code, tax_id) = self.validate_registration(&request)?;
        let email = request.email.trim().to_lowercase();
        let _registering = self.registration.lock().await;

        let taken_code = ProfileFilter {
            operator_code: Some(operator_code.clone()),
            ..ProfileFilter::default()
        };
        if !self.store.select_profiles(&taken_code).await?.is_empty() {
            return Err(Error::Conflict(format!(
                "operator code {} already in use",
                operator_code
            )));
        }
        if !self
            .store
            .select_profiles(&ProfileFilter::by_email(email.clone()))
            .await?
            .is_empty()
        {
            return Err(Error::Conflict(format!("e-mail {} already in use", email)));
        }

        let role = if self
            .store
            .select_profiles(&ProfileFilter::default())
            .await?
            .is_empty()
        {
            Role::Admin
        } else {
            Role::Operator
        };

        let outcome = self.identity.sign_up(&email, &request.password).await?;

        let now = Utc::now();
        let stored = self
            .store
            .upsert_profile(UserProfile {
                id: outcome.identity.id,
                name: request.name.trim().to_string(),
                tax_id,
                email,
                phone: request.phone.trim().to_string(),
                operator_code,
                role,
                active: true,
                created_at: now,
                updated_at: now,
            })
            .await;
        let profile = match stored {
            Ok(profile) => profile,
            Err(e) => {
                // No profile, no identity
                if let Err(rollback) = self.identity.delete_identity(outcome.identity.id).await {
                    tracing::error!(
                        user_id = %outcome.identity.id,
                        error = %rollback,
                        "Identity rollback failed"
                    );
                }
                return Err(e);
            }
        };

        tracing::info!(
            user_id = %profile.id,
            operator_code = %profile.operator_code,
            role = %profile.role,
            "Profile registered"
        );

        Ok(Registration {
            profile,
            session: outcome.session,
        })
    }

    fn validate_registration(&self, request: &RegistrationRequest) -> Result<(OperatorCode, String)> {
        let mut errors = ValidationErrors::new();

        if request.name.trim().is_empty() {
            errors.push("name", "must not be empty");
        }

        let tax_id: String = request
            .tax_id
            .chars()
            .filter(|c| !matches!(c, '.' | '-' | '/' | ' '))
            .collect();
        if !tax_id.chars().all(|c| c.is_ascii_digit()) || !matches!(tax_id.len(), 11 | 14) {
            errors.push("tax_id", "must have 11 (CPF) or 14 (CNPJ) digits");
        }

        if !self.email_pattern.is_match(request.email.trim()) {
            errors.push("email", "malformed e-mail address");
        }

        let phone_digits = request.phone.chars().filter(|c| c.is_ascii_digit()).count();
        if !(10..=13).contains(&phone_digits) {
            errors.push("phone", "must have 10 to 13 digits");
        }

        let operator_code = match OperatorCode::new(&request.operator_code) {
            Ok(code) => Some(code),
            Err(e) => {
                errors.push("operator_code", e.to_string());
                None
            }
        };

        errors.into_result()?;
        operator_code
            .map(|code| (code, tax_id))
            .ok_or_else(|| Error::invalid("operator_code", "missing"))
    }

    /// Out-of-band e-mail confirmation
    pub async fn confirm_email(&self, email: &str) -> Result<Identity> {
        self.identity.confirm_email(email).await
    }

    /// Open a session; inactive or deleted profiles are refused
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<SignedIn> {
        let outcome = match self.identity.sign_in(email, password).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.metrics.record_sign_in_failure();
                tracing::warn!(error = %e, "Sign-in refused");
                return Err(e);
            }
        };

        let profile = self
            .store
            .select_profiles(&ProfileFilter::by_id(outcome.identity.id))
            .await?
            .into_iter()
            .next();

        match profile {
            Some(profile) if profile.active => Ok(SignedIn {
                profile,
                session: outcome.session,
            }),
            other => {
                self.metrics.record_sign_in_failure();
                if let Err(e) = self.identity.sign_out(&outcome.session.token).await {
                    tracing::warn!(
                        user_id = %outcome.identity.id,
                        error = %e,
                        "Session revocation failed"
                    );
                }
                let reason = if other.is_some() {
                    "profile is inactive"
                } else {
                    "profile not found"
                };
                tracing::warn!(user_id = %outcome.identity.id, reason, "Sign-in refused");
                Err(Error::Forbidden(reason.to_string()))
            }
        }
    }

    /// Close a session
    pub async fn sign_out(&self, token: &SessionToken) -> Result<()> {
        self.identity.sign_out(token).await
    }

    /// Profile behind a session; must exist and be active
    pub async fn principal(&self, token: &SessionToken) -> Result<UserProfile> {
        let identity = self.identity.resolve(token).await?;
        let profile = self
            .store
            .select_profiles(&ProfileFilter::by_id(identity.id))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Forbidden("profile not found".to_string()))?;

        if !profile.active {
            return Err(Error::Forbidden(format!(
                "profile {} is inactive",
                profile.operator_code
            )));
        }
        Ok(profile)
    }

    async fn admin(&self, token: &SessionToken) -> Result<UserProfile> {
        let profile = self.principal(token).await?;
        if !profile.role.is_admin() {
            return Err(Error::Forbidden(format!(
                "{} is not an admin",
                profile.operator_code
            )));
        }
        Ok(profile)
    }

    // Closings

    /// The caller's closing for a date, created empty if missing
    pub async fn open_day(&self, token: &SessionToken, date: NaiveDate) -> Result<ClosingDetail> {
        let principal = self.principal(token).await?;

        let existing = self
            .store
            .select_closings(&ClosingFilter::for_day(principal.id, date))
            .await?
            .into_iter()
            .next();

        match existing {
            Some(closing) => self.detail(closing).await,
            None => {
                let stored = self
                    .writer
                    .save(CashClosing::new(principal.id, date), Vec::new(), Vec::new())
                    .await?;
                Ok(self.stored_detail(stored))
            }
        }
    }

    /// Validate, reconcile and store a closing; rows are replaced wholesale
    pub async fn save_closing(
        &self,
        token: &SessionToken,
        draft: ClosingDraft,
    ) -> Result<ClosingDetail> {
        let started = Instant::now();
        let principal = self.principal(token).await?;
        let evaluation = evaluate_closing(&draft, &self.config.anomaly)?;

        let mut closing = CashClosing::new(principal.id, draft.date);
        if let Some(id) = draft.closing_id {
            let existing = self.find_closing(id).await?;
            if existing.user_id != principal.id {
                return Err(Error::Forbidden(format!("closing {} belongs to another operator", id)));
            }
            if existing.date != draft.date {
                return Err(Error::Conflict(format!(
                    "closing {} is dated {}, not {}",
                    id, existing.date, draft.date
                )));
            }
            if existing.is_closed() {
                return Err(Error::ClosingLocked(id));
            }
            closing.id = id;
        }
        closing.fields = draft.fields;
        closing.notes = draft.notes;
        closing.difference = evaluation.reconciliation.totals.difference;

        let stored = self
            .writer
            .save(closing, draft.products, draft.denominations)
            .await?;
        self.metrics
            .record_closing_saved(started.elapsed().as_secs_f64());

        for warning in &evaluation.anomalies {
            self.metrics.record_anomaly(warning.kind());
            tracing::warn!(
                closing_id = %stored.closing.id,
                user_id = %principal.id,
                severity = ?warning.severity(),
                "{}",
                warning
            );
        }

        Ok(ClosingDetail {
            closing: stored.closing,
            products: stored.movements,
            denominations: stored.denominations,
            reconciliation: evaluation.reconciliation,
            anomalies: evaluation.anomalies,
        })
    }

    /// Make the caller's closing read-only
    pub async fn close_closing(&self, token: &SessionToken, closing_id: Uuid) -> Result<ClosingDetail> {
        let principal = self.principal(token).await?;
        let closing = self.find_closing(closing_id).await?;
        if closing.user_id != principal.id {
            return Err(Error::Forbidden(format!(
                "closing {} belongs to another operator",
                closing_id
            )));
        }

        let closing = self.writer.close(closing_id).await?;
        self.detail(closing).await
    }

    /// Delete the caller's open closing and its rows
    pub async fn discard_closing(&self, token: &SessionToken, closing_id: Uuid) -> Result<()> {
        let principal = self.principal(token).await?;
        let closing = self.find_closing(closing_id).await?;
        if closing.user_id != principal.id {
            return Err(Error::Forbidden(format!(
                "closing {} belongs to another operator",
                closing_id
            )));
        }

        let removed = self
            .writer
            .delete(ClosingFilter {
                id: Some(closing_id),
                status: Some(ClosingStatus::Open),
                ..ClosingFilter::default()
            })
            .await?;
        if removed == 0 {
            return Err(Error::ClosingLocked(closing_id));
        }

        tracing::info!(closing_id = %closing_id, user_id = %principal.id, "Closing discarded");
        Ok(())
    }

    /// One closing with rows and summary; operators only see their own
    pub async fn closing_detail(&self, token: &SessionToken, closing_id: Uuid) -> Result<ClosingDetail> {
        let principal = self.principal(token).await?;
        let closing = self.find_closing(closing_id).await?;
        if !principal.role.is_admin() && closing.user_id != principal.id {
            return Err(Error::Forbidden(format!(
                "closing {} belongs to another operator",
                closing_id
            )));
        }
        self.detail(closing).await
    }

    /// Closings matching a filter; operators are restricted to their own
    pub async fn list_closings(
        &self,
        token: &SessionToken,
        mut filter: ClosingFilter,
    ) -> Result<Vec<CashClosing>> {
        let principal = self.principal(token).await?;
        if !principal.role.is_admin() {
            if filter.user_id.map_or(false, |user| user != principal.id) {
                return Err(Error::Forbidden(
                    "operators can only list their own closings".to_string(),
                ));
            }
            filter.user_id = Some(principal.id);
        }
        self.store.select_closings(&filter).await
    }

    async fn find_closing(&self, closing_id: Uuid) -> Result<CashClosing> {
        self.store
            .select_closings(&ClosingFilter::by_id(closing_id))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(format!("closing {}", closing_id)))
    }

    async fn detail(&self, closing: CashClosing) -> Result<ClosingDetail> {
        let products = self.store.select_movements(closing.id).await?;
        let denominations = self.store.select_denominations(closing.id).await?;
        Ok(self.stored_detail(StoredClosing {
            closing,
            movements: products,
            denominations,
        }))
    }

    fn stored_detail(&self, stored: StoredClosing) -> ClosingDetail {
        let lines: Vec<ProductCount> = stored.movements.iter().map(|m| m.line.clone()).collect();
        let counts: Vec<DenominationCount> =
            stored.denominations.iter().map(|d| d.line.clone()).collect();

        let reconciliation = reconcile(&stored.closing.fields, &lines, &counts);
        let anomalies = detect_with_denominations(&reconciliation, &counts, &self.config.anomaly);

        ClosingDetail {
            closing: stored.closing,
            products: stored.movements,
            denominations: stored.denominations,
            reconciliation,
            anomalies,
        }
    }

    // Administration

    /// Profiles matching a filter
    pub async fn list_profiles(
        &self,
        token: &SessionToken,
        filter: &ProfileFilter,
    ) -> Result<Vec<UserProfile>> {
        self.admin(token).await?;
        self.store.select_profiles(filter).await
    }

    /// Activate or deactivate another profile
    pub async fn set_active(
        &self,
        token: &SessionToken,
        user_id: Uuid,
        active: bool,
    ) -> Result<UserProfile> {
        let admin = self.admin(token).await?;
        if admin.id == user_id {
            return Err(Error::Forbidden("admins cannot change their own status".to_string()));
        }

        let mut profile = self.find_profile(user_id).await?;
        profile.active = active;
        profile.updated_at = Utc::now();
        let profile = self.store.upsert_profile(profile).await?;

        tracing::info!(user_id = %user_id, active, by = %admin.id, "Profile status changed");
        Ok(profile)
    }

    /// Change another profile's role
    pub async fn set_role(&self, token: &SessionToken, user_id: Uuid, role: Role) -> Result<UserProfile> {
        let admin = self.admin(token).await?;
        if admin.id == user_id {
            return Err(Error::Forbidden("admins cannot change their own role".to_string()));
        }

        let mut profile = self.find_profile(user_id).await?;
        profile.role = role;
        profile.updated_at = Utc::now();
        let profile = self.store.upsert_profile(profile).await?;

        tracing::info!(user_id = %user_id, role = %role, by = %admin.id, "Profile role changed");
        Ok(profile)
    }

    /// Delete another profile; its closings stay for audit
    pub async fn delete_profile(&self, token: &SessionToken, user_id: Uuid) -> Result<()> {
        let admin = self.admin(token).await?;
        if admin.id == user_id {
            return Err(Error::Forbidden("admins cannot delete themselves".to_string()));
        }

        if self.store.delete_profiles(&ProfileFilter::by_id(user_id)).await? == 0 {
            return Err(Error::NotFound(format!("profile {}", user_id)));
        }
        match self.identity.delete_identity(user_id).await {
            Ok(()) => {}
            Err(Error::NotFound(_)) => {
                tracing::debug!(user_id = %user_id, "Profile had no identity");
            }
            Err(e) => return Err(e),
        }

        tracing::info!(user_id = %user_id, by = %admin.id, "Profile deleted");
        Ok(())
    }

    /// Per-operator totals over an inclusive date range
    pub async fn period_report(
        &self,
        token: &SessionToken,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<PeriodReport> {
        self.admin(token).await?;
        if from > to {
            return Err(Error::invalid("to", "must not be before from"));
        }

        let closings = self
            .store
            .select_closings(&ClosingFilter::between(from, to))
            .await?;
        let profiles = self.store.select_profiles(&ProfileFilter::default()).await?;

        Ok(build_period_report(from, to, &profiles, &closings))
    }

    async fn find_profile(&self, user_id: Uuid) -> Result<UserProfile> {
        self.store
            .select_profiles(&ProfileFilter::by_id(user_id))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(format!("profile {}", user_id)))
    }
}
