//! Identity gateway
//!
//! E-mail/password authentication with session tokens. The facade only sees
//! the [`IdentityGateway`] trait; [`LocalIdentityProvider`] is the in-process
//! implementation (Argon2 password hashes, sessions with a TTL).
//!
//! Sign-in checks the password before the confirmation state, so a caller
//! without the password never learns whether an address is confirmed.

use crate::{
    config::IdentityConfig,
    error::{AuthError, Error, Result},
};
use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Authenticated identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Identity ID, shared with the user profile
    pub id: Uuid,
    /// Login e-mail (lower-cased)
    pub email: String,
    /// Whether the address has been confirmed
    pub email_confirmed: bool,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
}

/// Opaque session token
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionToken(String);

impl SessionToken {
    fn generate() -> Self {
        Self(format!(
            "{}{}",
            Uuid::new_v4().simple(),
            Uuid::new_v4().simple()
        ))
    }

    /// Token text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SessionToken {
    fn from(token: String) -> Self {
        Self(token)
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Active session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Bearer token
    pub token: SessionToken,
    /// Identity the session belongs to
    pub user_id: Uuid,
    /// Expiry
    pub expires_at: DateTime<Utc>,
}

/// Result of a sign-up
#[derive(Debug, Clone)]
pub struct SignUpOutcome {
    /// New identity
    pub identity: Identity,
    /// Absent while the e-mail awaits confirmation
    pub session: Option<Session>,
}

/// Result of a sign-in
#[derive(Debug, Clone)]
pub struct SignInOutcome {
    /// Signed-in identity
    pub identity: Identity,
    /// New session
    pub session: Session,
}

/// Authentication provider
#[async_trait]
pub trait IdentityGateway: Send + Sync {
    /// Create an identity
    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome>;

    /// Open a session
    async fn sign_in(&self, email: &str, password: &str) -> Result<SignInOutcome>;

    /// Invalidate a session
    async fn sign_out(&self, token: &SessionToken) -> Result<()>;

    /// Mark an address as confirmed (out-of-band link callback)
    async fn confirm_email(&self, email: &str) -> Result<Identity>;

    /// Identity behind a live session
    async fn resolve(&self, token: &SessionToken) -> Result<Identity>;

    /// Remove an identity and every session it holds
    async fn delete_identity(&self, id: Uuid) -> Result<()>;
}

/// Longest accepted session TTL
pub const MAX_SESSION_TTL_DAYS: i64 = 366;

#[derive(Debug, Clone)]
struct Account {
    identity: Identity,
    password_hash: String,
}

/// In-process identity provider
pub struct LocalIdentityProvider {
    config: IdentityConfig,
    hasher: Argon2<'static>,
    session_ttl: Duration,
    /// Accounts keyed by lower-cased e-mail
    accounts: DashMap<String, Account>,
    /// Identity ID -> account key
    emails: DashMap<Uuid, String>,
    sessions: DashMap<SessionToken, Session>,
}

impl fmt::Debug for LocalIdentityProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalIdentityProvider")
            .field("accounts", &self.accounts.len())
            .field("sessions", &self.sessions.len())
            .finish()
    }
}

impl LocalIdentityProvider {
    /// Create a provider
    pub fn new(config: IdentityConfig) -> Result<Self> {
        let params = Params::new(config.hash_memory_kib, config.hash_iterations, 1, None)
            .map_err(|e| Error::Config(format!("Invalid Argon2 parameters: {}", e)))?;

        let session_ttl = Duration::try_minutes(config.session_ttl_minutes)
            .filter(|ttl| *ttl >= Duration::zero() && *ttl <= Duration::days(MAX_SESSION_TTL_DAYS))
            .ok_or_else(|| {
                Error::Config(format!(
                    "Session TTL must be between 0 and {} days, got {} minutes",
                    MAX_SESSION_TTL_DAYS, config.session_ttl_minutes
                ))
            })?;

        Ok(Self {
            config,
            hasher: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
            session_ttl,
            accounts: DashMap::new(),
            emails: DashMap::new(),
            sessions: DashMap::new(),
        })
    }

    /// Number of live sessions
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    fn normalize_email(email: &str) -> String {
        email.trim().to_lowercase()
    }

    fn hash_password(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .hasher
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| Error::Other(format!("Password hashing failed: {}", e)))?;
        Ok(hash.to_string())
    }

    fn verify_password(&self, password: &str, hash: &str) -> bool {
        match PasswordHash::new(hash) {
            Ok(parsed) => self
                .hasher
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }

    fn open_session(&self, user_id: Uuid) -> Session {
        let session = Session {
            token: SessionToken::generate(),
            user_id,
            expires_at: Utc::now() + self.session_ttl,
        };
        self.sessions.insert(session.token.clone(), session.clone());
        session
    }

    /// Drop every expired session; returns how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let before = self.sessions.len();
        self.sessions.retain(|_, session| session.expires_at > now);
        before - self.sessions.len()
    }
}

#[async_trait]
impl IdentityGateway for LocalIdentityProvider {
    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome> {
        if password.chars().count() < self.config.min_password_length {
            return Err(AuthError::WeakPassword(self.config.min_password_length).into());
        }

        let email = Self::normalize_email(email);
        let password_hash = self.hash_password(password)?;
        let identity = Identity {
            id: Uuid::now_v7(),
            email: email.clone(),
            email_confirmed: !self.config.require_email_confirmation,
            created_at: Utc::now(),
        };

        match self.accounts.entry(email.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(AuthError::EmailAlreadyRegistered.into())
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Account {
                    identity: identity.clone(),
                    password_hash,
                });
            }
        }
        self.emails.insert(identity.id, email);

        tracing::info!(user_id = %identity.id, confirmed = identity.email_confirmed, "Identity created");

        let session = identity
            .email_confirmed
            .then(|| self.open_session(identity.id));
        Ok(SignUpOutcome { identity, session })
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<SignInOutcome> {
        let email = Self::normalize_email(email);
        let account = self
            .accounts
            .get(&email)
            .map(|entry| entry.value().clone())
            .ok_or(AuthError::InvalidCredentials)?;

        if !self.verify_password(password, &account.password_hash) {
            return Err(AuthError::InvalidCredentials.into());
        }
        if !account.identity.email_confirmed {
            return Err(AuthError::EmailNotConfirmed.into());
        }

        let session = self.open_session(account.identity.id);
        tracing::debug!(user_id = %account.identity.id, "Session opened");
        Ok(SignInOutcome {
            identity: account.identity,
            session,
        })
    }

    async fn sign_out(&self, token: &SessionToken) -> Result<()> {
        self.sessions
            .remove(token)
            .map(|_| ())
            .ok_or_else(|| AuthError::InvalidSession.into())
    }

    async fn confirm_email(&self, email: &str) -> Result<Identity> {
        let email = Self::normalize_email(email);
        let mut account = self
            .accounts
            .get_mut(&email)
            .ok_or_else(|| Error::NotFound(format!("identity {}", email)))?;
        account.identity.email_confirmed = true;
        Ok(account.identity.clone())
    }

    async fn resolve(&self, token: &SessionToken) -> Result<Identity> {
        let session = self
            .sessions
            .get(token)
            .map(|entry| entry.value().clone())
            .ok_or(AuthError::InvalidSession)?;

        if session.expires_at <= Utc::now() {
            self.sessions.remove(token);
            return Err(AuthError::SessionExpired.into());
        }

        let email = self
            .emails
            .get(&session.user_id)
            .map(|entry| entry.value().clone())
            .ok_or(AuthError::InvalidSession)?;
        self.accounts
            .get(&email)
            .map(|entry| entry.identity.clone())
            .ok_or_else(|| AuthError::InvalidSession.into())
    }

    async fn delete_identity(&self, id: Uuid) -> Result<()> {
        let (_, email) = self
            .emails
            .remove(&id)
            .ok_or_else(|| Error::NotFound(format!("identity {}", id)))?;
        self.accounts.remove(&email);
        self.sessions.retain(|_, session| session.user_id != id);

        tracing::info!(user_id = %id, "Identity deleted");
        Ok(())
    }
}
