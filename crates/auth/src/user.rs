//! User accounts for the lab tracker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use labloan_core::{DomainError, DomainResult, Entity, UserId};

use crate::password::{self, PasswordError};
use crate::Role;

/// A registered account.
///
/// # Invariants
/// - `username` is unique across the directory (enforced by the store).
/// - Only the argon2 hash of the password is kept; it is never serialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub name: String,
    pub role: Role,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn register(id: UserId, new: NewUser, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            username: new.username,
            name: new.name,
            role: new.role,
            password_hash: new.password_hash,
            created_at,
        }
    }

    pub fn check_password(&self, candidate: &str) -> Result<bool, PasswordError> {
        password::verify_password(candidate, &self.password_hash)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

impl Entity for User {
    type Id = UserId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Unvalidated signup input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignupDraft {
    pub username: Option<String>,
    pub password: Option<String>,
    pub name: Option<String>,
}

impl SignupDraft {
    /// Presence checks only; hashing happens in `ValidSignup::hash`.
    pub fn validate(self) -> DomainResult<ValidSignup> {
        let username = required(self.username, "username")?;
        let password = self
            .password
            .filter(|p| !p.is_empty())
            .ok_or_else(|| DomainError::validation("password is required"))?;
        let name = required(self.name, "name")?;

        Ok(ValidSignup {
            username,
            password,
            name,
        })
    }
}

/// Signup input that passed presence checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidSignup {
    pub username: String,
    password: String,
    pub name: String,
}

impl ValidSignup {
    /// Signups always create students.
    pub fn hash(self) -> Result<NewUser, PasswordError> {
        NewUser::hashed(self.username, &self.password, self.name, Role::Student)
    }
}

fn required(value: Option<String>, field: &str) -> DomainResult<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| DomainError::validation(format!("{field} is required")))
}

/// A user ready to be stored (password already hashed).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub username: String,
    pub name: String,
    pub role: Role,
    pub password_hash: String,
}

impl NewUser {
    pub fn hashed(
        username: impl Into<String>,
        password: &str,
        name: impl Into<String>,
        role: Role,
    ) -> Result<Self, PasswordError> {
        Ok(Self {
            username: username.into(),
            name: name.into(),
            role,
            password_hash: password::hash_password(password)?,
        })
    }
}

/// Accounts created when the directory starts out empty.
pub fn demo_users() -> Result<Vec<NewUser>, PasswordError> {
    Ok(vec![
        NewUser::hashed("admin", "admin123", "Lab Manager", Role::Admin)?,
        NewUser::hashed("student", "student123", "Test Student", Role::Student)?,
    ])
}
