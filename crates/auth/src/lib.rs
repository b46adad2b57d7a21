//! `labloan-auth`: user accounts and credential checks.
//!
//! This crate is intentionally decoupled from HTTP and storage.

pub mod password;
pub mod roles;
pub mod user;

pub use password::{PasswordError, hash_password, verify_password};
pub use roles::Role;
pub use user::{NewUser, SignupDraft, User, ValidSignup, demo_users};
