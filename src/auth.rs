//! Password hashing and the admin credential check.
//!
//! Passwords are stored as salted Argon2 PHC strings. The credential check
//! collapses every failure mode — unknown email, non-admin account, wrong
//! password — into the same `None`, so callers cannot leak which condition
//! failed.

use anyhow::{Result, anyhow};
use argon2::Argon2;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use sea_orm::{ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter};

use crate::entities::user;

pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| anyhow!("Failed to hash password: {err}"))?;
    Ok(hash.to_string())
}

pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// Admin credential check: the account must exist, carry the is-admin
/// flag, and match the password hash. A valid non-admin login is rejected
/// exactly like a wrong password.
pub async fn authenticate_admin(
    db: &DatabaseConnection,
    email: &str,
    password: &str,
) -> Result<Option<user::Model>, DbErr> {
    let account = user::Entity::find()
        .filter(user::Column::Email.eq(email))
        .one(db)
        .await?;

    let Some(account) = account else {
        return Ok(None);
    };
    if !account.is_admin {
        return Ok(None);
    }
    if !verify_password(password, &account.password) {
        return Ok(None);
    }
    Ok(Some(account))
}
