//! Store accounts: provisioning, login checks and admin password resets.

use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;

use crate::clock::Clock;
use crate::error::{AppError, AppResult};
use crate::model::{NewStore, Store};
use crate::storage::InventoryStore;

/// bcrypt work factor for store passwords.
pub const BCRYPT_COST: u32 = 10;

lazy_static! {
    static ref WHITESPACE_RUN: Regex = Regex::new(r"\s+").unwrap();
    static ref NON_SLUG_CHARS: Regex = Regex::new(r"[^a-z0-9-]").unwrap();
}

/// Lowercases, turns whitespace runs into `-` and drops everything outside `[a-z0-9-]`.
pub fn normalize_slug(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    let dashed = WHITESPACE_RUN.replace_all(&lowered, "-");
    NON_SLUG_CHARS.replace_all(&dashed, "").into_owned()
}

/// Hashes off the async executor; bcrypt is deliberately slow.
pub async fn hash_password(password: &str) -> AppResult<String> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || bcrypt::hash(password, BCRYPT_COST))
        .await
        .map_err(|err| AppError::internal(format!("hashing task failed: {err}")))?
        .map_err(AppError::from)
}

pub async fn verify_password(password: &str, hash: &str) -> bool {
    let password = password.to_string();
    let hash = hash.to_string();
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash).unwrap_or(false))
        .await
        .unwrap_or(false)
}

/// The single admin login, taken from configuration.
#[derive(Debug, Clone)]
pub struct AdminCredentials {
    pub email: String,
    pub password: String,
}

impl AdminCredentials {
    pub fn verify(&self, email: &str, password: &str) -> bool {
        !self.password.is_empty() && email == self.email && password == self.password
    }
}

#[derive(Clone)]
pub struct AccountService {
    store: Arc<dyn InventoryStore>,
    clock: Arc<dyn Clock>,
    admin: AdminCredentials,
}

impl AccountService {
    pub fn new(store: Arc<dyn InventoryStore>, clock: Arc<dyn Clock>, admin: AdminCredentials) -> Self {
        Self { store, clock, admin }
    }

    pub fn verify_admin(&self, email: &str, password: &str) -> bool {
        self.admin.verify(email.trim(), password)
    }

    pub async fn list_stores(&self) -> AppResult<Vec<Store>> {
        self.store.list_stores().await
    }

    pub async fn find_store(&self, store_id: i64) -> AppResult<Option<Store>> {
        self.store.find_store_by_id(store_id).await
    }

    /// Provisions a store. Every failure the operator can fix is a validation error.
    pub async fn create_store_account(
        &self,
        name: &str,
        slug: &str,
        password: &str,
    ) -> AppResult<Store> {
        let name = name.trim();
        if name.is_empty() || slug.trim().is_empty() || password.is_empty() {
            return Err(AppError::validation("name, slug and password are required"));
        }

        let slug = normalize_slug(slug);
        if slug.is_empty() {
            return Err(AppError::validation(
                "slug must contain letters, digits or dashes",
            ));
        }

        if self.store.find_store_by_slug(&slug).await?.is_some() {
            return Err(AppError::validation(format!("store '{slug}' already exists")));
        }

        let password_hash = hash_password(password).await?;
        let store = self
            .store
            .create_store(
                NewStore {
                    name: name.to_string(),
                    slug,
                    password_hash,
                },
                self.clock.now(),
            )
            .await?;

        tracing::info!(store_id = store.id, slug = %store.slug, "store account created");
        Ok(store)
    }

    /// Checks store credentials. `Ok(None)` covers both unknown slug and wrong password.
    pub async fn verify_store(&self, slug: &str, password: &str) -> AppResult<Option<Store>> {
        let slug = normalize_slug(slug);
        if slug.is_empty() {
            return Ok(None);
        }
        let Some(store) = self.store.find_store_by_slug(&slug).await? else {
            return Ok(None);
        };

        if verify_password(password, &store.password_hash).await {
            Ok(Some(store))
        } else {
            Ok(None)
        }
    }

    pub async fn change_store_password(
        &self,
        store_id: i64,
        password: &str,
        confirm: &str,
    ) -> AppResult<()> {
        if password.is_empty() || confirm.is_empty() {
            return Err(AppError::validation(
                "new password and confirmation are required",
            ));
        }
        if password != confirm {
            return Err(AppError::validation("passwords do not match"));
        }

        if self.store.find_store_by_id(store_id).await?.is_none() {
            return Err(AppError::not_found(format!("store {store_id} not found")));
        }

        let password_hash = hash_password(password).await?;
        self.store
            .update_store_password(store_id, &password_hash)
            .await?;

        tracing::info!(store_id, "store password reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_normalization() {
        assert_eq!(normalize_slug("  Tokyo Shop  "), "tokyo-shop");
        assert_eq!(normalize_slug("A&B   Travel!"), "ab-travel");
        assert_eq!(normalize_slug("店舗"), "");
    }

    #[test]
    fn admin_with_blank_password_never_verifies() {
        let admin = AdminCredentials {
            email: "admin@esim.local".into(),
            password: String::new(),
        };
        assert!(!admin.verify("admin@esim.local", ""));

        let admin = AdminCredentials {
            email: "admin@esim.local".into(),
            password: "admin123".into(),
        };
        assert!(admin.verify("admin@esim.local", "admin123"));
        assert!(!admin.verify("admin@esim.local", "wrong"));
    }

    #[tokio::test]
    async fn hashed_password_verifies() {
        let hash = hash_password("s3cret").await.unwrap();
        assert!(verify_password("s3cret", &hash).await);
        assert!(!verify_password("nope", &hash).await);
    }
}
