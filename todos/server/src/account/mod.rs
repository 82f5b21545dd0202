use argon2::Argon2;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use chrono::Utc;
use sea_orm::*;
use todos_core::{Account, AccountId};
use validator::ValidateEmail;

use crate::entities::*;

/// Shortest password accepted at signup.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Error type for AccountService operations.
#[derive(Debug, thiserror::Error)]
pub enum AccountServiceError {
    /// Another account already uses this email address.
    #[error("An account with email '{0}' already exists")]
    DuplicateEmail(String),
    #[error("Account {0} not found")]
    AccountNotFound(AccountId),
    /// Unknown email or wrong password. The two cases are not told apart.
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("Account {0} is blocked")]
    Blocked(AccountId),
    #[error("Email address is not valid")]
    InvalidEmail,
    #[error("Password must be at least 8 characters")]
    WeakPassword,
    /// Admins may not demote, block or delete themselves.
    #[error("Admins cannot change their own account")]
    SelfModification,
    #[error("Password hashing failed: {0}")]
    PasswordHash(String),
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
}

impl From<account::Model> for Account {
    fn from(model: account::Model) -> Self {
        Account {
            id: model.id,
            email: model.email,
            full_name: model.full_name,
            is_admin: model.is_admin,
            is_blocked: model.is_blocked,
            created_at: model.created_at,
        }
    }
}

fn normalize_email(email: &str) -> Result<String, AccountServiceError> {
    let email = email.trim().to_lowercase();
    if email.validate_email() {
        Ok(email)
    } else {
        Err(AccountServiceError::InvalidEmail)
    }
}

fn hash_password(password: &str) -> Result<String, AccountServiceError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AccountServiceError::PasswordHash(e.to_string()))
}

fn verify_password(password: &str, password_hash: &str) -> bool {
    PasswordHash::new(password_hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

pub struct AccountService<'a> {
    db: &'a DatabaseConnection,
}

impl AccountService<'_> {
    pub fn new(db: &DatabaseConnection) -> AccountService<'_> {
        AccountService { db }
    }

    /// Creates a regular account.
    ///
    /// # Arguments
    ///
    /// * `email` - Email address, compared case-insensitively.
    /// * `password` - Plain text password, at least [`MIN_PASSWORD_LEN`] characters.
    /// * `full_name` - Optional display name. Blank input is stored as no name.
    ///
    /// # Returns
    ///
    /// A `Result` containing the created `Account` if successful, or an error otherwise.
    #[tracing::instrument(skip(self, password))]
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        full_name: Option<String>,
    ) -> Result<Account, AccountServiceError> {
        let email = normalize_email(email)?;
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AccountServiceError::WeakPassword);
        }
        if self.find_by_email(&email).await?.is_some() {
            return Err(AccountServiceError::DuplicateEmail(email));
        }

        let full_name = full_name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty());
        let created = self
            .insert_account(email, hash_password(password)?, full_name, false)
            .await?;
        tracing::info!("Created account {}", created.id);
        Ok(created)
    }

    /// Checks an email and password pair.
    ///
    /// A blocked account with the right password yields
    /// [`AccountServiceError::Blocked`] so the caller can show the blocked page.
    #[tracing::instrument(skip(self, password))]
    pub async fn authenticate(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Account, AccountServiceError> {
        let email = email.trim().to_lowercase();
        let model = self
            .find_by_email(&email)
            .await?
            .ok_or(AccountServiceError::InvalidCredentials)?;

        if !verify_password(password, &model.password_hash) {
            return Err(AccountServiceError::InvalidCredentials);
        }
        if model.is_blocked {
            return Err(AccountServiceError::Blocked(model.id));
        }
        Ok(Account::from(model))
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_account(&self, id: &str) -> Result<Account, AccountServiceError> {
        account::Entity::find_by_id(id.to_string())
            .one(self.db)
            .await?
            .map(Account::from)
            .ok_or_else(|| AccountServiceError::AccountNotFound(id.to_string()))
    }

    /// Retrieves every account, newest first.
    #[tracing::instrument(skip(self))]
    pub async fn list_accounts(&self) -> Result<Vec<Account>, AccountServiceError> {
        let accounts = account::Entity::find()
            .order_by_desc(account::Column::CreatedAt)
            .all(self.db)
            .await?
            .into_iter()
            .map(Account::from)
            .collect();
        Ok(accounts)
    }

    /// Accounts that may receive assigned todos: every account that is not blocked,
    /// ordered by email.
    #[tracing::instrument(skip(self))]
    pub async fn list_assignable_accounts(&self) -> Result<Vec<Account>, AccountServiceError> {
        let accounts = account::Entity::find()
            .filter(account::Column::IsBlocked.eq(false))
            .order_by_asc(account::Column::Email)
            .all(self.db)
            .await?
            .into_iter()
            .map(Account::from)
            .collect();
        Ok(accounts)
    }

    /// Flips the admin flag of `id` on behalf of the admin `actor_id`.
    ///
    /// # Returns
    ///
    /// The updated `Account`, or [`AccountServiceError::SelfModification`] when
    /// `actor_id` and `id` are the same account.
    #[tracing::instrument(skip(self))]
    pub async fn toggle_admin(
        &self,
        actor_id: &str,
        id: &str,
    ) -> Result<Account, AccountServiceError> {
        if actor_id == id {
            return Err(AccountServiceError::SelfModification);
        }
        let model = self.find_model(id).await?;
        let is_admin = !model.is_admin;
        let mut active_model: account::ActiveModel = model.into();
        active_model.is_admin = ActiveValue::Set(is_admin);
        active_model.updated_at = ActiveValue::Set(Utc::now());
        Ok(Account::from(active_model.update(self.db).await?))
    }

    /// Flips the blocked flag of `id` on behalf of the admin `actor_id`.
    #[tracing::instrument(skip(self))]
    pub async fn toggle_blocked(
        &self,
        actor_id: &str,
        id: &str,
    ) -> Result<Account, AccountServiceError> {
        if actor_id == id {
            return Err(AccountServiceError::SelfModification);
        }
        let model = self.find_model(id).await?;
        let is_blocked = !model.is_blocked;
        let mut active_model: account::ActiveModel = model.into();
        active_model.is_blocked = ActiveValue::Set(is_blocked);
        active_model.updated_at = ActiveValue::Set(Utc::now());
        Ok(Account::from(active_model.update(self.db).await?))
    }

    /// Deletes an account together with all of its todos in one transaction.
    ///
    /// # Returns
    ///
    /// The deleted `Account` if successful, or an error otherwise.
    #[tracing::instrument(skip(self))]
    pub async fn delete_account(
        &self,
        actor_id: &str,
        id: &str,
    ) -> Result<Account, AccountServiceError> {
        if actor_id == id {
            return Err(AccountServiceError::SelfModification);
        }
        let model = self.find_model(id).await?;
        let deleted = Account::from(model.clone());

        let txn = self.db.begin().await?;
        let todos = todo::Entity::delete_many()
            .filter(todo::Column::OwnerId.eq(id))
            .exec(&txn)
            .await?;
        account::Entity::delete_by_id(model.id).exec(&txn).await?;
        txn.commit().await?;

        tracing::info!(
            "Deleted account {} and {} todos",
            deleted.id,
            todos.rows_affected
        );
        Ok(deleted)
    }

    /// Makes sure the configured bootstrap admin exists, can log in with the
    /// configured password and is neither demoted nor blocked.
    #[tracing::instrument(skip(self, password))]
    pub async fn ensure_admin(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Account, AccountServiceError> {
        let email = normalize_email(email)?;
        match self.find_by_email(&email).await? {
            Some(model) => {
                let mut active_model: account::ActiveModel = model.into();
                active_model.is_admin = ActiveValue::Set(true);
                active_model.is_blocked = ActiveValue::Set(false);
                active_model.password_hash = ActiveValue::Set(hash_password(password)?);
                active_model.updated_at = ActiveValue::Set(Utc::now());
                Ok(Account::from(active_model.update(self.db).await?))
            }
            None => {
                let created = self
                    .insert_account(email, hash_password(password)?, None, true)
                    .await?;
                tracing::info!("Created bootstrap admin {}", created.id);
                Ok(created)
            }
        }
    }

    async fn insert_account(
        &self,
        email: String,
        password_hash: String,
        full_name: Option<String>,
        is_admin: bool,
    ) -> Result<Account, AccountServiceError> {
        let now = Utc::now();
        let active_model = account::ActiveModel {
            id: ActiveValue::Set(uuid::Uuid::new_v4().to_string()),
            email: ActiveValue::Set(email),
            full_name: ActiveValue::Set(full_name),
            password_hash: ActiveValue::Set(password_hash),
            is_admin: ActiveValue::Set(is_admin),
            is_blocked: ActiveValue::Set(false),
            created_at: ActiveValue::Set(now),
            updated_at: ActiveValue::Set(now),
        };
        Ok(Account::from(active_model.insert(self.db).await?))
    }

    async fn find_model(&self, id: &str) -> Result<account::Model, AccountServiceError> {
        account::Entity::find_by_id(id.to_string())
            .one(self.db)
            .await?
            .ok_or_else(|| AccountServiceError::AccountNotFound(id.to_string()))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<account::Model>, DbErr> {
        account::Entity::find()
            .filter(account::Column::Email.eq(email))
            .one(self.db)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emails_are_trimmed_and_lowercased() {
        assert_eq!(
            normalize_email("  Ada@Example.COM ").unwrap(),
            "ada@example.com"
        );
    }

    #[test]
    fn rejects_malformed_emails() {
        for email in [
            "",
            "ada",
            "@example.com",
            "ada@.com",
            "a da@example.com",
            "ada@exa mple.com",
            "ada@@example.com",
        ] {
            assert!(
                matches!(normalize_email(email), Err(AccountServiceError::InvalidEmail)),
                "{email} should be rejected"
            );
        }
    }

    #[test]
    fn can_hash_and_verify_password() {
        let hash = hash_password("correct horse").unwrap();

        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong horse", &hash));
        assert!(!verify_password("correct horse", "not a hash"));
    }
}
