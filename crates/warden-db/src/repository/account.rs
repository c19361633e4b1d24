//! SurrealDB implementation of [`AccountRepository`].
//!
//! Emails are stored normalized and guarded by a UNIQUE index; a
//! conflicting insert surfaces as `AccountExists`. Hashing happens in
//! the auth layer, so this repository only ever sees PHC strings.

use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;
use warden_core::error::WardenResult;
use warden_core::models::account::{Account, CreateAccount, Role, normalize_email};
use warden_core::repository::AccountRepository;

use crate::error::DbError;

/// DB-side row struct for queries where the UUID is already known.
#[derive(Debug, SurrealValue)]
struct AccountRow {
    email: String,
    password_hash: String,
    role: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// DB-side row struct that includes the record ID via `meta::id(id)`.
#[derive(Debug, SurrealValue)]
struct AccountRowWithId {
    record_id: String,
    email: String,
    password_hash: String,
    role: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn parse_role(s: &str) -> Result<Role, DbError> {
    s.parse::<Role>()
        .map_err(|e| DbError::Corrupt(e.to_string()))
}

impl AccountRow {
    fn into_account(self, id: Uuid) -> Result<Account, DbError> {
        Ok(Account {
            id,
            role: parse_role(&self.role)?,
            email: self.email,
            password_hash: self.password_hash,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl AccountRowWithId {
    fn try_into_account(self) -> Result<Account, DbError> {
        let id = Uuid::parse_str(&self.record_id)
            .map_err(|e| DbError::Corrupt(format!("invalid account UUID: {e}")))?;
        Ok(Account {
            id,
            role: parse_role(&self.role)?,
            email: self.email,
            password_hash: self.password_hash,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn is_email_conflict(message: &str) -> bool {
    message.contains("idx_account_email")
}

const SELECT_ACCOUNT: &str = "SELECT meta::id(id) AS record_id, * FROM account";

/// SurrealDB implementation of the account repository.
#[derive(Clone)]
pub struct SurrealAccountRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealAccountRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    async fn fetch(
        &self,
        query: &str,
        binds: Vec<(&'static str, String)>,
    ) -> Result<Vec<Account>, DbError> {
        let mut builder = self.db.query(query);
        for bind in binds {
            builder = builder.bind(bind);
        }
        let mut result = builder.await?;
        let rows: Vec<AccountRowWithId> = result.take(0)?;
        rows.into_iter()
            .map(AccountRowWithId::try_into_account)
            .collect()
    }
}

impl<C: Connection> AccountRepository for SurrealAccountRepository<C> {
    async fn create(&self, input: CreateAccount) -> WardenResult<Account> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "CREATE type::record('account', $id) SET \
                 email = $email, password_hash = $password_hash, \
                 role = $role",
            )
            .bind(("id", id_str.clone()))
            .bind(("email", normalize_email(&input.email)))
            .bind(("password_hash", input.password_hash))
            .bind(("role", input.role.as_str().to_string()))
            .await
            .map_err(DbError::from)?;

        let mut result = result.check().map_err(|e| {
            let message = e.to_string();
            if is_email_conflict(&message) {
                DbError::Duplicate("account.email")
            } else {
                DbError::Query(message)
            }
        })?;

        let rows: Vec<AccountRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "account".into(),
            id: id_str,
        })?;

        Ok(row.into_account(id)?)
    }

    async fn get_by_id(&self, id: Uuid) -> WardenResult<Account> {
        let id_str = id.to_string();
        let mut result = self
            .db
            .query("SELECT * FROM type::record('account', $id)")
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<AccountRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "account".into(),
            id: id_str,
        })?;

        Ok(row.into_account(id)?)
    }

    async fn find_by_email(&self, email: &str) -> WardenResult<Option<Account>> {
        let accounts = self
            .fetch(
                &format!("{SELECT_ACCOUNT} WHERE email = $email LIMIT 1"),
                vec![("email", normalize_email(email))],
            )
            .await?;
        Ok(accounts.into_iter().next())
    }

    async fn update_password_hash(&self, id: Uuid, password_hash: String) -> WardenResult<()> {
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "UPDATE type::record('account', $id) SET \
                 password_hash = $password_hash, updated_at = time::now()",
            )
            .bind(("id", id_str.clone()))
            .bind(("password_hash", password_hash))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;
        let rows: Vec<AccountRow> = result.take(0).map_err(DbError::from)?;
        if rows.is_empty() {
            return Err(DbError::NotFound {
                entity: "account".into(),
                id: id_str,
            }
            .into());
        }
        Ok(())
    }

    async fn list_all(&self) -> WardenResult<Vec<Account>> {
        Ok(self
            .fetch(&format!("{SELECT_ACCOUNT} ORDER BY created_at ASC"), vec![])
            .await?)
    }

    async fn list_by_role(&self, role: Role) -> WardenResult<Vec<Account>> {
        Ok(self
            .fetch(
                &format!("{SELECT_ACCOUNT} WHERE role = $role ORDER BY created_at ASC"),
                vec![("role", role.as_str().to_string())],
            )
            .await?)
    }
}
