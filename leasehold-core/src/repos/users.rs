//! User repository
//!
//! - create: single INSERT, duplicate email surfaces as `AlreadyExists`
//! - update_profile: only name and phone are mutable

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use super::decode;
use crate::db::{QueryExecutor, SqlValue, Statement};
use crate::error::{Error, Result};
use crate::models::{new_id, NewUser, ProfileUpdate, User};

const USER_COLUMNS: &str = "id, email, role, name, phone, created_at, updated_at";

#[derive(Debug, FromRow)]
struct UserRow {
    id: String,
    email: String,
    role: String,
    name: String,
    phone: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = Error;

    fn try_from(row: UserRow) -> Result<Self> {
        Ok(Self {
            role: row.role.parse()?,
            id: row.id,
            email: row.email,
            name: row.name,
            phone: row.phone,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// User repository
pub struct UserRepo<'a> {
    exec: &'a QueryExecutor,
}

impl<'a> UserRepo<'a> {
    pub fn new(exec: &'a QueryExecutor) -> Self {
        Self { exec }
    }

    /// Insert a user with a freshly minted id.
    pub async fn create(&self, new: NewUser) -> Result<User> {
        let email = new.email.trim().to_owned();
        if email.is_empty() {
            return Err(Error::validation("email", "must not be empty"));
        }
        if new.name.trim().is_empty() {
            return Err(Error::validation("name", "must not be empty"));
        }

        let now = Utc::now();
        let user = User {
            id: new_id(),
            email,
            role: new.role,
            name: new.name,
            phone: new.phone,
            created_at: now,
            updated_at: now,
        };

        let stmt = Statement::new(
            "INSERT INTO users (id, email, role, name, phone, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&user.id)
        .bind(&user.email)
        .bind(user.role.as_str())
        .bind(&user.name)
        .bind(user.phone.clone())
        .bind(now)
        .bind(now);

        self.exec
            .execute(&stmt)
            .await
            .map_err(|e| e.on_write("user", &user.email))?;
        Ok(user)
    }

    pub async fn get(&self, id: &str) -> Result<User> {
        let stmt = Statement::new(format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?")).bind(id);
        let row = self
            .exec
            .fetch_optional(&stmt)
            .await?
            .ok_or_else(|| Error::not_found("user", id))?;
        decode::<UserRow, User>(&row)
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let stmt = Statement::new(format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?"))
            .bind(email.trim());
        self.exec
            .fetch_optional(&stmt)
            .await?
            .map(|row| decode::<UserRow, User>(&row))
            .transpose()
    }

    /// Apply a profile change and return the updated user.
    ///
    /// Email and role are never touched here.
    pub async fn update_profile(&self, id: &str, update: ProfileUpdate) -> Result<User> {
        let mut assignments = Vec::new();
        let mut params: Vec<SqlValue> = Vec::new();

        if let Some(name) = update.name {
            if name.trim().is_empty() {
                return Err(Error::validation("name", "must not be empty"));
            }
            assignments.push("name = ?");
            params.push(name.into());
        }
        if let Some(phone) = update.phone {
            assignments.push("phone = ?");
            params.push(phone.into());
        }
        assignments.push("updated_at = ?");
        params.push(Utc::now().into());
        params.push(id.into());

        let stmt = Statement::new(format!(
            "UPDATE users SET {} WHERE id = ?",
            assignments.join(", ")
        ))
        .bind_all(params);

        let affected = self
            .exec
            .execute(&stmt)
            .await
            .map_err(|e| e.on_write("user", id))?;
        if affected == 0 {
            return Err(Error::not_found("user", id));
        }
        self.get(id).await
    }
}
