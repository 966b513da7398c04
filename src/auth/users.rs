use chrono::{SecondsFormat, Utc};
use rand::Rng;
use rusqlite::{params, OptionalExtension};

use crate::db::models::User;
use crate::state::DbPool;

#[derive(Debug, thiserror::Error)]
pub enum UserError {
    #[error("{0}")]
    Validation(&'static str),

    #[error("User with this email already exists")]
    DuplicateEmail,

    #[error("User not found")]
    NotFound,

    #[error("Password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),
}

/// Registration input.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password: String,
    pub name: String,
}

/// The one lookup the story lifecycle needs: resolve an owner id to a user.
pub trait UserDirectory: Send + Sync {
    fn get_by_id(&self, id: &str) -> Result<Option<User>, UserError>;
}

/// Persisted user accounts.
#[derive(Clone)]
pub struct UserStore {
    pool: DbPool,
    bcrypt_cost: u32,
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

/// Random 32-byte hex token identifying a user for bearer auth.
fn generate_api_token() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    hex::encode(bytes)
}

impl UserStore {
    pub fn new(pool: DbPool, bcrypt_cost: u32) -> Self {
        Self { pool, bcrypt_cost }
    }

    fn find_one(&self, column: &str, value: &str) -> Result<Option<User>, UserError> {
        let conn = self.pool.get()?;
        let sql = format!("SELECT {} FROM users WHERE {} = ?1", User::COLUMNS, column);
        let user = conn
            .query_row(&sql, params![value], User::from_row)
            .optional()?;
        Ok(user)
    }

    pub fn create_user(&self, new: NewUser) -> Result<User, UserError> {
        let email = normalize_email(&new.email);
        if email.is_empty() {
            return Err(UserError::Validation("Email is required"));
        }
        if new.password.is_empty() {
            return Err(UserError::Validation("Password is required"));
        }
        if self.get_by_email(&email)?.is_some() {
            return Err(UserError::DuplicateEmail);
        }

        let hash = bcrypt::hash(&new.password, self.bcrypt_cost)?;
        let id = uuid::Uuid::now_v7().to_string();
        let ts = now();

        let conn = self.pool.get()?;
        let inserted = conn.execute(
            "INSERT INTO users (id, email, password_hash, name, token, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![id, email, hash, new.name.trim(), generate_api_token(), ts],
        );
        match inserted {
            Ok(_) => {}
            // Lost a race with a concurrent registration of the same email
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                return Err(UserError::DuplicateEmail);
            }
            Err(e) => return Err(e.into()),
        }
        drop(conn);

        tracing::info!(user_id = %id, "Registered user");
        self.get_by_id(&id)?.ok_or(UserError::NotFound)
    }

    /// Check credentials. Unknown email, wrong password and inactive accounts
    /// all return `Ok(None)`.
    pub fn authenticate(&self, email: &str, password: &str) -> Result<Option<User>, UserError> {
        if email.trim().is_empty() {
            return Err(UserError::Validation("Email is required"));
        }
        if password.is_empty() {
            return Err(UserError::Validation("Password is required"));
        }

        let Some(user) = self.get_by_email(email)? else {
            return Ok(None);
        };
        if !user.is_active || !bcrypt::verify(password, &user.password_hash)? {
            return Ok(None);
        }

        let ts = now();
        let conn = self.pool.get()?;
        conn.execute(
            "UPDATE users SET last_login_at = ?1, updated_at = ?1 WHERE id = ?2",
            params![ts, user.id],
        )?;

        Ok(Some(User {
            last_login_at: Some(ts.clone()),
            updated_at: ts,
            ..user
        }))
    }

    pub fn set_password(&self, user_id: &str, password: &str) -> Result<(), UserError> {
        if password.is_empty() {
            return Err(UserError::Validation("Password is required"));
        }
        let hash = bcrypt::hash(password, self.bcrypt_cost)?;
        let conn = self.pool.get()?;
        let changed = conn.execute(
            "UPDATE users SET password_hash = ?1, updated_at = ?2 WHERE id = ?3",
            params![hash, now(), user_id],
        )?;
        if changed == 0 {
            return Err(UserError::NotFound);
        }
        Ok(())
    }

    pub fn get_by_id(&self, id: &str) -> Result<Option<User>, UserError> {
        self.find_one("id", id)
    }

    pub fn get_by_email(&self, email: &str) -> Result<Option<User>, UserError> {
        self.find_one("email", &normalize_email(email))
    }

    /// Active user owning the given API token.
    pub fn get_by_token(&self, token: &str) -> Result<Option<User>, UserError> {
        if token.is_empty() {
            return Ok(None);
        }
        Ok(self.find_one("token", token)?.filter(|u| u.is_active))
    }

    /// Store (or clear, with an empty string) the user's provider API key.
    pub fn update_api_key(&self, user_id: &str, api_key: &str) -> Result<User, UserError> {
        let conn = self.pool.get()?;
        let changed = conn.execute(
            "UPDATE users SET api_key = ?1, updated_at = ?2 WHERE id = ?3",
            params![api_key.trim(), now(), user_id],
        )?;
        drop(conn);
        if changed == 0 {
            return Err(UserError::NotFound);
        }
        self.get_by_id(user_id)?.ok_or(UserError::NotFound)
    }

    pub fn regenerate_token(&self, user_id: &str) -> Result<String, UserError> {
        let token = generate_api_token();
        let conn = self.pool.get()?;
        let changed = conn.execute(
            "UPDATE users SET token = ?1, updated_at = ?2 WHERE id = ?3",
            params![token, now(), user_id],
        )?;
        if changed == 0 {
            return Err(UserError::NotFound);
        }
        Ok(token)
    }
}

impl UserDirectory for UserStore {
    fn get_by_id(&self, id: &str) -> Result<Option<User>, UserError> {
        UserStore::get_by_id(self, id)
    }
}
