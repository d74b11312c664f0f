//! Local accounts: bcrypt password hashes and opaque session tokens.

use feedline_shared::service::{AuthSession, AuthUser};
use feedline_shared::types::UserId;
use rusqlite::params;

use crate::database::{now, parse_uuid, ts, Database};
use crate::error::{map_read_err, map_write_err, Result, StoreError};

/// bcrypt cost for local accounts.
const PASSWORD_COST: u32 = 8;

/// Minimum password length, matching the hosted auth service.
const MIN_PASSWORD_LEN: usize = 6;

impl Database {
    pub fn register_user(&self, email: &str, password: &str) -> Result<AuthSession> {
        let email = normalize_email(email)?;
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(StoreError::Auth(format!(
                "Password should be at least {MIN_PASSWORD_LEN} characters"
            )));
        }

        let id = UserId::new();
        let hash = bcrypt::hash(password, PASSWORD_COST)?;

        self.conn()?
            .execute(
                "INSERT INTO users (id, email, password_hash, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![id.to_string(), email, hash, ts(&now())],
            )
            .map_err(|e| match map_write_err(e) {
                StoreError::Conflict(_) => StoreError::Auth("User already registered".into()),
                other => other,
            })?;

        tracing::info!(user_id = %id, "local user registered");

        self.open_session(AuthUser {
            id,
            email: Some(email),
        })
    }

    pub fn login(&self, email: &str, password: &str) -> Result<AuthSession> {
        let email = normalize_email(email)?;

        let found = self
            .conn()?
            .query_row(
                "SELECT id, email, password_hash FROM users WHERE email = ?1",
                params![email],
                |row| {
                    let id: String = row.get(0)?;
                    let email: String = row.get(1)?;
                    let hash: String = row.get(2)?;
                    Ok((UserId(parse_uuid(0, &id)?), email, hash))
                },
            )
            .map_err(map_read_err);

        let (id, stored_email, hash) = match found {
            Ok(row) => row,
            Err(StoreError::NotFound) => {
                return Err(StoreError::Auth("Invalid login credentials".into()))
            }
            Err(e) => return Err(e),
        };

        if !bcrypt::verify(password, &hash)? {
            return Err(StoreError::Auth("Invalid login credentials".into()));
        }

        self.open_session(AuthUser {
            id,
            email: Some(stored_email),
        })
    }

    /// Revoke a session token. Unknown tokens are ignored.
    pub fn logout(&self, access_token: &str) -> Result<()> {
        self.conn()?.execute(
            "DELETE FROM auth_sessions WHERE token = ?1",
            params![access_token],
        )?;
        Ok(())
    }

    /// Resolve a session token back to its user.
    pub fn session_user(&self, access_token: &str) -> Result<UserId> {
        self.conn()?
            .query_row(
                "SELECT user_id FROM auth_sessions WHERE token = ?1",
                params![access_token],
                |row| {
                    let id: String = row.get(0)?;
                    Ok(UserId(parse_uuid(0, &id)?))
                },
            )
            .map_err(map_read_err)
    }

    fn open_session(&self, user: AuthUser) -> Result<AuthSession> {
        let token = hex::encode(rand::random::<[u8; 32]>());

        self.conn()?.execute(
            "INSERT INTO auth_sessions (token, user_id, created_at) VALUES (?1, ?2, ?3)",
            params![token, user.id.to_string(), ts(&now())],
        )?;

        Ok(AuthSession {
            user,
            access_token: token,
        })
    }
}

fn normalize_email(email: &str) -> Result<String> {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(email.to_string()),
        _ => Err(StoreError::Auth("Unable to validate email address".into())),
    }
}
