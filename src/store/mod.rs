//! Persistence and delivery collaborators.
//!
//! The request-processing core talks to storage and mail through these
//! traits only. `MemoryStore` is the in-process implementation used by the
//! binary and the test suite; a database-backed implementation plugs in
//! behind the same traits.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Alphabet used for token plaintexts (RFC 4648 base32, no padding).
pub const TOKEN_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// Purpose a token was issued for. Lookups are always scoped, so an
/// activation token can never authenticate a request and vice versa.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenScope {
    Authentication,
    Activation,
}

/// A registered account as seen by the middleware and handlers.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub activated: bool,
}

/// A catalog entry. `version` increments on every update and guards
/// concurrent edits.
#[derive(Debug, Clone, Serialize)]
pub struct Movie {
    pub id: i64,
    pub title: String,
    pub year: i32,
    pub runtime: i32,
    pub genres: Vec<String>,
    pub version: i32,
}

/// Field values for a movie that does not exist yet.
#[derive(Debug, Clone)]
pub struct MovieDraft {
    pub title: String,
    pub year: i32,
    pub runtime: i32,
    pub genres: Vec<String>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("edit conflict")]
    EditConflict,
    #[error("duplicate email")]
    DuplicateEmail,
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
#[error("mail delivery failed: {0}")]
pub struct MailError(pub String);

/// User, token, and permission operations needed by the middleware stack
/// and the account routes.
pub trait UserStore: Send + Sync {
    /// Resolve a token plaintext to its user, scoped to `scope`. A miss and
    /// an expired token are indistinguishable to callers.
    fn user_for_token(&self, scope: TokenScope, token: &str) -> Result<Option<User>, StoreError>;

    /// Permission codes granted to a user.
    fn permissions_for(&self, user_id: i64) -> Result<Vec<String>, StoreError>;

    /// Create a deactivated account. New accounts start with `movies:read`.
    fn register(&self, name: &str, email: &str, password: &str) -> Result<User, StoreError>;

    /// Consume an activation-scoped token, marking its user activated.
    /// All activation tokens for the user are invalidated on success.
    fn activate(&self, token: &str) -> Result<User, StoreError>;

    /// Verify credentials, returning the matching user if they are valid.
    fn authenticate(&self, email: &str, password: &str) -> Result<Option<User>, StoreError>;

    /// Issue a fresh token for the user in `scope`, valid for `ttl`.
    fn issue_token(
        &self,
        user_id: i64,
        scope: TokenScope,
        ttl: Duration,
    ) -> Result<String, StoreError>;
}

/// Catalog operations.
pub trait MovieStore: Send + Sync {
    fn insert(&self, draft: MovieDraft) -> Result<Movie, StoreError>;
    fn get(&self, id: i64) -> Result<Movie, StoreError>;
    fn list(&self) -> Result<Vec<Movie>, StoreError>;
    /// Apply an update; fails with `EditConflict` when the stored version
    /// no longer matches `movie.version`.
    fn update(&self, movie: Movie) -> Result<Movie, StoreError>;
    fn delete(&self, id: i64) -> Result<(), StoreError>;
}

/// Outbound mail. Message content and transport live outside this core.
pub trait Mailer: Send + Sync {
    fn send_welcome(&self, user: &User, activation_token: &str) -> Result<(), MailError>;
}

/// Mailer that records the send in the log and delivers nothing.
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send_welcome(&self, user: &User, _activation_token: &str) -> Result<(), MailError> {
        tracing::info!(user_id = user.id, email = %user.email, "sending welcome email");
        Ok(())
    }
}

struct UserRecord {
    user: User,
    password: String,
}

struct TokenRecord {
    user_id: i64,
    scope: TokenScope,
    expires_at: Instant,
}

#[derive(Default)]
struct StoreInner {
    users: HashMap<i64, UserRecord>,
    tokens: HashMap<String, TokenRecord>,
    permissions: HashMap<i64, Vec<String>>,
    movies: HashMap<i64, Movie>,
    next_user_id: i64,
    next_movie_id: i64,
}

/// In-memory store backing the binary and tests. Passwords are compared in
/// plaintext here; hashing belongs to a real persistence implementation.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<StoreInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test helper: create a user in a known state and return it together
    /// with a live authentication token.
    pub fn seed_user(
        &self,
        name: &str,
        email: &str,
        activated: bool,
        permissions: &[&str],
    ) -> (User, String) {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        inner.next_user_id += 1;
        let user = User {
            id: inner.next_user_id,
            name: name.to_string(),
            email: email.to_string(),
            activated,
        };
        inner.users.insert(
            user.id,
            UserRecord {
                user: user.clone(),
                password: "pa55word".to_string(),
            },
        );
        inner
            .permissions
            .insert(user.id, permissions.iter().map(|p| p.to_string()).collect());

        let token = generate_token();
        inner.tokens.insert(
            token.clone(),
            TokenRecord {
                user_id: user.id,
                scope: TokenScope::Authentication,
                expires_at: Instant::now() + Duration::from_secs(60 * 60),
            },
        );
        (user, token)
    }
}

impl UserStore for MemoryStore {
    fn user_for_token(&self, scope: TokenScope, token: &str) -> Result<Option<User>, StoreError> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        let record = match inner.tokens.get(token) {
            Some(r) if r.scope == scope && r.expires_at > Instant::now() => r,
            _ => return Ok(None),
        };
        Ok(inner.users.get(&record.user_id).map(|r| r.user.clone()))
    }

    fn permissions_for(&self, user_id: i64) -> Result<Vec<String>, StoreError> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        Ok(inner.permissions.get(&user_id).cloned().unwrap_or_default())
    }

    fn register(&self, name: &str, email: &str, password: &str) -> Result<User, StoreError> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        if inner.users.values().any(|r| r.user.email == email) {
            return Err(StoreError::DuplicateEmail);
        }
        inner.next_user_id += 1;
        let user = User {
            id: inner.next_user_id,
            name: name.to_string(),
            email: email.to_string(),
            activated: false,
        };
        inner.users.insert(
            user.id,
            UserRecord {
                user: user.clone(),
                password: password.to_string(),
            },
        );
        inner
            .permissions
            .insert(user.id, vec!["movies:read".to_string()]);
        Ok(user)
    }

    fn activate(&self, token: &str) -> Result<User, StoreError> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        let user_id = match inner.tokens.get(token) {
            Some(r) if r.scope == TokenScope::Activation && r.expires_at > Instant::now() => {
                r.user_id
            }
            _ => return Err(StoreError::NotFound),
        };
        let record = inner.users.get_mut(&user_id).ok_or(StoreError::NotFound)?;
        record.user.activated = true;
        let user = record.user.clone();
        inner
            .tokens
            .retain(|_, r| !(r.user_id == user_id && r.scope == TokenScope::Activation));
        Ok(user)
    }

    fn authenticate(&self, email: &str, password: &str) -> Result<Option<User>, StoreError> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        Ok(inner
            .users
            .values()
            .find(|r| r.user.email == email && r.password == password)
            .map(|r| r.user.clone()))
    }

    fn issue_token(
        &self,
        user_id: i64,
        scope: TokenScope,
        ttl: Duration,
    ) -> Result<String, StoreError> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        if !inner.users.contains_key(&user_id) {
            return Err(StoreError::NotFound);
        }
        let token = generate_token();
        inner.tokens.insert(
            token.clone(),
            TokenRecord {
                user_id,
                scope,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(token)
    }
}

impl MovieStore for MemoryStore {
    fn insert(&self, draft: MovieDraft) -> Result<Movie, StoreError> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        inner.next_movie_id += 1;
        let movie = Movie {
            id: inner.next_movie_id,
            title: draft.title,
            year: draft.year,
            runtime: draft.runtime,
            genres: draft.genres,
            version: 1,
        };
        inner.movies.insert(movie.id, movie.clone());
        Ok(movie)
    }

    fn get(&self, id: i64) -> Result<Movie, StoreError> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        inner.movies.get(&id).cloned().ok_or(StoreError::NotFound)
    }

    fn list(&self) -> Result<Vec<Movie>, StoreError> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        let mut movies: Vec<Movie> = inner.movies.values().cloned().collect();
        movies.sort_by_key(|m| m.id);
        Ok(movies)
    }

    fn update(&self, movie: Movie) -> Result<Movie, StoreError> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        let stored = inner.movies.get_mut(&movie.id).ok_or(StoreError::NotFound)?;
        if stored.version != movie.version {
            return Err(StoreError::EditConflict);
        }
        let next_version = stored.version + 1;
        *stored = Movie {
            version: next_version,
            ..movie
        };
        Ok(stored.clone())
    }

    fn delete(&self, id: i64) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        inner.movies.remove(&id).map(|_| ()).ok_or(StoreError::NotFound)
    }
}

/// Generate a 26-character base32 token plaintext from 128 random bits.
fn generate_token() -> String {
    let bytes = *Uuid::new_v4().as_bytes();
    let mut token = String::with_capacity(26);
    let mut buffer: u32 = 0;
    let mut bits = 0;
    for byte in bytes {
        buffer = (buffer << 8) | byte as u32;
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            token.push(TOKEN_ALPHABET[(buffer >> bits) as usize & 0x1f] as char);
        }
    }
    // 128 bits leave a 3-bit remainder, padded low to a final character
    token.push(TOKEN_ALPHABET[(buffer << (5 - bits)) as usize & 0x1f] as char);
    token
}
