//! # passgate
//!
//! Single-use validation tokens and signed credential issuance for
//! passwordless-leaning authentication.
//!
//! A validation token is a typed, expiring, attempt-limited secret that
//! gates one user action: confirming an email address, completing a login
//! from a mailed link, or resetting a password. Tokens live in a
//! [`store::TokenStore`]; every mutation is an atomic compare-and-update, so
//! concurrent requests cannot push a token past its attempt ceiling or use
//! it twice.
//!
//! ## Core Modules
//!
//! - [`token`]: Token kinds, the per-kind policy table, and the state machine
//! - [`store`]: Token persistence (PostgreSQL and in-memory)
//! - [`credentials`]: Access / refresh JWT issuance and rotation
//! - [`auth`]: The registration, login and password-reset flows
//! - [`mail`]: Mail rendering and the transport seam
//! - [`users`]: The account collaborator
//!
//! ## Example
//!
//! ```
//! use passgate::token::{TokenKind, TokenState};
//!
//! let policy = TokenKind::LoginVerification.policy();
//! assert_eq!(policy.max_attempts, 5);
//! assert!(TokenState::Used.is_terminal());
//! ```

pub mod auth;
pub mod clock;
pub mod context;
pub mod credentials;
pub mod db;
pub mod mail;
pub mod store;
pub mod token;
pub mod users;

pub use auth::{AuthError, AuthManager, AuthResult};
pub use clock::{Clock, ManualClock, SystemClock};
pub use context::ClientContext;
pub use token::{TokenKind, TokenState, ValidationToken};
