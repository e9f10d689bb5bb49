//! Validation tokens: kinds, secrets, snapshots and the policy that drives
//! their state machine.
//!
//! ```text
//! Active --(wrong secret, attempts < max)--> Active
//! Active --(wrong secret, attempts == max)--> Locked
//! Active --(time passes expires_at)--------> Expired
//! Active --(secret matches / link used)----> Used
//! ```
//!
//! Locked, Expired and Used are terminal. Only an Expired, unused token may
//! be regenerated, and regeneration always mints a new validation id and
//! secret.

pub mod kind;
pub mod model;
pub mod policy;
pub mod secret;

pub use kind::{KindPolicy, SecretFormat, TokenKind, UnknownTokenKind};
pub use model::{NewToken, TokenState, ValidationToken};
