//! Persistence for users and sessions.
//!
//! - **traits**: the `SessionStore` trait, row types and `DatabaseProvider`
//! - **turso**: the libsql implementation (in-memory, local SQLite file, or
//!   remote Turso with the `turso` feature)

#![allow(missing_docs)]

pub mod traits;
pub mod turso;

// Re-exports
pub use traits::{
    AnonymousSession, DatabaseProvider, NewSession, NewUser, Session, SessionStore, SessionTotals,
    User, VisitorBucket,
};
pub use turso::{DbConn, TursoClient};
