//! Repository functions, one function per database operation.
//!
//! Every function takes a `&DbPool` (or a connection inside a caller's
//! transaction) and returns a `Result<T, DbError>`.
//! No business logic, no domain types, pure SQL.

pub mod admins;
pub mod teams;
pub mod members;
pub mod user_roles;
pub mod updates;
pub mod outbox;
