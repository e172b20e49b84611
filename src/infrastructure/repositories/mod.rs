//! Repository Implementations
//!
//! PostgreSQL implementations of domain repository traits.
//!
//! ## Usage Example
//!
//! ```rust,ignore
//! use sqlx::PgPool;
//! use tinychat::infrastructure::repositories::PgUserRepository;
//!
//! fn setup(pool: PgPool) -> PgUserRepository {
//!     PgUserRepository::new(pool)
//! }
//! ```

pub mod user_repository;

pub use user_repository::PgUserRepository;
