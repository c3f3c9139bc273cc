//! Common utilities and shared types for favisend.
//!
//! This crate provides foundational components used across all favisend crates:
//!
//! - **Configuration**: Application settings via [`Config`]
//! - **Error handling**: Unified error types via [`AppError`] and [`AppResult`]
//! - **ID Generation**: monotonic ULID identifiers via [`IdGenerator`]
//! - **Share tokens**: URL-safe public tokens via [`generate_share_token`]
//!
//! # Example
//!
//! ```no_run
//! use favisend_common::{Config, IdGenerator, AppResult};
//!
//! fn example() -> AppResult<()> {
//!     let config = Config::load()?;
//!     let id_gen = IdGenerator::new();
//!     let id = id_gen.generate();
//!     let token = id_gen.generate_share_token(config.ledger.effective_share_token_length());
//!     println!("Generated ID {id} with share token {token}");
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod id;

pub use config::{Config, DatabaseConfig, LedgerBackend, LedgerConfig, LoggingConfig};
pub use error::{AppError, AppResult};
pub use id::{
    DEFAULT_SHARE_TOKEN_LENGTH, IdGenerator, MAX_SHARE_TOKEN_LENGTH, MIN_SHARE_TOKEN_LENGTH,
    generate_share_token,
};
