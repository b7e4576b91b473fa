//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → MonteConfig (validated, immutable)
//!     → sections cloned into Server, Client and each Conn
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Zero or absent values resolve through `effective_*`-style accessors
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::ClientConfig;
pub use schema::ConnectionConfig;
pub use schema::MonteConfig;
pub use schema::ObservabilityConfig;
pub use schema::ServerConfig;
