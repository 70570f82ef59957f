//! High-level database API.
//!
//! [`Database::open`] turns an [`EngineConfig`] into one [`DataSource`] per
//! configured name and registers them with a shared transaction manager.

mod api;
mod config;
mod source;

pub use api::{Database, DatabaseError, DatabaseResult};
pub use config::{ConfigError, ConfigResult, DataSourceConfig, EngineConfig};
pub use source::{DataSource, Session};
