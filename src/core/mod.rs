/*!
 * Core Module
 * Fundamental channel types, configuration and error handling
 */

pub mod config;
pub mod errors;
pub mod limits;
pub mod sync;
pub mod types;

// Re-export for convenience
pub use config::ChannelConfig;
pub use errors::*;
pub use types::*;
