//! Command implementations for ssec

pub mod config;
pub mod listen;

pub use config::show_config;
pub use listen::listen;
