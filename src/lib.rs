pub mod cli;
pub mod config;
pub mod error;
pub mod generator;
pub mod i18n;
pub mod llm;
pub mod memory;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use error::{ResearchError, exit_code_of};
pub use generator::workflow::launch;
