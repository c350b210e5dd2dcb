pub mod agent;
pub mod config;
pub mod director;
pub mod error;
pub mod providers;
pub mod router;
pub mod types;
pub mod writer;

pub use config::Config;
pub use error::Error;
pub use types::*;
