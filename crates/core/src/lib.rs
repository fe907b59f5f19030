pub mod config;
pub mod error;
pub mod reading;
pub mod scope;

pub use config::Config;
pub use error::*;
pub use reading::*;
pub use scope::*;
