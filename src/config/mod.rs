pub mod loader;
pub mod types;
pub mod validation;

pub use loader::{ConfigFormat, ConfigLoader};
pub use types::*;
pub use validation::ConfigValidator;
