pub mod errors;
pub mod tracing;

pub use errors::{GatewayError, GatewayResult};
pub use self::tracing::init_tracing;
