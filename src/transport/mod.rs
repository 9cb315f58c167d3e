pub mod factory;
pub mod line;
pub mod traits;

pub use factory::DefaultTransportFactory;
pub use line::LineTransport;
pub use traits::{Transport, TransportFactory};
