pub mod adapter;
pub mod bridge;
pub mod simulated;

pub use adapter::{BrokerGateway, QueryError};
