pub mod backends;
mod connection;
mod executor;
pub mod traits;

pub use backends::neo4j::Neo4jStore;
pub use connection::connect;
pub use executor::GraphExecutor;
pub use traits::*;
