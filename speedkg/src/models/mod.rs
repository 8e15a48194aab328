mod graph;
mod intent;
mod query;
mod response;
mod trace;
mod workflow;

pub use graph::*;
pub use intent::*;
pub use query::*;
pub use response::*;
pub use trace::*;
pub use workflow::*;
