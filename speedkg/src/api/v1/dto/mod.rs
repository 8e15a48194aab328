mod query;

pub use query::QueryRequest;
