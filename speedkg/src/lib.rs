//! Natural-language question answering over the SPEED/CAMEO event graph.
//!
//! A question is classified into an [`models::Intent`], translated into a
//! read-only Cypher query, executed against Neo4j, expanded into a bounded
//! subgraph and answered by a language model with event-id citations. See
//! [`services::Pipeline`] for the orchestration entry point.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod intelligence;
pub mod llm;
pub mod models;
pub mod services;
