pub mod citations;
pub mod classifier;
pub mod context;
pub mod expander;
pub mod generator;
pub mod reasoner;
pub mod validator;

pub use citations::extract_citations;
pub use classifier::{parse_classification, IntentClassifier};
pub use context::ContextSerializer;
pub use expander::{enforce_bounds, extract_seeds, RetrievalStrategy, SubgraphExpander};
pub use generator::{strip_code_fences, QueryGenerator};
pub use reasoner::{ReasonedAnswer, Reasoner};
pub use validator::{QueryValidator, ValidationError, DENY_LIST};
