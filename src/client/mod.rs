//! Storage-less query side: loads the published index and answers queries
//! with targeted range reads.

pub mod loader;
pub mod query;
pub mod similarity;

pub use loader::IndexLoader;
pub use query::{ClientOptions, Lookup, MissReason, QueryClient, Suggestion};
pub use similarity::{HttpSimilarityService, SimilarityHit, SimilarityRequest, SimilarityService};
