//! First-stage retrieval: lexical, semantic, and their rank fusion.

pub mod hybrid;
pub mod semantic;
pub mod text_search;

pub use hybrid::{weighted_rank_fusion, FusedResult, HybridSource};
pub use semantic::SemanticRetriever;
pub use text_search::{LexicalIndexError, LexicalRetriever};
