//! Retrieval-augmented generation: query rewriting, the hybrid pipeline, and answer evaluation.

pub mod eval;
pub mod pipeline;
pub mod query_rewriter;
pub mod structured_output;

pub use eval::{CaseOutcome, EvalCase, EvalReport, Evaluator, JudgeScores, JudgedCase, UnparsedCase};
pub use pipeline::{RetrievalPipeline, RetrievalStage, SearchTrace};
pub use query_rewriter::QueryRewriter;
pub use structured_output::{first_json_object, parse_first};
