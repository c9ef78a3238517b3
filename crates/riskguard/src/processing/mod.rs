pub mod chunker;

pub use chunker::{header_key, ChunkResult, MarkdownHeaderSplitter};
