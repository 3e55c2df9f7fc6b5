//! Knowledge base and answering pipeline for the Mitra assistant.
//!
//! Documents are chunked, embedded and kept in a brute-force vector index.
//! Queries are answered from the knowledge base when retrieval is confident
//! enough, and by a generative model otherwise.

pub mod assistant;
pub mod audio;
pub mod chunker;
pub mod domain;
pub mod embeddings;
pub mod index;
pub mod ingest;
pub mod parser;
pub mod rag;
pub mod timeout;
pub mod types;
pub mod vector_index;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use assistant::{load_index, Assistant};
pub use audio::{AudioInput, Transcriber};
pub use index::MemoryIndex;
pub use ingest::Ingestor;
pub use types::{
    AnswerSource, ArbitrationDecision, AudioConfidenceResult, ChatResponse, Chunk, Document,
    IndexStats, IngestStats, ReasonCode, RetrievalCandidate, SourceRef,
};
pub use vector_index::{SharedIndex, VectorIndex};
