//! Retrieval-augmented answering.
//!
//! Retrieval, confidence arbitration, generative fallback and response
//! assembly. The arbiter and assembler are pure functions; the retriever
//! and fallback perform I/O.

pub mod arbiter;
pub mod assembler;
pub mod fallback;
pub mod retriever;

pub use arbiter::arbitrate;
pub use assembler::{assemble, FallbackOutput};
pub use fallback::{FallbackGenerator, LlmFallback};
pub use retriever::{normalize_query, Retriever};
