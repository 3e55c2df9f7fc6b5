//! Cross-component tests with deterministic fakes.


mod ingestion;
