//! Keyword-based domain guard.
//!
//! Disabled when no keywords are configured. Multi-word keywords also
//! contribute their individual words.

use mitra_core::{AppError, AppResult};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Default)]
pub struct DomainGuard {
    phrases: BTreeSet<String>,
    words: BTreeSet<String>,
}

impl DomainGuard {
    pub fn new(keywords: &[String]) -> Self {
        let mut guard = Self::default();
        for keyword in keywords {
            let keyword = keyword.trim().to_lowercase();
            if keyword.is_empty() {
                continue;
            }
            for word in keyword.split_whitespace() {
                guard.words.insert(word.to_string());
            }
            if keyword.contains(char::is_whitespace) {
                guard.phrases.insert(keyword);
            }
        }
        guard
    }

    pub fn is_enabled(&self) -> bool {
        !self.words.is_empty()
    }

    /// Whether `query` mentions any keyword. Always true when disabled.
    pub fn is_relevant(&self, query: &str) -> bool {
        if !self.is_enabled() {
            return true;
        }

        let lower = query.to_lowercase();
        if self.phrases.iter().any(|p| lower.contains(p.as_str())) {
            return true;
        }

        lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|token| !token.is_empty())
            .any(|token| self.words.iter().any(|w| token.contains(w.as_str())))
    }

    /// Fail with `OutOfDomain` when the query mentions no keyword.
    pub fn check(&self, query: &str) -> AppResult<()> {
        if self.is_relevant(query) {
            Ok(())
        } else {
            tracing::info!("Query rejected by domain guard");
            Err(AppError::OutOfDomain(
                "I can only help with questions about Aadhaar services.".to_string(),
            ))
        }
    }
}
