//! URL pattern matching for remembered decisions.
//!
//! A stored entry carries two patterns, one for the documentbase and one
//! for the codebase. Each is either an exact quote of a normalized URL or
//! a quoted prefix followed by a wildcard; the literal pattern source is
//! what lands in the store file, so it is kept alongside the compiled
//! form.

use regex::Regex;
use thiserror::Error;

/// Error raised when a pattern source cannot be compiled.
#[derive(Debug, Error)]
#[error("invalid URL pattern {source_text:?}: {reason}")]
pub struct PatternError {
    /// The pattern source that failed to compile.
    pub source_text: String,
    /// The underlying regex error, rendered.
    pub reason: String,
}

/// A regex-capable URL matcher plus its literal source string.
#[derive(Debug, Clone)]
pub struct UrlRegex {
    source: String,
    compiled: Regex,
}

impl UrlRegex {
    /// Builds an exact-match pattern: it matches the quoted URL and
    /// nothing else.
    #[must_use]
    pub fn quote(url: &str) -> Self {
        let source = regex::escape(url);
        Self::from_source(&source).unwrap_or_else(|_| {
            // regex::escape output is always a valid literal pattern.
            unreachable!("escaped literal failed to compile")
        })
    }

    /// Builds a prefix-match pattern: the quoted prefix followed by `.*`,
    /// matching any sub-path or query beneath that root.
    #[must_use]
    pub fn quote_and_star(prefix: &str) -> Self {
        let source = format!("{}.*", regex::escape(prefix));
        Self::from_source(&source).unwrap_or_else(|_| {
            unreachable!("escaped prefix pattern failed to compile")
        })
    }

    /// Compiles a raw pattern source, as read back from the store file.
    ///
    /// # Errors
    ///
    /// Returns an error if the source is not a valid pattern; the caller
    /// treats the containing record as opaque.
    pub fn from_source(source: &str) -> Result<Self, PatternError> {
        // Anchor at compile time: matching is whole-string, but the
        // persisted source stays unanchored and human-editable.
        let compiled = Regex::new(&format!("^(?:{source})$")).map_err(|err| PatternError {
            source_text: source.to_owned(),
            reason: err.to_string(),
        })?;
        Ok(Self {
            source: source.to_owned(),
            compiled,
        })
    }

    /// The literal pattern source, as persisted.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Whole-string match against a normalized URL.
    #[must_use]
    pub fn matches(&self, url: &str) -> bool {
        self.compiled.is_match(url)
    }
}

impl PartialEq for UrlRegex {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for UrlRegex {}
