//! Remembered trust decisions.
//!
//! One entry records the decisions taken for a (documentbase, codebase,
//! archives) region. Entries persist as single whitespace-separated lines:
//!
//! ```text
//! <actions> <timestamp-millis> <documentbase-pattern> <codebase-pattern> [<archives>]
//! ```
//!
//! The archives field is a comma-separated list of codebase-relative
//! paths; it is absent for entries remembered for a whole codebase, and
//! `-` for an application that had no archives at all. URL patterns are
//! percent-encoded before quoting, so no field ever contains whitespace.

use std::collections::HashSet;

use chrono::{DateTime, TimeZone, Utc};
use thiserror::Error;

use super::action::{ActionId, ActionParseError, ActionSet};
use super::pattern::{PatternError, UrlRegex};

/// Marker persisted for an empty (but exact-match) archive list.
const EMPTY_ARCHIVES: &str = "-";

/// Error raised when a persisted line cannot be decoded as an entry.
///
/// The store treats any of these as "this line is not ours": the line is
/// preserved verbatim and skipped for matching, never dropped and never
/// fatal to the rest of the file.
#[derive(Debug, Error)]
pub enum EntryParseError {
    /// The line had fewer fields than the format requires.
    #[error("expected at least 4 fields, found {found}")]
    MissingFields {
        /// Number of whitespace-separated fields present.
        found: usize,
    },

    /// The line had more fields than the format allows.
    #[error("expected at most 5 fields, found {found}")]
    TrailingFields {
        /// Number of whitespace-separated fields present.
        found: usize,
    },

    /// The action field did not decode.
    #[error("invalid action field: {0}")]
    Actions(#[from] ActionParseError),

    /// The timestamp field was not a valid epoch-milliseconds value.
    #[error("invalid timestamp field {field:?}")]
    Timestamp {
        /// The offending field text.
        field: String,
    },

    /// A URL pattern field did not compile.
    #[error(transparent)]
    Pattern(#[from] PatternError),
}

/// A remembered decision for a codebase/documentbase region.
#[derive(Debug, Clone, PartialEq)]
pub struct AppletActionEntry {
    /// Decisions recorded for this region, keyed by action id.
    pub actions: ActionSet,
    /// When this entry was last created or updated.
    pub timestamp: DateTime<Utc>,
    /// Pattern the query documentbase must match.
    pub document_base: UrlRegex,
    /// Pattern the query codebase must match.
    pub code_base: UrlRegex,
    /// Exact codebase-relative archive list, or `None` to match any
    /// archive set (entry remembered for the whole codebase).
    pub archives: Option<Vec<String>>,
}

impl AppletActionEntry {
    /// Creates an entry stamped with the given time.
    #[must_use]
    pub fn new(
        actions: ActionSet,
        timestamp: DateTime<Utc>,
        document_base: UrlRegex,
        code_base: UrlRegex,
        archives: Option<Vec<String>>,
    ) -> Self {
        Self {
            actions,
            timestamp,
            document_base,
            code_base,
            archives,
        }
    }

    /// Whether this entry matches a queried application.
    ///
    /// Both URLs must match their patterns; the archive comparison is an
    /// unordered set equality against the stored relative paths, unless
    /// the entry was remembered codebase-wide (`archives == None`), which
    /// matches any archive list.
    #[must_use]
    pub fn matches(&self, document_base: &str, code_base: &str, archives: &[String]) -> bool {
        if !self.document_base.matches(document_base) || !self.code_base.matches(code_base) {
            return false;
        }
        match &self.archives {
            None => true,
            Some(stored) => {
                let stored: HashSet<&str> = stored.iter().map(String::as_str).collect();
                let queried: HashSet<&str> = archives.iter().map(String::as_str).collect();
                stored == queried
            }
        }
    }

    /// Whether this entry records a decision for `id` and matches the
    /// queried application.
    #[must_use]
    pub fn matches_action(
        &self,
        document_base: &str,
        code_base: &str,
        archives: &[String],
        id: ActionId,
    ) -> bool {
        self.actions.action(id).is_some() && self.matches(document_base, code_base, archives)
    }

    /// Encodes this entry as its persisted line.
    #[must_use]
    pub fn to_line(&self) -> String {
        let mut line = format!(
            "{} {} {} {}",
            self.actions.encode(),
            self.timestamp.timestamp_millis(),
            self.document_base.source(),
            self.code_base.source(),
        );
        if let Some(archives) = &self.archives {
            line.push(' ');
            if archives.is_empty() {
                line.push_str(EMPTY_ARCHIVES);
            } else {
                line.push_str(&archives.join(","));
            }
        }
        line
    }

    /// Decodes a persisted line.
    ///
    /// # Errors
    ///
    /// Returns an error when the line does not follow the entry format;
    /// the store keeps such lines as opaque records.
    pub fn parse_line(line: &str) -> Result<Self, EntryParseError> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 4 {
            return Err(EntryParseError::MissingFields {
                found: fields.len(),
            });
        }
        if fields.len() > 5 {
            return Err(EntryParseError::TrailingFields {
                found: fields.len(),
            });
        }

        let actions = ActionSet::parse(fields[0])?;
        let millis: i64 = fields[1]
            .parse()
            .map_err(|_| EntryParseError::Timestamp {
                field: fields[1].to_owned(),
            })?;
        let timestamp =
            Utc.timestamp_millis_opt(millis)
                .single()
                .ok_or_else(|| EntryParseError::Timestamp {
                    field: fields[1].to_owned(),
                })?;
        let document_base = UrlRegex::from_source(fields[2])?;
        let code_base = UrlRegex::from_source(fields[3])?;
        let archives = fields.get(4).map(|field| {
            if *field == EMPTY_ARCHIVES {
                Vec::new()
            } else {
                field.split(',').map(str::to_owned).collect()
            }
        });

        Ok(Self {
            actions,
            timestamp,
            document_base,
            code_base,
            archives,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::action::ExecuteAction;
    use super::*;

    fn entry(archives: Option<Vec<&str>>) -> AppletActionEntry {
        AppletActionEntry::new(
            ActionSet::from_action(ActionId::UnsignedApplet, ExecuteAction::Always),
            Utc.timestamp_millis_opt(1_500_000_000_000)
                .single()
                .expect("valid timestamp"),
            UrlRegex::quote_and_star("http://example.com/app/"),
            UrlRegex::quote("http://example.com/app/"),
            archives.map(|a| a.into_iter().map(str::to_owned).collect()),
        )
    }

    #[test]
    fn broad_entry_matches_any_archive_list() {
        let entry = entry(None);
        let doc = "http://example.com/app/page.html";
        let code = "http://example.com/app/";
        assert!(entry.matches(doc, code, &[]));
        assert!(entry.matches(doc, code, &["main.jar".to_owned()]));
        assert!(entry.matches(doc, code, &["a.jar".to_owned(), "b.jar".to_owned()]));
    }

    #[test]
    fn narrow_entry_requires_exact_archive_set() {
        let entry = entry(Some(vec!["main.jar", "lib/util.jar"]));
        let doc = "http://example.com/app/page.html";
        let code = "http://example.com/app/";

        // Order does not matter.
        assert!(entry.matches(
            doc,
            code,
            &["lib/util.jar".to_owned(), "main.jar".to_owned()]
        ));
        // One archive different: no match.
        assert!(!entry.matches(
            doc,
            code,
            &["main.jar".to_owned(), "lib/other.jar".to_owned()]
        ));
        // Subset: no match.
        assert!(!entry.matches(doc, code, &["main.jar".to_owned()]));
        // Superset: no match.
        assert!(!entry.matches(
            doc,
            code,
            &[
                "main.jar".to_owned(),
                "lib/util.jar".to_owned(),
                "extra.jar".to_owned()
            ]
        ));
    }

    #[test]
    fn mismatched_codebase_never_matches() {
        let entry = entry(None);
        assert!(!entry.matches(
            "http://example.com/app/page.html",
            "http://evil.example.org/app/",
            &[]
        ));
    }

    #[test]
    fn matches_action_requires_a_recorded_decision() {
        let entry = entry(None);
        let doc = "http://example.com/app/page.html";
        let code = "http://example.com/app/";
        assert!(entry.matches_action(doc, code, &[], ActionId::UnsignedApplet));
        assert!(!entry.matches_action(doc, code, &[], ActionId::AllowableCodebase));
    }

    #[test]
    fn line_round_trip_broad() {
        let original = entry(None);
        let reloaded =
            AppletActionEntry::parse_line(&original.to_line()).expect("line must parse");
        assert_eq!(original, reloaded);
        assert!(reloaded.matches(
            "http://example.com/app/other.html",
            "http://example.com/app/",
            &["anything.jar".to_owned()]
        ));
    }

    #[test]
    fn line_round_trip_narrow() {
        let original = entry(Some(vec!["main.jar", "lib/util.jar"]));
        let reloaded =
            AppletActionEntry::parse_line(&original.to_line()).expect("line must parse");
        assert_eq!(original, reloaded);
    }

    #[test]
    fn line_round_trip_empty_archives() {
        let original = entry(Some(vec![]));
        let line = original.to_line();
        assert!(line.ends_with(" -"));
        let reloaded = AppletActionEntry::parse_line(&line).expect("line must parse");
        assert_eq!(reloaded.archives, Some(Vec::new()));
        // Exact-empty matches only an empty archive list.
        assert!(reloaded.matches(
            "http://example.com/app/page.html",
            "http://example.com/app/",
            &[]
        ));
        assert!(!reloaded.matches(
            "http://example.com/app/page.html",
            "http://example.com/app/",
            &["main.jar".to_owned()]
        ));
    }

    #[test]
    fn parse_rejects_malformed_lines() {
        assert!(AppletActionEntry::parse_line("").is_err());
        assert!(AppletActionEntry::parse_line("# a comment line").is_err());
        assert!(AppletActionEntry::parse_line("A 123").is_err());
        assert!(AppletActionEntry::parse_line("A notatime p1 p2").is_err());
        assert!(AppletActionEntry::parse_line("Z 123 p1 p2").is_err());
        assert!(AppletActionEntry::parse_line("A 123 (bad p2").is_err());
        assert!(AppletActionEntry::parse_line("A 123 p1 p2 a.jar extra").is_err());
    }
}
