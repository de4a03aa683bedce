//! URL normalization for trust matching.
//!
//! Stored patterns and live queries must be normalized through the exact
//! same pipeline before they are compared; an asymmetry silently turns a
//! remembered decision into a non-match and forces a re-prompt. The
//! functions here are that single pipeline: query/fragment stripping,
//! canonical percent-encoded form, parent-directory truncation for broad
//! ("remember for codebase") patterns, and archive-URL relativization.

use tracing::warn;
use url::Url;

/// Returns `url` with its query string and fragment removed.
///
/// The [`Url`] type already holds the canonical percent-encoded form, so
/// the returned value is safe to convert to a string and compare or quote
/// into a pattern.
#[must_use]
pub fn normalize_and_strip_params(url: &Url) -> Url {
    let mut normalized = url.clone();
    normalized.set_query(None);
    normalized.set_fragment(None);
    normalized
}

/// Truncates a documentbase to its parent directory, with a guaranteed
/// trailing slash.
///
/// The trailing slash is semantic, not cosmetic: the result is quoted into
/// a prefix pattern, and `http://host/path.*` would also match
/// `http://host/path-other/` while `http://host/path/.*` cannot.
#[must_use]
pub fn strip_file(documentbase: &Url) -> String {
    ensure_slash_tail(strip_file_impl(documentbase))
}

fn strip_file_impl(documentbase: &Url) -> String {
    let normalized = normalize_and_strip_params(documentbase).to_string();
    if normalized.ends_with('/') || normalized.ends_with('\\') {
        return normalized;
    }
    match Url::parse(&normalized) {
        Ok(parsed) => {
            let path = parsed.path().to_owned();
            match path.rfind('/') {
                // Keep everything up to and including the last slash of
                // the path component.
                Some(i) => normalized.replacen(path.as_str(), &path[..=i], 1),
                None => normalized,
            }
        }
        Err(err) => {
            // Never abort a trust decision over a URL we failed to
            // re-parse; the caller falls back to the verbatim form.
            warn!(url = %documentbase, %err, "failed to re-parse normalized documentbase");
            documentbase.to_string()
        }
    }
}

/// Appends a path separator if `s` does not already end with one.
#[must_use]
pub fn ensure_slash_tail(s: String) -> String {
    if s.ends_with('/') || s.ends_with('\\') {
        return s;
    }
    if s.contains('/') {
        return s + "/";
    }
    if s.contains('\\') {
        return s + "\\";
    }
    s + "/"
}

/// Converts absolute archive URLs into paths relative to `root`.
///
/// Archives hosted under the codebase are reduced to their relative path;
/// anything fetched from elsewhere keeps its full URL string, so a
/// cross-origin archive can never alias a codebase-local one.
#[must_use]
pub fn to_relative_paths(paths: &[String], root: &str) -> Vec<String> {
    paths
        .iter()
        .map(|path| match path.strip_prefix(root) {
            Some(relative) => relative.to_owned(),
            None => path.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).expect("test URL must parse")
    }

    #[test]
    fn normalize_strips_query_and_fragment() {
        let u = url("http://example.com/app/page.html?x=1&y=2#top");
        assert_eq!(
            normalize_and_strip_params(&u).as_str(),
            "http://example.com/app/page.html"
        );
    }

    #[test]
    fn normalize_is_idempotent() {
        let u = url("http://example.com/app/page.html");
        let once = normalize_and_strip_params(&u);
        let twice = normalize_and_strip_params(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn normalize_encodes_file_urls() {
        let u = url("file:///opt/my applets/page.html");
        assert_eq!(
            normalize_and_strip_params(&u).as_str(),
            "file:///opt/my%20applets/page.html"
        );
    }

    #[test]
    fn strip_file_truncates_to_parent_directory() {
        let u = url("http://example.com/app/page.html");
        assert_eq!(strip_file(&u), "http://example.com/app/");
    }

    #[test]
    fn strip_file_keeps_directory_urls() {
        let u = url("http://example.com/app/");
        assert_eq!(strip_file(&u), "http://example.com/app/");
    }

    #[test]
    fn strip_file_handles_host_only_urls() {
        // The canonical form of a host-only URL already ends in a slash.
        let u = url("http://example.com");
        assert_eq!(strip_file(&u), "http://example.com/");
    }

    #[test]
    fn strip_file_ignores_query_params() {
        let u = url("http://example.com/app/page.html?applet=1");
        assert_eq!(strip_file(&u), "http://example.com/app/");
    }

    #[test]
    fn ensure_slash_tail_variants() {
        assert_eq!(ensure_slash_tail("http://a/b".to_owned()), "http://a/b/");
        assert_eq!(ensure_slash_tail("http://a/b/".to_owned()), "http://a/b/");
        assert_eq!(ensure_slash_tail("a\\b".to_owned()), "a\\b\\");
        assert_eq!(ensure_slash_tail("plain".to_owned()), "plain/");
    }

    #[test]
    fn relative_paths_strip_codebase_prefix() {
        let archives = vec![
            "http://example.com/app/main.jar".to_owned(),
            "http://example.com/app/lib/util.jar".to_owned(),
            "http://cdn.example.org/vendor.jar".to_owned(),
        ];
        let relative = to_relative_paths(&archives, "http://example.com/app/");
        assert_eq!(
            relative,
            vec![
                "main.jar".to_owned(),
                "lib/util.jar".to_owned(),
                // Foreign archives keep their full URL string.
                "http://cdn.example.org/vendor.jar".to_owned(),
            ]
        );
    }
}
