//! Application descriptors handed to the trust engine.

use url::Url;

use crate::urls;

/// The trust-relevant identity of a launching application.
///
/// Parsing of the launch file and verification of signatures happen
/// upstream; by the time a descriptor reaches this crate, the URLs are
/// parsed and the signing state is already known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppDescriptor {
    /// URL of the document that referenced the application.
    pub document_base: Url,
    /// Base URL the application's resources originate from; the
    /// trust-scoping unit.
    pub code_base: Url,
    /// Absolute URLs of the application's archives.
    pub archives: Vec<String>,
}

impl AppDescriptor {
    /// Creates a descriptor.
    #[must_use]
    pub fn new(document_base: Url, code_base: Url, archives: Vec<String>) -> Self {
        Self {
            document_base,
            code_base,
            archives,
        }
    }

    /// The normalized documentbase string used for matching.
    #[must_use]
    pub fn normalized_document_base(&self) -> String {
        urls::normalize_and_strip_params(&self.document_base).to_string()
    }

    /// The normalized codebase string used for matching.
    #[must_use]
    pub fn normalized_code_base(&self) -> String {
        urls::normalize_and_strip_params(&self.code_base).to_string()
    }

    /// Archive URLs reduced to codebase-relative paths.
    #[must_use]
    pub fn relative_archives(&self) -> Vec<String> {
        urls::to_relative_paths(&self.archives, self.code_base.as_str())
    }
}

/// Summary of the verified signer of a partially-signed application,
/// produced by the signature-verification collaborator and shown to the
/// user by the prompt collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertSummary {
    /// Subject of the signing certificate.
    pub subject: String,
    /// Issuer of the signing certificate.
    pub issuer: String,
    /// Whether the chain anchors in a trusted root.
    pub trusted_root: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_normalizes_for_matching() {
        let app = AppDescriptor::new(
            Url::parse("http://example.com/app/page.html?launch=1").expect("url"),
            Url::parse("http://example.com/app/").expect("url"),
            vec![
                "http://example.com/app/main.jar".to_owned(),
                "http://cdn.example.org/vendor.jar".to_owned(),
            ],
        );
        assert_eq!(
            app.normalized_document_base(),
            "http://example.com/app/page.html"
        );
        assert_eq!(app.normalized_code_base(), "http://example.com/app/");
        assert_eq!(
            app.relative_archives(),
            vec![
                "main.jar".to_owned(),
                "http://cdn.example.org/vendor.jar".to_owned()
            ]
        );
    }
}
