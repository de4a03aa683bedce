//! Deployment configuration.
//!
//! This module holds the configuration consulted by the trust-decision
//! engine: the applet security level, the operator trust overrides, the
//! headless flag, and authentication prompt tuning. Values are loaded from
//! a TOML file; every field has a default so a missing or partial file
//! still yields a usable configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading deployment configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file is not valid TOML.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

/// The startup security level for unsigned and partially-signed
/// applications.
///
/// Levels are ordered from most permissive to most restrictive; the
/// decision controller consults the restrictive levels *before* any store
/// lookup so they fail closed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum SecurityLevel {
    /// Run unsigned applications without prompting.
    AllowUnsigned,
    /// Prompt before running unsigned applications (the default).
    #[default]
    AskUnsigned,
    /// Never run unsigned applications.
    DenyUnsigned,
    /// Never run anything that is not fully signed and trusted.
    DenyAll,
}

impl SecurityLevel {
    /// Returns true when this level requires a confirmation step before
    /// running unsigned code.
    #[must_use]
    pub const fn requires_confirmation(self) -> bool {
        !matches!(self, Self::AllowUnsigned)
    }

    /// Returns true when this level forbids unsigned code outright.
    #[must_use]
    pub const fn forbids_unsigned(self) -> bool {
        matches!(self, Self::DenyUnsigned | Self::DenyAll)
    }

    /// Returns the string representation of this level.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AllowUnsigned => "allow_unsigned",
            Self::AskUnsigned => "ask_unsigned",
            Self::DenyUnsigned => "deny_unsigned",
            Self::DenyAll => "deny_all",
        }
    }
}

impl std::fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Security section of the deployment configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SecurityConfig {
    /// The applet security level.
    #[serde(default)]
    pub level: SecurityLevel,

    /// Operator override: trust everything, never prompt.
    #[serde(default)]
    pub trust_all: bool,

    /// Operator override: trust nothing. Unsigned launches are refused
    /// outright; partially-signed launches degrade to sandbox privileges.
    #[serde(default)]
    pub trust_none: bool,
}

/// Authentication section of the deployment configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// How many times rejected credentials are silently re-offered before
    /// the user is prompted again. Bounds prompt frequency against
    /// servers that reject and immediately retry.
    #[serde(default = "default_attempts_before_reprompt")]
    pub attempts_before_reprompt: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            attempts_before_reprompt: default_attempts_before_reprompt(),
        }
    }
}

const fn default_attempts_before_reprompt() -> u32 {
    2
}

/// Top-level deployment configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DeploymentConfig {
    /// Whether the runtime is headless. Prompt collaborators must answer
    /// without interaction in headless mode; the engine never blocks on
    /// a dialog that cannot appear.
    #[serde(default)]
    pub headless: bool,

    /// Security settings.
    #[serde(default)]
    pub security: SecurityConfig,

    /// Authentication settings.
    #[serde(default)]
    pub auth: AuthConfig,
}

impl DeploymentConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }
}
