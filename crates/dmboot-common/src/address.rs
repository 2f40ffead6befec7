//! Strict parsers for user-supplied addresses and credential files.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::{BootError, BootResult};

/// Remote dot to seed from, written `host/namespace/name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedAddress {
    /// Peer service host.
    pub host: String,
    /// Namespace of the remote dot.
    pub namespace: String,
    /// Name of the remote dot.
    pub name: String,
}

impl SeedAddress {
    /// Parse a seed address.
    ///
    /// # Errors
    ///
    /// Returns [`BootError::Protocol`] unless the input has exactly two `/`
    /// separators and three non-empty segments.
    pub fn parse(input: &str) -> BootResult<Self> {
        let parts: Vec<&str> = input.split('/').collect();
        match parts.as_slice() {
            [host, namespace, name]
                if !host.is_empty() && !namespace.is_empty() && !name.is_empty() =>
            {
                Ok(Self {
                    host: (*host).to_string(),
                    namespace: (*namespace).to_string(),
                    name: (*name).to_string(),
                })
            }
            _ => Err(BootError::Protocol {
                message: format!(
                    "invalid seed address '{input}': expected host/namespace/name"
                ),
            }),
        }
    }
}

impl FromStr for SeedAddress {
    type Err = BootError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for SeedAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.host, self.namespace, self.name)
    }
}

/// A dot identified by namespace and name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DotRef {
    /// Owning namespace.
    pub namespace: String,
    /// Dot name.
    pub name: String,
}

impl DotRef {
    /// Create a dot reference.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Parse `name` or `namespace/name`, filling in `default_namespace`.
    ///
    /// # Errors
    ///
    /// Returns [`BootError::Config`] for empty segments or more than one `/`.
    pub fn parse(input: &str, default_namespace: &str) -> BootResult<Self> {
        let invalid = || BootError::Config {
            message: format!("invalid dot '{input}': expected name or namespace/name"),
        };
        match input.split_once('/') {
            None if !input.is_empty() => Ok(Self::new(default_namespace, input)),
            Some((namespace, name))
                if !namespace.is_empty() && !name.is_empty() && !name.contains('/') =>
            {
                Ok(Self::new(namespace, name))
            }
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for DotRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// API credentials for a peer service, stored as `user:key`.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// API user name.
    pub user: String,
    /// API key.
    pub api_key: String,
}

impl Credentials {
    /// Parse the contents of a credentials file.
    ///
    /// # Errors
    ///
    /// Returns [`BootError::Config`] when there is no `:` or either half is empty.
    pub fn parse(contents: &str) -> BootResult<Self> {
        let line = trim_line_end(contents);
        match line.split_once(':') {
            Some((user, api_key)) if !user.is_empty() && !api_key.is_empty() => Ok(Self {
                user: user.to_string(),
                api_key: api_key.to_string(),
            }),
            _ => Err(BootError::Config {
                message: "credentials must have the form <API username>:<API key>".to_string(),
            }),
        }
    }

    /// Read and parse a credentials file.
    ///
    /// # Errors
    ///
    /// Returns [`BootError::Config`] if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> BootResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| BootError::Config {
            message: format!(
                "Unable to read credentials file at {}: {e}; \
                 see the README for how to provide credentials for seeding",
                path.display()
            ),
        })?;
        Self::parse(&contents)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Read a single-value secret file, dropping the trailing line terminator.
///
/// # Errors
///
/// Returns [`BootError::Config`] if the file cannot be read.
pub fn read_secret(path: &Path) -> BootResult<String> {
    let contents = std::fs::read_to_string(path).map_err(|e| BootError::Config {
        message: format!("Unable to read {}: {e}", path.display()),
    })?;
    tracing::debug!(path = %path.display(), "Loaded secret file");
    Ok(trim_line_end(&contents).to_string())
}

fn trim_line_end(s: &str) -> &str {
    s.trim_end_matches(['\n', '\r'])
}
