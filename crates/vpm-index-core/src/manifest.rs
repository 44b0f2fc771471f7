//! Typed model of a single package-version manifest.
//!
//! Field names on the wire follow the VPM package format (`displayName`,
//! `vpmDependencies`, `zipSHA256`, ...). Keys this model does not know are
//! kept in an opaque side-map and written back unchanged.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::digest::Sha256Digest;
use crate::error::SchemaError;

/// Package author record; display-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Author {
    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.name.trim().is_empty() {
            return Err(SchemaError::EmptyField {
                field: "author.name",
            });
        }
        Ok(())
    }
}

/// Metadata for one published version of one package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub name: String,
    pub display_name: String,
    pub version: String,
    pub url: HttpUrl,
    pub author: Author,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "unity", default, skip_serializing_if = "Option::is_none")]
    pub platform_compat: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation_url: Option<HttpUrl>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changelog_url: Option<HttpUrl>,
    #[serde(rename = "vpmDependencies", default)]
    pub dependencies: BTreeMap<String, String>,
    #[serde(rename = "zipSHA256", default, skip_serializing_if = "Option::is_none")]
    pub content_digest: Option<Sha256Digest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Manifest {
    /// Parse and validate a manifest document.
    pub fn parse(raw: &[u8]) -> Result<Self, SchemaError> {
        let manifest: Self = serde_json::from_slice(raw)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Checks the rules serde cannot express.
    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.name.trim().is_empty() {
            return Err(SchemaError::EmptyField { field: "name" });
        }
        if self.version.trim().is_empty() {
            return Err(SchemaError::EmptyField { field: "version" });
        }
        self.author.validate()
    }

    /// `name@version`, used in log lines and error messages.
    pub fn id(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }
}

/// Absolute `http`/`https` URL with a host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HttpUrl(Url);

impl HttpUrl {
    pub fn parse(raw: &str) -> Result<Self, InvalidUrl> {
        let url = Url::parse(raw).map_err(|err| InvalidUrl {
            raw: raw.to_string(),
            reason: err.to_string(),
        })?;
        Self::try_from(url)
    }

    pub fn as_url(&self) -> &Url {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl TryFrom<Url> for HttpUrl {
    type Error = InvalidUrl;

    fn try_from(url: Url) -> Result<Self, Self::Error> {
        if !matches!(url.scheme(), "http" | "https") {
            return Err(InvalidUrl {
                raw: url.to_string(),
                reason: format!("scheme `{}` is not http or https", url.scheme()),
            });
        }
        if url.host_str().is_none_or(str::is_empty) {
            return Err(InvalidUrl {
                raw: url.to_string(),
                reason: "missing host".into(),
            });
        }
        Ok(Self(url))
    }
}

impl TryFrom<String> for HttpUrl {
    type Error = InvalidUrl;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<HttpUrl> for String {
    fn from(value: HttpUrl) -> Self {
        value.0.into()
    }
}

impl fmt::Display for HttpUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

/// URL that failed `http`/`https` validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid URL `{raw}`: {reason}")]
pub struct InvalidUrl {
    raw: String,
    reason: String,
}
