use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::digest::Sha256Digest;

/// Fatal errors surfaced by a build run.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("invalid {kind} file {}: {source}", path.display())]
    Schema {
        kind: SchemaKind,
        path: PathBuf,
        #[source]
        source: SchemaError,
    },

    #[error("no trusted digest for {package}@{version}: {reason}")]
    UnresolvedDigest {
        package: String,
        version: String,
        reason: UnresolvedDigest,
    },

    #[error("failed to fetch {package}@{version} from {url}: {reason}")]
    Fetch {
        package: String,
        version: String,
        url: String,
        reason: FetchError,
    },

    #[error("integrity check failed for {package}@{version}: {reason}")]
    Integrity {
        package: String,
        version: String,
        reason: IntegrityError,
    },

    #[error("{package}@{version} is published more than once")]
    DuplicateVersion { package: String, version: String },

    #[error(
        "package index `{package}` already holds `{found}`@{version}; refusing to mix names"
    )]
    NameMismatch {
        package: String,
        version: String,
        found: String,
    },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to serialize repository: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to initialise HTTP client: {reason}")]
    HttpClient { reason: String },

    #[error("digest resolution task failed: {reason}")]
    Task { reason: String },
}

impl BuildError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Which kind of document failed schema validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaKind {
    Manifest,
    Repository,
}

impl std::fmt::Display for SchemaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Manifest => write!(f, "manifest"),
            Self::Repository => write!(f, "repository"),
        }
    }
}

/// Manifest or repository document that does not match the expected schema.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("{0}")]
    Json(#[from] serde_json::Error),

    #[error("field `{field}` must not be empty")]
    EmptyField { field: &'static str },

    #[error("entry packages.{package}.versions.{version} holds `{found_name}`@{found_version}")]
    MisplacedEntry {
        package: String,
        version: String,
        found_name: String,
        found_version: String,
    },
}

/// Reasons the release-asset metadata strategy could not produce a digest.
///
/// These are recoverable: the digest policy decides whether to fall back to
/// download-and-hash, continue without a digest, or fail the build.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnresolvedDigest {
    #[error("release lookup is disabled")]
    LookupDisabled,

    #[error("{url} is not a release download URL")]
    NotReleaseUrl { url: String },

    #[error("release {owner}/{repo}@{tag} could not be read: {reason}")]
    ReleaseUnavailable {
        owner: String,
        repo: String,
        tag: String,
        reason: String,
    },

    #[error("release {owner}/{repo}@{tag} has no asset named {asset}")]
    AssetNotFound {
        owner: String,
        repo: String,
        tag: String,
        asset: String,
    },

    #[error("release asset {url} carries no digest")]
    DigestMissing { url: String },

    #[error("unsupported digest algorithm `{algorithm}`")]
    UnsupportedAlgorithm { algorithm: String },

    #[error("unexpected digest format `{raw}`")]
    Malformed { raw: String },
}

/// Transport or HTTP failure while downloading an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("server answered HTTP {status}")]
    Status { status: u16 },

    #[error("{reason}")]
    Transport { reason: String },
}

/// Downloaded bytes that cannot be trusted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntegrityError {
    #[error("invalid archive: {reason}")]
    InvalidArchive { reason: String },

    #[error("declared zipSHA256 {declared} does not match downloaded {computed}")]
    DigestMismatch {
        declared: Sha256Digest,
        computed: Sha256Digest,
    },
}

/// Result alias for build operations.
pub type BuildResult<T> = Result<T, BuildError>;
