//! Digest-pinned container image references.

use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

const SHA256_PREFIX: &str = "sha256";

/// Errors produced while parsing an image reference.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ImageRefError {
    #[error("image reference '{0}' is not pinned to a digest")]
    MissingDigest(String),

    #[error("image reference '{0}' has an empty repository path")]
    EmptyRepository(String),

    #[error("invalid repository path '{0}'")]
    InvalidRepository(String),

    #[error("unsupported digest algorithm '{0}' (expected sha256)")]
    UnsupportedAlgorithm(String),

    #[error("invalid sha256 digest '{0}'")]
    InvalidDigest(String),
}

/// Canonical, digest-pinned reference to a container image.
///
/// Canonical form is `repository@sha256:<64 lowercase hex>`. A tag given
/// alongside the digest is dropped. Two references are equal when their
/// digests are equal, whatever repository path they were pulled through.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ImageRef {
    repository: String,
    digest: String,
}

impl ImageRef {
    /// Parse and canonicalise a reference such as
    /// `gcr.io/project/app@sha256:73d5...`.
    pub fn parse(input: &str) -> Result<Self, ImageRefError> {
        if input.chars().any(char::is_whitespace) {
            return Err(ImageRefError::InvalidRepository(input.to_string()));
        }

        let (name, digest) = input
            .rsplit_once('@')
            .ok_or_else(|| ImageRefError::MissingDigest(input.to_string()))?;

        let (algorithm, hex_part) = digest
            .split_once(':')
            .ok_or_else(|| ImageRefError::InvalidDigest(digest.to_string()))?;
        if algorithm != SHA256_PREFIX {
            return Err(ImageRefError::UnsupportedAlgorithm(algorithm.to_string()));
        }
        if hex_part.len() != 64 || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ImageRefError::InvalidDigest(digest.to_string()));
        }

        let repository = strip_tag(name);
        if repository.is_empty() {
            return Err(ImageRefError::EmptyRepository(input.to_string()));
        }
        if repository.split('/').any(str::is_empty) || !repository.chars().all(is_repo_char) {
            return Err(ImageRefError::InvalidRepository(repository.to_string()));
        }

        Ok(ImageRef {
            repository: repository.to_string(),
            digest: format!("{}:{}", SHA256_PREFIX, hex_part.to_ascii_lowercase()),
        })
    }

    /// Repository path without tag or digest.
    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// Full digest including the algorithm prefix (`sha256:...`).
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Hex portion of the digest.
    pub fn digest_hex(&self) -> &str {
        &self.digest[SHA256_PREFIX.len() + 1..]
    }

    /// Short form (first 12 hex chars of the digest).
    pub fn short(&self) -> &str {
        &self.digest_hex()[..12]
    }
}

fn strip_tag(name: &str) -> &str {
    let last_segment_start = name.rfind('/').map(|i| i + 1).unwrap_or(0);
    match name[last_segment_start..].find(':') {
        Some(offset) => &name[..last_segment_start + offset],
        None => name,
    }
}

fn is_repo_char(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-' | '/' | ':')
}

impl PartialEq for ImageRef {
    fn eq(&self, other: &Self) -> bool {
        self.digest == other.digest
    }
}

impl Eq for ImageRef {}

impl Hash for ImageRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.digest.hash(state);
    }
}

impl std::fmt::Display for ImageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.repository, self.digest)
    }
}

impl std::str::FromStr for ImageRef {
    type Err = ImageRefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ImageRef::parse(s)
    }
}

impl TryFrom<String> for ImageRef {
    type Error = ImageRefError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        ImageRef::parse(&s)
    }
}

impl From<ImageRef> for String {
    fn from(image: ImageRef) -> Self {
        image.to_string()
    }
}
