//! Artifact naming.
//!
//! A backup artifact is named `backup_<epoch-ms>.tar`; the embedded timestamp
//! is the snapshot time and the only input to cloud-side age checks. The
//! archive key is `<prefix>/<name>`. Changing either format breaks retention
//! for objects that are already archived.

use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

static ARTIFACT_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^backup_(\d+)\.tar$").expect("artifact name pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArtifactName {
    created_at_ms: i64,
}

impl ArtifactName {
    pub fn new(created_at_ms: i64) -> Self {
        Self { created_at_ms }
    }

    pub fn at(time: DateTime<Utc>) -> Self {
        Self::new(time.timestamp_millis())
    }

    /// Parses a bare file name. Returns `None` for anything that is not an
    /// artifact name.
    pub fn parse(name: &str) -> Option<Self> {
        let caps = ARTIFACT_NAME.captures(name)?;
        caps[1].parse::<i64>().ok().map(Self::new)
    }

    /// Parses the last path segment of an archive key.
    pub fn from_key(key: &str) -> Option<Self> {
        Self::parse(key.rsplit('/').next().unwrap_or(key))
    }

    pub fn created_at_ms(&self) -> i64 {
        self.created_at_ms
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.created_at_ms).single()
    }

    pub fn archive_key(&self, prefix: &str) -> String {
        archive_key(prefix, &self.to_string())
    }
}

impl fmt::Display for ArtifactName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "backup_{}.tar", self.created_at_ms)
    }
}

/// `<prefix>/<name>`, tolerating stray slashes on the prefix. An empty prefix
/// yields the bare name.
pub fn archive_key(prefix: &str, name: &str) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}/{name}")
    }
}

/// Final path segment of a key, used for the local file name on restore.
pub fn key_file_name(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}
