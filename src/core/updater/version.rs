use std::cmp::Ordering;
use std::fmt;

use crate::core::error::UpdateError;

/// Weight multipliers for the magnitude gap: major jumps dominate minor,
/// minor dominate patch.
const MAJOR_WEIGHT: i64 = 10_000;
const MINOR_WEIGHT: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse a version from a string like "1.0.83" or "v1.0.83".
    ///
    /// Up to three dot-separated components are accepted; missing
    /// components are treated as 0, so "1.0" parses as 1.0.0. A
    /// non-numeric component fails with [`UpdateError::MalformedVersion`].
    pub fn parse(s: &str) -> Result<Self, UpdateError> {
        let trimmed = s.trim().trim_start_matches('v');
        let parts: Vec<&str> = trimmed.split('.').collect();

        if trimmed.is_empty() || parts.len() > 3 {
            return Err(UpdateError::MalformedVersion(s.to_string()));
        }

        let mut components = [0u32; 3];
        for (i, part) in parts.iter().enumerate() {
            components[i] = part
                .parse()
                .map_err(|_| UpdateError::MalformedVersion(s.to_string()))?;
        }

        Ok(Self::new(components[0], components[1], components[2]))
    }

    /// Get the version baked into the running build from Cargo.toml.
    pub fn current() -> Self {
        Self::parse(env!("CARGO_PKG_VERSION")).expect("Failed to parse current version")
    }

    /// Check if this version is newer than another. Equal versions are
    /// not newer.
    pub fn is_newer_than(&self, other: &Version) -> bool {
        self > other
    }

    /// Weighted integer distance between two versions:
    /// `weight(self) - weight(other)` with weight
    /// major*10000 + minor*100 + patch.
    ///
    /// Signed: a negative gap means `other` is ahead of `self`. The
    /// reconciler uses this to spot suspiciously large jumps in stored
    /// state.
    pub fn magnitude_gap(&self, other: &Version) -> i64 {
        self.weight() - other.weight()
    }

    fn weight(&self) -> i64 {
        self.major as i64 * MAJOR_WEIGHT + self.minor as i64 * MINOR_WEIGHT + self.patch as i64
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.major.cmp(&other.major) {
            Ordering::Equal => match self.minor.cmp(&other.minor) {
                Ordering::Equal => self.patch.cmp(&other.patch),
                other => other,
            },
            other => other,
        }
    }
}

/// Convenience form of the comparison contract: is `candidate` strictly
/// newer than `baseline`?
pub fn is_newer(candidate: &str, baseline: &str) -> Result<bool, UpdateError> {
    let candidate = Version::parse(candidate)?;
    let baseline = Version::parse(baseline)?;
    Ok(candidate.is_newer_than(&baseline))
}
