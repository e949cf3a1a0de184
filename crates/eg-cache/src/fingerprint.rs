//! Scenario fingerprints.
//!
//! A fingerprint is the SHA-256 of everything a cached model depends on:
//! scenario identity, the canonical JSON of its records, the version of
//! the underlying data and the settings used to build it. Every part is
//! length-prefixed so adjacent parts cannot run into each other.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Bumped whenever the cached model layout changes.
pub const MODEL_FORMAT_VERSION: &str = "egrid-models/2";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First twelve hex digits, for logs.
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Fingerprint {
    fn from(s: &str) -> Self {
        Fingerprint(s.to_string())
    }
}

pub struct FingerprintBuilder {
    hasher: Sha256,
}

impl FingerprintBuilder {
    pub fn new() -> Self {
        Self::with_format(MODEL_FORMAT_VERSION)
    }

    pub fn with_format(format: &str) -> Self {
        let builder = Self {
            hasher: Sha256::new(),
        };
        builder.text("format", format)
    }

    pub fn text(mut self, label: &str, value: &str) -> Self {
        for part in [label, value] {
            self.hasher.update((part.len() as u64).to_le_bytes());
            self.hasher.update(part.as_bytes());
        }
        self
    }

    /// Add a value as canonical JSON (object keys sorted).
    pub fn json<T: Serialize + ?Sized>(self, label: &str, value: &T) -> serde_json::Result<Self> {
        let canonical = serde_json::to_value(value)?;
        let text = serde_json::to_string(&canonical)?;
        Ok(self.text(label, &text))
    }

    pub fn finish(self) -> Fingerprint {
        Fingerprint(format!("{:x}", self.hasher.finalize()))
    }
}

impl Default for FingerprintBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Fingerprint of one scenario build.
pub fn scenario_fingerprint<S, C>(
    name: &str,
    records: &S,
    data_version: &str,
    settings: &C,
) -> serde_json::Result<Fingerprint>
where
    S: Serialize + ?Sized,
    C: Serialize + ?Sized,
{
    Ok(FingerprintBuilder::new()
        .text("scenario", name)
        .json("records", records)?
        .text("data_version", data_version)
        .json("settings", settings)?
        .finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn stable_for_equal_inputs() {
        let a = scenario_fingerprint("s1", &vec![1, 2, 3], "v1", &"fixed_point").unwrap();
        let b = scenario_fingerprint("s1", &vec![1, 2, 3], "v1", &"fixed_point").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
        assert_eq!(a.short().len(), 12);
    }

    #[test]
    fn every_part_matters() {
        let base = scenario_fingerprint("s1", &vec![1, 2, 3], "v1", &"fixed_point").unwrap();
        assert_ne!(base, scenario_fingerprint("s2", &vec![1, 2, 3], "v1", &"fixed_point").unwrap());
        assert_ne!(base, scenario_fingerprint("s1", &vec![1, 2, 4], "v1", &"fixed_point").unwrap());
        assert_ne!(base, scenario_fingerprint("s1", &vec![1, 2, 3], "v2", &"fixed_point").unwrap());
        assert_ne!(base, scenario_fingerprint("s1", &vec![1, 2, 3], "v1", &"jacobian").unwrap());
    }

    #[test]
    fn parts_do_not_run_together() {
        let a = FingerprintBuilder::new().text("x", "ab").text("y", "c").finish();
        let b = FingerprintBuilder::new().text("x", "a").text("y", "bc").finish();
        assert_ne!(a, b);
    }

    #[test]
    fn map_order_does_not_matter() {
        let mut m1 = HashMap::new();
        let mut m2 = HashMap::new();
        for (k, v) in [("a", 1), ("b", 2), ("c", 3)] {
            m1.insert(k, v);
        }
        for (k, v) in [("c", 3), ("a", 1), ("b", 2)] {
            m2.insert(k, v);
        }
        let a = FingerprintBuilder::new().json("m", &m1).unwrap().finish();
        let b = FingerprintBuilder::new().json("m", &m2).unwrap().finish();
        assert_eq!(a, b);
    }
}
