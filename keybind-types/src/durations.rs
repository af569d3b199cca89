//! The process-wide license-type duration table.
//!
//! Loaded once at startup and shared read-only. On the wire and in config
//! files it is a JSON object mapping each license type to a span in seconds:
//!
//! ```json
//! { "1m": 60, "24h": 86400, "7d": 604800, "30d": 2592000 }
//! ```

use crate::{Error, LicenseType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Maps each license type to the span a key of that type stays valid for
/// after activation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, u64>", into = "BTreeMap<String, u64>")]
pub struct DurationTable {
    spans: BTreeMap<LicenseType, Duration>,
}

impl DurationTable {
    /// Builds a table from `(type, span)` pairs.
    pub fn new<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (LicenseType, Duration)>,
    {
        Self {
            spans: entries.into_iter().collect(),
        }
    }

    /// Parses a table from its JSON object form.
    pub fn from_json(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Looks up the span for a license type.
    #[must_use]
    pub fn get(&self, license_type: &LicenseType) -> Option<Duration> {
        self.spans.get(license_type).copied()
    }

    #[must_use]
    pub fn contains(&self, license_type: &LicenseType) -> bool {
        self.spans.contains_key(license_type)
    }

    /// Iterates over the known license types in sorted order.
    pub fn types(&self) -> impl Iterator<Item = &LicenseType> {
        self.spans.keys()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.spans.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }
}

impl Default for DurationTable {
    fn default() -> Self {
        const MINUTE: u64 = 60;
        const DAY: u64 = 24 * 60 * 60;
        let defaults = [
            ("1m", MINUTE),
            ("24h", DAY),
            ("7d", 7 * DAY),
            ("30d", 30 * DAY),
        ];
        Self::new(defaults.into_iter().map(|(name, secs)| {
            (
                LicenseType(name.to_string()),
                Duration::from_secs(secs),
            )
        }))
    }
}

impl TryFrom<BTreeMap<String, u64>> for DurationTable {
    type Error = Error;

    fn try_from(raw: BTreeMap<String, u64>) -> Result<Self, Self::Error> {
        let mut spans = BTreeMap::new();
        for (name, secs) in raw {
            let license_type = LicenseType::parse(&name)
                .map_err(|_| Error::InvalidDurations("empty license type name".into()))?;
            if spans
                .insert(license_type, Duration::from_secs(secs))
                .is_some()
            {
                return Err(Error::InvalidDurations(format!(
                    "duplicate license type after trimming: {name:?}"
                )));
            }
        }
        Ok(Self { spans })
    }
}

impl From<DurationTable> for BTreeMap<String, u64> {
    fn from(table: DurationTable) -> Self {
        table
            .spans
            .into_iter()
            .map(|(t, d)| (t.as_str().to_string(), d.as_secs()))
            .collect()
    }
}
