//! Shared test helpers for store tests.

#![allow(dead_code)]

use keybind_types::{Binding, DeviceId, LicenseKey, LicenseType, Timestamp};
use std::time::Duration;

pub fn key(s: &str) -> LicenseKey {
    LicenseKey::parse(s).unwrap()
}

pub fn license_type(s: &str) -> LicenseType {
    LicenseType::parse(s).unwrap()
}

/// A binding for `device` activated at `at` with a one-day span.
pub fn binding(device: &str, at: u64) -> Binding {
    let activated_at = Timestamp::from_millis(at);
    Binding {
        device_id: DeviceId::parse(device).unwrap(),
        activated_at,
        expires_at: activated_at.saturating_add(Duration::from_secs(86_400)),
    }
}
