#![allow(dead_code)]

use async_trait::async_trait;
use keybind_client::{ClientError, ClientResult, Verifier, VerifyReply};
use keybind_types::{DeviceId, LicenseKey, Timestamp};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub const T0: u64 = 1_700_000_000_000;

pub fn key(s: &str) -> LicenseKey {
    LicenseKey::parse(s).unwrap()
}

pub fn valid_for(ms: u64) -> VerifyReply {
    VerifyReply::Valid {
        expires_at: Timestamp::from_millis(T0 + ms),
    }
}

/// Replays queued replies in order, then repeats `fallback` forever.
pub struct ScriptedVerifier {
    script: Mutex<VecDeque<ClientResult<VerifyReply>>>,
    fallback: VerifyReply,
    calls: AtomicUsize,
    seen: Mutex<Vec<(String, String)>>,
}

impl ScriptedVerifier {
    pub fn new(fallback: VerifyReply) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn then(self, reply: VerifyReply) -> Self {
        self.script.lock().unwrap().push_back(Ok(reply));
        self
    }

    pub fn then_network_error(self) -> Self {
        self.script
            .lock()
            .unwrap()
            .push_back(Err(ClientError::Network("connection refused".into())));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<(String, String)> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Verifier for ScriptedVerifier {
    async fn verify(&self, key: &LicenseKey, device: &DeviceId) -> ClientResult<VerifyReply> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen
            .lock()
            .unwrap()
            .push((key.to_string(), device.to_string()));
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}
