//! Client side of keybind.
//!
//! An application embeds a [`ClientSyncAgent`] to keep its license state
//! current: the agent re-verifies the held key against the authority on a
//! schedule, runs a local countdown to the authoritative expiry, and
//! publishes a [`LicenseState`] the application gates features on.
//!
//! ```no_run
//! use keybind_client::{AgentConfig, ClientSyncAgent, DeviceIdentity};
//! use keybind_types::LicenseKey;
//!
//! # async fn run() -> keybind_client::ClientResult<()> {
//! let device = DeviceIdentity::load_default()?;
//! let agent = ClientSyncAgent::connect(
//!     device.into_id(),
//!     AgentConfig::new("https://license.example.com"),
//! )?;
//! let handle = agent.spawn(LicenseKey::parse("ABC-123").ok());
//!
//! if handle.check_now().await?.allows_protected_actions() {
//!     // run the protected action
//! }
//! handle.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod agent;
mod countdown;
mod device;
mod error;
mod state;
mod verifier;

pub use agent::{AgentConfig, AgentHandle, ClientSyncAgent};
pub use countdown::format_remaining;
pub use device::DeviceIdentity;
pub use error::{ClientError, ClientResult};
pub use state::{LicenseState, LockoutReason};
pub use verifier::{HttpVerifier, Verifier, VerifyReply};
