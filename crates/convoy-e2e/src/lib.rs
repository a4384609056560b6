//! End-to-end test sessions for Convoy.
//!
//! [`E2eComponent`] subscribes to the asset stream of the emit component,
//! keeps the assets matching its own pattern/ignore pair and, once every
//! module has been processed, runs one external test command over them.
//! Wrap it in [`convoy_core::Gated`] so its run waits for `emit`.

pub mod component;
pub mod events;
pub mod runner;
pub mod wait;

pub use component::{E2eComponent, E2E_COMPONENT, E2E_PRIORITY};
pub use events::{E2E_ASSET_ADD, E2E_ASSET_SKIP, E2E_SESSION_END, E2E_SESSION_START};
pub use runner::{E2eRunner, SessionConfig, SessionResult};
pub use wait::UriWaiter;
