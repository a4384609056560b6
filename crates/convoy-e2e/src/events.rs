//! Events emitted by the e2e component.

/// Blocking: an asset was accepted into the session. Payload is the asset.
pub const E2E_ASSET_ADD: &str = "e2e.asset.add";

/// Blocking: an asset did not match the e2e pattern/ignore pair.
pub const E2E_ASSET_SKIP: &str = "e2e.asset.skip";

/// Blocking: the session command is about to start.
pub const E2E_SESSION_START: &str = "e2e.session.start";

/// Blocking: the session command finished, successfully or not.
pub const E2E_SESSION_END: &str = "e2e.session.end";
