/* src/server/ssr/rust/src/logging.rs */

use tracing_subscriber::EnvFilter;

/// Environment variable read for the log filter, e.g. `SEAM_LOG=seam_vm=debug`.
pub const LOG_ENV: &str = "SEAM_LOG";

pub fn init() {
  init_with_default("info");
}

/// Install the global fmt subscriber. Calling it again is a no-op.
pub fn init_with_default(default: &str) {
  let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));
  let _ = tracing_subscriber::fmt().with_env_filter(filter).with_target(false).try_init();
}
