//! ctdd - test-driven development harness for C units
//!
//! Each test module is paired with a C implementation and header of the same
//! name. The harness compiles that unit once per test module, with every
//! registered extern replaced by an attachable binding, loads it into the
//! test process and gives every test its own temp folder.

pub mod assertions;
pub mod builder;
pub mod core;
pub mod error;
pub mod util;

/// Test doubles for the builder collaborator.
#[cfg(test)]
pub mod test_support;

pub use crate::core::{
    Attached, BuildState, LateMockPolicy, MockFn, MockHook, Origin, Suite, SuiteCell, TestCase,
    Workspace,
};
pub use builder::{Builder, BuildUnit, LoadedUnit, NativeBuilder, NativeSut};
pub use error::{BuildError, HarnessError, Result};
pub use util::config::Config;

use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter.
pub const LOG_ENV: &str = "CTDD_LOG";

/// Install a log subscriber that writes through the test runner's capture.
///
/// The filter comes from `CTDD_LOG` (default `ctdd=info`). Calling it again
/// after a subscriber is installed does nothing.
pub fn init_test_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("ctdd=info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .with_target(false)
        .without_time()
        .try_init();
}
