//! Harness lifecycle.
//!
//! - Test identity ([`Origin`])
//! - The class-scoped build-once cache ([`BuildState`])
//! - Per-test temp folders ([`Workspace`])
//! - Runner wiring ([`Suite`], [`SuiteCell`]) and mock attachment

pub mod build_state;
pub mod fixture;
pub mod mock;
pub mod origin;
pub mod workspace;

pub use build_state::{BuildState, LateMockPolicy, LoadedOf};
pub use fixture::{MockHook, Suite, SuiteCell, TestCase};
pub use mock::{Attached, MockFn};
pub use origin::Origin;
pub use workspace::Workspace;
