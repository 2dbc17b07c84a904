//! Wiring between the test runner and a class-scoped [`BuildState`].
//!
//! Rust's test runner has no class hooks, so a "class" is a module of
//! `#[test]` functions sharing one [`SuiteCell`] static:
//!
//! ```rust,ignore
//! use ctdd::{NativeBuilder, Suite, SuiteCell, TestCase};
//!
//! static SUITE: SuiteCell<NativeBuilder> = SuiteCell::new(set_up_class);
//!
//! fn set_up_class() -> ctdd::Result<Suite<NativeBuilder>> {
//!     Ok(Suite::native(ctdd::origin!())?.with_mocks(set_up_mocks))
//! }
//!
//! fn set_up_mocks(t: &mut TestCase<'_, NativeBuilder>) -> ctdd::Result<()> {
//!     t.register_mock("int read_adc(int channel)")
//! }
//!
//! #[test]
//! fn reads_channel() {
//!     SUITE.run("reads_channel", |t| {
//!         let sut = t.sut()?;
//!         // ...
//!         Ok(())
//!     })
//!     .unwrap();
//! }
//! ```

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use super::build_state::{BuildState, LoadedOf};
use super::mock::{Attached, MockFn};
use super::origin::Origin;
use super::workspace::Workspace;
use crate::builder::{Builder, NativeBuilder};
use crate::error::{HarnessError, Result};
use crate::util::config::Config;

/// Hook run at the start of every test, before the body.
pub type MockHook<B> = fn(&mut TestCase<'_, B>) -> Result<()>;

/// Class-scoped fixture owning one [`BuildState`].
pub struct Suite<B: Builder> {
    state: BuildState<B>,
    config: Config,
    set_up_mocks: Option<MockHook<B>>,
}

impl Suite<NativeBuilder> {
    /// Set up a class built with the native toolchain, using the
    /// configuration discovered for the test crate.
    pub fn native(origin: Origin) -> Result<Self> {
        let config = Config::discover(origin.manifest_dir()).map_err(HarnessError::Config)?;
        let builder = NativeBuilder::from_config(&config)?;
        Ok(Suite::set_up_class(origin, builder, config))
    }
}

impl<B: Builder> Suite<B> {
    /// Create the class fixture with a fresh, unbuilt state.
    pub fn set_up_class(origin: Origin, builder: B, config: Config) -> Self {
        tracing::debug!("set up class {}", origin.identity());
        let state = BuildState::new(origin, builder)
            .with_late_mocks(config.build.late_mocks())
            .with_extensions(config.build.source_ext(), config.build.header_ext());
        Suite {
            state,
            config,
            set_up_mocks: None,
        }
    }

    /// Install the per-test mock hook.
    pub fn with_mocks(mut self, hook: MockHook<B>) -> Self {
        self.set_up_mocks = Some(hook);
        self
    }

    /// The class build state.
    pub fn state(&self) -> &BuildState<B> {
        &self.state
    }

    /// Mutable access to the class build state.
    pub fn state_mut(&mut self) -> &mut BuildState<B> {
        &mut self.state
    }

    /// The configuration this class was set up with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run one test: open and purge its workspace, run the mock hook, then
    /// the body.
    pub fn run<T>(
        &mut self,
        test_name: &str,
        body: impl FnOnce(&mut TestCase<'_, B>) -> Result<T>,
    ) -> Result<T> {
        let test_id = format!("{}_{}", self.state.origin().identity(), test_name);
        let workspace = Workspace::open(&self.config.workspace, &test_id)?;
        workspace.purge_tracked()?;
        tracing::debug!("==== {} ====", workspace.instance_id());

        let mut case = TestCase {
            state: &mut self.state,
            workspace,
        };
        if let Some(hook) = self.set_up_mocks {
            hook(&mut case)?;
        }
        body(&mut case)
    }

    /// Release the build state and the loaded unit with it.
    pub fn tear_down_class(mut self) {
        tracing::debug!("tear down class {}", self.state.origin().identity());
        self.state.reset();
    }
}

/// One running test: the class state plus this test's workspace.
pub struct TestCase<'a, B: Builder> {
    state: &'a mut BuildState<B>,
    workspace: Workspace,
}

impl<B: Builder> TestCase<'_, B> {
    /// The system under test, built on first access in the class.
    pub fn sut(&mut self) -> Result<Arc<LoadedOf<B>>> {
        self.state.ensure_sut()
    }

    /// Register an extern to be mocked. Only effective before the first build.
    pub fn register_mock(&mut self, signature: impl Into<String>) -> Result<()> {
        self.state.register_mock(signature)
    }

    /// Attach `mock` to the registered extern `name`.
    ///
    /// The returned handle keeps the SUT loaded after the class is torn down.
    ///
    /// # Safety
    ///
    /// `F` must match the registered C declaration of `name`, and `mock` must
    /// stay callable for as long as the unit may call it.
    pub unsafe fn attach_mock<F: MockFn>(
        &mut self,
        name: &str,
        mock: F,
    ) -> Result<Attached<F, LoadedOf<B>>> {
        self.state.attach_mock(name, mock)
    }

    /// Write a throwaway file into this test's folder.
    pub fn write_file(&self, filename: &str, content: &str) -> Result<PathBuf> {
        self.workspace.write_scoped_file(filename, content)
    }

    /// This test's private folder.
    pub fn temp_folder(&self) -> &Path {
        self.workspace.instance_folder()
    }

    /// The sanitized id of this test.
    pub fn test_id(&self) -> &str {
        self.workspace.instance_id()
    }

    /// This test's workspace.
    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// The class build state.
    pub fn state(&self) -> &BuildState<B> {
        self.state
    }
}

/// Lazily set-up [`Suite`] shared by the tests of one module.
///
/// Tests of one class run one at a time; a test that panics does not poison
/// the ones after it.
pub struct SuiteCell<B: Builder> {
    set_up_class: fn() -> Result<Suite<B>>,
    suite: Mutex<Option<Suite<B>>>,
}

impl<B: Builder> SuiteCell<B> {
    /// Create a cell that sets up its suite on first use.
    pub const fn new(set_up_class: fn() -> Result<Suite<B>>) -> Self {
        SuiteCell {
            set_up_class,
            suite: Mutex::new(None),
        }
    }

    /// Run one test against the shared suite.
    pub fn run<T>(
        &self,
        test_name: &str,
        body: impl FnOnce(&mut TestCase<'_, B>) -> Result<T>,
    ) -> Result<T> {
        let mut guard = self.suite.lock().unwrap_or_else(PoisonError::into_inner);
        let suite = match guard.take() {
            Some(suite) => suite,
            None => (self.set_up_class)()?,
        };
        guard.insert(suite).run(test_name, body)
    }

    /// Whether the suite has been set up.
    pub fn is_set_up(&self) -> bool {
        self.suite
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Tear the suite down. The next `run` sets up a fresh one.
    pub fn tear_down(&self) {
        let suite = self
            .suite
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(suite) = suite {
            suite.tear_down_class();
        }
    }
}
