//! Class-scoped build state: the pre-build mock window and the build-once
//! cache for the system under test.
//!
//! ```text
//! Unbuilt --register_mock*--> Unbuilt --ensure_build_unit--> Collected
//! Collected --ensure_sut--> Realized | Failed
//! ```
//!
//! `Realized` and `Failed` are terminal for the class; only [`BuildState::reset`]
//! returns to `Unbuilt`.

use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::origin::Origin;
use crate::builder::{BuildUnit, Builder};
use crate::error::{BuildError, HarnessError, Result};

/// Loaded unit type produced by a builder.
pub type LoadedOf<B> = <<B as Builder>::Unit as BuildUnit>::Loaded;

/// What happens to a mock registered after the build started.
///
/// The extern list is frozen once the build unit exists, so a late
/// registration can never reach the already-built unit. `Ignore` keeps the
/// "first access wins" behaviour and only logs a warning; `Reject` turns the
/// timing mistake into an error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LateMockPolicy {
    #[default]
    Ignore,
    Reject,
}

impl FromStr for LateMockPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ignore" => Ok(LateMockPolicy::Ignore),
            "reject" => Ok(LateMockPolicy::Reject),
            other => anyhow::bail!("unknown late mock policy `{}` (expected ignore or reject)", other),
        }
    }
}

enum BuildPhase<U, L> {
    Unbuilt,
    Collected(U),
    Realized { unit: U, sut: Arc<L> },
    Failed { unit: U, error: BuildError },
}

impl<U, L> BuildPhase<U, L> {
    fn name(&self) -> &'static str {
        match self {
            BuildPhase::Unbuilt => "unbuilt",
            BuildPhase::Collected(_) => "collected",
            BuildPhase::Realized { .. } => "realized",
            BuildPhase::Failed { .. } => "failed",
        }
    }
}

/// Per-class build lifecycle.
pub struct BuildState<B: Builder> {
    origin: Origin,
    builder: B,
    source_ext: String,
    header_ext: String,
    late_mocks: LateMockPolicy,
    pending_externs: Vec<String>,
    phase: BuildPhase<B::Unit, LoadedOf<B>>,
}

impl<B: Builder> BuildState<B> {
    /// Create an empty, unbuilt state for the class at `origin`.
    pub fn new(origin: Origin, builder: B) -> Self {
        BuildState {
            origin,
            builder,
            source_ext: "c".to_string(),
            header_ext: "h".to_string(),
            late_mocks: LateMockPolicy::default(),
            pending_externs: Vec::new(),
            phase: BuildPhase::Unbuilt,
        }
    }

    /// Set the policy for mocks registered after the build started.
    pub fn with_late_mocks(mut self, policy: LateMockPolicy) -> Self {
        self.late_mocks = policy;
        self
    }

    /// Set the extensions of the paired implementation and declaration files.
    pub fn with_extensions(mut self, source_ext: &str, header_ext: &str) -> Self {
        self.source_ext = source_ext.to_string();
        self.header_ext = header_ext.to_string();
        self
    }

    /// The owning class.
    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    /// The builder collaborator.
    pub fn builder(&self) -> &B {
        &self.builder
    }

    /// Extern signatures collected so far, in registration order.
    pub fn pending_externs(&self) -> &[String] {
        &self.pending_externs
    }

    /// Whether a build unit has been created (the mock window is closed).
    pub fn has_build_unit(&self) -> bool {
        !matches!(self.phase, BuildPhase::Unbuilt)
    }

    /// Whether the SUT has been realized.
    pub fn is_realized(&self) -> bool {
        matches!(self.phase, BuildPhase::Realized { .. })
    }

    /// Register an extern to be replaced by a mock.
    ///
    /// Only effective before the build unit exists. Afterwards the call is a
    /// no-op under [`LateMockPolicy::Ignore`] (the default) and an error under
    /// [`LateMockPolicy::Reject`]; either way the built unit is unchanged.
    pub fn register_mock(&mut self, signature: impl Into<String>) -> Result<()> {
        let signature = signature.into();

        if !self.has_build_unit() {
            tracing::debug!("{}: registered mock `{}`", self.origin.identity(), signature);
            self.pending_externs.push(signature);
            return Ok(());
        }

        match self.late_mocks {
            LateMockPolicy::Ignore => {
                tracing::warn!(
                    "{}: ignoring mock `{}` registered after the build started",
                    self.origin.identity(),
                    signature
                );
                Ok(())
            }
            LateMockPolicy::Reject => Err(HarnessError::LateMock {
                unit: self.origin.test_name(),
                signature,
            }),
        }
    }

    /// Create the build unit from the pending externs, once.
    ///
    /// Repeated calls return the cached unit without touching the builder.
    pub fn ensure_build_unit(&mut self) -> &B::Unit {
        if let BuildPhase::Unbuilt = self.phase {
            let unit = self.collect_unit();
            self.phase = BuildPhase::Collected(unit);
        }

        match &self.phase {
            BuildPhase::Collected(unit)
            | BuildPhase::Realized { unit, .. }
            | BuildPhase::Failed { unit, .. } => unit,
            BuildPhase::Unbuilt => unreachable!("build unit was collected above"),
        }
    }

    fn collect_unit(&self) -> B::Unit {
        let name = self.origin.test_name();
        tracing::debug!(
            "{}: collecting build unit `{}` with {} extern(s)",
            self.origin.identity(),
            name,
            self.pending_externs.len()
        );

        self.builder
            .create_unit(&name)
            .source_folder_relative(&self.origin.source_file())
            .source_file(format!("{}.{}", name, self.source_ext))
            .header_file(format!("{}.{}", name, self.header_ext))
            .externs(self.pending_externs.clone())
    }

    /// Realize the system under test, once.
    ///
    /// The first call builds; later calls return the same `Arc`. A failed
    /// build is cached too: every later call returns the same error without
    /// invoking the builder again.
    pub fn ensure_sut(&mut self) -> Result<Arc<LoadedOf<B>>> {
        self.ensure_build_unit();

        match &self.phase {
            BuildPhase::Realized { sut, .. } => return Ok(Arc::clone(sut)),
            BuildPhase::Failed { error, .. } => return Err(error.clone().into()),
            BuildPhase::Collected(_) | BuildPhase::Unbuilt => {}
        }

        let BuildPhase::Collected(unit) = std::mem::replace(&mut self.phase, BuildPhase::Unbuilt)
        else {
            unreachable!("phase checked above");
        };

        match unit.realize() {
            Ok(loaded) => {
                let sut = Arc::new(loaded);
                self.phase = BuildPhase::Realized {
                    unit,
                    sut: Arc::clone(&sut),
                };
                Ok(sut)
            }
            Err(error) => {
                tracing::debug!("{}: build failed: {}", self.origin.identity(), error);
                self.phase = BuildPhase::Failed {
                    unit,
                    error: error.clone(),
                };
                Err(error.into())
            }
        }
    }

    /// Drop the build unit, the SUT and every registered extern.
    pub fn reset(&mut self) {
        tracing::debug!(
            "{}: reset from {}",
            self.origin.identity(),
            self.phase.name()
        );
        self.phase = BuildPhase::Unbuilt;
        self.pending_externs.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RecordingBuilder;

    fn state(builder: &RecordingBuilder) -> BuildState<RecordingBuilder> {
        BuildState::new(
            Origin::new("/work/crate", "tests/sensor_test.rs", "sensor_test"),
            builder.clone(),
        )
    }

    #[test]
    fn test_builds_once() {
        let builder = RecordingBuilder::new();
        let mut state = state(&builder);

        let first = state.ensure_sut().unwrap();
        let second = state.ensure_sut().unwrap();
        let third = state.ensure_sut().unwrap();

        assert_eq!(builder.realize_count(), 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&second, &third));
    }

    #[test]
    fn test_unit_inputs_follow_origin() {
        let builder = RecordingBuilder::new();
        let mut state = state(&builder).with_extensions("cc", "hh");
        state.ensure_sut().unwrap();

        let record = builder.last_unit().unwrap();
        assert_eq!(record.name, "sensor_test");
        assert_eq!(record.sources, vec!["sensor_test.cc"]);
        assert_eq!(record.headers, vec!["sensor_test.hh"]);
        assert!(record
            .source_folder
            .ends_with(std::path::Path::new("crate").join("tests")));
    }

    #[test]
    fn test_mocks_before_build_reach_builder_in_order() {
        let builder = RecordingBuilder::new();
        let mut state = state(&builder);

        state.register_mock("int read_sensor(int)").unwrap();
        state.register_mock("void log_event(const char *)").unwrap();
        state.ensure_sut().unwrap();

        assert_eq!(
            builder.last_unit().unwrap().externs,
            vec!["int read_sensor(int)", "void log_event(const char *)"]
        );
    }

    #[test]
    fn test_late_mock_is_ignored_by_default() {
        let builder = RecordingBuilder::new();
        let mut state = state(&builder);

        state.register_mock("int a(void)").unwrap();
        let sut = state.ensure_sut().unwrap();
        state.register_mock("int b(void)").unwrap();
        let again = state.ensure_sut().unwrap();

        assert_eq!(state.pending_externs(), ["int a(void)"]);
        assert_eq!(builder.last_unit().unwrap().externs, vec!["int a(void)"]);
        assert_eq!(builder.realize_count(), 1);
        assert!(Arc::ptr_eq(&sut, &again));
    }

    #[test]
    fn test_mock_window_closes_at_build_unit() {
        let builder = RecordingBuilder::new();
        let mut state = state(&builder);

        state.ensure_build_unit();
        state.register_mock("int late(void)").unwrap();
        state.ensure_sut().unwrap();

        assert!(builder.last_unit().unwrap().externs.is_empty());
    }

    #[test]
    fn test_late_mock_rejected_in_strict_mode() {
        let builder = RecordingBuilder::new();
        let mut state = state(&builder).with_late_mocks(LateMockPolicy::Reject);

        state.ensure_sut().unwrap();
        let err = state.register_mock("int late(void)").unwrap_err();

        assert!(matches!(err, HarnessError::LateMock { .. }));
        assert!(state.pending_externs().is_empty());
    }

    #[test]
    fn test_ensure_build_unit_is_idempotent() {
        let builder = RecordingBuilder::new();
        let mut state = state(&builder);

        let first = state.ensure_build_unit().id;
        let second = state.ensure_build_unit().id;

        assert_eq!(first, second);
        assert_eq!(builder.units_created(), 1);
        assert_eq!(builder.realize_count(), 0);
        assert!(state.has_build_unit());
        assert!(!state.is_realized());
    }

    #[test]
    fn test_build_error_is_cached_not_retried() {
        let builder = RecordingBuilder::failing("sensor_test.c:4: error: expected ';'");
        let mut state = state(&builder);

        let first = state.ensure_sut().unwrap_err();
        let second = state.ensure_sut().unwrap_err();

        assert!(matches!(first, HarnessError::Build(_)));
        assert!(first.to_string().contains("expected ';'"));
        assert_eq!(first.to_string(), second.to_string());
        assert_eq!(builder.realize_count(), 1);
        assert!(!state.is_realized());
    }

    #[test]
    fn test_reset_restores_virgin_state() {
        let builder = RecordingBuilder::new();
        let mut state = state(&builder);

        state.register_mock("int before(void)").unwrap();
        let old = state.ensure_sut().unwrap();

        state.reset();
        assert!(!state.has_build_unit());
        assert!(state.pending_externs().is_empty());

        state.register_mock("int after(void)").unwrap();
        let new = state.ensure_sut().unwrap();

        assert_eq!(builder.realize_count(), 2);
        assert!(!Arc::ptr_eq(&old, &new));
        assert_eq!(builder.last_unit().unwrap().externs, vec!["int after(void)"]);
    }

    #[test]
    fn test_late_mock_policy_from_str() {
        assert_eq!("Reject".parse::<LateMockPolicy>().unwrap(), LateMockPolicy::Reject);
        assert_eq!(" ignore ".parse::<LateMockPolicy>().unwrap(), LateMockPolicy::Ignore);
        assert!("strict".parse::<LateMockPolicy>().is_err());
    }
}
