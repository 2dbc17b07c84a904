//! Harness error types.
//!
//! Every failure from the builder or the filesystem surfaces unmodified to
//! the test that triggered it; nothing here is retried.

use miette::Diagnostic;
use thiserror::Error;

/// Result alias used across the harness.
pub type Result<T, E = HarnessError> = std::result::Result<T, E>;

/// The builder failed to compile, link or load a unit.
///
/// `Clone` so a failed build can be replayed to every later `sut` access in
/// the same class without invoking the builder again.
#[derive(Debug, Clone, Error, Diagnostic)]
#[error("failed to build `{unit}`: {message}")]
#[diagnostic(
    code(ctdd::build),
    help("the compiler output above is reported unmodified; fix the unit and rerun")
)]
pub struct BuildError {
    /// Name of the build unit
    pub unit: String,
    /// Diagnostic produced by the builder
    pub message: String,
}

impl BuildError {
    /// Create a build error for a unit.
    pub fn new(unit: impl Into<String>, message: impl Into<String>) -> Self {
        BuildError {
            unit: unit.into(),
            message: message.into(),
        }
    }
}

/// Errors surfaced to test code.
#[derive(Debug, Error, Diagnostic)]
pub enum HarnessError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Build(#[from] BuildError),

    #[error("no binding for extern `{name}` in `{unit}`")]
    #[diagnostic(
        code(ctdd::binding_not_found),
        help("register the signature with `register_mock` before the first `sut` access")
    )]
    BindingNotFound { unit: String, name: String },

    #[error("mock `{signature}` registered after `{unit}` was built")]
    #[diagnostic(
        code(ctdd::late_mock),
        help("register mocks in the `set_up_mocks` hook, before any test touches `sut`")
    )]
    LateMock { unit: String, signature: String },

    #[error("invalid extern signature `{signature}`: {reason}")]
    #[diagnostic(code(ctdd::signature))]
    Signature { signature: String, reason: String },

    #[error("mock for `{name}` takes {given} argument(s), but the extern declares {declared}")]
    #[diagnostic(code(ctdd::signature_mismatch))]
    SignatureMismatch {
        name: String,
        given: usize,
        declared: usize,
    },

    #[error("test id `{id}` has no characters usable in a folder name")]
    #[diagnostic(code(ctdd::test_id))]
    TestId { id: String },

    #[error("{0:#}")]
    #[diagnostic(code(ctdd::filesystem))]
    Filesystem(anyhow::Error),

    #[error("no C compiler found")]
    #[diagnostic(
        code(ctdd::no_toolchain),
        help("set the CC environment variable, configure `[toolchain] cc`, or install a compiler")
    )]
    NoToolchain,

    #[error("{0:#}")]
    #[diagnostic(code(ctdd::config))]
    Config(anyhow::Error),
}
