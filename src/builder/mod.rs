//! The builder/loader collaborator.
//!
//! The harness only decides *when* a unit is built; *how* it is built sits
//! behind these traits. [`NativeBuilder`] compiles with the detected C
//! toolchain and loads the result as a shared library.

use std::ffi::c_void;
use std::path::Path;

use crate::error::{BuildError, Result};

pub mod native;
pub mod stubs;
pub mod toolchain;

pub use native::{NativeBuilder, NativeSut, NativeUnit};
pub use stubs::ExternSignature;
pub use toolchain::{detect_toolchain, CommandSpec, GccToolchain, Toolchain, ToolchainPlatform};

/// Address of a function inside (or handed to) a loaded unit.
pub type RawSymbol = *const c_void;

/// Creates build units.
pub trait Builder {
    /// The handle for inputs collected but not yet realized.
    type Unit: BuildUnit;

    /// Start a new build unit named `name`.
    fn create_unit(&self, name: &str) -> Self::Unit;
}

/// Inputs collected for one build, realized at most once by the harness.
pub trait BuildUnit {
    /// The loaded artifact produced by [`BuildUnit::realize`].
    type Loaded: LoadedUnit;

    /// Resolve source and header files against the folder containing `origin_file`.
    fn source_folder_relative(self, origin_file: &Path) -> Self
    where
        Self: Sized;

    /// Add an implementation file.
    fn source_file(self, filename: String) -> Self
    where
        Self: Sized;

    /// Add a declaration file.
    fn header_file(self, filename: String) -> Self
    where
        Self: Sized;

    /// Declare the externs the binding surface must expose an attachment point for.
    ///
    /// Order is preserved in the generated bindings.
    fn externs(self, signatures: Vec<String>) -> Self
    where
        Self: Sized;

    /// Compile, link and load the unit.
    fn realize(&self) -> std::result::Result<Self::Loaded, BuildError>;
}

/// A realized unit that test code can call into.
pub trait LoadedUnit: Send + Sync {
    /// Bind `target` to the attachment point of the extern `name`.
    ///
    /// Fails with `BindingNotFound` when the unit has no attachment point
    /// for `name`.
    fn attach(&self, name: &str, target: RawSymbol) -> Result<()>;

    /// Look up the exported binding `name`.
    fn resolve(&self, name: &str) -> Result<RawSymbol>;
}
