//! Native builder: compiles a C unit plus its mock bindings into a shared
//! library with the detected toolchain and loads it into the test process.

use std::ffi::c_void;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use libloading::Library;

use super::stubs::{self, ExternSignature};
use super::toolchain::{detect_toolchain, CommandSpec, CompileInput, LinkInput, Toolchain};
use super::{BuildUnit, Builder, LoadedUnit, RawSymbol};
use crate::error::{BuildError, HarnessError, Result};
use crate::util::config::Config;
use crate::util::fs;
use crate::util::hash::Fingerprint;
use crate::util::process::ProcessBuilder;

/// Define passed to every translation unit built by the harness.
pub const UNIT_TEST_DEFINE: &str = "CTDD_UNIT_TEST";

/// Hex digits in a build folder's fingerprint suffix.
const FINGERPRINT_LEN: usize = 16;

static REALIZATIONS: AtomicU64 = AtomicU64::new(0);

/// Tag naming the files of one realization: unique within this process and
/// across processes sharing a build root.
///
/// The loader hands back the already mapped image when a path is opened
/// twice, so two realizations must never link the same library path.
fn realization_tag() -> String {
    let n = REALIZATIONS.fetch_add(1, Ordering::SeqCst) + 1;
    format!("{}-{}", std::process::id(), n)
}

/// Builds units with a C toolchain.
#[derive(Debug, Clone)]
pub struct NativeBuilder {
    toolchain: Arc<dyn Toolchain>,
    build_root: PathBuf,
    cflags: Vec<String>,
    ldflags: Vec<String>,
    emit_compile_commands: bool,
}

impl NativeBuilder {
    /// Create a builder that places unit build folders under `build_root`.
    pub fn new(toolchain: Box<dyn Toolchain>, build_root: impl Into<PathBuf>) -> Self {
        NativeBuilder {
            toolchain: Arc::from(toolchain),
            build_root: build_root.into(),
            cflags: Vec::new(),
            ldflags: Vec::new(),
            emit_compile_commands: false,
        }
    }

    /// Detect a toolchain and apply compiler settings from the config.
    pub fn from_config(config: &Config) -> Result<Self> {
        let toolchain = detect_toolchain(&config.toolchain).ok_or(HarnessError::NoToolchain)?;
        Ok(NativeBuilder::new(toolchain, config.workspace.root_folder())
            .with_cflags(config.toolchain.cflags.clone())
            .with_ldflags(config.toolchain.ldflags.clone())
            .with_compile_commands(config.build.emit_compile_commands()))
    }

    /// Extra compiler flags for every translation unit.
    pub fn with_cflags(mut self, cflags: Vec<String>) -> Self {
        self.cflags = cflags;
        self
    }

    /// Extra linker flags.
    pub fn with_ldflags(mut self, ldflags: Vec<String>) -> Self {
        self.ldflags = ldflags;
        self
    }

    /// Write compile_commands.json into each unit's build folder.
    pub fn with_compile_commands(mut self, emit: bool) -> Self {
        self.emit_compile_commands = emit;
        self
    }

    /// The toolchain used for compiling and linking.
    pub fn toolchain(&self) -> &dyn Toolchain {
        self.toolchain.as_ref()
    }
}

impl Builder for NativeBuilder {
    type Unit = NativeUnit;

    fn create_unit(&self, name: &str) -> NativeUnit {
        NativeUnit {
            name: name.to_string(),
            builder: self.clone(),
            source_folder: PathBuf::new(),
            sources: Vec::new(),
            headers: Vec::new(),
            externs: Vec::new(),
        }
    }
}

/// Collected inputs for one native build.
#[derive(Debug)]
pub struct NativeUnit {
    name: String,
    builder: NativeBuilder,
    source_folder: PathBuf,
    sources: Vec<String>,
    headers: Vec<String>,
    externs: Vec<String>,
}

impl NativeUnit {
    /// Unit name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Folder sources and headers are resolved against.
    pub fn source_folder(&self) -> &Path {
        &self.source_folder
    }

    /// Extern declarations the bindings are generated for.
    pub fn declared_externs(&self) -> &[String] {
        &self.externs
    }

    fn fail(&self, message: impl Into<String>) -> BuildError {
        BuildError::new(&self.name, message)
    }

    /// Folder for this unit's intermediate files, keyed by everything that
    /// feeds the build.
    fn build_folder(&self) -> anyhow::Result<PathBuf> {
        let mut fp = Fingerprint::new();
        fp.update_str(&self.name)
            .update_str(&self.builder.toolchain.compiler_path().display().to_string())
            .update_strs(self.externs.iter().map(String::as_str))
            .update_strs(self.builder.cflags.iter().map(String::as_str))
            .update_strs(self.builder.ldflags.iter().map(String::as_str));
        for file in self.sources.iter().chain(&self.headers) {
            fp.update_file(&self.source_folder.join(file))?;
        }
        Ok(self
            .builder
            .build_root
            .join(format!("{}-{}", self.name, fp.finish_short())))
    }

    /// Remove this unit's build folders for older fingerprints. Returns the
    /// removed folders; failures are logged and skipped.
    fn prune_stale_folders(&self, current: &Path) -> Vec<PathBuf> {
        let Ok(entries) = std::fs::read_dir(&self.builder.build_root) else {
            return Vec::new();
        };
        let prefix = format!("{}-", self.name);

        let mut removed = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path == current || !path.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let Some(suffix) = name.to_str().and_then(|n| n.strip_prefix(&prefix)) else {
                continue;
            };
            if suffix.len() != FINGERPRINT_LEN || !suffix.bytes().all(|b| b.is_ascii_hexdigit()) {
                continue;
            }
            match fs::remove_dir_all(&path) {
                Ok(()) => {
                    tracing::debug!("remove stale build folder {}", path.display());
                    removed.push(path);
                }
                Err(e) => tracing::warn!("{:#}", e),
            }
        }
        removed
    }

    fn run(&self, spec: &CommandSpec) -> std::result::Result<(), BuildError> {
        ProcessBuilder::from_spec(spec)
            .exec_and_check()
            .map(|_| ())
            .map_err(|e| self.fail(format!("{:#}", e)))
    }

    fn write_compile_commands(
        &self,
        folder: &Path,
        tag: &str,
        specs: &[(PathBuf, CommandSpec)],
    ) -> anyhow::Result<()> {
        let entries: Vec<serde_json::Value> = specs
            .iter()
            .map(|(source, spec)| {
                let mut arguments = vec![spec.program.display().to_string()];
                arguments.extend(spec.args.iter().cloned());
                serde_json::json!({
                    "directory": folder.display().to_string(),
                    "file": source.display().to_string(),
                    "arguments": arguments,
                })
            })
            .collect();
        let json = serde_json::to_string_pretty(&entries)?;
        fs::write_string_atomic(&folder.join("compile_commands.json"), &json, tag)
    }
}

impl BuildUnit for NativeUnit {
    type Loaded = NativeSut;

    fn source_folder_relative(mut self, origin_file: &Path) -> Self {
        self.source_folder = origin_file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        self
    }

    fn source_file(mut self, filename: String) -> Self {
        self.sources.push(filename);
        self
    }

    fn header_file(mut self, filename: String) -> Self {
        self.headers.push(filename);
        self
    }

    fn externs(mut self, signatures: Vec<String>) -> Self {
        self.externs.extend(signatures);
        self
    }

    fn realize(&self) -> std::result::Result<NativeSut, BuildError> {
        let externs = stubs::parse_all(&self.externs).map_err(|e| self.fail(e.to_string()))?;

        for file in self.sources.iter().chain(&self.headers) {
            let path = self.source_folder.join(file);
            if !path.is_file() {
                return Err(self.fail(format!("missing input file: {}", path.display())));
            }
        }

        let folder = self
            .build_folder()
            .map_err(|e| self.fail(format!("{:#}", e)))?;
        fs::ensure_dir(&folder).map_err(|e| self.fail(format!("{:#}", e)))?;
        self.prune_stale_folders(&folder);

        tracing::info!(
            "building `{}` with {} mocked extern(s) in {}",
            self.name,
            externs.len(),
            folder.display()
        );

        let tag = realization_tag();
        let stub_path = folder.join(format!("{}_mocks.c", self.name));
        let stub_code = stubs::generate_stubs(&self.name, &self.headers, &externs);
        fs::write_string_atomic(&stub_path, &stub_code, &tag)
            .map_err(|e| self.fail(format!("{:#}", e)))?;

        let mut objects = Vec::new();
        let linked = self.compile_and_link(&folder, &tag, stub_path, &mut objects);
        for object in &objects {
            if let Err(e) = std::fs::remove_file(object) {
                tracing::debug!("failed to remove {}: {}", object.display(), e);
            }
        }

        NativeSut::load(&self.name, &linked?, externs)
    }
}

impl NativeUnit {
    /// Compile every source plus the bindings and link them into a shared
    /// library named after `tag`. Object files are pushed to `objects` as
    /// they are produced so the caller can clean them up on any outcome.
    fn compile_and_link(
        &self,
        folder: &Path,
        tag: &str,
        stub_path: PathBuf,
        objects: &mut Vec<PathBuf>,
    ) -> std::result::Result<PathBuf, BuildError> {
        let toolchain = &self.builder.toolchain;
        let mut inputs: Vec<PathBuf> = self
            .sources
            .iter()
            .map(|s| self.source_folder.join(s))
            .collect();
        inputs.push(stub_path);

        let mut specs = Vec::with_capacity(inputs.len());
        for source in inputs {
            let stem = source
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| self.name.clone());
            let input = CompileInput {
                output: folder.join(format!("{}-{}.{}", stem, tag, toolchain.object_extension())),
                source: source.clone(),
                include_dirs: vec![self.source_folder.clone()],
                defines: vec![(UNIT_TEST_DEFINE.to_string(), None)],
                cflags: self.builder.cflags.clone(),
                pic: true,
            };
            let spec = toolchain.compile_command(&input);
            objects.push(input.output);
            self.run(&spec)?;
            specs.push((source, spec));
        }

        if self.builder.emit_compile_commands {
            if let Err(e) = self.write_compile_commands(folder, tag, &specs) {
                tracing::warn!("failed to write compile_commands.json: {:#}", e);
            }
        }

        let library = folder.join(format!(
            "{}{}-{}.{}",
            toolchain.shared_lib_prefix(),
            self.name,
            tag,
            toolchain.shared_lib_extension()
        ));
        let link = LinkInput {
            objects: objects.clone(),
            output: library.clone(),
            lib_dirs: Vec::new(),
            libs: Vec::new(),
            ldflags: self.builder.ldflags.clone(),
        };
        self.run(&toolchain.link_shared_command(&link))?;
        Ok(library)
    }
}

/// A unit loaded into the test process as a shared library.
#[derive(Debug)]
pub struct NativeSut {
    name: String,
    path: PathBuf,
    externs: Vec<ExternSignature>,
    library: Library,
}

impl NativeSut {
    fn load(
        name: &str,
        path: &Path,
        externs: Vec<ExternSignature>,
    ) -> std::result::Result<Self, BuildError> {
        // SAFETY: the library was just linked from the unit's own sources and
        // the generated bindings; running its initializers is the point.
        let library = unsafe { Library::new(path) }.map_err(|e| {
            let _ = std::fs::remove_file(path);
            BuildError::new(name, format!("failed to load {}: {}", path.display(), e))
        })?;

        Ok(NativeSut {
            name: name.to_string(),
            path: path.to_path_buf(),
            externs,
            library,
        })
    }

    /// Path of the loaded shared library.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Externs this unit has attachment points for.
    pub fn externs(&self) -> &[ExternSignature] {
        &self.externs
    }

    fn not_found(&self, name: &str) -> HarnessError {
        HarnessError::BindingNotFound {
            unit: self.name.clone(),
            name: name.to_string(),
        }
    }
}

impl Drop for NativeSut {
    fn drop(&mut self) {
        // The mapped image outlives its file; the library closes right after.
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::debug!("failed to remove {}: {}", self.path.display(), e);
        }
    }
}

impl LoadedUnit for NativeSut {
    fn attach(&self, name: &str, target: RawSymbol) -> Result<()> {
        if !self.externs.iter().any(|e| e.name == name) {
            return Err(self.not_found(name));
        }
        let registrar = stubs::attach_symbol(name);
        // SAFETY: registrars are generated as `void ctdd_attach_<name>(void *)`.
        let register = unsafe {
            self.library
                .get::<unsafe extern "C" fn(*const c_void)>(registrar.as_bytes())
        }
        .map_err(|_| self.not_found(name))?;
        // SAFETY: the registrar only stores the pointer in its slot.
        unsafe { register(target) };
        Ok(())
    }

    fn resolve(&self, name: &str) -> Result<RawSymbol> {
        // SAFETY: only the symbol address is read; nothing is called here.
        let symbol = unsafe { self.library.get::<*const c_void>(name.as_bytes()) }
            .map_err(|_| self.not_found(name))?;
        Ok(*symbol)
    }
}
