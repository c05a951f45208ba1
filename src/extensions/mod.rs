//! Extension lifecycle management
//!
//! Extensions are loadable primitive libraries reconciled against the
//! program's declared extension list once per full compilation. Each known
//! extension carries two independent flags: `loaded` (its load hook has
//! run and not been undone) and `live` (it appears in the current
//! program's extension list). `loaded && !live` is only valid inside the
//! recompilation window; any container still in that state when the pass
//! finishes is unloaded and evicted.

pub mod manifest;

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, warn};

use crate::EXTENSION_API_VERSION;
use crate::workspace::Workspace;

pub use manifest::{ExtensionManifest, MANIFEST_FILE, read_manifest};

/// Extension-load and reconciliation errors.
#[derive(Debug, Error)]
pub enum ExtensionError {
    /// No archive found for the extension name.
    #[error(
        "can't find extension {0}; looked in the model directory and the extensions directory"
    )]
    NotFound(String),

    /// Archive exists but carries no manifest.
    #[error("extension archive {0} has no manifest")]
    MissingManifest(PathBuf),

    /// Manifest exists but does not parse.
    #[error("invalid extension manifest {path}: {detail}")]
    InvalidManifest {
        /// Manifest path.
        path: PathBuf,
        /// Parse failure detail.
        detail: String,
    },

    /// The manifest names a manager type the catalog does not know — the
    /// named type does not implement the plugin contract.
    #[error("manager type {0} is not a registered extension plugin")]
    UnknownManager(String),

    /// The archive targets a different extension API and the user
    /// declined to continue.
    #[error("extension {extension} targets API {found}, this engine provides {expected}")]
    ApiVersion {
        /// Extension name.
        extension: String,
        /// Version the engine provides.
        expected: String,
        /// Version the archive targets.
        found: String,
    },

    /// The extension's load hook failed.
    #[error("extension {0} failed to load: {1}")]
    LoadFailed(String, String),

    /// The extension's unload hook failed.
    #[error("extension {0} failed to unload: {1}")]
    UnloadFailed(String, String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Convenience result alias for extension operations.
pub type ExtensionResult<T> = std::result::Result<T, ExtensionError>;

/// Whether a registered primitive is a command or a reporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveKind {
    /// Performs a side effect.
    Command,
    /// Evaluates to a value.
    Reporter,
}

impl PrimitiveKind {
    fn label(self) -> &'static str {
        match self {
            PrimitiveKind::Command => "command",
            PrimitiveKind::Reporter => "reporter",
        }
    }
}

/// One primitive registered by an extension.
#[derive(Debug, Clone)]
pub struct PrimitiveSpec {
    /// Unqualified primitive name.
    pub name: String,
    /// Command or reporter.
    pub kind: PrimitiveKind,
}

/// Collects primitive registrations during an extension's load hook.
#[derive(Debug, Default)]
pub struct PrimitiveRegistrar {
    primitives: Vec<PrimitiveSpec>,
}

impl PrimitiveRegistrar {
    /// Register a command primitive.
    pub fn register_command(&mut self, name: impl Into<String>) {
        self.primitives.push(PrimitiveSpec {
            name: name.into(),
            kind: PrimitiveKind::Command,
        });
    }

    /// Register a reporter primitive.
    pub fn register_reporter(&mut self, name: impl Into<String>) {
        self.primitives.push(PrimitiveSpec {
            name: name.into(),
            kind: PrimitiveKind::Reporter,
        });
    }

    fn into_specs(self) -> Vec<PrimitiveSpec> {
        self.primitives
    }
}

/// The load/unload and primitive-registration contract an extension's
/// manager type implements.
pub trait ExtensionPlugin: Send {
    /// Initialization hook; registers the extension's primitives. Called
    /// at most once per loaded lifetime.
    fn load(&mut self, registrar: &mut PrimitiveRegistrar) -> ExtensionResult<()>;

    /// Teardown hook, invoked when the extension leaves the program.
    fn unload(&mut self) -> ExtensionResult<()> {
        Ok(())
    }
}

/// Factory producing fresh plugin instances for one manager type.
pub type PluginFactory = Arc<dyn Fn() -> Box<dyn ExtensionPlugin> + Send + Sync>;

/// Process-wide catalog of plugin manager types, keyed by the manifest's
/// `class_manager` attribute. Registration happens before any compilation.
pub struct ExtensionCatalog {
    factories: RwLock<HashMap<String, PluginFactory>>,
}

static CATALOG: Lazy<ExtensionCatalog> = Lazy::new(|| ExtensionCatalog {
    factories: RwLock::new(HashMap::new()),
});

impl ExtensionCatalog {
    /// Access the global catalog singleton.
    pub fn global() -> &'static Self {
        &CATALOG
    }

    /// Register a manager type.
    pub fn register<F>(&self, manager_type: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn ExtensionPlugin> + Send + Sync + 'static,
    {
        self.factories
            .write()
            .insert(manager_type.into(), Arc::new(factory));
    }

    /// Instantiate a manager type, if registered.
    pub fn instantiate(&self, manager_type: &str) -> Option<Box<dyn ExtensionPlugin>> {
        self.factories.read().get(manager_type).map(|f| f())
    }
}

/// Record for one known extension: its resolved archive, its plugin
/// instance, its primitive table, and the loaded/live flag pair.
pub struct ExtensionContainer {
    /// Registered extension name from the manifest.
    pub name: String,
    path: PathBuf,
    manager_type: String,
    modified: SystemTime,
    plugin: Box<dyn ExtensionPlugin>,
    primitives: Vec<PrimitiveSpec>,
    auto_import: bool,
    /// Initialization has run and not been undone.
    pub loaded: bool,
    /// Appears in the current program's extension list.
    pub live: bool,
}

/// A qualified-or-unqualified primitive lookup result.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedPrimitive<'a> {
    /// Name of the extension providing the primitive.
    pub extension: &'a str,
    /// The primitive itself.
    pub primitive: &'a PrimitiveSpec,
}

/// Loads and unloads extensions on a per-compilation basis.
pub struct ExtensionManager {
    containers: Vec<ExtensionContainer>,
    model_dir: PathBuf,
    extensions_root: Option<PathBuf>,
}

impl ExtensionManager {
    /// Manager resolving archives relative to `model_dir`, then (if set)
    /// under the shared `extensions_root`.
    pub fn new(model_dir: PathBuf, extensions_root: Option<PathBuf>) -> Self {
        Self {
            containers: Vec::new(),
            model_dir,
            extensions_root,
        }
    }

    /// Begin a full compilation pass: every known extension's `live` flag
    /// drops; `loaded` is untouched.
    pub fn start_full_compilation(&mut self) {
        for container in &mut self.containers {
            container.live = false;
        }
    }

    /// Resolve an extension name to its archive: an explicit `file:` URL
    /// wins, then a path relative to the model, then the shared search
    /// root. First match wins; no match is a hard error naming the
    /// extension.
    fn resolve(&self, name: &str) -> ExtensionResult<PathBuf> {
        let mut candidates: Vec<PathBuf> = Vec::new();
        if let Some(rest) = name.strip_prefix("file:") {
            candidates.push(PathBuf::from(rest));
        } else {
            candidates.push(self.model_dir.join(name));
            if let Some(root) = &self.extensions_root {
                candidates.push(root.join(name));
            }
        }
        for candidate in candidates {
            if candidate.is_dir() {
                return Ok(candidate.canonicalize()?);
            }
        }
        Err(ExtensionError::NotFound(name.to_string()))
    }

    fn archive_modified(path: &Path) -> ExtensionResult<SystemTime> {
        Ok(std::fs::metadata(path.join(MANIFEST_FILE))?.modified()?)
    }

    /// Import one extension name from the program's declared list.
    ///
    /// The container is keyed by resolved path and reused across
    /// recompilations; its load hook runs at most once per loaded
    /// lifetime. A changed archive timestamp forces unload-then-reload
    /// even if nominally loaded. An API-version mismatch is put to the
    /// user; declining aborts the import.
    pub fn import_extension(
        &mut self,
        name: &str,
        workspace: &dyn Workspace,
    ) -> ExtensionResult<()> {
        let path = self.resolve(name)?;
        let modified = Self::archive_modified(&path)?;

        if let Some(index) = self.containers.iter().position(|c| c.path == path) {
            if self.containers[index].loaded && self.containers[index].modified != modified {
                // Archive replaced on disk between runs: tear down and
                // start over with a fresh plugin instance.
                let container = &mut self.containers[index];
                debug!(extension = %container.name, "archive changed on disk, reloading");
                if let Err(e) = container.plugin.unload() {
                    warn!(extension = %container.name, error = %e, "unload hook failed during reload");
                }
                container.loaded = false;
                container.primitives.clear();
                container.plugin = ExtensionCatalog::global()
                    .instantiate(&container.manager_type)
                    .ok_or_else(|| {
                        ExtensionError::UnknownManager(container.manager_type.clone())
                    })?;
                container.modified = modified;
            }
            let container = &mut self.containers[index];
            if !container.loaded {
                let mut registrar = PrimitiveRegistrar::default();
                container
                    .plugin
                    .load(&mut registrar)
                    .map_err(|e| ExtensionError::LoadFailed(container.name.clone(), e.to_string()))?;
                container.primitives = registrar.into_specs();
                container.loaded = true;
            }
            container.live = true;
            return Ok(());
        }

        // First reference to this archive.
        let manifest = read_manifest(&path)?;
        if let Some(found) = &manifest.api_version {
            if found != EXTENSION_API_VERSION {
                let prompt = format!(
                    "extension {} targets API {found}, this engine provides {EXTENSION_API_VERSION}; continue?",
                    manifest.extension_name
                );
                if !workspace.confirm(&prompt) {
                    return Err(ExtensionError::ApiVersion {
                        extension: manifest.extension_name,
                        expected: EXTENSION_API_VERSION.to_string(),
                        found: found.clone(),
                    });
                }
            }
        }
        let mut plugin = ExtensionCatalog::global()
            .instantiate(&manifest.class_manager)
            .ok_or_else(|| ExtensionError::UnknownManager(manifest.class_manager.clone()))?;
        let mut registrar = PrimitiveRegistrar::default();
        plugin
            .load(&mut registrar)
            .map_err(|e| ExtensionError::LoadFailed(manifest.extension_name.clone(), e.to_string()))?;
        debug!(extension = %manifest.extension_name, path = %path.display(), "extension loaded");
        self.containers.push(ExtensionContainer {
            name: manifest.extension_name,
            path,
            manager_type: manifest.class_manager,
            modified,
            plugin,
            primitives: registrar.into_specs(),
            auto_import: manifest.auto_import,
            loaded: true,
            live: true,
        });
        Ok(())
    }

    /// Finish a full compilation pass: every container still
    /// `loaded && !live` was not re-encountered; its unload hook runs, a
    /// failure is logged and never aborts the sweep, and the record is
    /// evicted.
    pub fn finish_full_compilation(&mut self) {
        self.containers.retain_mut(|container| {
            if container.loaded && !container.live {
                if let Err(e) = container.plugin.unload() {
                    warn!(extension = %container.name, error = %e, "unload hook failed");
                }
                container.loaded = false;
                debug!(extension = %container.name, "extension unloaded");
                false
            } else {
                true
            }
        });
    }

    /// Look up a known extension's record.
    pub fn container(&self, name: &str) -> Option<&ExtensionContainer> {
        self.containers
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Whether the extension is declared by the current program.
    pub fn is_live(&self, name: &str) -> bool {
        self.container(name).is_some_and(|c| c.live)
    }

    /// Resolve a primitive identifier against live extensions only.
    ///
    /// A qualified `ext:name` requires an exact case-insensitive prefix
    /// match on the extension's registered name; an unqualified name
    /// additionally requires the extension to have opted into
    /// auto-import.
    pub fn replace_identifier(&self, identifier: &str) -> Option<ResolvedPrimitive<'_>> {
        match identifier.split_once(':') {
            Some((prefix, name)) => self
                .containers
                .iter()
                .filter(|c| c.live && c.name.eq_ignore_ascii_case(prefix))
                .find_map(|c| {
                    c.primitives
                        .iter()
                        .find(|p| p.name.eq_ignore_ascii_case(name))
                        .map(|primitive| ResolvedPrimitive {
                            extension: c.name.as_str(),
                            primitive,
                        })
                }),
            None => self
                .containers
                .iter()
                .filter(|c| c.live && c.auto_import)
                .find_map(|c| {
                    c.primitives
                        .iter()
                        .find(|p| p.name.eq_ignore_ascii_case(identifier))
                        .map(|primitive| ResolvedPrimitive {
                            extension: c.name.as_str(),
                            primitive,
                        })
                }),
        }
    }

    /// Tab-separated listing of known extensions, stable for tooling.
    pub fn dump_extensions(&self) -> String {
        let mut out = String::from("EXTENSION\tLOADED\tLIVE\tPATH\n");
        for c in &self.containers {
            out.push_str(&format!(
                "{}\t{}\t{}\t{}\n",
                c.name,
                c.loaded,
                c.live,
                c.path.display()
            ));
        }
        out
    }

    /// Tab-separated listing of every known extension's primitives and
    /// their kind.
    pub fn dump_extension_primitives(&self) -> String {
        let mut out = String::from("EXTENSION\tPRIMITIVE\tTYPE\n");
        for c in &self.containers {
            for p in &c.primitives {
                out.push_str(&format!("{}\t{}\t{}\n", c.name, p.name, p.kind.label()));
            }
        }
        out
    }
}
