//! Handler resolution from a task root.
//!
//! Entry points linked into the bootstrap are consulted first. Otherwise the
//! entry path is looked up as an executable on the search path built from the
//! task root:
//!
//! 1. the task root itself
//! 2. every `*.bundle` directly under the root
//! 3. every `*.bundle` directly under `<root>/lib`

use crate::entry_point::{BoundMethod, EntryPointRegistry};
use crate::interfaces::{Handler, InitError};
use crate::process_handler::ExecutableHandler;
use crate::types::HandlerReference;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// File extension marking a bundle on the search path.
pub const BUNDLE_EXTENSION: &str = "bundle";

/// Dependency directory scanned one level deep for bundles.
pub const LIB_DIR: &str = "lib";

/// Ordered list of locations an entry point is looked up in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchPath {
    entries: Vec<PathBuf>,
}

impl SearchPath {
    /// Build the search path for a task root.
    ///
    /// # Errors
    /// Fails if the task root cannot be listed.
    pub fn build(task_root: &Path) -> std::io::Result<Self> {
        let mut entries = vec![task_root.to_path_buf()];
        entries.extend(list_bundles(task_root)?);

        let lib = task_root.join(LIB_DIR);
        if lib.is_dir() {
            entries.extend(list_bundles(&lib)?);
        }

        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[PathBuf] {
        &self.entries
    }

    /// Find an executable entry point by relative path.
    pub fn find_executable(&self, entry_path: &str) -> Option<PathBuf> {
        let relative = Path::new(entry_path);
        if relative.is_absolute() {
            return None;
        }

        self.entries.iter().find_map(|entry| {
            let candidate = if entry.is_dir() {
                entry.join(relative)
            } else if entry.file_stem().and_then(|s| s.to_str()) == Some(entry_path) {
                entry.clone()
            } else {
                return None;
            };
            is_executable(&candidate).then_some(candidate)
        })
    }
}

fn list_bundles(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut bundles = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) == Some(BUNDLE_EXTENSION) {
            bundles.push(path);
        }
    }
    bundles.sort();
    Ok(bundles)
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Resolves handler references into invocable handlers.
pub struct HandlerResolver {
    registry: Arc<EntryPointRegistry>,
}

impl HandlerResolver {
    pub fn new(registry: Arc<EntryPointRegistry>) -> Self {
        Self { registry }
    }

    /// Resolve `handler_ref` against `task_root`.
    ///
    /// # Errors
    /// * `MalformedHandlerReference` - missing `::` or empty part
    /// * `EntryPointNotFound` - not registered and not on the search path
    /// * `MethodNotFound` - the entry point does not declare the method
    pub fn resolve(
        &self,
        task_root: &Path,
        handler_ref: &str,
    ) -> Result<Arc<dyn Handler>, InitError> {
        let reference = HandlerReference::parse(handler_ref)?;
        info!("Resolving handler {} from {}", reference, task_root.display());

        if let Some(instance) = self.registry.instantiate(&reference.entry_path) {
            let instance = instance.map_err(|reason| InitError::EntryPointNotFound {
                entry: reference.entry_path.clone(),
                reason,
            })?;
            let bound =
                BoundMethod::bind(&reference.entry_path, instance, &reference.method_name)?;
            debug!("Bound registered entry point {}", reference);
            return Ok(Arc::new(bound));
        }
        debug!(
            "{} is not a registered entry point (registered: {:?})",
            reference.entry_path,
            self.registry.names()
        );

        let search_path =
            SearchPath::build(task_root).map_err(|e| InitError::EntryPointNotFound {
                entry: reference.entry_path.clone(),
                reason: format!("cannot read task root {}: {}", task_root.display(), e),
            })?;
        debug!("Search path: {:?}", search_path.entries());

        let program = search_path
            .find_executable(&reference.entry_path)
            .ok_or_else(|| InitError::EntryPointNotFound {
                entry: reference.entry_path.clone(),
                reason: format!(
                    "no executable found on search path of {} entries",
                    search_path.entries().len()
                ),
            })?;

        info!("Resolved {} to executable {}", reference, program.display());
        Ok(Arc::new(ExecutableHandler::new(
            program,
            reference.method_name,
            task_root.to_path_buf(),
        )))
    }
}
