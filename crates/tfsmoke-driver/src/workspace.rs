use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::DriverError;

/// A private copy of a module tree.
///
/// Concurrent runs each get their own copy so `.terraform/` and local state
/// never collide. The copy is removed on drop unless [`persist`](Self::persist)
/// was called.
#[derive(Debug)]
pub struct ModuleWorkspace {
    root: TempDir,
    module_path: PathBuf,
}

impl ModuleWorkspace {
    /// Directory Terraform should run in.
    pub fn module_path(&self) -> &Path {
        &self.module_path
    }

    /// Root of the temporary copy.
    pub fn root(&self) -> &Path {
        self.root.path()
    }

    /// Keep the copy on disk and return the module path. Used when destroy
    /// fails so the state file survives for manual cleanup.
    pub fn persist(self) -> PathBuf {
        let module_path = self.module_path;
        let root = self.root.keep();
        warn!(path = %root.display(), "retaining module workspace");
        module_path
    }
}

/// Copy `root` into a fresh temp dir and return the location of `module_rel`
/// inside it.
///
/// Hidden entries are skipped (except `.terraform.lock.hcl`), as are
/// `.terraform/` directories and local `terraform.tfstate*` files.
pub fn copy_module_to_temp(root: &Path, module_rel: &Path) -> Result<ModuleWorkspace, DriverError> {
    let source_module = root.join(module_rel);
    if !source_module.is_dir() {
        return Err(DriverError::Workspace(format!(
            "module directory {} does not exist",
            source_module.display()
        )));
    }

    let tmp = tempfile::Builder::new()
        .prefix("tfsmoke-")
        .tempdir()
        .map_err(|e| DriverError::Workspace(format!("create temp dir: {}", e)))?;

    copy_tree(root, tmp.path())?;
    let module_path = tmp.path().join(module_rel);
    debug!(
        source = %root.display(),
        copy = %module_path.display(),
        "copied module tree"
    );

    Ok(ModuleWorkspace { root: tmp, module_path })
}

fn should_skip(name: &str) -> bool {
    if name == ".terraform.lock.hcl" {
        return false;
    }
    name.starts_with('.') || name.starts_with("terraform.tfstate")
}

/// Copy `src` into `dst`. Symlinks are followed, so a linked module
/// directory is copied by content.
fn copy_tree(src: &Path, dst: &Path) -> Result<(), DriverError> {
    let walker = WalkDir::new(src)
        .follow_links(true)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !should_skip(&e.file_name().to_string_lossy()));

    for entry in walker {
        let entry = entry
            .map_err(|e| DriverError::Workspace(format!("walk {}: {}", src.display(), e)))?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| DriverError::Workspace(format!("{}: {}", entry.path().display(), e)))?;
        let to = dst.join(rel);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&to)
                .map_err(|e| DriverError::Workspace(format!("create {}: {}", to.display(), e)))?;
        } else {
            std::fs::copy(entry.path(), &to).map_err(|e| {
                DriverError::Workspace(format!(
                    "copy {} to {}: {}",
                    entry.path().display(),
                    to.display(),
                    e
                ))
            })?;
        }
    }
    Ok(())
}
