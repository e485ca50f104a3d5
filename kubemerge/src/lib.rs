pub mod clean;
pub mod direct;
pub mod error;
pub mod extension;
pub mod merge;

use std::env;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

pub use clean::*;
pub use error::{Error, Result};
pub use extension::{read_extension, write_extension, Extension, EXTENSION_NAME};
pub use merge::{merge, merge_file, ClusterDescriptor, Credential, EXEC_COMMAND};

pub const KUBECONFIG_ENV: &str = "KUBECONFIG";

pub fn kube_dir() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(".kube"))
        .ok_or(Error::NoHomeDir)
}

/// Picks the kubeconfig to work on from the value of `$KUBECONFIG` (a path
/// list) and the `.kube` directory: the first listed file that exists, else
/// the first listed file, else `<kube_dir>/config`.
pub fn resolve_kubeconfig_path(kubeconfig_env: Option<&OsStr>, kube_dir: &Path) -> PathBuf {
    let listed: Vec<PathBuf> = kubeconfig_env
        .map(|value| {
            env::split_paths(value)
                .filter(|path| !path.as_os_str().is_empty())
                .collect()
        })
        .unwrap_or_default();

    listed
        .iter()
        .find(|path| path.exists())
        .or_else(|| listed.first())
        .cloned()
        .unwrap_or_else(|| kube_dir.join("config"))
}

pub fn kubeconfig_path() -> Result<PathBuf> {
    let kubeconfig_env = env::var_os(KUBECONFIG_ENV);
    let listed = kubeconfig_env
        .as_deref()
        .filter(|value| env::split_paths(value).any(|path| !path.as_os_str().is_empty()));

    match listed {
        Some(value) => Ok(resolve_kubeconfig_path(Some(value), Path::new(""))),
        None => Ok(resolve_kubeconfig_path(None, &kube_dir()?)),
    }
}
