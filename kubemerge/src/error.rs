use std::{io, path::PathBuf};

use thiserror::Error;

use crate::extension::EXTENSION_NAME;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid cluster descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("incomplete OIDC configuration: {0}")]
    OidcIncomplete(String),

    #[error("malformed kubeconfig {}: {source}", .path.display())]
    MalformedConfig {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("no {} extension found on context {context:?}", EXTENSION_NAME)]
    ExtensionNotFound { context: String },

    #[error("malformed {} extension on context {context:?}: {source}", EXTENSION_NAME)]
    MalformedExtension {
        context: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("kubeconfig {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("serializing kubeconfig: {0}")]
    Serialize(#[from] serde_yaml::Error),

    #[error("could not determine the home directory of the current user")]
    NoHomeDir,
}

impl Error {
    /// Missing extensions are expected for contexts that were never logged
    /// into; callers usually ask the user to log in again.
    pub fn is_extension_not_found(&self) -> bool {
        matches!(self, Error::ExtensionNotFound { .. })
    }

    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Error {
        let path = path.into();
        move |source| Error::Io { path, source }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
