use std::collections::BTreeMap;
use std::io::{self, Write as _};
use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::*;
use serde_yaml::{Mapping, Value as YamlValue};
use tempfile::NamedTempFile;

use crate::error::{Error, Result};

/// Treats an explicit `null` the same as a missing key.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// region: Context
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct NamedExtension {
    pub name: String,
    #[serde(default)]
    pub extension: YamlValue,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ContextSpec {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cluster: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub extensions: Vec<NamedExtension>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct Context {
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub context: ContextSpec,
}
// endregion

// region: Cluster
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct ClusterSpec {
    #[serde(default)]
    pub server: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate_authority_data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate_authority: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insecure_skip_tls_verify: Option<bool>,
    /// `proxy-url`, `tls-server-name`, `extensions` and whatever else the
    /// cluster carries.
    #[serde(flatten)]
    pub other: BTreeMap<String, YamlValue>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct Cluster {
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub cluster: ClusterSpec,
}
// endregion

// region: User
pub const EXEC_API_VERSION: &str = "client.authentication.k8s.io/v1";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ExecEnvVar {
    pub name: String,
    pub value: String,
}

/// Credential plugin the kubernetes client runs at connection time. It is
/// expected to print an `ExecCredential` of [`ExecConfig::api_version`] as
/// JSON on stdout.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ExecConfig {
    pub api_version: String,
    pub command: String,
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub args: Vec<String>,
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub env: Vec<ExecEnvVar>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interactive_mode: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub provide_cluster_info: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub install_hint: Option<String>,
}

/// A user entry. Only the shapes we write ourselves get a variant of their
/// own; client certificates, auth providers, basic auth and empty users are
/// kept as they were found.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum UserSpec {
    Exec { exec: ExecConfig },
    Token { token: String },
    Opaque(Mapping),
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields, untagged)]
enum TypedUser {
    Exec { exec: ExecConfig },
    Token { token: String },
}

impl<'de> Deserialize<'de> for UserSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Mapping::deserialize(deserializer).map(UserSpec::from_mapping)
    }
}

impl Default for UserSpec {
    fn default() -> Self {
        UserSpec::Opaque(Mapping::new())
    }
}

impl UserSpec {
    /// A typed variant only when writing it back gives the same entry, so
    /// spelled-out defaults like `provideClusterInfo: false` or `env: null`
    /// survive a load/save cycle.
    fn from_mapping(user: Mapping) -> Self {
        let typed = match serde_yaml::from_value(YamlValue::Mapping(user.clone())) {
            Ok(TypedUser::Exec { exec }) => UserSpec::Exec { exec },
            Ok(TypedUser::Token { token }) => UserSpec::Token { token },
            Err(_) => return UserSpec::Opaque(user),
        };
        match serde_yaml::to_value(&typed) {
            Ok(YamlValue::Mapping(written)) if written == user => typed,
            _ => UserSpec::Opaque(user),
        }
    }

    pub fn exec(&self) -> Option<&ExecConfig> {
        match self {
            UserSpec::Exec { exec } => Some(exec),
            _ => None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct User {
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub user: UserSpec,
}
// endregion

// region: Common
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ApiVersion {
    #[default]
    #[serde(rename = "v1")]
    V1,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Kind {
    #[default]
    Config,
}

#[derive(Serialize, Deserialize, Debug, Default, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct KubeConfig {
    #[serde(rename = "apiVersion", default)]
    pub api_version: ApiVersion,
    #[serde(default)]
    pub kind: Kind,
    #[serde(default, deserialize_with = "null_as_default")]
    pub clusters: Vec<Cluster>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub contexts: Vec<Context>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub current_context: String,
    #[serde(default, skip_serializing_if = "YamlValue::is_null")]
    pub preferences: YamlValue,
    #[serde(default, deserialize_with = "null_as_default")]
    pub users: Vec<User>,
    /// Top-level `extensions` and anything else we don't model.
    #[serde(flatten)]
    pub other: BTreeMap<String, YamlValue>,
}

/// Where a save to `path` has to land. Symlinks are written through, even
/// when their destination doesn't exist yet.
fn write_target(path: &Path) -> PathBuf {
    if let Ok(target) = fs::canonicalize(path) {
        return target;
    }
    match fs::read_link(path) {
        Ok(link) => match path.parent() {
            Some(dir) if link.is_relative() => dir.join(link),
            _ => link,
        },
        Err(_) => path.to_owned(),
    }
}

/// True for files that hold no document at all, which `serde_yaml` would
/// otherwise reject.
fn is_blank(contents: &str) -> bool {
    contents.lines().map(str::trim).all(|line| {
        line.is_empty() || line.starts_with('#') || line == "---" || line == "..."
    })
}

impl KubeConfig {
    pub fn parse(contents: &str) -> Result<KubeConfig, serde_yaml::Error> {
        if is_blank(contents) {
            return Ok(KubeConfig::default());
        }
        serde_yaml::from_str(contents)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Reads the kubeconfig at `path`. A file that doesn't exist yet is an
    /// empty kubeconfig.
    pub fn load(path: impl AsRef<Path>) -> Result<KubeConfig> {
        let path = path.as_ref();
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                log::debug!("{} does not exist, starting empty", path.display());
                return Ok(KubeConfig::default());
            }
            Err(err) => return Err(Error::io(path)(err)),
        };

        log::debug!("loaded kubeconfig from {}", path.display());
        KubeConfig::parse(&contents).map_err(|source| Error::MalformedConfig {
            path: path.to_owned(),
            source,
        })
    }

    /// Replaces the file at `path` with this kubeconfig. The document is
    /// written to a temporary file next to the target and renamed over it, so
    /// readers see either the old or the new file, never a partial one.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let target = write_target(path);
        let dir = match target.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_owned(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(Error::io(&dir))?;

        let contents = self.to_yaml()?;

        let mut file = NamedTempFile::new_in(&dir).map_err(Error::io(&dir))?;
        file.write_all(contents.as_bytes())
            .and_then(|()| file.as_file().sync_all())
            .map_err(Error::io(file.path()))?;
        file.persist(&target)
            .map_err(|err| Error::io(&target)(err.error))?;

        log::debug!("wrote kubeconfig to {}", target.display());
        Ok(())
    }
}
// endregion
