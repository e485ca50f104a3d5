use std::{collections::BTreeMap, path::Path};

use serde_yaml::Value as YamlValue;

use crate::direct;
pub use crate::direct::{
    Cluster, ClusterSpec, Context, ContextSpec, ExecConfig, ExecEnvVar, NamedExtension, User,
    UserSpec,
};
use crate::error::Result;

/// A kubeconfig keyed by name. This is the form everything in this crate
/// works on; the list form only exists at the file boundary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KubeConfig {
    pub contexts: BTreeMap<String, ContextSpec>,
    pub current_context: String,
    pub clusters: BTreeMap<String, ClusterSpec>,
    pub preferences: YamlValue,
    pub users: BTreeMap<String, UserSpec>,
    pub other: BTreeMap<String, YamlValue>,
}

impl From<direct::KubeConfig> for KubeConfig {
    fn from(kc: direct::KubeConfig) -> Self {
        Self {
            current_context: kc.current_context,
            preferences: kc.preferences,
            other: kc.other,
            contexts: kc
                .contexts
                .into_iter()
                .map(|ctx| (ctx.name, ctx.context))
                .collect(),
            clusters: kc
                .clusters
                .into_iter()
                .map(|cls| (cls.name, cls.cluster))
                .collect(),
            users: kc
                .users
                .into_iter()
                .map(|usr| (usr.name, usr.user))
                .collect(),
        }
    }
}

impl From<KubeConfig> for direct::KubeConfig {
    fn from(kc: KubeConfig) -> Self {
        direct::KubeConfig {
            kind: direct::Kind::Config,
            api_version: direct::ApiVersion::V1,
            preferences: kc.preferences,
            current_context: kc.current_context,
            other: kc.other,

            clusters: kc
                .clusters
                .into_iter()
                .map(|(name, cluster)| Cluster { name, cluster })
                .collect(),
            contexts: kc
                .contexts
                .into_iter()
                .map(|(name, context)| Context { name, context })
                .collect(),
            users: kc
                .users
                .into_iter()
                .map(|(name, user)| User { name, user })
                .collect(),
        }
    }
}

impl KubeConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<KubeConfig> {
        direct::KubeConfig::load(path).map(KubeConfig::from)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        direct::KubeConfig::from(self.clone()).save(path)
    }

    pub fn to_yaml(&self) -> Result<String> {
        direct::KubeConfig::from(self.clone()).to_yaml()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
            && self.users.is_empty()
            && self.contexts.is_empty()
            && self.current_context.is_empty()
    }

    // region: Upserts
    // Each of these replaces the entry of that name wholesale and leaves every
    // other entry alone.

    pub fn upsert_cluster(&mut self, name: impl Into<String>, cluster: ClusterSpec) {
        self.clusters.insert(name.into(), cluster);
    }

    pub fn upsert_user(&mut self, name: impl Into<String>, user: UserSpec) {
        self.users.insert(name.into(), user);
    }

    pub fn upsert_context(&mut self, name: impl Into<String>, context: ContextSpec) {
        self.contexts.insert(name.into(), context);
    }

    pub fn set_current_context(&mut self, name: impl Into<String>) {
        self.current_context = name.into();
    }
    // endregion

    /// Server of the cluster the context `name` points at, if both exist.
    pub fn context_server(&self, name: &str) -> Option<&str> {
        let context = self.contexts.get(name)?;
        self.clusters
            .get(&context.cluster)
            .map(|cluster| cluster.server.as_str())
    }
}
