use std::path::Path;

use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::clean::{ClusterSpec, ContextSpec, ExecConfig, KubeConfig, UserSpec};
use crate::direct::EXEC_API_VERSION;
use crate::error::{Error, Result};

/// Command the kubernetes client runs to fetch an OIDC token.
pub const EXEC_COMMAND: &str = "kclogin";

/// Connection attributes of a remote cluster, as observed on the control
/// plane.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterDescriptor {
    pub name: String,
    /// Project (namespace) the cluster object lives in.
    #[serde(default)]
    pub project: Option<String>,
    pub api_endpoint: String,
    /// Base64 encoded PEM bundle.
    #[serde(default)]
    pub ca_data: Option<String>,
    #[serde(default)]
    pub insecure_skip_tls_verify: bool,
    #[serde(default)]
    pub oidc_issuer_url: Option<String>,
    #[serde(default)]
    pub oidc_client_id: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

impl ClusterDescriptor {
    /// The context name used when the caller doesn't pick one. It only
    /// depends on the cluster's identity, so every login to the same cluster
    /// lands on the same context.
    pub fn context_name(&self) -> String {
        match non_empty(&self.project) {
            Some(project) => format!("{}/{}", self.name, project),
            None => self.name.clone(),
        }
    }

    /// `context_name` if the caller picked one, else [`Self::context_name`].
    pub fn resolve_context_name(&self, context_name: Option<&str>) -> Result<String> {
        if let Some(name) = context_name.filter(|name| !name.trim().is_empty()) {
            return Ok(name.to_owned());
        }
        if self.name.trim().is_empty() {
            return Err(Error::InvalidDescriptor(
                "cluster has no name to derive a context name from".to_owned(),
            ));
        }
        Ok(self.context_name())
    }

    /// CA data with line breaks and other whitespace removed.
    fn ca_data(&self) -> Option<String> {
        non_empty(&self.ca_data)
            .map(|ca| ca.chars().filter(|c| !c.is_ascii_whitespace()).collect::<String>())
            .filter(|ca| !ca.is_empty())
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_endpoint.trim().is_empty() {
            return Err(Error::InvalidDescriptor(format!(
                "cluster {:?} has no API endpoint",
                self.name
            )));
        }
        if let Some(ca) = self.ca_data() {
            base64::engine::general_purpose::STANDARD
                .decode(&ca)
                .map_err(|err| {
                    Error::InvalidDescriptor(format!(
                        "CA certificate of cluster {:?} is not valid base64: {err}",
                        self.name
                    ))
                })?;
        }
        Ok(())
    }

    pub fn cluster_spec(&self) -> ClusterSpec {
        ClusterSpec {
            server: self.api_endpoint.trim().to_owned(),
            certificate_authority_data: self.ca_data(),
            insecure_skip_tls_verify: self.insecure_skip_tls_verify.then_some(true),
            ..Default::default()
        }
    }
}

/// How the user entry authenticates against the cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    /// Short lived OIDC tokens fetched by [`EXEC_COMMAND`] on every connection.
    ExecPlugin {
        issuer_url: String,
        client_id: String,
    },
    StaticToken(String),
    None,
}

impl Credential {
    /// Picks the credential a merge writes. Without the exec plugin the user
    /// entry is left bare; the caller adds a static token if it has one.
    pub fn for_descriptor(descriptor: &ClusterDescriptor, exec_plugin: bool) -> Result<Credential> {
        if !exec_plugin {
            return Ok(Credential::None);
        }

        match (
            non_empty(&descriptor.oidc_issuer_url),
            non_empty(&descriptor.oidc_client_id),
        ) {
            (Some(issuer_url), Some(client_id)) => Ok(Credential::ExecPlugin {
                issuer_url: issuer_url.to_owned(),
                client_id: client_id.to_owned(),
            }),
            (None, None) => Ok(Credential::None),
            (Some(_), None) => Err(Error::OidcIncomplete(format!(
                "cluster {:?} has an OIDC issuer URL but no client ID",
                descriptor.name
            ))),
            (None, Some(_)) => Err(Error::OidcIncomplete(format!(
                "cluster {:?} has an OIDC client ID but no issuer URL",
                descriptor.name
            ))),
        }
    }
}

impl From<Credential> for UserSpec {
    fn from(credential: Credential) -> Self {
        match credential {
            Credential::ExecPlugin {
                issuer_url,
                client_id,
            } => UserSpec::Exec {
                exec: ExecConfig {
                    api_version: EXEC_API_VERSION.to_owned(),
                    command: EXEC_COMMAND.to_owned(),
                    args: vec![
                        "auth".to_owned(),
                        "oidc".to_owned(),
                        format!("--issuer-url={issuer_url}"),
                        format!("--client-id={client_id}"),
                    ],
                    env: Vec::new(),
                    interactive_mode: Some("IfAvailable".to_owned()),
                    provide_cluster_info: false,
                    install_hint: None,
                },
            },
            Credential::StaticToken(token) => UserSpec::Token { token },
            Credential::None => UserSpec::default(),
        }
    }
}

/// Merges `descriptor` into `kc` under `context_name`, or under
/// [`ClusterDescriptor::context_name`] when none is given.
///
/// An existing context of that name is replaced, whatever it pointed at
/// before. Only its extensions survive, so metadata recorded ahead of the
/// first login is not lost.
pub fn merge(
    mut kc: KubeConfig,
    descriptor: &ClusterDescriptor,
    context_name: Option<&str>,
    exec_plugin: bool,
) -> Result<KubeConfig> {
    descriptor.validate()?;
    let credential = Credential::for_descriptor(descriptor, exec_plugin)?;
    let name = descriptor.resolve_context_name(context_name)?;

    let extensions = kc
        .contexts
        .remove(&name)
        .map(|ctx| ctx.extensions)
        .unwrap_or_default();

    kc.upsert_cluster(&name, descriptor.cluster_spec());
    kc.upsert_user(&name, credential.into());
    kc.upsert_context(
        &name,
        ContextSpec {
            cluster: name.clone(),
            user: name.clone(),
            namespace: None,
            extensions,
        },
    );
    kc.set_current_context(name);

    Ok(kc)
}

/// Loads the kubeconfig at `path`, merges `descriptor` into it, records the
/// organization if one is known and writes it back. Returns the name of the
/// context that was written.
pub fn merge_file(
    path: impl AsRef<Path>,
    descriptor: &ClusterDescriptor,
    context_name: Option<&str>,
    exec_plugin: bool,
    organization: Option<&str>,
) -> Result<String> {
    let path = path.as_ref();
    let mut kc = merge(KubeConfig::load(path)?, descriptor, context_name, exec_plugin)?;
    let name = kc.current_context.clone();
    if let Some(organization) = organization.filter(|org| !org.is_empty()) {
        kc.write_extension(&name, organization);
    }
    kc.save(path)?;
    Ok(name)
}
