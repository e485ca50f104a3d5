use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value as YamlValue};

use crate::clean::{ContextSpec, KubeConfig, NamedExtension};
use crate::error::{Error, Result};

pub const EXTENSION_NAME: &str = "kclogin";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Extension {
    pub organization: String,
}

impl KubeConfig {
    /// The extension recorded on `context`. A context that doesn't exist, has
    /// no extension or has an empty organization is [`Error::ExtensionNotFound`].
    pub fn extension(&self, context: &str) -> Result<Extension> {
        let not_found = || Error::ExtensionNotFound {
            context: context.to_owned(),
        };

        let entry = self
            .contexts
            .get(context)
            .and_then(|ctx| ctx.extensions.iter().find(|ext| ext.name == EXTENSION_NAME))
            .ok_or_else(not_found)?;

        let extension: Extension =
            serde_yaml::from_value(entry.extension.clone()).map_err(|source| {
                Error::MalformedExtension {
                    context: context.to_owned(),
                    source,
                }
            })?;

        if extension.organization.is_empty() {
            return Err(not_found());
        }
        Ok(extension)
    }

    /// Records `organization` on `context`, replacing an earlier record and
    /// keeping extensions of other tools. If the context doesn't exist yet an
    /// empty one is created for a later merge to fill in.
    pub fn write_extension(&mut self, context: &str, organization: &str) {
        let mut fields = Mapping::new();
        fields.insert("organization".into(), organization.into());
        let extension = YamlValue::Mapping(fields);

        let ctx = self
            .contexts
            .entry(context.to_owned())
            .or_insert_with(ContextSpec::default);

        match ctx
            .extensions
            .iter_mut()
            .find(|ext| ext.name == EXTENSION_NAME)
        {
            Some(entry) => entry.extension = extension,
            None => ctx.extensions.push(NamedExtension {
                name: EXTENSION_NAME.to_owned(),
                extension,
            }),
        }
    }
}

/// Reads the extension of `context` from the kubeconfig at `path`.
pub fn read_extension(path: impl AsRef<Path>, context: &str) -> Result<Extension> {
    KubeConfig::load(path)?.extension(context)
}

pub fn write_extension(kc: &mut KubeConfig, context: &str, organization: &str) {
    kc.write_extension(context, organization)
}
