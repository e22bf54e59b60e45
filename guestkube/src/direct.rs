//! The kubeconfig file as it appears on disk: every section is a list of
//! `{name, <body>}` pairs.

use std::collections::BTreeMap;
use std::{fs, path::Path, path::PathBuf};

use anyhow::Context as _;
use serde::*;
use serde_yaml::{Mapping, Value as YamlValue};

/// Treats an explicit `null` the same as a missing key. `kubectl config view`
/// writes `clusters: null` for an empty file.
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// region: Context
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ContextSpec {
    #[serde(default)]
    pub cluster: String,
    #[serde(default)]
    pub user: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<YamlValue>,
    #[serde(flatten)]
    pub other: BTreeMap<String, YamlValue>,
}
#[derive(Serialize, Deserialize, Debug)]
pub struct Context {
    pub name: String,
    pub context: ContextSpec,
}
// endregion

// region: Cluster
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct ClusterSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate_authority_data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate_authority: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insecure_skip_tls_verify: Option<YamlValue>,
    #[serde(default)]
    pub server: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<YamlValue>,
    #[serde(flatten)]
    pub other: BTreeMap<String, YamlValue>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct Cluster {
    pub name: String,
    pub cluster: ClusterSpec,
}
// endregion

// region: User
/// Credentials come in many shapes (certs, tokens, exec plugins, auth
/// providers). Only the common ones are typed, the rest is carried through.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct UserSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_certificate_data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_key_data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(flatten)]
    pub other: BTreeMap<String, YamlValue>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct User {
    pub name: String,
    #[serde(default, deserialize_with = "nullable")]
    pub user: UserSpec,
}
// endregion

// region: Common
#[derive(Serialize, Deserialize, Debug, Default)]
pub enum ApiVersion {
    #[default]
    #[serde(rename = "v1")]
    V1,
}
#[derive(Serialize, Deserialize, Debug, Default)]
pub enum Kind {
    #[default]
    Config,
}

#[derive(Serialize, Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case")]
pub struct KubeConfig {
    #[serde(rename = "apiVersion", default)]
    pub api_version: ApiVersion,
    #[serde(default, deserialize_with = "nullable")]
    pub clusters: Vec<Cluster>,
    #[serde(default, deserialize_with = "nullable")]
    pub contexts: Vec<Context>,
    #[serde(default, deserialize_with = "nullable")]
    pub current_context: String,
    #[serde(default)]
    pub kind: Kind,
    #[serde(default, deserialize_with = "nullable")]
    pub preferences: Mapping,
    #[serde(default, deserialize_with = "nullable")]
    pub users: Vec<User>,
    #[serde(flatten)]
    pub other: BTreeMap<String, YamlValue>,
}

impl KubeConfig {
    pub fn read_from(path: impl AsRef<Path>) -> anyhow::Result<KubeConfig> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("Opening kube config {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Parsing kube config {}", path.display()))
    }

    /// Blank text is an empty config, the same way kubectl treats it.
    pub fn parse(text: &str) -> anyhow::Result<KubeConfig> {
        if text.trim().is_empty() {
            return Ok(KubeConfig::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }
}
// endregion
