use std::{collections::BTreeMap, fmt, fs, path::Path};

use anyhow::{bail, Context as _};
use serde_yaml::{Mapping, Value as YamlValue};

use crate::direct;
pub use crate::direct::{Cluster, ClusterSpec, Context, ContextSpec, Kind, User, UserSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Clusters,
    Contexts,
    Users,
}

impl Section {
    pub const ALL: [Section; 3] = [Section::Clusters, Section::Contexts, Section::Users];

    pub fn key(self) -> &'static str {
        match self {
            Section::Clusters => "clusters",
            Section::Contexts => "contexts",
            Section::Users => "users",
        }
    }

    /// Property path as understood by `kubectl config unset`, e.g. `users.colima`.
    pub fn property(self, name: &str) -> String {
        format!("{}.{}", self.key(), name)
    }

    pub fn parse_property(property: &str) -> anyhow::Result<(Section, &str)> {
        let (key, name) = property
            .split_once('.')
            .with_context(|| format!("invalid property {property:?}"))?;
        let section = Section::ALL
            .into_iter()
            .find(|section| section.key() == key)
            .with_context(|| format!("unknown kubeconfig section {key:?}"))?;
        if name.is_empty() {
            bail!("missing entry name in property {property:?}");
        }
        Ok((section, name))
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct KubeConfig {
    pub contexts: BTreeMap<String, ContextSpec>,
    pub current_context: String,
    pub clusters: BTreeMap<String, ClusterSpec>,
    pub preferences: Mapping,
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
            kind: Kind::Config,
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
    pub fn parse(text: &str) -> anyhow::Result<KubeConfig> {
        direct::KubeConfig::parse(text).map(KubeConfig::from)
    }

    pub fn to_yaml(&self) -> anyhow::Result<String> {
        let direct: direct::KubeConfig = self.clone().into();
        Ok(serde_yaml::to_string(&direct)?)
    }

    pub fn names(&self, section: Section) -> Vec<&str> {
        match section {
            Section::Clusters => self.clusters.keys().map(String::as_str).collect(),
            Section::Contexts => self.contexts.keys().map(String::as_str).collect(),
            Section::Users => self.users.keys().map(String::as_str).collect(),
        }
    }

    pub fn contains(&self, section: Section, name: &str) -> bool {
        match section {
            Section::Clusters => self.clusters.contains_key(name),
            Section::Contexts => self.contexts.contains_key(name),
            Section::Users => self.users.contains_key(name),
        }
    }

    /// Renames entries called `from` in every section, along with the
    /// references to them. Values are never inspected beyond the
    /// cluster/user references of a context.
    pub fn rename(&mut self, from: &str, to: &str) {
        rename_key(&mut self.clusters, from, to);
        rename_key(&mut self.contexts, from, to);
        rename_key(&mut self.users, from, to);

        for ctx in self.contexts.values_mut() {
            if ctx.cluster == from {
                ctx.cluster = to.to_owned();
            }
            if ctx.user == from {
                ctx.user = to.to_owned();
            }
        }

        if self.current_context == from {
            self.current_context = to.to_owned();
        }
    }

    /// Folds `other` into `self`. Entries of `other` replace same-named ones.
    pub fn merge(&mut self, other: KubeConfig) {
        self.clusters.extend(other.clusters);
        self.contexts.extend(other.contexts);
        self.users.extend(other.users);
        for (key, value) in other.preferences {
            self.preferences.insert(key, value);
        }
        self.other.extend(other.other);
        if !other.current_context.is_empty() {
            self.current_context = other.current_context;
        }
    }

    pub fn unset(&mut self, section: Section, name: &str) -> bool {
        match section {
            Section::Clusters => self.clusters.remove(name).is_some(),
            Section::Contexts => self.contexts.remove(name).is_some(),
            Section::Users => self.users.remove(name).is_some(),
        }
    }
}

fn rename_key<V>(entries: &mut BTreeMap<String, V>, from: &str, to: &str) {
    if let Some(entry) = entries.remove(from) {
        entries.insert(to.to_owned(), entry);
    }
}

/// A missing file reads as an empty config.
pub fn read_config(path: &Path) -> anyhow::Result<KubeConfig> {
    if !path.exists() {
        return Ok(KubeConfig::default());
    }
    direct::KubeConfig::read_from(path).map(KubeConfig::from)
}

pub fn write_config(kc: &KubeConfig, path: &Path) -> anyhow::Result<()> {
    let yaml = kc.to_yaml()?;
    fs::write(path, yaml).with_context(|| format!("Writing kube config {}", path.display()))
}

#[cfg(test)]
mod test {
    use super::{ClusterSpec, ContextSpec, KubeConfig, Section, UserSpec};

    fn config(names: &[&str]) -> KubeConfig {
        let mut kc = KubeConfig::default();
        for name in names {
            kc.clusters.insert(
                name.to_string(),
                ClusterSpec {
                    server: format!("https://{name}:6443"),
                    ..Default::default()
                },
            );
            kc.contexts.insert(
                name.to_string(),
                ContextSpec {
                    cluster: name.to_string(),
                    user: name.to_string(),
                    ..Default::default()
                },
            );
            kc.users.insert(name.to_string(), UserSpec::default());
        }
        kc
    }

    #[test]
    fn test_rename_default_entries() {
        //given
        let mut kc = config(&["default"]);
        kc.current_context = "default".to_owned();

        //when
        kc.rename("default", "colima");

        //then
        for section in Section::ALL {
            assert_eq!(kc.names(section), vec!["colima"]);
        }
        let ctx = &kc.contexts["colima"];
        assert_eq!(ctx.cluster, "colima");
        assert_eq!(ctx.user, "colima");
        assert_eq!(kc.current_context, "colima");
    }

    #[test]
    fn test_rename_leaves_values_alone() {
        //given
        let mut kc = config(&["default"]);
        kc.contexts.get_mut("default").unwrap().namespace = Some("default".to_owned());
        kc.clusters.get_mut("default").unwrap().server = "https://default.local:6443".to_owned();

        //when
        kc.rename("default", "colima");

        //then
        assert_eq!(kc.contexts["colima"].namespace.as_deref(), Some("default"));
        assert_eq!(kc.clusters["colima"].server, "https://default.local:6443");
    }

    #[test]
    fn test_merge_keeps_every_entry() {
        //given
        let mut host = config(&["a", "b"]);
        host.current_context = "a".to_owned();
        let staged = config(&["colima"]);

        //when
        host.merge(staged);

        //then
        for section in Section::ALL {
            assert_eq!(host.names(section), vec!["a", "b", "colima"]);
        }
        assert_eq!(host.current_context, "a");
    }

    #[test]
    fn test_merge_later_wins() {
        //given
        let mut host = config(&["colima"]);
        let mut staged = config(&["colima"]);
        staged.clusters.get_mut("colima").unwrap().server = "https://127.0.0.1:6443".to_owned();
        staged.current_context = "colima".to_owned();

        //when
        host.merge(staged);

        //then
        assert_eq!(host.clusters["colima"].server, "https://127.0.0.1:6443");
        assert_eq!(host.current_context, "colima");
    }

    #[test]
    fn test_merge_keeps_top_level_extras() {
        //given
        let mut host = KubeConfig::parse(
            "extensions:\n- name: client.example.com\n  extension: {team: platform}\n",
        )
        .expect("parse");
        let staged = config(&["colima"]);

        //when
        host.merge(staged);

        //then
        let yaml = host.to_yaml().expect("serialize");
        assert!(yaml.contains("client.example.com"));
        assert!(host.other.contains_key("extensions"));
        assert_eq!(host.names(Section::Contexts), vec!["colima"]);
    }

    #[test]
    fn test_unset() {
        let mut kc = config(&["a", "colima"]);

        assert!(kc.unset(Section::Users, "colima"));
        assert!(!kc.unset(Section::Users, "colima"));
        assert_eq!(kc.names(Section::Users), vec!["a"]);
        assert!(kc.contains(Section::Clusters, "colima"));
    }

    #[test]
    fn test_property_round_trip() {
        let property = Section::Contexts.property("colima-work");
        assert_eq!(property, "contexts.colima-work");
        let (section, name) = Section::parse_property(&property).expect("parse");
        assert_eq!(section, Section::Contexts);
        assert_eq!(name, "colima-work");

        assert!(Section::parse_property("preferences.colors").is_err());
        assert!(Section::parse_property("users.").is_err());
        assert!(Section::parse_property("users").is_err());
    }

    #[test]
    fn test_yaml_round_trip_keeps_names() {
        let mut kc = config(&["a", "colima"]);
        kc.current_context = "colima".to_owned();

        let yaml = kc.to_yaml().expect("serialize");
        let parsed = KubeConfig::parse(&yaml).expect("parse");

        assert_eq!(parsed, kc);
    }
}
