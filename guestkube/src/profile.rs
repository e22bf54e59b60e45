use std::fmt;

use anyhow::bail;

const APP_NAME: &str = "colima";

/// Name of a guest instance, used verbatim for its kubeconfig entries and
/// for its directory under `~/.kube`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Profile(String);

impl Profile {
    pub fn new(name: impl Into<String>) -> anyhow::Result<Self> {
        let name = name.into();
        if name.is_empty() {
            bail!("profile name cannot be empty");
        }
        if name == "." || name == ".." {
            bail!("invalid profile name {name:?}");
        }
        if name
            .chars()
            .any(|c| c == '/' || c == '\\' || c.is_whitespace() || c.is_control())
        {
            bail!("profile name {name:?} must not contain path separators or whitespace");
        }
        Ok(Self(name))
    }

    /// `default` is the unnamed instance; everything else is prefixed so it
    /// cannot clash with entries created by other tools.
    pub fn from_instance(instance: &str) -> anyhow::Result<Self> {
        let instance = instance.trim();
        match instance {
            "" | "default" => Self::new(APP_NAME),
            name if name == APP_NAME || name.starts_with(&format!("{APP_NAME}-")) => {
                Self::new(name)
            }
            name => Self::new(format!("{APP_NAME}-{name}")),
        }
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Profile {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod test {
    use super::Profile;

    #[test]
    fn test_from_instance() {
        assert_eq!(Profile::from_instance("").unwrap().name(), "colima");
        assert_eq!(Profile::from_instance("default").unwrap().name(), "colima");
        assert_eq!(Profile::from_instance("work").unwrap().name(), "colima-work");
        assert_eq!(
            Profile::from_instance("colima-work").unwrap().name(),
            "colima-work"
        );
        assert_eq!(Profile::from_instance("colima").unwrap().name(), "colima");
    }

    #[test]
    fn test_rejects_unusable_names() {
        assert!(Profile::new("").is_err());
        assert!(Profile::new("..").is_err());
        assert!(Profile::new("a/b").is_err());
        assert!(Profile::new("my profile").is_err());
        assert!(Profile::from_instance("../etc").is_err());
        assert!(Profile::new("work").is_ok());
    }
}
