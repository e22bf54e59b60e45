//! The guest file names its cluster, context and user `default`. Those names
//! are rewritten to the profile before the file is staged next to the host
//! config, and the staged file is then replaced by the merged view of the
//! host config and itself. Copying the result over the host config is left
//! to the caller so it can back the old file up first.

use std::fs;
use std::path::Path;

use anyhow::Context as _;
use tracing::debug;

use crate::clean::KubeConfig;
use crate::guest::Guest;
use crate::tool::KubeTool;
use crate::{KubeDir, Profile};

pub const RESERVED_NAME: &str = "default";

pub struct Merger<'a> {
    profile: &'a Profile,
    dirs: &'a KubeDir,
    tool: &'a dyn KubeTool,
}

impl<'a> Merger<'a> {
    pub fn new(profile: &'a Profile, dirs: &'a KubeDir, tool: &'a dyn KubeTool) -> Self {
        Self {
            profile,
            dirs,
            tool,
        }
    }

    pub fn qualify(kc: &mut KubeConfig, profile: &Profile) {
        kc.rename(RESERVED_NAME, profile.name());
    }

    pub fn stage_guest(&self, guest: &dyn Guest, path: &Path) -> anyhow::Result<()> {
        let text = guest.read_file(path)?;
        let mut kc = KubeConfig::parse(&text)
            .with_context(|| format!("error parsing guest kubeconfig {}", path.display()))?;
        Self::qualify(&mut kc, self.profile);
        // the host keeps its current context until the switch step
        kc.current_context.clear();

        let scratch = self.dirs.scratch();
        debug!(scratch = %scratch.display(), "staging guest kubeconfig");
        fs::write(&scratch, kc.to_yaml()?)
            .with_context(|| format!("error writing {}", scratch.display()))
    }

    pub fn merge_with_host(&self) -> anyhow::Result<()> {
        let target = self.dirs.config();
        let scratch = self.dirs.scratch();
        let merged = self.tool.view_merged(&[target.as_path(), scratch.as_path()])?;
        fs::write(&scratch, merged)
            .with_context(|| format!("error writing {}", scratch.display()))
    }
}

#[cfg(test)]
mod test {
    use std::cell::RefCell;
    use std::fs;
    use std::path::{Path, PathBuf};

    use super::Merger;
    use crate::clean::{read_config, KubeConfig, Section};
    use crate::guest::Guest;
    use crate::tool::{KubeTool, NativeTool};
    use crate::{KubeDir, Profile};

    const GUEST: &str = r#"apiVersion: v1
clusters:
- cluster:
    server: https://127.0.0.1:6443
  name: default
contexts:
- context:
    cluster: default
    namespace: default
    user: default
  name: default
current-context: default
kind: Config
preferences: {}
users:
- name: default
  user:
    token: abc
"#;

    struct FixedGuest;

    impl Guest for FixedGuest {
        fn read_file(&self, _path: &Path) -> anyhow::Result<String> {
            Ok(GUEST.to_owned())
        }
    }

    /// Records the sources it was asked to merge.
    #[derive(Default)]
    struct SpyTool {
        sources: RefCell<Vec<PathBuf>>,
    }

    impl KubeTool for SpyTool {
        fn view_merged(&self, sources: &[&Path]) -> anyhow::Result<String> {
            self.sources
                .borrow_mut()
                .extend(sources.iter().map(|p| p.to_path_buf()));
            NativeTool.view_merged(sources)
        }

        fn use_context(&self, _kubeconfig: &Path, _context: &str) -> anyhow::Result<()> {
            unreachable!()
        }

        fn unset(&self, _kubeconfig: &Path, _property: &str) -> anyhow::Result<()> {
            unreachable!()
        }
    }

    fn setup(profile: &Profile) -> (tempfile::TempDir, KubeDir) {
        let home = tempfile::tempdir().unwrap();
        let dirs = KubeDir::new(home.path(), profile);
        fs::create_dir_all(dirs.profile_dir()).unwrap();
        (home, dirs)
    }

    #[test]
    fn test_stage_qualifies_names() {
        //given
        let profile = Profile::new("colima-work").unwrap();
        let (_home, dirs) = setup(&profile);
        let merger = Merger::new(&profile, &dirs, &NativeTool);

        //when
        merger
            .stage_guest(&FixedGuest, Path::new("/etc/rancher/k3s/k3s.yaml"))
            .unwrap();

        //then
        let staged = read_config(&dirs.scratch()).unwrap();
        for section in Section::ALL {
            assert_eq!(staged.names(section), vec!["colima-work"]);
        }
        let ctx = &staged.contexts["colima-work"];
        assert_eq!(ctx.namespace.as_deref(), Some("default"));
        assert!(staged.current_context.is_empty());
    }

    #[test]
    fn test_merge_with_host() {
        //given
        let profile = Profile::new("colima").unwrap();
        let (_home, dirs) = setup(&profile);
        let mut host = KubeConfig::parse(GUEST).unwrap();
        host.rename("default", "a");
        let mut b = KubeConfig::parse(GUEST).unwrap();
        b.rename("default", "b");
        host.merge(b);
        host.current_context = "a".to_owned();
        crate::clean::write_config(&host, &dirs.config()).unwrap();
        let before = fs::read(dirs.config()).unwrap();

        let tool = SpyTool::default();
        let merger = Merger::new(&profile, &dirs, &tool);

        //when
        merger
            .stage_guest(&FixedGuest, Path::new("/k3s.yaml"))
            .unwrap();
        merger.merge_with_host().unwrap();

        //then
        assert_eq!(*tool.sources.borrow(), vec![dirs.config(), dirs.scratch()]);
        let merged = read_config(&dirs.scratch()).unwrap();
        for section in Section::ALL {
            assert_eq!(merged.names(section), vec!["a", "b", "colima"]);
        }
        assert_eq!(merged.current_context, "a");
        // the host file itself is untouched until the swap
        assert_eq!(fs::read(dirs.config()).unwrap(), before);
    }

    #[test]
    fn test_restaging_replaces_stale_entry() {
        let profile = Profile::new("colima").unwrap();
        let (_home, dirs) = setup(&profile);
        let mut stale = KubeConfig::parse(GUEST).unwrap();
        stale.rename("default", "colima");
        stale.clusters.get_mut("colima").unwrap().server = "https://10.0.0.1:6443".to_owned();
        crate::clean::write_config(&stale, &dirs.config()).unwrap();

        let merger = Merger::new(&profile, &dirs, &NativeTool);
        merger
            .stage_guest(&FixedGuest, Path::new("/k3s.yaml"))
            .unwrap();
        merger.merge_with_host().unwrap();

        let merged = read_config(&dirs.scratch()).unwrap();
        assert_eq!(merged.clusters["colima"].server, "https://127.0.0.1:6443");
    }
}
