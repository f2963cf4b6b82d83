//! Publishing the generated tree

use fs_extra::dir::CopyOptions;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::DeployConfig;
use crate::error::{DeployerError, Result};

/// Replaces `deploy_dir/deploy_name` with the generator output.
///
/// The new tree is staged in a sibling directory and renamed into place, so
/// readers of the live path see either the old or the new complete tree.
#[derive(Debug, Clone)]
pub struct Publisher {
    source: PathBuf,
    deploy_dir: PathBuf,
    deploy_name: String,
}

impl Publisher {
    pub fn new(
        source: impl Into<PathBuf>,
        deploy_dir: impl Into<PathBuf>,
        deploy_name: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            deploy_dir: deploy_dir.into(),
            deploy_name: deploy_name.into(),
        }
    }

    pub fn from_config(config: &DeployConfig) -> Self {
        Self::new(
            config.build_output_dir(),
            config.deploy_dir.clone(),
            config.deploy_name.clone(),
        )
    }

    pub fn target(&self) -> PathBuf {
        self.deploy_dir.join(&self.deploy_name)
    }

    pub async fn deploy(&self) -> Result<()> {
        let publisher = self.clone();
        tokio::task::spawn_blocking(move || publisher.deploy_blocking())
            .await
            .map_err(|e| DeployerError::DeployError(format!("deploy task failed: {}", e)))?
    }

    fn deploy_blocking(&self) -> Result<()> {
        if !self.source.is_dir() {
            return Err(DeployerError::DeployError(format!(
                "build output {} not found",
                self.source.display()
            )));
        }
        fs::create_dir_all(&self.deploy_dir).map_err(|e| {
            DeployerError::DeployError(format!(
                "cannot create {}: {}",
                self.deploy_dir.display(),
                e
            ))
        })?;

        let tag = Uuid::now_v7().simple().to_string();
        let staging = self
            .deploy_dir
            .join(format!(".{}.staging-{}", self.deploy_name, tag));
        let target = self.target();

        if let Err(e) = copy_tree(&self.source, &staging) {
            remove_quietly(&staging);
            return Err(e);
        }
        debug!("Staged {:?} at {:?}", self.source, staging);

        if target.exists() {
            let retired = self
                .deploy_dir
                .join(format!(".{}.old-{}", self.deploy_name, tag));
            rename(&target, &retired).inspect_err(|_| remove_quietly(&staging))?;
            if let Err(e) = rename(&staging, &target) {
                if let Err(restore) = fs::rename(&retired, &target) {
                    warn!("Could not restore {:?} from {:?}: {}", target, retired, restore);
                }
                remove_quietly(&staging);
                return Err(e);
            }
            remove_quietly(&retired);
        } else {
            rename(&staging, &target).inspect_err(|_| remove_quietly(&staging))?;
        }

        info!("Deployed {:?} to {:?}", self.source, target);
        Ok(())
    }
}

fn copy_tree(from: &Path, to: &Path) -> Result<()> {
    fs::create_dir_all(to).map_err(|e| {
        DeployerError::DeployError(format!("cannot create {}: {}", to.display(), e))
    })?;
    let mut options = CopyOptions::new();
    options.content_only = true;
    options.overwrite = true;
    fs_extra::dir::copy(from, to, &options).map_err(|e| {
        DeployerError::DeployError(format!(
            "cannot copy {} to {}: {}",
            from.display(),
            to.display(),
            e
        ))
    })?;
    Ok(())
}

fn rename(from: &Path, to: &Path) -> Result<()> {
    fs::rename(from, to).map_err(|e| {
        DeployerError::DeployError(format!(
            "cannot move {} to {}: {}",
            from.display(),
            to.display(),
            e
        ))
    })
}

fn remove_quietly(path: &Path) {
    if path.exists() {
        if let Err(e) = fs::remove_dir_all(path) {
            warn!("Could not remove {:?}: {}", path, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    /// Relative path -> contents for every file under `root`.
    fn snapshot(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
        fn walk(root: &Path, dir: &Path, out: &mut BTreeMap<PathBuf, Vec<u8>>) {
            for entry in fs::read_dir(dir).unwrap() {
                let path = entry.unwrap().path();
                if path.is_dir() {
                    walk(root, &path, out);
                } else {
                    let rel = path.strip_prefix(root).unwrap().to_path_buf();
                    out.insert(rel, fs::read(&path).unwrap());
                }
            }
        }
        let mut out = BTreeMap::new();
        walk(root, root, &mut out);
        out
    }

    fn build_output(root: &Path) -> PathBuf {
        let public = root.join("repo").join("public");
        fs::create_dir_all(public.join("posts/2024")).unwrap();
        fs::write(public.join("index.html"), "<html>home</html>").unwrap();
        fs::write(public.join("posts/2024/hello.html"), "<p>hello</p>").unwrap();
        fs::write(public.join("favicon.ico"), [0u8, 159, 146, 150]).unwrap();
        public
    }

    #[tokio::test]
    async fn test_deploy_copies_tree_exactly() {
        let dir = tempfile::tempdir().unwrap();
        let public = build_output(dir.path());
        let publisher = Publisher::new(&public, dir.path().join("deploy"), "www");

        publisher.deploy().await.unwrap();
        assert_eq!(snapshot(&publisher.target()), snapshot(&public));
    }

    #[tokio::test]
    async fn test_redeploy_replaces_stale_content() {
        let dir = tempfile::tempdir().unwrap();
        let public = build_output(dir.path());
        let publisher = Publisher::new(&public, dir.path().join("deploy"), "www");

        publisher.deploy().await.unwrap();
        fs::remove_file(public.join("posts/2024/hello.html")).unwrap();
        fs::write(public.join("index.html"), "<html>v2</html>").unwrap();
        publisher.deploy().await.unwrap();

        let live = snapshot(&publisher.target());
        assert_eq!(live, snapshot(&public));
        assert!(!publisher.target().join("posts/2024/hello.html").exists());
    }

    #[tokio::test]
    async fn test_deploy_twice_is_identical_and_leaves_no_residue() {
        let dir = tempfile::tempdir().unwrap();
        let public = build_output(dir.path());
        let deploy_dir = dir.path().join("deploy");
        let publisher = Publisher::new(&public, &deploy_dir, "www");

        publisher.deploy().await.unwrap();
        let first = snapshot(&publisher.target());
        publisher.deploy().await.unwrap();
        assert_eq!(snapshot(&publisher.target()), first);

        let names: Vec<_> = fs::read_dir(&deploy_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("www")]);
    }

    #[tokio::test]
    async fn test_missing_source_keeps_live_tree() {
        let dir = tempfile::tempdir().unwrap();
        let public = build_output(dir.path());
        let publisher = Publisher::new(&public, dir.path().join("deploy"), "www");
        publisher.deploy().await.unwrap();
        let before = snapshot(&publisher.target());

        fs::remove_dir_all(&public).unwrap();
        let err = publisher.deploy().await.unwrap_err();
        assert!(matches!(err, DeployerError::DeployError(ref m) if m.contains("not found")));
        assert_eq!(snapshot(&publisher.target()), before);
    }
}
