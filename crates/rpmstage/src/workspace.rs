use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub const RPM_SUBDIRS: [&str; 5] = ["BUILD", "RPMS", "SOURCES", "SPECS", "SRPMS"];

#[cfg(unix)]
const DIR_MODE: u32 = 0o750;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpmLayout {
    pub root: PathBuf,
    pub topdir: PathBuf,
    pub specdir: PathBuf,
    pub rpmdir: PathBuf,
    pub log_file: PathBuf,
    pub rpmbuild_output: PathBuf,
}

impl RpmLayout {
    pub fn new(root: &Path) -> Self {
        let topdir = root.join("rpm");
        Self {
            root: root.to_path_buf(),
            specdir: topdir.join("SPECS"),
            rpmdir: topdir.join("RPMS"),
            topdir,
            log_file: root.join("package.log"),
            rpmbuild_output: root.join("rpmbuild.out"),
        }
    }

    pub fn rpmrc_path(&self) -> PathBuf {
        self.specdir.join("rpmrc")
    }

    pub fn rpmmacros_path(&self) -> PathBuf {
        self.specdir.join("rpmmacros")
    }

    pub fn prepare(&self) -> Result<()> {
        tracing::debug!("Creating dir {}", self.topdir.display());
        create_dir(&self.topdir)?;
        tracing::debug!("Creating sub dirs: {}", RPM_SUBDIRS.join(", "));
        for sub in RPM_SUBDIRS {
            create_dir(&self.topdir.join(sub))?;
        }
        Ok(())
    }
}

fn create_dir(p: &Path) -> Result<()> {
    if p.is_dir() {
        return Ok(());
    }
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(DIR_MODE);
    }
    builder
        .create(p)
        .map_err(|e| Error::fs(format!("failed to create dir {}: {e}", p.display())))
}
