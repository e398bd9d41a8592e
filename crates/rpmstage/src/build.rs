use std::path::{Path, PathBuf};

use crate::descriptor::{self, Descriptor};
use crate::error::Result;
use crate::package::PackageSpec;
use crate::report::Reporter;
use crate::rpmbuild::{self, Invocation};
use crate::rpmrc::{self, ResourceConfig};
use crate::util;
use crate::workspace::RpmLayout;

#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub package_root: PathBuf,
    pub staged_root: PathBuf,
    pub rpmbuild: PathBuf,
    pub default_args: Vec<String>,
    pub dry_run: bool,
}

impl BuildOptions {
    pub fn new(package_root: &Path, staged_root: &Path) -> Self {
        Self {
            package_root: package_root.to_path_buf(),
            staged_root: staged_root.to_path_buf(),
            rpmbuild: PathBuf::from(rpmbuild::DEFAULT_RPMBUILD),
            default_args: Vec::new(),
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BuildOutputs {
    pub layout: RpmLayout,
    pub spec_path: PathBuf,
    pub descriptor: Descriptor,
    pub resources: ResourceConfig,
    pub invocation: Invocation,
}

/// Prepares the working tree and writes the descriptor, `rpmrc` and
/// `rpmmacros`. Nothing is created when the package description is invalid.
pub fn write_inputs(
    pkg: &PackageSpec,
    opts: &BuildOptions,
    reporter: &dyn Reporter,
) -> Result<BuildOutputs> {
    pkg.validate()?;
    let layout = RpmLayout::new(&opts.package_root);

    tracing::info!("Preparing rpmbuild directory structure...");
    layout.prepare()?;

    tracing::info!("Writing SPEC files...");
    let descriptor = descriptor::synthesize(pkg, &opts.package_root, &opts.staged_root, reporter)?;
    let spec_path = layout.specdir.join(&descriptor.file_name);
    tracing::debug!("Writing spec file {}", spec_path.display());
    util::write_text(&spec_path, &descriptor.text)?;
    let resources = rpmrc::write(&pkg.rpmrc, &layout)?;

    let invocation = Invocation::new(
        &opts.rpmbuild,
        &opts.default_args,
        &layout,
        &pkg.target_arch(),
        &opts.staged_root,
        &descriptor.file_name,
    );
    Ok(BuildOutputs {
        layout,
        spec_path,
        descriptor,
        resources,
        invocation,
    })
}

pub fn build(
    pkg: &PackageSpec,
    opts: &BuildOptions,
    reporter: &dyn Reporter,
) -> Result<BuildOutputs> {
    let outputs = write_inputs(pkg, opts, reporter)?;
    if opts.dry_run {
        tracing::info!("DRY-RUN: {}", outputs.invocation.display());
        return Ok(outputs);
    }

    tracing::info!("Running rpmbuild to create rpm...");
    outputs.invocation.run()?;
    tracing::info!("Complete");
    Ok(outputs)
}
