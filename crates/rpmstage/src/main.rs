use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use rpmstage::build::BuildOptions;
use rpmstage::report::TracingReporter;
use rpmstage::{Result, config, descriptor, logging, rpmbuild, util};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Log filter (e.g. `debug`, `rpmstage=trace`); defaults to RUST_LOG or `info`
    #[arg(long, global = true)]
    log_level: Option<String>,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Write the spec, rpmrc and rpmmacros, then run rpmbuild
    Build {
        /// Package description TOML
        package: PathBuf,
        /// Staged install root holding the files to package
        #[arg(long)]
        stage: PathBuf,
        /// Package root for rpm/, logs and script files (default: the package file's directory)
        #[arg(long)]
        root: Option<PathBuf>,
        /// rpmbuild binary
        #[arg(long, default_value = rpmstage::rpmbuild::DEFAULT_RPMBUILD)]
        rpmbuild: PathBuf,
        /// Write all inputs and print the rpmbuild command without running it
        #[arg(long)]
        dry_run: bool,
    },
    /// Print the generated spec file
    Spec {
        package: PathBuf,
        #[arg(long)]
        stage: PathBuf,
        #[arg(long)]
        root: Option<PathBuf>,
    },
    /// Print the resolved %files entries
    Files {
        package: PathBuf,
        #[arg(long)]
        stage: PathBuf,
        #[arg(long)]
        root: Option<PathBuf>,
        /// Emit JSON instead of spec lines
        #[arg(long)]
        json: bool,
    },
    /// Print the package description after extends/imports are merged
    Resolve { package: PathBuf },
}

fn main() -> ExitCode {
    let args = Args::parse();
    dotenv::dotenv().ok();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn package_root(package: &Path, root: Option<PathBuf>) -> PathBuf {
    root.unwrap_or_else(|| {
        package
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf()
    })
}

fn run(args: Args) -> Result<()> {
    let level = args.log_level.as_deref();
    match args.cmd {
        Command::Build {
            package,
            stage,
            root,
            rpmbuild,
            dry_run,
        } => {
            let root = package_root(&package, root);
            logging::init(level, Some(&root.join("package.log")))?;
            cmd_build(&package, &stage, &root, rpmbuild, dry_run)
        }
        Command::Spec {
            package,
            stage,
            root,
        } => {
            logging::init(level, None)?;
            let root = package_root(&package, root);
            let pkg = config::load(&package)?.package()?;
            let desc = descriptor::synthesize(&pkg, &root, &stage, &TracingReporter)?;
            print!("{}", desc.text);
            Ok(())
        }
        Command::Files {
            package,
            stage,
            root,
            json,
        } => {
            logging::init(level, None)?;
            let root = package_root(&package, root);
            let pkg = config::load(&package)?.package()?;
            let desc = descriptor::synthesize(&pkg, &root, &stage, &TracingReporter)?;
            if json {
                util::write_json_pretty(&mut std::io::stdout(), &desc.entries)?;
            } else {
                for entry in &desc.entries {
                    println!("{}", entry.line());
                }
            }
            Ok(())
        }
        Command::Resolve { package } => {
            logging::init(level, None)?;
            let doc = config::load(&package)?;
            print!("{}", doc.to_toml_string()?);
            Ok(())
        }
    }
}

fn cmd_build(
    package: &Path,
    stage: &Path,
    root: &Path,
    rpmbuild_bin: PathBuf,
    dry_run: bool,
) -> Result<()> {
    let doc = config::load(package)?;
    let pkg = doc.package()?;
    tracing::debug!("package description:\n{:?}", pkg);

    let mut opts = BuildOptions::new(root, stage);
    opts.rpmbuild = rpmbuild_bin;
    opts.default_args = rpmbuild::default_options_from_env()?;
    opts.dry_run = dry_run;

    let outputs = rpmstage::build::build(&pkg, &opts, &TracingReporter)?;
    tracing::info!("spec written to {}", outputs.spec_path.display());
    Ok(())
}
