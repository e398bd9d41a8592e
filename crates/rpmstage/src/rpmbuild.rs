use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::log_sanitize;
use crate::workspace::RpmLayout;

pub const DEFAULT_RPMBUILD: &str = "/usr/bin/rpmbuild";
pub const OPTIONS_FILE: &str = ".rpmbuild.toml";
pub const OPTIONS_ENV: &str = "RPMBUILD_OPTS";

const FAILURE_TAIL_LINES: usize = 20;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct OptionsFile {
    rpmbuild_options: Vec<String>,
}

/// Site-wide default arguments: `~/.rpmbuild.toml` wins over `RPMBUILD_OPTS`.
pub fn default_options(home: Option<&Path>, env_opts: Option<&str>) -> Result<Vec<String>> {
    if let Some(path) = home.map(|h| h.join(OPTIONS_FILE)).filter(|p| p.is_file()) {
        let raw = fs::read_to_string(&path)
            .map_err(|e| Error::config(format!("failed to read {}: {e}", path.display())))?;
        let cfg: OptionsFile = toml::from_str(&raw)
            .map_err(|e| Error::config(format!("TOML parse error in {}: {e}", path.display())))?;
        let mut out = Vec::new();
        for opt in &cfg.rpmbuild_options {
            out.extend(split_args(opt)?);
        }
        return Ok(out);
    }
    match env_opts {
        Some(s) if !s.trim().is_empty() => split_args(s),
        _ => Ok(Vec::new()),
    }
}

pub fn default_options_from_env() -> Result<Vec<String>> {
    let env = std::env::var(OPTIONS_ENV).ok();
    default_options(dirs::home_dir().as_deref(), env.as_deref())
}

/// Shell-style word splitting with single and double quotes, enough for
/// options like `--define '_smp_mflags -j4'`.
pub fn split_args(s: &str) -> Result<Vec<String>> {
    let mut out = Vec::new();
    let mut cur = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some('"'), '\\') => match chars.next() {
                Some(n) => cur.push(n),
                None => cur.push('\\'),
            },
            (Some(_), c) => cur.push(c),
            (None, '\'' | '"') => {
                quote = Some(c);
                in_word = true;
            }
            (None, '\\') => {
                if let Some(n) = chars.next() {
                    cur.push(n);
                }
                in_word = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_word {
                    out.push(std::mem::take(&mut cur));
                    in_word = false;
                }
            }
            (None, c) => {
                cur.push(c);
                in_word = true;
            }
        }
    }
    if quote.is_some() {
        return Err(Error::config(format!("unterminated quote in rpmbuild options: {s}")));
    }
    if in_word {
        out.push(cur);
    }
    Ok(out)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub output: PathBuf,
}

impl Invocation {
    pub fn new(
        program: &Path,
        defaults: &[String],
        layout: &RpmLayout,
        arch: &str,
        staged_root: &Path,
        spec_file: &str,
    ) -> Self {
        let mut args: Vec<String> = defaults.to_vec();
        args.push("--rcfile".into());
        args.push(layout.rpmrc_path().display().to_string());
        args.push("--target".into());
        args.push(arch.to_string());
        args.push("--define".into());
        args.push(format!("_rpmdir {}", layout.rpmdir.display()));
        args.push("--buildroot".into());
        args.push(staged_root.display().to_string());
        args.push("-bb".into());
        args.push(layout.specdir.join(spec_file).display().to_string());
        Self {
            program: program.to_path_buf(),
            args,
            output: layout.rpmbuild_output.clone(),
        }
    }

    pub fn display(&self) -> String {
        let mut s = self.program.display().to_string();
        for a in &self.args {
            s.push(' ');
            if a.is_empty() || a.contains(char::is_whitespace) {
                s.push('\'');
                s.push_str(&a.replace('\'', r"'\''"));
                s.push('\'');
            } else {
                s.push_str(a);
            }
        }
        s.push_str(&format!(" >{} 2>&1", self.output.display()));
        s
    }

    pub fn run(&self) -> Result<()> {
        let out = File::create(&self.output).map_err(|e| {
            Error::fs(format!("failed to open {}: {e}", self.output.display()))
        })?;
        let err = out
            .try_clone()
            .map_err(|e| Error::fs(format!("failed to dup {}: {e}", self.output.display())))?;

        tracing::debug!("CMD: {}", self.display());
        let status = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(out))
            .stderr(Stdio::from(err))
            .status()
            .map_err(|e| {
                Error::process(format!("failed to spawn {}: {e}", self.program.display()))
            })?;

        if !status.success() {
            for line in log_sanitize::tail_lines(&self.output, FAILURE_TAIL_LINES) {
                tracing::error!("rpmbuild: {line}");
            }
            return Err(Error::process(format!(
                "RPMBUILD FAILED: {status} (see {})",
                self.output.display()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_quoted_words() {
        assert_eq!(
            split_args(r#"--quiet --define '_smp_mflags -j4' --define "dist .el9""#)
                .expect("split"),
            vec![
                "--quiet",
                "--define",
                "_smp_mflags -j4",
                "--define",
                "dist .el9"
            ]
        );
        assert!(split_args("--define 'oops").is_err());
        assert!(split_args("   ").expect("split").is_empty());
    }

    #[test]
    fn options_file_wins_over_env() {
        let tmp = tempfile::tempdir().expect("tempdir");
        assert_eq!(
            default_options(Some(tmp.path()), Some("--quiet")).expect("env"),
            vec!["--quiet"]
        );

        fs::write(
            tmp.path().join(OPTIONS_FILE),
            "rpmbuild_options = [\"--nodeps\", \"--define '_binary_filedigest_algorithm 8'\"]\n",
        )
        .expect("write options");
        assert_eq!(
            default_options(Some(tmp.path()), Some("--quiet")).expect("file"),
            vec!["--nodeps", "--define", "_binary_filedigest_algorithm 8"]
        );
        assert!(default_options(None, None).expect("none").is_empty());
    }

    #[test]
    fn binds_mandatory_flags_in_order() {
        let layout = RpmLayout::new(Path::new("/w"));
        let inv = Invocation::new(
            Path::new(DEFAULT_RPMBUILD),
            &["--quiet".to_string()],
            &layout,
            "x86_64",
            Path::new("/stage"),
            "foo-1.spec",
        );
        assert_eq!(
            inv.args,
            vec![
                "--quiet",
                "--rcfile",
                "/w/rpm/SPECS/rpmrc",
                "--target",
                "x86_64",
                "--define",
                "_rpmdir /w/rpm/RPMS",
                "--buildroot",
                "/stage",
                "-bb",
                "/w/rpm/SPECS/foo-1.spec",
            ]
        );
        assert_eq!(
            inv.display(),
            "/usr/bin/rpmbuild --quiet --rcfile /w/rpm/SPECS/rpmrc --target x86_64 \
             --define '_rpmdir /w/rpm/RPMS' --buildroot /stage -bb /w/rpm/SPECS/foo-1.spec \
             >/w/rpmbuild.out 2>&1"
        );
    }
}
