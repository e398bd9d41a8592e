use std::fs;
use std::io::ErrorKind as IoErrorKind;
use std::path::Path;

use crate::error::{Error, Result};
use crate::package::{PackageSpec, Phase, Scriptlet};
use crate::patterns::RuleSet;
use crate::report::{Event, Reporter};
use crate::resolve::{FileEntry, Resolver};
use crate::tree;

#[derive(Debug, Clone)]
pub struct Descriptor {
    pub file_name: String,
    pub text: String,
    pub entries: Vec<FileEntry>,
}

pub fn synthesize(
    pkg: &PackageSpec,
    package_root: &Path,
    staged_root: &Path,
    reporter: &dyn Reporter,
) -> Result<Descriptor> {
    pkg.validate()?;
    let tree = tree::scan(staged_root, reporter)?;
    tracing::debug!("file tree has {} directories", tree.len());
    let rules = RuleSet::for_package(pkg)?;
    let entries = Resolver::new(pkg, &rules, reporter).resolve(&tree);
    let text = DescriptorWriter::new(pkg, package_root, reporter).render(&entries)?;
    Ok(Descriptor {
        file_name: pkg.spec_file_name()?,
        text,
        entries,
    })
}

pub struct DescriptorWriter<'a> {
    pkg: &'a PackageSpec,
    package_root: &'a Path,
    reporter: &'a dyn Reporter,
}

impl<'a> DescriptorWriter<'a> {
    pub fn new(pkg: &'a PackageSpec, package_root: &'a Path, reporter: &'a dyn Reporter) -> Self {
        Self {
            pkg,
            package_root,
            reporter,
        }
    }

    pub fn render(&self, entries: &[FileEntry]) -> Result<String> {
        self.pkg.validate()?;
        let pkg = self.pkg;
        let mut out = String::new();

        for (tag, value) in &pkg.tags {
            tracing::debug!("writing '{tag}: {value}'");
            push_line(&mut out, &format!("{tag}: {value}"));
        }
        if let Some(provides) = &pkg.provides {
            push_line(&mut out, &format!("provides: {provides}"));
        }
        if !pkg.requires.is_empty() {
            push_line(&mut out, &format!("requires: {}", pkg.requires.join(", ")));
        }

        push_line(&mut out, "%description");
        push_line(&mut out, &pkg.description_text());

        for script in &pkg.scripts {
            self.render_script(&mut out, script)?;
        }

        if let Some(docdir) = &pkg.docdir {
            push_line(&mut out, &format!("%docdir {docdir}"));
        }

        push_line(&mut out, "%files");
        for entry in entries {
            push_line(&mut out, &entry.line());
        }
        Ok(out)
    }

    fn render_script(&self, out: &mut String, script: &Scriptlet) -> Result<()> {
        let Some(phase) = Phase::classify(&script.name) else {
            self.reporter.emit(Event::SkippedScriptlet {
                name: script.name.clone(),
                reason: "name does not select a pre/post install/uninstall phase".into(),
            });
            return Ok(());
        };

        if let Some(file) = &script.file {
            let path = self.package_root.join(file);
            let body = match fs::read_to_string(&path) {
                Ok(body) => body,
                Err(e) if e.kind() == IoErrorKind::NotFound => {
                    self.reporter.emit(Event::MissingScriptletFile {
                        name: script.name.clone(),
                        path: path.display().to_string(),
                    });
                    return Ok(());
                }
                Err(e) => {
                    return Err(Error::fs(format!(
                        "failed to read script {}: {e}",
                        path.display()
                    )));
                }
            };
            tracing::debug!("reading in script file {}", path.display());
            push_line(out, phase.marker());
            for line in body.lines() {
                if line.trim_start().starts_with('#') || line.trim().is_empty() {
                    continue;
                }
                push_line(out, &self.substitute_tokens(line));
            }
        } else if let Some(source) = &script.source {
            tracing::debug!("writing script source for '{}'", script.name);
            push_line(out, phase.marker());
            push_line(out, source);
        } else {
            self.reporter.emit(Event::SkippedScriptlet {
                name: script.name.clone(),
                reason: "neither 'file' nor 'source' is set".into(),
            });
        }
        Ok(())
    }

    fn substitute_tokens(&self, line: &str) -> String {
        let mut line = line.to_string();
        for (token, value) in &self.pkg.tokens {
            if !token.is_empty() {
                line = line.replace(token.as_str(), value);
            }
        }
        line
    }
}

// Mirrors `puts`: exactly one trailing newline per logical line.
fn push_line(out: &mut String, s: &str) {
    out.push_str(s.strip_suffix('\n').unwrap_or(s));
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::MemoryReporter;
    use crate::resolve::EntryKind;

    fn pkg(raw: &str) -> PackageSpec {
        PackageSpec::from_toml_str(raw).expect("package")
    }

    #[test]
    fn header_sections_in_fixed_order() {
        let p = pkg(r#"
provides = "foo-api"
requires = ["bash", "coreutils"]
docdir = "/opt/foo/doc"

[tags]
name = "foo"
version = "1.2.3.4"
release = 1
summary = "Foo"

[[scripts]]
name = "preinstall"
source = "getent group foo || groupadd foo"
"#);
        let tmp = tempfile::tempdir().expect("tempdir");
        let reporter = MemoryReporter::default();
        let entries = vec![FileEntry {
            kind: EntryKind::Dir,
            path: "/opt/foo".into(),
            attribute: Some("(0755, root, root)".into()),
        }];
        let text = DescriptorWriter::new(&p, tmp.path(), &reporter)
            .render(&entries)
            .expect("render");
        assert_eq!(
            text,
            "name: foo\n\
             version: 1.2.3.4\n\
             release: 1\n\
             summary: Foo\n\
             provides: foo-api\n\
             requires: bash, coreutils\n\
             %description\n\
             files for the foo software package\n\
             %pre\n\
             getent group foo || groupadd foo\n\
             %docdir /opt/foo/doc\n\
             %files\n\
             %dir %attr(0755, root, root) /opt/foo\n"
        );
    }

    #[test]
    fn script_files_are_cleaned_and_tokenised() {
        let p = pkg(r#"
[tags]
name = "foo"
version = "1.0"

[tokens]
"@@VERSION@@" = "1.0"

[[scripts]]
name = "postinstall"
file = "scripts/post.sh"
"#);
        let tmp = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(tmp.path().join("scripts")).expect("mkdir");
        fs::write(
            tmp.path().join("scripts/post.sh"),
            "#!/bin/sh\n\n  # setup\necho installing @@VERSION@@\n\nln -sf /opt/foo-@@VERSION@@ /opt/foo\n",
        )
        .expect("write script");

        let text = DescriptorWriter::new(&p, tmp.path(), &MemoryReporter::default())
            .render(&[])
            .expect("render");
        assert!(
            text.contains("%post\necho installing 1.0\nln -sf /opt/foo-1.0 /opt/foo\n%files\n"),
            "unexpected descriptor:\n{text}"
        );
        assert!(!text.contains("#!/bin/sh"));
    }

    #[test]
    fn missing_script_file_is_skipped() {
        let p = pkg(r#"
[tags]
name = "foo"
version = "1.0"

[[scripts]]
name = "preun"
file = "scripts/nope.sh"

[[scripts]]
name = "verify"
source = "true"
"#);
        let tmp = tempfile::tempdir().expect("tempdir");
        let reporter = MemoryReporter::default();
        let text = DescriptorWriter::new(&p, tmp.path(), &reporter)
            .render(&[])
            .expect("render");
        assert!(!text.contains("%preun"));
        assert!(!text.contains("true"));

        let events = reporter.events();
        assert!(
            events
                .iter()
                .any(|e| matches!(e, Event::MissingScriptletFile { name, .. } if name == "preun"))
        );
        assert!(
            events
                .iter()
                .any(|e| matches!(e, Event::SkippedScriptlet { name, .. } if name == "verify"))
        );
    }

    #[test]
    fn refuses_to_render_without_valid_version() {
        let p = pkg("[tags]\nname = \"foo\"\nversion = \"abc\"\n");
        let tmp = tempfile::tempdir().expect("tempdir");
        let err = DescriptorWriter::new(&p, tmp.path(), &MemoryReporter::default())
            .render(&[])
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Config);
    }
}
