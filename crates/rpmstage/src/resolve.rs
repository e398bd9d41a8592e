use serde::Serialize;

use crate::package::{Attribute, PackageSpec};
use crate::patterns::RuleSet;
use crate::report::{Event, Reporter};
use crate::tree::FileTree;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Dir,
    File,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileEntry {
    pub kind: EntryKind,
    pub path: String,
    pub attribute: Option<String>,
}

impl FileEntry {
    pub fn line(&self) -> String {
        let attr = self.attribute.as_deref().filter(|a| !a.trim().is_empty());
        match (self.kind, attr) {
            (EntryKind::Dir, Some(a)) => format!("%dir %attr{a} {}", self.path),
            (EntryKind::Dir, None) => format!("%dir {}", self.path),
            (EntryKind::File, Some(a)) => format!("%attr{a} {}", self.path),
            (EntryKind::File, None) => self.path.clone(),
        }
    }
}

/// Decides, per scanned path, whether it is listed and with which attribute.
///
/// Directories: ignore pattern, then exact-path override, then
/// `global_dirmode`. Files: ignore pattern, then exact-path override, then
/// the first matching filemode rule, then `bin_filemode`/`lib_filemode` by
/// parent directory name, then `global_filemode`.
pub struct Resolver<'a> {
    pkg: &'a PackageSpec,
    rules: &'a RuleSet,
    reporter: &'a dyn Reporter,
}

impl<'a> Resolver<'a> {
    pub fn new(pkg: &'a PackageSpec, rules: &'a RuleSet, reporter: &'a dyn Reporter) -> Self {
        Self {
            pkg,
            rules,
            reporter,
        }
    }

    pub fn resolve(&self, tree: &FileTree) -> Vec<FileEntry> {
        let mut out = Vec::new();
        for (dir, files) in tree.iter() {
            if let Some(entry) = self.resolve_dir(dir) {
                out.push(entry);
            }
            for file in files {
                if let Some(entry) = self.resolve_file(dir, file) {
                    out.push(entry);
                }
            }
        }
        out
    }

    pub fn resolve_dir(&self, dir: &str) -> Option<FileEntry> {
        if self.rules.is_ignored(dir) {
            self.reporter.emit(Event::IgnoredDir {
                path: dir.to_string(),
            });
            return None;
        }

        let attribute = match self.pkg.permissions.get(dir) {
            Some(attr) => self.override_clause(dir, attr),
            None => Some(self.default_clause(&self.pkg.global_dirmode)),
        };
        self.reporter.emit(Event::DirAttribute {
            path: dir.to_string(),
            attribute: attribute.clone(),
        });
        // A directory stays listed even without an attribute.
        Some(FileEntry {
            kind: EntryKind::Dir,
            path: dir.to_string(),
            attribute,
        })
    }

    pub fn resolve_file(&self, dir: &str, file: &str) -> Option<FileEntry> {
        let path = format!("{dir}/{file}");
        if self.rules.is_ignored(&path) {
            self.reporter.emit(Event::IgnoredFile { path });
            return None;
        }

        let attribute = if let Some(attr) = self.pkg.permissions.get(&path) {
            self.override_clause(&path, attr)
        } else if let Some(rule) = self.rules.find_filemode_rule(dir, file) {
            Some(self.default_clause(&rule.mode))
        } else {
            let mode = match dir.rsplit('/').next() {
                Some("bin") => &self.pkg.bin_filemode,
                Some("lib") => &self.pkg.lib_filemode,
                _ => &self.pkg.global_filemode,
            };
            Some(self.default_clause(mode))
        };

        let Some(attribute) = attribute.filter(|a| !a.trim().is_empty()) else {
            self.reporter.emit(Event::OmittedFile { path });
            return None;
        };
        self.reporter.emit(Event::FileAttribute {
            path: path.clone(),
            attribute: attribute.clone(),
        });
        Some(FileEntry {
            kind: EntryKind::File,
            path,
            attribute: Some(attribute),
        })
    }

    fn default_clause(&self, mode: &str) -> String {
        format!("({mode}, {}, {})", self.pkg.user, self.pkg.group)
    }

    fn override_clause(&self, path: &str, attr: &Attribute) -> Option<String> {
        if let Attribute::Invalid(reason) = attr {
            self.reporter.emit(Event::MalformedOverride {
                path: path.to_string(),
                reason: reason.clone(),
            });
        }
        attr.clause()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::MemoryReporter;

    fn pkg(raw: &str) -> PackageSpec {
        PackageSpec::from_toml_str(raw).expect("package")
    }

    fn tree(entries: &[(&str, &[&str])]) -> FileTree {
        let mut t = FileTree::default();
        for (dir, files) in entries {
            t.insert_dir(dir);
            for f in *files {
                t.push_file(dir, f);
            }
        }
        t
    }

    fn lines(pkg: &PackageSpec, t: &FileTree, reporter: &MemoryReporter) -> Vec<String> {
        let rules = RuleSet::for_package(pkg).expect("rules");
        Resolver::new(pkg, &rules, reporter)
            .resolve(t)
            .iter()
            .map(FileEntry::line)
            .collect()
    }

    #[test]
    fn bin_and_lib_dirs_use_their_modes() {
        let p = pkg(r#"
global_dirmode = "0755"
global_filemode = "0644"
bin_filemode = "0555"
lib_filemode = "0444"
user = "app"
group = "staff"
"#);
        let t = tree(&[
            ("/opt/bin", &["run.sh"]),
            ("/opt/lib", &["libx.so"]),
            ("/opt/etc", &["a.conf"]),
        ]);
        let got = lines(&p, &t, &MemoryReporter::default());
        assert_eq!(
            got,
            vec![
                "%dir %attr(0755, app, staff) /opt/bin",
                "%attr(0555, app, staff) /opt/bin/run.sh",
                "%dir %attr(0755, app, staff) /opt/lib",
                "%attr(0444, app, staff) /opt/lib/libx.so",
                "%dir %attr(0755, app, staff) /opt/etc",
                "%attr(0644, app, staff) /opt/etc/a.conf",
            ]
        );
    }

    #[test]
    fn exact_override_beats_filemode_rule() {
        let p = pkg(r#"
[[filemodes]]
file = "run.sh"
mode = "0700"

[permissions]
"/opt/bin/run.sh" = ["0750", "root", "wheel"]
"/opt/bin" = { mode = "0711" }
"#);
        let t = tree(&[("/opt/bin", &["run.sh", "stop.sh"])]);
        let got = lines(&p, &t, &MemoryReporter::default());
        assert_eq!(
            got,
            vec![
                "%dir %attr(0711, root, root) /opt/bin",
                "%attr(0750, root, wheel) /opt/bin/run.sh",
                "%attr(0755, root, root) /opt/bin/stop.sh",
            ]
        );
    }

    #[test]
    fn filemode_rules_never_apply_to_directories() {
        let p = pkg(r#"
[[filemodes]]
dir = "/opt/app/lib"
mode = "0700"
"#);
        let t = tree(&[("/opt/app/lib", &["x.so"])]);
        let got = lines(&p, &t, &MemoryReporter::default());
        assert_eq!(
            got,
            vec![
                "%dir %attr(0755, root, root) /opt/app/lib",
                "%attr(0700, root, root) /opt/app/lib/x.so",
            ]
        );
    }

    #[test]
    fn ignores_are_evaluated_per_path() {
        let p = pkg(r#"ignore_list = ["^/tmp.*", "/srv", ".*\\.pyc"]"#);
        let t = tree(&[
            ("/tmp/cache", &["x"]),
            ("/srv", &["keep.py", "drop.pyc"]),
        ]);
        let reporter = MemoryReporter::default();
        let got = lines(&p, &t, &reporter);
        assert_eq!(got, vec!["%attr(0644, root, root) /srv/keep.py"]);

        let events = reporter.events();
        assert!(events.contains(&Event::IgnoredDir {
            path: "/tmp/cache".into()
        }));
        assert!(events.contains(&Event::IgnoredFile {
            path: "/srv/drop.pyc".into()
        }));
    }

    #[test]
    fn malformed_override_degrades_per_kind() {
        let p = pkg(r#"
[permissions]
"/etc/app" = 17
"/etc/app/a.conf" = ["0600"]
"#);
        let t = tree(&[("/etc/app", &["a.conf", "b.conf"])]);
        let reporter = MemoryReporter::default();
        let got = lines(&p, &t, &reporter);
        assert_eq!(
            got,
            vec!["%dir /etc/app", "%attr(0644, root, root) /etc/app/b.conf"]
        );

        let malformed = reporter
            .events()
            .into_iter()
            .filter(|e| matches!(e, Event::MalformedOverride { .. }))
            .count();
        assert_eq!(malformed, 2);
        assert!(reporter.events().contains(&Event::OmittedFile {
            path: "/etc/app/a.conf".into()
        }));
    }

    #[test]
    fn blank_preformatted_override_omits_file() {
        let p = pkg(r#"
[permissions]
"/etc/skip.conf" = "   "
"#);
        let t = tree(&[("/etc", &["skip.conf"])]);
        let got = lines(&p, &t, &MemoryReporter::default());
        assert_eq!(got, vec!["%dir %attr(0755, root, root) /etc"]);
    }
}
