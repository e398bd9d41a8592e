use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;
use toml::Value;

use crate::error::{Error, Result};

fn default_dirmode() -> String {
    "0755".into()
}

fn default_filemode() -> String {
    "0644".into()
}

fn default_execmode() -> String {
    "0755".into()
}

fn default_owner() -> String {
    "root".into()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct RawPackage {
    tags: toml::Table,
    arch: Option<String>,
    provides: Option<String>,
    requires: Vec<String>,
    description: Option<String>,
    scripts: Vec<Scriptlet>,
    docdir: Option<String>,
    ignore_list: Vec<String>,
    filemodes: Vec<RawFileMode>,
    permissions: toml::Table,
    tokens: toml::Table,
    #[serde(default = "default_dirmode")]
    global_dirmode: String,
    #[serde(default = "default_filemode")]
    global_filemode: String,
    #[serde(default = "default_execmode")]
    bin_filemode: String,
    #[serde(default = "default_execmode")]
    lib_filemode: String,
    #[serde(default = "default_owner")]
    user: String,
    #[serde(default = "default_owner")]
    group: String,
    rpmrc: RpmrcConfig,
}

impl Default for RawPackage {
    fn default() -> Self {
        Self {
            tags: toml::Table::new(),
            arch: None,
            provides: None,
            requires: Vec::new(),
            description: None,
            scripts: Vec::new(),
            docdir: None,
            ignore_list: Vec::new(),
            filemodes: Vec::new(),
            permissions: toml::Table::new(),
            tokens: toml::Table::new(),
            global_dirmode: default_dirmode(),
            global_filemode: default_filemode(),
            bin_filemode: default_execmode(),
            lib_filemode: default_execmode(),
            user: default_owner(),
            group: default_owner(),
            rpmrc: RpmrcConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct RawFileMode {
    dir: Option<String>,
    file: Option<String>,
    mode: String,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RpmrcConfig {
    pub macrofiles: Vec<String>,
    pub macros: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Scriptlet {
    pub name: String,
    pub file: Option<String>,
    pub source: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    PreInstall,
    PostInstall,
    PreUninstall,
    PostUninstall,
}

impl Phase {
    /// Case-insensitive prefix match with `-` and `_` ignored, so
    /// `Post-Install`, `postinst` and `post_install` all land on `%post`.
    pub fn classify(name: &str) -> Option<Phase> {
        let norm: String = name
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .flat_map(char::to_lowercase)
            .collect();
        if norm.starts_with("prein") {
            Some(Phase::PreInstall)
        } else if norm.starts_with("postin") {
            Some(Phase::PostInstall)
        } else if norm.starts_with("preun") {
            Some(Phase::PreUninstall)
        } else if norm.starts_with("postun") {
            Some(Phase::PostUninstall)
        } else {
            None
        }
    }

    pub fn marker(self) -> &'static str {
        match self {
            Phase::PreInstall => "%pre",
            Phase::PostInstall => "%post",
            Phase::PreUninstall => "%preun",
            Phase::PostUninstall => "%postun",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileModeSpec {
    pub pattern: String,
    pub mode: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attribute {
    ModeTriple {
        mode: String,
        user: String,
        group: String,
    },
    /// Used verbatim, e.g. `(0755, root, root)` or `(-, -, -)`.
    Preformatted(String),
    Invalid(String),
}

impl Attribute {
    pub fn triple(mode: &str, user: &str, group: &str) -> Self {
        Attribute::ModeTriple {
            mode: mode.to_string(),
            user: user.to_string(),
            group: group.to_string(),
        }
    }

    pub fn from_value(v: &Value, user: &str, group: &str) -> Self {
        match v {
            Value::String(s) => Attribute::Preformatted(s.clone()),
            Value::Array(items) => {
                let parts: Option<Vec<String>> = items.iter().map(scalar_text).collect();
                match parts.as_deref() {
                    Some([mode, user, group]) => Attribute::triple(mode, user, group),
                    _ => Attribute::Invalid(format!("expected [mode, user, group], got {v}")),
                }
            }
            Value::Table(tbl) => {
                let Some(mode) = tbl.get("mode").and_then(scalar_text) else {
                    return Attribute::Invalid(format!("table override without 'mode': {v}"));
                };
                let user = tbl
                    .get("user")
                    .and_then(scalar_text)
                    .unwrap_or_else(|| user.to_string());
                let group = tbl
                    .get("group")
                    .and_then(scalar_text)
                    .unwrap_or_else(|| group.to_string());
                Attribute::ModeTriple { mode, user, group }
            }
            other => Attribute::Invalid(format!("unsupported override value {other}")),
        }
    }

    pub fn clause(&self) -> Option<String> {
        match self {
            Attribute::ModeTriple { mode, user, group } => {
                Some(format!("({mode}, {user}, {group})"))
            }
            Attribute::Preformatted(s) => Some(s.clone()),
            Attribute::Invalid(_) => None,
        }
    }
}

fn scalar_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Integer(i) => Some(i.to_string()),
        _ => None,
    }
}

fn tag_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn version_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[\w.]+\.\d+$").expect("version regex"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSpec {
    pub tags: Vec<(String, String)>,
    pub arch: Option<String>,
    pub provides: Option<String>,
    pub requires: Vec<String>,
    pub description: Option<String>,
    pub scripts: Vec<Scriptlet>,
    pub docdir: Option<String>,
    pub ignore_list: Vec<String>,
    pub filemodes: Vec<FileModeSpec>,
    pub permissions: BTreeMap<String, Attribute>,
    pub tokens: Vec<(String, String)>,
    pub global_dirmode: String,
    pub global_filemode: String,
    pub bin_filemode: String,
    pub lib_filemode: String,
    pub user: String,
    pub group: String,
    pub rpmrc: RpmrcConfig,
}

impl Default for PackageSpec {
    fn default() -> Self {
        Self {
            tags: Vec::new(),
            arch: None,
            provides: None,
            requires: Vec::new(),
            description: None,
            scripts: Vec::new(),
            docdir: None,
            ignore_list: Vec::new(),
            filemodes: Vec::new(),
            permissions: BTreeMap::new(),
            tokens: Vec::new(),
            global_dirmode: default_dirmode(),
            global_filemode: default_filemode(),
            bin_filemode: default_execmode(),
            lib_filemode: default_execmode(),
            user: default_owner(),
            group: default_owner(),
            rpmrc: RpmrcConfig::default(),
        }
    }
}

impl PackageSpec {
    pub fn from_value(value: Value) -> Result<Self> {
        let raw: RawPackage = value
            .try_into()
            .map_err(|e| Error::config(format!("invalid package description: {e}")))?;

        let mut filemodes = Vec::with_capacity(raw.filemodes.len());
        for (i, fm) in raw.filemodes.into_iter().enumerate() {
            let Some(pattern) = fm.dir.or(fm.file) else {
                return Err(Error::config(format!(
                    "filemodes[{i}] needs a 'dir' or 'file' pattern"
                )));
            };
            filemodes.push(FileModeSpec {
                pattern,
                mode: fm.mode,
            });
        }

        let permissions = raw
            .permissions
            .iter()
            .map(|(path, v)| (path.clone(), Attribute::from_value(v, &raw.user, &raw.group)))
            .collect();

        Ok(Self {
            tags: raw
                .tags
                .iter()
                .map(|(k, v)| (k.clone(), tag_text(v)))
                .collect(),
            arch: raw.arch,
            provides: raw.provides,
            requires: raw.requires,
            description: raw.description,
            scripts: raw.scripts,
            docdir: raw.docdir,
            ignore_list: raw.ignore_list,
            filemodes,
            permissions,
            tokens: raw
                .tokens
                .iter()
                .map(|(k, v)| (k.clone(), tag_text(v)))
                .collect(),
            global_dirmode: raw.global_dirmode,
            global_filemode: raw.global_filemode,
            bin_filemode: raw.bin_filemode,
            lib_filemode: raw.lib_filemode,
            user: raw.user,
            group: raw.group,
            rpmrc: raw.rpmrc,
        })
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let value: Value = toml::from_str(raw)?;
        Self::from_value(value)
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_tag(&mut self, key: &str, value: &str) {
        match self.tags.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value.to_string(),
            None => self.tags.push((key.to_string(), value.to_string())),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.tag("name")
    }

    pub fn version(&self) -> Option<&str> {
        self.tag("version")
    }

    pub fn release(&self) -> Option<&str> {
        self.tag("release")
    }

    pub fn validate(&self) -> Result<()> {
        for required in ["version", "name"] {
            if self.tag(required).is_none() {
                return Err(Error::config(format!("{required} must be defined under [tags]")));
            }
        }
        let version = self.version().unwrap_or_default();
        if !version_re().is_match(version) {
            return Err(Error::config(format!("version is malformed: {version:?}")));
        }
        Ok(())
    }

    pub fn spec_file_name(&self) -> Result<String> {
        let name = self
            .name()
            .ok_or_else(|| Error::config("name must be defined under [tags]"))?;
        Ok(match self.release() {
            Some(release) => format!("{name}-{release}.spec"),
            None => format!("{name}.spec"),
        })
    }

    pub fn description_text(&self) -> String {
        match &self.description {
            Some(d) => d.clone(),
            None => format!(
                "files for the {} software package",
                self.name().unwrap_or_default()
            ),
        }
    }

    pub fn target_arch(&self) -> String {
        self.arch
            .clone()
            .unwrap_or_else(|| std::env::consts::ARCH.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_script_names() {
        assert_eq!(Phase::classify("postinstall"), Some(Phase::PostInstall));
        assert_eq!(Phase::classify("Pre-Install"), Some(Phase::PreInstall));
        assert_eq!(Phase::classify("pre_uninstall"), Some(Phase::PreUninstall));
        assert_eq!(Phase::classify("POSTUN"), Some(Phase::PostUninstall));
        assert_eq!(Phase::classify("verify"), None);
        assert_eq!(Phase::classify(""), None);
    }

    #[test]
    fn version_must_end_in_dot_digits() {
        let mut pkg = PackageSpec::default();
        pkg.set_tag("name", "foo");
        pkg.set_tag("version", "1.2.3.4");
        assert!(pkg.validate().is_ok());

        pkg.set_tag("version", "abc");
        let err = pkg.validate().unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Config);
        assert!(err.to_string().contains("malformed"), "unexpected err: {err}");

        pkg.set_tag("version", "1.2rc");
        assert!(pkg.validate().is_err());
    }

    #[test]
    fn missing_name_is_config_error() {
        let pkg = PackageSpec::from_toml_str("[tags]\nversion = \"1.0\"\n").expect("parse");
        let err = pkg.validate().unwrap_err();
        assert!(err.to_string().contains("name"), "unexpected err: {err}");
    }

    #[test]
    fn parses_override_shapes() {
        let pkg = PackageSpec::from_toml_str(
            r#"
user = "app"
group = "app"

[permissions]
"/a" = ["0700", "root", "wheel"]
"/b" = { mode = "0750" }
"/c" = "(-, root, root)"
"/d" = 42
"/e" = ["0700", "root"]
"#,
        )
        .expect("parse");

        assert_eq!(
            pkg.permissions["/a"],
            Attribute::triple("0700", "root", "wheel")
        );
        assert_eq!(pkg.permissions["/b"], Attribute::triple("0750", "app", "app"));
        assert_eq!(
            pkg.permissions["/c"].clause().as_deref(),
            Some("(-, root, root)")
        );
        assert!(matches!(pkg.permissions["/d"], Attribute::Invalid(_)));
        assert!(matches!(pkg.permissions["/e"], Attribute::Invalid(_)));
    }

    #[test]
    fn filemode_needs_a_pattern() {
        let err = PackageSpec::from_toml_str("[[filemodes]]\nmode = \"0700\"\n").unwrap_err();
        assert!(err.to_string().contains("filemodes[0]"), "unexpected err: {err}");

        let pkg = PackageSpec::from_toml_str(
            "[[filemodes]]\nfile = \"run.sh\"\nmode = \"0700\"\n",
        )
        .expect("parse");
        assert_eq!(pkg.filemodes[0].pattern, "run.sh");
    }

    #[test]
    fn spec_file_name_uses_release_when_present() {
        let mut pkg = PackageSpec::default();
        pkg.set_tag("name", "foo");
        assert_eq!(pkg.spec_file_name().expect("name"), "foo.spec");
        pkg.set_tag("release", "3");
        assert_eq!(pkg.spec_file_name().expect("name"), "foo-3.spec");
    }
}
