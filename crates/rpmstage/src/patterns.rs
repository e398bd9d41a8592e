use regex::Regex;

use crate::error::{Error, Result};
use crate::package::{FileModeSpec, PackageSpec};

/// A user-supplied regular expression, anchored to the whole compared string
/// unless the user placed their own `^`/`$` anchors.
#[derive(Debug, Clone)]
pub struct Pattern {
    raw: String,
    re: Regex,
}

impl Pattern {
    pub fn compile(raw: &str) -> Result<Self> {
        let anchored = anchor(raw);
        let re = Regex::new(&anchored)
            .map_err(|e| Error::config(format!("invalid pattern {raw:?}: {e}")))?;
        Ok(Self {
            raw: raw.to_string(),
            re,
        })
    }

    pub fn is_match(&self, s: &str) -> bool {
        self.re.is_match(s)
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn as_regex(&self) -> &str {
        self.re.as_str()
    }
}

fn anchor(raw: &str) -> String {
    let mut s = raw.trim().to_string();
    // The regex crate spells "end of input" as \z.
    if let Some(stem) = s.strip_suffix(r"\Z") {
        s = format!(r"{stem}\z");
    }
    let left = !(s.starts_with('^') || s.starts_with(r"\A"));
    let right = !(s.ends_with('$') || s.ends_with(r"\z"));
    if !left && !right {
        return s;
    }
    format!(
        "{}(?:{s}){}",
        if left { r"\A" } else { "" },
        if right { r"\z" } else { "" }
    )
}

#[derive(Debug, Clone)]
pub struct FileModeRule {
    pub pattern: Pattern,
    pub mode: String,
}

#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    ignores: Vec<Pattern>,
    filemodes: Vec<FileModeRule>,
}

impl RuleSet {
    pub fn new(ignores: &[String], filemodes: &[FileModeSpec]) -> Result<Self> {
        let ignores = ignores
            .iter()
            .map(|raw| Pattern::compile(raw))
            .collect::<Result<Vec<_>>>()?;
        let filemodes = filemodes
            .iter()
            .map(|fm| {
                Ok(FileModeRule {
                    pattern: Pattern::compile(&fm.pattern)?,
                    mode: fm.mode.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        tracing::debug!(
            "compiled ignore list: {:?}",
            ignores.iter().map(Pattern::as_regex).collect::<Vec<_>>()
        );
        Ok(Self { ignores, filemodes })
    }

    pub fn for_package(pkg: &PackageSpec) -> Result<Self> {
        Self::new(&pkg.ignore_list, &pkg.filemodes)
    }

    pub fn is_ignored(&self, path: &str) -> bool {
        let path = path.trim();
        self.ignores.iter().any(|p| p.is_match(path))
    }

    pub fn find_filemode_rule(&self, dir: &str, file: &str) -> Option<&FileModeRule> {
        let (dir, file) = (dir.trim(), file.trim());
        self.filemodes
            .iter()
            .find(|r| r.pattern.is_match(dir) || r.pattern.is_match(file))
    }
}
