use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use toml::Value;

use crate::error::{Error, Result};
use crate::package::PackageSpec;

#[derive(Debug, Clone)]
pub struct PackageDoc {
    pub path: PathBuf,
    pub value: Value,
}

impl PackageDoc {
    pub fn parse(path: impl Into<PathBuf>, raw: &str) -> Result<Self> {
        let path = path.into();
        let value: Value = toml::from_str(raw)
            .map_err(|e| Error::config(format!("TOML parse error in {}: {e}", path.display())))?;
        Ok(Self { path, value })
    }

    pub fn package(&self) -> Result<PackageSpec> {
        PackageSpec::from_value(self.value.clone())
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(&self.value)
            .map_err(|e| Error::config(format!("failed to render {}: {e}", self.path.display())))
    }
}

fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Table(base_tbl), Value::Table(over_tbl)) => {
            for (k, v) in over_tbl {
                match base_tbl.get_mut(&k) {
                    Some(existing) => merge_values(existing, v),
                    None => {
                        base_tbl.insert(k, v);
                    }
                }
            }
        }
        (slot, v) => *slot = v,
    }
}

fn resolve_ref(from_file: &Path, reference: &str) -> PathBuf {
    let p = PathBuf::from(reference.trim());
    if p.is_absolute() {
        p
    } else {
        from_file.parent().unwrap_or_else(|| Path::new(".")).join(p)
    }
}

fn take_imports(path: &Path, value: &mut Value) -> Result<Vec<String>> {
    let Some(tbl) = value.as_table_mut() else {
        return Ok(Vec::new());
    };
    let Some(raw) = tbl.remove("imports") else {
        return Ok(Vec::new());
    };
    let Value::Array(items) = raw else {
        return Err(Error::config(format!(
            "'imports' in {} must be an array of paths",
            path.display()
        )));
    };
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let Some(s) = item.as_str() else {
            return Err(Error::config(format!(
                "invalid imports entry in {} (expected string)",
                path.display()
            )));
        };
        if !s.trim().is_empty() {
            out.push(s.trim().to_string());
        }
    }
    Ok(out)
}

fn load_inner(path: &Path, stack: &mut HashSet<PathBuf>) -> Result<Value> {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    if !stack.insert(canonical.clone()) {
        return Err(Error::config(format!(
            "package description import cycle at {}",
            canonical.display()
        )));
    }

    let raw = fs::read_to_string(path).map_err(|e| {
        Error::config(format!(
            "failed to read package description {}: {e}",
            path.display()
        ))
    })?;
    let mut value = PackageDoc::parse(path, &raw)?.value;

    // Parent first, then imports, then this file's own keys on top.
    let mut out = Value::Table(Default::default());
    let parent = value
        .as_table_mut()
        .and_then(|t| t.remove("extends"))
        .map(|v| match v {
            Value::String(s) => Ok(s),
            _ => Err(Error::config(format!(
                "'extends' in {} must be a path string",
                path.display()
            ))),
        })
        .transpose()?;
    if let Some(parent) = parent {
        out = load_inner(&resolve_ref(path, &parent), stack)?;
    }
    for imp in take_imports(path, &mut value)? {
        let loaded = load_inner(&resolve_ref(path, &imp), stack)?;
        merge_values(&mut out, loaded);
    }
    merge_values(&mut out, value);

    stack.remove(&canonical);
    Ok(out)
}

pub fn load(path: &Path) -> Result<PackageDoc> {
    let mut stack = HashSet::new();
    let value = load_inner(path, &mut stack)?;
    Ok(PackageDoc {
        path: path.to_path_buf(),
        value,
    })
}
