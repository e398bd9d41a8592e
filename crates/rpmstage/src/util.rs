use std::fs;
use std::io::Write;
use std::path::Path;

use crate::error::{Error, Result};

const OUTPUT_MODE: u32 = 0o640;

pub fn ensure_dir(p: &Path) -> Result<()> {
    fs::create_dir_all(p)
        .map_err(|e| Error::fs(format!("failed to create dir {}: {e}", p.display())))
}

pub fn write_text(p: &Path, s: &str) -> Result<()> {
    let parent = p.parent().unwrap_or_else(|| Path::new("."));
    ensure_dir(parent)?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)
        .map_err(|e| Error::fs(format!("failed to create temp file in {}: {e}", parent.display())))?;
    tmp.write_all(s.as_bytes())
        .map_err(|e| Error::fs(format!("failed to write {}: {e}", p.display())))?;
    set_mode(tmp.path(), OUTPUT_MODE)?;
    tmp.persist(p)
        .map_err(|e| Error::fs(format!("failed to write {}: {}", p.display(), e.error)))?;
    Ok(())
}

pub fn write_json_pretty<T: serde::Serialize>(out: &mut dyn Write, v: &T) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, v)
        .map_err(|e| Error::fs(format!("json encode error: {e}")))?;
    writeln!(out)?;
    Ok(())
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .map_err(|e| Error::fs(format!("failed to set mode on {}: {e}", path.display())))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_text_replaces_content() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let p = tmp.path().join("out/a.spec");
        write_text(&p, "one\n").expect("first write");
        write_text(&p, "two\n").expect("second write");
        assert_eq!(fs::read_to_string(&p).expect("read"), "two\n");
    }

    #[cfg(unix)]
    #[test]
    fn written_files_are_0640() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().expect("tempdir");
        let p = tmp.path().join("rpmrc");
        write_text(&p, "x\n").expect("write");
        let mode = fs::metadata(&p).expect("stat").permissions().mode();
        assert_eq!(mode & 0o777, 0o640);
    }
}
