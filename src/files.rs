//! # Idempotent File Deployment
//!
//! Helpers for deploying configuration payloads onto the host. Every setup
//! task follows the same pattern: render the payload, check whether the
//! destination already holds exactly that content ([`is_copied`]), and only
//! write when it does not ([`copy`]). Writes go through a temporary file in
//! the destination directory followed by a rename, so a crash mid-write
//! never leaves a half-deployed file.
//!
//! Templates use `${name}` placeholders; an unresolved placeholder is an
//! error rather than silently deployed text.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use crate::error::{Error, Result};

/// Whether `dest` is a file whose content equals `text`.
pub fn is_copied(text: &str, dest: &Path) -> bool {
    dest.is_file()
        && std::fs::read_to_string(dest)
            .map(|current| current == text)
            .unwrap_or(false)
}

/// Atomically write `text` to `dest`, creating parent directories.
pub fn copy(text: &str, dest: &Path) -> Result<()> {
    let parent = dest.parent().ok_or_else(|| Error::Io(std::io::Error::new(
        std::io::ErrorKind::InvalidInput,
        format!("destination has no parent directory: {}", dest.display()),
    )))?;
    std::fs::create_dir_all(parent)?;
    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(text.as_bytes())?;
    temp.persist(dest).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

/// Substitute `${name}` placeholders in a template.
///
/// A literal `$` not followed by `{` passes through unchanged. A
/// placeholder with no matching variable is a `Template` error.
pub fn substitute(template: &str, vars: &BTreeMap<String, String>) -> Result<String> {
    let mut result = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find('}').ok_or_else(|| Error::Template {
            message: "unterminated placeholder".to_string(),
            variable: None,
        })?;
        let name = &after[..end];
        let value = vars.get(name).ok_or_else(|| Error::Template {
            message: "undefined variable".to_string(),
            variable: Some(name.to_string()),
        })?;
        result.push_str(value);
        rest = &after[end + 1..];
    }
    result.push_str(rest);
    Ok(result)
}

/// Convenience constructor for substitution variables.
pub fn vars<const N: usize>(pairs: [(&str, String); N]) -> BTreeMap<String, String> {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

/// Add mode bits to a file's permissions (unix).
pub fn add_mode(path: &Path, bits: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = std::fs::metadata(path)?.permissions();
    perms.set_mode(perms.mode() | bits);
    std::fs::set_permissions(path, perms)?;
    Ok(())
}

/// Create an empty file when absent; leave an existing one untouched.
pub fn touch(path: &Path) -> Result<()> {
    if !path.exists() {
        std::fs::File::create(path)?;
    }
    Ok(())
}
