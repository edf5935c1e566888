//! # Shared JWT secret provisioning.
//!
//! The execution and consensus clients authenticate their engine API with a
//! 32-byte secret stored as hex text. [`ensure_secret`] loads it if present and
//! valid, or generates and persists a new one.
//!
//! ## Rules
//! - Canonical file form: 64 lowercase hex chars + `\n`.
//! - Loading accepts an optional `0x` prefix and surrounding whitespace.
//! - A valid existing file is never rewritten.
//! - New files are written to a sibling temp file with mode `0600`, synced, then renamed.
//! - [`Secret`] is cheap to clone and never prints its value.

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rand::Rng;
use tracing::{debug, info, warn};

use crate::error::SecretError;

/// Secret length in bytes.
pub const SECRET_LEN: usize = 32;

/// Read-only handle to the provisioned secret.
#[derive(Clone)]
pub struct Secret {
    bytes: Arc<[u8; SECRET_LEN]>,
    path: Arc<Path>,
}

impl Secret {
    /// Raw secret bytes.
    pub fn as_bytes(&self) -> &[u8; SECRET_LEN] {
        &self.bytes
    }

    /// File the secret lives in; this is what services receive.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Canonical lowercase hex form.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes[..])
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secret")
            .field("path", &self.path)
            .field("bytes", &"<redacted>")
            .finish()
    }
}

impl PartialEq for Secret {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

/// Loads the secret at `path`, or creates it if the file does not exist.
///
/// # Errors
/// - [`SecretError::Malformed`] if the existing content is not 32 hex-encoded bytes.
/// - [`SecretError::Io`] if the file cannot be read, or the new one cannot be written.
pub fn ensure_secret(path: impl AsRef<Path>) -> Result<Secret, SecretError> {
    let path = path.as_ref();

    match fs::read(path) {
        Ok(raw) => {
            let content = std::str::from_utf8(&raw).map_err(|_| SecretError::Malformed {
                path: path.to_path_buf(),
                reason: "content is not valid UTF-8".to_owned(),
            })?;
            let bytes = decode_secret(path, content)?;
            #[cfg(unix)]
            warn_if_exposed(path);
            debug!(path = %path.display(), "loaded existing secret");
            Ok(Secret {
                bytes: Arc::new(bytes),
                path: Arc::from(path),
            })
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let mut bytes = [0u8; SECRET_LEN];
            rand::rng().fill(&mut bytes);
            write_atomic(path, &bytes)?;
            info!(path = %path.display(), "generated new secret");
            Ok(Secret {
                bytes: Arc::new(bytes),
                path: Arc::from(path),
            })
        }
        Err(source) => Err(io_error(path, source)),
    }
}

/// Removes the secret file (deployment teardown). A missing file is not an error.
pub fn remove_secret(path: impl AsRef<Path>) -> Result<(), SecretError> {
    let path = path.as_ref();
    match fs::remove_file(path) {
        Ok(()) => {
            info!(path = %path.display(), "removed secret");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(io_error(path, source)),
    }
}

/// Parses the textual secret form.
pub fn decode_secret(path: &Path, content: &str) -> Result<[u8; SECRET_LEN], SecretError> {
    let trimmed = content.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    if digits.len() != SECRET_LEN * 2 {
        return Err(SecretError::Malformed {
            path: path.to_path_buf(),
            reason: format!(
                "expected {} hex characters, found {}",
                SECRET_LEN * 2,
                digits.len()
            ),
        });
    }

    let mut bytes = [0u8; SECRET_LEN];
    hex::decode_to_slice(digits, &mut bytes).map_err(|e| SecretError::Malformed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    Ok(bytes)
}

fn write_atomic(path: &Path, bytes: &[u8; SECRET_LEN]) -> Result<(), SecretError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
    }

    let tmp = temp_path(path);
    let result = (|| {
        let mut file = open_private(&tmp)?;
        file.write_all(hex::encode(bytes).as_bytes())?;
        file.write_all(b"\n")?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();

    if let Err(source) = result {
        let _ = fs::remove_file(&tmp);
        return Err(io_error(path, source));
    }
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "secret".to_owned());
    path.with_file_name(format!(".{name}.tmp-{}", std::process::id()))
}

#[cfg(unix)]
fn open_private(path: &Path) -> std::io::Result<fs::File> {
    use std::os::unix::fs::OpenOptionsExt;
    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn open_private(path: &Path) -> std::io::Result<fs::File> {
    fs::File::create(path)
}

#[cfg(unix)]
fn warn_if_exposed(path: &Path) {
    use std::os::unix::fs::MetadataExt;
    if let Ok(meta) = fs::metadata(path) {
        let mode = meta.mode() & 0o777;
        if mode & 0o077 != 0 {
            warn!(path = %path.display(), mode = %format!("{mode:o}"), "secret file is readable by group/others");
        }
    }
}

fn io_error(path: &Path, source: std::io::Error) -> SecretError {
    SecretError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn generates_then_reloads_identical_secret() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("jwt").join("jwt.hex");

        let first = ensure_secret(&path).unwrap();
        let written = fs::read_to_string(&path).unwrap();
        assert_eq!(written, format!("{}\n", first.to_hex()));
        let modified = fs::metadata(&path).unwrap().modified().unwrap();

        let second = ensure_secret(&path).unwrap();
        assert_eq!(first.as_bytes(), second.as_bytes());
        assert_eq!(fs::read_to_string(&path).unwrap(), written);
        assert_eq!(fs::metadata(&path).unwrap().modified().unwrap(), modified);
    }

    #[cfg(unix)]
    #[test]
    fn new_secret_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("jwt.hex");
        ensure_secret(&path).unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }

    #[test]
    fn accepts_prefixed_hex_with_whitespace() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("jwt.hex");
        let hex = "ab".repeat(SECRET_LEN);
        fs::write(&path, format!("  0x{hex}\n\n")).unwrap();

        let secret = ensure_secret(&path).unwrap();
        assert_eq!(secret.as_bytes(), &[0xab; SECRET_LEN]);
        assert_eq!(fs::read_to_string(&path).unwrap(), format!("  0x{hex}\n\n"));
    }

    #[test]
    fn rejects_wrong_length_and_bad_digits() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("jwt.hex");

        fs::write(&path, "abcd").unwrap();
        assert!(matches!(
            ensure_secret(&path),
            Err(SecretError::Malformed { .. })
        ));

        fs::write(&path, "zz".repeat(SECRET_LEN)).unwrap();
        assert!(matches!(
            ensure_secret(&path),
            Err(SecretError::Malformed { .. })
        ));
    }

    #[test]
    fn non_utf8_content_is_a_config_fault() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("jwt.hex");
        fs::write(&path, [0xffu8; SECRET_LEN * 2]).unwrap();

        let err = ensure_secret(&path).unwrap_err();
        assert!(matches!(err, SecretError::Malformed { .. }), "{err}");
        assert_eq!(crate::Error::from(err).exit_code(), crate::EXIT_CONFIG_FAULT);
        assert_eq!(fs::read(&path).unwrap(), [0xffu8; SECRET_LEN * 2]);
    }

    #[test]
    fn debug_output_is_redacted() {
        let dir = TempDir::new().unwrap();
        let secret = ensure_secret(dir.path().join("jwt.hex")).unwrap();
        let shown = format!("{secret:?}");
        assert!(shown.contains("<redacted>"));
        assert!(!shown.contains(&secret.to_hex()));
    }

    #[test]
    fn remove_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("jwt.hex");
        ensure_secret(&path).unwrap();
        remove_secret(&path).unwrap();
        remove_secret(&path).unwrap();
        assert!(!path.exists());
    }
}
