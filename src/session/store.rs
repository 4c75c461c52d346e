//! Encrypted-at-rest persistence for platform login sessions.
//!
//! Each platform's cookies live in their own file under
//! `~/.config/jobsweep/sessions/<platform>.enc` (or the
//! `$XDG_CONFIG_HOME` equivalent), encrypted with XChaCha20-Poly1305.
//! The key comes from the system keychain, or from `JOBSWEEP_MASTER_KEY`
//! when set (headless hosts without a keychain).

use std::env;
use std::ffi::OsString;
use std::fs;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::browser::Cookie;
use crate::record::Platform;

const SESSIONS_DIR_NAME: &str = "sessions";
const KEYRING_SERVICE: &str = "jobsweep";
const KEYRING_ENTRY_NAME: &str = "session-master-key-v1";
const MASTER_KEY_ENV: &str = "JOBSWEEP_MASTER_KEY";
const MAGIC: &[u8; 4] = b"JSS1";
const NONCE_LEN: usize = 24;
const KEY_LEN: usize = 32;

/// Errors for persisted session storage operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionStoreError {
    /// No suitable user config directory is available.
    #[error("unable to determine config directory (set XDG_CONFIG_HOME or HOME)")]
    ConfigDirUnavailable,
    /// Filesystem I/O failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// Serialization/deserialization failed.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// Could not access keychain and no env fallback key was provided.
    #[error(
        "unable to access system keychain for session encryption key; set JOBSWEEP_MASTER_KEY or configure keychain access"
    )]
    KeychainUnavailable,
    /// Stored encrypted payload is malformed.
    #[error("persisted session payload is invalid")]
    InvalidPayload,
    /// Encryption failed.
    #[error("failed to encrypt persisted session")]
    EncryptionFailed,
    /// Decryption failed.
    #[error("failed to decrypt persisted session")]
    DecryptionFailed,
}

/// One platform's login state: its cookies and when they were captured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Platform the cookies belong to.
    pub platform: Platform,
    /// When the cookies were exported from the browser.
    pub captured_at: DateTime<Utc>,
    /// The cookie jar contents.
    pub cookies: Vec<Cookie>,
}

impl SessionSnapshot {
    /// Creates a snapshot captured now.
    #[must_use]
    pub fn new(platform: Platform, cookies: Vec<Cookie>) -> Self {
        Self {
            platform,
            captured_at: Utc::now(),
            cookies,
        }
    }
}

/// Handle to the encrypted session directory.
///
/// `open_default` resolves the user config directory and the master
/// key; `with_key` pins both explicitly for tests and scripted runs.
#[derive(Debug, Clone)]
pub struct SessionVault {
    dir: PathBuf,
    key_material: String,
}

impl SessionVault {
    /// Opens the default vault under the user config directory.
    ///
    /// # Errors
    ///
    /// Returns [`SessionStoreError`] when neither a config directory
    /// nor an encryption key can be resolved.
    pub fn open_default() -> Result<Self, SessionStoreError> {
        let dir = default_config_dir()?.join(SESSIONS_DIR_NAME);
        let key_material = load_or_create_key()?;
        Ok(Self { dir, key_material })
    }

    /// Opens a vault at an explicit directory with an explicit key.
    #[must_use]
    pub fn with_key(dir: impl Into<PathBuf>, key_material: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            key_material: key_material.into(),
        }
    }

    /// Path of the session file for a platform.
    #[must_use]
    pub fn session_path(&self, platform: Platform) -> PathBuf {
        self.dir.join(format!("{}.enc", platform.as_str()))
    }

    /// Encrypts and writes a snapshot, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns [`SessionStoreError`] when encryption or writing fails.
    pub fn save(&self, snapshot: &SessionSnapshot) -> Result<PathBuf, SessionStoreError> {
        let path = self.session_path(snapshot.platform);
        let plaintext = serde_json::to_vec(snapshot)?;
        let encrypted = encrypt_bytes(&plaintext, &self.key_material)?;
        write_encrypted_payload(&path, &encrypted)?;
        Ok(path)
    }

    /// Loads and decrypts a platform's snapshot.
    ///
    /// Returns `Ok(None)` when no session file exists for the platform.
    ///
    /// # Errors
    ///
    /// Returns [`SessionStoreError`] when decryption or parsing fails.
    pub fn load(&self, platform: Platform) -> Result<Option<SessionSnapshot>, SessionStoreError> {
        let path = self.session_path(platform);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path)?;
        let plaintext = decrypt_bytes(&bytes, &self.key_material)?;
        let snapshot = serde_json::from_slice::<SessionSnapshot>(&plaintext)?;
        Ok(Some(snapshot))
    }

    /// Removes a platform's session file.
    ///
    /// Returns `true` when a file existed and was deleted.
    ///
    /// # Errors
    ///
    /// Returns [`SessionStoreError`] when file removal fails.
    pub fn clear(&self, platform: Platform) -> Result<bool, SessionStoreError> {
        let path = self.session_path(platform);
        if path.exists() {
            fs::remove_file(&path)?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Removes every platform's session file and best-effort clears the
    /// keychain key (unless the key came from the environment).
    ///
    /// Returns how many files were deleted.
    ///
    /// # Errors
    ///
    /// Returns [`SessionStoreError`] when a file removal fails.
    pub fn clear_all(&self) -> Result<usize, SessionStoreError> {
        let mut removed = 0;
        for platform in Platform::all() {
            if self.clear(platform)? {
                removed += 1;
            }
        }
        if env::var_os(MASTER_KEY_ENV).is_none() {
            let _ = delete_keychain_key();
        }
        Ok(removed)
    }
}

fn default_config_dir() -> Result<PathBuf, SessionStoreError> {
    resolve_config_dir(
        sanitize_env_path(env::var_os("XDG_CONFIG_HOME")),
        sanitize_env_path(env::var_os("HOME")),
        sanitize_env_path(env::var_os("APPDATA")),
    )
}

fn sanitize_env_path(value: Option<OsString>) -> Option<PathBuf> {
    let value = value?;
    if value.to_string_lossy().trim().is_empty() {
        return None;
    }
    Some(PathBuf::from(value))
}

fn resolve_config_dir(
    xdg_config_home: Option<PathBuf>,
    home: Option<PathBuf>,
    app_data: Option<PathBuf>,
) -> Result<PathBuf, SessionStoreError> {
    if let Some(xdg) = xdg_config_home {
        return Ok(xdg.join("jobsweep"));
    }
    if let Some(home) = home {
        return Ok(home.join(".config").join("jobsweep"));
    }
    if let Some(app_data) = app_data {
        return Ok(app_data.join("jobsweep"));
    }
    Err(SessionStoreError::ConfigDirUnavailable)
}

fn load_or_create_key() -> Result<String, SessionStoreError> {
    if let Some(from_env) = env::var_os(MASTER_KEY_ENV) {
        let key = from_env.to_string_lossy().trim().to_string();
        if !key.is_empty() {
            return Ok(key);
        }
    }

    let entry = safe_keyring_entry()?;

    match safe_keyring_get_password(&entry) {
        Ok(existing) if !existing.trim().is_empty() => Ok(existing),
        _ => {
            let generated = generate_key_material();
            safe_keyring_set_password(&entry, &generated)?;
            Ok(generated)
        }
    }
}

fn delete_keychain_key() -> Result<(), SessionStoreError> {
    let entry = safe_keyring_entry()?;
    let _ = safe_keyring_delete_credential(&entry);
    Ok(())
}

// Keyring backends can panic on exotic platforms; treat any panic as
// keychain-unavailable so the env fallback path stays reachable.
fn safe_keyring_entry() -> Result<keyring::Entry, SessionStoreError> {
    catch_unwind(|| keyring::Entry::new(KEYRING_SERVICE, KEYRING_ENTRY_NAME))
        .map_err(|_| SessionStoreError::KeychainUnavailable)?
        .map_err(|_| SessionStoreError::KeychainUnavailable)
}

fn safe_keyring_get_password(entry: &keyring::Entry) -> Result<String, SessionStoreError> {
    catch_unwind(AssertUnwindSafe(|| entry.get_password()))
        .map_err(|_| SessionStoreError::KeychainUnavailable)?
        .map_err(|_| SessionStoreError::KeychainUnavailable)
}

fn safe_keyring_set_password(
    entry: &keyring::Entry,
    password: &str,
) -> Result<(), SessionStoreError> {
    catch_unwind(AssertUnwindSafe(|| entry.set_password(password)))
        .map_err(|_| SessionStoreError::KeychainUnavailable)?
        .map_err(|_| SessionStoreError::KeychainUnavailable)
}

fn safe_keyring_delete_credential(entry: &keyring::Entry) -> Result<(), SessionStoreError> {
    catch_unwind(AssertUnwindSafe(|| entry.delete_credential()))
        .map_err(|_| SessionStoreError::KeychainUnavailable)?
        .map_err(|_| SessionStoreError::KeychainUnavailable)
}

fn generate_key_material() -> String {
    let mut bytes = [0_u8; KEY_LEN];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex_encode(&bytes)
}

fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(char::from(HEX[usize::from(byte >> 4)]));
        out.push(char::from(HEX[usize::from(byte & 0x0f)]));
    }
    out
}

fn derive_key_bytes(key_material: &str) -> [u8; KEY_LEN] {
    let digest = Sha256::digest(key_material.as_bytes());
    let mut key = [0_u8; KEY_LEN];
    key.copy_from_slice(&digest[..KEY_LEN]);
    key
}

fn write_encrypted_payload(path: &Path, payload: &[u8]) -> Result<(), SessionStoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, payload)?;
    set_owner_only_permissions(path)?;
    Ok(())
}

#[cfg(unix)]
fn set_owner_only_permissions(path: &Path) -> Result<(), SessionStoreError> {
    use std::os::unix::fs::PermissionsExt;

    let permissions = fs::Permissions::from_mode(0o600);
    fs::set_permissions(path, permissions)?;
    Ok(())
}

#[cfg(not(unix))]
fn set_owner_only_permissions(_path: &Path) -> Result<(), SessionStoreError> {
    Ok(())
}

fn encrypt_bytes(plaintext: &[u8], key_material: &str) -> Result<Vec<u8>, SessionStoreError> {
    let key_bytes = derive_key_bytes(key_material);
    let cipher = XChaCha20Poly1305::new(Key::from_slice(&key_bytes));

    let mut nonce = [0_u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);
    let nonce_ref = XNonce::from_slice(&nonce);

    let ciphertext = cipher
        .encrypt(nonce_ref, plaintext)
        .map_err(|_| SessionStoreError::EncryptionFailed)?;

    let mut output = Vec::with_capacity(MAGIC.len() + NONCE_LEN + ciphertext.len());
    output.extend_from_slice(MAGIC);
    output.extend_from_slice(&nonce);
    output.extend_from_slice(&ciphertext);
    Ok(output)
}

fn decrypt_bytes(payload: &[u8], key_material: &str) -> Result<Vec<u8>, SessionStoreError> {
    if payload.len() < MAGIC.len() + NONCE_LEN || &payload[..MAGIC.len()] != MAGIC {
        return Err(SessionStoreError::InvalidPayload);
    }

    let key_bytes = derive_key_bytes(key_material);
    let cipher = XChaCha20Poly1305::new(Key::from_slice(&key_bytes));
    let nonce_start = MAGIC.len();
    let nonce_end = nonce_start + NONCE_LEN;
    let nonce = XNonce::from_slice(&payload[nonce_start..nonce_end]);
    let ciphertext = &payload[nonce_end..];

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| SessionStoreError::DecryptionFailed)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::ffi::OsString;

    use tempfile::TempDir;

    use super::*;

    fn sample_snapshot() -> SessionSnapshot {
        SessionSnapshot::new(
            Platform::Boss,
            vec![Cookie {
                name: "wt2".to_string(),
                value: "secret-token".to_string(),
                domain: ".zhipin.com".to_string(),
                path: "/".to_string(),
                expires_at: Some(4_102_444_800),
            }],
        )
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let tempdir = TempDir::new().unwrap();
        let vault = SessionVault::with_key(tempdir.path(), "test-key");

        vault.save(&sample_snapshot()).unwrap();
        let loaded = vault.load(Platform::Boss).unwrap().unwrap();
        assert_eq!(loaded.platform, Platform::Boss);
        assert_eq!(loaded.cookies.len(), 1);
        assert_eq!(loaded.cookies[0].name, "wt2");
        assert_eq!(loaded.cookies[0].value, "secret-token");
    }

    #[test]
    fn test_load_missing_platform_is_none() {
        let tempdir = TempDir::new().unwrap();
        let vault = SessionVault::with_key(tempdir.path(), "test-key");
        assert!(vault.load(Platform::Liepin).unwrap().is_none());
    }

    #[test]
    fn test_platforms_are_isolated() {
        let tempdir = TempDir::new().unwrap();
        let vault = SessionVault::with_key(tempdir.path(), "test-key");
        vault.save(&sample_snapshot()).unwrap();

        assert!(vault.load(Platform::Boss).unwrap().is_some());
        assert!(vault.load(Platform::Zhilian).unwrap().is_none());
    }

    #[test]
    fn test_load_with_wrong_key_fails() {
        let tempdir = TempDir::new().unwrap();
        let writer = SessionVault::with_key(tempdir.path(), "key-a");
        writer.save(&sample_snapshot()).unwrap();

        let reader = SessionVault::with_key(tempdir.path(), "key-b");
        let result = reader.load(Platform::Boss);
        assert!(matches!(result, Err(SessionStoreError::DecryptionFailed)));
    }

    #[test]
    fn test_invalid_payload_fails() {
        let tempdir = TempDir::new().unwrap();
        let vault = SessionVault::with_key(tempdir.path(), "test-key");
        let path = vault.session_path(Platform::Boss);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"not-encrypted-data").unwrap();

        let result = vault.load(Platform::Boss);
        assert!(matches!(result, Err(SessionStoreError::InvalidPayload)));
    }

    #[test]
    fn test_clear_reports_presence() {
        let tempdir = TempDir::new().unwrap();
        let vault = SessionVault::with_key(tempdir.path(), "test-key");
        vault.save(&sample_snapshot()).unwrap();

        assert!(vault.clear(Platform::Boss).unwrap());
        assert!(!vault.clear(Platform::Boss).unwrap());
        assert!(vault.load(Platform::Boss).unwrap().is_none());
    }

    #[test]
    fn test_save_overwrites_previous_snapshot() {
        let tempdir = TempDir::new().unwrap();
        let vault = SessionVault::with_key(tempdir.path(), "test-key");
        vault.save(&sample_snapshot()).unwrap();

        let mut updated = sample_snapshot();
        updated.cookies[0].value = "rotated".to_string();
        vault.save(&updated).unwrap();

        let loaded = vault.load(Platform::Boss).unwrap().unwrap();
        assert_eq!(loaded.cookies[0].value, "rotated");
    }

    #[cfg(unix)]
    #[test]
    fn test_save_sets_owner_only_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let tempdir = TempDir::new().unwrap();
        let vault = SessionVault::with_key(tempdir.path(), "test-key");
        let path = vault.save(&sample_snapshot()).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }

    #[test]
    fn test_hex_encode_length() {
        let encoded = hex_encode(&[1_u8, 255_u8, 16_u8]);
        assert_eq!(encoded.len(), 6);
        assert_eq!(encoded, "01ff10");
    }

    #[test]
    fn test_sanitize_env_path_rejects_blank_values() {
        assert!(sanitize_env_path(Some(OsString::from(""))).is_none());
        assert!(sanitize_env_path(Some(OsString::from("   "))).is_none());
    }

    #[test]
    fn test_resolve_config_dir_prefers_xdg_over_home() {
        let resolved = resolve_config_dir(
            Some(PathBuf::from("/tmp/xdg")),
            Some(PathBuf::from("/tmp/home")),
            Some(PathBuf::from("/tmp/appdata")),
        )
        .unwrap();
        assert_eq!(resolved, PathBuf::from("/tmp/xdg/jobsweep"));
    }

    #[test]
    fn test_resolve_config_dir_falls_back_to_home() {
        let resolved = resolve_config_dir(None, Some(PathBuf::from("/tmp/home")), None).unwrap();
        assert_eq!(resolved, PathBuf::from("/tmp/home/.config/jobsweep"));
    }

    #[test]
    fn test_resolve_config_dir_errors_when_all_sources_missing() {
        let result = resolve_config_dir(None, None, None);
        assert!(matches!(result, Err(SessionStoreError::ConfigDirUnavailable)));
    }
}
