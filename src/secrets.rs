//! OpenRouter API key storage
//!
//! Lookup order: `OPENROUTER_API_KEY`, the OS keyring, then a 0600 file in
//! the config directory for hosts without a keyring service.

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

const SERVICE_NAME: &str = "music2myears";
const API_KEY_USERNAME: &str = "openrouter-api-key";
const API_KEY_FILE: &str = "api_key.txt";

/// Environment variable checked before any stored key
pub const API_KEY_ENV: &str = "OPENROUTER_API_KEY";

fn api_key_file_path() -> Result<PathBuf> {
    let dir = crate::config::config_dir()?;
    fs::create_dir_all(&dir).context("Failed to create config directory")?;
    Ok(dir.join(API_KEY_FILE))
}

/// Store the API key - keyring first, file as fallback
pub fn set_api_key(key: &str) -> Result<()> {
    if let Ok(entry) = keyring::Entry::new(SERVICE_NAME, API_KEY_USERNAME) {
        if entry.set_password(key).is_ok() {
            return Ok(());
        }
    }

    save_to_file(key)?;
    tracing::warn!("Keyring unavailable, API key stored in the config directory");
    Ok(())
}

fn save_to_file(key: &str) -> Result<()> {
    let path = api_key_file_path()?;
    fs::write(&path, key).context("Failed to write API key file")?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o600))
            .context("Failed to set file permissions")?;
    }

    Ok(())
}

/// Resolve the API key
pub fn get_api_key() -> Result<String> {
    if let Ok(key) = std::env::var(API_KEY_ENV) {
        if !key.trim().is_empty() {
            return Ok(key.trim().to_string());
        }
    }

    if let Ok(entry) = keyring::Entry::new(SERVICE_NAME, API_KEY_USERNAME) {
        if let Ok(key) = entry.get_password() {
            return Ok(key);
        }
    }

    let path = api_key_file_path()?;
    let key = fs::read_to_string(&path).with_context(|| {
        format!(
            "No API key found. Set {} or run 'music2myears config --set-api-key KEY'",
            API_KEY_ENV
        )
    })?;
    Ok(key.trim().to_string())
}
