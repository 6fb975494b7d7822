//! Secret resolution
//!
//! Model API keys and the calendar bearer token are looked up in this order:
//!
//! 1. Environment variable (e.g. `GEMINI_API_KEY`)
//! 2. OS keychain entry under the `cadence` service
//!
//! Nothing here prompts: the engine also runs headless behind the HTTP adapter.
//! Resolved values are wrapped in [`SecretString`] so they never reach logs.

use keyring::Entry;
use sdk::errors::EngineError;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

/// Keychain service name
pub const SERVICE_NAME: &str = "cadence";

/// Well-known secret names and their environment variables
pub const GEMINI_API_KEY: &str = "gemini_api_key";
pub const OPENAI_API_KEY: &str = "openai_api_key";
pub const CALENDAR_TOKEN: &str = "calendar_token";

/// A wrapper for sensitive string data that prevents accidental logging.
///
/// `Debug` and `Display` always print `[REDACTED]`; use [`SecretString::expose`]
/// to read the value.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretString([REDACTED])")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

/// Resolves secrets from the environment, then the OS keychain, caching hits.
#[derive(Clone)]
pub struct SecretStore {
    service_name: String,
    use_keychain: bool,
    cache: Arc<RwLock<HashMap<String, SecretString>>>,
}

impl SecretStore {
    /// Environment plus keychain lookup
    pub fn new() -> Self {
        Self {
            service_name: SERVICE_NAME.to_string(),
            use_keychain: true,
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Environment-only lookup, for tests and containers without a keychain
    pub fn env_only() -> Self {
        Self {
            use_keychain: false,
            ..Self::new()
        }
    }

    /// Seed a value directly, bypassing environment and keychain
    pub fn with_secret(self, key: &str, value: impl Into<String>) -> Self {
        if let Ok(mut cache) = self.cache.write() {
            cache.insert(key.to_string(), SecretString::new(value));
        }
        self
    }

    /// Environment variable consulted for a secret name (`gemini_api_key` -> `GEMINI_API_KEY`)
    pub fn env_var_name(key: &str) -> String {
        match key {
            CALENDAR_TOKEN => "CADENCE_CALENDAR_TOKEN".to_string(),
            other => other.to_ascii_uppercase(),
        }
    }

    /// Look a secret up; `Ok(None)` when no source has it.
    pub fn lookup(&self, key: &str) -> Result<Option<SecretString>, EngineError> {
        if let Ok(cache) = self.cache.read() {
            if let Some(secret) = cache.get(key) {
                return Ok(Some(secret.clone()));
            }
        }

        let found = match std::env::var(Self::env_var_name(key)) {
            Ok(value) if !value.trim().is_empty() => Some(SecretString::new(value.trim())),
            _ if self.use_keychain => self.keychain_lookup(key)?,
            _ => None,
        };

        if let Some(secret) = &found {
            if let Ok(mut cache) = self.cache.write() {
                cache.insert(key.to_string(), secret.clone());
            }
        }

        Ok(found)
    }

    /// Like [`SecretStore::lookup`] but a missing secret is an error
    pub fn require(&self, key: &str) -> Result<SecretString, EngineError> {
        self.lookup(key)?.ok_or_else(|| {
            EngineError::KeyringError(format!(
                "Secret '{}' not found. Set {} or store it in the system keychain",
                key,
                Self::env_var_name(key)
            ))
        })
    }

    pub fn has_secret(&self, key: &str) -> bool {
        matches!(self.lookup(key), Ok(Some(_)))
    }

    /// Store a secret in the OS keychain
    pub fn store(&self, key: &str, value: &str) -> Result<(), EngineError> {
        if value.trim().is_empty() {
            return Err(EngineError::KeyringError(
                "Refusing to store an empty secret".to_string(),
            ));
        }

        let entry = Entry::new(&self.service_name, key).map_err(|e| {
            EngineError::KeyringError(format!("Failed to create keyring entry: {}", e))
        })?;
        entry.set_password(value).map_err(|e| {
            EngineError::KeyringError(format!("Failed to store secret '{}': {}", key, e))
        })?;

        if let Ok(mut cache) = self.cache.write() {
            cache.insert(key.to_string(), SecretString::new(value));
        }

        tracing::info!("Stored secret '{}' in keychain", key);
        Ok(())
    }

    fn keychain_lookup(&self, key: &str) -> Result<Option<SecretString>, EngineError> {
        let entry = Entry::new(&self.service_name, key).map_err(|e| {
            EngineError::KeyringError(format!("Failed to create keyring entry: {}", e))
        })?;

        match entry.get_password() {
            Ok(secret) => {
                tracing::debug!("Retrieved secret '{}' from keychain", key);
                Ok(Some(SecretString::new(secret)))
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            // Headless Linux hosts often have no secret service at all
            Err(keyring::Error::PlatformFailure(e)) | Err(keyring::Error::NoStorageAccess(e)) => {
                tracing::debug!("Keychain unavailable for '{}': {}", key, e);
                Ok(None)
            }
            Err(e) => Err(EngineError::KeyringError(format!(
                "Failed to retrieve secret '{}': {}",
                key, e
            ))),
        }
    }
}

impl Default for SecretStore {
    fn default() -> Self {
        Self::new()
    }
}
