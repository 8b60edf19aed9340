//! Encrypted credential registry.
//!
//! The [`CredentialsManager`] stores named [`GrantConfig`]s with every secret
//! field sealed by a [`SecretCipher`]. It is constructed explicitly and shared
//! through [`SharedCredentials`]; secrets are only ever decrypted one field at
//! a time, on demand.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rand::RngCore;

use crate::config::{GrantConfig, SecretValue};
use crate::error::CredentialsError;

type Result<T> = std::result::Result<T, CredentialsError>;

/// AES-GCM nonce length in bytes.
const NONCE_LEN: usize = 12;

// ============================================================================
// SecretCipher
// ============================================================================

/// Symmetric encryption of individual secret values.
pub trait SecretCipher: Send + Sync {
    /// Encrypt `plaintext` into a printable ciphertext.
    fn seal(&self, plaintext: &str) -> Result<String>;

    /// Decrypt a ciphertext produced by [`SecretCipher::seal`].
    fn open(&self, sealed: &str) -> Result<String>;
}

/// AES-256-GCM cipher. Ciphertext format: `base64url(nonce || ciphertext || tag)`.
pub struct AesGcmCipher {
    cipher: Aes256Gcm,
}

impl AesGcmCipher {
    /// Create a cipher with a freshly generated random key.
    pub fn generate() -> Self {
        let mut key = [0u8; 32];
        rand::rng().fill_bytes(&mut key);
        Self::from_key(&key)
    }

    /// Create a cipher from an existing 256-bit key.
    pub fn from_key(key: &[u8; 32]) -> Self {
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)),
        }
    }
}

impl SecretCipher for AesGcmCipher {
    fn seal(&self, plaintext: &str) -> Result<String> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| CredentialsError::Encrypt(e.to_string()))?;

        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&ciphertext);
        Ok(URL_SAFE_NO_PAD.encode(&blob))
    }

    fn open(&self, sealed: &str) -> Result<String> {
        let blob = URL_SAFE_NO_PAD
            .decode(sealed)
            .map_err(|e| CredentialsError::Decrypt(format!("invalid encoding: {}", e)))?;
        if blob.len() <= NONCE_LEN {
            return Err(CredentialsError::Decrypt("ciphertext too short".to_string()));
        }

        let (nonce, ciphertext) = blob.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CredentialsError::Decrypt("ciphertext is invalid or tampered".to_string()))?;

        String::from_utf8(plaintext)
            .map_err(|_| CredentialsError::Decrypt("plaintext is not UTF-8".to_string()))
    }
}

// ============================================================================
// CredentialsManager
// ============================================================================

/// One registered configuration plus the gates serializing its token work.
pub struct CredentialEntry {
    config: RwLock<GrantConfig>,
    refresh_gate: tokio::sync::Mutex<()>,
    flow_gate: tokio::sync::Mutex<()>,
}

impl CredentialEntry {
    fn new(config: GrantConfig) -> Self {
        Self {
            config: RwLock::new(config),
            refresh_gate: tokio::sync::Mutex::new(()),
            flow_gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Snapshot of the stored configuration (secrets as stored).
    pub fn snapshot(&self) -> GrantConfig {
        self.config.read().clone()
    }

    /// Serializes refresh attempts for this entry.
    pub fn refresh_gate(&self) -> &tokio::sync::Mutex<()> {
        &self.refresh_gate
    }

    /// Serializes full authorization code flows for this entry.
    pub fn flow_gate(&self) -> &tokio::sync::Mutex<()> {
        &self.flow_gate
    }
}

/// New tokens to store for a registered configuration.
#[derive(Debug, Clone)]
pub struct TokenUpdate {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
    /// `None` keeps the currently stored refresh token.
    pub refresh_token: Option<String>,
}

/// Named registry of grant configurations with encrypted secret fields.
pub struct CredentialsManager {
    cipher: OnceLock<Box<dyn SecretCipher>>,
    configs: RwLock<HashMap<String, Arc<CredentialEntry>>>,
}

/// Credential store shared between grant managers.
pub type SharedCredentials = Arc<CredentialsManager>;

impl std::fmt::Debug for CredentialsManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialsManager")
            .field("keyed", &self.cipher.get().is_some())
            .field("configs", &self.names())
            .finish()
    }
}

impl Default for CredentialsManager {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialsManager {
    /// Create an empty, unkeyed store.
    pub fn new() -> Self {
        Self {
            cipher: OnceLock::new(),
            configs: RwLock::new(HashMap::new()),
        }
    }

    /// Create a store keyed with the given cipher.
    pub fn with_cipher(cipher: impl SecretCipher + 'static) -> Self {
        let manager = Self::new();
        let _ = manager.cipher.set(Box::new(cipher));
        manager
    }

    /// Create a shared store.
    pub fn shared() -> SharedCredentials {
        Arc::new(Self::new())
    }

    /// Generate the store's encryption key.
    ///
    /// Fails if a key already exists: replacing it would make every sealed
    /// value unreadable.
    pub fn generate_credentials_encryption_key(&self) -> Result<()> {
        self.cipher
            .set(Box::new(AesGcmCipher::generate()))
            .map_err(|_| CredentialsError::KeyAlreadyGenerated)?;
        tracing::debug!("Credentials encryption key generated");
        Ok(())
    }

    /// Generate the encryption key unless one already exists.
    pub fn ensure_encryption_key(&self) {
        self.cipher.get_or_init(|| {
            tracing::debug!("Credentials encryption key generated");
            Box::new(AesGcmCipher::generate()) as Box<dyn SecretCipher>
        });
    }

    /// Whether an encryption key is available.
    pub fn has_encryption_key(&self) -> bool {
        self.cipher.get().is_some()
    }

    fn cipher(&self) -> Result<&dyn SecretCipher> {
        self.cipher
            .get()
            .map(|c| c.as_ref())
            .ok_or(CredentialsError::KeyMissing)
    }

    /// Register `config` under `name`.
    ///
    /// Re-registering a name replaces its configuration but keeps the entry
    /// (and therefore its refresh gate).
    pub fn register(&self, name: impl Into<String>, config: GrantConfig) {
        let name = name.into();
        let mut configs = self.configs.write();
        match configs.get(&name) {
            Some(entry) => {
                *entry.config.write() = config;
                tracing::debug!(config = %name, "Authentication config replaced");
            }
            None => {
                configs.insert(name.clone(), Arc::new(CredentialEntry::new(config)));
                tracing::debug!(config = %name, "Authentication config registered");
            }
        }
    }

    /// Names of all registered configurations, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.configs.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Seal every plaintext secret of every registered configuration.
    ///
    /// All-or-nothing: the registry is only updated once every value sealed.
    pub fn encrypt_authentication_configs(&self) -> Result<()> {
        let cipher = self.cipher()?;
        let configs = self.configs.read();
        let mut guards: Vec<_> = configs
            .iter()
            .map(|(name, entry)| (name, entry.config.write()))
            .collect();

        let mut staged = Vec::with_capacity(guards.len());
        for (_, guard) in &guards {
            let mut config = GrantConfig::clone(guard);
            let mut sealed = 0usize;
            for slot in config.secret_slots_mut() {
                if let SecretValue::Plain(plaintext) = slot {
                    *slot = SecretValue::Sealed(cipher.seal(plaintext)?);
                    sealed += 1;
                }
            }
            staged.push((config, sealed));
        }

        for ((name, guard), (config, sealed)) in guards.iter_mut().zip(staged) {
            if sealed > 0 {
                **guard = config;
                tracing::debug!(config = %name, sealed, "Secrets encrypted");
            }
        }
        Ok(())
    }

    /// Decrypt a single secret value.
    pub fn decrypt_value(&self, value: &SecretValue) -> Result<String> {
        match value {
            SecretValue::Plain(plaintext) => Ok(plaintext.clone()),
            SecretValue::Sealed(sealed) => self.cipher()?.open(sealed),
        }
    }

    /// Copy of the configuration registered under `name`, secrets still sealed.
    pub fn get_authentication_config(&self, name: &str) -> Result<GrantConfig> {
        Ok(self.entry(name)?.snapshot())
    }

    /// The registry entry for `name`.
    pub fn entry(&self, name: &str) -> Result<Arc<CredentialEntry>> {
        self.configs
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| CredentialsError::NotRegistered(name.to_string()))
    }

    /// Seal and store new tokens for `name` in a single write.
    ///
    /// Nothing is written unless every value sealed successfully.
    pub fn store_tokens(&self, name: &str, update: TokenUpdate) -> Result<()> {
        let cipher = self.cipher()?;
        let entry = self.entry(name)?;

        let access_token = SecretValue::Sealed(cipher.seal(&update.access_token)?);
        let refresh_token = update
            .refresh_token
            .as_deref()
            .map(|r| cipher.seal(r).map(SecretValue::Sealed))
            .transpose()?;

        entry
            .config
            .write()
            .set_tokens(access_token, update.expires_at, refresh_token);

        tracing::debug!(config = %name, expires_at = %update.expires_at, "Tokens stored");
        Ok(())
    }

    /// Forget the stored tokens for `name`.
    pub fn clear_tokens(&self, name: &str) -> Result<()> {
        self.entry(name)?.config.write().clear_tokens();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::settings;

    fn config() -> GrantConfig {
        GrantConfig::new(settings()).unwrap()
    }

    #[test]
    fn test_cipher_round_trip_and_randomized_nonce() {
        let cipher = AesGcmCipher::generate();
        let a = cipher.seal("top-secret").unwrap();
        let b = cipher.seal("top-secret").unwrap();
        assert_ne!(a, b);
        assert!(!a.contains("top-secret"));
        assert_eq!(cipher.open(&a).unwrap(), "top-secret");
    }

    #[test]
    fn test_cipher_rejects_tampering_and_wrong_key() {
        let cipher = AesGcmCipher::from_key(&[7u8; 32]);
        let sealed = cipher.seal("value").unwrap();

        let other = AesGcmCipher::from_key(&[8u8; 32]);
        assert!(matches!(other.open(&sealed), Err(CredentialsError::Decrypt(_))));

        let mut bytes = URL_SAFE_NO_PAD.decode(&sealed).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        let tampered = URL_SAFE_NO_PAD.encode(bytes);
        assert!(matches!(cipher.open(&tampered), Err(CredentialsError::Decrypt(_))));

        assert!(matches!(cipher.open("AAAA"), Err(CredentialsError::Decrypt(_))));
        assert!(matches!(cipher.open("not base64!"), Err(CredentialsError::Decrypt(_))));
    }

    #[test]
    fn test_key_generation_is_once() {
        let manager = CredentialsManager::new();
        assert!(!manager.has_encryption_key());
        manager.generate_credentials_encryption_key().unwrap();
        assert!(matches!(
            manager.generate_credentials_encryption_key(),
            Err(CredentialsError::KeyAlreadyGenerated)
        ));
        manager.ensure_encryption_key();
        assert!(manager.has_encryption_key());
    }

    #[test]
    fn test_encrypt_requires_key() {
        let manager = CredentialsManager::new();
        manager.register("default", config());
        assert!(matches!(
            manager.encrypt_authentication_configs(),
            Err(CredentialsError::KeyMissing)
        ));
    }

    #[test]
    fn test_encrypt_seals_every_config() {
        let manager = CredentialsManager::new();
        manager.generate_credentials_encryption_key().unwrap();
        manager.register("a", config());
        manager.register("b", config());

        manager.encrypt_authentication_configs().unwrap();

        for name in ["a", "b"] {
            let stored = manager.get_authentication_config(name).unwrap();
            assert!(stored.client_secret().is_sealed());
            assert_eq!(
                manager.decrypt_value(stored.client_secret()).unwrap(),
                "S0123456789abcdef"
            );
        }

        // Sealing again leaves ciphertext untouched.
        let before = manager.get_authentication_config("a").unwrap();
        manager.encrypt_authentication_configs().unwrap();
        let after = manager.get_authentication_config("a").unwrap();
        assert_eq!(before.client_secret(), after.client_secret());
    }

    /// Cipher that refuses one particular plaintext.
    struct RefusingCipher {
        inner: AesGcmCipher,
        refused: &'static str,
    }

    impl SecretCipher for RefusingCipher {
        fn seal(&self, plaintext: &str) -> Result<String> {
            if plaintext == self.refused {
                return Err(CredentialsError::Encrypt("refused".to_string()));
            }
            self.inner.seal(plaintext)
        }

        fn open(&self, sealed: &str) -> Result<String> {
            self.inner.open(sealed)
        }
    }

    #[test]
    fn test_encrypt_failure_leaves_registry_untouched() {
        let manager = CredentialsManager::with_cipher(RefusingCipher {
            inner: AesGcmCipher::generate(),
            refused: "Refused0123456789",
        });
        let mut refused = settings();
        refused.client_secret = "Refused0123456789".to_string();
        manager.register("a", config());
        manager.register("b", GrantConfig::new(refused).unwrap());

        assert!(matches!(
            manager.encrypt_authentication_configs(),
            Err(CredentialsError::Encrypt(_))
        ));

        for name in ["a", "b"] {
            let stored = manager.get_authentication_config(name).unwrap();
            assert!(!stored.client_secret().is_sealed(), "{name} was sealed");
        }
    }

    #[test]
    fn test_store_tokens_seals_and_keeps_refresh() {
        let manager = CredentialsManager::with_cipher(AesGcmCipher::generate());
        manager.register("default", config());
        let expires_at = Utc::now() + chrono::Duration::hours(1);

        manager
            .store_tokens(
                "default",
                TokenUpdate {
                    access_token: "access-1".to_string(),
                    expires_at,
                    refresh_token: Some("refresh-1".to_string()),
                },
            )
            .unwrap();
        manager
            .store_tokens(
                "default",
                TokenUpdate {
                    access_token: "access-2".to_string(),
                    expires_at,
                    refresh_token: None,
                },
            )
            .unwrap();

        let stored = manager.get_authentication_config("default").unwrap();
        let access = stored.access_token().unwrap();
        assert!(access.is_sealed());
        assert_eq!(manager.decrypt_value(access).unwrap(), "access-2");
        assert_eq!(
            manager.decrypt_value(stored.refresh_token().unwrap()).unwrap(),
            "refresh-1"
        );
        assert_eq!(stored.access_token_expires_in(), Some(expires_at));

        manager.clear_tokens("default").unwrap();
        assert!(manager.get_authentication_config("default").unwrap().access_token().is_none());
    }

    #[test]
    fn test_unknown_name() {
        let manager = CredentialsManager::with_cipher(AesGcmCipher::generate());
        assert!(matches!(
            manager.get_authentication_config("missing"),
            Err(CredentialsError::NotRegistered(name)) if name == "missing"
        ));
    }

    #[test]
    fn test_reregister_keeps_entry() {
        let manager = CredentialsManager::new();
        manager.register("default", config());
        let first = manager.entry("default").unwrap();
        manager.register("default", config());
        let second = manager.entry("default").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(manager.names(), vec!["default"]);
    }

    #[test]
    fn test_concurrent_registration() {
        let manager = Arc::new(CredentialsManager::new());
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let manager = Arc::clone(&manager);
                std::thread::spawn(move || manager.register(format!("flow-{i:02}"), config()))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(manager.names().len(), 16);
    }
}
