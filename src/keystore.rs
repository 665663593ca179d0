//! Encrypted API keys on local disk.
//!
//! Each user has one file `keys/<short_name>.enc`: a 16-byte PBKDF2 salt, a 12-byte nonce,
//! then the AES-256-GCM ciphertext of the API key. The cipher key is derived from the user's
//! PIN, so the raw API key never touches the disk.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use aes_gcm::aead::{Aead, OsRng, rand_core::RngCore};
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use pbkdf2::pbkdf2_hmac;
use regex::Regex;
use sha2::Sha256;
use tracing::info;

use crate::{Error, Result};

pub const PBKDF2_ITERATIONS: u32 = 480_000;

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;

static SHORT_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_]*$").expect("valid short name regex"));

/// Lowercase letters, digits and underscores, starting with a letter.
pub fn is_valid_short_name(name: &str) -> bool {
    SHORT_NAME_RE.is_match(name)
}

fn derive_key(pin: &str, salt: &[u8], iterations: u32) -> [u8; 32] {
    let mut key = [0u8; 32];
    pbkdf2_hmac::<Sha256>(pin.as_bytes(), salt, iterations, &mut key);
    key
}

/// The directory of key files.
#[derive(Debug, Clone)]
pub struct KeyStore {
    dir: PathBuf,
    iterations: u32,
}

impl KeyStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            iterations: PBKDF2_ITERATIONS,
        }
    }

    /// Use a different PBKDF2 work factor. Files are only readable with the count they were
    /// written with.
    pub fn with_iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn key_path(&self, short_name: &str) -> PathBuf {
        self.dir.join(format!("{short_name}.enc"))
    }

    /// Short names that have a key file, sorted.
    pub fn list_users(&self) -> Result<Vec<String>> {
        fs::create_dir_all(&self.dir)?;
        let mut users: Vec<String> = fs::read_dir(&self.dir)?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|e| e == "enc"))
            .filter_map(|p| p.file_stem().and_then(|s| s.to_str()).map(str::to_string))
            .collect();
        users.sort();
        Ok(users)
    }

    pub fn user_exists(&self, short_name: &str) -> bool {
        self.key_path(short_name).exists()
    }

    /// Encrypt `api_key` (trimmed) with `pin`, replacing any previous key of the user.
    pub fn save(&self, short_name: &str, pin: &str, api_key: &str) -> Result<()> {
        if !is_valid_short_name(short_name) {
            return Err(Error::InvalidShortName(short_name.to_string()));
        }
        fs::create_dir_all(&self.dir)?;

        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        let mut iv = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut iv);

        let key = derive_key(pin, &salt, self.iterations);
        let cipher = Aes256Gcm::new_from_slice(&key).map_err(|e| Error::msg(e.to_string()))?;
        let sealed = cipher
            .encrypt(Nonce::from_slice(&iv), api_key.trim().as_bytes())
            .map_err(|e| Error::msg(format!("encrypting key: {e}")))?;

        let mut data = Vec::with_capacity(SALT_LEN + NONCE_LEN + sealed.len());
        data.extend_from_slice(&salt);
        data.extend_from_slice(&iv);
        data.extend_from_slice(&sealed);
        fs::write(self.key_path(short_name), data)?;
        info!(user = short_name, "saved key");
        Ok(())
    }

    /// Decrypt the user's API key.
    pub fn load(&self, short_name: &str, pin: &str) -> Result<String> {
        let path = self.key_path(short_name);
        if !is_valid_short_name(short_name) || !path.exists() {
            return Err(Error::UnknownUser(short_name.to_string()));
        }
        let data = fs::read(&path)?;
        if data.len() <= SALT_LEN + NONCE_LEN {
            return Err(Error::WrongPin);
        }
        let (salt, rest) = data.split_at(SALT_LEN);
        let (iv, sealed) = rest.split_at(NONCE_LEN);

        let key = derive_key(pin, salt, self.iterations);
        let cipher = Aes256Gcm::new_from_slice(&key).map_err(|e| Error::msg(e.to_string()))?;
        let plain = cipher
            .decrypt(Nonce::from_slice(iv), sealed)
            .map_err(|_| Error::WrongPin)?;
        String::from_utf8(plain).map_err(|_| Error::WrongPin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_name_rules() {
        for ok in ["alice", "a", "jd_2", "x9"] {
            assert!(is_valid_short_name(ok), "{ok}");
        }
        for bad in ["", "Alice", "2pac", "_x", "al-ice", "al ice", "../etc"] {
            assert!(!is_valid_short_name(bad), "{bad}");
        }
    }

    #[test]
    fn derivation_is_deterministic() {
        let a = derive_key("1234", b"0123456789abcdef", 10);
        assert_eq!(a, derive_key("1234", b"0123456789abcdef", 10));
        assert_ne!(a, derive_key("1235", b"0123456789abcdef", 10));
    }
}
