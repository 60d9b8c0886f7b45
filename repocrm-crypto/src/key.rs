//! Login-derived symmetric keys.
//!
//! The same login always re-derives the same key, so no key escrow is
//! needed. Losing the credential loses every note encrypted under it.

use crate::error::{CryptoError, CryptoResult};
use argon2::{Algorithm, Argon2, Params, Version};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Size of a derived key in bytes (256 bits).
pub const KEY_SIZE: usize = 32;

/// Application-wide Argon2id salt. Fixed so derivation stays deterministic.
pub const APP_SALT: &[u8; 16] = b"repocrm-notes-v1";

/// How the user signed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoginType {
    Email,
    Google,
    Apple,
    Passkey,
}

impl LoginType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoginType::Email => "email",
            LoginType::Google => "google",
            LoginType::Apple => "apple",
            LoginType::Passkey => "passkey",
        }
    }

    /// Email and passkey logins mix a secret into the key material.
    /// OAuth logins rely on the provider-verified identifier alone.
    pub fn requires_credential(&self) -> bool {
        matches!(self, LoginType::Email | LoginType::Passkey)
    }
}

impl fmt::Display for LoginType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoginType {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(LoginType::Email),
            "google" => Ok(LoginType::Google),
            "apple" => Ok(LoginType::Apple),
            "passkey" => Ok(LoginType::Passkey),
            other => Err(CryptoError::UnsupportedLoginType(other.to_string())),
        }
    }
}

/// Identity presented at login. Used once to derive a key, never stored.
pub struct LoginIdentity {
    pub identifier: String,
    pub login_type: LoginType,
    credential: Option<Zeroizing<String>>,
}

impl LoginIdentity {
    pub fn new(identifier: &str, login_type: LoginType, credential: Option<&str>) -> Self {
        Self {
            identifier: identifier.to_string(),
            login_type,
            credential: credential.map(|c| Zeroizing::new(c.to_string())),
        }
    }

    /// Builds an identity from the login type label the UI hands over.
    pub fn parse(identifier: &str, login_type: &str, credential: Option<&str>) -> CryptoResult<Self> {
        Ok(Self::new(identifier, login_type.parse()?, credential))
    }

    /// Deterministic KDF input for this identity.
    pub(crate) fn key_material(&self) -> CryptoResult<Zeroizing<String>> {
        if self.login_type.requires_credential() {
            let credential = self
                .credential
                .as_ref()
                .filter(|c| !c.is_empty())
                .ok_or(CryptoError::InvalidCredential(self.login_type))?;
            Ok(Zeroizing::new(format!("{}:{}", self.identifier, credential.as_str())))
        } else {
            Ok(Zeroizing::new(format!(
                "{}:{}-oauth-identity",
                self.identifier,
                self.login_type.as_str()
            )))
        }
    }
}

impl fmt::Debug for LoginIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginIdentity")
            .field("identifier", &self.identifier)
            .field("login_type", &self.login_type)
            .field("credential", &self.credential.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: 19 * 1024,
            iterations: 2,
            parallelism: 1,
        }
    }
}

impl KdfParams {
    /// Cheap profile for test suites. Never use for real data: keys derived
    /// with it do not match keys derived with the default profile.
    pub fn testing() -> Self {
        Self {
            memory_kib: 256,
            iterations: 1,
            parallelism: 1,
        }
    }
}

/// A 256-bit symmetric key. Zeroized on drop, never serialized or printed.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey {
    bytes: [u8; KEY_SIZE],
}

impl DerivedKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DerivedKey(<redacted>)")
    }
}

/// Derives the session key for a login.
///
/// Runs Argon2id over the identity's key material with [`APP_SALT`].
/// This is deliberately slow; call it off the async executor.
pub fn derive_login_key(identity: &LoginIdentity, params: &KdfParams) -> CryptoResult<DerivedKey> {
    let material = identity.key_material()?;

    let argon_params = Params::new(
        params.memory_kib,
        params.iterations,
        params.parallelism,
        Some(KEY_SIZE),
    )
    .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    let argon = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);

    let mut out = [0u8; KEY_SIZE];
    argon
        .hash_password_into(material.as_bytes(), APP_SALT, &mut out)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;

    let key = DerivedKey::from_bytes(out);
    out.zeroize();
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_material_joins_identifier_and_credential() {
        let id = LoginIdentity::new("a@b.com", LoginType::Email, Some("pw"));
        assert_eq!(id.key_material().unwrap().as_str(), "a@b.com:pw");
    }

    #[test]
    fn oauth_material_ignores_credential() {
        let with = LoginIdentity::new("a@b.com", LoginType::Google, Some("token"));
        let without = LoginIdentity::new("a@b.com", LoginType::Google, None);
        assert_eq!(
            with.key_material().unwrap().as_str(),
            without.key_material().unwrap().as_str()
        );
    }

    #[test]
    fn google_and_apple_material_differ() {
        let g = LoginIdentity::new("a@b.com", LoginType::Google, None);
        let a = LoginIdentity::new("a@b.com", LoginType::Apple, None);
        assert_ne!(
            g.key_material().unwrap().as_str(),
            a.key_material().unwrap().as_str()
        );
    }

    #[test]
    fn passkey_without_credential_is_rejected() {
        let id = LoginIdentity::new("a@b.com", LoginType::Passkey, None);
        assert!(matches!(
            id.key_material(),
            Err(CryptoError::InvalidCredential(LoginType::Passkey))
        ));
    }

    #[test]
    fn empty_credential_counts_as_missing() {
        let id = LoginIdentity::new("a@b.com", LoginType::Email, Some(""));
        assert!(matches!(id.key_material(), Err(CryptoError::InvalidCredential(_))));
    }

    #[test]
    fn debug_output_redacts_credential() {
        let id = LoginIdentity::new("a@b.com", LoginType::Email, Some("hunter2"));
        let printed = format!("{id:?}");
        assert!(!printed.contains("hunter2"));
        assert!(printed.contains("<redacted>"));
    }

    #[test]
    fn login_type_parse_round_trips() {
        for t in [LoginType::Email, LoginType::Google, LoginType::Apple, LoginType::Passkey] {
            assert_eq!(t.as_str().parse::<LoginType>().unwrap(), t);
        }
    }
}
