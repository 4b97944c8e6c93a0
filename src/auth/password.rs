use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use sha2::Sha256;
use tracing::error;

use crate::config::PasswordConfig;

type HmacSha256 = Hmac<Sha256>;

/// One-way hashing for passwords and reset codes, plus CPF fingerprinting.
#[derive(Clone)]
pub struct PasswordCodec {
    params: Params,
    cpf_secret: Vec<u8>,
}

impl PasswordCodec {
    pub fn from_config(cfg: &PasswordConfig) -> anyhow::Result<Self> {
        let params = Params::new(cfg.m_cost, cfg.t_cost, Params::DEFAULT_P_COST, None)
            .map_err(|e| anyhow::anyhow!("invalid argon2 params: {e}"))?;
        Ok(Self {
            params,
            cpf_secret: cfg.cpf_hash_secret.as_bytes().to_vec(),
        })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    pub fn hash(&self, plain: &str) -> anyhow::Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(plain.as_bytes(), &salt)
            .map_err(|e| {
                error!(error = %e, "argon2 hash_password error");
                anyhow::anyhow!(e.to_string())
            })?
            .to_string();
        Ok(hash)
    }

    /// Parameters are read from the stored hash, so older hashes keep verifying
    /// after a cost change.
    pub fn verify(&self, plain: &str, hash: &str) -> anyhow::Result<bool> {
        let parsed = PasswordHash::new(hash).map_err(|e| {
            error!(error = %e, "argon2 parse hash error");
            anyhow::anyhow!(e.to_string())
        })?;
        Ok(self
            .argon2()
            .verify_password(plain.as_bytes(), &parsed)
            .is_ok())
    }

    /// HMAC-SHA256 of the CPF digits (first 11) as lowercase hex.
    pub fn fingerprint(&self, national_id: &str) -> String {
        let digits: String = national_id
            .chars()
            .filter(char::is_ascii_digit)
            .take(11)
            .collect();
        let mut mac = HmacSha256::new_from_slice(&self.cpf_secret)
            .expect("HMAC accepts keys of any length");
        mac.update(digits.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

/// Eight uppercase hex characters from the OS RNG.
pub fn generate_reset_code() -> String {
    let mut bytes = [0u8; 4];
    OsRng.fill_bytes(&mut bytes);
    hex::encode_upper(bytes)
}
