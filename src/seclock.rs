//! Locking secrets at rest: a `ccr_lock` prefix followed by a symkey
//! encryption of the sencoded secret. Unlocked secrets are always sencode,
//! which never starts with that prefix, so the two are cheaply told apart.

use crate::digest::{CubeHash, HashFunction};
use crate::error::{Error, Result};
use crate::rng::{ChaChaRng, Prng};
use crate::symkey::Symkey;

const LOCK_PREFIX: &[u8] = b"ccr_lock";

pub const PASSWORD_ENV: &str = "CCR_KEYRING_PASSWORD";
pub const ALGORITHM_ENV: &str = "CCR_KEYRING_ALGORITHM";
const DEFAULT_LOCK_SPEC: &str = "CHACHA20,CUBE512,SHORTBLOCK";

pub fn looks_like_locked_secret(data: &[u8]) -> bool {
    data.len() > LOCK_PREFIX.len() && &data[..LOCK_PREFIX.len()] == LOCK_PREFIX
}

/// Symmetric key derived deterministically from the keyring password, so
/// the same password unlocks what it locked. The password comes from the
/// environment; prompting is the caller's business.
pub fn keyring_symkey() -> Result<Symkey> {
    let password = std::env::var(PASSWORD_ENV)
        .map_err(|_| Error::Missing(format!("password (set {PASSWORD_ENV})")))?;

    let spec = std::env::var(ALGORITHM_ENV).unwrap_or_else(|_| DEFAULT_LOCK_SPEC.to_string());

    // stretch the password into generator key material
    let kdf = CubeHash::new(64);
    let seed = kdf.hash(password.as_bytes());
    let mut pwrng = ChaChaRng::from_key(&seed);

    Symkey::create(&spec, &mut pwrng)
}

pub fn lock_secret(secret: &[u8], sk: &Symkey, rng: &mut dyn Prng) -> Result<Vec<u8>> {
    let mut out = LOCK_PREFIX.to_vec();
    out.extend_from_slice(&sk.encrypt_bytes(secret, rng)?);
    Ok(out)
}

pub fn unlock_secret(locked: &[u8], sk: &Symkey) -> Result<Vec<u8>> {
    if !looks_like_locked_secret(locked) {
        return Err(Error::Malformed("malformed locked secret"));
    }
    sk.decrypt_bytes(&locked[LOCK_PREFIX.len()..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::TestRng;

    #[test]
    fn lock_unlock_roundtrip() {
        let mut rng = TestRng::new(30);
        let sk = Symkey::create("CHACHA20,CUBE256,SHORTBLOCK", &mut rng).unwrap();

        let secret = b"si5e5:inneres".to_vec();
        let locked = lock_secret(&secret, &sk, &mut rng).unwrap();

        assert!(looks_like_locked_secret(&locked));
        assert!(!looks_like_locked_secret(&secret));
        assert_eq!(unlock_secret(&locked, &sk).unwrap(), secret);
    }

    #[test]
    fn wrong_key_fails() {
        let mut rng = TestRng::new(31);
        let sk = Symkey::create("CHACHA20,CUBE256,SHORTBLOCK", &mut rng).unwrap();
        let other = Symkey::create("CHACHA20,CUBE256,SHORTBLOCK", &mut rng).unwrap();

        let locked = lock_secret(b"secret", &sk, &mut rng).unwrap();
        assert!(unlock_secret(&locked, &other).is_err());
    }
}
