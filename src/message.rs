//! Message envelopes binding ciphertexts and signatures to an algorithm
//! and a key.

use crate::algorithm::AlgorithmSuite;
use crate::error::{Error, Result};
use crate::keyring::Keyring;
use crate::math::bitvec::BitVec;
use crate::rng::Prng;
use crate::sencode::Sencode;

const ENC_IDENT: &[u8] = b"CCR-ENCRYPTED-MSG-v2";
const SIG_IDENT: &[u8] = b"CCR-SIGNED-MSG-v2";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncryptedMsg {
    pub alg_id: String,
    pub key_id: String,
    pub ciphertext: BitVec,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedMsg {
    pub alg_id: String,
    pub key_id: String,
    pub message: BitVec,
    pub signature: BitVec,
}

impl EncryptedMsg {
    pub fn encrypt(
        msg: &BitVec,
        alg_id: &str,
        key_id: &str,
        algs: &AlgorithmSuite,
        keyring: &Keyring,
        rng: &mut dyn Prng,
    ) -> Result<EncryptedMsg> {
        let alg = algs
            .get(alg_id)
            .filter(|a| a.provides_encryption())
            .ok_or_else(|| Error::Missing(format!("encryption algorithm {alg_id}")))?;

        let pk = keyring
            .get_pubkey(key_id)
            .ok_or_else(|| Error::Missing(format!("public key @{key_id}")))?;
        if pk.alg != alg.alg_id() {
            return Err(Error::BadInput("key uses a different algorithm"));
        }

        Ok(EncryptedMsg {
            alg_id: alg.alg_id().to_string(),
            key_id: key_id.to_string(),
            ciphertext: alg.encrypt(msg, &pk.key()?, rng)?,
        })
    }

    pub fn decrypt(&self, algs: &AlgorithmSuite, keyring: &Keyring) -> Result<BitVec> {
        let alg = algs
            .get(&self.alg_id)
            .filter(|a| a.provides_encryption())
            .ok_or_else(|| Error::Missing(format!("encryption algorithm {}", self.alg_id)))?;

        let pair = keyring
            .get_keypair(&self.key_id)
            .ok_or_else(|| Error::Missing(format!("secret key @{}", self.key_id)))?;
        if pair.pub_entry.alg != alg.alg_id() {
            return Err(Error::BadInput("key uses a different algorithm"));
        }

        alg.decrypt(&self.ciphertext, &pair.privkey()?)
    }

    pub fn serialize(&self) -> Sencode {
        Sencode::list(vec![
            Sencode::bytes(ENC_IDENT),
            Sencode::str(&self.alg_id),
            Sencode::str(&self.key_id),
            self.ciphertext.serialize(),
        ])
    }

    pub fn unserialize(s: &Sencode) -> Result<EncryptedMsg> {
        let items = s.as_list_of(4)?;
        if items[0].as_bytes()? != ENC_IDENT {
            return Err(Error::Malformed("not an encrypted message"));
        }
        Ok(EncryptedMsg {
            alg_id: String::from_utf8_lossy(items[1].as_bytes()?).into_owned(),
            key_id: String::from_utf8_lossy(items[2].as_bytes()?).into_owned(),
            ciphertext: BitVec::unserialize(&items[3])?,
        })
    }
}

impl SignedMsg {
    /// Sign and, when the algorithm mutates its key (FMTseq does), persist
    /// the new key state before the signature is handed out. A signature
    /// whose state update did not reach the disk never leaves this
    /// function.
    pub fn sign(
        msg: &BitVec,
        alg_id: &str,
        key_id: &str,
        algs: &AlgorithmSuite,
        keyring: &mut Keyring,
        rng: &mut dyn Prng,
    ) -> Result<SignedMsg> {
        let alg = algs
            .get(alg_id)
            .filter(|a| a.provides_signatures())
            .ok_or_else(|| Error::Missing(format!("signature algorithm {alg_id}")))?;
        let full_id = alg.alg_id();

        let pair = keyring
            .get_keypair(key_id)
            .ok_or_else(|| Error::Missing(format!("secret key @{key_id}")))?;
        if pair.pub_entry.alg != full_id {
            return Err(Error::BadInput("key uses a different algorithm"));
        }

        let mut privkey = pair.privkey()?;
        let (signature, dirty) = alg.sign(msg, &mut privkey, rng)?;

        if dirty {
            let pair = keyring
                .get_keypair_mut(key_id)
                .ok_or_else(|| Error::Missing(format!("secret key @{key_id}")))?;
            pair.store_privkey(&privkey, rng)?;
            keyring.save()?;
        }

        Ok(SignedMsg {
            alg_id: full_id.to_string(),
            key_id: key_id.to_string(),
            message: msg.clone(),
            signature,
        })
    }

    pub fn verify(&self, algs: &AlgorithmSuite, keyring: &Keyring) -> Result<()> {
        let alg = algs
            .get(&self.alg_id)
            .filter(|a| a.provides_signatures())
            .ok_or_else(|| Error::Missing(format!("signature algorithm {}", self.alg_id)))?;

        let pk = keyring
            .get_pubkey(&self.key_id)
            .ok_or_else(|| Error::Missing(format!("public key @{}", self.key_id)))?;
        if pk.alg != alg.alg_id() {
            return Err(Error::BadInput("key uses a different algorithm"));
        }

        alg.verify(&self.signature, &self.message, &pk.key()?)
    }

    pub fn serialize(&self) -> Sencode {
        Sencode::list(vec![
            Sencode::bytes(SIG_IDENT),
            Sencode::str(&self.alg_id),
            Sencode::str(&self.key_id),
            self.message.serialize(),
            self.signature.serialize(),
        ])
    }

    pub fn unserialize(s: &Sencode) -> Result<SignedMsg> {
        let items = s.as_list_of(5)?;
        if items[0].as_bytes()? != SIG_IDENT {
            return Err(Error::Malformed("not a signed message"));
        }
        Ok(SignedMsg {
            alg_id: String::from_utf8_lossy(items[1].as_bytes()?).into_owned(),
            key_id: String::from_utf8_lossy(items[2].as_bytes()?).into_owned(),
            message: BitVec::unserialize(&items[3])?,
            signature: BitVec::unserialize(&items[4])?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_serialization_roundtrip() {
        let msg = EncryptedMsg {
            alg_id: "SOME-ALG".into(),
            key_id: "abcd".repeat(16),
            ciphertext: BitVec::from_bytes(b"ct", 0),
        };
        let s = msg.serialize();
        assert_eq!(EncryptedMsg::unserialize(&s).unwrap(), msg);
        // encrypted and signed envelopes do not cross-parse
        assert!(SignedMsg::unserialize(&s).is_err());

        let sm = SignedMsg {
            alg_id: "SIG-ALG".into(),
            key_id: "00".repeat(32),
            message: BitVec::from_bytes(b"m", 0),
            signature: BitVec::from_bytes(b"s", 0),
        };
        let s = sm.serialize();
        assert_eq!(SignedMsg::unserialize(&s).unwrap(), sm);
    }
}
