//! Layered symmetric container used to lock secrets at rest.
//!
//! Several stream ciphers and several hashes can be stacked; breaking the
//! container means breaking all of them. The stream starts with a fresh
//! one-time key, then carries blocks of plaintext followed by keyed
//! digests of the block, the whole thing XORed under every cipher's
//! keystream.

use std::collections::BTreeSet;
use std::io::{Read, Write};

use crate::cipher::{self, StreamCipher};
use crate::digest::{self, HashProc};
use crate::error::{Error, Result};
use crate::rng::Prng;
use crate::sencode::Sencode;

const IDENT: &[u8] = b"CCR-SYMKEY";

pub const DEFAULT_BLOCK: u32 = 1024 * 1024;
pub const SHORT_BLOCK: u32 = 1024;
pub const LONG_BLOCK: u32 = 64 * 1024 * 1024;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Symkey {
    // ordered sets: serialization and layering order must be stable
    pub ciphers: BTreeSet<String>,
    pub hashes: BTreeSet<String>,
    pub blocksize: u32,
    pub key: Vec<u8>,
}

impl Symkey {
    pub fn is_valid(&self) -> bool {
        self.blocksize >= 1024
            && self.blocksize < 0x10000000
            && !self.ciphers.is_empty()
            && !self.hashes.is_empty()
            && self.key.len() >= 32
            && self.key.len() < 2048
    }

    /// Build a key from a comma-separated spec like
    /// `CHACHA20,CUBE512,SHORTBLOCK`. Unknown tokens are an error.
    pub fn create(spec: &str, rng: &mut dyn Prng) -> Result<Symkey> {
        let mut blocksize = DEFAULT_BLOCK;
        let mut keysize = 64usize;
        let mut ciphers = BTreeSet::new();
        let mut hashes = BTreeSet::new();

        for tok in spec.split(',').filter(|t| !t.is_empty()) {
            let tok = tok.trim().to_uppercase();
            match tok.as_str() {
                "SHORTBLOCK" => blocksize = SHORT_BLOCK,
                "LONGBLOCK" => blocksize = LONG_BLOCK,
                "LONGKEY" => keysize = keysize.max(512),
                _ => {
                    if let Some(sc) = cipher::by_name(&tok) {
                        keysize = keysize.max(sc.key_size());
                        ciphers.insert(tok);
                    } else if digest::proc_by_name(&tok).is_some() {
                        hashes.insert(tok);
                    } else {
                        return Err(Error::BadInput("unknown symkey token"));
                    }
                }
            }
        }

        let mut key = vec![0u8; keysize];
        rng.random_bytes(&mut key);

        let sk = Symkey {
            ciphers,
            hashes,
            blocksize,
            key,
        };
        if !sk.is_valid() {
            return Err(Error::BadInput(
                "symkey needs at least one cipher and one hash",
            ));
        }
        Ok(sk)
    }

    fn make_ciphers(&self, otkey: &[u8]) -> Result<Vec<Box<dyn StreamCipher>>> {
        let mut scs = Vec::new();
        for name in &self.ciphers {
            let mut sc = cipher::by_name(name)
                .ok_or_else(|| Error::Missing(format!("cipher {name}")))?;
            sc.init();
            sc.load_key(&self.key);
            sc.load_key(otkey);
            scs.push(sc);
        }
        Ok(scs)
    }

    fn make_hashes(&self) -> Result<Vec<Box<dyn HashProc>>> {
        self.hashes
            .iter()
            .map(|name| {
                digest::proc_by_name(name).ok_or_else(|| Error::Missing(format!("hash {name}")))
            })
            .collect()
    }

    pub fn encrypt(
        &self,
        input: &mut dyn Read,
        output: &mut dyn Write,
        rng: &mut dyn Prng,
    ) -> Result<()> {
        if !self.is_valid() {
            return Err(Error::BadInput("invalid symkey"));
        }

        let mut otkey = vec![0u8; self.key.len()];
        rng.random_bytes(&mut otkey);

        let mut scs = self.make_ciphers(&otkey)?;
        let mut hps = self.make_hashes()?;
        let hashes_size: usize = hps.iter().map(|h| h.size()).sum();

        output
            .write_all(&otkey)
            .map_err(|e| Error::io("writing symkey output", e))?;

        let bs = self.blocksize as usize;
        let mut buf = vec![0u8; bs + hashes_size];

        loop {
            let bytes_read =
                read_up_to(input, &mut buf[..bs]).map_err(|e| Error::io("reading input", e))?;

            // trailing keyed digests of the plaintext
            let mut hashpos = bytes_read;
            for hp in hps.iter_mut() {
                hp.init();
                hp.eat(&buf[..bytes_read]);
                hp.eat(&self.key);
                hp.eat(&otkey);
                let d = hp.finish();
                buf[hashpos..hashpos + d.len()].copy_from_slice(&d);
                hashpos += d.len();
            }

            for sc in scs.iter_mut() {
                cipher::xor_stream(sc.as_mut(), &mut buf[..hashpos]);
            }

            output
                .write_all(&buf[..hashpos])
                .map_err(|e| Error::io("writing symkey output", e))?;

            if bytes_read < bs {
                break;
            }
        }
        Ok(())
    }

    pub fn decrypt(&self, input: &mut dyn Read, output: &mut dyn Write) -> Result<()> {
        if !self.is_valid() {
            return Err(Error::BadInput("invalid symkey"));
        }

        let mut otkey = vec![0u8; self.key.len()];
        input
            .read_exact(&mut otkey)
            .map_err(|e| Error::io("reading symkey input", e))?;

        let mut scs = self.make_ciphers(&otkey)?;
        let mut hps = self.make_hashes()?;
        let hashes_size: usize = hps.iter().map(|h| h.size()).sum();

        let bs = self.blocksize as usize;
        let mut buf = vec![0u8; bs + hashes_size];

        loop {
            let bytes_read =
                read_up_to(input, &mut buf).map_err(|e| Error::io("reading symkey input", e))?;
            if bytes_read < hashes_size {
                return Err(Error::Malformed("truncated symkey stream"));
            }

            for sc in scs.iter_mut() {
                cipher::xor_stream(sc.as_mut(), &mut buf[..bytes_read]);
            }

            let data_len = bytes_read - hashes_size;
            let mut hashpos = data_len;
            for hp in hps.iter_mut() {
                hp.init();
                hp.eat(&buf[..data_len]);
                hp.eat(&self.key);
                hp.eat(&otkey);
                let d = hp.finish();
                if buf[hashpos..hashpos + d.len()] != d[..] {
                    return Err(Error::Crypto("mangled input"));
                }
                hashpos += d.len();
            }

            output
                .write_all(&buf[..data_len])
                .map_err(|e| Error::io("writing output", e))?;

            if data_len < bs {
                break;
            }
        }

        // nothing may follow the short block
        let mut probe = [0u8; 1];
        match input.read(&mut probe) {
            Ok(0) => Ok(()),
            Ok(_) => Err(Error::Malformed("trailing data after symkey stream")),
            Err(e) => Err(Error::io("reading symkey input", e)),
        }
    }

    pub fn encrypt_bytes(&self, data: &[u8], rng: &mut dyn Prng) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.encrypt(&mut &data[..], &mut out, rng)?;
        Ok(out)
    }

    pub fn decrypt_bytes(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.decrypt(&mut &data[..], &mut out)?;
        Ok(out)
    }

    pub fn serialize(&self) -> Sencode {
        Sencode::list(vec![
            Sencode::bytes(IDENT),
            Sencode::List(self.ciphers.iter().map(|c| Sencode::str(c)).collect()),
            Sencode::List(self.hashes.iter().map(|h| Sencode::str(h)).collect()),
            Sencode::Int(self.blocksize),
            Sencode::bytes(self.key.clone()),
        ])
    }

    pub fn unserialize(s: &Sencode) -> Result<Symkey> {
        let items = s.as_list_of(5)?;
        if items[0].as_bytes()? != IDENT {
            return Err(Error::Malformed("wrong key type tag"));
        }

        let mut ciphers = BTreeSet::new();
        for c in items[1].as_list()? {
            let name = String::from_utf8(c.as_bytes()?.to_vec())
                .map_err(|_| Error::Malformed("cipher name not text"))?;
            if !ciphers.insert(name) {
                return Err(Error::Malformed("duplicate cipher"));
            }
        }
        let mut hashes = BTreeSet::new();
        for h in items[2].as_list()? {
            let name = String::from_utf8(h.as_bytes()?.to_vec())
                .map_err(|_| Error::Malformed("hash name not text"))?;
            if !hashes.insert(name) {
                return Err(Error::Malformed("duplicate hash"));
            }
        }

        Ok(Symkey {
            ciphers,
            hashes,
            blocksize: items[3].as_int()?,
            key: items[4].as_bytes()?.to_vec(),
        })
    }
}

fn read_up_to(input: &mut dyn Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match input.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::TestRng;

    fn test_key(spec: &str) -> Symkey {
        let mut rng = TestRng::new(40);
        Symkey::create(spec, &mut rng).unwrap()
    }

    #[test]
    fn roundtrip_various_sizes() {
        let mut rng = TestRng::new(41);
        let sk = test_key("CHACHA20,CUBE256,SHORTBLOCK");

        for size in [0usize, 1, 100, 1024, 1025, 3000] {
            let data: Vec<u8> = (0..size).map(|i| (i * 7) as u8).collect();
            let enc = sk.encrypt_bytes(&data, &mut rng).unwrap();
            assert_eq!(sk.decrypt_bytes(&enc).unwrap(), data);
        }
    }

    #[test]
    fn layered_ciphers_and_hashes() {
        let mut rng = TestRng::new(42);
        let sk = test_key("CHACHA20,ARCFOUR,CUBE256,CUBE512,SHORTBLOCK");
        assert_eq!(sk.ciphers.len(), 2);
        assert_eq!(sk.hashes.len(), 2);

        let data = b"layered container".to_vec();
        let enc = sk.encrypt_bytes(&data, &mut rng).unwrap();
        assert_eq!(sk.decrypt_bytes(&enc).unwrap(), data);
    }

    #[test]
    fn bit_flip_is_detected() {
        let mut rng = TestRng::new(43);
        let sk = test_key("CHACHA20,CUBE256,SHORTBLOCK");
        let data = b"protected data".to_vec();
        let enc = sk.encrypt_bytes(&data, &mut rng).unwrap();

        for pos in [sk.key.len(), enc.len() - 1, sk.key.len() + 5] {
            let mut broken = enc.clone();
            broken[pos] ^= 1;
            match sk.decrypt_bytes(&broken) {
                Err(Error::Crypto(msg)) => assert_eq!(msg, "mangled input"),
                other => panic!("expected mangled input, got {other:?}"),
            }
        }
    }

    #[test]
    fn bad_spec_fails() {
        let mut rng = TestRng::new(44);
        assert!(Symkey::create("CHACHA20,NOSUCHHASH", &mut rng).is_err());
        // a cipher alone is not enough
        assert!(Symkey::create("CHACHA20", &mut rng).is_err());
    }

    #[test]
    fn serialization_roundtrip() {
        let sk = test_key("ARCFOUR,CUBE384,LONGKEY");
        assert_eq!(sk.key.len(), 512);
        let s = sk.serialize();
        assert_eq!(Symkey::unserialize(&s).unwrap(), sk);
    }
}
