//! Multi-digest checksums of a byte stream, storable and verifiable.
//!
//! A hashfile carries one digest per known hash function; verification
//! recomputes whatever names it recognizes and demands that all of them
//! match and at least one was checked.

use std::collections::BTreeMap;

use crate::digest;
use crate::error::{Error, Result};
use crate::sencode::Sencode;

const IDENT: &[u8] = b"CCR-HASHFILE";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HashFile {
    /// hash name -> digest, ordered for stable serialization
    pub hashes: BTreeMap<String, Vec<u8>>,
}

impl HashFile {
    pub fn create(data: &[u8]) -> HashFile {
        let mut hashes = BTreeMap::new();
        for name in digest::HASH_NAMES {
            let hf = digest::by_name(name).expect("listed name");
            hashes.insert(name.to_string(), hf.hash(data));
        }
        HashFile { hashes }
    }

    /// All recognizable digests must match; unknown names are ignored so
    /// that files from richer builds stay verifiable.
    pub fn verify(&self, data: &[u8]) -> Result<()> {
        let mut checked = 0;
        for (name, expected) in &self.hashes {
            let Some(hf) = digest::by_name(name) else {
                continue;
            };
            if &hf.hash(data) != expected {
                return Err(Error::Crypto("hash mismatch"));
            }
            checked += 1;
        }
        if checked == 0 {
            return Err(Error::BadInput("no verifiable hash in hashfile"));
        }
        Ok(())
    }

    pub fn serialize(&self) -> Sencode {
        let mut items = vec![Sencode::bytes(IDENT)];
        for (name, digest) in &self.hashes {
            items.push(Sencode::list(vec![
                Sencode::str(name),
                Sencode::bytes(digest.clone()),
            ]));
        }
        Sencode::List(items)
    }

    pub fn unserialize(s: &Sencode) -> Result<HashFile> {
        let items = s.as_list()?;
        if items.is_empty() || items[0].as_bytes()? != IDENT {
            return Err(Error::Malformed("not a hashfile"));
        }

        let mut hashes = BTreeMap::new();
        for entry in &items[1..] {
            let f = entry.as_list_of(2)?;
            let name = String::from_utf8(f[0].as_bytes()?.to_vec())
                .map_err(|_| Error::Malformed("hash name not text"))?;
            let digest = f[1].as_bytes()?.to_vec();
            if hashes.insert(name, digest).is_some() {
                return Err(Error::Malformed("duplicate hash entry"));
            }
        }
        Ok(HashFile { hashes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_verify_roundtrip() {
        let data = b"some file content";
        let hf = HashFile::create(data);
        assert_eq!(hf.hashes.len(), digest::HASH_NAMES.len());
        hf.verify(data).unwrap();
        assert!(hf.verify(b"other content").is_err());
    }

    #[test]
    fn serialization_roundtrip() {
        let hf = HashFile::create(b"x");
        let s = hf.serialize();
        assert_eq!(HashFile::unserialize(&s).unwrap(), hf);
    }

    #[test]
    fn unknown_hashes_are_skipped() {
        let mut hf = HashFile::create(b"data");
        hf.hashes
            .insert("FUTUREHASH".to_string(), vec![1, 2, 3]);
        hf.verify(b"data").unwrap();

        // but a ring of only unknown hashes verifies nothing
        let lonely = HashFile {
            hashes: [("FUTUREHASH".to_string(), vec![1u8])].into_iter().collect(),
        };
        assert!(lonely.verify(b"data").is_err());
    }
}
