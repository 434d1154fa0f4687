//! On-disk key storage: two sencode files (`pubkeys`, `secrets`) under the
//! configuration directory, an exclusive lock file while open, atomic
//! replace on save, one-generation backups.
//!
//! Keys are looked up by KeyID, the hex CubeHash-256 of the exact pubkey
//! sencode bytes. Pubkeys are stored as opaque byte strings inside the
//! ring so the fingerprint can be computed without re-encoding anything.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::digest::{CubeHash, HashFunction};
use crate::error::{Error, Result};
use crate::rng::Prng;
use crate::seclock;
use crate::sencode::Sencode;

const PUBKEYS_ID: &[u8] = b"CCR-PUBKEYS";
const KEYPAIRS_ID: &[u8] = b"CCR-KEYPAIRS";

pub const DIR_ENV: &str = "CCR_DIR";

pub fn get_keyid(pubkey_bytes: &[u8]) -> String {
    hex::encode(CubeHash::new(32).hash(pubkey_bytes))
}

#[derive(Clone, Debug)]
pub struct PubkeyEntry {
    pub keyid: String,
    pub name: String,
    pub alg: String,
    /// Exact serialized pubkey, the KeyID preimage.
    pub key_bytes: Vec<u8>,
}

impl PubkeyEntry {
    pub fn key(&self) -> Result<Sencode> {
        Sencode::decode(&self.key_bytes)
    }
}

#[derive(Clone, Debug)]
pub struct KeypairEntry {
    pub pub_entry: PubkeyEntry,
    /// Sencode bytes, or a ccr_lock blob when stored encrypted.
    pub privkey_raw: Vec<u8>,
}

impl KeypairEntry {
    pub fn is_locked(&self) -> bool {
        seclock::looks_like_locked_secret(&self.privkey_raw)
    }

    /// Decode the private key, unlocking it first if needed.
    pub fn privkey(&self) -> Result<Sencode> {
        if self.is_locked() {
            let sk = seclock::keyring_symkey()?;
            let raw = seclock::unlock_secret(&self.privkey_raw, &sk)?;
            Sencode::decode(&raw)
        } else {
            Sencode::decode(&self.privkey_raw)
        }
    }

    /// Replace the private key, preserving its locked/plain state.
    pub fn store_privkey(&mut self, key: &Sencode, rng: &mut dyn Prng) -> Result<()> {
        let raw = key.encode();
        self.privkey_raw = if self.is_locked() {
            let sk = seclock::keyring_symkey()?;
            seclock::lock_secret(&raw, &sk, rng)?
        } else {
            raw
        };
        Ok(())
    }

    pub fn lock(&mut self, rng: &mut dyn Prng) -> Result<()> {
        if self.is_locked() {
            return Ok(());
        }
        let sk = seclock::keyring_symkey()?;
        self.privkey_raw = seclock::lock_secret(&self.privkey_raw.clone(), &sk, rng)?;
        Ok(())
    }

    pub fn unlock(&mut self) -> Result<()> {
        if !self.is_locked() {
            return Ok(());
        }
        let sk = seclock::keyring_symkey()?;
        self.privkey_raw = seclock::unlock_secret(&self.privkey_raw, &sk)?;
        Ok(())
    }
}

pub struct Keyring {
    dir: PathBuf,
    lockfile: Option<PathBuf>,
    pub pubs: BTreeMap<String, PubkeyEntry>,
    pub pairs: BTreeMap<String, KeypairEntry>,
}

pub fn default_dir() -> PathBuf {
    if let Ok(d) = std::env::var(DIR_ENV) {
        return PathBuf::from(d);
    }
    match std::env::var("HOME") {
        Ok(home) => Path::new(&home).join(".ccr"),
        Err(_) => PathBuf::from(".ccr"),
    }
}

impl Keyring {
    /// Open the keyring under `dir`, creating an empty one when nothing is
    /// there yet. Holds an exclusive lock file until `close`/drop.
    pub fn open(dir: PathBuf) -> Result<Keyring> {
        fs::create_dir_all(&dir).map_err(|e| Error::io("creating keyring directory", e))?;

        let lockfile = dir.join("lock");
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lockfile)
        {
            Ok(mut f) => {
                let _ = write!(f, "{}", std::process::id());
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(Error::io(
                    "keyring is locked by another process".to_string(),
                    e,
                ));
            }
            Err(e) => return Err(Error::io("creating keyring lock", e)),
        }

        let mut kr = Keyring {
            dir,
            lockfile: Some(lockfile),
            pubs: BTreeMap::new(),
            pairs: BTreeMap::new(),
        };

        if let Err(e) = kr.load() {
            kr.close();
            return Err(e);
        }
        Ok(kr)
    }

    fn load(&mut self) -> Result<()> {
        if let Some(data) = read_optional(&self.dir.join("pubkeys"))? {
            let tree = Sencode::decode(&data)?;
            self.pubs = parse_pubkeys(&tree)?;
        }
        if let Some(data) = read_optional(&self.dir.join("secrets"))? {
            let tree = Sencode::decode(&data)?;
            self.pairs = parse_keypairs(&tree)?;
        }
        Ok(())
    }

    /// Serialize and atomically replace both files, keeping the previous
    /// content in `~`-suffixed backups.
    pub fn save(&self) -> Result<()> {
        write_atomic(
            &self.dir,
            "pubkeys",
            &serialize_pubkeys(&self.pubs).encode(),
        )?;
        write_atomic(
            &self.dir,
            "secrets",
            &serialize_keypairs(&self.pairs).encode(),
        )?;
        Ok(())
    }

    pub fn close(&mut self) {
        if let Some(lf) = self.lockfile.take() {
            let _ = fs::remove_file(lf);
        }
    }

    pub fn get_pubkey(&self, keyid: &str) -> Option<&PubkeyEntry> {
        // own keys first, collisions should not happen anyway
        if let Some(pair) = self.pairs.get(keyid) {
            return Some(&pair.pub_entry);
        }
        self.pubs.get(keyid)
    }

    pub fn store_pubkey(
        &mut self,
        name: &str,
        alg: &str,
        key_bytes: Vec<u8>,
    ) -> Option<&PubkeyEntry> {
        let keyid = get_keyid(&key_bytes);
        if self.pairs.contains_key(&keyid) || self.pubs.contains_key(&keyid) {
            return None;
        }
        let entry = PubkeyEntry {
            keyid: keyid.clone(),
            name: name.to_string(),
            alg: alg.to_string(),
            key_bytes,
        };
        Some(self.pubs.entry(keyid).or_insert(entry))
    }

    pub fn remove_pubkey(&mut self, keyid: &str) -> bool {
        self.pubs.remove(keyid).is_some()
    }

    pub fn get_keypair(&self, keyid: &str) -> Option<&KeypairEntry> {
        self.pairs.get(keyid)
    }

    pub fn get_keypair_mut(&mut self, keyid: &str) -> Option<&mut KeypairEntry> {
        self.pairs.get_mut(keyid)
    }

    pub fn store_keypair(
        &mut self,
        name: &str,
        alg: &str,
        pubkey_bytes: Vec<u8>,
        privkey_raw: Vec<u8>,
    ) -> Option<&KeypairEntry> {
        let keyid = get_keyid(&pubkey_bytes);
        if self.pairs.contains_key(&keyid) || self.pubs.contains_key(&keyid) {
            return None;
        }
        let entry = KeypairEntry {
            pub_entry: PubkeyEntry {
                keyid: keyid.clone(),
                name: name.to_string(),
                alg: alg.to_string(),
                key_bytes: pubkey_bytes,
            },
            privkey_raw,
        };
        Some(self.pairs.entry(keyid).or_insert(entry))
    }

    pub fn remove_keypair(&mut self, keyid: &str) -> bool {
        self.pairs.remove(keyid).is_some()
    }
}

impl Drop for Keyring {
    fn drop(&mut self) {
        self.close();
    }
}

fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(data) => Ok(Some(data)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::io(format!("reading {}", path.display()), e)),
    }
}

/// Backup the old file, write a temp file next to it, rename over.
fn write_atomic(dir: &Path, name: &str, data: &[u8]) -> Result<()> {
    let target = dir.join(name);

    if let Some(old) = read_optional(&target)? {
        if old == data {
            return Ok(()); // nothing changed
        }
        fs::write(dir.join(format!("{name}~")), &old)
            .map_err(|e| Error::io("writing keyring backup", e))?;
    }

    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| Error::io("creating keyring temp file", e))?;
    tmp.write_all(data)
        .map_err(|e| Error::io("writing keyring temp file", e))?;
    tmp.persist(&target)
        .map_err(|e| Error::io("replacing keyring file", e.error))?;
    Ok(())
}

fn parse_pubkeys(tree: &Sencode) -> Result<BTreeMap<String, PubkeyEntry>> {
    let items = tree.as_list()?;
    if items.is_empty() || items[0].as_bytes()? != PUBKEYS_ID {
        return Err(Error::Malformed("not a pubkey ring"));
    }

    let mut out = BTreeMap::new();
    for entry in &items[1..] {
        let f = entry.as_list_of(3)?;
        let name = String::from_utf8_lossy(f[0].as_bytes()?).into_owned();
        let alg = String::from_utf8_lossy(f[1].as_bytes()?).into_owned();
        let key_bytes = f[2].as_bytes()?.to_vec();

        // stored pubkeys must stay decodable
        Sencode::decode(&key_bytes)?;

        let keyid = get_keyid(&key_bytes);
        out.insert(
            keyid.clone(),
            PubkeyEntry {
                keyid,
                name,
                alg,
                key_bytes,
            },
        );
    }
    Ok(out)
}

fn serialize_pubkeys(pubs: &BTreeMap<String, PubkeyEntry>) -> Sencode {
    let mut items = vec![Sencode::bytes(PUBKEYS_ID)];
    for e in pubs.values() {
        items.push(Sencode::list(vec![
            Sencode::str(&e.name),
            Sencode::str(&e.alg),
            Sencode::bytes(e.key_bytes.clone()),
        ]));
    }
    Sencode::List(items)
}

fn parse_keypairs(tree: &Sencode) -> Result<BTreeMap<String, KeypairEntry>> {
    let items = tree.as_list()?;
    if items.is_empty() || items[0].as_bytes()? != KEYPAIRS_ID {
        return Err(Error::Malformed("not a secret ring"));
    }

    let mut out = BTreeMap::new();
    for entry in &items[1..] {
        let f = entry.as_list_of(4)?;
        let name = String::from_utf8_lossy(f[0].as_bytes()?).into_owned();
        let alg = String::from_utf8_lossy(f[1].as_bytes()?).into_owned();
        let privkey_raw = f[2].as_bytes()?.to_vec();
        let key_bytes = f[3].as_bytes()?.to_vec();

        Sencode::decode(&key_bytes)?;

        let keyid = get_keyid(&key_bytes);
        out.insert(
            keyid.clone(),
            KeypairEntry {
                pub_entry: PubkeyEntry {
                    keyid,
                    name,
                    alg,
                    key_bytes,
                },
                privkey_raw,
            },
        );
    }
    Ok(out)
}

fn serialize_keypairs(pairs: &BTreeMap<String, KeypairEntry>) -> Sencode {
    let mut items = vec![Sencode::bytes(KEYPAIRS_ID)];
    for e in pairs.values() {
        items.push(Sencode::list(vec![
            Sencode::str(&e.pub_entry.name),
            Sencode::str(&e.pub_entry.alg),
            Sencode::bytes(e.privkey_raw.clone()),
            Sencode::bytes(e.pub_entry.key_bytes.clone()),
        ]));
    }
    Sencode::List(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_key(tag: &str) -> Vec<u8> {
        Sencode::list(vec![Sencode::str(tag), Sencode::Int(42)]).encode()
    }

    #[test]
    fn keyid_is_stable_and_distinct() {
        let a = get_keyid(&sample_key("a"));
        let b = get_keyid(&sample_key("a"));
        let c = get_keyid(&sample_key("c"));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|ch| ch.is_ascii_hexdigit()));
    }

    #[test]
    fn store_save_reload() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().to_path_buf();

        {
            let mut kr = Keyring::open(dir.clone()).unwrap();
            assert!(kr
                .store_pubkey("alice", "TESTALG", sample_key("alice"))
                .is_some());
            assert!(kr
                .store_keypair("me", "TESTALG", sample_key("me"), sample_key("mypriv"))
                .is_some());
            // duplicate is refused
            assert!(kr
                .store_pubkey("alice2", "TESTALG", sample_key("alice"))
                .is_none());
            kr.save().unwrap();
        }

        let kr = Keyring::open(dir).unwrap();
        assert_eq!(kr.pubs.len(), 1);
        assert_eq!(kr.pairs.len(), 1);

        let keyid = get_keyid(&sample_key("me"));
        let pair = kr.get_keypair(&keyid).unwrap();
        assert_eq!(pair.pub_entry.name, "me");
        assert!(!pair.is_locked());
        assert_eq!(pair.privkey().unwrap(), Sencode::decode(&sample_key("mypriv")).unwrap());

        // keypairs answer pubkey lookups too
        assert!(kr.get_pubkey(&keyid).is_some());
    }

    #[test]
    fn lock_is_exclusive() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().to_path_buf();

        let kr = Keyring::open(dir.clone()).unwrap();
        assert!(Keyring::open(dir.clone()).is_err());
        drop(kr);
        assert!(Keyring::open(dir).is_ok());
    }
}
