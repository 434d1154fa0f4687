//! The actions behind the CLI verbs. Thin glue: parse, route to the
//! library, translate errors into exit codes.

use std::io::{Read, Write};

use ccr::algorithm::{expand_alias, expand_symkey_alias, AlgorithmSuite};
use ccr::envelope;
use ccr::error::{Error, Result};
use ccr::keyring::{self, Keyring};
use ccr::math::bitvec::BitVec;
use ccr::message::{EncryptedMsg, SignedMsg};
use ccr::rng::ChaChaRng;
use ccr::sencode::Sencode;
use ccr::symkey::Symkey;

fn seeded_rng() -> Result<ChaChaRng> {
    ChaChaRng::seeded(256)
}

fn read_stdin() -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    std::io::stdin()
        .read_to_end(&mut buf)
        .map_err(|e| Error::io("reading standard input", e))?;
    Ok(buf)
}

fn write_stdout(data: &[u8]) -> Result<()> {
    std::io::stdout()
        .write_all(data)
        .map_err(|e| Error::io("writing standard output", e))
}

fn open_keyring() -> Result<Keyring> {
    Keyring::open(keyring::default_dir())
}

/// `@hexprefix` matches KeyIDs, anything else searches names.
fn key_matches(search: &str, name: &str, keyid: &str) -> bool {
    if search.is_empty() {
        return true;
    }
    if let Some(idpart) = search.strip_prefix('@') {
        return keyid.to_lowercase().starts_with(&idpart.to_lowercase());
    }
    name.contains(search)
}

fn find_single_pubkey<'a>(kr: &'a Keyring, search: &str) -> Result<&'a str> {
    let mut hits: Vec<&str> = Vec::new();
    for p in kr.pairs.values().map(|p| &p.pub_entry) {
        if key_matches(search, &p.name, &p.keyid) {
            hits.push(&p.keyid);
        }
    }
    for p in kr.pubs.values() {
        if key_matches(search, &p.name, &p.keyid) {
            hits.push(&p.keyid);
        }
    }
    match hits.len() {
        0 => Err(Error::Missing(format!("key matching \"{search}\""))),
        1 => Ok(hits[0]),
        _ => Err(Error::BadInput("ambiguous key specification")),
    }
}

fn find_single_keypair<'a>(kr: &'a Keyring, search: &str) -> Result<String> {
    let hits: Vec<String> = kr
        .pairs
        .values()
        .filter(|p| key_matches(search, &p.pub_entry.name, &p.pub_entry.keyid))
        .map(|p| p.pub_entry.keyid.clone())
        .collect();
    match hits.len() {
        0 => Err(Error::Missing(format!("secret key matching \"{search}\""))),
        1 => Ok(hits[0].clone()),
        _ => Err(Error::BadInput("ambiguous key specification")),
    }
}

pub fn gen_key(algspec: &str, name: &str, lock: bool) -> Result<()> {
    let suite = AlgorithmSuite::standard();
    let alg = suite
        .get(algspec)
        .ok_or_else(|| Error::Missing(format!("algorithm {algspec}")))?;

    let mut rng = seeded_rng()?;
    eprintln!("Gathering random seed bits. Please don't touch your computer now.");
    let (pub_key, priv_key) = alg.create_keypair(&mut rng)?;

    let mut kr = open_keyring()?;
    let pub_bytes = pub_key.encode();
    let mut priv_bytes = priv_key.encode();

    if lock {
        let sk = ccr::seclock::keyring_symkey()?;
        priv_bytes = ccr::seclock::lock_secret(&priv_bytes, &sk, &mut rng)?;
    }

    let keyid = keyring::get_keyid(&pub_bytes);
    kr.store_keypair(name, alg.alg_id(), pub_bytes, priv_bytes)
        .ok_or(Error::BadInput("key already present"))?;
    kr.save()?;

    println!("{keyid} {} {name}", alg.alg_id());
    Ok(())
}

pub fn list(secrets: bool, search: &str) -> Result<()> {
    let kr = open_keyring()?;
    if secrets {
        for p in kr.pairs.values() {
            let e = &p.pub_entry;
            if key_matches(search, &e.name, &e.keyid) {
                let state = if p.is_locked() { "locked" } else { "open" };
                println!("{} {} {} ({state})", e.keyid, e.alg, e.name);
            }
        }
    } else {
        for e in kr
            .pairs
            .values()
            .map(|p| &p.pub_entry)
            .chain(kr.pubs.values())
        {
            if key_matches(search, &e.name, &e.keyid) {
                println!("{} {} {}", e.keyid, e.alg, e.name);
            }
        }
    }
    Ok(())
}

pub fn export(search: &str, armor: bool) -> Result<()> {
    let kr = open_keyring()?;

    let mut items = vec![Sencode::str("CCR-PUBKEYS")];
    for e in kr
        .pairs
        .values()
        .map(|p| &p.pub_entry)
        .chain(kr.pubs.values())
    {
        if key_matches(search, &e.name, &e.keyid) {
            items.push(Sencode::list(vec![
                Sencode::str(&e.name),
                Sencode::str(&e.alg),
                Sencode::bytes(e.key_bytes.clone()),
            ]));
        }
    }
    if items.len() == 1 {
        return Err(Error::Missing(format!("key matching \"{search}\"")));
    }

    let data = Sencode::List(items).encode();
    if armor {
        let mut rng = seeded_rng()?;
        write_stdout(envelope::format(envelope::TYPE_PUBKEYS, &[data], &mut rng).as_bytes())
    } else {
        write_stdout(&data)
    }
}

pub fn import(armor: bool) -> Result<()> {
    let input = read_stdin()?;

    let data = if armor {
        let text = String::from_utf8_lossy(&input);
        let (ty, mut parts, _) = envelope::read(&text, 0)?;
        if ty != envelope::TYPE_PUBKEYS || parts.len() != 1 {
            return Err(Error::Malformed("not a public key envelope"));
        }
        parts.remove(0)
    } else {
        input
    };

    let tree = Sencode::decode(&data)?;
    let items = tree.as_list()?;
    if items.is_empty() || items[0].as_bytes()? != b"CCR-PUBKEYS" {
        return Err(Error::Malformed("not a public key ring"));
    }

    let mut kr = open_keyring()?;
    let mut imported = 0;
    for entry in &items[1..] {
        let f = entry.as_list_of(3)?;
        let name = String::from_utf8_lossy(f[0].as_bytes()?).into_owned();
        let alg = String::from_utf8_lossy(f[1].as_bytes()?).into_owned();
        let key_bytes = f[2].as_bytes()?.to_vec();
        Sencode::decode(&key_bytes)?;

        if let Some(e) = kr.store_pubkey(&name, &alg, key_bytes) {
            println!("{} {} {}", e.keyid, e.alg, e.name);
            imported += 1;
        }
    }
    kr.save()?;
    eprintln!("imported {imported} key(s)");
    Ok(())
}

pub fn encrypt(recipient: &str, algspec: &str, armor: bool) -> Result<()> {
    let suite = AlgorithmSuite::standard();
    let kr = open_keyring()?;
    let mut rng = seeded_rng()?;

    let keyid = find_single_pubkey(&kr, recipient)?.to_string();
    let alg_id = match algspec {
        "" => kr
            .get_pubkey(&keyid)
            .map(|e| e.alg.clone())
            .unwrap_or_default(),
        s => expand_alias(&s.to_uppercase()).to_string(),
    };

    let plain = BitVec::from_bytes(&read_stdin()?, 0);
    let msg = EncryptedMsg::encrypt(&plain, &alg_id, &keyid, &suite, &kr, &mut rng)?;
    let data = msg.serialize().encode();

    if armor {
        write_stdout(envelope::format(envelope::TYPE_ENCRYPTED, &[data], &mut rng).as_bytes())
    } else {
        write_stdout(&data)
    }
}

pub fn decrypt(armor: bool) -> Result<()> {
    let suite = AlgorithmSuite::standard();
    let kr = open_keyring()?;
    let input = read_stdin()?;

    let data = if armor {
        let text = String::from_utf8_lossy(&input);
        let (ty, mut parts, _) = envelope::read(&text, 0)?;
        if ty != envelope::TYPE_ENCRYPTED || parts.len() != 1 {
            return Err(Error::Malformed("not an encrypted message envelope"));
        }
        parts.remove(0)
    } else {
        input
    };

    let msg = EncryptedMsg::unserialize(&Sencode::decode(&data)?)?;
    let plain = msg.decrypt(&suite, &kr)?;
    eprintln!("good message from @{}", msg.key_id);
    write_stdout(&plain.to_bytes())
}

pub fn sign(user: &str, algspec: &str, armor: bool) -> Result<()> {
    let suite = AlgorithmSuite::standard();
    let mut kr = open_keyring()?;
    let mut rng = seeded_rng()?;

    let user = if user.is_empty() {
        std::env::var("CCR_USER").unwrap_or_default()
    } else {
        user.to_string()
    };

    let keyid = find_single_keypair(&kr, &user)?;
    let alg_id = match algspec {
        "" => kr
            .get_keypair(&keyid)
            .map(|e| e.pub_entry.alg.clone())
            .unwrap_or_default(),
        s => expand_alias(&s.to_uppercase()).to_string(),
    };

    let message = BitVec::from_bytes(&read_stdin()?, 0);
    let msg = SignedMsg::sign(&message, &alg_id, &keyid, &suite, &mut kr, &mut rng)?;
    let data = msg.serialize().encode();

    if armor {
        write_stdout(envelope::format(envelope::TYPE_SIGNED, &[data], &mut rng).as_bytes())
    } else {
        write_stdout(&data)
    }
}

pub fn verify(armor: bool) -> Result<()> {
    let suite = AlgorithmSuite::standard();
    let kr = open_keyring()?;
    let input = read_stdin()?;

    let data = if armor {
        let text = String::from_utf8_lossy(&input);
        let (ty, mut parts, _) = envelope::read(&text, 0)?;
        if ty != envelope::TYPE_SIGNED || parts.len() != 1 {
            return Err(Error::Malformed("not a signed message envelope"));
        }
        parts.remove(0)
    } else {
        input
    };

    let msg = SignedMsg::unserialize(&Sencode::decode(&data)?)?;
    msg.verify(&suite, &kr)?;
    eprintln!("good signature from @{}", msg.key_id);
    write_stdout(&msg.message.to_bytes())
}

pub fn gen_symkey(algspec: &str, armor: bool) -> Result<()> {
    let mut rng = seeded_rng()?;
    let spec = expand_symkey_alias(&algspec.to_uppercase()).to_string();
    let sk = Symkey::create(&spec, &mut rng)?;
    let data = sk.serialize().encode();

    if armor {
        write_stdout(envelope::format(envelope::TYPE_SECRETS, &[data], &mut rng).as_bytes())
    } else {
        write_stdout(&data)
    }
}

pub fn list_algorithms() -> Result<()> {
    let suite = AlgorithmSuite::standard();
    for name in suite.names() {
        let alg = suite.get(name).expect("listed name");
        let kind = if alg.provides_encryption() {
            "encryption"
        } else {
            "signature"
        };
        println!("{name} ({kind})");
    }
    Ok(())
}
