//! ASCII armor for anything that needs to survive a mail client.
//!
//! ```text
//! ------ccr begin <type> <termident>------
//! <base64>
//! ------ccr cut <type> <termident>------
//! <base64>
//! ------ccr end <type> <termident>------
//! ```
//!
//! The termident is 16 random alphanumerics shared by all markers of one
//! envelope; generation retries if it happens to occur inside the encoded
//! content, so markers can always be matched naively.

use base64::{engine::general_purpose, Engine as _};

use crate::error::{Error, Result};
use crate::rng::Prng;

pub const TYPE_SECRETS: &str = "secrets";
pub const TYPE_PUBKEYS: &str = "publickeys";
pub const TYPE_ENCRYPTED: &str = "encrypted";
pub const TYPE_SIGNED: &str = "signed";
pub const TYPE_CLEARSIGN: &str = "clearsigned";
pub const TYPE_DETACHSIGN: &str = "detachsign";
pub const TYPE_HASHFILE: &str = "hashfile";

const MARK: &str = "------ccr ";
const MARK_END: &str = "------";
const TERMIDENT_LEN: usize = 16;
const WRAP_COLS: usize = 64;

fn random_termident(rng: &mut dyn Prng) -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    (0..TERMIDENT_LEN)
        .map(|_| ALPHABET[rng.random(ALPHABET.len() as u32) as usize] as char)
        .collect()
}

fn wrap(data: &str) -> String {
    let mut out = String::with_capacity(data.len() + data.len() / WRAP_COLS + 1);
    for chunk in data.as_bytes().chunks(WRAP_COLS) {
        out.push_str(std::str::from_utf8(chunk).expect("base64 is ascii"));
        out.push('\n');
    }
    out
}

pub fn format(env_type: &str, parts: &[Vec<u8>], rng: &mut dyn Prng) -> String {
    let encoded: Vec<String> = parts
        .iter()
        .map(|p| general_purpose::STANDARD.encode(p))
        .collect();

    let termident = loop {
        let t = random_termident(rng);
        if !encoded.iter().any(|e| e.contains(&t)) {
            break t;
        }
    };

    let mut out = format!("{MARK}begin {env_type} {termident}{MARK_END}\n");
    for (i, e) in encoded.iter().enumerate() {
        if i > 0 {
            out.push_str(&format!("{MARK}cut {env_type} {termident}{MARK_END}\n"));
        }
        out.push_str(&wrap(e));
    }
    out.push_str(&format!("{MARK}end {env_type} {termident}{MARK_END}\n"));
    out
}

/// Quick guess whether a chunk of text could carry an envelope.
pub fn lookalike(data: &str) -> bool {
    data.contains(MARK)
}

/// Find and decode the first envelope at or after `offset`. Returns the
/// envelope type, its parts and the offset right after it.
pub fn read(data: &str, offset: usize) -> Result<(String, Vec<Vec<u8>>, usize)> {
    let begin_pos = data[offset..]
        .find(&format!("{MARK}begin "))
        .map(|p| p + offset)
        .ok_or(Error::Malformed("no envelope found"))?;

    // header line: ------ccr begin <type> <termident>------
    let head_start = begin_pos + MARK.len() + "begin ".len();
    let head_end = data[head_start..]
        .find(MARK_END)
        .map(|p| p + head_start)
        .ok_or(Error::Malformed("unterminated envelope header"))?;
    let mut header = data[head_start..head_end].split(' ');
    let env_type = header
        .next()
        .ok_or(Error::Malformed("envelope type missing"))?
        .to_string();
    let termident = header
        .next()
        .ok_or(Error::Malformed("envelope termident missing"))?
        .to_string();
    if header.next().is_some() || termident.len() != TERMIDENT_LEN {
        return Err(Error::Malformed("malformed envelope header"));
    }

    let cut_mark = format!("{MARK}cut {env_type} {termident}{MARK_END}");
    let end_mark = format!("{MARK}end {env_type} {termident}{MARK_END}");

    let mut parts = Vec::new();
    let mut pos = head_end + MARK_END.len();
    loop {
        let cut = data[pos..].find(&cut_mark);
        let end = data[pos..].find(&end_mark);

        let (stop, is_end) = match (cut, end) {
            (Some(c), Some(e)) if c < e => (c, false),
            (_, Some(e)) => (e, true),
            (Some(_), None) | (None, None) => {
                return Err(Error::Malformed("unterminated envelope"))
            }
        };

        let body: String = data[pos..pos + stop]
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        let decoded = general_purpose::STANDARD
            .decode(body)
            .map_err(|_| Error::Malformed("bad base64 in envelope"))?;
        parts.push(decoded);

        pos += stop + if is_end { end_mark.len() } else { cut_mark.len() };
        if is_end {
            return Ok((env_type, parts, pos));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::TestRng;

    #[test]
    fn format_read_roundtrip() {
        let mut rng = TestRng::new(20);
        let parts = vec![b"first part".to_vec(), vec![0u8, 1, 2, 255], Vec::new()];
        let armored = format(TYPE_ENCRYPTED, &parts, &mut rng);

        assert!(lookalike(&armored));
        let (ty, back, next) = read(&armored, 0).unwrap();
        assert_eq!(ty, TYPE_ENCRYPTED);
        assert_eq!(back, parts);
        assert_eq!(next, armored.len());
    }

    #[test]
    fn long_content_wraps_and_survives() {
        let mut rng = TestRng::new(21);
        let big: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
        let armored = format(TYPE_PUBKEYS, &[big.clone()], &mut rng);

        // no base64 line longer than the wrap width
        for line in armored.lines() {
            if !line.starts_with(MARK) {
                assert!(line.len() <= WRAP_COLS);
            }
        }

        let (_, parts, _) = read(&armored, 0).unwrap();
        assert_eq!(parts, vec![big]);
    }

    #[test]
    fn two_envelopes_in_one_text() {
        let mut rng = TestRng::new(22);
        let a = format(TYPE_SIGNED, &[b"one".to_vec()], &mut rng);
        let b = format(TYPE_SECRETS, &[b"two".to_vec()], &mut rng);
        let joined = format!("some leading text\n{a}between\n{b}after");

        let (ty1, p1, next) = read(&joined, 0).unwrap();
        assert_eq!(ty1, TYPE_SIGNED);
        assert_eq!(p1, vec![b"one".to_vec()]);

        let (ty2, p2, _) = read(&joined, next).unwrap();
        assert_eq!(ty2, TYPE_SECRETS);
        assert_eq!(p2, vec![b"two".to_vec()]);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(read("no envelope here", 0).is_err());
        let broken = "------ccr begin encrypted 0123456789abcdef------\nAAAA\n";
        assert!(read(broken, 0).is_err());
    }
}
