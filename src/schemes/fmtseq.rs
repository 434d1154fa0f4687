//! FMTseq: Merkle signatures with fractal tree traversal over
//! Lamport/Merkle one-time signatures.
//!
//! The tree of height h*l is cut into l levels of height-h subtrees.
//! `exist[i]` keeps the subtree the current authentication paths run
//! through; `desired[i]` is the next subtree of that level being grown in
//! the background, two leaf computations per produced signature, so the
//! per-signature cost stays bounded while no subtree is ever missing when
//! the signer crosses into it.
//!
//! Signing mutates the key. Callers must persist the new state before
//! releasing a signature; the algorithm layer enforces that through its
//! dirty flag.

use crate::cipher::{ChaCha20, StreamCipher};
use crate::digest::HashFunction;
use crate::error::{Error, Result};
use crate::math::bitvec::BitVec;
use crate::sencode::Sencode;
use crate::rng::Prng;

const PUB_IDENT: &[u8] = b"CCR-PUBLIC-KEY-FMTSEQ";
const PRIV_IDENT: &[u8] = b"CCR-PRIVATE-KEY-FMTSEQ";

const SK_BYTES: usize = 256;
/// Leaves fed to every desired-subtree builder on each signature.
const LEAVES_PER_SIG: usize = 2;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeStkItem {
    pub level: u32,
    pub pos: u32,
    pub item: Vec<u8>,
}

pub struct PrivKey {
    pub sk: Vec<u8>,
    pub h: u32,
    pub l: u32,
    /// Message-hash size in bits.
    pub hs: u32,
    pub sigs_used: u32,

    exist: Vec<Vec<Vec<u8>>>,
    desired: Vec<Vec<Vec<u8>>>,
    desired_stack: Vec<Vec<TreeStkItem>>,
    desired_progress: Vec<u32>,
}

pub struct PubKey {
    pub check: Vec<u8>,
    /// Total tree height h*l.
    pub total_height: u32,
    pub hs: u32,
}

/// Bits appended to the signed string as a count of zero bits. Prevents
/// flipping ones to zeros: fewer revealed secrets always means a changed
/// checksum.
fn checksum_bits(bits: usize) -> usize {
    let mut s = bits;
    let mut c = 0;
    while s > 0 {
        c += 1;
        s >>= 1;
    }
    c
}

fn commitment_count(hs_bits: usize) -> usize {
    hs_bits + checksum_bits(hs_bits)
}

fn add_zero_checksum(v: &mut BitVec) {
    let mut s = v.size();
    let mut z = s - v.hamming_weight();
    let mut pos = v.size();
    v.resize(pos + checksum_bits(s), false);
    while s > 0 {
        v.set(pos, z & 1 != 0);
        pos += 1;
        z >>= 1;
        s >>= 1;
    }
}

/// Per-leaf commitment generator: ChaCha20 keyed by SK and the leaf index.
fn leaf_generator(sk: &[u8], idx: u64) -> ChaCha20 {
    let mut g = ChaCha20::new();
    g.load_key(sk);
    let mut ib = [0u8; 16]; // fixed width, prevents chaining into neighbors
    ib[..8].copy_from_slice(&idx.to_le_bytes());
    g.load_key(&ib);
    g
}

/// Secret preimages of one leaf.
fn leaf_secrets(sk: &[u8], idx: u64, commitments: usize, hf: &dyn HashFunction) -> Vec<Vec<u8>> {
    let mut g = leaf_generator(sk, idx);
    (0..commitments)
        .map(|_| {
            let mut x = vec![0u8; hf.size()];
            g.generate(&mut x);
            x
        })
        .collect()
}

/// Leaf node: hash of the concatenated commitment publics.
fn ots_leaf(sk: &[u8], idx: u64, commitments: usize, hf: &dyn HashFunction) -> Vec<u8> {
    let mut publics = Vec::with_capacity(commitments * hf.size());
    for x in leaf_secrets(sk, idx, commitments, hf) {
        publics.extend_from_slice(&hf.hash(&x));
    }
    hf.hash(&publics)
}

/// Commutative node combine: smaller child first, so verification needs
/// no position bookkeeping.
fn combine(a: &[u8], b: &[u8], hf: &dyn HashFunction) -> Vec<u8> {
    let mut cat = Vec::with_capacity(a.len() + b.len());
    if a <= b {
        cat.extend_from_slice(a);
        cat.extend_from_slice(b);
    } else {
        cat.extend_from_slice(b);
        cat.extend_from_slice(a);
    }
    hf.hash(&cat)
}

/// Offset of relative level r nodes inside a subtree store.
fn level_offset(h: u32, r: u32) -> usize {
    // sum of 2^(h-k) for k < r
    (0..r).map(|k| 1usize << (h - k)).sum()
}

fn subtree_store_size(h: u32) -> usize {
    (1usize << (h + 1)) - 2
}

pub fn generate(
    h: u32,
    l: u32,
    hs: u32,
    tree_hash: &dyn HashFunction,
    rng: &mut dyn Prng,
) -> Result<(PubKey, PrivKey)> {
    if h == 0 || l == 0 || h * l > 24 {
        return Err(Error::BadInput("unusable tree shape"));
    }

    let mut sk = vec![0u8; SK_BYTES];
    rng.random_bytes(&mut sk);

    let total_height = h * l;
    let leaves = 1u64 << total_height;
    let commitments = commitment_count(hs as usize);

    let mut exist: Vec<Vec<Vec<u8>>> =
        vec![vec![Vec::new(); subtree_store_size(h)]; l as usize];

    // single pass over all leaves, folding with a stack; nodes that land
    // in the first subtree of their level get remembered
    let mut stack: Vec<(u32, u64, Vec<u8>)> = Vec::with_capacity(total_height as usize + 1);
    {
        let mut record = |tl: u32, gidx: u64, item: &[u8]| {
            if tl >= total_height {
                return;
            }
            let i = (tl / h) as usize;
            let r = tl % h;
            let span_nodes = 1u64 << (h - r);
            if gidx < span_nodes {
                exist[i][level_offset(h, r) + gidx as usize] = item.to_vec();
            }
        };

        for i in 0..leaves {
            let leaf = ots_leaf(&sk, i, commitments, tree_hash);
            record(0, i, &leaf);
            stack.push((0, i, leaf));

            while stack.len() >= 2 {
                let la = stack[stack.len() - 2].0;
                let lb = stack[stack.len() - 1].0;
                if la != lb {
                    break;
                }
                let (_, _, right) = stack.pop().unwrap();
                let (lv, pos, left) = stack.pop().unwrap();
                let node = combine(&left, &right, tree_hash);
                record(lv + 1, pos / 2, &node);
                stack.push((lv + 1, pos / 2, node));
            }
        }
    }

    let (_, _, check) = stack.pop().ok_or(Error::BadInput("empty tree"))?;

    let priv_key = PrivKey {
        sk,
        h,
        l,
        hs,
        sigs_used: 0,
        exist,
        desired: vec![vec![Vec::new(); subtree_store_size(h)]; l as usize - 1],
        desired_stack: vec![Vec::new(); l as usize - 1],
        desired_progress: vec![0; l as usize - 1],
    };

    Ok((
        PubKey {
            check: check.clone(),
            total_height,
            hs,
        },
        priv_key,
    ))
}

impl PrivKey {
    pub fn sigs_remaining(&self) -> u64 {
        (1u64 << (self.h * self.l)) - u64::from(self.sigs_used)
    }

    pub fn signature_size(&self, tree_hash: &dyn HashFunction) -> usize {
        (commitment_count(self.hs as usize) + (self.h * self.l) as usize) * tree_hash.size() * 8
    }

    /// Sign an hs-bit message hash. Mutates the traversal state; the new
    /// key state must be persisted before the signature is used.
    pub fn sign(&mut self, hash: &BitVec, tree_hash: &dyn HashFunction) -> Result<BitVec> {
        if hash.size() != self.hs as usize {
            return Err(Error::BadInput("wrong hash size"));
        }
        if self.sigs_remaining() == 0 {
            return Err(Error::SignaturesExhausted);
        }

        let commitments = commitment_count(self.hs as usize);
        let total_height = self.h * self.l;
        let leaf_idx = u64::from(self.sigs_used);

        let mut bits = hash.clone();
        add_zero_checksum(&mut bits);
        debug_assert_eq!(bits.size(), commitments);

        // reveal preimages for ones, commitments for zeros
        let mut sig_bytes = Vec::with_capacity(self.signature_size(tree_hash) / 8);
        let secrets = leaf_secrets(&self.sk, leaf_idx, commitments, tree_hash);
        for (c, x) in secrets.iter().enumerate() {
            if bits.get(c) {
                sig_bytes.extend_from_slice(x);
            } else {
                sig_bytes.extend_from_slice(&tree_hash.hash(x));
            }
        }

        // authentication path: sibling of the ancestor at every level
        for tl in 0..total_height {
            let i = (tl / self.h) as usize;
            let r = tl % self.h;
            let sibling = (leaf_idx >> tl) ^ 1;
            let local = (sibling & ((1u64 << (self.h - r)) - 1)) as usize;
            let node = &self.exist[i][level_offset(self.h, r) + local];
            if node.is_empty() {
                return Err(Error::Crypto("traversal state out of sync"));
            }
            sig_bytes.extend_from_slice(node);
        }

        self.advance_builders(tree_hash);
        self.sigs_used += 1;
        self.promote_finished_subtrees();

        Ok(BitVec::from_bytes(&sig_bytes, 0))
    }

    fn advance_builders(&mut self, tree_hash: &dyn HashFunction) {
        let commitments = commitment_count(self.hs as usize);
        let total_leaves = 1u64 << (self.h * self.l);

        for i in 0..self.desired.len() {
            let span_width = 1u64 << ((i as u32 + 1) * self.h);
            let target_start = (u64::from(self.sigs_used) / span_width + 1) * span_width;
            if target_start >= total_leaves {
                continue; // the last span of this level, nothing follows
            }

            for _ in 0..LEAVES_PER_SIG {
                let progress = u64::from(self.desired_progress[i]);
                if progress >= span_width {
                    break;
                }

                let leaf = ots_leaf(&self.sk, target_start + progress, commitments, tree_hash);
                self.record_desired(i, 0, progress, &leaf);
                self.desired_stack[i].push(TreeStkItem {
                    level: 0,
                    pos: progress as u32,
                    item: leaf,
                });

                loop {
                    let n = self.desired_stack[i].len();
                    if n < 2 || self.desired_stack[i][n - 2].level != self.desired_stack[i][n - 1].level
                    {
                        break;
                    }
                    let right = self.desired_stack[i].pop().unwrap();
                    let left = self.desired_stack[i].pop().unwrap();
                    let node = combine(&left.item, &right.item, tree_hash);
                    let level = left.level + 1;
                    let pos = left.pos / 2;
                    self.record_desired(i, level, u64::from(pos), &node);
                    self.desired_stack[i].push(TreeStkItem {
                        level,
                        pos,
                        item: node,
                    });
                }

                self.desired_progress[i] += 1;
            }
        }
    }

    fn record_desired(&mut self, i: usize, level: u32, pos: u64, item: &[u8]) {
        let base = i as u32 * self.h;
        if level < base || level >= base + self.h {
            return;
        }
        let r = level - base;
        self.desired[i][level_offset(self.h, r) + pos as usize] = item.to_vec();
    }

    fn promote_finished_subtrees(&mut self) {
        let total_leaves = 1u64 << (self.h * self.l);
        for i in 0..self.desired.len() {
            let span_width = 1u64 << ((i as u32 + 1) * self.h);
            let used = u64::from(self.sigs_used);
            if used % span_width == 0 && used < total_leaves {
                self.exist[i] = std::mem::replace(
                    &mut self.desired[i],
                    vec![Vec::new(); subtree_store_size(self.h)],
                );
                self.desired_stack[i].clear();
                self.desired_progress[i] = 0;
            }
        }
    }

    pub fn serialize(&self) -> Sencode {
        let subtree = |t: &Vec<Vec<u8>>| {
            Sencode::List(t.iter().map(|n| Sencode::bytes(n.clone())).collect())
        };

        Sencode::list(vec![
            Sencode::bytes(PRIV_IDENT),
            Sencode::bytes(self.sk.clone()),
            Sencode::Int(self.h),
            Sencode::Int(self.l),
            Sencode::Int(self.hs),
            Sencode::Int(self.sigs_used),
            Sencode::List(self.exist.iter().map(subtree).collect()),
            Sencode::List(self.desired.iter().map(subtree).collect()),
            Sencode::List(
                self.desired_stack
                    .iter()
                    .map(|stk| {
                        Sencode::List(
                            stk.iter()
                                .map(|it| {
                                    Sencode::list(vec![
                                        Sencode::Int(it.level),
                                        Sencode::Int(it.pos),
                                        Sencode::bytes(it.item.clone()),
                                    ])
                                })
                                .collect(),
                        )
                    })
                    .collect(),
            ),
            Sencode::List(
                self.desired_progress
                    .iter()
                    .map(|&p| Sencode::Int(p))
                    .collect(),
            ),
        ])
    }

    pub fn unserialize(s: &Sencode) -> Result<PrivKey> {
        let items = s.as_list_of(10)?;
        if items[0].as_bytes()? != PRIV_IDENT {
            return Err(Error::Malformed("wrong key type tag"));
        }

        let subtree = |s: &Sencode| -> Result<Vec<Vec<u8>>> {
            s.as_list()?
                .iter()
                .map(|n| Ok(n.as_bytes()?.to_vec()))
                .collect()
        };

        let exist = items[6]
            .as_list()?
            .iter()
            .map(subtree)
            .collect::<Result<Vec<_>>>()?;
        let desired = items[7]
            .as_list()?
            .iter()
            .map(subtree)
            .collect::<Result<Vec<_>>>()?;

        let mut desired_stack = Vec::new();
        for stk in items[8].as_list()? {
            let mut v = Vec::new();
            for it in stk.as_list()? {
                let f = it.as_list_of(3)?;
                v.push(TreeStkItem {
                    level: f[0].as_int()?,
                    pos: f[1].as_int()?,
                    item: f[2].as_bytes()?.to_vec(),
                });
            }
            desired_stack.push(v);
        }

        let desired_progress = items[9]
            .as_list()?
            .iter()
            .map(|i| i.as_int())
            .collect::<Result<Vec<_>>>()?;

        let k = PrivKey {
            sk: items[1].as_bytes()?.to_vec(),
            h: items[2].as_int()?,
            l: items[3].as_int()?,
            hs: items[4].as_int()?,
            sigs_used: items[5].as_int()?,
            exist,
            desired,
            desired_stack,
            desired_progress,
        };

        // shape sanity, the traversal math depends on it
        if k.h == 0
            || k.l == 0
            || k.h * k.l > 24
            || k.exist.len() != k.l as usize
            || k.desired.len() != k.l as usize - 1
            || k.desired_stack.len() != k.l as usize - 1
            || k.desired_progress.len() != k.l as usize - 1
            || k.exist.iter().any(|t| t.len() != subtree_store_size(k.h))
            || k.desired.iter().any(|t| t.len() != subtree_store_size(k.h))
        {
            return Err(Error::Malformed("inconsistent signature key"));
        }

        Ok(k)
    }
}

impl PubKey {
    pub fn hash_size_bits(&self) -> usize {
        self.hs as usize
    }

    pub fn verify(&self, sig: &BitVec, hash: &BitVec, tree_hash: &dyn HashFunction) -> Result<()> {
        let commitments = commitment_count(self.hs as usize);
        let th = tree_hash.size();
        let expected = (commitments + self.total_height as usize) * th * 8;
        if sig.size() != expected || hash.size() != self.hs as usize {
            return Err(Error::Crypto("verification failed"));
        }

        let mut bits = hash.clone();
        add_zero_checksum(&mut bits);

        let bytes = sig.to_bytes();

        // rebuild the commitment publics from the revealed halves
        let mut publics = Vec::with_capacity(commitments * th);
        for c in 0..commitments {
            let v = &bytes[c * th..(c + 1) * th];
            if bits.get(c) {
                publics.extend_from_slice(&tree_hash.hash(v));
            } else {
                publics.extend_from_slice(v);
            }
        }

        let mut node = tree_hash.hash(&publics);
        for p in 0..self.total_height as usize {
            let off = (commitments + p) * th;
            node = combine(&node, &bytes[off..off + th], tree_hash);
        }

        if node != self.check {
            return Err(Error::Crypto("verification failed"));
        }
        Ok(())
    }

    pub fn serialize(&self) -> Sencode {
        Sencode::list(vec![
            Sencode::bytes(PUB_IDENT),
            Sencode::Int(self.total_height),
            Sencode::Int(self.hs),
            Sencode::bytes(self.check.clone()),
        ])
    }

    pub fn unserialize(s: &Sencode) -> Result<PubKey> {
        let items = s.as_list_of(4)?;
        if items[0].as_bytes()? != PUB_IDENT {
            return Err(Error::Malformed("wrong key type tag"));
        }
        Ok(PubKey {
            total_height: items[1].as_int()?,
            hs: items[2].as_int()?,
            check: items[3].as_bytes()?.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::CubeHash;
    use crate::rng::TestRng;

    fn hash_of(msg: &[u8], hs_bits: usize) -> BitVec {
        let hf = CubeHash::new(hs_bits / 8);
        BitVec::from_bytes(&hf.hash(msg), hs_bits)
    }

    #[test]
    fn sign_verify_entire_tree() {
        let th = CubeHash::new(16);
        let mut rng = TestRng::new(90);
        let (pub_key, mut priv_key) = generate(2, 2, 128, &th, &mut rng).unwrap();

        assert_eq!(priv_key.sigs_remaining(), 16);

        let mut sigs = Vec::new();
        for i in 0..16u32 {
            let hash = hash_of(format!("message {i}").as_bytes(), 128);
            let before = priv_key.sigs_used;
            let sig = priv_key.sign(&hash, &th).unwrap();
            assert_eq!(priv_key.sigs_used, before + 1);
            pub_key.verify(&sig, &hash, &th).unwrap();
            sigs.push((hash, sig));
        }

        // all signatures stay distinct and valid
        for (i, (hash, sig)) in sigs.iter().enumerate() {
            pub_key.verify(sig, hash, &th).unwrap();
            for (j, (_, other)) in sigs.iter().enumerate() {
                if i != j {
                    assert_ne!(sig, other);
                }
            }
        }

        // the 17th signature is refused
        let hash = hash_of(b"one too many", 128);
        assert!(matches!(
            priv_key.sign(&hash, &th),
            Err(Error::SignaturesExhausted)
        ));
    }

    #[test]
    fn wrong_message_fails_verification() {
        let th = CubeHash::new(16);
        let mut rng = TestRng::new(91);
        let (pub_key, mut priv_key) = generate(2, 2, 128, &th, &mut rng).unwrap();

        let hash = hash_of(b"signed", 128);
        let sig = priv_key.sign(&hash, &th).unwrap();

        let other = hash_of(b"not signed", 128);
        assert!(pub_key.verify(&sig, &other, &th).is_err());

        // bit flip in the signature fails too
        let mut broken = sig.clone();
        broken.flip(3);
        assert!(pub_key.verify(&broken, &hash, &th).is_err());
    }

    #[test]
    fn state_survives_serialization() {
        let th = CubeHash::new(16);
        let mut rng = TestRng::new(92);
        let (pub_key, mut priv_key) = generate(2, 3, 128, &th, &mut rng).unwrap();

        let mut last_used = 0;
        for i in 0..20u32 {
            // reload the key every round, as the keyring does
            let ser = priv_key.serialize();
            priv_key = PrivKey::unserialize(&ser).unwrap();
            assert_eq!(priv_key.sigs_used, last_used);

            let hash = hash_of(format!("m{i}").as_bytes(), 128);
            let sig = priv_key.sign(&hash, &th).unwrap();
            pub_key.verify(&sig, &hash, &th).unwrap();

            assert!(priv_key.sigs_used > last_used);
            last_used = priv_key.sigs_used;
        }
    }

    #[test]
    fn checksum_protects_zero_count() {
        let mut v = BitVec::with_size(8);
        v.set(0, true);
        v.set(5, true);
        add_zero_checksum(&mut v);
        assert_eq!(v.size(), 8 + 4);
        // 6 zeros = 0b0110
        assert!(!v.get(8));
        assert!(v.get(9));
        assert!(v.get(10));
        assert!(!v.get(11));
    }
}
