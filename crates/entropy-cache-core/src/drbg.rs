//! Seed amplification.
//!
//! The cache stretches a short true-random seed into a full buffer with an
//! [`Amplifier`]. The default is [`HashDrbg`], the SP 800-90A Hash_DRBG over
//! SHA-512.

use sha2::{Digest, Sha512};
use zeroize::Zeroize;

use crate::error::DrbgError;

/// Deterministic random-bit generator boundary.
///
/// `seed` fully re-initializes the state. Each `generate` call advances it, so
/// two calls under the same seeding never return overlapping output.
pub trait Amplifier: Send {
    /// (Re)initialize internal state from `seed`.
    fn seed(&mut self, seed: &[u8]) -> Result<(), DrbgError>;

    /// Fill `out` with pseudorandom bytes.
    fn generate(&mut self, out: &mut [u8]) -> Result<(), DrbgError>;

    /// Known-answer-free health check run once at init: seed with a fixed
    /// value and require two consecutive blocks to differ.
    fn self_test(&mut self) -> Result<(), DrbgError> {
        self.seed(b"entropy-cache amplifier self-test seed")?;
        let mut a = [0u8; 64];
        let mut b = [0u8; 64];
        self.generate(&mut a)?;
        self.generate(&mut b)?;
        if a == b {
            return Err(DrbgError::SelfTestFailed);
        }
        Ok(())
    }
}

impl<A: Amplifier + ?Sized> Amplifier for Box<A> {
    fn seed(&mut self, seed: &[u8]) -> Result<(), DrbgError> {
        (**self).seed(seed)
    }
    fn generate(&mut self, out: &mut [u8]) -> Result<(), DrbgError> {
        (**self).generate(out)
    }
    fn self_test(&mut self) -> Result<(), DrbgError> {
        (**self).self_test()
    }
}

/// seedlen for SHA-512 (SP 800-90A Table 2).
const SEED_LEN: usize = 111;

/// SHA-512 digest size.
const OUT_LEN: usize = 64;

/// Largest single generate request.
pub const MAX_REQUEST: usize = 1 << 16;

/// Maximum number of generate requests before reseed is required.
const RESEED_INTERVAL: u64 = 1 << 48;

/// Mixed into every seeding so outputs are domain-separated from other
/// Hash_DRBG users of the same seed.
const PERSONALIZATION: &[u8] = b"entropy-cache/v1";

/// Hash_DRBG over SHA-512.
pub struct HashDrbg {
    /// State value V.
    v: [u8; SEED_LEN],
    /// Constant C.
    c: [u8; SEED_LEN],
    /// Generate requests since last seeding; 0 means unseeded.
    reseed_counter: u64,
}

impl Drop for HashDrbg {
    fn drop(&mut self) {
        self.v.zeroize();
        self.c.zeroize();
    }
}

impl Default for HashDrbg {
    fn default() -> Self {
        Self::new()
    }
}

/// Hash_df (SP 800-90A §10.3.1) over the concatenation of `parts`.
fn hash_df(parts: &[&[u8]]) -> [u8; SEED_LEN] {
    let bits = (SEED_LEN as u32 * 8).to_be_bytes();
    let mut out = [0u8; SEED_LEN];
    for (i, chunk) in out.chunks_mut(OUT_LEN).enumerate() {
        let mut h = Sha512::new();
        h.update([i as u8 + 1]);
        h.update(bits);
        for part in parts {
            h.update(part);
        }
        let digest = h.finalize();
        chunk.copy_from_slice(&digest[..chunk.len()]);
    }
    out
}

/// Big-endian modular addition: v = (v + addend) mod 2^(8*len).
/// `addend` is right-aligned against `v`.
fn v_add(v: &mut [u8], addend: &[u8]) {
    let offset = v.len() - addend.len();
    let mut carry: u16 = 0;
    for i in (0..v.len()).rev() {
        let a = if i >= offset { addend[i - offset] as u16 } else { 0 };
        let sum = v[i] as u16 + a + carry;
        v[i] = sum as u8;
        carry = sum >> 8;
    }
}

impl HashDrbg {
    /// Create an unseeded generator. `generate` fails until `seed` is called.
    pub fn new() -> Self {
        Self {
            v: [0u8; SEED_LEN],
            c: [0u8; SEED_LEN],
            reseed_counter: 0,
        }
    }

    /// Create and seed in one step.
    pub fn with_seed(seed: &[u8]) -> Result<Self, DrbgError> {
        let mut drbg = Self::new();
        drbg.seed(seed)?;
        Ok(drbg)
    }

    /// Whether `seed` has been called.
    pub fn is_seeded(&self) -> bool {
        self.reseed_counter > 0
    }

    /// Hashgen (SP 800-90A §10.1.1.4): hash successive values of V into `out`.
    fn hashgen(&self, out: &mut [u8]) {
        let mut data = self.v;
        for chunk in out.chunks_mut(OUT_LEN) {
            let digest = Sha512::digest(data);
            chunk.copy_from_slice(&digest[..chunk.len()]);
            v_add(&mut data, &[1]);
        }
        data.zeroize();
    }
}

impl Amplifier for HashDrbg {
    fn seed(&mut self, seed: &[u8]) -> Result<(), DrbgError> {
        if seed.is_empty() {
            return Err(DrbgError::EmptySeed);
        }
        // V = Hash_df(seed || personalization)
        self.v = hash_df(&[seed, PERSONALIZATION]);
        // C = Hash_df(0x00 || V)
        self.c = hash_df(&[&[0x00], &self.v]);
        self.reseed_counter = 1;
        Ok(())
    }

    fn generate(&mut self, out: &mut [u8]) -> Result<(), DrbgError> {
        if !self.is_seeded() {
            return Err(DrbgError::Unseeded);
        }
        if self.reseed_counter > RESEED_INTERVAL {
            return Err(DrbgError::ReseedRequired);
        }
        if out.len() > MAX_REQUEST {
            return Err(DrbgError::RequestTooLarge {
                requested: out.len(),
                limit: MAX_REQUEST,
            });
        }

        self.hashgen(out);

        // H = Hash(0x03 || V)
        let mut h = Sha512::new();
        h.update([0x03]);
        h.update(self.v);
        let h = h.finalize();

        // V = (V + H + C + reseed_counter) mod 2^seedlen
        let c = self.c;
        v_add(&mut self.v, &h);
        v_add(&mut self.v, &c);
        v_add(&mut self.v, &self.reseed_counter.to_be_bytes());
        self.reseed_counter += 1;
        Ok(())
    }
}
