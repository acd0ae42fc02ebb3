//! Session-Seeded Deterministic Generator
//!
//! Every spoofed value in a session is derived from one seed. The generator is a
//! xorshift-128 stream whose state is built from the seed with a rolling string
//! hash and a short LCG chain, then warmed up before first use.
//!
//! Sub-generators are derived by label: `derive("param-MAX_TEXTURE_SIZE")`
//! seeds a fresh generator from `"{seed}-param-MAX_TEXTURE_SIZE"`. Derivation
//! never touches the parent's state, so two interceptors asking for the same
//! label always see the same stream without sharing a mutable generator.
//!
//! # Example
//!
//! ```rust
//! use webgl_shield::stealth::prng::{Seed, SessionRng};
//!
//! let rng = SessionRng::from_seed(Seed::from("test-1"));
//! let mut a = rng.derive("param-MAX_TEXTURE_SIZE");
//! let mut b = rng.derive("param-MAX_TEXTURE_SIZE");
//! assert_eq!(a.next_u32(), b.next_u32());
//! ```

use chrono::Utc;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of discarded steps after state initialization.
const WARM_UP_ROUNDS: usize = 12;

/// LCG multiplier used to spread the hashed seed across the state words.
const LCG_MULTIPLIER: u32 = 69069;

/// A session seed: either free text or an integer.
///
/// Integers seed the state directly; text is hashed first. Derived generators
/// always carry text seeds of the form `"{parent}-{label}"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Seed {
    /// Integer seed, used modulo 2^32.
    Number(i64),
    /// Text seed, hashed to 32 bits.
    Text(String),
}

impl Seed {
    /// Generates a fresh seed from wall-clock time mixed with entropy.
    pub fn generate() -> Self {
        let now = Utc::now().timestamp_millis() as i32;
        let entropy = rand::random::<u32>() as i32;
        Seed::Number(i64::from(now ^ entropy))
    }

    /// Reduces the seed to the 32-bit word the state is built from.
    fn to_word(&self) -> u32 {
        match self {
            Seed::Number(n) => *n as u32,
            Seed::Text(text) => {
                let mut hasher = SeedHasher::new();
                hasher.write_str(text);
                hasher.finish()
            }
        }
    }
}

impl fmt::Display for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Seed::Number(n) => write!(f, "{}", n),
            Seed::Text(text) => f.write_str(text),
        }
    }
}

impl From<&str> for Seed {
    fn from(value: &str) -> Self {
        Seed::Text(value.to_string())
    }
}

impl From<String> for Seed {
    fn from(value: String) -> Self {
        Seed::Text(value)
    }
}

impl From<i64> for Seed {
    fn from(value: i64) -> Self {
        Seed::Number(value)
    }
}

impl std::str::FromStr for Seed {
    type Err = std::convert::Infallible;

    /// Integers parse as numeric seeds, everything else stays text.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.parse::<i64>() {
            Ok(n) => Seed::Number(n),
            Err(_) => Seed::Text(s.to_string()),
        })
    }
}

/// Polynomial rolling hash (base 31) over UTF-16 code units, truncated to
/// 32 bits at every step.
///
/// The hasher is `Copy`, so a common prefix can be hashed once and extended
/// for many different suffixes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedHasher(u32);

impl SeedHasher {
    /// Creates a hasher with an empty input.
    pub fn new() -> Self {
        Self(0)
    }

    /// Feeds a string into the hash.
    pub fn write_str(&mut self, s: &str) {
        for unit in s.encode_utf16() {
            self.0 = self.0.wrapping_mul(31).wrapping_add(u32::from(unit));
        }
    }

    /// Returns the hash of everything written so far.
    pub fn finish(&self) -> u32 {
        self.0
    }
}

/// The raw xorshift-128 stream without seed bookkeeping.
///
/// Used directly on hot paths (per-pixel noise) where only the output
/// sequence matters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoiseStream {
    state: [u32; 4],
}

impl NoiseStream {
    /// Builds and warms up the state from a 32-bit seed word.
    pub fn from_word(word: u32) -> Self {
        let s0 = word;
        let s1 = s0.wrapping_mul(LCG_MULTIPLIER).wrapping_add(1);
        let s2 = s1.wrapping_mul(LCG_MULTIPLIER).wrapping_add(1);
        let s3 = s2.wrapping_mul(LCG_MULTIPLIER).wrapping_add(1);

        let mut stream = Self {
            state: [s0, s1, s2, s3],
        };
        for _ in 0..WARM_UP_ROUNDS {
            stream.next_u32();
        }
        stream
    }

    /// Advances the state and returns the new head word.
    #[inline]
    pub fn next_u32(&mut self) -> u32 {
        let mut t = self.state[3];
        let s = self.state[0];

        self.state[3] = self.state[2];
        self.state[2] = self.state[1];
        self.state[1] = s;

        t ^= t << 11;
        t ^= t >> 8;

        self.state[0] = t ^ s ^ (s >> 19);
        self.state[0]
    }

    /// Uniform float in `[0, 1)`.
    #[inline]
    pub fn random(&mut self) -> f64 {
        f64::from(self.next_u32()) / 4_294_967_296.0
    }

    /// Uniform integer in `[min, max]`.
    #[inline]
    pub fn random_int(&mut self, min: i64, max: i64) -> i64 {
        (self.random() * (max - min + 1) as f64).floor() as i64 + min
    }
}

/// Seeded session generator with label-based derivation.
#[derive(Debug, Clone)]
pub struct SessionRng {
    seed: Seed,
    stream: NoiseStream,
}

impl SessionRng {
    /// Creates a generator, generating a seed when none is supplied.
    pub fn new(seed: Option<Seed>) -> Self {
        Self::from_seed(seed.unwrap_or_else(Seed::generate))
    }

    /// Creates a generator from an explicit seed.
    pub fn from_seed(seed: Seed) -> Self {
        let stream = NoiseStream::from_word(seed.to_word());
        Self { seed, stream }
    }

    /// The seed this generator was built from.
    pub fn seed(&self) -> &Seed {
        &self.seed
    }

    /// Next raw 32-bit output.
    pub fn next_u32(&mut self) -> u32 {
        self.stream.next_u32()
    }

    /// Uniform float in `[0, 1)`.
    pub fn random(&mut self) -> f64 {
        self.stream.random()
    }

    /// Uniform integer in `[min, max]` (both inclusive).
    pub fn random_int(&mut self, min: i64, max: i64) -> i64 {
        self.stream.random_int(min, max)
    }

    /// Uniform float in `[min, max)`.
    pub fn random_float(&mut self, min: f64, max: f64) -> f64 {
        self.random() * (max - min) + min
    }

    /// Picks one element, or `None` for an empty slice.
    pub fn random_choice<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        if items.is_empty() {
            return None;
        }
        let index = self.random_int(0, items.len() as i64 - 1) as usize;
        items.get(index)
    }

    /// Fisher-Yates shuffle in place.
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        if items.len() <= 1 {
            return;
        }
        for i in (1..items.len()).rev() {
            let j = self.random_int(0, i as i64) as usize;
            items.swap(i, j);
        }
    }

    /// Derives an independent generator seeded from `"{seed}-{label}"`.
    ///
    /// Pure in `(seed, label)`: the parent's position in its own stream does
    /// not matter.
    pub fn derive(&self, label: &str) -> SessionRng {
        SessionRng::from_seed(Seed::Text(format!("{}-{}", self.seed, label)))
    }

    /// Returns a keyer that produces the streams of
    /// `derive("{key}{tail}")` for many keys without rebuilding the shared
    /// prefix and tail each time.
    pub fn keyer(&self, tail: &str) -> LabelKeyer {
        LabelKeyer::new(&self.seed, tail)
    }
}

impl RngCore for SessionRng {
    fn next_u32(&mut self) -> u32 {
        self.stream.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        let high = u64::from(self.stream.next_u32());
        let low = u64::from(self.stream.next_u32());
        (high << 32) | low
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(4) {
            let bytes = self.stream.next_u32().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

/// Fast equivalent of `rng.derive(&format!("{key}{tail}"))` for a fixed tail.
///
/// The rolling hash of `prefix + key + tail` equals
/// `hash(prefix + key) * 31^len(tail) + hash(tail)` modulo 2^32, so both the
/// prefix state and the tail contribution are computed once.
#[derive(Debug, Clone)]
pub struct LabelKeyer {
    prefix: SeedHasher,
    tail_hash: u32,
    tail_power: u32,
}

impl LabelKeyer {
    fn new(seed: &Seed, tail: &str) -> Self {
        let mut prefix = SeedHasher::new();
        prefix.write_str(&seed.to_string());
        prefix.write_str("-");

        let mut tail_hasher = SeedHasher::new();
        tail_hasher.write_str(tail);

        let tail_power = tail
            .encode_utf16()
            .fold(1u32, |power, _| power.wrapping_mul(31));

        Self {
            prefix,
            tail_hash: tail_hasher.finish(),
            tail_power,
        }
    }

    /// Stream for an arbitrary key.
    pub fn stream(&self, key: &str) -> NoiseStream {
        let mut hasher = self.prefix;
        hasher.write_str(key);
        NoiseStream::from_word(self.combine(hasher))
    }

    /// Stream for a pixel coordinate key `"{x},{y}"` without allocating.
    pub fn pixel_stream(&self, x: i64, y: i64) -> NoiseStream {
        let mut hasher = self.prefix;
        write_decimal(&mut hasher, x);
        hasher.write_str(",");
        write_decimal(&mut hasher, y);
        NoiseStream::from_word(self.combine(hasher))
    }

    fn combine(&self, hasher: SeedHasher) -> u32 {
        hasher
            .finish()
            .wrapping_mul(self.tail_power)
            .wrapping_add(self.tail_hash)
    }
}

fn write_decimal(hasher: &mut SeedHasher, value: i64) {
    let mut buf = [0u8; 20];
    let mut magnitude = value.unsigned_abs();
    let mut pos = buf.len();
    loop {
        pos -= 1;
        buf[pos] = b'0' + (magnitude % 10) as u8;
        magnitude /= 10;
        if magnitude == 0 {
            break;
        }
    }
    if value < 0 {
        hasher.write_str("-");
    }
    for digit in &buf[pos..] {
        hasher.0 = hasher.0.wrapping_mul(31).wrapping_add(u32::from(*digit));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_sequence() {
        let mut a = SessionRng::from_seed(Seed::from("session-a"));
        let mut b = SessionRng::from_seed(Seed::from("session-a"));
        for _ in 0..64 {
            assert_eq!(a.next_u32(), b.next_u32());
        }
    }

    #[test]
    fn test_string_hash_is_base_31() {
        let mut hasher = SeedHasher::new();
        hasher.write_str("ab");
        assert_eq!(hasher.finish(), 97 * 31 + 98);
    }

    #[test]
    fn test_numeric_seed_uses_low_32_bits() {
        let mut a = SessionRng::from_seed(Seed::Number(-1));
        let mut b = SessionRng::from_seed(Seed::Number(0xFFFF_FFFF));
        assert_eq!(a.next_u32(), b.next_u32());
    }

    #[test]
    fn test_numeric_and_text_seeds_display() {
        assert_eq!(Seed::Number(42).to_string(), "42");
        assert_eq!(Seed::from("abc").to_string(), "abc");
        assert_eq!("17".parse::<Seed>().unwrap(), Seed::Number(17));
        assert_eq!("x17".parse::<Seed>().unwrap(), Seed::from("x17"));
    }

    #[test]
    fn test_derive_is_pure() {
        let mut parent = SessionRng::from_seed(Seed::from("parent"));
        let mut first = parent.derive("label");
        for _ in 0..10 {
            parent.next_u32();
        }
        let mut second = parent.derive("label");
        for _ in 0..32 {
            assert_eq!(first.next_u32(), second.next_u32());
        }
        assert_eq!(first.seed(), &Seed::from("parent-label"));
    }

    #[test]
    fn test_distinct_labels_diverge() {
        let parent = SessionRng::from_seed(Seed::from("parent"));
        let a: Vec<u32> = {
            let mut rng = parent.derive("k1");
            (0..16).map(|_| rng.next_u32()).collect()
        };
        let b: Vec<u32> = {
            let mut rng = parent.derive("k2");
            (0..16).map(|_| rng.next_u32()).collect()
        };
        assert_ne!(a, b);
    }

    #[test]
    fn test_ranges() {
        let mut rng = SessionRng::from_seed(Seed::Number(1234));
        for _ in 0..1000 {
            let f = rng.random();
            assert!((0.0..1.0).contains(&f));
            let i = rng.random_int(-3, 3);
            assert!((-3..=3).contains(&i));
            let g = rng.random_float(2.0, 5.0);
            assert!((2.0..5.0).contains(&g));
        }
    }

    #[test]
    fn test_random_choice_and_shuffle() {
        let mut rng = SessionRng::from_seed(Seed::from("choice"));
        let empty: [u8; 0] = [];
        assert!(rng.random_choice(&empty).is_none());

        let items = [1, 2, 3, 4, 5];
        assert!(items.contains(rng.random_choice(&items).unwrap()));

        let mut shuffled = items;
        rng.shuffle(&mut shuffled);
        let mut sorted = shuffled;
        sorted.sort();
        assert_eq!(sorted, items);
    }

    #[test]
    fn test_keyer_matches_derive() {
        let rng = SessionRng::from_seed(Seed::from("keyed"));
        let keyer = rng.keyer("-tail");

        let mut expected = rng.derive("12,-7-tail");
        let mut actual = keyer.pixel_stream(12, -7);
        for _ in 0..8 {
            assert_eq!(expected.next_u32(), actual.next_u32());
        }

        let mut expected = rng.derive("name-tail");
        let mut actual = keyer.stream("name");
        assert_eq!(expected.next_u32(), actual.next_u32());
    }

    #[test]
    fn test_generated_seeds_differ() {
        let seeds: Vec<Seed> = (0..8).map(|_| Seed::generate()).collect();
        let distinct: std::collections::HashSet<_> = seeds.iter().collect();
        assert!(distinct.len() > 1);
    }
}
