//! Random meeting codes and participant ids.
//!
//! One generator per server, seeded once from OS entropy. Uniqueness is probabilistic; the
//! registry rejects a colliding code and the caller draws again.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;

pub const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
pub const DEFAULT_CODE_LEN: usize = 8;
pub const DEFAULT_PARTICIPANT_ID_LEN: usize = 16;

pub struct IdGenerator {
    rng: Mutex<StdRng>,
    code_len: usize,
    participant_id_len: usize,
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_CODE_LEN, DEFAULT_PARTICIPANT_ID_LEN)
    }
}

impl IdGenerator {
    pub fn new(code_len: usize, participant_id_len: usize) -> Self {
        Self::with_rng(StdRng::from_entropy(), code_len, participant_id_len)
    }

    /// Deterministic generator (tests).
    pub fn seeded(seed: u64, code_len: usize, participant_id_len: usize) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed), code_len, participant_id_len)
    }

    fn with_rng(rng: StdRng, code_len: usize, participant_id_len: usize) -> Self {
        Self {
            rng: Mutex::new(rng),
            code_len: code_len.max(1),
            participant_id_len: participant_id_len.max(1),
        }
    }

    pub fn random_string(&self, len: usize) -> String {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        (0..len)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect()
    }

    pub fn code(&self) -> String {
        self.random_string(self.code_len)
    }

    pub fn participant_id(&self) -> String {
        self.random_string(self.participant_id_len)
    }
}
