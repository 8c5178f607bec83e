//! ChaCha20, hand-rolled per the custom-reimplementation redesign note:
//! both the original (64-bit nonce, 64-bit counter) and IETF (96-bit
//! nonce, 32-bit counter) variants share the same quarter-round core and
//! differ only in how the 16-word state is initialized, so one block
//! function serves both rather than pulling in a crate per variant.

const CONSTANTS: [u32; 4] = [0x6170_7865, 0x3320_646e, 0x7962_2d32, 0x6b20_6574];

#[inline]
fn quarter_round(state: &mut [u32; 16], a: usize, b: usize, c: usize, d: usize) {
    state[a] = state[a].wrapping_add(state[b]);
    state[d] ^= state[a];
    state[d] = state[d].rotate_left(16);

    state[c] = state[c].wrapping_add(state[d]);
    state[b] ^= state[c];
    state[b] = state[b].rotate_left(12);

    state[a] = state[a].wrapping_add(state[b]);
    state[d] ^= state[a];
    state[d] = state[d].rotate_left(8);

    state[c] = state[c].wrapping_add(state[d]);
    state[b] ^= state[c];
    state[b] = state[b].rotate_left(7);
}

fn block(key: &[u32; 8], counter: u64, nonce_words: &[u32]) -> [u8; 64] {
    let mut state = [0u32; 16];
    state[0..4].copy_from_slice(&CONSTANTS);
    state[4..12].copy_from_slice(key);

    if nonce_words.len() == 3 {
        // IETF: 32-bit counter + 96-bit nonce.
        state[12] = counter as u32;
        state[13..16].copy_from_slice(nonce_words);
    } else {
        // Original djb layout: 64-bit counter + 64-bit nonce.
        state[12] = counter as u32;
        state[13] = (counter >> 32) as u32;
        state[14..16].copy_from_slice(nonce_words);
    }

    let mut working = state;
    for _ in 0..10 {
        quarter_round(&mut working, 0, 4, 8, 12);
        quarter_round(&mut working, 1, 5, 9, 13);
        quarter_round(&mut working, 2, 6, 10, 14);
        quarter_round(&mut working, 3, 7, 11, 15);
        quarter_round(&mut working, 0, 5, 10, 15);
        quarter_round(&mut working, 1, 6, 11, 12);
        quarter_round(&mut working, 2, 7, 8, 13);
        quarter_round(&mut working, 3, 4, 9, 14);
    }

    let mut out = [0u8; 64];
    for i in 0..16 {
        let word = working[i].wrapping_add(state[i]);
        out[i * 4..i * 4 + 4].copy_from_slice(&word.to_le_bytes());
    }
    out
}

fn words_from_le_bytes(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes(c.try_into().unwrap()))
        .collect()
}

/// A ChaCha20 keystream generator. `nonce` is 8 bytes for the original
/// variant, 12 bytes for IETF.
pub struct ChaCha20 {
    key: [u32; 8],
    nonce_words: Vec<u32>,
    counter: u64,
    keystream: [u8; 64],
    used: usize,
}

impl ChaCha20 {
    pub fn new(key: &[u8], nonce: &[u8]) -> Self {
        let key_words: [u32; 8] = words_from_le_bytes(key).try_into().expect("32-byte key");
        ChaCha20 {
            key: key_words,
            nonce_words: words_from_le_bytes(nonce),
            counter: 0,
            keystream: [0u8; 64],
            used: 64,
        }
    }

    pub fn apply(&mut self, data: &mut [u8]) {
        for byte in data.iter_mut() {
            if self.used == 64 {
                self.keystream = block(&self.key, self.counter, &self.nonce_words);
                self.counter = self.counter.wrapping_add(1);
                self.used = 0;
            }
            *byte ^= self.keystream[self.used];
            self.used += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ietf_test_vector_first_bytes() {
        // RFC 8439 §2.3.2 test vector: key = 0..31, nonce = 000000090000004a00000000,
        // counter = 1. First keystream bytes begin 22 4f 51 f3 ...
        let key: Vec<u8> = (0u8..32).collect();
        let nonce = [0x00, 0x00, 0x00, 0x09, 0x00, 0x00, 0x00, 0x4a, 0x00, 0x00, 0x00, 0x00];
        let key_words: [u32; 8] = words_from_le_bytes(&key).try_into().unwrap();
        let nonce_words = words_from_le_bytes(&nonce);
        let ks = block(&key_words, 1, &nonce_words);
        assert_eq!(&ks[0..4], &[0x22, 0x4f, 0x51, 0xf3]);
    }

    #[test]
    fn spec_literal_chacha20_ietf_vector() {
        // Literal scenario: all-zero 32-byte key, all-zero 12-byte nonce,
        // counter 0 -> keystream begins 76 b8 e0 ad a0 f1 3d 90 40.
        let key = [0u8; 32];
        let nonce = [0u8; 12];
        let mut cipher = ChaCha20::new(&key, &nonce);
        let mut data = [0u8; 9];
        cipher.apply(&mut data);
        assert_eq!(data, [0x76, 0xb8, 0xe0, 0xad, 0xa0, 0xf1, 0x3d, 0x90, 0x40]);
    }

    #[test]
    fn is_self_inverse() {
        let key = [7u8; 32];
        let nonce = [9u8; 8];
        let plain = b"shadowsocks over chacha20".to_vec();

        let mut enc = ChaCha20::new(&key, &nonce);
        let mut ct = plain.clone();
        enc.apply(&mut ct);

        let mut dec = ChaCha20::new(&key, &nonce);
        let mut pt = ct.clone();
        dec.apply(&mut pt);
        assert_eq!(pt, plain);
    }
}
