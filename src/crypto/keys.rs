//! Key derivation (C4): `EVP_BytesToKey`-style iterative MD5 key stretching
//! for stream ciphers, and HKDF-SHA1 per-session subkey derivation for AEAD.

use hkdf::Hkdf;
use md5::{Digest, Md5};
use sha1::Sha1;

use crate::{Error, Result};

const SUBKEY_INFO: &[u8] = b"ss-subkey";

/// Derive a `key_len`-byte key from a password the same way OpenSSL's
/// `EVP_BytesToKey` does with MD5 and no salt: repeatedly hash
/// `prev || password` until there's enough key material.
pub fn evp_bytes_to_key(password: &[u8], key_len: usize) -> Vec<u8> {
    let mut key = Vec::with_capacity(key_len + Md5::output_size());
    let mut prev: Vec<u8> = Vec::new();

    while key.len() < key_len {
        let mut hasher = Md5::new();
        hasher.update(&prev);
        hasher.update(password);
        let digest = hasher.finalize();
        prev = digest.to_vec();
        key.extend_from_slice(&prev);
    }

    key.truncate(key_len);
    key
}

/// Derive a per-session AEAD subkey from the master key and a random salt
/// via `HKDF-SHA1(master_key, salt, "ss-subkey", key_len)`.
pub fn derive_subkey(master_key: &[u8], salt: &[u8], key_len: usize) -> Result<Vec<u8>> {
    let hk = Hkdf::<Sha1>::new(Some(salt), master_key);
    let mut subkey = vec![0u8; key_len];
    hk.expand(SUBKEY_INFO, &mut subkey)
        .map_err(|_| Error::internal("HKDF output length invalid for this cipher"))?;
    Ok(subkey)
}
