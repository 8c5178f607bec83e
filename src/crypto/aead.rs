//! AEAD engine (C3, AEAD half): seal/open primitives for the GCM and
//! ChaCha20-IETF-Poly1305 methods. Chunk framing, nonce bookkeeping across
//! chunks, and subkey derivation live in [`crate::crypto::encryptor`]; this
//! module only wraps a single cipher instance's seal/open calls.

use aead::{AeadInPlace, KeyInit};
use aes_gcm::{Aes128Gcm, Aes256Gcm, AesGcm};
use chacha20poly1305::ChaCha20Poly1305;
use cipher::consts::U12;

use crate::crypto::kind::CipherKind;
use crate::{Error, Result};

type Aes192Gcm = AesGcm<aes::Aes192, U12>;

/// A keyed AEAD instance for one direction of one connection.
pub enum AeadEngine {
    Aes128Gcm(Aes128Gcm),
    Aes192Gcm(Aes192Gcm),
    Aes256Gcm(Aes256Gcm),
    ChaCha20IetfPoly1305(ChaCha20Poly1305),
}

impl AeadEngine {
    pub fn new(kind: CipherKind, key: &[u8]) -> Result<Self> {
        use CipherKind::*;
        let bad_key = || Error::internal(format!("bad AEAD key length for {kind:?}"));
        Ok(match kind {
            Aes128Gcm => AeadEngine::Aes128Gcm(
                aes_gcm::Aes128Gcm::new_from_slice(key).map_err(|_| bad_key())?,
            ),
            Aes192Gcm => {
                AeadEngine::Aes192Gcm(Aes192Gcm::new_from_slice(key).map_err(|_| bad_key())?)
            }
            Aes256Gcm => AeadEngine::Aes256Gcm(
                aes_gcm::Aes256Gcm::new_from_slice(key).map_err(|_| bad_key())?,
            ),
            ChaCha20IetfPoly1305 => AeadEngine::ChaCha20IetfPoly1305(
                ChaCha20Poly1305::new_from_slice(key).map_err(|_| bad_key())?,
            ),
            other => return Err(Error::internal(format!("{other:?} is not an AEAD method"))),
        })
    }

    /// Tag length in bytes — always 16 for the methods we support.
    pub const TAG_LEN: usize = 16;

    /// Encrypt `buf` in place and append nothing; returns the detached tag.
    /// `nonce` is the 12-byte little-endian counter from
    /// [`crate::crypto::encryptor`].
    pub fn seal(&self, nonce: &[u8; 12], buf: &mut Vec<u8>) -> Result<()> {
        let tag = match self {
            AeadEngine::Aes128Gcm(c) => c.encrypt_in_place_detached(nonce.into(), b"", buf),
            AeadEngine::Aes192Gcm(c) => c.encrypt_in_place_detached(nonce.into(), b"", buf),
            AeadEngine::Aes256Gcm(c) => c.encrypt_in_place_detached(nonce.into(), b"", buf),
            AeadEngine::ChaCha20IetfPoly1305(c) => {
                c.encrypt_in_place_detached(nonce.into(), b"", buf)
            }
        }
        .map_err(|_| Error::decrypt("AEAD seal failed"))?;
        buf.extend_from_slice(&tag);
        Ok(())
    }

    /// Decrypt `buf` in place given a detached `tag`; fails closed on
    /// authentication failure (a bad tag never
    /// yields partial plaintext).
    pub fn open(&self, nonce: &[u8; 12], buf: &mut [u8], tag: &[u8]) -> Result<()> {
        if tag.len() != Self::TAG_LEN {
            return Err(Error::decrypt("wrong AEAD tag length"));
        }
        let tag = aead::generic_array::GenericArray::from_slice(tag);
        match self {
            AeadEngine::Aes128Gcm(c) => c.decrypt_in_place_detached(nonce.into(), b"", buf, tag),
            AeadEngine::Aes192Gcm(c) => c.decrypt_in_place_detached(nonce.into(), b"", buf, tag),
            AeadEngine::Aes256Gcm(c) => c.decrypt_in_place_detached(nonce.into(), b"", buf, tag),
            AeadEngine::ChaCha20IetfPoly1305(c) => {
                c.decrypt_in_place_detached(nonce.into(), b"", buf, tag)
            }
        }
        .map_err(|_| Error::decrypt("AEAD tag verification failed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aes_128_gcm_roundtrip() {
        let key = [0u8; 16];
        let engine = AeadEngine::new(CipherKind::Aes128Gcm, &key).unwrap();
        let nonce = [0u8; 12];

        let mut buf = b"hello aead".to_vec();
        engine.seal(&nonce, &mut buf).unwrap();
        assert!(buf.len() > b"hello aead".len());

        let tag = buf.split_off(buf.len() - AeadEngine::TAG_LEN);
        engine.open(&nonce, &mut buf, &tag).unwrap();
        assert_eq!(buf, b"hello aead");
    }

    #[test]
    fn chacha20_ietf_poly1305_roundtrip() {
        let key = [1u8; 32];
        let engine = AeadEngine::new(CipherKind::ChaCha20IetfPoly1305, &key).unwrap();
        let nonce = [2u8; 12];

        let mut buf = b"over the wire".to_vec();
        engine.seal(&nonce, &mut buf).unwrap();
        let tag = buf.split_off(buf.len() - AeadEngine::TAG_LEN);
        engine.open(&nonce, &mut buf, &tag).unwrap();
        assert_eq!(buf, b"over the wire");
    }

    #[test]
    fn tampered_ciphertext_fails_to_open() {
        let key = [3u8; 32];
        let engine = AeadEngine::new(CipherKind::Aes256Gcm, &key).unwrap();
        let nonce = [4u8; 12];

        let mut buf = b"integrity matters".to_vec();
        engine.seal(&nonce, &mut buf).unwrap();
        let tag = buf.split_off(buf.len() - AeadEngine::TAG_LEN);
        buf[0] ^= 0xFF;
        assert!(engine.open(&nonce, &mut buf, &tag).is_err());
    }
}
