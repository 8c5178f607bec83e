//! Stream cipher engine (C3, stream half): constructs the right keystream
//! generator for a [`CipherKind`] and applies it to a buffer in place.
//!
//! CFB-mode block ciphers need distinct encrypt/decrypt state (the
//! feedback register is fed from ciphertext either way, but which side
//! produces that ciphertext differs), so construction takes a `Direction`.
//! Pure keystream ciphers (CTR, RC4, Salsa20, ChaCha20) are symmetric and
//! ignore it.

use aes::{Aes128, Aes192, Aes256};
use blowfish::Blowfish;
use camellia::{Camellia128, Camellia192, Camellia256};
use cast5::Cast5;
use cipher::{KeyIvInit, StreamCipher as RcStreamCipher};
use ctr::Ctr128BE;
use des::Des;
use idea::Idea;
use md5::Digest;
use rc2::Rc2;
use serpent::Serpent;

use crate::crypto::chacha::ChaCha20;
use crate::crypto::kind::CipherKind;
use crate::crypto::rc4::Rc4;
use crate::crypto::seed::SeedCfb;
use crate::{Error, Result};

/// Which direction a CFB-mode cipher instance runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Encrypt,
    Decrypt,
}

type Aes128CfbEnc = cfb_mode::Encryptor<Aes128>;
type Aes128CfbDec = cfb_mode::Decryptor<Aes128>;
type Aes192CfbEnc = cfb_mode::Encryptor<Aes192>;
type Aes192CfbDec = cfb_mode::Decryptor<Aes192>;
type Aes256CfbEnc = cfb_mode::Encryptor<Aes256>;
type Aes256CfbDec = cfb_mode::Decryptor<Aes256>;
type BfCfbEnc = cfb_mode::Encryptor<Blowfish>;
type BfCfbDec = cfb_mode::Decryptor<Blowfish>;
type Camellia128CfbEnc = cfb_mode::Encryptor<Camellia128>;
type Camellia128CfbDec = cfb_mode::Decryptor<Camellia128>;
type Camellia192CfbEnc = cfb_mode::Encryptor<Camellia192>;
type Camellia192CfbDec = cfb_mode::Decryptor<Camellia192>;
type Camellia256CfbEnc = cfb_mode::Encryptor<Camellia256>;
type Camellia256CfbDec = cfb_mode::Decryptor<Camellia256>;
type Cast5CfbEnc = cfb_mode::Encryptor<Cast5>;
type Cast5CfbDec = cfb_mode::Decryptor<Cast5>;
type DesCfbEnc = cfb_mode::Encryptor<Des>;
type DesCfbDec = cfb_mode::Decryptor<Des>;
type IdeaCfbEnc = cfb_mode::Encryptor<Idea>;
type IdeaCfbDec = cfb_mode::Decryptor<Idea>;
type Rc2CfbEnc = cfb_mode::Encryptor<Rc2>;
type Rc2CfbDec = cfb_mode::Decryptor<Rc2>;
type Serpent256CfbEnc = cfb_mode::Encryptor<Serpent>;
type Serpent256CfbDec = cfb_mode::Decryptor<Serpent>;

/// A running stream-cipher instance: feed it successive buffers of
/// plaintext/ciphertext in order, same way the AEAD side consumes
/// successive framed chunks.
pub enum StreamEngine {
    Rc4Md5(Rc4),
    ChaCha(ChaCha20),
    Seed(SeedCfb, Direction),
    Dyn(Box<dyn RcStreamCipher + Send>),
}

impl StreamEngine {
    pub fn new(kind: CipherKind, key: &[u8], iv: &[u8], dir: Direction) -> Result<Self> {
        use CipherKind::*;

        let bad_len = |what: &str| Error::internal(format!("bad {what} length for {kind:?}"));

        Ok(match kind {
            Rc4Md5 => {
                // rc4-md5 keys each session as MD5(master_key || iv), not
                // plain RC4(key) with the IV discarded.
                let mut hasher = md5::Md5::default();
                hasher.update(key);
                hasher.update(iv);
                let session_key = hasher.finalize();
                StreamEngine::Rc4Md5(Rc4::new(&session_key))
            }
            ChaCha20 | ChaCha20Ietf => StreamEngine::ChaCha(ChaCha20::new(key, iv)),
            SeedCfb => StreamEngine::Seed(SeedCfb::new(key, iv), dir),
            Aes128Cfb => boxed(dir, Aes128CfbEnc::new_from_slices(key, iv), Aes128CfbDec::new_from_slices(key, iv))?,
            Aes192Cfb => boxed(dir, Aes192CfbEnc::new_from_slices(key, iv), Aes192CfbDec::new_from_slices(key, iv))?,
            Aes256Cfb => boxed(dir, Aes256CfbEnc::new_from_slices(key, iv), Aes256CfbDec::new_from_slices(key, iv))?,
            Aes128Ctr => StreamEngine::Dyn(Box::new(
                Ctr128BE::<Aes128>::new_from_slices(key, iv).map_err(|_| bad_len("key/iv"))?,
            )),
            Aes192Ctr => StreamEngine::Dyn(Box::new(
                Ctr128BE::<Aes192>::new_from_slices(key, iv).map_err(|_| bad_len("key/iv"))?,
            )),
            Aes256Ctr => StreamEngine::Dyn(Box::new(
                Ctr128BE::<Aes256>::new_from_slices(key, iv).map_err(|_| bad_len("key/iv"))?,
            )),
            BfCfb => boxed(dir, BfCfbEnc::new_from_slices(key, iv), BfCfbDec::new_from_slices(key, iv))?,
            Camellia128Cfb => boxed(
                dir,
                Camellia128CfbEnc::new_from_slices(key, iv),
                Camellia128CfbDec::new_from_slices(key, iv),
            )?,
            Camellia192Cfb => boxed(
                dir,
                Camellia192CfbEnc::new_from_slices(key, iv),
                Camellia192CfbDec::new_from_slices(key, iv),
            )?,
            Camellia256Cfb => boxed(
                dir,
                Camellia256CfbEnc::new_from_slices(key, iv),
                Camellia256CfbDec::new_from_slices(key, iv),
            )?,
            Cast5Cfb => boxed(dir, Cast5CfbEnc::new_from_slices(key, iv), Cast5CfbDec::new_from_slices(key, iv))?,
            DesCfb => boxed(dir, DesCfbEnc::new_from_slices(key, iv), DesCfbDec::new_from_slices(key, iv))?,
            IdeaCfb => boxed(dir, IdeaCfbEnc::new_from_slices(key, iv), IdeaCfbDec::new_from_slices(key, iv))?,
            Rc2Cfb => boxed(dir, Rc2CfbEnc::new_from_slices(key, iv), Rc2CfbDec::new_from_slices(key, iv))?,
            Serpent256Cfb => boxed(
                dir,
                Serpent256CfbEnc::new_from_slices(key, iv),
                Serpent256CfbDec::new_from_slices(key, iv),
            )?,
            Salsa20 => StreamEngine::Dyn(Box::new(
                salsa20::Salsa20::new_from_slices(key, iv).map_err(|_| bad_len("key/iv"))?,
            )),
            Aes128Gcm | Aes192Gcm | Aes256Gcm | ChaCha20IetfPoly1305 => {
                return Err(Error::internal(format!("{kind:?} is an AEAD method, not a stream cipher")))
            }
        })
    }

    pub fn apply(&mut self, data: &mut [u8]) {
        match self {
            StreamEngine::Rc4Md5(c) => c.apply(data),
            StreamEngine::ChaCha(c) => c.apply(data),
            StreamEngine::Seed(c, Direction::Encrypt) => c.apply_encrypt(data),
            StreamEngine::Seed(c, Direction::Decrypt) => c.apply_decrypt(data),
            StreamEngine::Dyn(c) => c.apply_keystream(data),
        }
    }
}

/// Build a boxed trait object for whichever CFB direction `dir` selects.
fn boxed<E, D>(
    dir: Direction,
    enc: std::result::Result<E, cipher::InvalidLength>,
    dec: std::result::Result<D, cipher::InvalidLength>,
) -> Result<StreamEngine>
where
    E: RcStreamCipher + Send + 'static,
    D: RcStreamCipher + Send + 'static,
{
    match dir {
        Direction::Encrypt => Ok(StreamEngine::Dyn(Box::new(
            enc.map_err(|_| Error::internal("bad key/iv length"))?,
        ))),
        Direction::Decrypt => Ok(StreamEngine::Dyn(Box::new(
            dec.map_err(|_| Error::internal("bad key/iv length"))?,
        ))),
    }
}
