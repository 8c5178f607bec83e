//! Encryptor (C5): stateful per-direction framing over a
//! [`StreamEngine`]/[`AeadEngine`] — lazy cipher construction (nothing is
//! built until the first salt/IV is known), chunked AEAD framing for TCP
//! (length+tag, payload+tag, max chunk
//! `0x3FFF`), little-endian nonce increment-with-carry per AEAD operation,
//! plain IV-prepend framing for stream ciphers, and whole-packet framing
//! for UDP (no persisted nonce across packets — each packet carries its
//! own salt/IV).

use bytes::{Buf, BytesMut};

use crate::crypto::aead::AeadEngine;
use crate::crypto::keys::derive_subkey;
use crate::crypto::kind::{CipherKind, CipherType};
use crate::crypto::stream::{Direction, StreamEngine};
use crate::{Error, Result};

/// Maximum plaintext bytes per AEAD chunk.
pub const MAX_CHUNK_LEN: usize = 0x3FFF;

fn increment_nonce(nonce: &mut [u8; 12]) {
    for byte in nonce.iter_mut() {
        *byte = byte.wrapping_add(1);
        if *byte != 0 {
            break;
        }
    }
}

enum Core {
    Stream(StreamEngine),
    /// Not yet constructed: waiting on the salt (decrypt side) or about to
    /// emit one (encrypt side).
    AeadPending,
    Aead { engine: AeadEngine, nonce: [u8; 12] },
}

/// One direction (encrypt or decrypt) of one connection's cipher state.
pub struct Encryptor {
    kind: CipherKind,
    master_key: Vec<u8>,
    direction: Direction,
    header_written: bool,
    core: Core,
    /// Leftover bytes from a previous `decrypt` call that didn't yet form
    /// a complete header/chunk.
    pending: BytesMut,
    /// The salt/IV this decrypt-side engine was constructed from, once
    /// enough bytes have arrived to read it. Exposed so a caller that
    /// abandons a connection on a malformed payload can still feed the
    /// peer's IV to the ban registry.
    received_iv: Option<Vec<u8>>,
}

impl Encryptor {
    /// Build the write-side engine: generates its own salt/IV immediately,
    /// to be flushed ahead of the first payload.
    pub fn new_encrypt(kind: CipherKind, master_key: Vec<u8>) -> Self {
        Encryptor {
            kind,
            master_key,
            direction: Direction::Encrypt,
            header_written: false,
            core: match kind.info().kind {
                CipherType::Aead => Core::Pending,
                CipherType::Stream => Core::Pending, // replaced on first `encrypt` call
            },
            pending: BytesMut::new(),
            received_iv: None,
        }
    }

    /// Build the read-side engine: the cipher isn't constructed until the
    /// peer's salt/IV has actually arrived over the wire.
    pub fn new_decrypt(kind: CipherKind, master_key: Vec<u8>) -> Self {
        Encryptor {
            kind,
            master_key,
            direction: Direction::Decrypt,
            header_written: true, // nothing to emit on the decrypt side
            core: Core::Pending,
            pending: BytesMut::new(),
            received_iv: None,
        }
    }

    fn info(&self) -> crate::crypto::kind::CipherInfo {
        self.kind.info()
    }

    /// The peer's salt/IV, once enough bytes have arrived over the wire to
    /// read it. `None` before that point, or on an encrypt-side engine.
    pub fn received_iv(&self) -> Option<&[u8]> {
        self.received_iv.as_deref()
    }

    /// Encrypt `plaintext` and append the wire bytes (header, if this is
    /// the first call, then framed ciphertext) to `out`.
    pub fn encrypt(&mut self, plaintext: &[u8], out: &mut Vec<u8>) -> Result<()> {
        match self.info().kind {
            CipherType::Aead => self.encrypt_aead(plaintext, out),
            CipherType::Stream => self.encrypt_stream(plaintext, out),
        }
    }

    fn encrypt_stream(&mut self, plaintext: &[u8], out: &mut Vec<u8>) -> Result<()> {
        if !self.header_written {
            let iv = random_bytes(self.info().iv_len);
            self.core = Core::Stream(StreamEngine::new(
                self.kind,
                &self.master_key,
                &iv,
                Direction::Encrypt,
            )?);
            out.extend_from_slice(&iv);
            self.header_written = true;
        }
        let mut buf = plaintext.to_vec();
        match &mut self.core {
            Core::Stream(engine) => engine.apply(&mut buf),
            _ => unreachable!("stream core always set by this point"),
        }
        out.extend_from_slice(&buf);
        Ok(())
    }

    fn encrypt_aead(&mut self, plaintext: &[u8], out: &mut Vec<u8>) -> Result<()> {
        if matches!(self.core, Core::Pending) {
            let salt = random_bytes(self.info().iv_len);
            let subkey = derive_subkey(&self.master_key, &salt, self.info().key_len)?;
            let engine = AeadEngine::new(self.kind, &subkey)?;
            out.extend_from_slice(&salt);
            self.core = Core::Aead {
                engine,
                nonce: [0u8; 12],
            };
        }

        for chunk in plaintext.chunks(MAX_CHUNK_LEN) {
            self.seal_chunk(chunk, out)?;
        }
        Ok(())
    }

    fn seal_chunk(&mut self, chunk: &[u8], out: &mut Vec<u8>) -> Result<()> {
        let (engine, nonce) = match &mut self.core {
            Core::Aead { engine, nonce } => (engine, nonce),
            _ => unreachable!("aead core set before sealing"),
        };

        let len_bytes = (chunk.len() as u16).to_be_bytes();
        let mut len_buf = len_bytes.to_vec();
        engine.seal(nonce, &mut len_buf)?;
        increment_nonce(nonce);
        out.extend_from_slice(&len_buf);

        let mut payload_buf = chunk.to_vec();
        engine.seal(nonce, &mut payload_buf)?;
        increment_nonce(nonce);
        out.extend_from_slice(&payload_buf);
        Ok(())
    }

    /// Feed newly-arrived bytes in; decrypted plaintext chunks that are
    /// now complete are appended to `out`. Incomplete trailing bytes are
    /// held in `self.pending` for the next call.
    pub fn decrypt(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<()> {
        self.pending.extend_from_slice(input);
        match self.info().kind {
            CipherType::Aead => self.decrypt_aead(out),
            CipherType::Stream => self.decrypt_stream(out),
        }
    }

    fn decrypt_stream(&mut self, out: &mut Vec<u8>) -> Result<()> {
        if matches!(self.core, Core::Pending) {
            let iv_len = self.info().iv_len;
            if self.pending.len() < iv_len {
                return Ok(());
            }
            let iv = self.pending.split_to(iv_len);
            self.received_iv = Some(iv.to_vec());
            self.core = Core::Stream(StreamEngine::new(
                self.kind,
                &self.master_key,
                &iv,
                Direction::Decrypt,
            )?);
        }
        if self.pending.is_empty() {
            return Ok(());
        }
        let mut buf = self.pending.split().to_vec();
        match &mut self.core {
            Core::Stream(engine) => engine.apply(&mut buf),
            _ => unreachable!(),
        }
        out.extend_from_slice(&buf);
        Ok(())
    }

    fn decrypt_aead(&mut self, out: &mut Vec<u8>) -> Result<()> {
        if matches!(self.core, Core::Pending) {
            let salt_len = self.info().iv_len;
            if self.pending.len() < salt_len {
                return Ok(());
            }
            let salt = self.pending.split_to(salt_len);
            self.received_iv = Some(salt.to_vec());
            let subkey = derive_subkey(&self.master_key, &salt, self.info().key_len)?;
            let engine = AeadEngine::new(self.kind, &subkey)?;
            self.core = Core::Aead {
                engine,
                nonce: [0u8; 12],
            };
        }

        let tag_len = self.info().tag_len;
        loop {
            // Length prefix: 2 bytes + tag.
            if self.pending.len() < 2 + tag_len {
                return Ok(());
            }
            let len_sealed = self.pending[..2 + tag_len].to_vec();
            let mut len_plain = len_sealed[..2].to_vec();
            let len_tag = &len_sealed[2..];
            let (engine, nonce) = match &mut self.core {
                Core::Aead { engine, nonce } => (engine, nonce),
                _ => unreachable!(),
            };
            engine.open(nonce, &mut len_plain, len_tag)?;
            let chunk_len = u16::from_be_bytes([len_plain[0], len_plain[1]]) as usize;
            if chunk_len > MAX_CHUNK_LEN {
                return Err(Error::decrypt("chunk length exceeds maximum"));
            }

            let payload_total = chunk_len + tag_len;
            if self.pending.len() < 2 + tag_len + payload_total {
                // Not enough for the payload yet; leave the length prefix
                // unconsumed so we re-verify it (harmlessly) next call
                // once more data has arrived.
                return Ok(());
            }

            // Both sub-messages present: consume for real, advancing the
            // nonce exactly once per AEAD operation as we go.
            self.pending.advance(2 + tag_len);
            increment_nonce(nonce);

            let mut payload = self.pending.split_to(payload_total).to_vec();
            let payload_tag = payload.split_off(chunk_len);
            let (engine, nonce) = match &mut self.core {
                Core::Aead { engine, nonce } => (engine, nonce),
                _ => unreachable!(),
            };
            engine.open(nonce, &mut payload, &payload_tag)?;
            increment_nonce(nonce);
            out.extend_from_slice(&payload);
        }
    }
}

fn random_bytes(len: usize) -> Vec<u8> {
    use rand::RngCore;
    let mut buf = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut buf);
    buf
}

/// Encrypt a full UDP datagram: fresh salt/IV, single AEAD seal (no
/// chunking) or stream cipher application, salt/IV prepended.
pub fn encrypt_packet(kind: CipherKind, master_key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    let info = kind.info();
    let header = random_bytes(info.iv_len);
    let mut out = header.clone();
    match info.kind {
        CipherType::Stream => {
            let mut engine = StreamEngine::new(kind, master_key, &header, Direction::Encrypt)?;
            let mut buf = plaintext.to_vec();
            engine.apply(&mut buf);
            out.extend_from_slice(&buf);
        }
        CipherType::Aead => {
            let subkey = derive_subkey(master_key, &header, info.key_len)?;
            let engine = AeadEngine::new(kind, &subkey)?;
            let mut buf = plaintext.to_vec();
            engine.seal(&[0u8; 12], &mut buf)?;
            out.extend_from_slice(&buf);
        }
    }
    Ok(out)
}

/// Decrypt a full UDP datagram.
pub fn decrypt_packet(kind: CipherKind, master_key: &[u8], packet: &[u8]) -> Result<Vec<u8>> {
    let info = kind.info();
    if packet.len() < info.iv_len {
        return Err(Error::decrypt("UDP packet shorter than salt/IV"));
    }
    let (header, body) = packet.split_at(info.iv_len);
    match info.kind {
        CipherType::Stream => {
            let mut engine = StreamEngine::new(kind, master_key, header, Direction::Decrypt)?;
            let mut buf = body.to_vec();
            engine.apply(&mut buf);
            Ok(buf)
        }
        CipherType::Aead => {
            if body.len() < info.tag_len {
                return Err(Error::decrypt("UDP packet shorter than AEAD tag"));
            }
            let subkey = derive_subkey(master_key, header, info.key_len)?;
            let engine = AeadEngine::new(kind, &subkey)?;
            let split = body.len() - info.tag_len;
            let mut payload = body[..split].to_vec();
            let tag = &body[split..];
            engine.open(&[0u8; 12], &mut payload, tag)?;
            Ok(payload)
        }
    }
}
