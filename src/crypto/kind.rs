//! Cipher descriptor table (C3): every method name the relay understands,
//! with its key/IV/salt/tag lengths and whether it is a plain stream
//! cipher or an AEAD construction.

use crate::{Error, Result};

/// The two cipher families a method falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherType {
    Stream,
    Aead,
}

/// One supported `method` name from a profile, resolved to its algorithm
/// parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherKind {
    Rc4Md5,
    Aes128Cfb,
    Aes192Cfb,
    Aes256Cfb,
    Aes128Ctr,
    Aes192Ctr,
    Aes256Ctr,
    BfCfb,
    Camellia128Cfb,
    Camellia192Cfb,
    Camellia256Cfb,
    Cast5Cfb,
    DesCfb,
    IdeaCfb,
    Rc2Cfb,
    Salsa20,
    ChaCha20,
    ChaCha20Ietf,
    SeedCfb,
    Serpent256Cfb,
    Aes128Gcm,
    Aes192Gcm,
    Aes256Gcm,
    ChaCha20IetfPoly1305,
}

/// Static parameters for a [`CipherKind`]: key length, IV/salt length, tag
/// length (AEAD only) and its family.
#[derive(Debug, Clone, Copy)]
pub struct CipherInfo {
    pub name: &'static str,
    pub key_len: usize,
    pub iv_len: usize,
    pub tag_len: usize,
    pub kind: CipherType,
}

impl CipherKind {
    /// Resolve a profile `method` string, stripping a legacy `-auth` OTA
    /// suffix if present. Returns the resolved kind plus whether OTA was
    /// requested.
    pub fn parse(method: &str) -> Result<(Self, bool)> {
        let (base, legacy_ota) = match method.strip_suffix("-auth") {
            Some(base) => (base, true),
            None => (method, false),
        };
        let kind = match base {
            "rc4-md5" => CipherKind::Rc4Md5,
            "aes-128-cfb" => CipherKind::Aes128Cfb,
            "aes-192-cfb" => CipherKind::Aes192Cfb,
            "aes-256-cfb" => CipherKind::Aes256Cfb,
            "aes-128-ctr" => CipherKind::Aes128Ctr,
            "aes-192-ctr" => CipherKind::Aes192Ctr,
            "aes-256-ctr" => CipherKind::Aes256Ctr,
            "bf-cfb" => CipherKind::BfCfb,
            "camellia-128-cfb" => CipherKind::Camellia128Cfb,
            "camellia-192-cfb" => CipherKind::Camellia192Cfb,
            "camellia-256-cfb" => CipherKind::Camellia256Cfb,
            "cast5-cfb" => CipherKind::Cast5Cfb,
            "des-cfb" => CipherKind::DesCfb,
            "idea-cfb" => CipherKind::IdeaCfb,
            "rc2-cfb" => CipherKind::Rc2Cfb,
            "salsa20" => CipherKind::Salsa20,
            "chacha20" => CipherKind::ChaCha20,
            "chacha20-ietf" => CipherKind::ChaCha20Ietf,
            "seed-cfb" => CipherKind::SeedCfb,
            "serpent-256-cfb" => CipherKind::Serpent256Cfb,
            "aes-128-gcm" => CipherKind::Aes128Gcm,
            "aes-192-gcm" => CipherKind::Aes192Gcm,
            "aes-256-gcm" => CipherKind::Aes256Gcm,
            "chacha20-ietf-poly1305" => CipherKind::ChaCha20IetfPoly1305,
            other => return Err(Error::unsupported_method(other)),
        };
        Ok((kind, legacy_ota))
    }

    pub fn info(self) -> CipherInfo {
        use CipherKind::*;
        use CipherType::*;
        let (name, key_len, iv_len, tag_len, kind) = match self {
            Rc4Md5 => ("rc4-md5", 16, 16, 0, Stream),
            Aes128Cfb => ("aes-128-cfb", 16, 16, 0, Stream),
            Aes192Cfb => ("aes-192-cfb", 24, 16, 0, Stream),
            Aes256Cfb => ("aes-256-cfb", 32, 16, 0, Stream),
            Aes128Ctr => ("aes-128-ctr", 16, 16, 0, Stream),
            Aes192Ctr => ("aes-192-ctr", 24, 16, 0, Stream),
            Aes256Ctr => ("aes-256-ctr", 32, 16, 0, Stream),
            BfCfb => ("bf-cfb", 16, 8, 0, Stream),
            Camellia128Cfb => ("camellia-128-cfb", 16, 16, 0, Stream),
            Camellia192Cfb => ("camellia-192-cfb", 24, 16, 0, Stream),
            Camellia256Cfb => ("camellia-256-cfb", 32, 16, 0, Stream),
            Cast5Cfb => ("cast5-cfb", 16, 8, 0, Stream),
            DesCfb => ("des-cfb", 8, 8, 0, Stream),
            IdeaCfb => ("idea-cfb", 16, 8, 0, Stream),
            Rc2Cfb => ("rc2-cfb", 16, 8, 0, Stream),
            Salsa20 => ("salsa20", 32, 8, 0, Stream),
            ChaCha20 => ("chacha20", 32, 8, 0, Stream),
            ChaCha20Ietf => ("chacha20-ietf", 32, 12, 0, Stream),
            SeedCfb => ("seed-cfb", 16, 16, 0, Stream),
            Serpent256Cfb => ("serpent-256-cfb", 32, 16, 0, Stream),
            Aes128Gcm => ("aes-128-gcm", 16, 16, 16, Aead),
            Aes192Gcm => ("aes-192-gcm", 24, 24, 16, Aead),
            Aes256Gcm => ("aes-256-gcm", 32, 32, 16, Aead),
            ChaCha20IetfPoly1305 => ("chacha20-ietf-poly1305", 32, 32, 16, Aead),
        };
        CipherInfo {
            name,
            key_len,
            iv_len,
            tag_len,
            kind,
        }
    }

    pub fn is_aead(self) -> bool {
        self.info().kind == CipherType::Aead
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_and_auth_suffixed_methods() {
        let (kind, ota) = CipherKind::parse("aes-256-gcm").unwrap();
        assert_eq!(kind, CipherKind::Aes256Gcm);
        assert!(!ota);

        let (kind, ota) = CipherKind::parse("bf-cfb-auth").unwrap();
        assert_eq!(kind, CipherKind::BfCfb);
        assert!(ota);
    }

    #[test]
    fn unknown_method_is_unsupported() {
        let err = CipherKind::parse("rot13").unwrap_err();
        assert!(matches!(err, Error::UnsupportedMethod(_)));
    }

    #[test]
    fn aead_vs_stream_classification() {
        assert!(CipherKind::Aes128Gcm.is_aead());
        assert!(CipherKind::ChaCha20IetfPoly1305.is_aead());
        assert!(!CipherKind::ChaCha20Ietf.is_aead());
        assert!(!CipherKind::Rc4Md5.is_aead());
    }

    #[test]
    fn aead_salt_equals_key_len_per_spec_table() {
        for k in [
            CipherKind::Aes128Gcm,
            CipherKind::Aes192Gcm,
            CipherKind::Aes256Gcm,
            CipherKind::ChaCha20IetfPoly1305,
        ] {
            let info = k.info();
            assert_eq!(info.iv_len, info.key_len);
            assert_eq!(info.tag_len, 16);
        }
    }
}
