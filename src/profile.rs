//! Profile / URI codec (C11): a client's or server's whole operating
//! configuration, plus the `ss://` legacy and SIP002 URI forms. The
//! on-disk list format uses a `serde`-derived config shape; the URI
//! codec is built directly from the two wire grammars it speaks.

use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::crypto::kind::CipherKind;
use crate::{Error, Result};

const DEFAULT_LOCAL_ADDRESS: &str = "127.0.0.1";
const DEFAULT_TIMEOUT_SECS: u64 = 600;

/// A client's or server's whole operating configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub name: String,
    pub method: String,
    pub password: String,
    pub server_address: String,
    pub server_port: u16,
    pub local_address: String,
    pub local_port: u16,
    pub timeout_secs: u64,
    pub http_proxy: Option<String>,
    pub plugin: Option<String>,
    pub debug: bool,
    /// Set when the method name carried a trailing `-auth` suffix.
    /// Recognized and carried through for round-trip fidelity; OTA
    /// framing itself is not implemented (the wire format is unspecified).
    pub legacy_ota: bool,
}

impl Default for Profile {
    fn default() -> Self {
        Profile {
            name: String::new(),
            method: String::new(),
            password: String::new(),
            server_address: String::new(),
            server_port: 0,
            local_address: DEFAULT_LOCAL_ADDRESS.to_string(),
            local_port: 1080,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            http_proxy: None,
            plugin: None,
            debug: false,
            legacy_ota: false,
        }
    }
}

impl Profile {
    pub fn cipher_kind(&self) -> Result<CipherKind> {
        Ok(CipherKind::parse(&self.method)?.0)
    }

    /// Parse a `ss://` URI, trying the legacy whole-string-base64 form
    /// first and falling back to SIP002 (base64url userinfo only).
    pub fn from_uri(uri: &str) -> Result<Self> {
        let rest = uri
            .strip_prefix("ss://")
            .ok_or_else(|| Error::config("uri must start with ss://"))?;

        let (body, name) = match rest.split_once('#') {
            Some((body, frag)) => (body, percent_decode(frag)?),
            None => (rest, String::new()),
        };

        if let Some(profile) = try_parse_legacy(body, &name) {
            return Ok(profile);
        }
        parse_sip002(body, &name)
    }

    /// Legacy form: `ss://BASE64(method:password@host:port)#name`.
    pub fn to_uri(&self) -> String {
        let userinfo = format!(
            "{}:{}@{}:{}",
            self.method, self.password, self.server_address, self.server_port
        );
        let encoded = STANDARD_NO_PAD.encode(userinfo.as_bytes());
        if self.name.is_empty() {
            format!("ss://{encoded}")
        } else {
            format!("ss://{encoded}#{}", percent_encode(&self.name))
        }
    }

    /// SIP002 form: `ss://BASE64URL(method:password)@host:port#name`.
    pub fn to_uri_sip002(&self) -> String {
        let userinfo = format!("{}:{}", self.method, self.password);
        let encoded = URL_SAFE_NO_PAD.encode(userinfo.as_bytes());
        let mut uri = format!("ss://{encoded}@{}:{}", self.server_address, self.server_port);
        if !self.name.is_empty() {
            uri.push('#');
            uri.push_str(&percent_encode(&self.name));
        }
        uri
    }
}

fn try_parse_legacy(body: &str, name: &str) -> Option<Profile> {
    let decoded = STANDARD_NO_PAD
        .decode(body.trim_end_matches('='))
        .ok()
        .or_else(|| base64::engine::general_purpose::STANDARD.decode(body).ok())?;
    let text = String::from_utf8(decoded).ok()?;
    let (userinfo, hostport) = text.split_once('@')?;
    let (method, password) = userinfo.split_once(':')?;
    let (host, port) = hostport.rsplit_once(':')?;
    let port: u16 = port.parse().ok()?;

    let (method, legacy_ota) = strip_ota_suffix(method);
    Some(Profile {
        name: name.to_string(),
        method,
        password: password.to_string(),
        server_address: host.to_string(),
        server_port: port,
        legacy_ota,
        ..Profile::default()
    })
}

fn parse_sip002(body: &str, name: &str) -> Result<Profile> {
    let (userinfo, rest) = body
        .split_once('@')
        .ok_or_else(|| Error::config("SIP002 uri missing userinfo"))?;
    let rest = rest.split(['/', '?']).next().unwrap_or(rest);
    let (host, port) = rest
        .rsplit_once(':')
        .ok_or_else(|| Error::config("SIP002 uri missing port"))?;
    let port: u16 = port
        .parse()
        .map_err(|_| Error::config("SIP002 uri has invalid port"))?;

    let decoded = URL_SAFE_NO_PAD
        .decode(userinfo)
        .map_err(|e| Error::config(format!("invalid SIP002 userinfo base64: {e}")))?;
    let text = String::from_utf8(decoded)
        .map_err(|_| Error::config("SIP002 userinfo is not valid utf8"))?;
    let (method, password) = text
        .split_once(':')
        .ok_or_else(|| Error::config("SIP002 userinfo missing method:password"))?;

    let (method, legacy_ota) = strip_ota_suffix(method);
    Ok(Profile {
        name: name.to_string(),
        method,
        password: password.to_string(),
        server_address: host.to_string(),
        server_port: port,
        legacy_ota,
        ..Profile::default()
    })
}

fn strip_ota_suffix(method: &str) -> (String, bool) {
    match method.strip_suffix("-auth") {
        Some(stripped) => (stripped.to_string(), true),
        None => (method.to_string(), false),
    }
}

fn percent_decode(s: &str) -> Result<String> {
    let mut out = Vec::with_capacity(s.len());
    let mut bytes = s.bytes();
    while let Some(b) = bytes.next() {
        if b == b'%' {
            let hi = bytes.next().ok_or_else(|| Error::config("bad percent-encoding"))?;
            let lo = bytes.next().ok_or_else(|| Error::config("bad percent-encoding"))?;
            let byte = u8::from_str_radix(&format!("{}{}", hi as char, lo as char), 16)
                .map_err(|_| Error::config("bad percent-encoding"))?;
            out.push(byte);
        } else {
            out.push(b);
        }
    }
    String::from_utf8(out).map_err(|_| Error::config("fragment is not valid utf8 after decoding"))
}

fn percent_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.as_bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(*byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

/// On-disk list of named profiles, using the `serde_yaml` config
/// idiom for this crate's own configuration shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileFile {
    pub profiles: Vec<ProfileEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileEntry {
    pub name: String,
    pub method: String,
    pub password: String,
    pub server_address: String,
    pub server_port: u16,
    #[serde(default = "default_local_address")]
    pub local_address: String,
    #[serde(default)]
    pub local_port: u16,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub http_proxy: Option<String>,
    #[serde(default)]
    pub plugin: Option<String>,
    #[serde(default)]
    pub debug: bool,
}

fn default_local_address() -> String {
    DEFAULT_LOCAL_ADDRESS.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl From<ProfileEntry> for Profile {
    fn from(entry: ProfileEntry) -> Self {
        Profile {
            name: entry.name,
            method: entry.method,
            password: entry.password,
            server_address: entry.server_address,
            server_port: entry.server_port,
            local_address: entry.local_address,
            local_port: entry.local_port,
            timeout_secs: entry.timeout_secs,
            http_proxy: entry.http_proxy,
            plugin: entry.plugin,
            debug: entry.debug,
            legacy_ota: false,
        }
    }
}

impl ProfileFile {
    pub fn parse(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sip002_like_literal_scenario_parses() {
        let profile =
            Profile::from_uri("ss://YmYtY2ZiOnRlc3RAMTkyLjE2OC4xMDAuMTo4ODg4#T%C3%A9st").unwrap();
        assert_eq!(profile.method, "bf-cfb");
        assert_eq!(profile.password, "test");
        assert_eq!(profile.server_address, "192.168.100.1");
        assert_eq!(profile.server_port, 8888);
        assert_eq!(profile.name, "Tést");
    }

    #[test]
    fn legacy_uri_roundtrip() {
        let profile = Profile {
            method: "aes-256-gcm".to_string(),
            password: "hunter2".to_string(),
            server_address: "example.com".to_string(),
            server_port: 8388,
            name: "home".to_string(),
            ..Profile::default()
        };
        let uri = profile.to_uri();
        let parsed = Profile::from_uri(&uri).unwrap();
        assert_eq!(parsed.method, profile.method);
        assert_eq!(parsed.password, profile.password);
        assert_eq!(parsed.server_address, profile.server_address);
        assert_eq!(parsed.server_port, profile.server_port);
        assert_eq!(parsed.name, profile.name);
    }

    #[test]
    fn sip002_emission_roundtrip() {
        let profile = Profile {
            method: "chacha20-ietf-poly1305".to_string(),
            password: "s3cr3t".to_string(),
            server_address: "10.0.0.5".to_string(),
            server_port: 443,
            name: "work".to_string(),
            ..Profile::default()
        };
        let uri = profile.to_uri_sip002();
        let parsed = Profile::from_uri(&uri).unwrap();
        assert_eq!(parsed.method, profile.method);
        assert_eq!(parsed.password, profile.password);
        assert_eq!(parsed.server_address, profile.server_address);
        assert_eq!(parsed.server_port, profile.server_port);
        assert_eq!(parsed.name, profile.name);
    }

    #[test]
    fn ota_suffix_is_recognized_and_stripped() {
        let profile = Profile::from_uri("ss://cmM0LW1kNS1hdXRoOnB3QDEuMi4zLjQ6ODA=").unwrap();
        assert_eq!(profile.method, "rc4-md5");
        assert!(profile.legacy_ota);
    }

    #[test]
    fn defaults_match_expected_values() {
        let profile = Profile::default();
        assert_eq!(profile.local_address, "127.0.0.1");
        assert_eq!(profile.timeout_secs, 600);
    }

    #[test]
    fn profile_file_parses_yaml_list() {
        let yaml = "profiles:\n  - name: home\n    method: aes-256-gcm\n    password: x\n    server_address: 1.2.3.4\n    server_port: 8388\n";
        let file = ProfileFile::parse(yaml).unwrap();
        assert_eq!(file.profiles.len(), 1);
        assert_eq!(file.profiles[0].local_address, "127.0.0.1");
        assert_eq!(file.profiles[0].timeout_secs, 600);
    }
}
