//! End-to-end property tests exercising the public crate surface the way
//! a consumer of the library would: cipher round-trips across the full
//! method table, the address header codec, and the profile URI codec,
//! including the literal scenarios called out for this protocol.

use shadowrelay::address::{self, Address};
use shadowrelay::crypto::keys::evp_bytes_to_key;
use shadowrelay::crypto::kind::CipherKind;
use shadowrelay::crypto::Encryptor;
use shadowrelay::profile::Profile;

const ALL_METHODS: &[&str] = &[
    "rc4-md5",
    "aes-128-cfb",
    "aes-192-cfb",
    "aes-256-cfb",
    "aes-128-ctr",
    "aes-192-ctr",
    "aes-256-ctr",
    "bf-cfb",
    "camellia-128-cfb",
    "camellia-192-cfb",
    "camellia-256-cfb",
    "cast5-cfb",
    "des-cfb",
    "idea-cfb",
    "rc2-cfb",
    "salsa20",
    "chacha20",
    "chacha20-ietf",
    "seed-cfb",
    "serpent-256-cfb",
    "aes-128-gcm",
    "aes-192-gcm",
    "aes-256-gcm",
    "chacha20-ietf-poly1305",
];

fn roundtrip(kind: CipherKind, password: &[u8], plaintext: &[u8]) -> Vec<u8> {
    let master_key = evp_bytes_to_key(password, kind.info().key_len);

    let mut encryptor = Encryptor::new_encrypt(kind, master_key.clone());
    let mut ciphertext = Vec::new();
    encryptor.encrypt(plaintext, &mut ciphertext).unwrap();

    let mut decryptor = Encryptor::new_decrypt(kind, master_key);
    let mut out = Vec::new();
    decryptor.decrypt(&ciphertext, &mut out).unwrap();
    out
}

#[test]
fn every_method_in_the_table_roundtrips() {
    let plaintext = b"Hello Shadowsocks";
    for method in ALL_METHODS {
        let (kind, _) = CipherKind::parse(method).unwrap();
        let out = roundtrip(kind, b"test", plaintext);
        assert_eq!(out, plaintext, "round-trip failed for {method}");
    }
}

#[test]
fn stream_cipher_first_chunk_length_matches_scenario_one() {
    let (kind, _) = CipherKind::parse("aes-128-cfb").unwrap();
    let master_key = evp_bytes_to_key(b"test", kind.info().key_len);
    let mut encryptor = Encryptor::new_encrypt(kind, master_key);
    let mut ciphertext = Vec::new();
    encryptor
        .encrypt(b"Hello Shadowsocks", &mut ciphertext)
        .unwrap();
    assert_eq!(ciphertext.len(), 16 + 17);
}

#[test]
fn aead_single_chunk_lengths_match_scenario_two() {
    let (kind, _) = CipherKind::parse("aes-256-gcm").unwrap();
    let master_key = evp_bytes_to_key(b"test", kind.info().key_len);
    let mut encryptor = Encryptor::new_encrypt(kind, master_key);

    let mut first = Vec::new();
    encryptor.encrypt(b"Hello Shadowsocks", &mut first).unwrap();
    assert_eq!(first.len(), 32 + 2 + 16 + 17 + 16);

    let mut second = Vec::new();
    encryptor.encrypt(b"Hello Shadowsocks", &mut second).unwrap();
    assert_eq!(second.len(), 2 + 16 + 17 + 16);
}

#[test]
fn aead_decryption_across_a_split_buffer_reassembles_plaintext() {
    let (kind, _) = CipherKind::parse("aes-256-gcm").unwrap();
    let master_key = evp_bytes_to_key(b"test", kind.info().key_len);

    let mut encryptor = Encryptor::new_encrypt(kind, master_key.clone());
    let mut ciphertext = Vec::new();
    encryptor
        .encrypt(b"Hello Shadowsocks", &mut ciphertext)
        .unwrap();

    let (first, rest) = ciphertext.split_at(50);
    let mut decryptor = Encryptor::new_decrypt(kind, master_key);
    let mut out = Vec::new();
    decryptor.decrypt(first, &mut out).unwrap();
    decryptor.decrypt(rest, &mut out).unwrap();
    assert_eq!(out, b"Hello Shadowsocks");
}

#[test]
fn udp_aead_packet_length_matches_scenario_four() {
    let packet = shadowrelay::crypto::encryptor::encrypt_packet(
        CipherKind::Aes256Gcm,
        &evp_bytes_to_key(b"test", 32),
        b"Hello Shadowsocks",
    )
    .unwrap();
    assert_eq!(packet.len(), 32 + 17 + 16);

    let plaintext = shadowrelay::crypto::encryptor::decrypt_packet(
        CipherKind::Aes256Gcm,
        &evp_bytes_to_key(b"test", 32),
        &packet,
    )
    .unwrap();
    assert_eq!(plaintext, b"Hello Shadowsocks");
}

#[test]
fn address_packing_matches_literal_scenario_five() {
    let addr = Address::new("127.0.0.1", 1080);
    let packed = address::pack(&addr);
    assert_eq!(packed, vec![0x01, 0x7F, 0x00, 0x00, 0x01, 0x04, 0x38]);

    let (parsed, len) = address::parse(&packed).unwrap();
    assert_eq!(len, packed.len());
    assert_eq!(parsed.port(), 1080);
}

#[test]
fn address_pack_parse_roundtrips_for_domains_and_v6() {
    for addr in [
        Address::new("example.com", 443),
        Address::new("::1", 8388),
        Address::new("192.168.1.1", 53),
    ] {
        let packed = address::pack(&addr);
        let (parsed, len) = address::parse(&packed).unwrap();
        assert_eq!(len, packed.len());
        assert_eq!(parsed.text(), addr.text());
        assert_eq!(parsed.port(), addr.port());
    }
}

#[test]
fn sip002_literal_uri_scenario_six() {
    let profile =
        Profile::from_uri("ss://YmYtY2ZiOnRlc3RAMTkyLjE2OC4xMDAuMTo4ODg4#T%C3%A9st").unwrap();
    assert_eq!(profile.method, "bf-cfb");
    assert_eq!(profile.password, "test");
    assert_eq!(profile.server_address, "192.168.100.1");
    assert_eq!(profile.server_port, 8888);
    assert_eq!(profile.name, "Tést");
}

#[test]
fn profile_uri_roundtrips_on_both_forms() {
    let profile = Profile {
        method: "aes-256-gcm".to_string(),
        password: "hunter2".to_string(),
        server_address: "example.com".to_string(),
        server_port: 8388,
        name: "home".to_string(),
        ..Profile::default()
    };
    assert_eq!(Profile::from_uri(&profile.to_uri()).unwrap(), profile);

    let sip002 = Profile {
        method: "chacha20-ietf-poly1305".to_string(),
        password: "s3cr3t".to_string(),
        server_address: "10.0.0.5".to_string(),
        server_port: 443,
        name: "work".to_string(),
        ..Profile::default()
    };
    assert_eq!(Profile::from_uri(&sip002.to_uri_sip002()).unwrap(), sip002);
}

#[test]
fn chacha20_ietf_documented_test_vector() {
    use shadowrelay::crypto::stream::{Direction, StreamEngine};

    let key = [0u8; 32];
    let iv = [0u8; 12];
    let mut buf = [0u8; 9];
    let mut engine =
        StreamEngine::new(CipherKind::ChaCha20Ietf, &key, &iv, Direction::Encrypt).unwrap();
    engine.apply(&mut buf);
    assert_eq!(buf, [0x76, 0xb8, 0xe0, 0xad, 0xa0, 0xf1, 0x3d, 0x90, 0x40]);
}

#[test]
fn md5_of_abc_matches_literal_constant() {
    use md5::Digest;
    let digest = md5::Md5::digest(b"abc");
    let hex = digest.iter().map(|b| format!("{b:02X}")).collect::<String>();
    assert_eq!(hex, "900150983CD24FB0D6963F7D28E17F72");
}
