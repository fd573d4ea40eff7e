//! L5 — Crypto Module (§4.5).
//!
//! Two codecs behind one `CryptoModule`: the legacy scheme (SHA-256 of
//! the cipher key as the AES key, fixed all-zero IV) for backward
//! compatibility with existing PubNub deployments, and the current
//! random-IV AES-CBC scheme. Grounded on
//! `examples/other_examples/..._crypto-mod.rs.rs`'s split between a
//! legacy and a "new" cryptor behind one enum/trait seam.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use sha2::{Digest, Sha256};

use crate::error::ResultCode;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// PRNG collaborator (§6) — only used to draw a fresh IV for the
/// random-IV scheme; `PUBNUB_RAND_INIT_VECTOR` controls whether a
/// context reseeds it per transaction.
pub trait Prng: std::fmt::Debug {
    fn fill(&mut self, buf: &mut [u8]);
}

/// Default `Prng` over the `rand` crate's thread-local generator.
#[derive(Debug, Default)]
pub struct OsPrng;

impl Prng for OsPrng {
    fn fill(&mut self, buf: &mut [u8]) {
        use rand::RngCore;
        rand::thread_rng().fill_bytes(buf);
    }
}

const LEGACY_IV: [u8; 16] = [0u8; 16];

/// Payload encrypt/decrypt collaborator (§6, §4.5).
#[derive(Debug, Clone)]
pub enum CryptoModule {
    /// No cipher key configured — messages pass through unchanged.
    None,
    /// The original scheme: key = first 32 bytes of hex(SHA-256(cipher_key)),
    /// fixed zero IV, ciphertext base64-wrapped in a JSON string.
    Legacy { cipher_key: String },
    /// Current scheme: key = SHA-256(cipher_key) raw bytes, random IV
    /// prepended to the ciphertext, the whole thing base64-encoded.
    AesCbc { cipher_key: String },
}

impl CryptoModule {
    fn derive_key(cipher_key: &str) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(cipher_key.as_bytes());
        hasher.finalize().into()
    }

    /// Legacy key derivation: hex-encode the SHA-256 digest, then take
    /// the first 32 ASCII characters of that 64-character hex string as
    /// the raw AES key bytes — not a second hash.
    fn derive_legacy_key(cipher_key: &str) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(cipher_key.as_bytes());
        let digest = hasher.finalize();
        let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
        let mut key = [0u8; 32];
        key.copy_from_slice(&hex.as_bytes()[..32]);
        key
    }

    pub fn encrypt(&self, plaintext: &str, prng: &mut dyn Prng) -> Result<String, ResultCode> {
        match self {
            CryptoModule::None => Ok(plaintext.to_string()),
            CryptoModule::Legacy { cipher_key } => {
                let key = Self::derive_legacy_key(cipher_key);
                let ciphertext = Aes256CbcEnc::new(&key.into(), &LEGACY_IV.into())
                    .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());
                Ok(format!("\"{}\"", STANDARD.encode(ciphertext)))
            }
            CryptoModule::AesCbc { cipher_key } => {
                let key = Self::derive_key(cipher_key);
                let mut iv = [0u8; 16];
                prng.fill(&mut iv);
                let ciphertext = Aes256CbcEnc::new(&key.into(), &iv.into())
                    .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());
                let mut out = Vec::with_capacity(16 + ciphertext.len());
                out.extend_from_slice(&iv);
                out.extend_from_slice(&ciphertext);
                Ok(format!("\"{}\"", STANDARD.encode(out)))
            }
        }
    }

    /// `payload` is the raw JSON text of the message as received
    /// (§4.6: not decoded) — for an encrypted message that is a quoted
    /// base64 string, which this strips before decoding.
    pub fn decrypt(&self, payload: &str) -> Result<String, ResultCode> {
        match self {
            CryptoModule::None => Ok(payload.to_string()),
            CryptoModule::Legacy { cipher_key } => {
                let encoded = unquote(payload);
                let raw = STANDARD.decode(encoded).map_err(|_| ResultCode::DecryptError)?;
                let key = Self::derive_legacy_key(cipher_key);
                let plain = Aes256CbcDec::new(&key.into(), &LEGACY_IV.into())
                    .decrypt_padded_vec_mut::<Pkcs7>(&raw)
                    .map_err(|_| ResultCode::DecryptError)?;
                String::from_utf8(plain).map_err(|_| ResultCode::DecryptError)
            }
            CryptoModule::AesCbc { cipher_key } => {
                let encoded = unquote(payload);
                let raw = STANDARD.decode(encoded).map_err(|_| ResultCode::DecryptError)?;
                if raw.len() < 16 {
                    return Err(ResultCode::DecryptError);
                }
                let (iv, ciphertext) = raw.split_at(16);
                let key = Self::derive_key(cipher_key);
                let plain = Aes256CbcDec::new(key.as_slice().into(), iv.into())
                    .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
                    .map_err(|_| ResultCode::DecryptError)?;
                String::from_utf8(plain).map_err(|_| ResultCode::DecryptError)
            }
        }
    }
}

fn unquote(s: &str) -> &str {
    s.strip_prefix('"').and_then(|s| s.strip_suffix('"')).unwrap_or(s)
}
