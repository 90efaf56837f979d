use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM};
use ring::rand::{SecureRandom, SystemRandom};

use crate::errors::{AppError, AppResult};

const KEY_BYTES: usize = 32;
const NONCE_BYTES: usize = 12;

/// AES-256-GCM cipher for provider tokens at rest. Constructed once at
/// startup from a 64-hex-char key and passed explicitly to whatever needs
/// to seal or open credentials.
///
/// Ciphertexts are stored as `<nonce-hex>:<ciphertext-hex>`.
pub struct TokenCipher {
    key: [u8; KEY_BYTES],
    rng: SystemRandom,
}

impl TokenCipher {
    pub fn from_hex(raw: &str) -> AppResult<Self> {
        let decoded = hex_decode(raw.trim())
            .map_err(|e| AppError::Config(format!("MAILBOT_TOKEN_KEY: {e}")))?;
        let key: [u8; KEY_BYTES] = decoded
            .try_into()
            .map_err(|_| AppError::Config("MAILBOT_TOKEN_KEY must be 32 bytes (64 hex chars)".into()))?;
        Ok(Self {
            key,
            rng: SystemRandom::new(),
        })
    }

    pub fn encrypt(&self, plaintext: &str) -> AppResult<String> {
        let sealing = self.sealing_key()?;

        let mut nonce_bytes = [0u8; NONCE_BYTES];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| AppError::Unexpected("nonce generation failed".into()))?;

        let mut buf = plaintext.as_bytes().to_vec();
        sealing
            .seal_in_place_append_tag(
                Nonce::assume_unique_for_key(nonce_bytes),
                Aad::empty(),
                &mut buf,
            )
            .map_err(|_| AppError::Unexpected("token encryption failed".into()))?;

        Ok(format!("{}:{}", hex_encode(&nonce_bytes), hex_encode(&buf)))
    }

    pub fn decrypt(&self, stored: &str) -> AppResult<String> {
        let (nonce_hex, ct_hex) = stored
            .split_once(':')
            .ok_or_else(|| AppError::Unexpected("malformed encrypted token".into()))?;

        let nonce_vec =
            hex_decode(nonce_hex).map_err(|e| AppError::Unexpected(format!("token nonce: {e}")))?;
        let nonce_bytes: [u8; NONCE_BYTES] = nonce_vec
            .try_into()
            .map_err(|_| AppError::Unexpected("invalid token nonce length".into()))?;
        let mut ciphertext =
            hex_decode(ct_hex).map_err(|e| AppError::Unexpected(format!("token ciphertext: {e}")))?;

        let opening = self.sealing_key()?;
        let plaintext = opening
            .open_in_place(
                Nonce::assume_unique_for_key(nonce_bytes),
                Aad::empty(),
                &mut ciphertext,
            )
            .map_err(|_| AppError::Unexpected("token decryption failed".into()))?;

        String::from_utf8(plaintext.to_vec())
            .map_err(|_| AppError::Unexpected("decrypted token is not utf-8".into()))
    }

    fn sealing_key(&self) -> AppResult<LessSafeKey> {
        let unbound = UnboundKey::new(&AES_256_GCM, &self.key)
            .map_err(|_| AppError::Unexpected("constructing AES-256-GCM key".into()))?;
        Ok(LessSafeKey::new(unbound))
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0f) as usize] as char);
    }
    out
}

fn hex_decode(raw: &str) -> Result<Vec<u8>, String> {
    if raw.len() % 2 != 0 {
        return Err("hex string length must be even".into());
    }

    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len() / 2);
    let mut idx = 0;
    while idx < bytes.len() {
        let hi = hex_nibble(bytes[idx]).ok_or("invalid hex digit")?;
        let lo = hex_nibble(bytes[idx + 1]).ok_or("invalid hex digit")?;
        out.push((hi << 4) | lo);
        idx += 2;
    }
    Ok(out)
}

fn hex_nibble(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_KEY: &str = "00112233445566778899aabbccddeeff00112233445566778899aabbccddeeff";

    #[test]
    fn round_trips_a_token() {
        let cipher = TokenCipher::from_hex(TEST_KEY).expect("cipher");
        let sealed = cipher.encrypt("ya29.a0AfH6SMBx").expect("encrypt");
        assert_ne!(sealed, "ya29.a0AfH6SMBx");
        assert_eq!(cipher.decrypt(&sealed).expect("decrypt"), "ya29.a0AfH6SMBx");
    }

    #[test]
    fn rejects_short_keys() {
        assert!(TokenCipher::from_hex("deadbeef").is_err());
    }

    #[test]
    fn rejects_tampered_ciphertext() {
        let cipher = TokenCipher::from_hex(TEST_KEY).expect("cipher");
        let sealed = cipher.encrypt("secret").expect("encrypt");
        let last = sealed.chars().last().expect("non-empty");
        let flipped = if last == '0' { '1' } else { '0' };
        let mut tampered = sealed.clone();
        tampered.pop();
        tampered.push(flipped);
        assert!(cipher.decrypt(&tampered).is_err());
    }
}
