//! Per-item Blowfish-CBC decryption.
//!
//! Each media item is encrypted with its own key, derived from the shared
//! secret and the MD5 digest of the item ID. The CBC initialization vector is
//! a public constant of the protocol.

use crate::config::CipherConfig;
use crate::error::{Result, VaultError};
use blowfish::Blowfish;
use cbc::cipher::block_padding::NoPadding;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};

type BlowfishCbcDec = cbc::Decryptor<Blowfish>;
type BlowfishCbcEnc = cbc::Encryptor<Blowfish>;

/// Derive the decryption key for one item.
///
/// `key[i] = secret[i] ^ md5hex[i] ^ md5hex[i + 16]`, where `md5hex` is the
/// lowercase hex encoding of the MD5 digest of `item_id`.
pub fn derive_key(secret: &[u8], item_id: &str) -> Result<[u8; CipherConfig::SECRET_KEY_LEN]> {
    if secret.len() != CipherConfig::SECRET_KEY_LEN {
        return Err(VaultError::Cipher {
            message: format!(
                "shared secret must be {} bytes, got {}",
                CipherConfig::SECRET_KEY_LEN,
                secret.len()
            ),
        });
    }

    let digest = format!("{:x}", md5::compute(item_id.as_bytes()));
    let hex = digest.as_bytes();

    let mut key = [0u8; CipherConfig::SECRET_KEY_LEN];
    for (i, byte) in key.iter_mut().enumerate() {
        *byte = secret[i] ^ hex[i] ^ hex[i + CipherConfig::SECRET_KEY_LEN];
    }
    Ok(key)
}

/// Decrypt `buffer` in place with Blowfish-CBC under the protocol IV.
///
/// The buffer length must be a whole number of blocks.
pub fn decrypt(buffer: &mut [u8], key: &[u8]) -> Result<()> {
    check_whole_blocks(buffer)?;

    let decryptor =
        BlowfishCbcDec::new_from_slices(key, &CipherConfig::STRIPE_IV).map_err(|e| {
            VaultError::Cipher {
                message: format!("invalid key length {}: {}", key.len(), e),
            }
        })?;

    decryptor
        .decrypt_padded_mut::<NoPadding>(buffer)
        .map_err(|e| VaultError::Cipher {
            message: format!("decryption failed: {}", e),
        })?;
    Ok(())
}

/// Encrypt `buffer` in place; the inverse of [`decrypt`].
///
/// Used to produce striped payloads for local fixtures.
pub fn encrypt(buffer: &mut [u8], key: &[u8]) -> Result<()> {
    check_whole_blocks(buffer)?;

    let encryptor =
        BlowfishCbcEnc::new_from_slices(key, &CipherConfig::STRIPE_IV).map_err(|e| {
            VaultError::Cipher {
                message: format!("invalid key length {}: {}", key.len(), e),
            }
        })?;

    let len = buffer.len();
    encryptor
        .encrypt_padded_mut::<NoPadding>(buffer, len)
        .map_err(|e| VaultError::Cipher {
            message: format!("encryption failed: {}", e),
        })?;
    Ok(())
}

fn check_whole_blocks(buffer: &[u8]) -> Result<()> {
    if buffer.len() % CipherConfig::BLOCK_SIZE != 0 {
        return Err(VaultError::Cipher {
            message: format!(
                "buffer length {} is not a multiple of the {}-byte block size",
                buffer.len(),
                CipherConfig::BLOCK_SIZE
            ),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8; 16] = b"g4el58wc0zvf9na1";

    fn from_hex(s: &str) -> Vec<u8> {
        hex::decode(s).unwrap()
    }

    #[test]
    fn test_derive_key_known_value() {
        let key = derive_key(SECRET, "3135556").unwrap();
        assert_eq!(key.to_vec(), from_hex("6c6c666b39662c37652575603c643439"));
    }

    #[test]
    fn test_derive_key_deterministic_and_item_specific() {
        let a = derive_key(SECRET, "3135556").unwrap();
        let b = derive_key(SECRET, "3135556").unwrap();
        let c = derive_key(SECRET, "3135557").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_derive_key_rejects_short_secret() {
        let err = derive_key(b"short", "1").unwrap_err();
        assert!(matches!(err, VaultError::Cipher { .. }));
    }

    #[test]
    fn test_decrypt_known_ciphertext() {
        let key = derive_key(SECRET, "3135556").unwrap();
        let mut buf = from_hex("b23e2e651b328d6ad6735d0cd400ee38");
        decrypt(&mut buf, &key).unwrap();
        assert_eq!(buf, b"abcdefghijklmnop");
    }

    #[test]
    fn test_encrypt_matches_known_ciphertext() {
        let key = derive_key(SECRET, "3135556").unwrap();
        let mut buf = b"abcdefghijklmnop".to_vec();
        encrypt(&mut buf, &key).unwrap();
        assert_eq!(buf, from_hex("b23e2e651b328d6ad6735d0cd400ee38"));
    }

    #[test]
    fn test_decrypt_rejects_partial_block() {
        let key = derive_key(SECRET, "1").unwrap();
        let mut buf = vec![0u8; 12];
        let err = decrypt(&mut buf, &key).unwrap_err();
        assert!(matches!(err, VaultError::Cipher { .. }));
    }

    #[test]
    fn test_decrypt_rejects_empty_key() {
        let mut buf = vec![0u8; 8];
        assert!(decrypt(&mut buf, &[]).is_err());
    }
}
