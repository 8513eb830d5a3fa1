//! AES_CBC_HMAC_SHA2 authenticated encryption, [`rfc7518`] section 5.2.
//!
//! [`rfc7518`]: https://datatracker.ietf.org/doc/html/rfc7518#section-5.2

use aws_lc_rs::{
    cipher::{
        self, DecryptionContext, EncryptionContext, PaddedBlockDecryptingKey,
        PaddedBlockEncryptingKey, UnboundCipherKey,
    },
    hmac,
    iv::FixedLength,
};
use jwx_error::ErrorContext;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::jose::{ContentEncryptionAlgorithm, ErrorKind, JoseError, error::WithKind};

pub(super) const IV_LEN: usize = 16;

struct CompositeKey<'a> {
    mac_key: &'a [u8],
    enc_key: &'a [u8],
    hmac: hmac::Algorithm,
    cipher: &'static cipher::Algorithm,
}

impl<'a> CompositeKey<'a> {
    /// Left half of the CEK authenticates, right half encrypts.
    fn split(enc: ContentEncryptionAlgorithm, cek: &'a [u8]) -> Result<Self, JoseError> {
        let (hmac, cipher) = match enc {
            ContentEncryptionAlgorithm::A128CbcHs256 => (hmac::HMAC_SHA256, &cipher::AES_128),
            ContentEncryptionAlgorithm::A192CbcHs384 => (hmac::HMAC_SHA384, &cipher::AES_192),
            ContentEncryptionAlgorithm::A256CbcHs512 => (hmac::HMAC_SHA512, &cipher::AES_256),
            _ => {
                return Err(JoseError::from_display(
                    ErrorKind::InvalidAlgorithm,
                    format!("{enc} is not an AES_CBC_HMAC_SHA2 algorithm"),
                ));
            }
        };
        let (mac_key, enc_key) = cek.split_at(cek.len() / 2);
        Ok(Self {
            mac_key,
            enc_key,
            hmac,
            cipher,
        })
    }

    /// HMAC over `AAD || IV || ciphertext || AL`, truncated to the MAC key length.
    fn tag(&self, aad: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, JoseError> {
        let aad_bits = u64::try_from(aad.len())
            .context("AAD length")
            .with_kind(ErrorKind::Structural)?
            .saturating_mul(8);
        let key = hmac::Key::new(self.hmac, self.mac_key);
        let mut ctx = hmac::Context::with_key(&key);
        ctx.update(aad);
        ctx.update(iv);
        ctx.update(ciphertext);
        ctx.update(&aad_bits.to_be_bytes());
        let full = ctx.sign();
        Ok(full.as_ref().iter().take(self.mac_key.len()).copied().collect())
    }

    fn cipher_key(&self) -> Result<UnboundCipherKey, JoseError> {
        UnboundCipherKey::new(self.cipher, self.enc_key)
            .context("load AES-CBC key")
            .with_kind(ErrorKind::Key)
    }
}

fn iv_array(iv: &[u8]) -> Option<[u8; IV_LEN]> {
    iv.try_into().ok()
}

pub(super) fn encrypt(
    enc: ContentEncryptionAlgorithm,
    plaintext: &[u8],
    aad: &[u8],
    cek: &[u8],
    iv: &[u8],
) -> Result<(Vec<u8>, Vec<u8>), JoseError> {
    let key = CompositeKey::split(enc, cek)?;
    let iv_block = iv_array(iv).ok_or_else(|| {
        JoseError::from_display(ErrorKind::Key, format!("{enc} requires a {IV_LEN} byte IV"))
    })?;

    let encrypting_key = PaddedBlockEncryptingKey::cbc_pkcs7(key.cipher_key()?)
        .context("create AES-CBC encrypting key")
        .with_kind(ErrorKind::Key)?;
    let mut ciphertext = plaintext.to_vec();
    encrypting_key
        .less_safe_encrypt(
            &mut ciphertext,
            EncryptionContext::Iv128(FixedLength::from(iv_block)),
        )
        .context("AES-CBC encrypt")
        .with_kind(ErrorKind::CryptographicFailure)?;

    let tag = key.tag(aad, iv, &ciphertext)?;
    Ok((ciphertext, tag))
}

/// Verify the tag in constant time, then decrypt.
///
/// Every failure after the key is accepted is the same
/// [`ErrorKind::CryptographicFailure`].
pub(super) fn decrypt(
    enc: ContentEncryptionAlgorithm,
    iv: &[u8],
    ciphertext: &[u8],
    tag: &[u8],
    aad: &[u8],
    cek: &[u8],
) -> Result<Zeroizing<Vec<u8>>, JoseError> {
    let key = CompositeKey::split(enc, cek)?;
    let iv_block = iv_array(iv).ok_or_else(JoseError::cryptographic_failure)?;

    let expected = key.tag(aad, iv, ciphertext)?;
    if !bool::from(expected.ct_eq(tag)) {
        return Err(JoseError::cryptographic_failure());
    }

    let decrypting_key = PaddedBlockDecryptingKey::cbc_pkcs7(key.cipher_key()?)
        .context("create AES-CBC decrypting key")
        .with_kind(ErrorKind::Key)?;
    let mut in_out = Zeroizing::new(ciphertext.to_vec());
    let plaintext_len = decrypting_key
        .decrypt(
            &mut in_out,
            DecryptionContext::Iv128(FixedLength::from(iv_block)),
        )
        .context("AES-CBC decrypt")
        .with_kind(ErrorKind::CryptographicFailure)?
        .len();
    in_out.truncate(plaintext_len);
    Ok(in_out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(s: &str) -> Vec<u8> {
        let s: String = s.split_whitespace().collect();
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
            .collect()
    }

    // rfc7518 appendix B.1
    const B1_KEY: &str = "00 01 02 03 04 05 06 07 08 09 0a 0b 0c 0d 0e 0f
        10 11 12 13 14 15 16 17 18 19 1a 1b 1c 1d 1e 1f";
    const B1_PLAINTEXT: &str = "41 20 63 69 70 68 65 72 20 73 79 73 74 65 6d 20
        6d 75 73 74 20 6e 6f 74 20 62 65 20 72 65 71 75 69 72 65 64 20 74 6f 20
        62 65 20 73 65 63 72 65 74 2c 20 61 6e 64 20 69 74 20 6d 75 73 74 20 62
        65 20 61 62 6c 65 20 74 6f 20 66 61 6c 6c 20 69 6e 74 6f 20 74 68 65 20
        68 61 6e 64 73 20 6f 66 20 74 68 65 20 65 6e 65 6d 79 20 77 69 74 68 6f
        75 74 20 69 6e 63 6f 6e 76 65 6e 69 65 6e 63 65";
    const B1_IV: &str = "1a f3 8c 2d c2 b9 6f fd d8 66 94 09 23 41 bc 04";
    const B1_AAD: &str = "54 68 65 20 73 65 63 6f 6e 64 20 70 72 69 6e 63
        69 70 6c 65 20 6f 66 20 41 75 67 75 73 74 65 20 4b 65 72 63 6b 68 6f 66
        66 73";
    const B1_TAG: &str = "65 2c 3f a3 6b 0a 7c 5b 32 19 fa b3 a3 0b c1 c4";

    #[test]
    fn rfc7518_b1_tag() {
        let (ciphertext, tag) = encrypt(
            ContentEncryptionAlgorithm::A128CbcHs256,
            &hex(B1_PLAINTEXT),
            &hex(B1_AAD),
            &hex(B1_KEY),
            &hex(B1_IV),
        )
        .unwrap();
        assert_eq!(tag, hex(B1_TAG));
        assert_eq!(ciphertext.len(), 144);

        let plaintext = decrypt(
            ContentEncryptionAlgorithm::A128CbcHs256,
            &hex(B1_IV),
            &ciphertext,
            &tag,
            &hex(B1_AAD),
            &hex(B1_KEY),
        )
        .unwrap();
        assert_eq!(*plaintext, hex(B1_PLAINTEXT));
    }

    #[test]
    fn tampering_is_a_bare_cryptographic_failure() {
        let enc = ContentEncryptionAlgorithm::A256CbcHs512;
        let cek = [9u8; 64];
        let iv = [3u8; IV_LEN];
        let (ciphertext, tag) = encrypt(enc, b"attack at dawn", b"aad", &cek, &iv).unwrap();
        assert_eq!(tag.len(), 32);

        let mut bad_ciphertext = ciphertext.clone();
        bad_ciphertext[0] ^= 0x80;
        let mut bad_tag = tag.clone();
        bad_tag[31] ^= 1;
        let mut bad_iv = iv;
        bad_iv[0] ^= 1;

        let errors = [
            decrypt(enc, &iv, &bad_ciphertext, &tag, b"aad", &cek).unwrap_err(),
            decrypt(enc, &iv, &ciphertext, &bad_tag, b"aad", &cek).unwrap_err(),
            decrypt(enc, &bad_iv, &ciphertext, &tag, b"aad", &cek).unwrap_err(),
            decrypt(enc, &iv, &ciphertext, &tag, b"aaD", &cek).unwrap_err(),
            decrypt(enc, &iv, &ciphertext, &tag[..16], b"aad", &cek).unwrap_err(),
        ];
        for err in errors {
            assert_eq!(err.kind(), ErrorKind::CryptographicFailure);
            assert_eq!(err.to_string(), "cryptographic failure");
        }
    }
}
