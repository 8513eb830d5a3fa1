use aws_lc_rs::aead::{self, Aad, LessSafeKey, Nonce, UnboundKey};
use jwx_error::ErrorContext;
use zeroize::Zeroizing;

use crate::jose::{ContentEncryptionAlgorithm, ErrorKind, JoseError, error::WithKind};

pub(super) const IV_LEN: usize = aead::NONCE_LEN;
pub(super) const TAG_LEN: usize = 16;

fn key(enc: ContentEncryptionAlgorithm, cek: &[u8]) -> Result<LessSafeKey, JoseError> {
    let algorithm = match enc {
        ContentEncryptionAlgorithm::A128Gcm => &aead::AES_128_GCM,
        ContentEncryptionAlgorithm::A192Gcm => &aead::AES_192_GCM,
        ContentEncryptionAlgorithm::A256Gcm => &aead::AES_256_GCM,
        _ => {
            return Err(JoseError::from_display(
                ErrorKind::InvalidAlgorithm,
                format!("{enc} is not an AES GCM algorithm"),
            ));
        }
    };
    let key = UnboundKey::new(algorithm, cek)
        .context("load AES-GCM key")
        .with_kind(ErrorKind::Key)?;
    Ok(LessSafeKey::new(key))
}

pub(super) fn encrypt(
    enc: ContentEncryptionAlgorithm,
    plaintext: &[u8],
    aad: &[u8],
    cek: &[u8],
    iv: &[u8],
) -> Result<(Vec<u8>, Vec<u8>), JoseError> {
    let key = key(enc, cek)?;
    let nonce = Nonce::try_assume_unique_for_key(iv)
        .context("AES-GCM IV must be 96 bits")
        .with_kind(ErrorKind::Key)?;
    let mut ciphertext = plaintext.to_vec();
    let tag = key
        .seal_in_place_separate_tag(nonce, Aad::from(aad), &mut ciphertext)
        .context("AES-GCM seal")
        .with_kind(ErrorKind::CryptographicFailure)?;
    Ok((ciphertext, tag.as_ref().to_vec()))
}

pub(super) fn decrypt(
    enc: ContentEncryptionAlgorithm,
    iv: &[u8],
    ciphertext: &[u8],
    tag: &[u8],
    aad: &[u8],
    cek: &[u8],
) -> Result<Zeroizing<Vec<u8>>, JoseError> {
    let key = key(enc, cek)?;
    if tag.len() != TAG_LEN {
        return Err(JoseError::cryptographic_failure());
    }
    let nonce = Nonce::try_assume_unique_for_key(iv)
        .context("AES-GCM IV")
        .with_kind(ErrorKind::CryptographicFailure)?;

    let mut in_out = Zeroizing::new(Vec::with_capacity(ciphertext.len() + tag.len()));
    in_out.extend_from_slice(ciphertext);
    in_out.extend_from_slice(tag);
    let plaintext_len = key
        .open_in_place(nonce, Aad::from(aad), &mut in_out)
        .context("AES-GCM open")
        .with_kind(ErrorKind::CryptographicFailure)?
        .len();
    in_out.truncate(plaintext_len);
    Ok(in_out)
}
