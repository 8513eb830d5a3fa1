use aws_lc_rs::rsa::{
    OAEP_SHA1_MGF1SHA1, OAEP_SHA256_MGF1SHA256, OaepAlgorithm, OaepPrivateDecryptingKey,
    OaepPublicEncryptingKey, Pkcs1PrivateDecryptingKey, Pkcs1PublicEncryptingKey,
    PrivateDecryptingKey, PublicEncryptingKey,
};
use jwx_error::ErrorContext;
use zeroize::Zeroizing;

use crate::jose::{
    ContentEncryptionAlgorithm, ErrorKind, JoseError, KeyManagementAlgorithm, ProviderContext,
    RsaPrivateKey, RsaPublicKey, error::WithKind,
};

use super::ContentEncryptionKeys;

fn oaep_algorithm(alg: KeyManagementAlgorithm) -> Option<&'static OaepAlgorithm> {
    match alg {
        KeyManagementAlgorithm::RsaOaep => Some(&OAEP_SHA1_MGF1SHA1),
        KeyManagementAlgorithm::RsaOaep256 => Some(&OAEP_SHA256_MGF1SHA256),
        _ => None,
    }
}

/// Encrypt a fresh (or the given) CEK to the recipient's public key.
pub(super) fn encrypt_cek(
    alg: KeyManagementAlgorithm,
    key: &RsaPublicKey,
    enc: ContentEncryptionAlgorithm,
    cek_override: Option<&[u8]>,
    ctx: &ProviderContext,
) -> Result<ContentEncryptionKeys, JoseError> {
    let cek = match cek_override {
        Some(cek) => Zeroizing::new(cek.to_vec()),
        None => ctx.random_bytes(enc.cek_len())?,
    };
    let public = PublicEncryptingKey::from_der(&key.subject_public_key_info())
        .context("load RSA public key")
        .with_kind(ErrorKind::Key)?;

    let encrypted_key = match oaep_algorithm(alg) {
        Some(oaep) => {
            let public = OaepPublicEncryptingKey::new(public)
                .context("create RSA-OAEP key")
                .with_kind(ErrorKind::Key)?;
            let mut out = vec![0u8; public.ciphertext_size()];
            public
                .encrypt(oaep, &cek, &mut out, None)
                .context("RSA-OAEP encrypt CEK")
                .with_kind(ErrorKind::Key)?
                .to_vec()
        }
        None => {
            let public = Pkcs1PublicEncryptingKey::new(public)
                .context("create RSA1_5 key")
                .with_kind(ErrorKind::Key)?;
            let mut out = vec![0u8; public.ciphertext_size()];
            public
                .encrypt(&cek, &mut out)
                .context("RSA1_5 encrypt CEK")
                .with_kind(ErrorKind::Key)?
                .to_vec()
        }
    };
    Ok(ContentEncryptionKeys { cek, encrypted_key })
}

/// Decrypt the CEK.
///
/// For RSA1_5 any failure yields a random CEK instead, so that a bad
/// encrypted key only surfaces later as the same cryptographic failure
/// as a bad tag (RFC 7516 section 11.5).
pub(super) fn decrypt_cek(
    alg: KeyManagementAlgorithm,
    key: &RsaPrivateKey,
    encrypted_key: &[u8],
    enc: ContentEncryptionAlgorithm,
    ctx: &ProviderContext,
) -> Result<Zeroizing<Vec<u8>>, JoseError> {
    let private = PrivateDecryptingKey::from_pkcs8(key.pkcs8_der())
        .context("load RSA private key")
        .with_kind(ErrorKind::Key)?;

    match oaep_algorithm(alg) {
        Some(oaep) => {
            let private = OaepPrivateDecryptingKey::new(private)
                .context("create RSA-OAEP key")
                .with_kind(ErrorKind::Key)?;
            let mut out = Zeroizing::new(vec![0u8; private.min_output_size()]);
            let cek_len = private
                .decrypt(oaep, encrypted_key, &mut out, None)
                .context("RSA-OAEP decrypt CEK")
                .with_kind(ErrorKind::CryptographicFailure)?
                .len();
            out.truncate(cek_len);
            if out.len() != enc.cek_len() {
                return Err(JoseError::cryptographic_failure());
            }
            Ok(out)
        }
        None => {
            let private = Pkcs1PrivateDecryptingKey::new(private)
                .context("create RSA1_5 key")
                .with_kind(ErrorKind::Key)?;
            let mut out = Zeroizing::new(vec![0u8; private.min_output_size()]);
            let decrypted_len = private
                .decrypt(encrypted_key, &mut out)
                .ok()
                .map(|cek| cek.len())
                .filter(|len| *len == enc.cek_len());
            match decrypted_len {
                Some(len) => {
                    out.truncate(len);
                    Ok(out)
                }
                None => {
                    tracing::debug!(
                        alg = %alg,
                        "RSA1_5 CEK decryption failed, continuing with a random CEK"
                    );
                    ctx.random_bytes(enc.cek_len())
                }
            }
        }
    }
}
