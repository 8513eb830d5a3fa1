use aws_lc_rs::key_wrap::{AES_128, AES_256, AesKek, KeyWrap as _};
use jwx_error::ErrorContext;
use zeroize::Zeroizing;

use crate::jose::{
    ContentEncryptionAlgorithm, ErrorKind, JoseError, KeyManagementAlgorithm, ProviderContext,
    error::WithKind,
};

use super::ContentEncryptionKeys;

/// RFC 3394 adds one 64-bit integrity block.
const WRAP_OVERHEAD: usize = 8;

fn kek(alg: KeyManagementAlgorithm, key: &[u8]) -> Result<AesKek, JoseError> {
    let cipher = match alg {
        KeyManagementAlgorithm::A128KW => &AES_128,
        KeyManagementAlgorithm::A256KW => &AES_256,
        _ => {
            return Err(JoseError::from_display(
                ErrorKind::InvalidAlgorithm,
                format!("AES key wrap with {alg} is not available"),
            ));
        }
    };
    AesKek::new(cipher, key)
        .context("load AES key encryption key")
        .with_kind(ErrorKind::Key)
}

/// Wrap a fresh (or the given) CEK under `key`.
pub(super) fn wrap_cek(
    alg: KeyManagementAlgorithm,
    key: &[u8],
    enc: ContentEncryptionAlgorithm,
    cek_override: Option<&[u8]>,
    ctx: &ProviderContext,
) -> Result<ContentEncryptionKeys, JoseError> {
    let cek = match cek_override {
        Some(cek) => Zeroizing::new(cek.to_vec()),
        None => ctx.random_bytes(enc.cek_len())?,
    };
    let mut encrypted_key = vec![0u8; cek.len() + WRAP_OVERHEAD];
    let wrapped_len = kek(alg, key)?
        .wrap(&cek, &mut encrypted_key)
        .context("AES key wrap")
        .with_kind(ErrorKind::CryptographicFailure)?
        .len();
    encrypted_key.truncate(wrapped_len);
    Ok(ContentEncryptionKeys { cek, encrypted_key })
}

/// Unwrap the CEK; integrity and length failures are cryptographic failures.
pub(super) fn unwrap_cek(
    alg: KeyManagementAlgorithm,
    key: &[u8],
    encrypted_key: &[u8],
    enc: ContentEncryptionAlgorithm,
) -> Result<Zeroizing<Vec<u8>>, JoseError> {
    let kek = kek(alg, key)?;
    let mut cek = Zeroizing::new(vec![0u8; encrypted_key.len()]);
    let cek_len = kek
        .unwrap(encrypted_key, &mut cek)
        .context("AES key unwrap")
        .with_kind(ErrorKind::CryptographicFailure)?
        .len();
    cek.truncate(cek_len);
    if cek.len() != enc.cek_len() {
        return Err(JoseError::cryptographic_failure());
    }
    Ok(cek)
}

#[cfg(test)]
mod tests {
    use base64::{Engine as _, prelude::BASE64_URL_SAFE_NO_PAD};

    use super::*;

    const CEK: [u8; 32] = [
        4, 211, 31, 197, 84, 157, 252, 254, 11, 100, 157, 250, 63, 170, 106, 206, 107, 124, 212,
        45, 111, 107, 9, 219, 200, 177, 0, 240, 143, 156, 44, 207,
    ];

    #[test]
    fn rfc7516_a3_key_wrap() {
        let key = BASE64_URL_SAFE_NO_PAD.decode("GawgguFyGrWKav7AX4VKUg").unwrap();
        let keys = wrap_cek(
            KeyManagementAlgorithm::A128KW,
            &key,
            ContentEncryptionAlgorithm::A128CbcHs256,
            Some(&CEK),
            &ProviderContext::default(),
        )
        .unwrap();
        assert_eq!(
            BASE64_URL_SAFE_NO_PAD.encode(keys.encrypted_key()),
            "6KB707dM9YTIgHtLvtgWQ8mKwboJW3of9locizkDTHzBC2IlrT1oOQ"
        );

        let cek = unwrap_cek(
            KeyManagementAlgorithm::A128KW,
            &key,
            keys.encrypted_key(),
            ContentEncryptionAlgorithm::A128CbcHs256,
        )
        .unwrap();
        assert_eq!(cek.as_slice(), &CEK);
    }

    #[test]
    fn unwrap_with_wrong_key_fails_bare() {
        let ctx = ProviderContext::default();
        let enc = ContentEncryptionAlgorithm::A256Gcm;
        let keys = wrap_cek(KeyManagementAlgorithm::A256KW, &[1u8; 32], enc, None, &ctx).unwrap();
        assert_eq!(keys.encrypted_key().len(), 40);

        let err = unwrap_cek(KeyManagementAlgorithm::A256KW, &[2u8; 32], keys.encrypted_key(), enc)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CryptographicFailure);

        // right key, but the CEK does not fit the content encryption algorithm
        let err = unwrap_cek(
            KeyManagementAlgorithm::A256KW,
            &[1u8; 32],
            keys.encrypted_key(),
            ContentEncryptionAlgorithm::A128Gcm,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CryptographicFailure);
    }
}
