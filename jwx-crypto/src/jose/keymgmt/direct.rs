use zeroize::Zeroizing;

use crate::jose::{ErrorKind, JoseError, OctetKey};

use super::ContentEncryptionKeys;

pub(super) fn encrypt_cek(key: &OctetKey) -> ContentEncryptionKeys {
    ContentEncryptionKeys {
        cek: Zeroizing::new(key.as_bytes().to_vec()),
        encrypted_key: Vec::new(),
    }
}

pub(super) fn decrypt_cek(
    key: &OctetKey,
    encrypted_key: &[u8],
) -> Result<Zeroizing<Vec<u8>>, JoseError> {
    if !encrypted_key.is_empty() {
        return Err(JoseError::from_display(
            ErrorKind::Structural,
            "encrypted key must be empty when the key is used directly",
        ));
    }
    Ok(Zeroizing::new(key.as_bytes().to_vec()))
}
