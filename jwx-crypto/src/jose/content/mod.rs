//! Content encryption: AES_CBC_HMAC_SHA2 and AES GCM.

use zeroize::Zeroizing;

use crate::jose::{ContentEncryptionAlgorithm, ErrorKind, JoseError, ProviderContext};

mod cbc_hmac;
mod gcm;
mod zip;

pub use zip::DEFAULT_MAX_INFLATED_LEN;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// What a content encryption key must look like for a [`ContentEncryptionAlgorithm`].
pub struct ContentEncryptionKeyDescriptor {
    byte_len: usize,
    key_algorithm: &'static str,
}

impl ContentEncryptionKeyDescriptor {
    /// Required CEK length in bytes.
    pub fn byte_len(&self) -> usize {
        self.byte_len
    }

    /// Symmetric algorithm the CEK is used with.
    pub fn key_algorithm(&self) -> &'static str {
        self.key_algorithm
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Output of [`ContentEncryptionAlgorithm::encrypt`].
pub struct ContentEncryptionParts {
    iv: Vec<u8>,
    ciphertext: Vec<u8>,
    tag: Vec<u8>,
}

impl ContentEncryptionParts {
    pub fn new(iv: Vec<u8>, ciphertext: Vec<u8>, tag: Vec<u8>) -> Self {
        Self {
            iv,
            ciphertext,
            tag,
        }
    }

    pub fn iv(&self) -> &[u8] {
        &self.iv
    }

    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    pub fn tag(&self) -> &[u8] {
        &self.tag
    }
}

impl ContentEncryptionAlgorithm {
    /// Required CEK length in bytes.
    pub const fn cek_len(self) -> usize {
        match self {
            Self::A128CbcHs256 => 32,
            Self::A192CbcHs384 => 48,
            Self::A256CbcHs512 => 64,
            Self::A128Gcm => 16,
            Self::A192Gcm => 24,
            Self::A256Gcm => 32,
        }
    }

    /// IV length in bytes.
    pub const fn iv_len(self) -> usize {
        if self.is_gcm() {
            gcm::IV_LEN
        } else {
            cbc_hmac::IV_LEN
        }
    }

    const fn is_gcm(self) -> bool {
        matches!(self, Self::A128Gcm | Self::A192Gcm | Self::A256Gcm)
    }

    pub const fn cek_descriptor(self) -> ContentEncryptionKeyDescriptor {
        ContentEncryptionKeyDescriptor {
            byte_len: self.cek_len(),
            key_algorithm: "AES",
        }
    }

    fn check_cek(self, cek: &[u8]) -> Result<(), JoseError> {
        if cek.len() != self.cek_len() {
            return Err(JoseError::from_display(
                ErrorKind::Key,
                format!(
                    "{self} requires a {} bit key, got {} bits",
                    self.cek_len() * 8,
                    cek.len() * 8
                ),
            ));
        }
        Ok(())
    }

    /// Encrypt `plaintext` under `cek`, authenticating `aad`.
    ///
    /// A random IV is drawn from the provider's random source unless `iv_override` is given.
    pub fn encrypt(
        self,
        plaintext: &[u8],
        aad: &[u8],
        cek: &[u8],
        iv_override: Option<&[u8]>,
        ctx: &ProviderContext,
    ) -> Result<ContentEncryptionParts, JoseError> {
        self.descriptor().ensure_available()?;
        self.check_cek(cek)?;
        let iv = match iv_override {
            Some(iv) => iv.to_vec(),
            None => ctx.random_bytes(self.iv_len())?.to_vec(),
        };
        let (ciphertext, tag) = if self.is_gcm() {
            gcm::encrypt(self, plaintext, aad, cek, &iv)?
        } else {
            cbc_hmac::encrypt(self, plaintext, aad, cek, &iv)?
        };
        Ok(ContentEncryptionParts {
            iv,
            ciphertext,
            tag,
        })
    }

    /// Authenticate and decrypt.
    ///
    /// Any tag, IV or padding problem is the same bare [`ErrorKind::CryptographicFailure`].
    pub fn decrypt(
        self,
        parts: &ContentEncryptionParts,
        aad: &[u8],
        cek: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, JoseError> {
        self.descriptor().ensure_available()?;
        self.check_cek(cek)?;
        let ContentEncryptionParts {
            iv,
            ciphertext,
            tag,
        } = parts;
        if self.is_gcm() {
            gcm::decrypt(self, iv, ciphertext, tag, aad, cek)
        } else {
            cbc_hmac::decrypt(self, iv, ciphertext, tag, aad, cek)
        }
    }
}
