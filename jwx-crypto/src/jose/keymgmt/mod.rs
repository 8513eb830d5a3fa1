//! Key management: how the content encryption key (CEK) of a JWE is
//! established between producer and consumer.

use zeroize::Zeroizing;

use crate::jose::{
    ContentEncryptionAlgorithm, ErrorKind, Headers, JoseError, Key, KeyManagementAlgorithm,
    MIN_RSA_KEY_BITS, ProviderContext,
};

mod aes_kw;
mod direct;
mod ecdh;
mod rsa;

/// CEK together with its encrypted form for the JWE "encrypted key" part.
pub struct ContentEncryptionKeys {
    cek: Zeroizing<Vec<u8>>,
    encrypted_key: Vec<u8>,
}

impl ContentEncryptionKeys {
    pub fn cek(&self) -> &[u8] {
        &self.cek
    }

    /// Empty for direct modes.
    pub fn encrypted_key(&self) -> &[u8] {
        &self.encrypted_key
    }
}

impl std::fmt::Debug for ContentEncryptionKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentEncryptionKeys")
            .field("encrypted_key_len", &self.encrypted_key.len())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Encrypt,
    Decrypt,
}

impl KeyManagementAlgorithm {
    /// Establish the CEK for a new JWE.
    ///
    /// Algorithms that agree on a key (ECDH-ES) add their parameters to `headers`.
    /// A `cek_override` is refused for "dir" and "ECDH-ES", where the CEK
    /// is dictated by the key (agreement).
    pub fn manage_for_encrypt(
        self,
        key: &Key,
        enc: ContentEncryptionAlgorithm,
        headers: &mut Headers,
        cek_override: Option<&[u8]>,
        ctx: &ProviderContext,
    ) -> Result<ContentEncryptionKeys, JoseError> {
        self.descriptor().ensure_available()?;
        enc.descriptor().ensure_available()?;
        self.validate_encryption_key(key, enc, ctx)?;

        if let Some(cek) = cek_override {
            if matches!(self, Self::Dir | Self::EcdhEs) {
                return Err(JoseError::from_display(
                    ErrorKind::Key,
                    format!("CEK override not allowed with {self}"),
                ));
            }
            if cek.len() != enc.cek_len() {
                return Err(JoseError::from_display(
                    ErrorKind::Key,
                    format!(
                        "CEK override of {} bytes does not fit {enc}, which requires {}",
                        cek.len(),
                        enc.cek_len()
                    ),
                ));
            }
        }

        match self {
            Self::Dir => Ok(direct::encrypt_cek(key.as_octet()?)),
            Self::A128KW | Self::A192KW | Self::A256KW => {
                aes_kw::wrap_cek(self, key.as_octet()?.as_bytes(), enc, cek_override, ctx)
            }
            Self::Rsa1_5 | Self::RsaOaep | Self::RsaOaep256 => {
                rsa::encrypt_cek(self, key.rsa_public()?, enc, cek_override, ctx)
            }
            Self::EcdhEs | Self::EcdhEsA128KW | Self::EcdhEsA192KW | Self::EcdhEsA256KW => {
                ecdh::encrypt_cek(self, key.ec_public()?, enc, headers, cek_override, ctx)
            }
        }
    }

    /// Recover the CEK of a received JWE.
    ///
    /// `headers` is the joint header of the message, read for "epk", "apu" and "apv".
    pub fn manage_for_decrypt(
        self,
        key: &Key,
        encrypted_key: &[u8],
        enc: ContentEncryptionAlgorithm,
        headers: &Headers,
        ctx: &ProviderContext,
    ) -> Result<Zeroizing<Vec<u8>>, JoseError> {
        self.descriptor().ensure_available()?;
        enc.descriptor().ensure_available()?;
        self.validate_decryption_key(key, enc, ctx)?;

        match self {
            Self::Dir => direct::decrypt_cek(key.as_octet()?, encrypted_key),
            Self::A128KW | Self::A192KW | Self::A256KW => {
                aes_kw::unwrap_cek(self, key.as_octet()?.as_bytes(), encrypted_key, enc)
            }
            Self::Rsa1_5 | Self::RsaOaep | Self::RsaOaep256 => {
                rsa::decrypt_cek(self, key.as_rsa_private()?, encrypted_key, enc, ctx)
            }
            Self::EcdhEs | Self::EcdhEsA128KW | Self::EcdhEsA192KW | Self::EcdhEsA256KW => {
                ecdh::decrypt_cek(self, key.as_ec_private()?, encrypted_key, enc, headers)
            }
        }
    }

    /// Validate a key for [`KeyManagementAlgorithm::manage_for_encrypt`].
    pub fn validate_encryption_key(
        self,
        key: &Key,
        enc: ContentEncryptionAlgorithm,
        ctx: &ProviderContext,
    ) -> Result<(), JoseError> {
        self.validate_key(key, enc, Direction::Encrypt, ctx)
    }

    /// Validate a key for [`KeyManagementAlgorithm::manage_for_decrypt`].
    pub fn validate_decryption_key(
        self,
        key: &Key,
        enc: ContentEncryptionAlgorithm,
        ctx: &ProviderContext,
    ) -> Result<(), JoseError> {
        self.validate_key(key, enc, Direction::Decrypt, ctx)
    }

    fn validate_key(
        self,
        key: &Key,
        enc: ContentEncryptionAlgorithm,
        direction: Direction,
        ctx: &ProviderContext,
    ) -> Result<(), JoseError> {
        let result = self.check_key(key, enc, direction, ctx);
        if let Err(err) = &result {
            tracing::debug!(alg = %self, %enc, ?direction, %err, "key management key rejected");
        }
        result
    }

    fn check_key(
        self,
        key: &Key,
        enc: ContentEncryptionAlgorithm,
        direction: Direction,
        ctx: &ProviderContext,
    ) -> Result<(), JoseError> {
        match self {
            Self::Dir => {
                let key = key.as_octet()?;
                if key.len() != enc.cek_len() {
                    return Err(JoseError::from_display(
                        ErrorKind::Key,
                        format!(
                            "{enc} with {self} requires a {} bit key, got {} bits",
                            enc.cek_len() * 8,
                            key.bit_len()
                        ),
                    ));
                }
            }
            Self::A128KW | Self::A192KW | Self::A256KW => {
                let key = key.as_octet()?;
                let expected = self.descriptor().key_byte_len().unwrap_or_default();
                if key.len() != expected {
                    return Err(JoseError::from_display(
                        ErrorKind::Key,
                        format!(
                            "{self} requires a {} bit key, got {} bits",
                            expected * 8,
                            key.bit_len()
                        ),
                    ));
                }
            }
            Self::Rsa1_5 | Self::RsaOaep | Self::RsaOaep256 => {
                let public = match direction {
                    Direction::Encrypt => key.rsa_public()?,
                    Direction::Decrypt => key.as_rsa_private()?.public_key(),
                };
                let bits = public.modulus_bits();
                if ctx.key_validation_enabled() && bits < MIN_RSA_KEY_BITS {
                    return Err(JoseError::from_display(
                        ErrorKind::Key,
                        format!(
                            "{self} requires an RSA key of at least {MIN_RSA_KEY_BITS} bits, got {bits}"
                        ),
                    ));
                }
            }
            Self::EcdhEs | Self::EcdhEsA128KW | Self::EcdhEsA192KW | Self::EcdhEsA256KW => {
                let public = match direction {
                    Direction::Encrypt => key.ec_public()?,
                    Direction::Decrypt => key.as_ec_private()?.public_key(),
                };
                if !public.is_on_curve() {
                    return Err(JoseError::from_display(
                        ErrorKind::Key,
                        format!("EC key is not a point on {}", public.curve()),
                    ));
                }
            }
        }
        Ok(())
    }
}
