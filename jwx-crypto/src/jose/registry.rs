use std::{fmt, sync::OnceLock};

use crate::jose::{ErrorKind, JoseError, KeyType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Which part of a JOSE message an algorithm belongs to.
pub enum AlgorithmFamily {
    /// JWS "alg"
    Signature,
    /// JWE "alg"
    KeyManagement,
    /// JWE "enc"
    ContentEncryption,
    /// JWE "zip"
    Compression,
}

impl fmt::Display for AlgorithmFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Signature => "signature",
            Self::KeyManagement => "key management",
            Self::ContentEncryption => "content encryption",
            Self::Compression => "zip compression",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// What kind of key an algorithm expects.
pub enum KeyPersuasion {
    Symmetric,
    Asymmetric,
    None,
}

/// Static description of a registered algorithm.
pub struct AlgorithmDescriptor {
    id: &'static str,
    family: AlgorithmFamily,
    key_byte_len: Option<usize>,
    persuasion: KeyPersuasion,
    key_type: Option<KeyType>,
    check: fn() -> bool,
    available: OnceLock<bool>,
}

impl AlgorithmDescriptor {
    const fn new(
        id: &'static str,
        family: AlgorithmFamily,
        key_byte_len: Option<usize>,
        persuasion: KeyPersuasion,
        key_type: Option<KeyType>,
        check: fn() -> bool,
    ) -> Self {
        Self {
            id,
            family,
            key_byte_len,
            persuasion,
            key_type,
            check,
            available: OnceLock::new(),
        }
    }

    /// Identifier as used in JOSE headers.
    pub fn id(&self) -> &'static str {
        self.id
    }

    pub fn family(&self) -> AlgorithmFamily {
        self.family
    }

    /// Exact or minimum key length in bytes, where the algorithm defines one.
    ///
    /// For HMAC this is the minimum key length, for AES key wrap the KEK length
    /// and for content encryption the CEK length.
    pub fn key_byte_len(&self) -> Option<usize> {
        self.key_byte_len
    }

    pub fn persuasion(&self) -> KeyPersuasion {
        self.persuasion
    }

    /// Key type ("kty") of keys used with this algorithm.
    pub fn key_type(&self) -> Option<KeyType> {
        self.key_type
    }

    /// Whether the crypto provider can execute this algorithm.
    ///
    /// Checked once, on first use, by running the operation on the provider.
    pub fn is_available(&self) -> bool {
        *self.available.get_or_init(|| {
            let available = (self.check)();
            tracing::debug!(
                algorithm = self.id,
                family = %self.family,
                available,
                "checked algorithm availability"
            );
            available
        })
    }

    pub(crate) fn ensure_available(&self) -> Result<(), JoseError> {
        if self.is_available() {
            Ok(())
        } else {
            Err(JoseError::from_display(
                ErrorKind::InvalidAlgorithm,
                format!("{} algorithm '{}' is not available", self.family, self.id),
            ))
        }
    }
}

impl fmt::Debug for AlgorithmDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlgorithmDescriptor")
            .field("id", &self.id)
            .field("family", &self.family)
            .field("key_byte_len", &self.key_byte_len)
            .field("persuasion", &self.persuasion)
            .field("key_type", &self.key_type)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Read-only registry of the algorithms of one [`AlgorithmFamily`].
///
/// The tables are immutable statics; availability is computed lazily and memoized.
pub struct AlgorithmRegistry {
    family: AlgorithmFamily,
}

impl AlgorithmRegistry {
    pub const SIGNATURE: Self = Self {
        family: AlgorithmFamily::Signature,
    };
    pub const KEY_MANAGEMENT: Self = Self {
        family: AlgorithmFamily::KeyManagement,
    };
    pub const CONTENT_ENCRYPTION: Self = Self {
        family: AlgorithmFamily::ContentEncryption,
    };
    pub const COMPRESSION: Self = Self {
        family: AlgorithmFamily::Compression,
    };

    pub fn family(&self) -> AlgorithmFamily {
        self.family
    }

    pub(crate) fn descriptors(&self) -> &'static [AlgorithmDescriptor] {
        match self.family {
            AlgorithmFamily::Signature => &SIGNATURE_ALGORITHMS,
            AlgorithmFamily::KeyManagement => &KEY_MANAGEMENT_ALGORITHMS,
            AlgorithmFamily::ContentEncryption => &CONTENT_ENCRYPTION_ALGORITHMS,
            AlgorithmFamily::Compression => &COMPRESSION_ALGORITHMS,
        }
    }

    /// Look up an algorithm by identifier.
    ///
    /// Unknown identifiers fail with [`ErrorKind::InvalidAlgorithm`].
    pub fn lookup(&self, id: &str) -> Result<&'static AlgorithmDescriptor, JoseError> {
        self.descriptors()
            .iter()
            .find(|descriptor| descriptor.id == id)
            .ok_or_else(|| {
                JoseError::from_display(
                    ErrorKind::InvalidAlgorithm,
                    format!("unknown {} algorithm '{id}'", self.family),
                )
            })
    }

    /// Whether `id` is registered and usable with the current provider.
    pub fn is_available(&self, id: &str) -> bool {
        self.lookup(id)
            .is_ok_and(|descriptor| descriptor.is_available())
    }

    /// Identifiers of every registered algorithm that is available.
    pub fn supported_ids(&self) -> impl Iterator<Item = &'static str> {
        self.descriptors()
            .iter()
            .filter(|descriptor| descriptor.is_available())
            .map(|descriptor| descriptor.id)
    }
}

use AlgorithmFamily::{
    Compression as ZIP, ContentEncryption as ENC, KeyManagement as KM, Signature as SIG,
};
use KeyPersuasion::{Asymmetric, None as NoKey, Symmetric};

// Order of each table matches the variant order of its typed enum.

static SIGNATURE_ALGORITHMS: [AlgorithmDescriptor; 13] = [
    AlgorithmDescriptor::new("HS256", SIG, Some(32), Symmetric, Some(KeyType::Octet), availability::hmac),
    AlgorithmDescriptor::new("HS384", SIG, Some(48), Symmetric, Some(KeyType::Octet), availability::hmac),
    AlgorithmDescriptor::new("HS512", SIG, Some(64), Symmetric, Some(KeyType::Octet), availability::hmac),
    AlgorithmDescriptor::new("RS256", SIG, None, Asymmetric, Some(KeyType::Rsa), availability::rsa_pkcs1_sign),
    AlgorithmDescriptor::new("RS384", SIG, None, Asymmetric, Some(KeyType::Rsa), availability::rsa_pkcs1_sign),
    AlgorithmDescriptor::new("RS512", SIG, None, Asymmetric, Some(KeyType::Rsa), availability::rsa_pkcs1_sign),
    AlgorithmDescriptor::new("ES256", SIG, None, Asymmetric, Some(KeyType::Ec), availability::p256),
    AlgorithmDescriptor::new("ES384", SIG, None, Asymmetric, Some(KeyType::Ec), availability::p384),
    AlgorithmDescriptor::new("ES512", SIG, None, Asymmetric, Some(KeyType::Ec), availability::p521),
    AlgorithmDescriptor::new("PS256", SIG, None, Asymmetric, Some(KeyType::Rsa), availability::rsa_pss_sign),
    AlgorithmDescriptor::new("PS384", SIG, None, Asymmetric, Some(KeyType::Rsa), availability::rsa_pss_sign),
    AlgorithmDescriptor::new("PS512", SIG, None, Asymmetric, Some(KeyType::Rsa), availability::rsa_pss_sign),
    AlgorithmDescriptor::new("none", SIG, None, NoKey, None, availability::always),
];

static KEY_MANAGEMENT_ALGORITHMS: [AlgorithmDescriptor; 11] = [
    AlgorithmDescriptor::new("dir", KM, None, Symmetric, Some(KeyType::Octet), availability::always),
    AlgorithmDescriptor::new("A128KW", KM, Some(16), Symmetric, Some(KeyType::Octet), availability::aes_kw_128),
    AlgorithmDescriptor::new("A192KW", KM, Some(24), Symmetric, Some(KeyType::Octet), availability::aes_kw_192),
    AlgorithmDescriptor::new("A256KW", KM, Some(32), Symmetric, Some(KeyType::Octet), availability::aes_kw_256),
    AlgorithmDescriptor::new("RSA1_5", KM, None, Asymmetric, Some(KeyType::Rsa), availability::rsa_pkcs1_encrypt),
    AlgorithmDescriptor::new("RSA-OAEP", KM, None, Asymmetric, Some(KeyType::Rsa), availability::rsa_oaep_sha1),
    AlgorithmDescriptor::new("RSA-OAEP-256", KM, None, Asymmetric, Some(KeyType::Rsa), availability::rsa_oaep_sha256),
    AlgorithmDescriptor::new("ECDH-ES", KM, None, Asymmetric, Some(KeyType::Ec), availability::ecdh),
    AlgorithmDescriptor::new("ECDH-ES+A128KW", KM, Some(16), Asymmetric, Some(KeyType::Ec), availability::ecdh_aes_kw_128),
    AlgorithmDescriptor::new("ECDH-ES+A192KW", KM, Some(24), Asymmetric, Some(KeyType::Ec), availability::ecdh_aes_kw_192),
    AlgorithmDescriptor::new("ECDH-ES+A256KW", KM, Some(32), Asymmetric, Some(KeyType::Ec), availability::ecdh_aes_kw_256),
];

static CONTENT_ENCRYPTION_ALGORITHMS: [AlgorithmDescriptor; 6] = [
    AlgorithmDescriptor::new("A128CBC-HS256", ENC, Some(32), Symmetric, None, availability::aes_cbc_128),
    AlgorithmDescriptor::new("A192CBC-HS384", ENC, Some(48), Symmetric, None, availability::aes_cbc_192),
    AlgorithmDescriptor::new("A256CBC-HS512", ENC, Some(64), Symmetric, None, availability::aes_cbc_256),
    AlgorithmDescriptor::new("A128GCM", ENC, Some(16), Symmetric, None, availability::aes_gcm_128),
    AlgorithmDescriptor::new("A192GCM", ENC, Some(24), Symmetric, None, availability::aes_gcm_192),
    AlgorithmDescriptor::new("A256GCM", ENC, Some(32), Symmetric, None, availability::aes_gcm_256),
];

static COMPRESSION_ALGORITHMS: [AlgorithmDescriptor; 1] = [AlgorithmDescriptor::new(
    "DEF",
    ZIP,
    None,
    NoKey,
    None,
    availability::always,
)];

/// Tiny provider operations used to decide availability.
mod availability {
    use std::sync::OnceLock;

    use aws_lc_rs::{
        aead, agreement, cipher,
        encoding::{AsDer, Pkcs8V1Der},
        hmac,
        key_wrap::{self, AesKek, KeyWrap as _},
        rand::SystemRandom,
        rsa::{
            KeySize, OAEP_SHA1_MGF1SHA1, OAEP_SHA256_MGF1SHA256, OaepAlgorithm,
            OaepPrivateDecryptingKey, OaepPublicEncryptingKey, Pkcs1PrivateDecryptingKey,
            Pkcs1PublicEncryptingKey, PrivateDecryptingKey,
        },
        signature::{
            self, KeyPair as _, RsaEncoding, RsaKeyPair, RsaParameters, UnparsedPublicKey,
        },
    };

    const MESSAGE: &[u8] = b"availability";

    pub(super) fn always() -> bool {
        true
    }

    pub(super) fn hmac() -> bool {
        let key = hmac::Key::new(hmac::HMAC_SHA256, &[0u8; 32]);
        hmac::sign(&key, MESSAGE).as_ref().len() == 32
    }

    /// Shared 2048 bit key pair, as PKCS#8, generated on first use.
    fn rsa_pkcs8() -> Option<&'static [u8]> {
        static PKCS8: OnceLock<Option<Vec<u8>>> = OnceLock::new();
        PKCS8
            .get_or_init(|| {
                let key_pair = RsaKeyPair::generate(KeySize::Rsa2048).ok()?;
                let pkcs8: Pkcs8V1Der<'static> = key_pair.as_der().ok()?;
                Some(pkcs8.as_ref().to_vec())
            })
            .as_deref()
    }

    fn rsa_sign(padding: &'static dyn RsaEncoding, verification: &'static RsaParameters) -> bool {
        let Some(key_pair) = rsa_pkcs8().and_then(|der| RsaKeyPair::from_pkcs8(der).ok()) else {
            return false;
        };
        let mut sig = vec![0u8; key_pair.public_modulus_len()];
        if key_pair
            .sign(padding, &SystemRandom::new(), MESSAGE, &mut sig)
            .is_err()
        {
            return false;
        }
        UnparsedPublicKey::new(verification, key_pair.public_key().as_ref())
            .verify(MESSAGE, &sig)
            .is_ok()
    }

    pub(super) fn rsa_pkcs1_sign() -> bool {
        rsa_sign(&signature::RSA_PKCS1_SHA256, &signature::RSA_PKCS1_2048_8192_SHA256)
    }

    pub(super) fn rsa_pss_sign() -> bool {
        rsa_sign(&signature::RSA_PSS_SHA256, &signature::RSA_PSS_2048_8192_SHA256)
    }

    fn rsa_decrypting_key() -> Option<PrivateDecryptingKey> {
        rsa_pkcs8().and_then(|der| PrivateDecryptingKey::from_pkcs8(der).ok())
    }

    fn rsa_oaep(alg: &'static OaepAlgorithm) -> bool {
        let Some(private) = rsa_decrypting_key() else {
            return false;
        };
        let Ok(public) = OaepPublicEncryptingKey::new(private.public_key()) else {
            return false;
        };
        let Ok(private) = OaepPrivateDecryptingKey::new(private) else {
            return false;
        };
        let mut ciphertext = vec![0u8; public.ciphertext_size()];
        let Ok(ciphertext) = public.encrypt(alg, MESSAGE, &mut ciphertext, None) else {
            return false;
        };
        let mut plaintext = vec![0u8; private.min_output_size()];
        private
            .decrypt(alg, ciphertext, &mut plaintext, None)
            .is_ok_and(|plaintext| plaintext == MESSAGE)
    }

    pub(super) fn rsa_oaep_sha1() -> bool {
        rsa_oaep(&OAEP_SHA1_MGF1SHA1)
    }

    pub(super) fn rsa_oaep_sha256() -> bool {
        rsa_oaep(&OAEP_SHA256_MGF1SHA256)
    }

    pub(super) fn rsa_pkcs1_encrypt() -> bool {
        let Some(private) = rsa_decrypting_key() else {
            return false;
        };
        let Ok(public) = Pkcs1PublicEncryptingKey::new(private.public_key()) else {
            return false;
        };
        let Ok(private) = Pkcs1PrivateDecryptingKey::new(private) else {
            return false;
        };
        let mut ciphertext = vec![0u8; public.ciphertext_size()];
        let Ok(ciphertext) = public.encrypt(MESSAGE, &mut ciphertext) else {
            return false;
        };
        let mut plaintext = vec![0u8; private.min_output_size()];
        private
            .decrypt(ciphertext, &mut plaintext)
            .is_ok_and(|plaintext| plaintext == MESSAGE)
    }

    /// Ephemeral-static agreement on the given curve.
    fn ec(alg: &'static agreement::Algorithm) -> bool {
        let (Ok(ours), Ok(theirs)) = (
            agreement::PrivateKey::generate(alg),
            agreement::PrivateKey::generate(alg),
        ) else {
            return false;
        };
        let Ok(their_public) = theirs.compute_public_key() else {
            return false;
        };
        agreement::agree(
            &ours,
            &agreement::UnparsedPublicKey::new(alg, their_public.as_ref()),
            (),
            |secret| Ok(!secret.is_empty()),
        )
        .unwrap_or(false)
    }

    pub(super) fn p256() -> bool {
        ec(&agreement::ECDH_P256)
    }

    pub(super) fn p384() -> bool {
        ec(&agreement::ECDH_P384)
    }

    pub(super) fn p521() -> bool {
        ec(&agreement::ECDH_P521)
    }

    /// ECDH-ES accepts keys on any of the NIST curves.
    pub(super) fn ecdh() -> bool {
        p256() && p384() && p521()
    }

    fn aes_kw(cipher: &'static key_wrap::AesBlockCipher, key_len: usize) -> bool {
        let Ok(kek) = AesKek::new(cipher, &vec![0u8; key_len]) else {
            return false;
        };
        let mut out = [0u8; 24];
        kek.wrap(&[0u8; 16], &mut out).is_ok()
    }

    pub(super) fn aes_kw_128() -> bool {
        aes_kw(&key_wrap::AES_128, 16)
    }

    pub(super) fn aes_kw_192() -> bool {
        // the provider's key wrap API has no AES-192 cipher
        false
    }

    pub(super) fn aes_kw_256() -> bool {
        aes_kw(&key_wrap::AES_256, 32)
    }

    pub(super) fn ecdh_aes_kw_128() -> bool {
        ecdh() && aes_kw_128()
    }

    pub(super) fn ecdh_aes_kw_192() -> bool {
        ecdh() && aes_kw_192()
    }

    pub(super) fn ecdh_aes_kw_256() -> bool {
        ecdh() && aes_kw_256()
    }

    fn aes_cbc(alg: &'static cipher::Algorithm, key_len: usize) -> bool {
        cipher::UnboundCipherKey::new(alg, &vec![0u8; key_len])
            .and_then(cipher::PaddedBlockEncryptingKey::cbc_pkcs7)
            .is_ok()
    }

    pub(super) fn aes_cbc_128() -> bool {
        aes_cbc(&cipher::AES_128, 16) && hmac()
    }

    pub(super) fn aes_cbc_192() -> bool {
        aes_cbc(&cipher::AES_192, 24) && hmac()
    }

    pub(super) fn aes_cbc_256() -> bool {
        aes_cbc(&cipher::AES_256, 32) && hmac()
    }

    fn aes_gcm(alg: &'static aead::Algorithm, key_len: usize) -> bool {
        aead::UnboundKey::new(alg, &vec![0u8; key_len]).is_ok()
    }

    pub(super) fn aes_gcm_128() -> bool {
        aes_gcm(&aead::AES_128_GCM, 16)
    }

    pub(super) fn aes_gcm_192() -> bool {
        aes_gcm(&aead::AES_192_GCM, 24)
    }

    pub(super) fn aes_gcm_256() -> bool {
        aes_gcm(&aead::AES_256_GCM, 32)
    }
}
