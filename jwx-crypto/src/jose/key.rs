use std::fmt;

use aws_lc_rs::{
    agreement,
    encoding::{AsDer, Pkcs8V1Der},
    rsa::KeySize,
    signature::{
        self, ECDSA_P256_SHA256_FIXED, ECDSA_P256_SHA256_FIXED_SIGNING, ECDSA_P384_SHA384_FIXED,
        ECDSA_P384_SHA384_FIXED_SIGNING, ECDSA_P521_SHA512_FIXED, ECDSA_P521_SHA512_FIXED_SIGNING,
        EcdsaKeyPair, EcdsaSigningAlgorithm, EcdsaVerificationAlgorithm, KeyPair as _, RsaKeyPair,
    },
};
use jwx_error::ErrorContext;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::jose::{
    ErrorKind, JoseError, KeyType, ProviderContext, curve,
    der::{self, RsaPrivateParts},
    error::WithKind,
};

/// Ephemeral and generated EC scalars are drawn until the provider accepts one.
const MAX_SCALAR_ATTEMPTS: usize = 16;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
/// NIST prime curves usable with ECDSA and ECDH-ES.
pub enum EllipticCurve {
    #[serde(rename = "P-256")]
    P256,
    #[serde(rename = "P-384")]
    P384,
    #[serde(rename = "P-521")]
    P521,
}

impl EllipticCurve {
    /// Registered "crv" name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::P256 => "P-256",
            Self::P384 => "P-384",
            Self::P521 => "P-521",
        }
    }

    /// Byte length of a field element (and of a private scalar).
    pub const fn field_size(self) -> usize {
        match self {
            Self::P256 => 32,
            Self::P384 => 48,
            Self::P521 => 66,
        }
    }

    pub(crate) fn agreement_algorithm(self) -> &'static agreement::Algorithm {
        match self {
            Self::P256 => &agreement::ECDH_P256,
            Self::P384 => &agreement::ECDH_P384,
            Self::P521 => &agreement::ECDH_P521,
        }
    }

    pub(crate) fn signing_algorithm(self) -> &'static EcdsaSigningAlgorithm {
        match self {
            Self::P256 => &ECDSA_P256_SHA256_FIXED_SIGNING,
            Self::P384 => &ECDSA_P384_SHA384_FIXED_SIGNING,
            Self::P521 => &ECDSA_P521_SHA512_FIXED_SIGNING,
        }
    }

    pub(crate) fn verification_algorithm(self) -> &'static EcdsaVerificationAlgorithm {
        match self {
            Self::P256 => &ECDSA_P256_SHA256_FIXED,
            Self::P384 => &ECDSA_P384_SHA384_FIXED,
            Self::P521 => &ECDSA_P521_SHA512_FIXED,
        }
    }
}

impl fmt::Display for EllipticCurve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Debug)]
/// Key material accepted by the signature, key management and content encryption engines.
pub enum Key {
    Octet(OctetKey),
    RsaPublic(RsaPublicKey),
    RsaPrivate(RsaPrivateKey),
    EcPublic(EcPublicKey),
    EcPrivate(EcPrivateKey),
}

impl Key {
    /// Symmetric key from raw bytes.
    pub fn octet(bytes: impl Into<Vec<u8>>) -> Self {
        Self::Octet(OctetKey::new(bytes))
    }

    pub fn key_type(&self) -> KeyType {
        match self {
            Self::Octet(_) => KeyType::Octet,
            Self::RsaPublic(_) | Self::RsaPrivate(_) => KeyType::Rsa,
            Self::EcPublic(_) | Self::EcPrivate(_) => KeyType::Ec,
        }
    }

    /// Public half of an asymmetric key. `None` for symmetric keys.
    pub fn public_key(&self) -> Option<Self> {
        match self {
            Self::Octet(_) => None,
            Self::RsaPublic(key) => Some(Self::RsaPublic(key.clone())),
            Self::RsaPrivate(key) => Some(Self::RsaPublic(key.public_key().clone())),
            Self::EcPublic(key) => Some(Self::EcPublic(key.clone())),
            Self::EcPrivate(key) => Some(Self::EcPublic(key.public_key().clone())),
        }
    }

    pub(crate) fn description(&self) -> &'static str {
        match self {
            Self::Octet(_) => "oct key",
            Self::RsaPublic(_) => "RSA public key",
            Self::RsaPrivate(_) => "RSA private key",
            Self::EcPublic(_) => "EC public key",
            Self::EcPrivate(_) => "EC private key",
        }
    }

    fn wrong_type(&self, expected: &str) -> JoseError {
        JoseError::from_display(
            ErrorKind::Key,
            format!("{expected} required, got {}", self.description()),
        )
    }

    pub(crate) fn as_octet(&self) -> Result<&OctetKey, JoseError> {
        match self {
            Self::Octet(key) => Ok(key),
            _ => Err(self.wrong_type("oct key")),
        }
    }

    /// RSA public key, taken from a private key if needed.
    pub(crate) fn rsa_public(&self) -> Result<&RsaPublicKey, JoseError> {
        match self {
            Self::RsaPublic(key) => Ok(key),
            Self::RsaPrivate(key) => Ok(key.public_key()),
            _ => Err(self.wrong_type("RSA key")),
        }
    }

    pub(crate) fn as_rsa_private(&self) -> Result<&RsaPrivateKey, JoseError> {
        match self {
            Self::RsaPrivate(key) => Ok(key),
            _ => Err(self.wrong_type("RSA private key")),
        }
    }

    /// EC public key, taken from a private key if needed.
    pub(crate) fn ec_public(&self) -> Result<&EcPublicKey, JoseError> {
        match self {
            Self::EcPublic(key) => Ok(key),
            Self::EcPrivate(key) => Ok(key.public_key()),
            _ => Err(self.wrong_type("EC key")),
        }
    }

    pub(crate) fn as_ec_private(&self) -> Result<&EcPrivateKey, JoseError> {
        match self {
            Self::EcPrivate(key) => Ok(key),
            _ => Err(self.wrong_type("EC private key")),
        }
    }
}

impl From<OctetKey> for Key {
    fn from(value: OctetKey) -> Self {
        Self::Octet(value)
    }
}

impl From<RsaPublicKey> for Key {
    fn from(value: RsaPublicKey) -> Self {
        Self::RsaPublic(value)
    }
}

impl From<RsaPrivateKey> for Key {
    fn from(value: RsaPrivateKey) -> Self {
        Self::RsaPrivate(value)
    }
}

impl From<EcPublicKey> for Key {
    fn from(value: EcPublicKey) -> Self {
        Self::EcPublic(value)
    }
}

impl From<EcPrivateKey> for Key {
    fn from(value: EcPrivateKey) -> Self {
        Self::EcPrivate(value)
    }
}

#[derive(Clone, PartialEq, Eq)]
/// Symmetric secret, zeroed on drop.
pub struct OctetKey(Zeroizing<Vec<u8>>);

impl OctetKey {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(Zeroizing::new(bytes.into()))
    }

    /// Generate `len` random bytes using the provider's [`RandomSource`](crate::jose::RandomSource).
    pub fn generate(len: usize, ctx: &ProviderContext) -> Result<Self, JoseError> {
        Ok(Self(ctx.random_bytes(len)?))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn bit_len(&self) -> usize {
        self.0.len() * 8
    }
}

impl fmt::Debug for OctetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OctetKey")
            .field("len", &self.0.len())
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
/// RSA public key kept as its unsigned big-endian modulus and exponent.
pub struct RsaPublicKey {
    n: Vec<u8>,
    e: Vec<u8>,
}

impl RsaPublicKey {
    /// Create a key from big-endian modulus and public exponent.
    pub fn from_components(n: &[u8], e: &[u8]) -> Result<Self, JoseError> {
        let n = der::strip_leading_zeros(n);
        let e = der::strip_leading_zeros(e);
        if n.is_empty() || e.is_empty() {
            return Err(JoseError::from_display(
                ErrorKind::Key,
                "RSA modulus and exponent must be non-zero",
            ));
        }
        Ok(Self {
            n: n.to_vec(),
            e: e.to_vec(),
        })
    }

    pub fn modulus(&self) -> &[u8] {
        &self.n
    }

    pub fn exponent(&self) -> &[u8] {
        &self.e
    }

    /// Size of the modulus in bits.
    pub fn modulus_bits(&self) -> usize {
        match self.n.first() {
            Some(first) => (self.n.len() - 1) * 8 + (8 - first.leading_zeros() as usize),
            None => 0,
        }
    }

    pub(crate) fn subject_public_key_info(&self) -> Vec<u8> {
        der::create_subject_public_key_info(&self.n, &self.e)
    }

    pub(crate) fn components(&self) -> signature::RsaPublicKeyComponents<&[u8]> {
        signature::RsaPublicKeyComponents {
            n: &self.n,
            e: &self.e,
        }
    }
}

#[derive(Clone)]
/// RSA private key, stored as PKCS#8 DER together with its public half.
pub struct RsaPrivateKey {
    pkcs8: Zeroizing<Vec<u8>>,
    public: RsaPublicKey,
}

impl RsaPrivateKey {
    /// Parse an unencrypted PKCS#8 v1 RSA private key.
    pub fn from_pkcs8_der(pkcs8: &[u8]) -> Result<Self, JoseError> {
        let key_pair = RsaKeyPair::from_pkcs8(pkcs8)
            .context("parse RSA PKCS#8 private key")
            .with_kind(ErrorKind::Key)?;
        let (n, e) = der::parse_rsa_public_key(key_pair.public_key().as_ref())
            .context("read RSA public key of key pair")
            .with_kind(ErrorKind::Key)?;
        Ok(Self {
            pkcs8: Zeroizing::new(pkcs8.to_vec()),
            public: RsaPublicKey { n, e },
        })
    }

    /// Generate a new key pair with the given modulus size.
    pub fn generate(size: KeySize) -> Result<Self, JoseError> {
        let key_pair = RsaKeyPair::generate(size)
            .context("generate RSA key pair")
            .with_kind(ErrorKind::Key)?;
        let pkcs8: Pkcs8V1Der<'static> = key_pair
            .as_der()
            .context("encode RSA key pair as PKCS#8")
            .with_kind(ErrorKind::Key)?;
        Self::from_pkcs8_der(pkcs8.as_ref())
    }

    pub(crate) fn from_parts(parts: &RsaPrivateParts) -> Result<Self, JoseError> {
        Self::from_pkcs8_der(&der::create_rsa_private_key_pkcs8(parts))
    }

    pub(crate) fn parts(&self) -> Result<RsaPrivateParts, JoseError> {
        der::parse_rsa_private_key_pkcs8(&self.pkcs8)
            .context("read RSA private key members")
            .with_kind(ErrorKind::Key)
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public
    }

    /// PKCS#8 v1 DER encoding of this key.
    pub fn pkcs8_der(&self) -> &[u8] {
        &self.pkcs8
    }

    pub(crate) fn key_pair(&self) -> Result<RsaKeyPair, JoseError> {
        RsaKeyPair::from_pkcs8(&self.pkcs8)
            .context("load RSA private key")
            .with_kind(ErrorKind::Key)
    }
}

impl fmt::Debug for RsaPrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RsaPrivateKey")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
/// EC public key as affine coordinates, each exactly the curve's field size.
pub struct EcPublicKey {
    curve: EllipticCurve,
    x: Vec<u8>,
    y: Vec<u8>,
}

impl EcPublicKey {
    /// Create a key from big-endian affine coordinates.
    ///
    /// Coordinates shorter than the field size are left-padded.
    /// No on-curve check is done here, see [`EcPublicKey::is_on_curve`].
    pub fn from_coordinates(curve: EllipticCurve, x: &[u8], y: &[u8]) -> Result<Self, JoseError> {
        Ok(Self {
            curve,
            x: left_pad(x, curve.field_size(), "x coordinate")?.to_vec(),
            y: left_pad(y, curve.field_size(), "y coordinate")?.to_vec(),
        })
    }

    /// Create a key from an uncompressed SEC1 point (`0x04 || x || y`).
    pub fn from_uncompressed_point(curve: EllipticCurve, point: &[u8]) -> Result<Self, JoseError> {
        let size = curve.field_size();
        match point.split_first() {
            Some((&0x04, coordinates)) if coordinates.len() == 2 * size => {
                let (x, y) = coordinates.split_at(size);
                Self::from_coordinates(curve, x, y)
            }
            _ => Err(JoseError::from_display(
                ErrorKind::Key,
                format!("not an uncompressed {curve} point"),
            )),
        }
    }

    pub fn curve(&self) -> EllipticCurve {
        self.curve
    }

    pub fn x(&self) -> &[u8] {
        &self.x
    }

    pub fn y(&self) -> &[u8] {
        &self.y
    }

    /// Uncompressed SEC1 encoding of this point.
    pub fn uncompressed_point(&self) -> Vec<u8> {
        let mut point = Vec::with_capacity(1 + self.x.len() + self.y.len());
        point.push(0x04);
        point.extend_from_slice(&self.x);
        point.extend_from_slice(&self.y);
        point
    }

    /// Whether this point lies on its curve.
    pub fn is_on_curve(&self) -> bool {
        curve::is_on_curve(self.curve, &self.x, &self.y)
    }
}

#[derive(Clone)]
/// EC private scalar with its public point.
pub struct EcPrivateKey {
    d: Zeroizing<Vec<u8>>,
    public: EcPublicKey,
}

impl EcPrivateKey {
    /// Create a key from a big-endian private scalar, computing its public point.
    pub fn from_scalar(curve: EllipticCurve, d: &[u8]) -> Result<Self, JoseError> {
        let d = Zeroizing::new(left_pad(d, curve.field_size(), "private scalar")?.to_vec());
        let private_key = agreement::PrivateKey::from_private_key(curve.agreement_algorithm(), &d)
            .context("load EC private scalar")
            .with_kind(ErrorKind::Key)?;
        let public_key = private_key
            .compute_public_key()
            .context("compute EC public point")
            .with_kind(ErrorKind::Key)?;
        let public = EcPublicKey::from_uncompressed_point(curve, public_key.as_ref())?;
        Ok(Self { d, public })
    }

    /// Create a key from a scalar and the public point it claims to belong to.
    pub fn from_parts(curve: EllipticCurve, x: &[u8], y: &[u8], d: &[u8]) -> Result<Self, JoseError> {
        let key = Self::from_scalar(curve, d)?;
        if key.public != EcPublicKey::from_coordinates(curve, x, y)? {
            return Err(JoseError::from_display(
                ErrorKind::Key,
                "EC public point does not match the private scalar",
            ));
        }
        Ok(key)
    }

    /// Generate a key on `curve` with scalars drawn from the provider's random source.
    pub fn generate(curve: EllipticCurve, ctx: &ProviderContext) -> Result<Self, JoseError> {
        for _ in 0..MAX_SCALAR_ATTEMPTS {
            let mut d = ctx.random_bytes(curve.field_size())?;
            if curve == EllipticCurve::P521 {
                // the order of P-521 is just below 2^521
                d[0] &= 0x01;
            }
            if let Ok(key) = Self::from_scalar(curve, &d) {
                return Ok(key);
            }
        }
        Err(JoseError::from_display(
            ErrorKind::Key,
            format!("no valid {curve} scalar after {MAX_SCALAR_ATTEMPTS} attempts"),
        ))
    }

    pub fn curve(&self) -> EllipticCurve {
        self.public.curve
    }

    pub fn public_key(&self) -> &EcPublicKey {
        &self.public
    }

    pub(crate) fn scalar(&self) -> &[u8] {
        &self.d
    }

    pub(crate) fn agreement_key(&self) -> Result<agreement::PrivateKey, JoseError> {
        agreement::PrivateKey::from_private_key(self.curve().agreement_algorithm(), &self.d)
            .context("load EC private scalar")
            .with_kind(ErrorKind::Key)
    }

    pub(crate) fn ecdsa_key_pair(&self) -> Result<EcdsaKeyPair, JoseError> {
        EcdsaKeyPair::from_private_key_and_public_key(
            self.curve().signing_algorithm(),
            &self.d,
            &self.public.uncompressed_point(),
        )
        .context("load ECDSA key pair")
        .with_kind(ErrorKind::Key)
    }
}

impl fmt::Debug for EcPrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EcPrivateKey")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

fn left_pad(value: &[u8], len: usize, what: &str) -> Result<Zeroizing<Vec<u8>>, JoseError> {
    let value = der::strip_leading_zeros(value);
    if value.len() > len {
        return Err(JoseError::from_display(
            ErrorKind::Key,
            format!("{what} is longer than {len} bytes"),
        ));
    }
    let mut padded = Zeroizing::new(vec![0u8; len]);
    padded[len - value.len()..].copy_from_slice(value);
    Ok(padded)
}
