use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::jose::{
    AlgorithmDescriptor, AlgorithmRegistry, ErrorKind, JoseError, key::EllipticCurve,
};

#[derive(Debug, Serialize, Deserialize, Copy, Clone, PartialEq, Eq, Hash)]
/// The "kty" (key type) of a key, as registered in [`rfc7518`] section 6.1.
///
/// [`rfc7518`]: https://datatracker.ietf.org/doc/html/rfc7518#section-6.1
pub enum KeyType {
    #[serde(rename = "oct")]
    Octet,
    #[serde(rename = "RSA")]
    Rsa,
    #[serde(rename = "EC")]
    Ec,
}

impl KeyType {
    /// Registered "kty" value.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Octet => "oct",
            Self::Rsa => "RSA",
            Self::Ec => "EC",
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

macro_rules! algorithm_enum {
    (
        $(#[$outer:meta])*
        pub enum $name:ident in $registry:ident {
            $(
                $(#[$doc:meta])*
                $variant:ident => $id:literal,
            )+
        }
    ) => {
        #[derive(Debug, Serialize, Deserialize, Copy, Clone, PartialEq, Eq, Hash)]
        $(#[$outer])*
        pub enum $name {
            $(
                $(#[$doc])*
                #[serde(rename = $id)]
                $variant,
            )+
        }

        impl $name {
            /// Every variant, in registration order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// Identifier as it appears in a JOSE header.
            pub const fn id(self) -> &'static str {
                match self {
                    $(Self::$variant => $id,)+
                }
            }

            /// Registry descriptor of this algorithm.
            pub fn descriptor(self) -> &'static AlgorithmDescriptor {
                // registry tables are declared in variant order
                &AlgorithmRegistry::$registry.descriptors()[self as usize]
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.id())
            }
        }

        impl FromStr for $name {
            type Err = JoseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($id => Ok(Self::$variant),)+
                    _ => Err(JoseError::from_display(
                        ErrorKind::InvalidAlgorithm,
                        format!("unknown {} algorithm '{s}'", AlgorithmRegistry::$registry.family()),
                    )),
                }
            }
        }
    };
}

algorithm_enum! {
    /// [`JWA`] or JSON Web Algorithms for digital signatures and MACs as defined in [`rfc7518`]
    ///
    /// [`rfc7518`]: https://datatracker.ietf.org/doc/html/rfc7518#section-3
    pub enum JWA in SIGNATURE {
        /// HMAC using SHA-256 (Required)
        HS256 => "HS256",
        /// HMAC using SHA-384 (Optional)
        HS384 => "HS384",
        /// HMAC using SHA-512 (Optional)
        HS512 => "HS512",
        /// RSASSA-PKCS1-v1_5 using SHA-256 (Recommended)
        RS256 => "RS256",
        /// RSASSA-PKCS1-v1_5 using SHA-384 (Optional)
        RS384 => "RS384",
        /// RSASSA-PKCS1-v1_5 using SHA-512 (Optional)
        RS512 => "RS512",
        /// ECDSA using P-256 and SHA-256 (Recommended+)
        ES256 => "ES256",
        /// ECDSA using P-384 and SHA-384 (Optional)
        ES384 => "ES384",
        /// ECDSA using P-521 and SHA-512 (Optional)
        ES512 => "ES512",
        /// RSASSA-PSS using SHA-256 and MGF1 with SHA-256 (Optional)
        PS256 => "PS256",
        /// RSASSA-PSS using SHA-384 and MGF1 with SHA-384 (Optional)
        PS384 => "PS384",
        /// RSASSA-PSS using SHA-512 and MGF1 with SHA-512 (Optional)
        PS512 => "PS512",
        /// No digital signature or MAC performed.
        ///
        /// Blocked by the default consumer constraints.
        None => "none",
    }
}

impl JWA {
    /// Key type this signature algorithm works with, `None` for "none".
    pub const fn key_type(self) -> Option<KeyType> {
        match self {
            Self::HS256 | Self::HS384 | Self::HS512 => Some(KeyType::Octet),
            Self::RS256
            | Self::RS384
            | Self::RS512
            | Self::PS256
            | Self::PS384
            | Self::PS512 => Some(KeyType::Rsa),
            Self::ES256 | Self::ES384 | Self::ES512 => Some(KeyType::Ec),
            Self::None => None,
        }
    }

    /// Curve an ECDSA algorithm is bound to.
    pub const fn curve(self) -> Option<EllipticCurve> {
        match self {
            Self::ES256 => Some(EllipticCurve::P256),
            Self::ES384 => Some(EllipticCurve::P384),
            Self::ES512 => Some(EllipticCurve::P521),
            _ => None,
        }
    }
}

impl From<EllipticCurve> for JWA {
    fn from(value: EllipticCurve) -> Self {
        match value {
            EllipticCurve::P256 => Self::ES256,
            EllipticCurve::P384 => Self::ES384,
            EllipticCurve::P521 => Self::ES512,
        }
    }
}

algorithm_enum! {
    /// JWE key management algorithms as defined in [`rfc7518`] section 4.
    ///
    /// [`rfc7518`]: https://datatracker.ietf.org/doc/html/rfc7518#section-4
    pub enum KeyManagementAlgorithm in KEY_MANAGEMENT {
        /// Direct use of a shared symmetric key as the CEK
        Dir => "dir",
        /// AES Key Wrap with default initial value using 128-bit key
        A128KW => "A128KW",
        /// AES Key Wrap with default initial value using 192-bit key
        A192KW => "A192KW",
        /// AES Key Wrap with default initial value using 256-bit key
        A256KW => "A256KW",
        /// RSAES-PKCS1-v1_5
        Rsa1_5 => "RSA1_5",
        /// RSAES OAEP using default parameters
        RsaOaep => "RSA-OAEP",
        /// RSAES OAEP using SHA-256 and MGF1 with SHA-256
        RsaOaep256 => "RSA-OAEP-256",
        /// Elliptic Curve Diffie-Hellman Ephemeral Static key agreement using Concat KDF
        EcdhEs => "ECDH-ES",
        /// ECDH-ES using Concat KDF and CEK wrapped with "A128KW"
        EcdhEsA128KW => "ECDH-ES+A128KW",
        /// ECDH-ES using Concat KDF and CEK wrapped with "A192KW"
        EcdhEsA192KW => "ECDH-ES+A192KW",
        /// ECDH-ES using Concat KDF and CEK wrapped with "A256KW"
        EcdhEsA256KW => "ECDH-ES+A256KW",
    }
}

impl KeyManagementAlgorithm {
    /// Key type a recipient key must have for this algorithm.
    pub const fn key_type(self) -> KeyType {
        match self {
            Self::Dir | Self::A128KW | Self::A192KW | Self::A256KW => KeyType::Octet,
            Self::Rsa1_5 | Self::RsaOaep | Self::RsaOaep256 => KeyType::Rsa,
            Self::EcdhEs | Self::EcdhEsA128KW | Self::EcdhEsA192KW | Self::EcdhEsA256KW => {
                KeyType::Ec
            }
        }
    }

    /// AES key wrap variant used to wrap the CEK, if any.
    pub(crate) const fn key_wrap(self) -> Option<Self> {
        match self {
            Self::A128KW | Self::EcdhEsA128KW => Some(Self::A128KW),
            Self::A192KW | Self::EcdhEsA192KW => Some(Self::A192KW),
            Self::A256KW | Self::EcdhEsA256KW => Some(Self::A256KW),
            _ => None,
        }
    }
}

algorithm_enum! {
    /// JWE content encryption algorithms as defined in [`rfc7518`] section 5.
    ///
    /// [`rfc7518`]: https://datatracker.ietf.org/doc/html/rfc7518#section-5
    pub enum ContentEncryptionAlgorithm in CONTENT_ENCRYPTION {
        /// AES_128_CBC_HMAC_SHA_256 authenticated encryption
        A128CbcHs256 => "A128CBC-HS256",
        /// AES_192_CBC_HMAC_SHA_384 authenticated encryption
        A192CbcHs384 => "A192CBC-HS384",
        /// AES_256_CBC_HMAC_SHA_512 authenticated encryption
        A256CbcHs512 => "A256CBC-HS512",
        /// AES GCM using 128-bit key
        A128Gcm => "A128GCM",
        /// AES GCM using 192-bit key
        A192Gcm => "A192GCM",
        /// AES GCM using 256-bit key
        A256Gcm => "A256GCM",
    }
}

algorithm_enum! {
    /// JWE "zip" compression algorithms as defined in [`rfc7516`] section 4.1.3.
    ///
    /// [`rfc7516`]: https://datatracker.ietf.org/doc/html/rfc7516#section-4.1.3
    pub enum CompressionAlgorithm in COMPRESSION {
        /// Raw DEFLATE as defined in RFC 1951
        Deflate => "DEF",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_round_trip_through_from_str() {
        for alg in JWA::ALL {
            assert_eq!(alg.id().parse::<JWA>().unwrap(), *alg);
        }
        for alg in KeyManagementAlgorithm::ALL {
            assert_eq!(alg.id().parse::<KeyManagementAlgorithm>().unwrap(), *alg);
        }
        for enc in ContentEncryptionAlgorithm::ALL {
            assert_eq!(enc.id().parse::<ContentEncryptionAlgorithm>().unwrap(), *enc);
        }
    }

    #[test]
    fn unknown_identifier_is_invalid_algorithm() {
        let err = "ES521".parse::<JWA>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidAlgorithm);
        let err = "bad".parse::<CompressionAlgorithm>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidAlgorithm);
        assert!(err.to_string().contains("zip"));
    }

    #[test]
    fn serde_uses_registered_names() {
        assert_eq!(serde_json::to_string(&JWA::None).unwrap(), r#""none""#);
        assert_eq!(
            serde_json::to_string(&KeyManagementAlgorithm::EcdhEsA128KW).unwrap(),
            r#""ECDH-ES+A128KW""#
        );
        let enc: ContentEncryptionAlgorithm = serde_json::from_str(r#""A256CBC-HS512""#).unwrap();
        assert_eq!(enc, ContentEncryptionAlgorithm::A256CbcHs512);
        assert_eq!(serde_json::to_string(&KeyType::Octet).unwrap(), r#""oct""#);
    }

    #[test]
    fn es512_is_bound_to_p521() {
        assert_eq!(JWA::ES512.curve(), Some(EllipticCurve::P521));
        assert_eq!(JWA::from(EllipticCurve::P384), JWA::ES384);
        assert_eq!(JWA::HS256.curve(), None);
    }
}
