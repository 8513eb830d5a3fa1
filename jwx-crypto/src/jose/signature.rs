//! Signing and verification for every [`JWA`].

use aws_lc_rs::{
    hmac,
    rand::SystemRandom,
    signature::{
        RSA_PKCS1_2048_8192_SHA256, RSA_PKCS1_2048_8192_SHA384, RSA_PKCS1_2048_8192_SHA512,
        RSA_PKCS1_SHA256, RSA_PKCS1_SHA384, RSA_PKCS1_SHA512, RSA_PSS_2048_8192_SHA256,
        RSA_PSS_2048_8192_SHA384, RSA_PSS_2048_8192_SHA512, RSA_PSS_SHA256, RSA_PSS_SHA384,
        RSA_PSS_SHA512, RsaEncoding, RsaParameters, UnparsedPublicKey,
    },
};
use jwx_error::ErrorContext;
use subtle::ConstantTimeEq;

use crate::jose::{ErrorKind, JWA, JoseError, Key, ProviderContext, error::WithKind};

/// Smallest RSA modulus accepted while key validation is enabled.
pub const MIN_RSA_KEY_BITS: usize = 2048;

impl JWA {
    /// Sign `input` with `key`.
    ///
    /// "none" produces an empty signature and refuses any key.
    pub fn sign(
        self,
        key: Option<&Key>,
        input: &[u8],
        ctx: &ProviderContext,
    ) -> Result<Vec<u8>, JoseError> {
        self.descriptor().ensure_available()?;
        self.validate_signing_key(key, ctx)?;
        let Some(key) = key else {
            return Ok(Vec::new());
        };

        if let Some(algorithm) = self.hmac_algorithm() {
            let key = hmac::Key::new(algorithm, key.as_octet()?.as_bytes());
            return Ok(hmac::sign(&key, input).as_ref().to_vec());
        }
        if let Some((padding, _)) = self.rsa_parameters() {
            let key_pair = key.as_rsa_private()?.key_pair()?;
            let mut signature = vec![0u8; key_pair.public_modulus_len()];
            key_pair
                .sign(padding, &SystemRandom::new(), input, &mut signature)
                .context("RSA sign")
                .with_kind(ErrorKind::CryptographicFailure)?;
            return Ok(signature);
        }
        let signature = key
            .as_ec_private()?
            .ecdsa_key_pair()?
            .sign(&SystemRandom::new(), input)
            .context("ECDSA sign")
            .with_kind(ErrorKind::CryptographicFailure)?;
        Ok(signature.as_ref().to_vec())
    }

    /// Check `signature` over `input`.
    ///
    /// Key problems are errors; a signature that does not verify,
    /// whatever the reason, is `Ok(false)`.
    pub fn verify(
        self,
        signature: &[u8],
        key: Option<&Key>,
        input: &[u8],
        ctx: &ProviderContext,
    ) -> Result<bool, JoseError> {
        self.descriptor().ensure_available()?;
        self.validate_verification_key(key, ctx)?;
        let Some(key) = key else {
            return Ok(signature.is_empty());
        };

        if let Some(algorithm) = self.hmac_algorithm() {
            let key = hmac::Key::new(algorithm, key.as_octet()?.as_bytes());
            let expected = hmac::sign(&key, input);
            return Ok(expected.as_ref().ct_eq(signature).into());
        }
        if let Some((_, parameters)) = self.rsa_parameters() {
            return Ok(key
                .rsa_public()?
                .components()
                .verify(parameters, input, signature)
                .is_ok());
        }
        let public = key.ec_public()?;
        let point = public.uncompressed_point();
        Ok(UnparsedPublicKey::new(public.curve().verification_algorithm(), &point)
            .verify(input, signature)
            .is_ok())
    }

    /// Validate a key for [`JWA::sign`].
    pub fn validate_signing_key(
        self,
        key: Option<&Key>,
        ctx: &ProviderContext,
    ) -> Result<(), JoseError> {
        self.validate_key(key, true, ctx)
    }

    /// Validate a key for [`JWA::verify`].
    pub fn validate_verification_key(
        self,
        key: Option<&Key>,
        ctx: &ProviderContext,
    ) -> Result<(), JoseError> {
        self.validate_key(key, false, ctx)
    }

    fn validate_key(
        self,
        key: Option<&Key>,
        signing: bool,
        ctx: &ProviderContext,
    ) -> Result<(), JoseError> {
        let result = self.check_key(key, signing, ctx);
        if let Err(err) = &result {
            tracing::debug!(alg = %self, %err, "signature key rejected");
        }
        result
    }

    fn check_key(
        self,
        key: Option<&Key>,
        signing: bool,
        ctx: &ProviderContext,
    ) -> Result<(), JoseError> {
        let key = match (self, key) {
            (Self::None, None) => return Ok(()),
            (Self::None, Some(_)) => {
                return Err(JoseError::from_display(
                    ErrorKind::Key,
                    "JWS with algorithm 'none' must not use a key",
                ));
            }
            (_, None) => {
                return Err(JoseError::from_display(
                    ErrorKind::Key,
                    format!("{self} requires a key"),
                ));
            }
            (_, Some(key)) => key,
        };

        if self.hmac_algorithm().is_some() {
            let key = key.as_octet()?;
            let min_len = self.descriptor().key_byte_len().unwrap_or_default();
            if ctx.key_validation_enabled() && key.len() < min_len {
                return Err(JoseError::from_display(
                    ErrorKind::Key,
                    format!(
                        "{self} requires a key of at least {} bits, got {}",
                        min_len * 8,
                        key.bit_len()
                    ),
                ));
            }
            return Ok(());
        }

        if self.rsa_parameters().is_some() {
            let public = if signing {
                key.as_rsa_private()?.public_key()
            } else {
                key.rsa_public()?
            };
            let bits = public.modulus_bits();
            if ctx.key_validation_enabled() && bits < MIN_RSA_KEY_BITS {
                return Err(JoseError::from_display(
                    ErrorKind::Key,
                    format!("{self} requires an RSA key of at least {MIN_RSA_KEY_BITS} bits, got {bits}"),
                ));
            }
            return Ok(());
        }

        let curve = if signing {
            key.as_ec_private()?.curve()
        } else {
            key.ec_public()?.curve()
        };
        if Some(curve) != self.curve() {
            return Err(JoseError::from_display(
                ErrorKind::Key,
                format!("{self} cannot be used with a {curve} key"),
            ));
        }
        Ok(())
    }

    fn hmac_algorithm(self) -> Option<hmac::Algorithm> {
        match self {
            Self::HS256 => Some(hmac::HMAC_SHA256),
            Self::HS384 => Some(hmac::HMAC_SHA384),
            Self::HS512 => Some(hmac::HMAC_SHA512),
            _ => None,
        }
    }

    fn rsa_parameters(self) -> Option<(&'static dyn RsaEncoding, &'static RsaParameters)> {
        match self {
            Self::RS256 => Some((&RSA_PKCS1_SHA256, &RSA_PKCS1_2048_8192_SHA256)),
            Self::RS384 => Some((&RSA_PKCS1_SHA384, &RSA_PKCS1_2048_8192_SHA384)),
            Self::RS512 => Some((&RSA_PKCS1_SHA512, &RSA_PKCS1_2048_8192_SHA512)),
            Self::PS256 => Some((&RSA_PSS_SHA256, &RSA_PSS_2048_8192_SHA256)),
            Self::PS384 => Some((&RSA_PSS_SHA384, &RSA_PSS_2048_8192_SHA384)),
            Self::PS512 => Some((&RSA_PSS_SHA512, &RSA_PSS_2048_8192_SHA512)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use aws_lc_rs::rsa::KeySize;
    use base64::{Engine as _, prelude::BASE64_URL_SAFE_NO_PAD};
    use tokio_test::{assert_err, assert_ok};
    use tracing_test::traced_test;

    use super::*;
    use crate::jose::{EcPrivateKey, EllipticCurve, RsaPrivateKey};

    const KEY1: [i8; 64] = [
        -41, -1, 60, 1, 1, 45, -92, -114, 8, -1, -60, 7, 54, -16, 16, 14, -20, -85, 56, 103, 4,
        10, -56, 120, 37, -48, 6, 9, 110, -96, 27, -4, 41, -99, 60, 91, 49, 70, -99, -14, -108,
        -81, 60, 37, 104, -116, 106, 104, -2, -95, 56, 103, 64, 10, -56, 120, 37, -48, 6, 9, 110,
        -96, 27, -4,
    ];

    fn key1() -> Key {
        Key::octet(KEY1.iter().map(|b| *b as u8).collect::<Vec<_>>())
    }

    fn signing_input(header: &str, payload: &str) -> Vec<u8> {
        format!(
            "{}.{}",
            BASE64_URL_SAFE_NO_PAD.encode(header),
            BASE64_URL_SAFE_NO_PAD.encode(payload)
        )
        .into_bytes()
    }

    #[test]
    fn hmac_signature_is_deterministic() {
        let ctx = ProviderContext::default();
        let input = signing_input(r#"{"alg":"HS256"}"#, "some content that is the payload");
        let first = JWA::HS256.sign(Some(&key1()), &input, &ctx).unwrap();
        let second = JWA::HS256.sign(Some(&key1()), &input, &ctx).unwrap();
        assert_eq!(first.len(), 32);
        assert_eq!(first, second);
        assert!(JWA::HS256.verify(&first, Some(&key1()), &input, &ctx).unwrap());

        let mut tampered = first.clone();
        tampered[0] ^= 1;
        assert!(!JWA::HS256.verify(&tampered, Some(&key1()), &input, &ctx).unwrap());
        assert!(!JWA::HS256.verify(&first[..31], Some(&key1()), &input, &ctx).unwrap());
    }

    #[test]
    fn hmac_minimum_key_length() {
        let ctx = ProviderContext::default();
        for (alg, len) in [(JWA::HS256, 32), (JWA::HS384, 48), (JWA::HS512, 64)] {
            let short = Key::octet(vec![7u8; len - 1]);
            let err = alg.sign(Some(&short), b"input", &ctx).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Key);
            let err = alg.verify(b"sig", Some(&short), b"input", &ctx).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Key);
            assert_ok!(alg.sign(Some(&Key::octet(vec![7u8; len])), b"input", &ctx));
        }

        let relaxed = ProviderContext::new().with_do_key_validation(false);
        let tiny = Key::octet(b"123456789".to_vec());
        let signature = JWA::HS256.sign(Some(&tiny), b"input", &relaxed).unwrap();
        assert!(JWA::HS256.verify(&signature, Some(&tiny), b"input", &relaxed).unwrap());
    }

    #[test]
    fn none_algorithm() {
        let ctx = ProviderContext::default();
        assert_eq!(JWA::None.sign(None, b"input", &ctx).unwrap(), Vec::<u8>::new());
        assert!(JWA::None.verify(b"", None, b"input", &ctx).unwrap());
        assert!(!JWA::None.verify(b"x", None, b"input", &ctx).unwrap());

        let err = JWA::None.sign(Some(&key1()), b"input", &ctx).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Key);
        assert_err!(JWA::None.verify(b"", Some(&key1()), b"input", &ctx));
        assert_err!(JWA::HS256.sign(None, b"input", &ctx));
    }

    #[test]
    fn ecdsa_round_trip_and_curve_binding() {
        let ctx = ProviderContext::default();
        for curve in [EllipticCurve::P256, EllipticCurve::P384, EllipticCurve::P521] {
            let alg = JWA::from(curve);
            let key = Key::from(EcPrivateKey::generate(curve, &ctx).unwrap());
            let public = key.public_key().unwrap();

            let signature = alg.sign(Some(&key), b"payload", &ctx).unwrap();
            assert_eq!(signature.len(), 2 * curve.field_size());
            assert!(alg.verify(&signature, Some(&public), b"payload", &ctx).unwrap());
            assert!(!alg.verify(&signature, Some(&public), b"payloaD", &ctx).unwrap());
            assert!(!alg.verify(b"garbage", Some(&public), b"payload", &ctx).unwrap());
        }

        let p256 = Key::from(EcPrivateKey::generate(EllipticCurve::P256, &ctx).unwrap());
        let err = JWA::ES384.sign(Some(&p256), b"payload", &ctx).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Key);
        let err = JWA::ES512
            .verify(b"", p256.public_key().as_ref(), b"payload", &ctx)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Key);
    }

    #[test]
    #[traced_test]
    fn rsa_round_trip() {
        let ctx = ProviderContext::default();
        let key = Key::from(RsaPrivateKey::generate(KeySize::Rsa2048).unwrap());
        let public = key.public_key().unwrap();

        for alg in [JWA::RS256, JWA::RS384, JWA::RS512, JWA::PS256, JWA::PS384, JWA::PS512] {
            let signature = alg.sign(Some(&key), b"payload", &ctx).unwrap();
            assert_eq!(signature.len(), 256);
            assert!(alg.verify(&signature, Some(&public), b"payload", &ctx).unwrap());
            assert!(!alg.verify(&signature, Some(&public), b"other", &ctx).unwrap());
            assert!(!alg.verify(&signature[1..], Some(&public), b"payload", &ctx).unwrap());
        }

        // a public key cannot sign
        let err = JWA::RS256.sign(Some(&public), b"payload", &ctx).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Key);
        assert!(logs_contain("signature key rejected"));
    }

    #[test]
    fn wrong_key_type_is_rejected() {
        let ctx = ProviderContext::default();
        let ec = Key::from(EcPrivateKey::generate(EllipticCurve::P256, &ctx).unwrap());
        assert_eq!(
            JWA::HS256.sign(Some(&ec), b"x", &ctx).unwrap_err().kind(),
            ErrorKind::Key
        );
        assert_eq!(
            JWA::RS256.verify(b"x", Some(&key1()), b"x", &ctx).unwrap_err().kind(),
            ErrorKind::Key
        );
    }
}
