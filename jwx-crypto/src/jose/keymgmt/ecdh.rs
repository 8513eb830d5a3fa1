//! ECDH-ES key agreement, [`rfc7518`] section 4.6.
//!
//! [`rfc7518`]: https://datatracker.ietf.org/doc/html/rfc7518#section-4.6

use aws_lc_rs::{
    agreement::{self, UnparsedPublicKey},
    error::Unspecified,
};
use zeroize::Zeroizing;

use crate::jose::{
    ContentEncryptionAlgorithm, EcPrivateKey, EcPublicKey, ErrorKind, Headers, JWK, JoseError,
    Key, KeyManagementAlgorithm, ProviderContext, encoding::b64_decode, header::names,
    kdf::concat_kdf,
};

use super::{ContentEncryptionKeys, aes_kw};

/// "AlgorithmID" and key length for the Concat KDF.
///
/// Direct agreement derives the CEK itself, key wrap modes derive the KEK.
fn kdf_parameters(
    alg: KeyManagementAlgorithm,
    enc: ContentEncryptionAlgorithm,
) -> Result<(&'static str, usize), JoseError> {
    match alg.key_wrap() {
        None => Ok((enc.id(), enc.cek_len())),
        Some(wrap) => {
            let kek_len = wrap.descriptor().key_byte_len().ok_or_else(|| {
                JoseError::from_display(
                    ErrorKind::InvalidAlgorithm,
                    format!("{wrap} has no key length"),
                )
            })?;
            Ok((alg.id(), kek_len))
        }
    }
}

fn party_info(headers: &Headers, name: &'static str) -> Result<Vec<u8>, JoseError> {
    match headers.string(name)? {
        Some(value) => b64_decode(value, name),
        None => Ok(Vec::new()),
    }
}

fn derive(
    alg: KeyManagementAlgorithm,
    enc: ContentEncryptionAlgorithm,
    private: &EcPrivateKey,
    peer: &EcPublicKey,
    headers: &Headers,
) -> Result<Zeroizing<Vec<u8>>, JoseError> {
    let (algorithm_id, key_len) = kdf_parameters(alg, enc)?;
    let apu = party_info(headers, names::AGREEMENT_PARTY_U_INFO)?;
    let apv = party_info(headers, names::AGREEMENT_PARTY_V_INFO)?;

    let peer_point = peer.uncompressed_point();
    let shared_secret = agreement::agree(
        &private.agreement_key()?,
        &UnparsedPublicKey::new(peer.curve().agreement_algorithm(), &peer_point),
        Unspecified,
        |z| Ok(Zeroizing::new(z.to_vec())),
    )
    .map_err(|Unspecified| JoseError::cryptographic_failure())?;

    concat_kdf(
        &shared_secret,
        key_len * 8,
        algorithm_id.as_bytes(),
        &apu,
        &apv,
    )
}

/// Agree on a key with `receiver` through a fresh ephemeral key pair,
/// which is published in the "epk" header.
pub(super) fn encrypt_cek(
    alg: KeyManagementAlgorithm,
    receiver: &EcPublicKey,
    enc: ContentEncryptionAlgorithm,
    headers: &mut Headers,
    cek_override: Option<&[u8]>,
    ctx: &ProviderContext,
) -> Result<ContentEncryptionKeys, JoseError> {
    let ephemeral = EcPrivateKey::generate(receiver.curve(), ctx)?;
    let epk = JWK::from_key(&Key::EcPublic(ephemeral.public_key().clone()))?;
    headers.try_set_header(names::EPHEMERAL_PUBLIC_KEY, epk)?;

    let derived = derive(alg, enc, &ephemeral, receiver, headers)?;
    match alg.key_wrap() {
        None => Ok(ContentEncryptionKeys {
            cek: derived,
            encrypted_key: Vec::new(),
        }),
        Some(wrap) => aes_kw::wrap_cek(wrap, &derived, enc, cek_override, ctx),
    }
}

/// Read and check the sender's ephemeral key before any agreement happens.
fn ephemeral_public_key(
    headers: &Headers,
    private: &EcPrivateKey,
) -> Result<EcPublicKey, JoseError> {
    let value = headers.get(names::EPHEMERAL_PUBLIC_KEY).ok_or_else(|| {
        JoseError::from_display(ErrorKind::Structural, "required header 'epk' is missing")
    })?;
    let jwk: JWK = serde_json::from_value(value.clone())
        .map_err(|err| JoseError::new(ErrorKind::Structural, err))?;
    let Key::EcPublic(epk) = jwk.to_key()? else {
        return Err(JoseError::from_display(
            ErrorKind::Key,
            "'epk' must be an EC public key",
        ));
    };

    if epk.curve() != private.curve() {
        tracing::debug!(
            epk_curve = %epk.curve(),
            key_curve = %private.curve(),
            "ephemeral key is on another curve than the private key"
        );
        return Err(JoseError::from_display(
            ErrorKind::Key,
            format!(
                "'epk' is a {} key, expected {}",
                epk.curve(),
                private.curve()
            ),
        ));
    }
    if !epk.is_on_curve() {
        tracing::debug!(curve = %epk.curve(), "ephemeral public key is not on its curve");
        return Err(JoseError::from_display(
            ErrorKind::Key,
            format!("'epk' is not a point on {}", epk.curve()),
        ));
    }
    Ok(epk)
}

pub(super) fn decrypt_cek(
    alg: KeyManagementAlgorithm,
    private: &EcPrivateKey,
    encrypted_key: &[u8],
    enc: ContentEncryptionAlgorithm,
    headers: &Headers,
) -> Result<Zeroizing<Vec<u8>>, JoseError> {
    let epk = ephemeral_public_key(headers, private)?;
    let wrap = alg.key_wrap();
    if wrap.is_none() && !encrypted_key.is_empty() {
        return Err(JoseError::from_display(
            ErrorKind::Structural,
            "encrypted key must be empty for direct key agreement",
        ));
    }

    let derived = derive(alg, enc, private, &epk, headers)?;
    match wrap {
        None => Ok(derived),
        Some(wrap) => aes_kw::unwrap_cek(wrap, &derived, encrypted_key, enc),
    }
}

#[cfg(test)]
mod tests {
    use base64::{Engine as _, prelude::BASE64_URL_SAFE_NO_PAD};
    use tracing_test::traced_test;

    use super::*;
    use crate::jose::{EllipticCurve, context::test_support::FixedRandom};

    fn b64(s: &str) -> Vec<u8> {
        BASE64_URL_SAFE_NO_PAD.decode(s).unwrap()
    }

    // rfc7518 appendix C
    fn alice() -> EcPrivateKey {
        EcPrivateKey::from_parts(
            EllipticCurve::P256,
            &b64("gI0GAILBdu7T53akrFmMyGcsF3n5dO7MmwNBHKW5SV0"),
            &b64("SLW_xSffzlPWrHEVI30DHM_4egVwt3NQqeUD7nMFpps"),
            &b64("0_NxaRPUMQoAJt50Gz8YiTr8gRTwyEaCumd-MToTmIo"),
        )
        .unwrap()
    }

    fn bob() -> EcPrivateKey {
        EcPrivateKey::from_parts(
            EllipticCurve::P256,
            &b64("weNJy2HscCSM6AEDTDg04biOvhFhyyWvOHQfeF_PxMQ"),
            &b64("e8lnCO-AlStT-NJVX-crhB7QRYhiix03illJOVAOyck"),
            &b64("VEmDZpDXXK8p8N0Cndsxs924q6nS1RXFASRl6BfUqdw"),
        )
        .unwrap()
    }

    fn party_headers() -> Headers {
        Headers::new()
            .try_with_header(names::AGREEMENT_PARTY_U_INFO, "QWxpY2U")
            .unwrap()
            .try_with_header(names::AGREEMENT_PARTY_V_INFO, "Qm9i")
            .unwrap()
    }

    #[test]
    fn rfc7518_appendix_c() {
        let expected = b64("VqqN6vgjbSBcIijNcacQGg");
        let enc = ContentEncryptionAlgorithm::A128Gcm;

        // the ephemeral scalar is drawn from the random source
        let ctx = ProviderContext::new().with_random_source(FixedRandom::new(
            b64("0_NxaRPUMQoAJt50Gz8YiTr8gRTwyEaCumd-MToTmIo"),
        ));
        let mut headers = party_headers();
        let keys = encrypt_cek(
            KeyManagementAlgorithm::EcdhEs,
            bob().public_key(),
            enc,
            &mut headers,
            None,
            &ctx,
        )
        .unwrap();
        assert_eq!(keys.cek(), expected.as_slice());
        assert!(keys.encrypted_key().is_empty());

        let epk: JWK = serde_json::from_value(headers.get("epk").unwrap().clone()).unwrap();
        assert!(matches!(
            epk.to_key().unwrap(),
            Key::EcPublic(epk) if &epk == alice().public_key()
        ));

        let cek = decrypt_cek(KeyManagementAlgorithm::EcdhEs, &bob(), &[], enc, &headers).unwrap();
        assert_eq!(cek.as_slice(), expected.as_slice());
    }

    #[test]
    fn key_wrap_variants_round_trip() {
        let ctx = ProviderContext::default();
        for curve in [EllipticCurve::P256, EllipticCurve::P384, EllipticCurve::P521] {
            let receiver = EcPrivateKey::generate(curve, &ctx).unwrap();
            for alg in [
                KeyManagementAlgorithm::EcdhEsA128KW,
                KeyManagementAlgorithm::EcdhEsA256KW,
            ] {
                let enc = ContentEncryptionAlgorithm::A256CbcHs512;
                let mut headers = Headers::new();
                let keys =
                    encrypt_cek(alg, receiver.public_key(), enc, &mut headers, None, &ctx)
                        .unwrap();
                assert_eq!(keys.cek().len(), 64);
                assert_eq!(keys.encrypted_key().len(), 72);

                let cek = decrypt_cek(alg, &receiver, keys.encrypted_key(), enc, &headers)
                    .unwrap();
                assert_eq!(cek.as_slice(), keys.cek());
            }
        }
    }

    #[test]
    #[traced_test]
    fn off_curve_ephemeral_key_is_rejected() {
        let enc = ContentEncryptionAlgorithm::A128Gcm;
        let mut y = b64("SLW_xSffzlPWrHEVI30DHM_4egVwt3NQqeUD7nMFpps");
        y[31] ^= 1;
        let bogus = EcPublicKey::from_coordinates(
            EllipticCurve::P256,
            &b64("gI0GAILBdu7T53akrFmMyGcsF3n5dO7MmwNBHKW5SV0"),
            &y,
        )
        .unwrap();
        let headers = party_headers()
            .try_with_header(
                names::EPHEMERAL_PUBLIC_KEY,
                JWK::from_key(&Key::EcPublic(bogus)).unwrap(),
            )
            .unwrap();

        let err =
            decrypt_cek(KeyManagementAlgorithm::EcdhEs, &bob(), &[], enc, &headers).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Key);
        assert!(logs_contain("not on its curve"));
    }

    #[test]
    fn ephemeral_key_must_match_curve_and_be_public() {
        let ctx = ProviderContext::default();
        let enc = ContentEncryptionAlgorithm::A128Gcm;
        let p384 = EcPrivateKey::generate(EllipticCurve::P384, &ctx).unwrap();

        let headers = Headers::new()
            .try_with_header(
                names::EPHEMERAL_PUBLIC_KEY,
                JWK::from_key(&Key::EcPublic(p384.public_key().clone())).unwrap(),
            )
            .unwrap();
        let err =
            decrypt_cek(KeyManagementAlgorithm::EcdhEs, &bob(), &[], enc, &headers).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Key);

        let headers = Headers::new()
            .try_with_header(
                names::EPHEMERAL_PUBLIC_KEY,
                JWK::from_key(&Key::EcPrivate(alice())).unwrap(),
            )
            .unwrap();
        let err =
            decrypt_cek(KeyManagementAlgorithm::EcdhEs, &bob(), &[], enc, &headers).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Key);

        let err = decrypt_cek(KeyManagementAlgorithm::EcdhEs, &bob(), &[], enc, &Headers::new())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Structural);
    }
}
