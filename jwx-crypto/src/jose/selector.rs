//! Picking the key of a JWK set that belongs to a received message.

use jwx_utils::macros::generate_set_and_with;

use crate::jose::{
    ConsumeOptions, EllipticCurve, ErrorKind, Headers, JWA, JWK, JWKUse, JoseError,
    KeyManagementAlgorithm, KeyType, ParsedJWE, ParsedJWS, header::names,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// What the selected key is going to be used for.
pub enum KeyUsage {
    /// Verify a JWS.
    Verify,
    /// Decrypt a JWE (including unwrapping or deriving its CEK).
    Decrypt,
}

impl KeyUsage {
    fn jwk_use(self) -> JWKUse {
        match self {
            Self::Verify => JWKUse::Signature,
            Self::Decrypt => JWKUse::Encryption,
        }
    }

    /// "key_ops" values that permit this usage.
    fn key_ops(self) -> &'static [&'static str] {
        match self {
            Self::Verify => &["verify"],
            Self::Decrypt => &["decrypt", "deriveKey", "unwrapKey"],
        }
    }

    /// Key type and (for ECDSA) curve implied by the header's "alg".
    ///
    /// `None` when the algorithm takes no key or is unknown.
    fn key_requirements(self, header: &Headers) -> Option<(KeyType, Option<EllipticCurve>)> {
        let alg = header.string(names::ALGORITHM).ok().flatten()?;
        match self {
            Self::Verify => {
                let alg: JWA = alg.parse().ok()?;
                Some((alg.key_type()?, alg.curve()))
            }
            Self::Decrypt => {
                let alg: KeyManagementAlgorithm = alg.parse().ok()?;
                Some((alg.key_type(), ephemeral_curve(header)))
            }
        }
    }
}

/// Curve of the "epk" of an ECDH-ES message.
fn ephemeral_curve(header: &Headers) -> Option<EllipticCurve> {
    let crv = header.get(names::EPHEMERAL_PUBLIC_KEY)?.get("crv")?;
    serde_json::from_value(crv.clone()).ok()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
/// Filters a list of [`JWK`]s down to the one key matching a message header.
///
/// Candidates are filtered, never scored: "kid", key type, "use", "alg",
/// X.509 thumbprints and "key_ops" must all be compatible. When several
/// EC keys remain they are narrowed by curve, and as a last resort each
/// remaining key can be tried against the message itself.
pub struct JwkSelector {
    trial_disambiguation: bool,
}

impl JwkSelector {
    pub fn new() -> Self {
        Self::default()
    }

    generate_set_and_with! {
        /// Try every remaining key when the filters leave more than one.
        pub fn trial_disambiguation(mut self, enabled: bool) -> Self {
            self.trial_disambiguation = enabled;
            self
        }
    }

    /// Every key of `keys` compatible with `header` for `usage`.
    pub fn filter<'a>(&self, usage: KeyUsage, header: &Headers, keys: &'a [JWK]) -> Vec<&'a JWK> {
        let Some((kty, curve)) = usage.key_requirements(header) else {
            tracing::debug!("header algorithm does not select any key type");
            return Vec::new();
        };
        let alg = header.string(names::ALGORITHM).ok().flatten();
        let kid = header.string(names::KEY_ID).ok().flatten();
        let x5t = header.string(names::X509_THUMBPRINT).ok().flatten();
        let x5t_sha256 = header.string(names::X509_THUMBPRINT_SHA256).ok().flatten();

        let mut selected: Vec<&JWK> = keys
            .iter()
            .filter(|jwk| kid.is_none_or(|kid| jwk.kid() == Some(kid)))
            .filter(|jwk| jwk.kty() == kty)
            .filter(|jwk| jwk.key_use().is_none_or(|key_use| key_use == usage.jwk_use()))
            .filter(|jwk| jwk.alg().is_none_or(|key_alg| Some(key_alg) == alg))
            .filter(|jwk| thumbprint_matches(x5t, || jwk.x5t()))
            .filter(|jwk| thumbprint_matches(x5t_sha256, || jwk.x5t_sha256()))
            .filter(|jwk| {
                jwk.key_ops().is_none_or(|ops| {
                    ops.iter()
                        .any(|op| usage.key_ops().contains(&op.as_str()))
                })
            })
            .collect();

        if selected.len() > 1
            && let Some(curve) = curve
        {
            selected.retain(|jwk| jwk.curve() == Some(curve));
        }
        selected
    }

    /// Select the key verifying `jws`.
    pub fn select_for_verify<'a>(
        &self,
        jws: &ParsedJWS,
        keys: &'a [JWK],
        options: &ConsumeOptions,
    ) -> Result<&'a JWK, JoseError> {
        let candidates = self.filter(KeyUsage::Verify, jws.joint_header(), keys);
        self.pick(candidates, |jwk| {
            let key = jwk.to_key()?;
            jws.verify_signature(Some(&key), options)
        })
    }

    /// Select the key decrypting `jwe`.
    pub fn select_for_decrypt<'a>(
        &self,
        jwe: &ParsedJWE,
        keys: &'a [JWK],
        options: &ConsumeOptions,
    ) -> Result<&'a JWK, JoseError> {
        let candidates = self.filter(KeyUsage::Decrypt, jwe.joint_header(), keys);
        self.pick(candidates, |jwk| {
            let key = jwk.to_key()?;
            Ok(jwe.decrypt(&key, options).is_ok())
        })
    }

    fn pick<'a>(
        &self,
        candidates: Vec<&'a JWK>,
        attempt: impl Fn(&JWK) -> Result<bool, JoseError>,
    ) -> Result<&'a JWK, JoseError> {
        match candidates.as_slice() {
            [] => Err(JoseError::from_display(
                ErrorKind::UnresolvableKey,
                "no key matches the message header",
            )),
            [jwk] => Ok(*jwk),
            _ if !self.trial_disambiguation => Err(JoseError::from_display(
                ErrorKind::UnresolvableKey,
                format!("{} keys match the message header", candidates.len()),
            )),
            _ => {
                let mut winners = candidates.iter().filter(|jwk| match attempt(jwk) {
                    Ok(worked) => worked,
                    Err(err) => {
                        tracing::debug!(kid = jwk.kid(), %err, "trial with candidate key failed");
                        false
                    }
                });
                match (winners.next(), winners.next()) {
                    (Some(jwk), None) => {
                        tracing::debug!(
                            kid = jwk.kid(),
                            candidates = candidates.len(),
                            "key selected by trial"
                        );
                        Ok(*jwk)
                    }
                    (None, _) => Err(JoseError::from_display(
                        ErrorKind::UnresolvableKey,
                        "no candidate key works for the message",
                    )),
                    (Some(_), Some(_)) => Err(JoseError::from_display(
                        ErrorKind::UnresolvableKey,
                        "more than one candidate key works for the message",
                    )),
                }
            }
        }
    }
}

/// An absent header thumbprint matches anything. A key without a thumbprint
/// (and without a certificate to compute one from) is kept as well, only a
/// thumbprint that differs excludes the key.
fn thumbprint_matches(
    expected: Option<&str>,
    actual: impl FnOnce() -> Result<Option<String>, JoseError>,
) -> bool {
    let Some(expected) = expected else {
        return true;
    };
    match actual() {
        Ok(None) => true,
        Ok(Some(actual)) => actual == expected,
        Err(err) => {
            tracing::debug!(%err, "ignoring key with unreadable certificate thumbprint");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use tracing_test::traced_test;

    use super::*;
    use crate::jose::{
        ContentEncryptionAlgorithm, EcPrivateKey, JWECompact, JWSCompact, JsonWebKeySet, Key,
        ProviderContext, SigningKey,
    };

    // snapshot of a PingFederate JWKS endpoint
    const PING_JWKS: &str = r#"{"keys":[
        {"kty":"EC","kid":"zq2ym","use":"sig","x":"AAib8AfuP9X2esxxZXJUH0oggizKpaIhf9ou3taXkQ6-nNoUfZNHllwaQMWzkVSusHe_LiRLf-9MJ51grtFRCMeC","y":"ARdAq_upn_rh4DRonyfopZbCdeJKhy7_jycKW9wceFFrvP2ZGC8uX1cH9IbEpcmHzXI2yAx3UZS8JiMueU6J_YEI","crv":"P-521"},
        {"kty":"EC","kid":"zq2yl","use":"sig","x":"wwxLXWB-6zA06R6hs2GZQMezXpsql8piHuuz2uy_p8cJ1UDBXEjIblC2g2K0jqVR","y":"Bt0HwjlM4RoyCfq7DM9j34ujq_r45axa0S33YWLdQvHIwTj5bW1z81jqpPw0F_Xm","crv":"P-384"},
        {"kty":"EC","kid":"zq2yk","use":"sig","x":"9aKnpWa5Fnhvao2cWprEj4tpWCJpY06n2DsaxjJ6vbU","y":"ZlAzvRY_PP0lTJ3nkxIP6HUW9KgzzxE4WWicXQuvf6w","crv":"P-256"},
        {"kty":"RSA","kid":"zq2yj","use":"sig","n":"qqqF-eYSGLzU_ieAreTxa3Jj7zOy4uVKCpL6PeV5D85jHskPbaL7-SXzW6LlWSW6KUAW1Uwx_nohCZ7D5r24pW1tuQBnL20pfRs8gPpL28zsrK2SYg_AYyTJwmFTyYF5wfE8HZNGapF9-oHO794lSsWx_SpKQrH_vH_yqo8Bv_06Kf730VWIuREyW1kQS7sz56Aae5eH5oBnC45U4GqvshYLzd7CUvPNJWU7pumq_rzlr_MSMHjJs49CHXtqpezQgQvxQWfaOi691yrgLRl1QcrOqXwHNimrR1IOQyXx6_6isXLvGifZup48GmpzWQWyJ4t4Ud95ugc1HLeNlkHtBQ","e":"AQAB"},
        {"kty":"EC","kid":"zq2yi","use":"sig","x":"Aeu8Jbm9XTwhwHcq19BthU6VIz4HU7qDG7CNae81RujWu3aSEWoX1aAVRh_ZMABfMKWCtXvhh2FEpSAcQRiKilfG","y":"AOlx2rRLBLI3nh3eAlWI1ciFKWaw-6XEJw4o6nLXHRBVo92ADYJBItvRdKcBk-BYb4Cewma7KtNuIK8zZ2HEen6d","crv":"P-521"},
        {"kty":"EC","kid":"zq2yh","use":"sig","x":"gcqegh2wqsLgmikkGF1137rVf5QPhJb0hF7zwWNwSM5jyWwfwTlhNMc4V8FO01Jt","y":"-bO4V5xtasOgWsrCGs_bydqT0o3O29cA-5Sl7aqSfB7Z5-N3Dki5Ed2RZEU0Q7g0","crv":"P-384"},
        {"kty":"EC","kid":"zq2yg","use":"sig","x":"6elUcv15VpXlU995KVHZ3Jx6V8Cq7rCoodyIaXbQxS8","y":"mHnmwkt-jhxWKjzx75egxVx2B25QiRzi5l0jNDF9hu8","crv":"P-256"},
        {"kty":"RSA","kid":"zq2yf","use":"sig","n":"wbcVJs-T_yP6TEWmdAqTo3qFsdtpffUEqVbxtaWr-PiXs4DTWtig6kYO1Hwim0j780f6pBgWTKAOBhGm4e3RQH86cGA-kC6uD1931OLM1tcRhoaEsz9jrGWn31dSLBX9H_4YqR-a1V3fov09BmfODE7MRVEqmZXHRxGUxXLGZn294LxZDRGEKwflTo3QZDG-Yirzf4UnbPERmSJsz6KE5FkO1k1YWCh1JnPlE9suQZC6OXIFRYwVHUP_xo5vRxQ0tTO0z1YHfjNNpycLlCNOoxbuN3f7_vUD08U2v5YnXs8DPGCO_nG0gXDzeioqVDa2cvDKhOtSugbI_nVtPZgWSQ","e":"AQAB"},
        {"kty":"RSA","kid":"zq2yb","use":"sig","n":"lMRL3ng10Ahvh2ILcpEiKNi31ykHP8Iq7AENbwvsUzfag4ZBtid6RFBsfBMRrS_dGx1Ajjkpgj3igGlKiu0ZsSeu3zDK2e4apJGonxOQr7W2Bpv0bltU3bVRUb6i3-jv5sok33l2lKD6q7_UYRCmuo1ui2FGpwhorNVRFMe24HE895lvzGqDXUzsDKtMmZIt6Cj1WfJ68ZQ0gNByg-GVRtZ_BgZmyQwfTmPYxN_0uQ8usHz6kuSEysarzW_mUX1VEdzJ2dKBxmNwQlTW9v1UDvhUd2VXbGk1BvbJzFYL7z6GbxwhCynN-1bNb2rCFtRSI3UB2MgPbRkyjS97B7j34w","e":"AQAB"}
    ]}"#;

    fn header(alg: &str, kid: Option<&str>) -> Headers {
        let mut header = Headers::new().try_with_header(names::ALGORITHM, alg).unwrap();
        if let Some(kid) = kid {
            header.try_set_header(names::KEY_ID, kid).unwrap();
        }
        header
    }

    fn kids<'a>(selected: &[&'a JWK]) -> Vec<&'a str> {
        selected.iter().filter_map(|jwk| jwk.kid()).collect()
    }

    #[test]
    fn unique_kids() {
        let jwks = JsonWebKeySet::parse(PING_JWKS).unwrap();
        let selector = JwkSelector::new();
        let select = |alg, kid| kids(&selector.filter(KeyUsage::Verify, &header(alg, Some(kid)), jwks.keys()));

        assert_eq!(select("RS256", "zq2yb"), vec!["zq2yb"]);
        assert_eq!(select("RS512", "zq2yf"), vec!["zq2yf"]);
        // unknown kid
        assert!(select("RS256", "nope").is_empty());
        // known kid, wrong key type
        assert!(select("RS256", "zq2yg").is_empty());
        assert!(select("ES256", "zq2yj").is_empty());
        assert!(select("ES256", "zq2y0").is_empty());
        // a lone survivor is not curve checked
        assert_eq!(select("ES256", "zq2yi"), vec!["zq2yi"]);
        assert_eq!(select("ES384", "zq2yh"), vec!["zq2yh"]);
        // unknown algorithms select nothing
        assert!(select("nope", "zq2yb").is_empty());
    }

    #[test]
    fn shared_kid_is_narrowed_by_type_and_curve() {
        let ctx = ProviderContext::default();
        let p256 = Key::from(EcPrivateKey::generate(EllipticCurve::P256, &ctx).unwrap());
        let p384 = Key::from(EcPrivateKey::generate(EllipticCurve::P384, &ctx).unwrap());
        let jwk = |key: &Key| {
            JWK::from_key(&key.public_key().unwrap())
                .unwrap()
                .with_kid("2".to_owned())
        };
        let keys = vec![
            JWK::from_key(&Key::octet(vec![1u8; 32])).unwrap().with_kid("2".to_owned()),
            jwk(&p256),
            jwk(&p384),
        ];
        let selector = JwkSelector::new();

        let selected = selector.filter(KeyUsage::Verify, &header("ES256", Some("2")), &keys);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].curve(), Some(EllipticCurve::P256));

        let selected = selector.filter(KeyUsage::Verify, &header("ES384", Some("2")), &keys);
        assert_eq!(selected[0].curve(), Some(EllipticCurve::P384));

        let selected = selector.filter(KeyUsage::Verify, &header("HS256", Some("2")), &keys);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].kty(), KeyType::Octet);

        assert!(selector.filter(KeyUsage::Verify, &header("RS256", Some("2")), &keys).is_empty());
    }

    #[test]
    fn use_alg_and_key_ops_filters() {
        let secret = || JWK::from_key(&Key::octet(vec![1u8; 32])).unwrap();
        let keys = vec![
            secret().with_kid("enc".to_owned()).with_key_use(JWKUse::Encryption),
            secret().with_kid("hs512".to_owned()).with_alg("HS512".to_owned()),
            secret()
                .with_kid("sign-only".to_owned())
                .with_key_ops(vec!["sign".to_owned()]),
            secret()
                .with_kid("verify".to_owned())
                .with_key_ops(vec!["verify".to_owned(), "frobnicate".to_owned()]),
            secret().with_kid("plain".to_owned()).with_key_use(JWKUse::Signature),
        ];
        let selector = JwkSelector::new();

        let selected = selector.filter(KeyUsage::Verify, &header("HS256", None), &keys);
        assert_eq!(kids(&selected), vec!["verify", "plain"]);

        let selected = selector.filter(KeyUsage::Verify, &header("HS512", None), &keys);
        assert_eq!(kids(&selected), vec!["hs512", "verify", "plain"]);

        let selected = selector.filter(KeyUsage::Decrypt, &header("A256KW", None), &keys);
        assert_eq!(kids(&selected), vec!["enc"]);

        // "none" takes no key at all
        assert!(selector.filter(KeyUsage::Verify, &header("none", None), &keys).is_empty());
    }

    #[test]
    fn x509_thumbprints() {
        // x5t of the DER bytes [1, 2, 3]
        let with_cert = JWK::from_key(&Key::octet(vec![1u8; 32]))
            .unwrap()
            .with_kid("cert".to_owned())
            .with_x5c(vec!["AQID".to_owned()]);
        let other_cert = JWK::from_key(&Key::octet(vec![3u8; 32]))
            .unwrap()
            .with_kid("other-cert".to_owned())
            .with_x5c(vec!["BAUG".to_owned()]);
        let keys = vec![
            with_cert.clone(),
            JWK::from_key(&Key::octet(vec![2u8; 32]))
                .unwrap()
                .with_kid("no-cert".to_owned()),
            other_cert,
        ];
        let x5t = with_cert.x5t().unwrap().unwrap();
        let x5t_sha256 = with_cert.x5t_sha256().unwrap().unwrap();
        let selector = JwkSelector::new();

        let by_sha1 = header("HS256", None)
            .try_with_header(names::X509_THUMBPRINT, &x5t)
            .unwrap();
        // keys without any certificate stay in, a different certificate does not
        assert_eq!(
            kids(&selector.filter(KeyUsage::Verify, &by_sha1, &keys)),
            vec!["cert", "no-cert"]
        );

        let by_sha256 = header("HS256", None)
            .try_with_header(names::X509_THUMBPRINT_SHA256, &x5t_sha256)
            .unwrap();
        assert_eq!(
            kids(&selector.filter(KeyUsage::Verify, &by_sha256, &keys)),
            vec!["cert", "no-cert"]
        );

        let mismatch = header("HS256", None)
            .try_with_header(names::X509_THUMBPRINT_SHA256, "NOPENOPE3dZmZc_-K31CzStJl5pH3QjRp45D8uhinM")
            .unwrap();
        assert_eq!(
            kids(&selector.filter(KeyUsage::Verify, &mismatch, &keys)),
            vec!["no-cert"]
        );
    }

    #[test]
    fn header_thumbprint_keeps_keys_without_certificates() {
        let keys = vec![
            JWK::from_key(&Key::octet(vec![4u8; 32]))
                .unwrap()
                .with_kid("k".to_owned()),
        ];
        let header = header("HS256", Some("k"))
            .try_with_header(names::X509_THUMBPRINT, "kriMPdmBvx68skT8-mPAB3BseeA")
            .unwrap();
        let selected = JwkSelector::new().filter(KeyUsage::Verify, &header, &keys);
        assert_eq!(kids(&selected), vec!["k"]);
    }

    #[test]
    #[traced_test]
    fn trial_disambiguation_for_verification() {
        let keys: Vec<JWK> = (1u8..=3)
            .map(|fill| JWK::from_key(&Key::octet(vec![fill; 32])).unwrap())
            .collect();
        let jws = JWSCompact::builder()
            .with_payload("which key?")
            .build_compact(&SigningKey::new(JWA::HS256, Key::octet(vec![2u8; 32])))
            .unwrap()
            .parse()
            .unwrap();
        let options = ConsumeOptions::default();

        let err = JwkSelector::new()
            .select_for_verify(&jws, &keys, &options)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnresolvableKey);

        let trial = JwkSelector::new().with_trial_disambiguation(true);
        let selected = trial.select_for_verify(&jws, &keys, &options).unwrap();
        assert_eq!(selected, &keys[1]);
        assert!(logs_contain("key selected by trial"));

        // the same key twice can not be told apart
        let twice = vec![keys[1].clone(), keys[1].clone()];
        let err = trial.select_for_verify(&jws, &twice, &options).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnresolvableKey);
    }

    #[test]
    fn decryption_keys_follow_epk_curve() {
        let ctx = ProviderContext::default();
        let p256 = Key::from(EcPrivateKey::generate(EllipticCurve::P256, &ctx).unwrap());
        let p384 = Key::from(EcPrivateKey::generate(EllipticCurve::P384, &ctx).unwrap());
        let keys = vec![
            JWK::from_key(&p256).unwrap(),
            JWK::from_key(&p384).unwrap(),
            JWK::from_key(&Key::octet(vec![1u8; 16])).unwrap(),
        ];
        let jwe = JWECompact::builder(
            KeyManagementAlgorithm::EcdhEs,
            ContentEncryptionAlgorithm::A128Gcm,
        )
        .with_payload("for p384")
        .build_compact(&p384.public_key().unwrap())
        .unwrap()
        .parse()
        .unwrap();

        let selected = JwkSelector::new()
            .select_for_decrypt(&jwe, &keys, &ConsumeOptions::default())
            .unwrap();
        assert_eq!(selected.curve(), Some(EllipticCurve::P384));

        let jwe = JWECompact::builder(
            KeyManagementAlgorithm::A128KW,
            ContentEncryptionAlgorithm::A128Gcm,
        )
        .with_payload("for the secret")
        .build_compact(&Key::octet(vec![1u8; 16]))
        .unwrap()
        .parse()
        .unwrap();
        let selected = JwkSelector::new()
            .select_for_decrypt(&jwe, &keys, &ConsumeOptions::default())
            .unwrap();
        assert_eq!(selected.kty(), KeyType::Octet);
    }
}
