use aws_lc_rs::digest::{Digest, SHA1_FOR_LEGACY_USE_ONLY, SHA256, digest};
use base64::{Engine as _, prelude::BASE64_STANDARD};
use jwx_error::ErrorContext;
use jwx_utils::macros::generate_set_and_with;
use serde::{Deserialize, Deserializer, Serialize, Serializer, ser::SerializeStruct};
use zeroize::Zeroizing;

use crate::jose::{
    EcPrivateKey, EcPublicKey, EllipticCurve, ErrorKind, JoseError, Key, KeyType, OctetKey,
    RsaPrivateKey, RsaPublicKey,
    der::RsaPrivateParts,
    encoding::{b64_decode, b64_encode, parse_json_object},
    error::WithKind,
};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
/// [`JWK`] or JSON Web Key as defined in [`rfc7517`]
///
/// [`rfc7517`]: https://datatracker.ietf.org/doc/html/rfc7517
pub struct JWK {
    #[serde(flatten)]
    key_type: JWKType,
    #[serde(skip_serializing_if = "Option::is_none")]
    kid: Option<String>,
    /// Intended algorithm to be used with this key.
    ///
    /// Kept as a plain string: a key set may name algorithms this crate does not know.
    #[serde(skip_serializing_if = "Option::is_none")]
    alg: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    r#use: Option<JWKUse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    key_ops: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    x5c: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    x5t: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "x5t#S256")]
    x5t_sha256: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kty")]
/// The "kty" (key type) parameter identifies the cryptographic algorithm family used with the key,
/// together with the members of that family.
///
/// Private members are optional; a key without them is a public key.
pub enum JWKType {
    RSA {
        n: String,
        e: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        d: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        p: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        q: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        dp: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        dq: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        qi: Option<String>,
    },
    /// Elliptic curve
    EC {
        crv: EllipticCurve,
        x: String,
        y: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        d: Option<String>,
    },
    /// An octet sequence key, which represents a symmetric key
    #[serde(rename = "oct")]
    OCT { k: String },
}

/// Required members of a [`JWKType`] in lexicographic order, as hashed by [`rfc7638`].
///
/// [`rfc7638`]: https://datatracker.ietf.org/doc/html/rfc7638
struct ThumbprintMembers<'a>(&'a JWKType);

impl Serialize for ThumbprintMembers<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        // Order here is important as this output will be used to generate jwk thumb
        match self.0 {
            JWKType::EC { crv, x, y, .. } => {
                let mut state = serializer.serialize_struct("JWKType", 4)?;
                state.serialize_field("crv", crv)?;
                state.serialize_field("kty", "EC")?;
                state.serialize_field("x", x)?;
                state.serialize_field("y", y)?;
                state.end()
            }
            JWKType::RSA { n, e, .. } => {
                let mut state = serializer.serialize_struct("JWKType", 3)?;
                state.serialize_field("e", e)?;
                state.serialize_field("kty", "RSA")?;
                state.serialize_field("n", n)?;
                state.end()
            }
            JWKType::OCT { k } => {
                let mut state = serializer.serialize_struct("JWKType", 2)?;
                state.serialize_field("k", k)?;
                state.serialize_field("kty", "oct")?;
                state.end()
            }
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
/// [`JWKUse`] identifies the intended use of the public key
pub enum JWKUse {
    #[serde(rename = "sig")]
    Signature,
    #[serde(rename = "enc")]
    Encryption,
}

impl JWK {
    /// Create a [`JWK`] with only key members set.
    pub fn new(key_type: JWKType) -> Self {
        Self {
            key_type,
            kid: None,
            alg: None,
            r#use: None,
            key_ops: None,
            x5c: None,
            x5t: None,
            x5t_sha256: None,
        }
    }

    /// Export a [`Key`], including its private members.
    pub fn from_key(key: &Key) -> Result<Self, JoseError> {
        let key_type = match key {
            Key::Octet(key) => JWKType::OCT {
                k: b64_encode(key.as_bytes()),
            },
            Key::RsaPublic(key) => rsa_public_members(key),
            Key::RsaPrivate(key) => {
                let parts = key.parts()?;
                JWKType::RSA {
                    n: b64_encode(&parts.n),
                    e: b64_encode(&parts.e),
                    d: Some(b64_encode(&parts.d)),
                    p: Some(b64_encode(&parts.p)),
                    q: Some(b64_encode(&parts.q)),
                    dp: Some(b64_encode(&parts.dp)),
                    dq: Some(b64_encode(&parts.dq)),
                    qi: Some(b64_encode(&parts.qi)),
                }
            }
            Key::EcPublic(key) => ec_public_members(key, None),
            Key::EcPrivate(key) => ec_public_members(key.public_key(), Some(key.scalar())),
        };
        Ok(Self::new(key_type))
    }

    /// Parse a single JWK from its JSON representation.
    pub fn parse(json: &str) -> Result<Self, JoseError> {
        let members = parse_json_object(json.as_bytes(), "JWK")?;
        serde_json::from_value(members.into())
            .context("read JWK members")
            .with_kind(ErrorKind::Structural)
    }

    /// Serialize to compact JSON.
    pub fn to_json(&self) -> Result<String, JoseError> {
        serde_json::to_string(self)
            .context("serialize JWK")
            .with_kind(ErrorKind::Structural)
    }

    pub fn key_type(&self) -> &JWKType {
        &self.key_type
    }

    pub fn kty(&self) -> KeyType {
        match self.key_type {
            JWKType::RSA { .. } => KeyType::Rsa,
            JWKType::EC { .. } => KeyType::Ec,
            JWKType::OCT { .. } => KeyType::Octet,
        }
    }

    pub fn curve(&self) -> Option<EllipticCurve> {
        match self.key_type {
            JWKType::EC { crv, .. } => Some(crv),
            _ => None,
        }
    }

    pub fn kid(&self) -> Option<&str> {
        self.kid.as_deref()
    }

    pub fn alg(&self) -> Option<&str> {
        self.alg.as_deref()
    }

    pub fn key_use(&self) -> Option<JWKUse> {
        self.r#use
    }

    pub fn key_ops(&self) -> Option<&[String]> {
        self.key_ops.as_deref()
    }

    pub fn x5c(&self) -> Option<&[String]> {
        self.x5c.as_deref()
    }

    generate_set_and_with!(
        /// Set the "kid" (key id)
        pub fn kid(mut self, kid: Option<String>) -> Self {
            self.kid = kid;
            self
        }
    );

    generate_set_and_with!(
        /// Set the "alg" this key is intended for
        pub fn alg(mut self, alg: Option<String>) -> Self {
            self.alg = alg;
            self
        }
    );

    generate_set_and_with!(
        /// Set the intended "use" of this key
        pub fn key_use(mut self, key_use: Option<JWKUse>) -> Self {
            self.r#use = key_use;
            self
        }
    );

    generate_set_and_with!(
        /// Set the permitted "key_ops"
        pub fn key_ops(mut self, key_ops: Option<Vec<String>>) -> Self {
            self.key_ops = key_ops;
            self
        }
    );

    generate_set_and_with!(
        /// Set the "x5c" certificate chain, standard base64 DER certificates
        pub fn x5c(mut self, x5c: Option<Vec<String>>) -> Self {
            self.x5c = x5c;
            self
        }
    );

    /// Whether private key members are present.
    pub fn is_private(&self) -> bool {
        match &self.key_type {
            JWKType::RSA { d, .. } | JWKType::EC { d, .. } => d.is_some(),
            JWKType::OCT { .. } => true,
        }
    }

    /// Copy of this key without private members.
    #[must_use]
    pub fn to_public(&self) -> Self {
        let mut public = self.clone();
        match &mut public.key_type {
            JWKType::RSA {
                d, p, q, dp, dq, qi, ..
            } => {
                for member in [d, p, q, dp, dq, qi] {
                    *member = None;
                }
            }
            JWKType::EC { d, .. } => *d = None,
            JWKType::OCT { .. } => {}
        }
        public
    }

    /// SHA-256 JWK thumbprint as defined in [`rfc7638`], a stable identifier for a [`JWK`]
    ///
    /// [`rfc7638`]: https://datatracker.ietf.org/doc/html/rfc7638
    pub fn thumb_sha256(&self) -> Result<Digest, JoseError> {
        Ok(digest(
            &SHA256,
            &serde_json::to_vec(&ThumbprintMembers(&self.key_type))
                .context("failed to serialise JWK")
                .with_kind(ErrorKind::Structural)?,
        ))
    }

    /// Base64url encoded [`JWK::thumb_sha256`].
    pub fn thumbprint(&self) -> Result<String, JoseError> {
        self.thumb_sha256().map(b64_encode)
    }

    /// The "x5t" of this key: explicit, or the SHA-1 of the first "x5c" certificate.
    pub fn x5t(&self) -> Result<Option<String>, JoseError> {
        self.x509_thumbprint(self.x5t.as_deref(), &SHA1_FOR_LEGACY_USE_ONLY)
    }

    /// The "x5t#S256" of this key: explicit, or the SHA-256 of the first "x5c" certificate.
    pub fn x5t_sha256(&self) -> Result<Option<String>, JoseError> {
        self.x509_thumbprint(self.x5t_sha256.as_deref(), &SHA256)
    }

    fn x509_thumbprint(
        &self,
        explicit: Option<&str>,
        algorithm: &'static aws_lc_rs::digest::Algorithm,
    ) -> Result<Option<String>, JoseError> {
        if let Some(explicit) = explicit {
            return Ok(Some(explicit.to_owned()));
        }
        let Some(first) = self.x5c.as_ref().and_then(|chain| chain.first()) else {
            return Ok(None);
        };
        let der = BASE64_STANDARD
            .decode(first)
            .context("decode x5c certificate")
            .with_kind(ErrorKind::Key)?;
        Ok(Some(b64_encode(digest(algorithm, &der))))
    }

    /// Convert to a [`Key`], private if private members are present.
    pub fn to_key(&self) -> Result<Key, JoseError> {
        match &self.key_type {
            JWKType::OCT { k } => Ok(Key::Octet(OctetKey::new(decode_member(k, "k")?))),
            JWKType::EC { crv, x, y, d } => {
                let x = decode_member(x, "x")?;
                let y = decode_member(y, "y")?;
                match d {
                    Some(d) => {
                        let d = Zeroizing::new(decode_member(d, "d")?);
                        EcPrivateKey::from_parts(*crv, &x, &y, &d).map(Key::EcPrivate)
                    }
                    None => EcPublicKey::from_coordinates(*crv, &x, &y).map(Key::EcPublic),
                }
            }
            JWKType::RSA {
                n,
                e,
                d,
                p,
                q,
                dp,
                dq,
                qi,
            } => {
                let n = decode_member(n, "n")?;
                let e = decode_member(e, "e")?;
                let Some(d) = d else {
                    return RsaPublicKey::from_components(&n, &e).map(Key::RsaPublic);
                };
                let (Some(p), Some(q), Some(dp), Some(dq), Some(qi)) = (p, q, dp, dq, qi) else {
                    return Err(JoseError::from_display(
                        ErrorKind::Key,
                        "RSA private JWK without CRT members is not supported",
                    ));
                };
                let parts = RsaPrivateParts {
                    n,
                    e,
                    d: decode_member(d, "d")?,
                    p: decode_member(p, "p")?,
                    q: decode_member(q, "q")?,
                    dp: decode_member(dp, "dp")?,
                    dq: decode_member(dq, "dq")?,
                    qi: decode_member(qi, "qi")?,
                };
                RsaPrivateKey::from_parts(&parts).map(Key::RsaPrivate)
            }
        }
    }
}

fn rsa_public_members(key: &RsaPublicKey) -> JWKType {
    JWKType::RSA {
        n: b64_encode(key.modulus()),
        e: b64_encode(key.exponent()),
        d: None,
        p: None,
        q: None,
        dp: None,
        dq: None,
        qi: None,
    }
}

fn ec_public_members(key: &EcPublicKey, d: Option<&[u8]>) -> JWKType {
    JWKType::EC {
        crv: key.curve(),
        x: b64_encode(key.x()),
        y: b64_encode(key.y()),
        d: d.map(b64_encode),
    }
}

fn decode_member(value: &str, member: &'static str) -> Result<Vec<u8>, JoseError> {
    b64_decode(value, member).map_err(|err| JoseError::new(ErrorKind::Key, err))
}

#[derive(Clone, Debug, Default, Serialize, PartialEq, Eq)]
/// A JWK Set as defined in section 5 of [`rfc7517`].
///
/// Parsing is lenient: members of "keys" that are not usable keys
/// (unknown "kty", missing members, ...) are skipped.
///
/// [`rfc7517`]: https://datatracker.ietf.org/doc/html/rfc7517#section-5
pub struct JsonWebKeySet {
    keys: Vec<JWK>,
}

impl<'de> Deserialize<'de> for JsonWebKeySet {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct RawSet {
            keys: Vec<serde_json::Value>,
        }

        let raw = RawSet::deserialize(deserializer)?;
        let keys = raw
            .keys
            .into_iter()
            .filter_map(|value| match serde_json::from_value::<JWK>(value) {
                Ok(jwk) => Some(jwk),
                Err(err) => {
                    tracing::debug!(%err, "skipping unusable member of JWK set");
                    None
                }
            })
            .collect();
        Ok(Self { keys })
    }
}

impl JsonWebKeySet {
    pub fn new(keys: Vec<JWK>) -> Self {
        Self { keys }
    }

    /// Parse a JWK Set document.
    pub fn parse(json: &str) -> Result<Self, JoseError> {
        serde_json::from_str(json)
            .context("parse JWK set")
            .with_kind(ErrorKind::Structural)
    }

    pub fn to_json(&self) -> Result<String, JoseError> {
        serde_json::to_string(self)
            .context("serialize JWK set")
            .with_kind(ErrorKind::Structural)
    }

    pub fn keys(&self) -> &[JWK] {
        &self.keys
    }

    pub fn into_keys(self) -> Vec<JWK> {
        self.keys
    }

    pub fn push(&mut self, jwk: JWK) {
        self.keys.push(jwk);
    }

    /// First key with the given "kid".
    pub fn find_by_kid(&self, kid: &str) -> Option<&JWK> {
        self.keys.iter().find(|jwk| jwk.kid() == Some(kid))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl From<Vec<JWK>> for JsonWebKeySet {
    fn from(keys: Vec<JWK>) -> Self {
        Self::new(keys)
    }
}

#[cfg(test)]
mod tests {
    use aws_lc_rs::rsa::KeySize;

    use super::*;
    use crate::jose::ProviderContext;

    #[test]
    fn jwk_thumb_order_is_correct() {
        let jwk_type = JWKType::EC {
            crv: EllipticCurve::P256,
            x: "x".into(),
            y: "y".into(),
            d: Some("d".into()),
        };
        let output = serde_json::to_string(&ThumbprintMembers(&jwk_type)).unwrap();
        let expected_output = r##"{"crv":"P-256","kty":"EC","x":"x","y":"y"}"##;
        assert_eq!(&output, expected_output);

        let jwk_type = rsa_public_members(&RsaPublicKey::from_components(&[1], &[3]).unwrap());
        let output = serde_json::to_string(&ThumbprintMembers(&jwk_type)).unwrap();
        let expected_output = r##"{"e":"Aw","kty":"RSA","n":"AQ"}"##;
        assert_eq!(&output, expected_output);

        let jwk_type = JWKType::OCT { k: "k".into() };
        let output = serde_json::to_string(&ThumbprintMembers(&jwk_type)).unwrap();
        let expected_output = r##"{"k":"k","kty":"oct"}"##;
        assert_eq!(&output, expected_output);
    }

    #[test]
    fn rfc7638_thumbprint() {
        let jwk = JWK::parse(
            r#"{
              "kty": "RSA",
              "n": "0vx7agoebGcQSuuPiLJXZptN9nndrQmbXEps2aiAFbWhM78LhWx4cbbfAAtVT86zwu1RK7aPFFxuhDR1L6tSoc_BJECPebWKRXjBZCiFV4n3oknjhMstn64tZ_2W-5JsGY4Hc5n9yBXArwl93lqt7_RN5w6Cf0h4QyQ5v-65YGjQR0_FDW2QvzqY368QQMicAtaSqzs8KJZgnYb9c7d0zgdAZHzu6qMQvRL5hajrn1n91CbOpbISD08qNLyrdkt-bFTWhAI4vMQFh6WeZu0fM4lFd2NcRwr3XPksINHaQ-G_xBniIqbw0Ls1jF44-csFCur-kEgU8awapJzKnqDKgw",
              "e": "AQAB",
              "alg": "RS256",
              "kid": "2011-04-29"
            }"#,
        )
        .unwrap();
        assert_eq!(
            jwk.thumbprint().unwrap(),
            "NzbLsXh8uDCcd-6MNwXF4W_7noWXFZAfHkxZsRGC9Xs"
        );
        assert_eq!(jwk.kid(), Some("2011-04-29"));
        assert_eq!(jwk.alg(), Some("RS256"));
        assert!(!jwk.is_private());
    }

    #[test]
    fn ec_private_jwk_round_trip() {
        let jwk = JWK::parse(
            r#"{"kty":"EC","crv":"P-256",
                "x":"weNJy2HscCSM6AEDTDg04biOvhFhyyWvOHQfeF_PxMQ",
                "y":"e8lnCO-AlStT-NJVX-crhB7QRYhiix03illJOVAOyck",
                "d":"VEmDZpDXXK8p8N0Cndsxs924q6nS1RXFASRl6BfUqdw"}"#,
        )
        .unwrap();
        assert!(jwk.is_private());
        let key = jwk.to_key().unwrap();
        assert!(matches!(key, Key::EcPrivate(_)));
        assert_eq!(JWK::from_key(&key).unwrap(), jwk);

        let public = jwk.to_public();
        assert!(!public.is_private());
        assert!(matches!(public.to_key().unwrap(), Key::EcPublic(_)));
        assert_eq!(public.thumbprint().unwrap(), jwk.thumbprint().unwrap());
    }

    #[test]
    fn rsa_private_jwk_round_trip() {
        let key = Key::RsaPrivate(RsaPrivateKey::generate(KeySize::Rsa2048).unwrap());
        let jwk = JWK::from_key(&key).unwrap();
        assert!(jwk.is_private());

        let json = jwk.to_json().unwrap();
        let parsed = JWK::parse(&json).unwrap();
        let reloaded = parsed.to_key().unwrap();
        assert!(matches!(reloaded, Key::RsaPrivate(_)));
        assert_eq!(
            reloaded.rsa_public().unwrap(),
            key.rsa_public().unwrap()
        );
    }

    #[test]
    fn octet_jwk_uses_lowercase_kty() {
        let jwk = JWK::from_key(&Key::octet(vec![1, 2, 3])).unwrap().with_kid("k1".to_owned());
        assert_eq!(jwk.to_json().unwrap(), r#"{"kty":"oct","k":"AQID","kid":"k1"}"#);
        assert_eq!(jwk.kty(), KeyType::Octet);
    }

    #[test]
    fn x5t_is_computed_from_x5c() {
        let jwk = JWK::from_key(&Key::octet(vec![0; 16]))
            .unwrap()
            .with_x5c(vec!["AQID".to_owned()]);
        assert_eq!(jwk.x5t().unwrap().as_deref(), Some("cDeAcZjCKn0rCAc3HXY3eahP388"));
        assert_eq!(
            jwk.x5t_sha256().unwrap().as_deref(),
            Some("A5BYxvLAy0ksUzsKTRTvd8wPeKvMztUofYShogEc-4E")
        );

        let bare = JWK::from_key(&Key::octet(vec![0; 16])).unwrap();
        assert_eq!(bare.x5t().unwrap(), None);
    }

    #[test]
    fn rsa_jwk_without_crt_members_is_rejected() {
        let jwk = JWK::parse(r#"{"kty":"RSA","n":"AQ","e":"AQAB","d":"AQ"}"#).unwrap();
        assert_eq!(jwk.to_key().unwrap_err().kind(), ErrorKind::Key);
    }

    #[test]
    fn bad_member_encoding_is_key_error() {
        let jwk = JWK::parse(r#"{"kty":"oct","k":"not base64!"}"#).unwrap();
        assert_eq!(jwk.to_key().unwrap_err().kind(), ErrorKind::Key);
    }

    #[test]
    fn jwks_skips_unusable_members() {
        let ctx = ProviderContext::default();
        let ec = EcPrivateKey::generate(EllipticCurve::P384, &ctx).unwrap();
        let mut ec_jwk = JWK::from_key(&Key::EcPublic(ec.public_key().clone())).unwrap();
        ec_jwk.set_kid("ec".to_owned());
        let ec_json = ec_jwk.to_json().unwrap();

        let json = format!(
            r#"{{"keys":[
                {{"kty":"OKP","crv":"Ed25519","x":"11qYAYKxCrfVS_7TyWQHOg7hcvPapiMlrwIaaPcHURo"}},
                {ec_json},
                {{"kty":"EC","crv":"P-999","x":"AA","y":"AA"}},
                "garbage"
            ]}}"#
        );
        let jwks = JsonWebKeySet::parse(&json).unwrap();
        assert_eq!(jwks.len(), 1);
        assert_eq!(jwks.find_by_kid("ec"), Some(&ec_jwk));
        assert!(jwks.find_by_kid("nope").is_none());
    }

    #[test]
    fn jwk_duplicate_members_are_rejected() {
        let err = JWK::parse(r#"{"kty":"oct","k":"AQID","k":"AQIE"}"#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Structural);
    }
}
