//! Consuming received JOSE messages: options, key resolution and nesting.

use std::collections::BTreeSet;

use jwx_utils::macros::generate_set_and_with;

use crate::jose::{
    AlgorithmConstraints, DEFAULT_MAX_INFLATED_LEN, ErrorKind, Headers, JWA, JoseError,
    JsonWebKeySet, JwkSelector, Key, ParsedJWE, ParsedJWS, ProtectedHeader, ProviderContext,
};

/// Layers, the outermost one included, opened by [`consume_nested`] unless configured otherwise.
pub const DEFAULT_MAX_NESTING_DEPTH: usize = 4;

#[derive(Debug, Clone)]
/// Policy applied while verifying or decrypting a received message.
///
/// The defaults block the unsecured "none" algorithm, allow every
/// content encryption algorithm and understand no critical header but "b64".
pub struct ConsumeOptions {
    algorithm_constraints: AlgorithmConstraints,
    content_encryption_constraints: AlgorithmConstraints,
    known_critical_headers: BTreeSet<String>,
    detached_payload: Option<Vec<u8>>,
    trial_disambiguation: bool,
    max_inflated_len: usize,
    max_nesting_depth: usize,
    provider: ProviderContext,
}

impl Default for ConsumeOptions {
    fn default() -> Self {
        Self {
            algorithm_constraints: AlgorithmConstraints::disallow_none(),
            content_encryption_constraints: AlgorithmConstraints::no_constraints(),
            known_critical_headers: BTreeSet::new(),
            detached_payload: None,
            trial_disambiguation: false,
            max_inflated_len: DEFAULT_MAX_INFLATED_LEN,
            max_nesting_depth: DEFAULT_MAX_NESTING_DEPTH,
            provider: ProviderContext::default(),
        }
    }
}

impl ConsumeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    generate_set_and_with! {
        /// Constraints on "alg" of signed and encrypted messages.
        pub fn algorithm_constraints(mut self, constraints: AlgorithmConstraints) -> Self {
            self.algorithm_constraints = constraints;
            self
        }
    }

    generate_set_and_with! {
        /// Constraints on "enc" of encrypted messages.
        pub fn content_encryption_constraints(mut self, constraints: AlgorithmConstraints) -> Self {
            self.content_encryption_constraints = constraints;
            self
        }
    }

    generate_set_and_with! {
        /// Treat `name` as understood when it is listed in "crit".
        pub fn known_critical_header(mut self, name: impl Into<String>) -> Self {
            self.known_critical_headers.insert(name.into());
            self
        }
    }

    generate_set_and_with! {
        /// Payload to verify a detached JWS against.
        pub fn detached_payload(mut self, payload: Option<Vec<u8>>) -> Self {
            self.detached_payload = payload;
            self
        }
    }

    generate_set_and_with! {
        /// When several keys of a set pass every filter, try each of them
        /// and keep the one that actually verifies (or decrypts).
        pub fn trial_disambiguation(mut self, enabled: bool) -> Self {
            self.trial_disambiguation = enabled;
            self
        }
    }

    generate_set_and_with! {
        /// Limit on the size of a decompressed JWE payload.
        pub fn max_inflated_len(mut self, len: usize) -> Self {
            self.max_inflated_len = len;
            self
        }
    }

    generate_set_and_with! {
        /// Limit on the number of layers [`consume_nested`] opens, the outermost one included.
        pub fn max_nesting_depth(mut self, depth: usize) -> Self {
            self.max_nesting_depth = depth;
            self
        }
    }

    generate_set_and_with! {
        pub fn provider(mut self, ctx: ProviderContext) -> Self {
            self.provider = ctx;
            self
        }
    }

    pub fn algorithm_constraints(&self) -> &AlgorithmConstraints {
        &self.algorithm_constraints
    }

    pub fn content_encryption_constraints(&self) -> &AlgorithmConstraints {
        &self.content_encryption_constraints
    }

    pub fn known_critical_headers(&self) -> &BTreeSet<String> {
        &self.known_critical_headers
    }

    pub fn detached_payload(&self) -> Option<&[u8]> {
        self.detached_payload.as_deref()
    }

    pub fn trial_disambiguation(&self) -> bool {
        self.trial_disambiguation
    }

    pub fn max_inflated_len(&self) -> usize {
        self.max_inflated_len
    }

    pub fn max_nesting_depth(&self) -> usize {
        self.max_nesting_depth
    }

    pub fn provider(&self) -> &ProviderContext {
        &self.provider
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// A parsed compact message of either shape.
pub enum JoseMessage {
    Signed(ParsedJWS),
    Encrypted(ParsedJWE),
}

impl JoseMessage {
    /// Parse a compact message, telling JWS (3 parts) and JWE (5 parts) apart.
    pub fn parse_compact(compact: &str) -> Result<Self, JoseError> {
        match compact.split('.').count() {
            3 => ParsedJWS::parse_compact(compact).map(Self::Signed),
            5 => ParsedJWE::parse_compact(compact).map(Self::Encrypted),
            n => Err(JoseError::from_display(
                ErrorKind::Structural,
                format!("compact JOSE message must have 3 or 5 parts, got {n}"),
            )),
        }
    }

    pub fn header(&self) -> &ProtectedHeader {
        match self {
            Self::Signed(jws) => jws.header(),
            Self::Encrypted(jwe) => jwe.header(),
        }
    }

    /// Protected and unprotected members together.
    pub fn joint_header(&self) -> &Headers {
        match self {
            Self::Signed(jws) => jws.joint_header(),
            Self::Encrypted(jwe) => jwe.joint_header(),
        }
    }

    /// Declared "alg".
    pub fn algorithm(&self) -> Result<&str, JoseError> {
        match self {
            Self::Signed(jws) => jws.algorithm(),
            Self::Encrypted(jwe) => jwe.algorithm(),
        }
    }

    fn is_unsecured(&self) -> Result<bool, JoseError> {
        Ok(matches!(self, Self::Signed(_)) && self.algorithm()? == JWA::None.id())
    }

    /// Declared algorithms against `options`, before any key is resolved.
    fn check_constraints(&self, options: &ConsumeOptions) -> Result<(), JoseError> {
        options.algorithm_constraints().check(self.algorithm()?)?;
        if let Self::Encrypted(jwe) = self {
            options
                .content_encryption_constraints()
                .check(jwe.content_encryption()?)?;
        }
        Ok(())
    }

    /// Verify or decrypt this message with `key`, `None` only for "none".
    pub fn open(&self, key: Option<&Key>, options: &ConsumeOptions) -> Result<Vec<u8>, JoseError> {
        match self {
            Self::Signed(jws) => jws
                .clone()
                .verify(key, options)
                .map(|decoded| decoded.into_payload()),
            Self::Encrypted(jwe) => {
                let key = key.ok_or_else(|| {
                    JoseError::from_display(ErrorKind::Key, "decryption requires a key")
                })?;
                jwe.decrypt(key, options)
                    .map(|decrypted| decrypted.into_payload())
            }
        }
    }
}

/// [`KeyResolver`] picks the key that verifies or decrypts a message,
/// after looking at its header.
pub trait KeyResolver {
    fn resolve(&self, message: &JoseMessage, options: &ConsumeOptions) -> Result<Key, JoseError>;
}

impl KeyResolver for Key {
    fn resolve(&self, _message: &JoseMessage, _options: &ConsumeOptions) -> Result<Key, JoseError> {
        Ok(self.clone())
    }
}

impl<F> KeyResolver for F
where
    F: Fn(&JoseMessage, &ConsumeOptions) -> Result<Key, JoseError>,
{
    fn resolve(&self, message: &JoseMessage, options: &ConsumeOptions) -> Result<Key, JoseError> {
        self(message, options)
    }
}

#[derive(Debug, Clone)]
/// [`KeyResolver`] selecting from a JWK set with a [`JwkSelector`].
///
/// Trial disambiguation follows [`ConsumeOptions::trial_disambiguation`].
pub struct JwksKeyResolver {
    keys: JsonWebKeySet,
}

impl JwksKeyResolver {
    pub fn new(keys: impl Into<JsonWebKeySet>) -> Self {
        Self { keys: keys.into() }
    }

    pub fn keys(&self) -> &JsonWebKeySet {
        &self.keys
    }
}

impl KeyResolver for JwksKeyResolver {
    fn resolve(&self, message: &JoseMessage, options: &ConsumeOptions) -> Result<Key, JoseError> {
        let selector = JwkSelector::new().with_trial_disambiguation(options.trial_disambiguation());
        let jwk = match message {
            JoseMessage::Signed(jws) => selector.select_for_verify(jws, self.keys.keys(), options)?,
            JoseMessage::Encrypted(jwe) => {
                selector.select_for_decrypt(jwe, self.keys.keys(), options)?
            }
        };
        jwk.to_key()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Result of [`consume`] or [`consume_nested`].
pub struct ConsumedMessage {
    payload: Vec<u8>,
    headers: Vec<Headers>,
}

impl ConsumedMessage {
    /// Payload of the innermost layer.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Joint header of every layer, outermost first.
    pub fn headers(&self) -> &[Headers] {
        &self.headers
    }

    /// Joint header of the innermost layer.
    pub fn innermost_header(&self) -> Option<&Headers> {
        self.headers.last()
    }
}

/// Verify or decrypt a single compact message.
///
/// Declared algorithms are checked against `options` before `resolver` is asked
/// for a key. An unsecured ("none") JWS, once allowed, is opened without a key.
pub fn consume(
    compact: &str,
    resolver: &impl KeyResolver,
    options: &ConsumeOptions,
) -> Result<ConsumedMessage, JoseError> {
    let message = JoseMessage::parse_compact(compact)?;
    let payload = open_layer(&message, resolver, options)?;
    Ok(ConsumedMessage {
        payload,
        headers: vec![message.joint_header().clone()],
    })
}

/// Like [`consume`], descending into the payload while a layer declares
/// a nested "cty" of "JWT" or "JOSE".
///
/// `resolver` is asked for a key once per layer.
pub fn consume_nested(
    compact: &str,
    resolver: &impl KeyResolver,
    options: &ConsumeOptions,
) -> Result<ConsumedMessage, JoseError> {
    let mut headers = Vec::new();
    let mut next = compact.to_owned();
    loop {
        let message = JoseMessage::parse_compact(&next)?;
        let payload = open_layer(&message, resolver, options)?;
        headers.push(message.joint_header().clone());
        if !message.header().is_nested()? {
            return Ok(ConsumedMessage { payload, headers });
        }
        if headers.len() >= options.max_nesting_depth() {
            return Err(JoseError::from_display(
                ErrorKind::Structural,
                format!(
                    "message has more than {} layers",
                    options.max_nesting_depth()
                ),
            ));
        }
        tracing::trace!(depth = headers.len(), "descending into nested JOSE message");
        next = String::from_utf8(payload).map_err(|err| {
            JoseError::from_display(
                ErrorKind::Structural,
                format!("nested JOSE payload is not UTF-8: {err}"),
            )
        })?;
    }
}

fn open_layer(
    message: &JoseMessage,
    resolver: &impl KeyResolver,
    options: &ConsumeOptions,
) -> Result<Vec<u8>, JoseError> {
    message.check_constraints(options)?;
    if message.is_unsecured()? {
        return message.open(None, options);
    }
    let key = resolver.resolve(message, options)?;
    message.open(Some(&key), options)
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use tokio_test::assert_err;

    use super::*;
    use crate::jose::{
        ContentEncryptionAlgorithm, EcPrivateKey, EllipticCurve, JWECompact, JWK, JWSCompact,
        KeyManagementAlgorithm, SigningKey, header::names,
    };

    fn hs256_key() -> Key {
        Key::octet(vec![5u8; 32])
    }

    fn signed(payload: &str) -> String {
        JWSCompact::builder()
            .with_payload(payload)
            .build_compact(&SigningKey::new(JWA::HS256, hs256_key()))
            .unwrap()
            .into()
    }

    #[test]
    fn parse_compact_dispatches_on_part_count() {
        assert!(matches!(
            JoseMessage::parse_compact(&signed("x")).unwrap(),
            JoseMessage::Signed(_)
        ));

        let jwe = JWECompact::builder(
            KeyManagementAlgorithm::A128KW,
            ContentEncryptionAlgorithm::A128Gcm,
        )
        .with_payload("x")
        .build_compact(&Key::octet(vec![1u8; 16]))
        .unwrap();
        assert!(matches!(
            JoseMessage::parse_compact(jwe.as_str()).unwrap(),
            JoseMessage::Encrypted(_)
        ));

        for compact in ["a.b", "a.b.c.d", "a.b.c.d.e.f"] {
            let err = JoseMessage::parse_compact(compact).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Structural);
        }
    }

    #[test]
    fn consume_with_a_fixed_key() {
        let consumed = consume(&signed("hello"), &hs256_key(), &ConsumeOptions::default()).unwrap();
        assert_eq!(consumed.payload(), b"hello");
        assert_eq!(consumed.headers().len(), 1);
        assert_eq!(
            consumed.innermost_header().unwrap().string(names::ALGORITHM).unwrap(),
            Some("HS256")
        );

        let err = consume(&signed("hello"), &Key::octet(vec![6u8; 32]), &ConsumeOptions::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CryptographicFailure);
    }

    #[test]
    fn constraints_are_checked_before_resolving() {
        let asked = Cell::new(false);
        let resolver = |_: &JoseMessage, _: &ConsumeOptions| -> Result<Key, JoseError> {
            asked.set(true);
            Ok(hs256_key())
        };
        let options = ConsumeOptions::default()
            .with_algorithm_constraints(AlgorithmConstraints::permit(["RS256"]));
        let err = consume(&signed("x"), &resolver, &options).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlgorithmConstraintViolation);
        assert!(!asked.get());
    }

    #[test]
    fn unsecured_messages_need_no_key() {
        let jws = JWSCompact::builder()
            .with_payload("plain")
            .build_compact(&SigningKey::unsecured())
            .unwrap();
        let resolver = |_: &JoseMessage, _: &ConsumeOptions| -> Result<Key, JoseError> {
            Err(JoseError::from_display(ErrorKind::UnresolvableKey, "no keys"))
        };

        let err = consume(jws.as_str(), &resolver, &ConsumeOptions::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlgorithmConstraintViolation);

        let options = ConsumeOptions::default()
            .with_algorithm_constraints(AlgorithmConstraints::allow_only_none());
        let consumed = consume(jws.as_str(), &resolver, &options).unwrap();
        assert_eq!(consumed.payload(), b"plain");
    }

    #[test]
    fn nested_signed_then_encrypted() {
        let ctx = ProviderContext::default();
        let recipient = Key::from(EcPrivateKey::generate(EllipticCurve::P256, &ctx).unwrap());
        let inner = signed(r#"{"sub":"alice"}"#);
        let outer = JWECompact::builder(
            KeyManagementAlgorithm::EcdhEsA128KW,
            ContentEncryptionAlgorithm::A256Gcm,
        )
        .with_payload(inner.clone())
        .try_with_protected_header(names::CONTENT_TYPE, "JWT")
        .unwrap()
        .build_compact(&recipient.public_key().unwrap())
        .unwrap();

        let resolver = |message: &JoseMessage, _: &ConsumeOptions| -> Result<Key, JoseError> {
            Ok(match message {
                JoseMessage::Encrypted(_) => recipient.clone(),
                JoseMessage::Signed(_) => hs256_key(),
            })
        };
        let consumed =
            consume_nested(outer.as_str(), &resolver, &ConsumeOptions::default()).unwrap();
        assert_eq!(consumed.payload(), br#"{"sub":"alice"}"#);
        assert_eq!(consumed.headers().len(), 2);
        assert_eq!(
            consumed.headers()[0].string(names::CONTENT_TYPE).unwrap(),
            Some("JWT")
        );
        assert!(consumed.headers()[0].contains(names::EPHEMERAL_PUBLIC_KEY));
        assert_eq!(
            consumed.headers()[1].string(names::ALGORITHM).unwrap(),
            Some("HS256")
        );

        // a single layer stops at the encrypted payload
        let consumed = consume(outer.as_str(), &resolver, &ConsumeOptions::default()).unwrap();
        assert_eq!(consumed.payload(), inner.as_bytes());
    }

    fn wrap_signed(inner: String, key: &Key) -> String {
        JWSCompact::builder()
            .with_payload(inner)
            .try_with_protected_header(names::CONTENT_TYPE, "application/jose")
            .unwrap()
            .build_compact(&SigningKey::new(JWA::HS256, key.clone()))
            .unwrap()
            .into()
    }

    #[test]
    fn nesting_depth_is_limited() {
        let key = hs256_key();
        let mut compact = signed("core");
        for _ in 0..DEFAULT_MAX_NESTING_DEPTH - 1 {
            compact = wrap_signed(compact, &key);
        }

        // exactly the default number of layers
        let consumed = consume_nested(&compact, &key, &ConsumeOptions::default()).unwrap();
        assert_eq!(consumed.payload(), b"core");
        assert_eq!(consumed.headers().len(), DEFAULT_MAX_NESTING_DEPTH);

        let one_less = ConsumeOptions::default().with_max_nesting_depth(DEFAULT_MAX_NESTING_DEPTH - 1);
        let err = consume_nested(&compact, &key, &one_less).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Structural);

        // one layer more than the default
        let deeper = wrap_signed(compact, &key);
        let err = consume_nested(&deeper, &key, &ConsumeOptions::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Structural);
        let consumed = consume_nested(
            &deeper,
            &key,
            &ConsumeOptions::default().with_max_nesting_depth(DEFAULT_MAX_NESTING_DEPTH + 1),
        )
        .unwrap();
        assert_eq!(consumed.headers().len(), DEFAULT_MAX_NESTING_DEPTH + 1);
    }

    #[test]
    fn jwks_resolver_picks_by_kid_or_by_trial() {
        let ctx = ProviderContext::default();
        let es = Key::from(EcPrivateKey::generate(EllipticCurve::P256, &ctx).unwrap());
        let other = Key::from(EcPrivateKey::generate(EllipticCurve::P256, &ctx).unwrap());
        let set = JsonWebKeySet::new(vec![
            JWK::from_key(&other.public_key().unwrap())
                .unwrap()
                .with_kid("a".to_owned()),
            JWK::from_key(&es.public_key().unwrap())
                .unwrap()
                .with_kid("b".to_owned()),
        ]);
        let resolver = JwksKeyResolver::new(set);

        let jws = JWSCompact::builder()
            .with_payload("by kid")
            .build_compact(&SigningKey::new(JWA::ES256, es.clone()).with_key_id("b".to_owned()))
            .unwrap();
        let consumed = consume(jws.as_str(), &resolver, &ConsumeOptions::default()).unwrap();
        assert_eq!(consumed.payload(), b"by kid");

        // without a kid both keys survive, only trial verification tells them apart
        let anonymous = JWSCompact::builder()
            .with_payload("no kid")
            .build_compact(&SigningKey::new(JWA::ES256, es))
            .unwrap();
        let err = consume(anonymous.as_str(), &resolver, &ConsumeOptions::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnresolvableKey);
        let trial = ConsumeOptions::default().with_trial_disambiguation(true);
        let consumed = consume(anonymous.as_str(), &resolver, &trial).unwrap();
        assert_eq!(consumed.payload(), b"no kid");

        let stranger = JWSCompact::builder()
            .with_payload("unknown signer")
            .build_compact(&SigningKey::new(
                JWA::ES256,
                Key::from(EcPrivateKey::generate(EllipticCurve::P256, &ctx).unwrap()),
            ))
            .unwrap();
        assert_err!(consume(stranger.as_str(), &resolver, &trial));
    }
}
