use jwx_error::{BoxError, ErrorContext};
use jwx_utils::macros::generate_set_and_with;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::jose::{
    AlgorithmConstraints, ConsumeOptions, ErrorKind, Headers, JWA, JoseError, Key,
    ProtectedHeader, ProviderContext,
    encoding::{b64_decode, b64_encode, parse_json_object},
    error::WithKind,
    header::names,
};

#[derive(Default, Debug, Clone, PartialEq, Eq)]
/// [`JWSBuilder`] should be used when manually creating a [`JWSCompact`] or [`JWSFlattened`]
pub struct JWSBuilder {
    protected_headers: Headers,
    unprotected_headers: Headers,
    payload: Vec<u8>,
    unencoded_payload: bool,
    detached_payload: bool,
    algorithm_constraints: AlgorithmConstraints,
}

impl JWSBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    generate_set_and_with! {
        /// Add the provided payload to this [`JWSBuilder`]
        pub fn payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
            self.payload = payload.into();
            self
        }
    }

    generate_set_and_with! {
        /// Sign the payload as is instead of its base64url encoding, as defined in [`rfc7797`].
        ///
        /// Adds `"b64": false` to the protected header and lists it in "crit".
        ///
        /// [`rfc7797`]: https://datatracker.ietf.org/doc/html/rfc7797
        pub fn unencoded_payload(mut self, unencoded: bool) -> Self {
            self.unencoded_payload = unencoded;
            self
        }
    }

    generate_set_and_with! {
        /// Leave the payload out of the serialized JWS.
        ///
        /// The signature still covers it, a consumer has to supply it
        /// through [`ConsumeOptions`].
        pub fn detached_payload(mut self, detached: bool) -> Self {
            self.detached_payload = detached;
            self
        }
    }

    generate_set_and_with! {
        /// Constraints the signature algorithm must pass before signing.
        pub fn algorithm_constraints(mut self, constraints: AlgorithmConstraints) -> Self {
            self.algorithm_constraints = constraints;
            self
        }
    }

    generate_set_and_with! {
        /// Set provided header in the protected header map
        ///
        /// Warning: this function will replace already existing headers
        /// If more control is needed, use [`Self::protected_headers_mut`] to get access
        /// to the underlying header store
        pub fn protected_header(
            mut self,
            name: impl Into<String>,
            value: impl Serialize,
        ) -> Result<Self, JoseError> {
            self.protected_headers.try_set_header(name, value)?;
            Ok(self)
        }
    }

    generate_set_and_with! {
        /// Set provided headers in the protected header map
        ///
        /// Warning: this function will replace already existing headers
        /// If more control is needed, use [`Self::protected_headers_mut`] to get access
        /// to the underlying header store
        pub fn protected_headers(mut self, headers: impl Serialize) -> Result<Self, JoseError> {
            self.protected_headers.try_set_headers(headers)?;
            Ok(self)
        }
    }

    /// Get mutable reference to the underlying protected header store
    ///
    /// This can be used in cases where more granual control is needed
    pub fn protected_headers_mut(&mut self) -> &mut Headers {
        &mut self.protected_headers
    }

    generate_set_and_with! {
        /// Set provided header in the unprotected header map
        ///
        /// Only used by [`JWSBuilder::build_flattened`].
        pub fn unprotected_header(
            mut self,
            name: impl Into<String>,
            value: impl Serialize,
        ) -> Result<Self, JoseError> {
            self.unprotected_headers.try_set_header(name, value)?;
            Ok(self)
        }
    }

    generate_set_and_with! {
        /// Set provided headers in the unprotected header map
        ///
        /// Only used by [`JWSBuilder::build_flattened`].
        pub fn unprotected_headers(mut self, headers: impl Serialize) -> Result<Self, JoseError> {
            self.unprotected_headers.try_set_headers(headers)?;
            Ok(self)
        }
    }

    /// Get mutable reference to the underlying unprotected header store
    pub fn unprotected_headers_mut(&mut self) -> &mut Headers {
        &mut self.unprotected_headers
    }

    /// Generate compact serialization of this `JWS`
    ///
    /// This only available if there is no unprotected header set
    pub fn build_compact(self, signer: &impl Signer) -> Result<JWSCompact, JoseError> {
        if !self.unprotected_headers.is_empty() {
            return Err(JoseError::from_display(
                ErrorKind::Structural,
                "Compact jws does not support unprotected headers",
            ));
        }
        let signed = self.sign(signer)?;
        let payload = match &signed.payload {
            None => "",
            Some(payload) if !signed.encoded && payload.contains('.') => {
                return Err(JoseError::from_display(
                    ErrorKind::Structural,
                    "unencoded payload containing '.' can only be detached in compact form",
                ));
            }
            Some(payload) => payload,
        };
        Ok(JWSCompact(format!(
            "{}.{payload}.{}",
            signed.protected.encoded(),
            signed.signature
        )))
    }

    /// Build a [`JWSFlattened`]
    pub fn build_flattened(self, signer: &impl Signer) -> Result<JWSFlattened, JoseError> {
        let signed = self.sign(signer)?;
        Ok(JWSFlattened {
            payload: signed.payload,
            protected: signed.protected.encoded().to_owned(),
            header: (!signed.unprotected.is_empty()).then_some(signed.unprotected),
            signature: signed.signature,
        })
    }

    fn sign(mut self, signer: &impl Signer) -> Result<SignedParts, JoseError> {
        signer
            .set_headers(&mut self.protected_headers, &mut self.unprotected_headers)
            .map_err(|err| JoseError::from_boxed_or(ErrorKind::Key, err.into()))?;
        if self.unencoded_payload {
            mark_unencoded(&mut self.protected_headers)?;
        }

        let joint = Headers::joined(&self.protected_headers, Some(&self.unprotected_headers))?;
        self.algorithm_constraints
            .check(joint.required_string(names::ALGORITHM)?)?;

        let protected = self.protected_headers.freeze()?;
        let encoded = !self.unencoded_payload;
        let input = if encoded {
            signing_input(&protected, b64_encode(&self.payload).as_bytes())
        } else {
            signing_input(&protected, &self.payload)
        };
        let signature = signer
            .sign(&input)
            .map_err(|err| JoseError::from_boxed_or(ErrorKind::Key, err.into()))?;

        let payload = match (self.detached_payload, encoded) {
            (true, _) => None,
            (false, true) => Some(b64_encode(&self.payload)),
            (false, false) => Some(
                String::from_utf8(self.payload)
                    .context("attached unencoded payload must be UTF-8")
                    .with_kind(ErrorKind::Structural)?,
            ),
        };
        Ok(SignedParts {
            protected,
            unprotected: self.unprotected_headers,
            payload,
            encoded,
            signature: b64_encode(signature.as_ref()),
        })
    }
}

struct SignedParts {
    protected: ProtectedHeader,
    unprotected: Headers,
    /// Payload as it appears on the wire, `None` when detached.
    payload: Option<String>,
    encoded: bool,
    signature: String,
}

/// Add `"b64": false` and list it in "crit", keeping other critical names.
fn mark_unencoded(headers: &mut Headers) -> Result<(), JoseError> {
    let mut crit: Vec<String> = match headers.get(names::CRITICAL) {
        None => Vec::new(),
        Some(crit) => serde_json::from_value(crit.clone())
            .context("read 'crit' header")
            .with_kind(ErrorKind::Structural)?,
    };
    if !crit.iter().any(|name| name == names::BASE64URL_ENCODE_PAYLOAD) {
        crit.push(names::BASE64URL_ENCODE_PAYLOAD.to_owned());
    }
    headers.try_set_header(names::BASE64URL_ENCODE_PAYLOAD, false)?;
    headers.try_set_header(names::CRITICAL, crit)?;
    Ok(())
}

fn signing_input(protected: &ProtectedHeader, payload: &[u8]) -> Vec<u8> {
    let encoded = protected.encoded().as_bytes();
    let mut input = Vec::with_capacity(encoded.len() + 1 + payload.len());
    input.extend_from_slice(encoded);
    input.push(b'.');
    input.extend_from_slice(payload);
    input
}

/// [`Signer`] implements all methods which are needed to sign our JWS requests,
/// and add the needed info to our JOSE headers (JOSE headers = protected + unprotected headers)
pub trait Signer {
    type Signature: AsRef<[u8]>;
    type Error: Into<BoxError>;

    /// Set headers which are needed to verify the final `Signature`
    ///
    /// Example headers are: `alg`, `kid`
    fn set_headers(
        &self,
        protected_headers: &mut Headers,
        unprotected_headers: &mut Headers,
    ) -> Result<(), Self::Error>;

    /// Sign the JWS signing input
    fn sign(&self, data: &[u8]) -> Result<Self::Signature, Self::Error>;
}

#[derive(Debug, Clone)]
/// [`Signer`] for any [`JWA`] backed by a [`Key`].
pub struct SigningKey {
    alg: JWA,
    key: Option<Key>,
    key_id: Option<String>,
    ctx: ProviderContext,
}

impl SigningKey {
    /// Sign with `alg` using `key`.
    pub fn new(alg: JWA, key: Key) -> Self {
        Self {
            alg,
            key: Some(key),
            key_id: None,
            ctx: ProviderContext::default(),
        }
    }

    /// Produce an unsecured JWS with algorithm "none".
    pub fn unsecured() -> Self {
        Self {
            alg: JWA::None,
            key: None,
            key_id: None,
            ctx: ProviderContext::default(),
        }
    }

    pub fn algorithm(&self) -> JWA {
        self.alg
    }

    generate_set_and_with! {
        /// "kid" to add to the protected header.
        pub fn key_id(mut self, key_id: Option<String>) -> Self {
            self.key_id = key_id;
            self
        }
    }

    generate_set_and_with! {
        pub fn provider(mut self, ctx: ProviderContext) -> Self {
            self.ctx = ctx;
            self
        }
    }
}

impl Signer for SigningKey {
    type Signature = Vec<u8>;
    type Error = JoseError;

    fn set_headers(
        &self,
        protected_headers: &mut Headers,
        _unprotected_headers: &mut Headers,
    ) -> Result<(), Self::Error> {
        self.alg.validate_signing_key(self.key.as_ref(), &self.ctx)?;
        protected_headers.try_set_header(names::ALGORITHM, self.alg)?;
        if let Some(key_id) = &self.key_id {
            protected_headers.try_set_header(names::KEY_ID, key_id)?;
        }
        Ok(())
    }

    fn sign(&self, data: &[u8]) -> Result<Self::Signature, Self::Error> {
        self.alg.sign(self.key.as_ref(), data, &self.ctx)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
/// [`JWSCompact`] is a compact `JWS` representation as defined in [`rfc7515, section 7.1`]
///
/// [`rfc7515, section 7.1`]: https://datatracker.ietf.org/doc/html/rfc7515#section-7.1
pub struct JWSCompact(String);

impl JWSCompact {
    /// Create a builder which can be used to create a [`JWSCompact`]
    pub fn builder() -> JWSBuilder {
        JWSBuilder::new()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First pass: split and decode without any cryptographic operation.
    pub fn parse(&self) -> Result<ParsedJWS, JoseError> {
        ParsedJWS::parse_compact(&self.0)
    }
}

impl std::fmt::Display for JWSCompact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<JWSCompact> for String {
    fn from(value: JWSCompact) -> Self {
        value.0
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
/// [`JWSFlattened`] is a `JWS` which is optimized for a single signature, as defined in [`rfc7515, section 7.2.2`]
///
/// It does this by setting protected, header and signature at the root,
/// vs setting it in the signatures array
///
/// [`rfc7515, section 7.2.2`]: https://datatracker.ietf.org/doc/html/rfc7515#section-7.2.2
pub struct JWSFlattened {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payload: Option<String>,
    protected: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    header: Option<Headers>,
    signature: String,
}

impl JWSFlattened {
    /// Create a builder which can be used to create a [`JWSFlattened`]
    pub fn builder() -> JWSBuilder {
        JWSBuilder::new()
    }

    /// Parse the JSON form, rejecting duplicate member names.
    pub fn from_json(json: &str) -> Result<Self, JoseError> {
        let members = parse_json_object(json.as_bytes(), "flattened JWS")?;
        serde_json::from_value(Value::Object(members))
            .context("read flattened JWS members")
            .with_kind(ErrorKind::Structural)
    }

    pub fn to_json(&self) -> Result<String, JoseError> {
        serde_json::to_string(self)
            .context("serialize flattened JWS")
            .with_kind(ErrorKind::Structural)
    }

    /// Create a [`JWSCompact`] from this [`JWSFlattened`]
    pub fn as_compact(&self) -> Result<JWSCompact, JoseError> {
        if self.header.is_some() {
            return Err(JoseError::from_display(
                ErrorKind::Structural,
                "JWSCompact does not support unprotected headers",
            ));
        };
        Ok(JWSCompact(format!(
            "{}.{}.{}",
            self.protected,
            self.payload.as_deref().unwrap_or_default(),
            self.signature
        )))
    }

    /// First pass: decode without any cryptographic operation.
    pub fn parse(&self) -> Result<ParsedJWS, JoseError> {
        ParsedJWS::new(
            &self.protected,
            self.header.clone(),
            self.payload.clone(),
            &self.signature,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// A received JWS whose header has been decoded but whose signature is not verified yet.
///
/// Inspect [`ParsedJWS::header`] (e.g. to pick a key) and then call
/// [`ParsedJWS::verify`], which reuses everything decoded here.
pub struct ParsedJWS {
    header: ProtectedHeader,
    unprotected: Option<Headers>,
    joint: Headers,
    /// Payload as it was on the wire, `None` when detached.
    payload: Option<String>,
    signature: Vec<u8>,
}

impl ParsedJWS {
    /// Parse `header.payload.signature`.
    ///
    /// An empty payload part is either an empty payload or a detached one,
    /// see [`ConsumeOptions::detached_payload`].
    pub fn parse_compact(compact: &str) -> Result<Self, JoseError> {
        let parts: Vec<&str> = compact.split('.').collect();
        let [header, payload, signature] = parts.as_slice() else {
            return Err(JoseError::from_display(
                ErrorKind::Structural,
                format!(
                    "compact JWS must have 3 parts, got {}",
                    parts.len()
                ),
            ));
        };
        let payload = (!payload.is_empty()).then(|| (*payload).to_owned());
        Self::new(header, None, payload, signature)
    }

    /// Parse the flattened JSON serialization.
    pub fn parse_flattened(json: &str) -> Result<Self, JoseError> {
        JWSFlattened::from_json(json)?.parse()
    }

    fn new(
        header: &str,
        unprotected: Option<Headers>,
        payload: Option<String>,
        signature: &str,
    ) -> Result<Self, JoseError> {
        let header = ProtectedHeader::decode(header)?;
        if let Some(unprotected) = &unprotected {
            for name in [names::CRITICAL, names::BASE64URL_ENCODE_PAYLOAD] {
                if unprotected.contains(name) {
                    return Err(JoseError::from_display(
                        ErrorKind::Structural,
                        format!("header '{name}' must be protected"),
                    ));
                }
            }
        }
        let joint = Headers::joined(header.headers(), unprotected.as_ref())?;
        Ok(Self {
            header,
            unprotected,
            joint,
            payload,
            signature: b64_decode(signature, "JWS signature")?,
        })
    }

    /// The protected header.
    pub fn header(&self) -> &ProtectedHeader {
        &self.header
    }

    pub fn unprotected_header(&self) -> Option<&Headers> {
        self.unprotected.as_ref()
    }

    /// Protected and unprotected members together.
    pub fn joint_header(&self) -> &Headers {
        &self.joint
    }

    /// Declared "alg".
    pub fn algorithm(&self) -> Result<&str, JoseError> {
        self.joint.required_string(names::ALGORITHM)
    }

    pub fn is_detached(&self) -> bool {
        self.payload.is_none()
    }

    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// Payload without any signature check, empty when detached.
    ///
    /// Only meant to read claims that help pick a verification key.
    pub fn unverified_payload(&self) -> Result<Vec<u8>, JoseError> {
        let Some(payload) = &self.payload else {
            return Ok(Vec::new());
        };
        if self.header.b64()? {
            b64_decode(payload, "JWS payload")
        } else {
            Ok(payload.as_bytes().to_vec())
        }
    }

    /// Payload and signing input, taking a detached payload from `options`.
    fn payload_and_signing_input(
        &self,
        options: &ConsumeOptions,
    ) -> Result<(Vec<u8>, Vec<u8>), JoseError> {
        let encoded = self.header.b64()?;
        match (&self.payload, options.detached_payload()) {
            (Some(payload), _) => {
                let decoded = if encoded {
                    b64_decode(payload, "JWS payload")?
                } else {
                    payload.as_bytes().to_vec()
                };
                Ok((decoded, signing_input(&self.header, payload.as_bytes())))
            }
            (None, Some(detached)) => {
                let input = if encoded {
                    signing_input(&self.header, b64_encode(detached).as_bytes())
                } else {
                    signing_input(&self.header, detached)
                };
                Ok((detached.to_vec(), input))
            }
            (None, None) => Ok((Vec::new(), signing_input(&self.header, b""))),
        }
    }

    /// Second pass: check the signature.
    ///
    /// Algorithm constraints and "crit" are checked before `key` is touched.
    /// A signature that does not verify is `Ok(false)`.
    pub fn verify_signature(
        &self,
        key: Option<&Key>,
        options: &ConsumeOptions,
    ) -> Result<bool, JoseError> {
        self.verify_payload(key, options).map(|verified| verified.is_some())
    }

    fn verify_payload(
        &self,
        key: Option<&Key>,
        options: &ConsumeOptions,
    ) -> Result<Option<Vec<u8>>, JoseError> {
        let alg = self.algorithm()?;
        options.algorithm_constraints().check(alg)?;
        self.header.check_signature_critical(options.known_critical_headers())?;
        let alg: JWA = alg.parse()?;

        let (payload, input) = self.payload_and_signing_input(options)?;
        if alg.verify(&self.signature, key, &input, options.provider())? {
            Ok(Some(payload))
        } else {
            tracing::trace!(%alg, "JWS signature did not verify");
            Ok(None)
        }
    }

    /// Second pass: verify and return the payload.
    ///
    /// A signature that does not verify is an [`ErrorKind::CryptographicFailure`].
    pub fn verify(self, key: Option<&Key>, options: &ConsumeOptions) -> Result<DecodedJWS, JoseError> {
        let payload = self
            .verify_payload(key, options)?
            .ok_or_else(JoseError::cryptographic_failure)?;
        Ok(DecodedJWS {
            header: self.header,
            unprotected: self.unprotected,
            payload,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Decoded version of a JWS
///
/// Data here has already been verified, so everything
/// here is ready for usage
pub struct DecodedJWS {
    header: ProtectedHeader,
    unprotected: Option<Headers>,
    payload: Vec<u8>,
}

impl DecodedJWS {
    /// Reference to the protected header
    pub fn header(&self) -> &ProtectedHeader {
        &self.header
    }

    /// Reference to the unprotected [`Headers`]
    pub fn unprotected_header(&self) -> Option<&Headers> {
        self.unprotected.as_ref()
    }

    /// Get refence to the payload
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }
}
