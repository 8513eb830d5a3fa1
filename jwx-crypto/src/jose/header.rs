use std::collections::BTreeSet;

use jwx_error::ErrorContext;
use jwx_utils::macros::generate_set_and_with;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};

use crate::jose::{
    ErrorKind, JoseError,
    encoding::{b64_decode, b64_encode, parse_json_object},
    error::WithKind,
};

/// Header names with a meaning of their own in this crate.
pub mod names {
    pub const ALGORITHM: &str = "alg";
    pub const ENCRYPTION_METHOD: &str = "enc";
    pub const ZIP: &str = "zip";
    pub const KEY_ID: &str = "kid";
    pub const TYPE: &str = "typ";
    pub const CONTENT_TYPE: &str = "cty";
    pub const CRITICAL: &str = "crit";
    pub const BASE64URL_ENCODE_PAYLOAD: &str = "b64";
    pub const X509_THUMBPRINT: &str = "x5t";
    pub const X509_THUMBPRINT_SHA256: &str = "x5t#S256";
    pub const EPHEMERAL_PUBLIC_KEY: &str = "epk";
    pub const AGREEMENT_PARTY_U_INFO: &str = "apu";
    pub const AGREEMENT_PARTY_V_INFO: &str = "apv";
}

#[derive(Default, Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
/// [`Headers`] store protected or unprotected headers and already
/// serializes them to correct JSON values.
///
/// Insertion order is kept, it determines the JSON text that ends up
/// being signed or used as AAD.
pub struct Headers(Map<String, Value>);

impl Headers {
    /// Create an empty header map.
    pub fn new() -> Self {
        Self::default()
    }

    generate_set_and_with! {
        /// Set provided header in the header map
        ///
        /// Warning: this function will replace already existing headers
        pub fn header(
            mut self,
            name: impl Into<String>,
            value: impl Serialize,
        ) -> Result<Self, JoseError> {
            let value = serde_json::to_value(value)
                .context("convert header value to JSON")
                .with_kind(ErrorKind::Structural)?;
            self.0.insert(name.into(), value);
            Ok(self)
        }
    }

    generate_set_and_with! {
        /// Set provided headers in the header map
        ///
        /// Warning: this function will replace already existing headers
        pub fn headers(mut self, headers: impl Serialize) -> Result<Self, JoseError> {
            let headers = serde_json::to_value(headers)
                .context("convert headers to serde json value")
                .with_kind(ErrorKind::Structural)?;

            let Value::Object(mut headers) = headers else {
                return Err(JoseError::from_display(
                    ErrorKind::Structural,
                    "Can only set multiple headers if input is key value object",
                ));
            };
            self.0.append(&mut headers);
            Ok(self)
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Remove a header, keeping the order of the others.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.0.shift_remove(name)
    }

    /// Header names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// String value of a header.
    ///
    /// Absent headers give `None`, a present non-string value is a structural error.
    pub fn string(&self, name: &str) -> Result<Option<&str>, JoseError> {
        match self.0.get(name) {
            None => Ok(None),
            Some(Value::String(value)) => Ok(Some(value)),
            Some(_) => Err(JoseError::from_display(
                ErrorKind::Structural,
                format!("header '{name}' must be a string"),
            )),
        }
    }

    /// Like [`Headers::string`], but the header must be present.
    pub fn required_string(&self, name: &str) -> Result<&str, JoseError> {
        self.string(name)?.ok_or_else(|| {
            JoseError::from_display(
                ErrorKind::Structural,
                format!("required header '{name}' is missing"),
            )
        })
    }

    /// Try decode headers to the provided `T`
    pub fn decode<T>(&self) -> Result<T, JoseError>
    where
        T: DeserializeOwned,
    {
        T::deserialize(Value::Object(self.0.clone()))
            .context("deserialize headers into T")
            .with_kind(ErrorKind::Structural)
    }

    /// Serialize the current state into an immutable [`ProtectedHeader`].
    pub fn freeze(&self) -> Result<ProtectedHeader, JoseError> {
        let json = serde_json::to_string(&self.0)
            .context("serialize protected header")
            .with_kind(ErrorKind::Structural)?;
        let encoded = b64_encode(json.as_bytes());
        Ok(ProtectedHeader {
            params: self.clone(),
            json,
            encoded,
        })
    }

    /// Joint header of protected and unprotected members.
    ///
    /// A name present in both is a structural error.
    pub(crate) fn joined(protected: &Self, unprotected: Option<&Self>) -> Result<Self, JoseError> {
        let mut joint = protected.clone();
        if let Some(unprotected) = unprotected {
            for (name, value) in &unprotected.0 {
                if joint.0.contains_key(name) {
                    return Err(JoseError::from_display(
                        ErrorKind::Structural,
                        format!("header '{name}' is both protected and unprotected"),
                    ));
                }
                joint.0.insert(name.clone(), value.clone());
            }
        }
        Ok(joint)
    }
}

impl From<Map<String, Value>> for Headers {
    fn from(value: Map<String, Value>) -> Self {
        Self(value)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
/// Immutable protected header together with its exact JSON text and base64url form.
///
/// The encoded form is what gets signed and what is used as JWE AAD, so once a header
/// is frozen (or decoded from the wire) it never changes.
pub struct ProtectedHeader {
    params: Headers,
    json: String,
    encoded: String,
}

impl ProtectedHeader {
    /// Decode a base64url protected header as received on the wire.
    pub fn decode(encoded: &str) -> Result<Self, JoseError> {
        let bytes = b64_decode(encoded, "protected header")?;
        let params = parse_json_object(&bytes, "protected header")?;
        let json = String::from_utf8(bytes)
            .context("protected header is not UTF-8")
            .with_kind(ErrorKind::Structural)?;
        Ok(Self {
            params: params.into(),
            json,
            encoded: encoded.to_owned(),
        })
    }

    pub fn headers(&self) -> &Headers {
        &self.params
    }

    /// Mutable copy of the header members, e.g. to derive a new header from this one.
    pub fn to_headers(&self) -> Headers {
        self.params.clone()
    }

    /// JSON text of this header.
    pub fn json(&self) -> &str {
        &self.json
    }

    /// Base64url form of this header.
    pub fn encoded(&self) -> &str {
        &self.encoded
    }

    /// Additional authenticated data of a JWE using this header.
    pub fn aad(&self) -> &[u8] {
        self.encoded.as_bytes()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.params.get(name)
    }

    pub fn string(&self, name: &str) -> Result<Option<&str>, JoseError> {
        self.params.string(name)
    }

    /// The required "alg" header.
    pub fn algorithm(&self) -> Result<&str, JoseError> {
        self.params.required_string(names::ALGORITHM)
    }

    /// The "enc" header, required for JWE.
    pub fn content_encryption(&self) -> Result<&str, JoseError> {
        self.params.required_string(names::ENCRYPTION_METHOD)
    }

    pub fn key_id(&self) -> Result<Option<&str>, JoseError> {
        self.params.string(names::KEY_ID)
    }

    pub fn content_type(&self) -> Result<Option<&str>, JoseError> {
        self.params.string(names::CONTENT_TYPE)
    }

    pub fn compression(&self) -> Result<Option<&str>, JoseError> {
        self.params.string(names::ZIP)
    }

    pub fn x5t(&self) -> Result<Option<&str>, JoseError> {
        self.params.string(names::X509_THUMBPRINT)
    }

    pub fn x5t_sha256(&self) -> Result<Option<&str>, JoseError> {
        self.params.string(names::X509_THUMBPRINT_SHA256)
    }

    /// Whether the "cty" header announces a nested JOSE object.
    pub fn is_nested(&self) -> Result<bool, JoseError> {
        Ok(self.content_type()?.is_some_and(|cty| {
            let cty = cty
                .get(..12)
                .filter(|prefix| prefix.eq_ignore_ascii_case("application/"))
                .map_or(cty, |_| &cty[12..]);
            cty.eq_ignore_ascii_case("JWT") || cty.eq_ignore_ascii_case("JOSE")
        }))
    }

    /// Names listed in "crit", an empty list if the header is absent.
    ///
    /// An empty array, non-string members or names that are not
    /// present in this header are structural errors.
    pub fn critical(&self) -> Result<Vec<&str>, JoseError> {
        let Some(crit) = self.params.get(names::CRITICAL) else {
            return Ok(Vec::new());
        };
        let invalid = |msg: &str| {
            JoseError::from_display(ErrorKind::Structural, format!("invalid 'crit' header: {msg}"))
        };
        let Value::Array(members) = crit else {
            return Err(invalid("not an array"));
        };
        if members.is_empty() {
            return Err(invalid("empty list"));
        }
        members
            .iter()
            .map(|member| {
                let name = member.as_str().ok_or_else(|| invalid("non-string member"))?;
                if !self.params.contains(name) {
                    return Err(invalid(&format!("'{name}' is not present in the header")));
                }
                Ok(name)
            })
            .collect()
    }

    /// Fail unless every "crit" name of an encryption header is one of `known`.
    pub(crate) fn check_critical(&self, known: &BTreeSet<String>) -> Result<(), JoseError> {
        self.check_critical_understood(known, &[])
    }

    /// As [`Self::check_critical`], with "b64" (RFC 7797) understood as well.
    pub(crate) fn check_signature_critical(
        &self,
        known: &BTreeSet<String>,
    ) -> Result<(), JoseError> {
        self.check_critical_understood(known, &[names::BASE64URL_ENCODE_PAYLOAD])
    }

    fn check_critical_understood(
        &self,
        known: &BTreeSet<String>,
        understood: &[&str],
    ) -> Result<(), JoseError> {
        for name in self.critical()? {
            if !understood.contains(&name) && !known.contains(name) {
                tracing::debug!(header = name, "unsupported critical header");
                return Err(JoseError::from_display(
                    ErrorKind::UnsupportedCriticalExtension,
                    format!("unrecognized critical header '{name}'"),
                ));
            }
        }
        Ok(())
    }

    /// Value of the "b64" header, `true` when absent.
    ///
    /// A present "b64" must be a boolean and must be listed in "crit".
    pub fn b64(&self) -> Result<bool, JoseError> {
        let Some(value) = self.params.get(names::BASE64URL_ENCODE_PAYLOAD) else {
            return Ok(true);
        };
        let Value::Bool(b64) = value else {
            return Err(JoseError::from_display(
                ErrorKind::Structural,
                "header 'b64' must be a boolean",
            ));
        };
        if !self.critical()?.contains(&names::BASE64URL_ENCODE_PAYLOAD) {
            return Err(JoseError::from_display(
                ErrorKind::Structural,
                "header 'b64' must be listed in 'crit'",
            ));
        }
        Ok(*b64)
    }

    /// Try decode this header to the provided `T`
    pub fn decode_into<T>(&self) -> Result<T, JoseError>
    where
        T: DeserializeOwned,
    {
        self.params.decode()
    }
}

#[cfg(test)]
mod tests {
    use tokio_test::{assert_err, assert_ok};

    use super::*;

    fn frozen(json: &str) -> ProtectedHeader {
        ProtectedHeader::decode(&b64_encode(json)).unwrap()
    }

    #[test]
    fn freeze_keeps_insertion_order() {
        let header = Headers::new()
            .try_with_header("alg", "HS256")
            .unwrap()
            .try_with_header("kid", "k1")
            .unwrap()
            .freeze()
            .unwrap();
        assert_eq!(header.json(), r#"{"alg":"HS256","kid":"k1"}"#);
        assert_eq!(header.encoded(), "eyJhbGciOiJIUzI1NiIsImtpZCI6ImsxIn0");
        assert_eq!(header.algorithm().unwrap(), "HS256");
        assert_eq!(header.key_id().unwrap(), Some("k1"));
    }

    #[test]
    fn frozen_header_is_independent_of_builder() {
        let mut headers = Headers::new().try_with_header("alg", "HS256").unwrap();
        let frozen = headers.freeze().unwrap();
        headers.try_set_header("alg", "none").unwrap();
        assert_eq!(frozen.algorithm().unwrap(), "HS256");
        assert_eq!(headers.freeze().unwrap().algorithm().unwrap(), "none");
    }

    #[test]
    fn set_multiple_headers() {
        #[derive(Serialize)]
        struct Extra<'a> {
            typ: &'a str,
            nonce: u64,
        }

        let mut headers = Headers::new();
        assert_ok!(headers.try_set_header("alg", "ES256"));
        assert_ok!(headers.try_set_headers(Extra { typ: "JWT", nonce: 7 }));
        assert_eq!(headers.names().collect::<Vec<_>>(), ["alg", "typ", "nonce"]);
        assert_err!(headers.try_set_headers("not a map"));

        headers.remove("typ");
        assert_eq!(headers.names().collect::<Vec<_>>(), ["alg", "nonce"]);
    }

    #[test]
    fn decoded_header_keeps_wire_form() {
        let encoded = "eyJ6aXAiOiJiYWQiLCJhbGciOiJkaXIiLCJlbmMiOiJBMTI4Q0JDLUhTMjU2In0";
        let header = ProtectedHeader::decode(encoded).unwrap();
        assert_eq!(header.encoded(), encoded);
        assert_eq!(header.aad(), encoded.as_bytes());
        assert_eq!(header.compression().unwrap(), Some("bad"));
        assert_eq!(header.content_encryption().unwrap(), "A128CBC-HS256");
    }

    #[test]
    fn missing_alg_is_structural() {
        let header = frozen(r#"{"kid":"a"}"#);
        assert_eq!(header.algorithm().unwrap_err().kind(), ErrorKind::Structural);
        let header = frozen(r#"{"alg":5}"#);
        assert_eq!(header.algorithm().unwrap_err().kind(), ErrorKind::Structural);
    }

    #[test]
    fn duplicate_header_names_are_rejected() {
        let err = ProtectedHeader::decode(&b64_encode(r#"{"alg":"HS256","alg":"none"}"#))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Structural);
    }

    #[test]
    fn critical_header_validation() {
        let known = BTreeSet::from(["exp".to_owned()]);

        assert_ok!(frozen(r#"{"alg":"HS256"}"#).check_critical(&known));
        assert_ok!(frozen(r#"{"alg":"HS256","crit":["exp"],"exp":1}"#).check_critical(&known));

        let err = frozen(r#"{"alg":"HS256","crit":["nope"],"nope":1}"#)
            .check_critical(&known)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedCriticalExtension);

        let unencoded = frozen(r#"{"alg":"HS256","b64":false,"crit":["b64"]}"#);
        assert_ok!(unencoded.check_signature_critical(&known));
        let err = unencoded.check_critical(&known).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedCriticalExtension);

        for json in [
            r#"{"alg":"HS256","crit":[]}"#,
            r#"{"alg":"HS256","crit":"exp","exp":1}"#,
            r#"{"alg":"HS256","crit":[1]}"#,
            r#"{"alg":"HS256","crit":["exp"]}"#,
        ] {
            let err = frozen(json).check_critical(&known).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Structural, "{json}");
        }
    }

    #[test]
    fn b64_must_be_critical() {
        assert!(frozen(r#"{"alg":"HS256"}"#).b64().unwrap());
        assert!(!frozen(r#"{"alg":"HS256","b64":false,"crit":["b64"]}"#).b64().unwrap());
        assert_err!(frozen(r#"{"alg":"HS256","b64":false}"#).b64());
        assert_err!(frozen(r#"{"alg":"HS256","b64":"no","crit":["b64"]}"#).b64());
    }

    #[test]
    fn nested_content_types() {
        for cty in ["JWT", "jwt", "JOSE", "application/jwt", "Application/JOSE"] {
            let header = frozen(&format!(r#"{{"alg":"HS256","cty":"{cty}"}}"#));
            assert!(header.is_nested().unwrap(), "{cty}");
        }
        for cty in ["json", "application/json", "text/jwt"] {
            let header = frozen(&format!(r#"{{"alg":"HS256","cty":"{cty}"}}"#));
            assert!(!header.is_nested().unwrap(), "{cty}");
        }
        assert!(!frozen(r#"{"alg":"HS256"}"#).is_nested().unwrap());
    }

    #[test]
    fn joined_headers_must_be_disjoint() {
        let protected = Headers::new().try_with_header("alg", "A128KW").unwrap();
        let unprotected = Headers::new().try_with_header("kid", "a").unwrap();
        let joint = Headers::joined(&protected, Some(&unprotected)).unwrap();
        assert_eq!(joint.len(), 2);

        let clash = Headers::new().try_with_header("alg", "dir").unwrap();
        assert_err!(Headers::joined(&protected, Some(&clash)));
    }

    #[test]
    fn decode_into_struct() {
        #[derive(Deserialize)]
        struct Acme {
            alg: String,
            nonce: String,
        }

        let header = frozen(r#"{"alg":"ES256","nonce":"abc"}"#);
        let acme: Acme = header.decode_into().unwrap();
        assert_eq!(acme.alg, "ES256");
        assert_eq!(acme.nonce, "abc");
    }
}
