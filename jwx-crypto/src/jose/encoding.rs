use std::fmt;

use base64::{Engine as _, prelude::BASE64_URL_SAFE_NO_PAD};
use jwx_error::ErrorContext;
use serde::{
    Deserialize, Deserializer,
    de::{self, MapAccess, SeqAccess, Visitor},
};
use serde_json::{Map, Number, Value};

use crate::jose::{ErrorKind, JoseError, error::WithKind};

/// Base64url without padding, as used for every JOSE segment.
pub(crate) fn b64_encode(data: impl AsRef<[u8]>) -> String {
    BASE64_URL_SAFE_NO_PAD.encode(data)
}

/// Decode a base64url segment. Padding and characters outside the
/// url-safe alphabet are rejected.
pub(crate) fn b64_decode(data: &str, what: &'static str) -> Result<Vec<u8>, JoseError> {
    BASE64_URL_SAFE_NO_PAD
        .decode(data)
        .with_context(|| format!("decode base64url {what}"))
        .with_kind(ErrorKind::Structural)
}

/// Parse a JSON object, rejecting duplicate member names at any depth.
pub(crate) fn parse_json_object(
    bytes: &[u8],
    what: &'static str,
) -> Result<Map<String, Value>, JoseError> {
    let StrictValue(value) = serde_json::from_slice(bytes)
        .with_context(|| format!("parse {what} JSON"))
        .with_kind(ErrorKind::Structural)?;
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(JoseError::from_display(
            ErrorKind::Structural,
            format!("{what} is not a JSON object"),
        )),
    }
}

/// [`Value`] deserialized without silently overwriting repeated member names.
pub(crate) struct StrictValue(pub(crate) Value);

impl<'de> Deserialize<'de> for StrictValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(StrictValueVisitor).map(Self)
    }
}

struct StrictValueVisitor;

impl<'de> Visitor<'de> for StrictValueVisitor {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("any valid JSON value")
    }

    fn visit_bool<E>(self, v: bool) -> Result<Value, E> {
        Ok(Value::Bool(v))
    }

    fn visit_i64<E>(self, v: i64) -> Result<Value, E> {
        Ok(Value::from(v))
    }

    fn visit_u64<E>(self, v: u64) -> Result<Value, E> {
        Ok(Value::from(v))
    }

    fn visit_f64<E>(self, v: f64) -> Result<Value, E>
    where
        E: de::Error,
    {
        Number::from_f64(v)
            .map(Value::Number)
            .ok_or_else(|| E::custom("non-finite number"))
    }

    fn visit_str<E>(self, v: &str) -> Result<Value, E> {
        Ok(Value::String(v.to_owned()))
    }

    fn visit_string<E>(self, v: String) -> Result<Value, E> {
        Ok(Value::String(v))
    }

    fn visit_unit<E>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_none<E>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut values = Vec::new();
        while let Some(StrictValue(value)) = seq.next_element()? {
            values.push(value);
        }
        Ok(Value::Array(values))
    }

    fn visit_map<A>(self, mut access: A) -> Result<Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut map = Map::new();
        while let Some(key) = access.next_key::<String>()? {
            if map.contains_key(&key) {
                return Err(de::Error::custom(format!("duplicate member name '{key}'")));
            }
            let StrictValue(value) = access.next_value()?;
            map.insert(key, value);
        }
        Ok(Value::Object(map))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_members_are_rejected() {
        let err = parse_json_object(br#"{"alg":"HS256","alg":"none"}"#, "header").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Structural);
        assert!(err.to_string().contains("duplicate member name 'alg'"));

        let err = parse_json_object(br#"{"epk":{"x":"a","x":"b"}}"#, "header").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Structural);
    }

    #[test]
    fn member_order_is_preserved() {
        let map = parse_json_object(br#"{"zip":"DEF","alg":"dir","enc":"A128GCM"}"#, "header")
            .unwrap();
        let keys: Vec<_> = map.keys().map(String::as_str).collect();
        assert_eq!(keys, ["zip", "alg", "enc"]);
    }

    #[test]
    fn non_objects_are_rejected() {
        assert!(parse_json_object(b"[1,2]", "header").is_err());
        assert!(parse_json_object(b"{", "header").is_err());
    }

    #[test]
    fn padded_base64_is_rejected() {
        assert_eq!(b64_decode("YQ", "payload").unwrap(), b"a");
        assert_eq!(
            b64_decode("YQ==", "payload").unwrap_err().kind(),
            ErrorKind::Structural
        );
        assert!(b64_decode("Y+/=", "payload").is_err());
    }
}
