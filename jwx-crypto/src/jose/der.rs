//! Minimal DER support for moving RSA keys between JWK members and the
//! encodings understood by the crypto provider.
//!
//! Only the handful of structures needed for that are supported. This is
//! ***NOT*** a general purpose ASN.1 implementation.

use jwx_error::OpaqueError;
use zeroize::{Zeroize, Zeroizing};

/// Identifier tag for a DER encoded integer.
/// Defined in [ITU X.680](https://www.itu.int/ITU-T/studygroups/com17/languages/X.680-0207.pdf).
const DER_TAG_INTEGER: u8 = 0x02;
/// Identifier tag for a DER encoded bit string.
const DER_TAG_BIT_STRING: u8 = 0x03;
/// Identifier tag for a DER encoded octet string.
const DER_TAG_OCTET_STRING: u8 = 0x04;
/// Identifier tag for a DER encoded (constructed) sequence.
const DER_TAG_SEQUENCE: u8 = 0x30;
/// Maximum length of a DER encoded length in short form.
/// Defined in [ITU X.690](https://www.itu.int/ITU-T/studygroups/com17/languages/X.690-0207.pdf).
const DER_LENGTH_SHORT_FORM_MAX: usize = 127;
/// High bit: long form length marker, or sign bit of an integer's first octet.
const HIGH_BIT: u8 = 0x80;
/// Octet that indicates that no unused bits are present in a bit string.
const BIT_STRING_NO_UNUSED_BITS: u8 = 0x00;

/// DER encoded RSA encryption `AlgorithmIdentifier`:
/// `SEQUENCE { OID 1.2.840.113549.1.1.1, NULL }` (RFC 8017 appendix C, RFC 3279 section 2.2.1).
const RSA_ALGORITHM_IDENTIFIER: [u8; 15] = [
    DER_TAG_SEQUENCE,
    0x0d,
    // OBJECT IDENTIFIER, 9 octets
    0x06,
    0x09,
    0x2a,
    0x86,
    0x48,
    0x86,
    0xf7,
    0x0d,
    0x01,
    0x01,
    0x01,
    // NULL parameters
    0x05,
    0x00,
];

/// Big-endian unsigned RSA private key members, as carried by an RSA JWK.
#[derive(Default)]
pub(crate) struct RsaPrivateParts {
    pub(crate) n: Vec<u8>,
    pub(crate) e: Vec<u8>,
    pub(crate) d: Vec<u8>,
    pub(crate) p: Vec<u8>,
    pub(crate) q: Vec<u8>,
    pub(crate) dp: Vec<u8>,
    pub(crate) dq: Vec<u8>,
    pub(crate) qi: Vec<u8>,
}

impl Drop for RsaPrivateParts {
    fn drop(&mut self) {
        self.d.zeroize();
        self.p.zeroize();
        self.q.zeroize();
        self.dp.zeroize();
        self.dq.zeroize();
        self.qi.zeroize();
    }
}

/// In section 4.1 of [RFC 5280](https://datatracker.ietf.org/doc/rfc5280/) the standard DER
/// encoded public key format is defined as
///```rust,ignore
/// SubjectPublicKeyInfo = SEQUENCE {
///     algorithm AlgorithmIdentifier,
///     subjectPublicKey BIT STRING
/// }
///```
/// where the bit string wraps the `RSAPublicKey` of section 2.3.1 of
/// [RFC 3279](https://datatracker.ietf.org/doc/rfc3279/):
///```rust,ignore
/// RSAPublicKey = SEQUENCE {
///     modulus INTEGER,
///     exponent INTEGER,
/// }
/// ```
pub(crate) fn create_subject_public_key_info(n: &[u8], e: &[u8]) -> Vec<u8> {
    let n = encode_integer(n);
    let e = encode_integer(e);
    let rsa_public_key = encode_tlv(DER_TAG_SEQUENCE, &[n.as_slice(), e.as_slice()]);
    let bit_string = encode_tlv(
        DER_TAG_BIT_STRING,
        &[&[BIT_STRING_NO_UNUSED_BITS][..], rsa_public_key.as_slice()],
    );
    encode_tlv(
        DER_TAG_SEQUENCE,
        &[&RSA_ALGORITHM_IDENTIFIER[..], bit_string.as_slice()],
    )
}

/// Build a PKCS#8 v1 `PrivateKeyInfo` ([RFC 5208](https://datatracker.ietf.org/doc/rfc5208/))
/// around the two-prime `RSAPrivateKey` of section A.1.2 of
/// [RFC 8017](https://datatracker.ietf.org/doc/rfc8017/).
pub(crate) fn create_rsa_private_key_pkcs8(parts: &RsaPrivateParts) -> Zeroizing<Vec<u8>> {
    let version = encode_integer(&[0]);
    let members = [
        &parts.n, &parts.e, &parts.d, &parts.p, &parts.q, &parts.dp, &parts.dq, &parts.qi,
    ]
    .map(|member| Zeroizing::new(encode_integer(member)));

    let mut rsa_private_key_content: Vec<&[u8]> = vec![version.as_slice()];
    rsa_private_key_content.extend(members.iter().map(|member| member.as_slice()));
    let rsa_private_key = Zeroizing::new(encode_tlv(DER_TAG_SEQUENCE, &rsa_private_key_content));

    let octet_string = Zeroizing::new(encode_tlv(
        DER_TAG_OCTET_STRING,
        &[rsa_private_key.as_slice()],
    ));
    Zeroizing::new(encode_tlv(
        DER_TAG_SEQUENCE,
        &[
            version.as_slice(),
            &RSA_ALGORITHM_IDENTIFIER[..],
            octet_string.as_slice(),
        ],
    ))
}

/// Parse a DER `RSAPublicKey` into its unsigned big-endian modulus and exponent.
pub(crate) fn parse_rsa_public_key(der: &[u8]) -> Result<(Vec<u8>, Vec<u8>), OpaqueError> {
    let mut outer = DerReader::new(der);
    let mut sequence = DerReader::new(outer.read(DER_TAG_SEQUENCE)?);
    outer.finish()?;
    let n = sequence.read_unsigned_integer()?;
    let e = sequence.read_unsigned_integer()?;
    sequence.finish()?;
    Ok((n.to_vec(), e.to_vec()))
}

/// Parse a PKCS#8 wrapped two-prime `RSAPrivateKey` into its members.
pub(crate) fn parse_rsa_private_key_pkcs8(der: &[u8]) -> Result<RsaPrivateParts, OpaqueError> {
    let mut outer = DerReader::new(der);
    let mut info = DerReader::new(outer.read(DER_TAG_SEQUENCE)?);
    outer.finish()?;
    info.read_unsigned_integer()?;
    if info.read(DER_TAG_SEQUENCE)? != &RSA_ALGORITHM_IDENTIFIER[2..] {
        return Err(OpaqueError::from_display("PKCS#8 key is not an RSA key"));
    }
    let mut key = DerReader::new(info.read(DER_TAG_OCTET_STRING)?);
    let mut members = DerReader::new(key.read(DER_TAG_SEQUENCE)?);
    key.finish()?;

    let version = members.read_unsigned_integer()?;
    if !version.is_empty() {
        return Err(OpaqueError::from_display(
            "only two-prime RSA private keys are supported",
        ));
    }
    let mut parts = RsaPrivateParts::default();
    for member in [
        &mut parts.n,
        &mut parts.e,
        &mut parts.d,
        &mut parts.p,
        &mut parts.q,
        &mut parts.dp,
        &mut parts.dq,
        &mut parts.qi,
    ] {
        *member = members.read_unsigned_integer()?.to_vec();
    }
    members.finish()?;
    Ok(parts)
}

/// Strip the leading zero octets of an unsigned big-endian integer.
pub(crate) fn strip_leading_zeros(value: &[u8]) -> &[u8] {
    let first = value.iter().position(|b| *b != 0).unwrap_or(value.len());
    &value[first..]
}

fn encode_tlv(tag: u8, content: &[&[u8]]) -> Vec<u8> {
    let content_len: usize = content.iter().map(|part| part.len()).sum();
    let len_bytes = encode_der_length(content_len);
    let mut result = Vec::with_capacity(1 + len_bytes.len() + content_len);
    result.push(tag);
    result.extend_from_slice(&len_bytes);
    for part in content {
        result.extend_from_slice(part);
    }
    result
}

/// Length encoding as defined in section 8.1.3 of
/// [ITU X.690](https://www.itu.int/ITU-T/studygroups/com17/languages/X.690-0207.pdf).
fn encode_der_length(len: usize) -> Vec<u8> {
    if len <= DER_LENGTH_SHORT_FORM_MAX {
        vec![len as u8]
    } else {
        let len_bytes = len.to_be_bytes();
        let len_bytes = strip_leading_zeros(&len_bytes);
        let mut result = Vec::with_capacity(1 + len_bytes.len());
        result.push(HIGH_BIT | len_bytes.len() as u8);
        result.extend_from_slice(len_bytes);
        result
    }
}

/// DER encoding of a non-negative integer given as unsigned big-endian bytes.
fn encode_integer(value: &[u8]) -> Vec<u8> {
    let value = match strip_leading_zeros(value) {
        [] => &[0][..],
        stripped => stripped,
    };
    let needs_leading_zero = value[0] & HIGH_BIT != 0;
    let mut content = Vec::with_capacity(value.len() + 1);
    if needs_leading_zero {
        content.push(0);
    }
    content.extend_from_slice(value);
    let encoded = encode_tlv(DER_TAG_INTEGER, &[content.as_slice()]);
    content.zeroize();
    encoded
}

struct DerReader<'a> {
    input: &'a [u8],
}

impl<'a> DerReader<'a> {
    fn new(input: &'a [u8]) -> Self {
        Self { input }
    }

    fn read(&mut self, expected_tag: u8) -> Result<&'a [u8], OpaqueError> {
        let [tag, first_len, rest @ ..] = self.input else {
            return Err(OpaqueError::from_display("truncated DER element"));
        };
        if *tag != expected_tag {
            return Err(OpaqueError::from_display(format!(
                "unexpected DER tag {tag:#04x}, expected {expected_tag:#04x}"
            )));
        }

        let (len, rest) = if *first_len & HIGH_BIT == 0 {
            (usize::from(*first_len), rest)
        } else {
            let len_len = usize::from(*first_len & !HIGH_BIT);
            if len_len == 0 || len_len > size_of::<usize>() || rest.len() < len_len {
                return Err(OpaqueError::from_display("invalid DER length"));
            }
            let (len_bytes, rest) = rest.split_at(len_len);
            let len = len_bytes
                .iter()
                .fold(0usize, |acc, b| (acc << 8) | usize::from(*b));
            (len, rest)
        };

        if rest.len() < len {
            return Err(OpaqueError::from_display("truncated DER element"));
        }
        let (content, remaining) = rest.split_at(len);
        self.input = remaining;
        Ok(content)
    }

    fn read_unsigned_integer(&mut self) -> Result<&'a [u8], OpaqueError> {
        let content = self.read(DER_TAG_INTEGER)?;
        if content.first().is_some_and(|b| b & HIGH_BIT != 0) {
            return Err(OpaqueError::from_display("negative DER integer"));
        }
        Ok(strip_leading_zeros(content))
    }

    fn finish(self) -> Result<(), OpaqueError> {
        if self.input.is_empty() {
            Ok(())
        } else {
            Err(OpaqueError::from_display("trailing data after DER element"))
        }
    }
}
