use jwx_error::ErrorContext;
use jwx_utils::macros::generate_set_and_with;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::jose::{
    AlgorithmConstraints, CompressionAlgorithm, ConsumeOptions, ContentEncryptionAlgorithm,
    ContentEncryptionParts, ErrorKind, Headers, JoseError, Key, KeyManagementAlgorithm, OctetKey,
    ProtectedHeader, ProviderContext,
    encoding::{b64_decode, b64_encode, parse_json_object},
    error::WithKind,
    header::names,
};

#[derive(Debug, Clone)]
/// [`JWEBuilder`] should be used when creating a [`JWECompact`] or [`JWEFlattened`]
///
/// The protected header starts with "alg", "enc" and (if compression is enabled) "zip",
/// followed by the headers set on this builder.
pub struct JWEBuilder {
    alg: KeyManagementAlgorithm,
    enc: ContentEncryptionAlgorithm,
    protected_headers: Headers,
    unprotected_headers: Headers,
    payload: Vec<u8>,
    compression: Option<CompressionAlgorithm>,
    cek_override: Option<OctetKey>,
    iv_override: Option<Vec<u8>>,
    aad: Option<Vec<u8>>,
    algorithm_constraints: AlgorithmConstraints,
    content_encryption_constraints: AlgorithmConstraints,
    ctx: ProviderContext,
}

impl JWEBuilder {
    /// Create a builder encrypting with `enc` under a CEK established by `alg`.
    pub fn new(alg: KeyManagementAlgorithm, enc: ContentEncryptionAlgorithm) -> Self {
        Self {
            alg,
            enc,
            protected_headers: Headers::new(),
            unprotected_headers: Headers::new(),
            payload: Vec::new(),
            compression: None,
            cek_override: None,
            iv_override: None,
            aad: None,
            algorithm_constraints: AlgorithmConstraints::no_constraints(),
            content_encryption_constraints: AlgorithmConstraints::no_constraints(),
            ctx: ProviderContext::default(),
        }
    }

    generate_set_and_with! {
        /// Plaintext to encrypt.
        pub fn payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
            self.payload = payload.into();
            self
        }
    }

    generate_set_and_with! {
        /// Compress the plaintext before encrypting it, off by default.
        ///
        /// Compressing attacker influenced data next to secrets can leak those
        /// secrets through the ciphertext length, only enable this when the
        /// payload is not mixed like that.
        pub fn compression(mut self, compression: Option<CompressionAlgorithm>) -> Self {
            self.compression = compression;
            self
        }
    }

    generate_set_and_with! {
        /// Use this CEK instead of a random one.
        ///
        /// Refused for "dir" and "ECDH-ES", where the CEK follows from the key.
        pub fn cek_override(mut self, cek: Option<OctetKey>) -> Self {
            self.cek_override = cek;
            self
        }
    }

    generate_set_and_with! {
        /// Use this IV instead of a random one.
        ///
        /// Reusing an IV with the same CEK breaks confidentiality, only meant for
        /// reproducing known outputs.
        pub fn iv_override(mut self, iv: Option<Vec<u8>>) -> Self {
            self.iv_override = iv;
            self
        }
    }

    generate_set_and_with! {
        /// Additional authenticated data, only supported by [`JWEBuilder::build_flattened`].
        pub fn aad(mut self, aad: Option<Vec<u8>>) -> Self {
            self.aad = aad;
            self
        }
    }

    generate_set_and_with! {
        /// Constraints the key management algorithm must pass before encrypting.
        pub fn algorithm_constraints(mut self, constraints: AlgorithmConstraints) -> Self {
            self.algorithm_constraints = constraints;
            self
        }
    }

    generate_set_and_with! {
        /// Constraints the content encryption algorithm must pass before encrypting.
        pub fn content_encryption_constraints(mut self, constraints: AlgorithmConstraints) -> Self {
            self.content_encryption_constraints = constraints;
            self
        }
    }

    generate_set_and_with! {
        pub fn provider(mut self, ctx: ProviderContext) -> Self {
            self.ctx = ctx;
            self
        }
    }

    generate_set_and_with! {
        /// Set provided header in the protected header map
        ///
        /// "alg" and "enc" are owned by the builder and can not be set here.
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
        pub fn protected_headers(mut self, headers: impl Serialize) -> Result<Self, JoseError> {
            self.protected_headers.try_set_headers(headers)?;
            Ok(self)
        }
    }

    /// Get mutable reference to the underlying protected header store
    pub fn protected_headers_mut(&mut self) -> &mut Headers {
        &mut self.protected_headers
    }

    generate_set_and_with! {
        /// Set provided header in the shared unprotected header map
        ///
        /// Only used by [`JWEBuilder::build_flattened`].
        pub fn unprotected_header(
            mut self,
            name: impl Into<String>,
            value: impl Serialize,
        ) -> Result<Self, JoseError> {
            self.unprotected_headers.try_set_header(name, value)?;
            Ok(self)
        }
    }

    /// Get mutable reference to the underlying unprotected header store
    pub fn unprotected_headers_mut(&mut self) -> &mut Headers {
        &mut self.unprotected_headers
    }

    /// Encrypt into the five part compact serialization.
    pub fn build_compact(self, key: &Key) -> Result<JWECompact, JoseError> {
        if !self.unprotected_headers.is_empty() {
            return Err(JoseError::from_display(
                ErrorKind::Structural,
                "Compact jwe does not support unprotected headers",
            ));
        }
        if self.aad.is_some() {
            return Err(JoseError::from_display(
                ErrorKind::Structural,
                "Compact jwe does not support additional authenticated data",
            ));
        }
        let encrypted = self.encrypt(key)?;
        Ok(JWECompact(format!(
            "{}.{}.{}.{}.{}",
            encrypted.protected.encoded(),
            b64_encode(&encrypted.encrypted_key),
            b64_encode(encrypted.parts.iv()),
            b64_encode(encrypted.parts.ciphertext()),
            b64_encode(encrypted.parts.tag()),
        )))
    }

    /// Encrypt into the flattened JSON serialization.
    pub fn build_flattened(self, key: &Key) -> Result<JWEFlattened, JoseError> {
        let encrypted = self.encrypt(key)?;
        Ok(JWEFlattened {
            protected: encrypted.protected.encoded().to_owned(),
            unprotected: (!encrypted.unprotected.is_empty()).then_some(encrypted.unprotected),
            header: None,
            encrypted_key: (!encrypted.encrypted_key.is_empty())
                .then(|| b64_encode(&encrypted.encrypted_key)),
            iv: b64_encode(encrypted.parts.iv()),
            ciphertext: b64_encode(encrypted.parts.ciphertext()),
            tag: b64_encode(encrypted.parts.tag()),
            aad: encrypted.aad.as_deref().map(b64_encode),
        })
    }

    fn protected_header_base(&self) -> Result<Headers, JoseError> {
        let mut headers = Headers::new()
            .try_with_header(names::ALGORITHM, self.alg)?
            .try_with_header(names::ENCRYPTION_METHOD, self.enc)?;
        if let Some(zip) = self.compression {
            headers.try_set_header(names::ZIP, zip)?;
        }
        for name in self.protected_headers.names() {
            if name == names::ALGORITHM || name == names::ENCRYPTION_METHOD {
                return Err(JoseError::from_display(
                    ErrorKind::Structural,
                    format!("header '{name}' is set by the algorithms of the builder"),
                ));
            }
        }
        headers.try_set_headers(&self.protected_headers)?;
        Ok(headers)
    }

    fn encrypt(self, key: &Key) -> Result<EncryptedParts, JoseError> {
        self.algorithm_constraints.check(self.alg.id())?;
        self.content_encryption_constraints.check(self.enc.id())?;

        let mut protected = self.protected_header_base()?;
        if self.unprotected_headers.contains(names::ZIP) {
            return Err(JoseError::from_display(
                ErrorKind::Structural,
                "header 'zip' must be protected",
            ));
        }
        Headers::joined(&protected, Some(&self.unprotected_headers))?;
        // "zip" may also have been set as a raw header
        let zip = compression_of(&protected)?;

        let keys = self.alg.manage_for_encrypt(
            key,
            self.enc,
            &mut protected,
            self.cek_override.as_ref().map(OctetKey::as_bytes),
            &self.ctx,
        )?;
        let protected = protected.freeze()?;

        let compressed;
        let plaintext = match zip {
            Some(zip) => {
                compressed = zip.compress(&self.payload)?;
                &compressed
            }
            None => &self.payload,
        };
        let aad = encryption_aad(&protected, self.aad.as_deref());
        let parts = self.enc.encrypt(
            plaintext,
            &aad,
            keys.cek(),
            self.iv_override.as_deref(),
            &self.ctx,
        )?;
        tracing::trace!(alg = %self.alg, enc = %self.enc, "JWE encrypted");

        Ok(EncryptedParts {
            protected,
            unprotected: self.unprotected_headers,
            encrypted_key: keys.encrypted_key().to_vec(),
            parts,
            aad: self.aad,
        })
    }
}

struct EncryptedParts {
    protected: ProtectedHeader,
    unprotected: Headers,
    encrypted_key: Vec<u8>,
    parts: ContentEncryptionParts,
    aad: Option<Vec<u8>>,
}

fn compression_of(headers: &Headers) -> Result<Option<CompressionAlgorithm>, JoseError> {
    headers
        .string(names::ZIP)?
        .map(str::parse::<CompressionAlgorithm>)
        .transpose()
}

/// AAD of the content encryption: the encoded protected header,
/// followed by `"." BASE64URL(aad)` when the JSON "aad" member is used.
fn encryption_aad(protected: &ProtectedHeader, aad: Option<&[u8]>) -> Vec<u8> {
    let mut out = protected.aad().to_vec();
    if let Some(aad) = aad {
        out.push(b'.');
        out.extend_from_slice(b64_encode(aad).as_bytes());
    }
    out
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
/// [`JWECompact`] is the compact `JWE` representation as defined in [`rfc7516, section 7.1`]
///
/// [`rfc7516, section 7.1`]: https://datatracker.ietf.org/doc/html/rfc7516#section-7.1
pub struct JWECompact(String);

impl JWECompact {
    /// Create a builder which can be used to create a [`JWECompact`]
    pub fn builder(alg: KeyManagementAlgorithm, enc: ContentEncryptionAlgorithm) -> JWEBuilder {
        JWEBuilder::new(alg, enc)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First pass: split and decode without any cryptographic operation.
    pub fn parse(&self) -> Result<ParsedJWE, JoseError> {
        ParsedJWE::parse_compact(&self.0)
    }
}

impl std::fmt::Display for JWECompact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<JWECompact> for String {
    fn from(value: JWECompact) -> Self {
        value.0
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
/// [`JWEFlattened`] is the flattened JSON serialization for a single recipient,
/// as defined in [`rfc7516, section 7.2.2`]
///
/// [`rfc7516, section 7.2.2`]: https://datatracker.ietf.org/doc/html/rfc7516#section-7.2.2
pub struct JWEFlattened {
    protected: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    unprotected: Option<Headers>,
    /// Per-recipient unprotected header.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    header: Option<Headers>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    encrypted_key: Option<String>,
    iv: String,
    ciphertext: String,
    tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    aad: Option<String>,
}

impl JWEFlattened {
    /// Create a builder which can be used to create a [`JWEFlattened`]
    pub fn builder(alg: KeyManagementAlgorithm, enc: ContentEncryptionAlgorithm) -> JWEBuilder {
        JWEBuilder::new(alg, enc)
    }

    /// Parse the JSON form, rejecting duplicate member names.
    pub fn from_json(json: &str) -> Result<Self, JoseError> {
        let members = parse_json_object(json.as_bytes(), "flattened JWE")?;
        serde_json::from_value(Value::Object(members))
            .context("read flattened JWE members")
            .with_kind(ErrorKind::Structural)
    }

    pub fn to_json(&self) -> Result<String, JoseError> {
        serde_json::to_string(self)
            .context("serialize flattened JWE")
            .with_kind(ErrorKind::Structural)
    }

    /// Create a [`JWECompact`] from this [`JWEFlattened`]
    pub fn as_compact(&self) -> Result<JWECompact, JoseError> {
        if self.unprotected.is_some() || self.header.is_some() || self.aad.is_some() {
            return Err(JoseError::from_display(
                ErrorKind::Structural,
                "JWECompact only supports a protected header",
            ));
        }
        Ok(JWECompact(format!(
            "{}.{}.{}.{}.{}",
            self.protected,
            self.encrypted_key.as_deref().unwrap_or_default(),
            self.iv,
            self.ciphertext,
            self.tag
        )))
    }

    /// First pass: decode without any cryptographic operation.
    pub fn parse(&self) -> Result<ParsedJWE, JoseError> {
        ParsedJWE::new(WireParts {
            protected: &self.protected,
            unprotected: self.unprotected.clone(),
            recipient: self.header.clone(),
            encrypted_key: self.encrypted_key.as_deref().unwrap_or_default(),
            iv: &self.iv,
            ciphertext: &self.ciphertext,
            tag: &self.tag,
            aad: self.aad.as_deref(),
        })
    }
}

struct WireParts<'a> {
    protected: &'a str,
    unprotected: Option<Headers>,
    recipient: Option<Headers>,
    encrypted_key: &'a str,
    iv: &'a str,
    ciphertext: &'a str,
    tag: &'a str,
    aad: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// A received JWE whose header has been decoded but which is not decrypted yet.
///
/// Inspect [`ParsedJWE::header`] (e.g. to pick a key) and then call
/// [`ParsedJWE::decrypt`], which reuses everything decoded here.
pub struct ParsedJWE {
    header: ProtectedHeader,
    unprotected: Option<Headers>,
    recipient: Option<Headers>,
    joint: Headers,
    encrypted_key: Vec<u8>,
    parts: ContentEncryptionParts,
    aad: Vec<u8>,
}

impl ParsedJWE {
    /// Parse `header.encrypted_key.iv.ciphertext.tag`.
    pub fn parse_compact(compact: &str) -> Result<Self, JoseError> {
        let parts: Vec<&str> = compact.split('.').collect();
        let [protected, encrypted_key, iv, ciphertext, tag] = parts.as_slice() else {
            return Err(JoseError::from_display(
                ErrorKind::Structural,
                format!("compact JWE must have 5 parts, got {}", parts.len()),
            ));
        };
        Self::new(WireParts {
            protected,
            unprotected: None,
            recipient: None,
            encrypted_key,
            iv,
            ciphertext,
            tag,
            aad: None,
        })
    }

    /// Parse the flattened JSON serialization.
    pub fn parse_flattened(json: &str) -> Result<Self, JoseError> {
        JWEFlattened::from_json(json)?.parse()
    }

    fn new(wire: WireParts<'_>) -> Result<Self, JoseError> {
        let header = ProtectedHeader::decode(wire.protected)?;
        for unprotected in [&wire.unprotected, &wire.recipient].into_iter().flatten() {
            for name in [names::CRITICAL, names::ZIP] {
                if unprotected.contains(name) {
                    return Err(JoseError::from_display(
                        ErrorKind::Structural,
                        format!("header '{name}' must be protected"),
                    ));
                }
            }
        }
        let shared = Headers::joined(header.headers(), wire.unprotected.as_ref())?;
        let joint = Headers::joined(&shared, wire.recipient.as_ref())?;

        let mut aad = header.aad().to_vec();
        if let Some(extra) = wire.aad {
            aad.push(b'.');
            aad.extend_from_slice(extra.as_bytes());
        }

        Ok(Self {
            encrypted_key: b64_decode(wire.encrypted_key, "JWE encrypted key")?,
            parts: ContentEncryptionParts::new(
                b64_decode(wire.iv, "JWE initialization vector")?,
                b64_decode(wire.ciphertext, "JWE ciphertext")?,
                b64_decode(wire.tag, "JWE authentication tag")?,
            ),
            header,
            unprotected: wire.unprotected,
            recipient: wire.recipient,
            joint,
            aad,
        })
    }

    /// The protected header.
    pub fn header(&self) -> &ProtectedHeader {
        &self.header
    }

    /// Shared unprotected header of the JSON serialization.
    pub fn unprotected_header(&self) -> Option<&Headers> {
        self.unprotected.as_ref()
    }

    /// Per-recipient header of the JSON serialization.
    pub fn recipient_header(&self) -> Option<&Headers> {
        self.recipient.as_ref()
    }

    /// Protected, shared and per-recipient members together.
    pub fn joint_header(&self) -> &Headers {
        &self.joint
    }

    /// Declared "alg".
    pub fn algorithm(&self) -> Result<&str, JoseError> {
        self.joint.required_string(names::ALGORITHM)
    }

    /// Declared "enc".
    pub fn content_encryption(&self) -> Result<&str, JoseError> {
        self.joint.required_string(names::ENCRYPTION_METHOD)
    }

    pub fn encrypted_key(&self) -> &[u8] {
        &self.encrypted_key
    }

    /// Second pass: decrypt with `key`.
    ///
    /// "alg" and "enc" are checked against the constraints of `options`, followed by
    /// "crit" and "zip", before `key` is used. Every failure after that point that
    /// could tell an attacker something is a bare [`ErrorKind::CryptographicFailure`].
    pub fn decrypt(&self, key: &Key, options: &ConsumeOptions) -> Result<DecryptedJWE, JoseError> {
        let alg = self.algorithm()?;
        let enc = self.content_encryption()?;
        options.algorithm_constraints().check(alg)?;
        options.content_encryption_constraints().check(enc)?;
        self.header.check_critical(options.known_critical_headers())?;
        let alg: KeyManagementAlgorithm = alg.parse()?;
        let enc: ContentEncryptionAlgorithm = enc.parse()?;
        let zip = compression_of(&self.joint)?;

        let cek = alg.manage_for_decrypt(
            key,
            &self.encrypted_key,
            enc,
            &self.joint,
            options.provider(),
        )?;
        let plaintext = enc
            .decrypt(&self.parts, &self.aad, &cek)
            .inspect_err(|_| tracing::trace!(%alg, %enc, "JWE did not decrypt"))?;
        let payload = match zip {
            Some(zip) => zip.decompress(&plaintext, options.max_inflated_len())?,
            None => plaintext.to_vec(),
        };

        Ok(DecryptedJWE {
            header: self.header.clone(),
            joint: self.joint.clone(),
            payload,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Decrypted and authenticated content of a JWE.
pub struct DecryptedJWE {
    header: ProtectedHeader,
    joint: Headers,
    payload: Vec<u8>,
}

impl DecryptedJWE {
    /// Reference to the protected header
    pub fn header(&self) -> &ProtectedHeader {
        &self.header
    }

    /// Protected and unprotected members together.
    pub fn joint_header(&self) -> &Headers {
        &self.joint
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }
}
