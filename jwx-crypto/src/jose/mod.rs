//! # JOSE: JSON Object Signing and Encryption
//!
//! JOSE is an IETF standard for securely transferring data between parties using JSON.
//! It provides a general framework for signing and encrypting any kind of data, and it's
//! the foundation for technologies like JSON Web Tokens (JWTs).
//!
//! The JOSE framework is made up of several key components:
//!
//! * JWS (JSON Web Signature): This specification defines how to create a digital signature for
//!   any data. A JWS proves data integrity and authenticity. It consists of a Header, a
//!   Payload (the data), and a Signature, all encoded in Base64Url and joined by dots.
//!   See [`rfc7515`] for more details.
//!
//! * JWE (JSON Web Encryption): This defines a standard way to encrypt data. A JWE ensures
//!   the confidentiality of the information, making sure only authorized parties can read it.
//!   See [`rfc7516`] for more details.
//!
//! * JWK (JSON Web Key): This specifies a JSON format for representing cryptographic keys.
//!   This makes it simple to share the public keys required to verify signatures or encrypt data.
//!   See [`rfc7517`] for more details.
//!
//! * JWA (JSON Web Algorithm): This is essentially a list of the specific cryptographic
//!   algorithms that are used for signing and encryption within the JOSE framework. The alg
//!   parameter in the JOSE header identifies which algorithm was used.
//!   See [`rfc7518`] for more details.
//!
//! Receiving a message happens in two passes. A first pass ([`ParsedJWS`],
//! [`ParsedJWE`]) decodes the header without any cryptographic work, so a key
//! can be picked. The second pass checks [`AlgorithmConstraints`] and "crit"
//! before the key is ever used, and then verifies or decrypts.
//!
//! [`rfc7515`]: https://datatracker.ietf.org/doc/html/rfc7515
//! [`rfc7516`]: https://datatracker.ietf.org/doc/html/rfc7516
//! [`rfc7517`]: https://datatracker.ietf.org/doc/html/rfc7517
//! [`rfc7518`]: https://datatracker.ietf.org/doc/html/rfc7518

mod error;
pub use error::{ErrorKind, JoseError};

mod context;
pub use context::{ProviderContext, RandomSource, SystemRandomSource};

mod registry;
pub use registry::{AlgorithmDescriptor, AlgorithmFamily, AlgorithmRegistry, KeyPersuasion};

mod constraints;
pub use constraints::{AlgorithmConstraints, ConstraintType, ConstraintViolation};

mod jwa;
pub use jwa::{CompressionAlgorithm, ContentEncryptionAlgorithm, JWA, KeyManagementAlgorithm, KeyType};

pub mod kdf;

mod curve;
mod der;
mod encoding;

mod key;
pub use key::{EcPrivateKey, EcPublicKey, EllipticCurve, Key, OctetKey, RsaPrivateKey, RsaPublicKey};

mod jwk;
pub use jwk::{JWK, JWKType, JWKUse, JsonWebKeySet};

pub mod header;
pub use header::{Headers, ProtectedHeader};

mod signature;
pub use signature::MIN_RSA_KEY_BITS;

mod keymgmt;
pub use keymgmt::ContentEncryptionKeys;

mod content;
pub use content::{ContentEncryptionKeyDescriptor, ContentEncryptionParts, DEFAULT_MAX_INFLATED_LEN};

mod jws;
pub use jws::{DecodedJWS, JWSBuilder, JWSCompact, JWSFlattened, ParsedJWS, Signer, SigningKey};

mod jwe;
pub use jwe::{DecryptedJWE, JWEBuilder, JWECompact, JWEFlattened, ParsedJWE};

mod message;
pub use message::{
    ConsumeOptions, ConsumedMessage, DEFAULT_MAX_NESTING_DEPTH, JoseMessage, JwksKeyResolver,
    KeyResolver, consume, consume_nested,
};

mod selector;
pub use selector::{JwkSelector, KeyUsage};
