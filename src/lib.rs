//! jwx is a toolkit for JSON Object Signing and Encryption (JOSE) in Rust.
//!
//! It covers the four JOSE building blocks:
//!
//! | spec | support |
//! |-|-|
//! | [JWS](https://datatracker.ietf.org/doc/html/rfc7515) | compact ⸱ flattened JSON ⸱ detached and unencoded payloads |
//! | [JWE](https://datatracker.ietf.org/doc/html/rfc7516) | compact ⸱ flattened JSON ⸱ DEFLATE compression |
//! | [JWK](https://datatracker.ietf.org/doc/html/rfc7517) | oct ⸱ RSA ⸱ EC keys ⸱ key sets ⸱ thumbprints |
//! | [JWA](https://datatracker.ietf.org/doc/html/rfc7518) | HMAC ⸱ RSA ⸱ RSA-PSS ⸱ ECDSA ⸱ AES-KW ⸱ AES-GCM ⸱ ECDH-ES ⸱ RSA-OAEP |
//!
//! Consumers start from [`jose::consume`] (or [`jose::consume_nested`] for
//! signed-then-encrypted tokens), handing it a [`jose::KeyResolver`]. A fixed
//! [`jose::Key`], a closure or a [`jose::JwksKeyResolver`] over a JWK set all
//! qualify. Algorithm constraints are enforced before any key is touched, and
//! the unsecured "none" algorithm is refused unless explicitly permitted.
//!
//! ```
//! use jwx::jose::{ConsumeOptions, JWA, JWSCompact, Key, SigningKey, consume};
//!
//! # fn main() -> Result<(), jwx::jose::JoseError> {
//! let key = Key::octet(vec![42u8; 32]);
//! let jws = JWSCompact::builder()
//!     .with_payload("hello")
//!     .build_compact(&SigningKey::new(JWA::HS256, key.clone()))?;
//!
//! let consumed = consume(jws.as_str(), &key, &ConsumeOptions::default())?;
//! assert_eq!(consumed.payload(), b"hello");
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(not(test), warn(clippy::print_stdout, clippy::dbg_macro))]

pub mod jose {
    //! JOSE types and operations.
    //!
    //! Re-export of `jwx_crypto::jose`.

    #[doc(inline)]
    pub use jwx_crypto::jose::*;
}

pub mod error {
    //! Error utilities shared by the jwx crates.
    //!
    //! Re-export of the `jwx-error` crate.

    #[doc(inline)]
    pub use jwx_error::*;
}

pub mod utils {
    //! Builder helpers shared by the jwx crates.
    //!
    //! Re-export of the `jwx-utils` crate.

    #[doc(inline)]
    pub use jwx_utils::*;
}

pub mod crypto {
    //! Cryptographic backend of jwx.

    #[doc(inline)]
    pub use jwx_crypto::dep::*;
}
