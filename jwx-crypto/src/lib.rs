//! Crypto core of jwx.
//!
//! This includes:
//! - JSON Web Algorithms (JWA) and the algorithm registry
//! - JSON Web Keys (JWK) and key sets
//! - JSON Web Signatures (JWS) and JSON Web Encryption (JWE)
//! - Key management, content encryption and key selection
//!
//! # jwx
//!
//! Crate used by the end-user `jwx` crate. Most users will want to depend on
//! `jwx` directly, which re-exports everything found here.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(not(test), warn(clippy::print_stdout, clippy::dbg_macro))]

pub mod jose;

pub mod dep {
    //! Dependencies for jwx crypto modules.
    //!
    //! Exported for your convenience

    pub mod aws_lc_rs {
        //! Re-export of the [`aws-lc-rs`] crate.
        //!
        //! [`aws-lc-rs`]: https://docs.rs/aws-lc-rs

        #[doc(inline)]
        pub use aws_lc_rs::*;
    }
}
