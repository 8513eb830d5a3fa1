//! Error types for jwx.
//!
//! The [`BoxError`] type is a type-erased error type that can be used to represent any error that
//! implements the `std::error::Error` trait. It is used for cases where it is usually not
//! that important what specific error type is returned, but rather that an error occurred.
//!
//! [`OpaqueError`] wraps such a boxed error so it can travel through APIs
//! that want a concrete type, while [`ErrorContext`] and [`ErrorExt`] make it easy
//! to attach a short description of what was being attempted when something failed.
//!
//! ```
//! use jwx_error::{ErrorContext, OpaqueError};
//!
//! fn parse_len(s: &str) -> Result<usize, OpaqueError> {
//!     s.parse::<usize>().context("parse length")
//! }
//!
//! let err = parse_len("ten").unwrap_err();
//! assert_eq!("parse length: invalid digit found in string", err.to_string());
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(not(test), warn(clippy::print_stdout, clippy::dbg_macro))]

use std::error::Error as StdError;

/// Alias for a type-erased error type.
pub type BoxError = Box<dyn StdError + Send + Sync>;

mod ext;
pub use ext::{ErrorContext, ErrorExt, OpaqueError};
