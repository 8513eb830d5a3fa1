//! utilities crate for jwx
//!
//! `jwx-utils` contains utilities used by the other jwx crates,
//! not really being part of one of them in particular.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(not(test), warn(clippy::print_stdout, clippy::dbg_macro))]

#[doc(hidden)]
#[macro_use]
pub mod macros;
