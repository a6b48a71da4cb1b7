//! # sqs-codec
//!
//! Reversible transform between a [`Configuration`](sqs_types::Configuration)
//! and a compact transport token: canonical JSON, gzip, then URL-safe base64.
//! Tokens are embedded in share links of the form `<app>/?config=<token>`.
//!
//! The codec is stateless; every function may be called concurrently.

mod codec;
mod link;

pub use codec::{compress, decode, decompress, encode, ShareToken, MAX_DECODED_BYTES};
pub use link::{ShareLink, CONFIG_PARAM};
