//! # chat-types
//!
//! Wire format types for the sealed-chat relay.
//!
//! This crate provides the types shared between the relay and its clients:
//! - [`Envelope`] - The JSON message unit carrying ciphertext between participants
//! - [`short_key`] - Log-safe abbreviation of participant keys
//! - [`EnvelopeError`] - Codec errors

#![warn(missing_docs)]
#![warn(clippy::all)]

mod codec;
mod envelope;
mod error;

pub use envelope::{short_key, Envelope};
pub use error::EnvelopeError;
