//! Playback and conversion core for a directory of audio files.
//!
//! Two workers own all of the concurrency: the persistent playback engine
//! ([`player::Player`]) and the one-shot transcode pipeline
//! ([`convert::Converter`]). Both communicate with the caller through an
//! [`events::types::AppEvent`] channel.

pub mod config;
pub mod convert;
pub mod error;
pub mod events;
pub mod library;
pub mod player;

pub use error::{Error, Result};
