//! Test fixtures

pub mod audio_fixtures;
