//! Test module organization for the measurement engine
//!
//! Network-free tests of the engine's algorithms live here, split by the
//! component they exercise. End-to-end behavior against a mock backend is
//! covered by the crate-level integration tests.
