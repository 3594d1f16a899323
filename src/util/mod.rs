//! Common utilities

pub mod fingerprint;

pub use fingerprint::{fingerprint, Fingerprinter};
