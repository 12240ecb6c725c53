//! Clarion core domain
//!
//! Platform-agnostic building blocks of the hearing-assist pipeline:
//! gain state, the per-frame signal chain, waveform history, device and
//! stream domain types, and settings persistence. Platform backends
//! (CPAL streams, device enumeration) live in the `infra` crate.

pub mod domain;
