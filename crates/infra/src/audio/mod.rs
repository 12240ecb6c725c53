//! Platform-specific audio backend implementations using CPAL
//!
//! This module provides cross-platform audio support through CPAL, which abstracts
//! platform-specific APIs:
//! - Windows: WASAPI
//! - Linux: ALSA/PulseAudio
//! - macOS: CoreAudio
//!
//! A synthetic software backend implements the same stream contract for
//! machines without usable hardware and for the integration tests.

pub mod controller;
pub mod cpal_backend;
pub mod loopback;
pub mod session;
pub mod stream;

pub use controller::{LifecycleCoordinator, PipelineController};
pub use cpal_backend::CpalCatalog;
pub use loopback::SyntheticBackend;
pub use session::{ProcessingListener, SessionState, StreamSession};
pub use stream::{ActiveStreams, CpalBackend, StreamBackend};
