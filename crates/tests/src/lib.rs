//! Integration tests for the full pipeline
//!
//! These run against the synthetic stream backend so they exercise the
//! real session lifecycle without audio hardware.

#[cfg(test)]
mod pipeline_integration;
