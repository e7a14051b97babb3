//! Integration test crate for the offscreen effect player.
//!
//! This crate exists solely to hold cross-crate integration tests.
//! It drives the player end to end with the reference engine and
//! software or instrumented render targets.

#[cfg(test)]
mod support;

#[cfg(test)]
mod pipeline;

#[cfg(test)]
mod concurrency;

#[cfg(test)]
mod conversion;

#[cfg(test)]
mod effects;
