//! # chroot-prep-common
//!
//! Shared types for the chroot-prep workspace.
//!
//! This crate provides the pieces every other crate agrees on:
//! - The error model ([`PrepError`]) and its [`PrepResult`] alias
//! - The on-disk layout of normal and overlay environments
//!   ([`OverlayPaths`] and the constants in [`paths`])

#![warn(missing_docs)]

pub mod error;
pub mod paths;

pub use error::{PrepError, PrepResult};
pub use paths::{OverlayPaths, normalize_base, overlay_dir, validate_overlay_name};
