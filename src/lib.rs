//! # WebGL Shield
//!
//! A deterministic WebGL fingerprint spoofing engine written in Rust.
//!
//! WebGL Shield sits between a page and the host's rendering contexts and
//! answers GPU identity, capability and pixel queries from a synthetic,
//! seed-consistent profile instead of the real device signature.
//!
//! ## Features
//!
//! - **Seeded Generator**: every spoofed value is a pure function of the session seed and a label
//! - **Capability Profiles**: vendor/tier classified GPU identities with matching parameter tables
//! - **Parameter & Extension Spoofing**: cached per context, so repeated queries agree
//! - **Draw & Readback Noise**: bounded pixel noise that is never applied twice to one frame
//! - **Injection Scripts**: JavaScript renditions for automated-browser tooling
//! - **Flexible Configuration**: TOML/JSON files, environment variables, CLI arguments
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::rc::Rc;
//! use webgl_shield::{
//!     config::ShieldConfig,
//!     host::{ContextProvider, SoftwareHost},
//!     stealth::Shield,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ShieldConfig::default()
//!         .with_seed("my-session")
//!         .with_draw_calls(true);
//!
//!     let host: Rc<dyn ContextProvider> = Rc::new(SoftwareHost::new());
//!     let shield = Shield::initialize(config, host).await;
//!
//!     let status = shield.status();
//!     println!("{}", serde_json::to_string_pretty(&status)?);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`host`]: The rendering-context traits pages talk to, plus an in-memory host
//! - [`stealth`]: The generator, profiles, interceptors and the shield entry points
//! - [`config`]: Configuration loading and management
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Shield / Hook                         │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌────────────┐ ┌────────────┐ ┌────────────┐ ┌────────────┐ │
//! │  │ Parameters │ │ Extensions │ │  Readback  │ │    Draw    │ │
//! │  └─────┬──────┘ └─────┬──────┘ └─────┬──────┘ └─────┬──────┘ │
//! │        └──────────────┴──────┬───────┴──────────────┘        │
//! │                      ┌───────┴───────┐                       │
//! │                      │    Session    │                       │
//! │                      │ profile + rng │                       │
//! │                      └───────┬───────┘                       │
//! │                      ┌───────┴───────┐                       │
//! │                      │    Config     │                       │
//! │                      └───────────────┘                       │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration
//!
//! Configuration follows a precedence chain:
//! 1. Default values
//! 2. Configuration file (TOML/JSON)
//! 3. Environment variables (`WEBGL_SHIELD_*`)
//! 4. CLI arguments
//!
//! See [`config::ShieldConfig`] for all available options.

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Full version string with name
pub const FULL_VERSION: &str = concat!(env!("CARGO_PKG_NAME"), " v", env!("CARGO_PKG_VERSION"));

// ============================================================================
// Module Exports
// ============================================================================

/// Host rendering-context traits and the in-memory software host.
pub mod host;

/// Fingerprint protection engine: generator, profiles, interceptors, shield.
pub mod stealth;

/// Configuration management for loading settings from files, env, and CLI.
pub mod config;

// ============================================================================
// Re-exports for Convenience
// ============================================================================

// Host types
pub use host::{
    Canvas, ContextKind, ContextProvider, GlValue, HostContext, PixelBuffer, RenderingContext,
    SoftwareHost,
};

// Engine types
pub use stealth::{
    Profile, ProfileSummary, Seed, Session, SessionRng, Shield, ShieldBuilder, ShieldStatus,
};

// Config types
pub use config::{CliArgs, ConfigError, Feature, GpuTier, GpuVendor, ShieldConfig};

// ============================================================================
// Prelude Module
// ============================================================================

/// Prelude module for convenient imports.
///
/// ```rust
/// use webgl_shield::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::{CliArgs, Feature, ShieldConfig};
    pub use crate::host::{ContextProvider, RenderingContext, SoftwareHost};
    pub use crate::stealth::{Seed, Shield, ShieldStatus};
    pub use crate::{FULL_VERSION, NAME, VERSION};
}
