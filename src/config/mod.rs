//! Configuration module for webgl-shield.
//!
//! This module provides configuration management for the shield, including:
//! - Loading settings from files (TOML/JSON)
//! - Environment variable overrides
//! - CLI argument merging
//! - Validation and defaults
//!
//! # Example
//!
//! ```rust,no_run
//! use webgl_shield::config::ShieldConfig;
//!
//! // Create with defaults
//! let config = ShieldConfig::default();
//!
//! // Load from a specific file
//! let config = ShieldConfig::from_file("shield.toml").unwrap();
//!
//! // Override with environment variables
//! let config = config.merge_with_env();
//! ```

mod settings;

pub use settings::{
    CliArgs, CompatibilitySettings, ConfigError, DebugSettings, DrawCallSettings,
    ExtensionSettings, Feature, GpuTier, GpuVendor, JitterByTier, ParameterSettings,
    ProfileSettings, ReadbackSettings, ShieldConfig, ENV_PREFIX,
};
