//! Shield settings and configuration management.
//!
//! This module provides every tunable of the fingerprint shield, supporting
//! multiple configuration sources with proper precedence.

use crate::stealth::prng::Seed;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Prefix for environment variable overrides.
pub const ENV_PREFIX: &str = "WEBGL_SHIELD_";

/// Errors that can occur during configuration loading or validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse TOML configuration.
    #[error("Failed to parse TOML configuration: {0}")]
    TomlParseError(#[from] toml::de::Error),

    /// Failed to serialize TOML configuration.
    #[error("Failed to serialize TOML configuration: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),

    /// Failed to parse JSON configuration.
    #[error("Failed to parse JSON configuration: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    /// Unsupported file format.
    #[error("Unsupported configuration file format: {0}")]
    UnsupportedFormat(String),
}

/// GPU vendor family of a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
    /// Anything the classification tables do not recognise.
    Generic,
}

impl fmt::Display for GpuVendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpuVendor::Nvidia => write!(f, "nvidia"),
            GpuVendor::Amd => write!(f, "amd"),
            GpuVendor::Intel => write!(f, "intel"),
            GpuVendor::Generic => write!(f, "generic"),
        }
    }
}

impl std::str::FromStr for GpuVendor {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "nvidia" => Ok(GpuVendor::Nvidia),
            "amd" => Ok(GpuVendor::Amd),
            "intel" => Ok(GpuVendor::Intel),
            "generic" => Ok(GpuVendor::Generic),
            _ => Err(ConfigError::ValidationError(format!(
                "Unknown GPU vendor: {}. Valid vendors are: nvidia, amd, intel",
                s
            ))),
        }
    }
}

/// Performance tier of a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GpuTier {
    High,
    Mid,
    Low,
}

impl GpuTier {
    /// Classification order: the first matching tier wins.
    pub const ALL: [GpuTier; 3] = [GpuTier::High, GpuTier::Mid, GpuTier::Low];
}

impl fmt::Display for GpuTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpuTier::High => write!(f, "high"),
            GpuTier::Mid => write!(f, "mid"),
            GpuTier::Low => write!(f, "low"),
        }
    }
}

impl std::str::FromStr for GpuTier {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "high" => Ok(GpuTier::High),
            "mid" | "medium" => Ok(GpuTier::Mid),
            "low" => Ok(GpuTier::Low),
            _ => Err(ConfigError::ValidationError(format!(
                "Unknown GPU tier: {}. Valid tiers are: high, mid, low",
                s
            ))),
        }
    }
}

/// Independently togglable protection features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    Parameters,
    Extensions,
    DrawCalls,
    Readback,
}

impl Feature {
    pub const ALL: [Feature; 4] = [
        Feature::Parameters,
        Feature::Extensions,
        Feature::DrawCalls,
        Feature::Readback,
    ];
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Feature::Parameters => write!(f, "parameters"),
            Feature::Extensions => write!(f, "extensions"),
            Feature::DrawCalls => write!(f, "draw_calls"),
            Feature::Readback => write!(f, "readback"),
        }
    }
}

/// Profile selection settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileSettings {
    /// Path to a JSON profile catalog. `None` uses the built-in catalog.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_path: Option<PathBuf>,

    /// Only pick profiles of this vendor, when the catalog has any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_vendor: Option<GpuVendor>,

    /// Only pick profiles of this tier, when the catalog has any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_tier: Option<GpuTier>,
}

/// Per-tier jitter fractions. Missing tiers fall back to `jitter_percent`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JitterByTier {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub high: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mid: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub low: Option<f64>,
}

impl Default for JitterByTier {
    fn default() -> Self {
        Self {
            high: Some(0.02),
            mid: Some(0.03),
            low: Some(0.05),
        }
    }
}

impl JitterByTier {
    pub fn get(&self, tier: GpuTier) -> Option<f64> {
        match tier {
            GpuTier::High => self.high,
            GpuTier::Mid => self.mid,
            GpuTier::Low => self.low,
        }
    }

    fn values(&self) -> impl Iterator<Item = f64> {
        [self.high, self.mid, self.low].into_iter().flatten()
    }
}

/// Capability parameter spoofing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParameterSettings {
    pub enabled: bool,
    /// Jitter fraction used when a tier has no entry of its own.
    pub jitter_percent: f64,
    pub jitter_by_tier: JitterByTier,
}

impl Default for ParameterSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            jitter_percent: default_jitter_percent(),
            jitter_by_tier: JitterByTier::default(),
        }
    }
}

/// Extension filtering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtensionSettings {
    pub enabled: bool,
    /// Never enumerated and never returned by name.
    pub blocked_extensions: Vec<String>,
}

impl Default for ExtensionSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            blocked_extensions: default_blocked_extensions(),
        }
    }
}

/// Shader noise injected on significant draw calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrawCallSettings {
    /// Off by default: the extra pass costs a draw on real workloads.
    pub enabled: bool,
    /// Signed RGB perturbation bound, in `[0, 1]`.
    pub noise_amount: f64,
    /// Grid cells per axis of the noise pattern.
    pub noise_granularity: u32,
    /// Draws with more vertices than this trigger the noise pass.
    pub significant_vertex_count: u32,
}

impl Default for DrawCallSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            noise_amount: 0.02,
            noise_granularity: 64,
            significant_vertex_count: 10,
        }
    }
}

/// Pixel readback noise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadbackSettings {
    pub enabled: bool,
    /// Maximum per-component adjustment on the 0-255 scale.
    pub pixel_jitter: u32,
    pub include_alpha: bool,
}

impl Default for ReadbackSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            pixel_jitter: 3,
            include_alpha: false,
        }
    }
}

/// Reduced protection on known fingerprint-testing sites.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompatibilitySettings {
    pub enabled: bool,
    /// Hosts (and their subdomains) that get compatibility mode.
    pub hosts: Vec<String>,
}

impl Default for CompatibilitySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            hosts: default_compatibility_hosts(),
        }
    }
}

/// Diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugSettings {
    pub enabled: bool,
    /// Trace every intercepted call.
    pub log_calls: bool,
    /// Trace original and spoofed parameter values.
    pub log_parameters: bool,
    /// Mark protected canvases.
    pub visual_indicator: bool,
}

/// Main shield configuration.
///
/// Every section is `#[serde(default)]`, so a partial file merges over the
/// defaults section by section and unknown keys are ignored.
///
/// # Configuration Precedence
///
/// Settings are applied in the following order (later sources override earlier):
/// 1. Default values
/// 2. Configuration file (TOML or JSON)
/// 3. Environment variables
/// 4. CLI arguments
///
/// # Example
///
/// ```rust
/// use webgl_shield::config::{GpuTier, ShieldConfig};
///
/// let config = ShieldConfig::default()
///     .with_seed("test-1")
///     .with_draw_calls(true);
///
/// assert_eq!(config.jitter_for_tier(GpuTier::High), 0.02);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShieldConfig {
    /// Master switch.
    pub enabled: bool,

    /// Session seed. Generated at initialization when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<Seed>,

    pub profile: ProfileSettings,
    pub parameters: ParameterSettings,
    pub extensions: ExtensionSettings,
    pub draw_calls: DrawCallSettings,
    pub readback: ReadbackSettings,
    pub compatibility: CompatibilitySettings,
    pub debug: DebugSettings,
}

// Default value functions
fn default_jitter_percent() -> f64 {
    0.03
}

fn default_blocked_extensions() -> Vec<String> {
    vec![
        "WEBGL_debug_renderer_info".to_string(),
        "EXT_disjoint_timer_query".to_string(),
        "EXT_disjoint_timer_query_webgl2".to_string(),
    ]
}

fn default_compatibility_hosts() -> Vec<String> {
    vec![
        "browserleaks.com".to_string(),
        "amiunique.org".to_string(),
        "fingerprintjs.github.io".to_string(),
    ]
}

impl Default for ShieldConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            seed: None,
            profile: ProfileSettings::default(),
            parameters: ParameterSettings::default(),
            extensions: ExtensionSettings::default(),
            draw_calls: DrawCallSettings::default(),
            readback: ReadbackSettings::default(),
            compatibility: CompatibilitySettings::default(),
            debug: DebugSettings::default(),
        }
    }
}

fn parse_bool(value: &str) -> bool {
    value.eq_ignore_ascii_case("true") || value == "1"
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

impl ShieldConfig {
    /// Creates a new ShieldConfig with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads settings from a configuration file.
    ///
    /// Supports both TOML and JSON formats, detected by file extension.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use webgl_shield::config::ShieldConfig;
    ///
    /// let config = ShieldConfig::from_file("shield.toml").unwrap();
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        match extension.as_str() {
            "toml" => Ok(toml::from_str(&content)?),
            "json" => Ok(serde_json::from_str(&content)?),
            ext => Err(ConfigError::UnsupportedFormat(ext.to_string())),
        }
    }

    /// Parses a JSON configuration object such as the one a page global
    /// carries.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Saves settings to a configuration file.
    ///
    /// The format is determined by the file extension.
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        let content = match extension.as_str() {
            "toml" => toml::to_string_pretty(self)?,
            "json" => serde_json::to_string_pretty(self)?,
            ext => return Err(ConfigError::UnsupportedFormat(ext.to_string())),
        };

        fs::write(path, content)?;
        Ok(())
    }

    /// Loads settings from environment variables.
    ///
    /// Environment variables are prefixed with `WEBGL_SHIELD_`. For example:
    /// - `WEBGL_SHIELD_SEED`
    /// - `WEBGL_SHIELD_JITTER_PERCENT`
    /// - `WEBGL_SHIELD_BLOCKED_EXTENSIONS` (comma separated)
    pub fn from_env() -> Self {
        Self::default().merge_with_env()
    }

    /// Merges current settings with environment variable overrides.
    pub fn merge_with_env(self) -> Self {
        self.merge_with_lookup(|key| env::var(format!("{}{}", ENV_PREFIX, key)).ok())
    }

    /// Applies overrides from an arbitrary key lookup.
    ///
    /// Keys are the environment variable names without the prefix. Values
    /// that fail to parse are ignored.
    pub fn merge_with_lookup<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("ENABLED") {
            self.enabled = parse_bool(&val);
        }

        if let Some(val) = lookup("SEED") {
            self.seed = val.parse::<Seed>().ok();
        }

        if let Some(val) = lookup("PROFILE_PATH") {
            self.profile.profile_path = Some(PathBuf::from(val));
        }

        if let Some(val) = lookup("PREFERRED_VENDOR") {
            if let Ok(vendor) = val.parse() {
                self.profile.preferred_vendor = Some(vendor);
            }
        }

        if let Some(val) = lookup("PREFERRED_TIER") {
            if let Ok(tier) = val.parse() {
                self.profile.preferred_tier = Some(tier);
            }
        }

        if let Some(val) = lookup("PARAMETERS_ENABLED") {
            self.parameters.enabled = parse_bool(&val);
        }

        if let Some(val) = lookup("JITTER_PERCENT") {
            if let Ok(jitter) = val.parse() {
                self.parameters.jitter_percent = jitter;
            }
        }

        if let Some(val) = lookup("EXTENSIONS_ENABLED") {
            self.extensions.enabled = parse_bool(&val);
        }

        if let Some(val) = lookup("BLOCKED_EXTENSIONS") {
            self.extensions.blocked_extensions = parse_list(&val);
        }

        if let Some(val) = lookup("DRAW_CALLS_ENABLED") {
            self.draw_calls.enabled = parse_bool(&val);
        }

        if let Some(val) = lookup("NOISE_AMOUNT") {
            if let Ok(amount) = val.parse() {
                self.draw_calls.noise_amount = amount;
            }
        }

        if let Some(val) = lookup("NOISE_GRANULARITY") {
            if let Ok(granularity) = val.parse() {
                self.draw_calls.noise_granularity = granularity;
            }
        }

        if let Some(val) = lookup("READBACK_ENABLED") {
            self.readback.enabled = parse_bool(&val);
        }

        if let Some(val) = lookup("PIXEL_JITTER") {
            if let Ok(jitter) = val.parse() {
                self.readback.pixel_jitter = jitter;
            }
        }

        if let Some(val) = lookup("INCLUDE_ALPHA") {
            self.readback.include_alpha = parse_bool(&val);
        }

        if let Some(val) = lookup("COMPATIBILITY_ENABLED") {
            self.compatibility.enabled = parse_bool(&val);
        }

        if let Some(val) = lookup("COMPATIBILITY_HOSTS") {
            self.compatibility.hosts = parse_list(&val);
        }

        if let Some(val) = lookup("DEBUG") {
            self.debug.enabled = parse_bool(&val);
        }

        self
    }

    /// Merges settings with CLI arguments.
    ///
    /// # Example
    ///
    /// ```rust
    /// use webgl_shield::config::{CliArgs, ShieldConfig};
    ///
    /// let args = CliArgs {
    ///     seed: Some("cli-seed".to_string()),
    ///     ..Default::default()
    /// };
    ///
    /// let config = ShieldConfig::default().merge_with_args(&args);
    /// assert_eq!(config.seed.unwrap().to_string(), "cli-seed");
    /// ```
    pub fn merge_with_args(mut self, args: &CliArgs) -> Self {
        if let Some(ref seed) = args.seed {
            self.seed = seed.parse::<Seed>().ok();
        }
        if let Some(ref path) = args.profile_path {
            self.profile.profile_path = Some(path.clone());
        }
        if let Some(vendor) = args.preferred_vendor {
            self.profile.preferred_vendor = Some(vendor);
        }
        if let Some(tier) = args.preferred_tier {
            self.profile.preferred_tier = Some(tier);
        }
        if let Some(enabled) = args.enabled {
            self.enabled = enabled;
        }
        if let Some(draw_calls) = args.draw_calls {
            self.draw_calls.enabled = draw_calls;
        }
        if let Some(debug) = args.debug {
            self.debug.enabled = debug;
        }

        self
    }

    /// Validates all settings.
    ///
    /// # Errors
    ///
    /// Returns an error if any setting is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let jitters = std::iter::once(self.parameters.jitter_percent)
            .chain(self.parameters.jitter_by_tier.values());
        for jitter in jitters {
            if !(0.0..=1.0).contains(&jitter) {
                return Err(ConfigError::ValidationError(format!(
                    "Jitter fraction must be between 0 and 1, got {}",
                    jitter
                )));
            }
        }

        if !(0.0..=1.0).contains(&self.draw_calls.noise_amount) {
            return Err(ConfigError::ValidationError(format!(
                "Draw noise amount must be between 0 and 1, got {}",
                self.draw_calls.noise_amount
            )));
        }

        if self.draw_calls.noise_granularity == 0 {
            return Err(ConfigError::ValidationError(
                "Draw noise granularity must be at least 1".to_string(),
            ));
        }

        if self.readback.pixel_jitter > 255 {
            return Err(ConfigError::ValidationError(format!(
                "Pixel jitter cannot exceed 255, got {}",
                self.readback.pixel_jitter
            )));
        }

        if self.profile.preferred_vendor == Some(GpuVendor::Generic) {
            return Err(ConfigError::ValidationError(
                "Preferred vendor must be one of: nvidia, amd, intel".to_string(),
            ));
        }

        Ok(())
    }

    /// Whether a feature is active: false whenever the master switch is off.
    pub fn is_enabled(&self, feature: Feature) -> bool {
        if !self.enabled {
            return false;
        }
        match feature {
            Feature::Parameters => self.parameters.enabled,
            Feature::Extensions => self.extensions.enabled,
            Feature::DrawCalls => self.draw_calls.enabled,
            Feature::Readback => self.readback.enabled,
        }
    }

    /// Jitter fraction for a tier, falling back to `jitter_percent`.
    pub fn jitter_for_tier(&self, tier: GpuTier) -> f64 {
        self.parameters
            .jitter_by_tier
            .get(tier)
            .unwrap_or(self.parameters.jitter_percent)
    }

    // Builder-style methods for convenient configuration

    /// Sets the session seed.
    pub fn with_seed(mut self, seed: impl Into<Seed>) -> Self {
        self.seed = Some(seed.into());
        self
    }

    /// Sets the master switch.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Sets the profile catalog path.
    pub fn with_profile_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.profile.profile_path = Some(path.into());
        self
    }

    /// Restricts profile selection to one vendor.
    pub fn with_preferred_vendor(mut self, vendor: GpuVendor) -> Self {
        self.profile.preferred_vendor = Some(vendor);
        self
    }

    /// Restricts profile selection to one tier.
    pub fn with_preferred_tier(mut self, tier: GpuTier) -> Self {
        self.profile.preferred_tier = Some(tier);
        self
    }

    /// Sets one tier's jitter fraction.
    pub fn with_tier_jitter(mut self, tier: GpuTier, jitter: f64) -> Self {
        let by_tier = &mut self.parameters.jitter_by_tier;
        match tier {
            GpuTier::High => by_tier.high = Some(jitter),
            GpuTier::Mid => by_tier.mid = Some(jitter),
            GpuTier::Low => by_tier.low = Some(jitter),
        }
        self
    }

    /// Replaces the blocked extension list.
    pub fn with_blocked_extensions<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions.blocked_extensions = names.into_iter().map(Into::into).collect();
        self
    }

    /// Enables or disables one feature.
    pub fn with_feature(mut self, feature: Feature, enabled: bool) -> Self {
        match feature {
            Feature::Parameters => self.parameters.enabled = enabled,
            Feature::Extensions => self.extensions.enabled = enabled,
            Feature::DrawCalls => self.draw_calls.enabled = enabled,
            Feature::Readback => self.readback.enabled = enabled,
        }
        self
    }

    /// Enables or disables draw-call noise.
    pub fn with_draw_calls(self, enabled: bool) -> Self {
        self.with_feature(Feature::DrawCalls, enabled)
    }

    /// Sets the readback pixel jitter and alpha inclusion.
    pub fn with_pixel_jitter(mut self, jitter: u32, include_alpha: bool) -> Self {
        self.readback.pixel_jitter = jitter;
        self.readback.include_alpha = include_alpha;
        self
    }

    /// Replaces the compatibility host list.
    pub fn with_compatibility_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.compatibility.hosts = hosts.into_iter().map(Into::into).collect();
        self
    }

    /// Enables debug diagnostics.
    pub fn with_debug(mut self, debug: DebugSettings) -> Self {
        self.debug = debug;
        self
    }
}

/// CLI argument structure for parsing command line options.
///
/// All fields are optional to allow partial overrides.
#[derive(Debug, Default, Clone)]
pub struct CliArgs {
    /// Session seed.
    pub seed: Option<String>,
    /// Profile catalog path.
    pub profile_path: Option<PathBuf>,
    /// Preferred GPU vendor.
    pub preferred_vendor: Option<GpuVendor>,
    /// Preferred GPU tier.
    pub preferred_tier: Option<GpuTier>,
    /// Master switch.
    pub enabled: Option<bool>,
    /// Draw-call noise.
    pub draw_calls: Option<bool>,
    /// Debug diagnostics.
    pub debug: Option<bool>,
    /// Configuration file path.
    pub config_file: Option<PathBuf>,
}

impl CliArgs {
    /// Creates an empty CliArgs instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the final configuration by applying the full precedence chain.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use webgl_shield::config::CliArgs;
    ///
    /// let args = CliArgs {
    ///     config_file: Some("shield.toml".into()),
    ///     seed: Some("42".to_string()),
    ///     ..Default::default()
    /// };
    ///
    /// let config = args.load_config().unwrap();
    /// ```
    pub fn load_config(&self) -> Result<ShieldConfig, ConfigError> {
        let mut config = if let Some(ref config_file) = self.config_file {
            ShieldConfig::from_file(config_file)?
        } else {
            ShieldConfig::default()
        };

        config = config.merge_with_env();
        config = config.merge_with_args(self);
        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = ShieldConfig::default();
        assert!(config.enabled);
        assert!(config.seed.is_none());
        assert!(config.parameters.enabled);
        assert_eq!(config.parameters.jitter_percent, 0.03);
        assert!(config.extensions.enabled);
        assert_eq!(config.extensions.blocked_extensions.len(), 3);
        assert!(!config.draw_calls.enabled);
        assert_eq!(config.draw_calls.noise_granularity, 64);
        assert_eq!(config.draw_calls.significant_vertex_count, 10);
        assert!(config.readback.enabled);
        assert_eq!(config.readback.pixel_jitter, 3);
        assert!(!config.readback.include_alpha);
        assert_eq!(config.compatibility.hosts.len(), 3);
        assert!(!config.debug.enabled);
    }

    #[test]
    fn test_master_switch_gates_features() {
        let config = ShieldConfig::default().with_enabled(false);
        for feature in Feature::ALL {
            assert!(!config.is_enabled(feature));
        }

        let config = ShieldConfig::default();
        assert!(config.is_enabled(Feature::Parameters));
        assert!(!config.is_enabled(Feature::DrawCalls));
    }

    #[test]
    fn test_tier_jitter_falls_back() {
        let mut config = ShieldConfig::default();
        assert_eq!(config.jitter_for_tier(GpuTier::High), 0.02);
        assert_eq!(config.jitter_for_tier(GpuTier::Low), 0.05);

        config.parameters.jitter_by_tier.mid = None;
        config.parameters.jitter_percent = 0.07;
        assert_eq!(config.jitter_for_tier(GpuTier::Mid), 0.07);
    }

    #[test]
    fn test_partial_json_merges_over_defaults() {
        let config = ShieldConfig::from_json(
            r#"{"seed": "abc", "parameters": {"jitter_by_tier": {"high": 0.01}}, "unknown": 1}"#,
        )
        .unwrap();

        assert_eq!(config.seed, Some(Seed::Text("abc".into())));
        assert_eq!(config.jitter_for_tier(GpuTier::High), 0.01);
        assert_eq!(config.jitter_for_tier(GpuTier::Mid), 0.03);
        assert!(config.parameters.enabled);
        assert_eq!(config.readback.pixel_jitter, 3);
    }

    #[test]
    fn test_numeric_seed_parses_as_number() {
        let config = ShieldConfig::from_json(r#"{"seed": 12345}"#).unwrap();
        assert_eq!(config.seed, Some(Seed::Number(12345)));
    }

    #[test]
    fn test_seed_overrides_keep_numeric_seeds() {
        let config = ShieldConfig::default()
            .merge_with_lookup(|key| (key == "SEED").then(|| "77".to_string()));
        assert_eq!(config.seed, Some(Seed::Number(77)));

        let args = CliArgs {
            seed: Some("text-seed".to_string()),
            ..Default::default()
        };
        let config = config.merge_with_args(&args);
        assert_eq!(config.seed, Some(Seed::Text("text-seed".to_string())));
    }

    #[test]
    fn test_validation_rejects_out_of_range() {
        let mut config = ShieldConfig::default();
        config.parameters.jitter_percent = 1.5;
        assert!(config.validate().is_err());

        let mut config = ShieldConfig::default();
        config.draw_calls.noise_granularity = 0;
        assert!(config.validate().is_err());

        let config = ShieldConfig::default().with_pixel_jitter(300, false);
        assert!(config.validate().is_err());

        let config = ShieldConfig::default().with_preferred_vendor(GpuVendor::Generic);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_lookup_overrides() {
        let vars: HashMap<&str, &str> = [
            ("SEED", "42"),
            ("BLOCKED_EXTENSIONS", "A, B,,C"),
            ("DRAW_CALLS_ENABLED", "1"),
            ("PREFERRED_TIER", "low"),
            ("PIXEL_JITTER", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let config =
            ShieldConfig::default().merge_with_lookup(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.seed, Some(Seed::Number(42)));
        assert_eq!(config.extensions.blocked_extensions, vec!["A", "B", "C"]);
        assert!(config.draw_calls.enabled);
        assert_eq!(config.profile.preferred_tier, Some(GpuTier::Low));
        assert_eq!(config.readback.pixel_jitter, 3);
    }

    #[test]
    fn test_cli_args_merge() {
        let args = CliArgs {
            preferred_vendor: Some(GpuVendor::Amd),
            draw_calls: Some(true),
            ..Default::default()
        };

        let config = ShieldConfig::default().merge_with_args(&args);
        assert_eq!(config.profile.preferred_vendor, Some(GpuVendor::Amd));
        assert!(config.draw_calls.enabled);
        assert!(config.readback.enabled);
    }

    #[test]
    fn test_vendor_and_tier_parsing() {
        assert_eq!("NVIDIA".parse::<GpuVendor>().unwrap(), GpuVendor::Nvidia);
        assert_eq!("medium".parse::<GpuTier>().unwrap(), GpuTier::Mid);
        assert!("matrox".parse::<GpuVendor>().is_err());
        assert!("ultra".parse::<GpuTier>().is_err());
    }

    #[test]
    fn test_toml_serialization() {
        let config = ShieldConfig::default().with_seed("toml-seed");
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: ShieldConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(config, parsed);
    }
}
