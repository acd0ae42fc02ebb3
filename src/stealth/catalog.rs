//! Profile Catalog
//!
//! Base GPU identity templates the session profile is drawn from. A catalog is
//! an ordered JSON array of records in the format browser fingerprint
//! collectors export:
//!
//! ```json
//! [{
//!   "Vendor": "WebKit",
//!   "Renderer": "WebKit WebGL",
//!   "UnmaskedVendor": "Google Inc. (NVIDIA)",
//!   "UnmaskedRenderer": "ANGLE (NVIDIA, NVIDIA GeForce GTX 1060 Direct3D11 vs_5_0 ps_5_0, D3D11)",
//!   "Version": "WebGL 1.0 (OpenGL ES 2.0 Chromium)",
//!   "Version2": "WebGL 2.0 (OpenGL ES 3.0 Chromium)",
//!   "ShadingLanguage": "WebGL GLSL ES 1.0 (OpenGL ES GLSL ES 1.0 Chromium)",
//!   "ShadingLanguage2": "WebGL GLSL ES 3.00 (OpenGL ES GLSL ES 3.0 Chromium)"
//! }]
//! ```
//!
//! Loading never fails initialization: [`load_or_fallback`] substitutes the
//! built-in templates for a missing, malformed, or empty catalog.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors reading a profile catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Failed to read profile catalog {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse profile catalog: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Profile catalog is empty")]
    Empty,
}

/// A base GPU identity record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProfileTemplate {
    pub vendor: String,
    pub renderer: String,
    #[serde(default)]
    pub unmasked_vendor: String,
    #[serde(default)]
    pub unmasked_renderer: String,
    pub version: String,
    /// Present when the GPU supports WebGL2.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version2: Option<String>,
    pub shading_language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shading_language2: Option<String>,
}

const CHROMIUM_VENDOR: &str = "WebKit";
const CHROMIUM_RENDERER: &str = "WebKit WebGL";
const CHROMIUM_VERSION: &str = "WebGL 1.0 (OpenGL ES 2.0 Chromium)";
const CHROMIUM_VERSION2: &str = "WebGL 2.0 (OpenGL ES 3.0 Chromium)";
const CHROMIUM_GLSL: &str = "WebGL GLSL ES 1.0 (OpenGL ES GLSL ES 1.0 Chromium)";
const CHROMIUM_GLSL2: &str = "WebGL GLSL ES 3.00 (OpenGL ES GLSL ES 3.0 Chromium)";

impl ProfileTemplate {
    /// A Chromium-on-ANGLE template with WebGL2 support.
    pub fn chromium(unmasked_vendor: impl Into<String>, unmasked_renderer: impl Into<String>) -> Self {
        Self {
            vendor: CHROMIUM_VENDOR.to_string(),
            renderer: CHROMIUM_RENDERER.to_string(),
            unmasked_vendor: unmasked_vendor.into(),
            unmasked_renderer: unmasked_renderer.into(),
            version: CHROMIUM_VERSION.to_string(),
            version2: Some(CHROMIUM_VERSION2.to_string()),
            shading_language: CHROMIUM_GLSL.to_string(),
            shading_language2: Some(CHROMIUM_GLSL2.to_string()),
        }
    }

    /// Drops the WebGL2 identity strings.
    pub fn without_webgl2(mut self) -> Self {
        self.version2 = None;
        self.shading_language2 = None;
        self
    }

    pub fn has_webgl2(&self) -> bool {
        self.version2.is_some()
    }
}

/// Source of base templates.
#[async_trait]
pub trait ProfileSource: Send + Sync {
    /// Loads the ordered template list.
    async fn load(&self) -> Result<Vec<ProfileTemplate>, CatalogError>;

    /// Human readable origin, used in diagnostics.
    fn describe(&self) -> String;
}

/// Catalog read from a JSON file.
#[derive(Debug, Clone)]
pub struct FileCatalog {
    path: PathBuf,
}

impl FileCatalog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ProfileSource for FileCatalog {
    async fn load(&self) -> Result<Vec<ProfileTemplate>, CatalogError> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| CatalogError::Io {
                path: self.path.clone(),
                source,
            })?;
        let templates: Vec<ProfileTemplate> = serde_json::from_str(&content)?;
        if templates.is_empty() {
            return Err(CatalogError::Empty);
        }
        Ok(templates)
    }

    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }
}

/// The built-in templates.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinCatalog;

impl BuiltinCatalog {
    pub fn templates() -> Vec<ProfileTemplate> {
        vec![
            ProfileTemplate::chromium(
                "Google Inc. (NVIDIA)",
                "ANGLE (NVIDIA, NVIDIA GeForce GTX 1060 Direct3D11 vs_5_0 ps_5_0, D3D11)",
            ),
            ProfileTemplate::chromium(
                "Google Inc. (Intel)",
                "ANGLE (Intel, Intel(R) UHD Graphics 630 Direct3D11 vs_5_0 ps_5_0)",
            ),
            ProfileTemplate::chromium(
                "Google Inc. (NVIDIA)",
                "ANGLE (NVIDIA, NVIDIA GeForce RTX 3080 Direct3D11 vs_5_0 ps_5_0, D3D11)",
            ),
            ProfileTemplate::chromium(
                "Google Inc. (AMD)",
                "ANGLE (AMD, AMD Radeon RX 6800 XT Direct3D11 vs_5_0 ps_5_0, D3D11)",
            ),
            ProfileTemplate::chromium(
                "Google Inc. (AMD)",
                "ANGLE (AMD, AMD Radeon RX 580 Series Direct3D11 vs_5_0 ps_5_0, D3D11)",
            ),
            ProfileTemplate::chromium(
                "Google Inc. (Intel)",
                "ANGLE (Intel, Intel(R) Iris(R) Xe Graphics Direct3D11 vs_5_0 ps_5_0, D3D11)",
            ),
        ]
    }
}

#[async_trait]
impl ProfileSource for BuiltinCatalog {
    async fn load(&self) -> Result<Vec<ProfileTemplate>, CatalogError> {
        Ok(Self::templates())
    }

    fn describe(&self) -> String {
        "built-in catalog".to_string()
    }
}

/// Loads templates, falling back to the built-in set on any failure.
pub async fn load_or_fallback(source: &dyn ProfileSource) -> Vec<ProfileTemplate> {
    match source.load().await {
        Ok(templates) if !templates.is_empty() => {
            debug!(
                "Loaded {} profile templates from {}",
                templates.len(),
                source.describe()
            );
            templates
        }
        Ok(_) => {
            warn!(
                "Profile catalog from {} is empty, using built-in profiles",
                source.describe()
            );
            BuiltinCatalog::templates()
        }
        Err(e) => {
            warn!("{}, using built-in profiles", e);
            BuiltinCatalog::templates()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_template_json_keys() {
        let json = serde_json::to_value(ProfileTemplate::chromium("V", "R")).unwrap();
        assert_eq!(json["UnmaskedRenderer"], "R");
        assert_eq!(json["ShadingLanguage2"], CHROMIUM_GLSL2);

        let legacy: ProfileTemplate = serde_json::from_str(
            r#"{"Vendor":"WebKit","Renderer":"WebKit WebGL","Version":"WebGL 1.0","ShadingLanguage":"GLSL"}"#,
        )
        .unwrap();
        assert!(!legacy.has_webgl2());
        assert!(legacy.unmasked_renderer.is_empty());
    }

    #[tokio::test]
    async fn test_file_catalog_loads() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let templates = vec![ProfileTemplate::chromium("Google Inc. (AMD)", "AMD Radeon RX 7900")];
        write!(file, "{}", serde_json::to_string(&templates).unwrap()).unwrap();

        let loaded = FileCatalog::new(file.path()).load().await.unwrap();
        assert_eq!(loaded, templates);
    }

    #[tokio::test]
    async fn test_missing_file_falls_back() {
        let source = FileCatalog::new("/nonexistent/webgl.json");
        assert!(matches!(source.load().await, Err(CatalogError::Io { .. })));
        assert_eq!(load_or_fallback(&source).await, BuiltinCatalog::templates());
    }

    #[tokio::test]
    async fn test_malformed_and_empty_fall_back() {
        let mut malformed = tempfile::NamedTempFile::new().unwrap();
        write!(malformed, "{{not json").unwrap();
        let source = FileCatalog::new(malformed.path());
        assert!(matches!(source.load().await, Err(CatalogError::Json(_))));
        assert_eq!(load_or_fallback(&source).await.len(), BuiltinCatalog::templates().len());

        let mut empty = tempfile::NamedTempFile::new().unwrap();
        write!(empty, "[]").unwrap();
        let source = FileCatalog::new(empty.path());
        assert!(matches!(source.load().await, Err(CatalogError::Empty)));
    }
}
