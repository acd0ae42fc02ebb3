//! Capability Profile
//!
//! The synthetic GPU a session presents: identity strings from a catalog
//! template plus the parameter and extension tables for the template's
//! vendor/tier class. A profile is selected once per session with the session
//! generator and never changes afterwards.

use crate::config::{GpuTier, GpuVendor, ProfileSettings};
use crate::host::gl::{self, GlEnum};
use crate::host::ContextKind;
use crate::stealth::capabilities::{self, CapabilityTable, CapabilityValue, GpuClass};
use crate::stealth::catalog::{BuiltinCatalog, ProfileTemplate};
use crate::stealth::prng::SessionRng;
use serde::Serialize;
use tracing::debug;

/// The active synthetic GPU.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub vendor: String,
    pub renderer: String,
    pub unmasked_vendor: String,
    pub unmasked_renderer: String,
    pub version: String,
    pub version2: Option<String>,
    pub shading_language: String,
    pub shading_language2: Option<String>,
    pub class: GpuClass,
    pub supports_webgl2: bool,
    /// WebGL1 capability table.
    pub parameters: CapabilityTable,
    /// WebGL2-only capability table, merged over `parameters` for WebGL2
    /// contexts.
    pub webgl2_parameters: CapabilityTable,
    pub extensions: Vec<String>,
    pub webgl2_extensions: Vec<String>,
}

/// Status view of a profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileSummary {
    pub vendor: GpuVendor,
    pub tier: GpuTier,
    #[serde(rename = "webgl2Support")]
    pub webgl2_support: bool,
    #[serde(rename = "unmaskedRenderer")]
    pub unmasked_renderer: String,
}

impl Profile {
    /// Builds a profile by classifying a template.
    pub fn from_template(template: &ProfileTemplate) -> Self {
        let class = capabilities::classify(&template.unmasked_vendor, &template.unmasked_renderer);
        let webgl2_parameters = capabilities::webgl2_capabilities(class);
        let supports_webgl2 = template.has_webgl2() && webgl2_parameters.is_some();

        Self {
            vendor: template.vendor.clone(),
            renderer: template.renderer.clone(),
            unmasked_vendor: template.unmasked_vendor.clone(),
            unmasked_renderer: template.unmasked_renderer.clone(),
            version: template.version.clone(),
            version2: template.version2.clone(),
            shading_language: template.shading_language.clone(),
            shading_language2: template.shading_language2.clone(),
            class,
            supports_webgl2,
            parameters: capabilities::webgl1_capabilities(class),
            webgl2_parameters: webgl2_parameters.unwrap_or_default(),
            extensions: capabilities::extensions(class.vendor),
            webgl2_extensions: if supports_webgl2 {
                capabilities::webgl2_extensions(class.vendor)
            } else {
                Vec::new()
            },
        }
    }

    pub fn gpu_vendor(&self) -> GpuVendor {
        self.class.vendor
    }

    pub fn gpu_tier(&self) -> GpuTier {
        self.class.tier
    }

    /// Identity string for one of the six identity queries.
    ///
    /// WebGL2 contexts see the `Version2`/`ShadingLanguage2` strings when the
    /// template carries them.
    pub fn identity(&self, pname: GlEnum, kind: ContextKind) -> Option<&str> {
        match pname {
            gl::VENDOR => Some(&self.vendor),
            gl::RENDERER => Some(&self.renderer),
            gl::UNMASKED_VENDOR_WEBGL => Some(&self.unmasked_vendor),
            gl::UNMASKED_RENDERER_WEBGL => Some(&self.unmasked_renderer),
            gl::VERSION => Some(match (&self.version2, kind) {
                (Some(v2), ContextKind::WebGl2) => v2,
                _ => &self.version,
            }),
            gl::SHADING_LANGUAGE_VERSION => Some(match (&self.shading_language2, kind) {
                (Some(v2), ContextKind::WebGl2) => v2,
                _ => &self.shading_language,
            }),
            _ => None,
        }
    }

    /// Looks up a capability by name; WebGL2 entries win on WebGL2 contexts.
    pub fn parameter(&self, name: &str, kind: ContextKind) -> Option<&CapabilityValue> {
        if kind.is_webgl2() {
            if let Some(value) = self.webgl2_parameters.get(name) {
                return Some(value);
            }
        }
        self.parameters.get(name)
    }

    /// The merged table a context of `kind` sees.
    pub fn parameter_table(&self, kind: ContextKind) -> CapabilityTable {
        let mut table = self.parameters.clone();
        if kind.is_webgl2() {
            table.extend(
                self.webgl2_parameters
                    .iter()
                    .map(|(name, value)| (name.clone(), value.clone())),
            );
        }
        table
    }

    /// Extension names a context of `kind` may expose.
    pub fn extension_list(&self, kind: ContextKind) -> Vec<&str> {
        let mut names: Vec<&str> = self.extensions.iter().map(String::as_str).collect();
        if kind.is_webgl2() {
            for name in &self.webgl2_extensions {
                if !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
        }
        names
    }

    pub fn summary(&self) -> ProfileSummary {
        ProfileSummary {
            vendor: self.class.vendor,
            tier: self.class.tier,
            webgl2_support: self.supports_webgl2,
            unmasked_renderer: self.unmasked_renderer.clone(),
        }
    }
}

/// Picks the session profile from `templates`.
///
/// Preferred vendor and tier narrow the candidates first; if nothing
/// survives the narrowing the whole catalog is used. An empty catalog selects
/// from the built-in templates.
pub fn select_profile(
    templates: &[ProfileTemplate],
    rng: &mut SessionRng,
    preferences: &ProfileSettings,
) -> Profile {
    let builtin;
    let templates = if templates.is_empty() {
        builtin = BuiltinCatalog::templates();
        &builtin[..]
    } else {
        templates
    };

    let candidates: Vec<Profile> = templates.iter().map(Profile::from_template).collect();
    let preferred: Vec<&Profile> = candidates
        .iter()
        .filter(|p| preferences.preferred_vendor.map_or(true, |v| p.class.vendor == v))
        .filter(|p| preferences.preferred_tier.map_or(true, |t| p.class.tier == t))
        .collect();

    let pool: Vec<&Profile> = if preferred.is_empty() {
        if preferences.preferred_vendor.is_some() || preferences.preferred_tier.is_some() {
            debug!("No catalog entry matches the preferred vendor/tier, using the full catalog");
        }
        candidates.iter().collect()
    } else {
        preferred
    };

    let index = ((rng.random() * pool.len() as f64).floor() as usize).min(pool.len() - 1);
    pool[index].clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stealth::prng::Seed;

    fn nvidia_template() -> ProfileTemplate {
        ProfileTemplate::chromium(
            "Google Inc. (NVIDIA)",
            "ANGLE (NVIDIA, NVIDIA GeForce GTX 1060 Direct3D11 vs_5_0 ps_5_0, D3D11)",
        )
    }

    #[test]
    fn test_profile_from_template() {
        let profile = Profile::from_template(&nvidia_template());
        assert_eq!(profile.gpu_vendor(), GpuVendor::Nvidia);
        assert_eq!(profile.gpu_tier(), GpuTier::Mid);
        assert!(profile.supports_webgl2);
        assert_eq!(
            profile.parameter("MAX_TEXTURE_SIZE", ContextKind::WebGl),
            Some(&CapabilityValue::Scalar(16384.0))
        );
        assert!(profile.parameter("MAX_VERTEX_UNIFORM_BLOCKS", ContextKind::WebGl).is_none());
        assert!(profile
            .parameter("MAX_VERTEX_UNIFORM_BLOCKS", ContextKind::WebGl2)
            .is_some());
    }

    #[test]
    fn test_webgl2_identity_strings() {
        let profile = Profile::from_template(&nvidia_template());
        let v1 = profile.identity(gl::VERSION, ContextKind::WebGl).unwrap();
        let v2 = profile.identity(gl::VERSION, ContextKind::WebGl2).unwrap();
        assert!(v1.starts_with("WebGL 1.0"));
        assert!(v2.starts_with("WebGL 2.0"));
        assert_eq!(
            profile.identity(gl::UNMASKED_VENDOR_WEBGL, ContextKind::WebGl2),
            Some("Google Inc. (NVIDIA)")
        );
        assert_eq!(profile.identity(gl::MAX_TEXTURE_SIZE, ContextKind::WebGl), None);
    }

    #[test]
    fn test_template_without_webgl2() {
        let profile = Profile::from_template(&nvidia_template().without_webgl2());
        assert!(!profile.supports_webgl2);
        assert!(profile.webgl2_extensions.is_empty());
        assert!(profile
            .identity(gl::VERSION, ContextKind::WebGl2)
            .unwrap()
            .starts_with("WebGL 1.0"));
    }

    #[test]
    fn test_low_tier_denies_webgl2_despite_template() {
        let template = ProfileTemplate::chromium("Intel Inc.", "Intel HD 4600");
        assert!(template.has_webgl2());
        assert!(!Profile::from_template(&template).supports_webgl2);
    }

    #[test]
    fn test_merged_table_and_extension_list() {
        let profile = Profile::from_template(&nvidia_template());
        let webgl = profile.parameter_table(ContextKind::WebGl);
        let webgl2 = profile.parameter_table(ContextKind::WebGl2);
        assert!(webgl2.len() > webgl.len());
        assert!(profile.extension_list(ContextKind::WebGl2).len() > profile.extension_list(ContextKind::WebGl).len());

        let list = profile.extension_list(ContextKind::WebGl2);
        let mut deduped = list.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(deduped.len(), list.len());
    }

    #[test]
    fn test_selection_is_deterministic() {
        let templates = BuiltinCatalog::templates();
        let prefs = ProfileSettings::default();
        let a = select_profile(&templates, &mut SessionRng::from_seed(Seed::from("s")), &prefs);
        let b = select_profile(&templates, &mut SessionRng::from_seed(Seed::from("s")), &prefs);
        assert_eq!(a, b);
    }

    #[test]
    fn test_preferences_narrow_selection() {
        let templates = BuiltinCatalog::templates();
        let prefs = ProfileSettings {
            preferred_vendor: Some(GpuVendor::Amd),
            preferred_tier: Some(GpuTier::High),
            ..Default::default()
        };
        for i in 0..20 {
            let mut rng = SessionRng::from_seed(Seed::Number(i));
            let profile = select_profile(&templates, &mut rng, &prefs);
            assert_eq!(profile.gpu_vendor(), GpuVendor::Amd);
            assert_eq!(profile.gpu_tier(), GpuTier::High);
        }
    }

    #[test]
    fn test_unsatisfiable_preferences_use_full_catalog() {
        let templates = vec![nvidia_template()];
        let prefs = ProfileSettings {
            preferred_vendor: Some(GpuVendor::Intel),
            ..Default::default()
        };
        let profile = select_profile(&templates, &mut SessionRng::from_seed(Seed::from("x")), &prefs);
        assert_eq!(profile.gpu_vendor(), GpuVendor::Nvidia);
    }

    #[test]
    fn test_empty_catalog_uses_builtin() {
        let profile = select_profile(
            &[],
            &mut SessionRng::from_seed(Seed::from("empty")),
            &ProfileSettings::default(),
        );
        assert!(!profile.unmasked_renderer.is_empty());
    }
}
