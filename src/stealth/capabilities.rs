//! GPU capability tables.
//!
//! Data-driven vendor and tier classification plus the parameter and
//! extension sets each class reports. Classification is total: every
//! vendor/renderer pair lands on some vendor (possibly `Generic`) and some
//! tier (default `Mid`).

use crate::config::{GpuTier, GpuVendor};
use crate::host::gl::{self, GlEnum};
use crate::host::GlValue;
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use std::collections::BTreeMap;

/// A capability value from the tables.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CapabilityValue {
    Scalar(f64),
    Array(Vec<f64>),
}

impl CapabilityValue {
    /// Renders the value the way `getParameter` reports it for `pname`.
    pub fn to_gl_value(&self, pname: GlEnum) -> GlValue {
        match self {
            CapabilityValue::Scalar(v) if v.fract() == 0.0 => GlValue::Int(*v as i64),
            CapabilityValue::Scalar(v) => GlValue::Float(*v),
            CapabilityValue::Array(values) if gl::is_float_range(pname) => {
                GlValue::Float32Array(values.iter().map(|v| *v as f32).collect())
            }
            CapabilityValue::Array(values) => {
                GlValue::Int32Array(values.iter().map(|v| *v as i32).collect())
            }
        }
    }
}

/// Capability name to value.
pub type CapabilityTable = BTreeMap<String, CapabilityValue>;

/// Result of classifying a renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GpuClass {
    pub vendor: GpuVendor,
    pub tier: GpuTier,
    /// Whether a tier pattern actually matched; unmatched classes use the
    /// default capability set.
    pub matched: bool,
}

/// Per-tier figures that distinguish the capability tables.
#[derive(Debug, Clone, Copy)]
struct TierSpec {
    max_texture: u32,
    max_point_size: f64,
    /// `(vertex/fragment uniform blocks, combined uniform blocks)`, or `None`
    /// when the tier has no WebGL2.
    uniform_blocks: Option<(u32, u32)>,
}

struct TierPattern {
    tier: GpuTier,
    pattern: Option<Regex>,
    spec: TierSpec,
}

struct VendorTable {
    vendor: GpuVendor,
    pattern: Option<Regex>,
    tiers: Vec<TierPattern>,
    extensions: &'static [&'static str],
    webgl2_extensions: &'static [&'static str],
}

const DEFAULT_SPEC: TierSpec = TierSpec {
    max_texture: 8192,
    max_point_size: 255.875,
    uniform_blocks: Some((12, 24)),
};

const COMMON_EXTENSIONS: &[&str] = &[
    "ANGLE_instanced_arrays",
    "EXT_blend_minmax",
    "EXT_color_buffer_half_float",
    "EXT_float_blend",
    "OES_element_index_uint",
    "OES_standard_derivatives",
    "OES_texture_float",
    "OES_texture_float_linear",
    "OES_texture_half_float",
    "OES_texture_half_float_linear",
    "OES_vertex_array_object",
    "WEBGL_color_buffer_float",
    "WEBGL_lose_context",
];

const COMMON_WEBGL2_EXTENSIONS: &[&str] = &[
    "EXT_color_buffer_float",
    "EXT_disjoint_timer_query_webgl2",
    "EXT_texture_filter_anisotropic",
    "OES_draw_buffers_indexed",
    "WEBGL_compressed_texture_s3tc",
    "WEBGL_compressed_texture_s3tc_srgb",
    "WEBGL_debug_shaders",
    "WEBGL_lose_context",
];

const DISCRETE_EXTENSIONS: &[&str] = &[
    "EXT_texture_filter_anisotropic",
    "WEBGL_compressed_texture_s3tc",
    "WEBGL_compressed_texture_s3tc_srgb",
    "WEBGL_debug_shaders",
];

const INTEL_EXTENSIONS: &[&str] = &[
    "EXT_texture_filter_anisotropic",
    "WEBGL_compressed_texture_s3tc",
];

const NVIDIA_WEBGL2_EXTENSIONS: &[&str] = &[
    "WEBGL_compressed_texture_astc",
    "WEBGL_compressed_texture_etc",
    "WEBGL_compressed_texture_pvrtc",
];

const AMD_WEBGL2_EXTENSIONS: &[&str] = &[
    "WEBGL_compressed_texture_astc",
    "WEBGL_compressed_texture_etc",
];

/// Compiles a case-insensitive table pattern. `None` never matches.
fn pattern(source: &str) -> Option<Regex> {
    RegexBuilder::new(source).case_insensitive(true).build().ok()
}

fn is_match(pattern: &Option<Regex>, text: &str) -> bool {
    pattern.as_ref().map(|re| re.is_match(text)).unwrap_or(false)
}

fn tier(
    tier: GpuTier,
    source: &str,
    max_texture: u32,
    max_point_size: f64,
    uniform_blocks: Option<(u32, u32)>,
) -> TierPattern {
    TierPattern {
        tier,
        pattern: pattern(source),
        spec: TierSpec {
            max_texture,
            max_point_size,
            uniform_blocks,
        },
    }
}

static VENDOR_TABLES: Lazy<Vec<VendorTable>> = Lazy::new(|| {
    vec![
        VendorTable {
            vendor: GpuVendor::Nvidia,
            pattern: pattern(r"nvidia|geforce|quadro"),
            tiers: vec![
                tier(GpuTier::High, r"RTX 30|RTX 40|RTX 20|GTX 16", 32768, 2047.5, Some((16, 32))),
                tier(GpuTier::Mid, r"GTX 10|GTX 9", 16384, 1023.75, Some((14, 28))),
                tier(GpuTier::Low, r"GT [1-9]|GTS|GTX [1-8]", 8192, 511.875, Some((12, 24))),
            ],
            extensions: DISCRETE_EXTENSIONS,
            webgl2_extensions: NVIDIA_WEBGL2_EXTENSIONS,
        },
        VendorTable {
            vendor: GpuVendor::Amd,
            pattern: pattern(r"\bamd\b|radeon|\bati\b"),
            tiers: vec![
                tier(GpuTier::High, r"RX 6|RX 7|Radeon VII", 16384, 2047.5, Some((15, 30))),
                tier(GpuTier::Mid, r"RX 5|RX 4|R9", 16384, 1023.75, Some((14, 28))),
                tier(GpuTier::Low, r"HD|R[1-8]", 8192, 511.875, Some((12, 24))),
            ],
            extensions: DISCRETE_EXTENSIONS,
            webgl2_extensions: AMD_WEBGL2_EXTENSIONS,
        },
        VendorTable {
            vendor: GpuVendor::Intel,
            pattern: pattern(r"intel"),
            tiers: vec![
                tier(GpuTier::High, r"Iris Xe|UHD 6|Iris Plus", 16384, 255.875, Some((12, 24))),
                tier(GpuTier::Mid, r"Iris|UHD|HD 5|HD 6", 8192, 255.875, Some((12, 24))),
                tier(GpuTier::Low, r"HD 4|HD 3", 8192, 255.875, None),
            ],
            extensions: INTEL_EXTENSIONS,
            webgl2_extensions: &[],
        },
    ]
});

fn vendor_table(vendor: GpuVendor) -> Option<&'static VendorTable> {
    VENDOR_TABLES.iter().find(|table| table.vendor == vendor)
}

/// Identifies the vendor from the unmasked vendor string, then the renderer.
pub fn identify_vendor(unmasked_vendor: &str, unmasked_renderer: &str) -> GpuVendor {
    [unmasked_vendor, unmasked_renderer]
        .iter()
        .find_map(|text| {
            VENDOR_TABLES
                .iter()
                .find(|table| is_match(&table.pattern, text))
                .map(|table| table.vendor)
        })
        .unwrap_or(GpuVendor::Generic)
}

/// Classifies a renderer string within a vendor's tier table.
///
/// Tiers are tried high, mid, low; no match yields `Mid` with
/// `matched == false`.
pub fn classify(unmasked_vendor: &str, unmasked_renderer: &str) -> GpuClass {
    let vendor = identify_vendor(unmasked_vendor, unmasked_renderer);
    let matched_tier = vendor_table(vendor).and_then(|table| {
        table
            .tiers
            .iter()
            .find(|candidate| is_match(&candidate.pattern, unmasked_renderer))
            .map(|candidate| candidate.tier)
    });

    GpuClass {
        vendor,
        tier: matched_tier.unwrap_or(GpuTier::Mid),
        matched: matched_tier.is_some(),
    }
}

fn spec_for(class: GpuClass) -> TierSpec {
    if !class.matched {
        return DEFAULT_SPEC;
    }
    vendor_table(class.vendor)
        .and_then(|table| table.tiers.iter().find(|t| t.tier == class.tier))
        .map(|t| t.spec)
        .unwrap_or(DEFAULT_SPEC)
}

/// WebGL1 capability table for a class.
pub fn webgl1_capabilities(class: GpuClass) -> CapabilityTable {
    let spec = spec_for(class);
    let texture = f64::from(spec.max_texture);
    let mut table = CapabilityTable::new();
    table.insert("MAX_TEXTURE_SIZE".into(), CapabilityValue::Scalar(texture));
    table.insert("MAX_RENDERBUFFER_SIZE".into(), CapabilityValue::Scalar(texture));
    table.insert(
        "MAX_VIEWPORT_DIMS".into(),
        CapabilityValue::Array(vec![texture, texture]),
    );
    table.insert(
        "ALIASED_LINE_WIDTH_RANGE".into(),
        CapabilityValue::Array(vec![1.0, 1.0]),
    );
    table.insert(
        "ALIASED_POINT_SIZE_RANGE".into(),
        CapabilityValue::Array(vec![1.0, spec.max_point_size]),
    );
    table.insert("MAX_VERTEX_ATTRIBS".into(), CapabilityValue::Scalar(16.0));
    table.insert(
        "MAX_VERTEX_TEXTURE_IMAGE_UNITS".into(),
        CapabilityValue::Scalar(16.0),
    );
    table.insert(
        "MAX_VERTEX_UNIFORM_VECTORS".into(),
        CapabilityValue::Scalar(4096.0),
    );
    table.insert(
        "MAX_FRAGMENT_UNIFORM_VECTORS".into(),
        CapabilityValue::Scalar(1024.0),
    );
    table.insert("MAX_TEXTURE_IMAGE_UNITS".into(), CapabilityValue::Scalar(16.0));
    table
}

/// WebGL2-only capability table, or `None` when the class lacks WebGL2.
pub fn webgl2_capabilities(class: GpuClass) -> Option<CapabilityTable> {
    let (blocks, combined) = spec_for(class).uniform_blocks?;
    let mut table = CapabilityTable::new();
    table.insert(
        "MAX_ELEMENT_INDEX".into(),
        CapabilityValue::Scalar(4_294_967_294.0),
    );
    table.insert(
        "MAX_UNIFORM_BLOCK_SIZE".into(),
        CapabilityValue::Scalar(65536.0),
    );
    table.insert(
        "MAX_VERTEX_UNIFORM_BLOCKS".into(),
        CapabilityValue::Scalar(f64::from(blocks)),
    );
    table.insert(
        "MAX_FRAGMENT_UNIFORM_BLOCKS".into(),
        CapabilityValue::Scalar(f64::from(blocks)),
    );
    table.insert(
        "MAX_COMBINED_UNIFORM_BLOCKS".into(),
        CapabilityValue::Scalar(f64::from(combined)),
    );
    Some(table)
}

/// Extensions a vendor's GPUs expose on WebGL1.
pub fn extensions(vendor: GpuVendor) -> Vec<String> {
    let extra = vendor_table(vendor).map(|t| t.extensions).unwrap_or(&[]);
    COMMON_EXTENSIONS
        .iter()
        .chain(extra.iter())
        .map(|name| name.to_string())
        .collect()
}

/// Extensions a vendor's GPUs add on WebGL2.
pub fn webgl2_extensions(vendor: GpuVendor) -> Vec<String> {
    let extra = vendor_table(vendor)
        .map(|t| t.webgl2_extensions)
        .unwrap_or(&[]);
    COMMON_WEBGL2_EXTENSIONS
        .iter()
        .chain(extra.iter())
        .map(|name| name.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_known_renderers() {
        let class = classify(
            "Google Inc. (NVIDIA)",
            "ANGLE (NVIDIA, NVIDIA GeForce GTX 1060 Direct3D11 vs_5_0 ps_5_0, D3D11)",
        );
        assert_eq!(class.vendor, GpuVendor::Nvidia);
        assert_eq!(class.tier, GpuTier::Mid);
        assert!(class.matched);

        let class = classify(
            "Google Inc. (NVIDIA)",
            "ANGLE (NVIDIA, NVIDIA GeForce RTX 3080 Direct3D11 vs_5_0 ps_5_0, D3D11)",
        );
        assert_eq!(class.tier, GpuTier::High);

        let class = classify(
            "Google Inc. (AMD)",
            "ANGLE (AMD, AMD Radeon RX 6800 XT Direct3D11 vs_5_0 ps_5_0, D3D11)",
        );
        assert_eq!((class.vendor, class.tier), (GpuVendor::Amd, GpuTier::High));

        let class = classify(
            "Google Inc. (Intel)",
            "ANGLE (Intel, Intel(R) UHD Graphics 630 Direct3D11 vs_5_0 ps_5_0)",
        );
        assert_eq!((class.vendor, class.tier), (GpuVendor::Intel, GpuTier::Mid));
    }

    #[test]
    fn test_vendor_falls_back_to_renderer() {
        let class = classify("", "Intel HD 4600");
        assert_eq!(class.vendor, GpuVendor::Intel);
        assert_eq!(class.tier, GpuTier::Low);
    }

    #[test]
    fn test_unknown_renderer_is_generic_mid() {
        let class = classify("Apple Inc.", "Apple M2");
        assert_eq!(class.vendor, GpuVendor::Generic);
        assert_eq!(class.tier, GpuTier::Mid);
        assert!(!class.matched);

        let table = webgl1_capabilities(class);
        assert_eq!(
            table.get("MAX_TEXTURE_SIZE"),
            Some(&CapabilityValue::Scalar(8192.0))
        );
    }

    #[test]
    fn test_unmatched_tier_uses_defaults() {
        let class = classify("Google Inc. (NVIDIA)", "NVIDIA Quadro P4000");
        assert_eq!(class.vendor, GpuVendor::Nvidia);
        assert!(!class.matched);
        assert_eq!(
            webgl1_capabilities(class).get("ALIASED_POINT_SIZE_RANGE"),
            Some(&CapabilityValue::Array(vec![1.0, 255.875]))
        );
    }

    #[test]
    fn test_old_intel_has_no_webgl2() {
        let class = classify("Intel Inc.", "Intel HD 3000");
        assert_eq!(class.tier, GpuTier::Low);
        assert!(webgl2_capabilities(class).is_none());
    }

    #[test]
    fn test_all_patterns_compile() {
        for table in VENDOR_TABLES.iter() {
            assert!(table.pattern.is_some());
            assert!(table.tiers.iter().all(|t| t.pattern.is_some()));
        }
    }

    #[test]
    fn test_tables_use_known_capability_names() {
        let class = classify("NVIDIA", "RTX 4090");
        let names = webgl1_capabilities(class)
            .into_keys()
            .chain(webgl2_capabilities(class).unwrap_or_default().into_keys());
        for name in names {
            assert!(gl::capability_enum(&name).is_some(), "{}", name);
        }
    }

    #[test]
    fn test_vendor_extensions() {
        let nvidia = webgl2_extensions(GpuVendor::Nvidia);
        assert!(nvidia.contains(&"WEBGL_compressed_texture_pvrtc".to_string()));
        let generic = extensions(GpuVendor::Generic);
        assert_eq!(generic.len(), COMMON_EXTENSIONS.len());
    }

    #[test]
    fn test_capability_value_rendering() {
        assert_eq!(
            CapabilityValue::Scalar(16384.0).to_gl_value(gl::MAX_TEXTURE_SIZE),
            GlValue::Int(16384)
        );
        assert_eq!(
            CapabilityValue::Array(vec![1.0, 2047.5]).to_gl_value(gl::ALIASED_POINT_SIZE_RANGE),
            GlValue::Float32Array(vec![1.0, 2047.5])
        );
        assert_eq!(
            CapabilityValue::Array(vec![4096.0, 4096.0]).to_gl_value(gl::MAX_VIEWPORT_DIMS),
            GlValue::Int32Array(vec![4096, 4096])
        );
    }
}
