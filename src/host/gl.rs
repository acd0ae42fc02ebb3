//! WebGL enum values used by the interceptors.
//!
//! Only the subset the engine queries, spoofs, or issues itself is listed.

/// A WebGL enum value.
pub type GlEnum = u32;

// Identity strings
pub const VENDOR: GlEnum = 0x1F00;
pub const RENDERER: GlEnum = 0x1F01;
pub const VERSION: GlEnum = 0x1F02;
pub const SHADING_LANGUAGE_VERSION: GlEnum = 0x8B8C;

// WEBGL_debug_renderer_info
pub const UNMASKED_VENDOR_WEBGL: GlEnum = 0x9245;
pub const UNMASKED_RENDERER_WEBGL: GlEnum = 0x9246;

// WebGL1 capability limits
pub const MAX_TEXTURE_SIZE: GlEnum = 0x0D33;
pub const MAX_VIEWPORT_DIMS: GlEnum = 0x0D3A;
pub const MAX_RENDERBUFFER_SIZE: GlEnum = 0x84E8;
pub const MAX_CUBE_MAP_TEXTURE_SIZE: GlEnum = 0x851C;
pub const ALIASED_POINT_SIZE_RANGE: GlEnum = 0x846D;
pub const ALIASED_LINE_WIDTH_RANGE: GlEnum = 0x846E;
pub const MAX_VERTEX_ATTRIBS: GlEnum = 0x8869;
pub const MAX_TEXTURE_IMAGE_UNITS: GlEnum = 0x8872;
pub const MAX_VERTEX_TEXTURE_IMAGE_UNITS: GlEnum = 0x8B4C;
pub const MAX_COMBINED_TEXTURE_IMAGE_UNITS: GlEnum = 0x8B4D;
pub const MAX_VERTEX_UNIFORM_VECTORS: GlEnum = 0x8DFB;
pub const MAX_VARYING_VECTORS: GlEnum = 0x8DFC;
pub const MAX_FRAGMENT_UNIFORM_VECTORS: GlEnum = 0x8DFD;

// WebGL2 capability limits
pub const MAX_3D_TEXTURE_SIZE: GlEnum = 0x8073;
pub const MAX_DRAW_BUFFERS: GlEnum = 0x8824;
pub const MAX_ARRAY_TEXTURE_LAYERS: GlEnum = 0x88FF;
pub const MAX_VERTEX_UNIFORM_BLOCKS: GlEnum = 0x8A2B;
pub const MAX_FRAGMENT_UNIFORM_BLOCKS: GlEnum = 0x8A2D;
pub const MAX_COMBINED_UNIFORM_BLOCKS: GlEnum = 0x8A2E;
pub const MAX_UNIFORM_BLOCK_SIZE: GlEnum = 0x8A30;
pub const MAX_COLOR_ATTACHMENTS: GlEnum = 0x8CDF;
pub const MAX_ELEMENT_INDEX: GlEnum = 0x8D6B;
pub const MAX_SAMPLES: GlEnum = 0x8D57;

// Pipeline state
pub const BLEND: GlEnum = 0x0BE2;
pub const VIEWPORT: GlEnum = 0x0BA2;
pub const BLEND_DST_RGB: GlEnum = 0x80C8;
pub const BLEND_SRC_RGB: GlEnum = 0x80C9;
pub const BLEND_DST_ALPHA: GlEnum = 0x80CA;
pub const BLEND_SRC_ALPHA: GlEnum = 0x80CB;
pub const ACTIVE_TEXTURE: GlEnum = 0x84E0;
pub const ARRAY_BUFFER_BINDING: GlEnum = 0x8894;
pub const CURRENT_PROGRAM: GlEnum = 0x8B8D;
pub const VERTEX_ATTRIB_ARRAY_ENABLED: GlEnum = 0x8622;
pub const TEXTURE0: GlEnum = 0x84C0;

// Blend factors
pub const ZERO: GlEnum = 0;
pub const ONE: GlEnum = 1;

// Buffers
pub const ARRAY_BUFFER: GlEnum = 0x8892;
pub const ELEMENT_ARRAY_BUFFER: GlEnum = 0x8893;
pub const STATIC_DRAW: GlEnum = 0x88E4;
pub const COLOR_BUFFER_BIT: GlEnum = 0x4000;

// Primitives
pub const POINTS: GlEnum = 0x0000;
pub const TRIANGLES: GlEnum = 0x0004;
pub const TRIANGLE_STRIP: GlEnum = 0x0005;

// Shaders
pub const FRAGMENT_SHADER: GlEnum = 0x8B30;
pub const VERTEX_SHADER: GlEnum = 0x8B31;
pub const COMPILE_STATUS: GlEnum = 0x8B81;
pub const LINK_STATUS: GlEnum = 0x8B82;

// Precision classes
pub const LOW_FLOAT: GlEnum = 0x8DF0;
pub const MEDIUM_FLOAT: GlEnum = 0x8DF1;
pub const HIGH_FLOAT: GlEnum = 0x8DF2;
pub const LOW_INT: GlEnum = 0x8DF3;
pub const MEDIUM_INT: GlEnum = 0x8DF4;
pub const HIGH_INT: GlEnum = 0x8DF5;

// Data types
pub const UNSIGNED_BYTE: GlEnum = 0x1401;
pub const UNSIGNED_SHORT: GlEnum = 0x1403;
pub const UNSIGNED_INT: GlEnum = 0x1405;
pub const FLOAT: GlEnum = 0x1406;

// Pixel formats
pub const ALPHA: GlEnum = 0x1906;
pub const RGB: GlEnum = 0x1907;
pub const RGBA: GlEnum = 0x1908;
pub const LUMINANCE: GlEnum = 0x1909;
pub const LUMINANCE_ALPHA: GlEnum = 0x190A;

/// Capability names the profile tables use, with their enum values.
pub const CAPABILITY_NAMES: &[(&str, GlEnum)] = &[
    ("MAX_TEXTURE_SIZE", MAX_TEXTURE_SIZE),
    ("MAX_VIEWPORT_DIMS", MAX_VIEWPORT_DIMS),
    ("MAX_RENDERBUFFER_SIZE", MAX_RENDERBUFFER_SIZE),
    ("MAX_CUBE_MAP_TEXTURE_SIZE", MAX_CUBE_MAP_TEXTURE_SIZE),
    ("ALIASED_POINT_SIZE_RANGE", ALIASED_POINT_SIZE_RANGE),
    ("ALIASED_LINE_WIDTH_RANGE", ALIASED_LINE_WIDTH_RANGE),
    ("MAX_VERTEX_ATTRIBS", MAX_VERTEX_ATTRIBS),
    ("MAX_TEXTURE_IMAGE_UNITS", MAX_TEXTURE_IMAGE_UNITS),
    ("MAX_VERTEX_TEXTURE_IMAGE_UNITS", MAX_VERTEX_TEXTURE_IMAGE_UNITS),
    ("MAX_COMBINED_TEXTURE_IMAGE_UNITS", MAX_COMBINED_TEXTURE_IMAGE_UNITS),
    ("MAX_VERTEX_UNIFORM_VECTORS", MAX_VERTEX_UNIFORM_VECTORS),
    ("MAX_VARYING_VECTORS", MAX_VARYING_VECTORS),
    ("MAX_FRAGMENT_UNIFORM_VECTORS", MAX_FRAGMENT_UNIFORM_VECTORS),
    ("MAX_3D_TEXTURE_SIZE", MAX_3D_TEXTURE_SIZE),
    ("MAX_DRAW_BUFFERS", MAX_DRAW_BUFFERS),
    ("MAX_ARRAY_TEXTURE_LAYERS", MAX_ARRAY_TEXTURE_LAYERS),
    ("MAX_VERTEX_UNIFORM_BLOCKS", MAX_VERTEX_UNIFORM_BLOCKS),
    ("MAX_FRAGMENT_UNIFORM_BLOCKS", MAX_FRAGMENT_UNIFORM_BLOCKS),
    ("MAX_COMBINED_UNIFORM_BLOCKS", MAX_COMBINED_UNIFORM_BLOCKS),
    ("MAX_UNIFORM_BLOCK_SIZE", MAX_UNIFORM_BLOCK_SIZE),
    ("MAX_COLOR_ATTACHMENTS", MAX_COLOR_ATTACHMENTS),
    ("MAX_ELEMENT_INDEX", MAX_ELEMENT_INDEX),
    ("MAX_SAMPLES", MAX_SAMPLES),
];

/// Looks up the capability name for an enum value.
pub fn capability_name(pname: GlEnum) -> Option<&'static str> {
    CAPABILITY_NAMES
        .iter()
        .find(|(_, value)| *value == pname)
        .map(|(name, _)| *name)
}

/// Looks up the enum value for a capability name.
pub fn capability_enum(name: &str) -> Option<GlEnum> {
    CAPABILITY_NAMES
        .iter()
        .find(|(candidate, _)| *candidate == name)
        .map(|(_, value)| *value)
}

/// Range-valued capabilities are reported as `Float32Array`, the rest as
/// integers.
pub fn is_float_range(pname: GlEnum) -> bool {
    matches!(pname, ALIASED_POINT_SIZE_RANGE | ALIASED_LINE_WIDTH_RANGE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_lookup_round_trips() {
        for (name, value) in CAPABILITY_NAMES {
            assert_eq!(capability_name(*value), Some(*name));
            assert_eq!(capability_enum(name), Some(*value));
        }
        assert_eq!(capability_name(CURRENT_PROGRAM), None);
    }
}
