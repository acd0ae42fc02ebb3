//! Injection scripts
//!
//! The engine can also be shipped into a page as JavaScript evaluated before
//! any page script runs. [`protection_script`] renders a self-contained script
//! for one session: identity strings, pre-jittered capability tables and the
//! filtered extension lists are baked in, and a port of the session generator
//! keeps readback noise identical to what [`crate::stealth::readback`]
//! produces for the same seed. [`preload_script`] is the minimal variant for
//! automated-browser tooling that only needs the configuration published and
//! `getContext` hooked.

use crate::config::{Feature, ShieldConfig};
use crate::host::gl::{self, GlEnum};
use crate::host::ContextKind;
use crate::stealth::extensions::DEBUG_RENDERER_INFO;
use crate::stealth::parameters::jitter_capability;
use crate::stealth::prng::Seed;
use crate::stealth::session::Session;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::warn;

const IDENTITY_ENUMS: [GlEnum; 6] = [
    gl::VENDOR,
    gl::RENDERER,
    gl::VERSION,
    gl::SHADING_LANGUAGE_VERSION,
    gl::UNMASKED_VENDOR_WEBGL,
    gl::UNMASKED_RENDERER_WEBGL,
];

fn to_js<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| {
        warn!("Failed to serialize script constant: {}", e);
        "null".to_string()
    })
}

fn seed_literal(seed: &Seed) -> String {
    match seed {
        Seed::Number(n) => n.to_string(),
        Seed::Text(text) => to_js(text),
    }
}

/// Identity answers keyed by GL enum.
fn identity_table(session: &Session, kind: ContextKind) -> Value {
    let profile = session.profile();
    let table: Map<String, Value> = IDENTITY_ENUMS
        .iter()
        .filter_map(|pname| {
            profile
                .identity(*pname, kind)
                .map(|value| (pname.to_string(), Value::String(value.to_string())))
        })
        .collect();
    Value::Object(table)
}

/// Jittered capability table keyed by GL enum.
fn parameter_table(session: &Session, kind: ContextKind) -> Value {
    let jitter = session.jitter();
    let table: Map<String, Value> = session
        .profile()
        .parameter_table(kind)
        .iter()
        .filter_map(|(name, value)| {
            let pname = gl::capability_enum(name)?;
            let jittered = jitter_capability(session.generator(), name, value, jitter);
            Some((pname.to_string(), serde_json::to_value(jittered).ok()?))
        })
        .collect();
    Value::Object(table)
}

/// Profile extensions for `kind` with blocked names removed.
fn extension_list(session: &Session, kind: ContextKind) -> Vec<String> {
    let blocked = &session.config().extensions.blocked_extensions;
    session
        .profile()
        .extension_list(kind)
        .into_iter()
        .filter(|name| *name != DEBUG_RENDERER_INFO && !blocked.iter().any(|b| b == name))
        .map(str::to_string)
        .collect()
}

/// Renders the minimal preload script for `config`.
pub fn preload_script(config: &ShieldConfig) -> String {
    format!(
        r#"
// WebGL Fingerprinting Protection Preload Script
(function() {{
    'use strict';

    const config = {config};
    window._webglProtectionConfig = config;
    if (config.enabled === false) {{
        return;
    }}

    const WEBGL_TYPES = ['webgl', 'experimental-webgl', 'webgl2'];
    const originalGetContext = HTMLCanvasElement.prototype.getContext;
    HTMLCanvasElement.prototype.getContext = function(contextType, ...args) {{
        const context = originalGetContext.call(this, contextType, ...args);
        if (context && WEBGL_TYPES.includes(contextType)) {{
            if (config.debug && config.debug.visual_indicator) {{
                this.dataset.webglProtected = 'true';
            }}
            if (config.debug && config.debug.enabled) {{
                console.log('WebGL Fingerprinting Protection active');
            }}
        }}
        return context;
    }};
}})();
"#,
        config = to_js(config)
    )
}

/// Renders the full protection script for `session`.
pub fn protection_script(session: &Session) -> String {
    let config = session.config();
    let profile = session.profile();
    let compat_hosts: Vec<String> = if config.compatibility.enabled {
        config
            .compatibility
            .hosts
            .iter()
            .map(|host| host.trim().to_ascii_lowercase())
            .filter(|host| !host.is_empty())
            .collect()
    } else {
        Vec::new()
    };
    let features = json!({
        "parameters": session.is_enabled(Feature::Parameters),
        "extensions": session.is_enabled(Feature::Extensions),
        "readback": session.is_enabled(Feature::Readback),
    });

    format!(
        r#"
// WebGL Fingerprint Protection
(function() {{
    'use strict';

    const ENABLED = {enabled};
    const SEED = {seed};
    const SUPPORTS_WEBGL2 = {supports_webgl2};
    const IDENTITY = {identity};
    const IDENTITY_WEBGL2 = {identity2};
    const PARAMETERS = {parameters};
    const PARAMETERS_WEBGL2 = {parameters2};
    const FLOAT_RANGES = [{point_range}, {line_range}];
    const EXTENSIONS = {extensions};
    const EXTENSIONS_WEBGL2 = {extensions2};
    const BLOCKED = {blocked};
    const COMPAT_HOSTS = {compat_hosts};
    const FEATURES = {features};
    const JITTER = {jitter};
    const PIXEL_JITTER = {pixel_jitter};
    const INCLUDE_ALPHA = {include_alpha};
    const DEBUG_INFO = '{debug_info}';
    const COMPONENTS = {{ {rgb}: 3, {alpha}: 1, {luminance}: 1, {luminance_alpha}: 2 }};

    // Session generator: base-31 string hash, LCG seeding, xorshift-128.
    function hash(text) {{
        let h = 0;
        for (let i = 0; i < text.length; i++) {{
            h = (Math.imul(h, 31) + text.charCodeAt(i)) >>> 0;
        }}
        return h;
    }}

    function stream(word) {{
        const s = new Uint32Array(4);
        s[0] = word;
        s[1] = Math.imul(s[0], 69069) + 1;
        s[2] = Math.imul(s[1], 69069) + 1;
        s[3] = Math.imul(s[2], 69069) + 1;
        const next = function() {{
            let t = s[3];
            const x = s[0];
            s[3] = s[2];
            s[2] = s[1];
            s[1] = x;
            t ^= t << 11;
            t ^= t >>> 8;
            s[0] = t ^ x ^ (x >>> 19);
            return s[0];
        }};
        for (let i = 0; i < 12; i++) {{
            next();
        }}
        return {{ random: function() {{ return next() / 4294967296; }} }};
    }}

    function derive(label) {{
        return stream(hash(String(SEED) + '-' + label));
    }}

    function pixelNoise(label) {{
        const prefix = String(SEED) + '-';
        const tail = '-' + String(SEED) + '-' + label;
        return function(x, y) {{
            return stream(hash(prefix + x + ',' + y + tail));
        }};
    }}

    function jitter(value, label) {{
        if (JITTER <= 0 || !isFinite(value)) {{
            return value;
        }}
        const r = derive('param-' + label).random();
        const v = value * (1 + (r * 2 - 1) * JITTER);
        if (Number.isInteger(value)) {{
            const floored = Math.floor(v);
            return value >= 1 ? Math.max(1, floored) : floored;
        }}
        return v;
    }}

    const hostname = (typeof location !== 'undefined' ? location.hostname : '').toLowerCase();
    const COMPAT = COMPAT_HOSTS.some(function(h) {{
        return hostname === h || hostname.endsWith('.' + h);
    }});

    function perturb(pixels, index, noise) {{
        if (index >= pixels.length) {{
            return;
        }}
        if (pixels instanceof Uint8Array || pixels instanceof Uint8ClampedArray) {{
            pixels[index] = Math.max(0, Math.min(255, pixels[index] + noise));
        }} else if (pixels instanceof Float32Array) {{
            pixels[index] = Math.max(0, Math.min(1, pixels[index] + noise / 255));
        }} else if (pixels instanceof Uint16Array) {{
            pixels[index] = Math.max(0, Math.min(65535, pixels[index] + noise * 257));
        }} else if (pixels instanceof Uint32Array) {{
            pixels[index] = Math.max(0, Math.min(4294967295, pixels[index] + noise * 16843009));
        }}
    }}

    function applyNoise(pixels, x0, y0, width, height, components, noiseAt) {{
        if (PIXEL_JITTER === 0) {{
            return;
        }}
        for (let row = 0; row < height; row++) {{
            for (let col = 0; col < width; col++) {{
                const rng = noiseAt(x0 + col, y0 + row);
                const base = (row * width + col) * components;
                for (let c = 0; c < components; c++) {{
                    if (c === 3 && !INCLUDE_ALPHA) {{
                        continue;
                    }}
                    const noise = Math.floor(rng.random() * (PIXEL_JITTER * 2 + 1)) - PIXEL_JITTER;
                    perturb(pixels, base + c, noise);
                }}
            }}
        }}
    }}

    const readbackNoise = pixelNoise('readback-noise');

    function noisyCopy(canvas) {{
        try {{
            const copy = document.createElement('canvas');
            copy.width = canvas.width;
            copy.height = canvas.height;
            const ctx = copy.getContext('2d');
            ctx.drawImage(canvas, 0, 0);
            const image = ctx.getImageData(0, 0, copy.width, copy.height);
            const lastRow = copy.height - 1;
            applyNoise(image.data, 0, 0, copy.width, copy.height, 4, function(x, y) {{
                return readbackNoise(x, lastRow - y);
            }});
            ctx.putImageData(image, 0, 0);
            return copy;
        }} catch (e) {{
            return null;
        }}
    }}

    function protectCompat(gl) {{
        const getParameter = gl.getParameter.bind(gl);
        const getExtension = gl.getExtension.bind(gl);
        gl.getParameter = function(p) {{
            if (p === {unmasked_vendor} || p === {unmasked_renderer}) {{
                return IDENTITY[p];
            }}
            return getParameter(p);
        }};
        gl.getExtension = function(name) {{
            return name === DEBUG_INFO ? null : getExtension(name);
        }};
    }}

    function protectExtensions(gl, allowed) {{
        const exposed = function(name) {{
            return !BLOCKED.includes(name) && name !== DEBUG_INFO &&
                (allowed.length === 0 || allowed.includes(name));
        }};
        const getSupportedExtensions = gl.getSupportedExtensions.bind(gl);
        const getExtension = gl.getExtension.bind(gl);
        const cache = new Map();
        gl.getSupportedExtensions = function() {{
            const list = getSupportedExtensions();
            return list ? list.filter(exposed) : list;
        }};
        gl.getExtension = function(name) {{
            if (cache.has(name)) {{
                return cache.get(name);
            }}
            const ext = exposed(name) ? getExtension(name) : null;
            cache.set(name, ext);
            return ext;
        }};
    }}

    function protect(gl, isWebGL2) {{
        const identity = isWebGL2 ? IDENTITY_WEBGL2 : IDENTITY;
        const table = isWebGL2 ? PARAMETERS_WEBGL2 : PARAMETERS;

        if (FEATURES.readback && gl.canvas) {{
            const canvas = gl.canvas;
            const readPixels = gl.readPixels.bind(gl);
            gl.readPixels = function(x, y, width, height, format, type, pixels) {{
                readPixels.apply(null, arguments);
                if (pixels && ArrayBuffer.isView(pixels)) {{
                    applyNoise(pixels, x, y, width, height, COMPONENTS[format] || 4, readbackNoise);
                }}
            }};
            const toDataURL = canvas.toDataURL.bind(canvas);
            canvas.toDataURL = function(type, quality) {{
                const copy = noisyCopy(canvas);
                return copy ? copy.toDataURL(type, quality) : toDataURL(type, quality);
            }};
            const toBlob = canvas.toBlob.bind(canvas);
            canvas.toBlob = function(callback, type, quality) {{
                const copy = noisyCopy(canvas);
                return copy ? copy.toBlob(callback, type, quality) : toBlob(callback, type, quality);
            }};
        }}

        if (FEATURES.extensions) {{
            protectExtensions(gl, isWebGL2 ? EXTENSIONS_WEBGL2 : EXTENSIONS);
        }}

        if (FEATURES.parameters) {{
            const getParameter = gl.getParameter.bind(gl);
            const getShaderPrecisionFormat = gl.getShaderPrecisionFormat.bind(gl);
            const cache = new Map();
            const precisionCache = new Map();
            gl.getParameter = function(p) {{
                if (cache.has(p)) {{
                    return cache.get(p);
                }}
                let value;
                if (p in identity) {{
                    value = identity[p];
                }} else if (p in table) {{
                    const v = table[p];
                    value = Array.isArray(v)
                        ? (FLOAT_RANGES.includes(p) ? new Float32Array(v) : new Int32Array(v))
                        : v;
                }} else {{
                    return getParameter(p);
                }}
                cache.set(p, value);
                return value;
            }};
            gl.getShaderPrecisionFormat = function(shaderType, precisionType) {{
                const key = shaderType + '-' + precisionType;
                if (precisionCache.has(key)) {{
                    return precisionCache.get(key);
                }}
                const real = getShaderPrecisionFormat(shaderType, precisionType);
                if (!real) {{
                    return real;
                }}
                const spoofed = {{
                    rangeMin: real.rangeMin,
                    rangeMax: jitter(real.rangeMax, key + '-rangeMax'),
                    precision: jitter(real.precision, key + '-precision')
                }};
                precisionCache.set(key, spoofed);
                return spoofed;
            }};
        }}
    }}

    const protectedContexts = new WeakSet();
    const originalGetContext = HTMLCanvasElement.prototype.getContext;
    HTMLCanvasElement.prototype.getContext = function(contextType, ...args) {{
        const gl = originalGetContext.call(this, contextType, ...args);
        if (!gl || !ENABLED || protectedContexts.has(gl)) {{
            return gl;
        }}
        if (contextType === 'webgl' || contextType === 'experimental-webgl' || contextType === 'webgl2') {{
            const isWebGL2 = contextType === 'webgl2';
            protectedContexts.add(gl);
            if (isWebGL2 && !SUPPORTS_WEBGL2) {{
                if (FEATURES.extensions) {{
                    protectExtensions(gl, EXTENSIONS_WEBGL2);
                }}
                protectCompat(gl);
            }} else if (COMPAT) {{
                protectCompat(gl);
            }} else {{
                protect(gl, isWebGL2);
            }}
        }}
        return gl;
    }};
}})();
"#,
        enabled = session.is_master_enabled(),
        seed = seed_literal(session.seed()),
        supports_webgl2 = profile.supports_webgl2,
        identity = identity_table(session, ContextKind::WebGl),
        identity2 = identity_table(session, ContextKind::WebGl2),
        parameters = parameter_table(session, ContextKind::WebGl),
        parameters2 = parameter_table(session, ContextKind::WebGl2),
        point_range = gl::ALIASED_POINT_SIZE_RANGE,
        line_range = gl::ALIASED_LINE_WIDTH_RANGE,
        extensions = to_js(&extension_list(session, ContextKind::WebGl)),
        extensions2 = to_js(&extension_list(session, ContextKind::WebGl2)),
        blocked = to_js(&config.extensions.blocked_extensions),
        compat_hosts = to_js(&compat_hosts),
        features = features,
        jitter = session.jitter(),
        pixel_jitter = config.readback.pixel_jitter,
        include_alpha = config.readback.include_alpha,
        debug_info = DEBUG_RENDERER_INFO,
        rgb = gl::RGB,
        alpha = gl::ALPHA,
        luminance = gl::LUMINANCE,
        luminance_alpha = gl::LUMINANCE_ALPHA,
        unmasked_vendor = gl::UNMASKED_VENDOR_WEBGL,
        unmasked_renderer = gl::UNMASKED_RENDERER_WEBGL,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GpuTier, GpuVendor};
    use crate::stealth::catalog::BuiltinCatalog;

    fn session(config: ShieldConfig) -> Session {
        Session::new(config, &BuiltinCatalog::templates(), None)
    }

    #[test]
    fn test_preload_publishes_config() {
        let config = ShieldConfig::default().with_seed("preload");
        let script = preload_script(&config);
        assert!(script.contains("window._webglProtectionConfig = config"));
        assert!(script.contains("\"seed\":\"preload\""));
        assert!(script.contains("HTMLCanvasElement.prototype.getContext"));
    }

    #[test]
    fn test_protection_script_bakes_profile() {
        let config = ShieldConfig::default()
            .with_seed("script")
            .with_preferred_vendor(GpuVendor::Amd)
            .with_preferred_tier(GpuTier::High);
        let session = session(config);
        let script = protection_script(&session);

        assert!(script.contains("const SEED = \"script\";"));
        assert!(script.contains("RX 6800 XT"));
        assert!(script.contains("\"3379\":"));
        assert!(script.contains("browserleaks.com"));
        assert!(script.contains("'WEBGL_debug_renderer_info'"));
    }

    #[test]
    fn test_baked_parameters_match_interceptor() {
        let session = session(ShieldConfig::default().with_seed(7i64));
        let table = parameter_table(&session, ContextKind::WebGl);
        let base = session
            .profile()
            .parameter("MAX_TEXTURE_SIZE", ContextKind::WebGl)
            .cloned()
            .unwrap();
        let expected = jitter_capability(
            session.generator(),
            "MAX_TEXTURE_SIZE",
            &base,
            session.jitter(),
        );
        assert_eq!(
            table[gl::MAX_TEXTURE_SIZE.to_string()],
            serde_json::to_value(expected).unwrap()
        );
        assert!(protection_script(&session).contains("const SEED = 7;"));
    }

    #[test]
    fn test_blocked_extensions_filtered_from_lists() {
        let config = ShieldConfig::default()
            .with_seed("ext")
            .with_blocked_extensions(["OES_texture_float"]);
        let session = session(config);
        let list = extension_list(&session, ContextKind::WebGl);
        assert!(!list.iter().any(|name| name == "OES_texture_float"));
        assert!(!list.iter().any(|name| name == DEBUG_RENDERER_INFO));
    }

    #[test]
    fn test_compat_hosts_omitted_when_disabled() {
        let mut config = ShieldConfig::default().with_seed("compat");
        config.compatibility.enabled = false;
        let script = protection_script(&session(config));
        assert!(script.contains("const COMPAT_HOSTS = [];"));
    }

    #[test]
    fn test_webgl2_without_support_still_gated() {
        let template = crate::stealth::catalog::ProfileTemplate::chromium(
            "Google Inc. (Intel)",
            "ANGLE (Intel, Intel(R) HD Graphics 4600 Direct3D11 vs_5_0 ps_5_0)",
        )
        .without_webgl2();
        let session = Session::new(ShieldConfig::default().with_seed("gl2"), &[template], None);
        let script = protection_script(&session);
        assert!(script.contains("const SUPPORTS_WEBGL2 = false;"));
        assert!(script.contains(
            "if (isWebGL2 && !SUPPORTS_WEBGL2) {\n                if (FEATURES.extensions) {\n                    protectExtensions(gl, EXTENSIONS_WEBGL2);\n                }\n                protectCompat(gl);"
        ));
    }
}
