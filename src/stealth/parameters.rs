//! Parameter Interceptor
//!
//! Answers identity and capability queries from the session profile.
//! Numeric capabilities are jittered with a sub-generator derived from the
//! capability name, so the value is a pure function of `(seed, name)`, and the
//! first answer per query is cached for the lifetime of the context.

use crate::host::gl::{self, GlEnum};
use crate::host::{ContextKind, GlValue, RenderingContext, ShaderPrecisionFormat};
use crate::stealth::capabilities::CapabilityValue;
use crate::stealth::prng::SessionRng;
use crate::stealth::session::Session;
use std::collections::HashMap;
use std::rc::Rc;
use tracing::debug;

/// Jitters `value` by up to `±fraction`, using the stream of
/// `derive("param-{label}")`.
///
/// Integral inputs stay integral (floored). Positive integral values never
/// drop below 1, so limits such as `MAX_DRAW_BUFFERS = 1` stay usable.
pub fn jitter_value(rng: &SessionRng, value: f64, label: &str, fraction: f64) -> f64 {
    if fraction <= 0.0 || !value.is_finite() {
        return value;
    }
    let mut sub = rng.derive(&format!("param-{}", label));
    let factor = 1.0 + (sub.random() * 2.0 - 1.0) * fraction;
    let jittered = value * factor;

    if value.fract() == 0.0 {
        let floored = jittered.floor();
        if value >= 1.0 {
            floored.max(1.0)
        } else {
            floored
        }
    } else {
        jittered
    }
}

/// Jitters a table value; arrays use one sub-generator per element, labelled
/// `"{name}[{index}]"`.
pub fn jitter_capability(
    rng: &SessionRng,
    name: &str,
    value: &CapabilityValue,
    fraction: f64,
) -> CapabilityValue {
    match value {
        CapabilityValue::Scalar(v) => CapabilityValue::Scalar(jitter_value(rng, *v, name, fraction)),
        CapabilityValue::Array(values) => CapabilityValue::Array(
            values
                .iter()
                .enumerate()
                .map(|(i, v)| jitter_value(rng, *v, &format!("{}[{}]", name, i), fraction))
                .collect(),
        ),
    }
}

/// Jitters a shader precision format; `range_min` is left as reported.
pub fn jitter_precision(
    rng: &SessionRng,
    shader_type: GlEnum,
    precision_type: GlEnum,
    format: ShaderPrecisionFormat,
    fraction: f64,
) -> ShaderPrecisionFormat {
    let key = format!("{}-{}", shader_type, precision_type);
    ShaderPrecisionFormat {
        range_min: format.range_min,
        range_max: jitter_value(
            rng,
            f64::from(format.range_max),
            &format!("{}-rangeMax", key),
            fraction,
        ) as i32,
        precision: jitter_value(
            rng,
            f64::from(format.precision),
            &format!("{}-precision", key),
            fraction,
        ) as i32,
    }
}

/// Spoofs `getParameter` and `getShaderPrecisionFormat`.
pub struct ParameterInterceptor {
    inner: Box<dyn RenderingContext>,
    session: Rc<Session>,
    kind: ContextKind,
    jitter: f64,
    cache: HashMap<GlEnum, GlValue>,
    precision_cache: HashMap<(GlEnum, GlEnum), ShaderPrecisionFormat>,
}

impl ParameterInterceptor {
    pub fn new(inner: Box<dyn RenderingContext>, session: Rc<Session>) -> Self {
        let kind = inner.context_kind();
        let jitter = session.jitter();
        if session.debug_enabled() {
            debug!("Parameter spoofing installed (jitter {})", jitter);
        }
        Self {
            inner,
            session,
            kind,
            jitter,
            cache: HashMap::new(),
            precision_cache: HashMap::new(),
        }
    }

    /// The spoofed answer for `pname`, or `None` when the query passes
    /// through.
    fn spoof(&self, pname: GlEnum) -> Option<GlValue> {
        let profile = self.session.profile();
        if let Some(identity) = profile.identity(pname, self.kind) {
            return Some(GlValue::String(identity.to_string()));
        }

        let name = gl::capability_name(pname)?;
        let base = profile.parameter(name, self.kind)?;
        let value = jitter_capability(self.session.generator(), name, base, self.jitter);
        Some(value.to_gl_value(pname))
    }
}

impl RenderingContext for ParameterInterceptor {
    fn get_parameter(&mut self, pname: GlEnum) -> GlValue {
        if let Some(cached) = self.cache.get(&pname) {
            return cached.clone();
        }

        if self.session.log_parameters() {
            let original = self.inner.get_parameter(pname);
            debug!("getParameter({:#06x}) original: {}", pname, original);
        }

        match self.spoof(pname) {
            Some(value) => {
                if self.session.log_parameters() {
                    debug!("getParameter({:#06x}) spoofed: {}", pname, value);
                }
                self.cache.insert(pname, value.clone());
                value
            }
            None => self.inner.get_parameter(pname),
        }
    }

    fn get_shader_precision_format(
        &mut self,
        shader_type: GlEnum,
        precision_type: GlEnum,
    ) -> Option<ShaderPrecisionFormat> {
        if let Some(cached) = self.precision_cache.get(&(shader_type, precision_type)) {
            return Some(*cached);
        }

        let original = self
            .inner
            .get_shader_precision_format(shader_type, precision_type)?;
        let spoofed = jitter_precision(
            self.session.generator(),
            shader_type,
            precision_type,
            original,
            self.jitter,
        );
        if self.session.log_parameters() {
            debug!(
                "getShaderPrecisionFormat({:#06x}, {:#06x}) {:?} -> {:?}",
                shader_type, precision_type, original, spoofed
            );
        }
        self.precision_cache
            .insert((shader_type, precision_type), spoofed);
        Some(spoofed)
    }

    crate::forward_rendering_context!(@extensions inner);
    crate::forward_rendering_context!(@draws inner);
    crate::forward_rendering_context!(@readback inner);
    crate::forward_rendering_context!(@state inner);
}
