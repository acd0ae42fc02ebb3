//! Draw Interceptor
//!
//! Before the first significant draw call of a context, renders one
//! full-viewport quad that additively blends a small, seed-derived RGB
//! perturbation into the framebuffer. Every piece of GL state the extra draw
//! touches is saved first and restored afterwards.

use crate::config::DrawCallSettings;
use crate::host::gl::{self, GlEnum};
use crate::host::{GlObject, RenderingContext};
use crate::stealth::session::{ContextState, Session};
use std::rc::Rc;
use tracing::{debug, error};

pub const NOISE_VERTEX_SHADER: &str = r#"
attribute vec2 a_position;
varying vec2 v_texCoord;

void main() {
  v_texCoord = a_position * 0.5 + 0.5;
  gl_Position = vec4(a_position, 0.0, 1.0);
}
"#;

pub const NOISE_FRAGMENT_SHADER: &str = r#"
precision mediump float;

uniform float u_noiseAmount;
uniform float u_seed;
uniform vec2 u_noiseScale;
varying vec2 v_texCoord;

float rand(vec2 co) {
  return fract(sin(dot(co.xy, vec2(12.9898, 78.233)) * u_seed) * 43758.5453);
}

void main() {
  vec2 noiseCoord = floor(v_texCoord * u_noiseScale) / u_noiseScale;
  vec3 noiseColor = vec3(
    rand(noiseCoord + vec2(0.1, 0.0)) * u_noiseAmount,
    rand(noiseCoord + vec2(0.0, 0.1)) * u_noiseAmount,
    rand(noiseCoord + vec2(0.1, 0.1)) * u_noiseAmount
  );
  gl_FragColor = vec4(noiseColor - (u_noiseAmount * 0.5), 0.0);
}
"#;

/// Full-viewport quad as a triangle strip.
const QUAD_VERTICES: [f32; 8] = [-1.0, -1.0, 1.0, -1.0, -1.0, 1.0, 1.0, 1.0];

/// GL state the noise pass overwrites.
#[derive(Debug, Clone, PartialEq)]
struct SavedState {
    program: Option<GlObject>,
    blend: bool,
    blend_func: [GlEnum; 4],
    array_buffer: Option<GlObject>,
    active_texture: GlEnum,
    attribs_enabled: Vec<bool>,
}

struct NoiseProgram {
    program: GlObject,
    vertex_shader: GlObject,
    fragment_shader: GlObject,
    position: i32,
    noise_amount: Option<GlObject>,
    seed: Option<GlObject>,
    noise_scale: Option<GlObject>,
}

/// Injects draw-level noise once per context.
pub struct DrawInterceptor {
    inner: Box<dyn RenderingContext>,
    session: Rc<Session>,
    state: Rc<ContextState>,
    settings: DrawCallSettings,
    shader_seed: f32,
}

impl DrawInterceptor {
    pub fn new(
        inner: Box<dyn RenderingContext>,
        session: Rc<Session>,
        state: Rc<ContextState>,
    ) -> Self {
        let settings = session.config().draw_calls.clone();
        let shader_seed = (session.generator().derive("draw-noise").random() * 100.0) as f32;
        if session.debug_enabled() {
            debug!("Draw call spoofing installed for context {}", state.id());
        }
        Self {
            inner,
            session,
            state,
            settings,
            shader_seed,
        }
    }

    /// Whether a draw of `count` vertices (times `instances`) triggers noise.
    pub fn is_significant(&self, count: i32, instances: i32) -> bool {
        i64::from(count) * i64::from(instances)
            > i64::from(self.settings.significant_vertex_count)
    }

    fn before_draw(&mut self, count: i32, instances: i32) {
        if !self.state.noise_applied() && self.is_significant(count, instances) {
            self.apply_noise();
        }
    }

    fn save_state(&mut self) -> SavedState {
        let gl = &mut self.inner;
        let enum_of = |value: crate::host::GlValue, default: GlEnum| {
            value.as_i64().map(|v| v as GlEnum).unwrap_or(default)
        };
        let program = gl.get_parameter(gl::CURRENT_PROGRAM).as_object();
        let blend = gl.get_parameter(gl::BLEND).as_bool();
        let blend_func = [
            enum_of(gl.get_parameter(gl::BLEND_SRC_RGB), gl::ONE),
            enum_of(gl.get_parameter(gl::BLEND_DST_RGB), gl::ZERO),
            enum_of(gl.get_parameter(gl::BLEND_SRC_ALPHA), gl::ONE),
            enum_of(gl.get_parameter(gl::BLEND_DST_ALPHA), gl::ZERO),
        ];
        let array_buffer = gl.get_parameter(gl::ARRAY_BUFFER_BINDING).as_object();
        let active_texture = enum_of(gl.get_parameter(gl::ACTIVE_TEXTURE), gl::TEXTURE0);
        let max_attribs = gl
            .get_parameter(gl::MAX_VERTEX_ATTRIBS)
            .as_i64()
            .unwrap_or(0)
            .max(0) as u32;
        let attribs_enabled = (0..max_attribs)
            .map(|i| gl.get_vertex_attrib(i, gl::VERTEX_ATTRIB_ARRAY_ENABLED).as_bool())
            .collect();

        SavedState {
            program,
            blend,
            blend_func,
            array_buffer,
            active_texture,
            attribs_enabled,
        }
    }

    fn restore_state(&mut self, saved: &SavedState) {
        let gl = &mut self.inner;
        gl.use_program(saved.program);
        if saved.blend {
            gl.enable(gl::BLEND);
        } else {
            gl.disable(gl::BLEND);
        }
        let [src_rgb, dst_rgb, src_alpha, dst_alpha] = saved.blend_func;
        gl.blend_func_separate(src_rgb, dst_rgb, src_alpha, dst_alpha);
        gl.bind_buffer(gl::ARRAY_BUFFER, saved.array_buffer);
        gl.active_texture(saved.active_texture);
        for (index, enabled) in saved.attribs_enabled.iter().enumerate() {
            if *enabled {
                gl.enable_vertex_attrib_array(index as u32);
            } else {
                gl.disable_vertex_attrib_array(index as u32);
            }
        }
    }

    fn compile(&mut self, shader_type: GlEnum, source: &str) -> Option<GlObject> {
        let gl = &mut self.inner;
        let shader = gl.create_shader(shader_type)?;
        gl.shader_source(shader, source);
        gl.compile_shader(shader);
        if !gl.get_shader_parameter(shader, gl::COMPILE_STATUS).as_bool() {
            let log = gl.get_shader_info_log(shader).unwrap_or_default();
            error!("Shader compilation failed: {}", log);
            gl.delete_shader(shader);
            return None;
        }
        Some(shader)
    }

    fn build_program(&mut self) -> Option<NoiseProgram> {
        let vertex_shader = self.compile(gl::VERTEX_SHADER, NOISE_VERTEX_SHADER)?;
        let Some(fragment_shader) = self.compile(gl::FRAGMENT_SHADER, NOISE_FRAGMENT_SHADER) else {
            self.inner.delete_shader(vertex_shader);
            return None;
        };

        let gl = &mut self.inner;
        let Some(program) = gl.create_program() else {
            gl.delete_shader(vertex_shader);
            gl.delete_shader(fragment_shader);
            return None;
        };
        gl.attach_shader(program, vertex_shader);
        gl.attach_shader(program, fragment_shader);
        gl.link_program(program);
        if !gl.get_program_parameter(program, gl::LINK_STATUS).as_bool() {
            let log = gl.get_program_info_log(program).unwrap_or_default();
            error!("Program linking failed: {}", log);
            gl.delete_program(program);
            gl.delete_shader(vertex_shader);
            gl.delete_shader(fragment_shader);
            return None;
        }

        Some(NoiseProgram {
            program,
            vertex_shader,
            fragment_shader,
            position: gl.get_attrib_location(program, "a_position"),
            noise_amount: gl.get_uniform_location(program, "u_noiseAmount"),
            seed: gl.get_uniform_location(program, "u_seed"),
            noise_scale: gl.get_uniform_location(program, "u_noiseScale"),
        })
    }

    fn apply_noise(&mut self) {
        let saved = self.save_state();
        let Some(noise) = self.build_program() else {
            error!("Failed to create noise program, skipping draw noise");
            self.restore_state(&saved);
            return;
        };

        let amount = self.settings.noise_amount as f32;
        let granularity = self.settings.noise_granularity as f32;
        let seed = self.shader_seed;
        let gl = &mut self.inner;

        gl.enable(gl::BLEND);
        gl.blend_func_separate(gl::ONE, gl::ONE, gl::ONE, gl::ONE);
        gl.use_program(Some(noise.program));
        gl.uniform1f(noise.noise_amount, amount);
        gl.uniform1f(noise.seed, seed);
        gl.uniform2f(noise.noise_scale, granularity, granularity);

        let buffer = gl.create_buffer();
        gl.bind_buffer(gl::ARRAY_BUFFER, buffer);
        gl.buffer_data_f32(gl::ARRAY_BUFFER, &QUAD_VERTICES, gl::STATIC_DRAW);

        let position = u32::try_from(noise.position).ok();
        if let Some(position) = position {
            gl.enable_vertex_attrib_array(position);
            gl.vertex_attrib_pointer(position, 2, gl::FLOAT, false, 0, 0);
        }
        gl.draw_arrays(gl::TRIANGLE_STRIP, 0, 4);
        if let Some(position) = position {
            gl.disable_vertex_attrib_array(position);
        }

        self.restore_state(&saved);

        let gl = &mut self.inner;
        if let Some(buffer) = buffer {
            gl.delete_buffer(buffer);
        }
        gl.delete_program(noise.program);
        gl.delete_shader(noise.vertex_shader);
        gl.delete_shader(noise.fragment_shader);

        self.state.mark_noise_applied();
        if self.session.debug_enabled() {
            debug!("Applied noise to WebGL context {}", self.state.id());
        }
    }
}

impl RenderingContext for DrawInterceptor {
    fn draw_arrays(&mut self, mode: GlEnum, first: i32, count: i32) {
        self.before_draw(count, 1);
        self.inner.draw_arrays(mode, first, count)
    }

    fn draw_elements(&mut self, mode: GlEnum, count: i32, index_type: GlEnum, offset: i64) {
        self.before_draw(count, 1);
        self.inner.draw_elements(mode, count, index_type, offset)
    }

    fn draw_arrays_instanced(&mut self, mode: GlEnum, first: i32, count: i32, instances: i32) {
        self.before_draw(count, instances);
        self.inner.draw_arrays_instanced(mode, first, count, instances)
    }

    fn draw_elements_instanced(
        &mut self,
        mode: GlEnum,
        count: i32,
        index_type: GlEnum,
        offset: i64,
        instances: i32,
    ) {
        self.before_draw(count, instances);
        self.inner
            .draw_elements_instanced(mode, count, index_type, offset, instances)
    }

    fn draw_arrays_instanced_angle(
        &mut self,
        mode: GlEnum,
        first: i32,
        count: i32,
        instances: i32,
    ) {
        self.before_draw(count, instances);
        self.inner
            .draw_arrays_instanced_angle(mode, first, count, instances)
    }

    fn draw_elements_instanced_angle(
        &mut self,
        mode: GlEnum,
        count: i32,
        index_type: GlEnum,
        offset: i64,
        instances: i32,
    ) {
        self.before_draw(count, instances);
        self.inner
            .draw_elements_instanced_angle(mode, count, index_type, offset, instances)
    }

    crate::forward_rendering_context!(@queries inner);
    crate::forward_rendering_context!(@extensions inner);
    crate::forward_rendering_context!(@readback inner);
    crate::forward_rendering_context!(@state inner);
}
