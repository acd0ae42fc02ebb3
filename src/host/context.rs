//! Host rendering-context abstraction.
//!
//! The page-facing WebGL surface is expressed as the [`RenderingContext`]
//! trait. A real host context and every spoofing decorator implement the same
//! trait, so protection is composed by wrapping rather than by replacing
//! global entry points.

use crate::host::gl::GlEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::rc::Rc;

/// Opaque handle to a GL object (program, shader, buffer, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlObject(pub u32);

/// Value returned by `getParameter` and friends.
#[derive(Debug, Clone, PartialEq)]
pub enum GlValue {
    /// `null` / unknown enum.
    Null,
    /// Boolean state such as `BLEND`.
    Bool(bool),
    /// Integer scalar.
    Int(i64),
    /// Floating point scalar.
    Float(f64),
    /// Identity strings.
    String(String),
    /// Integer pairs such as `MAX_VIEWPORT_DIMS`.
    Int32Array(Vec<i32>),
    /// Float ranges such as `ALIASED_POINT_SIZE_RANGE`.
    Float32Array(Vec<f32>),
    /// Bound object (`CURRENT_PROGRAM`, `ARRAY_BUFFER_BINDING`).
    Object(Option<GlObject>),
}

impl GlValue {
    /// Interprets the value as an integer where that makes sense.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            GlValue::Int(v) => Some(*v),
            GlValue::Float(v) => Some(*v as i64),
            GlValue::Bool(v) => Some(i64::from(*v)),
            _ => None,
        }
    }

    /// Interprets the value as a boolean (`Bool`, or non-zero `Int`).
    pub fn as_bool(&self) -> bool {
        match self {
            GlValue::Bool(v) => *v,
            GlValue::Int(v) => *v != 0,
            _ => false,
        }
    }

    /// Returns the string payload, if any.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            GlValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the bound object, if the value is an object binding.
    pub fn as_object(&self) -> Option<GlObject> {
        match self {
            GlValue::Object(obj) => *obj,
            _ => None,
        }
    }
}

impl fmt::Display for GlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GlValue::Null => write!(f, "null"),
            GlValue::Bool(v) => write!(f, "{}", v),
            GlValue::Int(v) => write!(f, "{}", v),
            GlValue::Float(v) => write!(f, "{}", v),
            GlValue::String(s) => write!(f, "{:?}", s),
            GlValue::Int32Array(v) => write!(f, "{:?}", v),
            GlValue::Float32Array(v) => write!(f, "{:?}", v),
            GlValue::Object(Some(obj)) => write!(f, "object#{}", obj.0),
            GlValue::Object(None) => write!(f, "null"),
        }
    }
}

/// Result of `getShaderPrecisionFormat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShaderPrecisionFormat {
    pub range_min: i32,
    pub range_max: i32,
    pub precision: i32,
}

/// Extension object returned by `getExtension`.
///
/// Handed out behind `Rc` so callers can compare identities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlExtension {
    pub name: String,
}

impl GlExtension {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// WebGL generation of a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextKind {
    WebGl,
    WebGl2,
}

impl ContextKind {
    /// Maps a `getContext` type string to a WebGL generation.
    ///
    /// Non-WebGL types (`"2d"`, `"bitmaprenderer"`, ...) return `None`.
    pub fn from_type(context_type: &str) -> Option<Self> {
        match context_type {
            "webgl" | "experimental-webgl" => Some(ContextKind::WebGl),
            "webgl2" => Some(ContextKind::WebGl2),
            _ => None,
        }
    }

    pub fn is_webgl2(self) -> bool {
        self == ContextKind::WebGl2
    }
}

impl fmt::Display for ContextKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextKind::WebGl => write!(f, "webgl"),
            ContextKind::WebGl2 => write!(f, "webgl2"),
        }
    }
}

/// Typed pixel destination for `readPixels`.
#[derive(Debug, Clone, PartialEq)]
pub enum PixelBuffer {
    U8(Vec<u8>),
    U8Clamped(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
    F32(Vec<f32>),
}

impl PixelBuffer {
    pub fn len(&self) -> usize {
        match self {
            PixelBuffer::U8(v) | PixelBuffer::U8Clamped(v) => v.len(),
            PixelBuffer::U16(v) => v.len(),
            PixelBuffer::U32(v) => v.len(),
            PixelBuffer::F32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// RGBA8 pixels read from a 2D surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl ImageData {
    /// Transparent black image of the given size.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize * 4],
        }
    }
}

/// Encoded canvas export (`toBlob`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// A canvas element as seen by the readback interceptor.
pub trait Canvas {
    fn width(&self) -> u32;

    fn height(&self) -> u32;

    /// `canvas.toDataURL(type, quality)`.
    fn to_data_url(&self, mime_type: Option<&str>, quality: Option<f64>) -> String;

    /// `canvas.toBlob(callback, type, quality)`, delivered synchronously.
    fn to_blob(&self, mime_type: Option<&str>, quality: Option<f64>) -> Option<Blob>;

    /// Draws the current contents onto a new off-screen 2D canvas.
    ///
    /// Returns `None` if the host cannot create one.
    fn offscreen_copy(&self) -> Option<Box<dyn Canvas2d>>;

    /// Marks the element as protected (debug visual indicator).
    fn mark_protected(&self) {}
}

/// A 2D canvas with pixel access.
pub trait Canvas2d: Canvas {
    fn get_image_data(&self, x: i32, y: i32, width: u32, height: u32) -> ImageData;

    fn put_image_data(&mut self, image: &ImageData, x: i32, y: i32);
}

/// The WebGL method surface the engine intercepts or drives.
///
/// Methods take `&mut self` because interceptors keep per-context caches;
/// a host context is owned by exactly one caller.
pub trait RenderingContext {
    fn context_kind(&self) -> ContextKind;

    // --- Queries ---

    fn get_parameter(&mut self, pname: GlEnum) -> GlValue;

    fn get_shader_precision_format(
        &mut self,
        shader_type: GlEnum,
        precision_type: GlEnum,
    ) -> Option<ShaderPrecisionFormat>;

    fn get_supported_extensions(&mut self) -> Option<Vec<String>>;

    fn get_extension(&mut self, name: &str) -> Option<Rc<GlExtension>>;

    // --- Draw family ---

    fn draw_arrays(&mut self, mode: GlEnum, first: i32, count: i32);

    fn draw_elements(&mut self, mode: GlEnum, count: i32, index_type: GlEnum, offset: i64);

    fn draw_arrays_instanced(&mut self, mode: GlEnum, first: i32, count: i32, instances: i32);

    fn draw_elements_instanced(
        &mut self,
        mode: GlEnum,
        count: i32,
        index_type: GlEnum,
        offset: i64,
        instances: i32,
    );

    /// `ANGLE_instanced_arrays.drawArraysInstancedANGLE`.
    fn draw_arrays_instanced_angle(
        &mut self,
        mode: GlEnum,
        first: i32,
        count: i32,
        instances: i32,
    ) {
        self.draw_arrays_instanced(mode, first, count, instances)
    }

    /// `ANGLE_instanced_arrays.drawElementsInstancedANGLE`.
    fn draw_elements_instanced_angle(
        &mut self,
        mode: GlEnum,
        count: i32,
        index_type: GlEnum,
        offset: i64,
        instances: i32,
    ) {
        self.draw_elements_instanced(mode, count, index_type, offset, instances)
    }

    // --- Readback ---

    #[allow(clippy::too_many_arguments)]
    fn read_pixels(
        &mut self,
        x: i32,
        y: i32,
        width: u32,
        height: u32,
        format: GlEnum,
        pixel_type: GlEnum,
        pixels: &mut PixelBuffer,
    );

    /// The canvas backing this context, if any.
    fn canvas(&self) -> Option<Rc<dyn Canvas>>;

    // --- State plumbing ---

    fn clear_color(&mut self, r: f32, g: f32, b: f32, a: f32);

    fn clear(&mut self, mask: GlEnum);

    fn enable(&mut self, cap: GlEnum);

    fn disable(&mut self, cap: GlEnum);

    fn blend_func_separate(
        &mut self,
        src_rgb: GlEnum,
        dst_rgb: GlEnum,
        src_alpha: GlEnum,
        dst_alpha: GlEnum,
    );

    fn active_texture(&mut self, texture: GlEnum);

    fn create_shader(&mut self, shader_type: GlEnum) -> Option<GlObject>;

    fn shader_source(&mut self, shader: GlObject, source: &str);

    fn compile_shader(&mut self, shader: GlObject);

    fn get_shader_parameter(&mut self, shader: GlObject, pname: GlEnum) -> GlValue;

    fn get_shader_info_log(&mut self, shader: GlObject) -> Option<String>;

    fn delete_shader(&mut self, shader: GlObject);

    fn create_program(&mut self) -> Option<GlObject>;

    fn attach_shader(&mut self, program: GlObject, shader: GlObject);

    fn link_program(&mut self, program: GlObject);

    fn get_program_parameter(&mut self, program: GlObject, pname: GlEnum) -> GlValue;

    fn get_program_info_log(&mut self, program: GlObject) -> Option<String>;

    fn delete_program(&mut self, program: GlObject);

    fn use_program(&mut self, program: Option<GlObject>);

    fn get_attrib_location(&mut self, program: GlObject, name: &str) -> i32;

    fn get_uniform_location(&mut self, program: GlObject, name: &str) -> Option<GlObject>;

    fn uniform1f(&mut self, location: Option<GlObject>, x: f32);

    fn uniform2f(&mut self, location: Option<GlObject>, x: f32, y: f32);

    fn create_buffer(&mut self) -> Option<GlObject>;

    fn bind_buffer(&mut self, target: GlEnum, buffer: Option<GlObject>);

    fn buffer_data_f32(&mut self, target: GlEnum, data: &[f32], usage: GlEnum);

    fn delete_buffer(&mut self, buffer: GlObject);

    fn get_vertex_attrib(&mut self, index: u32, pname: GlEnum) -> GlValue;

    fn enable_vertex_attrib_array(&mut self, index: u32);

    fn disable_vertex_attrib_array(&mut self, index: u32);

    #[allow(clippy::too_many_arguments)]
    fn vertex_attrib_pointer(
        &mut self,
        index: u32,
        size: i32,
        data_type: GlEnum,
        normalized: bool,
        stride: i32,
        offset: i64,
    );
}

/// What the host's `getContext` hands back.
pub enum HostContext {
    /// A WebGL or WebGL2 context.
    Gl(Box<dyn RenderingContext>),
    /// A 2D context, never intercepted.
    TwoD(Box<dyn Canvas2d>),
}

impl HostContext {
    /// Unwraps a GL context.
    pub fn into_gl(self) -> Option<Box<dyn RenderingContext>> {
        match self {
            HostContext::Gl(gl) => Some(gl),
            HostContext::TwoD(_) => None,
        }
    }
}

impl fmt::Debug for HostContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostContext::Gl(gl) => write!(f, "HostContext::Gl({})", gl.context_kind()),
            HostContext::TwoD(_) => write!(f, "HostContext::TwoD"),
        }
    }
}

/// The host's context-creation entry point (`canvas.getContext`).
pub trait ContextProvider {
    fn get_context(&self, context_type: &str) -> Option<HostContext>;
}

/// Forwards the whole [`RenderingContext`] surface to `self.inner`, except the
/// methods listed before the macro call in the implementing block.
///
/// Interceptors use this so each decorator only spells out what it changes.
#[macro_export]
#[doc(hidden)]
macro_rules! forward_rendering_context {
    (@queries $inner:ident) => {
        fn get_parameter(&mut self, pname: $crate::host::gl::GlEnum) -> $crate::host::GlValue {
            self.$inner.get_parameter(pname)
        }

        fn get_shader_precision_format(
            &mut self,
            shader_type: $crate::host::gl::GlEnum,
            precision_type: $crate::host::gl::GlEnum,
        ) -> Option<$crate::host::ShaderPrecisionFormat> {
            self.$inner.get_shader_precision_format(shader_type, precision_type)
        }
    };
    (@extensions $inner:ident) => {
        fn get_supported_extensions(&mut self) -> Option<Vec<String>> {
            self.$inner.get_supported_extensions()
        }

        fn get_extension(&mut self, name: &str) -> Option<std::rc::Rc<$crate::host::GlExtension>> {
            self.$inner.get_extension(name)
        }
    };
    (@draws $inner:ident) => {
        fn draw_arrays(&mut self, mode: $crate::host::gl::GlEnum, first: i32, count: i32) {
            self.$inner.draw_arrays(mode, first, count)
        }

        fn draw_elements(
            &mut self,
            mode: $crate::host::gl::GlEnum,
            count: i32,
            index_type: $crate::host::gl::GlEnum,
            offset: i64,
        ) {
            self.$inner.draw_elements(mode, count, index_type, offset)
        }

        fn draw_arrays_instanced(
            &mut self,
            mode: $crate::host::gl::GlEnum,
            first: i32,
            count: i32,
            instances: i32,
        ) {
            self.$inner.draw_arrays_instanced(mode, first, count, instances)
        }

        fn draw_elements_instanced(
            &mut self,
            mode: $crate::host::gl::GlEnum,
            count: i32,
            index_type: $crate::host::gl::GlEnum,
            offset: i64,
            instances: i32,
        ) {
            self.$inner
                .draw_elements_instanced(mode, count, index_type, offset, instances)
        }

        fn draw_arrays_instanced_angle(
            &mut self,
            mode: $crate::host::gl::GlEnum,
            first: i32,
            count: i32,
            instances: i32,
        ) {
            self.$inner.draw_arrays_instanced_angle(mode, first, count, instances)
        }

        fn draw_elements_instanced_angle(
            &mut self,
            mode: $crate::host::gl::GlEnum,
            count: i32,
            index_type: $crate::host::gl::GlEnum,
            offset: i64,
            instances: i32,
        ) {
            self.$inner
                .draw_elements_instanced_angle(mode, count, index_type, offset, instances)
        }
    };
    (@readback $inner:ident) => {
        fn read_pixels(
            &mut self,
            x: i32,
            y: i32,
            width: u32,
            height: u32,
            format: $crate::host::gl::GlEnum,
            pixel_type: $crate::host::gl::GlEnum,
            pixels: &mut $crate::host::PixelBuffer,
        ) {
            self.$inner
                .read_pixels(x, y, width, height, format, pixel_type, pixels)
        }

        fn canvas(&self) -> Option<std::rc::Rc<dyn $crate::host::Canvas>> {
            self.$inner.canvas()
        }
    };
    (@state $inner:ident) => {
        fn context_kind(&self) -> $crate::host::ContextKind {
            self.$inner.context_kind()
        }

        fn clear_color(&mut self, r: f32, g: f32, b: f32, a: f32) {
            self.$inner.clear_color(r, g, b, a)
        }

        fn clear(&mut self, mask: $crate::host::gl::GlEnum) {
            self.$inner.clear(mask)
        }

        fn enable(&mut self, cap: $crate::host::gl::GlEnum) {
            self.$inner.enable(cap)
        }

        fn disable(&mut self, cap: $crate::host::gl::GlEnum) {
            self.$inner.disable(cap)
        }

        fn blend_func_separate(
            &mut self,
            src_rgb: $crate::host::gl::GlEnum,
            dst_rgb: $crate::host::gl::GlEnum,
            src_alpha: $crate::host::gl::GlEnum,
            dst_alpha: $crate::host::gl::GlEnum,
        ) {
            self.$inner
                .blend_func_separate(src_rgb, dst_rgb, src_alpha, dst_alpha)
        }

        fn active_texture(&mut self, texture: $crate::host::gl::GlEnum) {
            self.$inner.active_texture(texture)
        }

        fn create_shader(
            &mut self,
            shader_type: $crate::host::gl::GlEnum,
        ) -> Option<$crate::host::GlObject> {
            self.$inner.create_shader(shader_type)
        }

        fn shader_source(&mut self, shader: $crate::host::GlObject, source: &str) {
            self.$inner.shader_source(shader, source)
        }

        fn compile_shader(&mut self, shader: $crate::host::GlObject) {
            self.$inner.compile_shader(shader)
        }

        fn get_shader_parameter(
            &mut self,
            shader: $crate::host::GlObject,
            pname: $crate::host::gl::GlEnum,
        ) -> $crate::host::GlValue {
            self.$inner.get_shader_parameter(shader, pname)
        }

        fn get_shader_info_log(&mut self, shader: $crate::host::GlObject) -> Option<String> {
            self.$inner.get_shader_info_log(shader)
        }

        fn delete_shader(&mut self, shader: $crate::host::GlObject) {
            self.$inner.delete_shader(shader)
        }

        fn create_program(&mut self) -> Option<$crate::host::GlObject> {
            self.$inner.create_program()
        }

        fn attach_shader(&mut self, program: $crate::host::GlObject, shader: $crate::host::GlObject) {
            self.$inner.attach_shader(program, shader)
        }

        fn link_program(&mut self, program: $crate::host::GlObject) {
            self.$inner.link_program(program)
        }

        fn get_program_parameter(
            &mut self,
            program: $crate::host::GlObject,
            pname: $crate::host::gl::GlEnum,
        ) -> $crate::host::GlValue {
            self.$inner.get_program_parameter(program, pname)
        }

        fn get_program_info_log(&mut self, program: $crate::host::GlObject) -> Option<String> {
            self.$inner.get_program_info_log(program)
        }

        fn delete_program(&mut self, program: $crate::host::GlObject) {
            self.$inner.delete_program(program)
        }

        fn use_program(&mut self, program: Option<$crate::host::GlObject>) {
            self.$inner.use_program(program)
        }

        fn get_attrib_location(&mut self, program: $crate::host::GlObject, name: &str) -> i32 {
            self.$inner.get_attrib_location(program, name)
        }

        fn get_uniform_location(
            &mut self,
            program: $crate::host::GlObject,
            name: &str,
        ) -> Option<$crate::host::GlObject> {
            self.$inner.get_uniform_location(program, name)
        }

        fn uniform1f(&mut self, location: Option<$crate::host::GlObject>, x: f32) {
            self.$inner.uniform1f(location, x)
        }

        fn uniform2f(&mut self, location: Option<$crate::host::GlObject>, x: f32, y: f32) {
            self.$inner.uniform2f(location, x, y)
        }

        fn create_buffer(&mut self) -> Option<$crate::host::GlObject> {
            self.$inner.create_buffer()
        }

        fn bind_buffer(
            &mut self,
            target: $crate::host::gl::GlEnum,
            buffer: Option<$crate::host::GlObject>,
        ) {
            self.$inner.bind_buffer(target, buffer)
        }

        fn buffer_data_f32(
            &mut self,
            target: $crate::host::gl::GlEnum,
            data: &[f32],
            usage: $crate::host::gl::GlEnum,
        ) {
            self.$inner.buffer_data_f32(target, data, usage)
        }

        fn delete_buffer(&mut self, buffer: $crate::host::GlObject) {
            self.$inner.delete_buffer(buffer)
        }

        fn get_vertex_attrib(
            &mut self,
            index: u32,
            pname: $crate::host::gl::GlEnum,
        ) -> $crate::host::GlValue {
            self.$inner.get_vertex_attrib(index, pname)
        }

        fn enable_vertex_attrib_array(&mut self, index: u32) {
            self.$inner.enable_vertex_attrib_array(index)
        }

        fn disable_vertex_attrib_array(&mut self, index: u32) {
            self.$inner.disable_vertex_attrib_array(index)
        }

        fn vertex_attrib_pointer(
            &mut self,
            index: u32,
            size: i32,
            data_type: $crate::host::gl::GlEnum,
            normalized: bool,
            stride: i32,
            offset: i64,
        ) {
            self.$inner
                .vertex_attrib_pointer(index, size, data_type, normalized, stride, offset)
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_kind_from_type() {
        assert_eq!(ContextKind::from_type("webgl"), Some(ContextKind::WebGl));
        assert_eq!(
            ContextKind::from_type("experimental-webgl"),
            Some(ContextKind::WebGl)
        );
        assert_eq!(ContextKind::from_type("webgl2"), Some(ContextKind::WebGl2));
        assert_eq!(ContextKind::from_type("2d"), None);
    }

    #[test]
    fn test_gl_value_accessors() {
        assert_eq!(GlValue::Int(16).as_i64(), Some(16));
        assert!(GlValue::Bool(true).as_bool());
        assert!(!GlValue::Null.as_bool());
        assert_eq!(GlValue::String("x".into()).as_str(), Some("x"));
        assert_eq!(
            GlValue::Object(Some(GlObject(3))).as_object(),
            Some(GlObject(3))
        );
        assert_eq!(GlValue::Int32Array(vec![1, 2]).to_string(), "[1, 2]");
    }

    #[test]
    fn test_pixel_buffer_len() {
        assert_eq!(PixelBuffer::U16(vec![0; 8]).len(), 8);
        assert!(PixelBuffer::F32(Vec::new()).is_empty());
    }
}
