//! Software reference host.
//!
//! An in-memory stand-in for a browser's canvas and WebGL implementation. It
//! keeps real GL state (bound program, blend function, attribute flags, ...),
//! an RGBA framebuffer backed by the `image` crate, and a log of every draw
//! call, so interceptor behaviour can be observed without a browser.
//!
//! # Example
//!
//! ```rust
//! use webgl_shield::host::{ContextProvider, SoftwareHost};
//!
//! let host = SoftwareHost::new();
//! let context = host.get_context("webgl").and_then(|c| c.into_gl());
//! assert!(context.is_some());
//! assert_eq!(host.probes().len(), 1);
//! ```

use crate::host::context::{
    Blob, Canvas, Canvas2d, ContextKind, ContextProvider, GlExtension, GlObject, GlValue,
    HostContext, ImageData, PixelBuffer, RenderingContext, ShaderPrecisionFormat,
};
use crate::host::gl::{self, GlEnum};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder, Rgba, RgbaImage};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

/// Default canvas size, matching the HTML canvas element.
pub const DEFAULT_CANVAS_WIDTH: u32 = 300;
pub const DEFAULT_CANVAS_HEIGHT: u32 = 150;

/// Extensions a software context adds when created as WebGL2.
const WEBGL2_ONLY_EXTENSIONS: &[&str] = &[
    "EXT_color_buffer_float",
    "EXT_disjoint_timer_query_webgl2",
    "OES_draw_buffers_indexed",
    "WEBGL_compressed_texture_s3tc_srgb",
];

/// Data URL browsers return for a canvas that cannot be encoded.
const EMPTY_DATA_URL: &str = "data:,";

/// Which draw entry point produced a [`DrawCall`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawEntry {
    Arrays,
    Elements,
    ArraysInstanced,
    ElementsInstanced,
    ArraysInstancedAngle,
    ElementsInstancedAngle,
}

/// One recorded draw call.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCall {
    pub entry: DrawEntry,
    pub mode: GlEnum,
    pub count: i32,
    pub instances: i32,
    /// Program bound when the draw was issued.
    pub program: Option<GlObject>,
    /// Whether blending was enabled.
    pub blend: bool,
}

/// Observable side of a software context, shared with the host for tests.
#[derive(Debug, Default)]
pub struct ContextLog {
    pub draws: Vec<DrawCall>,
    pub deleted_programs: Vec<GlObject>,
    pub deleted_shaders: Vec<GlObject>,
    pub deleted_buffers: Vec<GlObject>,
    pub read_pixels_calls: usize,
}

/// Handle to a context created by [`SoftwareHost`].
#[derive(Clone)]
pub struct ContextProbe {
    pub kind: ContextKind,
    pub log: Rc<RefCell<ContextLog>>,
    pub canvas: Option<Rc<SoftwareCanvas>>,
}

impl ContextProbe {
    /// Number of draw calls issued with `program` bound.
    pub fn draws_with_program(&self, program: Option<GlObject>) -> usize {
        self.log
            .borrow()
            .draws
            .iter()
            .filter(|draw| draw.program == program)
            .count()
    }

    pub fn draw_count(&self) -> usize {
        self.log.borrow().draws.len()
    }
}

/// Real values a software context reports.
#[derive(Debug, Clone)]
pub struct SoftwareGlOptions {
    pub parameters: HashMap<GlEnum, GlValue>,
    pub extensions: Vec<String>,
    pub precision: HashMap<(GlEnum, GlEnum), ShaderPrecisionFormat>,
    pub max_vertex_attribs: u32,
    /// Force every shader compile to fail.
    pub fail_shader_compile: bool,
    /// Attach a canvas to created contexts.
    pub with_canvas: bool,
    pub canvas_width: u32,
    pub canvas_height: u32,
}

impl Default for SoftwareGlOptions {
    fn default() -> Self {
        let mut parameters = HashMap::new();
        parameters.insert(gl::VENDOR, GlValue::String("WebKit".into()));
        parameters.insert(gl::RENDERER, GlValue::String("WebKit WebGL".into()));
        parameters.insert(
            gl::VERSION,
            GlValue::String("WebGL 1.0 (OpenGL ES 2.0 SwiftShader)".into()),
        );
        parameters.insert(
            gl::SHADING_LANGUAGE_VERSION,
            GlValue::String("WebGL GLSL ES 1.0 (OpenGL ES GLSL ES 1.0 SwiftShader)".into()),
        );
        parameters.insert(
            gl::UNMASKED_VENDOR_WEBGL,
            GlValue::String("Google Inc. (Google)".into()),
        );
        parameters.insert(
            gl::UNMASKED_RENDERER_WEBGL,
            GlValue::String(
                "ANGLE (Google, Vulkan 1.3.0 (SwiftShader Device (Subzero)), SwiftShader driver)"
                    .into(),
            ),
        );
        parameters.insert(gl::MAX_TEXTURE_SIZE, GlValue::Int(8192));
        parameters.insert(gl::MAX_RENDERBUFFER_SIZE, GlValue::Int(8192));
        parameters.insert(gl::MAX_CUBE_MAP_TEXTURE_SIZE, GlValue::Int(8192));
        parameters.insert(gl::MAX_VIEWPORT_DIMS, GlValue::Int32Array(vec![8192, 8192]));
        parameters.insert(
            gl::ALIASED_POINT_SIZE_RANGE,
            GlValue::Float32Array(vec![1.0, 1024.0]),
        );
        parameters.insert(
            gl::ALIASED_LINE_WIDTH_RANGE,
            GlValue::Float32Array(vec![1.0, 1.0]),
        );
        parameters.insert(gl::MAX_TEXTURE_IMAGE_UNITS, GlValue::Int(16));
        parameters.insert(gl::MAX_VERTEX_TEXTURE_IMAGE_UNITS, GlValue::Int(16));
        parameters.insert(gl::MAX_COMBINED_TEXTURE_IMAGE_UNITS, GlValue::Int(32));
        parameters.insert(gl::MAX_VERTEX_UNIFORM_VECTORS, GlValue::Int(256));
        parameters.insert(gl::MAX_FRAGMENT_UNIFORM_VECTORS, GlValue::Int(256));
        parameters.insert(gl::MAX_VARYING_VECTORS, GlValue::Int(15));
        parameters.insert(gl::MAX_ELEMENT_INDEX, GlValue::Int(4294967295));
        parameters.insert(gl::MAX_UNIFORM_BLOCK_SIZE, GlValue::Int(16384));
        parameters.insert(gl::MAX_VERTEX_UNIFORM_BLOCKS, GlValue::Int(12));
        parameters.insert(gl::MAX_FRAGMENT_UNIFORM_BLOCKS, GlValue::Int(12));
        parameters.insert(gl::MAX_COMBINED_UNIFORM_BLOCKS, GlValue::Int(24));
        parameters.insert(gl::MAX_DRAW_BUFFERS, GlValue::Int(8));

        let float_format = ShaderPrecisionFormat {
            range_min: 127,
            range_max: 127,
            precision: 23,
        };
        let int_format = ShaderPrecisionFormat {
            range_min: 31,
            range_max: 30,
            precision: 0,
        };
        let mut precision = HashMap::new();
        for shader in [gl::VERTEX_SHADER, gl::FRAGMENT_SHADER] {
            for class in [gl::LOW_FLOAT, gl::MEDIUM_FLOAT, gl::HIGH_FLOAT] {
                precision.insert((shader, class), float_format);
            }
            for class in [gl::LOW_INT, gl::MEDIUM_INT, gl::HIGH_INT] {
                precision.insert((shader, class), int_format);
            }
        }

        let extensions = [
            "ANGLE_instanced_arrays",
            "EXT_blend_minmax",
            "EXT_color_buffer_half_float",
            "EXT_disjoint_timer_query",
            "EXT_float_blend",
            "EXT_frag_depth",
            "EXT_shader_texture_lod",
            "EXT_texture_filter_anisotropic",
            "EXT_sRGB",
            "KHR_parallel_shader_compile",
            "OES_element_index_uint",
            "OES_fbo_render_mipmap",
            "OES_standard_derivatives",
            "OES_texture_float",
            "OES_texture_float_linear",
            "OES_texture_half_float",
            "OES_texture_half_float_linear",
            "OES_vertex_array_object",
            "WEBGL_color_buffer_float",
            "WEBGL_compressed_texture_s3tc",
            "WEBGL_debug_renderer_info",
            "WEBGL_debug_shaders",
            "WEBGL_depth_texture",
            "WEBGL_draw_buffers",
            "WEBGL_lose_context",
            "WEBGL_multi_draw",
        ]
        .iter()
        .map(|name| name.to_string())
        .collect();

        Self {
            parameters,
            extensions,
            precision,
            max_vertex_attribs: 16,
            fail_shader_compile: false,
            with_canvas: true,
            canvas_width: DEFAULT_CANVAS_WIDTH,
            canvas_height: DEFAULT_CANVAS_HEIGHT,
        }
    }
}

impl SoftwareGlOptions {
    pub fn with_parameter(mut self, pname: GlEnum, value: GlValue) -> Self {
        self.parameters.insert(pname, value);
        self
    }

    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_shader_compile_failure(mut self, fail: bool) -> Self {
        self.fail_shader_compile = fail;
        self
    }

    pub fn without_canvas(mut self) -> Self {
        self.with_canvas = false;
        self
    }

    pub fn with_canvas_size(mut self, width: u32, height: u32) -> Self {
        self.canvas_width = width;
        self.canvas_height = height;
        self
    }
}

/// A canvas element with an RGBA framebuffer.
#[derive(Debug)]
pub struct SoftwareCanvas {
    image: RefCell<RgbaImage>,
    protected: Cell<bool>,
}

impl SoftwareCanvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self::from_image(RgbaImage::new(width, height))
    }

    pub fn from_image(image: RgbaImage) -> Self {
        Self {
            image: RefCell::new(image),
            protected: Cell::new(false),
        }
    }

    /// Whether `mark_protected` was called on this canvas.
    pub fn is_protected(&self) -> bool {
        self.protected.get()
    }

    /// Fills the whole canvas with one color.
    pub fn fill(&self, color: [u8; 4]) {
        for pixel in self.image.borrow_mut().pixels_mut() {
            *pixel = Rgba(color);
        }
    }

    pub fn set_pixel(&self, x: u32, y: u32, color: [u8; 4]) {
        let mut image = self.image.borrow_mut();
        if x < image.width() && y < image.height() {
            image.put_pixel(x, y, Rgba(color));
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        let image = self.image.borrow();
        if x < image.width() && y < image.height() {
            Some(image.get_pixel(x, y).0)
        } else {
            None
        }
    }

    /// A copy of the current framebuffer.
    pub fn snapshot(&self) -> RgbaImage {
        self.image.borrow().clone()
    }

    fn encode(&self, mime_type: Option<&str>, quality: Option<f64>) -> Option<(String, Vec<u8>)> {
        let image = self.image.borrow();
        if image.width() == 0 || image.height() == 0 {
            return None;
        }

        let mut bytes = Vec::new();
        match mime_type.unwrap_or("image/png") {
            "image/jpeg" => {
                let quality = quality
                    .filter(|q| (0.0..=1.0).contains(q))
                    .map(|q| (q * 100.0).round() as u8)
                    .unwrap_or(92)
                    .max(1);
                let rgb = image::DynamicImage::ImageRgba8(image.clone()).to_rgb8();
                JpegEncoder::new_with_quality(&mut bytes, quality)
                    .write_image(rgb.as_raw(), rgb.width(), rgb.height(), ColorType::Rgb8)
                    .ok()?;
                Some(("image/jpeg".to_string(), bytes))
            }
            // Unsupported types fall back to PNG, as browsers do.
            _ => {
                PngEncoder::new(&mut bytes)
                    .write_image(image.as_raw(), image.width(), image.height(), ColorType::Rgba8)
                    .ok()?;
                Some(("image/png".to_string(), bytes))
            }
        }
    }
}

impl Canvas for SoftwareCanvas {
    fn width(&self) -> u32 {
        self.image.borrow().width()
    }

    fn height(&self) -> u32 {
        self.image.borrow().height()
    }

    fn to_data_url(&self, mime_type: Option<&str>, quality: Option<f64>) -> String {
        match self.encode(mime_type, quality) {
            Some((mime, bytes)) => format!("data:{};base64,{}", mime, BASE64.encode(bytes)),
            None => EMPTY_DATA_URL.to_string(),
        }
    }

    fn to_blob(&self, mime_type: Option<&str>, quality: Option<f64>) -> Option<Blob> {
        self.encode(mime_type, quality)
            .map(|(mime_type, bytes)| Blob { mime_type, bytes })
    }

    fn offscreen_copy(&self) -> Option<Box<dyn Canvas2d>> {
        Some(Box::new(SoftwareCanvas::from_image(self.snapshot())))
    }

    fn mark_protected(&self) {
        self.protected.set(true);
    }
}

impl Canvas2d for SoftwareCanvas {
    fn get_image_data(&self, x: i32, y: i32, width: u32, height: u32) -> ImageData {
        let image = self.image.borrow();
        let mut out = ImageData::new(width, height);
        for row in 0..height {
            for col in 0..width {
                let sx = x + col as i32;
                let sy = y + row as i32;
                if sx < 0 || sy < 0 || sx as u32 >= image.width() || sy as u32 >= image.height() {
                    continue;
                }
                let offset = ((row * width + col) * 4) as usize;
                out.data[offset..offset + 4].copy_from_slice(&image.get_pixel(sx as u32, sy as u32).0);
            }
        }
        out
    }

    fn put_image_data(&mut self, data: &ImageData, x: i32, y: i32) {
        let mut image = self.image.borrow_mut();
        for row in 0..data.height {
            for col in 0..data.width {
                let dx = x + col as i32;
                let dy = y + row as i32;
                if dx < 0 || dy < 0 || dx as u32 >= image.width() || dy as u32 >= image.height() {
                    continue;
                }
                let offset = ((row * data.width + col) * 4) as usize;
                let Some(source) = data.data.get(offset..offset + 4) else {
                    continue;
                };
                let mut pixel = [0u8; 4];
                pixel.copy_from_slice(source);
                image.put_pixel(dx as u32, dy as u32, Rgba(pixel));
            }
        }
    }
}

#[derive(Debug, Default)]
struct ShaderRecord {
    compiled: bool,
}

#[derive(Debug, Default)]
struct ProgramRecord {
    shaders: Vec<GlObject>,
    linked: bool,
}

/// Software WebGL context.
pub struct SoftwareGl {
    kind: ContextKind,
    options: SoftwareGlOptions,
    canvas: Option<Rc<SoftwareCanvas>>,
    log: Rc<RefCell<ContextLog>>,
    extension_objects: HashMap<String, Rc<GlExtension>>,
    next_id: u32,
    shaders: HashMap<GlObject, ShaderRecord>,
    programs: HashMap<GlObject, ProgramRecord>,
    buffers: HashSet<GlObject>,
    current_program: Option<GlObject>,
    array_buffer: Option<GlObject>,
    active_texture: GlEnum,
    blend: bool,
    blend_func: [GlEnum; 4],
    attrib_enabled: Vec<bool>,
    clear_color: [f32; 4],
}

impl SoftwareGl {
    pub fn new(kind: ContextKind, options: SoftwareGlOptions) -> Self {
        let canvas = options
            .with_canvas
            .then(|| Rc::new(SoftwareCanvas::new(options.canvas_width, options.canvas_height)));
        let attribs = options.max_vertex_attribs as usize;
        Self {
            kind,
            options,
            canvas,
            log: Rc::new(RefCell::new(ContextLog::default())),
            extension_objects: HashMap::new(),
            next_id: 1,
            shaders: HashMap::new(),
            programs: HashMap::new(),
            buffers: HashSet::new(),
            current_program: None,
            array_buffer: None,
            active_texture: gl::TEXTURE0,
            blend: false,
            blend_func: [gl::ONE, gl::ZERO, gl::ONE, gl::ZERO],
            attrib_enabled: vec![false; attribs],
            clear_color: [0.0; 4],
        }
    }

    /// Shared draw/delete log.
    pub fn log(&self) -> Rc<RefCell<ContextLog>> {
        Rc::clone(&self.log)
    }

    /// The framebuffer canvas, if one is attached.
    pub fn software_canvas(&self) -> Option<Rc<SoftwareCanvas>> {
        self.canvas.clone()
    }

    fn allocate(&mut self) -> GlObject {
        let id = GlObject(self.next_id);
        self.next_id += 1;
        id
    }

    fn record_draw(&mut self, entry: DrawEntry, mode: GlEnum, count: i32, instances: i32) {
        let call = DrawCall {
            entry,
            mode,
            count,
            instances,
            program: self.current_program,
            blend: self.blend,
        };
        self.log.borrow_mut().draws.push(call);
    }

    fn components(format: GlEnum) -> usize {
        match format {
            gl::RGB => 3,
            gl::ALPHA | gl::LUMINANCE => 1,
            gl::LUMINANCE_ALPHA => 2,
            _ => 4,
        }
    }

    fn source_components(format: GlEnum, pixel: [u8; 4]) -> Vec<u8> {
        match format {
            gl::RGB => pixel[..3].to_vec(),
            gl::ALPHA => vec![pixel[3]],
            gl::LUMINANCE => vec![pixel[0]],
            gl::LUMINANCE_ALPHA => vec![pixel[0], pixel[3]],
            _ => pixel.to_vec(),
        }
    }
}

impl RenderingContext for SoftwareGl {
    fn context_kind(&self) -> ContextKind {
        self.kind
    }

    fn get_parameter(&mut self, pname: GlEnum) -> GlValue {
        match pname {
            gl::CURRENT_PROGRAM => GlValue::Object(self.current_program),
            gl::ARRAY_BUFFER_BINDING => GlValue::Object(self.array_buffer),
            gl::ACTIVE_TEXTURE => GlValue::Int(i64::from(self.active_texture)),
            gl::BLEND => GlValue::Bool(self.blend),
            gl::BLEND_SRC_RGB => GlValue::Int(i64::from(self.blend_func[0])),
            gl::BLEND_DST_RGB => GlValue::Int(i64::from(self.blend_func[1])),
            gl::BLEND_SRC_ALPHA => GlValue::Int(i64::from(self.blend_func[2])),
            gl::BLEND_DST_ALPHA => GlValue::Int(i64::from(self.blend_func[3])),
            gl::MAX_VERTEX_ATTRIBS => GlValue::Int(i64::from(self.options.max_vertex_attribs)),
            gl::VIEWPORT => {
                let (w, h) = self
                    .canvas
                    .as_ref()
                    .map(|c| (c.width() as i32, c.height() as i32))
                    .unwrap_or((0, 0));
                GlValue::Int32Array(vec![0, 0, w, h])
            }
            _ => self
                .options
                .parameters
                .get(&pname)
                .cloned()
                .unwrap_or(GlValue::Null),
        }
    }

    fn get_shader_precision_format(
        &mut self,
        shader_type: GlEnum,
        precision_type: GlEnum,
    ) -> Option<ShaderPrecisionFormat> {
        self.options
            .precision
            .get(&(shader_type, precision_type))
            .copied()
    }

    fn get_supported_extensions(&mut self) -> Option<Vec<String>> {
        Some(self.options.extensions.clone())
    }

    fn get_extension(&mut self, name: &str) -> Option<Rc<GlExtension>> {
        if !self.options.extensions.iter().any(|ext| ext == name) {
            return None;
        }
        let object = self
            .extension_objects
            .entry(name.to_string())
            .or_insert_with(|| Rc::new(GlExtension::new(name)));
        Some(Rc::clone(object))
    }

    fn draw_arrays(&mut self, mode: GlEnum, _first: i32, count: i32) {
        self.record_draw(DrawEntry::Arrays, mode, count, 1);
    }

    fn draw_elements(&mut self, mode: GlEnum, count: i32, _index_type: GlEnum, _offset: i64) {
        self.record_draw(DrawEntry::Elements, mode, count, 1);
    }

    fn draw_arrays_instanced(&mut self, mode: GlEnum, _first: i32, count: i32, instances: i32) {
        self.record_draw(DrawEntry::ArraysInstanced, mode, count, instances);
    }

    fn draw_elements_instanced(
        &mut self,
        mode: GlEnum,
        count: i32,
        _index_type: GlEnum,
        _offset: i64,
        instances: i32,
    ) {
        self.record_draw(DrawEntry::ElementsInstanced, mode, count, instances);
    }

    fn draw_arrays_instanced_angle(
        &mut self,
        mode: GlEnum,
        _first: i32,
        count: i32,
        instances: i32,
    ) {
        self.record_draw(DrawEntry::ArraysInstancedAngle, mode, count, instances);
    }

    fn draw_elements_instanced_angle(
        &mut self,
        mode: GlEnum,
        count: i32,
        _index_type: GlEnum,
        _offset: i64,
        instances: i32,
    ) {
        self.record_draw(DrawEntry::ElementsInstancedAngle, mode, count, instances);
    }

    fn read_pixels(
        &mut self,
        x: i32,
        y: i32,
        width: u32,
        height: u32,
        format: GlEnum,
        _pixel_type: GlEnum,
        pixels: &mut PixelBuffer,
    ) {
        self.log.borrow_mut().read_pixels_calls += 1;
        let Some(canvas) = self.canvas.as_ref() else {
            return;
        };
        let snapshot = canvas.snapshot();
        let components = Self::components(format);

        for row in 0..height {
            for col in 0..width {
                let gx = x + col as i32;
                let gy = y + row as i32;
                // GL rows count from the bottom of the framebuffer.
                let source = if gx >= 0
                    && gy >= 0
                    && (gx as u32) < snapshot.width()
                    && (gy as u32) < snapshot.height()
                {
                    snapshot.get_pixel(gx as u32, snapshot.height() - 1 - gy as u32).0
                } else {
                    [0; 4]
                };
                let values = Self::source_components(format, source);
                let base = (row * width + col) as usize * components;
                for (c, value) in values.into_iter().enumerate() {
                    let index = base + c;
                    match pixels {
                        PixelBuffer::U8(buf) | PixelBuffer::U8Clamped(buf) => {
                            if let Some(slot) = buf.get_mut(index) {
                                *slot = value;
                            }
                        }
                        PixelBuffer::U16(buf) => {
                            if let Some(slot) = buf.get_mut(index) {
                                *slot = u16::from(value) * 257;
                            }
                        }
                        PixelBuffer::U32(buf) => {
                            if let Some(slot) = buf.get_mut(index) {
                                *slot = u32::from(value) * 0x0101_0101;
                            }
                        }
                        PixelBuffer::F32(buf) => {
                            if let Some(slot) = buf.get_mut(index) {
                                *slot = f32::from(value) / 255.0;
                            }
                        }
                    }
                }
            }
        }
    }

    fn canvas(&self) -> Option<Rc<dyn Canvas>> {
        self.canvas
            .as_ref()
            .map(|canvas| Rc::clone(canvas) as Rc<dyn Canvas>)
    }

    fn clear_color(&mut self, r: f32, g: f32, b: f32, a: f32) {
        self.clear_color = [r, g, b, a];
    }

    fn clear(&mut self, mask: GlEnum) {
        if mask & gl::COLOR_BUFFER_BIT == 0 {
            return;
        }
        if let Some(canvas) = self.canvas.as_ref() {
            let color = self
                .clear_color
                .map(|channel| (channel.clamp(0.0, 1.0) * 255.0).round() as u8);
            canvas.fill(color);
        }
    }

    fn enable(&mut self, cap: GlEnum) {
        if cap == gl::BLEND {
            self.blend = true;
        }
    }

    fn disable(&mut self, cap: GlEnum) {
        if cap == gl::BLEND {
            self.blend = false;
        }
    }

    fn blend_func_separate(
        &mut self,
        src_rgb: GlEnum,
        dst_rgb: GlEnum,
        src_alpha: GlEnum,
        dst_alpha: GlEnum,
    ) {
        self.blend_func = [src_rgb, dst_rgb, src_alpha, dst_alpha];
    }

    fn active_texture(&mut self, texture: GlEnum) {
        self.active_texture = texture;
    }

    fn create_shader(&mut self, shader_type: GlEnum) -> Option<GlObject> {
        if shader_type != gl::VERTEX_SHADER && shader_type != gl::FRAGMENT_SHADER {
            return None;
        }
        let id = self.allocate();
        self.shaders.insert(id, ShaderRecord::default());
        Some(id)
    }

    fn shader_source(&mut self, _shader: GlObject, _source: &str) {}

    fn compile_shader(&mut self, shader: GlObject) {
        let fail = self.options.fail_shader_compile;
        if let Some(record) = self.shaders.get_mut(&shader) {
            record.compiled = !fail;
        }
    }

    fn get_shader_parameter(&mut self, shader: GlObject, pname: GlEnum) -> GlValue {
        match (self.shaders.get(&shader), pname) {
            (Some(record), gl::COMPILE_STATUS) => GlValue::Bool(record.compiled),
            _ => GlValue::Null,
        }
    }

    fn get_shader_info_log(&mut self, shader: GlObject) -> Option<String> {
        let record = self.shaders.get(&shader)?;
        if record.compiled {
            Some(String::new())
        } else {
            Some("ERROR: 0:1: software compiler rejected shader".to_string())
        }
    }

    fn delete_shader(&mut self, shader: GlObject) {
        if self.shaders.remove(&shader).is_some() {
            self.log.borrow_mut().deleted_shaders.push(shader);
        }
    }

    fn create_program(&mut self) -> Option<GlObject> {
        let id = self.allocate();
        self.programs.insert(id, ProgramRecord::default());
        Some(id)
    }

    fn attach_shader(&mut self, program: GlObject, shader: GlObject) {
        if let Some(record) = self.programs.get_mut(&program) {
            record.shaders.push(shader);
        }
    }

    fn link_program(&mut self, program: GlObject) {
        let shaders = &self.shaders;
        if let Some(record) = self.programs.get_mut(&program) {
            record.linked = record.shaders.len() >= 2
                && record
                    .shaders
                    .iter()
                    .all(|s| shaders.get(s).map(|r| r.compiled).unwrap_or(false));
        }
    }

    fn get_program_parameter(&mut self, program: GlObject, pname: GlEnum) -> GlValue {
        match (self.programs.get(&program), pname) {
            (Some(record), gl::LINK_STATUS) => GlValue::Bool(record.linked),
            _ => GlValue::Null,
        }
    }

    fn get_program_info_log(&mut self, program: GlObject) -> Option<String> {
        let record = self.programs.get(&program)?;
        if record.linked {
            Some(String::new())
        } else {
            Some("ERROR: program has unlinked or missing shaders".to_string())
        }
    }

    fn delete_program(&mut self, program: GlObject) {
        if self.programs.remove(&program).is_some() {
            if self.current_program == Some(program) {
                self.current_program = None;
            }
            self.log.borrow_mut().deleted_programs.push(program);
        }
    }

    fn use_program(&mut self, program: Option<GlObject>) {
        self.current_program = program;
    }

    fn get_attrib_location(&mut self, program: GlObject, _name: &str) -> i32 {
        if self.programs.contains_key(&program) {
            0
        } else {
            -1
        }
    }

    fn get_uniform_location(&mut self, program: GlObject, _name: &str) -> Option<GlObject> {
        let linked = self.programs.get(&program).map(|r| r.linked)?;
        if !linked {
            return None;
        }
        Some(self.allocate())
    }

    fn uniform1f(&mut self, _location: Option<GlObject>, _x: f32) {}

    fn uniform2f(&mut self, _location: Option<GlObject>, _x: f32, _y: f32) {}

    fn create_buffer(&mut self) -> Option<GlObject> {
        let id = self.allocate();
        self.buffers.insert(id);
        Some(id)
    }

    fn bind_buffer(&mut self, target: GlEnum, buffer: Option<GlObject>) {
        if target == gl::ARRAY_BUFFER {
            self.array_buffer = buffer;
        }
    }

    fn buffer_data_f32(&mut self, _target: GlEnum, _data: &[f32], _usage: GlEnum) {}

    fn delete_buffer(&mut self, buffer: GlObject) {
        if self.buffers.remove(&buffer) {
            if self.array_buffer == Some(buffer) {
                self.array_buffer = None;
            }
            self.log.borrow_mut().deleted_buffers.push(buffer);
        }
    }

    fn get_vertex_attrib(&mut self, index: u32, pname: GlEnum) -> GlValue {
        match (self.attrib_enabled.get(index as usize), pname) {
            (Some(enabled), gl::VERTEX_ATTRIB_ARRAY_ENABLED) => GlValue::Bool(*enabled),
            _ => GlValue::Null,
        }
    }

    fn enable_vertex_attrib_array(&mut self, index: u32) {
        if let Some(flag) = self.attrib_enabled.get_mut(index as usize) {
            *flag = true;
        }
    }

    fn disable_vertex_attrib_array(&mut self, index: u32) {
        if let Some(flag) = self.attrib_enabled.get_mut(index as usize) {
            *flag = false;
        }
    }

    fn vertex_attrib_pointer(
        &mut self,
        _index: u32,
        _size: i32,
        _data_type: GlEnum,
        _normalized: bool,
        _stride: i32,
        _offset: i64,
    ) {
    }
}

/// Context provider that creates a fresh software canvas per request.
pub struct SoftwareHost {
    options: SoftwareGlOptions,
    webgl2_supported: bool,
    available: bool,
    probes: RefCell<Vec<ContextProbe>>,
}

impl Default for SoftwareHost {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftwareHost {
    pub fn new() -> Self {
        Self::with_options(SoftwareGlOptions::default())
    }

    pub fn with_options(options: SoftwareGlOptions) -> Self {
        Self {
            options,
            webgl2_supported: true,
            available: true,
            probes: RefCell::new(Vec::new()),
        }
    }

    /// Refuse `webgl2` requests.
    pub fn without_webgl2(mut self) -> Self {
        self.webgl2_supported = false;
        self
    }

    /// Make every context request fail, as on a machine without a GPU.
    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    /// Probes for every GL context created so far, oldest first.
    pub fn probes(&self) -> Vec<ContextProbe> {
        self.probes.borrow().clone()
    }

    pub fn last_probe(&self) -> Option<ContextProbe> {
        self.probes.borrow().last().cloned()
    }
}

impl ContextProvider for SoftwareHost {
    fn get_context(&self, context_type: &str) -> Option<HostContext> {
        if !self.available {
            return None;
        }
        if context_type == "2d" {
            return Some(HostContext::TwoD(Box::new(SoftwareCanvas::new(
                self.options.canvas_width,
                self.options.canvas_height,
            ))));
        }

        let kind = ContextKind::from_type(context_type)?;
        if kind.is_webgl2() && !self.webgl2_supported {
            return None;
        }

        let mut options = self.options.clone();
        if kind.is_webgl2() {
            for name in WEBGL2_ONLY_EXTENSIONS {
                if !options.extensions.iter().any(|ext| ext == name) {
                    options.extensions.push(name.to_string());
                }
            }
        }
        let context = SoftwareGl::new(kind, options);
        self.probes.borrow_mut().push(ContextProbe {
            kind,
            log: context.log(),
            canvas: context.software_canvas(),
        });
        Some(HostContext::Gl(Box::new(context)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn webgl() -> SoftwareGl {
        SoftwareGl::new(ContextKind::WebGl, SoftwareGlOptions::default())
    }

    #[test]
    fn test_clear_fills_framebuffer() {
        let mut gl = webgl();
        gl.clear_color(1.0, 0.0, 0.0, 1.0);
        gl.clear(gl::COLOR_BUFFER_BIT);

        let mut pixels = PixelBuffer::U8(vec![0; 4]);
        gl.read_pixels(0, 0, 1, 1, gl::RGBA, gl::UNSIGNED_BYTE, &mut pixels);
        assert_eq!(pixels, PixelBuffer::U8(vec![255, 0, 0, 255]));
    }

    #[test]
    fn test_read_pixels_float_and_short() {
        let mut gl = webgl();
        gl.clear_color(0.0, 1.0, 0.0, 1.0);
        gl.clear(gl::COLOR_BUFFER_BIT);

        let mut floats = PixelBuffer::F32(vec![0.0; 4]);
        gl.read_pixels(0, 0, 1, 1, gl::RGBA, gl::FLOAT, &mut floats);
        assert_eq!(floats, PixelBuffer::F32(vec![0.0, 1.0, 0.0, 1.0]));

        let mut shorts = PixelBuffer::U16(vec![0; 3]);
        gl.read_pixels(0, 0, 1, 1, gl::RGB, gl::UNSIGNED_SHORT, &mut shorts);
        assert_eq!(shorts, PixelBuffer::U16(vec![0, 65535, 0]));
    }

    #[test]
    fn test_state_round_trip() {
        let mut gl = webgl();
        let program = gl.create_program();
        gl.use_program(program);
        gl.enable(gl::BLEND);
        gl.blend_func_separate(gl::ONE, gl::ONE, gl::ZERO, gl::ONE);
        gl.enable_vertex_attrib_array(2);

        assert_eq!(gl.get_parameter(gl::CURRENT_PROGRAM), GlValue::Object(program));
        assert_eq!(gl.get_parameter(gl::BLEND), GlValue::Bool(true));
        assert_eq!(gl.get_parameter(gl::BLEND_DST_RGB), GlValue::Int(1));
        assert_eq!(
            gl.get_vertex_attrib(2, gl::VERTEX_ATTRIB_ARRAY_ENABLED),
            GlValue::Bool(true)
        );
    }

    #[test]
    fn test_forced_compile_failure_blocks_link() {
        let options = SoftwareGlOptions::default().with_shader_compile_failure(true);
        let mut gl = SoftwareGl::new(ContextKind::WebGl, options);
        let vs = gl.create_shader(gl::VERTEX_SHADER).unwrap();
        gl.compile_shader(vs);
        assert_eq!(
            gl.get_shader_parameter(vs, gl::COMPILE_STATUS),
            GlValue::Bool(false)
        );
    }

    #[test]
    fn test_extension_objects_are_stable() {
        let mut gl = webgl();
        let a = gl.get_extension("OES_texture_float").unwrap();
        let b = gl.get_extension("OES_texture_float").unwrap();
        assert!(Rc::ptr_eq(&a, &b));
        assert!(gl.get_extension("NOT_AN_EXTENSION").is_none());
    }

    #[test]
    fn test_data_url_is_png() {
        let canvas = SoftwareCanvas::new(4, 4);
        canvas.fill([10, 20, 30, 255]);
        assert!(canvas.to_data_url(None, None).starts_with("data:image/png;base64,"));
        assert!(canvas
            .to_data_url(Some("image/jpeg"), Some(0.8))
            .starts_with("data:image/jpeg;base64,"));
        assert_eq!(SoftwareCanvas::new(0, 0).to_data_url(None, None), "data:,");
    }

    #[test]
    fn test_put_image_data_skips_missing_pixels() {
        let mut canvas = SoftwareCanvas::new(2, 2);
        canvas.fill([1, 1, 1, 255]);
        // Two pixels of data for a 2x2 region.
        let data = ImageData {
            width: 2,
            height: 2,
            data: vec![9, 9, 9, 255, 8, 8, 8, 255],
        };
        canvas.put_image_data(&data, 0, 0);

        assert_eq!(canvas.pixel(0, 0), Some([9, 9, 9, 255]));
        assert_eq!(canvas.pixel(1, 0), Some([8, 8, 8, 255]));
        assert_eq!(canvas.pixel(0, 1), Some([1, 1, 1, 255]));
        assert_eq!(canvas.pixel(1, 1), Some([1, 1, 1, 255]));
    }

    #[test]
    fn test_host_context_types() {
        let host = SoftwareHost::new().without_webgl2();
        assert!(matches!(host.get_context("2d"), Some(HostContext::TwoD(_))));
        assert!(host.get_context("webgl2").is_none());
        assert!(host.get_context("bitmaprenderer").is_none());
        assert!(host.get_context("webgl").is_some());
        assert_eq!(host.probes().len(), 1);
    }
}
