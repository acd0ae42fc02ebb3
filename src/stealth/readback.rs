//! Readback Interceptor
//!
//! Adds bounded, position-keyed noise to everything a page can read back
//! from a WebGL canvas: `readPixels`, `toDataURL` and `toBlob`. Each pixel
//! draws its noise from a generator keyed by its coordinates, so re-reading
//! the same pixel yields the same values within a session.
//!
//! Once the draw interceptor has injected noise into a context, readback
//! passes through untouched.

use crate::host::gl::{self, GlEnum};
use crate::host::{Blob, Canvas, Canvas2d, PixelBuffer, RenderingContext};
use crate::stealth::prng::{LabelKeyer, NoiseStream, SessionRng};
use crate::stealth::session::{ContextState, Session};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder, ImageFormat};
use std::rc::Rc;
use tracing::{debug, warn};

/// Number of components per pixel for a `readPixels` format.
pub fn components_per_pixel(format: GlEnum) -> usize {
    match format {
        gl::RGB => 3,
        gl::ALPHA | gl::LUMINANCE => 1,
        gl::LUMINANCE_ALPHA => 2,
        _ => 4,
    }
}

/// Uniform integer noise in `[-jitter, jitter]`.
fn component_noise(stream: &mut NoiseStream, jitter: i64) -> i64 {
    (stream.random() * (jitter * 2 + 1) as f64).floor() as i64 - jitter
}

/// Adds `noise` (in 8-bit units) to one component, rescaled to the buffer's
/// element type and clamped to its range.
fn perturb(buffer: &mut PixelBuffer, index: usize, noise: i64) {
    match buffer {
        PixelBuffer::U8(data) | PixelBuffer::U8Clamped(data) => {
            if let Some(v) = data.get_mut(index) {
                *v = (i64::from(*v) + noise).clamp(0, 255) as u8;
            }
        }
        PixelBuffer::U16(data) => {
            if let Some(v) = data.get_mut(index) {
                let max = i64::from(u16::MAX);
                *v = (i64::from(*v) + noise * (max / 255)).clamp(0, max) as u16;
            }
        }
        PixelBuffer::U32(data) => {
            if let Some(v) = data.get_mut(index) {
                let max = i64::from(u32::MAX);
                *v = (i64::from(*v) + noise * (max / 255)).clamp(0, max) as u32;
            }
        }
        PixelBuffer::F32(data) => {
            if let Some(v) = data.get_mut(index) {
                *v = (*v + noise as f32 / 255.0).clamp(0.0, 1.0);
            }
        }
    }
}

/// Deterministic per-pixel noise source.
#[derive(Debug, Clone)]
pub struct PixelNoise {
    keyer: LabelKeyer,
    jitter: i64,
    include_alpha: bool,
}

impl PixelNoise {
    /// Noise keyed under `derive(label)`: pixel `(x, y)` uses the stream of
    /// `derive("{x},{y}-{seed}-{label}")`.
    pub fn new(rng: &SessionRng, label: &str, jitter: u32, include_alpha: bool) -> Self {
        let sub = rng.derive(label);
        Self {
            keyer: rng.keyer(&format!("-{}", sub.seed())),
            jitter: i64::from(jitter),
            include_alpha,
        }
    }

    /// Perturbs a `width x height` block whose first pixel sits at
    /// `(origin_x, origin_y)` in framebuffer coordinates.
    pub fn apply(
        &self,
        pixels: &mut PixelBuffer,
        origin: (i64, i64),
        width: u32,
        height: u32,
        components: usize,
    ) {
        self.apply_keyed(pixels, width, height, components, |col, row| {
            (origin.0 + col, origin.1 + row)
        });
    }

    /// Perturbs an RGBA8 image laid out top to bottom.
    ///
    /// Rows are keyed in framebuffer coordinates (origin bottom-left), so a
    /// canvas pixel receives the same noise here as through `readPixels`.
    pub fn apply_rgba(&self, data: &mut Vec<u8>, width: u32, height: u32) {
        let last_row = i64::from(height) - 1;
        let mut buffer = PixelBuffer::U8Clamped(std::mem::take(data));
        self.apply_keyed(&mut buffer, width, height, 4, |col, row| (col, last_row - row));
        if let PixelBuffer::U8Clamped(noisy) = buffer {
            *data = noisy;
        }
    }

    fn apply_keyed<F>(
        &self,
        pixels: &mut PixelBuffer,
        width: u32,
        height: u32,
        components: usize,
        key: F,
    ) where
        F: Fn(i64, i64) -> (i64, i64),
    {
        if self.jitter == 0 {
            return;
        }
        for row in 0..height {
            for col in 0..width {
                let base = (row as usize * width as usize + col as usize) * components;
                let (x, y) = key(i64::from(col), i64::from(row));
                let mut stream = self.keyer.pixel_stream(x, y);
                for c in 0..components {
                    if c == 3 && !self.include_alpha {
                        continue;
                    }
                    let noise = component_noise(&mut stream, self.jitter);
                    perturb(pixels, base + c, noise);
                }
            }
        }
    }
}

/// Export wrapper around a context's canvas.
pub struct ProtectedCanvas {
    inner: Rc<dyn Canvas>,
    noise: PixelNoise,
    state: Rc<ContextState>,
}

impl ProtectedCanvas {
    pub fn new(inner: Rc<dyn Canvas>, noise: PixelNoise, state: Rc<ContextState>) -> Self {
        Self {
            inner,
            noise,
            state,
        }
    }

    /// Copies the canvas off-screen and perturbs the copy; `None` when noise
    /// is not wanted or no copy can be made.
    fn noisy_copy(&self) -> Option<Box<dyn Canvas2d>> {
        if self.state.noise_applied() {
            return None;
        }
        let Some(mut copy) = self.inner.offscreen_copy() else {
            warn!("Could not create an off-screen canvas, exporting without noise");
            return None;
        };
        let (width, height) = (copy.width(), copy.height());
        let mut image = copy.get_image_data(0, 0, width, height);
        self.noise.apply_rgba(&mut image.data, width, height);
        copy.put_image_data(&image, 0, 0);
        Some(copy)
    }
}

impl Canvas for ProtectedCanvas {
    fn width(&self) -> u32 {
        self.inner.width()
    }

    fn height(&self) -> u32 {
        self.inner.height()
    }

    fn to_data_url(&self, mime_type: Option<&str>, quality: Option<f64>) -> String {
        match self.noisy_copy() {
            Some(copy) => copy.to_data_url(mime_type, quality),
            None => self.inner.to_data_url(mime_type, quality),
        }
    }

    fn to_blob(&self, mime_type: Option<&str>, quality: Option<f64>) -> Option<Blob> {
        match self.noisy_copy() {
            Some(copy) => copy.to_blob(mime_type, quality),
            None => self.inner.to_blob(mime_type, quality),
        }
    }

    fn offscreen_copy(&self) -> Option<Box<dyn Canvas2d>> {
        self.inner.offscreen_copy()
    }

    fn mark_protected(&self) {
        self.inner.mark_protected()
    }
}

/// Spoofs `readPixels` and the canvas export entry points.
pub struct ReadbackInterceptor {
    inner: Box<dyn RenderingContext>,
    session: Rc<Session>,
    state: Rc<ContextState>,
    noise: PixelNoise,
    canvas: Rc<ProtectedCanvas>,
}

impl ReadbackInterceptor {
    /// Wraps `inner`, or returns it unchanged when it has no canvas.
    pub fn install(
        inner: Box<dyn RenderingContext>,
        session: Rc<Session>,
        state: Rc<ContextState>,
    ) -> Box<dyn RenderingContext> {
        let Some(canvas) = inner.canvas() else {
            warn!("No canvas found for WebGL context, readback protection not installed");
            return inner;
        };

        let settings = &session.config().readback;
        let noise = PixelNoise::new(
            session.generator(),
            "readback-noise",
            settings.pixel_jitter,
            settings.include_alpha,
        );
        let canvas = Rc::new(ProtectedCanvas::new(
            canvas,
            noise.clone(),
            Rc::clone(&state),
        ));
        if session.debug_enabled() {
            debug!("Readback spoofing installed for context {}", state.id());
        }
        Box::new(Self {
            inner,
            session,
            state,
            noise,
            canvas,
        })
    }
}

impl RenderingContext for ReadbackInterceptor {
    fn read_pixels(
        &mut self,
        x: i32,
        y: i32,
        width: u32,
        height: u32,
        format: GlEnum,
        pixel_type: GlEnum,
        pixels: &mut PixelBuffer,
    ) {
        self.inner
            .read_pixels(x, y, width, height, format, pixel_type, pixels);

        if self.state.noise_applied() {
            if self.session.log_calls() {
                debug!("Skipping readPixels noise (already applied by draw spoofing)");
            }
            return;
        }

        self.noise.apply(
            pixels,
            (i64::from(x), i64::from(y)),
            width,
            height,
            components_per_pixel(format),
        );
        if self.session.log_calls() {
            debug!("Applied noise to readPixels ({}x{})", width, height);
        }
    }

    fn canvas(&self) -> Option<Rc<dyn Canvas>> {
        Some(Rc::clone(&self.canvas) as Rc<dyn Canvas>)
    }

    crate::forward_rendering_context!(@queries inner);
    crate::forward_rendering_context!(@extensions inner);
    crate::forward_rendering_context!(@draws inner);
    crate::forward_rendering_context!(@state inner);
}

const PNG_DATA_URL_PREFIX: &str = "data:image/png";

/// Applies deterministic pixel noise to a PNG data URL.
///
/// Anything that is not a decodable PNG data URL comes back unchanged.
pub fn apply_noise_to_data_url(data_url: &str, session: &Session) -> String {
    if !data_url.starts_with(PNG_DATA_URL_PREFIX) {
        return data_url.to_string();
    }
    match noisy_png(data_url, session) {
        Some(noisy) => noisy,
        None => {
            warn!("Error applying noise to data URL, returning it unchanged");
            data_url.to_string()
        }
    }
}

fn noisy_png(data_url: &str, session: &Session) -> Option<String> {
    let (_, payload) = data_url.split_once(";base64,")?;
    let bytes = BASE64.decode(payload.trim()).ok()?;
    let mut image = image::load_from_memory_with_format(&bytes, ImageFormat::Png)
        .ok()?
        .to_rgba8();

    let settings = &session.config().readback;
    let jitter = i64::from(settings.pixel_jitter);
    let rng = session.generator();
    let keyer = rng.keyer(&format!("-{}", rng.derive("dataurl-noise").seed()));

    for (x, y, pixel) in image.enumerate_pixels_mut() {
        let mut stream = keyer.pixel_stream(i64::from(x), i64::from(y));
        for channel in pixel.0.iter_mut().take(3) {
            let noise = component_noise(&mut stream, jitter);
            *channel = (i64::from(*channel) + noise).clamp(0, 255) as u8;
        }
        if settings.include_alpha {
            let noise = (stream.random() * (jitter + 1) as f64).floor() as i64 - jitter / 2;
            pixel.0[3] = (i64::from(pixel.0[3]) + noise).clamp(0, 255) as u8;
        }
    }

    let mut encoded = Vec::new();
    PngEncoder::new(&mut encoded)
        .write_image(image.as_raw(), image.width(), image.height(), ColorType::Rgba8)
        .ok()?;
    Some(format!(
        "{};base64,{}",
        PNG_DATA_URL_PREFIX,
        BASE64.encode(encoded)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ShieldConfig;
    use crate::host::{ContextProvider, SoftwareCanvas, SoftwareGlOptions, SoftwareHost};
    use crate::stealth::catalog::BuiltinCatalog;
    use crate::stealth::prng::Seed;

    fn session(config: ShieldConfig) -> Rc<Session> {
        Rc::new(Session::new(config, &BuiltinCatalog::templates(), None))
    }

    fn read(gl: &mut dyn RenderingContext, x: i32, y: i32, w: u32, h: u32) -> Vec<u8> {
        let mut pixels = PixelBuffer::U8(vec![0; (w * h * 4) as usize]);
        gl.read_pixels(x, y, w, h, gl::RGBA, gl::UNSIGNED_BYTE, &mut pixels);
        match pixels {
            PixelBuffer::U8(data) => data,
            _ => unreachable!(),
        }
    }

    fn grey_context(session: &Rc<Session>, state: &Rc<ContextState>) -> Box<dyn RenderingContext> {
        let host = SoftwareHost::new();
        let mut context = host.get_context("webgl").and_then(|c| c.into_gl()).unwrap();
        context.clear_color(0.5, 0.5, 0.5, 1.0);
        context.clear(gl::COLOR_BUFFER_BIT);
        ReadbackInterceptor::install(context, Rc::clone(session), Rc::clone(state))
    }

    #[test]
    fn test_read_pixels_is_stable_and_bounded() {
        let session = session(ShieldConfig::default().with_seed("readback"));
        let state = ContextState::new(1);
        let mut gl = grey_context(&session, &state);

        let first = read(gl.as_mut(), 10, 10, 4, 4);
        let second = read(gl.as_mut(), 10, 10, 4, 4);
        assert_eq!(first, second);

        for pixel in first.chunks(4) {
            for c in &pixel[..3] {
                assert!((125..=131).contains(c), "{}", c);
            }
            assert_eq!(pixel[3], 255);
        }
        assert!(first.chunks(4).any(|p| p[..3] != [128, 128, 128]));
    }

    #[test]
    fn test_same_pixel_same_noise_across_regions() {
        let session = session(ShieldConfig::default().with_seed("regions"));
        let state = ContextState::new(1);
        let mut gl = grey_context(&session, &state);

        let block = read(gl.as_mut(), 0, 0, 3, 3);
        let single = read(gl.as_mut(), 2, 1, 1, 1);
        let index = (3 + 2) * 4;
        assert_eq!(&block[index..index + 4], &single[..]);
    }

    #[test]
    fn test_pass_through_after_draw_noise() {
        let session = session(ShieldConfig::default().with_seed("skip"));
        let state = ContextState::new(1);
        let mut gl = grey_context(&session, &state);
        state.mark_noise_applied();

        let pixels = read(gl.as_mut(), 0, 0, 2, 2);
        assert!(pixels.chunks(4).all(|p| p == [128, 128, 128, 255]));
    }

    #[test]
    fn test_alpha_included_when_configured() {
        let session = session(
            ShieldConfig::default()
                .with_seed("alpha")
                .with_pixel_jitter(3, true),
        );
        let state = ContextState::new(1);
        let host = SoftwareHost::new();
        let mut context = host.get_context("webgl").and_then(|c| c.into_gl()).unwrap();
        context.clear_color(0.5, 0.5, 0.5, 0.5);
        context.clear(gl::COLOR_BUFFER_BIT);
        let mut gl = ReadbackInterceptor::install(context, session, state);

        let pixels = read(gl.as_mut(), 0, 0, 8, 8);
        assert!(pixels.chunks(4).any(|p| p[3] != 128));
    }

    #[test]
    fn test_typed_buffers_are_rescaled() {
        let rng = SessionRng::from_seed(Seed::from("typed"));
        let noise = PixelNoise::new(&rng, "readback-noise", 3, false);

        let mut floats = PixelBuffer::F32(vec![0.5; 16]);
        noise.apply(&mut floats, (0, 0), 2, 2, 4);
        if let PixelBuffer::F32(values) = &floats {
            assert!(values.iter().all(|v| (*v - 0.5).abs() <= 3.0 / 255.0 + 1e-6));
        }

        let mut shorts = PixelBuffer::U16(vec![65535; 16]);
        noise.apply(&mut shorts, (0, 0), 2, 2, 4);
        if let PixelBuffer::U16(values) = &shorts {
            assert!(values
                .iter()
                .all(|v| *v == 65535 || (65535 - *v) % 257 == 0));
        }
    }

    #[test]
    fn test_export_noise_matches_framebuffer_rows() {
        let rng = SessionRng::from_seed(Seed::from("rows"));
        let noise = PixelNoise::new(&rng, "readback-noise", 3, false);
        let (width, height) = (3u32, 4u32);

        let mut image = vec![128u8; (width * height * 4) as usize];
        noise.apply_rgba(&mut image, width, height);

        for top_row in 0..height {
            for col in 0..width {
                let mut pixel = PixelBuffer::U8(vec![128; 4]);
                let gl_row = i64::from(height - 1 - top_row);
                noise.apply(&mut pixel, (i64::from(col), gl_row), 1, 1, 4);
                let offset = ((top_row * width + col) * 4) as usize;
                assert_eq!(pixel, PixelBuffer::U8(image[offset..offset + 4].to_vec()));
            }
        }
    }

    #[test]
    fn test_missing_canvas_skips_install() {
        let session = session(ShieldConfig::default().with_seed("nocanvas"));
        let host = SoftwareHost::with_options(SoftwareGlOptions::default().without_canvas());
        let context = host.get_context("webgl").and_then(|c| c.into_gl()).unwrap();
        let gl = ReadbackInterceptor::install(context, session, ContextState::new(1));
        assert!(gl.canvas().is_none());
    }

    #[test]
    fn test_export_leaves_original_canvas_untouched() {
        let session = session(ShieldConfig::default().with_seed("export"));
        let state = ContextState::new(1);
        let host = SoftwareHost::new();
        let mut context = host.get_context("webgl").and_then(|c| c.into_gl()).unwrap();
        context.clear_color(0.25, 0.5, 0.75, 1.0);
        context.clear(gl::COLOR_BUFFER_BIT);
        let original = host.last_probe().and_then(|p| p.canvas).unwrap();
        let plain = original.to_data_url(None, None);

        let gl = ReadbackInterceptor::install(context, Rc::clone(&session), Rc::clone(&state));
        let canvas = gl.canvas().unwrap();
        let noisy = canvas.to_data_url(None, None);
        assert_ne!(noisy, plain);
        assert_eq!(canvas.to_data_url(None, None), noisy);
        assert_eq!(original.to_data_url(None, None), plain);
        assert!(canvas.to_blob(Some("image/png"), None).is_some());

        state.mark_noise_applied();
        assert_eq!(canvas.to_data_url(None, None), plain);
    }

    #[test]
    fn test_data_url_noise() {
        let session = session(ShieldConfig::default().with_seed("dataurl"));
        let canvas = SoftwareCanvas::new(16, 16);
        canvas.fill([100, 150, 200, 255]);
        let url = canvas.to_data_url(None, None);

        let noisy = apply_noise_to_data_url(&url, &session);
        assert_ne!(noisy, url);
        assert!(noisy.starts_with("data:image/png;base64,"));
        assert_eq!(apply_noise_to_data_url(&url, &session), noisy);

        assert_eq!(apply_noise_to_data_url("data:image/jpeg;base64,AAAA", &session), "data:image/jpeg;base64,AAAA");
        assert_eq!(apply_noise_to_data_url("data:image/png;base64,!!!", &session), "data:image/png;base64,!!!");
    }
}
