//! Host rendering surface.
//!
//! - `context` - the traits and value types a page sees (`getContext`,
//!   `getParameter`, `readPixels`, canvas export)
//! - `gl` - WebGL enum values and the capability-name table
//! - `software` - an in-memory host used by tests and the CLI probe

pub mod context;
pub mod gl;
pub mod software;

pub use context::{
    Blob, Canvas, Canvas2d, ContextKind, ContextProvider, GlExtension, GlObject, GlValue,
    HostContext, ImageData, PixelBuffer, RenderingContext, ShaderPrecisionFormat,
};
pub use software::{ContextProbe, DrawCall, DrawEntry, SoftwareCanvas, SoftwareGl, SoftwareGlOptions, SoftwareHost};
