//! Minimal protection for fingerprint-test sites.
//!
//! Only the unmasked vendor/renderer and the debug-info extension are
//! touched; every other query reaches the real context.

use crate::host::gl::{self, GlEnum};
use crate::host::{GlExtension, GlValue, RenderingContext};
use crate::stealth::extensions::DEBUG_RENDERER_INFO;
use crate::stealth::session::Session;
use std::rc::Rc;
use tracing::debug;

pub struct CompatibilityInterceptor {
    inner: Box<dyn RenderingContext>,
    session: Rc<Session>,
}

impl CompatibilityInterceptor {
    pub fn new(inner: Box<dyn RenderingContext>, session: Rc<Session>) -> Self {
        Self { inner, session }
    }
}

impl RenderingContext for CompatibilityInterceptor {
    fn get_parameter(&mut self, pname: GlEnum) -> GlValue {
        let profile = self.session.profile();
        match pname {
            gl::UNMASKED_VENDOR_WEBGL => {
                if self.session.log_calls() {
                    debug!("Spoofing unmasked vendor");
                }
                GlValue::String(profile.unmasked_vendor.clone())
            }
            gl::UNMASKED_RENDERER_WEBGL => {
                if self.session.log_calls() {
                    debug!("Spoofing unmasked renderer");
                }
                GlValue::String(profile.unmasked_renderer.clone())
            }
            _ => self.inner.get_parameter(pname),
        }
    }

    fn get_shader_precision_format(
        &mut self,
        shader_type: GlEnum,
        precision_type: GlEnum,
    ) -> Option<crate::host::ShaderPrecisionFormat> {
        self.inner
            .get_shader_precision_format(shader_type, precision_type)
    }

    fn get_supported_extensions(&mut self) -> Option<Vec<String>> {
        self.inner.get_supported_extensions()
    }

    fn get_extension(&mut self, name: &str) -> Option<Rc<GlExtension>> {
        if name == DEBUG_RENDERER_INFO {
            if self.session.log_calls() {
                debug!("Blocking {} extension", DEBUG_RENDERER_INFO);
            }
            return None;
        }
        self.inner.get_extension(name)
    }

    crate::forward_rendering_context!(@draws inner);
    crate::forward_rendering_context!(@readback inner);
    crate::forward_rendering_context!(@state inner);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ShieldConfig;
    use crate::host::{ContextProvider, SoftwareHost};
    use crate::stealth::catalog::BuiltinCatalog;

    #[test]
    fn test_only_unmasked_identity_is_spoofed() {
        let session = Rc::new(Session::new(
            ShieldConfig::default().with_seed("compat"),
            &BuiltinCatalog::templates(),
            Some("https://browserleaks.com/webgl"),
        ));
        assert!(session.compatibility_mode());

        let host = SoftwareHost::new();
        let context = host.get_context("webgl").and_then(|c| c.into_gl()).unwrap();
        let mut gl = session.protect(context);

        assert_eq!(
            gl.get_parameter(gl::UNMASKED_RENDERER_WEBGL).as_str(),
            Some(session.profile().unmasked_renderer.as_str())
        );
        assert_eq!(gl.get_parameter(gl::MAX_TEXTURE_SIZE), GlValue::Int(8192));
        assert!(gl.get_extension(DEBUG_RENDERER_INFO).is_none());
        assert!(gl
            .get_supported_extensions()
            .unwrap()
            .contains(&"WEBGL_multi_draw".to_string()));
    }
}
