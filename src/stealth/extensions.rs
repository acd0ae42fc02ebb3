//! Extension Interceptor
//!
//! Narrows `getSupportedExtensions` to the real list intersected with the
//! profile's list, minus blocked names, and refuses `getExtension` for every
//! name the enumeration would hide.

use crate::host::{ContextKind, GlExtension, RenderingContext};
use crate::stealth::session::Session;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use tracing::{debug, warn};

/// Exposes raw hardware strings; refused even when not configured as blocked.
pub const DEBUG_RENDERER_INFO: &str = "WEBGL_debug_renderer_info";

/// Spoofs extension enumeration and lookup.
pub struct ExtensionInterceptor {
    inner: Box<dyn RenderingContext>,
    session: Rc<Session>,
    /// Profile extension list for this context; empty means no profile filter.
    allowed: HashSet<String>,
    blocked: HashSet<String>,
    cache: HashMap<String, Option<Rc<GlExtension>>>,
}

impl ExtensionInterceptor {
    pub fn new(inner: Box<dyn RenderingContext>, session: Rc<Session>) -> Self {
        let kind: ContextKind = inner.context_kind();
        let allowed = session
            .profile()
            .extension_list(kind)
            .into_iter()
            .map(str::to_string)
            .collect();
        let blocked = session
            .config()
            .extensions
            .blocked_extensions
            .iter()
            .cloned()
            .collect();
        if session.debug_enabled() {
            debug!("Extension spoofing installed");
        }
        Self {
            inner,
            session,
            allowed,
            blocked,
            cache: HashMap::new(),
        }
    }

    /// Whether the page may see `name` at all.
    pub fn is_exposed(&self, name: &str) -> bool {
        !self.blocked.contains(name)
            && name != DEBUG_RENDERER_INFO
            && (self.allowed.is_empty() || self.allowed.contains(name))
    }
}

impl RenderingContext for ExtensionInterceptor {
    fn get_supported_extensions(&mut self) -> Option<Vec<String>> {
        let actual = self.inner.get_supported_extensions()?;
        let filtered: Vec<String> = actual
            .iter()
            .filter(|name| self.is_exposed(name))
            .cloned()
            .collect();

        if self.session.debug_enabled() {
            let hidden: Vec<&str> = actual
                .iter()
                .filter(|name| !filtered.contains(*name))
                .map(String::as_str)
                .collect();
            if !hidden.is_empty() {
                debug!("Blocked extensions: {}", hidden.join(", "));
            }
            debug!(
                "Supported extensions: {} (original: {})",
                filtered.len(),
                actual.len()
            );
        }
        Some(filtered)
    }

    fn get_extension(&mut self, name: &str) -> Option<Rc<GlExtension>> {
        if let Some(cached) = self.cache.get(name) {
            return cached.clone();
        }

        let result = if self.is_exposed(name) {
            self.inner.get_extension(name)
        } else {
            if name == DEBUG_RENDERER_INFO && !self.blocked.contains(name) {
                warn!("Critical fingerprinting extension blocked: {}", name);
            } else if self.session.log_calls() {
                debug!("Blocked extension: {}", name);
            }
            None
        };
        self.cache.insert(name.to_string(), result.clone());
        result
    }

    crate::forward_rendering_context!(@queries inner);
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

    fn protected(config: ShieldConfig, kind: &str) -> ExtensionInterceptor {
        let session = Rc::new(Session::new(config, &BuiltinCatalog::templates(), None));
        let host = SoftwareHost::new();
        let context = host.get_context(kind).and_then(|c| c.into_gl()).unwrap();
        ExtensionInterceptor::new(context, session)
    }

    #[test]
    fn test_enumeration_is_intersection_minus_blocked() {
        let mut gl = protected(ShieldConfig::default().with_seed("ext"), "webgl");
        let list = gl.get_supported_extensions().unwrap();

        assert!(list.contains(&"OES_texture_float".to_string()));
        assert!(!list.contains(&DEBUG_RENDERER_INFO.to_string()));
        assert!(!list.contains(&"EXT_disjoint_timer_query".to_string()));
        // Supported by the host but in no profile list.
        assert!(!list.contains(&"WEBGL_multi_draw".to_string()));
    }

    #[test]
    fn test_hidden_names_cannot_be_fetched() {
        let mut gl = protected(ShieldConfig::default().with_seed("ext"), "webgl");
        assert!(gl.get_extension("WEBGL_multi_draw").is_none());
        assert!(gl.get_extension(DEBUG_RENDERER_INFO).is_none());
        assert!(gl.get_extension("OES_texture_float").is_some());
    }

    #[test]
    fn test_debug_info_blocked_without_configuration() {
        let config = ShieldConfig::default()
            .with_seed("ext")
            .with_blocked_extensions(Vec::<String>::new());
        let mut gl = protected(config, "webgl");
        assert!(gl.get_extension(DEBUG_RENDERER_INFO).is_none());
        assert!(!gl
            .get_supported_extensions()
            .unwrap()
            .contains(&DEBUG_RENDERER_INFO.to_string()));
    }

    #[test]
    fn test_lookups_return_same_object() {
        let mut gl = protected(ShieldConfig::default().with_seed("ext"), "webgl");
        let a = gl.get_extension("OES_texture_float").unwrap();
        let b = gl.get_extension("OES_texture_float").unwrap();
        assert!(Rc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_webgl2_adds_profile_extensions() {
        let mut gl1 = protected(ShieldConfig::default().with_seed("ext2"), "webgl");
        let mut gl2 = protected(ShieldConfig::default().with_seed("ext2"), "webgl2");
        let list1 = gl1.get_supported_extensions().unwrap();
        let list2 = gl2.get_supported_extensions().unwrap();
        assert!(!list1.contains(&"EXT_color_buffer_float".to_string()));
        assert!(list2.contains(&"EXT_color_buffer_float".to_string()));
    }

    #[test]
    fn test_empty_profile_list_only_applies_blocks() {
        let mut gl = protected(ShieldConfig::default().with_seed("ext"), "webgl");
        gl.allowed.clear();
        let list = gl.get_supported_extensions().unwrap();
        assert!(list.contains(&"WEBGL_multi_draw".to_string()));
        assert!(!list.contains(&DEBUG_RENDERER_INFO.to_string()));
        assert!(gl.get_extension(DEBUG_RENDERER_INFO).is_none());
    }
}
