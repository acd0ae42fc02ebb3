//! Session Coordinator
//!
//! One [`Session`] exists per protected page. It owns the resolved
//! configuration, the seeded generator and the selected profile, keeps the
//! runtime feature switches, and stacks the interceptors onto every new
//! rendering context.
//!
//! Each protected context gets a fresh [`ContextState`]; its `noise_applied`
//! flag is shared only by the interceptors attached to that one context.

use crate::config::{CompatibilitySettings, Feature, ShieldConfig};
use crate::host::RenderingContext;
use crate::stealth::catalog::ProfileTemplate;
use crate::stealth::compat::CompatibilityInterceptor;
use crate::stealth::draw::DrawInterceptor;
use crate::stealth::extensions::ExtensionInterceptor;
use crate::stealth::parameters::ParameterInterceptor;
use crate::stealth::prng::{Seed, SessionRng};
use crate::stealth::profile::{select_profile, Profile};
use crate::stealth::readback::ReadbackInterceptor;
use chrono::{DateTime, Utc};
use std::cell::Cell;
use std::rc::Rc;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

/// Per-context coordination record.
#[derive(Debug)]
pub struct ContextState {
    id: u64,
    noise_applied: Cell<bool>,
}

impl ContextState {
    pub fn new(id: u64) -> Rc<Self> {
        Rc::new(Self {
            id,
            noise_applied: Cell::new(false),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether draw-level noise already reached this context's framebuffer.
    pub fn noise_applied(&self) -> bool {
        self.noise_applied.get()
    }

    pub(crate) fn mark_noise_applied(&self) {
        self.noise_applied.set(true);
    }
}

#[derive(Debug)]
struct FeatureFlags {
    parameters: Cell<bool>,
    extensions: Cell<bool>,
    draw_calls: Cell<bool>,
    readback: Cell<bool>,
}

impl FeatureFlags {
    fn from_config(config: &ShieldConfig) -> Self {
        Self {
            parameters: Cell::new(config.parameters.enabled),
            extensions: Cell::new(config.extensions.enabled),
            draw_calls: Cell::new(config.draw_calls.enabled),
            readback: Cell::new(config.readback.enabled),
        }
    }

    fn flag(&self, feature: Feature) -> &Cell<bool> {
        match feature {
            Feature::Parameters => &self.parameters,
            Feature::Extensions => &self.extensions,
            Feature::DrawCalls => &self.draw_calls,
            Feature::Readback => &self.readback,
        }
    }
}

/// Whether `origin` belongs to one of the configured fingerprint-test hosts.
///
/// `origin` may be a full URL or a bare host name; subdomains of a listed
/// host match too.
pub fn compatibility_for_origin(origin: &str, settings: &CompatibilitySettings) -> bool {
    if !settings.enabled {
        return false;
    }
    let host = match Url::parse(origin) {
        Ok(url) => match url.host_str() {
            Some(host) => host.to_ascii_lowercase(),
            None => return false,
        },
        Err(_) => origin.trim().to_ascii_lowercase(),
    };
    settings.hosts.iter().any(|listed| {
        let listed = listed.trim().to_ascii_lowercase();
        !listed.is_empty()
            && (host == listed
                || host
                    .strip_suffix(listed.as_str())
                    .map_or(false, |prefix| prefix.ends_with('.')))
    })
}

/// The per-page protection session.
#[derive(Debug)]
pub struct Session {
    id: Uuid,
    config: Rc<ShieldConfig>,
    rng: SessionRng,
    profile: Rc<Profile>,
    enabled: Cell<bool>,
    features: FeatureFlags,
    compatibility: bool,
    contexts_created: Cell<u64>,
    initialized_at: DateTime<Utc>,
}

impl Session {
    /// Creates a session: seeds the generator, selects the profile and
    /// resolves compatibility mode for `origin`.
    pub fn new(config: ShieldConfig, templates: &[ProfileTemplate], origin: Option<&str>) -> Self {
        let seed = config.seed.clone().unwrap_or_else(Seed::generate);
        let mut rng = SessionRng::from_seed(seed);
        let profile = select_profile(templates, &mut rng, &config.profile);

        let compatibility = origin
            .map(|origin| compatibility_for_origin(origin, &config.compatibility))
            .unwrap_or(false);

        if config.debug.enabled {
            info!(
                "Selected profile: {} {} ({})",
                profile.gpu_vendor(),
                profile.gpu_tier(),
                profile.unmasked_renderer
            );
        }
        if compatibility {
            info!("Fingerprinting test site detected, using minimal protection mode");
        }

        Self {
            id: Uuid::new_v4(),
            features: FeatureFlags::from_config(&config),
            enabled: Cell::new(config.enabled),
            config: Rc::new(config),
            rng,
            profile: Rc::new(profile),
            compatibility,
            contexts_created: Cell::new(0),
            initialized_at: Utc::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &Rc<ShieldConfig> {
        &self.config
    }

    pub fn generator(&self) -> &SessionRng {
        &self.rng
    }

    pub fn seed(&self) -> &Seed {
        self.rng.seed()
    }

    pub fn profile(&self) -> &Rc<Profile> {
        &self.profile
    }

    pub fn initialized_at(&self) -> DateTime<Utc> {
        self.initialized_at
    }

    /// Whether the page origin put this session into compatibility mode.
    pub fn compatibility_mode(&self) -> bool {
        self.compatibility
    }

    /// Number of contexts protected so far.
    pub fn contexts_created(&self) -> u64 {
        self.contexts_created.get()
    }

    pub fn is_master_enabled(&self) -> bool {
        self.enabled.get()
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.set(enabled);
    }

    /// False whenever the master switch is off, otherwise the feature's flag.
    pub fn is_enabled(&self, feature: Feature) -> bool {
        self.enabled.get() && self.features.flag(feature).get()
    }

    pub fn set_feature(&self, feature: Feature, enabled: bool) {
        self.features.flag(feature).set(enabled);
    }

    /// Jitter fraction for the active profile's tier.
    pub fn jitter(&self) -> f64 {
        self.config.jitter_for_tier(self.profile.gpu_tier())
    }

    pub(crate) fn debug_enabled(&self) -> bool {
        self.config.debug.enabled
    }

    pub(crate) fn log_calls(&self) -> bool {
        self.config.debug.log_calls
    }

    pub(crate) fn log_parameters(&self) -> bool {
        self.config.debug.log_parameters
    }

    /// Wraps a freshly created WebGL context with the enabled interceptors.
    ///
    /// Returns the context untouched when protection is off. A WebGL2 context
    /// requested against a profile without WebGL2 support only gets the
    /// unmasked identity and extension gating, with no WebGL2 tables.
    pub fn protect(
        self: &Rc<Self>,
        context: Box<dyn RenderingContext>,
    ) -> Box<dyn RenderingContext> {
        if !self.is_master_enabled() {
            return context;
        }

        let kind = context.context_kind();
        if kind.is_webgl2() && !self.profile.supports_webgl2 {
            warn!("Skipping WebGL2 spoofing (profile does not support WebGL2)");
            // Identity and extension gating still apply so the real GPU
            // strings never reach the page.
            let mut context = context;
            if self.is_enabled(Feature::Extensions) {
                context = Box::new(ExtensionInterceptor::new(context, Rc::clone(self)));
            }
            return Box::new(CompatibilityInterceptor::new(context, Rc::clone(self)));
        }

        let id = self.contexts_created.get() + 1;
        self.contexts_created.set(id);
        let state = ContextState::new(id);

        if self.config.debug.visual_indicator {
            if let Some(canvas) = context.canvas() {
                canvas.mark_protected();
            }
        }

        if self.compatibility {
            debug!("Minimal protection applied to context {}", id);
            return Box::new(CompatibilityInterceptor::new(context, Rc::clone(self)));
        }

        // The draw interceptor sits innermost so its state save/restore talks
        // to the real context, not to spoofed parameters.
        let mut context = context;
        if self.is_enabled(Feature::DrawCalls) {
            context = Box::new(DrawInterceptor::new(context, Rc::clone(self), Rc::clone(&state)));
        }
        if self.is_enabled(Feature::Readback) {
            context = ReadbackInterceptor::install(context, Rc::clone(self), Rc::clone(&state));
        }
        if self.is_enabled(Feature::Extensions) {
            context = Box::new(ExtensionInterceptor::new(context, Rc::clone(self)));
        }
        if self.is_enabled(Feature::Parameters) {
            context = Box::new(ParameterInterceptor::new(context, Rc::clone(self)));
        }

        if self.debug_enabled() {
            debug!("WebGL context spoofed: {} (context {})", kind, id);
        }
        context
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{ContextKind, ContextProvider, SoftwareHost};
    use crate::stealth::catalog::BuiltinCatalog;

    fn session(config: ShieldConfig) -> Rc<Session> {
        Rc::new(Session::new(config, &BuiltinCatalog::templates(), None))
    }

    #[test]
    fn test_master_switch_overrides_features() {
        let session = session(ShieldConfig::default().with_seed("flags"));
        assert!(session.is_enabled(Feature::Parameters));
        assert!(!session.is_enabled(Feature::DrawCalls));

        session.set_feature(Feature::DrawCalls, true);
        assert!(session.is_enabled(Feature::DrawCalls));

        session.set_enabled(false);
        for feature in Feature::ALL {
            assert!(!session.is_enabled(feature));
        }
    }

    #[test]
    fn test_same_seed_same_profile() {
        let a = session(ShieldConfig::default().with_seed("profile-seed"));
        let b = session(ShieldConfig::default().with_seed("profile-seed"));
        assert_eq!(a.profile(), b.profile());
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_generated_seed_when_absent() {
        let session = session(ShieldConfig::default());
        assert!(matches!(session.seed(), Seed::Number(_)));
    }

    #[test]
    fn test_compatibility_hosts() {
        let settings = CompatibilitySettings::default();
        assert!(compatibility_for_origin("https://browserleaks.com/webgl", &settings));
        assert!(compatibility_for_origin("https://www.browserleaks.com", &settings));
        assert!(compatibility_for_origin("amiunique.org", &settings));
        assert!(!compatibility_for_origin("https://notbrowserleaks.com", &settings));
        assert!(!compatibility_for_origin("https://example.com", &settings));

        let disabled = CompatibilitySettings {
            enabled: false,
            ..Default::default()
        };
        assert!(!compatibility_for_origin("https://browserleaks.com", &disabled));
    }

    #[test]
    fn test_each_context_gets_fresh_state() {
        let session = session(ShieldConfig::default().with_seed("ctx"));
        let host = SoftwareHost::new();
        for _ in 0..3 {
            let context = host.get_context("webgl").and_then(|c| c.into_gl()).unwrap();
            let protected = session.protect(context);
            assert_eq!(protected.context_kind(), ContextKind::WebGl);
        }
        assert_eq!(session.contexts_created(), 3);
    }

    #[test]
    fn test_disabled_session_leaves_context_alone() {
        let session = session(ShieldConfig::default().with_seed("off").with_enabled(false));
        let host = SoftwareHost::new();
        let context = host.get_context("webgl").and_then(|c| c.into_gl()).unwrap();
        let _ = session.protect(context);
        assert_eq!(session.contexts_created(), 0);
    }

    #[test]
    fn test_webgl2_without_profile_support_keeps_identity() {
        let template = ProfileTemplate::chromium(
            "Google Inc. (Intel)",
            "ANGLE (Intel, Intel(R) HD Graphics 4600 Direct3D11 vs_5_0 ps_5_0)",
        )
        .without_webgl2();
        let session = Rc::new(Session::new(
            ShieldConfig::default().with_seed("no-webgl2"),
            &[template],
            None,
        ));
        assert!(!session.profile().supports_webgl2);

        let host = SoftwareHost::new();
        let context = host.get_context("webgl2").and_then(|c| c.into_gl()).unwrap();
        let mut gl = session.protect(context);

        assert_eq!(gl.context_kind(), ContextKind::WebGl2);
        assert_eq!(
            gl.get_parameter(crate::host::gl::UNMASKED_RENDERER_WEBGL).as_str(),
            Some(session.profile().unmasked_renderer.as_str())
        );
        assert!(gl
            .get_extension(crate::stealth::extensions::DEBUG_RENDERER_INFO)
            .is_none());
        assert!(!gl
            .get_supported_extensions()
            .unwrap()
            .iter()
            .any(|name| name == "WEBGL_debug_renderer_info"));
        // No WebGL2 tables: plain capabilities report the real device.
        assert_eq!(
            gl.get_parameter(crate::host::gl::MAX_TEXTURE_SIZE),
            crate::host::GlValue::Int(8192)
        );
    }

    #[test]
    fn test_visual_indicator_marks_canvas() {
        let config = ShieldConfig::default()
            .with_seed("indicator")
            .with_debug(crate::config::DebugSettings {
                visual_indicator: true,
                ..Default::default()
            });
        let session = session(config);
        let host = SoftwareHost::new();
        let context = host.get_context("webgl").and_then(|c| c.into_gl()).unwrap();
        let _protected = session.protect(context);

        let canvas = host.last_probe().and_then(|p| p.canvas).unwrap();
        assert!(canvas.is_protected());
    }
}
