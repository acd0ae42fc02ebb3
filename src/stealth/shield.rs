//! Shield
//!
//! Public entry points: initialize a session against a host provider, switch
//! the hook off and on again, and report status.
//!
//! ```rust,no_run
//! use std::rc::Rc;
//! use webgl_shield::config::ShieldConfig;
//! use webgl_shield::host::{ContextProvider, SoftwareHost};
//! use webgl_shield::stealth::Shield;
//!
//! # async fn run() {
//! let host: Rc<dyn ContextProvider> = Rc::new(SoftwareHost::new());
//! let shield = Shield::builder(ShieldConfig::default().with_seed("page-1"))
//!     .origin("https://example.com")
//!     .initialize(host)
//!     .await;
//!
//! let provider = shield.provider();
//! let _context = provider.get_context("webgl");
//! # }
//! ```

use crate::config::ShieldConfig;
use crate::host::ContextProvider;
use crate::stealth::catalog::{load_or_fallback, BuiltinCatalog, FileCatalog, ProfileSource};
use crate::stealth::hook::ContextHook;
use crate::stealth::prng::SessionRng;
use crate::stealth::profile::{Profile, ProfileSummary};
use crate::stealth::session::Session;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::rc::Rc;
use tracing::info;
use uuid::Uuid;

/// Snapshot returned by [`Shield::status`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShieldStatus {
    /// Whether the hook is installed.
    pub initialized: bool,
    /// Hook installed and master switch on.
    pub enabled: bool,
    pub profile: ProfileSummary,
    pub session_id: Uuid,
    pub initialized_at: DateTime<Utc>,
    pub compatibility_mode: bool,
    pub contexts_created: u64,
    pub config: ShieldConfig,
}

/// Builder for [`Shield`].
pub struct ShieldBuilder {
    config: ShieldConfig,
    origin: Option<String>,
    catalog: Option<Box<dyn ProfileSource>>,
}

impl ShieldBuilder {
    pub fn new(config: ShieldConfig) -> Self {
        Self {
            config,
            origin: None,
            catalog: None,
        }
    }

    /// Page origin, used to decide compatibility mode.
    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Overrides the profile catalog source.
    pub fn catalog(mut self, catalog: Box<dyn ProfileSource>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Loads the catalog, creates the session and hooks `provider`.
    ///
    /// Catalog failures fall back to the built-in templates; initialization
    /// itself cannot fail.
    pub async fn initialize(self, provider: Rc<dyn ContextProvider>) -> Shield {
        let source: Box<dyn ProfileSource> = match self.catalog {
            Some(catalog) => catalog,
            None => match &self.config.profile.profile_path {
                Some(path) => Box::new(FileCatalog::new(path.clone())),
                None => Box::new(BuiltinCatalog),
            },
        };
        let templates = load_or_fallback(source.as_ref()).await;

        let session = Rc::new(Session::new(self.config, &templates, self.origin.as_deref()));
        let hook = ContextHook::new(provider, Rc::clone(&session));
        hook.install();

        let profile = session.profile();
        info!(
            "WebGL protection initialized with {} {} profile (session {})",
            profile.gpu_vendor(),
            profile.gpu_tier(),
            session.id()
        );

        Shield { session, hook }
    }
}

/// An initialized protection session bound to one host provider.
pub struct Shield {
    session: Rc<Session>,
    hook: ContextHook,
}

impl Shield {
    pub fn builder(config: ShieldConfig) -> ShieldBuilder {
        ShieldBuilder::new(config)
    }

    /// Shorthand for `Shield::builder(config).initialize(provider)`.
    pub async fn initialize(config: ShieldConfig, provider: Rc<dyn ContextProvider>) -> Shield {
        Self::builder(config).initialize(provider).await
    }

    pub fn config(&self) -> &ShieldConfig {
        self.session.config()
    }

    pub fn generator(&self) -> &SessionRng {
        self.session.generator()
    }

    pub fn profile(&self) -> &Profile {
        self.session.profile()
    }

    pub fn session(&self) -> &Rc<Session> {
        &self.session
    }

    /// The `getContext` entry point pages should call right now: shielded
    /// while hooked, the original provider otherwise.
    pub fn provider(&self) -> Rc<dyn ContextProvider> {
        self.hook.active()
    }

    /// Restores the original provider. Returns `false` if already disabled.
    ///
    /// Contexts protected earlier keep their interceptors.
    pub fn disable(&self) -> bool {
        let removed = self.hook.uninstall();
        if removed {
            info!("WebGL protection disabled");
        }
        removed
    }

    /// Re-installs the hook with the same session. Returns `false` if already
    /// enabled.
    pub fn enable(&self) -> bool {
        let installed = self.hook.install();
        if installed {
            info!("WebGL protection re-enabled");
        }
        installed
    }

    pub fn status(&self) -> ShieldStatus {
        let initialized = self.hook.is_hooked();
        ShieldStatus {
            initialized,
            enabled: initialized && self.session.is_master_enabled(),
            profile: self.session.profile().summary(),
            session_id: self.session.id(),
            initialized_at: self.session.initialized_at(),
            compatibility_mode: self.session.compatibility_mode(),
            contexts_created: self.session.contexts_created(),
            config: self.session.config().as_ref().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::SoftwareHost;
    use crate::stealth::catalog::ProfileTemplate;

    fn host() -> Rc<dyn ContextProvider> {
        Rc::new(SoftwareHost::new())
    }

    #[tokio::test]
    async fn test_initialize_hooks_provider() {
        let provider = host();
        let shield = Shield::initialize(
            ShieldConfig::default().with_seed("shield"),
            Rc::clone(&provider),
        )
        .await;

        assert!(!Rc::ptr_eq(&shield.provider(), &provider));
        let status = shield.status();
        assert!(status.initialized);
        assert!(status.enabled);
        assert_eq!(status.contexts_created, 0);
    }

    #[tokio::test]
    async fn test_disable_is_idempotent() {
        let provider = host();
        let shield = Shield::initialize(ShieldConfig::default(), Rc::clone(&provider)).await;

        assert!(shield.disable());
        assert!(!shield.disable());
        assert!(Rc::ptr_eq(&shield.provider(), &provider));
        assert!(!shield.status().initialized);
        assert!(!shield.status().enabled);

        assert!(shield.enable());
        assert!(!shield.enable());
        assert!(shield.status().enabled);
    }

    #[tokio::test]
    async fn test_master_switch_reflected_in_status() {
        let shield = Shield::initialize(ShieldConfig::default().with_enabled(false), host()).await;
        let status = shield.status();
        assert!(status.initialized);
        assert!(!status.enabled);
    }

    #[tokio::test]
    async fn test_custom_catalog_is_used() {
        struct Single;

        #[async_trait::async_trait]
        impl ProfileSource for Single {
            async fn load(&self) -> Result<Vec<ProfileTemplate>, crate::stealth::catalog::CatalogError> {
                Ok(vec![ProfileTemplate::chromium(
                    "Google Inc. (Intel)",
                    "ANGLE (Intel, Intel(R) Arc(TM) A770 Graphics Direct3D11 vs_5_0 ps_5_0, D3D11)",
                )])
            }

            fn describe(&self) -> String {
                "single".to_string()
            }
        }

        let shield = Shield::builder(ShieldConfig::default())
            .catalog(Box::new(Single))
            .initialize(host())
            .await;
        assert!(shield.profile().unmasked_renderer.contains("A770"));
    }

    #[tokio::test]
    async fn test_status_serializes() {
        let shield = Shield::builder(ShieldConfig::default().with_seed("status"))
            .origin("https://amiunique.org/fingerprint")
            .initialize(host())
            .await;
        let json = serde_json::to_value(shield.status()).unwrap();
        assert_eq!(json["initialized"], true);
        assert_eq!(json["compatibilityMode"], true);
        assert!(json["profile"]["webgl2Support"].is_boolean());
        assert!(json["sessionId"].is_string());
    }
}
