//! Context Hook
//!
//! Protection is installed by decorating the host's [`ContextProvider`]: while
//! hooked, pages see a [`ShieldedProvider`] that creates the real context first
//! and then wraps it through [`Session::protect`]. Unhooking hands back the
//! exact provider captured at construction.

use crate::host::{ContextKind, ContextProvider, HostContext};
use crate::stealth::session::Session;
use std::cell::RefCell;
use std::rc::Rc;
use tracing::debug;

/// `getContext` with protection applied to WebGL contexts.
pub struct ShieldedProvider {
    session: Rc<Session>,
    original: Rc<dyn ContextProvider>,
}

impl ShieldedProvider {
    pub fn new(session: Rc<Session>, original: Rc<dyn ContextProvider>) -> Self {
        Self { session, original }
    }

    pub fn session(&self) -> &Rc<Session> {
        &self.session
    }
}

impl ContextProvider for ShieldedProvider {
    fn get_context(&self, context_type: &str) -> Option<HostContext> {
        let context = self.original.get_context(context_type)?;
        if !self.session.is_master_enabled() || ContextKind::from_type(context_type).is_none() {
            return Some(context);
        }

        match context {
            HostContext::Gl(gl) => Some(HostContext::Gl(self.session.protect(gl))),
            other => Some(other),
        }
    }
}

enum HookState {
    Unhooked,
    Hooked(Rc<ShieldedProvider>),
}

/// Two-state hook over a host provider.
pub struct ContextHook {
    original: Rc<dyn ContextProvider>,
    session: Rc<Session>,
    state: RefCell<HookState>,
}

impl ContextHook {
    /// Creates an unhooked hook; call [`ContextHook::install`] to activate.
    pub fn new(original: Rc<dyn ContextProvider>, session: Rc<Session>) -> Self {
        Self {
            original,
            session,
            state: RefCell::new(HookState::Unhooked),
        }
    }

    /// Switches to the shielded provider. Returns `false` if already hooked.
    pub fn install(&self) -> bool {
        let mut state = self.state.borrow_mut();
        if matches!(*state, HookState::Hooked(_)) {
            return false;
        }
        *state = HookState::Hooked(Rc::new(ShieldedProvider::new(
            Rc::clone(&self.session),
            Rc::clone(&self.original),
        )));
        debug!("Context hook installed");
        true
    }

    /// Restores the original provider. Returns `false` if already unhooked.
    pub fn uninstall(&self) -> bool {
        let mut state = self.state.borrow_mut();
        if matches!(*state, HookState::Unhooked) {
            return false;
        }
        *state = HookState::Unhooked;
        debug!("Context hook removed");
        true
    }

    pub fn is_hooked(&self) -> bool {
        matches!(*self.state.borrow(), HookState::Hooked(_))
    }

    /// The entry point pages should currently call.
    pub fn active(&self) -> Rc<dyn ContextProvider> {
        match &*self.state.borrow() {
            HookState::Hooked(shielded) => Rc::clone(shielded) as Rc<dyn ContextProvider>,
            HookState::Unhooked => Rc::clone(&self.original),
        }
    }

    /// The provider captured before hooking.
    pub fn original(&self) -> &Rc<dyn ContextProvider> {
        &self.original
    }

    pub fn session(&self) -> &Rc<Session> {
        &self.session
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ShieldConfig;
    use crate::host::gl;
    use crate::host::{GlValue, SoftwareHost};
    use crate::stealth::catalog::BuiltinCatalog;

    fn hook(config: ShieldConfig) -> (Rc<SoftwareHost>, ContextHook) {
        let host = Rc::new(SoftwareHost::new());
        let session = Rc::new(Session::new(config, &BuiltinCatalog::templates(), None));
        let hook = ContextHook::new(Rc::clone(&host) as Rc<dyn ContextProvider>, session);
        (host, hook)
    }

    #[test]
    fn test_hook_state_machine() {
        let (_host, hook) = hook(ShieldConfig::default().with_seed("hook"));
        assert!(!hook.is_hooked());
        assert!(Rc::ptr_eq(&hook.active(), hook.original()));

        assert!(hook.install());
        assert!(!hook.install());
        assert!(!Rc::ptr_eq(&hook.active(), hook.original()));

        assert!(hook.uninstall());
        assert!(!hook.uninstall());
        assert!(Rc::ptr_eq(&hook.active(), hook.original()));
    }

    #[test]
    fn test_hooked_provider_spoofs_webgl_only() {
        let (_host, hook) = hook(ShieldConfig::default().with_seed("hook"));
        hook.install();
        let provider = hook.active();

        let mut gl = provider.get_context("webgl").and_then(|c| c.into_gl()).unwrap();
        assert_eq!(
            gl.get_parameter(gl::UNMASKED_RENDERER_WEBGL).as_str(),
            Some(hook.session().profile().unmasked_renderer.as_str())
        );
        assert_eq!(hook.session().contexts_created(), 1);
        assert!(matches!(
            provider.get_context("2d"),
            Some(HostContext::TwoD(_))
        ));
        assert!(provider.get_context("bitmaprenderer").is_none());
    }

    #[test]
    fn test_failed_creation_passes_through() {
        let host = Rc::new(SoftwareHost::new().unavailable());
        let session = Rc::new(Session::new(
            ShieldConfig::default().with_seed("none"),
            &BuiltinCatalog::templates(),
            None,
        ));
        let provider = ShieldedProvider::new(Rc::clone(&session), host);
        assert!(provider.get_context("webgl").is_none());
        assert_eq!(session.contexts_created(), 0);
    }

    #[test]
    fn test_master_switch_off_returns_real_context() {
        let (_host, hook) = hook(ShieldConfig::default().with_seed("off").with_enabled(false));
        hook.install();
        let mut gl = hook
            .active()
            .get_context("webgl")
            .and_then(|c| c.into_gl())
            .unwrap();
        assert_eq!(gl.get_parameter(gl::MAX_TEXTURE_SIZE), GlValue::Int(8192));
    }
}
