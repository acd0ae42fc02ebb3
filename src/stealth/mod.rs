//! WebGL Fingerprint Protection Engine
//!
//! This module intercepts the WebGL surface a page can query and answers from
//! a synthetic, seed-consistent GPU profile instead of the real device.
//!
//! # Modules
//!
//! - `prng` - seeded generator with label-based sub-generator derivation
//! - `capabilities` - vendor/tier classification and capability tables
//! - `catalog` - profile template sources (JSON file, built-in set)
//! - `profile` - the active synthetic GPU and its selection
//! - `session` - per-page coordinator and per-context state
//! - `parameters` - `getParameter` / `getShaderPrecisionFormat` spoofing
//! - `extensions` - extension enumeration and lookup filtering
//! - `draw` - one-shot shader noise on significant draw calls
//! - `readback` - pixel noise on `readPixels` and canvas export
//! - `compat` - minimal protection for fingerprint-test sites
//! - `hook` - the `getContext` decorator
//! - `shield` - public entry points (initialize, disable, status)
//! - `script` - injectable JavaScript renditions
//!
//! # Example
//!
//! ```rust,no_run
//! use std::rc::Rc;
//! use webgl_shield::config::ShieldConfig;
//! use webgl_shield::host::{ContextProvider, SoftwareHost};
//! use webgl_shield::stealth::Shield;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let host: Rc<dyn ContextProvider> = Rc::new(SoftwareHost::new());
//!     let shield = Shield::initialize(ShieldConfig::default(), host).await;
//!
//!     // Every WebGL context created through the shielded provider is protected.
//!     let gl = shield.provider().get_context("webgl");
//!     assert!(gl.is_some());
//!
//!     // Restores the original provider.
//!     shield.disable();
//! }
//! ```

pub mod capabilities;
pub mod catalog;
pub mod compat;
pub mod draw;
pub mod extensions;
pub mod hook;
pub mod parameters;
pub mod prng;
pub mod profile;
pub mod readback;
pub mod script;
pub mod session;
pub mod shield;

// Re-export commonly used types for convenience
pub use catalog::{BuiltinCatalog, CatalogError, FileCatalog, ProfileSource, ProfileTemplate};
pub use hook::{ContextHook, ShieldedProvider};
pub use prng::{Seed, SessionRng};
pub use profile::{Profile, ProfileSummary};
pub use readback::apply_noise_to_data_url;
pub use script::{preload_script, protection_script};
pub use session::{ContextState, Session};
pub use shield::{Shield, ShieldBuilder, ShieldStatus};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ShieldConfig;
    use crate::host::gl;
    use crate::host::{ContextProvider, SoftwareHost};
    use std::rc::Rc;

    #[tokio::test]
    async fn test_contexts_share_profile_not_caches() {
        let host: Rc<dyn ContextProvider> = Rc::new(SoftwareHost::new());
        let shield = Shield::initialize(ShieldConfig::default().with_seed("shared"), host).await;
        let provider = shield.provider();

        let mut a = provider.get_context("webgl").and_then(|c| c.into_gl()).unwrap();
        let mut b = provider.get_context("webgl").and_then(|c| c.into_gl()).unwrap();
        assert_eq!(
            a.get_parameter(gl::UNMASKED_RENDERER_WEBGL),
            b.get_parameter(gl::UNMASKED_RENDERER_WEBGL)
        );
        // Jitter is a function of the seed and name, so fresh caches agree.
        assert_eq!(
            a.get_parameter(gl::MAX_TEXTURE_SIZE),
            b.get_parameter(gl::MAX_TEXTURE_SIZE)
        );
        assert_eq!(shield.status().contexts_created, 2);
    }

    #[test]
    fn test_distinct_seeds_diverge() {
        let mut a = SessionRng::from_seed(Seed::from("seed-a")).derive("param-MAX_TEXTURE_SIZE");
        let mut b = SessionRng::from_seed(Seed::from("seed-b")).derive("param-MAX_TEXTURE_SIZE");
        let xs: Vec<f64> = (0..4).map(|_| a.random()).collect();
        let ys: Vec<f64> = (0..4).map(|_| b.random()).collect();
        assert_ne!(xs, ys);
    }
}
