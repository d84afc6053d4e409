//! Backend plug-in loading for Strata's inference engine.
//!
//! `strata-engine`'s [`strata_engine::BackendRegistry`] defines the
//! capability interface and the lazy-load-once lookup; this crate supplies
//! the concrete loader (dynamic shared libraries when one is configured
//! and found, the bundled CPU reference backend otherwise) and installs it
//! at startup.

pub mod cpu_reference;
pub mod loader;
pub mod script;

pub use cpu_reference::CpuReferenceBackend;
pub use loader::dynamic_loader;

use std::sync::Arc;
use strata_engine::BackendRegistry;

/// Install the default backend loader into `registry` (spec.md §4.2 "each
/// entry holds function pointers... A missing table entry fails with
/// `BackendNotLoaded`; the caller then attempts to load the backend shared
/// object from a configured directory and retries once").
///
/// Called once by `strata-executor`'s `Strata::open` when assembling a
/// fresh [`strata_engine::Database`].
pub fn install_default_backends(registry: &BackendRegistry) {
    registry.set_loader(dynamic_loader());
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_engine::BackendKind;

    #[test]
    fn installed_loader_resolves_every_backend_kind_via_reference_fallback() {
        let registry = BackendRegistry::new();
        install_default_backends(&registry);
        for kind in [
            BackendKind::Tf,
            BackendKind::TfLite,
            BackendKind::Torch,
            BackendKind::Onnx,
        ] {
            let backend = registry.resolve(kind, None).unwrap();
            assert_eq!(backend.kind(), kind);
        }
    }
}
