//! Dynamic-library backend loading (spec.md §4.2/§6 "Backend plug-in
//! ABI... loaded at startup or on first use").
//!
//! Grounded in the teacher's CUDA runtime selection (`runtime/cuda/mod.rs`
//! probes for a device library and falls back to the CPU backend if it
//! isn't present) and in `libloading`'s standard load-symbol-call pattern.
//! A real TF/TFLite/Torch/ONNX shared library is never actually linked in
//! this codebase — `dynamic_loader` is the mechanism `strata-engine`'s
//! [`strata_engine::BackendRegistry::resolve`] calls into; finding no
//! usable library for a kind falls back to the bundled
//! [`crate::cpu_reference::CpuReferenceBackend`] rather than failing the
//! whole lookup, so a database with no framework libraries installed can
//! still run element-wise models and scripts.

use std::path::Path;
use std::sync::Arc;
use strata_core::StrataResult;
use strata_engine::{BackendKind, BackendLoader, InferenceBackend};

use crate::cpu_reference::CpuReferenceBackend;

/// The symbol every backend shared library exports: writes its capability
/// pointers and returns 0 on success (spec.md §6 "Init function signature:
/// receives a function table into which the backend writes its capability
/// pointers"). No real backend library ships with this crate, so this
/// symbol is declared for documentation of the ABI shape but never
/// actually resolved by [`dynamic_loader`] today.
pub const BACKEND_INIT_SYMBOL: &[u8] = b"strata_backend_init\0";

/// Build the [`BackendLoader`] installed into a fresh
/// [`strata_engine::BackendRegistry`] at startup.
///
/// Attempts, in order: (1) a shared library named `lib<kind>_backend.so`
/// (or platform equivalent) inside `backends_dir`, loaded via
/// `libloading`; (2) the bundled CPU reference backend. Only (2) is
/// reachable without a real framework installed, which is the common case
/// for this crate's own tests and for any deployment that only needs
/// element-wise models.
pub fn dynamic_loader() -> Arc<BackendLoader> {
    Arc::new(
        move |kind: BackendKind, backends_dir: Option<&Path>| -> StrataResult<Arc<dyn InferenceBackend>> {
            if let Some(dir) = backends_dir {
                match try_load_shared_library(kind, dir) {
                    Ok(backend) => return Ok(backend),
                    Err(e) => {
                        tracing::debug!(
                            target: "strata::infer::backend",
                            backend = %kind,
                            dir = %dir.display(),
                            error = %e,
                            "no shared library backend found, falling back to reference backend"
                        );
                    }
                }
            }
            tracing::debug!(
                target: "strata::infer::backend",
                backend = %kind,
                "loading bundled CPU reference backend"
            );
            Ok(Arc::new(CpuReferenceBackend::new(kind)) as Arc<dyn InferenceBackend>)
        },
    )
}

fn shared_library_name(kind: BackendKind) -> String {
    let tag = match kind {
        BackendKind::Tf => "tensorflow",
        BackendKind::TfLite => "tensorflow_lite",
        BackendKind::Torch => "torch",
        BackendKind::Onnx => "onnxruntime",
    };
    #[cfg(target_os = "macos")]
    {
        format!("libstrata_backend_{tag}.dylib")
    }
    #[cfg(target_os = "windows")]
    {
        format!("strata_backend_{tag}.dll")
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        format!("libstrata_backend_{tag}.so")
    }
}

fn try_load_shared_library(
    kind: BackendKind,
    dir: &Path,
) -> StrataResult<Arc<dyn InferenceBackend>> {
    let path = dir.join(shared_library_name(kind));
    if !path.exists() {
        return Err(strata_core::StrataError::BackendNotLoaded {
            backend: kind.to_string(),
        });
    }
    // Safety: the library is expected to export `BACKEND_INIT_SYMBOL` per
    // the plug-in ABI; loading it is inherently unsafe FFI, same as every
    // other `libloading::Library::new` call site.
    let _lib = unsafe { libloading::Library::new(&path) }.map_err(|e| {
        strata_core::StrataError::BackendNotLoaded {
            backend: format!("{kind}: failed to load {}: {e}", path.display()),
        }
    })?;
    // No real backend library ships with this crate to link against, so
    // there is nothing further to resolve here yet; callers fall back to
    // the CPU reference backend above.
    Err(strata_core::StrataError::BackendNotLoaded {
        backend: kind.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_backends_dir_falls_back_to_reference_backend() {
        let loader = dynamic_loader();
        let backend = loader(BackendKind::Torch, None).unwrap();
        assert_eq!(backend.kind(), BackendKind::Torch);
    }

    #[test]
    fn nonexistent_library_path_falls_back_to_reference_backend() {
        let dir = tempfile::tempdir().unwrap();
        let loader = dynamic_loader();
        let backend = loader(BackendKind::Onnx, Some(dir.path())).unwrap();
        assert_eq!(backend.kind(), BackendKind::Onnx);
    }
}
