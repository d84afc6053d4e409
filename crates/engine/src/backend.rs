//! The backend capability table (C3, spec.md §4.2).
//!
//! A process-wide (per-[`crate::Database`]) registry keyed by
//! [`BackendKind`], mirroring the teacher's `ComputeBackend` trait +
//! `select_backend()` pattern (`strata-intelligence`'s pre-existing
//! `runtime::backend` module) but shaped around the four named
//! frameworks spec.md calls out rather than a single host-process
//! device. Backends are plugged in from the outside (`strata-intelligence`
//! loads the bundled CPU reference backend and, for others, a shared
//! library from `backends_dir`); this crate only defines the interface
//! and the lookup/lazy-load-once behavior.

use crate::context::{ModelCtx, ScriptCtx};
use dashmap::DashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use strata_core::StrataResult;

/// One of the four framework backends spec.md names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// TensorFlow.
    Tf,
    /// TensorFlow Lite.
    TfLite,
    /// PyTorch (libtorch).
    Torch,
    /// ONNX Runtime — the only backend with a cooperative-cancellation
    /// hook (spec.md §4.7).
    Onnx,
}

impl BackendKind {
    /// Parse a wire-level backend identifier (`TF`, `TFLITE`, `TORCH`,
    /// `ONNX`, case-insensitively).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "TF" => Some(BackendKind::Tf),
            "TFLITE" => Some(BackendKind::TfLite),
            "TORCH" => Some(BackendKind::Torch),
            "ONNX" => Some(BackendKind::Onnx),
            _ => None,
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BackendKind::Tf => "TF",
            BackendKind::TfLite => "TFLITE",
            BackendKind::Torch => "TORCH",
            BackendKind::Onnx => "ONNX",
        };
        write!(f, "{s}")
    }
}

/// A live handle to a constructed model inside a backend. Dropped to
/// free the backend-side resources (spec.md's `model_free`).
pub trait BackendModelHandle: Send + Sync {
    /// Run a batch of model execution contexts (spec.md §4.6 "Execution
    /// concatenates inputs across the batch dimension before calling
    /// `model_run`"). Implementations read inputs via `ctx.get_input`
    /// and stamp results via `ctx.set_output`.
    fn run(&self, ctxs: &mut [ModelCtx]) -> StrataResult<()>;

    /// Re-emit the model's serialized definition (so it can be persisted
    /// unchanged, or re-created identically after a restart).
    fn serialize(&self) -> StrataResult<Vec<u8>>;

    /// A cooperative-cancellation token for the run currently executing
    /// on this handle, if the backend supports it (only ONNX, per
    /// spec.md §4.7). `None` means the DAG-level wall-clock deadline is
    /// the only enforcement available.
    fn cancel_token(&self) -> Option<Arc<dyn strata_concurrency::Cancellable>> {
        None
    }
}

/// A live handle to a compiled script inside a backend.
pub trait BackendScriptHandle: Send + Sync {
    /// Invoke the named entry point.
    fn run(&self, function: &str, ctx: &mut ScriptCtx) -> StrataResult<()>;
}

/// The capability interface every framework backend implements (spec.md
/// §4.2 "each entry holds function pointers").
pub trait InferenceBackend: Send + Sync {
    /// Which framework this implements.
    fn kind(&self) -> BackendKind;

    /// Construct a model from its serialized definition.
    fn model_create(
        &self,
        device: &str,
        definition: &[u8],
    ) -> StrataResult<Arc<dyn BackendModelHandle>>;

    /// Compile a script from source.
    fn script_create(
        &self,
        device: &str,
        source: &str,
    ) -> StrataResult<Arc<dyn BackendScriptHandle>>;

    /// Notify the backend of a newly observed device string, so it can
    /// warm up any per-device state ahead of the first run.
    fn add_new_device_cb(&self, _device: &str) -> StrataResult<()> {
        Ok(())
    }
}

/// A function that attempts to lazily load a backend's shared library
/// from `backends_dir` and return a freshly constructed
/// [`InferenceBackend`]. Installed by `strata-intelligence` at startup;
/// the engine itself has no opinion on *how* loading happens.
pub type BackendLoader =
    dyn Fn(BackendKind, Option<&Path>) -> StrataResult<Arc<dyn InferenceBackend>> + Send + Sync;

/// The process-wide backend capability table.
///
/// Lookups are lock-free reads via `DashMap` after the one-time write
/// that registers or lazily loads an entry (spec.md §9 "Global backend
/// vtables... readable lock-free after a one-time write fence").
pub struct BackendRegistry {
    backends: DashMap<BackendKind, Arc<dyn InferenceBackend>>,
    loader: parking_lot::RwLock<Option<Arc<BackendLoader>>>,
}

impl BackendRegistry {
    /// An empty registry with no loader installed.
    pub fn new() -> Self {
        BackendRegistry {
            backends: DashMap::new(),
            loader: parking_lot::RwLock::new(None),
        }
    }

    /// Install the function used to lazily load a missing backend.
    pub fn set_loader(&self, loader: Arc<BackendLoader>) {
        *self.loader.write() = Some(loader);
    }

    /// Explicitly register a backend, overwriting any existing entry for
    /// the same kind.
    pub fn register(&self, backend: Arc<dyn InferenceBackend>) {
        self.backends.insert(backend.kind(), backend);
    }

    /// Look up a backend, lazily loading it exactly once if missing
    /// (spec.md §4.2 "the caller then attempts to load the backend
    /// shared object from a configured directory and retries once").
    pub fn resolve(
        &self,
        kind: BackendKind,
        backends_dir: Option<&Path>,
    ) -> StrataResult<Arc<dyn InferenceBackend>> {
        if let Some(existing) = self.backends.get(&kind) {
            return Ok(Arc::clone(existing.value()));
        }
        let loader = self.loader.read().clone();
        let Some(loader) = loader else {
            tracing::warn!(
                target: "strata::infer::backend",
                backend = %kind,
                "no loader installed; backend not loaded"
            );
            return Err(strata_core::StrataError::BackendNotLoaded {
                backend: kind.to_string(),
            });
        };
        tracing::debug!(target: "strata::infer::backend", backend = %kind, "attempting lazy load");
        match loader(kind, backends_dir) {
            Ok(backend) => {
                self.backends.insert(kind, Arc::clone(&backend));
                Ok(backend)
            }
            Err(e) => {
                tracing::warn!(
                    target: "strata::infer::backend",
                    backend = %kind,
                    error = %e,
                    "lazy load failed"
                );
                Err(strata_core::StrataError::BackendNotLoaded {
                    backend: kind.to_string(),
                })
            }
        }
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ModelCtx;

    struct StubHandle;
    impl BackendModelHandle for StubHandle {
        fn run(&self, _ctxs: &mut [ModelCtx]) -> StrataResult<()> {
            Ok(())
        }
        fn serialize(&self) -> StrataResult<Vec<u8>> {
            Ok(vec![1, 2, 3])
        }
    }

    struct StubBackend;
    impl InferenceBackend for StubBackend {
        fn kind(&self) -> BackendKind {
            BackendKind::Torch
        }
        fn model_create(
            &self,
            _device: &str,
            _definition: &[u8],
        ) -> StrataResult<Arc<dyn BackendModelHandle>> {
            Ok(Arc::new(StubHandle))
        }
        fn script_create(
            &self,
            _device: &str,
            _source: &str,
        ) -> StrataResult<Arc<dyn BackendScriptHandle>> {
            unimplemented!()
        }
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(BackendKind::parse("torch"), Some(BackendKind::Torch));
        assert_eq!(BackendKind::parse("ONNX"), Some(BackendKind::Onnx));
        assert_eq!(BackendKind::parse("bogus"), None);
    }

    #[test]
    fn resolve_without_loader_fails_not_loaded() {
        let reg = BackendRegistry::new();
        let err = reg.resolve(BackendKind::Tf, None).unwrap_err();
        assert!(matches!(
            err,
            strata_core::StrataError::BackendNotLoaded { .. }
        ));
    }

    #[test]
    fn registered_backend_resolves_without_loader() {
        let reg = BackendRegistry::new();
        reg.register(Arc::new(StubBackend));
        let backend = reg.resolve(BackendKind::Torch, None).unwrap();
        assert_eq!(backend.kind(), BackendKind::Torch);
    }

    #[test]
    fn missing_backend_is_lazily_loaded_once_and_cached() {
        let reg = BackendRegistry::new();
        let attempts = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let attempts2 = Arc::clone(&attempts);
        reg.set_loader(Arc::new(move |_kind, _dir| {
            attempts2.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(Arc::new(StubBackend) as Arc<dyn InferenceBackend>)
        }));
        reg.resolve(BackendKind::Torch, None).unwrap();
        reg.resolve(BackendKind::Torch, None).unwrap();
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
