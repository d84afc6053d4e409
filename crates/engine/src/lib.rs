//! The Strata inference engine core.
//!
//! Everything between the wire layer and a backend: the tensor/model/
//! script object model (C1/C4), execution contexts (C5), the DAG op
//! graph and its command parser (C6/C8), whole-run shared state (C7),
//! the per-device worker pool with batching (C9/C10), and the backend
//! capability registry (C3). `strata-intelligence` plugs concrete
//! backends in; `strata-executor` drives this crate from the wire
//! protocol.

pub mod backend;
pub mod config;
pub mod context;
pub mod dagop;
pub mod database;
pub mod model;
pub mod object_store;
pub mod parser;
pub mod runinfo;
pub mod script;
pub mod stats;
pub mod worker;

pub use backend::{
    BackendKind, BackendLoader, BackendModelHandle, BackendRegistry, BackendScriptHandle,
    InferenceBackend,
};
pub use config::StrataConfig;
pub use strata_durability::DurabilityMode;
pub use context::{ExecutionCtx, ModelCtx, ScriptArg, ScriptCtx};
pub use dagop::{DagOp, DagOpKind, OpOutcome};
pub use database::Database;
pub use model::{BatchPolicy, Model};
pub use object_store::ObjectStore;
pub use parser::{parse_scalar, CmdArg, DagPlanner, PlannedDag};
pub use runinfo::{build_replies, DagOutcome, OpReply, RunInfo};
pub use script::Script;
pub use stats::{RunStats, RunStatsSnapshot};
pub use worker::WorkerPool;
