//! Strata: an embedded key/value store with an in-process ML inference
//! engine (a DAG of tensor/model/script ops, run on a per-device worker
//! pool). This crate is a thin façade over the `strata-*` workspace
//! members — see each crate's own docs for the actual machinery.

pub use strata_executor::{
    AccessMode, BackendKind, BatchPolicy, CmdArg, Command, Error, ExecuteOptions, ModelStoreOptions,
    OpenOptions, Output, Reply, Result, ScriptStoreOptions, Strata, StrataConfig, TensorData,
    TensorEncoding, TensorPayload, TensorReadFormat,
};
pub use strata_core::{BranchId, DType, Scalar, StrataError, StrataResult, Tensor};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_and_round_trip_a_tensor() {
        let strata = Strata::open(StrataConfig::default());
        let branch = BranchId::default_branch();
        strata
            .tensor_set(
                branch,
                "a",
                "FLOAT",
                vec![2],
                TensorData::Values(vec!["1".into(), "2".into()]),
            )
            .unwrap();
        let payload = strata
            .tensor_get(branch, "a", TensorReadFormat::Meta)
            .unwrap();
        assert_eq!(payload.shape, vec![2]);
    }
}
