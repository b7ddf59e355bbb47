//! Jobflow Rust Library
//!
//! Este crate actúa como la fachada de jobflow:
//! - Re-exporta `jobflow_core`: templates, jobs, flows, engines, registro de
//!   estados de corrida y configuración.
//! - Re-exporta `jobflow_data`: datasets y serializadores de artefactos.
//!
//! Puede usarse desde binarios o por otros crates/clientes.

pub use jobflow_core::*;

pub use jobflow_core::{call_args, flow_fn, task_fn};

pub use jobflow_data::{DataError, Dataset, FailedData, JsonDatasetSerializer, PendingData,
                       RawDatasetSerializer, Serializer, SerializerRegistry};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_error_messages_are_stable() {
        let err = JobError::NotDirectlyCallable("double".into());
        assert_eq!(
            err.to_string(),
            "template \"double\" is not directly callable outside a flow context. \
             Try the .run() method"
        );
    }

    #[test]
    fn facade_exposes_core_and_data_types() {
        let dataset = Dataset::new();
        assert!(dataset.is_empty());

        let call = call_args!(x = 1);
        assert_eq!(call.kwargs.len(), 1);
    }
}
