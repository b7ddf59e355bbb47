//! jobflow-data: contrato de contenedor de datos + serializadores de artefactos.
//!
//! Este crate define la cara "datos" que el núcleo de orquestación consume:
//! - `Dataset`: contenedor multi-item con claves nombradas y orden de inserción,
//!   exportable/reconstruible vía JSON neutral (`to_data` / `from_data`).
//! - Marcadores `PendingData` / `FailedData` para iteración concurrente con
//!   fallos parciales.
//! - `Serializer` + `SerializerRegistry`: cadena de detección de serializadores
//!   y empaquetado de datasets como archivos tar comprimidos (gzip).
//!
//! El núcleo nunca exige un tipo concreto de contenedor: solo este contrato.

pub mod dataset;
pub mod errors;
pub mod serializer;
pub mod serializers;

pub use dataset::{Dataset, FailedData, PendingData};
pub use errors::DataError;
pub use serializer::{
    create_dataset_from_tarfile, create_tarfile_from_dataset, Serializer, SerializerRegistry,
};
pub use serializers::{JsonDatasetSerializer, RawDatasetSerializer};
