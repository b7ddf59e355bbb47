//! Serializador raw: datasets cuyos items son todos strings, bytes tal cual.

use serde_json::Value;

use crate::dataset::Dataset;
use crate::errors::DataError;
use crate::serializer::{create_dataset_from_tarfile, create_tarfile_from_dataset, Serializer};

pub struct RawDatasetSerializer;

impl Serializer for RawDatasetSerializer {
    fn name(&self) -> &'static str {
        "raw"
    }

    fn output_file_suffix(&self) -> &'static str {
        "raw"
    }

    fn is_dataset_directly_supported(&self, dataset: &Dataset) -> bool {
        !dataset.is_empty() && dataset.iter().all(|(_, v)| v.is_string())
    }

    fn serialize(&self, dataset: &Dataset) -> Result<Vec<u8>, DataError> {
        create_tarfile_from_dataset(dataset, self.output_file_suffix(), |value| {
            value.as_str()
                 .map(|s| s.as_bytes().to_vec())
                 .ok_or_else(|| DataError::UnsupportedDataset("raw".into()))
        })
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Dataset, DataError> {
        create_dataset_from_tarfile(bytes, self.output_file_suffix(), |name, raw| {
            let text = String::from_utf8(raw.to_vec()).map_err(|_| {
                          DataError::MalformedArchive(format!("item \"{name}\" is not utf-8"))
                      })?;
            Ok(Value::String(text))
        })
    }
}
