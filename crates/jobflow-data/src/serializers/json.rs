//! Serializador JSON: comodín de la cadena, acepta cualquier dataset.

use serde_json::Value;

use crate::dataset::Dataset;
use crate::errors::DataError;
use crate::serializer::{create_dataset_from_tarfile, create_tarfile_from_dataset, Serializer};

pub struct JsonDatasetSerializer;

impl Serializer for JsonDatasetSerializer {
    fn name(&self) -> &'static str {
        "json"
    }

    fn output_file_suffix(&self) -> &'static str {
        "json"
    }

    fn is_dataset_directly_supported(&self, _dataset: &Dataset) -> bool {
        true
    }

    fn serialize(&self, dataset: &Dataset) -> Result<Vec<u8>, DataError> {
        create_tarfile_from_dataset(dataset, self.output_file_suffix(), |value| {
            Ok(serde_json::to_vec_pretty(value)?)
        })
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Dataset, DataError> {
        create_dataset_from_tarfile(bytes, self.output_file_suffix(), |_, raw| {
            let value: Value = serde_json::from_slice(raw)?;
            Ok(value)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_serializer_roundtrip() {
        let mut dataset = Dataset::new();
        dataset.insert("numbers", json!([1, 2, 3]));
        dataset.insert("meta", json!({ "ok": true, "count": 3 }));

        let serializer = JsonDatasetSerializer;
        assert!(serializer.is_dataset_directly_supported(&dataset));

        let bytes = serializer.serialize(&dataset).unwrap();
        let rebuilt = serializer.deserialize(&bytes).unwrap();
        assert_eq!(rebuilt.to_data(), dataset.to_data());
    }
}
