//! Serialización de datasets como archivos tar comprimidos.
//!
//! Cada serializador declara qué formas de dataset soporta directamente y con
//! qué sufijo de archivo trabaja. El `SerializerRegistry` mantiene una cadena
//! ordenada: el primero que acepta el dataset gana (persistencia), y el sufijo
//! del nombre de archivo decide el serializador al restaurar.
//!
//! Layout del archivo: un entry por item, nombrado `{clave}.{sufijo}`, todo
//! dentro de un tar con compresión gzip.

use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::Value;

use crate::dataset::Dataset;
use crate::errors::DataError;

/// Sufijo final de todo artefacto persistido.
pub const TAR_GZ_SUFFIX: &str = ".tar.gz";

pub trait Serializer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Sufijo que identifica al serializador dentro del nombre de archivo.
    fn output_file_suffix(&self) -> &'static str;

    /// Si el dataset puede serializarse sin conversión previa.
    fn is_dataset_directly_supported(&self, dataset: &Dataset) -> bool;

    fn serialize(&self, dataset: &Dataset) -> Result<Vec<u8>, DataError>;

    fn deserialize(&self, bytes: &[u8]) -> Result<Dataset, DataError>;
}

/// Empaqueta un dataset como tar.gz, un entry por item (`{clave}.{sufijo}`).
/// `encode_item` decide los bytes de cada item.
pub fn create_tarfile_from_dataset<F>(dataset: &Dataset,
                                      suffix: &str,
                                      encode_item: F)
                                      -> Result<Vec<u8>, DataError>
    where F: Fn(&Value) -> Result<Vec<u8>, DataError>
{
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);

    for (name, value) in dataset.iter() {
        let data = encode_item(value)?;
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, format!("{name}.{suffix}"), data.as_slice())?;
    }

    let encoder = builder.into_inner()?;
    Ok(encoder.finish()?)
}

/// Reconstruye un dataset desde los bytes de un tar.gz. Cada entry debe
/// llamarse `{clave}.{sufijo}`; `decode_item` interpreta sus bytes.
pub fn create_dataset_from_tarfile<F>(bytes: &[u8],
                                      suffix: &str,
                                      decode_item: F)
                                      -> Result<Dataset, DataError>
    where F: Fn(&str, &[u8]) -> Result<Value, DataError>
{
    let decoder = GzDecoder::new(bytes);
    let mut archive = tar::Archive::new(decoder);
    let mut dataset = Dataset::new();

    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?;
        let file_name = path.file_name()
                            .and_then(|n| n.to_str())
                            .map(str::to_owned)
                            .ok_or_else(|| {
                                DataError::MalformedArchive("entry without file name".into())
                            })?;
        let dotted = format!(".{suffix}");
        let item_name = file_name.strip_suffix(dotted.as_str())
                                 .ok_or_else(|| DataError::MalformedArchive(file_name.clone()))?
                                 .to_owned();
        let mut buf = Vec::new();
        entry.read_to_end(&mut buf)?;
        dataset.insert(item_name.clone(), decode_item(&item_name, &buf)?);
    }

    Ok(dataset)
}

/// Cadena ordenada de serializadores registrados.
#[derive(Clone, Default)]
pub struct SerializerRegistry {
    serializers: Vec<Arc<dyn Serializer>>,
}

impl SerializerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registro con la cadena estándar: raw primero (datasets de strings),
    /// json como comodín final.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(crate::serializers::RawDatasetSerializer));
        registry.register(Arc::new(crate::serializers::JsonDatasetSerializer));
        registry
    }

    pub fn register(&mut self, serializer: Arc<dyn Serializer>) {
        self.serializers.push(serializer);
    }

    pub fn serializers(&self) -> &[Arc<dyn Serializer>] {
        &self.serializers
    }

    /// Primer serializador que soporta el dataset tal cual, en orden de
    /// registro.
    pub fn auto_detect(&self, dataset: &Dataset) -> Option<Arc<dyn Serializer>> {
        self.serializers
            .iter()
            .find(|s| s.is_dataset_directly_supported(dataset))
            .cloned()
    }

    pub fn detect_from_file_suffix(&self, suffix: &str) -> Option<Arc<dyn Serializer>> {
        self.serializers
            .iter()
            .find(|s| s.output_file_suffix() == suffix)
            .cloned()
    }

    /// Carga un artefacto `...{sufijo}.tar.gz`, eligiendo serializador por el
    /// sufijo embebido en el nombre del archivo.
    pub fn load_from_tar_file_path(&self, path: &Path) -> Result<Dataset, DataError> {
        let file_name = path.file_name()
                            .and_then(|n| n.to_str())
                            .ok_or_else(|| {
                                DataError::MalformedFileName(path.display().to_string())
                            })?;
        let stem = file_name.strip_suffix(TAR_GZ_SUFFIX)
                            .ok_or_else(|| DataError::MalformedFileName(file_name.to_owned()))?;
        let (_, suffix) = stem.rsplit_once('.')
                              .ok_or_else(|| DataError::MalformedFileName(file_name.to_owned()))?;
        let serializer = self.detect_from_file_suffix(suffix)
                             .ok_or_else(|| DataError::UnknownSuffix(suffix.to_owned()))?;
        let bytes = std::fs::read(path)?;
        serializer.deserialize(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_dataset() -> Dataset {
        let mut dataset = Dataset::new();
        dataset.insert("alpha", json!({ "x": 1 }));
        dataset.insert("beta", json!([1, 2, 3]));
        dataset
    }

    #[test]
    fn tarfile_roundtrip_keeps_items() {
        let dataset = sample_dataset();
        let bytes = create_tarfile_from_dataset(&dataset, "json", |v| {
            Ok(serde_json::to_vec(v)?)
        }).unwrap();
        let rebuilt = create_dataset_from_tarfile(&bytes, "json", |_, raw| {
            Ok(serde_json::from_slice(raw)?)
        }).unwrap();
        assert_eq!(rebuilt, dataset);
    }

    #[test]
    fn auto_detect_prefers_registration_order() {
        let registry = SerializerRegistry::with_defaults();

        let mut strings = Dataset::new();
        strings.insert("a", json!("hello"));
        let detected = registry.auto_detect(&strings).unwrap();
        assert_eq!(detected.name(), "raw");

        let detected = registry.auto_detect(&sample_dataset()).unwrap();
        assert_eq!(detected.name(), "json");
    }

    #[test]
    fn load_from_tar_file_path_detects_suffix() {
        let registry = SerializerRegistry::with_defaults();
        let dataset = sample_dataset();
        let serializer = registry.auto_detect(&dataset).unwrap();
        let bytes = serializer.serialize(&dataset).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("00_some_job.json.tar.gz");
        std::fs::write(&path, bytes).unwrap();

        let restored = registry.load_from_tar_file_path(&path).unwrap();
        assert_eq!(restored, dataset);
    }

    #[test]
    fn unknown_suffix_is_an_error() {
        let registry = SerializerRegistry::with_defaults();
        let err = registry.load_from_tar_file_path(Path::new("/tmp/00_x.msgpack.tar.gz"));
        assert!(matches!(err, Err(DataError::UnknownSuffix(_))));
    }
}
