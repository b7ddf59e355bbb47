//! Errores del contrato de datos y de la capa de serialización.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DataError {
    /// `from_data` recibió un valor que no es un objeto de items nombrados.
    #[error("value is not an object of named data items")]
    NotItemMap,

    /// El serializador no soporta la forma del dataset recibido.
    #[error("dataset not supported by serializer \"{0}\"")]
    UnsupportedDataset(String),

    /// Ningún serializador registrado aceptó el dataset.
    #[error("no serializer detected for dataset")]
    NoSerializerDetected,

    /// Sufijo de archivo sin serializador asociado.
    #[error("no serializer registered for file suffix \"{0}\"")]
    UnknownSuffix(String),

    /// Nombre de archivo de artefacto que no sigue el layout esperado.
    #[error("malformed artifact file name \"{0}\"")]
    MalformedFileName(String),

    /// Entrada del tar ilegible o con ruta no representable.
    #[error("malformed archive entry: {0}")]
    MalformedArchive(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
