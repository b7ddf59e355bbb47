//! Constantes compartidas del núcleo.

/// Formato del directorio por corrida dentro del directorio de persistencia.
pub const RUN_DIR_TIMESTAMP_FORMAT: &str = "%Y_%m_%d-%H_%M_%S";

/// Sufijo final de los artefactos persistidos.
pub const PERSIST_FILE_SUFFIX: &str = ".tar.gz";

/// Largo del fragmento aleatorio añadido al nombre único de un job.
pub const UNIQUE_NAME_SUFFIX_LEN: usize = 8;

/// Directorio de persistencia por defecto cuando no hay configuración.
pub const DEFAULT_PERSIST_DATA_DIR: &str = "outputs";
