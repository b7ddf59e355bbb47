//! Serializadores concretos incluidos en la cadena estándar.

pub mod json;
pub mod raw;

pub use json::JsonDatasetSerializer;
pub use raw::RawDatasetSerializer;
