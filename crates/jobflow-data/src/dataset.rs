//! Contenedor multi-item con claves nombradas.
//!
//! Un `Dataset` agrupa valores JSON bajo nombres, conservando el orden de
//! inserción. Es el contrato mínimo que el núcleo de orquestación y los
//! serializadores consumen: exportar la estructura completa (`to_data`) y
//! reconstruirla desde un objeto JSON (`from_data`). Los items pueden ser
//! resultados reales o marcadores de estado (`PendingData` / `FailedData`)
//! durante una iteración concurrente.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::errors::DataError;

const PENDING_MARKER_KEY: &str = "__pending_data__";
const FAILED_MARKER_KEY: &str = "__failed_data__";

/// Marcador que ocupa el slot de un item mientras su tarea sigue en vuelo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingData {
    pub job_name: String,
}

impl PendingData {
    pub fn new(job_name: impl Into<String>) -> Self {
        Self { job_name: job_name.into() }
    }

    /// Representación JSON del marcador, tal como queda dentro del dataset.
    pub fn to_value(&self) -> Value {
        json!({ PENDING_MARKER_KEY: { "job_name": self.job_name } })
    }

    pub fn matches(value: &Value) -> bool {
        value.as_object()
             .map(|obj| obj.contains_key(PENDING_MARKER_KEY))
             .unwrap_or(false)
    }
}

/// Marcador que registra el fallo de un único item sin abortar al resto.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedData {
    pub job_name: String,
    pub error: String,
}

impl FailedData {
    pub fn new(job_name: impl Into<String>, error: impl Into<String>) -> Self {
        Self { job_name: job_name.into(),
               error: error.into() }
    }

    pub fn to_value(&self) -> Value {
        json!({ FAILED_MARKER_KEY: { "job_name": self.job_name, "error": self.error } })
    }

    pub fn matches(value: &Value) -> bool {
        value.as_object()
             .map(|obj| obj.contains_key(FAILED_MARKER_KEY))
             .unwrap_or(false)
    }

    /// Reconstruye el marcador desde su forma JSON, si aplica.
    pub fn from_value(value: &Value) -> Option<Self> {
        let inner = value.as_object()?.get(FAILED_MARKER_KEY)?;
        serde_json::from_value(inner.clone()).ok()
    }
}

/// Contenedor `nombre -> Value` con orden de inserción estable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    items: IndexMap<String, Value>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.items.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.items.get(name)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.items.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.items.iter()
    }

    /// Exporta el contenido completo como objeto JSON (items en orden).
    pub fn to_data(&self) -> Value {
        let mut out = serde_json::Map::new();
        for (name, value) in &self.items {
            out.insert(name.clone(), value.clone());
        }
        Value::Object(out)
    }

    /// Reconstruye un dataset desde un objeto JSON. Cualquier otra forma
    /// de valor se rechaza: el contrato exige items nombrados.
    pub fn from_data(value: &Value) -> Result<Self, DataError> {
        match value {
            Value::Object(map) => {
                let mut dataset = Dataset::new();
                for (name, item) in map {
                    dataset.insert(name.clone(), item.clone());
                }
                Ok(dataset)
            }
            _ => Err(DataError::NotItemMap),
        }
    }

    pub fn from_json(text: &str) -> Result<Self, DataError> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_data(&value)
    }

    /// Items ya resueltos: excluye marcadores pending y failed.
    pub fn available_data(&self) -> Dataset {
        let items = self.items
                        .iter()
                        .filter(|(_, v)| !PendingData::matches(v) && !FailedData::matches(v))
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect();
        Dataset { items }
    }

    pub fn pending_count(&self) -> usize {
        self.items.values().filter(|v| PendingData::matches(v)).count()
    }

    /// Marcadores de fallo presentes, con el nombre del item al que pertenecen.
    pub fn failed_items(&self) -> Vec<(&str, FailedData)> {
        self.items
            .iter()
            .filter_map(|(name, value)| {
                FailedData::from_value(value).map(|failed| (name.as_str(), failed))
            })
            .collect()
    }
}

impl IntoIterator for Dataset {
    type Item = (String, Value);
    type IntoIter = indexmap::map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl FromIterator<(String, Value)> for Dataset {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self { items: iter.into_iter().collect() }
    }
}
