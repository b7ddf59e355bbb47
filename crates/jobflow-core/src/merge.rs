//! Fusión determinista de valores JSON para `refine` y parámetros fijos.
//!
//! Merge "shallow": cuando ambos lados son objetos, las claves nuevas
//! reemplazan a las existentes una a una; cualquier otra combinación se
//! resuelve a favor del valor nuevo. Es la semántica que `refine(update=true)`
//! garantiza para kwargs con forma de diccionario.

use serde_json::{Map, Value};

/// Merge shallow de objetos JSON; claves de `update` pisan a las de `base`.
pub fn merge_json(base: &Value, update: &Value) -> Value {
    match (base, update) {
        (Value::Object(base_map), Value::Object(update_map)) => {
            let mut out = base_map.clone();
            for (key, value) in update_map.iter() {
                out.insert(key.clone(), value.clone());
            }
            Value::Object(out)
        }
        (_, other) => other.clone(),
    }
}

/// Variante sobre mapas ya deconstruidos (parámetros fijos, key maps).
pub fn merge_maps(base: &Map<String, Value>, update: &Map<String, Value>) -> Map<String, Value> {
    let mut out = base.clone();
    for (key, value) in update.iter() {
        out.insert(key.clone(), value.clone());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_json_overrides_key_by_key() {
        let base = json!({ "a": 1, "b": 2 });
        let update = json!({ "b": 3, "c": 4 });
        assert_eq!(merge_json(&base, &update), json!({ "a": 1, "b": 3, "c": 4 }));
    }

    #[test]
    fn merge_json_non_objects_take_update() {
        assert_eq!(merge_json(&json!({ "a": 1 }), &json!(7)), json!(7));
        assert_eq!(merge_json(&json!(1), &json!({ "b": 2 })), json!({ "b": 2 }));
    }
}
