//! Mapeo de parámetros: claves renombradas hacia afuera y valores fijados.
//!
//! `param_key_map` va de nombre interno (el de la firma) a nombre externo (el
//! que ven los callers y el ruteo de dag flows). En cada llamada los kwargs
//! externos se traducen de vuelta al nombre interno; usar el nombre interno de
//! un parámetro renombrado es error, igual que fijar y pasar a la vez el mismo
//! parámetro. Los posicionales no se tocan.

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::compute::func::{CallArgs, FuncSignature};
use crate::errors::{JobError, JobResult};

/// Validación de construcción: toda clave de `fixed_params` y de
/// `param_key_map` debe existir en la firma de la función.
pub(crate) fn check_param_keys_in_signature<'a>(job: &str,
                                               signature: &FuncSignature,
                                               keys: impl Iterator<Item = &'a String>,
                                               modifier: &str)
                                               -> JobResult<()> {
    for key in keys {
        if !signature.has_param(key) {
            return Err(JobError::invalid_arguments(
                job,
                format!("parameter \"{key}\" in {modifier} is not in the function signature"),
            ));
        }
    }
    Ok(())
}

/// Cocina una llamada contra los fixed params y el key map del job.
pub(crate) fn map_call(job: &str,
                       fixed_params: &Map<String, Value>,
                       param_key_map: &IndexMap<String, String>,
                       call: CallArgs)
                       -> JobResult<CallArgs> {
    let externally_named =
        |key: &str| param_key_map.values().any(|external| external == key);

    // fixed params cuyo nombre coincide con un nombre externo quedan afuera
    let mut cooked = Map::new();
    for (key, value) in fixed_params {
        if !externally_named(key) {
            cooked.insert(key.clone(), value.clone());
        }
    }

    // kwargs: el nombre externo se traduce al interno; el nombre interno de un
    // parámetro renombrado es un error; el resto pasa igual
    let mut inverse_matches: Vec<String> = Vec::new();
    let mut mapped: Vec<(String, Value)> = Vec::new();
    for (key, value) in call.kwargs {
        if let Some((internal, _)) = param_key_map.iter().find(|(_, ext)| **ext == key) {
            mapped.push((internal.clone(), value));
        } else if param_key_map.contains_key(&key) {
            inverse_matches.push(key);
        } else {
            mapped.push((key, value));
        }
    }

    if !inverse_matches.is_empty() {
        return Err(JobError::invalid_arguments(
            job,
            format!("keyword arguments {inverse_matches:?} match the parameter key map inversely"),
        ));
    }

    for (key, value) in mapped {
        if cooked.contains_key(&key) {
            return Err(JobError::invalid_arguments(
                job,
                format!("got multiple values for parameter \"{key}\""),
            ));
        }
        cooked.insert(key, value);
    }

    Ok(CallArgs { args: call.args,
                  kwargs: cooked })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key_map(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
        pairs.iter()
             .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
             .collect()
    }

    fn fixed(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs.iter().map(|(k, v)| ((*k).to_owned(), v.clone())).collect()
    }

    #[test]
    fn construction_rejects_keys_outside_the_signature() {
        let signature = FuncSignature::new(["a", "b"]);
        let bogus = ["c".to_owned()];
        let err = check_param_keys_in_signature("job", &signature, bogus.iter(), "fixed_params")
            .unwrap_err();
        assert!(err.to_string().contains("\"c\" in fixed_params"));
        let fine = ["a".to_owned(), "b".to_owned()];
        assert!(check_param_keys_in_signature("job", &signature, fine.iter(), "param_key_map")
            .is_ok());
    }

    #[test]
    fn external_kwargs_translate_to_internal_names() {
        let map = key_map(&[("a", "c")]);
        let call = CallArgs::none().with_kwarg("c", json!(1)).with_kwarg("b", json!(2));
        let cooked = map_call("job", &Map::new(), &map, call).unwrap();
        assert_eq!(cooked.kwargs.get("a"), Some(&json!(1)));
        assert_eq!(cooked.kwargs.get("b"), Some(&json!(2)));
        assert!(cooked.kwargs.get("c").is_none());
    }

    #[test]
    fn internal_name_of_a_mapped_param_is_rejected() {
        let map = key_map(&[("a", "c")]);
        let call = CallArgs::none().with_kwarg("a", json!(1));
        let err = map_call("job", &Map::new(), &map, call).unwrap_err();
        assert!(err.to_string().contains("match the parameter key map inversely"));
    }

    #[test]
    fn fixed_param_collision_with_kwarg_is_an_error() {
        let fixed_params = fixed(&[("b", json!(10))]);
        let call = CallArgs::none().with_kwarg("b", json!(2));
        let err = map_call("job", &fixed_params, &IndexMap::new(), call).unwrap_err();
        assert!(err.to_string().contains("got multiple values for parameter \"b\""));
    }

    #[test]
    fn fixed_params_flow_in_and_positionals_pass_untouched() {
        let fixed_params = fixed(&[("b", json!(10))]);
        let map = key_map(&[("a", "c")]);
        let call = CallArgs::positional(vec![json!(0)]).with_kwarg("c", json!(1));
        let cooked = map_call("job", &fixed_params, &map, call).unwrap();
        assert_eq!(cooked.args, vec![json!(0)]);
        assert_eq!(cooked.kwargs.get("a"), Some(&json!(1)));
        assert_eq!(cooked.kwargs.get("b"), Some(&json!(10)));
    }

    #[test]
    fn fixed_param_named_like_an_external_key_is_dropped() {
        // firma (a, b), a renombrado a "b" hacia afuera: el fixed "b" choca con
        // el nombre externo y se descarta de la llamada
        let fixed_params = fixed(&[("b", json!(5))]);
        let map = key_map(&[("a", "b")]);
        let call = CallArgs::none().with_kwarg("b", json!(1));
        let cooked = map_call("job", &fixed_params, &map, call).unwrap();
        assert_eq!(cooked.kwargs.get("a"), Some(&json!(1)));
        assert!(cooked.kwargs.get("b").is_none());
    }
}
