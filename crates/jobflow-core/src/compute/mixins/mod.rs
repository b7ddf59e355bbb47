//! Capas transversales de la cadena de llamada de un job.
//!
//! El orden de composición es fijo: logging de errores, serialización
//! (restaurar/persistir), mapeo de parámetros, envoltura del resultado y,
//! del lado de adentro del decorador del engine, la iteración por data files.

pub(crate) mod iterate;
pub(crate) mod name;
pub(crate) mod params;
pub(crate) mod result_key;
pub(crate) mod serialize;
