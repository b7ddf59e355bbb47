//! Creador de jobs: el contexto que ata templates, engines, registro y
//! configuración.
//!
//! No hay estado global; quien necesita aplicar templates recibe un
//! `Arc<JobCreator>`. El creador trae el engine local ya vinculado, admite un
//! engine externo opcional elegible por configuración, y lleva el nivel de
//! anidamiento de flows junto con la hora del flow raíz en curso, que es la
//! que agrupa los artefactos persistidos de una misma corrida.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use chrono::{DateTime, Utc};

use crate::config::{lock_read, lock_write, EngineChoice, JobConfig, SharedConfig};
use crate::engine::base::Engine;
use crate::engine::local::LocalRunner;
use crate::engine::registry::RunStateRegistry;

pub struct JobCreator {
    config: SharedConfig,
    registry: Arc<RunStateRegistry>,
    local_engine: Arc<dyn Engine>,
    external_engine: RwLock<Option<Arc<dyn Engine>>>,
    nesting: AtomicUsize,
    toplevel_run_time: Mutex<Option<DateTime<Utc>>>,
}

impl JobCreator {
    pub fn new(config: JobConfig) -> Arc<Self> {
        let registry = Arc::new(RunStateRegistry::new());
        registry.set_config(&config.registry);

        let local_engine: Arc<dyn Engine> = Arc::new(LocalRunner::new());
        local_engine.set_registry(Some(registry.clone()));
        local_engine.set_config(config.engine.clone());

        Arc::new(Self { config: config.into_shared(),
                        registry,
                        local_engine,
                        external_engine: RwLock::new(None),
                        nesting: AtomicUsize::new(0),
                        toplevel_run_time: Mutex::new(None) })
    }

    /// Creador con la configuración tomada del entorno (`JOBFLOW_*`).
    pub fn from_env() -> Arc<Self> {
        Self::new(JobConfig::from_env())
    }

    pub fn registry(&self) -> &Arc<RunStateRegistry> {
        &self.registry
    }

    pub fn shared_config(&self) -> SharedConfig {
        self.config.clone()
    }

    pub fn config_snapshot(&self) -> JobConfig {
        lock_read(&self.config).clone()
    }

    /// Reemplaza la configuración viva y la propaga a registro y engines.
    pub fn set_config(&self, config: JobConfig) {
        self.registry.set_config(&config.registry);
        self.local_engine.set_config(config.engine.clone());
        if let Some(external) = lock_read(&self.external_engine).clone() {
            external.set_config(config.engine.clone());
        }
        *lock_write(&self.config) = config;
    }

    pub fn set_engine_choice(&self, choice: EngineChoice) {
        lock_write(&self.config).engine_choice = choice;
    }

    /// Vincula un engine externo, dejándolo apuntado al registro y a la
    /// configuración del creador. Elegirlo es aparte (`EngineChoice`).
    pub fn set_external_engine(&self, engine: Arc<dyn Engine>) {
        engine.set_registry(Some(self.registry.clone()));
        engine.set_config(lock_read(&self.config).engine.clone());
        *lock_write(&self.external_engine) = Some(engine);
    }

    /// Engine efectivo según la elección vigente. Pedir `External` sin haber
    /// vinculado uno cae al local, con aviso.
    pub fn engine(&self) -> Arc<dyn Engine> {
        match lock_read(&self.config).engine_choice {
            EngineChoice::Local => self.local_engine.clone(),
            EngineChoice::External => match lock_read(&self.external_engine).clone() {
                Some(engine) => engine,
                None => {
                    log::warn!("external engine selected but none is bound; using local");
                    self.local_engine.clone()
                }
            },
        }
    }

    /// Entra a un contexto de flow; el guard lo abandona al soltarse. El nivel
    /// más externo fija la hora de la corrida raíz.
    pub fn nested_context(self: &Arc<Self>) -> NestedContext {
        let prev = self.nesting.fetch_add(1, Ordering::AcqRel);
        if prev == 0 {
            *lock_time(&self.toplevel_run_time) = Some(Utc::now());
        }
        NestedContext { creator: self.clone() }
    }

    pub fn nested_context_level(&self) -> usize {
        self.nesting.load(Ordering::Acquire)
    }

    pub fn in_flow_context(&self) -> bool {
        self.nested_context_level() > 0
    }

    /// Hora de arranque del flow raíz en curso, si hay uno.
    pub fn time_of_cur_toplevel_flow_run(&self) -> Option<DateTime<Utc>> {
        *lock_time(&self.toplevel_run_time)
    }
}

/// Guard de contexto de flow; restituye el nivel al soltarse, incluso si el
/// cuerpo del flow falló.
pub struct NestedContext {
    creator: Arc<JobCreator>,
}

impl Drop for NestedContext {
    fn drop(&mut self) {
        let prev = self.creator.nesting.fetch_sub(1, Ordering::AcqRel);
        if prev == 1 {
            *lock_time(&self.creator.toplevel_run_time) = None;
        }
    }
}

fn lock_time(time: &Mutex<Option<DateTime<Utc>>>) -> MutexGuard<'_, Option<DateTime<Utc>>> {
    time.lock().unwrap_or_else(|poison| poison.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_context_tracks_level_and_toplevel_time() {
        let creator = JobCreator::new(JobConfig::default());
        assert!(!creator.in_flow_context());
        assert!(creator.time_of_cur_toplevel_flow_run().is_none());

        {
            let _outer = creator.nested_context();
            assert_eq!(creator.nested_context_level(), 1);
            let toplevel = creator.time_of_cur_toplevel_flow_run().unwrap();

            {
                let _inner = creator.nested_context();
                assert_eq!(creator.nested_context_level(), 2);
                // el nivel interno no pisa la hora del flow raíz
                assert_eq!(creator.time_of_cur_toplevel_flow_run().unwrap(), toplevel);
            }
            assert_eq!(creator.nested_context_level(), 1);
        }

        assert!(!creator.in_flow_context());
        assert!(creator.time_of_cur_toplevel_flow_run().is_none());
    }

    #[test]
    fn engine_choice_external_without_binding_falls_back_to_local() {
        let creator = JobCreator::new(JobConfig::default());
        creator.set_engine_choice(EngineChoice::External);
        assert_eq!(creator.engine().name(), "local");
    }

    #[test]
    fn set_config_is_visible_through_the_shared_handle() {
        let creator = JobCreator::new(JobConfig::default());
        let shared = creator.shared_config();

        let mut config = creator.config_snapshot();
        config.registry.verbose = true;
        creator.set_config(config);

        assert!(crate::config::lock_read(&shared).registry.verbose);
    }
}
