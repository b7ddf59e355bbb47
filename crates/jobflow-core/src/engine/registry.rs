//! Registro de estados de ejecución de jobs.
//!
//! Cada job aplicado pasa por `INITIALIZED -> RUNNING -> FINISHED`, siempre
//! de a un paso; cualquier salto u retroceso es error. Las filas se indexan
//! por unique name, así que una copia del mismo job (mismo nombre) continúa
//! la historia de la fila en lugar de abrir otra. `DashMap` da la
//! concurrencia por fila y un contador atómico conserva el orden de llegada.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::config::RunStateRegistryConfig;
use crate::errors::{JobError, JobResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum RunState {
    Initialized = 1,
    Running = 2,
    Finished = 3,
}

impl RunState {
    pub fn value(self) -> u8 {
        self as u8
    }

    fn slot(self) -> usize {
        (self as u8 - 1) as usize
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Initialized => "INITIALIZED",
            RunState::Running => "RUNNING",
            RunState::Finished => "FINISHED",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
struct JobRecord {
    state: RunState,
    datetimes: [Option<DateTime<Utc>>; 3],
    order: u64,
}

/// Registro concurrente de estados por unique name.
#[derive(Debug, Default)]
pub struct RunStateRegistry {
    rows: DashMap<String, JobRecord>,
    insertion: AtomicU64,
    verbose: AtomicBool,
}

impl RunStateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_config(&self, config: &RunStateRegistryConfig) {
        self.verbose.store(config.verbose, Ordering::Relaxed);
    }

    /// Registra la transición de un job a `state`. La primera transición debe
    /// ser `INITIALIZED`; las siguientes avanzan exactamente un paso.
    pub fn set_job_state(&self, unique_name: &str, state: RunState) -> JobResult<()> {
        let now = Utc::now();

        match self.rows.entry(unique_name.to_owned()) {
            Entry::Occupied(mut entry) => {
                let record = entry.get_mut();
                if state.value() != record.state.value() + 1 {
                    return Err(JobError::InvalidStateTransition { job: unique_name.to_owned(),
                                                                  from: record.state,
                                                                  to: state });
                }
                record.state = state;
                record.datetimes[state.slot()] = Some(now);
            }
            Entry::Vacant(entry) => {
                if state != RunState::Initialized {
                    return Err(JobError::InvalidInitialState { job: unique_name.to_owned(),
                                                               state });
                }
                let order = self.insertion.fetch_add(1, Ordering::Relaxed);
                let mut datetimes = [None; 3];
                datetimes[state.slot()] = Some(now);
                entry.insert(JobRecord { state,
                                         datetimes,
                                         order });
            }
        }

        self.log_state(unique_name, state, now);
        Ok(())
    }

    pub fn get_job_state(&self, unique_name: &str) -> JobResult<RunState> {
        self.rows
            .get(unique_name)
            .map(|record| record.state)
            .ok_or_else(|| JobError::UnknownJob(unique_name.to_owned()))
    }

    pub fn get_job_state_datetime(&self,
                                  unique_name: &str,
                                  state: RunState)
                                  -> JobResult<DateTime<Utc>> {
        let record = self.rows
                         .get(unique_name)
                         .ok_or_else(|| JobError::UnknownJob(unique_name.to_owned()))?;
        record.datetimes[state.slot()]
              .ok_or(JobError::UnknownStateDatetime { job: unique_name.to_owned(),
                                                      state })
    }

    /// Unique names registrados, en orden de llegada. Con `state` filtra a los
    /// jobs actualmente en ese estado.
    pub fn all_jobs(&self, state: Option<RunState>) -> Vec<String> {
        let mut jobs: Vec<(u64, String)> =
            self.rows
                .iter()
                .filter(|entry| state.map_or(true, |s| entry.value().state == s))
                .map(|entry| (entry.value().order, entry.key().clone()))
                .collect();
        jobs.sort_by_key(|(order, _)| *order);
        jobs.into_iter().map(|(_, name)| name).collect()
    }

    pub fn job_count(&self) -> usize {
        self.rows.len()
    }

    pub fn contains_job(&self, unique_name: &str) -> bool {
        self.rows.contains_key(unique_name)
    }

    fn log_state(&self, unique_name: &str, state: RunState, datetime: DateTime<Utc>) {
        match state {
            RunState::Initialized => log::info!("Initialized \"{unique_name}\""),
            RunState::Running => log::info!("Started running \"{unique_name}\"..."),
            RunState::Finished => log::info!("Finished running \"{unique_name}\"!"),
        }
        if self.verbose.load(Ordering::Relaxed) {
            log::debug!("Job \"{unique_name}\" entered {state} at {datetime}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_lifecycle_moves_one_step_at_a_time() {
        let registry = RunStateRegistry::new();
        registry.set_job_state("task-a-1234abcd", RunState::Initialized)
                .unwrap();
        registry.set_job_state("task-a-1234abcd", RunState::Running)
                .unwrap();
        registry.set_job_state("task-a-1234abcd", RunState::Finished)
                .unwrap();
        assert_eq!(registry.get_job_state("task-a-1234abcd").unwrap(),
                   RunState::Finished);
    }

    #[test]
    fn skipping_a_state_is_rejected_with_full_message() {
        let registry = RunStateRegistry::new();
        registry.set_job_state("task-b-00ff00ff", RunState::Initialized)
                .unwrap();
        let err = registry.set_job_state("task-b-00ff00ff", RunState::Finished)
                          .unwrap_err();
        assert_eq!(err.to_string(),
                   "Error in job \"task-b-00ff00ff\": transitioning from state INITIALIZED to \
                    state FINISHED is not allowed");
    }

    #[test]
    fn first_state_must_be_initialized() {
        let registry = RunStateRegistry::new();
        let err = registry.set_job_state("task-c-deadbeef", RunState::Running)
                          .unwrap_err();
        assert!(matches!(err, JobError::InvalidInitialState { .. }));
    }

    #[test]
    fn repeating_a_state_is_rejected() {
        let registry = RunStateRegistry::new();
        registry.set_job_state("task-d-0badf00d", RunState::Initialized)
                .unwrap();
        assert!(registry.set_job_state("task-d-0badf00d", RunState::Initialized)
                        .is_err());
    }

    #[test]
    fn same_unique_name_continues_the_row() {
        // otra instancia con el mismo unique name retoma la historia
        let registry = RunStateRegistry::new();
        registry.set_job_state("task-e-12121212", RunState::Initialized)
                .unwrap();
        registry.set_job_state("task-e-12121212", RunState::Running)
                .unwrap();
        assert_eq!(registry.job_count(), 1);
    }

    #[test]
    fn all_jobs_preserves_insertion_order_and_filters_by_state() {
        let registry = RunStateRegistry::new();
        for name in ["task-x-aaaaaaaa", "task-y-bbbbbbbb", "task-z-cccccccc"] {
            registry.set_job_state(name, RunState::Initialized).unwrap();
        }
        registry.set_job_state("task-y-bbbbbbbb", RunState::Running)
                .unwrap();

        assert_eq!(registry.all_jobs(None),
                   vec!["task-x-aaaaaaaa", "task-y-bbbbbbbb", "task-z-cccccccc"]);
        assert_eq!(registry.all_jobs(Some(RunState::Running)),
                   vec!["task-y-bbbbbbbb"]);
        assert_eq!(registry.all_jobs(Some(RunState::Finished)),
                   Vec::<String>::new());
    }

    #[test]
    fn datetimes_are_recorded_per_state() {
        let registry = RunStateRegistry::new();
        registry.set_job_state("task-f-77777777", RunState::Initialized)
                .unwrap();
        registry.set_job_state("task-f-77777777", RunState::Running)
                .unwrap();

        let init = registry.get_job_state_datetime("task-f-77777777", RunState::Initialized)
                           .unwrap();
        let running = registry.get_job_state_datetime("task-f-77777777", RunState::Running)
                              .unwrap();
        assert!(init <= running);
        assert!(matches!(registry.get_job_state_datetime("task-f-77777777", RunState::Finished),
                         Err(JobError::UnknownStateDatetime { .. })));
    }
}
