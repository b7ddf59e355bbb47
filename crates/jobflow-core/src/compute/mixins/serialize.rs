//! Persistencia y restauración de outputs como tarpacks comprimidos.
//!
//! Antes de correr, un job con restauración habilitada busca su output más
//! reciente en disco y lo devuelve sin ejecutar nada; `force` convierte la
//! ausencia en error, `auto` cae a ejecutar. Después de correr, si la
//! política lo habilita y el output tiene forma de dataset, se escribe como
//! `{NN}_{job_name}.{sufijo}.tar.gz` bajo un directorio fechado con la corrida
//! raíz en curso, de modo que todos los artefactos de un mismo flow queden
//! juntos. Los outputs asíncronos persisten su valor resuelto: la envoltura
//! viaja dentro del future.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use jobflow_data::{Dataset, SerializerRegistry};
use serde_json::Value;

use crate::compute::func::JobOutput;
use crate::compute::job::{JobKind, JobView};
use crate::config::{ConfigOutputStorageProtocolOptions, ConfigPersistOutputsOptions,
                    ConfigRestoreOutputsOptions, JobConfig, OutputStorageProtocolOptions,
                    PersistOutputsOptions, RestoreOutputsOptions};
use crate::constants::{PERSIST_FILE_SUFFIX, RUN_DIR_TIMESTAMP_FORMAT};
use crate::errors::{JobError, JobResult};

use super::name::job_name_from_unique_name;

/// Si esta llamada persiste su output. El valor explícito del job manda;
/// `FollowConfig` distingue flows de tasks: los flows persisten salvo
/// deshabilitación total, las tasks solo con `EnableFlowAndTaskOutputs`.
pub(crate) fn will_persist(opt: PersistOutputsOptions, kind: JobKind, config: &JobConfig) -> bool {
    match opt {
        PersistOutputsOptions::Enabled => true,
        PersistOutputsOptions::Disabled => false,
        PersistOutputsOptions::FollowConfig => match config.output_storage.persist_outputs {
            ConfigPersistOutputsOptions::Disabled => false,
            ConfigPersistOutputsOptions::EnableFlowOutputs => kind.is_flow(),
            ConfigPersistOutputsOptions::EnableFlowAndTaskOutputs => true,
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ResolvedRestore {
    Disabled,
    Auto,
    Force,
}

/// Resolución del eje de restauración; `FollowConfig` toma el valor del
/// proceso, sin distinguir clase de job.
pub(crate) fn resolved_restore(opt: RestoreOutputsOptions, config: &JobConfig) -> ResolvedRestore {
    match opt {
        RestoreOutputsOptions::Disabled => ResolvedRestore::Disabled,
        RestoreOutputsOptions::AutoEnableIgnoreParams => ResolvedRestore::Auto,
        RestoreOutputsOptions::ForceEnableIgnoreParams => ResolvedRestore::Force,
        RestoreOutputsOptions::FollowConfig => match config.output_storage.restore_outputs {
            ConfigRestoreOutputsOptions::Disabled => ResolvedRestore::Disabled,
            ConfigRestoreOutputsOptions::AutoEnableIgnoreParams => ResolvedRestore::Auto,
        },
    }
}

pub(crate) fn resolved_protocol(opt: OutputStorageProtocolOptions,
                                config: &JobConfig)
                                -> ConfigOutputStorageProtocolOptions {
    match opt {
        OutputStorageProtocolOptions::Local => ConfigOutputStorageProtocolOptions::Local,
        OutputStorageProtocolOptions::S3 => ConfigOutputStorageProtocolOptions::S3,
        OutputStorageProtocolOptions::FollowConfig => config.output_storage.protocol,
    }
}

/// Todo lo que la capa de serialización necesita para una llamada, ya
/// resuelto contra la configuración del momento.
pub(crate) struct SerializeContext {
    pub view: JobView,
    pub persist: PersistOutputsOptions,
    pub restore: RestoreOutputsOptions,
    pub protocol: OutputStorageProtocolOptions,
    pub config: JobConfig,
    pub serializers: Arc<SerializerRegistry>,
    /// Hora que fecha el directorio de la corrida (la del flow raíz si hay).
    pub run_time: DateTime<Utc>,
}

impl SerializeContext {
    /// Envuelve la ejecución del job: restaura si corresponde, corre si no, y
    /// persiste el resultado según la política.
    pub(crate) fn around(self,
                         run: impl FnOnce() -> JobResult<JobOutput>)
                         -> JobResult<JobOutput> {
        match resolved_restore(self.restore, &self.config) {
            ResolvedRestore::Disabled => {}
            mode => match self.restore_output() {
                Ok(value) => return Ok(JobOutput::Value(value)),
                Err(err) if mode == ResolvedRestore::Force => return Err(err),
                Err(err) => {
                    log::info!("Could not restore output of job \"{}\" ({}); running it instead",
                               self.view.unique_name,
                               err);
                }
            },
        }

        let out = run()?;

        if !will_persist(self.persist, self.view.kind, &self.config) {
            return Ok(out);
        }
        if resolved_protocol(self.protocol, &self.config)
           != ConfigOutputStorageProtocolOptions::Local
        {
            log::warn!("output storage protocol \"s3\" has no backend bound for job \"{}\"; \
                        skipping persist",
                       self.view.unique_name);
            return Ok(out);
        }

        let plan = self.persist_plan();
        let serializers = self.serializers.clone();
        match out {
            JobOutput::Value(value) => {
                persist_value(&plan, &serializers, &value)?;
                Ok(JobOutput::Value(value))
            }
            JobOutput::Future(fut) => {
                Ok(JobOutput::Future(Box::pin(async move {
                                         let value = fut.await?;
                                         persist_value(&plan, &serializers, &value)?;
                                         Ok(value)
                                     })))
            }
            JobOutput::Stream(stream) => {
                log::info!("Output of job \"{}\" is a stream and cannot be persisted",
                           self.view.unique_name);
                Ok(JobOutput::Stream(stream))
            }
        }
    }

    fn persist_plan(&self) -> PersistPlan {
        let root = self.config.output_storage.local.persist_data_dir_path.clone();
        let dir = root.join(self.run_time.format(RUN_DIR_TIMESTAMP_FORMAT).to_string());
        PersistPlan { unique_name: self.view.unique_name.clone(),
                      job_name: job_name_from_unique_name(&self.view.unique_name),
                      dir }
    }

    fn restore_output(&self) -> JobResult<Value> {
        if resolved_protocol(self.protocol, &self.config)
           != ConfigOutputStorageProtocolOptions::Local
        {
            log::warn!("output storage protocol \"s3\" has no backend bound for job \"{}\"; \
                        treating restore as unavailable",
                       self.view.unique_name);
            return Err(JobError::NoPersistedOutput(self.view.unique_name.clone()));
        }

        let root = &self.config.output_storage.local.persist_data_dir_path;
        let job_name = job_name_from_unique_name(&self.view.unique_name);
        let paths = output_paths_for_last_run(root, &self.view.unique_name, &job_name)?;
        let path = paths.first()
                        .ok_or_else(|| {
                            JobError::NoPersistedOutput(self.view.unique_name.clone())
                        })?;

        let dataset = self.serializers.load_from_tar_file_path(path)?;
        let shown = fs::canonicalize(path).unwrap_or_else(|_| path.clone());
        log::info!("Restoring dataset of job \"{}\" from a gzipped tarpack at \"{}\"",
                   self.view.unique_name,
                   shown.display());
        Ok(dataset.to_data())
    }
}

struct PersistPlan {
    unique_name: String,
    job_name: String,
    dir: PathBuf,
}

fn persist_value(plan: &PersistPlan,
                 serializers: &SerializerRegistry,
                 value: &Value)
                 -> JobResult<()> {
    let dataset = match Dataset::from_data(value) {
        Ok(dataset) => dataset,
        Err(_) => {
            log::info!("Output of job \"{}\" is not a dataset and cannot be persisted",
                       plan.unique_name);
            return Ok(());
        }
    };

    let serializer = serializers.auto_detect(&dataset)
                                .ok_or_else(|| {
                                    JobError::SerializerNotFound(plan.unique_name.clone())
                                })?;

    fs::create_dir_all(&plan.dir)?;
    let file_count = fs::read_dir(&plan.dir)?.count();
    let file_name = format!("{:02}_{}.{}{}",
                            file_count,
                            plan.job_name,
                            serializer.output_file_suffix(),
                            PERSIST_FILE_SUFFIX);
    let path = plan.dir.join(file_name);

    let bytes = serializer.serialize(&dataset)?;
    fs::write(&path, bytes)?;

    let shown = fs::canonicalize(&path).unwrap_or_else(|_| path.clone());
    log::info!("Writing dataset as a gzipped tarpack to \"{}\"", shown.display());
    Ok(())
}

/// Archivos de output del último run bajo `root`, más nuevos primero,
/// filtrados al `job_name` dado. Solo mira el directorio fechado más reciente.
fn output_paths_for_last_run(root: &Path,
                             unique_name: &str,
                             job_name: &str)
                             -> JobResult<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(JobError::NoPersistedOutput(unique_name.to_owned()));
    }

    let mut run_dirs: Vec<String> = fs::read_dir(root)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .collect();
    run_dirs.sort();
    let newest = run_dirs.last()
                         .ok_or_else(|| JobError::NoPersistedOutput(unique_name.to_owned()))?;
    let run_dir = root.join(newest);

    let mut file_names: Vec<String> = fs::read_dir(&run_dir)?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .collect();
    file_names.sort();
    file_names.reverse();

    Ok(file_names.into_iter()
                 .filter(|name| file_matches_job(name, job_name))
                 .map(|name| run_dir.join(name))
                 .collect())
}

/// `{NN}_{job_name}.{sufijo}.tar.gz`
fn file_matches_job(file_name: &str, job_name: &str) -> bool {
    let Some(stem) = file_name.strip_suffix(PERSIST_FILE_SUFFIX) else {
        return false;
    };
    let Some((head, _suffix)) = stem.rsplit_once('.') else {
        return false;
    };
    match head.split_once('_') {
        Some((_ordinal, name)) => name == job_name,
        None => false,
    }
}
