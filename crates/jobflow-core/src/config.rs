//! Configuración de proceso y políticas de persistencia/restauración.
//!
//! Los knobs por-job (`PersistOutputsOptions`, `RestoreOutputsOptions`,
//! `OutputStorageProtocolOptions`) admiten un valor explícito o `FollowConfig`;
//! la resolución contra `JobConfig` ocurre en cada llamada, leyendo el handle
//! compartido (`SharedConfig`) que el creador de jobs reparte. Cambiar la
//! configuración en caliente re-resuelve los ejes "follow config" sin tocar
//! las definiciones de templates.
//!
//! Variables de entorno (convención `JOBFLOW_*`, carga perezosa de `.env`):
//! `JOBFLOW_ENGINE`, `JOBFLOW_PERSIST_OUTPUTS`, `JOBFLOW_RESTORE_OUTPUTS`,
//! `JOBFLOW_OUTPUT_STORAGE_PROTOCOL`, `JOBFLOW_PERSIST_DATA_DIR`,
//! `JOBFLOW_REGISTRY_VERBOSE`, `JOBFLOW_ENGINE_VERBOSE`.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use dotenvy::dotenv;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_PERSIST_DATA_DIR;
use crate::engine::base::EngineConfig;

// Carga perezosa del archivo .env una sola vez.
static DOTENV_LOADED: Lazy<()> = Lazy::new(|| {
    let _ = dotenv(); // ignora error si no existe .env
});

/// Forzar carga temprana de .env desde aplicaciones externas si se desea.
pub fn init_dotenv() {
    Lazy::force(&DOTENV_LOADED);
}

// ---------------------------------------------------------------------------
// Ejes por-job (valor explícito o "seguir configuración")
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PersistOutputsOptions {
    Disabled,
    #[default]
    FollowConfig,
    Enabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RestoreOutputsOptions {
    Disabled,
    #[default]
    FollowConfig,
    AutoEnableIgnoreParams,
    ForceEnableIgnoreParams,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OutputStorageProtocolOptions {
    Local,
    S3,
    #[default]
    FollowConfig,
}

// ---------------------------------------------------------------------------
// Lados de configuración de proceso
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConfigPersistOutputsOptions {
    Disabled,
    EnableFlowOutputs,
    #[default]
    EnableFlowAndTaskOutputs,
}

impl FromStr for ConfigPersistOutputsOptions {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "disabled" => Ok(Self::Disabled),
            "enable_flow_outputs" => Ok(Self::EnableFlowOutputs),
            "enable_flow_and_task_outputs" => Ok(Self::EnableFlowAndTaskOutputs),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConfigRestoreOutputsOptions {
    #[default]
    Disabled,
    AutoEnableIgnoreParams,
}

impl FromStr for ConfigRestoreOutputsOptions {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "disabled" => Ok(Self::Disabled),
            "auto_enable_ignore_params" => Ok(Self::AutoEnableIgnoreParams),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConfigOutputStorageProtocolOptions {
    #[default]
    Local,
    S3,
}

impl FromStr for ConfigOutputStorageProtocolOptions {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(Self::Local),
            "s3" => Ok(Self::S3),
            _ => Err(()),
        }
    }
}

/// Elección de motor a nivel de proceso: local o uno externo aportado por el
/// usuario. El motor externo llega como objeto, la configuración solo decide
/// cuál de los motores vinculados usa el creador.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EngineChoice {
    #[default]
    Local,
    External,
}

impl FromStr for EngineChoice {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(Self::Local),
            "external" => Ok(Self::External),
            _ => Err(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Bloques de configuración
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalOutputStorageConfig {
    pub persist_data_dir_path: PathBuf,
}

impl Default for LocalOutputStorageConfig {
    fn default() -> Self {
        Self { persist_data_dir_path: PathBuf::from(DEFAULT_PERSIST_DATA_DIR) }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct OutputStorageConfig {
    pub persist_outputs: ConfigPersistOutputsOptions,
    pub restore_outputs: ConfigRestoreOutputsOptions,
    pub protocol: ConfigOutputStorageProtocolOptions,
    pub local: LocalOutputStorageConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RunStateRegistryConfig {
    pub verbose: bool,
}

/// Configuración de proceso completa que los jobs leen reactivamente.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct JobConfig {
    pub engine_choice: EngineChoice,
    pub output_storage: OutputStorageConfig,
    pub registry: RunStateRegistryConfig,
    pub engine: EngineConfig,
}

/// Handle compartido: el creador y todos sus jobs leen la misma configuración
/// viva; los mutadores publican el cambio para las llamadas siguientes.
pub type SharedConfig = Arc<RwLock<JobConfig>>;

impl JobConfig {
    pub fn from_env() -> Self {
        Lazy::force(&DOTENV_LOADED);
        let engine_choice = env_parse("JOBFLOW_ENGINE");
        let persist_outputs = env_parse("JOBFLOW_PERSIST_OUTPUTS");
        let restore_outputs = env_parse("JOBFLOW_RESTORE_OUTPUTS");
        let protocol = env_parse("JOBFLOW_OUTPUT_STORAGE_PROTOCOL");
        let persist_data_dir_path = env::var("JOBFLOW_PERSIST_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_PERSIST_DATA_DIR));
        let registry_verbose = env_flag("JOBFLOW_REGISTRY_VERBOSE");
        let engine_verbose = env_flag("JOBFLOW_ENGINE_VERBOSE");

        Self { engine_choice,
               output_storage: OutputStorageConfig {
                   persist_outputs,
                   restore_outputs,
                   protocol,
                   local: LocalOutputStorageConfig { persist_data_dir_path },
               },
               registry: RunStateRegistryConfig { verbose: registry_verbose },
               engine: EngineConfig { verbose: engine_verbose } }
    }

    pub fn into_shared(self) -> SharedConfig {
        Arc::new(RwLock::new(self))
    }
}

// Lecturas tolerantes a poisoning: un panic ajeno no deja la configuración
// inaccesible para el resto del proceso.
pub(crate) fn lock_read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poison| poison.into_inner())
}

pub(crate) fn lock_write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poison| poison.into_inner())
}

fn env_parse<T: FromStr + Default>(key: &str) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or_default()
}

fn env_flag(key: &str) -> bool {
    env::var(key).ok()
                 .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
                 .unwrap_or(false)
}
