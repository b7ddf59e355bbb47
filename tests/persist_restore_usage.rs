use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;

use jobflow::{call_args, task_fn};
use jobflow::{ConfigPersistOutputsOptions, JobConfig, JobCreator, JobError, LinearFlowTemplate,
              Refine, RestoreOutputsOptions, TaskTemplate};

fn creator_with_storage(dir: &TempDir) -> Arc<JobCreator> {
    let mut config = JobConfig::default();
    config.output_storage.local.persist_data_dir_path = dir.path().to_path_buf();
    JobCreator::new(config)
}

fn artifact_names(root: &std::path::Path) -> Vec<String> {
    let mut names = Vec::new();
    for run_dir in std::fs::read_dir(root).unwrap() {
        for file in std::fs::read_dir(run_dir.unwrap().path()).unwrap() {
            names.push(file.unwrap().file_name().into_string().unwrap());
        }
    }
    names.sort();
    names
}

#[test]
fn test_task_output_persists_and_force_restore_skips_the_body() {
    let tmp = TempDir::new().unwrap();
    let creator = creator_with_storage(&tmp);

    // 1. primera corrida: ejecuta y deja el tarpack numerado en disco
    let calls = Arc::new(AtomicUsize::new(0));
    let template =
        TaskTemplate::new(task_fn!(fn summarize[calls](count: i64) -> serde_json::Value {
            calls.fetch_add(1, Ordering::SeqCst);
            json!({ "total": count * 2, "source": "fresh" })
        })).unwrap();

    let out = template.run(&creator, call_args!(count = 21)).expect("first run");
    assert_eq!(out.expect_value("summarize").unwrap(),
               json!({ "total": 42, "source": "fresh" }));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(artifact_names(tmp.path()), vec!["00_task_summarize.json.tar.gz"]);

    // 2. instancia fresca con restauración forzada: devuelve el artefacto sin
    //    volver a correr el cuerpo, aun con otros parámetros
    let restoring =
        template.refine(Refine::new()
                            .restore_outputs(RestoreOutputsOptions::ForceEnableIgnoreParams))
                .unwrap();
    let out = restoring.run(&creator, call_args!(count = 999)).expect("restore run");
    assert_eq!(out.expect_value("summarize").unwrap(),
               json!({ "total": 42, "source": "fresh" }));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_auto_restore_runs_first_then_reuses_the_artifact() {
    let tmp = TempDir::new().unwrap();
    let creator = creator_with_storage(&tmp);

    let calls = Arc::new(AtomicUsize::new(0));
    let template = TaskTemplate::with(
        task_fn!(fn collect[calls](size: i64) -> serde_json::Value {
            calls.fetch_add(1, Ordering::SeqCst);
            json!({ "rows": (0..size).collect::<Vec<i64>>() })
        }),
        Refine::new().restore_outputs(RestoreOutputsOptions::AutoEnableIgnoreParams),
    ).unwrap();

    // 1. sin artefactos: auto cae a ejecutar, y la corrida persiste
    let out = template.run(&creator, call_args!(size = 3)).expect("first run");
    assert_eq!(out.expect_value("collect").unwrap(), json!({ "rows": [0, 1, 2] }));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // 2. segunda corrida: restaura lo persistido en lugar de ejecutar
    let out = template.run(&creator, call_args!(size = 100)).expect("second run");
    assert_eq!(out.expect_value("collect").unwrap(), json!({ "rows": [0, 1, 2] }));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_force_restore_without_artifacts_is_a_hard_error() {
    let tmp = TempDir::new().unwrap();
    let creator = creator_with_storage(&tmp);

    let template = TaskTemplate::with(
        task_fn!(fn lookup(key: String) -> serde_json::Value { json!({ "key": key }) }),
        Refine::new().restore_outputs(RestoreOutputsOptions::ForceEnableIgnoreParams),
    ).unwrap();

    let err = template.run(&creator, call_args!(key = "missing")).unwrap_err();
    assert!(matches!(err, JobError::NoPersistedOutput(_)));
}

#[test]
fn test_flow_output_persists_under_its_result_key_and_restores() {
    let tmp = TempDir::new().unwrap();
    let creator = creator_with_storage(&tmp);

    let task_calls = Arc::new(AtomicUsize::new(0));
    let double = TaskTemplate::new(task_fn!(fn double[task_calls](number: i64) -> i64 {
                                       task_calls.fetch_add(1, Ordering::SeqCst);
                                       number * 2
                                   })).unwrap();
    let increment =
        TaskTemplate::new(task_fn!(fn increment(number: i64) -> i64 { number + 1 })).unwrap();
    let flow = LinearFlowTemplate::with(task_fn!(fn chain(number: i64) -> i64 { number }),
                                        vec![double, increment],
                                        Refine::new().result_key("final")).unwrap();

    // 1. la corrida deja un único artefacto, el del flow: las tasks devuelven
    //    escalares y la persistencia las saltea
    let out = flow.run(&creator, call_args!(number = 5)).expect("flow run");
    assert_eq!(out.expect_value("chain").unwrap(), json!({ "final": 11 }));
    assert_eq!(task_calls.load(Ordering::SeqCst), 1);
    assert_eq!(artifact_names(tmp.path()), vec!["00_linear_flow_chain.json.tar.gz"]);

    // 2. restauración forzada del flow: ni el flow ni sus tasks vuelven a correr
    let restoring =
        flow.refine(Refine::new()
                        .restore_outputs(RestoreOutputsOptions::ForceEnableIgnoreParams))
            .unwrap();
    let out = restoring.run(&creator, call_args!(number = 999)).expect("flow restore");
    assert_eq!(out.expect_value("chain").unwrap(), json!({ "final": 11 }));
    assert_eq!(task_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_hot_config_change_stops_persisting_outputs() {
    let tmp = TempDir::new().unwrap();
    let creator = creator_with_storage(&tmp);
    let template = TaskTemplate::new(task_fn!(fn emit(v: i64) -> serde_json::Value {
                                         json!({ "v": v })
                                     })).unwrap();

    // 1. con la configuración por defecto la task persiste
    template.run(&creator, call_args!(v = 1)).unwrap();
    assert_eq!(artifact_names(tmp.path()).len(), 1);

    // 2. apagar la persistencia en caliente afecta las llamadas siguientes
    let mut config = creator.config_snapshot();
    config.output_storage.persist_outputs = ConfigPersistOutputsOptions::Disabled;
    creator.set_config(config);

    template.run(&creator, call_args!(v = 2)).unwrap();
    assert_eq!(artifact_names(tmp.path()).len(), 1);
}
