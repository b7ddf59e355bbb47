use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use serde_json::json;

use jobflow::compute::JobView;
use jobflow::engine::{EngineJobState, TaskRunner};
use jobflow::{call_args, flow_fn, task_fn};
use jobflow::{CallArgs, CallFunc, ConfigPersistOutputsOptions, DagFlowTemplate, Engine,
              EngineChoice, EngineConfig, FuncFlowTemplate, JobConfig, JobCreator, JobError,
              JobOutput, JobResult, LinearFlowTemplate, RunState, RunStateRegistry, TaskTemplate};

fn quiet_creator() -> Arc<JobCreator> {
    let mut config = JobConfig::default();
    config.output_storage.persist_outputs = ConfigPersistOutputsOptions::Disabled;
    JobCreator::new(config)
}

#[test]
fn test_pipeline_mixing_every_flow_kind() {
    let creator = quiet_creator();

    // linear: 2x + 1
    let double = TaskTemplate::new(task_fn!(fn double(number: i64) -> i64 { number * 2 })).unwrap();
    let increment =
        TaskTemplate::new(task_fn!(fn increment(number: i64) -> i64 { number + 1 })).unwrap();
    let prepare = LinearFlowTemplate::new(task_fn!(fn prepare(number: i64) -> i64 { number }),
                                          vec![double, increment]).unwrap();

    // dag: ensancha a {y} y remata con y*2
    let widen = TaskTemplate::new(task_fn!(fn widen(x: i64) -> serde_json::Value {
                                      json!({ "y": x + 1 })
                                  })).unwrap();
    let finish = TaskTemplate::new(task_fn!(fn finish(y: i64) -> i64 { y * 2 })).unwrap();
    let spread = DagFlowTemplate::new(task_fn!(fn spread(x: i64) -> i64 { x }),
                                      vec![widen, finish]).unwrap();

    // func flow que orquesta los otros dos
    let pipeline =
        FuncFlowTemplate::new(flow_fn!(fn pipeline[prepare, spread](scope, number: i64) -> i64 {
            let prepared = scope.call(&prepare, call_args!(number))?;
            let spreaded = scope.call(&spread, call_args!(x = prepared))?;
            spreaded.as_i64().unwrap_or(0)
        })).unwrap();

    // number=3: prepare 7; spread: y=8, final 16
    let out = pipeline.run(&creator, call_args!(number = 3)).expect("pipeline run");
    assert_eq!(out.expect_value("pipeline").unwrap(), json!(16));

    // las tres clases de flow y sus cuatro tasks quedaron registradas y
    // terminadas
    let jobs = creator.registry().all_jobs(Some(RunState::Finished));
    assert!(jobs.iter().any(|n| n.starts_with("func-flow-pipeline-")), "got {jobs:?}");
    assert!(jobs.iter().any(|n| n.starts_with("linear-flow-prepare-")), "got {jobs:?}");
    assert!(jobs.iter().any(|n| n.starts_with("dag-flow-spread-")), "got {jobs:?}");
    assert!(jobs.iter().any(|n| n.starts_with("task-double-")), "got {jobs:?}");
    assert_eq!(jobs.len(), 7);
}

#[tokio::test]
async fn test_async_func_flow_resolves_through_the_facade() {
    let creator = quiet_creator();
    let slow_double =
        TaskTemplate::new(task_fn!(async fn slow_double(number: i64) -> i64 { number * 2 }))
            .unwrap();
    let flow = FuncFlowTemplate::new(
        flow_fn!(async fn gather[slow_double](scope, numbers: Vec<i64>) -> Vec<i64> {
            let mut out = Vec::with_capacity(numbers.len());
            for number in numbers {
                let doubled = scope.call_async(&slow_double, call_args!(number)).await?;
                out.push(doubled.as_i64().unwrap_or(0));
            }
            out
        }),
    ).unwrap();

    let job = flow.apply(&creator).expect("apply");
    let out = job.call(call_args!(numbers = [1, 2, 3])).expect("call");
    let value = out.resolve().await.unwrap();
    assert_eq!(value, json!([2, 4, 6]));
    assert_eq!(job.run_state().unwrap(), RunState::Finished);
}

#[test]
fn test_external_engine_choice_without_binding_falls_back_to_local() {
    let creator = quiet_creator();
    creator.set_engine_choice(EngineChoice::External);

    let ping = TaskTemplate::new(task_fn!(fn ping(x: i64) -> i64 { x })).unwrap();
    let out = ping.run(&creator, call_args!(x = 7)).expect("run");
    assert_eq!(out.expect_value("ping").unwrap(), json!(7));
}

// Engine externo mínimo: solo corre tasks, delegando en la cadena decorada.
struct CountingEngine {
    registry: RwLock<Option<Arc<RunStateRegistry>>>,
    task_runs: Arc<AtomicUsize>,
}

impl Engine for CountingEngine {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn set_config(&self, _config: EngineConfig) {}

    fn set_registry(&self, registry: Option<Arc<RunStateRegistry>>) {
        *self.registry.write().unwrap() = registry;
    }

    fn registry(&self) -> Option<Arc<RunStateRegistry>> {
        self.registry.read().unwrap().clone()
    }

    fn task_runner(&self) -> Option<&dyn TaskRunner> {
        Some(self)
    }
}

impl TaskRunner for CountingEngine {
    fn init_task(&self, _task: &JobView) -> JobResult<EngineJobState> {
        Ok(Box::new(()))
    }

    fn run_task(&self,
                _state: &EngineJobState,
                _task: &JobView,
                call_func: &CallFunc,
                call: CallArgs)
                -> JobResult<JobOutput> {
        self.task_runs.fetch_add(1, Ordering::SeqCst);
        call_func(call)
    }
}

#[test]
fn test_bound_external_engine_runs_tasks_and_reports_capabilities() {
    let creator = quiet_creator();
    let task_runs = Arc::new(AtomicUsize::new(0));
    creator.set_external_engine(Arc::new(CountingEngine { registry: RwLock::new(None),
                                                          task_runs: task_runs.clone() }));
    creator.set_engine_choice(EngineChoice::External);

    let caps = creator.engine().capabilities();
    assert!(caps.task);
    assert!(!caps.linear_flow);

    // 1. las tasks corren por el engine externo y el registro del creador las ve
    let double = TaskTemplate::new(task_fn!(fn double(number: i64) -> i64 { number * 2 })).unwrap();
    let out = double.run(&creator, call_args!(number = 8)).expect("run");
    assert_eq!(out.expect_value("double").unwrap(), json!(16));
    assert_eq!(task_runs.load(Ordering::SeqCst), 1);
    assert_eq!(creator.registry().all_jobs(Some(RunState::Finished)).len(), 1);

    // 2. sin runner de flows, aplicar un flow es un error de capacidad
    let flow = LinearFlowTemplate::new(task_fn!(fn chain(number: i64) -> i64 { number }),
                                       vec![double]).unwrap();
    let err = flow.apply(&creator).unwrap_err();
    assert!(matches!(err, JobError::MissingEngineCapability { .. }));
}
