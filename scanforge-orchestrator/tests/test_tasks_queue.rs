//! Integration tests for the tasks queue: immediate/scheduled enqueueing,
//! synchronous planning validation, skip-by-intensity, drift-free periodic
//! rescheduling and cancellation semantics.

mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::fixtures::{
    dir_buster, hard_only_tool, port, port_scanner, scan_process, wait_until, MapParser,
    ScriptedRunner,
};
use scanforge_core::domain::{IntensityRank, Target, TargetPort};
use scanforge_orchestrator::domain::entities::{Process, Task};
use scanforge_orchestrator::domain::services::{LoggingFindingsPipeline, OutputParser, ToolRunner};
use scanforge_orchestrator::domain::value_objects::{Status, TimeUnit};
use scanforge_orchestrator::infrastructure::executions::ExecutionsQueue;
use scanforge_orchestrator::infrastructure::stores::{
    ExecutionStore, InMemoryExecutionStore, InMemoryTaskStore, TaskStore,
};
use scanforge_orchestrator::infrastructure::tasks::{TaskError, TasksQueue};
use uuid::Uuid;

struct Harness {
    tasks: Arc<InMemoryTaskStore>,
    executions: Arc<InMemoryExecutionStore>,
    tasks_queue: TasksQueue,
}

fn harness(runner: Arc<dyn ToolRunner>, parser: Arc<dyn OutputParser>) -> Harness {
    let tasks = InMemoryTaskStore::new();
    let executions = InMemoryExecutionStore::new();
    let executions_queue = ExecutionsQueue::new(
        Duration::from_secs(3600),
        std::env::temp_dir(),
        tasks.clone(),
        executions.clone(),
        runner,
        parser,
        Arc::new(LoggingFindingsPipeline),
    );
    executions_queue.start_workers(2);
    let tasks_queue = TasksQueue::new(
        Duration::from_secs(3600),
        tasks.clone(),
        executions.clone(),
        executions_queue,
    );
    tasks_queue.start_workers(2);
    Harness {
        tasks,
        executions,
        tasks_queue,
    }
}

async fn task_status(harness: &Harness, task_id: Uuid) -> Option<Status> {
    harness
        .tasks
        .get(task_id)
        .await
        .ok()
        .flatten()
        .map(|task| task.status)
}

async fn task_terminal(harness: &Harness, task_id: Uuid) -> bool {
    task_status(harness, task_id)
        .await
        .map(|status| status.is_terminal())
        .unwrap_or(false)
}

#[tokio::test]
async fn tool_task_runs_to_completion() {
    let (tool, configuration) = port_scanner();
    let harness = harness(ScriptedRunner::new(), MapParser::empty());

    let task = Task::new_tool_task(
        Target::new("10.10.10.5"),
        tool,
        configuration,
        IntensityRank::Normal,
    );
    let task_id = task.id;
    let enqueued = harness.tasks_queue.enqueue(task).await.unwrap();
    assert!(enqueued.enqueued_at.is_some());

    assert!(
        wait_until(Duration::from_secs(5), || task_terminal(&harness, task_id)).await,
        "task never reached a terminal status"
    );

    assert_eq!(task_status(&harness, task_id).await, Some(Status::Completed));
    let executions = harness.executions.by_task(task_id).await.unwrap();
    assert_eq!(executions.len(), 1);
    assert_eq!(executions[0].group, 1);
    assert_eq!(executions[0].status, Status::Completed);
}

#[tokio::test]
async fn unsatisfiable_tool_task_is_rejected_before_enqueue() {
    // The dirbuster requires a URL; without port findings or target ports
    // there is no admissible argument combination.
    let (tool, configuration) = dir_buster();
    let harness = harness(ScriptedRunner::new(), MapParser::empty());

    let task = Task::new_tool_task(
        Target::new("10.10.10.5"),
        tool,
        configuration,
        IntensityRank::Normal,
    );
    let task_id = task.id;

    let err = harness.tasks_queue.enqueue(task).await.unwrap_err();
    assert!(matches!(err, TaskError::Planning(_)));
    assert!(harness
        .executions
        .by_task(task_id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn tool_task_with_target_port_parameter_is_admissible() {
    let (tool, configuration) = dir_buster();
    let runner = ScriptedRunner::new();
    let harness = harness(runner.clone(), MapParser::empty());

    let mut task = Task::new_tool_task(
        Target::new("10.10.10.5"),
        tool,
        configuration,
        IntensityRank::Normal,
    );
    task.target_ports = vec![TargetPort::new(8080)];
    let task_id = task.id;
    harness.tasks_queue.enqueue(task).await.unwrap();

    assert!(
        wait_until(Duration::from_secs(5), || task_terminal(&harness, task_id)).await,
        "task never reached a terminal status"
    );

    let invocations = runner.invocations();
    assert_eq!(invocations.len(), 1);
    assert!(invocations[0].1.join(" ").contains("10.10.10.5:8080"));
}

#[tokio::test]
async fn process_task_skips_steps_above_the_requested_intensity() {
    let scanner = port_scanner();
    let hard = hard_only_tool();
    let process = Process {
        id: Uuid::new_v4(),
        name: "partial".into(),
        steps: vec![
            common::fixtures::step(&scanner.0, &scanner.1, 1),
            common::fixtures::step(&hard.0, &hard.1, 2),
        ],
    };
    let harness = harness(ScriptedRunner::new(), MapParser::empty());

    let task = Task::new_process_task(
        Target::new("10.10.10.5"),
        Arc::new(process),
        IntensityRank::Normal,
    );
    let task_id = task.id;
    harness.tasks_queue.enqueue(task).await.unwrap();

    assert!(
        wait_until(Duration::from_secs(5), || task_terminal(&harness, task_id)).await,
        "task never reached a terminal status"
    );

    let executions = harness.executions.by_task(task_id).await.unwrap();
    assert_eq!(executions.len(), 2);
    let skipped = executions
        .iter()
        .find(|execution| execution.tool.name == "exploitsearch")
        .unwrap();
    assert_eq!(skipped.status, Status::Skipped);
    assert!(!skipped.skipped_reason.as_deref().unwrap_or("").is_empty());
    assert!(skipped.start.is_none());

    let ran = executions
        .iter()
        .find(|execution| execution.tool.name == "portscan")
        .unwrap();
    assert_eq!(ran.status, Status::Completed);
    // Partial skips still let the task complete.
    assert_eq!(task_status(&harness, task_id).await, Some(Status::Completed));
}

#[tokio::test]
async fn process_task_with_every_step_skipped_ends_skipped() {
    let hard = hard_only_tool();
    let process = Process {
        id: Uuid::new_v4(),
        name: "all-hard".into(),
        steps: vec![common::fixtures::step(&hard.0, &hard.1, 1)],
    };
    let harness = harness(ScriptedRunner::new(), MapParser::empty());

    let task = Task::new_process_task(
        Target::new("10.10.10.5"),
        Arc::new(process),
        IntensityRank::Sneaky,
    );
    let task_id = task.id;
    harness.tasks_queue.enqueue(task).await.unwrap();

    assert!(
        wait_until(Duration::from_secs(5), || task_terminal(&harness, task_id)).await,
        "task never reached a terminal status"
    );
    assert_eq!(task_status(&harness, task_id).await, Some(Status::Skipped));
}

#[tokio::test]
async fn full_process_chains_waves_through_findings() {
    let (process, _tools) = scan_process();
    let web_host = common::fixtures::host("10.10.10.5");
    let web80 = port(Some(&web_host), 80, Some("http"));
    let parser = MapParser::new(HashMap::from([(
        "portscan".to_string(),
        vec![web80.clone()],
    )]));
    let runner = ScriptedRunner::new();
    let harness = harness(runner.clone(), parser);

    let task = Task::new_process_task(
        Target::new("10.10.10.5"),
        Arc::new(process),
        IntensityRank::Normal,
    );
    let task_id = task.id;
    harness.tasks_queue.enqueue(task).await.unwrap();

    assert!(
        wait_until(Duration::from_secs(10), || task_terminal(&harness, task_id)).await,
        "task never reached a terminal status"
    );
    assert_eq!(task_status(&harness, task_id).await, Some(Status::Completed));

    let executions = harness.executions.by_task(task_id).await.unwrap();
    for execution in &executions {
        let expected_group = match execution.tool.name.as_str() {
            "portscan" => 1,
            "dirbust" => 2,
            "aggregate" => 3,
            other => panic!("unexpected tool {other}"),
        };
        assert_eq!(execution.group, expected_group);
        assert_eq!(execution.status, Status::Completed);
    }
    // Pipeline order is preserved across the queue.
    assert_eq!(
        runner.runs(),
        vec!["portscan".to_string(), "dirbust".into(), "aggregate".into()]
    );
}

#[tokio::test]
async fn periodic_task_reschedules_without_drift() {
    let (tool, configuration) = port_scanner();
    let harness = harness(ScriptedRunner::new(), MapParser::empty());

    let mut task = Task::new_tool_task(
        Target::new("10.10.10.5"),
        tool,
        configuration,
        IntensityRank::Normal,
    );
    task.repeat_in = Some(1);
    task.repeat_time_unit = Some(TimeUnit::Days);
    let task_id = task.id;
    harness.tasks_queue.enqueue(task).await.unwrap();

    // The successor row appears as soon as the first run is consumed.
    assert!(
        wait_until(Duration::from_secs(5), || async {
            harness.tasks.all().await.map(|all| all.len() == 2).unwrap_or(false)
        })
        .await,
        "the periodic chain never produced a successor task"
    );

    let all = harness.tasks.all().await.unwrap();
    let original = all.iter().find(|task| task.id == task_id).unwrap();
    let successor = all.iter().find(|task| task.id != task_id).unwrap();

    let expected = original.enqueued_at.unwrap() + TimeUnit::Days.duration(1);
    assert_eq!(successor.enqueued_at, Some(expected));
    assert_eq!(successor.scheduled_at, Some(expected));
    assert_eq!(successor.status, Status::Requested);
    assert!(successor.is_periodic());
    // No executions exist for the successor yet.
    assert!(harness
        .executions
        .by_task(successor.id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn scheduled_task_records_enqueued_at_before_the_delay() {
    let (tool, configuration) = port_scanner();
    let harness = harness(ScriptedRunner::new(), MapParser::empty());

    let mut task = Task::new_tool_task(
        Target::new("10.10.10.5"),
        tool,
        configuration,
        IntensityRank::Normal,
    );
    task.scheduled_in = Some(1);
    task.scheduled_time_unit = Some(TimeUnit::Hours);
    let task_id = task.id;

    let before = Utc::now();
    let enqueued = harness.tasks_queue.enqueue(task).await.unwrap();
    let recorded = enqueued.enqueued_at.unwrap();
    assert!(recorded >= before + TimeUnit::Hours.duration(1) - chrono::Duration::seconds(5));

    // Nothing runs while the delay is pending.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(task_status(&harness, task_id).await, Some(Status::Requested));
    assert!(harness.executions.by_task(task_id).await.unwrap().is_empty());

    // Cancelling a scheduled task aborts the pending enqueue.
    harness.tasks_queue.cancel_task(task_id).await.unwrap();
    assert_eq!(task_status(&harness, task_id).await, Some(Status::Cancelled));
}

#[tokio::test]
async fn cancelling_a_running_task_stops_its_executions() {
    let (tool, configuration) = port_scanner();
    let runner = ScriptedRunner::blocking_on("portscan");
    let harness = harness(runner, MapParser::empty());

    let task = Task::new_tool_task(
        Target::new("10.10.10.5"),
        tool,
        configuration,
        IntensityRank::Normal,
    );
    let task_id = task.id;
    harness.tasks_queue.enqueue(task).await.unwrap();

    // Wait for the execution to actually start running.
    assert!(
        wait_until(Duration::from_secs(5), || async {
            harness
                .executions
                .by_task(task_id)
                .await
                .map(|executions| {
                    executions
                        .iter()
                        .any(|execution| execution.status == Status::Running)
                })
                .unwrap_or(false)
        })
        .await,
        "execution never started"
    );

    harness.tasks_queue.cancel_task(task_id).await.unwrap();

    let executions = harness.executions.by_task(task_id).await.unwrap();
    assert!(!executions.is_empty());
    for execution in &executions {
        assert_eq!(execution.status, Status::Cancelled);
        assert!(execution.end.is_some());
    }
    assert_eq!(task_status(&harness, task_id).await, Some(Status::Cancelled));

    // Cancelling again fails without side effects.
    let err = harness.tasks_queue.cancel_task(task_id).await.unwrap_err();
    assert!(matches!(err, TaskError::NotCancellable(_)));
    let after = harness.executions.by_task(task_id).await.unwrap();
    for (execution, earlier) in after.iter().zip(&executions) {
        assert_eq!(execution.status, earlier.status);
        assert_eq!(execution.end, earlier.end);
    }
}
