/// Concurrency tests: racing starts and racing writes against a closing execution.

use std::sync::Arc;

use safeops::errors::{AppError, ConflictKind};
use safeops::models::alert::AlertType;

mod common;
use common::*;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_starts_create_exactly_one_execution() {
    let engine = Arc::new(setup_engine());
    let alert_id = engine.alert(AlertType::Medical).await;

    let mut handles = Vec::new();
    for actor in 1..=8 {
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            engine.service.start_execution(alert_id, actor, None).await
        }));
    }

    let mut started = Vec::new();
    let mut conflicts = Vec::new();
    for handle in handles {
        match handle.await.expect("task panicked") {
            Ok(execution) => started.push(execution.id),
            Err(AppError::Conflict(ConflictKind::OpenExecutionExists { execution_id, .. })) => {
                conflicts.push(execution_id)
            }
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(started.len(), 1);
    assert_eq!(conflicts.len(), 7);
    assert!(conflicts.iter().all(|id| *id == started[0]));

    let executions = engine.service.list_executions_for_alert(alert_id).await.expect("list");
    assert_eq!(executions.len(), 1);
}

#[tokio::test]
async fn test_second_start_reports_existing_execution() {
    let engine = setup_engine();
    let alert_id = engine.alert(AlertType::Panic).await;

    let (first, second) = tokio::join!(
        engine.service.start_execution(alert_id, RESPONDER, None),
        engine.service.start_execution(alert_id, SUPERVISOR, None),
    );

    let (winner, loser) = match (first, second) {
        (Ok(w), Err(l)) | (Err(l), Ok(w)) => (w, l),
        other => panic!("expected one success and one conflict, got {other:?}"),
    };
    match loser {
        AppError::Conflict(ConflictKind::OpenExecutionExists { alert_id: a, execution_id }) => {
            assert_eq!(a, alert_id);
            assert_eq!(execution_id, winner.id);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_completions_of_one_step_keep_one_record() {
    let engine = Arc::new(setup_engine());
    engine.panic_template().await;
    let alert_id = engine.alert(AlertType::Panic).await;
    let execution = engine.service.start_execution(alert_id, RESPONDER, None).await.expect("start");

    let writers: Vec<i64> = (100..108).collect();
    let mut handles = Vec::new();
    for actor in writers.iter().copied() {
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            engine
                .service
                .complete_step(execution.id, 1, actor, Some(format!("by {actor}")), None)
                .await
        }));
    }
    for handle in handles {
        handle.await.expect("task panicked").expect("complete");
    }

    let reloaded = engine.service.get_execution(execution.id).await.expect("reload");
    assert_eq!(reloaded.completions.iter().filter(|c| c.step_order == 1).count(), 1);
    let completion = reloaded.completion(1).expect("step 1");
    assert!(writers.contains(&completion.completed_by));
    assert_eq!(completion.notes, Some(format!("by {}", completion.completed_by)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_completions_racing_close_never_land_after_closure() {
    let engine = Arc::new(setup_engine());
    engine.panic_template().await;
    let alert_id = engine.alert(AlertType::Panic).await;
    let execution = engine.service.start_execution(alert_id, RESPONDER, None).await.expect("start");
    for order in [1, 2, 4] {
        engine.service.complete_step(execution.id, order, RESPONDER, None, None).await.expect("complete");
    }

    let closer = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.service.close_execution(execution.id, SUPERVISOR, None).await })
    };
    let writer = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.service.complete_step(execution.id, 3, RESPONDER, None, None).await })
    };

    closer.await.expect("closer panicked").expect("close");
    let step_result = writer.await.expect("writer panicked");

    let reloaded = engine.service.get_execution(execution.id).await.expect("reload");
    let closed_at = reloaded.closure.as_ref().expect("closed").completed_at;
    match step_result {
        Ok(_) => {
            let completion = reloaded.completion(3).expect("optional step recorded");
            assert!(completion.completed_at <= closed_at);
        }
        Err(err) => {
            assert!(err.is_precondition());
            assert!(reloaded.completion(3).is_none());
        }
    }
}
