use std::time::Duration;

use cdc::config::ChangefeedManagerConfig;
use cdc::model::{
    AdminJob, AdminJobType, ChangefeedInfo, ChangefeedStatus, FeedState, ReplicaConfig,
    RunningError, TaskPosition, TaskStatus, TaskWorkload,
};
use cdc::owner::FeedStateManager;
use cdc::test_utils::{ChangefeedStateTester, init_test_tracing};

fn new_manager(changefeed_id: &str) -> FeedStateManager {
    FeedStateManager::new(changefeed_id.into(), ChangefeedManagerConfig::default())
}

fn admin_job(changefeed_id: &str, job_type: AdminJobType) -> AdminJob {
    AdminJob {
        changefeed_id: changefeed_id.into(),
        job_type,
        opts: Default::default(),
    }
}

fn running_error(addr: &str) -> RunningError {
    RunningError {
        addr: addr.to_owned(),
        code: "[CDC:ErrEtcdSessionDone]".to_owned(),
        message: "fake error for test".to_owned(),
    }
}

/// Creates the changefeed descriptor and status, the way an external API
/// layer would before the owner's first tick.
async fn init_changefeed(tester: &mut ChangefeedStateTester) {
    tester.state.patch_info(|info| {
        assert!(info.is_none());
        Ok((
            Some(ChangefeedInfo::new("mysql://sink", ReplicaConfig::default())),
            true,
        ))
    });
    tester.state.patch_status(|status| {
        assert!(status.is_none());
        Ok((Some(ChangefeedStatus::default()), true))
    });
    tester.must_apply_patches().await;
}

/// Registers worker records for one capture, the way the scheduler and the
/// capture itself would.
async fn assign_capture(tester: &mut ChangefeedStateTester, capture_id: &str) {
    let capture = capture_id.into();
    tester
        .state
        .patch_task_status(&capture, |_| Ok((Some(TaskStatus::default()), true)));
    tester
        .state
        .patch_task_position(&capture, |_| Ok((Some(TaskPosition::default()), true)));
    tester
        .state
        .patch_task_workload(&capture, |_| Ok((Some(TaskWorkload::default()), true)));
    tester.must_apply_patches().await;
}

async fn report_error(tester: &mut ChangefeedStateTester, capture_id: &str, error: RunningError) {
    let capture = capture_id.into();
    tester
        .state
        .patch_task_position(&capture, move |position| {
            let mut position = position.unwrap_or_default();
            position.error = Some(error.clone());
            Ok((Some(position), true))
        });
    tester.must_apply_patches().await;
}

#[tokio::test]
async fn admin_jobs_drive_the_lifecycle() {
    init_test_tracing();
    let mut manager = new_manager("feed-1");
    let mut tester = ChangefeedStateTester::new("feed-1".into());
    init_changefeed(&mut tester).await;

    manager.tick(&mut tester.state).unwrap();
    tester.must_apply_patches().await;
    assert!(manager.should_running());

    // An admin job targeting another changefeed must not change anything.
    manager.push_admin_job(admin_job("fake-changefeed-id", AdminJobType::Stop));
    manager.tick(&mut tester.state).unwrap();
    tester.must_apply_patches().await;
    assert!(manager.should_running());
    assert_eq!(tester.state.info.as_ref().unwrap().state, FeedState::Normal);

    // A running changefeed cannot be resumed.
    manager.push_admin_job(admin_job("feed-1", AdminJobType::Resume));
    manager.tick(&mut tester.state).unwrap();
    tester.must_apply_patches().await;
    assert!(manager.should_running());

    // Stop the changefeed.
    manager.push_admin_job(admin_job("feed-1", AdminJobType::Stop));
    manager.tick(&mut tester.state).unwrap();
    tester.must_apply_patches().await;
    assert!(!manager.should_running());
    let info = tester.state.info.as_ref().unwrap();
    let status = tester.state.status.as_ref().unwrap();
    assert_eq!(info.state, FeedState::Stopped);
    assert_eq!(info.admin_job_type, AdminJobType::Stop);
    assert_eq!(status.admin_job_type, AdminJobType::Stop);

    // Resume it.
    manager.push_admin_job(admin_job("feed-1", AdminJobType::Resume));
    manager.tick(&mut tester.state).unwrap();
    tester.must_apply_patches().await;
    assert!(manager.should_running());
    let info = tester.state.info.as_ref().unwrap();
    let status = tester.state.status.as_ref().unwrap();
    assert_eq!(info.state, FeedState::Normal);
    assert_eq!(info.admin_job_type, AdminJobType::None);
    assert_eq!(status.admin_job_type, AdminJobType::None);

    // Remove it; descriptor and status are retained.
    manager.push_admin_job(admin_job("feed-1", AdminJobType::Remove));
    manager.tick(&mut tester.state).unwrap();
    tester.must_apply_patches().await;
    assert!(!manager.should_running());
    let info = tester.state.info.as_ref().unwrap();
    let status = tester.state.status.as_ref().unwrap();
    assert_eq!(info.state, FeedState::Removed);
    assert_eq!(info.admin_job_type, AdminJobType::Remove);
    assert_eq!(status.admin_job_type, AdminJobType::Remove);

    // A removed changefeed cannot be stopped or resumed.
    for job_type in [AdminJobType::Stop, AdminJobType::Resume] {
        manager.push_admin_job(admin_job("feed-1", job_type));
        manager.tick(&mut tester.state).unwrap();
        tester.must_apply_patches().await;
        assert!(!manager.should_running());
        assert_eq!(tester.state.info.as_ref().unwrap().state, FeedState::Removed);
        assert_eq!(
            tester.state.info.as_ref().unwrap().admin_job_type,
            AdminJobType::Remove
        );
    }

    // Force removal erases descriptor and status.
    manager.push_admin_job(AdminJob {
        changefeed_id: "feed-1".into(),
        job_type: AdminJobType::Remove,
        opts: cdc::model::AdminJobOption { force_remove: true },
    });
    manager.tick(&mut tester.state).unwrap();
    tester.must_apply_patches().await;
    assert!(!manager.should_running());
    assert!(tester.state.info.is_none());
    assert!(tester.state.status.is_none());
}

#[tokio::test]
async fn uninitialized_changefeed_defers_all_decisions() {
    init_test_tracing();
    let mut manager = new_manager("feed-1");
    let mut tester = ChangefeedStateTester::new("feed-1".into());

    // No descriptor or status yet: the tick queues nothing and the job stays
    // pending until initialization is observed.
    manager.push_admin_job(admin_job("feed-1", AdminJobType::Stop));
    manager.tick(&mut tester.state).unwrap();
    assert!(!manager.should_running());
    assert!(!tester.state.has_pending_patches());

    init_changefeed(&mut tester).await;
    manager.tick(&mut tester.state).unwrap();
    tester.must_apply_patches().await;
    assert!(!manager.should_running());
    assert_eq!(tester.state.info.as_ref().unwrap().state, FeedState::Stopped);
}

#[tokio::test]
async fn mark_finished_transitions_to_finished() {
    init_test_tracing();
    let mut manager = new_manager("feed-1");
    let mut tester = ChangefeedStateTester::new("feed-1".into());
    init_changefeed(&mut tester).await;

    manager.tick(&mut tester.state).unwrap();
    tester.must_apply_patches().await;
    assert!(manager.should_running());

    manager.mark_finished();
    manager.tick(&mut tester.state).unwrap();
    tester.must_apply_patches().await;
    assert!(!manager.should_running());
    let info = tester.state.info.as_ref().unwrap();
    let status = tester.state.status.as_ref().unwrap();
    assert_eq!(info.state, FeedState::Finished);
    assert_eq!(info.admin_job_type, AdminJobType::Finish);
    assert_eq!(status.admin_job_type, AdminJobType::Finish);
}

#[tokio::test]
async fn finish_cleans_up_worker_records() {
    init_test_tracing();
    let mut manager = new_manager("feed-1");
    let mut tester = ChangefeedStateTester::new("feed-1".into());
    init_changefeed(&mut tester).await;
    assign_capture(&mut tester, "capture-a").await;

    let capture: cdc::model::CaptureId = "capture-a".into();
    assert!(tester.state.task_statuses.contains_key(&capture));
    assert!(tester.state.task_positions.contains_key(&capture));
    assert!(tester.state.workloads.contains_key(&capture));

    manager.tick(&mut tester.state).unwrap();
    tester.must_apply_patches().await;
    assert!(manager.should_running());

    manager.mark_finished();
    manager.tick(&mut tester.state).unwrap();
    tester.must_apply_patches().await;
    assert!(!manager.should_running());
    assert_eq!(tester.state.info.as_ref().unwrap().state, FeedState::Finished);
    assert!(tester.state.task_statuses.is_empty());
    assert!(tester.state.task_positions.is_empty());
    assert!(tester.state.workloads.is_empty());
}

#[tokio::test]
async fn force_remove_clears_worker_records() {
    init_test_tracing();
    let mut manager = new_manager("feed-1");
    let mut tester = ChangefeedStateTester::new("feed-1".into());
    init_changefeed(&mut tester).await;
    assign_capture(&mut tester, "capture-a").await;
    assign_capture(&mut tester, "capture-b").await;

    manager.push_admin_job(AdminJob {
        changefeed_id: "feed-1".into(),
        job_type: AdminJobType::Remove,
        opts: cdc::model::AdminJobOption { force_remove: true },
    });
    manager.tick(&mut tester.state).unwrap();
    tester.must_apply_patches().await;

    assert!(tester.state.info.is_none());
    assert!(tester.state.status.is_none());
    assert!(tester.state.task_statuses.is_empty());
    assert!(tester.state.task_positions.is_empty());
    assert!(tester.state.workloads.is_empty());
}

#[tokio::test]
async fn reported_errors_are_consumed_and_recorded() {
    init_test_tracing();
    let mut manager = new_manager("feed-1");
    let mut tester = ChangefeedStateTester::new("feed-1".into());
    init_changefeed(&mut tester).await;
    assign_capture(&mut tester, "capture-a").await;
    report_error(&mut tester, "capture-a", running_error("127.0.0.1:8300")).await;

    manager.tick(&mut tester.state).unwrap();
    tester.must_apply_patches().await;

    // One error is far below the threshold; the changefeed keeps running and
    // the mailbox is cleared.
    assert!(manager.should_running());
    assert_eq!(tester.state.info.as_ref().unwrap().state, FeedState::Normal);
    let capture: cdc::model::CaptureId = "capture-a".into();
    let position = &tester.state.task_positions[&capture];
    assert!(position.error.is_none());
    let info = tester.state.info.as_ref().unwrap();
    assert_eq!(info.error_history.len(), 1);
    assert_eq!(
        info.error.as_ref().unwrap().code,
        "[CDC:ErrEtcdSessionDone]"
    );
}

#[tokio::test]
async fn error_threshold_trips_the_circuit_breaker() {
    init_test_tracing();
    let config = ChangefeedManagerConfig::default();
    let mut manager = FeedStateManager::new("feed-1".into(), config.clone());
    let mut tester = ChangefeedStateTester::new("feed-1".into());
    init_changefeed(&mut tester).await;
    assign_capture(&mut tester, "capture-a").await;

    manager.tick(&mut tester.state).unwrap();
    tester.must_apply_patches().await;
    assert!(manager.should_running());

    // Accumulate errors across ticks until the threshold is reached.
    for _ in 0..config.error_history_threshold {
        report_error(&mut tester, "capture-a", running_error("127.0.0.1:8300")).await;
        manager.tick(&mut tester.state).unwrap();
        tester.must_apply_patches().await;
    }

    assert!(!manager.should_running());
    let info = tester.state.info.as_ref().unwrap();
    let status = tester.state.status.as_ref().unwrap();
    assert_eq!(info.state, FeedState::Error);
    assert_eq!(info.admin_job_type, AdminJobType::Stop);
    assert_eq!(status.admin_job_type, AdminJobType::Stop);
}

#[tokio::test]
async fn errors_while_stopped_are_recorded_without_tripping_the_breaker() {
    init_test_tracing();
    let config = ChangefeedManagerConfig::default();
    let mut manager = FeedStateManager::new("feed-1".into(), config.clone());
    let mut tester = ChangefeedStateTester::new("feed-1".into());
    init_changefeed(&mut tester).await;
    assign_capture(&mut tester, "capture-a").await;

    manager.push_admin_job(admin_job("feed-1", AdminJobType::Stop));
    manager.tick(&mut tester.state).unwrap();
    tester.must_apply_patches().await;
    assert_eq!(tester.state.info.as_ref().unwrap().state, FeedState::Stopped);

    // Workers may keep reporting while the feed winds down. The mailboxes
    // are still consumed and the history still grows, but a stopped feed
    // never escalates to the error state, threshold or not.
    for _ in 0..config.error_history_threshold {
        report_error(&mut tester, "capture-a", running_error("127.0.0.1:8300")).await;
        manager.tick(&mut tester.state).unwrap();
        tester.must_apply_patches().await;
    }

    assert!(!manager.should_running());
    let capture: cdc::model::CaptureId = "capture-a".into();
    assert!(tester.state.task_positions[&capture].error.is_none());
    let info = tester.state.info.as_ref().unwrap();
    assert_eq!(info.state, FeedState::Stopped);
    assert_eq!(info.admin_job_type, AdminJobType::Stop);
    assert_eq!(info.error_history.len(), config.error_history_threshold);
    assert_eq!(
        info.error.as_ref().unwrap().code,
        "[CDC:ErrEtcdSessionDone]"
    );
}

#[tokio::test]
async fn stale_history_entries_age_out_of_the_breaker_window() {
    init_test_tracing();
    let config = ChangefeedManagerConfig {
        error_history_threshold: 2,
        error_history_gc_interval_ms: 50,
    };
    let mut manager = FeedStateManager::new("feed-1".into(), config);
    let mut tester = ChangefeedStateTester::new("feed-1".into());
    init_changefeed(&mut tester).await;
    assign_capture(&mut tester, "capture-a").await;

    manager.tick(&mut tester.state).unwrap();
    tester.must_apply_patches().await;

    report_error(&mut tester, "capture-a", running_error("127.0.0.1:8300")).await;
    manager.tick(&mut tester.state).unwrap();
    tester.must_apply_patches().await;
    assert_eq!(tester.state.info.as_ref().unwrap().state, FeedState::Normal);
    assert_eq!(tester.state.info.as_ref().unwrap().error_history.len(), 1);

    // Let the first entry fall out of the accounting window. The next error
    // lands in a pruned history and no longer sums up to the threshold.
    tokio::time::sleep(Duration::from_millis(120)).await;
    report_error(&mut tester, "capture-a", running_error("127.0.0.1:8300")).await;
    manager.tick(&mut tester.state).unwrap();
    tester.must_apply_patches().await;

    assert!(manager.should_running());
    let info = tester.state.info.as_ref().unwrap();
    assert_eq!(info.state, FeedState::Normal);
    assert_eq!(info.admin_job_type, AdminJobType::None);
    assert_eq!(info.error_history.len(), 1);
}

#[tokio::test]
async fn resume_from_error_state_resets_the_history() {
    init_test_tracing();
    let config = ChangefeedManagerConfig::default();
    let mut manager = FeedStateManager::new("feed-1".into(), config.clone());
    let mut tester = ChangefeedStateTester::new("feed-1".into());
    init_changefeed(&mut tester).await;
    assign_capture(&mut tester, "capture-a").await;

    for _ in 0..config.error_history_threshold {
        report_error(&mut tester, "capture-a", running_error("127.0.0.1:8300")).await;
        manager.tick(&mut tester.state).unwrap();
        tester.must_apply_patches().await;
    }
    assert_eq!(tester.state.info.as_ref().unwrap().state, FeedState::Error);

    manager.push_admin_job(admin_job("feed-1", AdminJobType::Resume));
    manager.tick(&mut tester.state).unwrap();
    tester.must_apply_patches().await;

    assert!(manager.should_running());
    let info = tester.state.info.as_ref().unwrap();
    assert_eq!(info.state, FeedState::Normal);
    assert_eq!(info.admin_job_type, AdminJobType::None);
    assert!(info.error.is_none());
    assert!(info.error_history.is_empty());
}

#[tokio::test]
async fn commands_queued_in_one_tick_compose_in_order() {
    init_test_tracing();
    let mut manager = new_manager("feed-1");
    let mut tester = ChangefeedStateTester::new("feed-1".into());
    init_changefeed(&mut tester).await;

    manager.tick(&mut tester.state).unwrap();
    tester.must_apply_patches().await;

    // Stop then resume, both consumed by the same tick: the final visible
    // value is the composition of the queued patches.
    manager.push_admin_job(admin_job("feed-1", AdminJobType::Stop));
    manager.push_admin_job(admin_job("feed-1", AdminJobType::Resume));
    manager.tick(&mut tester.state).unwrap();
    tester.must_apply_patches().await;

    assert!(manager.should_running());
    let info = tester.state.info.as_ref().unwrap();
    assert_eq!(info.state, FeedState::Normal);
    assert_eq!(info.admin_job_type, AdminJobType::None);
}
