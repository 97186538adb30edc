use std::collections::VecDeque;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::bail;
use crate::config::ChangefeedManagerConfig;
use crate::error::{CdcError, CdcResult, ErrorKind};
use crate::model::{AdminJob, AdminJobType, ChangefeedId, FeedState, RunningError};
use crate::orchestrator::state::ChangefeedState;

/// The per-changefeed lifecycle control loop.
///
/// On every reconciliation tick the manager reads the changefeed's state
/// mirror, drains pending administrative jobs, evaluates the error-rate
/// circuit breaker and queues the patches that drive the descriptor and
/// status through the lifecycle state machine. It is the unique authority
/// that writes the descriptor's state and both admin-job-type fields.
///
/// One instance exists per changefeed and is ticked by a single-threaded
/// owner loop; nothing in here blocks on I/O.
#[derive(Debug)]
pub struct FeedStateManager {
    changefeed_id: ChangefeedId,
    config: ChangefeedManagerConfig,
    admin_job_queue: VecDeque<AdminJob>,
    should_running: bool,
}

impl FeedStateManager {
    pub fn new(changefeed_id: ChangefeedId, config: ChangefeedManagerConfig) -> Self {
        Self {
            changefeed_id,
            config,
            admin_job_queue: VecDeque::new(),
            should_running: false,
        }
    }

    /// Enqueues an administrative job for the next tick.
    ///
    /// Jobs targeting another changefeed are dropped: the job may simply be
    /// stale or mis-routed, so this is not an error.
    pub fn push_admin_job(&mut self, job: AdminJob) {
        if job.changefeed_id != self.changefeed_id {
            warn!(
                changefeed_id = %self.changefeed_id,
                target_id = %job.changefeed_id,
                job_type = %job.job_type,
                "dropping admin job targeting another changefeed"
            );
            return;
        }

        self.admin_job_queue.push_back(job);
    }

    /// Schedules, for the next tick, the transition to the finished state.
    ///
    /// Used when the changefeed reached its target and has no more work,
    /// rather than in response to an external command.
    pub fn mark_finished(&mut self) {
        self.admin_job_queue.push_back(AdminJob {
            changefeed_id: self.changefeed_id.clone(),
            job_type: AdminJobType::Finish,
            opts: Default::default(),
        });
    }

    /// Returns whether workers should currently replicate for this
    /// changefeed. Pure query, true only in the normal state.
    pub fn should_running(&self) -> bool {
        self.should_running
    }

    /// Runs one reconciliation step against the changefeed's state mirror.
    ///
    /// Only queues patches on `state`; the caller is responsible for handing
    /// the batch to the state store and reflecting the result back into the
    /// mirror before the next tick. A failed patch application is likewise
    /// the caller's to retry, by re-running the whole cycle.
    pub fn tick(&mut self, state: &mut ChangefeedState) -> CdcResult<()> {
        if state.id() != &self.changefeed_id {
            bail!(
                ErrorKind::InvalidState,
                "Ticked with another changefeed's state mirror",
                state.id()
            );
        }

        // Not yet initialized, or torn down by a force removal. The manager
        // observes the initial descriptor, it does not originate it.
        let (Some(info), Some(_)) = (&state.info, &state.status) else {
            self.should_running = false;
            return Ok(());
        };

        let mut cur = info.state;
        self.should_running = cur.should_run();

        if self.handle_admin_jobs(state, &mut cur) {
            // Skip error inspection until the queued transitions have been
            // applied and mirrored back.
            self.should_running = cur.should_run();
            return Ok(());
        }

        let errors = self.collect_reported_errors(state);
        self.handle_errors(state, cur, &errors);

        Ok(())
    }

    /// Drains the admin job queue in arrival order, applying the lifecycle
    /// transition table against the state as composed so far this tick.
    ///
    /// Returns `true` if any job changed the lifecycle state. Jobs that are
    /// invalid for the current state are ignored; the command may be stale.
    fn handle_admin_jobs(&mut self, state: &mut ChangefeedState, cur: &mut FeedState) -> bool {
        let mut handled = false;

        while let Some(job) = self.admin_job_queue.pop_front() {
            match job.job_type {
                AdminJobType::Stop => match *cur {
                    FeedState::Normal | FeedState::Error => {
                        info!(changefeed_id = %self.changefeed_id, "stopping changefeed");
                        self.patch_feed_state(state, FeedState::Stopped);
                        *cur = FeedState::Stopped;
                        handled = true;
                    }
                    FeedState::Stopped => {}
                    other => self.ignore_job(&job, other),
                },
                AdminJobType::Resume => match *cur {
                    FeedState::Stopped | FeedState::Error => {
                        info!(changefeed_id = %self.changefeed_id, "resuming changefeed");
                        self.patch_feed_state(state, FeedState::Normal);
                        // Leaving the stopped or error state resets the
                        // circuit breaker.
                        state.patch_info(|info| match info {
                            Some(mut info)
                                if info.error.is_some() || !info.error_history.is_empty() =>
                            {
                                info.error = None;
                                info.error_history.clear();
                                Ok((Some(info), true))
                            }
                            other => Ok((other, false)),
                        });
                        *cur = FeedState::Normal;
                        handled = true;
                    }
                    FeedState::Normal => {
                        debug!(changefeed_id = %self.changefeed_id, "changefeed is already running");
                    }
                    other => self.ignore_job(&job, other),
                },
                AdminJobType::Remove => {
                    info!(
                        changefeed_id = %self.changefeed_id,
                        force = job.opts.force_remove,
                        "removing changefeed"
                    );
                    self.patch_feed_state(state, FeedState::Removed);
                    *cur = FeedState::Removed;
                    handled = true;

                    if job.opts.force_remove {
                        // Full teardown: erase the descriptor, the status
                        // and every per-worker record.
                        state.patch_info(|info| Ok((None, info.is_some())));
                        state.patch_status(|status| Ok((None, status.is_some())));
                        self.clean_up_task_records(state);
                    }
                }
                AdminJobType::Finish => match *cur {
                    FeedState::Removed => self.ignore_job(&job, FeedState::Removed),
                    _ => {
                        info!(changefeed_id = %self.changefeed_id, "changefeed finished");
                        self.patch_feed_state(state, FeedState::Finished);
                        self.clean_up_task_records(state);
                        *cur = FeedState::Finished;
                        handled = true;
                    }
                },
                AdminJobType::None => {
                    warn!(
                        changefeed_id = %self.changefeed_id,
                        "dropping admin job without a job type"
                    );
                }
            }
        }

        handled
    }

    fn ignore_job(&self, job: &AdminJob, cur: FeedState) {
        warn!(
            changefeed_id = %self.changefeed_id,
            job_type = %job.job_type,
            state = %cur,
            "ignoring admin job invalid for the current state"
        );
    }

    /// Consumes every newly reported worker error from its task-position
    /// mailbox, queueing the patch that clears the field.
    fn collect_reported_errors(&self, state: &mut ChangefeedState) -> Vec<RunningError> {
        let mut reporting: Vec<_> = state
            .task_positions
            .iter()
            .filter_map(|(capture_id, position)| {
                let error = position.error.as_ref()?;
                Some((capture_id.clone(), error.clone()))
            })
            .collect();
        // Deterministic aggregation order across captures.
        reporting.sort_by(|(a, _), (b, _)| a.cmp(b));

        let mut errors = Vec::with_capacity(reporting.len());
        for (capture_id, error) in reporting {
            warn!(
                changefeed_id = %self.changefeed_id,
                capture_id = %capture_id,
                code = %error.code,
                message = %error.message,
                "worker reported an error"
            );
            state.patch_task_position(&capture_id, |position| match position {
                Some(mut position) if position.error.is_some() => {
                    position.error = None;
                    Ok((Some(position), true))
                }
                other => Ok((other, false)),
            });
            errors.push(error);
        }

        errors
    }

    /// Records reported errors in the descriptor's history and trips the
    /// circuit breaker when the threshold is reached.
    fn handle_errors(&mut self, state: &mut ChangefeedState, cur: FeedState, errors: &[RunningError]) {
        if errors.is_empty() {
            return;
        }

        let now = Utc::now().timestamp_millis();
        let cutoff = now - self.config.error_history_gc_interval_ms as i64;
        let live = state
            .info
            .as_ref()
            .map(|info| info.error_history.iter().filter(|ts| **ts >= cutoff).count())
            .unwrap_or(0);
        let total = live + errors.len();

        let appended = errors.len();
        let last = errors.last().cloned();
        state.patch_info(move |info| match info {
            Some(mut info) => {
                info.error_history.retain(|ts| *ts >= cutoff);
                info.error_history.extend(std::iter::repeat_n(now, appended));
                info.error = last.clone();
                Ok((Some(info), true))
            }
            None => Ok((None, false)),
        });

        if cur == FeedState::Normal && total >= self.config.error_history_threshold {
            warn!(
                changefeed_id = %self.changefeed_id,
                error_count = total,
                threshold = self.config.error_history_threshold,
                "error threshold reached, stopping changefeed"
            );
            self.patch_feed_state(state, FeedState::Error);
            self.should_running = false;
        }
    }

    /// Queues the patches that move the descriptor's state and both
    /// admin-job-type fields as one atomic set.
    fn patch_feed_state(&self, state: &mut ChangefeedState, feed_state: FeedState) {
        let admin_job_type = match feed_state {
            FeedState::Normal => AdminJobType::None,
            FeedState::Stopped | FeedState::Error => AdminJobType::Stop,
            FeedState::Removed => AdminJobType::Remove,
            FeedState::Finished => AdminJobType::Finish,
        };

        state.patch_status(move |status| match status {
            Some(mut status) if status.admin_job_type != admin_job_type => {
                status.admin_job_type = admin_job_type;
                Ok((Some(status), true))
            }
            other => Ok((other, false)),
        });
        state.patch_info(move |info| match info {
            Some(mut info) => {
                let changed = info.state != feed_state || info.admin_job_type != admin_job_type;
                info.state = feed_state;
                info.admin_job_type = admin_job_type;
                Ok((Some(info), changed))
            }
            None => Ok((None, false)),
        });
    }

    /// Queues deletion patches for every per-worker record of the
    /// changefeed. Worker records are owned by their captures for writes;
    /// the manager only ever deletes them, at teardown.
    fn clean_up_task_records(&self, state: &mut ChangefeedState) {
        for capture_id in state.active_captures() {
            state.patch_task_status(&capture_id, |status| Ok((None, status.is_some())));
            state.patch_task_position(&capture_id, |position| Ok((None, position.is_some())));
            state.patch_task_workload(&capture_id, |workload| Ok((None, workload.is_some())));
        }
    }
}
