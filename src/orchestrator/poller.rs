use crate::engine::TransportClient;
use crate::error::ClientResult;
use crate::model::RunStatus;
use crate::orchestrator::controller::STATUS_PATH;
use std::future::Future;
use std::io::Write;
use std::time::Duration;
use tracing::{debug, info};

/// How a monitoring session ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// The server reported `isRunning == false`.
    Completed(RunStatus),
    /// The caller stopped watching. The remote run is untouched; this holds
    /// the last status seen, if any.
    Interrupted(Option<RunStatus>),
}

/// `Cycle 2/10 | Step: CV | Step time: 812.4s | Total time: 3.2h | Total Ah: 0.041`
pub fn format_progress(status: &RunStatus) -> String {
    let mode = status
        .current_mode()
        .map(|m| m.as_str().to_uppercase())
        .unwrap_or_else(|| "UNKNOWN".to_string());
    format!(
        "Cycle {}/{} | Step: {} | Step time: {:.1}s | Total time: {:.1}h | Total Ah: {:.3}",
        status.current_cycle,
        status.total_cycles,
        mode,
        status.step_time,
        status.total_time / 3600.0,
        status.total_ah
    )
}

/// Rewrites a single stderr line per poll; ends the line once the run stops.
pub fn print_progress(status: &RunStatus) {
    let mut err = std::io::stderr().lock();
    let _ = write!(err, "\r{}", format_progress(status));
    if !status.is_running {
        let _ = writeln!(err);
    }
    let _ = err.flush();
}

/// Sequential status polling until the run finishes.
///
/// One request at a time, a plain sleep between them, and never a stop,
/// pause or resume: ending the watch does not end the run.
pub struct StatusPoller<'a> {
    transport: &'a TransportClient,
    fallback: fn(&RunStatus),
}

impl<'a> StatusPoller<'a> {
    pub fn new(transport: &'a TransportClient) -> Self {
        Self {
            transport,
            fallback: print_progress,
        }
    }

    /// Replaces the reporter used when no callback is passed to a wait.
    pub fn with_default_reporter(mut self, fallback: fn(&RunStatus)) -> Self {
        self.fallback = fallback;
        self
    }

    async fn poll_once(
        &self,
        on_progress: &mut Option<&mut dyn FnMut(&RunStatus)>,
    ) -> ClientResult<RunStatus> {
        let status: RunStatus = self.transport.get_json(STATUS_PATH).await?;
        debug!(
            running = status.is_running,
            cycle = status.current_cycle,
            total_cycles = status.total_cycles,
            "status polled"
        );
        match on_progress.as_deref_mut() {
            Some(report) => report(&status),
            None => (self.fallback)(&status),
        }
        Ok(status)
    }

    /// Returns the first status with `isRunning == false`.
    pub async fn wait_for_completion(
        &self,
        interval: Duration,
        mut on_progress: Option<&mut dyn FnMut(&RunStatus)>,
    ) -> ClientResult<RunStatus> {
        loop {
            let status = self.poll_once(&mut on_progress).await?;
            if !status.is_running {
                return Ok(status);
            }
            tokio::time::sleep(interval).await;
        }
    }

    /// Like [`wait_for_completion`](Self::wait_for_completion) but gives up
    /// as soon as `abort` resolves, whether a request is in flight or the
    /// loop is sleeping. No request is sent after that.
    pub async fn wait_for_completion_or_abort<F>(
        &self,
        interval: Duration,
        mut on_progress: Option<&mut dyn FnMut(&RunStatus)>,
        abort: F,
    ) -> ClientResult<PollOutcome>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(abort);
        let mut last_seen: Option<RunStatus> = None;

        loop {
            let status = tokio::select! {
                biased;
                _ = &mut abort => {
                    info!("monitoring interrupted; remote run left untouched");
                    return Ok(PollOutcome::Interrupted(last_seen));
                }
                polled = self.poll_once(&mut on_progress) => polled?,
            };
            if !status.is_running {
                return Ok(PollOutcome::Completed(status));
            }
            last_seen = Some(status);

            tokio::select! {
                biased;
                _ = &mut abort => {
                    info!("monitoring interrupted; remote run left untouched");
                    return Ok(PollOutcome::Interrupted(last_seen));
                }
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Cutoffs, Step, StepEntry, StepMode};

    #[test]
    fn progress_line_shows_cycle_mode_and_totals() {
        let status = RunStatus {
            is_running: true,
            is_paused: false,
            channel: Some(1),
            current_cycle: 2,
            total_cycles: 10,
            current_step_index: Some(2),
            current_step: Some(StepEntry::Step(Step {
                mode: StepMode::Cv,
                current: None,
                voltage: Some(4.2),
                cutoffs: Cutoffs {
                    current: Some(0.001),
                    ..Default::default()
                },
                extra: Default::default(),
            })),
            step_time: 812.43,
            total_time: 11_520.0,
            total_ah: 0.04123,
            step_ah: None,
            cycle_ah: None,
            log_file: None,
            total_steps: Some(6),
        };
        assert_eq!(
            format_progress(&status),
            "Cycle 2/10 | Step: CV | Step time: 812.4s | Total time: 3.2h | Total Ah: 0.041"
        );
    }
}
