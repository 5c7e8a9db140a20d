//! Stop sequence task

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use ringlink_proto::ble::commands;

use crate::{Engine, Transport};

/// Pauses between stop-sequence steps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopTiming {
    /// After each stop frame
    pub step: Duration,
    /// After the reboot frame
    pub reboot_settle: Duration,
    /// Upper bound on waiting for the queue to drain before disconnecting
    pub drain_grace: Duration,
}

impl Default for StopTiming {
    fn default() -> Self {
        Self {
            step: Duration::from_millis(200),
            reboot_settle: Duration::from_millis(650),
            drain_grace: Duration::from_millis(1000),
        }
    }
}

/// One launched stop sequence. `id` ties it to the engine's active stop so
/// a run outliving its session is ignored.
#[derive(Debug)]
pub(crate) struct StopRun {
    pub id: u64,
    pub send_reboot: bool,
    pub token: CancellationToken,
    pub timing: StopTiming,
}

impl StopRun {
    pub fn steps(&self) -> Vec<(&'static str, Duration)> {
        let mut steps = vec![
            (commands::STOP_RAW, self.timing.step),
            (commands::STOP_RAW, self.timing.step),
            (commands::STOP_CAMERA, self.timing.step),
        ];
        if self.send_reboot {
            steps.push((commands::REBOOT, self.timing.reboot_settle));
        }
        steps
    }
}

pub(crate) async fn run<T: Transport>(engine: Engine<T>, run: StopRun) {
    tracing::debug!(id = run.id, reboot = run.send_reboot, "stop sequence started");

    for (hex, pause) in run.steps() {
        if !engine.submit_stop_step(run.id, hex) {
            return;
        }
        tokio::select! {
            _ = run.token.cancelled() => return,
            _ = tokio::time::sleep(pause) => {}
        }
    }

    engine.conclude_stop(run.id);

    tokio::select! {
        _ = run.token.cancelled() => {}
        _ = tokio::time::sleep(run.timing.drain_grace) => {
            engine.finish_stop(run.id, "Stop sequence drain timed out; disconnecting.");
        }
    }
}
