use time::OffsetDateTime;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;
use uuid::Uuid;

use crate::models::execution::{LogData, LogEntry};

/// Items delivered to a live listener of a run.
#[derive(Debug, Clone, PartialEq)]
pub enum RunUpdate {
    Log(LogData),
    Done,
}

/// Collects the ordered log of a run and mirrors it to an optional listener.
#[derive(Debug)]
pub struct RunRecorder {
    run_id: Uuid,
    logs: Vec<LogEntry>,
    live: Option<UnboundedSender<RunUpdate>>,
}

impl RunRecorder {
    pub fn new(run_id: Uuid, live: Option<UnboundedSender<RunUpdate>>) -> Self {
        Self {
            run_id,
            logs: Vec::new(),
            live,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn emit(&mut self, data: LogData) {
        if let Some(tx) = &self.live {
            if tx.send(RunUpdate::Log(data.clone())).is_err() {
                debug!(run_id = %self.run_id, "run listener went away; recording only");
                self.live = None;
            }
        }
        self.logs.push(LogEntry {
            timestamp: OffsetDateTime::now_utc(),
            data,
        });
    }

    pub fn logs(&self) -> &[LogEntry] {
        &self.logs
    }

    pub fn into_logs(self) -> Vec<LogEntry> {
        self.logs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::execution::EventKind;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn forwards_and_records_in_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut recorder = RunRecorder::new(Uuid::new_v4(), Some(tx));

        recorder.emit(LogData::new(EventKind::NodeStart, "a"));
        recorder.emit(LogData::new(EventKind::NodeComplete, "a").with_output("x"));

        assert_eq!(
            rx.recv().await,
            Some(RunUpdate::Log(LogData::new(EventKind::NodeStart, "a")))
        );
        assert!(matches!(rx.recv().await, Some(RunUpdate::Log(d)) if d.kind == EventKind::NodeComplete));

        let logs = recorder.into_logs();
        assert_eq!(logs.len(), 2);
        assert!(logs[0].timestamp <= logs[1].timestamp);
    }

    #[test]
    fn closed_listener_does_not_stop_recording() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let mut recorder = RunRecorder::new(Uuid::new_v4(), Some(tx));

        recorder.emit(LogData::new(EventKind::NodeStart, "a"));
        recorder.emit(LogData::new(EventKind::NodeError, "a").with_error("boom"));

        assert_eq!(recorder.logs().len(), 2);
    }
}
