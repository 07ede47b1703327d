use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use sentinel_advisor::{
    cycle::CycleOutcome, error::AdvisorError, recommendation::Recommendation,
};
use sentinel_data::{MarketAggregate, assembler::Progress};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

pub const DEFAULT_LOG_CAPACITY: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// One line of the dashboard's rolling log panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogLine {
    pub time: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

/// Bounded log, oldest lines evicted first.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    capacity: usize,
    lines: VecDeque<LogLine>,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            lines: VecDeque::with_capacity(capacity.max(1)),
        }
    }

    pub fn push(&mut self, line: LogLine) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    pub fn snapshot(&self) -> Vec<LogLine> {
        self.lines.iter().cloned().collect()
    }
}

/// Which stage of a cycle failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Acquisition,
    Ai,
    Notification,
}

/// Latest market data and the latest successful analysis.
///
/// The analysis may be older than the aggregate when the most recent reasoning step failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportMessage {
    pub aggregate: MarketAggregate,
    pub recommendation: Option<Recommendation>,
    /// `capturedAt` of the aggregate the recommendation was derived from.
    pub recommendation_captured_at: Option<i64>,
}

/// Server to client message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum DashboardMessage {
    Welcome {
        message: String,
        timestamp: DateTime<Utc>,
        auto_run: bool,
        refresh_minutes: u64,
        report: Option<ReportMessage>,
        logs: Vec<LogLine>,
    },
    Progress {
        #[serde(flatten)]
        progress: Progress,
        description: String,
    },
    Log(LogLine),
    Report(ReportMessage),
    Error {
        kind: ErrorKind,
        message: String,
        remediation: String,
    },
}

/// Client to server message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    RunNow,
    AutoRun { enabled: bool },
    SetRefresh { minutes: u64 },
}

#[derive(Debug)]
struct DashboardState {
    logs: LogBuffer,
    report: Option<ReportMessage>,
    auto_run: bool,
    refresh_minutes: u64,
}

/// Shared presentation state fed by the scheduler and read by every client connection.
#[derive(Debug)]
pub struct Dashboard {
    tx: broadcast::Sender<DashboardMessage>,
    state: Mutex<DashboardState>,
}

impl Dashboard {
    pub fn new(
        buffer_size: usize,
        log_capacity: usize,
        auto_run: bool,
        refresh_minutes: u64,
    ) -> Self {
        let (tx, _rx) = broadcast::channel(buffer_size.max(1));
        Self {
            tx,
            state: Mutex::new(DashboardState {
                logs: LogBuffer::new(log_capacity),
                report: None,
                auto_run,
                refresh_minutes,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DashboardMessage> {
        self.tx.subscribe()
    }

    /// Initial message for a newly connected client.
    pub fn welcome(&self) -> DashboardMessage {
        let state = self.state.lock();
        DashboardMessage::Welcome {
            message: "Connected to sentinel analysis feed".to_string(),
            timestamp: Utc::now(),
            auto_run: state.auto_run,
            refresh_minutes: state.refresh_minutes,
            report: state.report.clone(),
            logs: state.logs.snapshot(),
        }
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        let line = LogLine {
            time: Utc::now(),
            level,
            message: message.into(),
        };
        self.state.lock().logs.push(line.clone());
        self.broadcast(DashboardMessage::Log(line));
    }

    pub fn set_auto_run(&self, enabled: bool) {
        self.state.lock().auto_run = enabled;
        self.log(
            LogLevel::Info,
            format!("auto-run {}", if enabled { "enabled" } else { "disabled" }),
        );
    }

    pub fn set_refresh_minutes(&self, minutes: u64) {
        self.state.lock().refresh_minutes = minutes;
        self.log(LogLevel::Info, format!("refresh interval set to {minutes} min"));
    }

    pub fn progress(&self, progress: Progress) {
        let description = progress.stage.to_string();
        self.log(LogLevel::Info, format!("{description} ({}%)", progress.percent));
        self.broadcast(DashboardMessage::Progress {
            progress,
            description,
        });
    }

    /// Fold a finished cycle into the retained state and notify clients.
    ///
    /// Failures never clear the previously retained report.
    pub fn apply_outcome(&self, outcome: &CycleOutcome) {
        let report = match outcome {
            Ok(report) => report,
            Err(cycle_error) => {
                error!(error = %cycle_error, "cycle failed");
                self.log(LogLevel::Error, cycle_error.to_string());
                self.broadcast(DashboardMessage::Error {
                    kind: ErrorKind::Acquisition,
                    message: cycle_error.to_string(),
                    remediation: cycle_error.remediation().to_string(),
                });
                return;
            }
        };

        let message = {
            let mut state = self.state.lock();
            let (recommendation, recommendation_captured_at) = match &report.recommendation {
                Ok(recommendation) => (
                    Some(recommendation.clone()),
                    Some(report.aggregate.captured_at),
                ),
                Err(_) => state
                    .report
                    .as_ref()
                    .map(|previous| {
                        (
                            previous.recommendation.clone(),
                            previous.recommendation_captured_at,
                        )
                    })
                    .unwrap_or_default(),
            };

            let message = ReportMessage {
                aggregate: report.aggregate.clone(),
                recommendation,
                recommendation_captured_at,
            };
            state.report = Some(message.clone());
            message
        };

        info!(
            symbol = %message.aggregate.symbol,
            price = message.aggregate.latest_price(),
            "report published"
        );
        self.log(
            LogLevel::Info,
            format!(
                "{} snapshot captured at {:.2}",
                message.aggregate.symbol,
                message.aggregate.latest_price()
            ),
        );
        self.broadcast(DashboardMessage::Report(message));

        if let Err(advisor_error) = &report.recommendation {
            self.report_advisor_error(ErrorKind::Ai, advisor_error);
        }
        if let Some(Err(advisor_error)) = &report.notification {
            self.report_advisor_error(ErrorKind::Notification, advisor_error);
        }
    }

    fn report_advisor_error(&self, kind: ErrorKind, advisor_error: &AdvisorError) {
        warn!(?kind, error = %advisor_error, "cycle completed with downstream failure");
        self.log(LogLevel::Warn, advisor_error.to_string());
        self.broadcast(DashboardMessage::Error {
            kind,
            message: advisor_error.to_string(),
            remediation: advisor_error.remediation().to_string(),
        });
    }

    fn broadcast(&self, message: DashboardMessage) {
        // No connected clients is not an error
        let _ = self.tx.send(message);
    }
}
