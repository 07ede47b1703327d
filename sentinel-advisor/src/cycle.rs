//! One end-to-end analysis cycle: acquire, reason, notify.
//!
//! Only acquisition failure fails the cycle. Reasoning and notification failures are carried
//! in the [`CycleReport`] next to the already-acquired [`MarketAggregate`].

use crate::{
    engine::ReasoningEngine,
    error::AdvisorError,
    notify::{Notify, format_message},
    recommendation::Recommendation,
};
use sentinel_data::{
    MarketAggregate,
    assembler::{AcquisitionConfig, ProgressSender, SnapshotAssembler},
    error::DataError,
    relay::Transport,
};
use std::time::Instant;
use thiserror::Error;
use tracing::{info, warn};

/// Failure that prevented a [`MarketAggregate`] from being produced.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum CycleError {
    #[error("data acquisition failed: {0}")]
    Acquisition(#[from] DataError),
}

impl CycleError {
    pub fn remediation(&self) -> &str {
        match self {
            CycleError::Acquisition(error) => error.remediation(),
        }
    }
}

/// Result of a cycle whose data acquisition succeeded.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub aggregate: MarketAggregate,
    pub recommendation: Result<Recommendation, AdvisorError>,
    /// `None` when no notifier is configured or there was nothing to send.
    pub notification: Option<Result<(), AdvisorError>>,
}

/// Published by the [`Scheduler`](crate::scheduler::Scheduler) after every cycle.
pub type CycleOutcome = Result<CycleReport, CycleError>;

pub struct AnalysisCycle<T> {
    assembler: SnapshotAssembler<T>,
    engine: Box<dyn ReasoningEngine>,
    notifier: Option<Box<dyn Notify>>,
}

impl<T> std::fmt::Debug for AnalysisCycle<T>
where
    T: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisCycle")
            .field("assembler", &self.assembler)
            .field("engine", &self.engine.name())
            .field("notifier", &self.notifier.is_some())
            .finish()
    }
}

impl<T> AnalysisCycle<T>
where
    T: Transport,
{
    pub fn new(
        assembler: SnapshotAssembler<T>,
        engine: Box<dyn ReasoningEngine>,
        notifier: Option<Box<dyn Notify>>,
    ) -> Self {
        Self {
            assembler,
            engine,
            notifier,
        }
    }

    pub async fn run(
        &self,
        config: &AcquisitionConfig,
        progress: Option<&ProgressSender>,
    ) -> Result<CycleReport, CycleError> {
        let started = Instant::now();

        let aggregate = self.assembler.acquire(config, progress).await?;

        let recommendation = self.engine.analyze(&aggregate).await;
        match &recommendation {
            Ok(recommendation) => info!(
                symbol = %aggregate.symbol,
                engine = self.engine.name(),
                sentiment = %recommendation.sentiment,
                action = %recommendation.strategy.action,
                "analysis complete"
            ),
            Err(error) => warn!(
                symbol = %aggregate.symbol,
                engine = self.engine.name(),
                %error,
                "analysis failed, market data retained"
            ),
        }

        let notification = match (&recommendation, &self.notifier) {
            (Ok(recommendation), Some(notifier)) => {
                let message =
                    format_message(&aggregate.symbol, aggregate.latest_price(), recommendation);
                let result = notifier.notify(&message).await;
                if let Err(error) = &result {
                    warn!(symbol = %aggregate.symbol, %error, "notification failed");
                }
                Some(result)
            }
            _ => None,
        };

        info!(
            symbol = %aggregate.symbol,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "cycle complete"
        );

        Ok(CycleReport {
            aggregate,
            recommendation,
            notification,
        })
    }
}
