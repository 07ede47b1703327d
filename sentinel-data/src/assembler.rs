//! Snapshot assembler.
//!
//! Orchestrates one acquisition cycle for a symbol: candles for every configured timeframe,
//! then the order book and the 24h ticker. Each sub-fetch is an independent
//! [`RelayFetcher`] call with its own attempt budget. The first failure aborts the cycle;
//! a [`MarketAggregate`] is only ever returned complete.

use crate::{
    error::DataError,
    exchange::bybit::{
        self, BybitEnvelope, book::normalise_order_book, kline::normalise_klines,
        ticker::normalise_ticker,
    },
    flow::FlowEstimate,
    model::{MarketAggregate, OrderBook, TickerSummary, Timeframe, TimeframeSnapshot},
    relay::{RelayConfig, RelayFetcher, Transport},
};
use chrono::Utc;
use futures::future::try_join_all;
use itertools::Itertools;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::{
    sync::atomic::{AtomicUsize, Ordering},
    time::{Duration, Instant},
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use url::Url;

pub const DEFAULT_SYMBOL: &str = "BTCUSDT";
pub const DEFAULT_CANDLE_LIMIT: usize = 100;
pub const DEFAULT_ORDER_BOOK_DEPTH: usize = 20;
pub const DEFAULT_PACING: Duration = Duration::from_millis(300);
pub const DEFAULT_PACING_JITTER: Duration = Duration::from_millis(200);

/// How sub-fetches within one cycle are sequenced.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionMode {
    /// One request at a time in configured order, paced to reduce rate limiting.
    #[default]
    Sequential,
    /// All requests concurrently, joined before assembly. No pacing.
    Parallel,
}

impl std::fmt::Display for AcquisitionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AcquisitionMode::Sequential => write!(f, "sequential"),
            AcquisitionMode::Parallel => write!(f, "parallel"),
        }
    }
}

/// Immutable per-cycle acquisition settings.
#[derive(Clone, Debug)]
pub struct AcquisitionConfig {
    pub symbol: String,
    /// Timeframes to acquire, in output order.
    pub timeframes: Vec<Timeframe>,
    pub candle_limit: usize,
    pub order_book_depth: usize,
    pub mode: AcquisitionMode,
    /// Delay between sequential requests.
    pub pacing: Duration,
    /// Upper bound of the random delay added to `pacing`.
    pub pacing_jitter: Duration,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            symbol: DEFAULT_SYMBOL.to_string(),
            timeframes: Timeframe::ALL.to_vec(),
            candle_limit: DEFAULT_CANDLE_LIMIT,
            order_book_depth: DEFAULT_ORDER_BOOK_DEPTH,
            mode: AcquisitionMode::default(),
            pacing: DEFAULT_PACING,
            pacing_jitter: DEFAULT_PACING_JITTER,
        }
    }
}

impl AcquisitionConfig {
    /// Create a new configuration for `symbol` with defaults otherwise.
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            ..Default::default()
        }
    }

    /// Set the timeframes to acquire.
    pub fn with_timeframes(mut self, timeframes: Vec<Timeframe>) -> Self {
        self.timeframes = timeframes;
        self
    }

    /// Set the sequencing mode.
    pub fn with_mode(mut self, mode: AcquisitionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the number of candles requested per timeframe.
    pub fn with_candle_limit(mut self, limit: usize) -> Self {
        self.candle_limit = limit;
        self
    }

    /// Set the number of order book levels requested per side.
    pub fn with_order_book_depth(mut self, depth: usize) -> Self {
        self.order_book_depth = depth;
        self
    }

    /// Set the inter-request delay and its jitter bound.
    pub fn with_pacing(mut self, pacing: Duration, jitter: Duration) -> Self {
        self.pacing = pacing;
        self.pacing_jitter = jitter;
        self
    }

    pub fn validate(&self) -> Result<(), DataError> {
        if self.symbol.trim().is_empty() {
            return Err(DataError::Config("symbol is empty".to_string()));
        }
        if self.timeframes.is_empty() {
            return Err(DataError::Config("no timeframes configured".to_string()));
        }
        if let Some(duplicate) = self.timeframes.iter().duplicates().next() {
            return Err(DataError::Config(format!("timeframe {duplicate} configured twice")));
        }
        if self.candle_limit == 0 {
            return Err(DataError::Config("candle limit must be positive".to_string()));
        }
        if self.order_book_depth == 0 {
            return Err(DataError::Config("order book depth must be positive".to_string()));
        }
        Ok(())
    }
}

/// Acquisition stage that just completed.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug, Deserialize, Serialize)]
#[serde(tag = "stage", content = "timeframe", rename_all = "snake_case")]
pub enum Stage {
    Candles(Timeframe),
    OrderBook,
    Ticker,
    Complete,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Candles(timeframe) => write!(f, "fetched {timeframe} candles and indicators"),
            Stage::OrderBook => write!(f, "fetched order book"),
            Stage::Ticker => write!(f, "fetched 24h ticker"),
            Stage::Complete => write!(f, "market aggregate assembled"),
        }
    }
}

/// Structured progress event emitted after each stage.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug, Deserialize, Serialize)]
pub struct Progress {
    #[serde(flatten)]
    pub stage: Stage,
    /// `0..=100`.
    pub percent: u8,
}

/// Channel on which callers observe [`Progress`].
pub type ProgressSender = mpsc::UnboundedSender<Progress>;

/// Builds complete [`MarketAggregate`]s. See the [module docs](self).
#[derive(Debug)]
pub struct SnapshotAssembler<T> {
    fetcher: RelayFetcher<T, BybitEnvelope>,
}

impl<T> SnapshotAssembler<T>
where
    T: Transport,
{
    pub fn new(fetcher: RelayFetcher<T, BybitEnvelope>) -> Self {
        Self { fetcher }
    }

    /// Construct an assembler targeting the Bybit public REST API.
    pub fn bybit(transport: T, relay_config: RelayConfig) -> Result<Self, DataError> {
        let base_url = Url::parse(bybit::BASE_URL)
            .map_err(|error| DataError::Config(format!("invalid upstream base URL: {error}")))?;

        Ok(Self::new(RelayFetcher::new(
            transport,
            BybitEnvelope,
            base_url,
            relay_config,
        )))
    }

    /// Run one acquisition cycle. Either every sub-fetch succeeds and a complete aggregate is
    /// returned, or the first failure is propagated.
    pub async fn acquire(
        &self,
        config: &AcquisitionConfig,
        progress: Option<&ProgressSender>,
    ) -> Result<MarketAggregate, DataError> {
        config.validate()?;

        let started = Instant::now();
        info!(symbol = %config.symbol, mode = %config.mode, timeframes = config.timeframes.len(), "acquisition started");

        let result = match config.mode {
            AcquisitionMode::Sequential => self.acquire_sequential(config, progress).await,
            AcquisitionMode::Parallel => self.acquire_parallel(config, progress).await,
        };

        let (snapshots, order_book, ticker) = match result {
            Ok(parts) => parts,
            Err(error) => {
                warn!(symbol = %config.symbol, %error, "acquisition aborted");
                return Err(error);
            }
        };

        let aggregate = MarketAggregate {
            symbol: config.symbol.clone(),
            snapshots,
            order_book,
            flow: FlowEstimate::from_ticker(ticker.volume_24h, ticker.price_change_percent),
            ticker,
            captured_at: Utc::now().timestamp_millis(),
        };

        report(progress, Stage::Complete, 100);
        info!(
            symbol = %config.symbol,
            price = aggregate.latest_price(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "acquisition complete"
        );

        Ok(aggregate)
    }

    async fn acquire_sequential(
        &self,
        config: &AcquisitionConfig,
        progress: Option<&ProgressSender>,
    ) -> Result<(Vec<TimeframeSnapshot>, OrderBook, TickerSummary), DataError> {
        let total = stage_count(config);
        let mut completed = 0;
        let mut snapshots = Vec::with_capacity(config.timeframes.len());

        for (index, &timeframe) in config.timeframes.iter().enumerate() {
            if index > 0 {
                pace(config).await;
            }
            snapshots.push(self.fetch_snapshot(config, timeframe).await?);
            completed += 1;
            report(progress, Stage::Candles(timeframe), percent(completed, total));
        }

        pace(config).await;
        let order_book = self.fetch_order_book(config).await?;
        completed += 1;
        report(progress, Stage::OrderBook, percent(completed, total));

        pace(config).await;
        let ticker = self.fetch_ticker(config).await?;
        completed += 1;
        report(progress, Stage::Ticker, percent(completed, total));

        Ok((snapshots, order_book, ticker))
    }

    async fn acquire_parallel(
        &self,
        config: &AcquisitionConfig,
        progress: Option<&ProgressSender>,
    ) -> Result<(Vec<TimeframeSnapshot>, OrderBook, TickerSummary), DataError> {
        let total = stage_count(config);
        let completed = AtomicUsize::new(0);
        let tick = |stage: Stage| {
            let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
            report(progress, stage, percent(done, total));
        };
        let tick = &tick;

        let snapshots = try_join_all(config.timeframes.iter().map(|&timeframe| async move {
            let snapshot = self.fetch_snapshot(config, timeframe).await?;
            tick(Stage::Candles(timeframe));
            Ok::<_, DataError>(snapshot)
        }));

        let order_book = async {
            let order_book = self.fetch_order_book(config).await?;
            tick(Stage::OrderBook);
            Ok::<_, DataError>(order_book)
        };

        let ticker = async {
            let ticker = self.fetch_ticker(config).await?;
            tick(Stage::Ticker);
            Ok::<_, DataError>(ticker)
        };

        tokio::try_join!(snapshots, order_book, ticker)
    }

    async fn fetch_snapshot(
        &self,
        config: &AcquisitionConfig,
        timeframe: Timeframe,
    ) -> Result<TimeframeSnapshot, DataError> {
        let path = bybit::kline_path(&config.symbol, timeframe, config.candle_limit);
        let result = self.fetcher.fetch_default(&path).await?;
        let candles = normalise_klines(result)?;
        debug!(symbol = %config.symbol, %timeframe, candles = candles.len(), "candles normalised");
        TimeframeSnapshot::from_candles(timeframe, candles)
    }

    async fn fetch_order_book(&self, config: &AcquisitionConfig) -> Result<OrderBook, DataError> {
        let path = bybit::order_book_path(&config.symbol, config.order_book_depth);
        let result = self.fetcher.fetch_default(&path).await?;
        normalise_order_book(result)
    }

    async fn fetch_ticker(&self, config: &AcquisitionConfig) -> Result<TickerSummary, DataError> {
        let path = bybit::ticker_path(&config.symbol);
        let result = self.fetcher.fetch_default(&path).await?;
        normalise_ticker(result, &config.symbol)
    }
}

fn stage_count(config: &AcquisitionConfig) -> usize {
    config.timeframes.len() + 2
}

fn percent(completed: usize, total: usize) -> u8 {
    // Complete is reserved for the assembled aggregate
    ((completed * 99) / total.max(1)).min(99) as u8
}

fn report(progress: Option<&ProgressSender>, stage: Stage, percent: u8) {
    debug!(%stage, percent, "acquisition progress");
    if let Some(progress) = progress {
        let _ = progress.send(Progress { stage, percent });
    }
}

async fn pace(config: &AcquisitionConfig) {
    let jitter_ms = config.pacing_jitter.as_millis() as u64;
    let jitter = if jitter_ms == 0 {
        Duration::ZERO
    } else {
        Duration::from_millis(rand::rng().random_range(0..=jitter_ms))
    };

    let delay = config.pacing + jitter;
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}
