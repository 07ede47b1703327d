//! Fixed-interval cycle scheduler.
//!
//! Runs at most one cycle at a time. A [`SchedulerCommand::RunNow`] or timer tick arriving
//! while a cycle is in flight is coalesced into it. Turning auto-run off drops the timer, so
//! no tick can fire afterwards. Outcomes are published on a broadcast channel.

use crate::error::AdvisorError;
use std::{future::Future, time::Duration};
use tokio::{
    sync::{broadcast, mpsc},
    task::{JoinError, JoinHandle},
    time::{Instant, Interval, MissedTickBehavior},
};
use tracing::{debug, error, info};

pub const DEFAULT_OUTCOME_BUFFER: usize = 16;

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum SchedulerCommand {
    RunNow,
    SetAutoRun(bool),
    SetInterval(Duration),
    Shutdown,
}

/// What started a cycle.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
enum Trigger {
    Manual,
    Timer,
}

/// Control surface of a spawned [`Scheduler`].
#[derive(Debug)]
pub struct SchedulerHandle<O> {
    commands: mpsc::UnboundedSender<SchedulerCommand>,
    outcomes: broadcast::Sender<O>,
    task: JoinHandle<()>,
}

impl<O> SchedulerHandle<O> {
    pub fn run_now(&self) -> Result<(), AdvisorError> {
        self.send(SchedulerCommand::RunNow)
    }

    pub fn set_auto_run(&self, enabled: bool) -> Result<(), AdvisorError> {
        self.send(SchedulerCommand::SetAutoRun(enabled))
    }

    pub fn set_interval(&self, interval: Duration) -> Result<(), AdvisorError> {
        self.send(SchedulerCommand::SetInterval(interval))
    }

    /// Cloneable sender for forwarding commands from other tasks.
    pub fn commands(&self) -> mpsc::UnboundedSender<SchedulerCommand> {
        self.commands.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<O> {
        self.outcomes.subscribe()
    }

    /// Stop the scheduler, waiting for any in-flight cycle to finish and publish.
    pub async fn shutdown(self) -> Result<(), AdvisorError> {
        // Loop may already have exited
        let _ = self.commands.send(SchedulerCommand::Shutdown);
        self.task
            .await
            .map_err(|error| AdvisorError::Scheduler(format!("task failed: {error}")))
    }

    fn send(&self, command: SchedulerCommand) -> Result<(), AdvisorError> {
        self.commands
            .send(command)
            .map_err(|_| AdvisorError::Scheduler("not running".to_string()))
    }
}

/// See the [module docs](self).
#[derive(Debug)]
pub struct Scheduler;

impl Scheduler {
    /// Spawn the scheduler loop. `cycle` produces one cycle future per run.
    ///
    /// When `auto_run` is set the first timed cycle fires one `interval` after spawning.
    pub fn spawn<F, Fut, O>(cycle: F, interval: Duration, auto_run: bool) -> SchedulerHandle<O>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = O> + Send + 'static,
        O: Clone + Send + 'static,
    {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (outcomes_tx, _) = broadcast::channel(DEFAULT_OUTCOME_BUFFER);

        let task = tokio::spawn(run(
            cycle,
            commands_rx,
            outcomes_tx.clone(),
            interval,
            auto_run,
        ));

        SchedulerHandle {
            commands: commands_tx,
            outcomes: outcomes_tx,
            task,
        }
    }
}

async fn run<F, Fut, O>(
    cycle: F,
    mut commands: mpsc::UnboundedReceiver<SchedulerCommand>,
    outcomes: broadcast::Sender<O>,
    mut period: Duration,
    auto_run: bool,
) where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = O> + Send + 'static,
    O: Clone + Send + 'static,
{
    let mut timer = auto_run.then(|| new_timer(period));
    let mut in_flight: Option<JoinHandle<O>> = None;

    info!(interval_secs = period.as_secs(), auto_run, "scheduler started");

    loop {
        let trigger = tokio::select! {
            command = commands.recv() => match command {
                None | Some(SchedulerCommand::Shutdown) => break,
                Some(SchedulerCommand::RunNow) => Trigger::Manual,
                Some(SchedulerCommand::SetAutoRun(enabled)) => {
                    timer = enabled.then(|| new_timer(period));
                    info!(enabled, "auto-run updated");
                    continue;
                }
                Some(SchedulerCommand::SetInterval(interval)) => {
                    period = interval.max(Duration::from_secs(1));
                    if timer.is_some() {
                        timer = Some(new_timer(period));
                    }
                    info!(interval_secs = period.as_secs(), "interval updated");
                    continue;
                }
            },
            _ = tick(&mut timer) => Trigger::Timer,
            result = join(&mut in_flight) => {
                in_flight = None;
                publish(&outcomes, result);
                continue;
            }
        };

        if in_flight.is_some() {
            debug!(?trigger, "cycle already in flight, trigger coalesced");
            continue;
        }

        info!(?trigger, "cycle starting");
        in_flight = Some(tokio::spawn(cycle()));
    }

    if let Some(task) = in_flight {
        info!("waiting for in-flight cycle before shutdown");
        publish(&outcomes, task.await);
    }

    info!("scheduler stopped");
}

fn new_timer(period: Duration) -> Interval {
    let mut timer = tokio::time::interval_at(Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
    timer
}

async fn tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn join<O>(task: &mut Option<JoinHandle<O>>) -> Result<O, JoinError> {
    match task {
        Some(task) => task.await,
        None => std::future::pending().await,
    }
}

fn publish<O>(outcomes: &broadcast::Sender<O>, result: Result<O, JoinError>) {
    match result {
        // No subscribers is not an error
        Ok(outcome) => {
            let _ = outcomes.send(outcome);
        }
        Err(error) => error!(%error, "cycle task panicked or was cancelled"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    const CYCLE_DURATION: Duration = Duration::from_secs(5);

    /// Cycle that takes [`CYCLE_DURATION`] and returns its 1-based run number.
    fn counting_cycle(
        started: Arc<AtomicUsize>,
    ) -> impl Fn() -> std::pin::Pin<Box<dyn Future<Output = usize> + Send>> + Send + Sync + 'static
    {
        move || {
            let started = started.clone();
            Box::pin(async move {
                let run = started.fetch_add(1, Ordering::SeqCst) + 1;
                tokio::time::sleep(CYCLE_DURATION).await;
                run
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_now_is_coalesced_while_in_flight() {
        let started = Arc::new(AtomicUsize::new(0));
        let handle = Scheduler::spawn(counting_cycle(started.clone()), Duration::from_secs(60), false);
        let mut outcomes = handle.subscribe();

        handle.run_now().unwrap();
        handle.run_now().unwrap();
        handle.run_now().unwrap();

        assert_eq!(outcomes.recv().await.unwrap(), 1);
        tokio::time::sleep(CYCLE_DURATION * 4).await;
        assert_eq!(started.load(Ordering::SeqCst), 1);

        // Once idle, the next request runs again
        handle.run_now().unwrap();
        assert_eq!(outcomes.recv().await.unwrap(), 2);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_run_ticks_and_stops_cleanly() {
        let started = Arc::new(AtomicUsize::new(0));
        let handle = Scheduler::spawn(counting_cycle(started.clone()), Duration::from_secs(60), true);
        let mut outcomes = handle.subscribe();

        // Ticks at 60s, 120s and 180s
        tokio::time::sleep(Duration::from_secs(190)).await;
        assert_eq!(started.load(Ordering::SeqCst), 3);
        for expected in 1..=3 {
            assert_eq!(outcomes.recv().await.unwrap(), expected);
        }

        handle.set_auto_run(false).unwrap();
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(started.load(Ordering::SeqCst), 3);

        // Re-enabling restarts the timer from now
        handle.set_auto_run(true).unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(started.load(Ordering::SeqCst), 3);
        tokio::time::sleep(Duration::from_secs(40)).await;
        assert_eq!(started.load(Ordering::SeqCst), 4);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_interval_reschedules_timer() {
        let started = Arc::new(AtomicUsize::new(0));
        let handle = Scheduler::spawn(counting_cycle(started.clone()), Duration::from_secs(600), true);

        handle.set_interval(Duration::from_secs(20)).unwrap();
        tokio::time::sleep(Duration::from_secs(50)).await;

        // Ticks at 20s and 40s instead of 600s
        assert_eq!(started.load(Ordering::SeqCst), 2);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_waits_for_in_flight_cycle() {
        let started = Arc::new(AtomicUsize::new(0));
        let handle = Scheduler::spawn(counting_cycle(started.clone()), Duration::from_secs(60), false);
        let mut outcomes = handle.subscribe();

        handle.run_now().unwrap();
        // Let the loop pick up the command and spawn the cycle
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(started.load(Ordering::SeqCst), 1);

        let before = Instant::now();
        handle.shutdown().await.unwrap();

        assert!(before.elapsed() >= CYCLE_DURATION - Duration::from_millis(10));
        assert_eq!(outcomes.recv().await.unwrap(), 1);
    }
}
