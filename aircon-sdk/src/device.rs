//! Cache/poll orchestrator for one unit
//!
//! [`AirconDevice`] owns the canonical [`DeviceState`], keeps it fresh with a
//! background poll, and turns desired states into minimal commands on the
//! [`CommandQueue`].

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use aircon_protocol::{AirconClient, Transport};
use aircon_state::{DeviceState, StateSnapshot};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::DeviceConfig;
use crate::error::{Result, SdkError};
use crate::queue::CommandQueue;

/// Poll bookkeeping as seen from outside
#[derive(Debug, Clone, PartialEq)]
pub struct PollHealth {
    pub consecutive_failures: u32,
    /// Interval until the next background poll
    pub interval: Duration,
    pub degraded: bool,
    pub last_success: Option<Instant>,
}

#[derive(Debug)]
struct PollBook {
    last_success: Option<Instant>,
    consecutive_failures: u32,
    interval: Duration,
    /// Bumped by every completed round trip
    generation: u64,
    last_error: Option<String>,
}

#[derive(Debug, Default)]
struct Tasks {
    poll: Option<JoinHandle<()>>,
    quick_refresh: Option<JoinHandle<()>>,
}

struct Inner {
    config: DeviceConfig,
    client: Arc<AirconClient>,
    state: DeviceState,
    queue: CommandQueue,
    book: Mutex<PollBook>,
    /// Held for the duration of a round trip
    poll_guard: tokio::sync::Mutex<()>,
    reschedule: Arc<Notify>,
    tasks: Mutex<Tasks>,
    closed: AtomicBool,
}

/// One managed air-conditioning unit.
///
/// Reads are served from the cached [`DeviceState`] while it is younger than
/// the poll interval. Writes go through [`apply_state_to_device`], which
/// diffs a desired state against a fresh read and sends only what changed.
///
/// Must be created inside a tokio runtime. Call [`cleanup`] when done;
/// dropping the device also stops its background tasks.
///
/// # Example
///
/// ```rust,no_run
/// use aircon_sdk::{AirconDevice, DeviceConfig, PowerState, FanSpeed};
///
/// # async fn run() -> aircon_sdk::Result<()> {
/// let device = AirconDevice::new(DeviceConfig::new([192, 168, 1, 40].into()))?;
///
/// let status = device.get_status().await;
/// println!("Room: {:.1}°C", status.current_temperature);
///
/// let desired = device.device_state().clone();
/// desired.set_power(PowerState::On);
/// desired.set_fan_speed(FanSpeed::Low);
/// device.apply_state_to_device(&desired).await?;
///
/// device.cleanup().await;
/// # Ok(())
/// # }
/// ```
///
/// [`apply_state_to_device`]: Self::apply_state_to_device
/// [`cleanup`]: Self::cleanup
pub struct AirconDevice {
    inner: Arc<Inner>,
}

impl AirconDevice {
    /// Manage the unit at `config.address()` over UDP
    pub fn new(config: DeviceConfig) -> Result<Self> {
        config.validate()?;
        let client = Arc::new(AirconClient::new(config.address(), config.client.clone()));
        Ok(Self::with_client(config, client))
    }

    /// Manage a unit reached through a custom transport
    pub fn with_transport(config: DeviceConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;
        let client = Arc::new(AirconClient::with_transport(transport, config.client.clone()));
        Ok(Self::with_client(config, client))
    }

    fn with_client(config: DeviceConfig, client: Arc<AirconClient>) -> Self {
        let queue = CommandQueue::new(client.clone(), config.queue.clone());
        let inner = Arc::new(Inner {
            state: DeviceState::with_config(config.state.clone()),
            book: Mutex::new(PollBook {
                last_success: None,
                consecutive_failures: 0,
                interval: config.poll_interval,
                generation: 0,
                last_error: None,
            }),
            poll_guard: tokio::sync::Mutex::new(()),
            reschedule: Arc::new(Notify::new()),
            tasks: Mutex::new(Tasks::default()),
            closed: AtomicBool::new(false),
            config,
            client,
            queue,
        });

        let poll = tokio::spawn(poll_loop(Arc::downgrade(&inner), Arc::clone(&inner.reschedule)));
        inner.tasks.lock().poll = Some(poll);

        tracing::info!(
            "Managing unit at {} (poll every {:?})",
            inner.config.address(),
            inner.config.poll_interval
        );
        Self { inner }
    }

    pub fn address(&self) -> SocketAddr {
        self.inner.config.address()
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.inner.config
    }

    /// The canonical state. Clone it to build a desired state.
    pub fn device_state(&self) -> &DeviceState {
        &self.inner.state
    }

    pub fn command_queue(&self) -> &CommandQueue {
        &self.inner.queue
    }

    pub fn client(&self) -> &AirconClient {
        &self.inner.client
    }

    pub fn poll_health(&self) -> PollHealth {
        let book = self.inner.book.lock();
        PollHealth {
            consecutive_failures: book.consecutive_failures,
            interval: book.interval,
            degraded: book.interval != self.inner.config.poll_interval,
            last_success: book.last_success,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Current state, refreshed first if the cache has expired
    pub async fn get_status(&self) -> StateSnapshot {
        self.update_device_state(false).await
    }

    /// Refresh the cached state if it has expired, or unconditionally with
    /// `force`, and return it.
    ///
    /// A failed refresh is logged and counted towards degraded polling; the
    /// last known state is returned regardless.
    pub async fn update_device_state(&self, force: bool) -> StateSnapshot {
        let inner = &self.inner;
        if inner.is_closed() {
            return inner.state.snapshot();
        }

        if force || !inner.is_fresh() {
            let outcome = inner.poll(force).await;
            inner.reschedule.notify_one();
            if let Err(e) = outcome {
                tracing::debug!("Returning last known state after failed refresh: {}", e);
            }
        } else {
            tracing::debug!("Cached state of {} is fresh", self.address());
        }

        inner.state.snapshot()
    }

    /// Make the unit match `desired`.
    ///
    /// Reads the unit first, then sends one command with every field that
    /// differs. A delta that switches the unit off is sent as power-off alone.
    /// The change is applied to the canonical state as soon as it is queued,
    /// and a confirmation poll follows shortly after the unit accepts it.
    ///
    /// Returns the originating error if the read or the command fails. The
    /// optimistic update is not rolled back; the next successful poll
    /// corrects it.
    pub async fn apply_state_to_device(&self, desired: &DeviceState) -> Result<()> {
        let inner = &self.inner;
        if inner.is_closed() {
            return Err(SdkError::DeviceClosed(self.address()));
        }

        inner.poll(true).await?;
        inner.reschedule.notify_one();

        let mut delta = inner.state.diff(desired);
        if delta.is_empty() {
            tracing::debug!("Unit {} already matches the desired state", self.address());
            return Ok(());
        }
        if delta.turns_off() {
            delta = delta.power_only();
        }

        let ticket = inner.queue.enqueue_command(delta.to_device_options())?;
        inner.state.update_from_options(&delta);
        tracing::debug!("Queued command {} for {}: {:?}", ticket.id(), self.address(), delta);

        ticket.wait().await?;
        self.schedule_quick_refresh();
        Ok(())
    }

    /// Stop polling, discard queued commands and release the socket.
    /// Idempotent.
    pub async fn cleanup(&self) {
        let inner = &self.inner;
        if inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        inner.abort_tasks();
        inner.queue.shutdown();
        inner.client.cleanup().await;
        tracing::info!("Stopped managing unit at {}", self.address());
    }

    fn schedule_quick_refresh(&self) {
        let device = Arc::downgrade(&self.inner);
        let delay = self.inner.config.quick_refresh_delay;

        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = device.upgrade() else {
                return;
            };
            if inner.is_closed() {
                return;
            }
            if inner.poll(true).await.is_ok() {
                inner.reschedule.notify_one();
            }
        });

        if let Some(previous) = self.inner.tasks.lock().quick_refresh.replace(task) {
            previous.abort();
        }
    }
}

impl std::fmt::Debug for AirconDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AirconDevice")
            .field("address", &self.address())
            .field("health", &self.poll_health())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Inner {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn is_fresh(&self) -> bool {
        self.book
            .lock()
            .last_success
            .is_some_and(|at| at.elapsed() < self.config.poll_interval)
    }

    fn current_interval(&self) -> Duration {
        self.book.lock().interval
    }

    /// One status round trip, shared with any caller already waiting on one.
    async fn poll(&self, force: bool) -> Result<()> {
        let observed = self.book.lock().generation;
        let _guard = self.poll_guard.lock().await;

        {
            let book = self.book.lock();
            if book.generation != observed {
                return match &book.last_error {
                    None => Ok(()),
                    Some(error) => Err(SdkError::RefreshFailed(error.clone())),
                };
            }
        }

        let result = self.client.update_state(force).await;

        let mut book = self.book.lock();
        book.generation += 1;
        match result {
            Ok(raw) => {
                self.state.update_from_device(&raw);
                if book.consecutive_failures >= self.config.failure_threshold {
                    tracing::info!(
                        "Unit {} reachable again, polling every {:?}",
                        self.config.address(),
                        self.config.poll_interval
                    );
                }
                book.last_success = Some(Instant::now());
                book.last_error = None;
                book.consecutive_failures = 0;
                book.interval = self.config.poll_interval;
                Ok(())
            }
            Err(error) => {
                book.consecutive_failures += 1;
                book.last_error = Some(error.to_string());
                tracing::warn!(
                    "Poll of {} failed ({} in a row): {}",
                    self.config.address(),
                    book.consecutive_failures,
                    error
                );
                if book.consecutive_failures == self.config.failure_threshold {
                    tracing::warn!(
                        "Slowing polling of {} to every {:?}",
                        self.config.address(),
                        self.config.degraded_interval()
                    );
                }
                if book.consecutive_failures >= self.config.failure_threshold {
                    book.interval = self.config.degraded_interval();
                }
                Err(error.into())
            }
        }
    }

    fn abort_tasks(&self) {
        let mut tasks = self.tasks.lock();
        for task in [tasks.poll.take(), tasks.quick_refresh.take()].into_iter().flatten() {
            task.abort();
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.abort_tasks();
    }
}

/// Background poll: once at start, then every current interval. A
/// foreground refresh restarts the timer.
async fn poll_loop(device: Weak<Inner>, reschedule: Arc<Notify>) {
    let mut delay = Duration::ZERO;
    loop {
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = reschedule.notified() => {
                match device.upgrade() {
                    Some(inner) => delay = inner.current_interval(),
                    None => return,
                }
                continue;
            }
        }

        let Some(inner) = device.upgrade() else {
            return;
        };
        if inner.is_closed() {
            return;
        }
        // Failures are counted and logged inside
        let _ = inner.poll(true).await;
        delay = inner.current_interval();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aircon_protocol::testing::FakeUnit;
    use aircon_protocol::{
        ClientConfig, ClientError, DeviceOptions, FanSpeed, OperationMode, RawDeviceStatus,
    };
    use aircon_state::{PowerState, SwingMode};

    fn unit() -> Arc<FakeUnit> {
        FakeUnit::new(RawDeviceStatus {
            power: true,
            mode: OperationMode::Cool,
            set_temp_f: 72.0,
            current_temp_f: 80.0,
            fan_speed: FanSpeed::Low,
            swing_horizontal: Some(false),
            swing_vertical: Some(false),
            ..Default::default()
        })
    }

    fn config() -> DeviceConfig {
        DeviceConfig {
            client: ClientConfig::fail_fast(),
            ..DeviceConfig::new([127, 0, 0, 1].into())
        }
    }

    fn device(unit: &Arc<FakeUnit>, config: DeviceConfig) -> AirconDevice {
        AirconDevice::with_transport(config, unit.clone()).unwrap()
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_poll_populates_state() {
        let unit = unit();
        let device = device(&unit, config());
        settle().await;

        let state = device.device_state().snapshot();
        assert_eq!(state.power, PowerState::On);
        assert_eq!(state.target_temperature, 22.0);
        assert_eq!(state.current_temperature, 26.7);
        assert!(device.poll_health().last_success.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_state_is_served_from_cache() {
        let unit = unit();
        let device = device(&unit, config());
        settle().await;
        let before = unit.status_query_count();

        device.get_status().await;
        device.get_status().await;
        assert_eq!(unit.status_query_count(), before);

        device.update_device_state(true).await;
        assert_eq!(unit.status_query_count(), before + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_refreshes_share_one_round_trip() {
        let unit = unit();
        let device = device(&unit, config());
        settle().await;
        unit.set_latency(Duration::from_millis(100));
        let before = unit.status_query_count();

        let (a, b, c) = tokio::join!(
            device.update_device_state(true),
            device.update_device_state(true),
            device.update_device_state(true)
        );

        assert_eq!(unit.status_query_count(), before + 1);
        assert_eq!(a, b);
        assert_eq!(b, c);
    }

    #[tokio::test(start_paused = true)]
    async fn test_noop_apply_enqueues_nothing() {
        let unit = unit();
        let device = device(&unit, config());
        settle().await;

        let desired = device.device_state().clone();
        device.apply_state_to_device(&desired).await.unwrap();

        assert!(unit.set_messages().is_empty());
        assert!(device.command_queue().is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn test_apply_sends_minimal_delta_and_confirms() {
        let unit = unit();
        let device = device(&unit, config());
        settle().await;
        let mut changes = device.device_state().subscribe();

        let desired = device.device_state().clone();
        desired.set_fan_speed(FanSpeed::High);
        desired.set_swing(SwingMode::Both);
        device.apply_state_to_device(&desired).await.unwrap();

        assert_eq!(
            unit.set_messages(),
            vec![DeviceOptions::new()
                .with_fan_speed(FanSpeed::High)
                .with_swing(true, true)]
        );
        assert_eq!(device.device_state().fan_speed(), FanSpeed::High);
        assert!(changes.try_recv().is_ok());

        let before = unit.status_query_count();
        tokio::time::sleep(Duration::from_millis(2100)).await;
        assert_eq!(unit.status_query_count(), before + 1);
        assert_eq!(device.device_state().swing(), SwingMode::Both);
    }

    #[tokio::test(start_paused = true)]
    async fn test_power_off_sends_power_alone() {
        let unit = unit();
        let device = device(&unit, config());
        settle().await;

        let desired = device.device_state().clone();
        desired.set_power(PowerState::Off);
        desired.set_fan_speed(FanSpeed::Turbo);
        device.apply_state_to_device(&desired).await.unwrap();

        // The client folds the last mode and target into the power-off
        assert_eq!(
            unit.set_messages(),
            vec![DeviceOptions::new()
                .with_power(false)
                .with_mode(OperationMode::Cool)
                .with_target_temp_f(72.0)]
        );
        assert_eq!(device.device_state().power(), PowerState::Off);
        assert_eq!(device.device_state().fan_speed(), FanSpeed::Low);
    }

    #[tokio::test(start_paused = true)]
    async fn test_apply_propagates_failed_read() {
        let unit = unit();
        let device = device(&unit, config());
        settle().await;
        unit.set_failing(true);

        let desired = device.device_state().clone();
        desired.set_eco(true);
        let result = device.apply_state_to_device(&desired).await;

        assert!(matches!(result, Err(SdkError::Client(ClientError::Transport(_)))));
        assert!(unit.set_messages().is_empty());
        assert!(!device.device_state().snapshot().eco);
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_degrades_and_recovers() {
        let unit = unit();
        unit.set_failing(true);
        let device = device(&unit, config().with_poll_interval(Duration::from_millis(1000)));

        // Failures at 0 s, 1 s and 2 s
        tokio::time::sleep(Duration::from_millis(2500)).await;
        let health = device.poll_health();
        assert_eq!(health.consecutive_failures, 3);
        assert_eq!(health.interval, Duration::from_secs(3));
        assert!(health.degraded);
        assert_eq!(unit.exchange_count(), 3);

        // Degraded: nothing until 5 s
        tokio::time::sleep(Duration::from_millis(500)).await;
        unit.set_failing(false);
        tokio::time::sleep(Duration::from_millis(1900)).await;
        assert_eq!(unit.exchange_count(), 3);

        tokio::time::sleep(Duration::from_millis(200)).await;
        let health = device.poll_health();
        assert_eq!(unit.exchange_count(), 4);
        assert_eq!(health.consecutive_failures, 0);
        assert_eq!(health.interval, Duration::from_secs(1));
        assert!(!health.degraded);

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(unit.exchange_count(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_returns_last_known_state() {
        let unit = unit();
        let device = device(&unit, config());
        settle().await;
        unit.set_failing(true);

        let state = device.update_device_state(true).await;
        assert_eq!(state.power, PowerState::On);
        assert_eq!(device.poll_health().consecutive_failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_is_idempotent_and_stops_everything() {
        let unit = unit();
        let device = device(&unit, config().with_poll_interval(Duration::from_secs(1)));
        settle().await;

        device.cleanup().await;
        device.cleanup().await;
        let before = unit.exchange_count();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(unit.exchange_count(), before);
        assert!(device.client().is_closed());
        assert!(device.command_queue().is_closed());

        let desired = device.device_state().clone();
        desired.set_eco(true);
        assert!(matches!(
            device.apply_state_to_device(&desired).await,
            Err(SdkError::DeviceClosed(_))
        ));
        device.get_status().await;
        assert_eq!(unit.exchange_count(), before);
    }
}
