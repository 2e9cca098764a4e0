//! Protocol client for a single unit

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::codec;
use crate::config::ClientConfig;
use crate::error::{ClientError, ProtocolError, Result};
use crate::transport::{Transport, UdpTransport};
use crate::types::{DeviceOptions, FanSpeed, OperationMode, RawDeviceStatus};

/// Notifications published by the client
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// Fresh status from the unit, or the cached status after an optimistic merge
    Status(RawDeviceStatus),
    /// An operation failed after exhausting its retries
    Error(String),
}

/// Session counters used for throttling and sequencing
#[derive(Debug)]
struct Session {
    next_seq: u64,
    /// Sequence number of the last command the unit acknowledged; 0 until then
    last_seq: u64,
    last_status_at: Option<Instant>,
    last_status: Option<RawDeviceStatus>,
}

/// Client for one air-conditioning unit.
///
/// All traffic goes through the configured [`Transport`]. Status queries are
/// throttled, every send is retried on transport failures, and successful
/// commands are merged into the cached status so that fast reads reflect
/// intent before the next poll confirms it.
///
/// # Example
///
/// ```rust,no_run
/// use aircon_protocol::{AirconClient, ClientConfig, DEFAULT_PORT};
///
/// # async fn run() -> aircon_protocol::Result<()> {
/// let client = AirconClient::new(([192, 168, 1, 40], DEFAULT_PORT).into(), ClientConfig::default());
/// let status = client.update_state(false).await?;
/// println!("Room is {}°F", status.current_temp_f);
///
/// client.set_power(true).await?;
/// client.cleanup().await;
/// # Ok(())
/// # }
/// ```
pub struct AirconClient {
    transport: Arc<dyn Transport>,
    config: ClientConfig,
    session: Mutex<Session>,
    events: Mutex<Option<broadcast::Sender<ClientEvent>>>,
    closed: AtomicBool,
}

impl AirconClient {
    /// Create a client talking UDP to `device`
    pub fn new(device: SocketAddr, config: ClientConfig) -> Self {
        let transport = Arc::new(UdpTransport::new(device, config.response_timeout));
        Self::with_transport(transport, config)
    }

    /// Create a client over a custom transport
    pub fn with_transport(transport: Arc<dyn Transport>, config: ClientConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_buffer_size.max(1));
        // Seeding from the clock keeps sequence numbers increasing across restarts
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(1);

        Self {
            transport,
            config,
            session: Mutex::new(Session {
                next_seq: seed.max(1),
                last_seq: 0,
                last_status_at: None,
                last_status: None,
            }),
            events: Mutex::new(Some(events)),
            closed: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Subscribe to status and error notifications.
    ///
    /// After [`cleanup`](Self::cleanup) the returned receiver is already closed.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        match self.events.lock().as_ref() {
            Some(sender) => sender.subscribe(),
            None => broadcast::channel(1).1,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Fetch the unit's status.
    ///
    /// Unless `force` is set, a status obtained within the throttle window is
    /// returned as is without touching the network. The window is short until
    /// the first command succeeds and longer afterwards, since the unit is
    /// slow to report while it settles a change.
    pub async fn update_state(&self, force: bool) -> Result<RawDeviceStatus> {
        self.ensure_open()?;

        if !force {
            if let Some(cached) = self.throttled_status() {
                tracing::debug!("Status query throttled, returning cached status");
                return Ok(cached);
            }
        }

        let seq = self.next_seq();
        let request = codec::build_status_request(seq);
        let status = self
            .send_with_retry("status query", &request, codec::parse_status)
            .await?;

        {
            let mut session = self.session.lock();
            session.last_status = Some(status.clone());
            session.last_status_at = Some(Instant::now());
        }
        self.emit(ClientEvent::Status(status.clone()));

        Ok(status)
    }

    /// Send an arbitrary option set as one `SetMessage`.
    pub async fn set_device_options(&self, options: &DeviceOptions) -> Result<()> {
        self.ensure_open()?;

        let seq = self.next_seq();
        let request = codec::build_set_message(seq, options)?;
        self.send_with_retry("set options", &request, codec::parse_ack)
            .await?;

        let merged = {
            let mut session = self.session.lock();
            session.last_seq = seq;
            session.last_status.as_mut().map(|status| {
                options.apply_to(status);
                status.clone()
            })
        };
        if let Some(status) = merged {
            self.emit(ClientEvent::Status(status));
        }

        tracing::debug!("Unit acknowledged options {:?} (seq {})", options, seq);
        Ok(())
    }

    /// Switch the unit on or off.
    ///
    /// Switching off carries the last known mode and target temperature so the
    /// message stays self-consistent.
    pub async fn set_power(&self, on: bool) -> Result<()> {
        let mut options = DeviceOptions::new().with_power(on);
        if !on {
            if let Some(status) = self.session.lock().last_status.as_ref() {
                options.mode = Some(status.mode);
                options.target_temp_f = Some(status.set_temp_f);
            }
        }
        self.set_device_options(&options).await
    }

    pub async fn set_mode(&self, mode: OperationMode) -> Result<()> {
        self.set_device_options(&DeviceOptions::new().with_mode(mode))
            .await
    }

    pub async fn set_target_temperature(&self, fahrenheit: f64) -> Result<()> {
        self.set_device_options(&DeviceOptions::new().with_target_temp_f(fahrenheit))
            .await
    }

    pub async fn set_swing(&self, horizontal: bool, vertical: bool) -> Result<()> {
        self.set_device_options(&DeviceOptions::new().with_swing(horizontal, vertical))
            .await
    }

    pub async fn set_fan_speed(&self, speed: FanSpeed) -> Result<()> {
        self.set_device_options(&DeviceOptions::new().with_fan_speed(speed))
            .await
    }

    pub async fn set_display(&self, on: bool) -> Result<()> {
        self.set_device_options(&DeviceOptions::new().with_display(on))
            .await
    }

    pub async fn set_eco(&self, on: bool) -> Result<()> {
        self.set_device_options(&DeviceOptions::new().with_eco(on))
            .await
    }

    pub async fn set_beep(&self, on: bool) -> Result<()> {
        self.set_device_options(&DeviceOptions::new().with_beep(on))
            .await
    }

    pub async fn set_sleep(&self, on: bool) -> Result<()> {
        self.set_device_options(&DeviceOptions::new().with_sleep(on))
            .await
    }

    pub async fn set_turbo(&self, on: bool) -> Result<()> {
        self.set_device_options(&DeviceOptions::new().with_turbo(on))
            .await
    }

    /// Fan speed and sleep profile in one message
    pub async fn set_fan_and_sleep(&self, speed: FanSpeed, sleep: bool) -> Result<()> {
        let options = DeviceOptions::new().with_fan_speed(speed).with_sleep(sleep);
        self.set_device_options(&options).await
    }

    /// Turbo and sleep profile in one message
    pub async fn set_turbo_and_sleep(&self, turbo: bool, sleep: bool) -> Result<()> {
        let options = DeviceOptions::new().with_turbo(turbo).with_sleep(sleep);
        self.set_device_options(&options).await
    }

    /// Release the socket and close the event channel. Idempotent.
    pub async fn cleanup(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.transport.close().await;
        self.events.lock().take();
        tracing::info!("Air conditioner client closed");
    }

    /// Exchange `request` with the unit and decode the reply, retrying
    /// transport failures with an incremental delay.
    async fn send_with_retry<T, P>(&self, operation: &str, request: &str, parse: P) -> Result<T>
    where
        P: Fn(&str) -> std::result::Result<T, ProtocolError>,
    {
        let mut attempt: u32 = 0;
        loop {
            self.ensure_open()?;

            let result = match self.transport.exchange(request).await {
                Ok(response) => parse(&response).map_err(ClientError::from),
                Err(e) => Err(e),
            };

            match result {
                Ok(value) => return Ok(value),
                Err(error) if error.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    let delay = self.config.retry_delay * attempt;
                    tracing::warn!(
                        "{} failed (attempt {}/{}): {}; retrying in {:?}",
                        operation,
                        attempt,
                        self.config.max_retries + 1,
                        error,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) => {
                    tracing::warn!("{} failed: {}", operation, error);
                    self.emit(ClientEvent::Error(format!("{operation} failed: {error}")));
                    return Err(error);
                }
            }
        }
    }

    fn throttled_status(&self) -> Option<RawDeviceStatus> {
        let session = self.session.lock();
        let window = if session.last_seq == 0 {
            self.config.idle_throttle
        } else {
            self.config.active_throttle
        };
        match (&session.last_status, session.last_status_at) {
            (Some(status), Some(at)) if at.elapsed() < window => Some(status.clone()),
            _ => None,
        }
    }

    fn next_seq(&self) -> u64 {
        let mut session = self.session.lock();
        let seq = session.next_seq;
        session.next_seq = session.next_seq.wrapping_add(1).max(1);
        seq
    }

    fn emit(&self, event: ClientEvent) {
        if let Some(sender) = self.events.lock().as_ref() {
            // No receivers is fine
            let _ = sender.send(event);
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(ClientError::Closed)
        } else {
            Ok(())
        }
    }
}

impl std::fmt::Debug for AirconClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AirconClient")
            .field("config", &self.config)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeUnit;
    use std::time::Duration;

    fn cooling_unit() -> Arc<FakeUnit> {
        FakeUnit::new(RawDeviceStatus {
            power: true,
            mode: OperationMode::Cool,
            set_temp_f: 72.0,
            current_temp_f: 78.0,
            ..Default::default()
        })
    }

    fn client_for(unit: &Arc<FakeUnit>) -> AirconClient {
        AirconClient::with_transport(unit.clone(), ClientConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_is_throttled_before_first_command() {
        let unit = cooling_unit();
        let client = client_for(&unit);

        client.update_state(false).await.unwrap();
        client.update_state(false).await.unwrap();
        assert_eq!(unit.status_query_count(), 1);

        tokio::time::advance(Duration::from_millis(1001)).await;
        client.update_state(false).await.unwrap();
        assert_eq!(unit.status_query_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle_window_widens_after_a_command() {
        let unit = cooling_unit();
        let client = client_for(&unit);

        client.update_state(false).await.unwrap();
        client.set_eco(true).await.unwrap();

        tokio::time::advance(Duration::from_millis(1500)).await;
        client.update_state(false).await.unwrap();
        assert_eq!(unit.status_query_count(), 1);

        tokio::time::advance(Duration::from_millis(600)).await;
        client.update_state(false).await.unwrap();
        assert_eq!(unit.status_query_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_bypasses_throttle() {
        let unit = cooling_unit();
        let client = client_for(&unit);

        client.update_state(false).await.unwrap();
        client.update_state(true).await.unwrap();
        assert_eq!(unit.status_query_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_failures_are_retried_then_reported() {
        let unit = cooling_unit();
        unit.set_failing(true);
        let client = client_for(&unit);
        let mut events = client.subscribe();

        let started = Instant::now();
        let result = client.update_state(true).await;

        assert!(matches!(result, Err(ClientError::Transport(_))));
        assert_eq!(unit.exchange_count(), 4);
        // 500 + 1000 + 1500 ms of incremental backoff
        assert!(started.elapsed() >= Duration::from_millis(3000));
        assert!(matches!(events.try_recv(), Ok(ClientEvent::Error(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_protocol_errors_are_not_retried() {
        let unit = cooling_unit();
        unit.set_malformed(true);
        let client = client_for(&unit);

        let result = client.update_state(true).await;

        assert!(matches!(result, Err(ClientError::Protocol(ProtocolError::MalformedXml(_)))));
        assert_eq!(unit.exchange_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_when_unit_comes_back_mid_retry() {
        let unit = cooling_unit();
        unit.set_failing(true);
        let client = Arc::new(client_for(&unit));

        let task = tokio::spawn({
            let client = Arc::clone(&client);
            async move { client.update_state(true).await }
        });
        tokio::time::sleep(Duration::from_millis(700)).await;
        unit.set_failing(false);

        let status = task.await.unwrap().unwrap();
        assert_eq!(status.set_temp_f, 72.0);
        assert_eq!(unit.exchange_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_command_merges_into_cached_status() {
        let unit = cooling_unit();
        let client = client_for(&unit);
        client.update_state(false).await.unwrap();

        // The unit acknowledges but has not applied the change yet
        unit.set_frozen(true);
        let mut events = client.subscribe();
        client.set_fan_speed(FanSpeed::High).await.unwrap();

        let cached = client.update_state(false).await.unwrap();
        assert_eq!(cached.fan_speed, FanSpeed::High);
        assert_eq!(unit.status().fan_speed, FanSpeed::Auto);
        match events.try_recv() {
            Ok(ClientEvent::Status(status)) => assert_eq!(status.fan_speed, FanSpeed::High),
            other => panic!("expected merged status event, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_power_off_carries_mode_and_temperature() {
        let unit = cooling_unit();
        let client = client_for(&unit);
        client.update_state(false).await.unwrap();

        client.set_power(false).await.unwrap();

        let sent = unit.set_messages();
        assert_eq!(
            sent,
            vec![DeviceOptions::new()
                .with_power(false)
                .with_mode(OperationMode::Cool)
                .with_target_temp_f(72.0)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_combined_setters_send_one_message() {
        let unit = cooling_unit();
        let client = client_for(&unit);

        client.set_turbo_and_sleep(true, true).await.unwrap();

        let sent = unit.set_messages();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].turbo, Some(true));
        assert_eq!(sent[0].sleep, Some(true));
    }

    #[tokio::test]
    async fn test_sequence_numbers_increase() {
        let unit = cooling_unit();
        let client = client_for(&unit);

        client.set_beep(false).await.unwrap();
        client.set_display(false).await.unwrap();

        let seqs: Vec<u64> = unit
            .requests()
            .iter()
            .filter_map(|r| codec::parse_seq(r).unwrap())
            .collect();
        assert_eq!(seqs.len(), 2);
        assert!(seqs[0] < seqs[1]);
    }

    #[tokio::test]
    async fn test_cleanup_is_idempotent_and_closes_client() {
        let unit = cooling_unit();
        let client = client_for(&unit);
        let mut events = client.subscribe();

        client.cleanup().await;
        client.cleanup().await;

        assert!(client.is_closed());
        assert!(matches!(client.update_state(true).await, Err(ClientError::Closed)));
        assert!(matches!(client.set_eco(true).await, Err(ClientError::Closed)));
        assert!(matches!(
            events.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
        assert!(matches!(
            client.subscribe().recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
        assert_eq!(unit.exchange_count(), 0);
    }
}
