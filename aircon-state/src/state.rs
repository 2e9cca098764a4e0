//! The canonical, diffable device state

use aircon_protocol::{FanSpeed, OperationMode, RawDeviceStatus};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::config::StateConfig;
use crate::model::{
    ChangeSource, PartialDeviceState, PowerState, SleepMode, StateChange, StateSnapshot,
    SwingMode,
};
use crate::units;

#[derive(Debug)]
struct Inner {
    snapshot: StateSnapshot,
    /// When sleep was last switched on locally
    sleep_on_at: Option<Instant>,
}

/// Canonical settings of one unit.
///
/// Mutated only through [`update_from_device`](Self::update_from_device)
/// (reconciling with what the unit reports) and
/// [`update_from_options`](Self::update_from_options) (optimistic local
/// writes). Either path publishes a [`StateChange`] to subscribers when, and
/// only when, at least one value changed.
///
/// Cloning yields a detached copy with its own notification channel. The copy
/// is meant for building a desired state to hand back to the orchestrator:
///
/// ```rust
/// use aircon_state::{DeviceState, PowerState};
///
/// let current = DeviceState::new();
/// let desired = current.clone();
/// desired.set_power(PowerState::On);
/// desired.set_target_temperature(21.5);
///
/// let delta = current.diff(&desired);
/// assert_eq!(delta.power, Some(PowerState::On));
/// assert_eq!(delta.target_temperature, Some(21.5));
/// ```
#[derive(Debug)]
pub struct DeviceState {
    inner: Mutex<Inner>,
    config: StateConfig,
    changes: broadcast::Sender<StateChange>,
}

impl DeviceState {
    /// State with "off" defaults
    pub fn new() -> Self {
        Self::with_config(StateConfig::default())
    }

    pub fn with_config(config: StateConfig) -> Self {
        Self::from_parts(StateSnapshot::default(), None, config)
    }

    fn from_parts(snapshot: StateSnapshot, sleep_on_at: Option<Instant>, config: StateConfig) -> Self {
        let (changes, _) = broadcast::channel(config.event_buffer_size.max(1));
        Self {
            inner: Mutex::new(Inner {
                snapshot,
                sleep_on_at,
            }),
            config,
            changes,
        }
    }

    pub fn config(&self) -> &StateConfig {
        &self.config
    }

    /// Receive a [`StateChange`] for every mutation that changes a value
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.changes.subscribe()
    }

    pub fn snapshot(&self) -> StateSnapshot {
        self.inner.lock().snapshot.clone()
    }

    pub fn power(&self) -> PowerState {
        self.inner.lock().snapshot.power
    }

    pub fn mode(&self) -> OperationMode {
        self.inner.lock().snapshot.mode
    }

    pub fn target_temperature(&self) -> f64 {
        self.inner.lock().snapshot.target_temperature
    }

    pub fn current_temperature(&self) -> f64 {
        self.inner.lock().snapshot.current_temperature
    }

    pub fn fan_speed(&self) -> FanSpeed {
        self.inner.lock().snapshot.fan_speed
    }

    pub fn swing(&self) -> SwingMode {
        self.inner.lock().snapshot.swing
    }

    pub fn sleep(&self) -> SleepMode {
        self.inner.lock().snapshot.sleep
    }

    /// Reconcile with a status reported by the unit.
    ///
    /// Temperatures are converted to Celsius. Fields the unit did not report
    /// keep their current value. A reported sleep "off" that arrives within
    /// the debounce window of a local sleep-on is ignored: the unit echoes
    /// "off" while it moves between sleep stages. A `sleepMode…` token is
    /// always accepted.
    ///
    /// Returns whether anything changed.
    pub fn update_from_device(&self, raw: &RawDeviceStatus) -> bool {
        let mut inner = self.inner.lock();
        let mut next = inner.snapshot.clone();

        next.power = raw.power.into();
        next.mode = raw.mode;
        next.fan_speed = raw.fan_speed;

        if raw.set_temp_f.is_finite() {
            next.target_temperature =
                units::target_from_wire(raw.set_temp_f, next.target_temperature);
        }
        if raw.current_temp_f.is_finite() {
            next.current_temperature =
                units::normalize_reading(units::fahrenheit_to_celsius(raw.current_temp_f));
        }
        if let Some(outdoor) = raw.outdoor_temp_f.filter(|t| t.is_finite()) {
            next.outdoor_temperature =
                Some(units::normalize_reading(units::fahrenheit_to_celsius(outdoor)));
        }

        if raw.swing_horizontal.is_some() || raw.swing_vertical.is_some() {
            next.swing = SwingMode::from_flags(
                raw.swing_horizontal.unwrap_or(next.swing.horizontal()),
                raw.swing_vertical.unwrap_or(next.swing.vertical()),
            );
        }
        if let Some(eco) = raw.eco {
            next.eco = eco;
        }
        if let Some(turbo) = raw.turbo {
            next.turbo = turbo;
        }
        if let Some(display) = raw.display {
            next.display = display;
        }
        if let Some(beep) = raw.beep {
            next.beep = beep;
        }

        if let Some(token) = raw.sleep_profile.as_deref() {
            match SleepMode::from_token(token) {
                Some(SleepMode::Off) if self.in_sleep_transition(&inner) => {
                    tracing::debug!(
                        "Ignoring sleep-off echo during sleep transition (profile {:?})",
                        token
                    );
                }
                Some(mode) => {
                    next.sleep = mode;
                    if mode == SleepMode::Off {
                        inner.sleep_on_at = None;
                    }
                }
                None => tracing::debug!("Unrecognised sleep profile {:?}, keeping current", token),
            }
        }

        self.commit(&mut inner, next, ChangeSource::Device)
    }

    /// Apply local intent directly, bypassing the sleep debounce.
    ///
    /// Switching sleep on starts the debounce window. Returns whether
    /// anything changed.
    pub fn update_from_options(&self, partial: &PartialDeviceState) -> bool {
        let mut inner = self.inner.lock();
        let mut next = inner.snapshot.clone();

        if let Some(power) = partial.power {
            next.power = power;
        }
        if let Some(mode) = partial.mode {
            next.mode = mode;
        }
        match partial.target_temperature {
            Some(target) if target.is_finite() => {
                next.target_temperature = units::normalize_target(target);
            }
            Some(target) => tracing::warn!("Ignoring non-finite target temperature {}", target),
            None => {}
        }
        if let Some(speed) = partial.fan_speed {
            next.fan_speed = speed;
        }
        if let Some(swing) = partial.swing {
            next.swing = swing;
        }
        if let Some(sleep) = partial.sleep {
            next.sleep = sleep;
            inner.sleep_on_at = sleep.is_on().then(Instant::now);
        }
        if let Some(eco) = partial.eco {
            next.eco = eco;
        }
        if let Some(turbo) = partial.turbo {
            next.turbo = turbo;
        }
        if let Some(display) = partial.display {
            next.display = display;
        }
        if let Some(beep) = partial.beep {
            next.beep = beep;
        }

        self.commit(&mut inner, next, ChangeSource::Options)
    }

    /// Every settable field where `desired` differs from `self`
    pub fn diff(&self, desired: &DeviceState) -> PartialDeviceState {
        let current = self.snapshot();
        let wanted = desired.snapshot();

        fn changed<T: PartialEq + Copy>(current: T, wanted: T) -> Option<T> {
            (current != wanted).then_some(wanted)
        }

        PartialDeviceState {
            power: changed(current.power, wanted.power),
            mode: changed(current.mode, wanted.mode),
            target_temperature: changed(current.target_temperature, wanted.target_temperature),
            fan_speed: changed(current.fan_speed, wanted.fan_speed),
            swing: changed(current.swing, wanted.swing),
            sleep: changed(current.sleep, wanted.sleep),
            eco: changed(current.eco, wanted.eco),
            turbo: changed(current.turbo, wanted.turbo),
            display: changed(current.display, wanted.display),
            beep: changed(current.beep, wanted.beep),
        }
    }

    pub fn set_power(&self, power: PowerState) -> bool {
        self.update_from_options(&PartialDeviceState {
            power: Some(power),
            ..Default::default()
        })
    }

    pub fn set_mode(&self, mode: OperationMode) -> bool {
        self.update_from_options(&PartialDeviceState {
            mode: Some(mode),
            ..Default::default()
        })
    }

    /// Target in Celsius; rounded to 0.5 and clamped to the unit's range
    pub fn set_target_temperature(&self, celsius: f64) -> bool {
        self.update_from_options(&PartialDeviceState {
            target_temperature: Some(celsius),
            ..Default::default()
        })
    }

    pub fn set_fan_speed(&self, speed: FanSpeed) -> bool {
        self.update_from_options(&PartialDeviceState {
            fan_speed: Some(speed),
            ..Default::default()
        })
    }

    pub fn set_swing(&self, swing: SwingMode) -> bool {
        self.update_from_options(&PartialDeviceState {
            swing: Some(swing),
            ..Default::default()
        })
    }

    pub fn set_sleep(&self, sleep: SleepMode) -> bool {
        self.update_from_options(&PartialDeviceState {
            sleep: Some(sleep),
            ..Default::default()
        })
    }

    pub fn set_eco(&self, on: bool) -> bool {
        self.update_from_options(&PartialDeviceState {
            eco: Some(on),
            ..Default::default()
        })
    }

    pub fn set_turbo(&self, on: bool) -> bool {
        self.update_from_options(&PartialDeviceState {
            turbo: Some(on),
            ..Default::default()
        })
    }

    pub fn set_display(&self, on: bool) -> bool {
        self.update_from_options(&PartialDeviceState {
            display: Some(on),
            ..Default::default()
        })
    }

    pub fn set_beep(&self, on: bool) -> bool {
        self.update_from_options(&PartialDeviceState {
            beep: Some(on),
            ..Default::default()
        })
    }

    fn in_sleep_transition(&self, inner: &Inner) -> bool {
        inner.snapshot.sleep.is_on()
            && inner
                .sleep_on_at
                .is_some_and(|at| at.elapsed() < self.config.sleep_debounce)
    }

    fn commit(&self, inner: &mut Inner, next: StateSnapshot, source: ChangeSource) -> bool {
        if next == inner.snapshot {
            return false;
        }

        let previous = std::mem::replace(&mut inner.snapshot, next.clone());
        tracing::debug!("Device state changed ({:?})", source);
        // No subscribers is fine
        let _ = self.changes.send(StateChange {
            previous,
            current: next,
            source,
        });
        true
    }
}

impl Default for DeviceState {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for DeviceState {
    /// Detached copy: same values and debounce clock, fresh notification channel
    fn clone(&self) -> Self {
        let inner = self.inner.lock();
        Self::from_parts(inner.snapshot.clone(), inner.sleep_on_at, self.config.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aircon_protocol::{SLEEP_OFF_TOKEN, SLEEP_ON_TOKEN};
    use std::time::Duration;

    fn reported() -> RawDeviceStatus {
        RawDeviceStatus {
            power: true,
            mode: OperationMode::Cool,
            set_temp_f: 72.0,
            current_temp_f: 78.0,
            outdoor_temp_f: Some(95.0),
            fan_speed: FanSpeed::Low,
            swing_horizontal: Some(false),
            swing_vertical: Some(true),
            eco: Some(false),
            turbo: Some(false),
            display: Some(true),
            beep: Some(true),
            sleep_profile: Some(SLEEP_OFF_TOKEN.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_update_from_device_converts_to_celsius() {
        let state = DeviceState::new();
        assert!(state.update_from_device(&reported()));

        let snapshot = state.snapshot();
        assert_eq!(snapshot.power, PowerState::On);
        assert_eq!(snapshot.target_temperature, 22.0);
        assert_eq!(snapshot.current_temperature, 25.6);
        assert_eq!(snapshot.outdoor_temperature, Some(35.0));
        assert_eq!(snapshot.swing, SwingMode::Vertical);
        assert_eq!(snapshot.fan_speed, FanSpeed::Low);
    }

    #[tokio::test]
    async fn test_absent_optionals_keep_current_values() {
        let state = DeviceState::new();
        state.update_from_device(&reported());

        let sparse = RawDeviceStatus {
            swing_horizontal: Some(true),
            swing_vertical: None,
            eco: None,
            outdoor_temp_f: None,
            ..reported()
        };
        state.set_eco(true);
        state.update_from_device(&sparse);

        let snapshot = state.snapshot();
        assert!(snapshot.eco);
        assert_eq!(snapshot.swing, SwingMode::Both);
        assert_eq!(snapshot.outdoor_temperature, Some(35.0));
    }

    #[tokio::test]
    async fn test_options_then_matching_device_is_idempotent() {
        let state = DeviceState::new();
        state.update_from_device(&reported());
        let mut changes = state.subscribe();

        let partial = PartialDeviceState {
            fan_speed: Some(FanSpeed::High),
            target_temperature: Some(24.0),
            ..Default::default()
        };
        assert!(state.update_from_options(&partial));
        assert_eq!(changes.try_recv().unwrap().source, ChangeSource::Options);

        let confirmed = RawDeviceStatus {
            fan_speed: FanSpeed::High,
            set_temp_f: 75.0,
            ..reported()
        };
        assert!(!state.update_from_device(&confirmed));
        assert!(!state.update_from_device(&confirmed));
        assert!(changes.try_recv().is_err());

        assert_eq!(state.fan_speed(), FanSpeed::High);
        assert_eq!(state.target_temperature(), 24.0);
    }

    #[tokio::test]
    async fn test_every_target_step_settles_after_the_unit_echoes_it() {
        let state = DeviceState::new();
        state.update_from_device(&reported());

        for step in 0..=28u32 {
            let celsius = 16.0 + f64::from(step) * 0.5;
            let partial = PartialDeviceState {
                target_temperature: Some(celsius),
                ..Default::default()
            };
            state.update_from_options(&partial);

            let sent = partial.to_device_options().target_temp_f.unwrap();
            let echoed = RawDeviceStatus {
                set_temp_f: sent,
                ..reported()
            };
            assert!(!state.update_from_device(&echoed), "{celsius} °C drifted via {sent} °F");
            assert_eq!(state.target_temperature(), celsius);

            let desired = state.clone();
            desired.set_target_temperature(celsius);
            assert!(state.diff(&desired).is_empty());
        }
    }

    #[tokio::test]
    async fn test_notification_carries_previous_and_current() {
        let state = DeviceState::new();
        let mut changes = state.subscribe();

        state.set_power(PowerState::On);

        let change = changes.try_recv().unwrap();
        assert_eq!(change.previous.power, PowerState::Off);
        assert_eq!(change.current.power, PowerState::On);
        assert!(change.power_changed());
        assert!(!change.temperature_changed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_off_echo_is_debounced() {
        let state = DeviceState::new();
        state.update_from_device(&reported());
        state.set_sleep(SleepMode::On);

        tokio::time::advance(Duration::from_secs(1)).await;
        state.update_from_device(&reported());
        assert_eq!(state.sleep(), SleepMode::On);

        tokio::time::advance(Duration::from_secs(5)).await;
        state.update_from_device(&reported());
        assert_eq!(state.sleep(), SleepMode::Off);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_confirmation_is_accepted_immediately() {
        let state = DeviceState::new();
        state.update_from_device(&reported());
        state.set_sleep(SleepMode::On);

        tokio::time::advance(Duration::from_millis(100)).await;
        let confirmed = RawDeviceStatus {
            sleep_profile: Some(SLEEP_ON_TOKEN.to_string()),
            ..reported()
        };
        state.update_from_device(&confirmed);
        assert_eq!(state.sleep(), SleepMode::On);

        // Outside any local command, the unit's word is final
        let remote = DeviceState::new();
        remote.update_from_device(&confirmed);
        assert_eq!(remote.sleep(), SleepMode::On);
        remote.update_from_device(&reported());
        assert_eq!(remote.sleep(), SleepMode::Off);
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_window_is_configurable() {
        let state = DeviceState::with_config(
            StateConfig::default().with_sleep_debounce(Duration::from_millis(500)),
        );
        state.set_sleep(SleepMode::On);

        tokio::time::advance(Duration::from_secs(1)).await;
        state.update_from_device(&reported());
        assert_eq!(state.sleep(), SleepMode::Off);
    }

    #[tokio::test]
    async fn test_target_is_clamped_and_rounded() {
        let state = DeviceState::new();

        state.set_target_temperature(40.0);
        assert_eq!(state.target_temperature(), 30.0);
        state.set_target_temperature(21.3);
        assert_eq!(state.target_temperature(), 21.5);
        assert!(!state.set_target_temperature(f64::NAN));
        assert_eq!(state.target_temperature(), 21.5);
    }

    #[tokio::test]
    async fn test_clone_is_detached() {
        let state = DeviceState::new();
        let mut original_changes = state.subscribe();

        let desired = state.clone();
        let mut copy_changes = desired.subscribe();
        desired.set_fan_speed(FanSpeed::Turbo);

        assert!(copy_changes.try_recv().is_ok());
        assert!(original_changes.try_recv().is_err());
        assert_eq!(state.fan_speed(), FanSpeed::Auto);
    }

    #[tokio::test]
    async fn test_diff_lists_only_differences() {
        let state = DeviceState::new();
        state.update_from_device(&reported());

        let desired = state.clone();
        assert!(state.diff(&desired).is_empty());

        desired.set_swing(SwingMode::Both);
        desired.set_eco(true);
        let delta = state.diff(&desired);

        assert_eq!(
            delta,
            PartialDeviceState {
                swing: Some(SwingMode::Both),
                eco: Some(true),
                ..Default::default()
            }
        );
    }
}
