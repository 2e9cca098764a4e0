//! Reconciliation scenarios across the public API

use std::time::Duration;

use aircon_protocol::{codec, DeviceOptions, RawDeviceStatus, SLEEP_OFF_TOKEN};
use aircon_state::{
    ChangeSource, DeviceState, FanSpeed, OperationMode, PowerState, SleepMode, SwingMode,
};

const STATUS: &str = r#"<msg msgid="statusUpdateMsg" type="Control" seq="1"><statusUpdateMsg>
    <IndoorTemp>80</IndoorTemp><SetTemp>68</SetTemp><BaseMode>heat</BaseMode>
    <WindSpeed>75</WindSpeed><TurnOn>on</TurnOn>
    <WindDirection_H>on</WindDirection_H><WindDirection_V>on</WindDirection_V>
    <Opt_sleepMode>off:0:0:0:0:0:0:0:0:0:0:0:0:0:0:0:0:0:0:0:0:0:0:0:0:0</Opt_sleepMode>
</statusUpdateMsg></msg>"#;

#[tokio::test]
async fn test_parsed_status_flows_into_state() {
    let raw = codec::parse_status(STATUS).unwrap();
    let state = DeviceState::new();
    state.update_from_device(&raw);

    let snapshot = state.snapshot();
    assert_eq!(snapshot.power, PowerState::On);
    assert_eq!(snapshot.mode, OperationMode::Heat);
    assert_eq!(snapshot.target_temperature, 20.0);
    assert_eq!(snapshot.current_temperature, 26.7);
    assert_eq!(snapshot.fan_speed, FanSpeed::MediumHigh);
    assert_eq!(snapshot.swing, SwingMode::Both);
    assert_eq!(snapshot.sleep, SleepMode::Off);
}

#[tokio::test]
async fn test_desired_state_becomes_minimal_wire_delta() {
    let state = DeviceState::new();
    state.update_from_device(&codec::parse_status(STATUS).unwrap());

    let desired = state.clone();
    desired.set_mode(OperationMode::Cool);
    desired.set_target_temperature(22.0);
    desired.set_swing(SwingMode::Off);

    let options = state.diff(&desired).to_device_options();
    assert_eq!(
        options,
        DeviceOptions::new()
            .with_mode(OperationMode::Cool)
            .with_target_temp_f(72.0)
            .with_swing(false, false)
    );
}

#[tokio::test(start_paused = true)]
async fn test_sleep_transition_end_to_end() {
    let state = DeviceState::new();
    let mut changes = state.subscribe();
    let off_echo = RawDeviceStatus {
        power: true,
        sleep_profile: Some(SLEEP_OFF_TOKEN.to_string()),
        ..Default::default()
    };
    state.update_from_device(&off_echo);
    let _ = changes.try_recv();

    state.set_sleep(SleepMode::On);
    assert_eq!(changes.try_recv().unwrap().source, ChangeSource::Options);

    tokio::time::advance(Duration::from_secs(2)).await;
    assert!(!state.update_from_device(&off_echo));
    assert!(changes.try_recv().is_err());

    tokio::time::advance(Duration::from_secs(4)).await;
    assert!(state.update_from_device(&off_echo));
    let change = changes.try_recv().unwrap();
    assert_eq!(change.source, ChangeSource::Device);
    assert_eq!(change.current.sleep, SleepMode::Off);
}
