//! Builders and parsers for the unit's XML messages.
//!
//! Every datagram is a single `<msg>` envelope:
//!
//! ```text
//! <msg msgid="SetMessage" type="Control" seq="42">
//!     <SetMessage><TurnOn>on</TurnOn><BaseMode>cool</BaseMode></SetMessage>
//! </msg>
//! ```
//!
//! Status replies carry a `statusUpdateMsg` body with the full settings plus
//! optional telemetry.

use std::fmt::Write;

use serde::Deserialize;

use crate::error::ProtocolError;
use crate::types::{
    on_off, parse_on_off, DeviceOptions, FanSpeed, OperationMode, RawDeviceStatus,
    SLEEP_OFF_TOKEN, SLEEP_ON_TOKEN,
};

/// Build the status query datagram.
pub fn build_status_request(seq: u64) -> String {
    format!(
        r#"<msg msgid="SyncStatusReq" type="Control" seq="{seq}"><SyncStatusReq></SyncStatusReq></msg>"#
    )
}

/// Build a `SetMessage` datagram carrying every option present in `options`.
pub fn build_set_message(seq: u64, options: &DeviceOptions) -> Result<String, ProtocolError> {
    if options.is_empty() {
        return Err(ProtocolError::EmptyOptions);
    }

    let mut body = String::new();
    push_tag(&mut body, "TurnOn", options.power.map(on_off));
    push_tag(&mut body, "BaseMode", options.mode.map(OperationMode::as_wire));
    push_tag(
        &mut body,
        "SetTemp",
        options.target_temp_f.map(format_temperature).as_deref(),
    );
    push_tag(&mut body, "WindSpeed", options.fan_speed.map(FanSpeed::as_wire));
    push_tag(&mut body, "WindDirection_H", options.swing_horizontal.map(on_off));
    push_tag(&mut body, "WindDirection_V", options.swing_vertical.map(on_off));
    push_tag(&mut body, "Opt_super", options.turbo.map(on_off));
    push_tag(&mut body, "Opt_sleepMode", options.sleep.map(sleep_token));
    push_tag(&mut body, "Opt_eco", options.eco.map(on_off));
    push_tag(&mut body, "Opt_display", options.display.map(on_off));
    push_tag(&mut body, "Opt_beep", options.beep.map(on_off));

    Ok(format!(
        r#"<msg msgid="SetMessage" type="Control" seq="{seq}"><SetMessage>{body}</SetMessage></msg>"#
    ))
}

/// Render a full status reply, as the unit would send it.
///
/// Used by emulators and fixtures.
pub fn build_status_response(seq: u64, status: &RawDeviceStatus) -> String {
    let mut body = String::new();
    push_tag(&mut body, "TurnOn", Some(on_off(status.power)));
    push_tag(&mut body, "BaseMode", Some(status.mode.as_wire()));
    push_tag(&mut body, "SetTemp", Some(format_temperature(status.set_temp_f).as_str()));
    push_tag(
        &mut body,
        "IndoorTemp",
        Some(format_temperature(status.current_temp_f).as_str()),
    );
    push_tag(
        &mut body,
        "OutdoorTemp",
        status.outdoor_temp_f.map(format_temperature).as_deref(),
    );
    push_tag(&mut body, "WindSpeed", Some(status.fan_speed.as_wire()));
    push_tag(&mut body, "WindDirection_H", status.swing_horizontal.map(on_off));
    push_tag(&mut body, "WindDirection_V", status.swing_vertical.map(on_off));
    push_tag(&mut body, "Opt_super", status.turbo.map(on_off));
    push_tag(&mut body, "Opt_sleepMode", status.sleep_profile.as_deref());
    push_tag(&mut body, "Opt_eco", status.eco.map(on_off));
    push_tag(&mut body, "Opt_display", status.display.map(on_off));
    push_tag(&mut body, "Opt_beep", status.beep.map(on_off));
    push_tag(&mut body, "DeviceName", status.device_name.as_deref());
    push_tag(&mut body, "WifiVer", status.wifi_version.as_deref());

    format!(
        r#"<msg msgid="statusUpdateMsg" type="Control" seq="{seq}"><statusUpdateMsg>{body}</statusUpdateMsg></msg>"#
    )
}

/// Parse a status reply into a [`RawDeviceStatus`].
pub fn parse_status(xml: &str) -> Result<RawDeviceStatus, ProtocolError> {
    let envelope = parse_envelope(xml)?;
    let fields = envelope.status.ok_or_else(|| {
        ProtocolError::UnexpectedResponse(format!(
            "expected statusUpdateMsg, got msgid {:?}",
            envelope.msgid.unwrap_or_default()
        ))
    })?;

    let power = required_flag(&fields.turn_on, "TurnOn")?;
    let mode: OperationMode = required(&fields.base_mode, "BaseMode")?.parse()?;
    let set_temp_f = parse_temperature(required(&fields.set_temp, "SetTemp")?, "SetTemp")?;
    let current_temp_f =
        parse_temperature(required(&fields.indoor_temp, "IndoorTemp")?, "IndoorTemp")?;
    let outdoor_temp_f = optional(&fields.outdoor_temp)
        .map(|t| parse_temperature(t, "OutdoorTemp"))
        .transpose()?;
    let fan_speed = FanSpeed::from_wire(required(&fields.wind_speed, "WindSpeed")?)?;

    // A literal Turbo fan level implies the turbo toggle even when Opt_super is absent
    let mut turbo = optional_flag(&fields.opt_super, "Opt_super")?;
    if fan_speed == FanSpeed::Turbo {
        turbo = Some(true);
    }

    Ok(RawDeviceStatus {
        power,
        mode,
        set_temp_f,
        current_temp_f,
        outdoor_temp_f,
        fan_speed,
        swing_horizontal: optional_flag(&fields.wind_direction_h, "WindDirection_H")?,
        swing_vertical: optional_flag(&fields.wind_direction_v, "WindDirection_V")?,
        display: optional_flag(&fields.opt_display, "Opt_display")?,
        beep: optional_flag(&fields.opt_beep, "Opt_beep")?,
        eco: optional_flag(&fields.opt_eco, "Opt_eco")?,
        turbo,
        sleep_profile: optional(&fields.opt_sleep_mode).map(str::to_string),
        device_name: optional(&fields.device_name).map(str::to_string),
        wifi_version: optional(&fields.wifi_version).map(str::to_string),
    })
}

/// Parse a `SetMessage` datagram back into the options it carries.
pub fn parse_set_message(xml: &str) -> Result<DeviceOptions, ProtocolError> {
    let envelope = parse_envelope(xml)?;
    let fields = envelope.set.ok_or_else(|| {
        ProtocolError::UnexpectedResponse("expected SetMessage body".to_string())
    })?;

    let options = DeviceOptions {
        power: optional_flag(&fields.turn_on, "TurnOn")?,
        mode: optional(&fields.base_mode)
            .map(str::parse::<OperationMode>)
            .transpose()?,
        target_temp_f: optional(&fields.set_temp)
            .map(|t| parse_temperature(t, "SetTemp"))
            .transpose()?,
        fan_speed: optional(&fields.wind_speed).map(FanSpeed::from_wire).transpose()?,
        swing_horizontal: optional_flag(&fields.wind_direction_h, "WindDirection_H")?,
        swing_vertical: optional_flag(&fields.wind_direction_v, "WindDirection_V")?,
        turbo: optional_flag(&fields.opt_super, "Opt_super")?,
        sleep: optional(&fields.opt_sleep_mode).map(|token| token.starts_with("sleepMode")),
        eco: optional_flag(&fields.opt_eco, "Opt_eco")?,
        display: optional_flag(&fields.opt_display, "Opt_display")?,
        beep: optional_flag(&fields.opt_beep, "Opt_beep")?,
    };
    if options.is_empty() {
        return Err(ProtocolError::EmptyOptions);
    }
    Ok(options)
}

/// Accept the unit's reply to a `SetMessage`.
///
/// The unit answers with some `<msg>` envelope; its body is not meaningful.
pub fn parse_ack(xml: &str) -> Result<(), ProtocolError> {
    parse_envelope(xml).map(|_| ())
}

/// Extract the `seq` attribute of an envelope, if present.
pub fn parse_seq(xml: &str) -> Result<Option<u64>, ProtocolError> {
    let envelope = parse_envelope(xml)?;
    envelope
        .seq
        .map(|seq| {
            seq.trim().parse().map_err(|_| ProtocolError::InvalidValue {
                field: "seq",
                value: seq,
            })
        })
        .transpose()
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "@msgid", default)]
    msgid: Option<String>,
    #[serde(rename = "@seq", default)]
    seq: Option<String>,
    #[serde(rename = "statusUpdateMsg", default)]
    status: Option<WireFields>,
    #[serde(rename = "SetMessage", default)]
    set: Option<WireFields>,
}

/// Every tag that may appear in a status or set body
#[derive(Debug, Default, Deserialize)]
struct WireFields {
    #[serde(rename = "TurnOn", default)]
    turn_on: Option<String>,
    #[serde(rename = "BaseMode", default)]
    base_mode: Option<String>,
    #[serde(rename = "SetTemp", default)]
    set_temp: Option<String>,
    #[serde(rename = "IndoorTemp", default)]
    indoor_temp: Option<String>,
    #[serde(rename = "OutdoorTemp", default)]
    outdoor_temp: Option<String>,
    #[serde(rename = "WindSpeed", default)]
    wind_speed: Option<String>,
    #[serde(rename = "WindDirection_H", default)]
    wind_direction_h: Option<String>,
    #[serde(rename = "WindDirection_V", default)]
    wind_direction_v: Option<String>,
    #[serde(rename = "Opt_super", default)]
    opt_super: Option<String>,
    #[serde(rename = "Opt_sleepMode", default)]
    opt_sleep_mode: Option<String>,
    #[serde(rename = "Opt_eco", default)]
    opt_eco: Option<String>,
    #[serde(rename = "Opt_display", default)]
    opt_display: Option<String>,
    #[serde(rename = "Opt_beep", default)]
    opt_beep: Option<String>,
    #[serde(rename = "DeviceName", default)]
    device_name: Option<String>,
    #[serde(rename = "WifiVer", default)]
    wifi_version: Option<String>,
}

fn parse_envelope(xml: &str) -> Result<Envelope, ProtocolError> {
    let xml = xml.trim();
    if !xml.starts_with("<msg") {
        return Err(ProtocolError::MalformedXml(format!(
            "expected <msg> envelope, got {:?}",
            xml.chars().take(32).collect::<String>()
        )));
    }
    quick_xml::de::from_str(xml).map_err(|e| ProtocolError::MalformedXml(e.to_string()))
}

fn push_tag(body: &mut String, tag: &str, value: Option<&str>) {
    if let Some(value) = value {
        // Writing into a String cannot fail
        let _ = write!(body, "<{tag}>{}</{tag}>", quick_xml::escape::escape(value));
    }
}

fn sleep_token(on: bool) -> &'static str {
    if on {
        SLEEP_ON_TOKEN
    } else {
        SLEEP_OFF_TOKEN
    }
}

fn format_temperature(fahrenheit: f64) -> String {
    format!("{}", fahrenheit.round() as i64)
}

fn optional(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn required<'a>(value: &'a Option<String>, field: &'static str) -> Result<&'a str, ProtocolError> {
    optional(value).ok_or(ProtocolError::MissingField(field))
}

fn required_flag(value: &Option<String>, field: &'static str) -> Result<bool, ProtocolError> {
    let raw = required(value, field)?;
    parse_on_off(raw).ok_or_else(|| ProtocolError::InvalidValue {
        field,
        value: raw.to_string(),
    })
}

fn optional_flag(value: &Option<String>, field: &'static str) -> Result<Option<bool>, ProtocolError> {
    optional(value)
        .map(|raw| {
            parse_on_off(raw).ok_or_else(|| ProtocolError::InvalidValue {
                field,
                value: raw.to_string(),
            })
        })
        .transpose()
}

fn parse_temperature(raw: &str, field: &'static str) -> Result<f64, ProtocolError> {
    raw.parse::<f64>()
        .ok()
        .filter(|t| t.is_finite())
        .ok_or_else(|| ProtocolError::InvalidValue {
            field,
            value: raw.to_string(),
        })
}
