// src/device/normalize.rs

use crate::constants::device::{PASSTHROUGH_KEYS, RELAY_PINS, ZONES};
use serde_json::{Map, Value, json};

/// 把控制器 `/state` 的原始载荷转换为面板使用的统一格式。
/// 非对象载荷返回空对象。
pub fn normalize_state(raw: &Value) -> Value {
    let Some(resp) = raw.as_object() else {
        return Value::Object(Map::new());
    };

    let empty = Map::new();
    let gpio = resp.get("gpio_states").and_then(Value::as_object).unwrap_or(&empty);
    let mut relays = Map::new();
    for (pin, name) in RELAY_PINS {
        let val = gpio.get(&pin.to_string());
        relays.insert(name.to_string(), json!(if is_truthy(val) { 1 } else { 0 }));
    }

    let vols = resp.get("ir_volumes").and_then(Value::as_object).unwrap_or(&empty);
    let mut volumes = Map::new();
    for zone in ZONES {
        volumes.insert(zone.to_lowercase(), json!(as_i64(vols.get(*zone)).unwrap_or(0)));
    }

    // 新固件用 ir_mutes，旧固件用 mute_state
    let mutes = resp
        .get("ir_mutes")
        .and_then(Value::as_object)
        .or_else(|| resp.get("mute_state").and_then(Value::as_object));
    let mut mute_state = Map::new();
    for zone in ZONES {
        let muted = mutes
            .and_then(|m| m.get(*zone).or_else(|| m.get(&zone.to_lowercase())))
            .is_some_and(|v| is_truthy(Some(v)));
        mute_state.insert(zone.to_string(), json!(muted));
    }

    let mut out = Map::new();
    out.insert("volumes".into(), Value::Object(volumes));
    out.insert("relays".into(), Value::Object(relays));
    out.insert("mute_state".into(), Value::Object(mute_state));
    out.insert("wifi".into(), json!(is_truthy(resp.get("wifi"))));

    for key in ["ssid", "mac"] {
        if let Some(Value::String(s)) = resp.get(key) {
            out.insert(key.into(), json!(s));
        }
    }
    if let Some(v) = resp.get("rssi_dbm").or_else(|| resp.get("rssi")) {
        out.insert("rssi_dbm".into(), as_f64(Some(v)).map_or(v.clone(), |f| json!(f)));
    }
    if let Some(v) = resp.get("rssi_bars") {
        out.insert("rssi_bars".into(), as_i64(Some(v)).map_or(v.clone(), |n| json!(n)));
    }
    for key in PASSTHROUGH_KEYS {
        if let Some(v) = resp.get(*key) {
            out.insert(key.to_string(), v.clone());
        }
    }
    Value::Object(out)
}

/// 1 / true / "1" / "ON" / "HIGH" 视为真
fn is_truthy(val: Option<&Value>) -> bool {
    match val {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_i64() == Some(1),
        Some(Value::String(s)) => matches!(s.trim().to_ascii_uppercase().as_str(), "1" | "ON" | "HIGH" | "TRUE"),
        _ => false,
    }
}

fn as_i64(val: Option<&Value>) -> Option<i64> {
    match val? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_f64(val: Option<&Value>) -> Option<f64> {
    match val? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_pins_volumes_and_mutes() {
        let raw = json!({
            "gpio_states": {"23": "ON", "22": 0, "21": true, "19": "LOW"},
            "ir_volumes": {"QUIOSQUE": 12, "PISCINA": "7"},
            "ir_mutes": {"piscina": true},
            "mute_state": {"QUIOSQUE": true},
            "wifi": 1,
            "ssid": "casa",
            "rssi": "-61",
            "uptime_s": 3600,
            "unrelated": "x"
        });
        let state = normalize_state(&raw);
        assert_eq!(state["relays"], json!({"r1": 1, "r2": 0, "r3": 1, "r4": 0}));
        assert_eq!(state["volumes"], json!({"quiosque": 12, "piscina": 7}));
        // ir_mutes 优先于 mute_state
        assert_eq!(state["mute_state"], json!({"QUIOSQUE": false, "PISCINA": true}));
        assert_eq!(state["wifi"], true);
        assert_eq!(state["ssid"], "casa");
        assert_eq!(state["rssi_dbm"], json!(-61.0));
        assert_eq!(state["uptime_s"], 3600);
        assert!(state.get("unrelated").is_none());
    }

    #[test]
    fn non_object_is_empty() {
        assert_eq!(normalize_state(&json!("offline")), json!({}));
    }
}
