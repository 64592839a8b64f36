// src/device/command.rs

use crate::error::{AppError, AppResult};
use serde_json::{Value, json};
use std::fmt;

/// 转发给控制器的动作命令。构造时完成校验，非法载荷不会到达设备。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceCommand {
    Ir { device: String, command: String },
    Gpio { pin: u32, on: bool },
    Wifi { ssid: String, pass: String },
}

impl DeviceCommand {
    /// `{ "device": "QUIOSQUE", "command": "VOL_UP" }`；UP/DOWN 为 VOL_UP/VOL_DOWN 的别名。
    pub fn ir_from_json(body: &Value) -> AppResult<Self> {
        let device = required_str(body, "device")?;
        let command = required_str(body, "command")?;
        let command = match command.to_ascii_uppercase().as_str() {
            "UP" => "VOL_UP".to_string(),
            "DOWN" => "VOL_DOWN".to_string(),
            _ => command,
        };
        Ok(DeviceCommand::Ir { device, command })
    }

    /// `{ "pin": 23, "state": 1 | "ON" | true | ... }`
    pub fn gpio_from_json(body: &Value) -> AppResult<Self> {
        let pin = match body.get("pin") {
            Some(Value::Number(n)) => n.as_u64(),
            Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
            _ => None,
        }
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| AppError::BadCommand("缺少或无效的 'pin'".to_string()))?;

        let on = match body.get("state") {
            Some(Value::Bool(b)) => Some(*b),
            Some(Value::Number(n)) => match n.as_i64() {
                Some(1) => Some(true),
                Some(0) => Some(false),
                _ => None,
            },
            Some(Value::String(s)) => match s.trim().to_ascii_uppercase().as_str() {
                "1" | "ON" | "HIGH" | "TRUE" => Some(true),
                "0" | "OFF" | "LOW" | "FALSE" => Some(false),
                _ => None,
            },
            _ => None,
        }
        .ok_or_else(|| AppError::BadCommand("缺少或无效的 'state'".to_string()))?;

        Ok(DeviceCommand::Gpio { pin, on })
    }

    /// `{ "ssid": "...", "password" | "pass": "..." }`
    pub fn wifi_from_json(body: &Value) -> AppResult<Self> {
        let ssid = required_str(body, "ssid")?;
        let pass = required_str(body, "password").or_else(|_| required_str(body, "pass"))?;
        Ok(DeviceCommand::Wifi { ssid, pass })
    }

    /// 设备端路径
    pub fn endpoint(&self) -> &'static str {
        match self {
            DeviceCommand::Ir { .. } => "ir",
            DeviceCommand::Gpio { .. } => "gpio",
            DeviceCommand::Wifi { .. } => "wifi",
        }
    }

    /// GET 命令的查询参数
    pub fn query(&self) -> Vec<(&'static str, String)> {
        match self {
            DeviceCommand::Ir { device, command } => {
                vec![("device", device.clone()), ("command", command.clone())]
            }
            DeviceCommand::Gpio { pin, on } => vec![
                ("pin", pin.to_string()),
                ("state", if *on { "ON" } else { "OFF" }.to_string()),
            ],
            DeviceCommand::Wifi { .. } => Vec::new(),
        }
    }

    /// POST 命令的请求体
    pub fn body(&self) -> Option<Value> {
        match self {
            DeviceCommand::Wifi { ssid, pass } => Some(json!({ "ssid": ssid, "pass": pass })),
            _ => None,
        }
    }
}

impl fmt::Display for DeviceCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceCommand::Ir { device, command } => write!(f, "IR device={} command={}", device, command),
            DeviceCommand::Gpio { pin, on } => {
                write!(f, "GPIO pin={} state={}", pin, if *on { "ON" } else { "OFF" })
            }
            // 不打印密码
            DeviceCommand::Wifi { ssid, .. } => write!(f, "WIFI ssid={}", ssid),
        }
    }
}

fn required_str(body: &Value, key: &str) -> AppResult<String> {
    match body.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(AppError::BadCommand(format!("缺少参数 '{}'", key))),
    }
}
