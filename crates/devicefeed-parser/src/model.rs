use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Event classification carried in the `class` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    Alarm,
    Warning,
    Info,
    Event,
    Comand,
    Waiting,
    Working,
}

impl DeviceClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceClass::Alarm => "alarm",
            DeviceClass::Warning => "warning",
            DeviceClass::Info => "info",
            DeviceClass::Event => "event",
            DeviceClass::Comand => "comand",
            DeviceClass::Waiting => "waiting",
            DeviceClass::Working => "working",
        }
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for DeviceClass {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "alarm" => Ok(DeviceClass::Alarm),
            "warning" => Ok(DeviceClass::Warning),
            "info" => Ok(DeviceClass::Info),
            "event" => Ok(DeviceClass::Event),
            "comand" => Ok(DeviceClass::Comand),
            "waiting" => Ok(DeviceClass::Waiting),
            "working" => Ok(DeviceClass::Working),
            other => Err(format!("unknown class '{other}'")),
        }
    }
}

/// One validated record from a device-event file.
///
/// Optional columns are `None` when the field was empty or missing;
/// empty strings are never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceRecord {
    pub unit_guid: Uuid,
    pub mqtt: Option<String>,
    pub invid: Option<String>,
    pub msg_id: Option<String>,
    pub text: Option<String>,
    pub context: Option<String>,
    pub class: Option<DeviceClass>,
    pub level: Option<i32>,
    pub area: Option<String>,
    pub addr: Option<String>,
    pub block: Option<String>,
    pub kind: Option<String>,
    pub bit: Option<i32>,
    pub invert_bit: Option<bool>,
    /// 1-based physical line number within the source file.
    pub line_number: i32,
}

impl DeviceRecord {
    pub fn new(unit_guid: Uuid, line_number: i32) -> Self {
        Self {
            unit_guid,
            mqtt: None,
            invid: None,
            msg_id: None,
            text: None,
            context: None,
            class: None,
            level: None,
            area: None,
            addr: None,
            block: None,
            kind: None,
            bit: None,
            invert_bit: None,
            line_number,
        }
    }
}
