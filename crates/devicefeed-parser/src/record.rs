use uuid::Uuid;

use crate::errors::RecordError;
use crate::model::{DeviceClass, DeviceRecord};

/// Columns, by index: 0=sequence, 1=mqtt, 2=invid, 3=unit_guid,
/// 4=msg_id, 5=text, 6=context, 7=class, 8=level, 9=area, 10=addr,
/// 11=block, 12=type, 13=bit, 14=invert_bit.
const MIN_FIELDS: usize = 4;

const IDX_MQTT: usize = 1;
const IDX_INVID: usize = 2;
const IDX_UNIT_GUID: usize = 3;
const IDX_MSG_ID: usize = 4;
const IDX_TEXT: usize = 5;
const IDX_CONTEXT: usize = 6;
const IDX_CLASS: usize = 7;
const IDX_LEVEL: usize = 8;
const IDX_AREA: usize = 9;
const IDX_ADDR: usize = 10;
const IDX_BLOCK: usize = 11;
const IDX_TYPE: usize = 12;
const IDX_BIT: usize = 13;
const IDX_INVERT_BIT: usize = 14;

/// Validate one record against the strict positional layout.
pub fn parse_record(fields: &[&str], line_number: i32) -> Result<DeviceRecord, RecordError> {
    if fields.len() < MIN_FIELDS {
        return Err(RecordError::InsufficientFields {
            found: fields.len(),
            min: MIN_FIELDS,
        });
    }

    let guid_str = fields[IDX_UNIT_GUID].trim();
    let unit_guid = Uuid::parse_str(guid_str).map_err(|_| RecordError::InvalidUnitGuid {
        value: guid_str.to_string(),
    })?;

    let mut record = DeviceRecord::new(unit_guid, line_number);
    record.mqtt = optional_string(fields, IDX_MQTT);
    record.invid = optional_string(fields, IDX_INVID);
    record.msg_id = optional_string(fields, IDX_MSG_ID);
    record.text = optional_string(fields, IDX_TEXT);
    record.context = optional_string(fields, IDX_CONTEXT);

    if let Some(value) = optional_field(fields, IDX_CLASS) {
        let class =
            DeviceClass::try_from(value).map_err(|_| RecordError::InvalidClass {
                value: value.to_string(),
            })?;
        record.class = Some(class);
    }

    if let Some(value) = optional_field(fields, IDX_LEVEL) {
        let level = value.parse::<i32>().map_err(|_| RecordError::InvalidLevel {
            value: value.to_string(),
        })?;
        record.level = Some(level);
    }

    record.area = optional_string(fields, IDX_AREA);
    record.addr = optional_string(fields, IDX_ADDR);
    record.block = optional_string(fields, IDX_BLOCK);
    record.kind = optional_string(fields, IDX_TYPE);

    if let Some(value) = optional_field(fields, IDX_BIT) {
        let bit = value.parse::<i32>().map_err(|_| RecordError::InvalidBit {
            value: value.to_string(),
        })?;
        record.bit = Some(bit);
    }

    if let Some(value) = optional_field(fields, IDX_INVERT_BIT) {
        record.invert_bit = Some(parse_invert_bit(value)?);
    }

    Ok(record)
}

fn optional_field<'a>(fields: &[&'a str], index: usize) -> Option<&'a str> {
    fields
        .get(index)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
}

fn optional_string(fields: &[&str], index: usize) -> Option<String> {
    optional_field(fields, index).map(|value| value.to_string())
}

fn parse_invert_bit(value: &str) -> Result<bool, RecordError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" | "" => Ok(false),
        _ => Err(RecordError::InvalidInvertBit {
            value: value.to_string(),
        }),
    }
}
