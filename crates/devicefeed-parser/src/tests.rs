use uuid::Uuid;

use crate::errors::RecordError;
use crate::model::DeviceClass;
use crate::{normalize_separators, parse_document, parse_record};

const UNIT: &str = "01749246-95f6-57db-b7c3-2ae0e8be671f";

fn unit() -> Uuid {
    Uuid::parse_str(UNIT).expect("valid unit guid")
}

#[test]
fn parses_full_device_file() {
    let content = format!(
        "n\tmqtt\tinvid\tunit_guid\tmsg_id\ttext\tcontext\tclass\tlevel\tarea\taddr\n\
         1\t\tG-044322\t{UNIT}\tcold7_Defrost_status\tРазморозка\t\twaiting\t100\tLOCAL\tcold7_status.Defrost_status\n\
         2\t\tG-044322\t{UNIT}\tcold7_VentSK_status\tВентилятор\t\tworking\t100\tLOCAL\tcold7_status.VentSK_status\n"
    );

    let document = parse_document(&content);
    assert!(document.errors.is_empty(), "unexpected errors: {:?}", document.errors);
    assert_eq!(document.records.len(), 2);

    let first = &document.records[0];
    assert_eq!(first.line_number, 2);
    assert_eq!(first.unit_guid, unit());
    assert_eq!(first.mqtt, None);
    assert_eq!(first.invid.as_deref(), Some("G-044322"));
    assert_eq!(first.msg_id.as_deref(), Some("cold7_Defrost_status"));
    assert_eq!(first.text.as_deref(), Some("Разморозка"));
    assert_eq!(first.context, None);
    assert_eq!(first.class, Some(DeviceClass::Waiting));
    assert_eq!(first.level, Some(100));
    assert_eq!(first.area.as_deref(), Some("LOCAL"));
    assert_eq!(first.addr.as_deref(), Some("cold7_status.Defrost_status"));

    let second = &document.records[1];
    assert_eq!(second.line_number, 3);
    assert_eq!(second.class, Some(DeviceClass::Working));
}

#[test]
fn collapses_multi_space_runs_to_tabs() {
    let normalized = normalize_separators("1    alpha  beta\tgamma");
    assert_eq!(normalized, "1\talpha\tbeta\tgamma");
}

#[test]
fn preserves_single_spaces_inside_fields() {
    let normalized = normalize_separators("warm room  second field");
    assert_eq!(normalized, "warm room\tsecond field");
}

#[test]
fn rejects_invalid_unit_guid() {
    let content = "n\tmqtt\tinvid\tunit_guid\n1\t\tG-1\tnot-a-uuid\n";
    let document = parse_document(content);

    assert!(document.records.is_empty());
    assert_eq!(document.errors.len(), 1);

    let error = &document.errors[0];
    assert_eq!(error.line_number, 2);
    assert!(error.error.to_string().contains("invalid unit_guid"));
    assert_eq!(error.error.field(), Some("unit_guid"));
}

#[test]
fn mixed_validity_keeps_good_rows_and_records_bad_ones() {
    let content = format!(
        "n\tmqtt\tinvid\tunit_guid\tmsg_id\ttext\tcontext\tclass\tlevel\n\
         1\t\tG-1\t{UNIT}\tmsg_a\t\t\twaiting\t100\n\
         2\t\tG-1\t{UNIT}\tmsg_b\t\t\twaiting\tabc\n\
         3\t\tG-1\t{UNIT}\tmsg_c\t\t\tINVALID_CLASS\t100\n"
    );

    let document = parse_document(&content);
    assert_eq!(document.records.len(), 1);
    assert_eq!(document.records[0].line_number, 2);
    assert_eq!(document.errors.len(), 2);

    assert!(document.errors[0]
        .error
        .to_string()
        .contains("invalid level (not integer)"));
    assert!(document.errors[1]
        .error
        .to_string()
        .contains("invalid class value"));
}

#[test]
fn skips_comments_and_blank_lines() {
    let content = format!(
        "# device export\n\
         \n\
         1\t\tG-1\t{UNIT}\n\
         \t\t\n\
         # trailing comment\n\
         2\t\tG-1\t{UNIT}\n"
    );

    let document = parse_document(&content);
    assert!(document.errors.is_empty());
    assert_eq!(document.records.len(), 2);
    assert_eq!(document.records[0].line_number, 3);
    assert_eq!(document.records[1].line_number, 6);
}

#[test]
fn header_only_file_yields_empty_document() {
    let document = parse_document("n\tmqtt\tinvid\tunit_guid\n");
    assert!(document.is_empty());
}

#[test]
fn file_without_header_parses_from_first_line() {
    let content = format!("1\t\tG-1\t{UNIT}\n");
    let document = parse_document(&content);
    assert_eq!(document.records.len(), 1);
    assert_eq!(document.records[0].line_number, 1);
}

#[test]
fn only_the_leading_record_is_header_checked() {
    // A later record with a non-numeric sequence field is parsed, not
    // silently dropped as a second header.
    let content = format!("1\t\tG-1\t{UNIT}\nx\t\tG-2\t{UNIT}\n");
    let document = parse_document(&content);
    assert_eq!(document.records.len(), 2);
}

#[test]
fn short_records_report_insufficient_fields() {
    let document = parse_document("1\tonly\tthree\n");
    assert_eq!(document.errors.len(), 1);
    assert_eq!(
        document.errors[0].error,
        RecordError::InsufficientFields { found: 3, min: 4 }
    );
    assert_eq!(document.errors[0].error.field(), None);
}

#[test]
fn class_is_case_insensitive() {
    let fields = ["1", "", "G-1", UNIT, "", "", "", "WAITING"];
    let record = parse_record(&fields, 1).expect("record should parse");
    assert_eq!(record.class, Some(DeviceClass::Waiting));
}

#[test]
fn invert_bit_accepts_the_truthy_and_falsy_sets() {
    for (raw, expected) in [
        ("true", true),
        ("1", true),
        ("yes", true),
        ("TRUE", true),
        ("false", false),
        ("0", false),
        ("no", false),
    ] {
        let fields = [
            "1", "", "", UNIT, "", "", "", "", "", "", "", "", "", "", raw,
        ];
        let record = parse_record(&fields, 1)
            .unwrap_or_else(|err| panic!("invert_bit '{raw}' failed: {err}"));
        assert_eq!(record.invert_bit, Some(expected), "invert_bit '{raw}'");
    }
}

#[test]
fn invert_bit_rejects_garbage() {
    let fields = [
        "1", "", "", UNIT, "", "", "", "", "", "", "", "", "", "", "maybe",
    ];
    let err = parse_record(&fields, 1).expect_err("invert_bit should fail");
    assert!(err.to_string().contains("invalid invert_bit"));
    assert_eq!(err.field(), Some("invert_bit"));
}

#[test]
fn bit_must_be_an_integer() {
    let fields = [
        "1", "", "", UNIT, "", "", "", "", "", "", "", "", "", "7f", "",
    ];
    let err = parse_record(&fields, 1).expect_err("bit should fail");
    assert!(err.to_string().contains("invalid bit (not integer)"));
}

#[test]
fn empty_optional_fields_are_absent() {
    let fields = ["1", " ", "", UNIT, "  ", "", "", "", "", "", "", "", "", "", ""];
    let record = parse_record(&fields, 1).expect("record should parse");
    assert_eq!(record.mqtt, None);
    assert_eq!(record.invid, None);
    assert_eq!(record.msg_id, None);
    assert_eq!(record.class, None);
    assert_eq!(record.level, None);
    assert_eq!(record.bit, None);
    assert_eq!(record.invert_bit, None);
}

#[test]
fn level_accepts_negative_values() {
    let fields = ["1", "", "", UNIT, "", "", "", "", "-5"];
    let record = parse_record(&fields, 1).expect("record should parse");
    assert_eq!(record.level, Some(-5));
}

#[test]
fn device_class_round_trips_through_strings() {
    for class in [
        DeviceClass::Alarm,
        DeviceClass::Warning,
        DeviceClass::Info,
        DeviceClass::Event,
        DeviceClass::Comand,
        DeviceClass::Waiting,
        DeviceClass::Working,
    ] {
        assert_eq!(DeviceClass::try_from(class.as_str()), Ok(class));
    }
    assert!(DeviceClass::try_from("critical").is_err());
}
