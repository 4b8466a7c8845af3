mod common;
use common::*;
use growatt_client::client::GrowattClient;
use growatt_client::prelude::*;
use growatt_client::register::{Encoding, Registry};
use std::io::Write;
use std::sync::Arc;

fn table_file(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn loads_a_firmware_table() {
    common_setup();

    let file = table_file(
        r#"
attributes:
  - name: grid_voltage
    pos: 38
    type: single_byte
    unit: V
    description: Grid voltage
  - name: export_to_grid
    offset: 1029
    scale: 0.0001
    unit: kW
  - name: last_update
    offset: -1
    encoding: int
    scale: 1
derived:
  - name: exporting
    unit: ""
    template: >
      1 if {export_to_grid} > 0
      else 0
"#,
    );

    let registry = Registry::from_file(file.path()).unwrap();
    assert_eq!(registry.attributes()[0].encoding, Encoding::Scaled16);
    assert_eq!(registry.attributes()[1].encoding, Encoding::Scaled32);
    assert_eq!(registry.derived()[0].formula, "1 if {export_to_grid} > 0 else 0");

    let spans: Vec<(i32, u16)> = registry.groups().iter().map(|g| (g.start, g.length)).collect();
    assert_eq!(spans, vec![(38, 1), (1029, 2), (-1, 0)]);
}

#[test]
fn unknown_reference_is_rejected() {
    common_setup();

    let file = table_file(
        r#"
attributes:
  - name: a
    offset: 1
derived:
  - name: b
    formula: "{a} + {missing}"
"#,
    );

    assert!(matches!(
        Registry::from_file(file.path()),
        Err(Error::Configuration(_))
    ));
}

#[test]
fn unreadable_file_is_a_configuration_error() {
    common_setup();

    assert!(matches!(
        Registry::from_file("/nonexistent/registers.yaml"),
        Err(Error::Configuration(_))
    ));
}

#[tokio::test]
async fn polls_with_a_loaded_table() {
    common_setup();

    let file = table_file(
        r#"
attributes:
  - name: export_to_grid
    offset: 1029
    scale: 0.0001
    unit: kW
derived:
  - name: exporting
    formula: "1 if {export_to_grid} > 0 else 0"
"#,
    );
    let registry = Arc::new(Registry::from_file(file.path()).unwrap());

    let transport = MockTransport::new()
        .with_identity(Factory::identity_words())
        .with_input(1029, vec![0, 25000]);
    let mut client = GrowattClient::new(transport, 2, registry);

    let snapshot = client.poll().await.unwrap();
    assert_eq!(snapshot.get("export_to_grid"), Some(2.5));
    assert_eq!(snapshot.get("exporting"), Some(1.0));
    assert_eq!(client.transport().input_reads, vec![(1029, 2, 2)]);
}

#[test]
fn reference_table_lists_the_builtin_registers() {
    common_setup();

    let table = growatt_client::growatt::registry().unwrap().markdown_table();
    assert!(table.starts_with("| Attribute | Register | Unit | Calculated | Description | Misc |"));
    assert!(table.contains("| battery_voltage | 1013 | V | | Battery voltage | |"));
    assert!(table.contains(
        "| self_consumption | - | kW | &check; | Self Consumption | \
         {consumption} if {export_to_grid} > 0 else {system_production} |"
    ));
    // header, separator and one row per attribute
    assert_eq!(table.lines().count(), 2 + 35 + 8);
}
