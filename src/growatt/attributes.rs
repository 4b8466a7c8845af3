//! Input register layout from "Growatt PV Inverter Modbus RS485 RTU Protocol
//! V3.14 2016-09-27". Which registers an inverter actually populates depends
//! on its firmware; other firmware families load their own table from a file.

use crate::register::{AttributeDef, DerivedAttributeDef, Encoding};

use Encoding::*;

const VOLT: &str = "V";
const KILO_WATT: &str = "kW";
const KILO_WATT_HOUR: &str = "kWh";
const HERTZ: &str = "Hz";
const CELSIUS: &str = "°C";
const PERCENT: &str = "%";
const TIMESTAMP: &str = "ts";

fn energy(name: &str, offset: i32, description: &str) -> AttributeDef {
    AttributeDef::new(name, offset, KILO_WATT_HOUR, description)
}

fn power(name: &str, offset: i32, description: &str) -> AttributeDef {
    AttributeDef::new(name, offset, KILO_WATT, description).encoded(Scaled32, 0.0001)
}

fn single(name: &str, offset: i32, unit: &str, description: &str, scale: f64) -> AttributeDef {
    AttributeDef::new(name, offset, unit, description).encoded(Scaled16, scale)
}

pub fn attributes() -> Vec<AttributeDef> {
    vec![
        // photovoltaics
        power("photovoltaics_1", 5, "Photovoltaics (PV) 1"),
        single("photovoltaics_1_voltage", 3, VOLT, "Photovoltaics (PV) 1 voltage", 0.1),
        energy("photovoltaics_1_today", 59, "Photovoltaics (PV) 1 today"),
        energy("photovoltaics_1_lifetime", 61, "Photovoltaics (PV) 1 total"),
        power("photovoltaics_2", 9, "Photovoltaics (PV) 2"),
        single("photovoltaics_2_voltage", 7, VOLT, "Photovoltaics (PV) 2 voltage", 0.1),
        energy("photovoltaics_2_today", 63, "Photovoltaics (PV) 2 today"),
        energy("photovoltaics_2_lifetime", 65, "Photovoltaics (PV) 2 total"),
        power("photovoltaics", 1, "Photovoltaics (PV) generation"),
        energy("photovoltaics_lifetime", 91, "Photovoltaics (PV) generation total"),
        // battery
        AttributeDef::new(
            "statement_of_charge",
            1014,
            PERCENT,
            "Statement of charge (SOC), capacity",
        )
        .encoded(Int, 1.0),
        single("battery_voltage", 1013, VOLT, "Battery voltage", 0.1),
        power("battery_charge", 1011, "Battery charging"),
        energy("battery_charge_today", 1056, "Battery charged today"),
        energy("battery_charge_lifetime", 1058, "Battery charged total"),
        power("battery_discharge", 1009, "Battery discharging"),
        energy("battery_discharge_today", 1052, "Battery discharged today"),
        energy("battery_discharge_lifetime", 1054, "Battery discharged total"),
        // load
        power("local_load", 1037, "Inverter local load"),
        energy("local_load_today", 1060, "Inverter local load today"),
        energy("local_load_lifetime", 1062, "Inverter local load total"),
        // grid
        power("export_to_grid", 1029, "Export to grid"),
        energy("export_to_grid_today", 1048, "Export to grid today"),
        energy("export_to_grid_lifetime", 1050, "Export to grid total"),
        power("import_from_grid", 1021, "Import from grid"),
        energy("import_from_grid_today", 1044, "Import from grid today"),
        energy("import_from_grid_lifetime", 1046, "Import from grid total"),
        energy(
            "system_production_with_battery_today",
            1137,
            "System production today (including battery)",
        ),
        energy(
            "system_production_with_battery_lifetime",
            1139,
            "System production total (including battery)",
        ),
        single("grid_voltage", 38, VOLT, "Grid voltage", 0.1),
        single("grid_frequency", 37, HERTZ, "Grid frequency", 0.01),
        // temperatures
        single("inverter_temperature_1", 93, CELSIUS, "Inverter temperature", 0.1),
        single(
            "inverter_temperature_2",
            94,
            CELSIUS,
            "The inside IPM in inverter Temperature",
            0.1,
        ),
        single("inverter_temperature_3", 1040, CELSIUS, "Battery temperature", 0.1),
        // host side
        AttributeDef::new("last_update", -1, TIMESTAMP, "Last update").encoded(Int, 1.0),
    ]
}

pub fn derived() -> Vec<DerivedAttributeDef> {
    vec![
        DerivedAttributeDef::new(
            "photovoltaics_today",
            KILO_WATT_HOUR,
            "Photovoltaics (PV) generation today",
            "{photovoltaics_2_today} + {photovoltaics_1_today}",
        ),
        DerivedAttributeDef::new(
            "consumption",
            KILO_WATT,
            "Consumption",
            "{photovoltaics} + {battery_discharge} + {import_from_grid} \
             - {export_to_grid} - {battery_charge}",
        ),
        DerivedAttributeDef::new(
            "consumption_today",
            KILO_WATT_HOUR,
            "Consumption today",
            "{photovoltaics_today} + {battery_discharge_today} + {import_from_grid_today} \
             - {export_to_grid_today} - {battery_charge_today}",
        ),
        DerivedAttributeDef::new(
            "consumption_lifetime",
            KILO_WATT_HOUR,
            "Consumption total",
            "{photovoltaics_lifetime} + {battery_discharge_lifetime} \
             + {import_from_grid_lifetime} - {export_to_grid_lifetime} \
             - {battery_charge_lifetime}",
        ),
        DerivedAttributeDef::new(
            "system_production",
            KILO_WATT,
            "System Production",
            "{photovoltaics} + {battery_discharge} - {battery_charge}",
        ),
        DerivedAttributeDef::new(
            "system_production_today",
            KILO_WATT_HOUR,
            "System Production today",
            "{photovoltaics_today} + {battery_discharge_today} - {battery_charge_today}",
        ),
        DerivedAttributeDef::new(
            "system_production_lifetime",
            KILO_WATT_HOUR,
            "System Production total",
            "{photovoltaics_lifetime} + {battery_discharge_lifetime} \
             - {battery_charge_lifetime}",
        ),
        DerivedAttributeDef::new(
            "self_consumption",
            KILO_WATT,
            "Self Consumption",
            "{consumption} if {export_to_grid} > 0 else {system_production}",
        ),
    ]
}
