//! C sources for tests that drive a real compiler.

use std::path::{Path, PathBuf};

/// Header of the thermostat fixture unit.
pub const THERMOSTAT_H: &str = r#"#ifndef THERMOSTAT_H
#define THERMOSTAT_H

int read_adc(int channel);
void heater_set(int on);

int thermostat_step(int channel, int setpoint);

#endif
"#;

/// Implementation of the thermostat fixture unit. `read_adc` and
/// `heater_set` are only declared; tests provide them as mocks.
pub const THERMOSTAT_C: &str = r#"#include "thermostat_test.h"

int thermostat_step(int channel, int setpoint)
{
    int value = read_adc(channel);
    int on = value < setpoint;
    heater_set(on);
    return on;
}
"#;

/// Implementation that does not compile.
pub const BROKEN_C: &str = r#"#include "thermostat_test.h"

int thermostat_step(int channel, int setpoint)
{
    return channel +
}
"#;

/// Extern declarations mocked by the thermostat fixture.
pub const THERMOSTAT_EXTERNS: &[&str] = &["int read_adc(int channel);", "void heater_set(int on);"];

/// Write the thermostat unit (with `source` as its implementation) into
/// `dir` as `thermostat_test.c` / `.h` and return the path a test module
/// paired with it would have.
pub fn write_thermostat(dir: &Path, source: &str) -> PathBuf {
    std::fs::write(dir.join("thermostat_test.h"), THERMOSTAT_H).unwrap();
    std::fs::write(dir.join("thermostat_test.c"), source).unwrap();
    dir.join("thermostat_test.rs")
}
