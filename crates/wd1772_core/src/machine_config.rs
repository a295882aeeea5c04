/*
    WD1772 Emulation

    Copyright 2026 The WD1772 Emulation Authors

    Permission is hereby granted, free of charge, to any person obtaining a
    copy of this software and associated documentation files (the “Software”),
    to deal in the Software without restriction, including without limitation
    the rights to use, copy, modify, merge, publish, distribute, sublicense,
    and/or sell copies of the Software, and to permit persons to whom the
    Software is furnished to do so, subject to the following conditions:

    The above copyright notice and this permission notice shall be included in
    all copies or substantial portions of the Software.

    THE SOFTWARE IS PROVIDED “AS IS”, WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
    IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
    FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
    AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
    LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
    FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
    DEALINGS IN THE SOFTWARE.

    --------------------------------------------------------------------------

    machine_config.rs

    Configuration of the controller and its drives, read from TOML.
*/

use crate::{
    device_types::fdc::DISK_BYTES_PER_TRACK,
    machine_types::{EngineType, FloppyDriveType},
};
use anyhow::bail;
use serde_derive::Deserialize;

pub const DEFAULT_CPU_HZ: u64 = 8_000_000;
pub const DEFAULT_CYCLES_PER_HBL: u64 = 512;
pub const DEFAULT_RPM: u64 = 300;
pub const MAX_DRIVES: usize = 2;

const fn _default_cpu_hz() -> u64 {
    DEFAULT_CPU_HZ
}
const fn _default_cycles_per_hbl() -> u64 {
    DEFAULT_CYCLES_PER_HBL
}
const fn _default_rpm() -> u64 {
    DEFAULT_RPM
}
const fn _default_track_bytes() -> u16 {
    DISK_BYTES_PER_TRACK
}
const fn _default_false() -> bool {
    false
}
const fn _default_log_len() -> usize {
    100
}

/// Cycles for `track_bytes` byte cells to pass under the head.
#[inline]
pub fn revolution_cycles(cycles_per_byte: u64, track_bytes: u16) -> u64 {
    cycles_per_byte * track_bytes as u64
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct FdcConfig {
    #[serde(default = "_default_cpu_hz")]
    pub cpu_hz: u64,
    #[serde(default = "_default_cycles_per_hbl")]
    pub cycles_per_hbl: u64,
    #[serde(default = "_default_rpm")]
    pub rpm: u64,
    #[serde(default = "_default_track_bytes")]
    pub track_bytes: u16,
    /// Monochrome machines run 11 revolutions before an empty-drive timeout.
    #[serde(default = "_default_false")]
    pub monochrome: bool,
    #[serde(default)]
    pub default_engine: EngineType,
    /// Start each drive at a random rotational position.
    #[serde(default = "_default_false")]
    pub random_start_position: bool,
    #[serde(default = "_default_log_len")]
    pub command_log_len: usize,
}

impl Default for FdcConfig {
    fn default() -> Self {
        Self {
            cpu_hz: DEFAULT_CPU_HZ,
            cycles_per_hbl: DEFAULT_CYCLES_PER_HBL,
            rpm: DEFAULT_RPM,
            track_bytes: DISK_BYTES_PER_TRACK,
            monochrome: false,
            default_engine: EngineType::default(),
            random_start_position: false,
            command_log_len: _default_log_len(),
        }
    }
}

impl FdcConfig {
    #[inline]
    pub fn cycles_per_second(&self) -> u64 {
        self.cpu_hz
    }

    /// Length of one revolution. Always a whole number of byte cells, so the
    /// drives and both engines agree on where the index pulse falls.
    #[inline]
    pub fn cycles_per_revolution(&self) -> u64 {
        revolution_cycles(self.cycles_per_byte(), self.track_bytes)
    }

    #[inline]
    pub fn cycles_per_byte(&self) -> u64 {
        (self.cpu_hz * 60 / self.rpm / self.track_bytes as u64).max(1)
    }

    #[inline]
    pub fn ms_to_cycles(&self, ms: u64) -> u64 {
        self.cpu_hz / 1000 * ms
    }

    #[inline]
    pub fn hbls_per_revolution(&self) -> u64 {
        (self.cycles_per_revolution() / self.cycles_per_hbl).max(1)
    }

    #[inline]
    pub fn ms_to_hbls(&self, ms: u64) -> u64 {
        self.ms_to_cycles(ms) / self.cycles_per_hbl
    }

    /// Scanlines needed for `bytes` to pass under the head, at least one.
    pub fn bytes_to_hbls(&self, bytes: u64) -> u64 {
        (bytes * self.cycles_per_byte() / self.cycles_per_hbl).max(1)
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct FloppyDriveConfig {
    #[serde(rename = "type", default)]
    pub drive_type: FloppyDriveType,
    #[serde(default = "_default_false")]
    pub write_protect: bool,
}

fn _default_drives() -> Vec<FloppyDriveConfig> {
    vec![FloppyDriveConfig::default(), FloppyDriveConfig::default()]
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct MachineFdcConfig {
    #[serde(default)]
    pub fdc: FdcConfig,
    #[serde(default = "_default_drives")]
    pub drive: Vec<FloppyDriveConfig>,
}

impl Default for MachineFdcConfig {
    fn default() -> Self {
        Self {
            fdc: FdcConfig::default(),
            drive: _default_drives(),
        }
    }
}

/// Parse a TOML configuration string.
pub fn read_config(toml_string: impl AsRef<str>) -> Result<MachineFdcConfig, anyhow::Error> {
    let config: MachineFdcConfig = toml::from_str(toml_string.as_ref())?;

    if config.fdc.cpu_hz == 0 || config.fdc.rpm == 0 || config.fdc.track_bytes == 0 || config.fdc.cycles_per_hbl == 0 {
        bail!("cpu_hz, rpm, track_bytes and cycles_per_hbl must be non-zero");
    }
    if config.drive.is_empty() || config.drive.len() > MAX_DRIVES {
        bail!("between 1 and {} drives must be configured", MAX_DRIVES);
    }
    log::debug!("read_config(): {:?}", config);
    Ok(config)
}

/// Read and parse a TOML configuration file.
pub fn read_config_file(path: impl AsRef<std::path::Path>) -> Result<MachineFdcConfig, anyhow::Error> {
    let toml_string = std::fs::read_to_string(path)?;
    read_config(toml_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = read_config("").unwrap();
        assert_eq!(config, MachineFdcConfig::default());
        assert_eq!(config.fdc.cycles_per_byte(), 256);
        assert_eq!(config.fdc.hbls_per_revolution(), 3125);
        assert_eq!(config.fdc.ms_to_cycles(15), 120_000);
    }

    #[test]
    fn test_parse_config() {
        let config = read_config(
            r#"
            [fdc]
            cpu_hz = 8021247
            monochrome = true
            default_engine = "legacy"

            [[drive]]
            type = "single_sided"
            write_protect = true
            "#,
        )
        .unwrap();
        assert_eq!(config.fdc.cpu_hz, 8021247);
        assert!(config.fdc.monochrome);
        assert_eq!(config.fdc.default_engine, EngineType::Legacy);
        assert_eq!(config.drive.len(), 1);
        assert_eq!(config.drive[0].drive_type, FloppyDriveType::SingleSided);
        assert!(config.drive[0].write_protect);
    }

    #[test]
    fn test_revolution_is_whole_byte_cells() {
        let config = read_config("[fdc]\ncpu_hz = 8021247\n").unwrap();
        let fdc = &config.fdc;
        assert_eq!(fdc.cycles_per_byte(), 256);
        assert_eq!(fdc.cycles_per_revolution(), 1_600_000);
        assert_eq!(fdc.cycles_per_revolution(), revolution_cycles(fdc.cycles_per_byte(), fdc.track_bytes));
        assert_eq!(fdc.hbls_per_revolution() * fdc.cycles_per_hbl, fdc.cycles_per_revolution());
    }

    #[test]
    fn test_reject_bad_config() {
        assert!(read_config("[fdc]\nrpm = 0\n").is_err());
        assert!(read_config("[fdc]\ndefault_engine = \"turbo\"\n").is_err());
    }
}
