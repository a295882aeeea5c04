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

    machine_types.rs

    Enumerations used by the configuration layer.
*/

use std::{fmt, fmt::Display, str::FromStr};

use serde::Deserialize;

/// Highest cylinder the head can reach.
pub const DRIVE_MAX_CYLINDER: u8 = 83;

#[derive(Copy, Clone, Default, Debug, Hash, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FloppyDriveType {
    SingleSided,
    #[default]
    DoubleSided,
}

impl FloppyDriveType {
    pub fn sides(&self) -> u8 {
        match self {
            FloppyDriveType::SingleSided => 1,
            FloppyDriveType::DoubleSided => 2,
        }
    }

    pub fn max_cylinder(&self) -> u8 {
        DRIVE_MAX_CYLINDER
    }
}

impl Display for FloppyDriveType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FloppyDriveType::SingleSided => write!(f, "SF354 (single sided)"),
            FloppyDriveType::DoubleSided => write!(f, "SF314 (double sided)"),
        }
    }
}

impl FromStr for FloppyDriveType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, String>
    where
        Self: Sized,
    {
        match s.to_lowercase().as_str() {
            "single_sided" | "ss" | "sf354" => Ok(FloppyDriveType::SingleSided),
            "double_sided" | "ds" | "sf314" => Ok(FloppyDriveType::DoubleSided),
            _ => Err("Bad value for FloppyDriveType".to_string()),
        }
    }
}

/// Which timing model serves a command.
#[derive(Copy, Clone, Default, Debug, Hash, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineType {
    /// Cycle-accurate state machine over bit or flux level tracks.
    #[default]
    Cycle,
    /// Scanline-granular agenda model over sector images.
    Legacy,
}

impl Display for EngineType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EngineType::Cycle => write!(f, "cycle"),
            EngineType::Legacy => write!(f, "legacy"),
        }
    }
}

impl FromStr for EngineType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, String>
    where
        Self: Sized,
    {
        match s.to_lowercase().as_str() {
            "cycle" | "wd1772" => Ok(EngineType::Cycle),
            "legacy" => Ok(EngineType::Legacy),
            _ => Err("Bad value for EngineType".to_string()),
        }
    }
}

/// Disk image backend to mount a raw sector dump through.
#[derive(Copy, Clone, Default, Debug, Hash, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageBackend {
    #[default]
    Sector,
    Mfm,
    Flux,
}

impl FromStr for ImageBackend {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, String>
    where
        Self: Sized,
    {
        match s.to_lowercase().as_str() {
            "sector" | "st" => Ok(ImageBackend::Sector),
            "mfm" | "stw" => Ok(ImageBackend::Mfm),
            "flux" | "scp" => Ok(ImageBackend::Flux),
            _ => Err("Bad value for ImageBackend".to_string()),
        }
    }
}
