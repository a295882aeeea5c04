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

    error.rs

    Host-side errors. Failures the emulated program can observe are status
    register bits and never surface here.
*/

use crate::device_types::fdc::TrackGranularity;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FdcError {
    #[error("disk image is write protected")]
    WriteProtected,
    #[error("sector {sector} not found on side {side} track {track}")]
    SectorNotFound { side: u8, track: u8, sector: u8 },
    #[error("no sector is selected")]
    NoSectorSelected,
    #[error("read or write past the end of the sector")]
    EndOfSector,
    #[error("side {side} track {track} is outside the image")]
    TrackOutOfRange { side: u8, track: u8 },
    #[error("operation not supported by a {0}-granular image")]
    Unsupported(TrackGranularity),
    #[error("image size {0} does not match a known disk geometry")]
    UnknownGeometry(usize),
    #[error("drive {0} does not exist")]
    InvalidDrive(usize),
}
