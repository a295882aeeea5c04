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

    devices::image::mod.rs

    The DiskImage trait is the boundary between the drive and its media.
    
    Backends differ in how much of the track they store. Sector backends hold
    only ID fields and sector contents and are served by the legacy engine.
    Bit backends hold one MFM word per byte cell and flux backends hold
    transition intervals; both are served by the cycle engine.
*/

pub mod flux_image;
pub mod mfm_image;
pub mod sector_image;

pub use flux_image::FluxTrackImage;
pub use mfm_image::MfmTrackImage;
pub use sector_image::{Sector, SectorImage};

use crate::{
    device_types::fdc::{IdField, TrackGranularity, DISK_BYTES_PER_TRACK},
    devices::fdc::dpll::FluxSource,
    error::FdcError,
    machine_types::ImageBackend,
};

pub trait DiskImage {
    fn granularity(&self) -> TrackGranularity;
    fn sides(&self) -> u8;
    fn tracks(&self) -> u8;
    fn write_protected(&self) -> bool;
    fn set_write_protected(&mut self, state: bool);

    fn track_bytes(&self) -> u16 {
        DISK_BYTES_PER_TRACK
    }

    // Sector level access.

    /// ID fields of a track in rotational order. The format area, if the
    /// track was rewritten, takes precedence.
    fn id_fields(&self, _side: u8, _track: u8) -> Vec<IdField> {
        Vec::new()
    }

    /// Position the byte cursor at the start of a sector's data.
    fn seek_sector(&mut self, _side: u8, _track: u8, _sector: u8, _from_format: bool) -> Result<(), FdcError> {
        Err(FdcError::Unsupported(self.granularity()))
    }

    /// Data length of the sector selected by the last seek.
    fn sector_length(&self) -> usize {
        0
    }

    fn read_byte(&mut self) -> Result<u8, FdcError> {
        Err(FdcError::Unsupported(self.granularity()))
    }

    fn write_byte(&mut self, _byte: u8) -> Result<(), FdcError> {
        Err(FdcError::Unsupported(self.granularity()))
    }

    /// Start rewriting a track: its format area becomes empty.
    fn format_track(&mut self, _side: u8, _track: u8) -> Result<(), FdcError> {
        Err(FdcError::Unsupported(self.granularity()))
    }

    /// Add a sector to a track's format area.
    fn format_sector(&mut self, _side: u8, _track: u8, _id: IdField) -> Result<(), FdcError> {
        Err(FdcError::Unsupported(self.granularity()))
    }

    // Bit level access.

    fn load_track(&mut self, _side: u8, _track: u8) {}

    /// MFM word of the byte cell at `position` on the loaded track.
    fn mfm_word(&mut self, _position: u16) -> u16 {
        0
    }

    fn set_mfm_word(&mut self, _position: u16, _word: u16) {}

    // Flux level access.

    /// Position the flux cursor `cycles` after the index pulse.
    fn seek_flux(&mut self, _cycles: u64) {}

    /// Cycles from the previous transition to the next one, advancing the
    /// cursor. None if the track has no flux.
    fn next_transition(&mut self) -> Option<u32> {
        None
    }
}

/// Feeds the DPLL from a mounted image.
pub struct ImageFlux<'a>(pub &'a mut dyn DiskImage);

impl FluxSource for ImageFlux<'_> {
    fn next_transition(&mut self) -> Option<u32> {
        self.0.next_transition()
    }
}

/// Build an image of the requested backend from a raw sector dump.
pub fn image_from_raw(
    data: &[u8],
    backend: ImageBackend,
    cycles_per_byte: u64,
) -> Result<Box<dyn DiskImage>, FdcError> {
    let sectors = SectorImage::from_raw(data)?;
    Ok(match backend {
        ImageBackend::Sector => Box::new(sectors),
        ImageBackend::Mfm => Box::new(MfmTrackImage::from_sector_image(&sectors)),
        ImageBackend::Flux => Box::new(FluxTrackImage::from_mfm_image(
            &MfmTrackImage::from_sector_image(&sectors),
            cycles_per_byte,
        )),
    })
}
