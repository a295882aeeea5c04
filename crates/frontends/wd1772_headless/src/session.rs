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

    session.rs

    A scripted disk session: read every sector through the controller, then
    optionally reformat every track and read it back.
*/

use anyhow::{anyhow, bail, Error};
use wd1772_core::{
    device_types::fdc::{write_track_stream, TrackLayout, DEFAULT_SECTOR_SIZE},
    devices::fdc::{controller::*, registers::*},
    machine::FloppySystem,
};

/// Revolutions any one command may take before the session gives up on it.
const COMMAND_REVOLUTIONS: u64 = 12;
const FORMAT_FILL: u8 = 0xE5;

#[derive(Copy, Clone, Debug)]
pub struct Geometry {
    pub sides: u8,
    pub tracks: u8,
    pub sectors: u8,
}

#[derive(Debug, Default)]
pub struct SessionReport {
    pub sectors_read: usize,
    pub read_errors: usize,
    pub tracks_formatted: usize,
    pub verify_errors: usize,
    /// Every sector's data in side-interleaved track order. Failed reads are zero filled.
    pub data: Vec<u8>,
}

pub struct Session<'a> {
    sys: &'a mut FloppySystem,
    geometry: Geometry,
    report: SessionReport,
}

impl<'a> Session<'a> {
    pub fn new(sys: &'a mut FloppySystem, geometry: Geometry) -> Self {
        Self {
            sys,
            geometry,
            report: SessionReport::default(),
        }
    }

    fn command(&mut self, command: u8) -> Result<u8, Error> {
        self.sys.write_register(LINE_STATUS_COMMAND, command);
        let limit = COMMAND_REVOLUTIONS * self.sys.config().cycles_per_revolution();
        if !self.sys.run_while_busy(limit) {
            bail!(
                "command {:02X} still busy after {} revolutions ({})",
                command,
                COMMAND_REVOLUTIONS,
                self.sys.fdc().phase_name()
            );
        }
        // Acknowledge the interrupt.
        Ok(self.sys.read_register(LINE_STATUS_COMMAND))
    }

    fn seek(&mut self, track: u8) -> Result<(), Error> {
        self.sys.write_register(LINE_DATA, track);
        let status = self.command(0x14)?;
        if status & STR_SEEK_ERROR != 0 {
            bail!("seek to track {} failed, status {:02X}", track, status);
        }
        Ok(())
    }

    fn read_sector(&mut self, sector: u8) -> Result<Vec<u8>, u8> {
        let dma = self.sys.dma_mut();
        dma.clear();
        dma.set_sector_count(1);
        self.sys.write_register(LINE_SECTOR, sector);
        let status = self.command(0x80).map_err(|_| STR_RECORD_NOT_FOUND)?;
        if status & (STR_RECORD_NOT_FOUND | STR_CRC_ERROR) != 0 {
            return Err(status);
        }
        Ok(self.sys.dma_mut().take_received())
    }

    pub fn run(mut self, format: bool) -> Result<SessionReport, Error> {
        self.sys.select(Some(0), 0);
        let status = self.command(0x00)?;
        if status & STR_TRACK0 == 0 {
            bail!("restore did not reach track 0, status {:02X}", status);
        }
        log::info!(
            "Reading {} track(s), {} side(s), {} sectors per track",
            self.geometry.tracks,
            self.geometry.sides,
            self.geometry.sectors
        );
        self.read_all()?;
        if format {
            self.format_all()?;
        }
        Ok(self.report)
    }

    fn read_all(&mut self) -> Result<(), Error> {
        for track in 0..self.geometry.tracks {
            self.seek(track)?;
            for side in 0..self.geometry.sides {
                self.sys.select(Some(0), side);
                for sector in 1..=self.geometry.sectors {
                    match self.read_sector(sector) {
                        Ok(data) => {
                            self.report.sectors_read += 1;
                            self.report.data.extend(data);
                        }
                        Err(status) => {
                            log::warn!(
                                "side {} track {} sector {}: read failed, status {:02X}",
                                side,
                                track,
                                sector,
                                status
                            );
                            self.report.read_errors += 1;
                            self.report.data.extend([0; DEFAULT_SECTOR_SIZE]);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn format_all(&mut self) -> Result<(), Error> {
        let layout = TrackLayout::for_sectors(self.geometry.sectors as usize);
        let fill = [FORMAT_FILL; DEFAULT_SECTOR_SIZE];
        for track in 0..self.geometry.tracks {
            self.seek(track)?;
            for side in 0..self.geometry.sides {
                self.sys.select(Some(0), side);
                let sectors: Vec<(u8, &[u8])> = (1..=self.geometry.sectors).map(|n| (n, &fill[..])).collect();
                let dma = self.sys.dma_mut();
                dma.clear();
                dma.queue_write_data(&write_track_stream(&layout, track, side, &sectors));

                let status = self.command(0xF0)?;
                if status & STR_WRITE_PROTECT != 0 {
                    return Err(anyhow!("disk is write protected"));
                }
                self.report.tracks_formatted += 1;

                for sector in 1..=self.geometry.sectors {
                    match self.read_sector(sector) {
                        Ok(data) if data.iter().all(|&b| b == FORMAT_FILL) => {}
                        Ok(_) => {
                            log::warn!("side {} track {} sector {}: verify mismatch", side, track, sector);
                            self.report.verify_errors += 1;
                        }
                        Err(status) => {
                            log::warn!(
                                "side {} track {} sector {}: verify failed, status {:02X}",
                                side,
                                track,
                                sector,
                                status
                            );
                            self.report.verify_errors += 1;
                        }
                    }
                }
            }
        }
        Ok(())
    }
}
