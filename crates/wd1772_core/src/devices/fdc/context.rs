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

    devices::fdc::context.rs

    Everything outside the chip that a controller step may touch, lent to
    the engines for the duration of one call.
*/

use crate::{
    devices::{dma::DmaChannel, floppy_drive::FloppyDiskDrive},
    interrupt::InterruptLine,
    machine_config::FdcConfig,
    scheduler::Scheduler,
};

/// Drive select and side select outputs of the machine's I/O port.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct DriveSelect {
    /// None when no drive, or more than one, is selected.
    pub drive: Option<usize>,
    pub side: u8,
}

pub struct FdcContext<'a> {
    pub now: u64,
    pub config: &'a FdcConfig,
    pub drives: &'a mut [FloppyDiskDrive],
    pub select: DriveSelect,
    pub dma: &'a mut dyn DmaChannel,
    pub irq: &'a mut dyn InterruptLine,
    pub scheduler: &'a mut dyn Scheduler,
}

impl FdcContext<'_> {
    /// The selected drive, if it exists.
    pub fn drive(&mut self) -> Option<&mut FloppyDiskDrive> {
        let n = self.select.drive?;
        self.drives.get_mut(n)
    }

    pub fn drive_ref(&self) -> Option<&FloppyDiskDrive> {
        self.select.drive.and_then(|n| self.drives.get(n))
    }

    /// The selected drive, if it holds a disk.
    pub fn loaded_drive(&mut self) -> Option<&mut FloppyDiskDrive> {
        self.drive().filter(|d| !d.is_empty())
    }

    #[inline]
    pub fn side(&self) -> u8 {
        self.select.side
    }

    /// Track under the selected drive's head.
    pub fn current_track(&self) -> u8 {
        self.drive_ref().map_or(0, |d| d.track())
    }

    /// Track-0 sensor of the selected drive.
    pub fn track0(&self) -> bool {
        self.drive_ref().is_some_and(|d| d.track0())
    }

    pub fn write_protected(&self) -> bool {
        self.drive_ref().is_some_and(|d| d.write_protected())
    }

    /// Drive the motor line of the selected drive.
    pub fn set_motor(&mut self, state: bool) {
        let now = self.now;
        if let Some(drive) = self.drive() {
            drive.motor(state, now);
        }
        else {
            log::trace!("FdcContext: motor {} with no drive selected", state);
        }
    }
}
