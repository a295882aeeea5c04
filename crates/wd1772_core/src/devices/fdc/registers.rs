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

    devices::fdc::registers.rs

    Register file, status bits and command decoding of the WD1772.
*/

use modular_bitfield::{bitfield, prelude::*};

// Status register bits. Bits 1, 2, 4 and 5 change meaning with the command type.
pub const STR_BUSY: u8 = 0x01;
pub const STR_DRQ: u8 = 0x02; // Type II/III
pub const STR_INDEX: u8 = 0x02; // Type I
pub const STR_LOST_DATA: u8 = 0x04; // Type II/III; never set
pub const STR_TRACK0: u8 = 0x04; // Type I
pub const STR_CRC_ERROR: u8 = 0x08;
pub const STR_RECORD_NOT_FOUND: u8 = 0x10; // Type II/III
pub const STR_SEEK_ERROR: u8 = 0x10; // Type I
pub const STR_RECORD_TYPE: u8 = 0x20; // Type II/III
pub const STR_SPUN_UP: u8 = 0x20; // Type I
pub const STR_WRITE_PROTECT: u8 = 0x40;
pub const STR_MOTOR_ON: u8 = 0x80;

// Command register flags.
pub const CR_R0: u8 = 0x01;
pub const CR_R1: u8 = 0x02;
pub const CR_A0: u8 = 0x01; // write deleted data mark
pub const CR_V: u8 = 0x04; // verify
pub const CR_E: u8 = 0x04; // settle delay
pub const CR_H: u8 = 0x08; // disable spin-up
pub const CR_U: u8 = 0x10; // update track register
pub const CR_M: u8 = 0x10; // multiple sectors
pub const CR_I2: u8 = 0x04; // interrupt at each index pulse
pub const CR_I3: u8 = 0x08; // interrupt immediately
pub const CR_STEP: u8 = 0x60;
pub const CR_STEP_IN: u8 = 0x40;
pub const CR_STEP_OUT: u8 = 0x60;
pub const CR_SEEK: u8 = 0x10;
pub const CR_TYPEII_WRITE: u8 = 0x20;
pub const CR_TYPEIII_WRITE: u8 = 0x10;
pub const CR_READ_ADDRESS: u8 = 0xC0;
pub const CR_READ_TRACK: u8 = 0xE0;
pub const CR_WRITE_TRACK: u8 = 0xF0;
pub const CR_FORCE_INTERRUPT: u8 = 0xD0;

/// Step rates in milliseconds, indexed by r1r0.
pub const STEP_RATES_MS: [u64; 4] = [6, 12, 2, 3];
pub const HEAD_SETTLE_MS: u64 = 15;

/// Interrupt condition of a Force Interrupt that fires immediately.
pub const INT_COND_IMMEDIATE: u8 = 8;
/// Interrupt condition of a Force Interrupt that fires at each index pulse.
pub const INT_COND_INDEX: u8 = 4;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CommandType {
    TypeI,
    TypeII,
    TypeIII,
    TypeIV,
}

impl CommandType {
    pub fn decode(command: u8) -> Self {
        if command & 0x80 == 0 {
            CommandType::TypeI
        }
        else if command & 0x40 == 0 {
            CommandType::TypeII
        }
        else if command & 0xF0 == CR_FORCE_INTERRUPT {
            CommandType::TypeIV
        }
        else {
            CommandType::TypeIII
        }
    }

    #[inline]
    pub fn is_data_transfer(&self) -> bool {
        matches!(self, CommandType::TypeII | CommandType::TypeIII)
    }
}

/// True for Write Sector and Write Track.
pub fn writes_to_disk(command: u8) -> bool {
    command & 0xF0 == CR_WRITE_TRACK || command & 0xE0 == 0xA0
}

/// Short mnemonic for logging.
pub fn command_name(command: u8) -> &'static str {
    match command & 0xF0 {
        0x00 => "RESTORE",
        0x10 => "SEEK",
        0x20 | 0x30 => "STEP",
        0x40 | 0x50 => "STEP IN",
        0x60 | 0x70 => "STEP OUT",
        0x80 | 0x90 => "READ SECTOR",
        0xA0 | 0xB0 => "WRITE SECTOR",
        0xC0 => "READ ADDRESS",
        0xD0 => "FORCE INTERRUPT",
        0xE0 => "READ TRACK",
        _ => "WRITE TRACK",
    }
}

/// Type I command layout.
#[bitfield]
#[derive(Copy, Clone, Debug)]
pub struct TypeICommand {
    pub rate: B2,
    pub verify: bool,
    pub no_spinup: bool,
    pub update: bool,
    pub op: B3,
}

/// Type IV command layout.
#[bitfield]
#[derive(Copy, Clone, Debug)]
pub struct ForceInterruptCommand {
    #[skip]
    unused: B2,
    pub on_index: bool,
    pub immediate: bool,
    #[skip]
    op: B4,
}

/// Control lines between the controller and the drive interface.
#[derive(Copy, Clone, Debug, Default)]
pub struct FdcLines {
    pub motor: bool,
    pub direction: bool, // true = step in
    pub track0: bool,
    pub irq: bool,
    pub write_gate: bool,
}

/// State shared by both controller engines: the programmer-visible
/// registers plus the latches the engines hand off to each other.
#[derive(Clone, Debug)]
pub struct FdcRegisters {
    pub cr: u8,
    pub tr: u8,
    pub sr: u8,
    pub dr: u8,
    pub str: u8,
    /// Status bits read back with their Type I meaning.
    pub type_i_status: bool,
    pub interrupt_condition: u8,
    pub index_counter: u8,
    /// 0: not spinning up. 1: spin-up with the command already running.
    /// 2: command delayed until spin-up completes.
    pub spinning_up: u8,
    /// Index periods seen with the motor stopped or the drive empty.
    pub time_out: u8,
    pub lines: FdcLines,
    /// Level presented on the interrupt output.
    pub irq_pin: bool,
}

impl Default for FdcRegisters {
    fn default() -> Self {
        Self {
            cr: 0,
            tr: 0,
            sr: 1,
            dr: 0,
            str: STR_DRQ,
            type_i_status: true,
            interrupt_condition: 0,
            index_counter: 0,
            spinning_up: 0,
            time_out: 0,
            lines: Default::default(),
            irq_pin: false,
        }
    }
}

impl FdcRegisters {
    /// Chip reset. Track, sector and data registers keep their contents.
    pub fn reset(&mut self) {
        self.str = STR_DRQ;
        self.interrupt_condition = 0;
        self.index_counter = 0;
        self.type_i_status = true;
        self.spinning_up = 0;
        self.time_out = 0;
        self.lines = Default::default();
        self.irq_pin = false;
    }

    #[inline]
    pub fn busy(&self) -> bool {
        self.str & STR_BUSY != 0
    }

    #[inline]
    pub fn command_type(&self) -> CommandType {
        CommandType::decode(self.cr)
    }

    #[inline]
    pub fn set(&mut self, bits: u8) {
        self.str |= bits;
    }

    #[inline]
    pub fn clear(&mut self, bits: u8) {
        self.str &= !bits;
    }

    #[inline]
    pub fn assign(&mut self, bits: u8, state: bool) {
        if state {
            self.set(bits)
        }
        else {
            self.clear(bits)
        }
    }

    /// Advance the sector register for multi-sector commands. 255 wraps to 1.
    pub fn next_sector(&mut self) {
        self.sr = self.sr.wrapping_add(1);
        if self.sr == 0 {
            self.sr = 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_types() {
        assert_eq!(CommandType::decode(0x00), CommandType::TypeI);
        assert_eq!(CommandType::decode(0x7F), CommandType::TypeI);
        assert_eq!(CommandType::decode(0x80), CommandType::TypeII);
        assert_eq!(CommandType::decode(0xB2), CommandType::TypeII);
        assert_eq!(CommandType::decode(0xC0), CommandType::TypeIII);
        assert_eq!(CommandType::decode(0xD0), CommandType::TypeIV);
        assert_eq!(CommandType::decode(0xD8), CommandType::TypeIV);
        assert_eq!(CommandType::decode(0xE4), CommandType::TypeIII);
        assert_eq!(CommandType::decode(0xF0), CommandType::TypeIII);
    }

    #[test]
    fn test_writes_to_disk() {
        assert!(writes_to_disk(0xA0));
        assert!(writes_to_disk(0xB1));
        assert!(writes_to_disk(0xF0));
        assert!(!writes_to_disk(0x80));
        assert!(!writes_to_disk(0xE0));
        assert!(!writes_to_disk(0xD0));
    }

    #[test]
    fn test_command_bitfields() {
        let seek = TypeICommand::from_bytes([0x1F]);
        assert_eq!(seek.rate(), 3);
        assert!(seek.verify());
        assert!(seek.no_spinup());
        assert!(seek.update());
        assert_eq!(seek.op(), 0);

        let fi = ForceInterruptCommand::from_bytes([0xD8]);
        assert!(fi.immediate());
        assert!(!fi.on_index());
    }

    #[test]
    fn test_reset_keeps_track_and_sector() {
        let mut regs = FdcRegisters::default();
        regs.tr = 40;
        regs.sr = 7;
        regs.dr = 0x55;
        regs.str = 0xFF;
        regs.interrupt_condition = INT_COND_IMMEDIATE;
        regs.reset();
        assert_eq!(regs.str, STR_DRQ);
        assert_eq!((regs.tr, regs.sr, regs.dr), (40, 7, 0x55));
        assert_eq!(regs.interrupt_condition, 0);
    }

    #[test]
    fn test_sector_wrap() {
        let mut regs = FdcRegisters::default();
        regs.sr = 255;
        regs.next_sector();
        assert_eq!(regs.sr, 1);
    }
}
