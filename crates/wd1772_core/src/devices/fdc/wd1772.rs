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

    devices::fdc::wd1772.rs

    Cycle accurate WD1772 engine, used for bit and flux granular images.
    
    The microcode is an explicit phase machine. Each handler performs one
    step and either hands over to the next phase at once (Flow::Next) or
    waits for a timer, a byte cell or an index pulse (Flow::Wait). Byte
    cells come from the drive's MFM track or, for flux images, from the DPLL
    and the bit level address mark detector.
*/

use super::{
    am_detector::AmDetector,
    context::FdcContext,
    crc::{CrcLogic, CRC_SYNC_PRESET},
    dpll::Dpll,
    mfm::{EncodeMode, MfmCodec},
    registers::*,
};
use crate::{
    device_traits::floppy_controller::FloppyController,
    device_types::fdc::{IdField, TrackGranularity},
    devices::image::ImageFlux,
    machine_types::EngineType,
    scheduler::FdcEvent,
};
use strum_macros::{Display, IntoStaticStr};

/// Delay before a Type I command starts when no spin-up is needed.
pub const TYPE_I_START_DELAY: u64 = 256;
pub const SPINUP_INDEX_PULSES: u8 = 6;
pub const MOTOR_OFF_INDEX_PULSES: u8 = 10;
pub const VERIFY_INDEX_PULSES: u8 = 6;
pub const FIND_ID_INDEX_PULSES: u8 = 5;
/// Shortest wait between two flux-derived byte cells.
const MIN_FLUX_BYTE_CYCLES: u64 = 16;
/// Bit cells tried before a flux read gives up on assembling a byte.
const MAX_CELLS_PER_BYTE: usize = 64;
/// Safety net for phase chains that never wait.
const MAX_CHAINED_PHASES: usize = 64;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Display, IntoStaticStr)]
pub enum Phase {
    #[default]
    Ready,
    TypeISpinup,
    TypeISpunup,
    TypeISeek,
    TypeIStepUpdate,
    TypeIStep,
    TypeIStepPulse,
    TypeICheckVerify,
    TypeIHeadSettle,
    TypeIFindId,
    TypeIReadId,
    TypeITestId,
    TypeIISpinup,
    TypeIISpunup,
    TypeIIHeadSettle,
    TypeIIFindId,
    TypeIIReadId,
    TypeIITestId,
    TypeIIFindDam,
    TypeIIReadData,
    TypeIIReadCrc,
    TypeIICheckMultiple,
    TypeIIWriteDam,
    TypeIIWriteData,
    TypeIIWriteCrc,
    TypeIIISpinup,
    TypeIIISpunup,
    TypeIIIHeadSettle,
    TypeIIIIpStart,
    TypeIIIFindId,
    TypeIIIReadId,
    TypeIIITestId,
    TypeIIIReadData,
    TypeIIIWriteData,
    TypeIIIWriteData2,
    TypeIV4,
    MotorOff,
}

impl Phase {
    /// Phase entered when an ID search, an ID read or a spin-up completes.
    fn successor(self) -> Phase {
        match self {
            Phase::TypeISpinup => Phase::TypeISpunup,
            Phase::TypeIISpinup => Phase::TypeIISpunup,
            Phase::TypeIIISpinup => Phase::TypeIIISpunup,
            Phase::TypeIFindId => Phase::TypeIReadId,
            Phase::TypeIIFindId => Phase::TypeIIReadId,
            Phase::TypeIIIFindId => Phase::TypeIIIReadId,
            Phase::TypeIReadId => Phase::TypeITestId,
            Phase::TypeIIReadId => Phase::TypeIITestId,
            Phase::TypeIIIReadId => Phase::TypeIIITestId,
            other => other,
        }
    }

    fn is_id_search(self) -> bool {
        matches!(
            self,
            Phase::TypeIFindId
                | Phase::TypeIReadId
                | Phase::TypeIIFindId
                | Phase::TypeIIReadId
                | Phase::TypeIIIFindId
                | Phase::TypeIIIReadId
        )
    }

    /// Phases that only react to index pulses and need no timer.
    fn is_idle(self) -> bool {
        matches!(self, Phase::Ready | Phase::MotorOff | Phase::TypeIV4)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Flow {
    Next,
    Wait,
}

#[derive(Clone, Debug, Default)]
pub struct Wd1772Engine {
    phase: Phase,
    update_time: u64,
    /// Data shift register.
    dsr: u8,
    byte_count: usize,
    n_format_bytes: usize,
    id_field: IdField,
    f7_escaping: bool,
    crc: CrcLogic,
    mfm: MfmCodec,
    amd: AmDetector,
    dpll: Dpll,
    /// The mounted image delivers flux rather than MFM words.
    flux: bool,
    /// A read or write found no disk to talk to.
    stalled: bool,
}

impl Wd1772Engine {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn crc(&self) -> u16 {
        self.crc.value()
    }

    // Output lines.

    fn drq(&mut self, regs: &mut FdcRegisters, ctx: &mut FdcContext) {
        regs.set(STR_DRQ);
        ctx.dma.request();
        if writes_to_disk(regs.cr) {
            regs.dr = ctx.dma.pop_byte();
        }
        else {
            ctx.dma.push_byte(regs.dr);
        }
        // The DMA services the request at once.
        regs.clear(STR_DRQ);
    }

    fn irq(&mut self, state: bool, regs: &mut FdcRegisters, ctx: &mut FdcContext) {
        self.amd.reset();
        self.amd.enabled = false;
        if state && !regs.lines.irq {
            regs.index_counter = MOTOR_OFF_INDEX_PULSES;
            self.phase = Phase::MotorOff;
            regs.clear(STR_BUSY);
            if regs.command_type().is_data_transfer() {
                regs.clear(STR_DRQ);
            }
            log::debug!("WD1772: {} done, str {:02X}", command_name(regs.cr), regs.str);
        }
        regs.lines.irq = state;
        regs.irq_pin = state;
        ctx.irq.set_irq(state);
        if let Some(drive) = ctx.drive() {
            drive.stop_transfer();
        }
    }

    fn motor(&mut self, state: bool, regs: &mut FdcRegisters, ctx: &mut FdcContext) {
        regs.lines.motor = state;
        regs.assign(STR_MOTOR_ON, state);
        ctx.set_motor(state);
    }

    fn step_pulse(&mut self, regs: &FdcRegisters, ctx: &mut FdcContext) {
        if let Some(drive) = ctx.drive() {
            drive.step(regs.lines.direction);
        }
    }

    // Byte cells.

    fn read(&mut self, ctx: &mut FdcContext) {
        let now = ctx.now;
        let side = ctx.side();
        let cycles_per_second = ctx.config.cycles_per_second();
        let Some(drive) = ctx.loaded_drive()
        else {
            self.stalled = true;
            self.update_time = now + cycles_per_second;
            return;
        };
        self.stalled = false;

        if !self.flux {
            let (word, next) = drive.read_word(side, now);
            self.mfm.decode(word);
            self.dsr = self.mfm.data;
            self.update_time = next;
            log::trace!("WD1772: {} read {:04X} ${:02X}", self.phase, word, self.dsr);
            return;
        }

        let fresh = !drive.reading;
        drive.reading = true;
        drive.sync_track(side);
        let since_index = drive.cycles_since_index(now);
        let Some(image) = drive.image_mut()
        else {
            return;
        };
        if fresh {
            image.seek_flux(since_index);
            self.dpll.reset(now as i64);
        }
        let mut source = ImageFlux(image);
        let mut byte = None;
        for _ in 0..MAX_CELLS_PER_BYTE {
            let (bit, _) = self.dpll.next_bit(&mut source);
            if let Some(b) = self.amd.shift_bit(bit) {
                byte = Some(b);
                break;
            }
        }
        self.dsr = byte.unwrap_or(0);
        let cell_end = self.dpll.ctime.max(0) as u64;
        self.update_time = cell_end.max(now + MIN_FLUX_BYTE_CYCLES);
        log::trace!("WD1772: {} flux read ${:02X}", self.phase, self.dsr);
    }

    fn write(&mut self, ctx: &mut FdcContext) {
        let now = ctx.now;
        let side = ctx.side();
        let cycles_per_second = ctx.config.cycles_per_second();
        let word = self.mfm.encoded;
        match ctx.loaded_drive() {
            Some(drive) => {
                self.stalled = false;
                self.update_time = drive.write_word(side, word, now);
                log::trace!("WD1772: {} write {:04X} ${:02X}", self.phase, word, self.mfm.data);
            }
            None => {
                self.stalled = true;
                self.update_time = now + cycles_per_second;
            }
        }
    }

    fn encode(&mut self, data: u8, mode: EncodeMode) {
        self.mfm.encode(data, mode);
    }

    /// True if the last byte is an A1 with its missing clock.
    fn sync_a1(&self) -> bool {
        if self.flux {
            self.amd.signals.dsr_a1()
        }
        else {
            self.dsr == 0xA1 && self.mfm.is_sync_a1()
        }
    }

    fn count_a1(&mut self) {
        self.amd.n_a1 += 1;
        if self.amd.n_a1 == 3 {
            self.crc.reset();
        }
    }

    fn prepare_next_event(&mut self, ctx: &mut FdcContext) {
        ctx.scheduler.cancel(FdcEvent::Update);
        if !self.phase.is_idle() {
            ctx.scheduler.schedule(self.update_time, FdcEvent::Update, 0);
        }
    }

    /// Start a command already accepted into the command register.
    fn new_command(&mut self, regs: &mut FdcRegisters, command: u8, ctx: &mut FdcContext) {
        regs.cr = command;
        if let Some(drive) = ctx.drive() {
            drive.stop_transfer();
        }
        self.update_time = ctx.now + ctx.config.cycles_per_second();
        self.flux = ctx
            .drive_ref()
            .and_then(|d| d.image())
            .is_some_and(|i| i.granularity() == TrackGranularity::Flux);

        let command_type = CommandType::decode(command);
        if command_type != CommandType::TypeIV {
            regs.set(STR_BUSY);
            let errors = match command_type {
                CommandType::TypeI => STR_CRC_ERROR | STR_SEEK_ERROR | STR_WRITE_PROTECT,
                _ => STR_LOST_DATA | STR_RECORD_NOT_FOUND | STR_WRITE_PROTECT | STR_RECORD_TYPE,
            };
            regs.clear(errors | STR_DRQ);
            if regs.interrupt_condition != INT_COND_IMMEDIATE {
                self.irq(false, regs, ctx);
            }
            regs.interrupt_condition = 0;
            regs.type_i_status = command_type == CommandType::TypeI;

            let spin_up = command & CR_H == 0 && !regs.lines.motor;
            self.motor(true, regs, ctx);
            let (spinup_phase, spunup_phase) = match command_type {
                CommandType::TypeI => (Phase::TypeISpinup, Phase::TypeISpunup),
                CommandType::TypeII => (Phase::TypeIISpinup, Phase::TypeIISpunup),
                _ => (Phase::TypeIIISpinup, Phase::TypeIIISpunup),
            };
            if spin_up {
                regs.index_counter = SPINUP_INDEX_PULSES;
                regs.spinning_up = 1;
                self.phase = spinup_phase;
            }
            else {
                regs.spinning_up = 0;
                self.phase = spunup_phase;
                if command_type == CommandType::TypeI {
                    regs.set(STR_SPUN_UP);
                    self.update_time = ctx.now + TYPE_I_START_DELAY;
                }
                else {
                    self.run(regs, ctx);
                }
            }
        }
        else {
            self.motor(true, regs, ctx);
            if regs.busy() {
                regs.clear(STR_BUSY);
            }
            else {
                regs.type_i_status = true;
                regs.clear(STR_CRC_ERROR | STR_LOST_DATA | STR_RECORD_TYPE | STR_RECORD_NOT_FOUND);
            }
            let fi = ForceInterruptCommand::from_bytes([command]);
            if fi.immediate() {
                regs.interrupt_condition = INT_COND_IMMEDIATE;
                self.irq(true, regs, ctx);
                self.phase = Phase::MotorOff;
                regs.index_counter = MOTOR_OFF_INDEX_PULSES;
            }
            else if fi.on_index() {
                self.phase = Phase::TypeIV4;
                regs.interrupt_condition = INT_COND_INDEX;
                regs.index_counter = 1;
            }
            else {
                if regs.interrupt_condition != INT_COND_IMMEDIATE {
                    self.irq(false, regs, ctx);
                }
                self.phase = Phase::MotorOff;
                regs.index_counter = MOTOR_OFF_INDEX_PULSES;
                regs.interrupt_condition = 0;
            }
        }
        self.prepare_next_event(ctx);
    }

    /// Timer entry point: the byte cell or delay the engine waited for is due.
    fn on_update(&mut self, regs: &mut FdcRegisters, ctx: &mut FdcContext) {
        self.update_time = ctx.now + ctx.config.cycles_per_second();
        if regs.time_out > 1 && regs.spinning_up != 0 {
            log::debug!("WD1772: no index pulse during spin-up, giving up");
            regs.set(STR_RECORD_NOT_FOUND);
            regs.time_out = 0;
            regs.spinning_up = 0;
            self.irq(true, regs, ctx);
        }
        else {
            self.run(regs, ctx);
        }
        self.prepare_next_event(ctx);
    }

    /// Run phases until one of them waits.
    fn run(&mut self, regs: &mut FdcRegisters, ctx: &mut FdcContext) {
        for _ in 0..MAX_CHAINED_PHASES {
            if self.step(regs, ctx) == Flow::Wait {
                return;
            }
        }
        log::warn!("WD1772: phase chain did not settle in {}", self.phase);
    }

    fn step(&mut self, regs: &mut FdcRegisters, ctx: &mut FdcContext) -> Flow {
        match self.phase {
            Phase::TypeISpunup => self.type_i_spunup(regs, ctx),
            Phase::TypeISeek => {
                self.dsr = regs.dr;
                if regs.tr == self.dsr {
                    self.phase = Phase::TypeICheckVerify;
                }
                else {
                    regs.lines.direction = self.dsr > regs.tr;
                    self.phase = Phase::TypeIStepUpdate;
                }
                Flow::Next
            }
            Phase::TypeIStepUpdate => {
                regs.tr = if regs.lines.direction {
                    regs.tr.wrapping_add(1)
                }
                else {
                    regs.tr.wrapping_sub(1)
                };
                self.phase = Phase::TypeIStep;
                Flow::Next
            }
            Phase::TypeIStep => self.type_i_step(regs, ctx),
            Phase::TypeIStepPulse => {
                self.phase = if regs.cr & CR_STEP != 0 {
                    Phase::TypeICheckVerify
                }
                else {
                    Phase::TypeISeek
                };
                Flow::Next
            }
            Phase::TypeICheckVerify => self.type_i_check_verify(regs, ctx),
            Phase::TypeIHeadSettle => {
                self.phase = Phase::TypeIFindId;
                self.amd.reset();
                self.n_format_bytes = 0;
                self.read(ctx);
                regs.index_counter = VERIFY_INDEX_PULSES;
                Flow::Wait
            }
            Phase::TypeIFindId | Phase::TypeIIFindId | Phase::TypeIIIFindId => self.find_id(ctx),
            Phase::TypeIReadId | Phase::TypeIIReadId | Phase::TypeIIIReadId => self.read_id(regs, ctx),
            Phase::TypeITestId => {
                if self.id_field.track == regs.tr && self.crc.check(&self.id_field) {
                    self.irq(true, regs, ctx);
                }
                else {
                    self.phase = Phase::TypeIFindId;
                    if self.id_field.track == regs.tr {
                        regs.set(STR_CRC_ERROR);
                    }
                    self.crc.add(self.dsr);
                    self.amd.enable();
                    self.read(ctx);
                }
                Flow::Wait
            }
            Phase::TypeIISpunup | Phase::TypeIIISpunup => {
                self.phase = if self.phase == Phase::TypeIISpunup {
                    Phase::TypeIIHeadSettle
                }
                else {
                    Phase::TypeIIIHeadSettle
                };
                if regs.cr & CR_E != 0 {
                    self.update_time = ctx.now + ctx.config.ms_to_cycles(HEAD_SETTLE_MS);
                    Flow::Wait
                }
                else {
                    Flow::Next
                }
            }
            Phase::TypeIIHeadSettle => {
                if regs.cr & CR_TYPEII_WRITE != 0 && ctx.write_protected() {
                    regs.set(STR_WRITE_PROTECT);
                    self.irq(true, regs, ctx);
                }
                else {
                    regs.index_counter = FIND_ID_INDEX_PULSES;
                    self.phase = Phase::TypeIIFindId;
                    self.amd.reset();
                    self.n_format_bytes = 0;
                    self.read(ctx);
                }
                Flow::Wait
            }
            Phase::TypeIITestId => {
                if self.id_field.track == regs.tr && self.id_field.sector == regs.sr {
                    self.byte_count = self.id_field.sector_size();
                    if self.crc.check(&self.id_field) {
                        self.phase = if regs.cr & CR_TYPEII_WRITE != 0 {
                            Phase::TypeIIWriteDam
                        }
                        else {
                            Phase::TypeIIFindDam
                        };
                    }
                    else {
                        log::debug!("WD1772: ID CRC error on sector {}", self.id_field.sector);
                        regs.set(STR_CRC_ERROR);
                        self.crc.add(self.dsr);
                        self.phase = Phase::TypeIIFindId;
                    }
                }
                else {
                    self.phase = Phase::TypeIIFindId;
                }
                self.amd.reset();
                self.read(ctx);
                Flow::Wait
            }
            Phase::TypeIIFindDam => self.find_dam(regs, ctx),
            Phase::TypeIIReadData => {
                self.crc.add(self.dsr);
                regs.dr = self.dsr;
                self.drq(regs, ctx);
                self.byte_count = self.byte_count.saturating_sub(1);
                if self.byte_count == 0 {
                    self.phase = Phase::TypeIIReadCrc;
                }
                self.read(ctx);
                Flow::Wait
            }
            Phase::TypeIIReadCrc => {
                self.id_field.crc[self.n_format_bytes.min(1)] = self.dsr;
                if self.n_format_bytes > 0 {
                    if !self.crc.check(&self.id_field) {
                        log::debug!("WD1772: data CRC error on sector {}", regs.sr);
                        regs.set(STR_CRC_ERROR);
                        self.irq(true, regs, ctx);
                        Flow::Wait
                    }
                    else {
                        self.phase = Phase::TypeIICheckMultiple;
                        Flow::Next
                    }
                }
                else {
                    self.n_format_bytes += 1;
                    self.read(ctx);
                    Flow::Wait
                }
            }
            Phase::TypeIICheckMultiple => {
                if regs.cr & CR_M != 0 {
                    if let Some(drive) = ctx.drive() {
                        drive.writing = false;
                    }
                    regs.next_sector();
                    self.phase = Phase::TypeIIHeadSettle;
                    Flow::Next
                }
                else {
                    self.irq(true, regs, ctx);
                    Flow::Wait
                }
            }
            Phase::TypeIIWriteDam => self.write_dam(regs, ctx),
            Phase::TypeIIWriteData => {
                self.drq(regs, ctx);
                self.dsr = regs.dr;
                self.crc.add(self.dsr);
                self.encode(self.dsr, EncodeMode::Normal);
                self.byte_count = self.byte_count.saturating_sub(1);
                if self.byte_count == 0 {
                    self.phase = Phase::TypeIIWriteCrc;
                }
                self.write(ctx);
                Flow::Wait
            }
            Phase::TypeIIWriteCrc => {
                self.n_format_bytes += 1;
                let data = match self.n_format_bytes {
                    1 => self.crc.hi(),
                    2 => self.crc.lo(),
                    _ => {
                        self.n_format_bytes = 0;
                        self.phase = Phase::TypeIICheckMultiple;
                        regs.lines.write_gate = false;
                        0xFF
                    }
                };
                self.encode(data, EncodeMode::Normal);
                self.write(ctx);
                Flow::Wait
            }
            Phase::TypeIIIHeadSettle => self.type_iii_head_settle(regs, ctx),
            Phase::TypeIIITestId => {
                if !self.crc.check(&self.id_field) {
                    regs.set(STR_CRC_ERROR);
                }
                regs.sr = self.id_field.track;
                self.irq(true, regs, ctx);
                Flow::Wait
            }
            Phase::TypeIIIReadData => {
                // The address mark detector stays on for the whole track.
                if self.sync_a1() {
                    if !self.flux && self.crc.value() != CRC_SYNC_PRESET {
                        self.dsr = 0x14;
                    }
                    self.crc.reset();
                }
                else {
                    self.crc.add(self.dsr);
                }
                regs.dr = self.dsr;
                self.drq(regs, ctx);
                self.read(ctx);
                Flow::Wait
            }
            Phase::TypeIIIWriteData => self.write_track_byte(regs, ctx),
            Phase::TypeIIIWriteData2 => {
                self.dsr = regs.dr;
                self.crc.add(self.dsr);
                self.encode(self.dsr, EncodeMode::Normal);
                self.write(ctx);
                self.phase = Phase::TypeIIIWriteData;
                Flow::Wait
            }
            Phase::Ready
            | Phase::TypeISpinup
            | Phase::TypeIISpinup
            | Phase::TypeIIISpinup
            | Phase::TypeIIIIpStart
            | Phase::TypeIV4
            | Phase::MotorOff => {
                self.update_time = ctx.now + ctx.config.cycles_per_second();
                Flow::Wait
            }
        }
    }

    fn type_i_spunup(&mut self, regs: &mut FdcRegisters, ctx: &mut FdcContext) -> Flow {
        if regs.cr & CR_STEP != 0 {
            match regs.cr & CR_STEP {
                CR_STEP_IN => regs.lines.direction = true,
                CR_STEP_OUT => regs.lines.direction = false,
                _ => {}
            }
            self.phase = if regs.cr & CR_U != 0 {
                Phase::TypeIStepUpdate
            }
            else {
                Phase::TypeIStep
            };
        }
        else {
            self.phase = Phase::TypeISeek;
            if regs.cr & CR_SEEK == 0 {
                // Restore: make the first compare always step.
                regs.tr = 0xFF;
                regs.lines.track0 = ctx.track0();
                if regs.lines.track0 {
                    regs.tr = 0;
                }
                regs.dr = 0;
            }
        }
        Flow::Next
    }

    fn type_i_step(&mut self, regs: &mut FdcRegisters, ctx: &mut FdcContext) -> Flow {
        regs.lines.track0 = ctx.track0();
        if regs.lines.track0 && !regs.lines.direction {
            regs.tr = 0;
            self.phase = Phase::TypeICheckVerify;
            return Flow::Next;
        }
        self.step_pulse(regs, ctx);
        let rate = TypeICommand::from_bytes([regs.cr]).rate() as usize;
        self.update_time = ctx.now + ctx.config.ms_to_cycles(STEP_RATES_MS[rate]);
        self.phase = Phase::TypeIStepPulse;
        Flow::Wait
    }

    fn type_i_check_verify(&mut self, regs: &mut FdcRegisters, ctx: &mut FdcContext) -> Flow {
        regs.lines.track0 = ctx.track0();
        regs.assign(STR_TRACK0, regs.lines.track0);
        if regs.cr & CR_V == 0 {
            self.irq(true, regs, ctx);
            return Flow::Wait;
        }
        let side = ctx.side();
        match ctx.loaded_drive() {
            Some(drive) => {
                drive.sync_track(side);
                self.phase = Phase::TypeIHeadSettle;
                self.update_time = ctx.now + ctx.config.ms_to_cycles(HEAD_SETTLE_MS);
            }
            None => {
                // No index pulse will ever come: wait for a disk or a Force Interrupt.
                self.stalled = true;
                self.update_time = ctx.now + ctx.config.cycles_per_second();
            }
        }
        Flow::Wait
    }

    fn find_id(&mut self, ctx: &mut FdcContext) -> Flow {
        self.crc.add(self.dsr);
        if self.flux && self.amd.signals.dsr_am() {
            self.amd.n_a1 = 3;
            self.crc.reset();
            self.amd.enabled = false;
        }
        else if self.amd.enabled && self.sync_a1() {
            self.count_a1();
        }
        // Strictly three syncs: a fourth A1 does not qualify.
        else if self.dsr >= 0xFC && self.amd.n_a1 == 3 {
            log::trace!("WD1772: ID mark {:02X}", self.dsr);
            self.n_format_bytes = 0;
            self.phase = self.phase.successor();
            self.amd.enabled = false;
        }
        else if self.amd.n_a1 > 0 {
            self.amd.reset();
        }
        self.read(ctx);
        Flow::Wait
    }

    fn read_id(&mut self, regs: &mut FdcRegisters, ctx: &mut FdcContext) -> Flow {
        self.id_field.set_byte(self.n_format_bytes, self.dsr);
        if self.n_format_bytes < 4 {
            self.crc.add(self.dsr);
        }
        if self.phase == Phase::TypeIIIReadId {
            regs.dr = self.dsr;
            self.drq(regs, ctx);
        }
        self.n_format_bytes += 1;
        if self.n_format_bytes == 6 {
            self.n_format_bytes = 0;
            self.phase = self.phase.successor();
            log::trace!("WD1772: read {:?}", self.id_field);
            Flow::Next
        }
        else {
            self.read(ctx);
            Flow::Wait
        }
    }

    fn find_dam(&mut self, regs: &mut FdcRegisters, ctx: &mut FdcContext) -> Flow {
        self.crc.add(self.dsr);
        self.n_format_bytes += 1;
        let n = self.n_format_bytes;
        let signals = self.amd.signals;
        if n < 27 {
            // The first bytes after the ID are not looked at.
        }
        else if n == 27 {
            self.amd.enable();
        }
        else if n == 44 + self.amd.n_a1 as usize {
            log::trace!("WD1772: no data mark after ID of sector {}", regs.sr);
            self.n_format_bytes = 0;
            self.phase = Phase::TypeIIFindId;
            self.amd.enable();
        }
        else if self.flux && signals.dsr_am() && !signals.dsr_a1() {
            self.amd.enable();
            self.n_format_bytes = 0;
        }
        else if self.flux && signals.dsr_am() {
            self.crc.reset();
            self.amd.n_a1 = 3;
        }
        else if self.sync_a1() {
            self.count_a1();
        }
        else if self.amd.n_a1 == 3 && matches!(self.dsr & 0xFE, 0xF8 | 0xFA) {
            log::trace!("WD1772: data mark {:02X} for sector {}", self.dsr, regs.sr);
            self.n_format_bytes = 0;
            self.amd.enabled = false;
            self.phase = Phase::TypeIIReadData;
            if self.dsr & 0xFE == 0xF8 {
                regs.set(STR_RECORD_TYPE);
            }
        }
        else if self.amd.n_a1 == 3 {
            self.amd.enable();
        }
        self.read(ctx);
        Flow::Wait
    }

    fn write_dam(&mut self, regs: &mut FdcRegisters, ctx: &mut FdcContext) -> Flow {
        self.n_format_bytes += 1;
        let n = self.n_format_bytes;
        if n < 22 {
            // Gap 2 passes under the head before the write gate opens.
            self.read(ctx);
        }
        else if n < 34 {
            regs.lines.write_gate = true;
            self.encode(0x00, EncodeMode::Normal);
            self.crc.add(0x00);
            self.write(ctx);
        }
        else if n < 37 {
            self.encode(0xA1, EncodeMode::FormatClock);
            self.crc.add(0xA1);
            self.crc.reset();
            self.write(ctx);
        }
        else if n == 37 {
            let mark = if regs.cr & CR_A0 != 0 { 0xF8 } else { 0xFB };
            self.encode(mark, EncodeMode::Normal);
            self.crc.add(mark);
            self.write(ctx);
        }
        else {
            self.n_format_bytes = 0;
            self.phase = Phase::TypeIIWriteData;
            return Flow::Next;
        }
        Flow::Wait
    }

    fn type_iii_head_settle(&mut self, regs: &mut FdcRegisters, ctx: &mut FdcContext) -> Flow {
        self.amd.reset();
        if self.flux {
            self.amd.disable_crc();
        }
        if regs.cr & 0xF0 == CR_READ_ADDRESS {
            regs.index_counter = FIND_ID_INDEX_PULSES;
            self.phase = Phase::TypeIIIFindId;
            self.n_format_bytes = 0;
            self.read(ctx);
        }
        else if regs.cr & CR_TYPEIII_WRITE != 0 && ctx.write_protected() {
            log::debug!("WD1772: write track on a protected disk");
            regs.set(STR_WRITE_PROTECT);
            self.irq(true, regs, ctx);
        }
        else {
            regs.index_counter = 1;
            self.phase = Phase::TypeIIIIpStart;
        }
        Flow::Wait
    }

    /// One byte of a Write Track, with the format escapes.
    fn write_track_byte(&mut self, regs: &mut FdcRegisters, ctx: &mut FdcContext) -> Flow {
        self.drq(regs, ctx);
        let dr = regs.dr;
        if dr == 0xF5 && !self.f7_escaping {
            self.dsr = 0xA1;
            self.encode(0xA1, EncodeMode::FormatClock);
            self.crc.reset();
        }
        else if dr == 0xF6 && !self.f7_escaping {
            self.dsr = 0xC2;
            self.encode(0xC2, EncodeMode::FormatClock);
            self.crc.add(0xC2);
        }
        else if dr == 0xF7 && !self.f7_escaping {
            // The low byte is latched before the high byte changes the CRC.
            self.dsr = self.crc.hi();
            regs.dr = self.crc.lo();
            self.crc.add(self.dsr);
            self.encode(self.dsr, EncodeMode::Normal);
            self.f7_escaping = true;
            self.phase = Phase::TypeIIIWriteData2;
        }
        else {
            self.dsr = dr;
            self.encode(dr, EncodeMode::Normal);
            self.crc.add(dr);
            self.f7_escaping = false;
        }
        self.write(ctx);
        Flow::Wait
    }
}

impl FloppyController for Wd1772Engine {
    fn engine_type(&self) -> EngineType {
        EngineType::Cycle
    }

    fn reset(&mut self) {
        *self = Default::default();
    }

    fn write_command(&mut self, regs: &mut FdcRegisters, command: u8, ctx: &mut FdcContext) {
        if command & 0xF0 != CR_FORCE_INTERRUPT {
            let side = ctx.side();
            if let Some(drive) = ctx.loaded_drive() {
                drive.sync_track(side);
            }
        }
        if !regs.busy() || command & 0xF0 == CR_FORCE_INTERRUPT || regs.spinning_up != 0 {
            log::debug!("WD1772: command {:02X} {}", command, command_name(command));
            self.new_command(regs, command, ctx);
        }
        else {
            log::debug!("WD1772: command {:02X} ignored, busy in {}", command, self.phase);
        }
    }

    fn on_event(&mut self, regs: &mut FdcRegisters, event: FdcEvent, _arg: u32, ctx: &mut FdcContext) {
        if event == FdcEvent::Update {
            self.on_update(regs, ctx);
        }
    }

    fn on_index_pulse(&mut self, regs: &mut FdcRegisters, ctx: &mut FdcContext) {
        if regs.index_counter == 0 {
            if self.stalled {
                self.on_update(regs, ctx);
            }
            return;
        }
        regs.index_counter -= 1;
        if regs.index_counter > 0 {
            if self.stalled {
                self.on_update(regs, ctx);
            }
            return;
        }

        log::trace!("WD1772: index pulse ends wait in {}", self.phase);
        match self.phase {
            Phase::TypeISpinup | Phase::TypeIISpinup | Phase::TypeIIISpinup => {
                if self.phase == Phase::TypeISpinup {
                    regs.set(STR_SPUN_UP);
                }
                self.phase = self.phase.successor();
                regs.spinning_up = 0;
                self.on_update(regs, ctx);
            }
            phase if phase.is_id_search() => {
                log::debug!("WD1772: ID not found in {}", phase);
                regs.set(STR_RECORD_NOT_FOUND);
                self.irq(true, regs, ctx);
                self.prepare_next_event(ctx);
            }
            Phase::TypeIIIIpStart => {
                regs.index_counter = 1;
                self.n_format_bytes = 0;
                if regs.cr & CR_TYPEIII_WRITE != 0 {
                    log::debug!("WD1772: format side {} track {}", ctx.side(), ctx.current_track());
                    self.phase = Phase::TypeIIIWriteData;
                    self.f7_escaping = false;
                    self.on_update(regs, ctx);
                }
                else {
                    log::debug!("WD1772: read track side {} track {}", ctx.side(), ctx.current_track());
                    self.phase = Phase::TypeIIIReadData;
                    self.amd.reset();
                    self.read(ctx);
                    self.prepare_next_event(ctx);
                }
            }
            Phase::TypeIIIWriteData | Phase::TypeIIIWriteData2 | Phase::TypeIIIReadData => {
                if let Some(drive) = ctx.drive() {
                    drive.stop_transfer();
                }
                self.irq(true, regs, ctx);
                self.prepare_next_event(ctx);
            }
            Phase::TypeIV4 => {
                // Every index pulse raises a fresh interrupt.
                regs.lines.irq = false;
                self.irq(true, regs, ctx);
                self.phase = Phase::TypeIV4;
                regs.index_counter = 1;
                self.prepare_next_event(ctx);
            }
            Phase::MotorOff => {
                self.motor(false, regs, ctx);
                self.phase = Phase::Ready;
                self.prepare_next_event(ctx);
            }
            _ => {
                if self.stalled {
                    self.on_update(regs, ctx);
                }
            }
        }
    }

    fn cancel_events(&mut self, ctx: &mut FdcContext) {
        ctx.scheduler.cancel(FdcEvent::Update);
    }

    fn phase_name(&self) -> &'static str {
        self.phase.into()
    }
}
