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

    devices::fdc::controller.rs

    The WD1772 as the CPU sees it: four register lines in front of one of
    two engines. The engine follows the granularity of the mounted image and
    is chosen when a command is written.
*/

use super::{context::FdcContext, registers::*};
use crate::{
    device_traits::floppy_controller::{ControllerDispatch, FloppyController},
    device_types::fdc::TrackGranularity,
    machine_config::FdcConfig,
    machine_types::EngineType,
    scheduler::FdcEvent,
};
use wd1772_common::HistoryBuffer;

pub const LINE_STATUS_COMMAND: u8 = 0;
pub const LINE_TRACK: u8 = 1;
pub const LINE_SECTOR: u8 = 2;
pub const LINE_DATA: u8 = 3;

/// Snapshot of the controller for debug displays and logs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FdcDebugState {
    pub engine: String,
    pub phase: String,
    pub cr: u8,
    pub tr: u8,
    pub sr: u8,
    pub dr: u8,
    pub str: u8,
    pub busy: bool,
    pub irq: bool,
    pub motor: bool,
    pub interrupt_condition: u8,
    pub index_counter: u8,
    pub spinning_up: u8,
}

pub struct Wd1772 {
    regs: FdcRegisters,
    engine: ControllerDispatch,
    cmd_log: HistoryBuffer<(u64, u8)>,
}

impl Wd1772 {
    pub fn new(config: &FdcConfig) -> Self {
        Self {
            regs: FdcRegisters::default(),
            engine: ControllerDispatch::for_engine(config.default_engine),
            cmd_log: HistoryBuffer::new(config.command_log_len.max(1)),
        }
    }

    pub fn reset(&mut self, ctx: &mut FdcContext) {
        log::debug!("WD1772: reset");
        self.engine.cancel_events(ctx);
        self.engine.reset();
        self.regs.reset();
        ctx.irq.set_irq(false);
    }

    pub fn regs(&self) -> &FdcRegisters {
        &self.regs
    }

    pub fn engine_type(&self) -> EngineType {
        self.engine.engine_type()
    }

    pub fn phase_name(&self) -> &'static str {
        self.engine.phase_name()
    }

    /// Accepted and ignored command bytes with the cycle they were written.
    pub fn command_log(&self) -> Vec<(u64, u8)> {
        self.cmd_log.as_vec()
    }

    pub fn read_register(&mut self, line: u8, ctx: &mut FdcContext) -> u8 {
        match line & 3 {
            LINE_STATUS_COMMAND => self.read_status(ctx),
            LINE_TRACK => self.regs.tr,
            LINE_SECTOR => self.regs.sr,
            _ => {
                self.regs.clear(STR_DRQ);
                self.regs.dr
            }
        }
    }

    fn read_status(&mut self, ctx: &mut FdcContext) -> u8 {
        if self.regs.type_i_status {
            let index_hole = ctx.drive_ref().is_some_and(|d| d.index_hole(ctx.now));
            self.regs.assign(STR_INDEX, index_hole);
            self.regs.assign(STR_WRITE_PROTECT, ctx.write_protected());
            self.regs.assign(STR_SPUN_UP, self.regs.spinning_up == 0);
            self.regs.assign(STR_TRACK0, ctx.track0());
        }
        if self.regs.lines.irq && self.regs.interrupt_condition != INT_COND_IMMEDIATE {
            self.regs.lines.irq = false;
            self.regs.irq_pin = false;
            ctx.irq.set_irq(false);
        }
        self.regs.str
    }

    pub fn write_register(&mut self, line: u8, value: u8, ctx: &mut FdcContext) {
        match line & 3 {
            LINE_STATUS_COMMAND => self.write_command(value, ctx),
            LINE_TRACK => self.regs.tr = value,
            LINE_SECTOR => self.regs.sr = value,
            _ => self.regs.dr = value,
        }
    }

    fn write_command(&mut self, command: u8, ctx: &mut FdcContext) {
        if command == 0xFF {
            log::debug!("WD1772: command $FF ignored");
            return;
        }
        self.cmd_log.push((ctx.now, command));
        self.regs.time_out = 0;
        self.select_engine(ctx);
        self.engine.write_command(&mut self.regs, command, ctx);
    }

    /// Swap engines if the selected drive's image needs the other one. An
    /// empty drive keeps the current engine.
    fn select_engine(&mut self, ctx: &mut FdcContext) {
        let wanted = match ctx.drive_ref().and_then(|d| d.image()).map(|i| i.granularity()) {
            Some(TrackGranularity::Byte) => EngineType::Legacy,
            Some(_) => EngineType::Cycle,
            None => return,
        };
        if wanted != self.engine.engine_type() {
            log::debug!("WD1772: switching to the {} engine", wanted);
            self.engine.cancel_events(ctx);
            self.engine = ControllerDispatch::for_engine(wanted);
        }
    }

    pub fn on_event(&mut self, event: FdcEvent, arg: u32, ctx: &mut FdcContext) {
        self.engine.on_event(&mut self.regs, event, arg, ctx);
    }

    /// The selected drive passed its index hole.
    pub fn on_index_pulse(&mut self, ctx: &mut FdcContext) {
        self.engine.on_index_pulse(&mut self.regs, ctx);
    }

    /// The selected drive's index period passed without a pulse.
    pub fn on_missed_index(&mut self, ctx: &mut FdcContext) {
        let empty = ctx.drive_ref().map_or(true, |d| d.is_empty());
        let turning = ctx.drive_ref().is_some_and(|d| d.motor_on());
        if (self.regs.spinning_up != 0 && empty) || !turning {
            self.regs.time_out = self.regs.time_out.saturating_add(1);
        }
    }

    pub fn debug_state(&self) -> FdcDebugState {
        FdcDebugState {
            engine: self.engine.engine_type().to_string(),
            phase: self.engine.phase_name().to_string(),
            cr: self.regs.cr,
            tr: self.regs.tr,
            sr: self.regs.sr,
            dr: self.regs.dr,
            str: self.regs.str,
            busy: self.regs.busy(),
            irq: self.regs.lines.irq,
            motor: self.regs.lines.motor,
            interrupt_condition: self.regs.interrupt_condition,
            index_counter: self.regs.index_counter,
            spinning_up: self.regs.spinning_up,
        }
    }
}
