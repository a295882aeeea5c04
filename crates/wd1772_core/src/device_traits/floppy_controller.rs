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

    device_traits::floppy_controller.rs

    Defines the FloppyController trait which both WD1772 engines (cycle
    accurate and legacy sector level) must implement.
*/

use crate::{
    devices::fdc::{context::FdcContext, legacy::LegacyController, registers::FdcRegisters, wd1772::Wd1772Engine},
    machine_types::EngineType,
    scheduler::FdcEvent,
};
use enum_dispatch::enum_dispatch;

#[enum_dispatch]
#[derive(Clone, Debug)]
pub enum ControllerDispatch {
    Wd1772Engine,
    LegacyController,
}

impl ControllerDispatch {
    pub fn for_engine(engine: EngineType) -> Self {
        match engine {
            EngineType::Cycle => Wd1772Engine::new().into(),
            EngineType::Legacy => LegacyController::new().into(),
        }
    }
}

/// The engine behind the register file. Both engines share the registers
/// and differ in how a command is carried out.
#[enum_dispatch(ControllerDispatch)]
pub trait FloppyController {
    fn engine_type(&self) -> EngineType;
    fn reset(&mut self);
    /// A byte was written to the command register.
    fn write_command(&mut self, regs: &mut FdcRegisters, command: u8, ctx: &mut FdcContext);
    /// An event this engine scheduled is due.
    fn on_event(&mut self, regs: &mut FdcRegisters, event: FdcEvent, arg: u32, ctx: &mut FdcContext);
    /// The selected drive reached its index hole.
    fn on_index_pulse(&mut self, regs: &mut FdcRegisters, ctx: &mut FdcContext);
    /// Drop every event this engine has pending.
    fn cancel_events(&mut self, ctx: &mut FdcContext);
    fn phase_name(&self) -> &'static str;
}
