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

    devices::fdc::legacy.rs

    Sector level controller for byte granular images.
    
    Commands run as agendas: callbacks scheduled a number of scanlines
    ahead. Timing comes from the standard track layout, not from MFM cells,
    so the controller stays cheap while keeping realistic delays.
*/

use super::{context::FdcContext, registers::*};
use crate::{
    device_traits::floppy_controller::FloppyController,
    device_types::fdc::{build_track, IdField, TrackLayout},
    devices::floppy_drive::FloppyDiskDrive,
    error::FdcError,
    machine_types::EngineType,
    scheduler::FdcEvent,
};
use rand::Rng;
use strum_macros::{Display, IntoStaticStr};

/// Step rate in scanlines, by the command's r1 r0 bits.
pub const STEP_HBLS: [u64; 4] = [94, 188, 32, 47];
/// Delay before an interrupt that needs no disk activity.
pub const DEFAULT_INTERRUPT_HBLS: u64 = 64;
pub const NOT_FOUND_REVOLUTIONS: u64 = 5;
pub const NOT_FOUND_REVOLUTIONS_MONO: u64 = 11;
pub const SPINUP_REVOLUTIONS: u8 = 6;
pub const MOTOR_OFF_REVOLUTIONS: u8 = 10;
/// Bytes moved by one sector or track agenda.
const STAGE_BYTES: usize = 16;
const LAST_SECTOR_STAGE: u32 = 64;
const SECTOR_DONE_STAGE: u32 = 65;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Display, IntoStaticStr)]
pub enum Agenda {
    MotorFlagOff,
    SpunUp,
    Verify,
    Finished,
    Seek,
    ReadWriteSector,
    ReadAddress,
    ReadTrack,
    WriteTrack,
}

/// What the pending Finished agenda will report.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum IrqFlag {
    #[default]
    None,
    /// Finish after the command's delay.
    Yes,
    /// Record not found: finish after several revolutions.
    OneSec,
    /// Finish at once.
    Now,
}

/// Parser state of a Write Track byte stream.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
enum FormatParse {
    #[default]
    Gap,
    Sync,
    Id {
        bytes: [u8; 4],
        got: usize,
    },
    Data {
        remaining: usize,
    },
}

#[derive(Clone, Debug, Default)]
pub struct LegacyController {
    irq_flag: IrqFlag,
    hbls_to_interrupt: u64,
    track_buffer: Vec<u8>,
    bytes_done: usize,
    format: FormatParse,
    format_sector: Option<u8>,
    current_agenda: Option<Agenda>,
}

/// Byte offsets of each record's first ID byte and first data byte.
fn record_positions(ids: &[IdField]) -> Vec<(usize, usize)> {
    let layout = TrackLayout::for_sectors(ids.len());
    let mut offset = layout.post_index_gap;
    ids.iter()
        .map(|id| {
            let record = offset;
            offset += layout.record_length(id.sector_size());
            (record + layout.id_sync_zeros + 4, record + layout.pre_data_gap())
        })
        .collect()
}

/// Bytes until `to` passes under the head when it is at `from`.
fn bytes_until(from: usize, to: usize, track_bytes: usize) -> usize {
    (to + track_bytes - from % track_bytes) % track_bytes
}

/// Signed distance of `current` ahead of `theory` on a circular track.
fn drift(current: usize, theory: usize, track_bytes: usize) -> i64 {
    let ahead = bytes_until(theory % track_bytes, current, track_bytes) as i64;
    if ahead > track_bytes as i64 / 2 {
        ahead - track_bytes as i64
    }
    else {
        ahead
    }
}

impl LegacyController {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn irq_flag(&self) -> IrqFlag {
        self.irq_flag
    }

    fn schedule(&self, ctx: &mut FdcContext, agenda: Agenda, hbls: u64, arg: u32) {
        let hbl = ctx.config.cycles_per_hbl.max(1);
        let at = (ctx.now / hbl + hbls.max(1)) * hbl;
        log::trace!("LegacyController: {} in {} hbls ({})", agenda, hbls, arg);
        ctx.scheduler.schedule(at, FdcEvent::Agenda(agenda), arg);
    }

    fn cancel(&self, ctx: &mut FdcContext, agenda: Agenda) {
        ctx.scheduler.cancel(FdcEvent::Agenda(agenda));
    }

    fn hbls_to_next_index(&self, ctx: &mut FdcContext) -> u64 {
        let hbl = ctx.config.cycles_per_hbl.max(1);
        match ctx.drive_ref() {
            Some(drive) => drive.next_index_time().saturating_sub(ctx.now).div_ceil(hbl),
            None => ctx.config.hbls_per_revolution(),
        }
    }

    /// Scanlines per Read/Write Track stage.
    fn stage_hbls(&self, ctx: &FdcContext) -> u64 {
        let track_bytes = ctx.config.track_bytes as u64;
        (ctx.config.hbls_per_revolution() * STAGE_BYTES as u64 / track_bytes.max(1)).max(1)
    }

    fn head_position(&self, ctx: &FdcContext) -> usize {
        ctx.drive_ref().map_or(0, |d| d.byte_position(ctx.now) as usize)
    }

    fn set_irq(&mut self, state: bool, regs: &mut FdcRegisters, ctx: &mut FdcContext) {
        regs.lines.irq = state;
        regs.irq_pin = state;
        ctx.irq.set_irq(state);
    }

    fn set_motor(&mut self, state: bool, regs: &mut FdcRegisters, ctx: &mut FdcContext) {
        regs.lines.motor = state;
        regs.assign(STR_MOTOR_ON, state);
        ctx.set_motor(state);
    }

    /// Report record not found once the drive has turned long enough.
    fn fail_slowly(&mut self, empty: bool, ctx: &mut FdcContext) {
        let revolutions = if empty && ctx.config.monochrome {
            NOT_FOUND_REVOLUTIONS_MONO
        }
        else {
            NOT_FOUND_REVOLUTIONS
        };
        self.irq_flag = IrqFlag::OneSec;
        self.cancel(ctx, Agenda::Finished);
        self.schedule(ctx, Agenda::Finished, revolutions * ctx.config.hbls_per_revolution(), 0);
    }

    fn finished(&mut self, regs: &mut FdcRegisters, ctx: &mut FdcContext) {
        if self.irq_flag == IrqFlag::OneSec {
            regs.set(STR_RECORD_NOT_FOUND);
        }
        self.irq_flag = IrqFlag::Now;
        self.set_irq(true, regs, ctx);
        regs.clear(STR_BUSY | STR_DRQ | STR_TRACK0);
        if regs.type_i_status && ctx.track0() {
            regs.set(STR_TRACK0);
        }
        log::debug!("LegacyController: {} done, str {:02X}", command_name(regs.cr), regs.str);

        if regs.interrupt_condition == INT_COND_INDEX {
            let hbls = ctx.config.hbls_per_revolution();
            self.schedule(ctx, Agenda::Finished, hbls, 0);
        }
        else {
            self.cancel(ctx, Agenda::MotorFlagOff);
            regs.index_counter = 0;
            let hbls = self.hbls_to_next_index(ctx);
            self.schedule(ctx, Agenda::MotorFlagOff, hbls, 0);
        }
    }

    fn execute(&mut self, regs: &mut FdcRegisters, ctx: &mut FdcContext) {
        self.irq_flag = IrqFlag::Yes;
        self.hbls_to_interrupt = DEFAULT_INTERRUPT_HBLS;
        log::debug!("LegacyController: execute {:02X} {}", regs.cr, command_name(regs.cr));
        match CommandType::decode(regs.cr) {
            CommandType::TypeI => self.execute_type_i(regs, ctx),
            CommandType::TypeII => self.execute_type_ii(regs, ctx),
            CommandType::TypeIII => self.execute_type_iii(regs, ctx),
            CommandType::TypeIV => self.irq_flag = IrqFlag::None,
        }
        if self.irq_flag == IrqFlag::Yes {
            self.schedule(ctx, Agenda::Finished, self.hbls_to_interrupt, 0);
        }
    }

    fn execute_type_i(&mut self, regs: &mut FdcRegisters, ctx: &mut FdcContext) {
        let cmd = TypeICommand::from_bytes([regs.cr]);
        self.hbls_to_interrupt = STEP_HBLS[cmd.rate() as usize];
        regs.type_i_status = true;
        let empty = ctx.loaded_drive().is_none();

        match regs.cr & 0xF0 {
            0x00 => {
                if cmd.verify() && empty {
                    regs.str = STR_SEEK_ERROR | STR_MOTOR_ON | STR_BUSY;
                }
                else {
                    regs.tr = 0xFF;
                    regs.dr = 0;
                    self.irq_flag = IrqFlag::None;
                    if ctx.track0() {
                        regs.tr = 0;
                    }
                    regs.str = STR_MOTOR_ON | STR_BUSY;
                    self.schedule(ctx, Agenda::Seek, 1, 0);
                }
            }
            0x10 => {
                regs.str = STR_MOTOR_ON | STR_BUSY;
                self.irq_flag = IrqFlag::None;
                self.schedule(ctx, Agenda::Seek, 2, 0);
            }
            _ => {
                regs.str = STR_MOTOR_ON | STR_BUSY;
                if empty {
                    if cmd.verify() {
                        regs.set(STR_SEEK_ERROR);
                    }
                    return;
                }
                match regs.cr & CR_STEP {
                    CR_STEP_IN => regs.lines.direction = true,
                    CR_STEP_OUT => regs.lines.direction = false,
                    _ => {}
                }
                let direction = regs.lines.direction;
                if cmd.update() {
                    regs.tr = if direction {
                        regs.tr.wrapping_add(1)
                    }
                    else {
                        regs.tr.wrapping_sub(1)
                    };
                }
                if !direction && ctx.track0() {
                    regs.tr = 0;
                }
                else {
                    if let Some(drive) = ctx.drive() {
                        drive.step(direction);
                    }
                    self.irq_flag = IrqFlag::None;
                    self.check_verify(regs, ctx);
                }
            }
        }
    }

    fn check_verify(&mut self, regs: &mut FdcRegisters, ctx: &mut FdcContext) {
        if regs.cr & CR_V == 0 {
            self.schedule(ctx, Agenda::Verify, 2, 0);
            return;
        }
        let settle = ctx.config.ms_to_hbls(HEAD_SETTLE_MS);
        let side = ctx.side();
        let head = self.head_position(ctx);
        let track_bytes = ctx.config.track_bytes as usize;
        let next_id = ctx.loaded_drive().and_then(|drive| {
            let track = drive.track();
            let ids = drive.image()?.id_fields(side, track);
            record_positions(&ids)
                .iter()
                .map(|&(id_pos, _)| bytes_until(head, id_pos, track_bytes))
                .min()
        });
        let hbls = match next_id {
            Some(bytes) => ctx.config.bytes_to_hbls(bytes as u64) + settle,
            None => NOT_FOUND_REVOLUTIONS * ctx.config.hbls_per_revolution(),
        };
        self.schedule(ctx, Agenda::Verify, hbls, 0);
    }

    fn agenda_verify(&mut self, regs: &mut FdcRegisters, ctx: &mut FdcContext) {
        if regs.type_i_status && regs.cr & CR_V != 0 {
            let side = ctx.side();
            let tr = regs.tr;
            let ids = ctx
                .loaded_drive()
                .filter(|drive| drive.check_side(side).is_ok() && drive.track() == tr)
                .and_then(|drive| {
                    let image = drive.image()?;
                    (tr < image.tracks()).then(|| image.id_fields(side, tr))
                })
                .unwrap_or_default();
            let on_track = |id: &&IdField| id.track == tr;
            if !ids.iter().filter(on_track).any(IdField::crc_ok) {
                log::debug!("LegacyController: verify failed on track {}", tr);
                if ids.iter().any(|id| on_track(&id)) {
                    regs.set(STR_CRC_ERROR);
                }
                regs.set(STR_SEEK_ERROR);
            }
        }
        self.finished(regs, ctx);
    }

    fn agenda_seek(&mut self, regs: &mut FdcRegisters, ctx: &mut FdcContext) {
        let restore = regs.cr & 0xF0 == 0;
        if regs.tr == regs.dr {
            self.check_verify(regs, ctx);
            return;
        }
        if regs.tr > regs.dr {
            regs.tr -= 1;
            regs.lines.direction = false;
            if let Some(drive) = ctx.drive() {
                drive.step(false);
            }
            if ctx.drive_ref().is_some() && ctx.track0() && restore {
                regs.tr = 0;
                regs.set(STR_TRACK0);
            }
            else if restore && regs.tr == 0 {
                // Restore gave up without seeing the track 0 sensor.
                if regs.cr & CR_V != 0 {
                    regs.set(STR_SEEK_ERROR);
                }
                self.finished(regs, ctx);
                return;
            }
        }
        else {
            regs.tr += 1;
            regs.lines.direction = true;
            if let Some(drive) = ctx.drive() {
                drive.step(true);
            }
        }
        let rate = TypeICommand::from_bytes([regs.cr]).rate() as usize;
        self.schedule(ctx, Agenda::Seek, STEP_HBLS[rate], 0);
    }

    fn agenda_spun_up(&mut self, regs: &mut FdcRegisters, delay_exec: bool, ctx: &mut FdcContext) {
        // Only a selected, spinning drive produces index pulses.
        if ctx.drive_ref().is_some_and(|d| d.motor_on()) {
            regs.index_counter = regs.index_counter.saturating_add(1);
        }
        if regs.index_counter < SPINUP_REVOLUTIONS {
            let hbls = ctx.config.hbls_per_revolution();
            self.schedule(ctx, Agenda::SpunUp, hbls, delay_exec as u32);
            return;
        }
        log::trace!("LegacyController: spun up");
        regs.index_counter = 0;
        regs.spinning_up = 0;
        if regs.type_i_status {
            regs.set(STR_SPUN_UP);
        }
        if delay_exec {
            self.execute(regs, ctx);
        }
    }

    fn agenda_motor_flag_off(&mut self, regs: &mut FdcRegisters, ctx: &mut FdcContext) {
        regs.index_counter = regs.index_counter.saturating_add(1);
        if regs.index_counter < MOTOR_OFF_REVOLUTIONS {
            let hbls = ctx.config.hbls_per_revolution();
            self.schedule(ctx, Agenda::MotorFlagOff, hbls, 0);
        }
        else {
            regs.index_counter = 0;
            self.set_motor(false, regs, ctx);
        }
    }

    fn execute_type_ii(&mut self, regs: &mut FdcRegisters, ctx: &mut FdcContext) {
        regs.type_i_status = false;
        regs.str = STR_MOTOR_ON | STR_BUSY;
        self.irq_flag = IrqFlag::None;
        let side = ctx.side();
        let usable = ctx
            .loaded_drive()
            .is_some_and(|d| d.check_side(side).is_ok() && d.image().is_some_and(|i| d.track() < i.tracks()));
        if !usable {
            let empty = ctx.loaded_drive().is_none();
            self.fail_slowly(empty, ctx);
            return;
        }
        self.schedule_sector(regs, ctx);
    }

    /// Schedule the transfer of the sector in the sector register, 16 bytes
    /// before its data passes under the head.
    fn schedule_sector(&mut self, regs: &mut FdcRegisters, ctx: &mut FdcContext) {
        let side = ctx.side();
        let head = self.head_position(ctx);
        let track_bytes = ctx.config.track_bytes as usize;
        let (tr, sr) = (regs.tr, regs.sr);
        let mut bad_id_crc = false;
        let start = ctx.loaded_drive().and_then(|drive| {
            let ids = drive.image()?.id_fields(side, drive.track());
            let matching = |id: &IdField| id.track == tr && id.sector == sr;
            bad_id_crc = ids.iter().any(|id| matching(id) && !id.crc_ok());
            let index = ids.iter().position(|id| matching(id) && id.crc_ok())?;
            let (_, data_pos) = record_positions(&ids)[index];
            Some((data_pos + track_bytes - STAGE_BYTES) % track_bytes)
        });
        match start {
            Some(start) => {
                let hbls = ctx.config.bytes_to_hbls(bytes_until(head, start, track_bytes) as u64);
                self.schedule(ctx, Agenda::ReadWriteSector, hbls, (start as u32) << 16);
            }
            None => {
                if bad_id_crc {
                    log::debug!("LegacyController: ID CRC error on sector {}", sr);
                    regs.set(STR_CRC_ERROR);
                }
                else {
                    log::debug!("LegacyController: sector {} not found on track {}", sr, tr);
                }
                self.fail_slowly(false, ctx);
            }
        }
    }

    fn agenda_read_write_sector(&mut self, regs: &mut FdcRegisters, arg: u32, ctx: &mut FdcContext) {
        let mut part = arg & 0xFFFF;
        let start = (arg >> 16) as usize;
        let write = regs.cr & CR_TYPEII_WRITE != 0;
        let side = ctx.side();
        let (tr, sr) = (regs.tr, regs.sr);

        let wp = match ctx.loaded_drive() {
            Some(drive) if write && drive.write_protected() => STR_WRITE_PROTECT,
            Some(_) => 0,
            None => {
                regs.str = STR_MOTOR_ON | STR_BUSY;
                self.fail_slowly(true, ctx);
                return;
            }
        };
        regs.str = STR_BUSY | STR_MOTOR_ON | wp;

        if part == 0 {
            let seek = ctx.loaded_drive().map(|drive| {
                let track = drive.track();
                match drive.image_mut() {
                    Some(image) => image.seek_sector(side, track, sr, false),
                    None => Err(FdcError::SectorNotFound { side, track, sector: sr }),
                }
            });
            if let Some(Err(e)) = seek {
                log::debug!("LegacyController: {}", e);
                self.fail_slowly(false, ctx);
                return;
            }
        }
        else if part <= LAST_SECTOR_STAGE {
            if wp != 0 {
                self.irq_flag = IrqFlag::Now;
            }
            else {
                let done = self.transfer_stage(write, part, ctx);
                if done {
                    part = LAST_SECTOR_STAGE;
                }
            }
        }
        else if part == SECTOR_DONE_STAGE {
            self.irq_flag = IrqFlag::Now;
            if regs.cr & CR_M != 0 {
                regs.next_sector();
                self.irq_flag = IrqFlag::None;
                log::trace!("LegacyController: multiple sector, next {} on track {}", regs.sr, tr);
                self.schedule_sector(regs, ctx);
                return;
            }
        }

        part += 1;
        match self.irq_flag {
            IrqFlag::Now => {
                regs.str = wp | STR_MOTOR_ON;
                self.finished(regs, ctx);
                return;
            }
            IrqFlag::OneSec => {
                regs.str = wp | STR_MOTOR_ON | STR_BUSY;
                self.fail_slowly(false, ctx);
                return;
            }
            _ => {}
        }

        let track_bytes = ctx.config.track_bytes as usize;
        let mut bytes = if part == SECTOR_DONE_STAGE { 19 } else { STAGE_BYTES as i64 };
        if part < SECTOR_DONE_STAGE {
            let theory = start + (part as usize - 1) * STAGE_BYTES;
            match drift(self.head_position(ctx), theory, track_bytes) {
                d if d > 1 => bytes -= 2,
                d if d < -1 => bytes += 2,
                _ => {}
            }
            if part == LAST_SECTOR_STAGE {
                bytes += 3;
            }
        }
        let hbls = ctx.config.bytes_to_hbls(bytes as u64);
        self.schedule(ctx, Agenda::ReadWriteSector, hbls, ((start as u32) << 16) | part);
    }

    /// Move one stage of sector data. Returns true once the sector is complete.
    fn transfer_stage(&mut self, write: bool, part: u32, ctx: &mut FdcContext) -> bool {
        let FdcContext { drives, select, dma, .. } = ctx;
        let Some(image) = select
            .drive
            .and_then(|n| drives.get_mut(n))
            .and_then(FloppyDiskDrive::image_mut)
        else {
            return true;
        };
        for _ in 0..STAGE_BYTES {
            if write {
                let byte = dma.pop_byte();
                if image.write_byte(byte).is_err() {
                    break;
                }
            }
            else {
                match image.read_byte() {
                    // The DMA only takes bytes while its sector count is loaded.
                    Ok(byte) if dma.counter() > 0 => dma.push_byte(byte),
                    Ok(_) => {}
                    Err(_) => break,
                }
            }
        }
        part as usize * STAGE_BYTES >= image.sector_length()
    }

    fn execute_type_iii(&mut self, regs: &mut FdcRegisters, ctx: &mut FdcContext) {
        regs.type_i_status = false;
        regs.str = STR_MOTOR_ON | STR_BUSY;
        self.irq_flag = IrqFlag::None;
        if ctx.loaded_drive().is_none() {
            self.fail_slowly(true, ctx);
            return;
        }
        match regs.cr & 0xF0 {
            CR_READ_ADDRESS => {
                let side = ctx.side();
                let head = self.head_position(ctx);
                let track_bytes = ctx.config.track_bytes as usize;
                let next = ctx.loaded_drive().and_then(|drive| {
                    drive.check_side(side).ok()?;
                    let ids = drive.image()?.id_fields(side, drive.track());
                    record_positions(&ids)
                        .iter()
                        .enumerate()
                        .map(|(i, &(id_pos, _))| (bytes_until(head, id_pos, track_bytes), i))
                        .min()
                });
                match next {
                    Some((bytes, index)) => {
                        let hbls = ctx.config.bytes_to_hbls(bytes as u64);
                        self.schedule(ctx, Agenda::ReadAddress, hbls, index as u32);
                    }
                    None => self.fail_slowly(false, ctx),
                }
            }
            CR_READ_TRACK => {
                self.track_buffer.clear();
                let hbls = self.hbls_to_next_index(ctx);
                self.schedule(ctx, Agenda::ReadTrack, hbls, 0);
            }
            _ => {
                self.bytes_done = 0;
                self.format = FormatParse::Gap;
                self.format_sector = None;
                let hbls = self.hbls_to_next_index(ctx);
                self.schedule(ctx, Agenda::WriteTrack, hbls, 0);
            }
        }
    }

    fn agenda_read_address(&mut self, regs: &mut FdcRegisters, index: u32, ctx: &mut FdcContext) {
        let side = ctx.side();
        let id = ctx.loaded_drive().and_then(|drive| {
            let ids = drive.image()?.id_fields(side, drive.track());
            ids.get(index as usize).copied()
        });
        let Some(id) = id
        else {
            self.fail_slowly(false, ctx);
            return;
        };
        for byte in id.bytes() {
            ctx.dma.push_byte(byte);
        }
        regs.sr = id.track;
        regs.str = STR_MOTOR_ON | STR_BUSY;
        self.finished(regs, ctx);
    }

    /// The raw bytes of the track under the head, as Read Track sees them.
    fn synthesize_track(drive: &mut FloppyDiskDrive, side: u8, track_bytes: usize) -> Vec<u8> {
        let track = drive.track();
        let Some(image) = drive.image_mut()
        else {
            return vec![0; track_bytes];
        };
        let ids = image.id_fields(side, track);
        if ids.is_empty() {
            let mut rng = rand::thread_rng();
            return (0..track_bytes).map(|_| rng.gen()).collect();
        }
        let data: Vec<Vec<u8>> = ids
            .iter()
            .map(|id| {
                let mut bytes = Vec::with_capacity(id.sector_size());
                if image.seek_sector(side, track, id.sector, false).is_ok() {
                    while let Ok(b) = image.read_byte() {
                        bytes.push(b);
                    }
                }
                bytes.resize(id.sector_size(), 0);
                bytes
            })
            .collect();
        let sectors: Vec<(IdField, &[u8])> = ids.iter().copied().zip(data.iter().map(Vec::as_slice)).collect();
        let mut layout = TrackLayout::for_sectors(ids.len());
        layout.track_bytes = track_bytes;
        build_track(&layout, &sectors).into_iter().map(|b| b.value).collect()
    }

    fn agenda_read_track(&mut self, regs: &mut FdcRegisters, part: u32, ctx: &mut FdcContext) {
        let side = ctx.side();
        let track_bytes = ctx.config.track_bytes as usize;
        if part == 0 {
            match ctx.loaded_drive() {
                Some(drive) => self.track_buffer = Self::synthesize_track(drive, side, track_bytes),
                None => {
                    self.fail_slowly(true, ctx);
                    return;
                }
            }
        }
        let from = part as usize * STAGE_BYTES;
        let to = (from + STAGE_BYTES).min(self.track_buffer.len());
        for &byte in self.track_buffer.get(from..to).unwrap_or(&[]) {
            ctx.dma.push_byte(byte);
        }
        if to >= self.track_buffer.len() {
            regs.str = STR_MOTOR_ON | STR_BUSY;
            self.finished(regs, ctx);
            return;
        }
        let mut hbls = self.stage_hbls(ctx);
        if self.head_position(ctx) > to {
            hbls = hbls.saturating_sub(1);
        }
        self.schedule(ctx, Agenda::ReadTrack, hbls, part + 1);
    }

    fn agenda_write_track(&mut self, regs: &mut FdcRegisters, part: u32, ctx: &mut FdcContext) {
        let side = ctx.side();
        let protected = ctx.write_protected();
        if protected {
            regs.str = STR_MOTOR_ON | STR_WRITE_PROTECT | STR_BUSY;
            self.finished(regs, ctx);
            return;
        }
        if part == 0 {
            let formatted = ctx.loaded_drive().map(|drive| {
                let track = drive.track();
                log::debug!("LegacyController: format side {} track {}", side, track);
                match drive.image_mut() {
                    Some(image) => image.format_track(side, track),
                    None => Err(FdcError::NoSectorSelected),
                }
            });
            match formatted {
                Some(Ok(())) => {}
                Some(Err(FdcError::WriteProtected)) => {
                    regs.str = STR_MOTOR_ON | STR_WRITE_PROTECT | STR_BUSY;
                    self.finished(regs, ctx);
                    return;
                }
                other => {
                    log::warn!("LegacyController: cannot format track: {:?}", other);
                    regs.str = STR_MOTOR_ON | STR_BUSY;
                    self.finished(regs, ctx);
                    return;
                }
            }
        }

        for _ in 0..STAGE_BYTES {
            let byte = ctx.dma.pop_byte();
            self.parse_format_byte(byte, side, ctx);
        }
        self.bytes_done += STAGE_BYTES;
        if self.bytes_done > ctx.config.track_bytes as usize {
            regs.str = STR_MOTOR_ON | STR_BUSY;
            self.finished(regs, ctx);
            return;
        }
        let hbls = self.stage_hbls(ctx);
        self.schedule(ctx, Agenda::WriteTrack, hbls, part + 1);
    }

    /// Feed one Write Track byte to the format parser.
    fn parse_format_byte(&mut self, byte: u8, side: u8, ctx: &mut FdcContext) {
        let Some(drive) = ctx.loaded_drive()
        else {
            return;
        };
        let track = drive.track();
        let Some(image) = drive.image_mut()
        else {
            return;
        };
        let is_sync = matches!(byte, 0xA1 | 0xF5 | 0xC2 | 0xF6);
        self.format = match self.format {
            FormatParse::Gap | FormatParse::Sync if is_sync => FormatParse::Sync,
            FormatParse::Sync if byte == 0xFE => FormatParse::Id { bytes: [0; 4], got: 0 },
            FormatParse::Sync if (0xF8..=0xFB).contains(&byte) => match self.format_sector.take() {
                Some(sector) if image.seek_sector(side, track, sector, true).is_ok() => FormatParse::Data {
                    remaining: image.sector_length(),
                },
                _ => FormatParse::Gap,
            },
            FormatParse::Gap | FormatParse::Sync => FormatParse::Gap,
            FormatParse::Id { mut bytes, got } => {
                bytes[got] = byte;
                if got + 1 < bytes.len() {
                    FormatParse::Id { bytes, got: got + 1 }
                }
                else if bytes[3] > 3 {
                    log::debug!("LegacyController: skipping ID field with length code {:02X}", bytes[3]);
                    FormatParse::Gap
                }
                else {
                    let id = IdField::new(bytes[0], bytes[1], bytes[2], bytes[3]);
                    match image.format_sector(side, track, id) {
                        Ok(()) => self.format_sector = Some(id.sector),
                        Err(e) => log::debug!("LegacyController: {}", e),
                    }
                    FormatParse::Gap
                }
            }
            FormatParse::Data { remaining } => {
                if image.write_byte(byte).is_err() || remaining <= 1 {
                    FormatParse::Gap
                }
                else {
                    FormatParse::Data { remaining: remaining - 1 }
                }
            }
        };
    }

    fn force_interrupt(&mut self, regs: &mut FdcRegisters, was_busy: bool, ctx: &mut FdcContext) {
        if !was_busy {
            regs.type_i_status = true;
        }
        for agenda in [
            Agenda::Seek,
            Agenda::ReadWriteSector,
            Agenda::ReadAddress,
            Agenda::ReadTrack,
            Agenda::WriteTrack,
            Agenda::Verify,
            Agenda::SpunUp,
            Agenda::Finished,
        ] {
            self.cancel(ctx, agenda);
        }
        regs.spinning_up = 0;
        regs.str &= STR_MOTOR_ON;
        let fi = ForceInterruptCommand::from_bytes([regs.cr]);
        if fi.immediate() {
            regs.interrupt_condition = INT_COND_IMMEDIATE;
            self.finished(regs, ctx);
        }
        else if fi.on_index() {
            regs.interrupt_condition = INT_COND_INDEX;
            self.irq_flag = IrqFlag::None;
            let hbls = self.hbls_to_next_index(ctx);
            self.schedule(ctx, Agenda::Finished, hbls, 0);
        }
        else {
            self.irq_flag = IrqFlag::None;
            regs.interrupt_condition = 0;
            regs.index_counter = MOTOR_OFF_REVOLUTIONS - 1;
            let hbls = 9 * ctx.config.hbls_per_revolution();
            self.schedule(ctx, Agenda::MotorFlagOff, hbls, 0);
        }
    }
}

impl FloppyController for LegacyController {
    fn engine_type(&self) -> EngineType {
        EngineType::Legacy
    }

    fn reset(&mut self) {
        *self = Default::default();
    }

    fn write_command(&mut self, regs: &mut FdcRegisters, command: u8, ctx: &mut FdcContext) {
        let busy = regs.busy();
        let command_type = CommandType::decode(command);
        if busy && regs.spinning_up == 0 && command_type != CommandType::TypeIV {
            log::debug!("LegacyController: command {:02X} ignored while busy", command);
            return;
        }
        log::debug!("LegacyController: command {:02X} {}", command, command_name(command));
        if regs.interrupt_condition != INT_COND_IMMEDIATE {
            self.set_irq(false, regs, ctx);
        }
        regs.interrupt_condition = 0;
        self.cancel(ctx, Agenda::Finished);
        self.irq_flag = IrqFlag::None;
        regs.cr = command;
        self.cancel(ctx, Agenda::MotorFlagOff);

        if command_type == CommandType::TypeIV {
            self.force_interrupt(regs, busy, ctx);
            return;
        }
        if busy {
            // Spinning up: the new command replaces the pending one.
            return;
        }
        if regs.str & STR_MOTOR_ON == 0 {
            let delay_exec = command & CR_H == 0;
            regs.str = STR_BUSY | STR_MOTOR_ON;
            regs.spinning_up = if delay_exec { 2 } else { 1 };
            self.set_motor(true, regs, ctx);
            regs.index_counter = 0;
            let hbls = self.hbls_to_next_index(ctx);
            self.schedule(ctx, Agenda::SpunUp, hbls, delay_exec as u32);
            if !delay_exec {
                self.execute(regs, ctx);
            }
        }
        else {
            self.execute(regs, ctx);
        }
    }

    fn on_event(&mut self, regs: &mut FdcRegisters, event: FdcEvent, arg: u32, ctx: &mut FdcContext) {
        let FdcEvent::Agenda(agenda) = event
        else {
            return;
        };
        self.current_agenda = Some(agenda);
        match agenda {
            Agenda::MotorFlagOff => self.agenda_motor_flag_off(regs, ctx),
            Agenda::SpunUp => self.agenda_spun_up(regs, arg != 0, ctx),
            Agenda::Verify => self.agenda_verify(regs, ctx),
            Agenda::Finished => self.finished(regs, ctx),
            Agenda::Seek => self.agenda_seek(regs, ctx),
            Agenda::ReadWriteSector => self.agenda_read_write_sector(regs, arg, ctx),
            Agenda::ReadAddress => self.agenda_read_address(regs, arg, ctx),
            Agenda::ReadTrack => self.agenda_read_track(regs, arg, ctx),
            Agenda::WriteTrack => self.agenda_write_track(regs, arg, ctx),
        }
    }

    fn on_index_pulse(&mut self, _regs: &mut FdcRegisters, _ctx: &mut FdcContext) {
        // Agendas count revolutions in scanlines.
    }

    fn cancel_events(&mut self, ctx: &mut FdcContext) {
        ctx.scheduler.cancel_agendas();
    }

    fn phase_name(&self) -> &'static str {
        self.current_agenda.map_or("Idle", Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_positions_follow_layout() {
        let ids: Vec<IdField> = (1..=9).map(|s| IdField::new(0, 0, s, 2)).collect();
        let layout = TrackLayout::for_sectors(9);
        let positions = record_positions(&ids);
        assert_eq!(positions.len(), 9);
        for (i, &(id_pos, data_pos)) in positions.iter().enumerate() {
            assert_eq!(id_pos, layout.id_position(i, 512));
            assert_eq!(data_pos, layout.data_position(i, 512));
        }
    }

    #[test]
    fn test_circular_distances() {
        assert_eq!(bytes_until(100, 150, 6250), 50);
        assert_eq!(bytes_until(6200, 10, 6250), 60);
        assert_eq!(bytes_until(10, 10, 6250), 0);
        assert_eq!(drift(105, 100, 6250), 5);
        assert_eq!(drift(95, 100, 6250), -5);
        assert_eq!(drift(2, 6248, 6250), 4);
    }
}
