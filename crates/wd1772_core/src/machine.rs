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

    machine.rs

    A floppy subsystem on one clock: the controller, its drives, a DMA FIFO
    and an interrupt latch, advanced by cycle counts from the host.
*/

use crate::{
    bus::{DeviceRunTimeUnit, IoDevice},
    devices::{
        dma::DmaFifo,
        fdc::{
            context::{DriveSelect, FdcContext},
            controller::*,
            FdcDebugState,
            Wd1772,
        },
        floppy_drive::{FloppyDiskDrive, IndexEvent},
        image::DiskImage,
    },
    error::FdcError,
    interrupt::IrqLatch,
    machine_config::{FdcConfig, MachineFdcConfig, MAX_DRIVES},
    scheduler::EventQueue,
};

/// First of the four ports the register lines are decoded at.
pub const FDC_PORT_BASE: u16 = 0x80;

pub struct FloppySystem {
    config: FdcConfig,
    drives: Vec<FloppyDiskDrive>,
    queue: EventQueue,
    dma: DmaFifo,
    irq: IrqLatch,
    select: DriveSelect,
    fdc: Wd1772,
    cycles: u64,
}

impl FloppySystem {
    pub fn new(config: &MachineFdcConfig) -> Self {
        let drives = config
            .drive
            .iter()
            .take(MAX_DRIVES)
            .enumerate()
            .map(|(n, drive_cfg)| FloppyDiskDrive::new(n, drive_cfg, &config.fdc))
            .collect::<Vec<_>>();
        log::debug!(
            "FloppySystem: {} drive(s), {} cycles per byte, default engine {}",
            drives.len(),
            config.fdc.cycles_per_byte(),
            config.fdc.default_engine
        );
        Self {
            config: config.fdc.clone(),
            drives,
            queue: EventQueue::new(),
            dma: DmaFifo::new(),
            irq: IrqLatch::new(),
            select: DriveSelect::default(),
            fdc: Wd1772::new(&config.fdc),
            cycles: 0,
        }
    }

    /// Split the system into the controller and the context it runs in.
    fn split(&mut self) -> (&mut Wd1772, FdcContext<'_>) {
        let ctx = FdcContext {
            now: self.cycles,
            config: &self.config,
            drives: &mut self.drives,
            select: self.select,
            dma: &mut self.dma,
            irq: &mut self.irq,
            scheduler: &mut self.queue,
        };
        (&mut self.fdc, ctx)
    }

    pub fn reset(&mut self) {
        let (fdc, mut ctx) = self.split();
        fdc.reset(&mut ctx);
        self.queue.clear();
        for drive in self.drives.iter_mut() {
            drive.reset();
        }
    }

    pub fn config(&self) -> &FdcConfig {
        &self.config
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn fdc(&self) -> &Wd1772 {
        &self.fdc
    }

    pub fn debug_state(&self) -> FdcDebugState {
        self.fdc.debug_state()
    }

    pub fn dma(&self) -> &DmaFifo {
        &self.dma
    }

    pub fn dma_mut(&mut self) -> &mut DmaFifo {
        &mut self.dma
    }

    pub fn irq(&self) -> &IrqLatch {
        &self.irq
    }

    pub fn drive(&self, n: usize) -> Option<&FloppyDiskDrive> {
        self.drives.get(n)
    }

    pub fn drive_mut(&mut self, n: usize) -> Option<&mut FloppyDiskDrive> {
        self.drives.get_mut(n)
    }

    pub fn insert(&mut self, n: usize, image: Box<dyn DiskImage>) -> Result<(), FdcError> {
        self.drives.get_mut(n).ok_or(FdcError::InvalidDrive(n))?.insert(image);
        Ok(())
    }

    pub fn eject(&mut self, n: usize) -> Result<Option<Box<dyn DiskImage>>, FdcError> {
        Ok(self.drives.get_mut(n).ok_or(FdcError::InvalidDrive(n))?.eject())
    }

    /// Drive and side select outputs. `None` deselects every drive.
    pub fn select(&mut self, drive: Option<usize>, side: u8) {
        let drive = drive.filter(|&n| n < self.drives.len());
        if drive != self.select.drive {
            log::debug!("FloppySystem: drive select {:?}", drive);
        }
        self.select = DriveSelect { drive, side: side & 1 };
    }

    pub fn read_register(&mut self, line: u8) -> u8 {
        let (fdc, mut ctx) = self.split();
        fdc.read_register(line, &mut ctx)
    }

    pub fn write_register(&mut self, line: u8, value: u8) {
        let (fdc, mut ctx) = self.split();
        fdc.write_register(line, value, &mut ctx);
    }

    /// Status register contents, without the side effects of a bus read.
    pub fn status(&self) -> u8 {
        self.fdc.regs().str
    }

    fn next_event_time(&self) -> Option<u64> {
        let drive_next = self.drives.iter().map(|d| d.next_index_time()).min();
        match (drive_next, self.queue.next_time()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Handle everything due at the current cycle. Index events come first.
    fn dispatch_due(&mut self) {
        let now = self.cycles;
        for n in 0..self.drives.len() {
            if self.drives[n].next_index_time() > now {
                continue;
            }
            let event = self.drives[n].index_event(now);
            if self.select.drive != Some(n) {
                continue;
            }
            let (fdc, mut ctx) = self.split();
            match event {
                IndexEvent::Pulse => fdc.on_index_pulse(&mut ctx),
                IndexEvent::Missed => fdc.on_missed_index(&mut ctx),
            }
        }
        while let Some(queued) = self.queue.pop_due(now) {
            let (fdc, mut ctx) = self.split();
            fdc.on_event(queued.event, queued.arg, &mut ctx);
        }
    }

    /// Advance the clock to `target`, handling every event on the way.
    pub fn run_until(&mut self, target: u64) {
        while let Some(next) = self.next_event_time() {
            if next > target {
                break;
            }
            self.cycles = self.cycles.max(next);
            self.dispatch_due();
        }
        self.cycles = self.cycles.max(target);
    }

    pub fn run_for(&mut self, cycles: u64) {
        self.run_until(self.cycles + cycles);
    }

    /// Run until the controller drops BUSY. Returns false if it is still busy
    /// after `limit` cycles.
    pub fn run_while_busy(&mut self, limit: u64) -> bool {
        let deadline = self.cycles + limit;
        while self.fdc.regs().busy() {
            match self.next_event_time() {
                Some(next) if next <= deadline => {
                    self.cycles = self.cycles.max(next);
                    self.dispatch_due();
                }
                _ => {
                    self.cycles = deadline;
                    return false;
                }
            }
        }
        true
    }
}

impl IoDevice for FloppySystem {
    fn read_u8(&mut self, port: u16, delta: DeviceRunTimeUnit) -> u8 {
        self.run_for(delta.to_ticks(self.config.cpu_hz));
        self.read_register(port.wrapping_sub(FDC_PORT_BASE) as u8)
    }

    fn write_u8(&mut self, port: u16, data: u8, delta: DeviceRunTimeUnit) {
        self.run_for(delta.to_ticks(self.config.cpu_hz));
        self.write_register(port.wrapping_sub(FDC_PORT_BASE) as u8, data);
    }

    fn port_list(&self) -> Vec<(String, u16)> {
        vec![
            (String::from("WD1772 Status/Command"), FDC_PORT_BASE + LINE_STATUS_COMMAND as u16),
            (String::from("WD1772 Track"), FDC_PORT_BASE + LINE_TRACK as u16),
            (String::from("WD1772 Sector"), FDC_PORT_BASE + LINE_SECTOR as u16),
            (String::from("WD1772 Data"), FDC_PORT_BASE + LINE_DATA as u16),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        device_types::fdc::{write_track_stream, IdField, TrackLayout},
        devices::{
            fdc::{
                mfm::{EncodeMode, MfmCodec},
                registers::*,
            },
            image::{FluxTrackImage, MfmTrackImage, SectorImage},
        },
        machine_types::EngineType,
    };

    const REV: u64 = 1_600_000;

    /// Double sided, 80 tracks, 9 sectors. No byte is a Write Track escape.
    fn pattern_disk() -> SectorImage {
        let raw: Vec<u8> = (0..2 * 80 * 9 * 512).map(|i| (i % 239) as u8).collect();
        SectorImage::from_raw_geometry(&raw, 2, 80, 9).unwrap()
    }

    fn sector(side: u8, track: u8, n: u8) -> Vec<u8> {
        pattern_disk().sector_data(side, track, n).unwrap().to_vec()
    }

    fn sector_disk() -> Box<dyn DiskImage> {
        Box::new(pattern_disk())
    }

    fn mfm_disk() -> Box<dyn DiskImage> {
        Box::new(MfmTrackImage::from_sector_image(&pattern_disk()))
    }

    fn flux_disk() -> Box<dyn DiskImage> {
        Box::new(FluxTrackImage::from_mfm_image(
            &MfmTrackImage::from_sector_image(&pattern_disk()),
            256,
        ))
    }

    fn system_with(image: Box<dyn DiskImage>) -> FloppySystem {
        let mut sys = FloppySystem::new(&MachineFdcConfig::default());
        sys.insert(0, image).unwrap();
        sys.select(Some(0), 0);
        sys
    }

    fn command(sys: &mut FloppySystem, cmd: u8, revolutions: u64) -> u8 {
        sys.write_register(LINE_STATUS_COMMAND, cmd);
        assert!(sys.run_while_busy(revolutions * REV), "command {:02X} still busy", cmd);
        sys.status()
    }

    /// Restore with spin-up, leaving the motor on and the IRQ cleared.
    fn spun_up(image: Box<dyn DiskImage>) -> FloppySystem {
        let mut sys = system_with(image);
        command(&mut sys, 0x00, 10);
        sys.read_register(LINE_STATUS_COMMAND);
        sys
    }

    /// The pattern disk with the stored ID CRC of sector `n` on track 0 broken.
    fn bad_id_crc_disk(n: u8) -> SectorImage {
        let mut disk = pattern_disk();
        let mut sectors = disk.sectors(0, 0).to_vec();
        for s in sectors.iter_mut().filter(|s| s.id.sector == n) {
            s.id.crc[1] ^= 0xFF;
        }
        disk.set_track(0, 0, sectors);
        disk
    }

    fn format_stream(track: u8, side: u8, sectors: &[(u8, Vec<u8>)]) -> Vec<u8> {
        let sectors: Vec<(u8, &[u8])> = sectors.iter().map(|(n, d)| (*n, d.as_slice())).collect();
        write_track_stream(&TrackLayout::for_sectors(sectors.len()), track, side, &sectors)
    }

    #[test]
    fn test_register_round_trip() {
        let mut sys = FloppySystem::new(&MachineFdcConfig::default());
        sys.write_register(LINE_TRACK, 0x2A);
        sys.write_register(LINE_SECTOR, 0x05);
        sys.write_register(LINE_DATA, 0x99);
        assert_eq!(sys.read_register(LINE_TRACK), 0x2A);
        assert_eq!(sys.read_register(LINE_SECTOR), 0x05);
        assert_eq!(sys.read_register(LINE_DATA), 0x99);
        assert_eq!(sys.status() & STR_BUSY, 0);
    }

    #[test]
    fn test_command_ff_is_ignored() {
        let mut sys = system_with(mfm_disk());
        sys.write_register(LINE_STATUS_COMMAND, 0xFF);
        assert_eq!(sys.status() & STR_BUSY, 0);
        assert!(sys.fdc().command_log().is_empty());
    }

    #[test]
    fn test_restore_at_track0_waits_for_spin_up() {
        let mut sys = system_with(mfm_disk());
        let str = command(&mut sys, 0x00, 10);
        assert!(sys.cycles() >= 6 * REV && sys.cycles() < 6 * REV + REV / 10);
        assert_eq!(sys.fdc().regs().tr, 0);
        assert_ne!(str & STR_TRACK0, 0);
        assert_eq!(sys.drive(0).unwrap().track(), 0);
        assert!(sys.irq().level());
        assert_eq!(sys.fdc().engine_type(), EngineType::Cycle);
    }

    #[test]
    fn test_restore_at_track0_legacy() {
        let mut sys = system_with(sector_disk());
        let str = command(&mut sys, 0x00, 10);
        assert_eq!(sys.fdc().engine_type(), EngineType::Legacy);
        assert!(sys.cycles() >= 6 * REV);
        assert_eq!(sys.fdc().regs().tr, 0);
        assert_ne!(str & STR_TRACK0, 0);
        assert_eq!(str & STR_SEEK_ERROR, 0);
    }

    #[test]
    fn test_seek_with_verify() {
        for image in [mfm_disk(), sector_disk()] {
            let mut sys = spun_up(image);
            sys.write_register(LINE_DATA, 5);
            let str = command(&mut sys, 0x14, 2);
            assert_eq!(sys.fdc().regs().tr, 5);
            assert_eq!(sys.drive(0).unwrap().track(), 5);
            assert_eq!(str & (STR_SEEK_ERROR | STR_CRC_ERROR | STR_TRACK0), 0);

            // Back out again with Restore, which must report track 0.
            let str = command(&mut sys, 0x00, 2);
            assert_eq!(sys.drive(0).unwrap().track(), 0);
            assert_ne!(str & STR_TRACK0, 0);
        }
    }

    #[test]
    fn test_read_sector() {
        for image in [mfm_disk(), sector_disk()] {
            let mut sys = spun_up(image);
            sys.dma_mut().set_sector_count(1);
            sys.write_register(LINE_SECTOR, 3);
            let str = command(&mut sys, 0x80, 3);
            assert_eq!(str & (STR_RECORD_NOT_FOUND | STR_CRC_ERROR | STR_LOST_DATA), 0);
            assert_eq!(sys.dma().received(), sector(0, 0, 3).as_slice());
        }
    }

    #[test]
    fn test_read_sector_from_flux() {
        let mut sys = spun_up(flux_disk());
        sys.write_register(LINE_SECTOR, 2);
        let str = command(&mut sys, 0x80, 3);
        assert_eq!(str & (STR_RECORD_NOT_FOUND | STR_CRC_ERROR), 0);
        assert_eq!(sys.dma().received(), sector(0, 0, 2).as_slice());
    }

    #[test]
    fn test_missing_sector_takes_five_revolutions() {
        let mut sys = spun_up(mfm_disk());
        sys.write_register(LINE_SECTOR, 20);
        let start = sys.cycles();
        let str = command(&mut sys, 0x80, 10);
        let elapsed = sys.cycles() - start;
        assert_ne!(str & STR_RECORD_NOT_FOUND, 0);
        assert!(elapsed > 4 * REV && elapsed <= 5 * REV, "elapsed {}", elapsed);

        let mut sys = spun_up(sector_disk());
        sys.write_register(LINE_SECTOR, 20);
        let start = sys.cycles();
        let str = command(&mut sys, 0x80, 10);
        let elapsed = sys.cycles() - start;
        assert_ne!(str & STR_RECORD_NOT_FOUND, 0);
        assert_eq!(elapsed, 5 * REV);
    }

    #[test]
    fn test_force_interrupt_stops_transfer() {
        for image in [mfm_disk(), sector_disk()] {
            let mut sys = spun_up(image);
            sys.write_register(LINE_STATUS_COMMAND, 0xE0);
            sys.run_for(REV + REV / 2);
            assert_ne!(sys.status() & STR_BUSY, 0);
            sys.write_register(LINE_STATUS_COMMAND, 0xD0);
            let received = sys.dma().received().len();
            assert!(received > 0);
            assert_eq!(sys.status() & STR_BUSY, 0);
            sys.run_for(2 * REV);
            assert_eq!(sys.dma().received().len(), received);
        }
    }

    #[test]
    fn test_force_interrupt_at_each_index_pulse() {
        for image in [mfm_disk(), sector_disk()] {
            let mut sys = spun_up(image);
            sys.write_register(LINE_STATUS_COMMAND, 0xD4);
            for _ in 0..3 {
                sys.run_for(REV);
                assert!(sys.irq().level());
                sys.read_register(LINE_STATUS_COMMAND);
                assert!(!sys.irq().level());
            }
        }
    }

    #[test]
    fn test_immediate_interrupt_survives_status_read() {
        let mut sys = spun_up(mfm_disk());
        sys.write_register(LINE_STATUS_COMMAND, 0xD8);
        assert!(sys.irq().level());
        sys.read_register(LINE_STATUS_COMMAND);
        assert!(sys.irq().level());
        sys.write_register(LINE_STATUS_COMMAND, 0xD0);
        assert!(sys.irq().level());
        // The next command drops the condition, so a status read clears it.
        sys.write_register(LINE_STATUS_COMMAND, 0x00);
        sys.read_register(LINE_STATUS_COMMAND);
        assert!(!sys.irq().level());
    }

    #[test]
    fn test_write_track_reproduces_reference_track() {
        let reference = MfmTrackImage::from_sector_image(&pattern_disk());
        let reference = reference.track_words(0, 0).unwrap().to_vec();

        let mut sys = spun_up(Box::new(MfmTrackImage::blank(2, 80)));
        let sectors: Vec<(u8, Vec<u8>)> = (1..=9).map(|n| (n, sector(0, 0, n))).collect();
        sys.dma_mut().queue_write_data(&format_stream(0, 0, &sectors));
        let str = command(&mut sys, 0xF0, 3);
        assert_eq!(str & STR_WRITE_PROTECT, 0);

        let image = sys.drive_mut(0).unwrap().image_mut().unwrap();
        image.load_track(0, 0);
        let written: Vec<u16> = (0..reference.len() as u16).map(|p| image.mfm_word(p)).collect();
        // The first cell's clock depends on whatever preceded the write.
        assert_eq!(written[1..], reference[1..]);
    }

    #[test]
    fn test_write_track_formats_sector_image() {
        let mut sys = spun_up(Box::new(SectorImage::blank(2, 80, 9, 0)));
        let data: Vec<(u8, Vec<u8>)> = (1..=10).map(|n| (n, vec![n * 3; 512])).collect();
        sys.dma_mut().queue_write_data(&format_stream(0, 0, &data));
        let str = command(&mut sys, 0xF0, 3);
        assert_eq!(str & STR_WRITE_PROTECT, 0);

        let image = sys.drive_mut(0).unwrap().image_mut().unwrap();
        let ids = image.id_fields(0, 0);
        assert_eq!(ids.len(), 10);
        assert_eq!(ids[9], IdField::new(0, 0, 10, 2));
        image.seek_sector(0, 0, 7, false).unwrap();
        let read: Vec<u8> = (0..512).map(|_| image.read_byte().unwrap()).collect();
        assert_eq!(read, vec![21; 512]);
    }

    #[test]
    fn test_write_then_read_sector() {
        for image in [mfm_disk(), sector_disk()] {
            let mut sys = spun_up(image);
            let data: Vec<u8> = (0..512).map(|i| (i * 7 + 1) as u8).collect();
            sys.dma_mut().queue_write_data(&data);
            sys.write_register(LINE_SECTOR, 4);
            let str = command(&mut sys, 0xA0, 3);
            assert_eq!(str & (STR_WRITE_PROTECT | STR_RECORD_NOT_FOUND), 0);
            assert_eq!(sys.dma().outgoing_len(), 0);

            sys.dma_mut().clear();
            sys.dma_mut().set_sector_count(1);
            let str = command(&mut sys, 0x80, 3);
            assert_eq!(str & (STR_RECORD_NOT_FOUND | STR_CRC_ERROR), 0);
            assert_eq!(sys.dma().received(), data.as_slice());
        }
    }

    #[test]
    fn test_write_protected_disk() {
        for mut image in [mfm_disk(), sector_disk()] {
            image.set_write_protected(true);
            let mut sys = spun_up(image);
            sys.dma_mut().queue_write_data(&[0x55; 512]);
            sys.write_register(LINE_SECTOR, 1);
            let str = command(&mut sys, 0xA0, 3);
            assert_ne!(str & STR_WRITE_PROTECT, 0);
            assert_eq!(sys.dma().outgoing_len(), 512);
            assert!(sys.irq().level());
        }
    }

    #[test]
    fn test_read_address() {
        for image in [mfm_disk(), sector_disk()] {
            let mut sys = spun_up(image);
            sys.write_register(LINE_DATA, 2);
            command(&mut sys, 0x10, 2);
            sys.dma_mut().clear();
            let str = command(&mut sys, 0xC0, 2);
            assert_eq!(str & (STR_RECORD_NOT_FOUND | STR_CRC_ERROR), 0);
            let id = sys.dma().received().to_vec();
            assert_eq!(id.len(), 6);
            assert_eq!(id[0], 2);
            assert!((1..=9).contains(&id[2]));
            assert_eq!(id[4..], IdField::new(2, 0, id[2], 2).crc);
            assert_eq!(sys.fdc().regs().sr, 2);
        }
    }

    #[test]
    fn test_busy_controller_ignores_commands() {
        let mut sys = spun_up(mfm_disk());
        sys.write_register(LINE_SECTOR, 20);
        sys.write_register(LINE_STATUS_COMMAND, 0x80);
        sys.run_for(REV / 2);
        sys.write_register(LINE_STATUS_COMMAND, 0x10);
        assert_eq!(sys.fdc().regs().cr, 0x80);
        assert_ne!(sys.status() & STR_BUSY, 0);
    }

    #[test]
    fn test_deselected_drive_does_not_advance_legacy_spin_up() {
        let mut sys = system_with(sector_disk());
        sys.write_register(LINE_STATUS_COMMAND, 0x00);
        sys.select(None, 0);
        assert!(!sys.run_while_busy(10 * REV));
        assert_ne!(sys.fdc().regs().spinning_up, 0);
        assert_eq!(sys.status() & STR_SPUN_UP, 0);

        sys.select(Some(0), 0);
        assert!(sys.run_while_busy(8 * REV));
        assert_eq!(sys.fdc().engine_type(), EngineType::Legacy);
        assert_ne!(sys.status() & STR_TRACK0, 0);
    }

    #[test]
    fn test_restore_at_track0_issues_no_step_pulses() {
        for image in [mfm_disk(), sector_disk()] {
            let mut sys = spun_up(image);
            assert_eq!(sys.drive(0).unwrap().step_pulses(), 0);

            sys.write_register(LINE_DATA, 3);
            command(&mut sys, 0x10, 2);
            assert_eq!(sys.drive(0).unwrap().step_pulses(), 3);
            command(&mut sys, 0x00, 2);
            assert_eq!(sys.drive(0).unwrap().step_pulses(), 6);
            let str = command(&mut sys, 0x00, 2);
            assert_eq!(sys.drive(0).unwrap().step_pulses(), 6);
            assert_ne!(str & STR_TRACK0, 0);
        }
    }

    #[test]
    fn test_step_commands() {
        for image in [mfm_disk(), sector_disk()] {
            let mut sys = spun_up(image);
            let mut step = |cmd: u8| {
                let str = command(&mut sys, cmd, 2);
                (sys.fdc().regs().tr, sys.drive(0).unwrap().track(), str)
            };
            // Step-in, with and without track register update.
            assert_eq!(step(0x50).0, 1);
            assert_eq!(step(0x50).1, 2);
            let (tr, head, _) = step(0x40);
            assert_eq!((tr, head), (2, 3));
            // Plain step repeats the last direction.
            let (tr, head, _) = step(0x30);
            assert_eq!((tr, head), (3, 4));
            let (tr, head, _) = step(0x20);
            assert_eq!((tr, head), (3, 5));
            // Step-out.
            let (tr, head, _) = step(0x70);
            assert_eq!((tr, head), (2, 4));
            let (tr, head, _) = step(0x60);
            assert_eq!((tr, head), (2, 3));
            for _ in 0..3 {
                step(0x70);
            }
            // Stepping out at track 0 leaves the head alone and zeroes tr.
            let (tr, head, str) = step(0x70);
            assert_eq!((tr, head), (0, 0));
            assert_ne!(str & STR_TRACK0, 0);
        }
    }

    #[test]
    fn test_multiple_sector_read_runs_off_the_track() {
        for image in [mfm_disk(), sector_disk()] {
            let mut sys = spun_up(image);
            sys.dma_mut().set_sector_count(2);
            sys.write_register(LINE_SECTOR, 8);
            let str = command(&mut sys, 0x90, 10);
            assert_ne!(str & STR_RECORD_NOT_FOUND, 0);
            assert_eq!(str & STR_CRC_ERROR, 0);
            assert_eq!(sys.fdc().regs().sr, 10);
            let mut expected = sector(0, 0, 8);
            expected.extend(sector(0, 0, 9));
            assert_eq!(sys.dma().received(), expected.as_slice());
        }
    }

    #[test]
    fn test_id_crc_error_keeps_searching() {
        let disk = bad_id_crc_disk(3);
        let images: [Box<dyn DiskImage>; 2] =
            [Box::new(MfmTrackImage::from_sector_image(&disk)), Box::new(disk)];
        for image in images {
            let mut sys = spun_up(image);
            sys.dma_mut().set_sector_count(1);
            sys.write_register(LINE_SECTOR, 3);
            let start = sys.cycles();
            let str = command(&mut sys, 0x80, 10);
            let elapsed = sys.cycles() - start;
            assert_ne!(str & STR_CRC_ERROR, 0);
            assert_ne!(str & STR_RECORD_NOT_FOUND, 0);
            assert!(elapsed > 4 * REV && elapsed <= 5 * REV + 512, "elapsed {}", elapsed);
            assert!(sys.dma().received().is_empty());

            // Neighbouring sectors still read cleanly.
            sys.dma_mut().set_sector_count(1);
            sys.write_register(LINE_SECTOR, 4);
            let str = command(&mut sys, 0x80, 3);
            assert_eq!(str & (STR_CRC_ERROR | STR_RECORD_NOT_FOUND), 0);
            assert_eq!(sys.dma().received(), sector(0, 0, 4).as_slice());
        }
    }

    #[test]
    fn test_verify_rejects_bad_id_crc_on_every_sector() {
        let mut disk = pattern_disk();
        let mut sectors = disk.sectors(0, 2).to_vec();
        for s in sectors.iter_mut() {
            s.id.crc[0] ^= 0x01;
        }
        disk.set_track(0, 2, sectors);
        let images: [Box<dyn DiskImage>; 2] =
            [Box::new(MfmTrackImage::from_sector_image(&disk)), Box::new(disk)];
        for image in images {
            let mut sys = spun_up(image);
            sys.write_register(LINE_DATA, 2);
            let str = command(&mut sys, 0x14, 10);
            assert_eq!(sys.fdc().regs().tr, 2);
            assert_ne!(str & STR_SEEK_ERROR, 0);
            assert_ne!(str & STR_CRC_ERROR, 0);
        }
    }

    #[test]
    fn test_data_crc_error_ends_command() {
        let mut image = MfmTrackImage::from_sector_image(&pattern_disk());
        let bytes = image.decode_track(0, 0);
        let pos = TrackLayout::for_sectors(9).data_position(2, 512) + 100;
        let mut codec = MfmCodec::new();
        codec.set_last_bit(bytes[pos - 1] & 1 != 0);
        let word = codec.encode(bytes[pos] ^ 0x10, EncodeMode::Normal);
        image.load_track(0, 0);
        image.set_mfm_word(pos as u16, word);

        let mut sys = spun_up(Box::new(image));
        sys.write_register(LINE_SECTOR, 3);
        let str = command(&mut sys, 0x80, 3);
        assert_ne!(str & STR_CRC_ERROR, 0);
        assert_eq!(str & STR_RECORD_NOT_FOUND, 0);
        assert!(sys.irq().level());

        let mut expected = sector(0, 0, 3);
        expected[100] ^= 0x10;
        assert_eq!(sys.dma().received(), expected.as_slice());
    }

    #[test]
    fn test_force_interrupt_cancels_seek() {
        for image in [mfm_disk(), sector_disk()] {
            let mut sys = spun_up(image);
            sys.write_register(LINE_DATA, 40);
            // Seek at the 3ms rate, no verify.
            sys.write_register(LINE_STATUS_COMMAND, 0x13);
            sys.run_for(250_000);
            assert_ne!(sys.status() & STR_BUSY, 0);

            sys.write_register(LINE_STATUS_COMMAND, 0xD0);
            assert_eq!(sys.status() & STR_BUSY, 0);
            let head = sys.drive(0).unwrap().track();
            let tr = sys.fdc().regs().tr;
            assert!(head > 0 && head < 40, "head at {}", head);

            sys.run_for(2 * REV);
            assert_eq!(sys.drive(0).unwrap().track(), head);
            assert_eq!(sys.fdc().regs().tr, tr);
            assert_eq!(sys.status() & STR_BUSY, 0);
        }
    }

    #[test]
    fn test_read_track_marks_unclean_sync() {
        let mut sys = spun_up(mfm_disk());
        let str = command(&mut sys, 0xE0, 3);
        assert_eq!(str & STR_RECORD_NOT_FOUND, 0);
        let track = sys.dma().received().to_vec();
        assert!(track.len() > 6000);

        let count = |pattern: &[u8]| track.windows(pattern.len()).filter(|w| *w == pattern).count();
        // The first sync of each preamble reads as 0x14, the next two as A1.
        assert_eq!(count(&[0x14, 0xA1, 0xA1, 0xFE]), 9);
        assert_eq!(count(&[0x14, 0xA1, 0xA1, 0xFB]), 9);
        assert_eq!(count(&[0xA1, 0xA1, 0xA1]), 0);
    }

    #[test]
    fn test_deselected_drive_does_not_advance_spin_up() {
        let mut sys = system_with(mfm_disk());
        sys.write_register(LINE_STATUS_COMMAND, 0x00);
        sys.select(None, 0);
        assert!(!sys.run_while_busy(10 * REV));
        assert_ne!(sys.fdc().regs().spinning_up, 0);

        sys.select(Some(0), 0);
        assert!(sys.run_while_busy(8 * REV));
        assert_ne!(sys.status() & STR_TRACK0, 0);
    }

    #[test]
    fn test_empty_drive_spin_up_times_out() {
        let mut sys = FloppySystem::new(&MachineFdcConfig::default());
        sys.select(Some(0), 0);
        let str = command(&mut sys, 0x80, 20);
        assert_ne!(str & STR_RECORD_NOT_FOUND, 0);
        assert!(sys.cycles() >= sys.config().cycles_per_second());
    }

    #[test]
    fn test_engine_follows_image() {
        let mut sys = system_with(sector_disk());
        command(&mut sys, 0x00, 10);
        assert_eq!(sys.fdc().engine_type(), EngineType::Legacy);
        sys.eject(0).unwrap();
        sys.insert(0, mfm_disk()).unwrap();
        command(&mut sys, 0x08, 10);
        assert_eq!(sys.fdc().engine_type(), EngineType::Cycle);
        assert!(sys.insert(5, mfm_disk()).is_err());
    }

    #[test]
    fn test_io_ports() {
        let mut sys = FloppySystem::new(&MachineFdcConfig::default());
        assert_eq!(sys.port_list().len(), 4);
        sys.write_u8(FDC_PORT_BASE + 1, 0x33, DeviceRunTimeUnit::SystemTicks(10));
        assert_eq!(sys.read_u8(FDC_PORT_BASE + 1, DeviceRunTimeUnit::SystemTicks(10)), 0x33);
        assert_eq!(sys.cycles(), 20);
    }
}
