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

    devices::floppy_drive.rs

    Implements a 3.5" double density floppy drive: rotation, index pulses,
    head stepping and the byte cell under the head.
*/

use crate::{
    device_types::fdc::DISK_BYTES_PER_TRACK,
    devices::image::DiskImage,
    error::FdcError,
    machine_config::{revolution_cycles, FdcConfig, FloppyDriveConfig},
    machine_types::FloppyDriveType,
};
use rand::Rng;

/// Byte cells after the index hole during which the index sensor is active
/// (about 4ms).
pub const INDEX_HOLE_BYTES: u16 = 126;

/// What the drive did when its index event fired.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum IndexEvent {
    /// A disk is in and spinning: the index hole passed the sensor.
    Pulse,
    /// Motor off or no disk. The drive checks again in a second.
    Missed,
}

pub struct FloppyDiskDrive {
    drive_n: usize,
    drive_type: FloppyDriveType,
    config_write_protect: bool,
    image: Option<Box<dyn DiskImage>>,

    track: u8,
    step_pulses: u64,
    motor: bool,
    cycles_per_byte: u64,
    cycles_per_second: u64,
    track_bytes: u16,
    random_start: bool,

    time_of_last_ip: u64,
    time_of_next_ip: u64,
    /// Byte cell last read or written, or where the motor stopped.
    current_byte: Option<u16>,
    /// Track the image has loaded for bit-level access.
    loaded: Option<(u8, u8)>,

    pub(crate) reading: bool,
    pub(crate) writing: bool,
}

impl Default for FloppyDiskDrive {
    fn default() -> Self {
        let cfg = FdcConfig::default();
        Self {
            drive_n: 0,
            drive_type: Default::default(),
            config_write_protect: false,
            image: None,
            track: 0,
            step_pulses: 0,
            motor: false,
            cycles_per_byte: cfg.cycles_per_byte(),
            cycles_per_second: cfg.cycles_per_second(),
            track_bytes: DISK_BYTES_PER_TRACK,
            random_start: false,
            time_of_last_ip: 0,
            time_of_next_ip: cfg.cycles_per_second(),
            current_byte: None,
            loaded: None,
            reading: false,
            writing: false,
        }
    }
}

impl FloppyDiskDrive {
    pub fn new(drive_n: usize, drive_cfg: &FloppyDriveConfig, cfg: &FdcConfig) -> Self {
        Self {
            drive_n,
            drive_type: drive_cfg.drive_type,
            config_write_protect: drive_cfg.write_protect,
            cycles_per_byte: cfg.cycles_per_byte(),
            cycles_per_second: cfg.cycles_per_second(),
            track_bytes: cfg.track_bytes,
            random_start: cfg.random_start_position,
            time_of_next_ip: cfg.cycles_per_second(),
            ..Default::default()
        }
    }

    /// Return the drive to its power-on state, keeping the disk.
    pub fn reset(&mut self) {
        let image = self.image.take();
        *self = Self {
            drive_n: self.drive_n,
            drive_type: self.drive_type,
            config_write_protect: self.config_write_protect,
            cycles_per_byte: self.cycles_per_byte,
            cycles_per_second: self.cycles_per_second,
            track_bytes: self.track_bytes,
            random_start: self.random_start,
            time_of_next_ip: self.cycles_per_second,
            track: self.track,
            image,
            ..Default::default()
        };
    }

    pub fn drive_n(&self) -> usize {
        self.drive_n
    }

    pub fn drive_type(&self) -> FloppyDriveType {
        self.drive_type
    }

    pub fn insert(&mut self, mut image: Box<dyn DiskImage>) {
        if self.config_write_protect {
            image.set_write_protected(true);
        }
        log::debug!(
            "Drive {}: inserted {} image, {} sides, {} tracks{}",
            self.drive_n,
            image.granularity(),
            image.sides(),
            image.tracks(),
            if image.write_protected() { ", write protected" } else { "" }
        );
        self.track_bytes = image.track_bytes();
        self.image = Some(image);
        self.current_byte = None;
        self.loaded = None;
        self.reading = false;
        self.writing = false;
    }

    pub fn eject(&mut self) -> Option<Box<dyn DiskImage>> {
        log::debug!("Drive {}: ejected", self.drive_n);
        self.loaded = None;
        self.reading = false;
        self.writing = false;
        self.image.take()
    }

    pub fn is_empty(&self) -> bool {
        self.image.is_none()
    }

    pub fn image(&self) -> Option<&dyn DiskImage> {
        self.image.as_deref()
    }

    pub fn image_mut(&mut self) -> Option<&mut (dyn DiskImage + 'static)> {
        self.image.as_deref_mut()
    }

    pub fn write_protected(&self) -> bool {
        self.image.as_ref().is_some_and(|i| i.write_protected())
    }

    pub fn track(&self) -> u8 {
        self.track
    }

    pub fn track0(&self) -> bool {
        self.track == 0
    }

    /// Step pulses received since power-on.
    pub fn step_pulses(&self) -> u64 {
        self.step_pulses
    }

    pub fn motor_on(&self) -> bool {
        self.motor
    }

    pub fn cycles_per_byte(&self) -> u64 {
        self.cycles_per_byte
    }

    pub fn track_bytes(&self) -> u16 {
        self.track_bytes
    }

    pub fn cycles_per_revolution(&self) -> u64 {
        revolution_cycles(self.cycles_per_byte, self.track_bytes)
    }

    /// Move the head one cylinder, in when `direction` is set. Returns the
    /// new cylinder.
    pub fn step(&mut self, direction: bool) -> u8 {
        self.step_pulses += 1;
        if direction {
            if self.track < self.drive_type.max_cylinder() {
                self.track += 1;
            }
        }
        else if self.track > 0 {
            self.track -= 1;
        }
        log::trace!("Drive {}: step {} to track {}", self.drive_n, if direction { "in" } else { "out" }, self.track);
        self.track
    }

    /// Turn the spindle motor on or off. A restarted motor resumes from the
    /// byte where it stopped.
    pub fn motor(&mut self, state: bool, now: u64) {
        if self.motor && !state {
            self.current_byte = Some(self.byte_position(now) % self.track_bytes);
        }
        else if !self.motor && state {
            let bytes_to_next_ip = match self.current_byte {
                Some(byte) if byte < self.track_bytes => self.track_bytes - byte,
                _ if self.random_start => rand::thread_rng().gen_range(1..=self.track_bytes),
                _ => self.track_bytes,
            };
            self.time_of_next_ip = now + bytes_to_next_ip as u64 * self.cycles_per_byte;
            self.time_of_last_ip = self.time_of_next_ip.saturating_sub(self.cycles_per_revolution());
        }
        if self.motor != state {
            log::trace!("Drive {}: motor {}", self.drive_n, if state { "on" } else { "off" });
        }
        self.motor = state;
    }

    /// Cycle at which the next index event is due.
    pub fn next_index_time(&self) -> u64 {
        self.time_of_next_ip
    }

    /// Process the index event that was due at `now`.
    pub fn index_event(&mut self, now: u64) -> IndexEvent {
        self.time_of_next_ip = now + self.cycles_per_second;
        if self.image.is_none() || !self.motor {
            return IndexEvent::Missed;
        }
        self.time_of_last_ip = now;
        if (!self.reading && !self.writing) || self.current_byte.is_some_and(|b| b + 1 >= self.track_bytes) {
            self.current_byte = Some(0);
        }
        self.time_of_next_ip = now + self.cycles_per_revolution();
        IndexEvent::Pulse
    }

    /// Byte cell under the head at `now`.
    pub fn byte_position(&self, now: u64) -> u16 {
        let position = now.saturating_sub(self.time_of_last_ip) / self.cycles_per_byte;
        if position < self.track_bytes as u64 {
            return position as u16;
        }
        // The index event is late: count back from the next one.
        let back = self.time_of_next_ip.saturating_sub(now) / self.cycles_per_byte;
        let position = (self.track_bytes as u64).saturating_sub(back);
        if position >= self.track_bytes as u64 {
            0
        }
        else {
            position as u16
        }
    }

    /// Cycles since the last index pulse, within one revolution.
    pub fn cycles_since_index(&self, now: u64) -> u64 {
        now.saturating_sub(self.time_of_last_ip) % self.cycles_per_revolution().max(1)
    }

    /// True while the index hole passes the sensor.
    pub fn index_hole(&self, now: u64) -> bool {
        self.motor && self.image.is_some() && self.byte_position(now) < INDEX_HOLE_BYTES
    }

    /// Load the track under the head on `side` for bit-level access.
    pub fn sync_track(&mut self, side: u8) {
        let wanted = (side, self.track);
        if self.loaded != Some(wanted) {
            if let Some(image) = self.image.as_mut() {
                image.load_track(side, self.track);
            }
            self.loaded = Some(wanted);
        }
    }

    fn next_byte_time(&self, now: u64) -> u64 {
        let byte = self.current_byte.unwrap_or(0) as u64;
        let at = self.time_of_last_ip + self.cycles_per_byte * (byte + 1);
        if at < now {
            now + self.cycles_per_byte
        }
        else {
            at
        }
    }

    fn at_track_end(&self) -> bool {
        self.current_byte.map_or(true, |b| b + 1 >= self.track_bytes)
    }

    /// Read the MFM word of the next byte cell. A new read sequence syncs to
    /// the rotational position; after that bytes follow one another.
    /// Returns the word and the time the next cell is due.
    pub fn read_word(&mut self, side: u8, now: u64) -> (u16, u64) {
        self.sync_track(side);
        if !self.reading || self.at_track_end() {
            self.reading = true;
            self.current_byte = Some(self.byte_position(now));
        }
        else {
            self.current_byte = self.current_byte.map(|b| b + 1);
        }
        let position = self.current_byte.unwrap_or(0);
        let word = self.image.as_mut().map_or(0, |i| i.mfm_word(position));
        (word, self.next_byte_time(now))
    }

    /// Write an MFM word at the next byte cell. Returns the time the next cell
    /// is due.
    pub fn write_word(&mut self, side: u8, word: u16, now: u64) -> u64 {
        self.sync_track(side);
        if !self.writing || self.at_track_end() {
            let continuing = self.reading && !self.at_track_end();
            self.current_byte = if continuing {
                self.current_byte.map(|b| b + 1)
            }
            else {
                Some(self.byte_position(now))
            };
            self.writing = true;
            self.reading = false;
        }
        else {
            self.current_byte = self.current_byte.map(|b| b + 1);
        }
        let position = self.current_byte.unwrap_or(0);
        if let Some(image) = self.image.as_mut() {
            image.set_mfm_word(position, word);
        }
        self.next_byte_time(now)
    }

    pub fn stop_transfer(&mut self) {
        self.reading = false;
        self.writing = false;
    }

    /// Check that `side` exists on the mounted disk and drive.
    pub fn check_side(&self, side: u8) -> Result<(), FdcError> {
        let sides = self.image.as_ref().map_or(0, |i| i.sides()).min(self.drive_type.sides());
        if side < sides {
            Ok(())
        }
        else {
            Err(FdcError::TrackOutOfRange { side, track: self.track })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::image::{MfmTrackImage, SectorImage};

    fn drive_with_disk() -> FloppyDiskDrive {
        let mut drive = FloppyDiskDrive::new(0, &FloppyDriveConfig::default(), &FdcConfig::default());
        let sectors = SectorImage::blank(2, 80, 9, 0xE5);
        drive.insert(Box::new(MfmTrackImage::from_sector_image(&sectors)));
        drive
    }

    #[test]
    fn test_step_bounds() {
        let mut drive = drive_with_disk();
        assert!(drive.track0());
        drive.step(false);
        assert_eq!(drive.track(), 0);
        for _ in 0..100 {
            drive.step(true);
        }
        assert_eq!(drive.track(), 83);
        drive.step(false);
        assert_eq!(drive.track(), 82);
        assert_eq!(drive.step_pulses(), 102);
    }

    #[test]
    fn test_index_timing() {
        let mut drive = drive_with_disk();
        let revolution = drive.cycles_per_revolution();
        assert_eq!(revolution, 1_600_000);

        // Motor off: the drive only checks once a second.
        assert_eq!(drive.index_event(0), IndexEvent::Missed);
        assert_eq!(drive.next_index_time(), 8_000_000);

        drive.motor(true, 1000);
        assert_eq!(drive.next_index_time(), 1000 + revolution);
        assert_eq!(drive.index_event(1000 + revolution), IndexEvent::Pulse);
        assert_eq!(drive.next_index_time(), 1000 + 2 * revolution);

        let t = 1000 + revolution;
        assert!(drive.index_hole(t + 10));
        assert!(!drive.index_hole(t + 200 * 256));
        assert_eq!(drive.byte_position(t + 3 * 256 + 5), 3);
    }

    #[test]
    fn test_motor_resumes_position() {
        let mut drive = drive_with_disk();
        drive.motor(true, 0);
        let ip = drive.next_index_time();
        drive.index_event(ip);
        drive.motor(false, ip + 1000 * 256);
        drive.motor(true, 10_000_000);
        assert_eq!(drive.next_index_time(), 10_000_000 + 5250 * 256);
    }

    #[test]
    fn test_read_words_follow_each_other() {
        let mut drive = drive_with_disk();
        drive.motor(true, 0);
        let ip = drive.next_index_time();
        drive.index_event(ip);

        let (_, next) = drive.read_word(0, ip + 10 * 256 + 3);
        assert_eq!(next, ip + 11 * 256);
        let (_, next) = drive.read_word(0, next);
        assert_eq!(next, ip + 12 * 256);
        drive.stop_transfer();
        assert!(!drive.reading);
    }
}
