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

    device_types::fdc.rs

    Defines types common to the WD1772 engines and the disk image backends:
    ID fields, track granularity and the standard Atari ST track layout.
*/

use crate::devices::fdc::crc::CrcLogic;
use strum_macros::{Display, EnumIter};

/// Raw track length in bytes at 250kbit/s and 300rpm.
pub const DISK_BYTES_PER_TRACK: u16 = 6250;
pub const DEFAULT_SECTOR_SIZE: usize = 512;
pub const GAP_BYTE: u8 = 0x4E;

/// How a disk image backend delivers track data. Decides which controller
/// engine serves it.
#[derive(Copy, Clone, Debug, Display, EnumIter, PartialEq, Eq, Hash)]
pub enum TrackGranularity {
    /// Sector contents only, the controller synthesizes the track.
    Byte,
    /// One MFM word per byte cell.
    Bit,
    /// Flux transition intervals.
    Flux,
}

/// On-disk sector header.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct IdField {
    pub track: u8,
    pub side: u8,
    pub sector: u8,
    pub length_code: u8,
    pub crc: [u8; 2],
}

impl IdField {
    /// Build an ID field with a valid CRC.
    pub fn new(track: u8, side: u8, sector: u8, length_code: u8) -> Self {
        let mut id = Self {
            track,
            side,
            sector,
            length_code,
            crc: [0; 2],
        };
        id.crc = id.compute_crc();
        id
    }

    /// Sector size selected by the length code. The WD1772 only looks at the
    /// low two bits.
    #[inline]
    pub fn sector_size(&self) -> usize {
        128 << (self.length_code & 3)
    }

    pub fn bytes(&self) -> [u8; 6] {
        [
            self.track,
            self.side,
            self.sector,
            self.length_code,
            self.crc[0],
            self.crc[1],
        ]
    }

    /// Set byte `index` (0..6) of the field as it comes off the disk.
    pub fn set_byte(&mut self, index: usize, byte: u8) {
        match index {
            0 => self.track = byte,
            1 => self.side = byte,
            2 => self.sector = byte,
            3 => self.length_code = byte,
            4 => self.crc[0] = byte,
            5 => self.crc[1] = byte,
            _ => {}
        }
    }

    /// CRC over A1 A1 A1 FE and the four header bytes.
    pub fn compute_crc(&self) -> [u8; 2] {
        let mut crc = CrcLogic::new();
        crc.init();
        crc.add_slice(&[0xA1, 0xA1, 0xA1, 0xFE]);
        crc.add_slice(&self.bytes()[..4]);
        [crc.hi(), crc.lo()]
    }

    pub fn crc_ok(&self) -> bool {
        self.crc == self.compute_crc()
    }
}

/// Gap and preamble sizes of a standard track, by sectors per track.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TrackLayout {
    pub sectors: usize,
    pub post_index_gap: usize,
    pub id_sync_zeros: usize,
    pub id_gap: usize,
    pub data_sync_zeros: usize,
    pub post_data_gap: usize,
    pub track_bytes: usize,
}

impl TrackLayout {
    pub fn for_sectors(sectors: usize) -> Self {
        Self {
            sectors,
            post_index_gap: match sectors {
                9 => 60,
                10 => 22,
                _ => 10,
            },
            id_sync_zeros: if sectors < 11 { 12 } else { 3 },
            id_gap: 22,
            data_sync_zeros: 12,
            post_data_gap: if sectors < 11 { 40 } else { 1 },
            track_bytes: DISK_BYTES_PER_TRACK as usize,
        }
    }

    /// Bytes of a record before its data: syncs, ID field and the gap to the data mark.
    pub fn pre_data_gap(&self) -> usize {
        self.id_sync_zeros + 3 + 1 + 6 + self.id_gap + self.data_sync_zeros + 3 + 1
    }

    pub fn record_length(&self, sector_size: usize) -> usize {
        self.pre_data_gap() + sector_size + 2 + self.post_data_gap
    }

    /// Offset of the first ID byte (after the FE mark) of record `index`.
    pub fn id_position(&self, index: usize, sector_size: usize) -> usize {
        self.post_index_gap + index * self.record_length(sector_size) + self.id_sync_zeros + 4
    }

    /// Offset of the first data byte of record `index`.
    pub fn data_position(&self, index: usize, sector_size: usize) -> usize {
        self.post_index_gap + index * self.record_length(sector_size) + self.pre_data_gap()
    }

    /// Gap from the end of one sector's data to the next data mark.
    pub fn sector_gap(&self) -> usize {
        2 + self.post_data_gap + self.pre_data_gap()
    }
}

/// One byte of a synthesized track. `sync` marks bytes written with a
/// missing clock bit.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TrackByte {
    pub value: u8,
    pub sync: bool,
}

/// Lay out a full standard track from its sectors. The result is exactly
/// `layout.track_bytes` long; sectors that do not fit are truncated.
pub fn build_track(layout: &TrackLayout, sectors: &[(IdField, &[u8])]) -> Vec<TrackByte> {
    let mut track = Vec::with_capacity(layout.track_bytes);
    let put = |track: &mut Vec<TrackByte>, value: u8, count: usize| {
        for _ in 0..count {
            track.push(TrackByte { value, sync: false });
        }
    };

    put(&mut track, GAP_BYTE, layout.post_index_gap);
    for (id, data) in sectors {
        put(&mut track, 0x00, layout.id_sync_zeros);
        for _ in 0..3 {
            track.push(TrackByte { value: 0xA1, sync: true });
        }
        put(&mut track, 0xFE, 1);
        for b in id.bytes() {
            put(&mut track, b, 1);
        }
        put(&mut track, GAP_BYTE, layout.id_gap);
        put(&mut track, 0x00, layout.data_sync_zeros);
        for _ in 0..3 {
            track.push(TrackByte { value: 0xA1, sync: true });
        }
        let mut crc = CrcLogic::new();
        crc.reset();
        crc.add(0xFB);
        put(&mut track, 0xFB, 1);
        for &b in data.iter() {
            crc.add(b);
            put(&mut track, b, 1);
        }
        put(&mut track, crc.hi(), 1);
        put(&mut track, crc.lo(), 1);
        put(&mut track, GAP_BYTE, layout.post_data_gap);
    }

    track.truncate(layout.track_bytes);
    let remaining = layout.track_bytes - track.len();
    put(&mut track, GAP_BYTE, remaining);
    track
}

/// The bytes a host feeds Write Track to lay down the same track as
/// [build_track]: F5 for each sync, F7 where the CRC goes. Gap filler runs
/// past the end of the revolution so the command never starves.
pub fn write_track_stream(layout: &TrackLayout, track: u8, side: u8, sectors: &[(u8, &[u8])]) -> Vec<u8> {
    let mut stream = vec![GAP_BYTE; layout.post_index_gap];
    for (sector, data) in sectors {
        stream.extend(std::iter::repeat(0x00).take(layout.id_sync_zeros));
        stream.extend([0xF5, 0xF5, 0xF5, 0xFE, track, side, *sector, 2, 0xF7]);
        stream.extend(std::iter::repeat(GAP_BYTE).take(layout.id_gap));
        stream.extend(std::iter::repeat(0x00).take(layout.data_sync_zeros));
        stream.extend([0xF5, 0xF5, 0xF5, 0xFB]);
        stream.extend_from_slice(data);
        stream.push(0xF7);
        stream.extend(std::iter::repeat(GAP_BYTE).take(layout.post_data_gap));
    }
    let written = layout.post_index_gap + sectors.len() * layout.record_length(DEFAULT_SECTOR_SIZE);
    let filler = layout.track_bytes.saturating_sub(written) + 256;
    stream.extend(std::iter::repeat(GAP_BYTE).take(filler));
    stream
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_constants() {
        let nine = TrackLayout::for_sectors(9);
        assert_eq!(nine.pre_data_gap(), 60);
        assert_eq!(nine.record_length(512), 614);
        assert_eq!(nine.id_position(0, 512), 76);
        assert_eq!(nine.data_position(0, 512), 120);

        let eleven = TrackLayout::for_sectors(11);
        assert_eq!(eleven.pre_data_gap(), 51);
        assert_eq!(eleven.record_length(512), 566);
        assert_eq!(eleven.id_position(0, 512), 17);
    }

    #[test]
    fn test_build_track_positions() {
        let data = vec![0xE5u8; 512];
        let layout = TrackLayout::for_sectors(9);
        let sectors: Vec<(IdField, &[u8])> = (1..=9).map(|n| (IdField::new(3, 0, n, 2), &data[..])).collect();
        let track = build_track(&layout, &sectors);
        assert_eq!(track.len(), 6250);

        for idx in 0..9 {
            let id = layout.id_position(idx, 512);
            assert_eq!(track[id - 1].value, 0xFE);
            assert!(track[id - 2].sync);
            assert_eq!(track[id + 2].value, idx as u8 + 1);
            let dp = layout.data_position(idx, 512);
            assert_eq!(track[dp - 1].value, 0xFB);
            assert_eq!(track[dp].value, 0xE5);
        }
    }

    #[test]
    fn test_write_track_stream_length() {
        let data = vec![0xE5u8; 512];
        let layout = TrackLayout::for_sectors(9);
        let sectors: Vec<(u8, &[u8])> = (1..=9).map(|n| (n, &data[..])).collect();
        let stream = write_track_stream(&layout, 0, 0, &sectors);
        // Each F7 expands to two bytes on the disk.
        let on_disk = stream.len() + stream.iter().filter(|&&b| b == 0xF7).count();
        assert!(on_disk > 6250);
        assert_eq!(stream[..60], [GAP_BYTE; 60]);
        assert_eq!(stream[72..76], [0xF5, 0xF5, 0xF5, 0xFE]);
    }

    #[test]
    fn test_id_crc() {
        let id = IdField::new(0, 0, 1, 2);
        assert!(id.crc_ok());
        assert_eq!(id.sector_size(), 512);
        let mut bad = id;
        bad.sector = 2;
        assert!(!bad.crc_ok());
    }
}
