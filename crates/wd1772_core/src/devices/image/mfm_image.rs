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

    devices::image::mfm_image.rs

    Bit-level disk image: every track is stored as one MFM word per byte
    cell, so address marks, gaps and CRCs are whatever was written.
*/

use super::SectorImage;
use crate::{
    device_types::fdc::{build_track, IdField, TrackGranularity, TrackLayout, DISK_BYTES_PER_TRACK, GAP_BYTE},
    devices::fdc::mfm::{EncodeMode, MfmCodec},
};
use wd1772_common::FdcHashMap;

#[derive(Clone, Debug)]
pub struct MfmTrackImage {
    sides: u8,
    tracks: u8,
    track_bytes: u16,
    data: FdcHashMap<(u8, u8), Vec<u16>>,
    loaded: (u8, u8),
    write_protected: bool,
}

/// MFM words of `count` gap bytes.
fn gap_words(count: usize) -> Vec<u16> {
    let mut codec = MfmCodec::new();
    (0..count).map(|_| codec.encode(GAP_BYTE, EncodeMode::Normal)).collect()
}

impl MfmTrackImage {
    /// An unformatted disk. Tracks read back as gap bytes.
    pub fn blank(sides: u8, tracks: u8) -> Self {
        Self {
            sides,
            tracks,
            track_bytes: DISK_BYTES_PER_TRACK,
            data: FdcHashMap::default(),
            loaded: (0, 0),
            write_protected: false,
        }
    }

    /// Encode every track of a sector image with the standard layout for
    /// its sector count.
    pub fn from_sector_image(image: &SectorImage) -> Self {
        use super::DiskImage;
        let mut out = Self::blank(image.sides(), image.tracks());
        out.write_protected = image.write_protected();

        for track in 0..image.tracks() {
            for side in 0..image.sides() {
                let sectors = image.sectors(side, track);
                if sectors.is_empty() {
                    continue;
                }
                let layout = TrackLayout::for_sectors(sectors.len());
                let list: Vec<(IdField, &[u8])> = sectors.iter().map(|s| (s.id, s.data.as_slice())).collect();
                let mut codec = MfmCodec::new();
                let words = build_track(&layout, &list)
                    .iter()
                    .map(|b| {
                        let mode = if b.sync { EncodeMode::FormatClock } else { EncodeMode::Normal };
                        codec.encode(b.value, mode)
                    })
                    .collect();
                out.data.insert((side, track), words);
            }
        }
        out
    }

    pub fn track_words(&self, side: u8, track: u8) -> Option<&[u16]> {
        self.data.get(&(side, track)).map(|v| v.as_slice())
    }

    /// Data bytes of a track, ignoring clocks.
    pub fn decode_track(&self, side: u8, track: u8) -> Vec<u8> {
        let mut codec = MfmCodec::new();
        self.track_words(side, track)
            .map(|words| words.iter().map(|&w| codec.decode(w).0).collect())
            .unwrap_or_default()
    }
}

impl super::DiskImage for MfmTrackImage {
    fn granularity(&self) -> TrackGranularity {
        TrackGranularity::Bit
    }

    fn sides(&self) -> u8 {
        self.sides
    }

    fn tracks(&self) -> u8 {
        self.tracks
    }

    fn write_protected(&self) -> bool {
        self.write_protected
    }

    fn set_write_protected(&mut self, state: bool) {
        self.write_protected = state;
    }

    fn track_bytes(&self) -> u16 {
        self.track_bytes
    }

    fn load_track(&mut self, side: u8, track: u8) {
        self.loaded = (side, track);
    }

    fn mfm_word(&mut self, position: u16) -> u16 {
        match self.data.get(&self.loaded) {
            Some(words) if !words.is_empty() => words[position as usize % words.len()],
            _ => 0,
        }
    }

    fn set_mfm_word(&mut self, position: u16, word: u16) {
        if self.write_protected || self.loaded.0 >= self.sides {
            return;
        }
        let track_bytes = self.track_bytes as usize;
        let words = self.data.entry(self.loaded).or_insert_with(|| gap_words(track_bytes));
        let len = words.len();
        words[position as usize % len] = word;
        self.tracks = self.tracks.max(self.loaded.1.saturating_add(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::{fdc::mfm::MFM_SYNC_A1, image::DiskImage};

    #[test]
    fn test_encoded_track_has_sync_marks() {
        let sectors = SectorImage::blank(1, 1, 9, 0xE5);
        let mut image = MfmTrackImage::from_sector_image(&sectors);
        let layout = TrackLayout::for_sectors(9);
        image.load_track(0, 0);

        let id = layout.id_position(0, 512) as u16;
        assert_eq!(image.mfm_word(id - 2), MFM_SYNC_A1);
        assert_eq!(image.mfm_word(id - 4), MFM_SYNC_A1);

        let bytes = image.decode_track(0, 0);
        assert_eq!(bytes.len(), 6250);
        assert_eq!(bytes[id as usize - 1], 0xFE);
        assert_eq!(bytes[layout.data_position(3, 512)], 0xE5);
    }

    #[test]
    fn test_write_to_unformatted_track() {
        let mut image = MfmTrackImage::blank(2, 80);
        image.load_track(1, 5);
        assert_eq!(image.mfm_word(10), 0);
        image.set_mfm_word(10, MFM_SYNC_A1);
        assert_eq!(image.mfm_word(10), MFM_SYNC_A1);
        assert_eq!(image.decode_track(1, 5)[0], GAP_BYTE);

        image.set_write_protected(true);
        image.set_mfm_word(11, MFM_SYNC_A1);
        assert_ne!(image.mfm_word(11), MFM_SYNC_A1);
    }
}
