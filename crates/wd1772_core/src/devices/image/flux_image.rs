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

    devices::image::flux_image.rs

    Flux-level disk image: each track is a list of transition times measured
    from the index pulse, in CPU cycles. Read only.
*/

use super::MfmTrackImage;
use crate::device_types::fdc::TrackGranularity;
use wd1772_common::FdcHashMap;

#[derive(Clone, Debug, Default)]
struct FluxTrack {
    /// Transition times after the index pulse, ascending.
    times: Vec<u64>,
    revolution: u64,
}

#[derive(Clone, Debug)]
pub struct FluxTrackImage {
    sides: u8,
    tracks: u8,
    data: FdcHashMap<(u8, u8), FluxTrack>,
    loaded: (u8, u8),
    /// Index of the next transition on the loaded track.
    cursor: usize,
    /// Time of the previous transition, or of the seek point.
    position: u64,
}

impl FluxTrackImage {
    /// Place one transition in the middle of every 1 cell of each track.
    pub fn from_mfm_image(image: &MfmTrackImage, cycles_per_byte: u64) -> Self {
        use super::DiskImage;
        let cell = (cycles_per_byte / 16).max(1);
        let mut data = FdcHashMap::default();

        for track in 0..image.tracks() {
            for side in 0..image.sides() {
                let Some(words) = image.track_words(side, track)
                else {
                    continue;
                };
                let mut times = Vec::new();
                for (i, &word) in words.iter().enumerate() {
                    for bit in 0..16u64 {
                        if word & (0x8000 >> bit) != 0 {
                            times.push((i as u64 * 16 + bit) * cell + cell / 2);
                        }
                    }
                }
                let revolution = words.len() as u64 * 16 * cell;
                data.insert((side, track), FluxTrack { times, revolution });
            }
        }

        Self {
            sides: image.sides(),
            tracks: image.tracks(),
            data,
            loaded: (0, 0),
            cursor: 0,
            position: 0,
        }
    }

    pub fn transitions(&self, side: u8, track: u8) -> usize {
        self.data.get(&(side, track)).map(|t| t.times.len()).unwrap_or(0)
    }
}

impl super::DiskImage for FluxTrackImage {
    fn granularity(&self) -> TrackGranularity {
        TrackGranularity::Flux
    }

    fn sides(&self) -> u8 {
        self.sides
    }

    fn tracks(&self) -> u8 {
        self.tracks
    }

    fn write_protected(&self) -> bool {
        true
    }

    fn set_write_protected(&mut self, _state: bool) {}

    fn load_track(&mut self, side: u8, track: u8) {
        if self.loaded != (side, track) {
            self.loaded = (side, track);
            self.cursor = 0;
            self.position = 0;
        }
    }

    fn seek_flux(&mut self, cycles: u64) {
        let Some(track) = self.data.get(&self.loaded)
        else {
            return;
        };
        if track.revolution == 0 {
            return;
        }
        let at = cycles % track.revolution;
        self.cursor = track.times.partition_point(|&t| t < at);
        self.position = at;
    }

    fn next_transition(&mut self) -> Option<u32> {
        let track = self.data.get(&self.loaded)?;
        if track.times.is_empty() {
            return None;
        }
        let (when, interval) = match track.times.get(self.cursor) {
            Some(&t) => {
                self.cursor += 1;
                (t, t - self.position)
            }
            None => {
                let t = track.times[0];
                self.cursor = 1;
                (t, track.revolution - self.position + t)
            }
        };
        self.position = when;
        Some(interval as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::image::{DiskImage, SectorImage};

    fn test_image() -> FluxTrackImage {
        let sectors = SectorImage::blank(1, 2, 9, 0x00);
        FluxTrackImage::from_mfm_image(&MfmTrackImage::from_sector_image(&sectors), 256)
    }

    #[test]
    fn test_intervals_are_whole_cells() {
        let mut image = test_image();
        image.load_track(0, 1);
        // 0x4E gap encodes as 0x9254: first transition mid-cell 0.
        assert_eq!(image.next_transition(), Some(8));
        assert_eq!(image.next_transition(), Some(48));
        for _ in 0..1000 {
            let i = image.next_transition().unwrap();
            assert!(i % 16 == 0 && (32..=64).contains(&i), "interval {}", i);
        }
    }

    #[test]
    fn test_seek_and_wrap() {
        let mut image = test_image();
        image.load_track(0, 0);
        let revolution = 6250 * 256;
        let count = image.transitions(0, 0);

        image.seek_flux(revolution + 4);
        assert_eq!(image.next_transition(), Some(4));

        image.seek_flux(0);
        let total: u64 = (0..count).map(|_| image.next_transition().unwrap() as u64).sum();
        let wrapped = image.next_transition().unwrap() as u64;
        assert_eq!(total + wrapped, revolution + 8);
        assert!(image.write_protected());
    }
}
