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

    devices::image::sector_image.rs

    Byte-stream disk image: sector contents plus their ID fields, the way
    raw .ST dumps describe a disk. Tracks rewritten by Write Track move to a
    format area that shadows the main track.
*/

use crate::{
    device_types::fdc::{IdField, TrackGranularity, DEFAULT_SECTOR_SIZE},
    error::FdcError,
};
use wd1772_common::FdcHashMap;

/// Geometries probed when sizing a raw dump: (sectors per track, sides, tracks).
const RAW_GEOMETRIES: [(usize, usize, std::ops::RangeInclusive<usize>); 6] = [
    (9, 2, 80..=85),
    (9, 1, 80..=85),
    (10, 2, 80..=85),
    (11, 2, 80..=85),
    (10, 1, 80..=85),
    (9, 2, 40..=42),
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sector {
    pub id: IdField,
    pub data: Vec<u8>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Area {
    Main,
    Format,
}

#[derive(Copy, Clone, Debug)]
struct SectorCursor {
    area: Area,
    key: (u8, u8),
    index: usize,
    offset: usize,
}

#[derive(Clone, Debug)]
pub struct SectorImage {
    sides: u8,
    tracks: u8,
    main: FdcHashMap<(u8, u8), Vec<Sector>>,
    format_area: FdcHashMap<(u8, u8), Vec<Sector>>,
    cursor: Option<SectorCursor>,
    write_protected: bool,
}

impl SectorImage {
    /// A disk of `sectors_per_track` 512-byte sectors filled with `fill`.
    pub fn blank(sides: u8, tracks: u8, sectors_per_track: u8, fill: u8) -> Self {
        let mut main = FdcHashMap::default();
        for track in 0..tracks {
            for side in 0..sides {
                let sectors = (1..=sectors_per_track)
                    .map(|n| Sector {
                        id: IdField::new(track, side, n, 2),
                        data: vec![fill; DEFAULT_SECTOR_SIZE],
                    })
                    .collect();
                main.insert((side, track), sectors);
            }
        }
        Self {
            sides,
            tracks,
            main,
            format_area: FdcHashMap::default(),
            cursor: None,
            write_protected: false,
        }
    }

    /// Build from a raw dump laid out track by track, side 0 then side 1.
    pub fn from_raw_geometry(data: &[u8], sides: u8, tracks: u8, sectors_per_track: u8) -> Result<Self, FdcError> {
        let expected = sides as usize * tracks as usize * sectors_per_track as usize * DEFAULT_SECTOR_SIZE;
        if data.len() != expected || expected == 0 {
            return Err(FdcError::UnknownGeometry(data.len()));
        }
        let mut image = Self::blank(sides, tracks, sectors_per_track, 0);
        let mut chunks = data.chunks_exact(DEFAULT_SECTOR_SIZE);
        for track in 0..tracks {
            for side in 0..sides {
                if let Some(sectors) = image.main.get_mut(&(side, track)) {
                    for sector in sectors.iter_mut() {
                        if let Some(chunk) = chunks.next() {
                            sector.data.copy_from_slice(chunk);
                        }
                    }
                }
            }
        }
        Ok(image)
    }

    /// Build from a raw dump, inferring the geometry from its size.
    pub fn from_raw(data: &[u8]) -> Result<Self, FdcError> {
        for (spt, sides, tracks) in RAW_GEOMETRIES.iter().cloned() {
            for t in tracks {
                if data.len() == spt * sides * t * DEFAULT_SECTOR_SIZE {
                    log::debug!(
                        "SectorImage::from_raw(): {} bytes = {} tracks, {} sides, {} sectors",
                        data.len(),
                        t,
                        sides,
                        spt
                    );
                    return Self::from_raw_geometry(data, sides as u8, t as u8, spt as u8);
                }
            }
        }
        Err(FdcError::UnknownGeometry(data.len()))
    }

    /// Flatten back to a raw dump. Rewritten tracks contribute their new
    /// sectors in sector number order.
    pub fn to_raw(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for track in 0..self.tracks {
            for side in 0..self.sides {
                let mut sectors: Vec<&Sector> = self.sectors(side, track).iter().collect();
                sectors.sort_by_key(|s| s.id.sector);
                for s in sectors {
                    out.extend_from_slice(&s.data);
                }
            }
        }
        out
    }

    /// Sectors of a track as currently visible.
    pub fn sectors(&self, side: u8, track: u8) -> &[Sector] {
        self.format_area
            .get(&(side, track))
            .or_else(|| self.main.get(&(side, track)))
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn sector_data(&self, side: u8, track: u8, sector: u8) -> Option<&[u8]> {
        self.sectors(side, track)
            .iter()
            .find(|s| s.id.sector == sector)
            .map(|s| s.data.as_slice())
    }

    /// Replace a track's sectors. Used to build protected or odd layouts.
    pub fn set_track(&mut self, side: u8, track: u8, sectors: Vec<Sector>) {
        self.format_area.remove(&(side, track));
        self.main.insert((side, track), sectors);
    }

    pub fn is_track_rewritten(&self, side: u8, track: u8) -> bool {
        self.format_area.contains_key(&(side, track))
    }

    fn area(&self, area: Area) -> &FdcHashMap<(u8, u8), Vec<Sector>> {
        match area {
            Area::Main => &self.main,
            Area::Format => &self.format_area,
        }
    }

    fn cursor_sector_mut(&mut self) -> Result<(&mut Sector, &mut SectorCursor), FdcError> {
        let cursor = self.cursor.as_mut().ok_or(FdcError::NoSectorSelected)?;
        let map = match cursor.area {
            Area::Main => &mut self.main,
            Area::Format => &mut self.format_area,
        };
        let sector = map
            .get_mut(&cursor.key)
            .and_then(|v| v.get_mut(cursor.index))
            .ok_or(FdcError::NoSectorSelected)?;
        Ok((sector, cursor))
    }
}

impl super::DiskImage for SectorImage {
    fn granularity(&self) -> TrackGranularity {
        TrackGranularity::Byte
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

    fn id_fields(&self, side: u8, track: u8) -> Vec<IdField> {
        self.sectors(side, track).iter().map(|s| s.id).collect()
    }

    fn seek_sector(&mut self, side: u8, track: u8, sector: u8, from_format: bool) -> Result<(), FdcError> {
        let area = if from_format || self.is_track_rewritten(side, track) {
            Area::Format
        }
        else {
            Area::Main
        };
        let index = self
            .area(area)
            .get(&(side, track))
            .and_then(|v| v.iter().position(|s| s.id.sector == sector))
            .ok_or(FdcError::SectorNotFound { side, track, sector })?;
        self.cursor = Some(SectorCursor {
            area,
            key: (side, track),
            index,
            offset: 0,
        });
        Ok(())
    }

    fn sector_length(&self) -> usize {
        self.cursor
            .and_then(|c| self.area(c.area).get(&c.key).and_then(|v| v.get(c.index)))
            .map(|s| s.data.len())
            .unwrap_or(0)
    }

    fn read_byte(&mut self) -> Result<u8, FdcError> {
        let (sector, cursor) = self.cursor_sector_mut()?;
        let byte = *sector.data.get(cursor.offset).ok_or(FdcError::EndOfSector)?;
        cursor.offset += 1;
        Ok(byte)
    }

    fn write_byte(&mut self, byte: u8) -> Result<(), FdcError> {
        if self.write_protected {
            return Err(FdcError::WriteProtected);
        }
        let (sector, cursor) = self.cursor_sector_mut()?;
        let slot = sector.data.get_mut(cursor.offset).ok_or(FdcError::EndOfSector)?;
        *slot = byte;
        cursor.offset += 1;
        Ok(())
    }

    fn format_track(&mut self, side: u8, track: u8) -> Result<(), FdcError> {
        if self.write_protected {
            return Err(FdcError::WriteProtected);
        }
        if side >= self.sides {
            return Err(FdcError::TrackOutOfRange { side, track });
        }
        self.format_area.insert((side, track), Vec::new());
        self.tracks = self.tracks.max(track.saturating_add(1));
        self.cursor = None;
        Ok(())
    }

    fn format_sector(&mut self, side: u8, track: u8, id: IdField) -> Result<(), FdcError> {
        if self.write_protected {
            return Err(FdcError::WriteProtected);
        }
        let sectors = self
            .format_area
            .get_mut(&(side, track))
            .ok_or(FdcError::TrackOutOfRange { side, track })?;
        let new = Sector {
            id,
            data: vec![0; id.sector_size()],
        };
        match sectors.iter_mut().find(|s| s.id.sector == id.sector) {
            Some(existing) => *existing = new,
            None => sectors.push(new),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::image::DiskImage;

    #[test]
    fn test_raw_geometry() {
        let mut data = vec![0u8; 737_280];
        data[512] = 0xAA; // track 0 side 0 sector 2
        data[9 * 512] = 0xBB; // track 0 side 1 sector 1
        let image = SectorImage::from_raw(&data).unwrap();
        assert_eq!(image.sides(), 2);
        assert_eq!(image.tracks(), 80);
        assert_eq!(image.sector_data(0, 0, 2).unwrap()[0], 0xAA);
        assert_eq!(image.sector_data(1, 0, 1).unwrap()[0], 0xBB);
        assert_eq!(image.to_raw(), data);

        assert_eq!(SectorImage::from_raw(&[0u8; 1000]).unwrap_err(), FdcError::UnknownGeometry(1000));
    }

    #[test]
    fn test_cursor_read_write() {
        let mut image = SectorImage::blank(1, 2, 9, 0xE5);
        image.seek_sector(0, 1, 5, false).unwrap();
        assert_eq!(image.sector_length(), 512);
        image.write_byte(0x12).unwrap();
        image.seek_sector(0, 1, 5, false).unwrap();
        assert_eq!(image.read_byte().unwrap(), 0x12);
        assert_eq!(image.read_byte().unwrap(), 0xE5);

        assert!(image.seek_sector(0, 1, 10, false).is_err());
        image.set_write_protected(true);
        assert_eq!(image.write_byte(0), Err(FdcError::WriteProtected));
    }

    #[test]
    fn test_format_area_shadows_track() {
        let mut image = SectorImage::blank(2, 2, 9, 0xE5);
        image.format_track(1, 0).unwrap();
        assert!(image.id_fields(1, 0).is_empty());
        image.format_sector(1, 0, IdField::new(0, 1, 3, 1)).unwrap();
        image.seek_sector(1, 0, 3, true).unwrap();
        assert_eq!(image.sector_length(), 256);
        assert_eq!(image.id_fields(1, 0).len(), 1);
        // Other tracks are untouched.
        assert_eq!(image.id_fields(0, 0).len(), 9);
    }
}
