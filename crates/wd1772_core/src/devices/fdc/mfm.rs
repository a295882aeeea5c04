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

    devices::fdc::mfm.rs

    MFM encoder and decoder for one byte cell (8 clock + 8 data bits).
    
    The encoded word interleaves bits MSB first as c7 d7 c6 d6 ... c0 d0.
    A clock bit is set only between two zero data bits. In format mode the
    sync bytes 0xA1 and 0xC2 drop one clock bit, which produces the address
    mark patterns 0x4489 and 0x5224 that cannot occur in normal data.
*/

pub const MFM_SYNC_A1: u16 = 0x4489;
pub const MFM_SYNC_C2: u16 = 0x5224;

/// Clock bit dropped from 0xA1 in format mode (bit 5 of the encoded word).
const A1_MISSING_CLOCK: u8 = 0x04;
/// Clock bit dropped from 0xC2 in format mode (bit 7 of the encoded word).
const C2_MISSING_CLOCK: u8 = 0x08;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EncodeMode {
    Normal,
    FormatClock,
}

#[derive(Copy, Clone, Debug, Default)]
pub struct MfmCodec {
    pub data: u8,
    pub clock: u8,
    pub encoded: u16,
    data_last_bit: bool,
}

impl MfmCodec {
    pub fn new() -> Self {
        Default::default()
    }

    /// Encode `data`, continuing from the last data bit of the previous byte.
    pub fn encode(&mut self, data: u8, mode: EncodeMode) -> u16 {
        let mut previous = self.data_last_bit;
        let mut clock = 0u8;
        for i in (0..8).rev() {
            let current = data & (1 << i) != 0;
            if !previous && !current {
                clock |= 1 << i;
            }
            previous = current;
        }
        self.data_last_bit = data & 1 != 0;

        if mode == EncodeMode::FormatClock {
            match data {
                0xA1 => clock &= !A1_MISSING_CLOCK,
                0xC2 => clock &= !C2_MISSING_CLOCK,
                _ => {}
            }
        }

        self.data = data;
        self.clock = clock;
        self.encoded = interleave(clock, data);
        self.encoded
    }

    /// Split an encoded word back into its (data, clock) bytes.
    pub fn decode(&mut self, encoded: u16) -> (u8, u8) {
        let (data, clock) = deinterleave(encoded);
        self.encoded = encoded;
        self.data = data;
        self.clock = clock;
        self.data_last_bit = data & 1 != 0;
        (data, clock)
    }

    /// True if the last decoded word is an A1 sync byte with its missing clock.
    #[inline]
    pub fn is_sync_a1(&self) -> bool {
        self.data == 0xA1 && self.clock & A1_MISSING_CLOCK == 0
    }

    /// Set the continuation bit, e.g. when a write starts after a read.
    pub fn set_last_bit(&mut self, bit: bool) {
        self.data_last_bit = bit;
    }
}

#[inline]
pub fn interleave(clock: u8, data: u8) -> u16 {
    let mut word = 0u16;
    for i in (0..8).rev() {
        word = (word << 1) | ((clock >> i) & 1) as u16;
        word = (word << 1) | ((data >> i) & 1) as u16;
    }
    word
}

#[inline]
pub fn deinterleave(word: u16) -> (u8, u8) {
    let mut data = 0u8;
    let mut clock = 0u8;
    for i in (0..8).rev() {
        clock = (clock << 1) | ((word >> (2 * i + 1)) & 1) as u8;
        data = (data << 1) | ((word >> (2 * i)) & 1) as u8;
    }
    (data, clock)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_patterns() {
        let mut mfm = MfmCodec::new();
        mfm.encode(0x00, EncodeMode::Normal);
        assert_eq!(mfm.encode(0xA1, EncodeMode::FormatClock), 0x4489);
        assert!(mfm.is_sync_a1());

        let mut mfm = MfmCodec::new();
        mfm.encode(0x00, EncodeMode::Normal);
        assert_eq!(mfm.encode(0xC2, EncodeMode::FormatClock), 0x5224);
    }

    #[test]
    fn test_normal_a1_is_not_sync() {
        let mut mfm = MfmCodec::new();
        mfm.encode(0x00, EncodeMode::Normal);
        let word = mfm.encode(0xA1, EncodeMode::Normal);
        assert_eq!(word, 0x44A9);
        let mut dec = MfmCodec::new();
        dec.decode(word);
        assert_eq!(dec.data, 0xA1);
        assert!(!dec.is_sync_a1());

        dec.decode(MFM_SYNC_A1);
        assert!(dec.is_sync_a1());
    }

    #[test]
    fn test_round_trip_all_bytes() {
        for last in [false, true] {
            for byte in 0..=255u8 {
                let mut enc = MfmCodec::new();
                enc.set_last_bit(last);
                let word = enc.encode(byte, EncodeMode::Normal);

                let mut dec = MfmCodec::new();
                let (data, clock) = dec.decode(word);
                assert_eq!(data, byte);

                // Clock set only between two zero data bits.
                let mut prev = last;
                for i in (0..8).rev() {
                    let cur = byte & (1 << i) != 0;
                    assert_eq!(clock & (1 << i) != 0, !prev && !cur, "byte {:02X} bit {}", byte, i);
                    prev = cur;
                }
            }
        }
    }

    #[test]
    fn test_no_adjacent_transitions() {
        let mut enc = MfmCodec::new();
        let mut last_cell = 0u16;
        for byte in [0x4E, 0x00, 0xFF, 0x01, 0x80, 0xE5] {
            let word = enc.encode(byte, EncodeMode::Normal);
            assert_eq!(word & (word >> 1), 0, "adjacent ones in {:04X}", word);
            assert!(!(last_cell & 1 == 1 && word & 0x8000 != 0));
            last_cell = word;
        }
    }
}
