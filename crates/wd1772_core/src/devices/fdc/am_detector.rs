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

    devices::fdc::am_detector.rs

    Address mark detector.
    
    At byte level the detector only counts contiguous A1 syncs. At bit level
    (flux backends) it watches a 16-cell window of the recovered bit stream
    for the 0x4489 and 0x5224 patterns, aligns the data shift register to the
    mark and gates the CRC logic, raising signals that the state machine polls.
*/

use modular_bitfield::{bitfield, prelude::*};

/// Signals raised by the bit-level detector. Layout follows the order the
/// signals are produced in.
#[bitfield]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct AmSignals {
    pub detect_enable: bool,
    pub crc_enable: bool,
    pub crc_active: bool,
    pub am_active: bool,
    pub a1_active: bool,
    pub am_found: bool,
    pub mark_a1: bool,
    pub mark_c2: bool,
    pub dsr_ready: bool,
    /// The byte just assembled completes three A1 marks.
    pub dsr_am: bool,
    /// The byte just assembled is an A1 mark.
    pub dsr_a1: bool,
    #[skip]
    unused: B5,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum MarkType {
    None,
    A1,
    C2,
}

#[derive(Clone, Debug)]
pub struct AmDetector {
    pub enabled: bool,
    /// Contiguous A1 syncs seen so far.
    pub n_a1: u8,
    pub signals: AmSignals,
    decode: u32,
    dsr: u8,
    dsr_count: u8,
    data_delay: u8,
    data_skip: u8,
    mark_distance: u8,
    mark_type: MarkType,
    crc_count: u32,
}

impl Default for AmDetector {
    fn default() -> Self {
        let mut amd = Self {
            enabled: false,
            n_a1: 0,
            signals: AmSignals::new(),
            decode: 0,
            dsr: 0,
            dsr_count: 0,
            data_delay: 2,
            data_skip: 0,
            mark_distance: 0,
            mark_type: MarkType::None,
            crc_count: 0,
        };
        amd.enable();
        amd
    }
}

impl AmDetector {
    pub fn new() -> Self {
        Default::default()
    }

    /// Restart mark search without disturbing byte alignment.
    pub fn enable(&mut self) {
        self.enabled = true;
        self.n_a1 = 0;
        self.signals.set_detect_enable(true);
        self.signals.set_crc_enable(true);
        self.signals.set_crc_active(false);
        self.signals.set_am_active(false);
    }

    /// Full reset, including bit alignment.
    pub fn reset(&mut self) {
        self.data_delay = 2;
        self.mark_distance = 0;
        self.mark_type = MarkType::None;
        self.data_skip = 0;
        self.decode = 0;
        self.signals = AmSignals::new();
        self.dsr = 0;
        self.dsr_count = 0;
        self.crc_count = 0;
        self.enable();
    }

    pub fn disable_crc(&mut self) {
        self.signals.set_crc_enable(false);
    }

    /// Clear the per-byte signals before a new byte is assembled.
    pub fn clear_dsr_signals(&mut self) {
        self.signals.set_dsr_ready(false);
        self.signals.set_dsr_am(false);
        self.signals.set_dsr_a1(false);
    }

    /// Shift one recovered bit cell in. Returns the assembled byte when the
    /// data shift register is ready.
    pub fn shift_bit(&mut self, bit: bool) -> Option<u8> {
        self.decode = (self.decode << 1) | bit as u32;

        let mut sig = self.signals;
        sig.set_am_found(false);
        sig.set_mark_a1(false);
        sig.set_mark_c2(false);

        if self.mark_distance > 0 {
            self.mark_distance -= 1;
        }

        if self.enabled {
            let mark = match self.decode & 0xFFFF {
                // An A1 overlapping the previous A1 is not a new mark.
                0x4489 if self.mark_distance == 0 || self.mark_type != MarkType::A1 => MarkType::A1,
                0x5224 => MarkType::C2,
                _ => MarkType::None,
            };

            if mark != MarkType::None {
                // Last data bit of the mark was just read; data resumes one clock later.
                self.data_delay = 1;
                if self.mark_distance > 0 && self.mark_type != mark {
                    self.data_skip += 1;
                    self.data_delay += 2;
                }
                if self.dsr_count == 0 {
                    self.data_skip += 1;
                }
                self.dsr_count = 7;
                self.mark_distance = 16;
                self.mark_type = mark;

                if mark == MarkType::A1 {
                    sig.set_mark_a1(true);
                    sig.set_a1_active(true);
                    if sig.crc_enable() && !sig.crc_active() {
                        sig.set_crc_active(true);
                        self.crc_count = 16;
                    }
                }
                else {
                    sig.set_mark_c2(true);
                }
                log::trace!("am_detector: mark {:04X}", self.decode & 0xFFFF);
            }
        }

        if sig.crc_active() {
            if self.crc_count & 0xF == 0 {
                if self.crc_count > 48 || sig.mark_a1() {
                    if self.crc_count == 48 {
                        // Third contiguous A1.
                        sig.set_am_found(true);
                        sig.set_am_active(true);
                        sig.set_detect_enable(false);
                    }
                }
                else {
                    sig.set_crc_active(false);
                    sig.set_am_active(false);
                }
            }
            self.crc_count += 1;
        }

        let mut ready = None;
        if self.data_delay == 0 {
            // Clock cell now; the data cell is one position back in the window.
            self.data_delay = 1;
            sig.set_dsr_ready(false);
            sig.set_dsr_am(false);
            sig.set_dsr_a1(false);

            self.dsr = (self.dsr << 1) | ((self.decode >> 1) & 1) as u8;
            self.dsr_count += 1;
            if self.dsr_count == 8 {
                self.dsr_count = 0;
                if sig.am_active() {
                    sig.set_am_active(false);
                    sig.set_dsr_am(true);
                }
                if sig.a1_active() {
                    sig.set_a1_active(false);
                    sig.set_dsr_a1(true);
                }
                if self.data_skip == 0 {
                    sig.set_dsr_ready(true);
                    ready = Some(self.dsr);
                }
                else {
                    self.data_skip -= 1;
                }
            }
        }
        else {
            self.data_delay -= 1;
        }

        self.signals = sig;
        ready
    }

    /// The 16 most recent cells, as an MFM word.
    #[inline]
    pub fn window(&self) -> u16 {
        (self.decode & 0xFFFF) as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::fdc::mfm::{EncodeMode, MfmCodec};

    fn feed(amd: &mut AmDetector, words: &[u16]) -> Vec<(u8, AmSignals)> {
        let mut out = Vec::new();
        for w in words {
            for i in (0..16).rev() {
                if let Some(b) = amd.shift_bit((w >> i) & 1 != 0) {
                    out.push((b, amd.signals));
                }
            }
        }
        out
    }

    fn encode_stream(bytes: &[(u8, bool)]) -> Vec<u16> {
        let mut mfm = MfmCodec::new();
        bytes
            .iter()
            .map(|&(b, sync)| {
                mfm.encode(
                    b,
                    if sync {
                        EncodeMode::FormatClock
                    }
                    else {
                        EncodeMode::Normal
                    },
                )
            })
            .collect()
    }

    #[test]
    fn test_id_mark_from_bits() {
        let mut stream = vec![(0x4E, false); 4];
        stream.extend([(0x00, false); 12]);
        stream.extend([(0xA1, true); 3]);
        stream.extend([(0xFE, false), (0x05, false), (0x00, false), (0x03, false), (0x02, false)]);
        stream.extend([(0x4E, false); 2]);
        let words = encode_stream(&stream);

        let mut amd = AmDetector::new();
        amd.reset();
        let bytes = feed(&mut amd, &words);

        let am_pos = bytes
            .iter()
            .position(|(_, s)| s.dsr_am())
            .expect("address mark should be signalled");
        let after: Vec<u8> = bytes[am_pos + 1..].iter().map(|(b, _)| *b).collect();
        assert_eq!(&after[..5], &[0xFE, 0x05, 0x00, 0x03, 0x02]);
        assert!(bytes[..=am_pos].iter().filter(|(_, s)| s.dsr_a1()).count() >= 2);
        // The first sync is misaligned against the preamble and reads as 0x14.
        assert_eq!(bytes[am_pos - 2].0, 0x14);
    }

    #[test]
    fn test_two_syncs_are_not_a_mark() {
        let mut stream = vec![(0x00, false); 12];
        stream.extend([(0xA1, true); 2]);
        stream.extend([(0xFE, false), (0x01, false), (0x02, false)]);
        let words = encode_stream(&stream);

        let mut amd = AmDetector::new();
        amd.reset();
        let bytes = feed(&mut amd, &words);
        assert!(bytes.iter().all(|(_, s)| !s.dsr_am()));
    }

    #[test]
    fn test_disabled_detector_ignores_marks() {
        let words = encode_stream(&[(0x00, false), (0xA1, true), (0xA1, true), (0xA1, true), (0xFE, false)]);
        let mut amd = AmDetector::new();
        amd.reset();
        amd.enabled = false;
        let bytes = feed(&mut amd, &words);
        assert!(bytes.iter().all(|(_, s)| !s.dsr_a1() && !s.dsr_am()));
    }
}
