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

    devices::fdc::dpll.rs

    Digital phase-locked loop of the WD1772 data separator.
    
    A bit cell is divided into 8 slots. A 12-bit counter advances by the
    current increment each slot (nominally 128, so 16 slots of one CPU cycle
    per 2us cell at 8MHz) and the cell closes when bit 11 sets. A transition
    falling inside the cell makes the cell a 1 and the slot it arrived in
    selects phase and frequency corrections for the next cell.
*/

const NOMINAL_INCREMENT: u16 = 128;
const MIN_INCREMENT: u16 = 117;
const MAX_INCREMENT: u16 = 140;
const NO_TRANSITION: u16 = 0xFFFF;
const DELAY_SLOTS: usize = 42;

const PHASE_ADD: [u8; 8] = [0xf, 0x7, 0x3, 0x1, 0, 0, 0, 0];
const PHASE_SUB: [u8; 8] = [0, 0, 0, 0, 0x1, 0x3, 0x7, 0xf];
const FREQ_ADD: [[u8; 8]; 4] = [
    [0xf, 0x7, 0x3, 0x1, 0, 0, 0, 0],
    [0x7, 0x3, 0x1, 0, 0, 0, 0, 0],
    [0x7, 0x3, 0x1, 0, 0, 0, 0, 0],
    [0, 0, 0, 0, 0, 0, 0, 0],
];
const FREQ_SUB: [[u8; 8]; 4] = [
    [0, 0, 0, 0, 0, 0, 0, 0],
    [0, 0, 0, 0, 0, 0x1, 0x3, 0x7],
    [0, 0, 0, 0, 0, 0x1, 0x3, 0x7],
    [0, 0, 0, 0, 0x1, 0x3, 0x7, 0xf],
];

/// Supplies flux transitions to the loop: the interval in CPU cycles from
/// the previous transition to the next one.
pub trait FluxSource {
    fn next_transition(&mut self) -> Option<u32>;
}

#[derive(Clone, Debug)]
pub struct Dpll {
    counter: u16,
    increment: u16,
    transition_time: u16,
    history: u8,
    slot: usize,
    phase_add: u8,
    phase_sub: u8,
    freq_add: u8,
    freq_sub: u8,
    /// Time the current cell started.
    pub ctime: i64,
    latest_transition: i64,
    delays: [i64; DELAY_SLOTS],
}

impl Default for Dpll {
    fn default() -> Self {
        let mut dpll = Self {
            counter: 0,
            increment: NOMINAL_INCREMENT,
            transition_time: NO_TRANSITION,
            history: 0x80,
            slot: 0,
            phase_add: 0,
            phase_sub: 0,
            freq_add: 0,
            freq_sub: 0,
            ctime: 0,
            latest_transition: 0,
            delays: [0; DELAY_SLOTS],
        };
        dpll.set_clock(1);
        dpll
    }
}

impl Dpll {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn reset(&mut self, when: i64) {
        *self = Self {
            ctime: when,
            latest_transition: when,
            ..Default::default()
        };
    }

    /// Set the slot period in CPU cycles.
    pub fn set_clock(&mut self, period: i64) {
        for (i, d) in self.delays.iter_mut().enumerate() {
            *d = period * (i as i64 + 1);
        }
    }

    pub fn increment(&self) -> u16 {
        self.increment
    }

    /// Produce the next bit cell. Returns the bit and the time the cell ended.
    /// A source that runs dry is treated as a long gap with no transitions.
    pub fn next_bit(&mut self, source: &mut dyn FluxSource) -> (bool, i64) {
        while self.ctime - self.latest_transition >= 0 {
            let interval = source.next_transition().unwrap_or(u16::MAX as u32).max(1);
            self.latest_transition += interval as i64;
        }
        let when = self.latest_transition;
        let mut tm: i64;

        loop {
            let etime = self.ctime + self.delays[self.slot.min(DELAY_SLOTS - 1)];

            if self.transition_time == NO_TRANSITION && etime - when >= 0 {
                self.transition_time = self.counter;
            }

            if self.slot < 8 {
                let mask = 1u8 << self.slot;
                if self.phase_add & mask != 0 {
                    self.counter += 226;
                }
                else if self.phase_sub & mask != 0 {
                    self.counter += 30;
                }
                else {
                    self.counter += self.increment;
                }

                if self.freq_add & mask != 0 && self.increment < MAX_INCREMENT {
                    self.increment += 1;
                }
                else if self.freq_sub & mask != 0 && self.increment > MIN_INCREMENT {
                    self.increment -= 1;
                }
            }
            else {
                self.counter += self.increment;
            }

            self.slot += 1;
            tm = etime;
            if self.counter & 0x800 != 0 {
                break;
            }
        }

        let bit = self.transition_time != NO_TRANSITION;
        if bit {
            let cslot = ((self.transition_time >> 8) & 7) as usize;
            self.phase_add = PHASE_ADD[cslot];
            self.phase_sub = PHASE_SUB[cslot];
            let late = self.transition_time & 0x400 != 0;

            if self.history & 0x80 != 0 {
                self.history = if late { 0x80 } else { 0x83 };
            }
            else if self.history & 0x40 != 0 {
                self.history = if late {
                    self.history & 2
                }
                else {
                    (self.history & 2) | 1
                };
            }
            let h = (self.history & 3) as usize;
            self.freq_add = FREQ_ADD[h][cslot];
            self.freq_sub = FREQ_SUB[h][cslot];
            self.history = if late {
                (self.history >> 1) | 2
            }
            else {
                self.history >> 1
            };
        }
        else {
            self.phase_add = 0;
            self.phase_sub = 0;
            self.freq_add = 0;
            self.freq_sub = 0;
        }

        self.counter &= 0x7ff;
        self.ctime = tm;
        self.transition_time = NO_TRANSITION;
        self.slot = 0;
        (bit, tm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct Intervals(VecDeque<u32>);

    impl FluxSource for Intervals {
        fn next_transition(&mut self) -> Option<u32> {
            self.0.pop_front()
        }
    }

    /// Flux intervals for a cell stream, 16 cycles per cell, with each
    /// transition in the middle of its cell.
    fn flux_from_cells(cells: &[bool], jitter: &[i32]) -> VecDeque<u32> {
        let mut out = VecDeque::new();
        let mut since = -8i32;
        let mut j = 0;
        for &c in cells {
            since += 16;
            if c {
                let wobble = if jitter.is_empty() { 0 } else { jitter[j % jitter.len()] };
                j += 1;
                out.push_back((since + wobble) as u32);
                since = -wobble;
            }
        }
        out
    }

    fn cells_of(words: &[u16]) -> Vec<bool> {
        words
            .iter()
            .flat_map(|w| (0..16).rev().map(move |i| (w >> i) & 1 != 0))
            .collect()
    }

    fn recover(cells: &[bool], jitter: &[i32]) -> Vec<bool> {
        let mut source = Intervals(flux_from_cells(cells, jitter));
        let mut dpll = Dpll::new();
        dpll.reset(0);
        (0..cells.len()).map(|_| dpll.next_bit(&mut source).0).collect()
    }

    #[test]
    fn test_clean_flux_recovers_cells() {
        // 0x4E gap bytes then a sync.
        let cells = cells_of(&[0x9254, 0x9254, 0x9254, 0xAAAA, 0xAAAA, 0x4489, 0x4489]);
        let bits = recover(&cells, &[]);
        assert_eq!(&bits[..cells.len() - 2], &cells[..cells.len() - 2]);
    }

    #[test]
    fn test_jittered_flux_stays_locked() {
        let cells = cells_of(&[0x9254; 24]);
        for jitter in [&[1, -1, 2, 0, -2, 1][..], &[3, -3][..], &[2, -2, 1, -1][..]] {
            let bits = recover(&cells, jitter);
            assert_eq!(&bits[..cells.len() - 2], &cells[..cells.len() - 2]);
        }
    }

    #[test]
    fn test_tracks_slow_rotation() {
        // A 1010... pattern with 17-cycle cells instead of 16.
        let mut source = Intervals(std::iter::repeat(34).take(400).collect());
        let mut dpll = Dpll::new();
        dpll.reset(0);
        for _ in 0..300 {
            dpll.next_bit(&mut source);
            assert!((MIN_INCREMENT..=MAX_INCREMENT).contains(&dpll.increment()));
        }
        // 128 * 16 / 17
        assert!((118..=122).contains(&dpll.increment()));
    }
}
