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

    devices::dma.rs

    The DMA collaborator. The controller hands over one byte per data
    request; the channel keeps a sector counter that the controller consults
    before pushing read data.
*/

use std::collections::VecDeque;

pub const DMA_SECTOR_SIZE: usize = 512;

pub trait DmaChannel {
    /// Accept a byte read from disk.
    fn push_byte(&mut self, byte: u8);
    /// Supply the next byte to write to disk.
    fn pop_byte(&mut self) -> u8;
    /// Sectors remaining in the transfer.
    fn counter(&self) -> u16;
    /// Notification that the controller raised DRQ.
    fn request(&mut self) {}
}

/// A DMA channel backed by host memory: data read from disk accumulates in
/// `received`, data to be written is queued in `outgoing`.
#[derive(Clone, Debug, Default)]
pub struct DmaFifo {
    received: Vec<u8>,
    outgoing: VecDeque<u8>,
    sector_count: u16,
    byte_in_sector: usize,
    requests: u64,
}

impl DmaFifo {
    pub fn new() -> Self {
        Default::default()
    }

    /// Arm a transfer of `sectors` 512-byte blocks.
    pub fn set_sector_count(&mut self, sectors: u16) {
        self.sector_count = sectors;
        self.byte_in_sector = 0;
    }

    pub fn queue_write_data(&mut self, data: &[u8]) {
        self.outgoing.extend(data.iter().copied());
    }

    pub fn received(&self) -> &[u8] {
        &self.received
    }

    pub fn take_received(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.received)
    }

    pub fn outgoing_len(&self) -> usize {
        self.outgoing.len()
    }

    /// Total DRQ notifications seen.
    pub fn requests(&self) -> u64 {
        self.requests
    }

    pub fn clear(&mut self) {
        *self = Default::default();
    }

    fn count_byte(&mut self) {
        self.byte_in_sector += 1;
        if self.byte_in_sector == DMA_SECTOR_SIZE {
            self.byte_in_sector = 0;
            self.sector_count = self.sector_count.saturating_sub(1);
        }
    }
}

impl DmaChannel for DmaFifo {
    fn push_byte(&mut self, byte: u8) {
        self.received.push(byte);
        self.count_byte();
    }

    fn pop_byte(&mut self) -> u8 {
        let byte = self.outgoing.pop_front().unwrap_or_else(|| {
            log::trace!("DmaFifo: write underrun, supplying 0x00");
            0
        });
        self.count_byte();
        byte
    }

    fn counter(&self) -> u16 {
        self.sector_count
    }

    fn request(&mut self) {
        self.requests += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_decrements_per_sector() {
        let mut dma = DmaFifo::new();
        dma.set_sector_count(2);
        for i in 0..DMA_SECTOR_SIZE {
            dma.push_byte(i as u8);
        }
        assert_eq!(dma.counter(), 1);
        assert_eq!(dma.received().len(), DMA_SECTOR_SIZE);
    }

    #[test]
    fn test_pop_order_and_underrun() {
        let mut dma = DmaFifo::new();
        dma.queue_write_data(&[1, 2]);
        assert_eq!(dma.pop_byte(), 1);
        assert_eq!(dma.pop_byte(), 2);
        assert_eq!(dma.pop_byte(), 0);
    }
}
