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

    interrupt.rs

    Interrupt output of the controller.
*/

/// Receiver of the controller's interrupt request line.
pub trait InterruptLine {
    fn set_irq(&mut self, state: bool);
}

/// Interrupt line that latches its level and counts rising edges.
#[derive(Clone, Debug, Default)]
pub struct IrqLatch {
    level: bool,
    rising_edges: u64,
}

impl IrqLatch {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn level(&self) -> bool {
        self.level
    }

    pub fn rising_edges(&self) -> u64 {
        self.rising_edges
    }
}

impl InterruptLine for IrqLatch {
    fn set_irq(&mut self, state: bool) {
        if state && !self.level {
            self.rising_edges += 1;
        }
        self.level = state;
    }
}
