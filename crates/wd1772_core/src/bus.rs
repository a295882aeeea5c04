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

    bus.rs

    Register bus interface used by the CPU side to reach the controller.
*/

pub const NO_IO_BYTE: u8 = 0xFF;

/// Time elapsed on the caller's clock since the last access to a device.
#[derive(Copy, Clone, Debug)]
pub enum DeviceRunTimeUnit {
    SystemTicks(u32),
    Microseconds(f64),
}

impl DeviceRunTimeUnit {
    pub fn to_ticks(&self, cpu_hz: u64) -> u64 {
        match *self {
            DeviceRunTimeUnit::SystemTicks(ticks) => ticks as u64,
            DeviceRunTimeUnit::Microseconds(us) => (us * cpu_hz as f64 / 1_000_000.0) as u64,
        }
    }
}

pub trait IoDevice {
    /// Read a byte from the specified port, after running the device forward
    /// by `delta`. The default implementation returns NO_IO_BYTE (0xFF).
    fn read_u8(&mut self, _port: u16, _delta: DeviceRunTimeUnit) -> u8 {
        NO_IO_BYTE
    }

    /// Write a byte to the specified port, after running the device forward
    /// by `delta`. The default implementation does nothing.
    fn write_u8(&mut self, _port: u16, _data: u8, _delta: DeviceRunTimeUnit) {}

    /// Return a list of ports the device should service, comprised of a
    /// vector of tuples of (port description, port number).
    fn port_list(&self) -> Vec<(String, u16)>;
}
