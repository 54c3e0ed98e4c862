//! Fixed-layout event records, packed and unpacked by hand so native struct
//! padding never leaks onto disk.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

pub const RAW_EVENT_SIZE: usize = 48;
pub const CAL_EVENT_SIZE: usize = 40;

/// One decoded packet entry before calibration: 16 raw ADC readings plus
/// topology and timestamp. Field order is the wire/disk order, not a
/// convenient in-memory order.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawEvent {
    pub ct: i64,
    pub a: i16,
    pub b: i16,
    pub c: i16,
    pub d: i16,
    pub com0: i16,
    pub com1: i16,
    pub com0h: i16,
    pub com1h: i16,
    pub u0: i16,
    pub v0: i16,
    pub u1: i16,
    pub v1: i16,
    pub u0h: i16,
    pub v0h: i16,
    pub u1h: i16,
    pub v1h: i16,
    pub panel: u8,
    pub cartridge: u8,
    pub daq: u8,
    pub chip: u8,
    pub module: u8,
}

impl RawEvent {
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_i64::<LittleEndian>(self.ct)?;
        for v in [
            self.a, self.b, self.c, self.d, self.com0, self.com1, self.com0h, self.com1h,
            self.u0, self.v0, self.u1, self.v1, self.u0h, self.v0h, self.u1h, self.v1h,
        ] {
            w.write_i16::<LittleEndian>(v)?;
        }
        w.write_u8(self.panel)?;
        w.write_u8(self.cartridge)?;
        w.write_u8(self.daq)?;
        w.write_u8(self.chip)?;
        w.write_u8(self.module)?;
        w.write_all(&[0u8; 3])?;
        Ok(())
    }

    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let ct = r.read_i64::<LittleEndian>()?;
        let mut adc = [0i16; 16];
        for slot in adc.iter_mut() {
            *slot = r.read_i16::<LittleEndian>()?;
        }
        let panel = r.read_u8()?;
        let cartridge = r.read_u8()?;
        let daq = r.read_u8()?;
        let chip = r.read_u8()?;
        let module = r.read_u8()?;
        let mut reserved = [0u8; 3];
        r.read_exact(&mut reserved)?;
        Ok(RawEvent {
            ct,
            a: adc[0],
            b: adc[1],
            c: adc[2],
            d: adc[3],
            com0: adc[4],
            com1: adc[5],
            com0h: adc[6],
            com1h: adc[7],
            u0: adc[8],
            v0: adc[9],
            u1: adc[10],
            v1: adc[11],
            u0h: adc[12],
            v0h: adc[13],
            u1h: adc[14],
            v1h: adc[15],
            panel,
            cartridge,
            daq,
            chip,
            module,
        })
    }
}

/// One fully calibrated singles event, identified to a crystal.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalEvent {
    pub ct: i64,
    pub ft: f32,
    pub energy: f32,
    pub spatial_total: f32,
    pub x: f32,
    pub y: f32,
    pub panel: u8,
    pub cartridge: u8,
    pub fin: u8,
    pub module: u8,
    pub apd: u8,
    pub crystal: u8,
    pub daq: u8,
    pub chip: u8,
}

impl CalEvent {
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_i64::<LittleEndian>(self.ct)?;
        w.write_f32::<LittleEndian>(self.ft)?;
        w.write_f32::<LittleEndian>(self.energy)?;
        w.write_f32::<LittleEndian>(self.spatial_total)?;
        w.write_f32::<LittleEndian>(self.x)?;
        w.write_f32::<LittleEndian>(self.y)?;
        w.write_u8(self.panel)?;
        w.write_u8(self.cartridge)?;
        w.write_u8(self.fin)?;
        w.write_u8(self.module)?;
        w.write_u8(self.apd)?;
        w.write_u8(self.crystal)?;
        w.write_u8(self.daq)?;
        w.write_u8(self.chip)?;
        w.write_all(&[0u8; 4])?;
        Ok(())
    }

    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let ct = r.read_i64::<LittleEndian>()?;
        let ft = r.read_f32::<LittleEndian>()?;
        let energy = r.read_f32::<LittleEndian>()?;
        let spatial_total = r.read_f32::<LittleEndian>()?;
        let x = r.read_f32::<LittleEndian>()?;
        let y = r.read_f32::<LittleEndian>()?;
        let panel = r.read_u8()?;
        let cartridge = r.read_u8()?;
        let fin = r.read_u8()?;
        let module = r.read_u8()?;
        let apd = r.read_u8()?;
        let crystal = r.read_u8()?;
        let daq = r.read_u8()?;
        let chip = r.read_u8()?;
        let mut reserved = [0u8; 4];
        r.read_exact(&mut reserved)?;
        Ok(CalEvent {
            ct,
            ft,
            energy,
            spatial_total,
            x,
            y,
            panel,
            cartridge,
            fin,
            module,
            apd,
            crystal,
            daq,
            chip,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_raw() -> RawEvent {
        RawEvent {
            ct: 123_456_789,
            a: 1,
            b: 2,
            c: 3,
            d: 4,
            com0: 5,
            com1: 6,
            com0h: 7,
            com1h: 8,
            u0: 9,
            v0: 10,
            u1: 11,
            v1: 12,
            u0h: 13,
            v0h: 14,
            u1h: 15,
            v1h: 16,
            panel: 1,
            cartridge: 2,
            daq: 3,
            chip: 4,
            module: 5,
        }
    }

    fn sample_cal() -> CalEvent {
        CalEvent {
            ct: 42,
            ft: 1.5,
            energy: 511.0,
            spatial_total: 1000.0,
            x: 0.25,
            y: -0.25,
            panel: 0,
            cartridge: 1,
            fin: 2,
            module: 3,
            apd: 1,
            crystal: 63,
            daq: 0,
            chip: 1,
        }
    }

    #[test]
    fn raw_event_is_48_bytes_on_disk() {
        let mut buf = Vec::new();
        sample_raw().write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), RAW_EVENT_SIZE);
        assert_eq!(std::mem::size_of::<RawEvent>(), RAW_EVENT_SIZE);
    }

    #[test]
    fn cal_event_is_40_bytes_on_disk() {
        let mut buf = Vec::new();
        sample_cal().write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), CAL_EVENT_SIZE);
        assert_eq!(std::mem::size_of::<CalEvent>(), CAL_EVENT_SIZE);
    }

    #[test]
    fn raw_event_round_trips() {
        let raw = sample_raw();
        let mut buf = Vec::new();
        raw.write_to(&mut buf).unwrap();
        let back = RawEvent::read_from(&mut &buf[..]).unwrap();
        assert_eq!(raw, back);
    }

    #[test]
    fn cal_event_round_trips() {
        let cal = sample_cal();
        let mut buf = Vec::new();
        cal.write_to(&mut buf).unwrap();
        let back = CalEvent::read_from(&mut &buf[..]).unwrap();
        assert_eq!(cal, back);
    }
}
