//! Little-endian integer codec, DOS date/time packing, and version fields.

use std::io::{self, Read, Write};

use chrono::{Datelike, Timelike};

pub(crate) fn read_u16<R: Read>(r: &mut R) -> io::Result<u16> {
    let mut buf = [0u8; 2];
    r.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

pub(crate) fn read_u32<R: Read>(r: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

pub(crate) fn read_u64<R: Read>(r: &mut R) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

pub(crate) fn write_u16<W: Write>(w: &mut W, v: u16) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

pub(crate) fn write_u32<W: Write>(w: &mut W, v: u32) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

pub(crate) fn write_u64<W: Write>(w: &mut W, v: u64) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

/// A PKWARE "version made by / version needed" field: major.minor plus a
/// host-compatibility byte, packed into a single `u16`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
    pub compat: u8,
}

impl Version {
    pub const fn new(major: u8, minor: u8, compat: u8) -> Self {
        Self {
            major,
            minor,
            compat,
        }
    }

    /// version-needed default for classic (non-ZIP64) archives: 2.0.
    pub const CLASSIC: Version = Version::new(2, 0, 0);
    /// version-needed default once ZIP64 fields are in play: 4.6.
    pub const ZIP64: Version = Version::new(4, 6, 0);

    pub fn to_u16(self) -> u16 {
        let low = ((self.major as u16) * 10 + (self.minor as u16 % 10)) & 0xFF;
        ((self.compat as u16) << 8) | low
    }

    pub fn from_u16(v: u16) -> Self {
        let compat = (v >> 8) as u8;
        let low = (v & 0xFF) as u8;
        Self {
            major: low / 10,
            minor: low % 10,
            compat,
        }
    }
}

/// DOS-packed (date, time) pair as carried in local headers and CDR entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DosTime {
    pub date: u16,
    pub time: u16,
}

impl DosTime {
    /// Encode a wall-clock `chrono` datetime, clamping years below 1980 up to
    /// 1980 and truncating seconds to 2-second resolution, per the DOS time
    /// format.
    pub fn encode<Tz: chrono::TimeZone>(dt: &chrono::DateTime<Tz>) -> Self {
        let year = dt.year().max(1980) as u32 - 1980;
        let month = dt.month();
        let day = dt.day();
        let hour = dt.hour();
        let minute = dt.minute();
        let second = dt.second();

        let date = ((year << 9) | (month << 5) | day) as u16;
        let time = ((hour << 11) | (minute << 5) | (second >> 1)) as u16;
        Self { date, time }
    }

    /// Decode to a `NaiveDateTime`. Seconds carry only 2-second resolution.
    pub fn decode(self) -> chrono::NaiveDateTime {
        let year = 1980 + ((self.date >> 9) & 0x7F) as i32;
        let month = ((self.date >> 5) & 0x0F) as u32;
        let day = (self.date & 0x1F) as u32;
        let hour = ((self.time >> 11) & 0x1F) as u32;
        let minute = ((self.time >> 5) & 0x3F) as u32;
        let second = ((self.time & 0x1F) as u32) * 2;

        let date = chrono::NaiveDate::from_ymd_opt(year, month.max(1), day.max(1))
            .unwrap_or_else(|| chrono::NaiveDate::from_ymd_opt(1980, 1, 1).unwrap());
        let time = chrono::NaiveTime::from_hms_opt(hour, minute, second.min(59))
            .unwrap_or_else(|| chrono::NaiveTime::from_hms_opt(0, 0, 0).unwrap());
        chrono::NaiveDateTime::new(date, time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn version_roundtrip() {
        for major in 0..10 {
            for minor in 0..10 {
                for compat in [0u8, 3, 19, 255] {
                    let v = Version::new(major, minor, compat);
                    let decoded = Version::from_u16(v.to_u16());
                    assert_eq!(decoded, v);
                }
            }
        }
    }

    #[test]
    fn dos_time_known_value() {
        // 1985-10-26T09:00:00Z — the canonical DOS-time test vector.
        let dt = chrono::Utc.with_ymd_and_hms(1985, 10, 26, 9, 0, 0).unwrap();
        let packed = DosTime::encode(&dt);
        let back = packed.decode();
        assert_eq!(back.date().year(), 1985);
        assert_eq!(back.date().month(), 10);
        assert_eq!(back.date().day(), 26);
        assert_eq!(back.time().hour(), 9);
        assert_eq!(back.time().minute(), 0);
        assert_eq!(back.time().second(), 0);
    }

    #[test]
    fn dos_time_clamps_pre_1980() {
        let dt = chrono::Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap();
        let packed = DosTime::encode(&dt);
        assert_eq!(packed.decode().date().year(), 1980);
    }

    #[test]
    fn dos_time_truncates_to_two_seconds() {
        let dt = chrono::Utc.with_ymd_and_hms(2020, 6, 15, 12, 30, 45).unwrap();
        let packed = DosTime::encode(&dt);
        // 45 -> 44 (odd seconds truncate down on encode, *2 on decode)
        assert_eq!(packed.decode().time().second(), 44);
    }
}
