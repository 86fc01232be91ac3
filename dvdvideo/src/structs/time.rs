//! DVD playback times and MPEG frame rates.

use std::fmt::{Display, Formatter};

/// Playback time as stored in IFO tables: BCD hours, minutes and seconds,
/// with the frame count and rate flag packed into `frame_u`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DvdTime {
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub frame_u: u8,
}

impl DvdTime {
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Self {
            hour: bytes[0],
            minute: bytes[1],
            second: bytes[2],
            frame_u: bytes[3],
        }
    }

    /// Decodes one packed BCD byte. Invalid nibbles are taken at face value.
    pub fn bcd(value: u8) -> u32 {
        (value >> 4) as u32 * 10 + (value & 0xF) as u32
    }

    /// Frames per second selected by the two rate bits.
    pub fn frame_rate(&self) -> f64 {
        if (self.frame_u & 0xC0) >> 6 == 1 {
            25.0
        } else {
            30000.0 / 1001.0
        }
    }

    /// Frame count and frame duration in milliseconds.
    pub fn to_frames(&self) -> (u32, f64) {
        let rate = self.frame_rate();
        let seconds =
            Self::bcd(self.hour) * 3600 + Self::bcd(self.minute) * 60 + Self::bcd(self.second);
        let frames = Self::bcd(self.frame_u & 0x3F);

        let total = (seconds as f64 * rate + frames as f64) as u32;
        (total, 1000.0 / rate)
    }
}

impl Display for DvdTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}.{:02} @ {}",
            Self::bcd(self.hour),
            Self::bcd(self.minute),
            Self::bcd(self.second),
            Self::bcd(self.frame_u & 0x3F),
            if self.frame_rate() == 25.0 { "25" } else { "29.97" }
        )
    }
}

/// MPEG-1/2 `frame_rate_code` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameRate {
    R23_976,
    R24,
    R25,
    R29_97,
    R30,
    R50,
    R59_94,
    R60,
    Invalid(u8),
}

impl From<u8> for FrameRate {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::R23_976,
            2 => Self::R24,
            3 => Self::R25,
            4 => Self::R29_97,
            5 => Self::R30,
            6 => Self::R50,
            7 => Self::R59_94,
            8 => Self::R60,
            _ => Self::Invalid(value),
        }
    }
}

impl FrameRate {
    /// Exact rate as `(numerator, denominator)`.
    ///
    /// Reserved codes fall back to 25 fps.
    pub fn as_rational(&self) -> (u64, u64) {
        match self {
            FrameRate::R23_976 => (24000, 1001),
            FrameRate::R24 => (24, 1),
            FrameRate::R25 | FrameRate::Invalid(_) => (25, 1),
            FrameRate::R29_97 => (30000, 1001),
            FrameRate::R30 => (30, 1),
            FrameRate::R50 => (50, 1),
            FrameRate::R59_94 => (60000, 1001),
            FrameRate::R60 => (60, 1),
        }
    }

    pub fn as_f64(&self) -> f64 {
        let (num, den) = self.as_rational();
        num as f64 / den as f64
    }

    /// Converts half-frame units to nanoseconds, rounded to nearest.
    pub fn units_to_ns(&self, units: u64) -> u64 {
        let (num, den) = self.as_rational();
        let scaled = units as u128 * 1_000_000_000 * den as u128;
        let divisor = 2 * num as u128;
        ((scaled + divisor / 2) / divisor) as u64
    }

    /// Inverse of [`units_to_ns`](Self::units_to_ns).
    pub fn ns_to_units(&self, ns: u64) -> u64 {
        let (num, den) = self.as_rational();
        let scaled = ns as u128 * 2 * num as u128;
        let divisor = 1_000_000_000 * den as u128;
        ((scaled + divisor / 2) / divisor) as u64
    }
}

impl Display for FrameRate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let fps = match &self {
            FrameRate::R23_976 => "23.976",
            FrameRate::R24 => "24",
            FrameRate::R25 => "25",
            FrameRate::R29_97 => "29.97",
            FrameRate::R30 => "30",
            FrameRate::R50 => "50",
            FrameRate::R59_94 => "59.94",
            FrameRate::R60 => "60",
            FrameRate::Invalid(v) => return write!(f, "Invalid({v:02X})"),
        };

        f.write_str(fps)
    }
}

/// Renders nanoseconds as `HH:MM:SS.nnnnnnnnn`.
pub fn format_time(ns: u64) -> String {
    let secs = ns / 1_000_000_000;
    format!(
        "{:02}:{:02}:{:02}.{:09}",
        secs / 3600,
        (secs / 60) % 60,
        secs % 60,
        ns % 1_000_000_000
    )
}

/// Renders a millisecond time of day as `hh_mm_ss`.
pub fn format_tmc_time(ms: u64) -> String {
    let secs = ms / 1000;
    format!(
        "{:02}_{:02}_{:02}",
        (secs / 3600) % 24,
        (secs / 60) % 60,
        secs % 60
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pal_playback_time() {
        // 00:01:30, 12 frames, 25 fps flag
        let time = DvdTime::from_bytes([0x00, 0x01, 0x30, 0x40 | 0x12]);
        let (frames, dur) = time.to_frames();
        assert_eq!(frames, 90 * 25 + 12);
        assert_eq!(dur, 40.0);
    }

    #[test]
    fn ntsc_playback_time() {
        let time = DvdTime::from_bytes([0x01, 0x00, 0x00, 0xC0 | 0x05]);
        let (frames, dur) = time.to_frames();
        assert_eq!(frames, (3600.0 * 30000.0 / 1001.0 + 5.0) as u32);
        assert!((dur - 33.366_666).abs() < 1e-5);
    }

    #[test]
    fn half_frame_units_round_trip() {
        for rate in [FrameRate::R25, FrameRate::R29_97, FrameRate::R23_976] {
            for units in [0u64, 1, 2, 3, 4, 6, 1001, 90_000, 432_000] {
                let ns = rate.units_to_ns(units);
                assert_eq!(rate.ns_to_units(ns), units, "{rate} {units}");
            }
        }
        assert_eq!(FrameRate::R25.units_to_ns(2), 40_000_000);
        assert_eq!(FrameRate::R29_97.units_to_ns(2), 33_366_667);
    }

    #[test]
    fn script_time_of_day() {
        assert_eq!(format_tmc_time(0), "00_00_00");
        assert_eq!(format_tmc_time(45_296_999), "12_34_56");
        assert_eq!(format_tmc_time(86_400_000 + 61_000), "00_01_01");
    }

    #[test]
    fn formats_nanoseconds() {
        assert_eq!(format_time(0), "00:00:00.000000000");
        assert_eq!(format_time(3_723_000_000_001), "01:02:03.000000001");
    }
}
