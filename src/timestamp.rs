use std::fmt;

/// A decoded DOS date/time stamp.
///
/// Directory entries carry these as packed 16-bit date and time words;
/// decoding returns a value rather than formatting into shared storage.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DosDateTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hours: u8,
    pub mins: u8,
    pub secs: u8,
}

impl DosDateTime {
    pub fn from_parts(date: u16, time: u16) -> DosDateTime {
        DosDateTime {
            day: (date & 0x1f) as u8,
            month: ((date & 0x1e0) >> 5) as u8,
            year: ((date & 0xfe00) >> 9) + 1980,
            secs: ((time & 0x1f) * 2) as u8,
            mins: ((time & 0x7e0) >> 5) as u8,
            hours: ((time & 0xf800) >> 11) as u8,
        }
    }
}

impl fmt::Display for DosDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}-{}/{}/{}",
            self.hours, self.mins, self.secs, self.day, self.month, self.year
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_packed_fields() {
        // 2004-06-15 13:45:30
        let date = ((2004 - 1980) << 9) | (6 << 5) | 15;
        let time = (13 << 11) | (45 << 5) | (30 / 2);
        let stamp = DosDateTime::from_parts(date, time);
        assert_eq!(stamp.year, 2004);
        assert_eq!(stamp.month, 6);
        assert_eq!(stamp.day, 15);
        assert_eq!(stamp.hours, 13);
        assert_eq!(stamp.mins, 45);
        assert_eq!(stamp.secs, 30);
        assert_eq!(stamp.to_string(), "13:45:30-15/6/2004");
    }

    #[test]
    fn zero_stamp_is_epoch() {
        let stamp = DosDateTime::from_parts(0, 0);
        assert_eq!(stamp.year, 1980);
        assert_eq!(stamp.month, 0);
        assert_eq!(stamp.day, 0);
    }
}
