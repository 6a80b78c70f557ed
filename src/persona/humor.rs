//! Humor level and the five communication bands derived from it.

use serde::{Serialize, Serializer};
use std::fmt;

/// User-selected personality setting, always within 0..=100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HumorLevel(u8);

impl HumorLevel {
    pub const MAX: u8 = 100;

    /// Clamp any integer into the 0-100 range.
    pub fn clamped(value: i64) -> Self {
        Self(value.clamp(0, Self::MAX as i64) as u8)
    }

    /// Strict constructor used where out-of-range input must be rejected.
    pub fn try_new(value: i64) -> Option<Self> {
        (0..=Self::MAX as i64).contains(&value).then(|| Self(value as u8))
    }

    pub fn value(&self) -> u8 {
        self.0
    }

    pub fn band(&self) -> HumorBand {
        HumorBand::from_level(*self)
    }
}

impl Default for HumorLevel {
    fn default() -> Self {
        Self(Self::MAX)
    }
}

impl fmt::Display for HumorLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

impl Serialize for HumorLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.0)
    }
}

/// Communication style bands, highest humor first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HumorBand {
    /// 80-100
    Casual,
    /// 60-79
    WarmProfessional,
    /// 40-59
    StandardProfessional,
    /// 20-39
    Formal,
    /// 0-19
    MaximallyFormal,
}

impl HumorBand {
    pub fn from_level(level: HumorLevel) -> Self {
        match level.value() {
            80..=u8::MAX => HumorBand::Casual,
            60..=79 => HumorBand::WarmProfessional,
            40..=59 => HumorBand::StandardProfessional,
            20..=39 => HumorBand::Formal,
            _ => HumorBand::MaximallyFormal,
        }
    }

    /// Short label shown next to the humor control.
    pub fn label(&self) -> &'static str {
        match self {
            HumorBand::Casual => "Friendly & Casual",
            HumorBand::WarmProfessional => "Warm & Supportive",
            HumorBand::StandardProfessional => "Professional",
            HumorBand::Formal => "Formal",
            HumorBand::MaximallyFormal => "Very Formal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_holds_for_any_integer() {
        for value in [-1_000_000, -1, 0, 1, 50, 99, 100, 101, 250, i64::MAX, i64::MIN] {
            let level = HumorLevel::clamped(value);
            assert_eq!(level.value() as i64, value.clamp(0, 100), "value {}", value);
        }
    }

    #[test]
    fn test_try_new_rejects_out_of_range() {
        assert_eq!(HumorLevel::try_new(42).map(|l| l.value()), Some(42));
        assert!(HumorLevel::try_new(-1).is_none());
        assert!(HumorLevel::try_new(101).is_none());
    }

    #[test]
    fn test_band_edges() {
        assert_eq!(HumorLevel::clamped(100).band(), HumorBand::Casual);
        assert_eq!(HumorLevel::clamped(80).band(), HumorBand::Casual);
        assert_eq!(HumorLevel::clamped(79).band(), HumorBand::WarmProfessional);
        assert_eq!(HumorLevel::clamped(60).band(), HumorBand::WarmProfessional);
        assert_eq!(HumorLevel::clamped(59).band(), HumorBand::StandardProfessional);
        assert_eq!(HumorLevel::clamped(40).band(), HumorBand::StandardProfessional);
        assert_eq!(HumorLevel::clamped(39).band(), HumorBand::Formal);
        assert_eq!(HumorLevel::clamped(20).band(), HumorBand::Formal);
        assert_eq!(HumorLevel::clamped(19).band(), HumorBand::MaximallyFormal);
        assert_eq!(HumorLevel::clamped(0).band(), HumorBand::MaximallyFormal);
    }

    #[test]
    fn test_default_is_casual() {
        assert_eq!(HumorLevel::default().value(), 100);
        assert_eq!(serde_json::to_string(&HumorLevel::clamped(42)).unwrap(), "42");
    }
}
