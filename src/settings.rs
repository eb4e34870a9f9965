//! Process-wide settings: cancel threshold and the staff console secret
use crate::order::TimeStamp;
use chrono::Utc;
use std::fmt;

/// Password the settings document starts with on a fresh store. Staff are
/// expected to change it from the console.
const DEFAULT_STAFF_PASSWORD: &str = "admin123";

/// The auto-block tunable: how many cancellations inside the rolling window
/// trip a block. Always in [1, 10]; out-of-range input clamps and
/// unparseable input coerces to the default instead of erroring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CancelThreshold(u8);

impl CancelThreshold {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 10;
    pub const DEFAULT: u8 = 3;

    pub fn new(n: i64) -> Self {
        Self(n.clamp(Self::MIN as i64, Self::MAX as i64) as u8)
    }

    /// Coerce free-form input the way the settings form does: missing or
    /// non-numeric values fall back to the default, numeric values clamp.
    pub fn coerce(raw: Option<&str>) -> Self {
        raw.and_then(|s| s.trim().parse::<i64>().ok())
            .map(Self::new)
            .unwrap_or_default()
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl Default for CancelThreshold {
    fn default() -> Self {
        Self(Self::DEFAULT)
    }
}

impl fmt::Display for CancelThreshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<C> minicbor::Encode<C> for CancelThreshold {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> std::result::Result<(), minicbor::encode::Error<W::Error>> {
        e.u8(self.0)?.ok()
    }
}

impl<'b, C> minicbor::Decode<'b, C> for CancelThreshold {
    fn decode(
        d: &mut minicbor::Decoder<'b>,
        _: &mut C,
    ) -> std::result::Result<Self, minicbor::decode::Error> {
        // clamp on the way in so a reader always sees an in-range value,
        // whatever a backend or import wrote
        Ok(Self::new(d.u8()? as i64))
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    #[n(0)]
    pub admin_password_hash: String,
    #[n(1)]
    pub cancel_threshold: CancelThreshold,
    #[n(2)]
    pub created_at: TimeStamp<Utc>,
    #[n(3)]
    pub updated_at: TimeStamp<Utc>,
}

impl Settings {
    pub fn new() -> Self {
        let now = TimeStamp::new();
        Self {
            admin_password_hash: hash_password(DEFAULT_STAFF_PASSWORD),
            cancel_threshold: CancelThreshold::default(),
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::new()
    }
}

/// Merge-style partial update for the settings document.
#[derive(Debug, Clone, Default)]
pub struct SettingsPatch {
    pub admin_password_hash: Option<String>,
    pub cancel_threshold: Option<CancelThreshold>,
}

impl SettingsPatch {
    pub fn apply(self, settings: &mut Settings) {
        if let Some(hash) = self.admin_password_hash {
            settings.admin_password_hash = hash;
        }
        if let Some(threshold) = self.cancel_threshold {
            settings.cancel_threshold = threshold;
        }
    }
}

pub fn hash_password(pass: &str) -> String {
    sha256::digest(pass)
}
