use serde::{Deserialize, Serialize};
use std::fmt;

/// Sunday-first weekday indices, matching the persisted wire format.
pub const ALL_DAYS: [u8; 7] = [0, 1, 2, 3, 4, 5, 6];

pub const DAY_LABELS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

const WEEKDAYS: [u8; 5] = [1, 2, 3, 4, 5];
const WEEKEND: [u8; 2] = [0, 6];

pub const COLOR_PALETTE: [&str; 16] = [
    "#FF0000", "#008000", "#00FFFF", "#FFFFFF", "#FFA500", "#008080", "#4B0082", "#808080",
    "#FFFF00", "#0000FF", "#EE82EE", "#A52A2A", "#00FF00", "#FF00FF", "#FFD700", "#000000",
];

pub const BUILTIN_SOUNDS: [&str; 5] = [
    "Heavy_Rain.m4a",
    "Ocean_Waves.m4a",
    "River.m4a",
    "Shower.m4a",
    "White_Noise.m4a",
];

/// Display name for a sound identifier ("Heavy_Rain.m4a" -> "Heavy Rain").
pub fn sound_label(identifier: &str) -> String {
    identifier.trim_end_matches(".m4a").replace('_', " ")
}

/// A time of day with minute precision, serialized as "HH:MM" (24h).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay {
    hour: u8,
    minute: u8,
}

impl TimeOfDay {
    pub fn new(hour: u8, minute: u8) -> Result<Self, String> {
        if hour > 23 || minute > 59 {
            return Err("time must be HH:MM".to_string());
        }
        Ok(Self { hour, minute })
    }

    pub fn parse(value: &str) -> Result<Self, String> {
        let mut split = value.trim().split(':');
        let Some(hour_str) = split.next() else {
            return Err("time must be HH:MM".to_string());
        };
        let Some(minute_str) = split.next() else {
            return Err("time must be HH:MM".to_string());
        };
        if split.next().is_some() {
            return Err("time must be HH:MM".to_string());
        }

        let hour = hour_str
            .parse::<u8>()
            .map_err(|_| "time must be HH:MM".to_string())?;
        let minute = minute_str
            .parse::<u8>()
            .map_err(|_| "time must be HH:MM".to_string())?;
        Self::new(hour, minute)
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }

    /// Minutes since midnight, 0..=1439.
    pub fn minute_of_day(&self) -> u16 {
        self.hour as u16 * 60 + self.minute as u16
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl std::str::FromStr for TimeOfDay {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TimeOfDay> for String {
    fn from(value: TimeOfDay) -> Self {
        value.to_string()
    }
}

/// An RGB color, serialized as "#rrggbb". Stored lowercased so equality
/// is independent of the case the editing surface produced.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color(String);

impl Color {
    pub fn parse(value: &str) -> Result<Self, String> {
        let value = value.trim();
        let Some(digits) = value.strip_prefix('#') else {
            return Err("color must be #rrggbb".to_string());
        };
        if digits.len() != 6 || !digits.chars().all(|ch| ch.is_ascii_hexdigit()) {
            return Err("color must be #rrggbb".to_string());
        }
        Ok(Self(value.to_ascii_lowercase()))
    }

    pub fn black() -> Self {
        Self("#000000".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn rgb(&self) -> (u8, u8, u8) {
        let channel =
            |range: std::ops::Range<usize>| u8::from_str_radix(&self.0[range], 16).unwrap_or(0);
        (channel(1..3), channel(3..5), channel(5..7))
    }

    /// YIQ brightness check, used by presentation layers to flip
    /// foreground contrast on pale backgrounds.
    pub fn is_light(&self) -> bool {
        let (red, green, blue) = self.rgb();
        let brightness = red as u32 * 299 + green as u32 * 587 + blue as u32 * 114;
        brightness >= 128_000
    }
}

impl fmt::Display for Color {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

impl std::str::FromStr for Color {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl TryFrom<String> for Color {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Color> for String {
    fn from(value: Color) -> Self {
        value.0
    }
}

/// The weekdays an entry applies to. Always held sorted and deduplicated;
/// out-of-range indices are discarded on construction rather than rejected.
/// Serialized as a plain number array (0=Sun..6=Sat).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<u8>", into = "Vec<u8>")]
pub struct DaySet(Vec<u8>);

impl DaySet {
    pub fn new(days: impl IntoIterator<Item = u8>) -> Self {
        let mut days: Vec<u8> = days.into_iter().filter(|day| *day < 7).collect();
        days.sort_unstable();
        days.dedup();
        Self(days)
    }

    /// Every weekday — the repair value for records missing `days`.
    pub fn all() -> Self {
        Self(ALL_DAYS.to_vec())
    }

    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn contains(&self, day: u8) -> bool {
        self.0.binary_search(&day).is_ok()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        self.0.iter().copied()
    }

    /// Human label: "Everyday", "Weekdays", "Weekends", "Never", or the
    /// short day names joined Sunday-first.
    pub fn label(&self) -> String {
        if self.0.len() == 7 {
            return "Everyday".to_string();
        }
        if self.0.is_empty() {
            return "Never".to_string();
        }
        if self.0.len() == 5 && WEEKDAYS.iter().all(|day| self.contains(*day)) {
            return "Weekdays".to_string();
        }
        if self.0.len() == 2 && WEEKEND.iter().all(|day| self.contains(*day)) {
            return "Weekends".to_string();
        }
        self.0
            .iter()
            .map(|day| DAY_LABELS[*day as usize])
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl From<Vec<u8>> for DaySet {
    fn from(days: Vec<u8>) -> Self {
        Self::new(days)
    }
}

impl From<DaySet> for Vec<u8> {
    fn from(days: DaySet) -> Self {
        days.0
    }
}

/// One scheduled mood: at `time` on each day in `days`, switch to `color`
/// and start looping `sound` (or silence). A record persisted without
/// `days` deserializes as applying every day.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Entry {
    pub id: String,
    pub time: TimeOfDay,
    pub color: Color,
    #[serde(default)]
    pub sound: Option<String>,
    #[serde(default = "DaySet::all")]
    pub days: DaySet,
}

impl Entry {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "entry.id")?;
        if let Some(sound) = &self.sound {
            validate_non_empty(sound, "entry.sound")?;
        }
        Ok(())
    }
}

/// A new entry as produced by an editing surface; the engine assigns the id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EntryDraft {
    pub time: TimeOfDay,
    pub color: Color,
    #[serde(default)]
    pub sound: Option<String>,
    #[serde(default = "DaySet::all")]
    pub days: DaySet,
}

/// Field-wise update of an existing entry. `sound` is doubly optional so a
/// patch can distinguish "leave the sound alone" from "clear it".
#[derive(Debug, Clone, Default)]
pub struct EntryPatch {
    pub time: Option<TimeOfDay>,
    pub color: Option<Color>,
    pub sound: Option<Option<String>>,
    pub days: Option<DaySet>,
}

fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}
