use crate::domain::models::Entry;
use chrono::{DateTime, Datelike, Local, Timelike};

pub const MINUTES_PER_DAY: u16 = 1440;
const MS_PER_MINUTE: u64 = 60_000;

/// A wall-clock instant decomposed to what scheduling needs: the weekday
/// (0=Sun..6=Sat), the minute within the day, and how far into the current
/// minute the clock already is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockReading {
    pub weekday: u8,
    pub minute_of_day: u16,
    pub sub_minute_ms: u32,
}

impl ClockReading {
    pub fn from_datetime(now: &DateTime<Local>) -> Self {
        let sub_minute_ms = now.second() * 1_000 + now.timestamp_subsec_millis().min(999);
        Self {
            weekday: now.weekday().num_days_from_sunday() as u8,
            minute_of_day: (now.hour() * 60 + now.minute()) as u16,
            // leap seconds would otherwise push this past the minute
            sub_minute_ms: sub_minute_ms.min(59_999),
        }
    }
}

/// The upcoming transition: which entry fires next and in how many ms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NextTransition<'a> {
    pub entry: &'a Entry,
    pub delay_ms: u64,
}

/// The entry in effect at `now`: the latest of today's entries whose time
/// has been reached, otherwise the last entry of the nearest earlier day —
/// the most recent mood carries forward until something newer fires. An
/// entry whose time equals the current minute counts as already reached.
/// The backward walk wraps the full week, so an entry tagged only for
/// today at a later time still carries forward from last week's firing.
pub fn resolve_active<'a>(entries: &'a [Entry], now: &ClockReading) -> Option<&'a Entry> {
    let sorted = sorted_by_time(entries);

    for &entry in sorted.iter().rev() {
        if entry.days.contains(now.weekday) && entry.time.minute_of_day() <= now.minute_of_day {
            return Some(entry);
        }
    }

    for offset in 1..=7u8 {
        let day = (now.weekday + 7 - offset) % 7;
        if let Some(entry) = sorted
            .iter()
            .rev()
            .copied()
            .find(|entry| entry.days.contains(day))
        {
            return Some(entry);
        }
    }

    None
}

/// The soonest strictly-future transition within the coming week. Today's
/// remaining entries win over later days, and the first day that has any
/// entry supplies its earliest one — a later day is never consulted once a
/// nearer day matches. An entry scheduled for the current minute is already
/// active and never returned here.
pub fn resolve_next<'a>(entries: &'a [Entry], now: &ClockReading) -> Option<NextTransition<'a>> {
    let sorted = sorted_by_time(entries);

    for &entry in &sorted {
        if entry.days.contains(now.weekday) && entry.time.minute_of_day() > now.minute_of_day {
            let minutes_until = (entry.time.minute_of_day() - now.minute_of_day) as u64;
            return Some(NextTransition {
                entry,
                delay_ms: delay_from_minutes(minutes_until, now.sub_minute_ms),
            });
        }
    }

    for offset in 1..=6u8 {
        let day = (now.weekday + offset) % 7;
        if let Some(entry) = sorted.iter().copied().find(|entry| entry.days.contains(day)) {
            let minutes_until = (MINUTES_PER_DAY - now.minute_of_day) as u64
                + (offset as u64 - 1) * MINUTES_PER_DAY as u64
                + entry.time.minute_of_day() as u64;
            return Some(NextTransition {
                entry,
                delay_ms: delay_from_minutes(minutes_until, now.sub_minute_ms),
            });
        }
    }

    None
}

// Stable sort: entries sharing a time-of-day keep insertion order, which is
// what makes the reverse scan in resolve_active deterministic for ties.
fn sorted_by_time(entries: &[Entry]) -> Vec<&Entry> {
    let mut sorted: Vec<&Entry> = entries.iter().collect();
    sorted.sort_by_key(|entry| entry.time.minute_of_day());
    sorted
}

fn delay_from_minutes(minutes_until: u64, sub_minute_ms: u32) -> u64 {
    // minutes_until >= 1 and sub_minute_ms < 60_000, so this never hits zero
    (minutes_until * MS_PER_MINUTE).saturating_sub(sub_minute_ms as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Color, DaySet, TimeOfDay};
    use proptest::prelude::*;

    const SUNDAY: u8 = 0;
    const MONDAY: u8 = 1;
    const TUESDAY: u8 = 2;
    const WEDNESDAY: u8 = 3;
    const THURSDAY: u8 = 4;
    const ALL: [u8; 7] = [0, 1, 2, 3, 4, 5, 6];

    fn entry(id: &str, time: &str, days: impl IntoIterator<Item = u8>) -> Entry {
        Entry {
            id: id.to_string(),
            time: TimeOfDay::parse(time).expect("valid time"),
            color: Color::black(),
            sound: None,
            days: DaySet::new(days),
        }
    }

    fn reading(weekday: u8, time: &str, sub_minute_ms: u32) -> ClockReading {
        ClockReading {
            weekday,
            minute_of_day: TimeOfDay::parse(time).expect("valid time").minute_of_day(),
            sub_minute_ms,
        }
    }

    #[test]
    fn evening_entry_is_active_and_next_is_tomorrow_morning() {
        let entries = vec![
            entry("morning", "08:00", ALL),
            entry("evening", "22:00", ALL),
        ];
        let now = reading(TUESDAY, "23:00", 15_000);

        let active = resolve_active(&entries, &now).expect("an entry is active");
        assert_eq!(active.id, "evening");

        let next = resolve_next(&entries, &now).expect("a transition is pending");
        assert_eq!(next.entry.id, "morning");
        assert_eq!(next.delay_ms, 9 * 60 * 60 * 1_000 - 15_000);
    }

    #[test]
    fn single_day_entry_carries_forward_across_untagged_days() {
        let entries = vec![entry("monday-dawn", "07:00", [MONDAY])];
        let now = reading(THURSDAY, "10:00", 0);

        let active = resolve_active(&entries, &now).expect("carried forward");
        assert_eq!(active.id, "monday-dawn");

        let next = resolve_next(&entries, &now).expect("next monday pending");
        assert_eq!(next.entry.id, "monday-dawn");
        let minutes = (1440 - 600) + 3 * 1440 + 420;
        assert_eq!(next.delay_ms, minutes as u64 * 60_000);
    }

    #[test]
    fn same_time_entry_tagged_today_beats_carried_forward_one() {
        let today_first = vec![
            entry("tagged-today", "22:00", [TUESDAY]),
            entry("tagged-other", "22:00", [WEDNESDAY]),
        ];
        let today_last = vec![
            entry("tagged-other", "22:00", [WEDNESDAY]),
            entry("tagged-today", "22:00", [TUESDAY]),
        ];
        let now = reading(TUESDAY, "22:30", 0);

        for entries in [today_first, today_last] {
            let active = resolve_active(&entries, &now).expect("active entry");
            assert_eq!(active.id, "tagged-today");
        }
    }

    #[test]
    fn empty_entry_set_resolves_to_nothing() {
        let entries: Vec<Entry> = Vec::new();
        let now = reading(TUESDAY, "12:00", 0);
        assert!(resolve_active(&entries, &now).is_none());
        assert!(resolve_next(&entries, &now).is_none());
    }

    #[test]
    fn entries_with_empty_day_sets_are_invisible() {
        let entries = vec![entry("orphan", "08:00", [])];
        let now = reading(TUESDAY, "12:00", 0);
        assert!(resolve_active(&entries, &now).is_none());
        assert!(resolve_next(&entries, &now).is_none());
    }

    #[test]
    fn entry_at_current_minute_is_active_not_next() {
        let entries = vec![
            entry("morning", "08:00", ALL),
            entry("evening", "22:00", ALL),
        ];
        let now = reading(TUESDAY, "08:00", 0);

        let active = resolve_active(&entries, &now).expect("active entry");
        assert_eq!(active.id, "morning");

        let next = resolve_next(&entries, &now).expect("next transition");
        assert_eq!(next.entry.id, "evening");
    }

    #[test]
    fn carry_forward_picks_latest_entry_of_nearest_earlier_day() {
        let entries = vec![
            entry("mon-morning", "08:00", [MONDAY]),
            entry("mon-night", "22:00", [MONDAY]),
            entry("sun-noon", "12:00", [SUNDAY]),
        ];
        let now = reading(TUESDAY, "06:00", 0);

        let active = resolve_active(&entries, &now).expect("carried forward");
        assert_eq!(active.id, "mon-night");
    }

    #[test]
    fn before_first_entry_of_today_falls_back_to_yesterday() {
        let entries = vec![
            entry("daily-morning", "09:00", ALL),
            entry("daily-night", "23:00", ALL),
        ];
        let now = reading(WEDNESDAY, "02:00", 0);

        let active = resolve_active(&entries, &now).expect("yesterday's night entry");
        assert_eq!(active.id, "daily-night");

        let next = resolve_next(&entries, &now).expect("this morning pending");
        assert_eq!(next.entry.id, "daily-morning");
        assert_eq!(next.delay_ms, 7 * 60 * 60_000);
    }

    #[test]
    fn ties_on_the_same_day_favor_later_insertion() {
        let entries = vec![
            entry("first", "08:00", ALL),
            entry("second", "08:00", ALL),
        ];
        let now = reading(TUESDAY, "09:00", 0);

        let active = resolve_active(&entries, &now).expect("active entry");
        assert_eq!(active.id, "second");
    }

    #[test]
    fn nearest_future_day_wins_over_earlier_time_on_later_day() {
        // Wednesday's 23:30 fires before Thursday's 06:00; the day scan
        // must stop at the first day with any match.
        let entries = vec![
            entry("wed-late", "23:30", [WEDNESDAY]),
            entry("thu-early", "06:00", [THURSDAY]),
        ];
        let now = reading(TUESDAY, "12:00", 0);

        let next = resolve_next(&entries, &now).expect("next transition");
        assert_eq!(next.entry.id, "wed-late");
        let minutes = (1440 - 720) + TimeOfDay::parse("23:30").expect("valid").minute_of_day() as u64;
        assert_eq!(next.delay_ms, minutes * 60_000);
    }

    #[test]
    fn todays_later_entry_carries_forward_from_last_week() {
        let entries = vec![entry("tue-night", "23:00", [TUESDAY])];
        let now = reading(TUESDAY, "08:00", 0);

        let active = resolve_active(&entries, &now).expect("carried from last week");
        assert_eq!(active.id, "tue-night");

        let next = resolve_next(&entries, &now).expect("tonight pending");
        assert_eq!(next.entry.id, "tue-night");
        assert_eq!(next.delay_ms, 15 * 60 * 60_000);
    }

    #[test]
    fn last_entry_of_week_has_no_next_until_days_wrap() {
        // The scan covers the six following days only; a lone entry whose
        // day already passed today yields no pending transition (it is
        // already the carried-forward active entry, so nothing changes).
        let entries = vec![entry("mon-morning", "07:00", [MONDAY])];
        let now = reading(MONDAY, "10:00", 0);

        let active = resolve_active(&entries, &now).expect("active entry");
        assert_eq!(active.id, "mon-morning");
        assert!(resolve_next(&entries, &now).is_none());
    }

    fn arb_entry() -> impl Strategy<Value = Entry> {
        (
            "[a-z]{6}",
            0u8..24,
            0u8..60,
            proptest::collection::vec(0u8..7, 0..5),
        )
            .prop_map(|(id, hour, minute, days)| Entry {
                id,
                time: TimeOfDay::new(hour, minute).expect("valid time"),
                color: Color::black(),
                sound: None,
                days: DaySet::new(days),
            })
    }

    fn arb_reading() -> impl Strategy<Value = ClockReading> {
        (0u8..7, 0u16..1440, 0u32..60_000).prop_map(|(weekday, minute_of_day, sub_minute_ms)| {
            ClockReading {
                weekday,
                minute_of_day,
                sub_minute_ms,
            }
        })
    }

    proptest! {
        #[test]
        fn active_exists_whenever_any_entry_has_days(
            entries in proptest::collection::vec(arb_entry(), 0..12),
            now in arb_reading(),
        ) {
            let any_tagged = entries.iter().any(|entry| !entry.days.is_empty());
            let active = resolve_active(&entries, &now);
            prop_assert_eq!(active.is_some(), any_tagged);
            if let Some(active) = active {
                prop_assert!(!active.days.is_empty());
            }
        }

        #[test]
        fn next_delay_is_always_positive(
            entries in proptest::collection::vec(arb_entry(), 0..12),
            now in arb_reading(),
        ) {
            if let Some(next) = resolve_next(&entries, &now) {
                prop_assert!(next.delay_ms > 0);
                prop_assert!(!next.entry.days.is_empty());
            }
        }

        #[test]
        fn resolution_is_idempotent(
            entries in proptest::collection::vec(arb_entry(), 0..12),
            now in arb_reading(),
        ) {
            let first = resolve_active(&entries, &now).map(|entry| entry.id.clone());
            let second = resolve_active(&entries, &now).map(|entry| entry.id.clone());
            prop_assert_eq!(first, second);
        }
    }
}
