//! Day-partitioned mood scheduling engine.
//!
//! A timeline of entries — each a time-of-day plus a weekday set bound to a
//! color and an optional ambient sound — is kept in an in-memory store, and
//! exactly one entry is "active" at any instant. The engine re-evaluates
//! itself at the exact next transition boundary and resynchronizes on
//! wake/visibility signals, so suspended or drifted timers never leave a
//! stale selection behind. Presentation, audio playback, and the editing
//! surface are external collaborators: they consume the reactive active
//! mood and drive the mutation API.

mod application;
mod domain;
mod infrastructure;

pub use application::bootstrap::{bootstrap_workspace, BootstrapResult};
pub use application::timeline::{
    ActiveMood, EffectiveMood, NowProvider, SchedulerState, TimelineEngine,
};
pub use domain::models::{
    sound_label, Color, DaySet, Entry, EntryDraft, EntryPatch, TimeOfDay, ALL_DAYS,
    BUILTIN_SOUNDS, COLOR_PALETTE, DAY_LABELS,
};
pub use domain::resolver::{
    resolve_active, resolve_next, ClockReading, NextTransition, MINUTES_PER_DAY,
};
pub use infrastructure::entry_repository::{
    EntryRepository, InMemoryEntryRepository, JsonFileEntryRepository,
};
pub use infrastructure::error::InfraError;
