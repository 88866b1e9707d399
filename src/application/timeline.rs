use crate::application::bootstrap::bootstrap_workspace;
use crate::domain::models::{Color, Entry, EntryDraft, EntryPatch};
use crate::domain::resolver::{resolve_active, resolve_next, ClockReading};
use crate::infrastructure::entry_repository::{EntryRepository, JsonFileEntryRepository};
use crate::infrastructure::error::InfraError;
use chrono::{DateTime, Local, Utc};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

pub type NowProvider = Arc<dyn Fn() -> DateTime<Local> + Send + Sync>;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_id(prefix: &str) -> String {
    let sequence = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{}-{sequence}", Utc::now().timestamp_micros())
}

/// The mood currently in effect, rederived from the live store on every
/// resync — never a cached snapshot of entry fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveMood {
    pub entry_id: String,
    pub color: Color,
    pub sound: Option<String>,
}

impl ActiveMood {
    fn from_entry(entry: &Entry) -> Self {
        Self {
            entry_id: entry.id.clone(),
            color: entry.color.clone(),
            sound: entry.sound.clone(),
        }
    }
}

/// What a presentation layer should show right now: manual overrides where
/// present, the active entry's fields otherwise, black silence as the floor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveMood {
    pub color: Color,
    pub sound: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Armed { target_id: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Overrides {
    color: Option<Color>,
    // the outer Option is "an override exists"; the inner one may force silence
    sound: Option<Option<String>>,
}

#[derive(Debug)]
struct PendingTimer {
    target_id: String,
    epoch: u64,
    handle: JoinHandle<()>,
}

#[derive(Debug, Default)]
struct RuntimeState {
    entries: Vec<Entry>,
    overrides: Overrides,
    pending: Option<PendingTimer>,
    epoch: u64,
}

struct EngineInner<R> {
    repository: Arc<R>,
    now_provider: NowProvider,
    runtime: Mutex<RuntimeState>,
    active_tx: watch::Sender<Option<ActiveMood>>,
}

impl<R> Drop for EngineInner<R> {
    fn drop(&mut self) {
        if let Ok(mut runtime) = self.runtime.lock() {
            if let Some(pending) = runtime.pending.take() {
                pending.handle.abort();
            }
        }
    }
}

/// Owns the entry store and a single pending transition timer. Every state
/// change — construction, mutation, timer fire, wake signal — funnels
/// through the same resync path: recompute the active entry from the live
/// store, cancel the pending timer, arm for the next transition.
///
/// Must live on a tokio runtime; the timer chain is a spawned task that is
/// superseded (aborted plus an epoch check) on every rearm, so at most one
/// fire chain exists at any instant.
pub struct TimelineEngine<R> {
    inner: Arc<EngineInner<R>>,
}

impl<R> Clone for TimelineEngine<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: EntryRepository + 'static> TimelineEngine<R> {
    pub async fn new(repository: Arc<R>) -> Self {
        Self::with_now_provider(repository, Arc::new(Local::now)).await
    }

    pub async fn with_now_provider(repository: Arc<R>, now_provider: NowProvider) -> Self {
        let mut entries = match repository.load().await {
            Ok(entries) => entries,
            Err(error) => {
                // fail open: an unreadable store starts empty instead of failing startup
                warn!(%error, "failed to load persisted timeline; starting empty");
                Vec::new()
            }
        };
        entries.retain(|entry| match entry.validate() {
            Ok(()) => true,
            Err(reason) => {
                warn!(entry_id = %entry.id, %reason, "dropped invalid persisted entry");
                false
            }
        });

        let (active_tx, _) = watch::channel(None);
        let engine = Self {
            inner: Arc::new(EngineInner {
                repository,
                now_provider,
                runtime: Mutex::new(RuntimeState {
                    entries,
                    ..RuntimeState::default()
                }),
                active_tx,
            }),
        };
        if let Ok(mut runtime) = engine.inner.runtime.lock() {
            engine.resync_locked(&mut runtime);
        }
        engine
    }

    /// Recompute the active selection and rearm the timer against the
    /// current wall clock. Collaborators call this on wake/visibility
    /// edges, where a pending timer may have drifted or been suspended.
    pub fn resync(&self) -> Result<(), InfraError> {
        let mut runtime = self.lock_runtime()?;
        self.resync_locked(&mut runtime);
        Ok(())
    }

    pub fn list_entries(&self) -> Result<Vec<Entry>, InfraError> {
        let runtime = self.lock_runtime()?;
        let mut entries = runtime.entries.clone();
        entries.sort_by_key(|entry| entry.time.minute_of_day());
        Ok(entries)
    }

    pub async fn add_entry(&self, draft: EntryDraft) -> Result<Entry, InfraError> {
        let entry = Entry {
            id: next_id("ent"),
            time: draft.time,
            color: draft.color,
            sound: normalize_sound(draft.sound),
            days: draft.days,
        };
        entry.validate().map_err(InfraError::InvalidEntry)?;

        let snapshot = {
            let mut runtime = self.lock_runtime()?;
            runtime.entries.push(entry.clone());
            self.resync_locked(&mut runtime);
            runtime.entries.clone()
        };
        self.persist(&snapshot).await;
        info!(entry_id = %entry.id, "added timeline entry");
        Ok(entry)
    }

    pub async fn update_entry(&self, entry_id: &str, patch: EntryPatch) -> Result<Entry, InfraError> {
        let entry_id = entry_id.trim();
        if entry_id.is_empty() {
            return Err(InfraError::InvalidEntry(
                "entry id must not be empty".to_string(),
            ));
        }

        let (updated, snapshot) = {
            let mut runtime = self.lock_runtime()?;
            let Some(entry) = runtime
                .entries
                .iter_mut()
                .find(|entry| entry.id == entry_id)
            else {
                return Err(InfraError::EntryNotFound(entry_id.to_string()));
            };

            if let Some(time) = patch.time {
                entry.time = time;
            }
            if let Some(color) = patch.color {
                entry.color = color;
            }
            if let Some(sound) = patch.sound {
                entry.sound = normalize_sound(sound);
            }
            if let Some(days) = patch.days {
                entry.days = days;
            }
            let updated = entry.clone();

            self.resync_locked(&mut runtime);
            (updated, runtime.entries.clone())
        };
        self.persist(&snapshot).await;
        info!(entry_id = %updated.id, "updated timeline entry");
        Ok(updated)
    }

    pub async fn remove_entry(&self, entry_id: &str) -> Result<bool, InfraError> {
        let entry_id = entry_id.trim();
        if entry_id.is_empty() {
            return Err(InfraError::InvalidEntry(
                "entry id must not be empty".to_string(),
            ));
        }

        let snapshot = {
            let mut runtime = self.lock_runtime()?;
            let before = runtime.entries.len();
            runtime.entries.retain(|entry| entry.id != entry_id);
            if runtime.entries.len() == before {
                return Ok(false);
            }
            self.resync_locked(&mut runtime);
            runtime.entries.clone()
        };
        self.persist(&snapshot).await;
        info!(entry_id, "removed timeline entry");
        Ok(true)
    }

    pub fn active(&self) -> Option<ActiveMood> {
        self.inner.active_tx.borrow().clone()
    }

    /// Reactive view of the active selection; receivers see every change,
    /// including field edits to the entry that stays active.
    pub fn subscribe(&self) -> watch::Receiver<Option<ActiveMood>> {
        self.inner.active_tx.subscribe()
    }

    pub fn scheduler_state(&self) -> Result<SchedulerState, InfraError> {
        let runtime = self.lock_runtime()?;
        Ok(match &runtime.pending {
            Some(pending) => SchedulerState::Armed {
                target_id: pending.target_id.clone(),
            },
            None => SchedulerState::Idle,
        })
    }

    pub fn set_color_override(&self, color: Color) -> Result<(), InfraError> {
        let mut runtime = self.lock_runtime()?;
        runtime.overrides.color = Some(color);
        Ok(())
    }

    /// Override the ambient sound; `None` forces silence until the next
    /// transition or an explicit clear.
    pub fn set_sound_override(&self, sound: Option<String>) -> Result<(), InfraError> {
        let mut runtime = self.lock_runtime()?;
        runtime.overrides.sound = Some(normalize_sound(sound));
        Ok(())
    }

    pub fn clear_overrides(&self) -> Result<(), InfraError> {
        let mut runtime = self.lock_runtime()?;
        runtime.overrides = Overrides::default();
        Ok(())
    }

    pub fn effective_mood(&self) -> Result<EffectiveMood, InfraError> {
        let runtime = self.lock_runtime()?;
        let active = self.inner.active_tx.borrow().clone();
        let color = runtime
            .overrides
            .color
            .clone()
            .or_else(|| active.as_ref().map(|mood| mood.color.clone()))
            .unwrap_or_else(Color::black);
        let sound = match runtime.overrides.sound.clone() {
            Some(overridden) => overridden,
            None => active.and_then(|mood| mood.sound),
        };
        Ok(EffectiveMood { color, sound })
    }

    /// Cancel any pending transition timer and go idle. The engine can be
    /// revived with `resync`.
    pub fn shutdown(&self) -> Result<(), InfraError> {
        let mut runtime = self.lock_runtime()?;
        self.cancel_pending(&mut runtime);
        Ok(())
    }

    fn lock_runtime(&self) -> Result<MutexGuard<'_, RuntimeState>, InfraError> {
        self.inner
            .runtime
            .lock()
            .map_err(|error| InfraError::State(format!("runtime lock poisoned: {error}")))
    }

    fn resync_locked(&self, runtime: &mut RuntimeState) {
        let now = ClockReading::from_datetime(&(self.inner.now_provider)());
        let active = resolve_active(&runtime.entries, &now).map(ActiveMood::from_entry);
        self.publish_active(runtime, active);
        self.rearm_locked(runtime, &now);
    }

    fn rearm_locked(&self, runtime: &mut RuntimeState, now: &ClockReading) {
        self.cancel_pending(runtime);
        match resolve_next(&runtime.entries, now) {
            Some(next) => {
                let target_id = next.entry.id.clone();
                self.arm(runtime, target_id, next.delay_ms);
            }
            None => debug!("no upcoming entry; scheduler idle"),
        }
    }

    fn cancel_pending(&self, runtime: &mut RuntimeState) {
        if let Some(pending) = runtime.pending.take() {
            pending.handle.abort();
        }
    }

    fn arm(&self, runtime: &mut RuntimeState, target_id: String, delay_ms: u64) {
        runtime.epoch += 1;
        let epoch = runtime.epoch;
        // the task holds a weak handle so an abandoned engine can drop and
        // cancel its own chain
        let weak = Arc::downgrade(&self.inner);
        let task_target = target_id.clone();
        let handle = tokio::spawn(async move {
            sleep(Duration::from_millis(delay_ms)).await;
            if let Some(inner) = weak.upgrade() {
                Self::handle_fire(inner, task_target, epoch);
            }
        });
        debug!(target_id = %target_id, delay_ms, "armed transition timer");
        runtime.pending = Some(PendingTimer {
            target_id,
            epoch,
            handle,
        });
    }

    // A fired timer trusts nothing it captured except the target id: the
    // entry's fields are re-read from the live store, and a vanished id
    // degrades to a full resync.
    fn handle_fire(inner: Arc<EngineInner<R>>, target_id: String, epoch: u64) {
        let engine = TimelineEngine { inner };
        let Ok(mut runtime) = engine.inner.runtime.lock() else {
            return;
        };
        if runtime.pending.as_ref().map(|pending| pending.epoch) != Some(epoch) {
            // superseded by a newer arm after this task was already running
            return;
        }
        runtime.pending = None;

        let target = runtime
            .entries
            .iter()
            .find(|entry| entry.id == target_id)
            .cloned();
        match target {
            Some(entry) => {
                info!(entry_id = %entry.id, "mood transition fired");
                engine.publish_active(&mut runtime, Some(ActiveMood::from_entry(&entry)));
                let now = ClockReading::from_datetime(&(engine.inner.now_provider)());
                engine.rearm_locked(&mut runtime, &now);
            }
            None => engine.resync_locked(&mut runtime),
        }
    }

    fn publish_active(&self, runtime: &mut RuntimeState, next: Option<ActiveMood>) {
        let previous_id = self
            .inner
            .active_tx
            .borrow()
            .as_ref()
            .map(|mood| mood.entry_id.clone());
        let next_entry_id = next.as_ref().map(|mood| mood.entry_id.clone());
        if previous_id != next_entry_id {
            // manual overrides ride on one active selection only
            runtime.overrides = Overrides::default();
            info!(
                active = next_entry_id.as_deref().unwrap_or("none"),
                "active mood changed"
            );
        }
        self.inner.active_tx.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    // Best-effort caching: a failed save is logged and otherwise ignored.
    async fn persist(&self, entries: &[Entry]) {
        if let Err(error) = self.inner.repository.save(entries).await {
            warn!(%error, "failed to persist timeline entries");
        }
    }
}

impl TimelineEngine<JsonFileEntryRepository> {
    /// Prepare `workspace_root` and open the engine on its timeline file.
    pub async fn open_workspace(workspace_root: &Path) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(workspace_root)?;
        let repository = Arc::new(JsonFileEntryRepository::new(bootstrap.entries_path));
        Ok(Self::new(repository).await)
    }
}

fn normalize_sound(sound: Option<String>) -> Option<String> {
    sound
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
}
