//! Live per-download progress.
//!
//! [`ProgressRegistry`] owns one [`ProgressEntry`] per download task and
//! mirrors each into an `indicatif` bar inside a shared `MultiProgress`.
//! Rendering runs on indicatif's own fixed refresh rate, independent of how
//! often tasks report bytes. Entry state lives behind a mutex so structural
//! changes (add, remove, mass cancellation) never interleave with an update.

mod style;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget};
use tracing::debug;

pub use style::ProgressLayout;

/// Redraws per second while rendering.
const REFRESH_HZ: u8 = 5;

/// Spinner tick while an entry is pulsing.
const PULSE_TICK: Duration = Duration::from_millis(100);

/// Suffix appended to entries stopped by cancellation.
pub const CANCELLED_SUFFIX: &str = " (cancelled)";

/// Identifier of one progress entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Snapshot of one task's progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEntry {
    pub id: TaskId,
    pub description: String,
    pub completed: u64,
    /// Zero while the total is unknown.
    pub total: u64,
    pub pulsing: bool,
    pub started: bool,
}

impl ProgressEntry {
    /// True once every expected byte has been counted.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.completed == self.total
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.description.ends_with(CANCELLED_SUFFIX)
    }
}

/// Partial update applied by [`ProgressRegistry::update`]; unset fields are
/// left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressUpdate {
    description: Option<String>,
    completed: Option<u64>,
    total: Option<u64>,
    pulsing: Option<bool>,
}

impl ProgressUpdate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn completed(mut self, completed: u64) -> Self {
        self.completed = Some(completed);
        self
    }

    #[must_use]
    pub fn total(mut self, total: u64) -> Self {
        self.total = Some(total);
        self
    }

    #[must_use]
    pub fn pulsing(mut self, pulsing: bool) -> Self {
        self.pulsing = Some(pulsing);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BarStyle {
    Waiting,
    Pulse,
    Known,
}

#[derive(Debug)]
struct Slot {
    entry: ProgressEntry,
    bar: ProgressBar,
    style: BarStyle,
    ticking: bool,
}

/// Thread-safe table of progress entries rendered as a live display.
#[derive(Debug)]
pub struct ProgressRegistry {
    multi: MultiProgress,
    layout: ProgressLayout,
    visible: bool,
    rendering: AtomicBool,
    /// Set once the display is handed back for good; rendering never resumes.
    finished: AtomicBool,
    next_id: AtomicU64,
    slots: Mutex<BTreeMap<TaskId, Slot>>,
}

impl ProgressRegistry {
    /// Registry drawing to stderr at a fixed refresh rate.
    #[must_use]
    pub fn stderr(layout: ProgressLayout) -> Self {
        let multi =
            MultiProgress::with_draw_target(ProgressDrawTarget::stderr_with_hz(REFRESH_HZ));
        Self::with_multi(multi, layout, true)
    }

    /// Registry that tracks state but never draws (tests, non-TTY output).
    #[must_use]
    pub fn hidden() -> Self {
        let multi = MultiProgress::with_draw_target(ProgressDrawTarget::hidden());
        Self::with_multi(multi, ProgressLayout::Wide, false)
    }

    fn with_multi(multi: MultiProgress, layout: ProgressLayout, visible: bool) -> Self {
        Self {
            multi,
            layout,
            visible,
            rendering: AtomicBool::new(visible),
            finished: AtomicBool::new(false),
            next_id: AtomicU64::new(0),
            slots: Mutex::new(BTreeMap::new()),
        }
    }

    /// The display the bars live in, for routing log output above it.
    #[must_use]
    pub fn multi(&self) -> &MultiProgress {
        &self.multi
    }

    fn slots(&self) -> MutexGuard<'_, BTreeMap<TaskId, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates an entry that has not started yet, total unknown.
    pub fn add(&self, description: impl Into<String>, pulsing: bool) -> TaskId {
        let id = TaskId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let entry = ProgressEntry {
            id,
            description: description.into(),
            completed: 0,
            total: 0,
            pulsing,
            started: false,
        };

        let bar = self.multi.add(ProgressBar::new(0));
        bar.set_style(self.layout.waiting_style());
        bar.set_message(entry.description.clone());
        let mut slot = Slot {
            entry,
            bar,
            style: BarStyle::Waiting,
            ticking: false,
        };
        sync_ticking(&mut slot);

        self.slots().insert(id, slot);
        debug!(task = %id, "progress entry added");
        id
    }

    /// Marks an entry as started; elapsed time and speed count from here.
    pub fn start(&self, id: TaskId) -> bool {
        let mut slots = self.slots();
        let Some(slot) = slots.get_mut(&id) else {
            return false;
        };
        if !slot.entry.started {
            slot.entry.started = true;
            slot.bar.reset_elapsed();
            slot.bar.reset_eta();
            self.sync_bar(slot);
        }
        true
    }

    /// Applies `update` to an entry. Returns false if the entry is gone.
    pub fn update(&self, id: TaskId, update: ProgressUpdate) -> bool {
        let mut slots = self.slots();
        let Some(slot) = slots.get_mut(&id) else {
            return false;
        };
        if let Some(description) = update.description {
            slot.entry.description = description;
        }
        if let Some(total) = update.total {
            slot.entry.total = total;
        }
        if let Some(completed) = update.completed {
            slot.entry.completed = completed;
        }
        if let Some(pulsing) = update.pulsing {
            slot.entry.pulsing = pulsing;
        }
        self.sync_bar(slot);
        true
    }

    /// Drops an entry and its bar.
    pub fn remove(&self, id: TaskId) -> bool {
        let Some(slot) = self.slots().remove(&id) else {
            return false;
        };
        slot.bar.finish_and_clear();
        self.multi.remove(&slot.bar);
        debug!(task = %id, "progress entry removed");
        true
    }

    #[must_use]
    pub fn entry(&self, id: TaskId) -> Option<ProgressEntry> {
        self.slots().get(&id).map(|slot| slot.entry.clone())
    }

    /// Snapshot of all live entries in creation order.
    #[must_use]
    pub fn entries(&self) -> Vec<ProgressEntry> {
        self.slots().values().map(|slot| slot.entry.clone()).collect()
    }

    /// Suffixes an entry with ` (cancelled)` and sets completed to total.
    ///
    /// Idempotent: an entry already marked is left unchanged.
    pub fn mark_cancelled(&self, id: TaskId) -> bool {
        let mut slots = self.slots();
        let Some(slot) = slots.get_mut(&id) else {
            return false;
        };
        self.cancel_slot(slot);
        true
    }

    /// Marks every entry whose completed count differs from its total as
    /// cancelled. Returns how many entries were marked.
    pub fn cancel_incomplete(&self) -> usize {
        let mut slots = self.slots();
        let mut marked = 0;
        for slot in slots.values_mut() {
            if !slot.entry.is_complete() && !slot.entry.is_cancelled() {
                self.cancel_slot(slot);
                marked += 1;
            }
        }
        marked
    }

    fn cancel_slot(&self, slot: &mut Slot) {
        if slot.entry.is_cancelled() {
            return;
        }
        slot.entry.description.push_str(CANCELLED_SUFFIX);
        let total = slot.entry.total.max(slot.entry.completed);
        slot.entry.total = total;
        slot.entry.completed = total;
        slot.entry.pulsing = false;
        self.sync_bar(slot);
    }

    /// Stops live drawing and clears the display, handing the terminal to
    /// something else (an interactive prompt).
    pub fn stop_rendering(&self) {
        if self.rendering.swap(false, Ordering::SeqCst) {
            // Ignored: nothing to clear on a terminal that is gone.
            let _ = self.multi.clear();
            self.multi.set_draw_target(ProgressDrawTarget::hidden());
            debug!("progress rendering stopped");
        }
    }

    /// Stops live drawing permanently; later
    /// [`start_rendering`](Self::start_rendering) calls are ignored.
    pub fn finish_rendering(&self) {
        self.finished.store(true, Ordering::SeqCst);
        self.stop_rendering();
    }

    /// Resumes live drawing after [`stop_rendering`](Self::stop_rendering).
    /// A hidden or finished registry stays hidden.
    pub fn start_rendering(&self) {
        if !self.visible || self.finished.load(Ordering::SeqCst) {
            return;
        }
        if !self.rendering.swap(true, Ordering::SeqCst) {
            self.multi
                .set_draw_target(ProgressDrawTarget::stderr_with_hz(REFRESH_HZ));
            debug!("progress rendering started");
            // finish_rendering may have run between the check and the swap.
            if self.finished.load(Ordering::SeqCst) {
                self.stop_rendering();
            }
        }
    }

    #[must_use]
    pub fn is_rendering(&self) -> bool {
        self.rendering.load(Ordering::SeqCst)
    }

    fn sync_bar(&self, slot: &mut Slot) {
        let wanted = if !slot.entry.started {
            BarStyle::Waiting
        } else if slot.entry.total == 0 || slot.entry.pulsing {
            BarStyle::Pulse
        } else {
            BarStyle::Known
        };
        if wanted != slot.style {
            let style = match wanted {
                BarStyle::Waiting => self.layout.waiting_style(),
                BarStyle::Pulse => self.layout.pulse_style(),
                BarStyle::Known => self.layout.known_style(),
            };
            slot.bar.set_style(style);
            slot.style = wanted;
        }

        slot.bar.set_length(slot.entry.total);
        slot.bar.set_position(slot.entry.completed);
        if slot.bar.message() != slot.entry.description {
            slot.bar.set_message(slot.entry.description.clone());
        }
        sync_ticking(slot);
    }
}

fn sync_ticking(slot: &mut Slot) {
    let wanted = slot.entry.pulsing && !slot.entry.is_cancelled();
    if wanted != slot.ticking {
        if wanted {
            slot.bar.enable_steady_tick(PULSE_TICK);
        } else {
            slot.bar.disable_steady_tick();
        }
        slot.ticking = wanted;
    }
}
