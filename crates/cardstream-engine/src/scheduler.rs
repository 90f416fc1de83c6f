//! Per-channel update scheduling
//!
//! Decides, for each new channel value, whether to rebuild the card, patch
//! one element now, or hold the value until the channel's debounce deadline.
//! Held values are last-write-wins; the orchestrator flushes them when their
//! deadline passes ([`UpdateScheduler::due`]) and hands the rest to the
//! terminal rebuild ([`UpdateScheduler::drain`]).

use cardstream_core::Channel;
use std::time::Duration;
use tokio::time::Instant;

/// What to do with a new channel value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// First content of the channel: rebuild the whole card
    Rebuild,
    /// Patch the channel's element with this content now
    Patch(String),
    /// Held until the debounce deadline
    Deferred,
}

#[derive(Debug, Clone, Default)]
struct Slot {
    last_sent_at: Option<Instant>,
    pending: Option<String>,
    structural_done: bool,
}

/// Debounce and structural-transition bookkeeping for one session
#[derive(Debug, Clone)]
pub struct UpdateScheduler {
    interval: Duration,
    slots: [Slot; 4],
}

impl UpdateScheduler {
    /// Create scheduler with a debounce interval
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            slots: Default::default(),
        }
    }

    /// Debounce interval
    #[inline]
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Record that `channel` is already part of the rendered card
    pub fn mark_structural(&mut self, channel: Channel, now: Instant) {
        let slot = &mut self.slots[channel.index()];
        slot.structural_done = true;
        slot.last_sent_at = Some(now);
    }

    /// Whether `channel` has had its structural rebuild
    #[inline]
    #[must_use]
    pub fn is_structural(&self, channel: Channel) -> bool {
        self.slots[channel.index()].structural_done
    }

    /// Decide what to do with a new non-empty value for `channel`
    ///
    /// A [`Decision::Rebuild`] renders every channel's current content, so
    /// all held values are cleared with it.
    pub fn offer(&mut self, channel: Channel, content: String, now: Instant) -> Decision {
        if !self.slots[channel.index()].structural_done {
            self.mark_structural(channel, now);
            self.rebuilt(now);
            return Decision::Rebuild;
        }

        let interval = self.interval;
        let slot = &mut self.slots[channel.index()];
        let ready = slot
            .last_sent_at
            .map_or(true, |sent| now.duration_since(sent) >= interval);
        if ready {
            slot.last_sent_at = Some(now);
            slot.pending = None;
            Decision::Patch(content)
        } else {
            slot.pending = Some(content);
            Decision::Deferred
        }
    }

    /// Record a full rebuild that rendered every channel's current content
    pub fn rebuilt(&mut self, now: Instant) {
        for slot in &mut self.slots {
            if slot.pending.take().is_some() || slot.structural_done {
                slot.last_sent_at = Some(now);
            }
        }
    }

    /// Take held values whose deadline has passed
    pub fn due(&mut self, now: Instant) -> Vec<(Channel, String)> {
        let interval = self.interval;
        let mut out = Vec::new();
        for channel in Channel::ALL {
            let slot = &mut self.slots[channel.index()];
            let is_due = slot
                .last_sent_at
                .map_or(true, |sent| now.duration_since(sent) >= interval);
            if is_due {
                if let Some(content) = slot.pending.take() {
                    slot.last_sent_at = Some(now);
                    out.push((channel, content));
                }
            }
        }
        out
    }

    /// Earliest deadline among held values
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.slots
            .iter()
            .filter(|slot| slot.pending.is_some())
            .map(|slot| {
                slot.last_sent_at
                    .map_or_else(Instant::now, |sent| sent + self.interval)
            })
            .min()
    }

    /// Whether any value is held
    #[inline]
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.slots.iter().any(|slot| slot.pending.is_some())
    }

    /// Take every held value regardless of deadline
    pub fn drain(&mut self) -> Vec<(Channel, String)> {
        Channel::ALL
            .into_iter()
            .filter_map(|channel| {
                self.slots[channel.index()]
                    .pending
                    .take()
                    .map(|content| (channel, content))
            })
            .collect()
    }
}
