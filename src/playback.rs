//! Playback state machine.
//!
//! Owned exclusively by the viewer's control thread; every mutation happens
//! on a loop tick or a key-press handler. Timing policy (how long an item
//! stays up) lives with the caller so the machine stays clock-agnostic and
//! testable.

use std::time::{Duration, Instant};

use crate::catalog::MediaItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Empty catalog; re-checked each tick.
    Idle,
    /// The current item is being rendered or its delegate launched.
    Displaying,
    /// The current item is on screen, waiting out its display duration.
    Waiting { since: Instant },
    /// Terminal; reached only by the quit command.
    Stopped,
}

#[derive(Debug)]
pub struct PlaybackState {
    items: Vec<MediaItem>,
    index: usize,
    phase: Phase,
}

impl PlaybackState {
    pub fn new(items: Vec<MediaItem>) -> Self {
        let phase = if items.is_empty() {
            Phase::Idle
        } else {
            Phase::Displaying
        };
        Self {
            items,
            index: 0,
            phase,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_stopped(&self) -> bool {
        self.phase == Phase::Stopped
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// The item currently selected, if any. An empty catalog never indexes.
    pub fn current(&self) -> Option<&MediaItem> {
        if self.phase == Phase::Stopped {
            return None;
        }
        self.items.get(self.index)
    }

    /// Transition `Displaying -> Waiting` once the item is on screen or its
    /// delegate has been launched.
    pub fn mark_displayed(&mut self, now: Instant) {
        if self.phase == Phase::Displaying {
            self.phase = Phase::Waiting { since: now };
        }
    }

    /// True once the configured display duration has elapsed in `Waiting`.
    pub fn due(&self, now: Instant, duration: Duration) -> bool {
        match self.phase {
            Phase::Waiting { since } => now.duration_since(since) >= duration,
            _ => false,
        }
    }

    /// Advance to the next item with wraparound. On an empty catalog this is
    /// a no-op and the machine stays idle.
    pub fn advance(&mut self) {
        if self.phase == Phase::Stopped {
            return;
        }
        if self.items.is_empty() {
            self.phase = Phase::Idle;
            return;
        }
        self.index = (self.index + 1) % self.items.len();
        self.phase = Phase::Displaying;
    }

    /// The skip command: advance immediately, without waiting for expiry.
    pub fn skip(&mut self) {
        self.advance();
    }

    /// Replace the catalog after a rescan; playback position resets to 0.
    pub fn reload(&mut self, items: Vec<MediaItem>) {
        if self.phase == Phase::Stopped {
            return;
        }
        self.items = items;
        self.index = 0;
        self.phase = if self.items.is_empty() {
            Phase::Idle
        } else {
            Phase::Displaying
        };
    }

    /// Randomly permute the remaining order in place. The item currently on
    /// screen keeps showing and keeps its elapsed wait time.
    pub fn shuffle<R: rand::Rng + ?Sized>(&mut self, rng: &mut R) {
        if self.phase == Phase::Stopped || self.items.is_empty() {
            return;
        }
        let current = self.items[self.index].clone();
        crate::catalog::shuffle_items(&mut self.items, rng);
        if let Some(pos) = self.items.iter().position(|item| *item == current) {
            self.items.swap(0, pos);
        }
        self.index = 0;
    }

    /// The quit command; terminal.
    pub fn stop(&mut self) {
        self.phase = Phase::Stopped;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{MediaItem, MediaKind};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn catalog(names: &[&str]) -> Vec<MediaItem> {
        names
            .iter()
            .map(|n| MediaItem::new(format!("/ads/{n}"), MediaKind::Image))
            .collect()
    }

    #[test]
    fn n_skips_wrap_back_to_start() {
        let mut state = PlaybackState::new(catalog(&["a.jpg", "b.mp4", "c.png"]));
        assert_eq!(state.index(), 0);
        for _ in 0..3 {
            state.skip();
        }
        assert_eq!(state.index(), 0);
    }

    #[test]
    fn duration_expiries_wrap_like_skips() {
        let mut state = PlaybackState::new(catalog(&["a.jpg", "b.mp4", "c.png"]));
        let duration = Duration::from_secs(10);
        let mut now = Instant::now();
        for _ in 0..3 {
            state.mark_displayed(now);
            now += duration;
            assert!(state.due(now, duration));
            state.advance();
        }
        assert_eq!(state.index(), 0);
    }

    #[test]
    fn skip_advances_without_waiting_for_expiry() {
        let mut state = PlaybackState::new(catalog(&["a.jpg", "b.jpg", "c.jpg"]));
        let now = Instant::now();
        state.mark_displayed(now);
        assert!(!state.due(now, Duration::from_secs(10)));
        state.skip();
        assert_eq!(state.index(), 1);
        assert_eq!(state.phase(), Phase::Displaying);
    }

    #[test]
    fn empty_catalog_idles_and_never_indexes() {
        let mut state = PlaybackState::new(Vec::new());
        assert_eq!(state.phase(), Phase::Idle);
        assert!(state.current().is_none());
        state.advance();
        state.skip();
        assert_eq!(state.phase(), Phase::Idle);
        assert!(state.current().is_none());
    }

    #[test]
    fn idle_state_accepts_reload() {
        let mut state = PlaybackState::new(Vec::new());
        state.reload(catalog(&["a.jpg"]));
        assert_eq!(state.phase(), Phase::Displaying);
        assert_eq!(state.current().unwrap().path.file_name().unwrap(), "a.jpg");
    }

    #[test]
    fn reload_resets_position() {
        let mut state = PlaybackState::new(catalog(&["a.jpg", "b.jpg", "c.jpg"]));
        state.skip();
        state.skip();
        assert_eq!(state.index(), 2);
        state.reload(catalog(&["x.jpg", "y.jpg"]));
        assert_eq!(state.index(), 0);
        assert_eq!(state.len(), 2);
    }

    #[test]
    fn reload_with_empty_catalog_returns_to_idle() {
        let mut state = PlaybackState::new(catalog(&["a.jpg"]));
        state.reload(Vec::new());
        assert_eq!(state.phase(), Phase::Idle);
        assert!(state.current().is_none());
    }

    #[test]
    fn shuffle_keeps_current_item_showing() {
        let mut state = PlaybackState::new(catalog(&["a.jpg", "b.jpg", "c.jpg", "d.jpg"]));
        state.skip();
        let before = state.current().unwrap().clone();
        let since = Instant::now();
        state.mark_displayed(since);
        let mut rng = StdRng::seed_from_u64(7);
        state.shuffle(&mut rng);
        assert_eq!(state.current().unwrap(), &before);
        assert_eq!(state.phase(), Phase::Waiting { since });
    }

    #[test]
    fn stop_is_terminal() {
        let mut state = PlaybackState::new(catalog(&["a.jpg"]));
        state.stop();
        assert!(state.is_stopped());
        assert!(state.current().is_none());
        state.advance();
        state.reload(catalog(&["b.jpg"]));
        assert!(state.is_stopped());
    }

    #[test]
    fn due_only_applies_while_waiting() {
        let mut state = PlaybackState::new(catalog(&["a.jpg"]));
        let now = Instant::now();
        assert!(!state.due(now, Duration::ZERO));
        state.mark_displayed(now);
        assert!(state.due(now + Duration::from_secs(1), Duration::from_secs(1)));
    }
}
