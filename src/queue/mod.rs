use crate::models::TrackRef;
use rand::Rng;
use std::collections::VecDeque;

/// Maximum number of tracks remembered for "previous" navigation.
pub const HISTORY_LIMIT: usize = 100;

/// The list currently available for navigation, plus the playing position in it.
#[derive(Debug, Clone, Default)]
pub struct Queue {
    tracks: Vec<TrackRef>,
    current_index: Option<usize>,
}

impl Queue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the entire queue. Out-of-range start positions clamp to 0.
    pub fn replace(&mut self, tracks: Vec<TrackRef>, start: usize) {
        self.current_index = match tracks.len() {
            0 => None,
            len if start < len => Some(start),
            _ => Some(0),
        };
        self.tracks = tracks;
    }

    /// Insert right after the current track, so it plays next in list order.
    pub fn insert_next(&mut self, track: TrackRef) {
        match self.current_index {
            Some(i) => self.tracks.insert(i + 1, track),
            None => self.tracks.push(track),
        }
    }

    /// Set the current playing index; out of range is refused.
    pub fn set_current(&mut self, index: usize) -> bool {
        if index < self.tracks.len() {
            self.current_index = Some(index);
            true
        } else {
            false
        }
    }

    /// Follow a track that started playing from elsewhere (e.g. history) if the queue holds it.
    pub fn sync_to(&mut self, track: &TrackRef) {
        if let Some(i) = self.tracks.iter().position(|t| t.same_track(track)) {
            self.current_index = Some(i);
        }
    }

    pub fn get(&self, index: usize) -> Option<&TrackRef> {
        self.tracks.get(index)
    }

    pub fn current_track(&self) -> Option<&TrackRef> {
        self.current_index.and_then(|i| self.tracks.get(i))
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current_index
    }

    /// List order, wrapping to 0 past the end.
    pub fn following_index(&self) -> Option<usize> {
        if self.tracks.is_empty() {
            return None;
        }
        Some(self.current_index.map_or(0, |i| (i + 1) % self.tracks.len()))
    }

    /// List order backwards, wrapping to the last index.
    pub fn preceding_index(&self) -> Option<usize> {
        let len = self.tracks.len();
        match self.current_index {
            _ if len == 0 => None,
            Some(0) | None => Some(len - 1),
            Some(i) => Some(i - 1),
        }
    }

    /// Uniform pick over the whole queue; the current index may come up again.
    pub fn random_index<G: Rng>(&self, rng: &mut G) -> Option<usize> {
        if self.tracks.is_empty() {
            None
        } else {
            Some(rng.random_range(0..self.tracks.len()))
        }
    }

    pub fn all_unplayable(&self) -> bool {
        self.tracks.iter().all(|t| t.read().unplayable)
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

/// Bounded stack of tracks left behind by forward navigation. Oldest entries fall off first.
#[derive(Debug, Clone)]
pub struct History {
    stack: VecDeque<TrackRef>,
    limit: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::with_limit(HISTORY_LIMIT)
    }
}

impl History {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            stack: VecDeque::new(),
            limit: limit.max(1),
        }
    }

    pub fn push(&mut self, track: TrackRef) {
        if self.stack.len() == self.limit {
            self.stack.pop_front();
        }
        self.stack.push_back(track);
    }

    pub fn pop(&mut self) -> Option<TrackRef> {
        self.stack.pop_back()
    }

    /// Load persisted history given most-recent-first, keeping the newest `limit` entries.
    pub fn seed(&mut self, most_recent_first: Vec<TrackRef>) {
        self.stack = most_recent_first
            .into_iter()
            .take(self.limit)
            .rev()
            .collect();
    }

    /// Most recent first.
    pub fn iter(&self) -> impl Iterator<Item = &TrackRef> {
        self.stack.iter().rev()
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Track;

    fn make_track(id: &str) -> TrackRef {
        TrackRef::new(Track::new("netease", id, &format!("Track {id}"), "Artist"))
    }

    fn make_queue(n: usize) -> Queue {
        let mut queue = Queue::new();
        queue.replace((0..n).map(|i| make_track(&i.to_string())).collect(), 0);
        queue
    }

    #[test]
    fn test_replace_clamps_start() {
        let mut queue = Queue::new();
        queue.replace(vec![make_track("1"), make_track("2")], 7);
        assert_eq!(queue.current_index(), Some(0));

        queue.replace(vec![make_track("1"), make_track("2")], 1);
        assert_eq!(queue.current_track().unwrap().id(), "netease-2");

        queue.replace(Vec::new(), 0);
        assert!(queue.current_index().is_none());
    }

    #[test]
    fn test_following_wraps() {
        let mut queue = make_queue(3);
        assert_eq!(queue.following_index(), Some(1));
        queue.set_current(2);
        assert_eq!(queue.following_index(), Some(0));
    }

    #[test]
    fn test_preceding_wraps() {
        let mut queue = make_queue(3);
        assert_eq!(queue.preceding_index(), Some(2));
        queue.set_current(2);
        assert_eq!(queue.preceding_index(), Some(1));
        assert_eq!(Queue::new().preceding_index(), None);
    }

    #[test]
    fn test_set_current_rejects_out_of_range() {
        let mut queue = make_queue(2);
        assert!(!queue.set_current(2));
        assert_eq!(queue.current_index(), Some(0));
    }

    #[test]
    fn test_random_index_in_range() {
        let queue = make_queue(4);
        let mut rng = rand::rng();
        for _ in 0..200 {
            let i = queue.random_index(&mut rng).unwrap();
            assert!(i < 4);
        }
        assert!(Queue::new().random_index(&mut rng).is_none());
    }

    #[test]
    fn test_insert_next() {
        let mut queue = make_queue(3);
        queue.set_current(1);
        queue.insert_next(make_track("x"));
        assert_eq!(queue.get(2).unwrap().id(), "netease-x");
        assert_eq!(queue.len(), 4);
    }

    #[test]
    fn test_sync_to() {
        let mut queue = make_queue(3);
        let other = make_track("2");
        queue.sync_to(&other);
        assert_eq!(queue.current_index(), Some(2));
        queue.sync_to(&make_track("absent"));
        assert_eq!(queue.current_index(), Some(2));
    }

    #[test]
    fn test_history_evicts_oldest() {
        let mut history = History::with_limit(3);
        for i in 0..5 {
            history.push(make_track(&i.to_string()));
        }
        assert_eq!(history.len(), 3);
        let ids: Vec<String> = history.iter().map(TrackRef::id).collect();
        assert_eq!(ids, vec!["netease-4", "netease-3", "netease-2"]);
    }

    #[test]
    fn test_history_default_cap() {
        let mut history = History::default();
        for i in 0..250 {
            history.push(make_track(&i.to_string()));
        }
        assert_eq!(history.len(), HISTORY_LIMIT);
        assert_eq!(history.pop().unwrap().id(), "netease-249");
    }

    #[test]
    fn test_history_seed_keeps_newest_on_top() {
        let mut history = History::with_limit(2);
        history.seed(vec![make_track("new"), make_track("mid"), make_track("old")]);
        assert_eq!(history.len(), 2);
        assert_eq!(history.pop().unwrap().id(), "netease-new");
        assert_eq!(history.pop().unwrap().id(), "netease-mid");
        assert!(history.is_empty());
    }
}
