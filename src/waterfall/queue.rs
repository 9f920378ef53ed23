use std::collections::VecDeque;

/// Fixed-capacity deque that evicts the oldest entry to make room
///
/// Pushing never blocks and never grows the queue past `capacity`.
#[derive(Debug, Clone)]
pub struct BoundedQueue<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedQueue<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Append `item`, returning the entry evicted to make room
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.items.len() >= self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    /// Remove and return the most recently pushed entry
    pub fn pop_newest(&mut self) -> Option<T> {
        self.items.pop_back()
    }

    pub fn pop_oldest(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    pub fn newest(&self) -> Option<&T> {
        self.items.back()
    }

    /// Change the capacity, evicting oldest entries if now over
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.items.len() > self.capacity {
            self.items.pop_front();
        }
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Oldest to newest
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> {
        self.items.iter()
    }
}

/// Decoded frames waiting for the next draw tick
///
/// Only the freshest frame is drawn; anything older still queued at draw
/// time is dropped.
#[derive(Debug)]
pub struct FrameQueue<T> {
    queue: BoundedQueue<T>,
    dropped: u64,
}

impl<T> FrameQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: BoundedQueue::new(capacity),
            dropped: 0,
        }
    }

    /// Queue a frame; discards everything when no view consumes frames
    pub fn enqueue(&mut self, frame: T, draw_enabled: bool) {
        if !draw_enabled {
            self.dropped += (self.queue.len() + 1) as u64;
            self.queue.clear();
            return;
        }
        if self.queue.push(frame).is_some() {
            self.dropped += 1;
        }
    }

    /// Take the newest frame and discard older unread ones
    pub fn drain_one_for_draw(&mut self) -> Option<T> {
        let newest = self.queue.pop_newest()?;
        self.dropped += self.queue.len() as u64;
        self.queue.clear();
        Some(newest)
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Frames discarded without being drawn
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounded_queue_never_exceeds_capacity() {
        let mut queue = BoundedQueue::new(3);
        for i in 0..10 {
            queue.push(i);
            assert!(queue.len() <= 3);
        }
        assert_eq!(queue.iter().copied().collect::<Vec<_>>(), vec![7, 8, 9]);
    }

    #[test]
    fn test_bounded_queue_evicts_oldest_first() {
        let mut queue = BoundedQueue::new(2);
        assert_eq!(queue.push('a'), None);
        assert_eq!(queue.push('b'), None);
        assert_eq!(queue.push('c'), Some('a'));
        assert_eq!(queue.push('d'), Some('b'));
        assert_eq!(queue.pop_oldest(), Some('c'));
    }

    #[test]
    fn test_shrinking_capacity_evicts() {
        let mut queue = BoundedQueue::new(5);
        (0..5).for_each(|i| {
            queue.push(i);
        });
        queue.set_capacity(2);
        assert_eq!(queue.iter().copied().collect::<Vec<_>>(), vec![3, 4]);
        assert_eq!(queue.newest(), Some(&4));
    }

    #[test]
    fn test_zero_capacity_is_one() {
        let mut queue = BoundedQueue::new(0);
        queue.push(1);
        queue.push(2);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pop_newest(), Some(2));
    }

    #[test]
    fn test_draw_takes_newest_and_drops_rest() {
        let mut frames = FrameQueue::new(4);
        frames.enqueue(1, true);
        frames.enqueue(2, true);
        frames.enqueue(3, true);

        assert_eq!(frames.drain_one_for_draw(), Some(3));
        assert!(frames.is_empty());
        assert_eq!(frames.dropped(), 2);
        assert_eq!(frames.drain_one_for_draw(), None);
    }

    #[test]
    fn test_burst_bounded_by_capacity() {
        let mut frames = FrameQueue::new(2);
        for i in 0..50 {
            frames.enqueue(i, true);
            assert!(frames.len() <= 2);
        }
        assert_eq!(frames.drain_one_for_draw(), Some(49));
    }

    #[test]
    fn test_disabled_view_discards() {
        let mut frames = FrameQueue::new(2);
        frames.enqueue(1, true);
        frames.enqueue(2, false);
        assert!(frames.is_empty());
        assert_eq!(frames.dropped(), 2);
    }
}
