use std::collections::VecDeque;

/// Fixed-capacity FIFO holding the most recent samples, zero-filled at creation
#[derive(Debug, Clone)]
pub struct RollingBuffer {
    samples: VecDeque<f32>,
    capacity: usize,
}

impl RollingBuffer {
    pub fn new(capacity: usize) -> Self {
        let mut samples = VecDeque::with_capacity(capacity + 1);
        samples.resize(capacity, 0.0);
        Self { samples, capacity }
    }

    /// Appends one sample, evicting the oldest once the buffer is full
    pub fn push(&mut self, sample: f32) {
        if self.capacity == 0 {
            return;
        }
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest-first contiguous view of the window
    pub fn as_slice(&mut self) -> &[f32] {
        self.samples.make_contiguous()
    }

    pub fn iter(&self) -> impl Iterator<Item = &f32> {
        self.samples.iter()
    }
}

/// Fires once every `every` samples
#[derive(Debug, Clone, Copy)]
pub struct Cadence {
    every: usize,
    since_last: usize,
}

impl Cadence {
    pub fn new(every: usize) -> Self {
        Self { every: every.max(1), since_last: 0 }
    }

    /// Refresh interval of half a second worth of samples
    pub fn half_second(sample_rate: u32) -> Self {
        Self::new((sample_rate / 2) as usize)
    }

    pub fn every(&self) -> usize {
        self.every
    }

    /// Counts one new sample; returns true (and resets) when the threshold is reached
    pub fn tick(&mut self) -> bool {
        self.since_last += 1;
        if self.since_last >= self.every {
            self.since_last = 0;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_zero_filled() {
        let buffer = RollingBuffer::new(5);
        assert_eq!(buffer.len(), 5);
        assert_eq!(buffer.capacity(), 5);
        assert!(buffer.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_push_evicts_oldest() {
        let mut buffer = RollingBuffer::new(3);
        for s in [1.0, 2.0, 3.0, 4.0] {
            buffer.push(s);
        }
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.as_slice(), &[2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_partial_fill_keeps_zeros_in_front() {
        let mut buffer = RollingBuffer::new(4);
        buffer.push(7.0);
        assert_eq!(buffer.as_slice(), &[0.0, 0.0, 0.0, 7.0]);
    }

    #[test]
    fn test_zero_capacity() {
        let mut buffer = RollingBuffer::new(0);
        buffer.push(1.0);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_cadence_fires_every_half_second() {
        let mut cadence = Cadence::half_second(1000);
        assert_eq!(cadence.every(), 500);
        let fired: Vec<usize> = (1..=1500).filter(|_| cadence.tick()).collect();
        assert_eq!(fired.len(), 3);
    }

    #[test]
    fn test_cadence_positions() {
        let mut cadence = Cadence::new(3);
        let ticks: Vec<bool> = (0..7).map(|_| cadence.tick()).collect();
        assert_eq!(ticks, vec![false, false, true, false, false, true, false]);
    }

    #[test]
    fn test_cadence_never_zero() {
        let mut cadence = Cadence::half_second(1);
        assert_eq!(cadence.every(), 1);
        assert!(cadence.tick());
    }
}
