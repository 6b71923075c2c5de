use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Receives the cumulative progress of a render, in `[0, 1]`. Called from
/// worker threads.
pub type ProgressListener = Arc<dyn Fn(f32) + Send + Sync>;

/// Highest value strictly below 1.0; unfinished renders never report more.
pub const UNFINISHED_CEILING: f32 = 1.0 - f32::EPSILON;

/// Monotonic progress of one render request.
///
/// Reports are serialized: a listener never sees a value lower than one it
/// has already seen, even when workers race.
pub struct Progress {
    value: AtomicU32,
    listener: Mutex<Option<ProgressListener>>,
}

impl Progress {
    pub fn new(listener: Option<ProgressListener>) -> Self {
        Self {
            value: AtomicU32::new(0.0f32.to_bits()),
            listener: Mutex::new(listener),
        }
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.value.load(Ordering::Acquire))
    }

    /// Raise progress to `fraction`, clamped below 1.0. Lower values are ignored.
    pub fn advance(&self, fraction: f32) {
        self.raise(fraction.clamp(0.0, UNFINISHED_CEILING));
    }

    /// The render finished every pass without abort.
    pub fn complete(&self) {
        self.raise(1.0);
    }

    fn raise(&self, fraction: f32) {
        let listener = self.listener.lock();
        if fraction <= self.get() {
            return;
        }
        self.value.store(fraction.to_bits(), Ordering::Release);
        if let Some(listener) = listener.as_ref() {
            listener(fraction);
        }
    }
}

/// Splits the `[0, 1]` range across passes in proportion to the pixels each
/// pass evaluates.
#[derive(Clone, Debug)]
pub struct PassWeights {
    /// Progress at the start of each pass.
    starts: Vec<f32>,
    /// Share of the total for each pass.
    shares: Vec<f32>,
}

impl PassWeights {
    pub fn new(strides: &[u32], width: u32, height: u32) -> Self {
        let counts: Vec<u64> = strides
            .iter()
            .enumerate()
            .map(|(i, &stride)| {
                let coarser = if i == 0 { None } else { Some(strides[i - 1]) };
                new_grid_points(stride, coarser, width, height)
            })
            .collect();
        let total = counts.iter().sum::<u64>().max(1) as f64;

        let mut starts = Vec::with_capacity(counts.len());
        let mut shares = Vec::with_capacity(counts.len());
        let mut done = 0u64;
        for count in counts {
            starts.push((done as f64 / total) as f32);
            shares.push((count as f64 / total) as f32);
            done += count;
        }
        Self { starts, shares }
    }

    /// Progress after `completed` of `bands` bands of `pass` are done.
    pub fn at(&self, pass: usize, completed: usize, bands: usize) -> f32 {
        let (Some(start), Some(share)) = (self.starts.get(pass), self.shares.get(pass)) else {
            return 0.0;
        };
        if bands == 0 {
            return start + share;
        }
        start + share * (completed as f32 / bands as f32)
    }
}

/// Grid points of `stride` not already on the grid of `coarser`.
fn new_grid_points(stride: u32, coarser: Option<u32>, width: u32, height: u32) -> u64 {
    let on_grid = |s: u32| width.div_ceil(s) as u64 * height.div_ceil(s) as u64;
    on_grid(stride) - coarser.map_or(0, on_grid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_progress_never_decreases() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let progress = Progress::new(Some(Arc::new(move |p| sink.lock().push(p))));

        progress.advance(0.3);
        progress.advance(0.2);
        progress.advance(0.3);
        progress.advance(0.6);
        assert_eq!(*seen.lock(), vec![0.3, 0.6]);
        assert_eq!(progress.get(), 0.6);
    }

    #[test]
    fn test_only_completion_reaches_one() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let progress = Progress::new(Some(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })));

        progress.advance(1.0);
        assert!(progress.get() < 1.0);
        progress.complete();
        assert_eq!(progress.get(), 1.0);
        progress.complete();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_pass_weights_follow_new_pixels() {
        // 16x16 with strides 8,4,2,1: 4, 12, 48 and 192 new pixels.
        let weights = PassWeights::new(&[8, 4, 2, 1], 16, 16);
        assert_eq!(weights.at(0, 0, 1), 0.0);
        assert_eq!(weights.at(0, 1, 1), 4.0 / 256.0);
        assert_eq!(weights.at(1, 1, 1), 16.0 / 256.0);
        assert_eq!(weights.at(3, 1, 2), 64.0 / 256.0 + 96.0 / 256.0);
        assert_eq!(weights.at(3, 2, 2), 1.0);
    }

    #[test]
    fn test_partial_grids_count_edge_pixels() {
        assert_eq!(new_grid_points(8, None, 10, 3), 2);
        assert_eq!(new_grid_points(1, Some(2), 3, 3), 9 - 4);
    }
}
