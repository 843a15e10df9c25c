//! Running metrics for the training loop

/// Mean of the per-batch losses of one epoch
#[derive(Debug, Clone, Default)]
pub struct RunningAverage {
    sum: f64,
    count: usize,
}

impl RunningAverage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    /// 0.0 before the first value
    pub fn average(&self) -> f64 {
        match self.count {
            0 => 0.0,
            n => self.sum / n as f64,
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }
}

/// Top-1 accuracy as correct / total over every counted sample
#[derive(Debug, Clone, Default)]
pub struct AccuracyTracker {
    correct: usize,
    total: usize,
}

impl AccuracyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one batch reduced on the device to a correct count
    pub fn add_counts(&mut self, correct: usize, total: usize) {
        self.correct += correct.min(total);
        self.total += total;
    }

    /// Fraction in [0, 1]; 0.0 when nothing was counted
    pub fn accuracy(&self) -> f64 {
        match self.total {
            0 => 0.0,
            n => self.correct as f64 / n as f64,
        }
    }

    pub fn correct(&self) -> usize {
        self.correct
    }

    pub fn total(&self) -> usize {
        self.total
    }
}
