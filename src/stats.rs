/// Mean and population standard deviation of a group of scores.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Summary {
    pub count: usize,
    pub mean: f64,
    pub std_dev: f64,
}

/// Running mean and variance (Welford), stable regardless of input order.
#[derive(Clone, Copy, Debug, Default)]
pub struct RunningStats {
    count: usize,
    mean: f64,
    m2: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    pub fn summary(&self) -> Option<Summary> {
        if self.count == 0 {
            return None;
        }
        Some(Summary {
            count: self.count,
            mean: self.mean,
            std_dev: (self.m2 / self.count as f64).sqrt(),
        })
    }
}

impl FromIterator<f64> for RunningStats {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        let mut stats = RunningStats::default();
        for value in iter {
            stats.push(value);
        }
        stats
    }
}

pub fn summarize(values: impl IntoIterator<Item = f64>) -> Option<Summary> {
    values.into_iter().collect::<RunningStats>().summary()
}
