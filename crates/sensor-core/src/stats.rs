// ── SummaryStats ──────────────────────────────────────────────────────────────

/// Min / max / mean / sample standard deviation of a set of readings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SummaryStats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// `None` when `count == 1`.
    pub std_dev: Option<f64>,
}

impl SummaryStats {
    /// Summarise `values`, returning `None` for an empty slice.
    ///
    /// Uses Welford's online update, so the variance is stable for readings
    /// that share a large common offset.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        let mut acc = Accumulator::default();
        for &v in values {
            acc.push(v);
        }
        acc.finish()
    }
}

// ── Accumulator ───────────────────────────────────────────────────────────────

/// Streaming builder for [`SummaryStats`].
#[derive(Debug, Clone, Default)]
pub struct Accumulator {
    count: usize,
    min: f64,
    max: f64,
    mean: f64,
    m2: f64,
}

impl Accumulator {
    pub fn push(&mut self, value: f64) {
        self.count += 1;
        if self.count == 1 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Sample variance uses an N-1 denominator.
    pub fn finish(&self) -> Option<SummaryStats> {
        if self.count == 0 {
            return None;
        }
        let std_dev = if self.count > 1 {
            Some((self.m2 / (self.count - 1) as f64).sqrt())
        } else {
            None
        };
        Some(SummaryStats {
            count: self.count,
            min: self.min,
            max: self.max,
            mean: self.mean,
            std_dev,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_empty_slice_has_no_stats() {
        assert!(SummaryStats::from_values(&[]).is_none());
    }

    #[test]
    fn test_single_value() {
        let s = SummaryStats::from_values(&[21.5]).unwrap();
        assert_eq!(s.count, 1);
        assert_eq!(s.min, 21.5);
        assert_eq!(s.max, 21.5);
        assert_eq!(s.mean, 21.5);
        assert!(s.std_dev.is_none());
    }

    #[test]
    fn test_sample_std_dev_uses_n_minus_one() {
        let s = SummaryStats::from_values(&[10.0, 20.0, 30.0]).unwrap();
        assert_eq!(s.min, 10.0);
        assert_eq!(s.max, 30.0);
        assert!(approx(s.mean, 20.0));
        assert!(approx(s.std_dev.unwrap(), 10.0));
    }

    #[test]
    fn test_two_identical_values_have_zero_spread() {
        let s = SummaryStats::from_values(&[3.0, 3.0]).unwrap();
        assert!(approx(s.std_dev.unwrap(), 0.0));
    }

    #[test]
    fn test_large_offset_is_stable() {
        let base = 1.0e6;
        let s = SummaryStats::from_values(&[base + 4.0, base + 7.0, base + 13.0, base + 16.0])
            .unwrap();
        assert!((s.mean - (base + 10.0)).abs() < 1e-6);
        assert!((s.std_dev.unwrap() - 30.0_f64.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn test_negative_values() {
        let s = SummaryStats::from_values(&[-5.0, -15.0]).unwrap();
        assert_eq!(s.min, -15.0);
        assert_eq!(s.max, -5.0);
        assert!(approx(s.mean, -10.0));
        assert!(approx(s.std_dev.unwrap(), 50.0_f64.sqrt()));
    }
}
