//! Per-axis noise filters
//!
//! Each axis of a channel owns an independent filter. Filters are selected by
//! [`FilterKind`] and wrapped in [`NoiseFilter`], which applies one filter per
//! axis of a [`Vector3`].
//!
//! Non-finite input is rejected at the boundary: the filter state is left
//! untouched and the previous output is returned.

use std::collections::VecDeque;

use nalgebra::Vector3;

use crate::types::FilterKind;

/// Scalar filter applied to one axis
pub trait AxisFilter {
    /// Feed one sample and return the filtered value
    fn apply(&mut self, raw: f64) -> f64;

    /// Return to the initial state
    fn reset(&mut self);
}

/// One-dimensional Kalman filter with a constant-value process model.
///
/// # Example
/// ```
/// use inertial_pipeline::filter::{AxisFilter, KalmanAxisFilter};
///
/// let mut filter = KalmanAxisFilter::new(0.0, 0.1, 1.0);
/// let first = filter.apply(1.0);
/// assert!(first > 0.0 && first < 1.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KalmanAxisFilter {
    process_noise: f64,
    measurement_noise: f64,
    initial_error: f64,
    estimate: f64,
    error: f64,
}

impl KalmanAxisFilter {
    pub fn new(process_noise: f64, measurement_noise: f64, initial_error: f64) -> Self {
        Self {
            process_noise,
            measurement_noise,
            initial_error,
            estimate: 0.0,
            error: initial_error,
        }
    }

    pub fn estimate(&self) -> f64 {
        self.estimate
    }

    /// Current error covariance
    pub fn error(&self) -> f64 {
        self.error
    }
}

impl AxisFilter for KalmanAxisFilter {
    fn apply(&mut self, raw: f64) -> f64 {
        if !raw.is_finite() {
            return self.estimate;
        }

        let predicted_error = self.error + self.process_noise;
        let denominator = predicted_error + self.measurement_noise;
        if denominator <= 0.0 {
            // Reachable only through `new` with all-zero noise; settings
            // validation requires R > 0
            return self.estimate;
        }
        let gain = predicted_error / denominator;
        self.estimate += gain * (raw - self.estimate);
        self.error = (1.0 - gain) * predicted_error;
        self.estimate
    }

    fn reset(&mut self) {
        self.estimate = 0.0;
        self.error = self.initial_error;
    }
}

/// Arithmetic mean over a fixed-capacity FIFO window.
///
/// # Example
/// ```
/// use inertial_pipeline::filter::{AxisFilter, MovingAverageFilter};
///
/// let mut filter = MovingAverageFilter::new(2);
/// assert_eq!(filter.apply(4.0), 4.0);
/// assert_eq!(filter.apply(2.0), 3.0);
/// assert_eq!(filter.apply(0.0), 1.0);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct MovingAverageFilter {
    window: VecDeque<f64>,
    capacity: usize,
    sum: f64,
    /// Samples since the running sum was last recomputed from the window
    since_resync: usize,
}

impl MovingAverageFilter {
    /// A zero capacity is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            window: VecDeque::with_capacity(capacity.min(FilterKind::DEFAULT_WINDOW)),
            capacity,
            sum: 0.0,
            since_resync: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    fn mean(&self) -> f64 {
        if self.window.is_empty() {
            0.0
        } else {
            self.sum / self.window.len() as f64
        }
    }
}

impl AxisFilter for MovingAverageFilter {
    fn apply(&mut self, raw: f64) -> f64 {
        if !raw.is_finite() {
            return self.mean();
        }

        if self.window.len() == self.capacity {
            if let Some(oldest) = self.window.pop_front() {
                self.sum -= oldest;
            }
        }
        self.window.push_back(raw);
        self.sum += raw;
        self.since_resync += 1;

        // Bound rounding drift of the running sum
        if self.window.len() == 1 || self.since_resync >= self.capacity {
            self.sum = self.window.iter().sum();
            self.since_resync = 0;
        }
        self.mean()
    }

    fn reset(&mut self) {
        self.window.clear();
        self.sum = 0.0;
        self.since_resync = 0;
    }
}

/// Identity filter for unfiltered channels
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PassThrough {
    last: f64,
}

impl AxisFilter for PassThrough {
    fn apply(&mut self, raw: f64) -> f64 {
        if raw.is_finite() {
            self.last = raw;
        }
        self.last
    }

    fn reset(&mut self) {
        self.last = 0.0;
    }
}

/// Noise filter over the three axes of a vector.
///
/// # Example
/// ```
/// use nalgebra::Vector3;
/// use inertial_pipeline::{FilterKind, NoiseFilter};
///
/// let mut filter = NoiseFilter::new(FilterKind::MovingAverage { capacity: 4 });
/// let out = filter.apply(Vector3::new(1.0, -2.0, 0.5));
/// assert_eq!(out, Vector3::new(1.0, -2.0, 0.5));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum NoiseFilter {
    None([PassThrough; 3]),
    Kalman([KalmanAxisFilter; 3]),
    MovingAverage([MovingAverageFilter; 3]),
}

impl NoiseFilter {
    pub fn new(kind: FilterKind) -> Self {
        match kind {
            FilterKind::None => NoiseFilter::None([PassThrough::default(); 3]),
            FilterKind::Kalman {
                process_noise,
                measurement_noise,
                initial_error,
            } => NoiseFilter::Kalman(
                [KalmanAxisFilter::new(process_noise, measurement_noise, initial_error); 3],
            ),
            FilterKind::MovingAverage { capacity } => NoiseFilter::MovingAverage([
                MovingAverageFilter::new(capacity),
                MovingAverageFilter::new(capacity),
                MovingAverageFilter::new(capacity),
            ]),
        }
    }

    pub fn apply(&mut self, raw: Vector3<f64>) -> Vector3<f64> {
        match self {
            NoiseFilter::None(axes) => apply_axes(axes, raw),
            NoiseFilter::Kalman(axes) => apply_axes(axes, raw),
            NoiseFilter::MovingAverage(axes) => apply_axes(axes, raw),
        }
    }

    pub fn reset(&mut self) {
        match self {
            NoiseFilter::None(axes) => axes.iter_mut().for_each(AxisFilter::reset),
            NoiseFilter::Kalman(axes) => axes.iter_mut().for_each(AxisFilter::reset),
            NoiseFilter::MovingAverage(axes) => axes.iter_mut().for_each(AxisFilter::reset),
        }
    }
}

fn apply_axes<F: AxisFilter>(axes: &mut [F; 3], raw: Vector3<f64>) -> Vector3<f64> {
    Vector3::new(axes[0].apply(raw.x), axes[1].apply(raw.y), axes[2].apply(raw.z))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kalman_update_equations() {
        let (q, r) = (0.01, 0.1);
        let mut filter = KalmanAxisFilter::new(q, r, 1.0);

        let p_pred: f64 = 1.0 + q;
        let k = p_pred / (p_pred + r);
        let expected = 0.0 + k * (2.0 - 0.0);

        assert_eq!(filter.apply(2.0), expected);
        assert_eq!(filter.error(), (1.0 - k) * p_pred);
    }

    #[test]
    fn test_kalman_converges_monotonically_without_overshoot() {
        let target = 3.5;
        let mut filter = KalmanAxisFilter::new(0.0, 0.5, 1.0);
        let mut previous = filter.estimate();

        for _ in 0..1000 {
            let estimate = filter.apply(target);
            assert!(estimate >= previous, "estimate decreased: {previous} -> {estimate}");
            assert!(estimate <= target, "overshoot: {estimate}");
            previous = estimate;
        }
        assert!((target - previous).abs() < 0.01);
    }

    #[test]
    fn test_kalman_rejects_non_finite_input() {
        let mut filter = KalmanAxisFilter::new(0.01, 0.1, 1.0);
        filter.apply(1.0);
        let before = filter;

        assert_eq!(filter.apply(f64::NAN), before.estimate());
        assert_eq!(filter.apply(f64::INFINITY), before.estimate());
        assert_eq!(filter, before);
    }

    #[test]
    fn test_kalman_reset() {
        let mut filter = KalmanAxisFilter::new(0.01, 0.1, 2.0);
        for _ in 0..10 {
            filter.apply(5.0);
        }
        filter.reset();
        assert_eq!(filter.estimate(), 0.0);
        assert_eq!(filter.error(), 2.0);
    }

    #[test]
    fn test_kalman_zero_noise_holds_estimate() {
        let mut filter = KalmanAxisFilter::new(0.0, 0.0, 0.0);
        assert_eq!(filter.apply(2.0), 0.0);
        assert_eq!(filter.error(), 0.0);
        assert!(filter.estimate().is_finite());
    }

    #[test]
    fn test_moving_average_large_window_allocates_lazily() {
        let mut filter = MovingAverageFilter::new(FilterKind::MAX_WINDOW);
        assert_eq!(filter.capacity(), FilterKind::MAX_WINDOW);
        assert_eq!(filter.apply(1.5), 1.5);
        assert_eq!(filter.apply(2.5), 2.0);
    }

    #[test]
    fn test_moving_average_first_sample_unchanged() {
        let mut filter = MovingAverageFilter::new(100);
        assert_eq!(filter.apply(0.123456), 0.123456);
        assert_eq!(filter.len(), 1);
    }

    #[test]
    fn test_moving_average_evicts_oldest() {
        let mut filter = MovingAverageFilter::new(3);
        filter.apply(1.0);
        filter.apply(2.0);
        assert_eq!(filter.apply(3.0), 2.0);
        assert_eq!(filter.apply(7.0), 4.0);
        assert_eq!(filter.len(), 3);
    }

    #[test]
    fn test_moving_average_converges_to_constant() {
        let mut filter = MovingAverageFilter::new(FilterKind::DEFAULT_WINDOW);
        for i in 0..50 {
            filter.apply(if i % 2 == 0 { 10.0 } else { -3.7 });
        }

        let value = 0.3;
        let mut last = 0.0;
        for _ in 0..FilterKind::DEFAULT_WINDOW {
            last = filter.apply(value);
        }
        assert!((last - value).abs() < 1e-12, "got {last}");
    }

    #[test]
    fn test_moving_average_zero_capacity_and_empty_window() {
        let mut filter = MovingAverageFilter::new(0);
        assert_eq!(filter.capacity(), 1);
        assert_eq!(filter.apply(f64::NAN), 0.0);
        assert!(filter.is_empty());
        assert_eq!(filter.apply(2.0), 2.0);
        assert_eq!(filter.apply(4.0), 4.0);
    }

    #[test]
    fn test_noise_filter_axes_are_independent() {
        let mut filter = NoiseFilter::new(FilterKind::MovingAverage { capacity: 2 });
        filter.apply(Vector3::new(1.0, 10.0, -1.0));
        let out = filter.apply(Vector3::new(3.0, 10.0, 1.0));
        assert_eq!(out, Vector3::new(2.0, 10.0, 0.0));

        filter.reset();
        assert_eq!(filter.apply(Vector3::new(5.0, 5.0, 5.0)), Vector3::new(5.0, 5.0, 5.0));
    }

    #[test]
    fn test_pass_through() {
        let mut filter = NoiseFilter::new(FilterKind::None);
        let v = Vector3::new(0.1, -0.2, 0.3);
        assert_eq!(filter.apply(v), v);
        assert_eq!(filter.apply(Vector3::new(f64::NAN, 1.0, 1.0)).x, 0.1);
    }
}
