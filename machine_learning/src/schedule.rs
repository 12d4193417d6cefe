/// Lowers the learning rate once a monitored value stops decreasing.
///
/// An epoch counts as an improvement when the metric drops below `best * (1 - threshold)`. After
/// more than `patience` epochs without one, the learning rate is multiplied by `factor` (never
/// going under `min_lr`) and the counter starts over.
#[derive(Debug, Clone)]
pub struct ReduceLrOnPlateau {
    factor: f32,
    patience: usize,
    threshold: f32,
    cooldown: usize,
    min_lr: f32,
    eps: f32,

    best: f32,
    num_bad_epochs: usize,
    cooldown_counter: usize,
}

impl Default for ReduceLrOnPlateau {
    fn default() -> Self {
        Self::new(0.1, 3)
    }
}

impl ReduceLrOnPlateau {
    /// Creates a new `ReduceLrOnPlateau` with a relative threshold of `1e-4`, no cooldown and no
    /// lower bound for the learning rate.
    ///
    /// # Arguments
    /// * `factor` - The factor the learning rate is multiplied by on every reduction.
    /// * `patience` - The amount of epochs without improvement tolerated before reducing.
    pub fn new(factor: f32, patience: usize) -> Self {
        Self {
            factor,
            patience,
            threshold: 1e-4,
            cooldown: 0,
            min_lr: 0.0,
            eps: 1e-8,
            best: f32::INFINITY,
            num_bad_epochs: 0,
            cooldown_counter: 0,
        }
    }

    pub fn with_cooldown(mut self, cooldown: usize) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn with_min_lr(mut self, min_lr: f32) -> Self {
        self.min_lr = min_lr;
        self
    }

    pub fn best(&self) -> f32 {
        self.best
    }

    /// Records the metric of the last epoch.
    ///
    /// # Arguments
    /// * `metric` - The monitored value, lower is better.
    /// * `current_lr` - The learning rate in use.
    ///
    /// # Returns
    /// The new learning rate if it has to be reduced.
    pub fn step(&mut self, metric: f32, current_lr: f32) -> Option<f32> {
        if metric < self.best * (1.0 - self.threshold) {
            self.best = metric;
            self.num_bad_epochs = 0;
        } else {
            self.num_bad_epochs += 1;
        }

        if self.cooldown_counter > 0 {
            self.cooldown_counter -= 1;
            self.num_bad_epochs = 0;
        }

        if self.num_bad_epochs <= self.patience {
            return None;
        }

        self.cooldown_counter = self.cooldown;
        self.num_bad_epochs = 0;

        let new_lr = (current_lr * self.factor).max(self.min_lr);
        (current_lr - new_lr > self.eps).then_some(new_lr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reduces_after_patience_is_exhausted() {
        let mut sched = ReduceLrOnPlateau::default();
        let mut lr = 1e-3;

        assert_eq!(sched.step(1.0, lr), None);
        for _ in 0..3 {
            assert_eq!(sched.step(1.0, lr), None);
        }

        lr = sched.step(1.0, lr).unwrap();
        assert!((lr - 1e-4).abs() < 1e-10);

        // the counter starts over after a reduction
        for _ in 0..3 {
            assert_eq!(sched.step(1.0, lr), None);
        }
        assert!(sched.step(1.0, lr).is_some());
    }

    #[test]
    fn improvements_reset_the_counter() {
        let mut sched = ReduceLrOnPlateau::default();

        for metric in [1.0, 1.0, 1.0, 0.5, 0.5, 0.5, 0.5] {
            assert_eq!(sched.step(metric, 0.1), None);
        }
        assert_eq!(sched.best(), 0.5);
    }

    #[test]
    fn tiny_improvements_do_not_count() {
        let mut sched = ReduceLrOnPlateau::default();
        sched.step(1.0, 0.1);

        for _ in 0..3 {
            assert_eq!(sched.step(0.99999, 0.1), None);
        }
        assert!(sched.step(0.99999, 0.1).is_some());
    }

    #[test]
    fn nan_is_not_an_improvement() {
        let mut sched = ReduceLrOnPlateau::default();
        sched.step(1.0, 0.1);

        for _ in 0..3 {
            sched.step(f32::NAN, 0.1);
        }
        assert!(sched.step(f32::NAN, 0.1).is_some());
        assert_eq!(sched.best(), 1.0);
    }

    #[test]
    fn min_lr_bounds_the_reduction() {
        let mut sched = ReduceLrOnPlateau::new(0.1, 0).with_min_lr(0.05);
        sched.step(1.0, 0.1);

        let lr = sched.step(1.0, 0.1).unwrap();
        assert_eq!(lr, 0.05);
        assert_eq!(sched.step(1.0, lr), None);
    }

    #[test]
    fn cooldown_delays_the_next_reduction() {
        let mut sched = ReduceLrOnPlateau::new(0.5, 0).with_cooldown(2);
        sched.step(1.0, 1.0);

        assert_eq!(sched.step(1.0, 1.0), Some(0.5));
        assert_eq!(sched.step(1.0, 0.5), None);
        assert_eq!(sched.step(1.0, 0.5), None);
        assert_eq!(sched.step(1.0, 0.5), Some(0.25));
    }
}
