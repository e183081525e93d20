use linfa::Float;
use ndarray::{ArrayBase, DataMut, Dimension, Zip};

/// Nesterov momentum with restarts
///
/// Extrapolates the current iterate `x` along the direction from the previous iterate `y` with
/// the weight `(t - 1) / (t + 2)`, where `t` counts the steps since the last restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Nesterov {
    t: usize,
}

impl Default for Nesterov {
    fn default() -> Self {
        Self::new()
    }
}

impl Nesterov {
    const R: usize = 3;

    pub fn new() -> Self {
        Nesterov { t: 1 }
    }

    /// Number of accelerated steps since the last restart, plus one
    pub fn counter(&self) -> usize {
        self.t
    }

    /// Apply one momentum step to `x` with previous iterate `y`
    ///
    /// On a reset the previous iterate catches up with `x` and the counter starts again at one,
    /// `x` is not changed. Otherwise `x` is extrapolated, `y` receives the old value of `x`
    /// and the counter is incremented.
    pub fn apply<F, S1, S2, D>(
        &mut self,
        x: &mut ArrayBase<S1, D>,
        y: &mut ArrayBase<S2, D>,
        reset: bool,
    ) where
        F: Float,
        S1: DataMut<Elem = F>,
        S2: DataMut<Elem = F>,
        D: Dimension,
    {
        if reset {
            y.assign(x);
            self.t = 1;
            return;
        }

        let gamma = F::cast(self.t - 1) / F::cast(self.t + Self::R - 1);
        Zip::from(x).and(y).for_each(|x, y| {
            let z = *x + gamma * (*x - *y);
            *y = *x;
            *x = z;
        });
        self.t += 1;
    }
}
