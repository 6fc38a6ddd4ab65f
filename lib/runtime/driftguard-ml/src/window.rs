use ndarray::{Array2, s};

/// Sliding `(input, target)` windows cut from one normalized series.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowSet {
    pub inputs: Array2<f64>,
    pub targets: Array2<f64>,
}

impl WindowSet {
    /// Windows start at every offset `0..len - t_in - t_out`.
    pub fn from_series(series: &[f64], t_in: usize, t_out: usize) -> Self {
        let count = series.len().saturating_sub(t_in + t_out);
        let mut inputs = Array2::zeros((count, t_in));
        let mut targets = Array2::zeros((count, t_out));
        for i in 0..count {
            for j in 0..t_in {
                inputs[[i, j]] = series[i + j];
            }
            for j in 0..t_out {
                targets[[i, j]] = series[i + t_in + j];
            }
        }
        Self { inputs, targets }
    }

    pub fn len(&self) -> usize {
        self.inputs.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Chronological split; the first `ratio` share becomes the training set.
    pub fn split(&self, ratio: f64) -> (WindowSet, WindowSet) {
        let at = ((self.len() as f64) * ratio) as usize;
        let at = at.min(self.len());
        (
            WindowSet {
                inputs: self.inputs.slice(s![..at, ..]).to_owned(),
                targets: self.targets.slice(s![..at, ..]).to_owned(),
            },
            WindowSet {
                inputs: self.inputs.slice(s![at.., ..]).to_owned(),
                targets: self.targets.slice(s![at.., ..]).to_owned(),
            },
        )
    }
}
