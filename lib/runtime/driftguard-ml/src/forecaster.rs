use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};

use driftguard_domain::{DriftguardError, DriftguardResult, Parameter};

/// `y = W x + b`, mapping `t_in` normalized inputs to `t_out` normalized outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearForecaster {
    weights: Array2<f64>,
    bias: Array1<f64>,
}

impl LinearForecaster {
    pub fn zeros(t_in: usize, t_out: usize) -> Self {
        Self {
            weights: Array2::zeros((t_out, t_in)),
            bias: Array1::zeros(t_out),
        }
    }

    pub fn from_parts(weights: Array2<f64>, bias: Array1<f64>) -> Self {
        Self { weights, bias }
    }

    pub fn t_in(&self) -> usize {
        self.weights.ncols()
    }

    pub fn t_out(&self) -> usize {
        self.weights.nrows()
    }

    pub fn weights(&self) -> &Array2<f64> {
        &self.weights
    }

    pub fn bias(&self) -> &Array1<f64> {
        &self.bias
    }

    pub(crate) fn parts_mut(&mut self) -> (&mut Array2<f64>, &mut Array1<f64>) {
        (&mut self.weights, &mut self.bias)
    }

    /// Batch prediction: one row per input window.
    pub fn predict_batch(&self, inputs: &Array2<f64>) -> Array2<f64> {
        inputs.dot(&self.weights.t()) + &self.bias
    }

    pub fn predict(&self, window: &[f64]) -> Option<Vec<f64>> {
        if window.len() != self.t_in() {
            return None;
        }
        let out = self.weights.dot(&ArrayView1::from(window)) + &self.bias;
        Some(out.to_vec())
    }

    pub fn to_payload(&self) -> DriftguardResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(DriftguardError::internal)
    }

    pub fn from_payload(parameter: &Parameter, payload: &[u8]) -> DriftguardResult<Self> {
        let model: Self = serde_json::from_slice(payload)
            .map_err(|e| DriftguardError::model_unavailable(parameter, e))?;
        if model.bias.len() != model.t_out() {
            return Err(DriftguardError::model_unavailable(
                parameter,
                "bias length does not match weight rows",
            ));
        }
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn predict_applies_weights_and_bias() {
        let model = LinearForecaster::from_parts(
            array![[1.0, 0.0, 0.0], [0.5, 0.5, 0.0]],
            array![0.0, 1.0],
        );
        assert_eq!(model.predict(&[2.0, 4.0, 9.0]), Some(vec![2.0, 4.0]));
        assert_eq!(model.predict(&[1.0]), None);

        let batch = model.predict_batch(&array![[2.0, 4.0, 9.0], [0.0, 0.0, 0.0]]);
        assert_eq!(batch, array![[2.0, 4.0], [0.0, 1.0]]);
    }

    #[test]
    fn payload_survives_storage() {
        let p = Parameter::new("T2M");
        let model = LinearForecaster::from_parts(array![[0.25, -1.5]], array![3.0]);
        let restored = LinearForecaster::from_payload(&p, &model.to_payload().unwrap()).unwrap();
        assert_eq!(restored, model);
    }

    #[test]
    fn garbage_payload_is_model_unavailable() {
        let err = LinearForecaster::from_payload(&Parameter::new("T2M"), b"\x80\x02}q").unwrap_err();
        assert!(err.is_expected());
    }
}
