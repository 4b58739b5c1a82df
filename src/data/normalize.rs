//! Column standardization for the clustering design matrix
//!
//! Statistics are fit on the training split only and the same transform is
//! applied to every row; validation and test rows never contribute to the
//! scaling parameters.

use anyhow::{bail, Result};
use ndarray::{Array1, Array2, ArrayView2, Axis};

/// Zero-mean unit-variance scaler with a fit/transform split
#[derive(Clone, Debug)]
pub struct Standardizer {
    mean: Array1<f64>,
    std: Array1<f64>,
}

impl Standardizer {
    /// Fit per-column mean and standard deviation on training rows.
    pub fn fit(train: &ArrayView2<f64>) -> Result<Self> {
        if train.nrows() == 0 {
            bail!("cannot fit standardizer: training matrix has zero rows");
        }

        Ok(Self {
            mean: train.mean_axis(Axis(0)).unwrap(),
            std: train.std_axis(Axis(0), 0.0),
        })
    }

    /// Apply the fitted transform to any matrix with the same columns.
    ///
    /// A constant training column (zero sd) is centered but left unscaled.
    pub fn transform(&self, data: &ArrayView2<f64>) -> Array2<f64> {
        let mut result = data.to_owned();
        for (i, mut col) in result.columns_mut().into_iter().enumerate() {
            let s = if self.std[i] > 1e-10 { self.std[i] } else { 1.0 };
            col.mapv_inplace(|x| (x - self.mean[i]) / s);
        }
        result
    }
}
