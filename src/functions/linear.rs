use ndarray::{Array1, Array2, ArrayView1, Ix1, Ix2};
use rand::Rng;

use crate::{
    buffer::Buffer,
    error::{FsetErr, Result},
    function::Function,
};

const WEIGHTS: usize = 0;
const BIASES: usize = 1;

/// A dense layer, `y = W·x + b`.
///
/// Parameters are laid out as `[W, b]` with `W` of shape `(dim_out, dim_in)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Linear {
    params: Vec<Buffer>,
    grads: Vec<Buffer>,
}

impl Linear {
    /// Creates a new zero-initialized `Linear` function.
    ///
    /// # Arguments
    /// * `dim_in` - The input dimension.
    /// * `dim_out` - The output dimension.
    ///
    /// # Returns
    /// A new `Linear` instance.
    pub fn new(dim_in: usize, dim_out: usize) -> Self {
        Self::assemble(Array2::zeros((dim_out, dim_in)), Array1::zeros(dim_out))
    }

    /// Creates a new `Linear` function sampling every parameter from
    /// `U(-1/sqrt(dim_in), 1/sqrt(dim_in))`.
    ///
    /// # Arguments
    /// * `dim_in` - The input dimension.
    /// * `dim_out` - The output dimension.
    /// * `rng` - A random number generator.
    ///
    /// # Returns
    /// A new `Linear` instance.
    pub fn uniform<R: Rng + ?Sized>(dim_in: usize, dim_out: usize, rng: &mut R) -> Self {
        let bound = match dim_in {
            0 => 0.,
            n => 1. / (n as f32).sqrt(),
        };

        let mut sample = || {
            if bound > 0. {
                rng.random_range(-bound..bound)
            } else {
                0.
            }
        };

        let weights = Array2::from_shape_fn((dim_out, dim_in), |_| sample());
        let biases = Array1::from_shape_fn(dim_out, |_| sample());
        Self::assemble(weights, biases)
    }

    /// Creates a new `Linear` function from existing weights and biases.
    ///
    /// # Arguments
    /// * `weights` - A `(dim_out, dim_in)` matrix.
    /// * `biases` - A `dim_out` vector.
    ///
    /// # Returns
    /// A new `Linear` instance or `FsetErr::SizeMismatch` if the output dimensions disagree.
    pub fn from_params(weights: Array2<f32>, biases: Array1<f32>) -> Result<Self> {
        if weights.nrows() != biases.len() {
            return Err(FsetErr::SizeMismatch {
                what: "linear biases",
                got: biases.len(),
                expected: weights.nrows(),
            });
        }

        Ok(Self::assemble(weights, biases))
    }

    fn assemble(weights: Array2<f32>, biases: Array1<f32>) -> Self {
        let grads = vec![
            Buffer::Host(Array2::zeros(weights.dim()).into_dyn()),
            Buffer::Host(Array1::zeros(biases.dim()).into_dyn()),
        ];

        let params = vec![
            Buffer::Host(weights.into_dyn()),
            Buffer::Host(biases.into_dyn()),
        ];

        Self { params, grads }
    }

    /// The input dimension, `0` if the weights were replaced by a non matrix.
    pub fn dim_in(&self) -> usize {
        self.weight_dim(1)
    }

    pub fn dim_out(&self) -> usize {
        self.weight_dim(0)
    }

    fn weight_dim(&self, axis: usize) -> usize {
        self.params
            .get(WEIGHTS)
            .and_then(|w| w.shape().get(axis))
            .copied()
            .unwrap_or(0)
    }

    /// Computes `W·x + b`.
    ///
    /// # Returns
    /// The output activations, `FsetErr::NotOnHost` if the parameters live on a device,
    /// `FsetErr::Shape` if the parameters were replaced by arrays of the wrong
    /// dimensionality or `FsetErr::SizeMismatch` if `x` doesn't match the input dimension.
    pub fn forward(&self, x: ArrayView1<f32>) -> Result<Array1<f32>> {
        let (Some(w), Some(b)) = (
            self.params.get(WEIGHTS).and_then(Buffer::as_host),
            self.params.get(BIASES).and_then(Buffer::as_host),
        ) else {
            return Err(FsetErr::NotOnHost {
                name: "linear".into(),
            });
        };

        let w = w.view().into_dimensionality::<Ix2>()?;
        let b = b.view().into_dimensionality::<Ix1>()?;

        if x.len() != w.ncols() {
            return Err(FsetErr::SizeMismatch {
                what: "linear input",
                got: x.len(),
                expected: w.ncols(),
            });
        }

        if b.len() != w.nrows() {
            return Err(FsetErr::SizeMismatch {
                what: "linear biases",
                got: b.len(),
                expected: w.nrows(),
            });
        }

        Ok(w.dot(&x) + b)
    }

    /// Resets every host gradient to zero, device gradients are left as they are.
    pub fn zero_grads(&mut self) {
        self.grads
            .iter_mut()
            .filter_map(Buffer::as_host_mut)
            .for_each(|g| g.fill(0.));
    }
}

impl Function for Linear {
    fn parameters(&self) -> &[Buffer] {
        &self.params
    }

    fn parameters_mut(&mut self) -> &mut [Buffer] {
        &mut self.params
    }

    fn gradients(&self) -> &[Buffer] {
        &self.grads
    }

    fn gradients_mut(&mut self) -> &mut [Buffer] {
        &mut self.grads
    }

    fn parameters_and_gradients_mut(&mut self) -> (&mut [Buffer], &mut [Buffer]) {
        (&mut self.params, &mut self.grads)
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::{
        config::DeviceConfig,
        device::{Device, MirrorDevice},
    };

    #[test]
    fn new_is_zeroed_with_matching_gradients() {
        let l = Linear::new(3, 2);
        assert_eq!(l.dim_in(), 3);
        assert_eq!(l.dim_out(), 2);

        let shapes: Vec<_> = l.parameters().iter().map(|p| p.shape().to_vec()).collect();
        assert_eq!(shapes, vec![vec![2, 3], vec![2]]);

        let gshapes: Vec<_> = l.gradients().iter().map(|g| g.shape().to_vec()).collect();
        assert_eq!(shapes, gshapes);
    }

    #[test]
    fn uniform_stays_within_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        let l = Linear::uniform(4, 3, &mut rng);

        for p in l.parameters() {
            assert!(p.as_host().unwrap().iter().all(|x| x.abs() < 0.5));
        }
        assert!(l.gradients().iter().all(|g| g.as_host().unwrap().iter().all(|x| *x == 0.)));
    }

    #[test]
    fn uniform_without_inputs_has_zero_biases() {
        let mut rng = StdRng::seed_from_u64(7);
        let l = Linear::uniform(0, 2, &mut rng);
        assert_eq!(l.parameters()[1], Buffer::Host(Array1::zeros(2).into_dyn()));
    }

    #[test]
    fn forward() {
        let l = Linear::from_params(array![[1., 2.], [0., -1.]], array![0.5, 1.]).unwrap();
        let y = l.forward(array![3., 4.].view()).unwrap();
        assert_eq!(y, array![11.5_f32, -3.0]);
    }

    #[test]
    fn forward_rejects_wrong_input_size() {
        let l = Linear::new(2, 1);
        let err = l.forward(array![1., 2., 3.].view()).unwrap_err();
        assert!(matches!(
            err,
            FsetErr::SizeMismatch {
                got: 3,
                expected: 2,
                ..
            }
        ));
    }

    #[test]
    fn forward_on_device_fails() {
        let dev = MirrorDevice::new(DeviceConfig::default());
        let mut l = Linear::new(2, 1);
        for p in l.parameters_mut() {
            p.move_to_device(&dev).unwrap();
        }

        assert!(matches!(
            l.forward(array![1., 2.].view()),
            Err(FsetErr::NotOnHost { .. })
        ));
        assert_eq!(l.parameters()[0].device(), Some(dev.id()));
    }

    #[test]
    fn forward_with_reshaped_weights_fails() {
        let mut l = Linear::new(2, 1);
        l.parameters_mut()[0] = Buffer::Host(Array1::zeros(2).into_dyn());

        assert_eq!(l.dim_in(), 0);
        assert_eq!(l.dim_out(), 2);
        assert!(matches!(
            l.forward(array![1., 2.].view()),
            Err(FsetErr::Shape(_))
        ));
    }

    #[test]
    fn forward_with_replaced_biases_fails() {
        let mut l = Linear::new(2, 1);
        l.parameters_mut()[1] = Buffer::Host(Array1::zeros(3).into_dyn());

        assert!(matches!(
            l.forward(array![1., 2.].view()),
            Err(FsetErr::SizeMismatch { got: 3, expected: 1, .. })
        ));
    }

    #[test]
    fn mismatched_biases_are_rejected() {
        let res = Linear::from_params(Array2::zeros((2, 3)), Array1::zeros(3));
        assert!(matches!(res, Err(FsetErr::SizeMismatch { .. })));
    }

    #[test]
    fn zero_grads() {
        let mut l = Linear::new(2, 2);
        l.gradients_mut()[1] = Buffer::Host(array![1., 2.].into_dyn());

        l.zero_grads();
        assert_eq!(l.gradients()[1], Buffer::Host(Array1::zeros(2).into_dyn()));
    }
}
