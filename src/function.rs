use std::any::Any;

use crate::buffer::Buffer;

/// Type erasure helper so registered functions can be viewed as their concrete type.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A parameterized computation unit.
///
/// It exposes an ordered sequence of parameter buffers and a matching
/// ordered sequence of gradient buffers, gradient `i` belongs to parameter `i`.
pub trait Function: AsAny {
    fn parameters(&self) -> &[Buffer];

    fn parameters_mut(&mut self) -> &mut [Buffer];

    fn gradients(&self) -> &[Buffer];

    fn gradients_mut(&mut self) -> &mut [Buffer];

    /// Both sequences at once, for callers that update parameters from gradients.
    fn parameters_and_gradients_mut(&mut self) -> (&mut [Buffer], &mut [Buffer]);
}

/// Checks that `func` can take part in the aggregate operations of a set.
///
/// # Returns
/// A human readable reason if the parameter and gradient sequences don't pair up.
pub(crate) fn check_capabilities(func: &dyn Function) -> Result<(), String> {
    let params = func.parameters();
    let grads = func.gradients();

    if params.len() != grads.len() {
        return Err(format!(
            "it exposes {} parameters but {} gradients",
            params.len(),
            grads.len()
        ));
    }

    for (i, (p, g)) in params.iter().zip(grads).enumerate() {
        if p.shape() != g.shape() {
            return Err(format!(
                "gradient {i} has shape {:?} but its parameter has shape {:?}",
                g.shape(),
                p.shape()
            ));
        }
    }

    Ok(())
}
