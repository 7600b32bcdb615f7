/// The rectified linear unit.
pub fn relu(x: f32) -> f32 {
    x.max(0.)
}

/// The sigmoid linear unit, `x * sigmoid(x)`.
pub fn silu(x: f32) -> f32 {
    x / (1. + (-x).exp())
}
