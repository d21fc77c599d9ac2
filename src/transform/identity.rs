//! Pass-through transform

use super::{BlockContext, Transform};

/// Copies input to output unchanged.
///
/// This is what runs when nothing else was installed, and the baseline every
/// other transform has to match in shape and timing.
#[derive(Clone, Copy, Debug, Default)]
pub struct Identity;

impl Transform for Identity {
    #[inline]
    fn process(&mut self, _ctx: &BlockContext, input: &[f32], output: &mut [f32]) {
        output.copy_from_slice(input);
    }

    fn name(&self) -> &'static str {
        "identity"
    }
}
