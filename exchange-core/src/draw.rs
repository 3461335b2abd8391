use rand::Rng;

use crate::Wheel;

/// Picks the winning slice of a wheel. Implementations must return an index
/// in `[0, wheel.len())` with every slice equally likely.
pub trait DrawProvider {
    fn draw(&mut self, wheel: &Wheel) -> usize;
}

impl<F: FnMut(&Wheel) -> usize> DrawProvider for F {
    fn draw(&mut self, wheel: &Wheel) -> usize {
        self(wheel)
    }
}

#[derive(Debug, Clone)]
pub struct RngDraw<R> {
    rng: R,
}

impl<R: Rng> RngDraw<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }

    pub fn rng_mut(&mut self) -> &mut R {
        &mut self.rng
    }
}

impl<R: Rng> DrawProvider for RngDraw<R> {
    fn draw(&mut self, wheel: &Wheel) -> usize {
        // Wheels built by the engine always have at least one slice.
        self.rng.gen_range(0..wheel.len())
    }
}
