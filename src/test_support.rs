//! Deterministic random sources for forcing coin flips in tests.

/// Every draw is 0.0, so every `random::<f64>() < p` check passes.
pub(crate) struct AlwaysRng;

impl rand::RngCore for AlwaysRng {
    fn next_u32(&mut self) -> u32 {
        0
    }
    fn next_u64(&mut self) -> u64 {
        0
    }
    fn fill_bytes(&mut self, dst: &mut [u8]) {
        dst.fill(0);
    }
}

/// Every draw is just below 1.0, so no `random::<f64>() < p` check passes.
pub(crate) struct NeverRng;

impl rand::RngCore for NeverRng {
    fn next_u32(&mut self) -> u32 {
        u32::MAX
    }
    fn next_u64(&mut self) -> u64 {
        u64::MAX
    }
    fn fill_bytes(&mut self, dst: &mut [u8]) {
        dst.fill(u8::MAX);
    }
}
