//! Deterministic noise source for the simulated ADC.

/// xorshift64* generator; reproducible for a given seed.
#[derive(Debug, Clone)]
pub struct Xorshift {
    state: u64,
}

impl Xorshift {
    pub const fn new(seed: u64) -> Self {
        Self {
            state: if seed == 0 { 0x9E37_79B9_7F4A_7C15 } else { seed },
        }
    }

    pub const fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    /// Uniform in [0, 1).
    pub fn next_unit(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Triangular noise in (-amp, amp), denser near zero like real ADC jitter.
    pub fn jitter(&mut self, amp: f64) -> f64 {
        (self.next_unit() + self.next_unit() - 1.0) * amp
    }
}
