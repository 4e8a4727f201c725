//! Seeded, R-compatible random draws
//!
//! The random baseline gene set must be reproducible from its seed alone,
//! and comparable with draws made by R's `set.seed(seed); sample(n, k)`.
//! This module carries R's Mersenne-Twister (with the LCG seeding used by
//! `set.seed`) and the rejection-sampling index generator R uses since 3.6.

/// R's Mersenne-Twister generator
pub struct MersenneTwister {
    state: [u32; 624],
    index: usize,
}

/// 2^-32, R's scaling of a 32-bit draw onto (0, 1)
const I2_32M1: f64 = 2.328_306_436_538_696_3e-10;

impl MersenneTwister {
    const N: usize = 624;
    const M: usize = 397;
    const MATRIX_A: u32 = 0x9908_B0DF;
    const UPPER_MASK: u32 = 0x8000_0000;
    const LOWER_MASK: u32 = 0x7FFF_FFFF;

    /// Same stream as R's `set.seed(seed)`
    pub fn new(seed: u32) -> Self {
        // Initial scrambling, then one LCG value for the position word and
        // 624 for the state
        let lcg = |x: u32| x.wrapping_mul(69069).wrapping_add(1);
        let mut s = (0..50).fold(seed, |x, _| lcg(x));
        s = lcg(s);

        let mut state = [0u32; Self::N];
        for word in state.iter_mut() {
            s = lcg(s);
            *word = s;
        }
        Self { state, index: Self::N }
    }

    fn twist(&mut self) {
        for i in 0..Self::N {
            let y = (self.state[i] & Self::UPPER_MASK) | (self.state[(i + 1) % Self::N] & Self::LOWER_MASK);
            let mut next = self.state[(i + Self::M) % Self::N] ^ (y >> 1);
            if y & 1 != 0 {
                next ^= Self::MATRIX_A;
            }
            self.state[i] = next;
        }
        self.index = 0;
    }

    fn next_u32(&mut self) -> u32 {
        if self.index >= Self::N {
            self.twist();
        }
        let mut y = self.state[self.index];
        self.index += 1;

        y ^= y >> 11;
        y ^= (y << 7) & 0x9D2C_5680;
        y ^= (y << 15) & 0xEFC6_0000;
        y ^= y >> 18;
        y
    }

    /// Uniform draw on the open interval (0, 1)
    pub fn runif(&mut self) -> f64 {
        let u = self.next_u32() as f64 * I2_32M1;
        if u <= 0.0 {
            0.5 * I2_32M1
        } else if 1.0 - u <= 0.0 {
            1.0 - 0.5 * I2_32M1
        } else {
            u
        }
    }

    /// `bits` random bits assembled from 16-bit chunks
    fn rbits(&mut self, bits: u32) -> u64 {
        let mut v: u64 = 0;
        let mut n = 0;
        while n <= bits {
            let chunk = (self.runif() * 65536.0).floor() as u64;
            v = v.wrapping_mul(65536).wrapping_add(chunk);
            n += 16;
        }
        v & ((1u64 << bits) - 1)
    }

    /// Uniform index in `0..n` by rejection sampling
    pub fn unif_index(&mut self, n: usize) -> usize {
        if n <= 1 {
            return 0;
        }
        let bits = (n as f64).log2().ceil() as u32;
        loop {
            let v = self.rbits(bits);
            if (v as usize) < n {
                return v as usize;
            }
        }
    }

    /// `k` distinct indices from `0..n` in draw order (`sample(n, k) - 1`)
    pub fn sample_without_replacement(&mut self, n: usize, k: usize) -> Vec<usize> {
        let k = k.min(n);
        let mut pool: Vec<usize> = (0..n).collect();
        let mut remaining = n;
        let mut drawn = Vec::with_capacity(k);
        for _ in 0..k {
            let j = self.unif_index(remaining);
            drawn.push(pool[j]);
            remaining -= 1;
            pool[j] = pool[remaining];
        }
        drawn
    }
}
