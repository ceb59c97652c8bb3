//! Random number generation utilities.

pub use rand_core::{CryptoRng, OsRng, RngCore};

/// A succinct trait alias for a Cryptographically Secure PRNG.
pub trait Crng: RngCore + CryptoRng {}

impl<R: RngCore + CryptoRng> Crng for R {}
