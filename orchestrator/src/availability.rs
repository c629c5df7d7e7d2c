use std::fmt;

use rand::{SeedableRng, distr::Bernoulli, prelude::Distribution, rngs::StdRng};

use crate::error::{OrchestratorError, Result};

/// Which workers take part in a round, indexed by worker id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilityMask(Vec<bool>);

impl AvailabilityMask {
    pub fn new(mask: Vec<bool>) -> Self {
        Self(mask)
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns `true` if the worker takes part in the round.
    pub fn is_available(&self, worker_id: usize) -> bool {
        self.0.get(worker_id).copied().unwrap_or(false)
    }

    /// Returns the amount of available workers.
    pub fn count(&self) -> usize {
        self.0.iter().filter(|available| **available).count()
    }
}

impl fmt::Display for AvailabilityMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bits: Vec<_> = self
            .0
            .iter()
            .map(|available| if *available { "1" } else { "0" })
            .collect();

        write!(f, "[{}]", bits.join(" "))
    }
}

/// Draws the availability of every worker, independently and with the same probability.
#[derive(Debug, Clone)]
pub struct AvailabilitySampler {
    distribution: Bernoulli,
    rng: StdRng,
}

impl AvailabilitySampler {
    /// Creates a new `AvailabilitySampler`.
    ///
    /// # Arguments
    /// * `p` - The probability of a worker being available in a round.
    /// * `seed` - The seed of the random number generator.
    ///
    /// # Returns
    /// A new sampler or an error if `p` is not in `[0, 1]`.
    pub fn new(p: f64, seed: u64) -> Result<Self> {
        let distribution = Bernoulli::new(p).map_err(|_| {
            OrchestratorError::InvalidConfig(format!("p_available ({p}) must be in [0, 1]"))
        })?;

        Ok(Self {
            distribution,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    /// Draws a fresh mask for `n` workers.
    pub fn sample(&mut self, n: usize) -> AvailabilityMask {
        let mask = (0..n)
            .map(|_| self.distribution.sample(&mut self.rng))
            .collect();

        AvailabilityMask(mask)
    }

    /// Restarts the random stream from `seed`.
    pub fn reseed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displays_as_bits() {
        let mask = AvailabilityMask::new(vec![true, false, true, true]);
        assert_eq!(mask.to_string(), "[1 0 1 1]");
        assert_eq!(mask.count(), 3);
        assert!(!mask.is_available(1));
        assert!(!mask.is_available(10));
    }

    #[test]
    fn invalid_probabilities_fail() {
        assert!(AvailabilitySampler::new(-0.1, 0).is_err());
        assert!(AvailabilitySampler::new(1.5, 0).is_err());
        assert!(AvailabilitySampler::new(f64::NAN, 0).is_err());
    }
}
