//! Picking random subsets of the simulated fleet.
//!
//! Sampling only yields host indices; turning them into filter strings is left to each
//! dialect, see [`host_name`].

use rand::{seq::index, Rng};
use snafu::{ensure, Snafu};
use std::fmt;

/// Errors that may happen while sampling hosts
#[derive(Snafu, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// More hosts were requested than the fleet has
    #[snafu(display("cannot sample {requested} hosts from a fleet of {scale_var}"))]
    TooManyHosts {
        /// Number of hosts requested
        requested: usize,
        /// Size of the fleet
        scale_var: usize,
    },
}

/// Result type for host sampling
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Return `k` distinct host indices drawn uniformly without replacement from
/// `[0, scale_var)`, in random order.
///
/// Equivalent to the first `k` entries of a random permutation of the fleet.
pub fn sample_hosts<R>(rng: &mut R, scale_var: usize, k: usize) -> Result<Vec<usize>>
where
    R: Rng + ?Sized,
{
    ensure!(
        k <= scale_var,
        TooManyHostsSnafu {
            requested: k,
            scale_var
        }
    );
    Ok(index::sample(rng, scale_var, k).into_vec())
}

/// The name of host `n` of the simulated fleet, e.g. `host_7`.
pub fn host_name(n: usize) -> impl fmt::Display {
    HostName(n)
}

struct HostName(usize);

impl fmt::Display for HostName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "host_{}", self.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use proptest::prelude::*;
    use rand::{rngs::SmallRng, SeedableRng};
    use std::collections::{BTreeSet, HashSet};

    #[test]
    fn too_many_hosts() {
        let mut rng = SmallRng::seed_from_u64(0);
        assert_eq!(
            sample_hosts(&mut rng, 8, 9).unwrap_err(),
            Error::TooManyHosts {
                requested: 9,
                scale_var: 8
            }
        );
        assert_eq!(
            sample_hosts(&mut rng, 0, 1).unwrap_err().to_string(),
            "cannot sample 1 hosts from a fleet of 0"
        );
    }

    #[test]
    fn empty_and_full_samples() {
        let mut rng = SmallRng::seed_from_u64(0);
        assert!(sample_hosts(&mut rng, 0, 0).unwrap().is_empty());

        let all: BTreeSet<_> = sample_hosts(&mut rng, 16, 16).unwrap().into_iter().collect();
        assert_eq!(all, (0..16).collect());
    }

    #[test]
    fn selections_vary() {
        let mut rng = SmallRng::seed_from_u64(42);
        let selections: HashSet<_> = (0..50)
            .map(|_| sample_hosts(&mut rng, 100, 4).unwrap())
            .collect();
        assert!(selections.len() > 40, "{} distinct selections", selections.len());
    }

    #[test]
    fn every_host_gets_picked() {
        let mut rng = SmallRng::seed_from_u64(7);
        let mut counts = [0usize; 10];
        for _ in 0..10_000 {
            for n in sample_hosts(&mut rng, 10, 3).unwrap() {
                counts[n] += 1;
            }
        }
        // each host is expected 3000 times
        for (n, count) in counts.iter().enumerate() {
            assert!((2500..3500).contains(count), "host {n} picked {count} times");
        }
    }

    #[test]
    fn host_names() {
        assert_eq!(host_name(0).to_string(), "host_0");
        assert_eq!(host_name(31).to_string(), "host_31");
    }

    proptest! {
        #[test]
        fn samples_are_distinct_and_in_range(
            (scale_var, k) in (0usize..500).prop_flat_map(|n| (Just(n), 0..=n)),
            seed in any::<u64>(),
        ) {
            let mut rng = SmallRng::seed_from_u64(seed);
            let hosts = sample_hosts(&mut rng, scale_var, k).unwrap();

            prop_assert_eq!(hosts.len(), k);
            prop_assert!(hosts.iter().all(|&n| n < scale_var));
            let distinct: HashSet<_> = hosts.iter().collect();
            prop_assert_eq!(distinct.len(), k);
        }
    }
}
