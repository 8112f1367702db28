//! Fault parameters of a replica set
//!
//! A pool of `n` replicas tolerates `f = (n - 1) / 3` Byzantine members. The
//! client needs `f + 1` connections (and `f + 1` matching replies) to exclude
//! the possibility that everyone it heard from is faulty.

use crate::{Error, Result};
use serde::Serialize;

/// Derived fault tolerance of the current replica set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FaultParameters {
    /// Configured replicas
    pub total_replicas: usize,

    /// Maximum faulty replicas tolerated
    pub f: usize,

    /// Connections needed before requests are dispatched
    pub min_required_connections: usize,
}

impl FaultParameters {
    /// Derive parameters from the replica set size
    pub fn derive(total_replicas: usize) -> Result<Self> {
        if total_replicas < 1 {
            return Err(Error::InvalidTopology { total_replicas });
        }

        let f = (total_replicas - 1) / 3;
        Ok(Self {
            total_replicas,
            f,
            min_required_connections: f + 1,
        })
    }

    /// Smallest reply set that cannot be entirely faulty
    pub fn quorum(&self) -> usize {
        self.f + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_four_replicas() {
        let params = FaultParameters::derive(4).unwrap();
        assert_eq!(params.f, 1);
        assert_eq!(params.min_required_connections, 2);
    }

    #[test]
    fn test_seven_replicas() {
        let params = FaultParameters::derive(7).unwrap();
        assert_eq!(params.f, 2);
        assert_eq!(params.min_required_connections, 3);
    }

    #[test]
    fn test_small_pools_tolerate_nothing() {
        for n in 1..=3 {
            let params = FaultParameters::derive(n).unwrap();
            assert_eq!(params.f, 0);
            assert_eq!(params.quorum(), 1);
        }
    }

    #[test]
    fn test_empty_pool_rejected() {
        assert!(matches!(
            FaultParameters::derive(0),
            Err(Error::InvalidTopology { total_replicas: 0 })
        ));
    }
}
