use serde::{Deserialize, Serialize};

/// Activation height of a single fork.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fork(pub u64);

impl Fork {
    /// Whether `block` is exactly the activation point.
    pub fn on(&self, block: u64) -> bool {
        block == self.0
    }

    /// Whether the fork is active at `block`.
    pub fn active(&self, block: u64) -> bool {
        block >= self.0
    }
}

/// The fork schedule. Absent entries never activate.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Forks {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homestead: Option<Fork>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub byzantium: Option<Fork>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constantinople: Option<Fork>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub petersburg: Option<Fork>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub istanbul: Option<Fork>,
    #[serde(default, rename = "EIP150", skip_serializing_if = "Option::is_none")]
    pub eip150: Option<Fork>,
    #[serde(default, rename = "EIP155", skip_serializing_if = "Option::is_none")]
    pub eip155: Option<Fork>,
    #[serde(default, rename = "EIP158", skip_serializing_if = "Option::is_none")]
    pub eip158: Option<Fork>,
    /// Test-network only precursor of portland.
    #[serde(default, rename = "pre-portland", skip_serializing_if = "Option::is_none")]
    pub preportland: Option<Fork>,
    /// Bridge hardfork.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub portland: Option<Fork>,
    /// Proof-of-stake hardfork introducing system transactions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detroit: Option<Fork>,
}

fn active(fork: &Option<Fork>, block: u64) -> bool {
    fork.map(|f| f.active(block)).unwrap_or(false)
}

fn on(fork: &Option<Fork>, block: u64) -> bool {
    fork.map(|f| f.on(block)).unwrap_or(false)
}

impl Forks {
    /// Resolves the schedule into the set of rules in force at `block`.
    pub fn at(&self, block: u64) -> ForksInTime {
        ForksInTime {
            homestead: active(&self.homestead, block),
            byzantium: active(&self.byzantium, block),
            constantinople: active(&self.constantinople, block),
            petersburg: active(&self.petersburg, block),
            istanbul: active(&self.istanbul, block),
            eip150: active(&self.eip150, block),
            eip155: active(&self.eip155, block),
            eip158: active(&self.eip158, block),
            preportland: active(&self.preportland, block),
            portland: active(&self.portland, block),
            detroit: active(&self.detroit, block),
        }
    }

    pub fn is_detroit(&self, block: u64) -> bool {
        active(&self.detroit, block)
    }

    pub fn is_on_detroit(&self, block: u64) -> bool {
        on(&self.detroit, block)
    }

    /// All forks active from genesis. Handy default for tests and private
    /// networks.
    pub fn all_at_genesis() -> Self {
        Self {
            homestead: Some(Fork(0)),
            byzantium: Some(Fork(0)),
            constantinople: Some(Fork(0)),
            petersburg: Some(Fork(0)),
            istanbul: Some(Fork(0)),
            eip150: Some(Fork(0)),
            eip155: Some(Fork(0)),
            eip158: Some(Fork(0)),
            preportland: None,
            portland: Some(Fork(0)),
            detroit: Some(Fork(0)),
        }
    }
}

/// The rules in force at one particular block height.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ForksInTime {
    pub homestead: bool,
    pub byzantium: bool,
    pub constantinople: bool,
    pub petersburg: bool,
    pub istanbul: bool,
    pub eip150: bool,
    pub eip155: bool,
    pub eip158: bool,
    pub preportland: bool,
    pub portland: bool,
    pub detroit: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activation_boundaries() {
        let forks = Forks { detroit: Some(Fork(10)), ..Default::default() };
        assert!(!forks.is_detroit(9));
        assert!(forks.is_detroit(10));
        assert!(forks.is_detroit(11));
        assert!(forks.is_on_detroit(10));
        assert!(!forks.is_on_detroit(11));
    }

    #[test]
    fn absent_forks_never_activate() {
        let forks = Forks::default();
        assert_eq!(forks.at(u64::MAX), ForksInTime::default());
    }
}
