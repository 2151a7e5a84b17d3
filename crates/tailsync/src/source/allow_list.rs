use std::collections::BTreeSet;

/// Contracts a feed is restricted to.
///
/// Entries are normalized to lowercase. An empty list allows every contract.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContractAllowList {
    contracts: BTreeSet<String>,
}

impl ContractAllowList {
    pub fn new<I, S>(contracts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            contracts: contracts
                .into_iter()
                .map(|c| c.as_ref().trim().to_lowercase())
                .filter(|c| !c.is_empty())
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }

    pub fn allows(&self, contract: &str) -> bool {
        self.contracts.is_empty() || self.contracts.contains(&contract.to_lowercase())
    }

    /// Contracts in sorted order, for query construction.
    pub fn to_vec(&self) -> Vec<String> {
        self.contracts.iter().cloned().collect()
    }
}
