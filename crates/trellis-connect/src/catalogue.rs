//! Dataset discovery: turning a symbolic reference into an engine URL.

use crate::error::{ConnectorError, Result};

/// Looks up the engine URL a named dataset lives at.
pub trait Catalogue: Send + Sync {
    fn lookup(&self, reference: &str) -> Result<String>;
}

/// The catalogue used when none is configured. Every lookup fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCatalogue;

impl Catalogue for NoCatalogue {
    fn lookup(&self, reference: &str) -> Result<String> {
        Err(ConnectorError::Unresolvable(format!(
            "dataset discovery is not available, cannot look up '{}'",
            reference
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_catalogue_is_unresolvable() {
        let err = NoCatalogue.lookup("Deadly Animals").unwrap_err();
        assert!(matches!(err, ConnectorError::Unresolvable(_)));
        assert!(err.to_string().contains("Deadly Animals"));
    }
}
