//! Outbound ports
//!
//! The instance depends on two capabilities: the signer
//! ([`shared_crypto::KeyManager`]) and a domain-specific check on proposed
//! values, run before a value is accepted as a proposal target.

/// Sanity check on a proposed value.
pub trait ValueCheck: Send + Sync {
    fn check(&self, value: &[u8]) -> Result<(), String>;
}

impl<F> ValueCheck for F
where
    F: Fn(&[u8]) -> Result<(), String> + Send + Sync,
{
    fn check(&self, value: &[u8]) -> Result<(), String> {
        self(value)
    }
}

/// Accepts any non-empty value.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAll;

impl ValueCheck for AcceptAll {
    fn check(&self, value: &[u8]) -> Result<(), String> {
        if value.is_empty() {
            return Err("empty value".into());
        }
        Ok(())
    }
}
