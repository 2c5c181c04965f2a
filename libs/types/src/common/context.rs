//! Call context supplied by the host for every state-changing call

use crate::common::errors::{ExchangeError, Result};
use crate::common::identifiers::Address;
use serde::{Deserialize, Serialize};

/// Who is calling, and at which point of the host chain
///
/// The engine has no clock of its own. The host passes the current block
/// height (for the MEV window) and UNIX timestamp (for deadlines).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallContext {
    pub caller: Address,
    pub block_number: u64,
    pub timestamp: u64,
}

impl CallContext {
    pub fn new(caller: Address, block_number: u64, timestamp: u64) -> Self {
        Self {
            caller,
            block_number,
            timestamp,
        }
    }

    /// Fails with [`ExchangeError::Expired`] once `timestamp > deadline`
    pub fn ensure_not_expired(&self, deadline: u64) -> Result<()> {
        if self.timestamp > deadline {
            return Err(ExchangeError::Expired {
                deadline,
                now: self.timestamp,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deadline_is_inclusive() {
        let ctx = CallContext::new(Address::from_low_u64_be(1), 10, 1_000);
        assert!(ctx.ensure_not_expired(1_000).is_ok());
        assert!(ctx.ensure_not_expired(1_001).is_ok());
        assert_eq!(
            ctx.ensure_not_expired(999),
            Err(ExchangeError::Expired {
                deadline: 999,
                now: 1_000
            })
        );
    }
}
