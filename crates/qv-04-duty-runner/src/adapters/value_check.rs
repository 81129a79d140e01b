//! Value check for duty consensus

use qv_02_instance::ValueCheck;
use shared_types::RoleType;

use crate::domain::ConsensusData;

/// Accepts encoded [`ConsensusData`] for one role with a non-empty payload.
#[derive(Debug, Clone, Copy)]
pub struct ConsensusDataCheck {
    pub role: RoleType,
}

impl ValueCheck for ConsensusDataCheck {
    fn check(&self, value: &[u8]) -> Result<(), String> {
        let input = ConsensusData::decode(value).map_err(|e| e.to_string())?;
        if input.duty.role != self.role {
            return Err(format!("{} duty for a {} pipeline", input.duty.role, self.role));
        }
        if input.data.is_empty() {
            return Err("empty duty data".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Duty;

    fn encoded(role: RoleType, data: &[u8]) -> Vec<u8> {
        ConsensusData {
            duty: Duty {
                role,
                slot: 1,
                validator_index: 0,
                committee_index: 0,
            },
            data: data.to_vec(),
        }
        .encode()
        .unwrap()
    }

    #[test]
    fn test_accepts_matching_role() {
        let check = ConsensusDataCheck { role: RoleType::Attester };
        assert!(check.check(&encoded(RoleType::Attester, b"x")).is_ok());
    }

    #[test]
    fn test_rejects_other_role_empty_data_and_garbage() {
        let check = ConsensusDataCheck { role: RoleType::Attester };
        assert!(check.check(&encoded(RoleType::Proposer, b"x")).is_err());
        assert!(check.check(&encoded(RoleType::Attester, b"")).is_err());
        assert!(check.check(b"not consensus data").is_err());
    }
}
