use solana_program::{
    instruction::{AccountMeta, Instruction},
    program_error::ProgramError,
    pubkey::Pubkey,
    system_program,
    sysvar::slot_hashes,
};
use std::convert::TryInto;

use crate::{
    address::{find_raffle_address, find_ticket_address},
    error::RaffleError,
};

#[derive(Clone, Debug, PartialEq)]
pub enum RaffleInstruction {
    /// Create a raffle at the address derived from (owner, raffle_id)
    ///
    /// Accounts expected:
    /// 0. `[signer, writable]` The owner, pays for the raffle account
    /// 1. `[writable]` The raffle account (PDA), must be unoccupied
    /// 2. `[]` The system program
    CreateRaffle {
        /// Owner-chosen identifier, 1..=30 bytes
        raffle_id: String,
        /// Price per ticket in lamports
        ticket_price: u64,
        /// Number of tickets to sell before the draw
        max_entries: u32,
    },

    /// Buy the next ticket of a raffle
    ///
    /// Accounts expected:
    /// 0. `[signer, writable]` The buyer, pays the ticket price and the ticket account
    /// 1. `[writable]` The raffle account
    /// 2. `[writable]` The ticket account (PDA of raffle and ticket_id)
    /// 3. `[]` The system program
    BuyTicket {
        raffle_id: String,
        /// Must equal the raffle's `entries + 1`
        ticket_id: u32,
    },

    /// Draw the winning ticket of a full raffle
    ///
    /// Accounts expected:
    /// 0. `[signer]` The raffle owner
    /// 1. `[writable]` The raffle account
    /// 2. `[]` The SlotHashes sysvar
    PickWinner { raffle_id: String },

    /// Pay the pooled ticket revenue to the holder of the winning ticket
    ///
    /// Accounts expected:
    /// 0. `[signer, writable]` The winner
    /// 1. `[writable]` The raffle account
    /// 2. `[]` The winning ticket account
    ClaimPrize { raffle_id: String },
}

impl RaffleInstruction {
    /// Unpacks a byte buffer into a RaffleInstruction
    pub fn unpack(input: &[u8]) -> Result<Self, ProgramError> {
        let (&tag, rest) = input.split_first().ok_or(RaffleError::InvalidInstruction)?;

        Ok(match tag {
            0 => {
                let (raffle_id, rest) = Self::unpack_string(rest)?;
                let (ticket_price, rest) = Self::unpack_u64(rest)?;
                let (max_entries, _) = Self::unpack_u32(rest)?;
                Self::CreateRaffle {
                    raffle_id,
                    ticket_price,
                    max_entries,
                }
            }
            1 => {
                let (raffle_id, rest) = Self::unpack_string(rest)?;
                let (ticket_id, _) = Self::unpack_u32(rest)?;
                Self::BuyTicket { raffle_id, ticket_id }
            }
            2 => {
                let (raffle_id, _) = Self::unpack_string(rest)?;
                Self::PickWinner { raffle_id }
            }
            3 => {
                let (raffle_id, _) = Self::unpack_string(rest)?;
                Self::ClaimPrize { raffle_id }
            }
            _ => return Err(RaffleError::InvalidInstruction.into()),
        })
    }

    /// Packs a RaffleInstruction into a byte buffer
    pub fn pack(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        match self {
            Self::CreateRaffle {
                raffle_id,
                ticket_price,
                max_entries,
            } => {
                buf.push(0);
                Self::pack_string(&mut buf, raffle_id);
                buf.extend_from_slice(&ticket_price.to_le_bytes());
                buf.extend_from_slice(&max_entries.to_le_bytes());
            }
            Self::BuyTicket { raffle_id, ticket_id } => {
                buf.push(1);
                Self::pack_string(&mut buf, raffle_id);
                buf.extend_from_slice(&ticket_id.to_le_bytes());
            }
            Self::PickWinner { raffle_id } => {
                buf.push(2);
                Self::pack_string(&mut buf, raffle_id);
            }
            Self::ClaimPrize { raffle_id } => {
                buf.push(3);
                Self::pack_string(&mut buf, raffle_id);
            }
        }
        buf
    }

    fn unpack_u64(input: &[u8]) -> Result<(u64, &[u8]), ProgramError> {
        let value = input
            .get(..8)
            .and_then(|slice| slice.try_into().ok())
            .map(u64::from_le_bytes)
            .ok_or(RaffleError::InvalidInstruction)?;
        Ok((value, &input[8..]))
    }

    fn unpack_u32(input: &[u8]) -> Result<(u32, &[u8]), ProgramError> {
        let value = input
            .get(..4)
            .and_then(|slice| slice.try_into().ok())
            .map(u32::from_le_bytes)
            .ok_or(RaffleError::InvalidInstruction)?;
        Ok((value, &input[4..]))
    }

    fn unpack_string(input: &[u8]) -> Result<(String, &[u8]), ProgramError> {
        let (len, rest) = Self::unpack_u32(input)?;
        let len = len as usize;
        let bytes = rest.get(..len).ok_or(RaffleError::InvalidInstruction)?;
        let value = String::from_utf8(bytes.to_vec()).map_err(|_| RaffleError::InvalidInstruction)?;
        Ok((value, &rest[len..]))
    }

    fn pack_string(buf: &mut Vec<u8>, value: &str) {
        buf.extend_from_slice(&(value.len() as u32).to_le_bytes());
        buf.extend_from_slice(value.as_bytes());
    }
}

/// Create a create_raffle instruction
pub fn create_raffle(
    program_id: &Pubkey,
    owner: &Pubkey,
    raffle_id: &str,
    ticket_price: u64,
    max_entries: u32,
) -> Result<Instruction, ProgramError> {
    let (raffle, _) = find_raffle_address(program_id, owner, raffle_id)?;
    let data = RaffleInstruction::CreateRaffle {
        raffle_id: raffle_id.to_string(),
        ticket_price,
        max_entries,
    }
    .pack();

    let accounts = vec![
        AccountMeta::new(*owner, true),
        AccountMeta::new(raffle, false),
        AccountMeta::new_readonly(system_program::id(), false),
    ];

    Ok(Instruction {
        program_id: *program_id,
        accounts,
        data,
    })
}

/// Create a buy_ticket instruction claiming `ticket_id`
pub fn buy_ticket(
    program_id: &Pubkey,
    buyer: &Pubkey,
    raffle_owner: &Pubkey,
    raffle_id: &str,
    ticket_id: u32,
) -> Result<Instruction, ProgramError> {
    let (raffle, _) = find_raffle_address(program_id, raffle_owner, raffle_id)?;
    let (ticket, _) = find_ticket_address(program_id, &raffle, ticket_id);
    let data = RaffleInstruction::BuyTicket {
        raffle_id: raffle_id.to_string(),
        ticket_id,
    }
    .pack();

    let accounts = vec![
        AccountMeta::new(*buyer, true),
        AccountMeta::new(raffle, false),
        AccountMeta::new(ticket, false),
        AccountMeta::new_readonly(system_program::id(), false),
    ];

    Ok(Instruction {
        program_id: *program_id,
        accounts,
        data,
    })
}

/// Create a pick_winner instruction signed by `caller`
pub fn pick_winner(
    program_id: &Pubkey,
    caller: &Pubkey,
    raffle_owner: &Pubkey,
    raffle_id: &str,
) -> Result<Instruction, ProgramError> {
    let (raffle, _) = find_raffle_address(program_id, raffle_owner, raffle_id)?;
    let data = RaffleInstruction::PickWinner {
        raffle_id: raffle_id.to_string(),
    }
    .pack();

    let accounts = vec![
        AccountMeta::new_readonly(*caller, true),
        AccountMeta::new(raffle, false),
        AccountMeta::new_readonly(slot_hashes::id(), false),
    ];

    Ok(Instruction {
        program_id: *program_id,
        accounts,
        data,
    })
}

/// Create a claim_prize instruction for the holder of `winning_ticket`
pub fn claim_prize(
    program_id: &Pubkey,
    claimant: &Pubkey,
    raffle_owner: &Pubkey,
    raffle_id: &str,
    winning_ticket: u32,
) -> Result<Instruction, ProgramError> {
    let (raffle, _) = find_raffle_address(program_id, raffle_owner, raffle_id)?;
    let (ticket, _) = find_ticket_address(program_id, &raffle, winning_ticket);
    let data = RaffleInstruction::ClaimPrize {
        raffle_id: raffle_id.to_string(),
    }
    .pack();

    let accounts = vec![
        AccountMeta::new(*claimant, true),
        AccountMeta::new(raffle, false),
        AccountMeta::new_readonly(ticket, false),
    ];

    Ok(Instruction {
        program_id: *program_id,
        accounts,
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_raffle_wire_format() {
        let packed = RaffleInstruction::CreateRaffle {
            raffle_id: "abc".to_string(),
            ticket_price: 100,
            max_entries: 2,
        }
        .pack();

        let mut expected = vec![0, 3, 0, 0, 0, b'a', b'b', b'c'];
        expected.extend_from_slice(&100u64.to_le_bytes());
        expected.extend_from_slice(&2u32.to_le_bytes());
        assert_eq!(packed, expected);
        assert_eq!(
            RaffleInstruction::unpack(&packed).unwrap(),
            RaffleInstruction::CreateRaffle {
                raffle_id: "abc".to_string(),
                ticket_price: 100,
                max_entries: 2,
            }
        );
    }

    #[test]
    fn malformed_data_is_rejected() {
        let invalid = ProgramError::from(RaffleError::InvalidInstruction);
        assert_eq!(RaffleInstruction::unpack(&[]).unwrap_err(), invalid);
        assert_eq!(RaffleInstruction::unpack(&[9]).unwrap_err(), invalid);
        // string length runs past the buffer
        assert_eq!(RaffleInstruction::unpack(&[2, 5, 0, 0, 0, b'a']).unwrap_err(), invalid);
        // missing ticket id
        assert_eq!(RaffleInstruction::unpack(&[1, 1, 0, 0, 0, b'a', 1]).unwrap_err(), invalid);
        // invalid utf-8
        assert_eq!(RaffleInstruction::unpack(&[3, 1, 0, 0, 0, 0xff]).unwrap_err(), invalid);
    }

    #[test]
    fn builders_derive_accounts() {
        let program_id = Pubkey::new_unique();
        let owner = Pubkey::new_unique();
        let buyer = Pubkey::new_unique();
        let (raffle, _) = find_raffle_address(&program_id, &owner, "r1").unwrap();
        let (ticket, _) = find_ticket_address(&program_id, &raffle, 3);

        let ix = buy_ticket(&program_id, &buyer, &owner, "r1", 3).unwrap();
        assert_eq!(ix.accounts[0], AccountMeta::new(buyer, true));
        assert_eq!(ix.accounts[1].pubkey, raffle);
        assert_eq!(ix.accounts[2].pubkey, ticket);
        assert_eq!(
            RaffleInstruction::unpack(&ix.data).unwrap(),
            RaffleInstruction::BuyTicket {
                raffle_id: "r1".to_string(),
                ticket_id: 3
            }
        );

        let ix = pick_winner(&program_id, &owner, &owner, "r1").unwrap();
        assert_eq!(ix.accounts[2].pubkey, slot_hashes::id());

        assert_eq!(
            create_raffle(&program_id, &owner, "", 1, 1).unwrap_err(),
            ProgramError::from(RaffleError::InvalidRaffleId)
        );
    }
}
