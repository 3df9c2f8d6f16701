//! Deterministic account addressing.
//!
//! Raffles live at `["raffle", owner, raffle_id]` and tickets at
//! `["ticket", raffle, ticket_id (big-endian u32)]`, both derived under the
//! program id. Any party can recompute them without a directory lookup.

use solana_program::pubkey::Pubkey;

use crate::error::RaffleError;

pub const RAFFLE_SEED: &[u8] = b"raffle";
pub const TICKET_SEED: &[u8] = b"ticket";

/// Longest raffle id that is stored and accepted as a seed
pub const MAX_RAFFLE_ID_LEN: usize = 30;

/// Rejects empty and oversized raffle ids.
pub fn validate_raffle_id(raffle_id: &str) -> Result<(), RaffleError> {
    if raffle_id.is_empty() || raffle_id.len() > MAX_RAFFLE_ID_LEN {
        return Err(RaffleError::InvalidRaffleId);
    }
    Ok(())
}

/// Find the program derived address of a raffle
pub fn find_raffle_address(
    program_id: &Pubkey,
    owner: &Pubkey,
    raffle_id: &str,
) -> Result<(Pubkey, u8), RaffleError> {
    validate_raffle_id(raffle_id)?;
    Ok(Pubkey::find_program_address(
        &[RAFFLE_SEED, owner.as_ref(), raffle_id.as_bytes()],
        program_id,
    ))
}

/// Find the program derived address of a ticket
pub fn find_ticket_address(program_id: &Pubkey, raffle: &Pubkey, ticket_id: u32) -> (Pubkey, u8) {
    Pubkey::find_program_address(
        &[TICKET_SEED, raffle.as_ref(), &ticket_id.to_be_bytes()],
        program_id,
    )
}

/// Re-derive a raffle address from its stored bump.
pub fn create_raffle_address(
    program_id: &Pubkey,
    owner: &Pubkey,
    raffle_id: &str,
    bump: u8,
) -> Result<Pubkey, RaffleError> {
    validate_raffle_id(raffle_id)?;
    Pubkey::create_program_address(
        &[RAFFLE_SEED, owner.as_ref(), raffle_id.as_bytes(), &[bump]],
        program_id,
    )
    .map_err(|_| RaffleError::AddressMismatch)
}

/// Re-derive a ticket address from its stored bump.
pub fn create_ticket_address(
    program_id: &Pubkey,
    raffle: &Pubkey,
    ticket_id: u32,
    bump: u8,
) -> Result<Pubkey, RaffleError> {
    Pubkey::create_program_address(
        &[TICKET_SEED, raffle.as_ref(), &ticket_id.to_be_bytes(), &[bump]],
        program_id,
    )
    .map_err(|_| RaffleError::AddressMismatch)
}

/// Fails with `AddressMismatch` unless `actual` is the expected derived key.
pub fn assert_address(actual: &Pubkey, expected: &Pubkey) -> Result<(), RaffleError> {
    if actual != expected {
        return Err(RaffleError::AddressMismatch);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raffle_address_is_deterministic_and_bound_to_owner() {
        let program_id = Pubkey::new_unique();
        let alice = Pubkey::new_unique();
        let bob = Pubkey::new_unique();

        let (a1, bump) = find_raffle_address(&program_id, &alice, "summer").unwrap();
        let (a2, _) = find_raffle_address(&program_id, &alice, "summer").unwrap();
        let (b, _) = find_raffle_address(&program_id, &bob, "summer").unwrap();
        let (other, _) = find_raffle_address(&program_id, &alice, "winter").unwrap();

        assert_eq!(a1, a2);
        assert_ne!(a1, b);
        assert_ne!(a1, other);
        assert!(!a1.is_on_curve());
        assert_eq!(
            create_raffle_address(&program_id, &alice, "summer", bump).unwrap(),
            a1
        );
    }

    #[test]
    fn raffle_id_bounds() {
        let program_id = Pubkey::new_unique();
        let owner = Pubkey::new_unique();
        assert_eq!(
            find_raffle_address(&program_id, &owner, "").unwrap_err(),
            RaffleError::InvalidRaffleId
        );
        let longest = "x".repeat(MAX_RAFFLE_ID_LEN);
        assert!(find_raffle_address(&program_id, &owner, &longest).is_ok());
        let too_long = "x".repeat(MAX_RAFFLE_ID_LEN + 1);
        assert_eq!(
            find_raffle_address(&program_id, &owner, &too_long).unwrap_err(),
            RaffleError::InvalidRaffleId
        );
    }

    #[test]
    fn ticket_address_uses_big_endian_id() {
        let program_id = Pubkey::new_unique();
        let raffle = Pubkey::new_unique();
        let (ticket, bump) = find_ticket_address(&program_id, &raffle, 1);

        let (expected, _) = Pubkey::find_program_address(
            &[TICKET_SEED, raffle.as_ref(), &[0, 0, 0, 1]],
            &program_id,
        );
        assert_eq!(ticket, expected);
        assert_ne!(ticket, find_ticket_address(&program_id, &raffle, 2).0);
        assert_eq!(
            create_ticket_address(&program_id, &raffle, 1, bump).unwrap(),
            ticket
        );
    }
}
