// Raffle escrow - instruction processor
use solana_program::{
    account_info::{next_account_info, AccountInfo},
    entrypoint::ProgramResult,
    msg,
    program::invoke,
    program_error::ProgramError,
    program_pack::Pack,
    pubkey::Pubkey,
    system_instruction,
    sysvar::{clock::Clock, rent::Rent, Sysvar},
};

use crate::{
    address::{
        assert_address, create_raffle_address, create_ticket_address, find_raffle_address,
        find_ticket_address, RAFFLE_SEED, TICKET_SEED,
    },
    error::RaffleError,
    instruction::RaffleInstruction,
    randomness::{latest_slot_hash, SeedContext, SlotHashEntropy},
    state::{Raffle, Ticket, RAFFLE_ACCOUNT_SIZE},
    utils::{
        assert_program_owned, assert_signer, assert_system_program, assert_writable,
        create_pda_account, is_unoccupied, lamports_to_sol, move_lamports,
    },
};

/// Program state handler.
pub struct Processor;

impl Processor {
    pub fn process(
        program_id: &Pubkey,
        accounts: &[AccountInfo],
        instruction_data: &[u8],
    ) -> ProgramResult {
        let instruction = RaffleInstruction::unpack(instruction_data)?;

        match instruction {
            RaffleInstruction::CreateRaffle {
                raffle_id,
                ticket_price,
                max_entries,
            } => {
                msg!("Instruction: Create Raffle");
                Self::process_create_raffle(accounts, raffle_id, ticket_price, max_entries, program_id)
            }
            RaffleInstruction::BuyTicket { raffle_id, ticket_id } => {
                msg!("Instruction: Buy Ticket");
                Self::process_buy_ticket(accounts, raffle_id, ticket_id, program_id)
            }
            RaffleInstruction::PickWinner { raffle_id } => {
                msg!("Instruction: Pick Winner");
                Self::process_pick_winner(accounts, raffle_id, program_id)
            }
            RaffleInstruction::ClaimPrize { raffle_id } => {
                msg!("Instruction: Claim Prize");
                Self::process_claim_prize(accounts, raffle_id, program_id)
            }
        }
    }

    /// Process the CreateRaffle instruction
    ///
    /// Allocates the raffle at its derived address. Re-using an id fails
    /// instead of overwriting the existing raffle.
    fn process_create_raffle(
        accounts: &[AccountInfo],
        raffle_id: String,
        ticket_price: u64,
        max_entries: u32,
        program_id: &Pubkey,
    ) -> ProgramResult {
        let account_info_iter = &mut accounts.iter();
        let owner_info = next_account_info(account_info_iter)?;
        let raffle_info = next_account_info(account_info_iter)?;
        let system_program_info = next_account_info(account_info_iter)?;

        assert_signer(owner_info)?;
        assert_writable(raffle_info)?;
        assert_system_program(system_program_info)?;

        let (expected_raffle, bump_seed) = find_raffle_address(program_id, owner_info.key, &raffle_id)?;

        let clock = Clock::get()?;
        let raffle = Raffle::new(
            *owner_info.key,
            raffle_id,
            ticket_price,
            max_entries,
            clock.unix_timestamp,
            bump_seed,
        )?;

        assert_address(raffle_info.key, &expected_raffle)?;
        if !is_unoccupied(raffle_info) {
            msg!("Raffle {} already exists", raffle_info.key);
            return Err(RaffleError::AlreadyExists.into());
        }

        let rent = Rent::get()?;
        let bump = [bump_seed];
        create_pda_account(
            owner_info,
            raffle_info,
            system_program_info,
            program_id,
            &rent,
            RAFFLE_ACCOUNT_SIZE,
            &[
                RAFFLE_SEED,
                owner_info.key.as_ref(),
                raffle.raffle_id.as_bytes(),
                &bump,
            ],
        )?;

        raffle.pack(&mut raffle_info.try_borrow_mut_data()?)?;

        msg!(
            "Raffle created: id={}, address={}, price={} SOL, max_entries={}",
            raffle.raffle_id,
            raffle_info.key,
            lamports_to_sol(raffle.ticket_price),
            raffle.max_entries
        );
        Ok(())
    }

    /// Process the BuyTicket instruction
    ///
    /// Moves the ticket price into the raffle's custody, issues the ticket
    /// named by the buyer and counts it, all within this one instruction.
    fn process_buy_ticket(
        accounts: &[AccountInfo],
        raffle_id: String,
        ticket_id: u32,
        program_id: &Pubkey,
    ) -> ProgramResult {
        let account_info_iter = &mut accounts.iter();
        let buyer_info = next_account_info(account_info_iter)?;
        let raffle_info = next_account_info(account_info_iter)?;
        let ticket_info = next_account_info(account_info_iter)?;
        let system_program_info = next_account_info(account_info_iter)?;

        assert_signer(buyer_info)?;
        assert_writable(buyer_info)?;
        assert_writable(raffle_info)?;
        assert_writable(ticket_info)?;
        assert_system_program(system_program_info)?;

        let mut raffle = Self::load_raffle(program_id, raffle_info, &raffle_id)?;

        let ticket_id = raffle.validate_purchase(ticket_id).map_err(|err| {
            if err == RaffleError::TicketIdMismatch {
                msg!(
                    "Ticket {} requested but the next ticket is {}",
                    ticket_id,
                    raffle.entries.saturating_add(1)
                );
            }
            err
        })?;

        let (expected_ticket, ticket_bump) = find_ticket_address(program_id, raffle_info.key, ticket_id);
        assert_address(ticket_info.key, &expected_ticket)?;
        if !is_unoccupied(ticket_info) {
            msg!("Ticket {} already exists", ticket_info.key);
            return Err(RaffleError::AlreadyExists.into());
        }

        let rent = Rent::get()?;
        let required = raffle
            .ticket_price
            .checked_add(rent.minimum_balance(Ticket::LEN))
            .ok_or(RaffleError::MathOverflow)?;
        if buyer_info.lamports() < required {
            msg!(
                "Insufficient funds: needed {} lamports, had {} lamports",
                required,
                buyer_info.lamports()
            );
            return Err(RaffleError::InsufficientFunds.into());
        }

        msg!("Transferring {} lamports from buyer to raffle", raffle.ticket_price);
        invoke(
            &system_instruction::transfer(buyer_info.key, raffle_info.key, raffle.ticket_price),
            &[
                buyer_info.clone(),
                raffle_info.clone(),
                system_program_info.clone(),
            ],
        )?;

        let ticket_id_bytes = ticket_id.to_be_bytes();
        let bump = [ticket_bump];
        create_pda_account(
            buyer_info,
            ticket_info,
            system_program_info,
            program_id,
            &rent,
            Ticket::LEN,
            &[TICKET_SEED, raffle_info.key.as_ref(), &ticket_id_bytes, &bump],
        )?;

        let ticket = Ticket {
            raffle: *raffle_info.key,
            ticket_id,
            owner: *buyer_info.key,
            bump: ticket_bump,
        };
        Ticket::pack(ticket, &mut ticket_info.try_borrow_mut_data()?)?;

        raffle.record_purchase()?;
        raffle.pack(&mut raffle_info.try_borrow_mut_data()?)?;

        msg!(
            "Ticket {} purchased successfully ({}/{})",
            ticket_id,
            raffle.entries,
            raffle.max_entries
        );
        Ok(())
    }

    /// Process the PickWinner instruction
    ///
    /// Only the owner of a full raffle may draw. The seed context is logged
    /// in full so anyone can recompute the winning ticket.
    fn process_pick_winner(
        accounts: &[AccountInfo],
        raffle_id: String,
        program_id: &Pubkey,
    ) -> ProgramResult {
        let account_info_iter = &mut accounts.iter();
        let caller_info = next_account_info(account_info_iter)?;
        let raffle_info = next_account_info(account_info_iter)?;
        let slot_hashes_info = next_account_info(account_info_iter)?;

        assert_signer(caller_info)?;
        assert_writable(raffle_info)?;

        let mut raffle = Self::load_raffle(program_id, raffle_info, &raffle_id)?;
        raffle.validate_pick(caller_info.key)?;

        let clock = Clock::get()?;
        let (recent_slot, recent_hash) = latest_slot_hash(slot_hashes_info)?;
        let seed = SeedContext {
            raffle: *raffle_info.key,
            entries: raffle.entries,
            slot: clock.slot,
            unix_timestamp: clock.unix_timestamp,
            recent_slot,
            recent_hash,
        };

        let winner_ticket = raffle.draw(caller_info.key, &SlotHashEntropy, &seed)?;
        raffle.pack(&mut raffle_info.try_borrow_mut_data()?)?;

        msg!("Winner drawn: ticket {} ({})", winner_ticket, seed);
        Ok(())
    }

    /// Process the ClaimPrize instruction
    ///
    /// Pays `ticket_price * entries` to the holder of the winning ticket.
    /// The raffle keeps its rent-exempt reserve.
    fn process_claim_prize(
        accounts: &[AccountInfo],
        raffle_id: String,
        program_id: &Pubkey,
    ) -> ProgramResult {
        let account_info_iter = &mut accounts.iter();
        let claimant_info = next_account_info(account_info_iter)?;
        let raffle_info = next_account_info(account_info_iter)?;
        let ticket_info = next_account_info(account_info_iter)?;

        assert_signer(claimant_info)?;
        assert_writable(claimant_info)?;
        assert_writable(raffle_info)?;

        let mut raffle = Self::load_raffle(program_id, raffle_info, &raffle_id)?;

        assert_program_owned(ticket_info, program_id)?;
        let ticket = Ticket::unpack_unchecked(&ticket_info.try_borrow_data()?)?;
        let expected_ticket = create_ticket_address(program_id, &ticket.raffle, ticket.ticket_id, ticket.bump)?;
        assert_address(ticket_info.key, &expected_ticket)?;

        let prize_amount = raffle.validate_claim(raffle_info.key, &ticket, claimant_info.key)?;

        let rent = Rent::get()?;
        let reserve = rent.minimum_balance(raffle_info.data_len());
        let available = raffle_info.lamports().saturating_sub(reserve);
        if available < prize_amount {
            msg!(
                "Raffle custody holds {} lamports above its reserve, prize is {}",
                available,
                prize_amount
            );
            return Err(RaffleError::InsufficientFunds.into());
        }

        move_lamports(raffle_info, claimant_info, prize_amount)?;

        raffle.record_claim();
        raffle.pack(&mut raffle_info.try_borrow_mut_data()?)?;

        msg!(
            "Prize of {} SOL claimed by {} with ticket {}",
            lamports_to_sol(prize_amount),
            claimant_info.key,
            ticket.ticket_id
        );
        Ok(())
    }

    /// Loads a raffle and checks that it lives at its derived address for `raffle_id`.
    fn load_raffle(
        program_id: &Pubkey,
        raffle_info: &AccountInfo,
        raffle_id: &str,
    ) -> Result<Raffle, ProgramError> {
        assert_program_owned(raffle_info, program_id)?;
        let raffle = Raffle::unpack(&raffle_info.try_borrow_data()?)?;

        if raffle.raffle_id != raffle_id {
            msg!("Raffle {} has id {}, not {}", raffle_info.key, raffle.raffle_id, raffle_id);
            return Err(RaffleError::AddressMismatch.into());
        }
        let expected = create_raffle_address(program_id, &raffle.owner, &raffle.raffle_id, raffle.bump)?;
        assert_address(raffle_info.key, &expected)?;
        Ok(raffle)
    }
}
