// Raffle escrow program
// Fixed-price numbered tickets, a draw once the raffle is full, and a payout to the winner

pub mod address;
pub mod error;
pub mod instruction;
pub mod processor;
pub mod randomness;
pub mod state;
pub mod utils;

#[cfg(not(target_os = "solana"))]
pub mod client;

#[cfg(not(feature = "no-entrypoint"))]
pub mod entrypoint;

use solana_program::{
    account_info::AccountInfo, entrypoint::ProgramResult, msg, program_error::ProgramError,
    pubkey::Pubkey,
};

use crate::error::RaffleError;

solana_program::declare_id!("649vJ9q8JBKY7pvc5Uspwf6diESX4qKKjVQ1DTCubNQX");

pub fn process_instruction(
    program_id: &Pubkey,
    accounts: &[AccountInfo],
    instruction_data: &[u8],
) -> ProgramResult {
    processor::Processor::process(program_id, accounts, instruction_data).map_err(|error| {
        if let ProgramError::Custom(code) = error {
            if let Some(raffle_error) = RaffleError::from_code(code) {
                msg!("Error: {}", raffle_error);
            }
        }
        error
    })
}
