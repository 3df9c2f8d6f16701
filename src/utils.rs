// Raffle escrow - account plumbing shared by the instruction processors
use solana_program::{
    account_info::AccountInfo,
    entrypoint::ProgramResult,
    msg,
    program::{invoke, invoke_signed},
    program_error::ProgramError,
    pubkey::Pubkey,
    rent::Rent,
    system_instruction, system_program,
};

use crate::error::RaffleError;

/// Creates a rent-exempt account of `space` bytes at a program derived
/// address, owned by `program_id`.
///
/// Lamports already sitting at the address (sent there before creation)
/// are kept: only the shortfall is transferred and the account is then
/// allocated and assigned.
pub fn create_pda_account<'a>(
    payer: &AccountInfo<'a>,
    new_account: &AccountInfo<'a>,
    system_program_info: &AccountInfo<'a>,
    program_id: &Pubkey,
    rent: &Rent,
    space: usize,
    signer_seeds: &[&[u8]],
) -> ProgramResult {
    let required_lamports = rent.minimum_balance(space);
    let current_lamports = new_account.lamports();

    if current_lamports == 0 {
        return invoke_signed(
            &system_instruction::create_account(
                payer.key,
                new_account.key,
                required_lamports,
                space as u64,
                program_id,
            ),
            &[payer.clone(), new_account.clone(), system_program_info.clone()],
            &[signer_seeds],
        );
    }

    let shortfall = required_lamports.saturating_sub(current_lamports);
    if shortfall > 0 {
        invoke(
            &system_instruction::transfer(payer.key, new_account.key, shortfall),
            &[payer.clone(), new_account.clone(), system_program_info.clone()],
        )?;
    }
    invoke_signed(
        &system_instruction::allocate(new_account.key, space as u64),
        &[new_account.clone(), system_program_info.clone()],
        &[signer_seeds],
    )?;
    invoke_signed(
        &system_instruction::assign(new_account.key, program_id),
        &[new_account.clone(), system_program_info.clone()],
        &[signer_seeds],
    )
}

/// Moves `amount` lamports out of an account owned by this program.
pub fn move_lamports(from: &AccountInfo, to: &AccountInfo, amount: u64) -> ProgramResult {
    let from_balance = from
        .lamports()
        .checked_sub(amount)
        .ok_or(RaffleError::InsufficientFunds)?;
    let to_balance = to
        .lamports()
        .checked_add(amount)
        .ok_or(RaffleError::MathOverflow)?;

    **from.try_borrow_mut_lamports()? = from_balance;
    **to.try_borrow_mut_lamports()? = to_balance;
    Ok(())
}

/// An address counts as free while it holds no data and is not owned by a program.
pub fn is_unoccupied(account: &AccountInfo) -> bool {
    account.data_is_empty() && system_program::check_id(account.owner)
}

pub fn assert_signer(account: &AccountInfo) -> ProgramResult {
    if !account.is_signer {
        msg!("Account {} must sign the transaction", account.key);
        return Err(ProgramError::MissingRequiredSignature);
    }
    Ok(())
}

pub fn assert_writable(account: &AccountInfo) -> ProgramResult {
    if !account.is_writable {
        msg!("Account {} must be writable", account.key);
        return Err(ProgramError::InvalidArgument);
    }
    Ok(())
}

pub fn assert_system_program(account: &AccountInfo) -> ProgramResult {
    if !system_program::check_id(account.key) {
        msg!("Expected the system program, got {}", account.key);
        return Err(ProgramError::IncorrectProgramId);
    }
    Ok(())
}

/// Fails with `AccountNotFound` unless the account exists and belongs to the program.
pub fn assert_program_owned(account: &AccountInfo, program_id: &Pubkey) -> ProgramResult {
    if account.data_is_empty() {
        msg!("Account {} does not exist", account.key);
        return Err(RaffleError::AccountNotFound.into());
    }
    if account.owner != program_id {
        msg!("Account {} must be owned by this program", account.key);
        return Err(ProgramError::IncorrectProgramId);
    }
    Ok(())
}

/// Convert lamports to SOL (for display purposes)
pub fn lamports_to_sol(lamports: u64) -> f64 {
    lamports as f64 / 1_000_000_000.0
}
