use solana_program::{
    decode_error::DecodeError, msg, program_error::PrintProgramError,
    program_error::ProgramError,
};
use thiserror::Error;

/// Errors that may be returned by the raffle escrow program
#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum RaffleError {
    /// Ticket price of zero
    #[error("Invalid ticket price. Must be greater than zero.")]
    InvalidTicketPrice,

    /// Capacity of zero
    #[error("Invalid maximum entries. Must be greater than zero.")]
    InvalidMaxEntries,

    #[error("Raffle is not active.")]
    RaffleNotActive,

    #[error("Raffle has already been claimed.")]
    RaffleAlreadyClaimed,

    #[error("No entries in the raffle.")]
    NoEntries,

    /// Caller is not the raffle owner
    #[error("Unauthorized action.")]
    Unauthorized,

    #[error("Winner has already been selected.")]
    WinnerAlreadySelected,

    #[error("Raffle is sold out.")]
    RaffleSoldOut,

    #[error("Insufficient funds to buy ticket.")]
    InsufficientFunds,

    /// Winner can only be picked at exactly full capacity
    #[error("Entries not full")]
    EntriesNotFull,

    /// Stored raffle is active yet carries a winner
    #[error("Raffle winner already chosen")]
    WinnerChosen,

    /// Stored raffle is resolved yet carries no winner
    #[error("Raffle winner not chosen")]
    WinnerNotChosen,

    /// Ticket or claimant does not match the recorded winner
    #[error("Invalid winner")]
    InvalidWinner,

    #[error("Math overflow")]
    MathOverflow,

    /// Randomness source revealed a number outside `1..=entries`
    #[error("Random number generation failed")]
    RandomNumberGenerationFailed,

    /// Prize claimed before a winner was picked
    #[error("Raffle is still active")]
    RaffleActive,

    /// Derived address is already occupied
    #[error("Account already exists")]
    AlreadyExists,

    #[error("Account not found")]
    AccountNotFound,

    /// Buyer named a ticket other than `entries + 1`
    #[error("Ticket id does not match the next available slot")]
    TicketIdMismatch,

    /// Raffle id is empty or longer than the stored maximum
    #[error("Invalid raffle id")]
    InvalidRaffleId,

    /// Supplied account is not the derived address
    #[error("Account address does not match its derived address")]
    AddressMismatch,

    #[error("Account type tag mismatch")]
    InvalidAccountTag,

    #[error("Invalid instruction data")]
    InvalidInstruction,
}

impl From<RaffleError> for ProgramError {
    fn from(e: RaffleError) -> Self {
        ProgramError::Custom(e as u32)
    }
}

impl<T> DecodeError<T> for RaffleError {
    fn type_of() -> &'static str {
        "Raffle Error"
    }
}

impl PrintProgramError for RaffleError {
    fn print<E>(&self) {
        msg!(&self.to_string());
    }
}

impl RaffleError {
    /// Maps a custom program error code back onto the enum.
    pub fn from_code(code: u32) -> Option<Self> {
        use RaffleError::*;
        const ALL: [RaffleError; 23] = [
            InvalidTicketPrice,
            InvalidMaxEntries,
            RaffleNotActive,
            RaffleAlreadyClaimed,
            NoEntries,
            Unauthorized,
            WinnerAlreadySelected,
            RaffleSoldOut,
            InsufficientFunds,
            EntriesNotFull,
            WinnerChosen,
            WinnerNotChosen,
            InvalidWinner,
            MathOverflow,
            RandomNumberGenerationFailed,
            RaffleActive,
            AlreadyExists,
            AccountNotFound,
            TicketIdMismatch,
            InvalidRaffleId,
            AddressMismatch,
            InvalidAccountTag,
            InvalidInstruction,
        ];
        ALL.get(code as usize).copied()
    }
}
