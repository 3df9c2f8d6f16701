//! Off-chain facade over the raffle program.
//!
//! Reads decode accounts fetched through a [`Ledger`]; writes build the
//! program's instructions and hand them to the ledger for submission.
mod index;

pub use index::RaffleIndex;

use solana_program::{
    instruction::{Instruction, InstructionError},
    program_error::ProgramError,
    pubkey::Pubkey,
};
use solana_sdk::{
    account::Account,
    signature::Keypair,
    signer::Signer,
    transaction::TransactionError,
};
use thiserror::Error;

use crate::{
    address::{find_raffle_address, find_ticket_address},
    error::RaffleError,
    instruction,
    state::{ProgramAccount, Raffle, Ticket},
};

/// Attempts made by [`RaffleClient::buy_next_ticket`] when no count is given.
pub const DEFAULT_PURCHASE_ATTEMPTS: u32 = 3;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClientError {
    #[error("raffle program error: {0}")]
    Raffle(#[from] RaffleError),

    #[error("program error: {0}")]
    Program(ProgramError),

    #[error("transaction failed: {0}")]
    Transaction(TransactionError),

    #[error("ledger transport error: {0}")]
    Transport(String),

    #[error("account {0} not found")]
    AccountNotFound(Pubkey),
}

/// Custom codes raised by this program come back as [`ClientError::Raffle`].
impl From<ProgramError> for ClientError {
    fn from(error: ProgramError) -> Self {
        if let ProgramError::Custom(code) = error {
            if let Some(raffle_error) = RaffleError::from_code(code) {
                return ClientError::Raffle(raffle_error);
            }
        }
        ClientError::Program(error)
    }
}

impl From<TransactionError> for ClientError {
    fn from(error: TransactionError) -> Self {
        if let TransactionError::InstructionError(_, InstructionError::Custom(code)) = &error {
            if let Some(raffle_error) = RaffleError::from_code(*code) {
                return ClientError::Raffle(raffle_error);
            }
        }
        ClientError::Transaction(error)
    }
}

/// Account storage and transaction submission, supplied by the caller.
#[allow(async_fn_in_trait)]
pub trait Ledger {
    async fn fetch_account(&mut self, address: &Pubkey) -> Result<Option<Account>, ClientError>;

    /// Submits `instruction` signed by `signer` and waits for it to be processed.
    async fn submit(&mut self, instruction: Instruction, signer: &Keypair) -> Result<(), ClientError>;
}

/// Narrows [`RaffleClient::fetch_all_raffles`]. Unset fields match everything.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RaffleFilter {
    pub owner: Option<Pubkey>,
    pub active: Option<bool>,
    pub claimed: Option<bool>,
}

impl RaffleFilter {
    pub fn matches(&self, raffle: &Raffle) -> bool {
        self.owner.map_or(true, |owner| raffle.owner == owner)
            && self.active.map_or(true, |active| raffle.is_active == active)
            && self.claimed.map_or(true, |claimed| raffle.is_claimed == claimed)
    }
}

pub struct RaffleClient<L: Ledger> {
    program_id: Pubkey,
    ledger: L,
    index: RaffleIndex,
}

impl<L: Ledger> RaffleClient<L> {
    pub fn new(program_id: Pubkey, ledger: L) -> Self {
        Self {
            program_id,
            ledger,
            index: RaffleIndex::new(),
        }
    }

    /// Client for the program id declared by this crate.
    pub fn with_default_program(ledger: L) -> Self {
        Self::new(crate::id(), ledger)
    }

    pub fn program_id(&self) -> &Pubkey {
        &self.program_id
    }

    pub fn ledger_mut(&mut self) -> &mut L {
        &mut self.ledger
    }

    pub fn into_ledger(self) -> L {
        self.ledger
    }

    pub fn index(&self) -> &RaffleIndex {
        &self.index
    }

    pub fn raffle_address(&self, owner: &Pubkey, raffle_id: &str) -> Result<Pubkey, ClientError> {
        let (address, _) = find_raffle_address(&self.program_id, owner, raffle_id)?;
        Ok(address)
    }

    pub fn ticket_address(&self, raffle: &Pubkey, ticket_id: u32) -> Pubkey {
        find_ticket_address(&self.program_id, raffle, ticket_id).0
    }

    /// Decodes whatever program account lives at `address`, if any.
    pub async fn fetch_account(&mut self, address: &Pubkey) -> Result<Option<ProgramAccount>, ClientError> {
        let account = match self.ledger.fetch_account(address).await? {
            Some(account) if !account.data.is_empty() => account,
            _ => return Ok(None),
        };
        if account.owner != self.program_id {
            return Err(ProgramError::IncorrectProgramId.into());
        }
        Ok(Some(ProgramAccount::unpack(&account.data)?))
    }

    pub async fn fetch_raffle(&mut self, owner: &Pubkey, raffle_id: &str) -> Result<Raffle, ClientError> {
        let address = self.raffle_address(owner, raffle_id)?;
        self.fetch_raffle_at(&address).await
    }

    /// Fetches the raffle at `address` and refreshes its index entry.
    pub async fn fetch_raffle_at(&mut self, address: &Pubkey) -> Result<Raffle, ClientError> {
        match self.fetch_account(address).await? {
            Some(ProgramAccount::Raffle(raffle)) => {
                self.index.insert(*address, &raffle);
                Ok(raffle)
            }
            Some(ProgramAccount::Ticket(_)) => Err(RaffleError::InvalidAccountTag.into()),
            None => Err(ClientError::AccountNotFound(*address)),
        }
    }

    pub async fn fetch_ticket(&mut self, raffle: &Pubkey, ticket_id: u32) -> Result<Ticket, ClientError> {
        let address = self.ticket_address(raffle, ticket_id);
        match self.fetch_account(&address).await? {
            Some(ProgramAccount::Ticket(ticket)) => Ok(ticket),
            Some(ProgramAccount::Raffle(_)) => Err(RaffleError::InvalidAccountTag.into()),
            None => Err(ClientError::AccountNotFound(address)),
        }
    }

    /// Tickets `1..=entries` of the raffle at `raffle`, optionally only those
    /// held by `owner`.
    pub async fn fetch_tickets(
        &mut self,
        raffle: &Pubkey,
        owner: Option<&Pubkey>,
    ) -> Result<Vec<Ticket>, ClientError> {
        let entries = self.fetch_raffle_at(raffle).await?.entries;
        let mut tickets = Vec::new();
        for ticket_id in 1..=entries {
            let ticket = self.fetch_ticket(raffle, ticket_id).await?;
            if owner.map_or(true, |owner| ticket.owner == *owner) {
                tickets.push(ticket);
            }
        }
        Ok(tickets)
    }

    /// Adds an existing raffle to the index.
    pub async fn track(&mut self, address: &Pubkey) -> Result<Raffle, ClientError> {
        self.fetch_raffle_at(address).await
    }

    /// Indexed raffles matching `filter`, newest first. Every entry is
    /// re-read from the ledger; raffles that no longer exist are dropped.
    pub async fn fetch_all_raffles(
        &mut self,
        filter: &RaffleFilter,
    ) -> Result<Vec<(Pubkey, Raffle)>, ClientError> {
        let mut raffles = Vec::new();
        for address in self.index.newest_first(filter.owner.as_ref()) {
            match self.fetch_raffle_at(&address).await {
                Ok(raffle) => {
                    if filter.matches(&raffle) {
                        raffles.push((address, raffle));
                    }
                }
                Err(ClientError::AccountNotFound(_)) => {
                    self.index.remove(&address);
                }
                Err(error) => return Err(error),
            }
        }
        Ok(raffles)
    }

    /// Creates a raffle owned by `owner` and returns its address.
    pub async fn create_raffle(
        &mut self,
        owner: &Keypair,
        raffle_id: &str,
        ticket_price: u64,
        max_entries: u32,
    ) -> Result<Pubkey, ClientError> {
        let instruction = instruction::create_raffle(
            &self.program_id,
            &owner.pubkey(),
            raffle_id,
            ticket_price,
            max_entries,
        )?;
        self.ledger.submit(instruction, owner).await?;

        let address = self.raffle_address(&owner.pubkey(), raffle_id)?;
        self.track(&address).await?;
        Ok(address)
    }

    /// Buys the ticket after the last one sold and returns the new ticket
    /// account's address with its number.
    ///
    /// Fails with `TicketIdMismatch` when another purchase lands between the
    /// read and the submission.
    pub async fn buy_ticket(
        &mut self,
        buyer: &Keypair,
        raffle_owner: &Pubkey,
        raffle_id: &str,
    ) -> Result<(Pubkey, u32), ClientError> {
        let raffle = self.fetch_raffle(raffle_owner, raffle_id).await?;
        let ticket_id = raffle.entries.checked_add(1).ok_or(RaffleError::MathOverflow)?;
        let address = self
            .buy_ticket_numbered(buyer, raffle_owner, raffle_id, ticket_id)
            .await?;
        Ok((address, ticket_id))
    }

    /// Buys `ticket_id` without reading the raffle first and returns the
    /// ticket account's address.
    pub async fn buy_ticket_numbered(
        &mut self,
        buyer: &Keypair,
        raffle_owner: &Pubkey,
        raffle_id: &str,
        ticket_id: u32,
    ) -> Result<Pubkey, ClientError> {
        let raffle = self.raffle_address(raffle_owner, raffle_id)?;
        let instruction = instruction::buy_ticket(
            &self.program_id,
            &buyer.pubkey(),
            raffle_owner,
            raffle_id,
            ticket_id,
        )?;
        self.ledger.submit(instruction, buyer).await?;
        Ok(self.ticket_address(&raffle, ticket_id))
    }

    /// [`Self::buy_ticket`], refetching and retrying up to `attempts` times
    /// while the claimed ticket number keeps going stale.
    pub async fn buy_next_ticket(
        &mut self,
        buyer: &Keypair,
        raffle_owner: &Pubkey,
        raffle_id: &str,
        attempts: u32,
    ) -> Result<(Pubkey, u32), ClientError> {
        let mut last_error = ClientError::Raffle(RaffleError::TicketIdMismatch);
        for _ in 0..attempts.max(1) {
            match self.buy_ticket(buyer, raffle_owner, raffle_id).await {
                Err(ClientError::Raffle(RaffleError::TicketIdMismatch)) => {
                    last_error = ClientError::Raffle(RaffleError::TicketIdMismatch);
                }
                result => return result,
            }
        }
        Err(last_error)
    }

    /// Draws the winner as `caller` and returns the winning ticket number.
    pub async fn pick_winner(
        &mut self,
        caller: &Keypair,
        raffle_owner: &Pubkey,
        raffle_id: &str,
    ) -> Result<u32, ClientError> {
        let instruction =
            instruction::pick_winner(&self.program_id, &caller.pubkey(), raffle_owner, raffle_id)?;
        self.ledger.submit(instruction, caller).await?;

        let raffle = self.fetch_raffle(raffle_owner, raffle_id).await?;
        Ok(raffle.winner_ticket.ok_or(RaffleError::WinnerNotChosen)?)
    }

    /// Claims the prize with the raffle's winning ticket and returns the payout.
    pub async fn claim_prize(
        &mut self,
        claimant: &Keypair,
        raffle_owner: &Pubkey,
        raffle_id: &str,
    ) -> Result<u64, ClientError> {
        let raffle = self.fetch_raffle(raffle_owner, raffle_id).await?;
        let winner_ticket = raffle.winner_ticket.ok_or(RaffleError::RaffleActive)?;
        let prize_amount = raffle.prize_amount()?;

        let instruction = instruction::claim_prize(
            &self.program_id,
            &claimant.pubkey(),
            raffle_owner,
            raffle_id,
            winner_ticket,
        )?;
        self.ledger.submit(instruction, claimant).await?;
        Ok(prize_amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raffle(owner: Pubkey) -> Raffle {
        Raffle::new(owner, "r".to_string(), 10, 2, 0, 255).unwrap()
    }

    #[test]
    fn filter_matches_fields() {
        let owner = Pubkey::new_unique();
        let open = raffle(owner);
        let mut drawn = raffle(owner);
        drawn.entries = 2;
        drawn.record_winner(1).unwrap();

        assert!(RaffleFilter::default().matches(&open));
        let active_only = RaffleFilter {
            active: Some(true),
            ..RaffleFilter::default()
        };
        assert!(active_only.matches(&open));
        assert!(!active_only.matches(&drawn));

        let someone_else = RaffleFilter {
            owner: Some(Pubkey::new_unique()),
            ..RaffleFilter::default()
        };
        assert!(!someone_else.matches(&open));

        let unclaimed = RaffleFilter {
            claimed: Some(false),
            ..RaffleFilter::default()
        };
        assert!(unclaimed.matches(&drawn));
    }

    #[test]
    fn custom_instruction_errors_map_to_raffle_errors() {
        let error = TransactionError::InstructionError(0, InstructionError::Custom(18));
        assert_eq!(
            ClientError::from(error),
            ClientError::Raffle(RaffleError::TicketIdMismatch)
        );

        let error = TransactionError::InstructionError(0, InstructionError::Custom(9_999));
        assert!(matches!(ClientError::from(error), ClientError::Transaction(_)));

        let error = TransactionError::AccountNotFound;
        assert_eq!(
            ClientError::from(error.clone()),
            ClientError::Transaction(error)
        );
    }

    #[test]
    fn builder_errors_share_the_raffle_error_shape() {
        let program_id = Pubkey::new_unique();
        let owner = Pubkey::new_unique();
        let too_long = "x".repeat(31);

        let from_builder =
            ClientError::from(instruction::create_raffle(&program_id, &owner, &too_long, 1, 1).unwrap_err());
        let from_derivation =
            ClientError::from(find_raffle_address(&program_id, &owner, &too_long).unwrap_err());
        assert_eq!(from_builder, ClientError::Raffle(RaffleError::InvalidRaffleId));
        assert_eq!(from_builder, from_derivation);

        assert_eq!(
            ClientError::from(ProgramError::MissingRequiredSignature),
            ClientError::Program(ProgramError::MissingRequiredSignature)
        );
    }
}
