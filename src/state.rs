// Raffle escrow account schema and state transitions
use arrayref::{array_mut_ref, array_ref, array_refs, mut_array_refs};
use borsh::{BorshDeserialize, BorshSerialize};
use solana_program::{
    clock::UnixTimestamp,
    hash::hash,
    program_error::ProgramError,
    program_pack::{Pack, Sealed},
    pubkey::Pubkey,
};

use crate::{
    address::{validate_raffle_id, MAX_RAFFLE_ID_LEN},
    error::RaffleError,
    randomness::{RandomnessSource, SeedContext},
};

/// Length of the type tag that prefixes every account
pub const TAG_LEN: usize = 8;

/// 8 tag + 32 owner + (4 + 30) raffle_id + 8 ticket_price + 4 max_entries
/// + 4 entries + 1 is_active + 1 is_claimed + (1 + 4) winner_ticket
/// + 8 created_at + 1 bump
pub const RAFFLE_ACCOUNT_SIZE: usize =
    TAG_LEN + 32 + 4 + MAX_RAFFLE_ID_LEN + 8 + 4 + 4 + 1 + 1 + 5 + 8 + 1;

/// Account kinds owned by the program, identified by their leading tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccountTag {
    Raffle,
    Ticket,
}

impl AccountTag {
    /// `sha256("account:<Name>")[..8]`
    pub const fn discriminator(self) -> [u8; TAG_LEN] {
        match self {
            AccountTag::Raffle => [143, 133, 63, 173, 138, 10, 142, 200],
            AccountTag::Ticket => [41, 228, 24, 165, 78, 90, 235, 200],
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            AccountTag::Raffle => "Raffle",
            AccountTag::Ticket => "Ticket",
        }
    }

    /// Identifies the tag at the start of `data`.
    pub fn of(data: &[u8]) -> Result<Self, RaffleError> {
        let tag = data.get(..TAG_LEN).ok_or(RaffleError::InvalidAccountTag)?;
        [AccountTag::Raffle, AccountTag::Ticket]
            .into_iter()
            .find(|kind| kind.discriminator() == tag)
            .ok_or(RaffleError::InvalidAccountTag)
    }

    /// Recomputes the discriminator from the account name.
    pub fn hashed_discriminator(self) -> [u8; TAG_LEN] {
        let digest = hash(format!("account:{}", self.name()).as_bytes()).to_bytes();
        *array_ref![digest, 0, TAG_LEN]
    }
}

/// Raffle escrow record, one per (owner, raffle_id)
#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq)]
pub struct Raffle {
    /// Creator of the raffle; the only key allowed to pick the winner
    pub owner: Pubkey,
    /// Owner-chosen identifier, at most 30 bytes
    pub raffle_id: String,
    /// Price per ticket in lamports
    pub ticket_price: u64,
    /// Capacity; the winner is drawn once it is reached
    pub max_entries: u32,
    /// Tickets sold so far
    pub entries: u32,
    pub is_active: bool,
    pub is_claimed: bool,
    /// 1-based winning ticket number once drawn
    pub winner_ticket: Option<u32>,
    pub created_at: UnixTimestamp,
    /// Bump of the raffle's derived address
    pub bump: u8,
}

impl Raffle {
    /// Create a new, empty raffle
    pub fn new(
        owner: Pubkey,
        raffle_id: String,
        ticket_price: u64,
        max_entries: u32,
        created_at: UnixTimestamp,
        bump: u8,
    ) -> Result<Self, RaffleError> {
        if ticket_price == 0 {
            return Err(RaffleError::InvalidTicketPrice);
        }
        if max_entries == 0 {
            return Err(RaffleError::InvalidMaxEntries);
        }
        validate_raffle_id(&raffle_id)?;

        Ok(Self {
            owner,
            raffle_id,
            ticket_price,
            max_entries,
            entries: 0,
            is_active: true,
            is_claimed: false,
            winner_ticket: None,
            created_at,
            bump,
        })
    }

    /// Decode a raffle, checking its tag and state invariants
    pub fn unpack(data: &[u8]) -> Result<Self, ProgramError> {
        if AccountTag::of(data)? != AccountTag::Raffle {
            return Err(RaffleError::InvalidAccountTag.into());
        }
        let raffle = Self::deserialize(&mut &data[TAG_LEN..])
            .map_err(|_| ProgramError::InvalidAccountData)?;
        raffle.check_invariants()?;
        Ok(raffle)
    }

    /// Encode the raffle behind its tag. Trailing bytes are left untouched.
    pub fn pack(&self, dst: &mut [u8]) -> Result<(), ProgramError> {
        if dst.len() < RAFFLE_ACCOUNT_SIZE {
            return Err(ProgramError::AccountDataTooSmall);
        }
        dst[..TAG_LEN].copy_from_slice(&AccountTag::Raffle.discriminator());
        let mut writer = &mut dst[TAG_LEN..];
        self.serialize(&mut writer)
            .map_err(|_| ProgramError::AccountDataTooSmall)
    }

    pub fn check_invariants(&self) -> Result<(), RaffleError> {
        if self.entries > self.max_entries {
            return Err(RaffleError::RaffleSoldOut);
        }
        match (self.is_active, self.winner_ticket) {
            (true, Some(_)) => Err(RaffleError::WinnerChosen),
            (false, None) => Err(RaffleError::WinnerNotChosen),
            (true, None) if self.is_claimed => Err(RaffleError::WinnerNotChosen),
            _ => Ok(()),
        }
    }

    pub fn is_sold_out(&self) -> bool {
        self.entries >= self.max_entries
    }

    /// Validates a purchase of `claimed_ticket_id` and returns it.
    ///
    /// The caller must name `entries + 1`; a stale id means another buyer
    /// committed first and the caller has to refetch.
    pub fn validate_purchase(&self, claimed_ticket_id: u32) -> Result<u32, RaffleError> {
        if !self.is_active {
            return Err(RaffleError::RaffleNotActive);
        }
        if self.is_sold_out() {
            return Err(RaffleError::RaffleSoldOut);
        }
        let next = self.entries.checked_add(1).ok_or(RaffleError::MathOverflow)?;
        if claimed_ticket_id != next {
            return Err(RaffleError::TicketIdMismatch);
        }
        Ok(next)
    }

    /// Counts one sold ticket, returning its number.
    pub fn record_purchase(&mut self) -> Result<u32, RaffleError> {
        self.entries = self.entries.checked_add(1).ok_or(RaffleError::MathOverflow)?;
        Ok(self.entries)
    }

    pub fn validate_pick(&self, caller: &Pubkey) -> Result<(), RaffleError> {
        if *caller != self.owner {
            return Err(RaffleError::Unauthorized);
        }
        if self.winner_ticket.is_some() {
            return Err(RaffleError::WinnerAlreadySelected);
        }
        if !self.is_active {
            return Err(RaffleError::RaffleNotActive);
        }
        if self.entries < self.max_entries {
            return Err(RaffleError::EntriesNotFull);
        }
        Ok(())
    }

    /// Records a revealed ticket number as the winner and deactivates the raffle.
    pub fn record_winner(&mut self, revealed: u32) -> Result<u32, RaffleError> {
        if revealed == 0 || revealed > self.entries {
            return Err(RaffleError::RandomNumberGenerationFailed);
        }
        self.winner_ticket = Some(revealed);
        self.is_active = false;
        Ok(revealed)
    }

    /// Validate, reveal and record in one step.
    pub fn draw<R: RandomnessSource>(
        &mut self,
        caller: &Pubkey,
        source: &R,
        seed: &SeedContext,
    ) -> Result<u32, ProgramError> {
        self.validate_pick(caller)?;
        let revealed = source.reveal(seed)?;
        Ok(self.record_winner(revealed)?)
    }

    /// Total pooled ticket revenue
    pub fn prize_amount(&self) -> Result<u64, RaffleError> {
        self.ticket_price
            .checked_mul(u64::from(self.entries))
            .ok_or(RaffleError::MathOverflow)
    }

    /// Checks that `claimant` holds the winning `ticket` of the raffle at
    /// `raffle_key` and returns the payout.
    pub fn validate_claim(
        &self,
        raffle_key: &Pubkey,
        ticket: &Ticket,
        claimant: &Pubkey,
    ) -> Result<u64, RaffleError> {
        if self.is_active {
            return Err(RaffleError::RaffleActive);
        }
        let winner_ticket = self.winner_ticket.ok_or(RaffleError::RaffleActive)?;
        if self.is_claimed {
            return Err(RaffleError::RaffleAlreadyClaimed);
        }
        if ticket.raffle != *raffle_key
            || ticket.ticket_id != winner_ticket
            || ticket.owner != *claimant
        {
            return Err(RaffleError::InvalidWinner);
        }
        self.prize_amount()
    }

    pub fn record_claim(&mut self) {
        self.is_claimed = true;
    }
}

/// Proof of purchase binding a ticket number to its buyer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ticket {
    /// The raffle this ticket belongs to
    pub raffle: Pubkey,
    /// 1-based sequence number within the raffle
    pub ticket_id: u32,
    /// The buyer of the ticket
    pub owner: Pubkey,
    /// Bump of the ticket's derived address
    pub bump: u8,
}

impl Sealed for Ticket {}

impl Pack for Ticket {
    const LEN: usize = TAG_LEN + 32 + 4 + 32 + 1;

    fn unpack_from_slice(src: &[u8]) -> Result<Self, ProgramError> {
        let src = array_ref![src, 0, Ticket::LEN];
        let (tag, raffle, ticket_id, owner, bump) = array_refs![src, TAG_LEN, 32, 4, 32, 1];

        if *tag != AccountTag::Ticket.discriminator() {
            return Err(RaffleError::InvalidAccountTag.into());
        }

        Ok(Ticket {
            raffle: Pubkey::new_from_array(*raffle),
            ticket_id: u32::from_le_bytes(*ticket_id),
            owner: Pubkey::new_from_array(*owner),
            bump: bump[0],
        })
    }

    fn pack_into_slice(&self, dst: &mut [u8]) {
        let dst = array_mut_ref![dst, 0, Ticket::LEN];
        let (tag_dst, raffle_dst, ticket_id_dst, owner_dst, bump_dst) =
            mut_array_refs![dst, TAG_LEN, 32, 4, 32, 1];

        *tag_dst = AccountTag::Ticket.discriminator();
        raffle_dst.copy_from_slice(self.raffle.as_ref());
        *ticket_id_dst = self.ticket_id.to_le_bytes();
        owner_dst.copy_from_slice(self.owner.as_ref());
        bump_dst[0] = self.bump;
    }
}

/// Any account owned by the program, decoded by its tag
#[derive(Clone, Debug, PartialEq)]
pub enum ProgramAccount {
    Raffle(Raffle),
    Ticket(Ticket),
}

impl ProgramAccount {
    pub fn unpack(data: &[u8]) -> Result<Self, ProgramError> {
        match AccountTag::of(data)? {
            AccountTag::Raffle => Raffle::unpack(data).map(ProgramAccount::Raffle),
            AccountTag::Ticket => Ticket::unpack_unchecked(data).map(ProgramAccount::Ticket),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(u32);

    impl RandomnessSource for Fixed {
        fn reveal(&self, _seed: &SeedContext) -> Result<u32, ProgramError> {
            Ok(self.0)
        }
    }

    fn raffle(max_entries: u32) -> Raffle {
        Raffle::new(Pubkey::new_unique(), "spring".to_string(), 100, max_entries, 1_700_000_000, 254)
            .unwrap()
    }

    fn seed(entries: u32) -> SeedContext {
        SeedContext {
            raffle: Pubkey::new_unique(),
            entries,
            slot: 1,
            unix_timestamp: 0,
            recent_slot: 0,
            recent_hash: [0; 32],
        }
    }

    fn fill(raffle: &mut Raffle) {
        while !raffle.is_sold_out() {
            let next = raffle.validate_purchase(raffle.entries + 1).unwrap();
            assert_eq!(raffle.record_purchase().unwrap(), next);
        }
    }

    #[test]
    fn discriminators_match_account_names() {
        for tag in [AccountTag::Raffle, AccountTag::Ticket] {
            assert_eq!(tag.discriminator(), tag.hashed_discriminator());
        }
    }

    #[test]
    fn new_raffle_starts_open_and_empty() {
        let raffle = raffle(5);
        assert_eq!(raffle.entries, 0);
        assert!(raffle.is_active);
        assert!(!raffle.is_claimed);
        assert_eq!(raffle.winner_ticket, None);
        assert_eq!(raffle.ticket_price, 100);
        assert_eq!(raffle.max_entries, 5);
    }

    #[test]
    fn new_raffle_rejects_zero_price_and_capacity() {
        let owner = Pubkey::new_unique();
        assert_eq!(
            Raffle::new(owner, "a".into(), 0, 5, 0, 0).unwrap_err(),
            RaffleError::InvalidTicketPrice
        );
        assert_eq!(
            Raffle::new(owner, "a".into(), 5, 0, 0, 0).unwrap_err(),
            RaffleError::InvalidMaxEntries
        );
        assert_eq!(
            Raffle::new(owner, String::new(), 5, 5, 0, 0).unwrap_err(),
            RaffleError::InvalidRaffleId
        );
    }

    #[test]
    fn raffle_layout_is_fixed_width() {
        let mut raffle = raffle(3);
        raffle.raffle_id = "x".repeat(MAX_RAFFLE_ID_LEN);
        raffle.winner_ticket = Some(2);
        raffle.is_active = false;

        let mut data = vec![0u8; RAFFLE_ACCOUNT_SIZE];
        raffle.pack(&mut data).unwrap();
        assert_eq!(&data[..TAG_LEN], &AccountTag::Raffle.discriminator());
        assert_eq!(&data[TAG_LEN..TAG_LEN + 32], raffle.owner.as_ref());
        assert_eq!(&data[40..44], &(MAX_RAFFLE_ID_LEN as u32).to_le_bytes());
        // presence byte then the winner ticket
        assert_eq!(&data[92..97], &[1, 2, 0, 0, 0]);
        assert_eq!(data[RAFFLE_ACCOUNT_SIZE - 1], 254);
        assert_eq!(Raffle::unpack(&data).unwrap(), raffle);
    }

    #[test]
    fn short_raffle_id_leaves_zero_padding() {
        let raffle = raffle(3);
        let mut data = vec![0u8; RAFFLE_ACCOUNT_SIZE];
        raffle.pack(&mut data).unwrap();
        assert_eq!(Raffle::unpack(&data).unwrap(), raffle);
        assert!(data[RAFFLE_ACCOUNT_SIZE - 24..].iter().all(|b| *b == 0));
    }

    #[test]
    fn unpack_checks_tag() {
        let ticket = Ticket {
            raffle: Pubkey::new_unique(),
            ticket_id: 1,
            owner: Pubkey::new_unique(),
            bump: 255,
        };
        let mut data = vec![0u8; RAFFLE_ACCOUNT_SIZE];
        Ticket::pack(ticket, &mut data[..Ticket::LEN]).unwrap();
        assert_eq!(
            Raffle::unpack(&data).unwrap_err(),
            ProgramError::from(RaffleError::InvalidAccountTag)
        );
        assert_eq!(
            ProgramAccount::unpack(&[0u8; Ticket::LEN]).unwrap_err(),
            ProgramError::from(RaffleError::InvalidAccountTag)
        );
    }

    #[test]
    fn ticket_layout() {
        let ticket = Ticket {
            raffle: Pubkey::new_unique(),
            ticket_id: 7,
            owner: Pubkey::new_unique(),
            bump: 250,
        };
        let mut data = [0u8; Ticket::LEN];
        Ticket::pack(ticket, &mut data).unwrap();
        // raffle sits right after the tag so it can be used as a memcmp filter
        assert_eq!(&data[TAG_LEN..TAG_LEN + 32], ticket.raffle.as_ref());
        assert_eq!(
            ProgramAccount::unpack(&data).unwrap(),
            ProgramAccount::Ticket(ticket)
        );
    }

    #[test]
    fn corrupt_state_is_rejected_on_read() {
        let mut raffle = raffle(2);
        raffle.is_active = false;
        let mut data = vec![0u8; RAFFLE_ACCOUNT_SIZE];
        raffle.pack(&mut data).unwrap();
        assert_eq!(
            Raffle::unpack(&data).unwrap_err(),
            ProgramError::from(RaffleError::WinnerNotChosen)
        );

        raffle.is_active = true;
        raffle.winner_ticket = Some(1);
        raffle.pack(&mut data).unwrap();
        assert_eq!(
            Raffle::unpack(&data).unwrap_err(),
            ProgramError::from(RaffleError::WinnerChosen)
        );
    }

    #[test]
    fn purchases_are_sequential() {
        let mut raffle = raffle(3);
        assert_eq!(raffle.validate_purchase(2), Err(RaffleError::TicketIdMismatch));
        assert_eq!(raffle.validate_purchase(0), Err(RaffleError::TicketIdMismatch));
        assert_eq!(raffle.validate_purchase(1), Ok(1));
        raffle.record_purchase().unwrap();
        assert_eq!(raffle.validate_purchase(1), Err(RaffleError::TicketIdMismatch));
        assert_eq!(raffle.validate_purchase(2), Ok(2));
    }

    #[test]
    fn sold_out_raffle_rejects_purchases() {
        let mut raffle = raffle(2);
        fill(&mut raffle);
        assert_eq!(raffle.entries, 2);
        assert_eq!(raffle.validate_purchase(3), Err(RaffleError::RaffleSoldOut));
    }

    #[test]
    fn pick_requires_owner_and_full_capacity() {
        let mut raffle = raffle(2);
        let stranger = Pubkey::new_unique();
        let owner = raffle.owner;

        assert_eq!(raffle.validate_pick(&stranger), Err(RaffleError::Unauthorized));
        assert_eq!(raffle.validate_pick(&owner), Err(RaffleError::EntriesNotFull));
        raffle.record_purchase().unwrap();
        assert_eq!(raffle.validate_pick(&owner), Err(RaffleError::EntriesNotFull));
        raffle.record_purchase().unwrap();

        assert_eq!(raffle.draw(&owner, &Fixed(2), &seed(2)).unwrap(), 2);
        assert_eq!(raffle.winner_ticket, Some(2));
        assert!(!raffle.is_active);
        assert!(raffle.check_invariants().is_ok());

        assert_eq!(
            raffle.draw(&owner, &Fixed(1), &seed(2)).unwrap_err(),
            ProgramError::from(RaffleError::WinnerAlreadySelected)
        );
        assert_eq!(raffle.validate_purchase(3), Err(RaffleError::RaffleNotActive));
    }

    #[test]
    fn out_of_range_reveal_is_rejected_without_mutation() {
        let mut raffle = raffle(2);
        fill(&mut raffle);
        let owner = raffle.owner;
        for bad in [0, 3] {
            assert_eq!(
                raffle.draw(&owner, &Fixed(bad), &seed(2)).unwrap_err(),
                ProgramError::from(RaffleError::RandomNumberGenerationFailed)
            );
            assert!(raffle.is_active);
            assert_eq!(raffle.winner_ticket, None);
        }
    }

    #[test]
    fn only_the_winning_ticket_holder_can_claim() {
        let raffle_key = Pubkey::new_unique();
        let winner = Pubkey::new_unique();
        let loser = Pubkey::new_unique();
        let mut raffle = raffle(2);
        let owner = raffle.owner;

        let winning = Ticket { raffle: raffle_key, ticket_id: 2, owner: winner, bump: 1 };
        let losing = Ticket { raffle: raffle_key, ticket_id: 1, owner: loser, bump: 1 };

        fill(&mut raffle);
        assert_eq!(
            raffle.validate_claim(&raffle_key, &winning, &winner),
            Err(RaffleError::RaffleActive)
        );
        raffle.draw(&owner, &Fixed(2), &seed(2)).unwrap();

        assert_eq!(
            raffle.validate_claim(&raffle_key, &losing, &loser),
            Err(RaffleError::InvalidWinner)
        );
        assert_eq!(
            raffle.validate_claim(&raffle_key, &winning, &loser),
            Err(RaffleError::InvalidWinner)
        );
        assert_eq!(
            raffle.validate_claim(&Pubkey::new_unique(), &winning, &winner),
            Err(RaffleError::InvalidWinner)
        );
        assert_eq!(raffle.validate_claim(&raffle_key, &winning, &winner), Ok(200));

        raffle.record_claim();
        assert!(raffle.check_invariants().is_ok());
        assert_eq!(
            raffle.validate_claim(&raffle_key, &winning, &winner),
            Err(RaffleError::RaffleAlreadyClaimed)
        );
    }

    #[test]
    fn prize_amount_overflow_is_fatal() {
        let mut raffle = raffle(u32::MAX);
        raffle.ticket_price = u64::MAX;
        raffle.entries = 2;
        assert_eq!(raffle.prize_amount(), Err(RaffleError::MathOverflow));
    }
}
