// Winner selection randomness
use arrayref::array_ref;
use solana_program::{
    account_info::AccountInfo,
    hash::{hashv, Hash},
    msg,
    program_error::ProgramError,
    pubkey::Pubkey,
    sysvar::slot_hashes,
};

use std::fmt;

use crate::error::RaffleError;

/// Everything a randomness source may mix into the draw.
///
/// None of these values exist while tickets are still being sold: the slot
/// hash is produced by the cluster for the slot in which the draw lands.
#[derive(Clone, Debug, PartialEq)]
pub struct SeedContext {
    pub raffle: Pubkey,
    pub entries: u32,
    pub slot: u64,
    pub unix_timestamp: i64,
    /// Most recent entry of the SlotHashes sysvar
    pub recent_slot: u64,
    pub recent_hash: [u8; 32],
}

impl SeedContext {
    /// Digest committed to in the program log so the draw can be audited.
    pub fn digest(&self) -> Hash {
        hashv(&[
            self.raffle.as_ref(),
            &self.entries.to_le_bytes(),
            &self.slot.to_le_bytes(),
            &self.unix_timestamp.to_le_bytes(),
            &self.recent_slot.to_le_bytes(),
            &self.recent_hash,
        ])
    }
}

/// Every seed input followed by the digest, as `key=value` pairs.
impl fmt::Display for SeedContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "raffle={} entries={} slot={} time={} recent_slot={} recent_hash={} digest={}",
            self.raffle,
            self.entries,
            self.slot,
            self.unix_timestamp,
            self.recent_slot,
            Hash::new_from_array(self.recent_hash),
            self.digest()
        )
    }
}

/// Capability that turns a seed context into a 1-based ticket number.
pub trait RandomnessSource {
    fn reveal(&self, seed: &SeedContext) -> Result<u32, ProgramError>;
}

/// Default source: hashes the seed context and reduces it onto
/// `1..=entries`. Reproducible from the logged context.
#[derive(Clone, Copy, Debug, Default)]
pub struct SlotHashEntropy;

impl RandomnessSource for SlotHashEntropy {
    fn reveal(&self, seed: &SeedContext) -> Result<u32, ProgramError> {
        let digest = seed.digest().to_bytes();
        let hash_value1 = u64::from_le_bytes(*array_ref![digest, 0, 8]);
        let hash_value2 = u64::from_le_bytes(*array_ref![digest, 8, 8]);

        let mixed = mix(hash_value1, hash_value2);
        let index = unbiased_range(mixed, u64::from(seed.entries))?;

        // index < entries <= u32::MAX, so the conversion cannot fail
        let ticket = u32::try_from(index)
            .ok()
            .and_then(|i| i.checked_add(1))
            .ok_or(RaffleError::MathOverflow)?;
        Ok(ticket)
    }
}

/// Reads the newest `(slot, hash)` pair out of the SlotHashes sysvar account.
///
/// Layout: u64 entry count followed by `(u64 slot, [u8; 32] hash)` entries,
/// newest first. An empty sysvar leaves nothing unpredictable to draw from
/// and fails with `RandomNumberGenerationFailed`.
pub fn latest_slot_hash(slot_hashes_info: &AccountInfo) -> Result<(u64, [u8; 32]), ProgramError> {
    if !slot_hashes::check_id(slot_hashes_info.key) {
        msg!("Expected the SlotHashes sysvar, got {}", slot_hashes_info.key);
        return Err(RaffleError::AddressMismatch.into());
    }

    let data = slot_hashes_info.try_borrow_data()?;
    if data.len() < 48 || u64::from_le_bytes(*array_ref![data, 0, 8]) == 0 {
        msg!("SlotHashes sysvar holds no entries");
        return Err(RaffleError::RandomNumberGenerationFailed.into());
    }
    let slot = u64::from_le_bytes(*array_ref![data, 8, 8]);
    let hash = *array_ref![data, 16, 32];
    Ok((slot, hash))
}

/// splitmix64 finaliser over the sum of both inputs.
fn mix(a: u64, b: u64) -> u64 {
    let mut z = a.wrapping_add(b);

    z = (z ^ (z >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d049bb133111eb);
    z ^ (z >> 31)
}

/// Maps `x` onto `0..range` by rejection sampling.
///
/// Each round is rejected with probability below `range / 2^64`. After
/// `MAX_ATTEMPTS` rejections the last value is reduced with a plain modulo;
/// the bias this leaves is accepted.
fn unbiased_range(x: u64, range: u64) -> Result<u64, RaffleError> {
    if range == 0 {
        return Err(RaffleError::NoEntries);
    }
    if range.is_power_of_two() {
        return Ok(x & (range - 1));
    }

    let threshold = u64::MAX - (u64::MAX % range);

    // Bounded rejection sampling keeps compute usage predictable
    const MAX_ATTEMPTS: u64 = 3;
    let mut value = x;
    for i in 0..MAX_ATTEMPTS {
        if value < threshold {
            return Ok(value % range);
        }
        value = mix(value, value.wrapping_add(i + 1));
    }
    Ok(value % range)
}
