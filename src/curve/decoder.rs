//! Fixed-layout decoder for pump.fun bonding-curve accounts

use crate::error::DecodeError;
use solana_sdk::pubkey::Pubkey;

/// Anchor discriminator for the bonding-curve account.
pub const BONDING_CURVE_DISCRIMINATOR: [u8; 8] = [23, 183, 248, 55, 96, 216, 172, 96];

/// Exact on-chain size: discriminator, five u64 reserve fields, the
/// `complete` flag, and the mint pubkey.
pub const BONDING_CURVE_ACCOUNT_SIZE: usize = 8 + 5 * 8 + 1 + 32;

/// Decoded bonding-curve state.
///
/// `complete == true` means the token has graduated; no further trading
/// happens on the curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BondingCurveState {
    pub virtual_token_reserves: u64,
    pub virtual_sol_reserves: u64,
    pub real_token_reserves: u64,
    pub real_sol_reserves: u64,
    pub token_total_supply: u64,
    pub complete: bool,
    pub mint: Pubkey,
}

/// Decode a raw account-data slice. Accepts exactly
/// [`BONDING_CURVE_ACCOUNT_SIZE`] bytes; anything else is rejected without
/// partial reads.
pub fn decode(data: &[u8]) -> Result<BondingCurveState, DecodeError> {
    if data.len() != BONDING_CURVE_ACCOUNT_SIZE {
        return Err(DecodeError::Length {
            got: data.len(),
            expected: BONDING_CURVE_ACCOUNT_SIZE,
        });
    }
    if data[..8] != BONDING_CURVE_DISCRIMINATOR {
        return Err(DecodeError::Discriminator);
    }

    let read_u64 = |offset: usize| {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&data[offset..offset + 8]);
        u64::from_le_bytes(bytes)
    };

    let mut mint_bytes = [0u8; 32];
    mint_bytes.copy_from_slice(&data[49..81]);

    Ok(BondingCurveState {
        virtual_token_reserves: read_u64(8),
        virtual_sol_reserves: read_u64(16),
        real_token_reserves: read_u64(24),
        real_sol_reserves: read_u64(32),
        token_total_supply: read_u64(40),
        complete: data[48] != 0,
        mint: Pubkey::from(mint_bytes),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn encode(state: &BondingCurveState) -> Vec<u8> {
        let mut data = Vec::with_capacity(BONDING_CURVE_ACCOUNT_SIZE);
        data.extend_from_slice(&BONDING_CURVE_DISCRIMINATOR);
        data.extend_from_slice(&state.virtual_token_reserves.to_le_bytes());
        data.extend_from_slice(&state.virtual_sol_reserves.to_le_bytes());
        data.extend_from_slice(&state.real_token_reserves.to_le_bytes());
        data.extend_from_slice(&state.real_sol_reserves.to_le_bytes());
        data.extend_from_slice(&state.token_total_supply.to_le_bytes());
        data.push(state.complete as u8);
        data.extend_from_slice(state.mint.as_ref());
        data
    }

    fn sample() -> BondingCurveState {
        BondingCurveState {
            virtual_token_reserves: 1_073_000_000_000_000,
            virtual_sol_reserves: 30_000_000_000,
            real_token_reserves: 793_100_000_000_000,
            real_sol_reserves: 0,
            token_total_supply: 1_000_000_000_000_000,
            complete: false,
            mint: Pubkey::new_unique(),
        }
    }

    #[test]
    fn round_trips_the_fixed_layout() {
        let state = sample();
        let decoded = decode(&encode(&state)).unwrap();
        assert_eq!(decoded, state);
    }

    #[test]
    fn rejects_short_data() {
        let err = decode(&[0u8; 48]).unwrap_err();
        assert_eq!(
            err,
            DecodeError::Length {
                got: 48,
                expected: BONDING_CURVE_ACCOUNT_SIZE
            }
        );
    }

    #[test]
    fn rejects_long_data() {
        let mut data = encode(&sample());
        data.push(0);
        assert!(matches!(
            decode(&data).unwrap_err(),
            DecodeError::Length { .. }
        ));
    }

    #[test]
    fn rejects_foreign_discriminator() {
        let mut data = encode(&sample());
        data[0] ^= 0xff;
        assert_eq!(decode(&data).unwrap_err(), DecodeError::Discriminator);
    }

    #[test]
    fn complete_flag_decodes() {
        let mut state = sample();
        state.complete = true;
        assert!(decode(&encode(&state)).unwrap().complete);
    }
}
