//! Canonical price, liquidity and market-cap derivation from curve state

use super::decoder::BondingCurveState;
use serde::{Deserialize, Serialize};

pub const LAMPORTS_PER_SOL: f64 = 1_000_000_000.0;
/// pump.fun tokens use 6 decimals.
pub const TOKEN_UNITS_PER_WHOLE: f64 = 1_000_000.0;
/// Real-SOL reserve target at which the curve graduates.
pub const GRADUATION_TARGET_SOL: f64 = 85.0;

/// Hard price sanity bounds in SOL per whole token.
const MIN_PRICE_SOL: f64 = 1e-12;
const MAX_PRICE_SOL: f64 = 1000.0;

/// Non-fatal warning thresholds.
const LOW_RESERVES_SOL: f64 = 0.5;
const MARKET_CAP_OUTLIER_USD: f64 = 10_000_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceValidity {
    Valid,
    /// `complete` flag set; the curve no longer trades.
    Graduated,
    ZeroReserves,
    NonFinite,
    OutOfRange,
}

#[derive(Debug, Clone)]
pub struct PricingResult {
    pub price_sol: f64,
    pub price_usd: f64,
    pub market_cap_usd: f64,
    pub liquidity_usd: f64,
    /// 0..100, fraction of the graduation target reached.
    pub curve_progress: f64,
    pub validity: PriceValidity,
    pub warnings: Vec<String>,
}

impl PricingResult {
    pub fn is_valid(&self) -> bool {
        self.validity == PriceValidity::Valid
    }

    fn rejected(validity: PriceValidity) -> Self {
        Self {
            price_sol: 0.0,
            price_usd: 0.0,
            market_cap_usd: 0.0,
            liquidity_usd: 0.0,
            curve_progress: 0.0,
            validity,
            warnings: Vec::new(),
        }
    }
}

/// Derive price, market cap, liquidity and curve progress from decoded
/// reserves at the given SOL/USD rate.
pub fn price(state: &BondingCurveState, sol_usd: f64, graduation_target_sol: f64) -> PricingResult {
    if state.complete {
        return PricingResult::rejected(PriceValidity::Graduated);
    }
    if state.virtual_sol_reserves == 0 || state.virtual_token_reserves == 0 {
        return PricingResult::rejected(PriceValidity::ZeroReserves);
    }

    let virtual_sol = state.virtual_sol_reserves as f64 / LAMPORTS_PER_SOL;
    let virtual_tokens = state.virtual_token_reserves as f64 / TOKEN_UNITS_PER_WHOLE;
    let real_sol = state.real_sol_reserves as f64 / LAMPORTS_PER_SOL;
    let total_supply = state.token_total_supply as f64 / TOKEN_UNITS_PER_WHOLE;

    let price_sol = virtual_sol / virtual_tokens;
    if !price_sol.is_finite() {
        return PricingResult::rejected(PriceValidity::NonFinite);
    }
    if !(MIN_PRICE_SOL..=MAX_PRICE_SOL).contains(&price_sol) {
        return PricingResult::rejected(PriceValidity::OutOfRange);
    }

    let price_usd = price_sol * sol_usd;
    let market_cap_usd = price_sol * sol_usd * total_supply;
    let liquidity_usd = 2.0 * real_sol * sol_usd;
    let curve_progress = (real_sol / graduation_target_sol * 100.0).min(100.0);

    let mut warnings = Vec::new();
    if real_sol < LOW_RESERVES_SOL {
        warnings.push(format!("very low real reserves: {real_sol:.4} SOL"));
    }
    if market_cap_usd > MARKET_CAP_OUTLIER_USD {
        warnings.push(format!("market cap outlier: ${market_cap_usd:.0}"));
    }

    PricingResult {
        price_sol,
        price_usd,
        market_cap_usd,
        liquidity_usd,
        curve_progress,
        validity: PriceValidity::Valid,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::pubkey::Pubkey;

    fn state() -> BondingCurveState {
        BondingCurveState {
            virtual_token_reserves: 1_073_000_000_000_000,
            virtual_sol_reserves: 30_000_000_000,
            real_token_reserves: 793_100_000_000_000,
            real_sol_reserves: 40_000_000_000,
            token_total_supply: 1_000_000_000_000_000,
            complete: false,
            mint: Pubkey::new_unique(),
        }
    }

    #[test]
    fn price_matches_reference_formula_exactly() {
        let s = state();
        let result = price(&s, 100.0, GRADUATION_TARGET_SOL);

        let expected_price_sol = (30_000_000_000f64 / 1e9) / (1_073_000_000_000_000f64 / 1e6);
        assert_eq!(result.price_sol, expected_price_sol);
        assert_eq!(result.price_usd, expected_price_sol * 100.0);
        assert_eq!(
            result.market_cap_usd,
            expected_price_sol * 100.0 * (1_000_000_000_000_000f64 / 1e6)
        );
        assert_eq!(result.liquidity_usd, 2.0 * 40.0 * 100.0);
        assert!(result.is_valid());
    }

    #[test]
    fn graduated_curve_is_rejected() {
        let mut s = state();
        s.complete = true;
        let result = price(&s, 100.0, GRADUATION_TARGET_SOL);
        assert_eq!(result.validity, PriceValidity::Graduated);
        assert!(!result.is_valid());
    }

    #[test]
    fn zero_virtual_reserves_are_rejected() {
        let mut s = state();
        s.virtual_sol_reserves = 0;
        assert_eq!(
            price(&s, 100.0, GRADUATION_TARGET_SOL).validity,
            PriceValidity::ZeroReserves
        );

        let mut s = state();
        s.virtual_token_reserves = 0;
        assert_eq!(
            price(&s, 100.0, GRADUATION_TARGET_SOL).validity,
            PriceValidity::ZeroReserves
        );
    }

    #[test]
    fn absurd_price_is_out_of_range() {
        let mut s = state();
        s.virtual_sol_reserves = u64::MAX;
        s.virtual_token_reserves = 1_000_000;
        assert_eq!(
            price(&s, 100.0, GRADUATION_TARGET_SOL).validity,
            PriceValidity::OutOfRange
        );
    }

    #[test]
    fn progress_is_capped_at_hundred() {
        let mut s = state();
        s.real_sol_reserves = 120_000_000_000;
        let result = price(&s, 100.0, GRADUATION_TARGET_SOL);
        assert_eq!(result.curve_progress, 100.0);
    }

    #[test]
    fn progress_tracks_graduation_target() {
        let mut s = state();
        s.real_sol_reserves = 42_500_000_000; // half the 85 SOL target
        let result = price(&s, 100.0, GRADUATION_TARGET_SOL);
        assert!((result.curve_progress - 50.0).abs() < 1e-9);
    }

    #[test]
    fn low_reserves_warn_without_rejecting() {
        let mut s = state();
        s.real_sol_reserves = 100_000_000; // 0.1 SOL
        let result = price(&s, 100.0, GRADUATION_TARGET_SOL);
        assert!(result.is_valid());
        assert!(!result.warnings.is_empty());
    }
}
