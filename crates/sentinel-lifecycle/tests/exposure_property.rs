//! Property test: the exposure cap holds after every accepted trade,
//! for arbitrary candidate sequences interleaved with settlements.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use sentinel_core::{Position, Price, RiskParameters, Side, Size, TokenId, TradeCandidate};
use sentinel_lifecycle::AccountLedger;
use sentinel_risk::{
    BreakerConfig, CircuitBreaker, PositionSizer, RiskGate, TradeActivity,
};
use std::sync::Arc;

fn random_candidate(rng: &mut StdRng) -> TradeCandidate {
    let price = Decimal::from(rng.gen_range(1..500));
    TradeCandidate::new(
        TokenId::new(format!("TOK{}", rng.gen_range(0..20))).unwrap(),
        if rng.gen_bool(0.5) { Side::Buy } else { Side::Sell },
        Price::new(price),
        // Mostly in-band volatility, sometimes out.
        Decimal::new(rng.gen_range(0..8000), 4),
        Decimal::from(rng.gen_range(0..200_000)),
        Decimal::new(rng.gen_range(-100..100), 2),
    )
}

#[test]
fn exposure_cap_holds_over_random_sequences() {
    let params = RiskParameters {
        min_trade_interval_secs: 0,
        max_trades_per_day: u32::MAX,
        ..Default::default()
    };
    let sizer = PositionSizer::new();

    for seed in 0..20u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let breaker = Arc::new(CircuitBreaker::new(params.clone(), BreakerConfig::default()));
        let gate = RiskGate::new(breaker.clone(), Arc::new(TradeActivity::new()));
        let ledger = AccountLedger::new(Decimal::from(1_000));
        let mut live: Vec<Position> = Vec::new();

        for _ in 0..300 {
            // Occasionally settle a live position with a random PnL.
            if !live.is_empty() && rng.gen_bool(0.3) {
                let position = live.swap_remove(rng.gen_range(0..live.len()));
                let pnl = Decimal::new(rng.gen_range(-200..200), 2);
                ledger.settle(&position, pnl);
            }

            let candidate = random_candidate(&mut rng);
            let snapshot = ledger.snapshot();
            let Ok(hint) = gate.evaluate(&candidate, &snapshot, &params) else {
                continue;
            };
            let Ok(sizing) = sizer.size(
                &candidate,
                &params,
                hint.balance,
                hint.headroom,
                hint.size_factor,
            ) else {
                continue;
            };
            if sizing.notional <= Decimal::ZERO {
                continue;
            }

            let position = Position::pending(
                candidate.token.clone(),
                candidate.side,
                candidate.reference_price,
                Size::new(sizing.quantity),
                sizing.stop,
                sizing.target,
            );
            if ledger.reserve(&position, &params).is_err() {
                continue;
            }
            live.push(position);

            let state = ledger.snapshot();
            let cap = state.balance * params.max_total_exposure_fraction;
            assert!(
                state.open_exposure <= cap,
                "seed {seed}: exposure {} exceeds cap {}",
                state.open_exposure,
                cap
            );
        }
    }
}
