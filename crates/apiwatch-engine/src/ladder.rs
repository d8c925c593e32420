//! Token-balance threshold ladder.
//!
//! Three alert bounds, each gated by a one-shot flag, plus a recovery alert
//! whenever the balance goes up. Flags are cleared when the balance rises
//! above a bound, and force-cleared above ten times that bound.

use apiwatch_notify::{AlertKind, TokenAlert, TokenAlertCode, TokenBalanceContext};
use chrono::{DateTime, FixedOffset, Utc};
use num_bigint::BigUint;
use rust_decimal::Decimal;

use crate::error::EvaluationFailure;
use crate::evaluators::EvaluationResult;
use crate::model::MonitoredEndpoint;
use crate::state_machine::{Transition, mark_down, mark_up};

const TOKEN_DECIMALS: u32 = 18;

/// Decimals kept in the stored balance.
const STORED_DECIMALS: u32 = 6;

/// `whole` tokens in base units.
fn tokens(whole: u64) -> BigUint {
    BigUint::from(whole) * BigUint::from(10u32).pow(TOKEN_DECIMALS)
}

/// Base units to whole tokens, rounded half up to `dp` decimals.
pub fn whole_tokens(balance: &BigUint, dp: u32) -> Option<Decimal> {
    let divisor = BigUint::from(10u32).pow(TOKEN_DECIMALS.checked_sub(dp)?);
    let scaled = (balance + &divisor / 2u32) / &divisor;
    let mantissa = i128::try_from(&scaled).ok()?;
    Decimal::try_from_i128_with_scale(mantissa, dp).ok()
}

/// Applies balance readings to a token-balance endpoint.
pub struct TokenBalanceLadder {
    timezone: FixedOffset,
    critical: BigUint,
    low: BigUint,
    warning: BigUint,
    low_reset: BigUint,
    warning_reset: BigUint,
}

impl TokenBalanceLadder {
    pub fn new(timezone: FixedOffset) -> Self {
        Self {
            timezone,
            critical: tokens(500_000),
            low: tokens(1_000_000),
            warning: tokens(2_000_000),
            low_reset: tokens(10_000_000),
            warning_reset: tokens(20_000_000),
        }
    }

    pub fn apply(
        &self,
        prior: &MonitoredEndpoint,
        outcome: &Result<EvaluationResult, EvaluationFailure>,
        now: DateTime<Utc>,
    ) -> Transition {
        let balance = match outcome {
            Ok(EvaluationResult {
                reachable: true,
                token_balance: Some(balance),
                ..
            }) => balance,
            Ok(_) | Err(EvaluationFailure::Unreachable(_)) => {
                let mut endpoint = prior.clone();
                let alerts = if prior.is_inactive() {
                    Vec::new()
                } else {
                    vec![AlertKind::Inactive]
                };
                mark_down(&mut endpoint, now);
                return Transition::updated(endpoint, alerts, now);
            }
            Err(_) => return Transition::unchanged(prior),
        };

        let mut endpoint = prior.clone();
        let mut alerts = Vec::new();

        let healthy = if *balance <= self.critical {
            alerts.push(self.alert(prior, TokenAlertCode::Critical, balance, Some(&self.critical), now));
            false
        } else if *balance <= self.low && !endpoint.is_alert_sent_for_1m {
            alerts.push(self.alert(prior, TokenAlertCode::Low, balance, Some(&self.low), now));
            endpoint.is_alert_sent_for_1m = true;
            false
        } else if *balance <= self.warning && !endpoint.is_alert_sent_for_2m {
            alerts.push(self.alert(prior, TokenAlertCode::Warning, balance, Some(&self.warning), now));
            endpoint.is_alert_sent_for_2m = true;
            false
        } else {
            if *balance > self.warning {
                endpoint.is_alert_sent_for_1m = false;
                endpoint.is_alert_sent_for_2m = false;
            } else if *balance > self.low {
                endpoint.is_alert_sent_for_1m = false;
            }
            true
        };

        if healthy {
            mark_up(&mut endpoint, now);
        } else {
            mark_down(&mut endpoint, now);
        }

        if let Some(current) = whole_tokens(balance, STORED_DECIMALS) {
            if prior.token_balance.is_some_and(|before| current > before) {
                alerts.push(self.alert(prior, TokenAlertCode::Recovered, balance, None, now));
                if *balance > self.low_reset {
                    endpoint.is_alert_sent_for_1m = false;
                }
                if *balance > self.warning_reset {
                    endpoint.is_alert_sent_for_2m = false;
                }
            }
            endpoint.token_balance = Some(current);
        }

        Transition::updated(endpoint, alerts, now)
    }

    fn alert(
        &self,
        endpoint: &MonitoredEndpoint,
        code: TokenAlertCode,
        balance: &BigUint,
        minimum_required: Option<&BigUint>,
        now: DateTime<Utc>,
    ) -> AlertKind {
        AlertKind::Token {
            alert: TokenAlert {
                code,
                context: TokenBalanceContext {
                    chain_id: endpoint.chain_id.clone().unwrap_or_default(),
                    contract_address: endpoint.contract_address.clone().unwrap_or_default(),
                    wallet_address: endpoint.token_address.clone().unwrap_or_default(),
                    balance: balance.clone(),
                    minimum_required: minimum_required.cloned(),
                    checked_at: now.with_timezone(&self.timezone),
                },
            },
        }
    }
}
