// =============================================================================
// Scenario Calculator — "what if I buy here and sell there"
// =============================================================================
//
//   coins        = investment / buy
//   future_value = coins * sell
//   profit       = future_value - investment
//   percent      = (sell - buy) / buy * 100
//
// A zero buy price yields no result.  Text inputs parse leniently: the longest
// numeric prefix wins and anything unparseable counts as 0.
// =============================================================================

use serde::{Deserialize, Serialize};

pub const DEFAULT_INVESTMENT: f64 = 100.0;
pub const DEFAULT_TARGET_MULTIPLIER: f64 = 1.1;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProfitScenario {
    pub investment: f64,
    pub buy_price: f64,
    pub sell_price: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScenarioResult {
    pub coin_amount: f64,
    pub future_value: f64,
    pub profit: f64,
    pub percent_change: f64,
    pub is_profit: bool,
}

impl ProfitScenario {
    /// Seed a scenario from an asset's current price: $100 in, +10% target.
    pub fn for_price(current_price: f64) -> Self {
        Self {
            investment: DEFAULT_INVESTMENT,
            buy_price: current_price,
            sell_price: current_price * DEFAULT_TARGET_MULTIPLIER,
        }
    }

    pub fn evaluate(&self) -> Option<ScenarioResult> {
        if self.buy_price == 0.0 {
            return None;
        }
        let coin_amount = self.investment / self.buy_price;
        let future_value = coin_amount * self.sell_price;
        let profit = future_value - self.investment;
        let percent_change = (self.sell_price - self.buy_price) / self.buy_price * 100.0;

        Some(ScenarioResult {
            coin_amount,
            future_value,
            profit,
            percent_change,
            is_profit: profit >= 0.0,
        })
    }
}

/// A calculator field as submitted: a JSON number or the raw input text.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum AmountInput {
    Number(f64),
    Text(String),
}

impl AmountInput {
    pub fn value(&self) -> f64 {
        match self {
            Self::Number(n) if n.is_finite() => *n,
            Self::Number(_) => 0.0,
            Self::Text(s) => parse_amount(s),
        }
    }
}

/// Lenient number parse: longest leading float literal, else 0.
///
/// Accepts `[+-]digits[.digits][(e|E)[+-]digits]` in one forward scan; an
/// exponent without digits is left out of the literal.
pub fn parse_amount(text: &str) -> f64 {
    let text = text.trim_start();
    let bytes = text.as_bytes();
    let digits_from = |mut i: usize| {
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        i
    };

    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end = 1;
    }
    let int_end = digits_from(end);
    let mut mantissa_digits = int_end - end;
    end = int_end;

    if bytes.get(end) == Some(&b'.') {
        let frac_end = digits_from(end + 1);
        mantissa_digits += frac_end - (end + 1);
        end = frac_end;
    }
    if mantissa_digits == 0 {
        return 0.0;
    }

    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp = end + 1;
        if matches!(bytes.get(exp), Some(b'+' | b'-')) {
            exp += 1;
        }
        let exp_end = digits_from(exp);
        if exp_end > exp {
            end = exp_end;
        }
    }

    text[..end]
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}
