//! Risk sizing: balance and leverage in, exchange-quantised quantity out.

use serde::Serialize;

/// Inputs for one sizing decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizingRequest {
    pub balance: f64,
    pub leverage: f64,
    pub entry_price: f64,
    pub stop_distance: f64,
    pub min_qty: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SizeDecision {
    /// `size == steps * min_qty`.
    Sized { size: f64, steps: u64 },
    CannotTrade { reason: String },
}

impl SizeDecision {
    pub fn size(&self) -> Option<f64> {
        match self {
            SizeDecision::Sized { size, .. } => Some(*size),
            SizeDecision::CannotTrade { .. } => None,
        }
    }
}

pub trait SizingPolicy {
    fn name(&self) -> &'static str;

    /// Unquantised quantity, or the reason no quantity can be derived.
    fn raw_size(&self, request: &SizingRequest) -> Result<f64, String>;
}

/// Risks `risk_fraction` of balance between entry and stop:
/// size * stop_distance * leverage = balance * risk_fraction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskNormalized {
    pub risk_fraction: f64,
}

impl SizingPolicy for RiskNormalized {
    fn name(&self) -> &'static str {
        "risk_normalized"
    }

    fn raw_size(&self, request: &SizingRequest) -> Result<f64, String> {
        if request.stop_distance <= 0.0 {
            return Err(format!("stop distance {} is not positive", request.stop_distance));
        }
        if request.leverage <= 0.0 {
            return Err(format!("leverage {} is not positive", request.leverage));
        }
        Ok(request.balance * self.risk_fraction / (request.stop_distance * request.leverage))
    }
}

/// Commits a fixed fraction of balance as notional: size = balance * fraction / price.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedFraction {
    pub fraction: f64,
}

impl SizingPolicy for FixedFraction {
    fn name(&self) -> &'static str {
        "fixed_fraction"
    }

    fn raw_size(&self, request: &SizingRequest) -> Result<f64, String> {
        if request.entry_price <= 0.0 {
            return Err(format!("entry price {} is not positive", request.entry_price));
        }
        Ok(request.balance * self.fraction / request.entry_price)
    }
}

/// Configured sizing policy, selectable from the `[risk]` section.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sizing {
    RiskNormalized(RiskNormalized),
    FixedFraction(FixedFraction),
}

impl Sizing {
    pub fn policy(&self) -> &dyn SizingPolicy {
        match self {
            Sizing::RiskNormalized(p) => p,
            Sizing::FixedFraction(p) => p,
        }
    }
}

pub fn size_position(policy: &dyn SizingPolicy, request: &SizingRequest) -> SizeDecision {
    if request.min_qty <= 0.0 || !request.min_qty.is_finite() {
        return SizeDecision::CannotTrade {
            reason: format!("minimum order quantity {} is not positive", request.min_qty),
        };
    }
    if request.balance <= 0.0 {
        return SizeDecision::CannotTrade {
            reason: format!("balance {} is not positive", request.balance),
        };
    }

    let raw = match policy.raw_size(request) {
        Ok(raw) if raw.is_finite() => raw,
        Ok(raw) => {
            return SizeDecision::CannotTrade {
                reason: format!("{} produced non-finite size {}", policy.name(), raw),
            };
        }
        Err(reason) => return SizeDecision::CannotTrade { reason },
    };

    let (steps, size) = quantize_down(raw, request.min_qty);
    if steps == 0 {
        return SizeDecision::CannotTrade {
            reason: format!(
                "{} size {:.8} is below minimum order quantity {}",
                policy.name(),
                raw,
                request.min_qty
            ),
        };
    }
    SizeDecision::Sized { size, steps }
}

/// Largest multiple of `min_qty` not above `raw`.
pub fn quantize_down(raw: f64, min_qty: f64) -> (u64, f64) {
    if raw <= 0.0 || min_qty <= 0.0 {
        return (0, 0.0);
    }
    let mut steps = (raw / min_qty).floor() as u64;
    // division can round up onto the next integer
    if steps > 0 && steps as f64 * min_qty > raw {
        steps -= 1;
    }
    (steps, steps as f64 * min_qty)
}
