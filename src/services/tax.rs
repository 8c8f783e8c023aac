//! Import duty and ICMS for cross-border orders.
//!
//! ICMS is charged "por dentro": the tax is part of its own base, so the base
//! is grossed up as `(value + duty) / (1 - rate)` before applying the rate.

use std::collections::HashMap;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

pub const HOME_COUNTRY: &str = "BR";

const IMPORT_SUPPLIERS: [&str; 4] = ["ALIEXPRESS", "INTERNATIONAL", "IMPORT", "CROSS_BORDER"];

/// NF-e origin codes for goods of foreign origin.
const FOREIGN_ORIGIN_CODES: [u8; 4] = [1, 2, 6, 7];

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum TaxError {
    #[error("item {index}: invalid {field}")]
    InvalidItem { index: usize, field: &'static str },
    #[error("invalid destination state: {0}")]
    InvalidState(String),
    #[error("invalid freight")]
    InvalidFreight,
    #[error("invalid rate for {0}")]
    InvalidRate(String),
    #[error("order value is too large to quote")]
    Overflow,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TaxItem {
    pub price: Decimal,
    pub quantity: u32,
    #[serde(default)]
    pub supplier_type: Option<String>,
    #[serde(default)]
    pub origin_code: Option<u8>,
    #[serde(default)]
    pub ship_from_country: Option<String>,
}

impl TaxItem {
    /// `None` when price times quantity leaves the decimal range.
    pub fn subtotal(&self) -> Option<Decimal> {
        self.price.checked_mul(Decimal::from(self.quantity))
    }

    /// Goods shipped from inside the country never pay import duty, whatever the supplier.
    pub fn is_import(&self) -> bool {
        let country = self
            .ship_from_country
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty());
        if let Some(country) = country {
            if country.eq_ignore_ascii_case(HOME_COUNTRY) {
                return false;
            }
            return true;
        }
        let import_supplier = self
            .supplier_type
            .as_deref()
            .is_some_and(|s| IMPORT_SUPPLIERS.iter().any(|i| i.eq_ignore_ascii_case(s.trim())));
        let foreign_origin = self
            .origin_code
            .is_some_and(|code| FOREIGN_ORIGIN_CODES.contains(&code));
        import_supplier || foreign_origin
    }
}

#[derive(Debug, Clone)]
pub struct TaxConfig {
    pub duty_rate: Decimal,
    /// Adds the imported goods' share of freight to the dutiable value.
    pub duty_includes_freight: bool,
    pub default_icms_rate: Decimal,
    pub icms_overrides: HashMap<String, Decimal>,
}

impl Default for TaxConfig {
    fn default() -> Self {
        Self {
            duty_rate: Decimal::new(20, 2),
            duty_includes_freight: false,
            default_icms_rate: Decimal::new(17, 2),
            icms_overrides: HashMap::new(),
        }
    }
}

impl TaxConfig {
    pub fn icms_rate(&self, state: &str) -> Decimal {
        let state = state.to_ascii_uppercase();
        self.icms_overrides
            .get(&state)
            .copied()
            .or_else(|| state_icms_rate(&state))
            .unwrap_or(self.default_icms_rate)
    }

    /// Parses overrides written as `SP=0.18,RJ=0.20`.
    pub fn parse_overrides(raw: &str) -> Result<HashMap<String, Decimal>, TaxError> {
        let mut overrides = HashMap::new();
        for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (state, rate) = pair
                .split_once('=')
                .ok_or_else(|| TaxError::InvalidRate(pair.to_string()))?;
            let state = state.trim().to_ascii_uppercase();
            if !is_state_code(&state) {
                return Err(TaxError::InvalidState(state));
            }
            let rate: Decimal = rate
                .trim()
                .parse()
                .map_err(|_| TaxError::InvalidRate(state.clone()))?;
            if !is_valid_rate(rate) {
                return Err(TaxError::InvalidRate(state));
            }
            overrides.insert(state, rate);
        }
        Ok(overrides)
    }
}

/// Internal ICMS rate per federative unit.
fn state_icms_rate(state: &str) -> Option<Decimal> {
    let (units, scale) = match state {
        "AC" => (19, 2),
        "AL" => (19, 2),
        "AM" => (20, 2),
        "AP" => (18, 2),
        "BA" => (205, 3),
        "CE" => (20, 2),
        "DF" => (20, 2),
        "ES" => (17, 2),
        "GO" => (19, 2),
        "MA" => (23, 2),
        "MG" => (18, 2),
        "MS" => (17, 2),
        "MT" => (17, 2),
        "PA" => (19, 2),
        "PB" => (20, 2),
        "PE" => (205, 3),
        "PI" => (225, 3),
        "PR" => (195, 3),
        "RJ" => (22, 2),
        "RN" => (18, 2),
        "RO" => (195, 3),
        "RR" => (20, 2),
        "RS" => (17, 2),
        "SC" => (17, 2),
        "SE" => (19, 2),
        "SP" => (18, 2),
        "TO" => (20, 2),
        _ => return None,
    };
    Some(Decimal::new(units, scale))
}

fn is_state_code(state: &str) -> bool {
    state.len() == 2 && state.chars().all(|c| c.is_ascii_alphabetic())
}

fn is_valid_rate(rate: Decimal) -> bool {
    rate >= Decimal::ZERO && rate < Decimal::ONE
}

fn checked(value: Option<Decimal>) -> Result<Decimal, TaxError> {
    value.ok_or(TaxError::Overflow)
}

fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaxBreakdown {
    pub imported_subtotal: Decimal,
    pub domestic_subtotal: Decimal,
    pub freight: Decimal,
    pub freight_share: Decimal,
    pub dutiable_value: Decimal,
    pub import_duty: Decimal,
    pub icms_rate: Decimal,
    pub icms_base: Decimal,
    pub icms: Decimal,
    pub total_taxes: Decimal,
    pub grand_total: Decimal,
}

pub fn calculate(
    config: &TaxConfig,
    items: &[TaxItem],
    destination_state: &str,
    freight: Decimal,
) -> Result<TaxBreakdown, TaxError> {
    let state = destination_state.trim().to_ascii_uppercase();
    if !is_state_code(&state) {
        return Err(TaxError::InvalidState(destination_state.to_string()));
    }
    if freight < Decimal::ZERO {
        return Err(TaxError::InvalidFreight);
    }
    if !is_valid_rate(config.duty_rate) {
        return Err(TaxError::InvalidRate("import duty".to_string()));
    }
    let icms_rate = config.icms_rate(&state);
    if !is_valid_rate(icms_rate) {
        return Err(TaxError::InvalidRate(state));
    }

    let mut imported_subtotal = Decimal::ZERO;
    let mut domestic_subtotal = Decimal::ZERO;
    for (index, item) in items.iter().enumerate() {
        if item.price < Decimal::ZERO {
            return Err(TaxError::InvalidItem {
                index,
                field: "price",
            });
        }
        if item.quantity == 0 {
            return Err(TaxError::InvalidItem {
                index,
                field: "quantity",
            });
        }
        let bucket = if item.is_import() {
            &mut imported_subtotal
        } else {
            &mut domestic_subtotal
        };
        let running = *bucket;
        *bucket = item
            .subtotal()
            .and_then(|subtotal| running.checked_add(subtotal))
            .ok_or(TaxError::InvalidItem {
                index,
                field: "price",
            })?;
    }

    let subtotal = checked(imported_subtotal.checked_add(domestic_subtotal))?;
    let freight_share = if config.duty_includes_freight && !subtotal.is_zero() {
        checked(
            freight
                .checked_mul(imported_subtotal)
                .and_then(|share| share.checked_div(subtotal)),
        )?
    } else {
        Decimal::ZERO
    };
    let dutiable_value = checked(imported_subtotal.checked_add(freight_share))?;
    let import_duty = checked(dutiable_value.checked_mul(config.duty_rate))?;

    let (icms_base, icms) = if dutiable_value.is_zero() {
        (Decimal::ZERO, Decimal::ZERO)
    } else {
        let base = checked(
            dutiable_value
                .checked_add(import_duty)
                .and_then(|value| value.checked_div(Decimal::ONE - icms_rate)),
        )?;
        (base, checked(base.checked_mul(icms_rate))?)
    };

    let import_duty = round_money(import_duty);
    let icms = round_money(icms);
    let total_taxes = checked(import_duty.checked_add(icms))?;
    let grand_total = checked(
        subtotal
            .checked_add(freight)
            .map(round_money)
            .and_then(|total| total.checked_add(total_taxes)),
    )?;
    Ok(TaxBreakdown {
        imported_subtotal: round_money(imported_subtotal),
        domestic_subtotal: round_money(domestic_subtotal),
        freight: round_money(freight),
        freight_share: round_money(freight_share),
        dutiable_value: round_money(dutiable_value),
        import_duty,
        icms_rate,
        icms_base: round_money(icms_base),
        icms,
        total_taxes,
        grand_total,
    })
}

/// Holds the tax settings the HTTP layer quotes with.
pub struct TaxCalculator {
    config: TaxConfig,
}

impl TaxCalculator {
    pub fn new(config: TaxConfig) -> Self {
        Self { config }
    }

    pub fn quote(
        &self,
        items: &[TaxItem],
        destination_state: &str,
        freight: Decimal,
    ) -> Result<TaxBreakdown, TaxError> {
        let breakdown = calculate(&self.config, items, destination_state, freight)?;
        tracing::debug!(
            state = destination_state,
            duty = %breakdown.import_duty,
            icms = %breakdown.icms,
            "tax quote computed"
        );
        Ok(breakdown)
    }
}
