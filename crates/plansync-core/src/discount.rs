//! Normalization of selling-plan pricing adjustments.
//!
//! Shopify accepts percentage adjustments in two encodings with no type tag
//! telling them apart: a fraction of one (`0.10` meaning 10%) and a whole
//! percentage (`10.0` meaning 10%). Values may also arrive negated (`-10.0`)
//! depending on which admin surface wrote them. [`normalize`] resolves every
//! such input into one canonical, non-negative integer percent and fails
//! loudly instead of displaying a value it cannot vouch for.
//!
//! # Boundary at `1.0`
//!
//! Magnitudes strictly below `1` are read as fractions; everything else is a
//! whole percentage. `1.0` therefore means "1% off", never "100% off". The
//! rule cannot distinguish a legitimate 97% discount from a "3% off" plan
//! mis-encoded upstream as `0.97`; such plans must be corrected at the source.

use std::fmt;
use std::str::FromStr;

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

/// Type of pricing adjustment attached to a selling plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiscountKind {
    #[serde(rename = "PERCENTAGE")]
    Percentage,
    #[serde(rename = "FIXED_AMOUNT")]
    FixedAmount,
    /// An override price, not a delta.
    #[serde(rename = "PRICE", alias = "FIXED_PRICE")]
    FixedPrice,
}

impl DiscountKind {
    /// The `SellingPlanPricingPolicyAdjustmentType` value Shopify expects.
    #[must_use]
    pub fn as_shopify_str(self) -> &'static str {
        match self {
            DiscountKind::Percentage => "PERCENTAGE",
            DiscountKind::FixedAmount => "FIXED_AMOUNT",
            DiscountKind::FixedPrice => "PRICE",
        }
    }
}

impl fmt::Display for DiscountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscountKind::Percentage => write!(f, "percentage"),
            DiscountKind::FixedAmount => write!(f, "fixed_amount"),
            DiscountKind::FixedPrice => write!(f, "fixed_price"),
        }
    }
}

impl FromStr for DiscountKind {
    type Err = DataIntegrityError;

    /// Accepts Shopify's adjustment type names and their lowercase or
    /// hyphenated spellings (`PERCENTAGE`, `fixed-amount`, `PRICE`, `fixed_price`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "PERCENTAGE" | "PERCENT" => Ok(DiscountKind::Percentage),
            "FIXED_AMOUNT" => Ok(DiscountKind::FixedAmount),
            "PRICE" | "FIXED_PRICE" => Ok(DiscountKind::FixedPrice),
            _ => Err(report(DataIntegrityError::UnknownKind { raw: s.to_owned() })),
        }
    }
}

/// Raised when a discount cannot be turned into a value that is safe to
/// show to a customer or send to Shopify.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataIntegrityError {
    #[error("{kind} discount {raw} normalizes to {percent}%, outside 0..=100")]
    PercentOutOfRange {
        raw: Decimal,
        kind: DiscountKind,
        percent: Decimal,
    },

    #[error("unrecognized discount kind \"{raw}\"")]
    UnknownKind { raw: String },

    #[error("discount magnitude {raw} is not a finite number")]
    NonFinite { raw: String },

    #[error("discount magnitude \"{raw}\" is not a decimal number")]
    InvalidMagnitude { raw: String },
}

/// Logs an integrity failure with its raw input before handing it back.
fn report(err: DataIntegrityError) -> DataIntegrityError {
    match &err {
        DataIntegrityError::PercentOutOfRange { raw, kind, percent } => {
            tracing::error!(%raw, %kind, %percent, "discount failed integrity check");
        }
        DataIntegrityError::UnknownKind { raw }
        | DataIntegrityError::NonFinite { raw }
        | DataIntegrityError::InvalidMagnitude { raw } => {
            tracing::error!(raw = %raw, error = %err, "discount failed integrity check");
        }
    }
    err
}

/// One pricing adjustment rule as received from upstream.
///
/// Immutable once built; a fresh fetch replaces it wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountSpec {
    kind: DiscountKind,
    raw_magnitude: Decimal,
}

impl DiscountSpec {
    #[must_use]
    pub fn new(kind: DiscountKind, raw_magnitude: Decimal) -> Self {
        Self {
            kind,
            raw_magnitude,
        }
    }

    /// Builds a spec from a float as it comes out of JSON.
    ///
    /// # Errors
    ///
    /// Returns [`DataIntegrityError::NonFinite`] for `NaN` and infinities,
    /// and [`DataIntegrityError::InvalidMagnitude`] for finite values
    /// outside the decimal range.
    pub fn from_f64(kind: DiscountKind, raw: f64) -> Result<Self, DataIntegrityError> {
        if !raw.is_finite() {
            return Err(report(DataIntegrityError::NonFinite {
                raw: raw.to_string(),
            }));
        }
        let raw_magnitude = Decimal::from_f64(raw).ok_or_else(|| {
            report(DataIntegrityError::InvalidMagnitude {
                raw: raw.to_string(),
            })
        })?;
        Ok(Self::new(kind, raw_magnitude))
    }

    /// Parses the textual kind and magnitude used on the command line and in
    /// stored payloads.
    ///
    /// # Errors
    ///
    /// Returns [`DataIntegrityError::UnknownKind`] or
    /// [`DataIntegrityError::InvalidMagnitude`].
    pub fn parse(kind: &str, raw: &str) -> Result<Self, DataIntegrityError> {
        let kind = kind.parse::<DiscountKind>()?;
        let raw_magnitude = Decimal::from_str(raw.trim())
            .or_else(|_| Decimal::from_scientific(raw.trim()))
            .map_err(|_| {
                report(DataIntegrityError::InvalidMagnitude {
                    raw: raw.to_owned(),
                })
            })?;
        Ok(Self::new(kind, raw_magnitude))
    }

    #[must_use]
    pub fn kind(&self) -> DiscountKind {
        self.kind
    }

    #[must_use]
    pub fn raw_magnitude(&self) -> Decimal {
        self.raw_magnitude
    }
}

/// Canonical form of a [`DiscountSpec`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizedDiscount {
    /// Whole percent off, always within `0..=100`.
    Percent(u8),
    /// Amount off, never negative.
    AmountOff(Decimal),
    /// Override price, passed through unchanged.
    Price(Decimal),
}

impl NormalizedDiscount {
    #[must_use]
    pub fn percent(&self) -> Option<u8> {
        match self {
            NormalizedDiscount::Percent(p) => Some(*p),
            _ => None,
        }
    }

    #[must_use]
    pub fn kind(&self) -> DiscountKind {
        match self {
            NormalizedDiscount::Percent(_) => DiscountKind::Percentage,
            NormalizedDiscount::AmountOff(_) => DiscountKind::FixedAmount,
            NormalizedDiscount::Price(_) => DiscountKind::FixedPrice,
        }
    }

    /// Customer-facing label: `"10% off"`, `"$5.00 off"`, `"$19.99"`.
    #[must_use]
    pub fn label(&self, currency_code: &str) -> String {
        match self {
            NormalizedDiscount::Percent(p) => format!("{p}% off"),
            NormalizedDiscount::AmountOff(amount) => {
                format!("{} off", Money::new(*amount, currency_code))
            }
            NormalizedDiscount::Price(amount) => Money::new(*amount, currency_code).to_string(),
        }
    }

    /// Shopify `SellingPlanPricingPolicyValueInput` for this adjustment.
    #[must_use]
    pub fn adjustment_value(&self) -> serde_json::Value {
        match self {
            NormalizedDiscount::Percent(p) => json!({ "percentage": p }),
            NormalizedDiscount::AmountOff(amount) | NormalizedDiscount::Price(amount) => {
                json!({ "fixedValue": two_places(*amount).to_string() })
            }
        }
    }
}

/// Converts a raw discount into its canonical form.
///
/// For percentages: take the absolute value `m`; if `m < 1` the result is
/// `round(m * 100)`, otherwise `round(m)`, rounding half away from zero.
/// Fixed amounts lose their sign; fixed prices are passed through.
///
/// # Errors
///
/// Returns [`DataIntegrityError::PercentOutOfRange`] when a percentage
/// lands above 100. The value is never clamped.
pub fn normalize(spec: &DiscountSpec) -> Result<NormalizedDiscount, DataIntegrityError> {
    match spec.kind {
        DiscountKind::Percentage => {
            let m = spec.raw_magnitude.abs();
            let scaled = if m < Decimal::ONE {
                m * Decimal::ONE_HUNDRED
            } else {
                m
            };
            let percent = scaled.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
            let out_of_range = || {
                report(DataIntegrityError::PercentOutOfRange {
                    raw: spec.raw_magnitude,
                    kind: spec.kind,
                    percent,
                })
            };
            if percent > Decimal::ONE_HUNDRED {
                return Err(out_of_range());
            }
            let value = percent.to_u8().ok_or_else(out_of_range)?;
            Ok(NormalizedDiscount::Percent(value))
        }
        DiscountKind::FixedAmount => Ok(NormalizedDiscount::AmountOff(spec.raw_magnitude.abs())),
        DiscountKind::FixedPrice => Ok(NormalizedDiscount::Price(spec.raw_magnitude)),
    }
}

fn two_places(amount: Decimal) -> Decimal {
    let mut rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded
}

/// A currency amount rendered for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Money {
    pub amount: Decimal,
    pub currency_code: String,
}

impl Money {
    #[must_use]
    pub fn new(amount: Decimal, currency_code: &str) -> Self {
        Self {
            amount,
            currency_code: currency_code.trim().to_ascii_uppercase(),
        }
    }

    fn symbol(&self) -> Option<&'static str> {
        match self.currency_code.as_str() {
            "USD" | "CAD" | "AUD" | "NZD" => Some("$"),
            "EUR" => Some("€"),
            "GBP" => Some("£"),
            _ => None,
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.amount.is_sign_negative() && !self.amount.is_zero() {
            "-"
        } else {
            ""
        };
        let digits = two_places(self.amount.abs());
        match self.symbol() {
            Some(symbol) => write!(f, "{sign}{symbol}{digits}"),
            None => write!(f, "{sign}{digits} {}", self.currency_code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).expect("valid decimal literal")
    }

    fn percent_of(raw: &str) -> Result<u8, DataIntegrityError> {
        normalize(&DiscountSpec::new(DiscountKind::Percentage, d(raw)))
            .map(|n| n.percent().expect("percentage kind yields a percent"))
    }

    #[test]
    fn every_hundredth_below_one_scales_by_hundred() {
        for hundredths in 0..100_i64 {
            let raw = Decimal::new(hundredths, 2);
            let got = normalize(&DiscountSpec::new(DiscountKind::Percentage, raw)).unwrap();
            assert_eq!(
                got,
                NormalizedDiscount::Percent(u8::try_from(hundredths).unwrap()),
                "raw {raw}"
            );
        }
    }

    #[test]
    fn whole_numbers_from_one_to_hundred_are_kept() {
        for whole in 1..=100_u8 {
            let raw = Decimal::from(whole);
            let got = normalize(&DiscountSpec::new(DiscountKind::Percentage, raw)).unwrap();
            assert_eq!(got, NormalizedDiscount::Percent(whole), "raw {raw}");
        }
    }

    #[test]
    fn sign_is_ignored_for_percentages() {
        for raw in ["0", "0.03", "0.1", "0.5", "0.97", "1", "10", "12.5", "99.4", "100"] {
            let positive = percent_of(raw).unwrap();
            let negative = percent_of(&format!("-{raw}")).unwrap();
            assert_eq!(positive, negative, "raw {raw}");
        }
    }

    #[test]
    fn documented_examples() {
        assert_eq!(percent_of("0.10").unwrap(), 10);
        assert_eq!(percent_of("-10.0").unwrap(), 10);
        assert_eq!(percent_of("0.97").unwrap(), 97);
    }

    #[test]
    fn one_is_read_as_one_percent() {
        assert_eq!(percent_of("1.0").unwrap(), 1);
        assert_eq!(percent_of("-1").unwrap(), 1);
        assert_eq!(percent_of("0.999").unwrap(), 100);
    }

    #[test]
    fn rounds_half_away_from_zero() {
        assert_eq!(percent_of("0.125").unwrap(), 13);
        assert_eq!(percent_of("0.124").unwrap(), 12);
        assert_eq!(percent_of("12.5").unwrap(), 13);
        assert_eq!(percent_of("-12.5").unwrap(), 13);
        assert_eq!(percent_of("99.49").unwrap(), 99);
    }

    #[test]
    fn above_hundred_is_an_integrity_error_not_a_clamp() {
        let err = percent_of("150").unwrap_err();
        assert_eq!(
            err,
            DataIntegrityError::PercentOutOfRange {
                raw: d("150"),
                kind: DiscountKind::Percentage,
                percent: d("150"),
            }
        );

        let err = percent_of("-250.0").unwrap_err();
        assert!(
            matches!(err, DataIntegrityError::PercentOutOfRange { raw, .. } if raw == d("-250.0"))
        );
    }

    #[test]
    fn just_above_hundred_after_rounding_fails() {
        assert_eq!(percent_of("100.4").unwrap(), 100);
        assert!(matches!(
            percent_of("100.5"),
            Err(DataIntegrityError::PercentOutOfRange { .. })
        ));
    }

    #[test]
    fn fixed_amount_discards_sign() {
        let n = normalize(&DiscountSpec::new(DiscountKind::FixedAmount, d("-5"))).unwrap();
        assert_eq!(n, NormalizedDiscount::AmountOff(d("5")));
        assert_eq!(n.label("USD"), "$5.00 off");
    }

    #[test]
    fn fixed_amount_is_not_percent_scaled() {
        let n = normalize(&DiscountSpec::new(DiscountKind::FixedAmount, d("0.5"))).unwrap();
        assert_eq!(n, NormalizedDiscount::AmountOff(d("0.5")));
        assert_eq!(n.label("usd"), "$0.50 off");
    }

    #[test]
    fn fixed_price_is_passed_through() {
        let n = normalize(&DiscountSpec::new(DiscountKind::FixedPrice, d("19.99"))).unwrap();
        assert_eq!(n, NormalizedDiscount::Price(d("19.99")));
        assert_eq!(n.label("USD"), "$19.99");
        assert_eq!(n.label("EUR"), "€19.99");
        assert_eq!(n.label("CHF"), "19.99 CHF");
    }

    #[test]
    fn fixed_price_above_hundred_is_fine() {
        let n = normalize(&DiscountSpec::new(DiscountKind::FixedPrice, d("249.5"))).unwrap();
        assert_eq!(n.label("GBP"), "£249.50");
    }

    #[test]
    fn percentage_label() {
        let n = normalize(&DiscountSpec::new(DiscountKind::Percentage, d("-10.0"))).unwrap();
        assert_eq!(n.label("USD"), "10% off");
    }

    #[test]
    fn money_renders_negative_amounts() {
        assert_eq!(Money::new(d("-3.5"), "USD").to_string(), "-$3.50");
        assert_eq!(Money::new(d("0"), "USD").to_string(), "$0.00");
    }

    #[test]
    fn kind_parsing_accepts_shopify_and_cli_spellings() {
        assert_eq!(
            "PERCENTAGE".parse::<DiscountKind>().unwrap(),
            DiscountKind::Percentage
        );
        assert_eq!(
            "fixed-amount".parse::<DiscountKind>().unwrap(),
            DiscountKind::FixedAmount
        );
        assert_eq!(
            "PRICE".parse::<DiscountKind>().unwrap(),
            DiscountKind::FixedPrice
        );
        assert_eq!(
            "fixed_price".parse::<DiscountKind>().unwrap(),
            DiscountKind::FixedPrice
        );
    }

    #[test]
    fn unknown_kind_is_an_integrity_error() {
        let err = "BOGO".parse::<DiscountKind>().unwrap_err();
        assert_eq!(
            err,
            DataIntegrityError::UnknownKind {
                raw: "BOGO".to_owned()
            }
        );
    }

    #[test]
    fn kind_serde_uses_shopify_names() {
        let json = serde_json::to_string(&DiscountKind::FixedPrice).unwrap();
        assert_eq!(json, "\"PRICE\"");
        let kind: DiscountKind = serde_json::from_str("\"FIXED_PRICE\"").unwrap();
        assert_eq!(kind, DiscountKind::FixedPrice);
    }

    #[test]
    fn from_f64_rejects_non_finite() {
        assert!(matches!(
            DiscountSpec::from_f64(DiscountKind::Percentage, f64::NAN),
            Err(DataIntegrityError::NonFinite { .. })
        ));
        assert!(matches!(
            DiscountSpec::from_f64(DiscountKind::Percentage, f64::INFINITY),
            Err(DataIntegrityError::NonFinite { .. })
        ));
    }

    #[test]
    fn from_f64_normalizes_like_decimal_input() {
        let spec = DiscountSpec::from_f64(DiscountKind::Percentage, -0.15).unwrap();
        assert_eq!(normalize(&spec).unwrap(), NormalizedDiscount::Percent(15));
    }

    #[test]
    fn parse_accepts_text_input() {
        let spec = DiscountSpec::parse("percentage", " -0.10 ").unwrap();
        assert_eq!(spec.kind(), DiscountKind::Percentage);
        assert_eq!(spec.raw_magnitude(), d("-0.10"));
    }

    #[test]
    fn parse_rejects_garbage_magnitude() {
        let err = DiscountSpec::parse("percentage", "ten").unwrap_err();
        assert_eq!(
            err,
            DataIntegrityError::InvalidMagnitude {
                raw: "ten".to_owned()
            }
        );
    }

    #[test]
    fn adjustment_value_carries_canonical_percent() {
        let n = normalize(&DiscountSpec::new(DiscountKind::Percentage, d("0.10"))).unwrap();
        assert_eq!(n.adjustment_value(), json!({ "percentage": 10 }));

        let n = normalize(&DiscountSpec::new(DiscountKind::FixedAmount, d("-4.5"))).unwrap();
        assert_eq!(n.adjustment_value(), json!({ "fixedValue": "4.50" }));
    }
}
