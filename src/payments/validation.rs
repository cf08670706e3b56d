//! Checkout input collection
//!
//! Turns the posted checkout fields into a validated [`CheckoutInput`]. All
//! checks are local: nothing here talks to Cielo.

use crate::payments::gateway::GatewaySettings;
use crate::payments::types::{CardBrand, CardData, CardExpiry, PaymentMethodKind, StoreContract};
use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fmt;

/// Checkout fields as posted by the storefront form
#[derive(Clone, Default, Deserialize)]
pub struct CheckoutForm {
    #[serde(default, rename = "cielo_debit_card", alias = "cielo_credit_card")]
    pub card_brand: Option<String>,
    #[serde(default, rename = "cielo_installments")]
    pub installments: Option<String>,
    #[serde(default, rename = "cielo_holder_name")]
    pub holder_name: Option<String>,
    #[serde(default, rename = "cielo_card_number")]
    pub card_number: Option<String>,
    #[serde(default, rename = "cielo_card_expiry")]
    pub card_expiry: Option<String>,
    #[serde(default, rename = "cielo_card_cvc")]
    pub card_cvc: Option<String>,
}

impl fmt::Debug for CheckoutForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckoutForm")
            .field("card_brand", &self.card_brand)
            .field("installments", &self.installments)
            .field("holder_name", &self.holder_name)
            .field("card_number", &self.card_number.as_ref().map(|_| "<redacted>"))
            .field("card_expiry", &self.card_expiry)
            .field("card_cvc", &self.card_cvc.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Validated checkout input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutInput {
    /// Brand as selected by the buyer
    pub brand: CardBrand,
    pub installments: u32,
    /// Present for the webservice store contract only
    pub card: Option<CardData>,
}

fn field(value: &Option<String>) -> &str {
    value.as_deref().map(str::trim).unwrap_or_default()
}

/// Collect and validate the checkout fields.
///
/// The brand is checked first; card fields are only looked at once the brand
/// is acceptable. Every card field problem is reported, not just the first.
pub fn collect(
    form: &CheckoutForm,
    settings: &GatewaySettings,
    order_total: Decimal,
    today: NaiveDate,
) -> Result<CheckoutInput, Vec<String>> {
    let brand = validate_brand(field(&form.card_brand), &settings.methods).map_err(|e| vec![e])?;

    let mut errors = Vec::new();

    let installments = match settings.kind {
        PaymentMethodKind::Debit => 1,
        PaymentMethodKind::Credit => {
            let installments = parse_installments(field(&form.installments));
            if installments > settings.max_installments {
                errors.push("Invalid number of installments.".to_string());
            } else if installments > 1
                && settings.smallest_installment > Decimal::ZERO
                && order_total / Decimal::from(installments) < settings.smallest_installment
            {
                errors.push("The installment value is below the minimum accepted.".to_string());
            }
            installments
        }
    };

    let card = match settings.store_contract {
        StoreContract::BuypageCielo => None,
        StoreContract::Webservice => validate_card_fields(form, today, &mut errors),
    };

    if errors.is_empty() {
        Ok(CheckoutInput {
            brand,
            installments,
            card,
        })
    } else {
        Err(errors)
    }
}

pub fn validate_brand(raw: &str, accepted: &[CardBrand]) -> Result<CardBrand, String> {
    if raw.is_empty() {
        return Err("Please select a card brand.".to_string());
    }

    match raw.parse::<CardBrand>() {
        Ok(brand) if accepted.contains(&brand) => Ok(brand),
        Ok(brand) => Err(format!("{} is not accepted.", brand.display_name())),
        Err(_) => Err(format!("{} is not accepted.", raw)),
    }
}

/// Missing or malformed installments mean a single payment
fn parse_installments(raw: &str) -> u32 {
    raw.parse::<u32>().ok().filter(|n| *n > 0).unwrap_or(1)
}

fn validate_card_fields(
    form: &CheckoutForm,
    today: NaiveDate,
    errors: &mut Vec<String>,
) -> Option<CardData> {
    let holder_name = field(&form.holder_name);
    if holder_name.is_empty() {
        errors.push("Please type the card holder name.".to_string());
    }

    let number: String = field(&form.card_number)
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    let number_valid = is_card_number(&number);
    if number.is_empty() {
        errors.push("Please type the card number.".to_string());
    } else if !number_valid {
        errors.push("The card number is invalid.".to_string());
    }

    let raw_expiry = field(&form.card_expiry);
    let expiry = parse_expiry(raw_expiry);
    match expiry {
        _ if raw_expiry.is_empty() => {
            errors.push("Please type the card expiry date.".to_string())
        }
        None => errors.push("The card expiry date is invalid.".to_string()),
        Some(expiry) if is_expired(&expiry, today) => {
            errors.push("The card expiry date has passed.".to_string())
        }
        Some(_) => {}
    }

    let cvv = field(&form.card_cvc);
    let cvv_valid = (3..=4).contains(&cvv.len()) && cvv.chars().all(|c| c.is_ascii_digit());
    if cvv.is_empty() {
        errors.push("Please type the cvv code for the card.".to_string());
    } else if !cvv_valid {
        errors.push("The card security code is invalid.".to_string());
    }

    match expiry {
        Some(expiry) if !holder_name.is_empty() && number_valid && cvv_valid => Some(CardData {
            holder_name: holder_name.to_string(),
            number,
            expiry,
            cvv: cvv.to_string(),
        }),
        _ => None,
    }
}

fn is_card_number(number: &str) -> bool {
    (13..=19).contains(&number.len()) && number.chars().all(|c| c.is_ascii_digit())
}

/// Accepts `MM/YY` and `MM/YYYY`, with or without spaces around the slash
pub fn parse_expiry(raw: &str) -> Option<CardExpiry> {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    let (month, year) = compact.split_once('/')?;

    let digits = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());
    if !digits(month) || month.len() > 2 || !digits(year) {
        return None;
    }

    let month: u32 = month.parse().ok()?;
    if !(1..=12).contains(&month) {
        return None;
    }

    let year: i32 = match year.len() {
        2 => 2000 + year.parse::<i32>().ok()?,
        4 => year.parse().ok()?,
        _ => return None,
    };

    Some(CardExpiry { month, year })
}

fn is_expired(expiry: &CardExpiry, today: NaiveDate) -> bool {
    (expiry.year, expiry.month) < (today.year(), today.month())
}
