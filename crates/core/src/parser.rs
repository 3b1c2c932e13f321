//! Receipt text parsing.
//!
//! Extraction is an ordered grammar of line matchers with named groups,
//! each testable on its own. Policy split: store/date/total are
//! all-or-nothing for the receipt (a miss rejects the whole receipt, no
//! partial persists), while item-level prediction failures degrade to the
//! keyword path so one bad item cannot sink an otherwise good receipt.

use std::sync::LazyLock;

use regex::Regex;
use time::{Date, Month};

use crate::error::{CoreError, CoreResult};
use crate::predictor::{ExpiryPredictor, PredictionMethod};

/// Store name used when no recognizable header line is present.
pub const UNKNOWN_STORE: &str = "UNKNOWN";

static STORE_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)] // pattern is a compile-time constant
    Regex::new(
        r"(?im)\b(lidl|aldi|tesco|sainsbury'?s?|asda|morrisons|co-?op|spar|waitrose)\b",
    )
    .unwrap()
});

static DATE_LABELED_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"(?im)^.*\bdate\b[:\s]+(\d{1,2})/(\d{1,2})/(\d{2,4})").unwrap()
});

static DATE_BARE_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"\b(\d{2})/(\d{2})/(\d{2})\b").unwrap()
});

static TOTAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"(?im)^.*\btotal\b\D*(\d+)[.,](\d{2})\s*$").unwrap()
});

// Item line: name, decimal price, single-letter VAT code, end of line.
static ITEM_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"(?m)^\s*(?P<name>.+?)\s+(?P<euros>\d+)[.,](?P<cents>\d{2})\s+(?P<vat>[ABC])\s*$")
        .unwrap()
});

/// Structural extraction result, before expiry prediction.
#[derive(Debug, Clone, PartialEq)]
pub struct RawReceipt {
    pub store_name: String,
    pub purchase_date: Date,
    pub total_cents: i64,
    pub items: Vec<RawItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawItem {
    pub name: String,
    pub price_cents: i64,
    pub vat_code: String,
}

/// A fully parsed receipt, ready for persistence.
#[derive(Debug, Clone)]
pub struct ParsedReceipt {
    pub store_name: String,
    pub purchase_date: Date,
    pub total_cents: i64,
    pub raw_text: String,
    pub items: Vec<ParsedItem>,
}

#[derive(Debug, Clone)]
pub struct ParsedItem {
    pub name: String,
    pub price_cents: i64,
    pub quantity: i32,
    pub estimated_expiry_date: Date,
    pub category: Option<String>,
    pub vat_code: Option<String>,
    pub confidence: f64,
    pub method: PredictionMethod,
}

/// Parse a `DD/MM/YY` or `DD/MM/YYYY` token into a calendar date.
/// Impossible dates fail with [`CoreError::InvalidDate`], never a default.
pub fn parse_receipt_date(day: &str, month: &str, year: &str) -> CoreResult<Date> {
    let token = format!("{day}/{month}/{year}");
    let invalid = || CoreError::InvalidDate(token.clone());

    let day: u8 = day.parse().map_err(|_| invalid())?;
    let month_num: u8 = month.parse().map_err(|_| invalid())?;
    let mut year_num: i32 = year.parse().map_err(|_| invalid())?;
    if year_num < 100 {
        year_num += 2000;
    }

    let month = Month::try_from(month_num).map_err(|_| invalid())?;
    Date::from_calendar_date(year_num, month, day).map_err(|_| invalid())
}

/// Pure structural extraction. Fatal (`CoreError::Parse`) when the store
/// date or total is missing/unreadable or no line matches the item grammar.
pub fn extract(ocr_text: &str) -> CoreResult<RawReceipt> {
    let store_name = STORE_RE
        .captures(ocr_text)
        .map(|c| c[1].to_uppercase())
        .unwrap_or_else(|| UNKNOWN_STORE.to_string());

    let date_caps = DATE_LABELED_RE
        .captures(ocr_text)
        .or_else(|| DATE_BARE_RE.captures(ocr_text))
        .ok_or_else(|| CoreError::Parse("no purchase date found".to_string()))?;
    let purchase_date = parse_receipt_date(&date_caps[1], &date_caps[2], &date_caps[3])
        .map_err(|e| CoreError::Parse(format!("purchase date: {e}")))?;

    let total_caps = TOTAL_RE
        .captures(ocr_text)
        .ok_or_else(|| CoreError::Parse("no total found".to_string()))?;
    let total_cents = money_to_cents(&total_caps[1], &total_caps[2])?;

    let mut items = Vec::new();
    for caps in ITEM_RE.captures_iter(ocr_text) {
        // Header/footer noise simply fails the grammar and is skipped; the
        // total line never matches because it lacks a VAT code.
        let name = caps["name"].trim().to_string();
        if name.is_empty() {
            continue;
        }
        items.push(RawItem {
            name,
            price_cents: money_to_cents(&caps["euros"], &caps["cents"])?,
            vat_code: caps["vat"].to_string(),
        });
    }

    if items.is_empty() {
        return Err(CoreError::Parse("no line items recognized".to_string()));
    }

    Ok(RawReceipt {
        store_name,
        purchase_date,
        total_cents,
        items,
    })
}

fn money_to_cents(whole: &str, fraction: &str) -> CoreResult<i64> {
    let bad_amount = || CoreError::Parse(format!("unreadable amount: {whole}.{fraction}"));
    // OCR noise can produce arbitrarily long digit runs, so the arithmetic
    // stays checked instead of trusting the regex capture to fit.
    let whole_part: i64 = whole.parse().map_err(|_| bad_amount())?;
    let fraction_part: i64 = fraction.parse().map_err(|_| bad_amount())?;
    whole_part
        .checked_mul(100)
        .and_then(|v| v.checked_add(fraction_part))
        .ok_or_else(bad_amount)
}

pub struct ReceiptParser {
    predictor: ExpiryPredictor,
}

impl ReceiptParser {
    pub fn new(predictor: ExpiryPredictor) -> Self {
        Self { predictor }
    }

    /// Parse OCR text into a receipt with predicted expiry dates.
    pub async fn parse(&self, ocr_text: &str) -> CoreResult<ParsedReceipt> {
        let raw = extract(ocr_text)?;

        let mut items = Vec::with_capacity(raw.items.len());
        for raw_item in raw.items {
            let prediction = match self
                .predictor
                .predict(&raw_item.name, raw.purchase_date)
                .await
            {
                Ok(p) => p,
                Err(e) => {
                    // Item-level resilience: degrade this one item to the
                    // keyword path instead of rejecting the receipt.
                    tracing::warn!(
                        item = %raw_item.name,
                        error = %e,
                        "Prediction failed, using keyword fallback for item"
                    );
                    self.predictor
                        .predict_keyword(&raw_item.name, raw.purchase_date)?
                }
            };

            items.push(ParsedItem {
                name: raw_item.name,
                price_cents: raw_item.price_cents,
                quantity: 1,
                estimated_expiry_date: prediction.expiry_date,
                category: Some(prediction.category),
                vat_code: Some(raw_item.vat_code),
                confidence: prediction.confidence,
                method: prediction.method,
            });
        }

        Ok(ParsedReceipt {
            store_name: raw.store_name,
            purchase_date: raw.purchase_date,
            total_cents: raw.total_cents,
            raw_text: ocr_text.to_string(),
            items,
        })
    }
}
