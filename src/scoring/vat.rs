//! UAE VAT position, return boxes, registration and TRN checks.

use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use super::round2;
use super::tables::VatTables;
use crate::models::{quarter_of, FinancialPeriod};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VatPositionKind {
    Payable,
    Refundable,
}

/// Sales in the period split by VAT treatment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SupplyBreakdown {
    pub standard_rated: f64,
    pub zero_rated: f64,
    pub exempt: f64,
}

impl SupplyBreakdown {
    pub fn total(&self) -> f64 {
        self.standard_rated + self.zero_rated + self.exempt
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VatPosition {
    pub period: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub supplies: SupplyBreakdown,
    pub output_vat: f64,
    pub input_vat: f64,
    pub net_vat: f64,
    pub position: VatPositionKind,
    pub amount_due: f64,
    pub filing_deadline: NaiveDate,
}

/// 28th of the month after the quarter that starts at `period.start`.
pub fn filing_deadline(period: &FinancialPeriod) -> NaiveDate {
    let quarter = quarter_of(period.start);
    let end_month = quarter * 3;
    let (year, month) = if end_month == 12 {
        (period.start.year() + 1, 1)
    } else {
        (period.start.year(), end_month + 1)
    };
    // The 28th exists in every month.
    NaiveDate::from_ymd_opt(year, month, 28).unwrap_or(period.end)
}

pub fn vat_position(
    label: &str,
    period: &FinancialPeriod,
    supplies: SupplyBreakdown,
    output_vat: f64,
    input_vat: f64,
) -> VatPosition {
    let net = round2(output_vat - input_vat);
    let position = if net > 0.0 {
        VatPositionKind::Payable
    } else {
        VatPositionKind::Refundable
    };

    VatPosition {
        period: label.to_string(),
        start: period.start,
        end: period.end,
        supplies,
        output_vat: round2(output_vat),
        input_vat: round2(input_vat),
        net_vat: net,
        position,
        amount_due: net.abs(),
        filing_deadline: filing_deadline(period),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrnStatus {
    Valid,
    Invalid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrnValidation {
    pub status: TrnStatus,
    pub trn: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formatted: Option<String>,
    pub errors: Vec<String>,
}

/// Check a UAE Tax Registration Number: 15 digits starting with 100.
///
/// Spaces and dashes are ignored.
pub fn validate_trn(trn: &str) -> TrnValidation {
    let cleaned: String = trn.chars().filter(|c| *c != ' ' && *c != '-').collect();
    let mut errors = Vec::new();

    if !cleaned.chars().all(|c| c.is_ascii_digit()) {
        errors.push("TRN must contain only digits".to_string());
    }
    if cleaned.chars().count() != 15 {
        errors.push(format!("TRN must be 15 digits (got {})", cleaned.chars().count()));
    }
    if !cleaned.starts_with("100") {
        errors.push("TRN must start with 100".to_string());
    }

    if errors.is_empty() {
        let formatted = format!("{}-{}-{}", &cleaned[..3], &cleaned[3..9], &cleaned[9..]);
        TrnValidation {
            status: TrnStatus::Valid,
            trn: cleaned,
            formatted: Some(formatted),
            errors,
        }
    } else {
        TrnValidation {
            status: TrnStatus::Invalid,
            trn: cleaned,
            formatted: None,
            errors,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionVat {
    pub category: String,
    pub treatment: String,
    pub rate: f64,
    pub base_amount: f64,
    pub vat_amount: f64,
    pub total_amount: f64,
}

/// Rate for a product category; `None` for exempt supplies.
pub fn category_rate(category: &str, tables: &VatTables) -> (String, Option<f64>) {
    let treatment = tables
        .categories
        .get(category)
        .cloned()
        .unwrap_or_else(|| "standard".to_string());
    let rate = match treatment.as_str() {
        "zero_rated" => Some(0.0),
        "exempt" => None,
        _ => Some(tables.standard_rate),
    };
    (treatment, rate)
}

/// VAT breakdown for a single amount, VAT-inclusive or exclusive.
pub fn transaction_vat(amount: f64, category: &str, inclusive: bool, tables: &VatTables) -> TransactionVat {
    let (treatment, rate) = category_rate(category, tables);

    let (base, vat) = match rate {
        None => (amount, 0.0),
        Some(rate) if inclusive => {
            let base = amount / (1.0 + rate);
            (base, amount - base)
        }
        Some(rate) => (amount, amount * rate),
    };

    TransactionVat {
        category: category.to_string(),
        treatment,
        rate: rate.unwrap_or(0.0),
        base_amount: round2(base),
        vat_amount: round2(vat),
        total_amount: round2(base + vat),
    }
}

/// VAT-201 return boxes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VatReturnBoxes {
    pub box1_standard_rated_supplies: f64,
    pub box2_output_vat: f64,
    pub box3_zero_rated_supplies: f64,
    pub box4_exempt_supplies: f64,
    pub box5_total_supplies: f64,
    pub box6_total_output_vat: f64,
    pub box7_standard_rated_expenses: f64,
    pub box8_recoverable_input_vat: f64,
    pub box9_payable: f64,
    pub box10_refundable: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilingRecommendation {
    pub kind: String,
    pub priority: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VatReturn {
    pub position: VatPosition,
    pub boxes: VatReturnBoxes,
    pub recommendations: Vec<FilingRecommendation>,
}

pub fn vat_return(position: VatPosition, purchases: f64, tables: &VatTables) -> VatReturn {
    let supplies = &position.supplies;
    let net = position.net_vat;
    let boxes = VatReturnBoxes {
        box1_standard_rated_supplies: round2(supplies.standard_rated),
        box2_output_vat: round2(supplies.standard_rated * tables.standard_rate),
        box3_zero_rated_supplies: round2(supplies.zero_rated),
        box4_exempt_supplies: round2(supplies.exempt),
        box5_total_supplies: round2(supplies.total()),
        box6_total_output_vat: position.output_vat,
        box7_standard_rated_expenses: round2(purchases),
        box8_recoverable_input_vat: position.input_vat,
        box9_payable: net.max(0.0),
        box10_refundable: net.min(0.0).abs(),
    };

    let mut recommendations = Vec::new();
    if position.position == VatPositionKind::Payable {
        recommendations.push(FilingRecommendation {
            kind: "PAYMENT".to_string(),
            priority: "high".to_string(),
            message: format!(
                "Pay AED {:.2} by {}",
                position.amount_due, position.filing_deadline
            ),
        });
    }
    if supplies.zero_rated > 0.0 {
        recommendations.push(FilingRecommendation {
            kind: "DOCUMENTATION".to_string(),
            priority: "medium".to_string(),
            message: "Keep export and zero-rated supply evidence on file".to_string(),
        });
    }
    if position.input_vat < position.output_vat * 0.3 {
        recommendations.push(FilingRecommendation {
            kind: "INPUT_VAT".to_string(),
            priority: "medium".to_string(),
            message: "Input VAT looks low; make sure all supplier tax invoices are recorded"
                .to_string(),
        });
    }

    VatReturn {
        position,
        boxes,
        recommendations,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegistrationRequirement {
    Mandatory,
    Voluntary,
    NotRequired,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationStatus {
    pub annual_sales: f64,
    pub requirement: RegistrationRequirement,
    pub mandatory_threshold: f64,
    pub voluntary_threshold: f64,
    pub is_registered: bool,
    pub message: String,
}

/// Registration duty from trailing twelve-month sales.
pub fn registration_status(annual_sales: f64, is_registered: bool, tables: &VatTables) -> RegistrationStatus {
    let (requirement, message) = if annual_sales >= tables.mandatory_threshold {
        (
            RegistrationRequirement::Mandatory,
            "VAT registration is mandatory for your turnover",
        )
    } else if annual_sales >= tables.voluntary_threshold {
        (
            RegistrationRequirement::Voluntary,
            "You may register for VAT voluntarily",
        )
    } else {
        (
            RegistrationRequirement::NotRequired,
            "VAT registration is not required yet",
        )
    };

    RegistrationStatus {
        annual_sales: round2(annual_sales),
        requirement,
        mandatory_threshold: tables.mandatory_threshold,
        voluntary_threshold: tables.voluntary_threshold,
        is_registered,
        message: message.to_string(),
    }
}

/// A sale or purchase as the monthly summary needs it.
#[derive(Debug, Clone, PartialEq)]
pub struct VatLine {
    pub date: NaiveDate,
    pub amount: f64,
    /// VAT recorded on the transaction, when the store has it.
    pub vat_amount: Option<f64>,
    /// `standard`, `zero_rated` or `exempt` when the transaction carries one.
    pub treatment: Option<String>,
    pub category: String,
}

impl VatLine {
    /// Recorded VAT, or the amount times the rate for its treatment.
    fn vat(&self, tables: &VatTables) -> f64 {
        if let Some(vat) = self.vat_amount {
            return vat;
        }
        let rate = match self.treatment.as_deref() {
            Some("zero_rated") | Some("exempt") => 0.0,
            Some("standard") => tables.standard_rate,
            _ => category_rate(&self.category, tables).1.unwrap_or(0.0),
        };
        self.amount * rate
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyVat {
    /// `YYYY-MM`.
    pub month: String,
    pub output_vat: f64,
    pub input_vat: f64,
    pub net_vat: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VatSummary {
    /// Oldest month first, ending with the month of `today`.
    pub summaries: Vec<MonthlyVat>,
    pub total_output_vat: f64,
    pub total_input_vat: f64,
    pub total_net_vat: f64,
    pub currency: String,
}

/// First day of the oldest month in a `months`-long window ending with `today`'s month.
pub fn summary_start(months: u32, today: NaiveDate) -> NaiveDate {
    let this_month = today.with_day(1).unwrap_or(today);
    this_month
        .checked_sub_months(Months::new(months.saturating_sub(1)))
        .unwrap_or(this_month)
}

/// Output, input and net VAT per calendar month for the last `months` months.
///
/// Months without transactions are listed with zeros. Lines outside the
/// window are ignored.
pub fn vat_summary(
    sales: &[VatLine],
    purchases: &[VatLine],
    months: u32,
    today: NaiveDate,
    tables: &VatTables,
) -> VatSummary {
    let start = summary_start(months, today);
    let mut buckets: Vec<(NaiveDate, f64, f64)> = (0..months)
        .filter_map(|offset| start.checked_add_months(Months::new(offset)))
        .map(|month| (month, 0.0, 0.0))
        .collect();

    let slot = |date: NaiveDate| {
        if date < start || date > today {
            return None;
        }
        let index = (date.year() - start.year()) * 12 + date.month() as i32 - start.month() as i32;
        usize::try_from(index).ok()
    };

    for line in sales {
        if let Some(bucket) = slot(line.date).and_then(|i| buckets.get_mut(i)) {
            bucket.1 += line.vat(tables);
        }
    }
    for line in purchases {
        if let Some(bucket) = slot(line.date).and_then(|i| buckets.get_mut(i)) {
            bucket.2 += line.vat(tables);
        }
    }

    let summaries: Vec<MonthlyVat> = buckets
        .into_iter()
        .map(|(month, output, input)| MonthlyVat {
            month: month.format("%Y-%m").to_string(),
            output_vat: round2(output),
            input_vat: round2(input),
            net_vat: round2(output - input),
        })
        .collect();

    let total_output: f64 = summaries.iter().map(|m| m.output_vat).sum();
    let total_input: f64 = summaries.iter().map(|m| m.input_vat).sum();
    VatSummary {
        total_output_vat: round2(total_output),
        total_input_vat: round2(total_input),
        total_net_vat: round2(total_output - total_input),
        summaries,
        currency: "AED".to_string(),
    }
}
