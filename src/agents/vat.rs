//! VAT position, VAT-201 return and registration duty.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use super::{envelope, Agent, AgentContext};
use crate::aggregator::TransactionKind;
use crate::error::Result;
use crate::models::FinancialPeriod;
use crate::scoring::vat::{
    self, RegistrationStatus, SupplyBreakdown, TransactionVat, TrnValidation, VatLine,
    VatPosition, VatReturn, VatSummary,
};
use crate::store::{Row, RowExt};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VatFiling {
    pub trn: String,
    pub business_name: String,
    #[serde(flatten)]
    pub vat_return: VatReturn,
}

pub struct VatAgent {
    ctx: AgentContext,
}

/// Split sales by VAT treatment; anything not zero-rated or exempt is standard.
fn supplies(sales: &[Row]) -> SupplyBreakdown {
    let mut breakdown = SupplyBreakdown::default();
    for sale in sales {
        let amount = sale.num("amount_aed");
        match sale.text("vat_category") {
            "zero_rated" => breakdown.zero_rated += amount,
            "exempt" => breakdown.exempt += amount,
            _ => breakdown.standard_rated += amount,
        }
    }
    breakdown
}

/// Fields the monthly summary reads from each transaction.
const SUMMARY_FIELDS: [&str; 5] = ["date", "amount_aed", "vat_amount", "vat_category", "category"];

fn vat_line(row: &Row) -> Option<VatLine> {
    Some(VatLine {
        date: row.date("date")?,
        amount: row.num("amount_aed"),
        vat_amount: row.opt_num("vat_amount"),
        treatment: row.opt_text("vat_category").map(str::to_string),
        category: row.opt_text("category").unwrap_or("general_goods").to_string(),
    })
}

impl VatAgent {
    pub fn new(ctx: AgentContext) -> Self {
        Self { ctx }
    }

    fn quarter_period(&self, quarter: Option<&str>) -> Result<(String, FinancialPeriod)> {
        let token = quarter
            .map(str::to_string)
            .unwrap_or_else(|| FinancialPeriod::current_quarter_token(self.ctx.today()));
        let period = FinancialPeriod::from_quarter(&token)?;
        Ok((token, period))
    }

    /// Position plus the purchase total that backs the input VAT.
    async fn position_with_purchases(
        &self,
        user_id: &str,
        quarter: Option<&str>,
    ) -> Result<(VatPosition, f64)> {
        let (token, period) = self.quarter_period(quarter)?;
        let agg = &self.ctx.aggregator;

        let sales = agg
            .transactions(
                user_id,
                &period,
                Some(TransactionKind::Sale),
                &["amount_aed", "vat_amount", "vat_category"],
            )
            .await?;
        let output_vat: f64 = sales.iter().map(|s| s.num("vat_amount")).sum();

        let mut purchases = 0.0;
        let mut input_vat = 0.0;
        for kind in [TransactionKind::Purchase, TransactionKind::Expense] {
            purchases += agg.sum_transactions(user_id, &period, kind).await?;
            input_vat += agg.sum_field(user_id, &period, kind, "vat_amount").await?;
        }

        let position = vat::vat_position(&token, &period, supplies(&sales), output_vat, input_vat);
        info!(
            "VAT {} for {}: {:?} {:.2} AED",
            token, user_id, position.position, position.amount_due
        );
        Ok((position, purchases))
    }

    pub async fn vat_position(&self, user_id: &str, quarter: Option<&str>) -> Result<VatPosition> {
        Ok(self.position_with_purchases(user_id, quarter).await?.0)
    }

    pub async fn vat_return(&self, user_id: &str, quarter: Option<&str>) -> Result<VatFiling> {
        let (position, purchases) = self.position_with_purchases(user_id, quarter).await?;
        let profile = self.ctx.aggregator.business_profile(user_id).await?;

        let trn = profile
            .as_ref()
            .and_then(|p| p.opt_text("trn"))
            .filter(|t| !t.is_empty())
            .unwrap_or("NOT_REGISTERED")
            .to_string();
        let business_name = profile
            .as_ref()
            .map(|p| p.text("business_name").to_string())
            .unwrap_or_default();

        Ok(VatFiling {
            trn,
            business_name,
            vat_return: vat::vat_return(position, purchases, &self.ctx.tables.vat),
        })
    }

    pub async fn registration_status(&self, user_id: &str) -> Result<RegistrationStatus> {
        let period = FinancialPeriod::last_days(365, self.ctx.today());
        let annual_sales = self
            .ctx
            .aggregator
            .sum_transactions(user_id, &period, TransactionKind::Sale)
            .await?;
        let is_registered = self
            .ctx
            .aggregator
            .business_profile(user_id)
            .await?
            .and_then(|p| p.opt_text("trn").map(|t| !t.is_empty()))
            .unwrap_or(false);

        Ok(vat::registration_status(
            annual_sales,
            is_registered,
            &self.ctx.tables.vat,
        ))
    }

    /// Output and input VAT per calendar month over the last `months` months.
    pub async fn vat_summary(&self, user_id: &str, months: u32) -> Result<VatSummary> {
        let today = self.ctx.today();
        let period = FinancialPeriod::new(vat::summary_start(months, today), today);
        let agg = &self.ctx.aggregator;

        let sales = agg
            .transactions(user_id, &period, Some(TransactionKind::Sale), &SUMMARY_FIELDS)
            .await?;
        let mut purchases = Vec::new();
        for kind in [TransactionKind::Purchase, TransactionKind::Expense] {
            purchases.extend(
                agg.transactions(user_id, &period, Some(kind), &SUMMARY_FIELDS)
                    .await?,
            );
        }

        let sales: Vec<VatLine> = sales.iter().filter_map(vat_line).collect();
        let purchases: Vec<VatLine> = purchases.iter().filter_map(vat_line).collect();
        let summary = vat::vat_summary(&sales, &purchases, months, today, &self.ctx.tables.vat);
        info!(
            "VAT summary for {} over {} months: net {:.2} AED",
            user_id, months, summary.total_net_vat
        );
        Ok(summary)
    }

    pub fn validate_trn(&self, trn: &str) -> TrnValidation {
        vat::validate_trn(trn)
    }

    pub fn transaction_vat(&self, amount: f64, category: &str, inclusive: bool) -> TransactionVat {
        vat::transaction_vat(amount, category, inclusive, &self.ctx.tables.vat)
    }
}

#[async_trait]
impl Agent for VatAgent {
    fn name(&self) -> &str {
        "vat"
    }

    async fn analyze(&self, user_id: &str) -> Result<Value> {
        let position = self.vat_position(user_id, None).await?;
        envelope::success(&position)
    }
}
