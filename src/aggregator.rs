//! Reads and sums transaction, customer and inventory records.
//!
//! A store response with an HTTP error status degrades to zero or an empty
//! list with a warning. A connectivity failure propagates.

use chrono::{Duration, NaiveDate};
use std::sync::Arc;
use tracing::warn;

use crate::error::Result;
use crate::models::{AggregateFigures, FinancialPeriod};
use crate::store::{Query, Row, RowExt, SortOrder, Store};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionKind {
    Sale,
    Purchase,
    Expense,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Sale => "sale",
            TransactionKind::Purchase => "purchase",
            TransactionKind::Expense => "expense",
        }
    }
}

/// Credit extended to customers, summed from customer records.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CreditTotals {
    pub outstanding: f64,
    pub collected: f64,
}

#[derive(Clone)]
pub struct DataAggregator {
    store: Arc<dyn Store>,
}

impl DataAggregator {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// The underlying store, for agents that write back.
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    async fn fetch(&self, query: Query) -> Result<Vec<Row>> {
        let resource = query.resource.clone();
        match self.store.select(query).await {
            Ok(rows) => Ok(rows),
            Err(e) if e.is_upstream_status() => {
                warn!("Store query on {} failed, treating as empty: {}", resource, e);
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    fn transaction_query(
        user_id: &str,
        period: &FinancialPeriod,
        kind: Option<TransactionKind>,
    ) -> Query {
        let mut query = Query::new("transactions").eq("user_id", user_id);
        if let Some(kind) = kind {
            query = query.eq("transaction_type", kind.as_str());
        }
        query
            .gte("date", period.start.to_string())
            .lt("date", period.end_exclusive().to_string())
    }

    /// Raw transaction rows, newest first. An empty `fields` selects everything.
    pub async fn transactions(
        &self,
        user_id: &str,
        period: &FinancialPeriod,
        kind: Option<TransactionKind>,
        fields: &[&str],
    ) -> Result<Vec<Row>> {
        let query = Self::transaction_query(user_id, period, kind)
            .select(fields)
            .order("date", SortOrder::Desc);
        self.fetch(query).await
    }

    /// Sum of `field` over matching transactions.
    pub async fn sum_field(
        &self,
        user_id: &str,
        period: &FinancialPeriod,
        kind: TransactionKind,
        field: &str,
    ) -> Result<f64> {
        let query = Self::transaction_query(user_id, period, Some(kind)).select(&[field]);
        let rows = self.fetch(query).await?;
        Ok(rows.iter().map(|r| r.num(field)).sum())
    }

    pub async fn sum_transactions(
        &self,
        user_id: &str,
        period: &FinancialPeriod,
        kind: TransactionKind,
    ) -> Result<f64> {
        self.sum_field(user_id, period, kind, "amount_aed").await
    }

    pub async fn business_profile(&self, user_id: &str) -> Result<Option<Row>> {
        let rows = self
            .fetch(Query::new("business_profiles").eq("user_id", user_id).limit(1))
            .await?;
        Ok(rows.into_iter().next())
    }

    pub async fn customers(&self, user_id: &str) -> Result<Vec<Row>> {
        self.fetch(Query::new("customers").eq("user_id", user_id))
            .await
    }

    pub async fn customer(&self, user_id: &str, customer_id: &str) -> Result<Option<Row>> {
        let rows = self
            .fetch(
                Query::new("customers")
                    .eq("user_id", user_id)
                    .eq("id", customer_id)
                    .limit(1),
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    pub async fn credit_totals(&self, user_id: &str) -> Result<CreditTotals> {
        let rows = self
            .fetch(
                Query::new("customers")
                    .eq("user_id", user_id)
                    .select(&["total_credit_outstanding", "total_payments_received"]),
            )
            .await?;
        Ok(CreditTotals {
            outstanding: rows.iter().map(|r| r.num("total_credit_outstanding")).sum(),
            collected: rows.iter().map(|r| r.num("total_payments_received")).sum(),
        })
    }

    /// Credit entries with `days_overdue > 0`.
    pub async fn overdue_amount(&self, user_id: &str) -> Result<f64> {
        let rows = self
            .fetch(
                Query::new("credit_transactions")
                    .eq("user_id", user_id)
                    .gt("days_overdue", 0)
                    .select(&["amount_aed"]),
            )
            .await?;
        Ok(rows.iter().map(|r| r.num("amount_aed")).sum())
    }

    /// Credit given to customers, for aging and collection analysis.
    pub async fn credit_transactions(&self, user_id: &str) -> Result<Vec<Row>> {
        self.fetch(
            Query::new("credit_transactions")
                .eq("user_id", user_id)
                .eq("credit_type", "credit_given")
                .select(&["customer_id", "amount_aed", "days_overdue", "due_date"]),
        )
        .await
    }

    pub async fn inventory_items(&self, user_id: &str) -> Result<Vec<Row>> {
        self.fetch(
            Query::new("inventory_items")
                .eq("user_id", user_id)
                .select(&[
                    "id",
                    "name",
                    "name_arabic",
                    "sku",
                    "category",
                    "current_stock",
                    "average_daily_sales",
                    "reorder_point",
                    "min_order_quantity",
                    "pack_size",
                    "unit_cost",
                    "supplier_id",
                    "suppliers(name)",
                ]),
        )
        .await
    }

    /// Every sale ever recorded, with date and amount only.
    pub async fn all_sales(&self, user_id: &str) -> Result<Vec<Row>> {
        self.fetch(
            Query::new("transactions")
                .eq("user_id", user_id)
                .eq("transaction_type", TransactionKind::Sale.as_str())
                .select(&["date", "amount_aed"]),
        )
        .await
    }

    /// Every sale with its customer and the customer's name embedded.
    pub async fn customer_sales(&self, user_id: &str) -> Result<Vec<Row>> {
        self.fetch(
            Query::new("transactions")
                .eq("user_id", user_id)
                .eq("transaction_type", TransactionKind::Sale.as_str())
                .select(&["customer_id", "amount_aed", "date", "customers(name)"]),
        )
        .await
    }

    /// Sale lines for one inventory item, newest first.
    pub async fn item_sales(
        &self,
        user_id: &str,
        item_id: &str,
        period: &FinancialPeriod,
    ) -> Result<Vec<Row>> {
        let query = Self::transaction_query(user_id, period, Some(TransactionKind::Sale))
            .eq("item_id", item_id)
            .select(&["date", "quantity", "amount_aed"])
            .order("date", SortOrder::Desc);
        self.fetch(query).await
    }

    /// Expenses plus COGS over the last 90 days, divided by three.
    pub async fn monthly_expense_average(&self, user_id: &str, today: NaiveDate) -> Result<f64> {
        let period = FinancialPeriod::last_days(90, today);
        let expenses = self
            .sum_transactions(user_id, &period, TransactionKind::Expense)
            .await?;
        let cogs = self
            .sum_transactions(user_id, &period, TransactionKind::Purchase)
            .await?;
        Ok((expenses + cogs) / 3.0)
    }

    /// Previous window of the same length, ending the day before `period` starts.
    pub fn previous_period(period: &FinancialPeriod) -> FinancialPeriod {
        let end = period.start - Duration::days(1);
        FinancialPeriod::new(end - Duration::days(period.days() - 1), end)
    }

    pub async fn aggregate_figures(
        &self,
        user_id: &str,
        period: &FinancialPeriod,
    ) -> Result<AggregateFigures> {
        let sales = self
            .sum_transactions(user_id, period, TransactionKind::Sale)
            .await?;
        let cogs = self
            .sum_transactions(user_id, period, TransactionKind::Purchase)
            .await?;
        let expenses = self
            .sum_transactions(user_id, period, TransactionKind::Expense)
            .await?;
        let vat_collected = self
            .sum_field(user_id, period, TransactionKind::Sale, "vat_amount")
            .await?;
        let vat_paid = self
            .sum_field(user_id, period, TransactionKind::Purchase, "vat_amount")
            .await?
            + self
                .sum_field(user_id, period, TransactionKind::Expense, "vat_amount")
                .await?;
        let credit = self.credit_totals(user_id).await?;
        let credit_overdue = self.overdue_amount(user_id).await?;

        Ok(AggregateFigures {
            sales,
            cogs,
            expenses,
            vat_collected,
            vat_paid,
            credit_outstanding: credit.outstanding,
            credit_collected: credit.collected,
            credit_overdue,
        })
    }
}
