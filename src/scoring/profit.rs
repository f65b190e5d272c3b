//! Profit statement, profit leaks and margin benchmarks.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::tables::MarginBenchmark;
use super::{ratio_or, round1, round2};

const OPERATING: [&str; 14] = [
    "rent",
    "shop_rent",
    "dewa",
    "salaries",
    "staff_salary",
    "visa_costs",
    "visa_&_labour",
    "trade_license",
    "municipality_fees",
    "insurance",
    "marketing",
    "internet_&_phone",
    "transportation",
    "maintenance",
];

const FINANCIAL: [&str; 5] = ["bank_charges", "pos_fees", "pos/card_fees", "loan_emi", "loan"];

/// Lowercase with spaces replaced by underscores.
pub fn normalize_category(category: &str) -> String {
    category.trim().to_lowercase().replace(' ', "_")
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostGroup {
    pub total: f64,
    pub breakdown: BTreeMap<String, f64>,
}

fn group(expenses: &BTreeMap<String, f64>, patterns: &[&str]) -> CostGroup {
    let mut group = CostGroup::default();
    for (category, amount) in expenses {
        if patterns.iter().any(|p| category.contains(p)) {
            group.breakdown.insert(category.clone(), *amount);
            group.total += amount;
        }
    }
    group.total = round2(group.total);
    group
}

/// Raw inputs for a profit statement; expense keys are normalized categories.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfitInputs {
    pub revenue: f64,
    pub cogs: f64,
    pub expenses: BTreeMap<String, f64>,
    pub output_vat: f64,
    pub input_vat: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfitLeak {
    pub category: String,
    pub amount: f64,
    pub percentage: f64,
    pub threshold: f64,
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfitRecommendation {
    pub title: String,
    pub title_localized: String,
    pub priority: Severity,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub potential_savings: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkComparison {
    pub gross_margin: f64,
    pub benchmark_gross_margin: f64,
    pub gross_below: bool,
    pub net_margin: f64,
    pub benchmark_net_margin: f64,
    pub net_below: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfitStatement {
    pub revenue: f64,
    pub cogs: f64,
    pub gross_profit: f64,
    pub gross_margin: f64,
    pub operating_expenses: CostGroup,
    pub financial_costs: CostGroup,
    pub vat_payable: f64,
    pub net_profit: f64,
    pub net_margin: f64,
    pub benchmark: BenchmarkComparison,
    pub leaks: Vec<ProfitLeak>,
    pub recommendations: Vec<ProfitRecommendation>,
}

fn amount_of(expenses: &BTreeMap<String, f64>, keys: &[&str]) -> f64 {
    keys.iter().filter_map(|k| expenses.get(*k)).sum()
}

/// Expense lines that eat more of revenue than a healthy shop spends.
pub fn profit_leaks(expenses: &BTreeMap<String, f64>, revenue: f64) -> Vec<ProfitLeak> {
    let mut leaks = Vec::new();
    if revenue <= 0.0 {
        return leaks;
    }

    let rent = amount_of(expenses, &["rent", "shop_rent"]);
    let rent_pct = rent / revenue * 100.0;
    if rent_pct > 10.0 {
        leaks.push(ProfitLeak {
            category: "Rent".to_string(),
            amount: round2(rent),
            percentage: round1(rent_pct),
            threshold: 10.0,
            severity: if rent_pct > 15.0 { Severity::High } else { Severity::Medium },
            message: format!("Rent is {:.1}% of revenue (should be <10%)", rent_pct),
        });
    }

    let pos = amount_of(expenses, &["pos_fees", "pos/card_fees"]);
    let pos_pct = pos / revenue * 100.0;
    if pos_pct > 2.5 {
        leaks.push(ProfitLeak {
            category: "POS/Card Fees".to_string(),
            amount: round2(pos),
            percentage: round1(pos_pct),
            threshold: 2.5,
            severity: Severity::Medium,
            message: format!("Card processing fees at {:.1}% (negotiate for <2%)", pos_pct),
        });
    }

    let dewa = amount_of(expenses, &["dewa", "dewa_(utilities)"]);
    let dewa_pct = dewa / revenue * 100.0;
    if dewa_pct > 3.0 {
        leaks.push(ProfitLeak {
            category: "DEWA (Utilities)".to_string(),
            amount: round2(dewa),
            percentage: round1(dewa_pct),
            threshold: 3.0,
            severity: Severity::Low,
            message: format!(
                "Utilities at {:.1}% of revenue - check for inefficiencies",
                dewa_pct
            ),
        });
    }

    leaks
}

fn recommendations(leaks: &[ProfitLeak], benchmark: &BenchmarkComparison) -> Vec<ProfitRecommendation> {
    let mut recs = Vec::new();

    for leak in leaks {
        if leak.category == "Rent" && leak.severity == Severity::High {
            recs.push(ProfitRecommendation {
                title: "Negotiate rent or consider relocation".to_string(),
                title_localized: "تفاوض على الإيجار أو فكر في الانتقال".to_string(),
                priority: Severity::High,
                description: format!(
                    "Your rent is {}% of revenue. Consider negotiating with your landlord or a more affordable location.",
                    leak.percentage
                ),
                potential_savings: Some(round2(leak.amount * 0.2)),
            });
        }
        if leak.category == "POS/Card Fees" {
            recs.push(ProfitRecommendation {
                title: "Negotiate POS machine rates".to_string(),
                title_localized: "تفاوض على رسوم نقاط البيع".to_string(),
                priority: Severity::Medium,
                description: "Ask your bank for lower card processing fees. Target 2% or below."
                    .to_string(),
                potential_savings: Some(round2(leak.amount * 0.3)),
            });
        }
    }

    if benchmark.gross_below {
        recs.push(ProfitRecommendation {
            title: "Improve gross margin".to_string(),
            title_localized: "تحسين هامش الربح الإجمالي".to_string(),
            priority: Severity::High,
            description: format!(
                "Your gross margin is {:.1}% below the industry average. Review pricing and supplier rates.",
                benchmark.benchmark_gross_margin - benchmark.gross_margin
            ),
            potential_savings: None,
        });
    }
    if benchmark.net_below {
        recs.push(ProfitRecommendation {
            title: "Reduce operating costs".to_string(),
            title_localized: "خفض تكاليف التشغيل".to_string(),
            priority: Severity::Medium,
            description: "Review operating expenses, focusing on rent, utilities and staffing."
                .to_string(),
            potential_savings: None,
        });
    }

    recs
}

/// Full profit statement for one period.
pub fn profit_statement(inputs: &ProfitInputs, benchmark: MarginBenchmark) -> ProfitStatement {
    let gross_profit = inputs.revenue - inputs.cogs;
    let operating = group(&inputs.expenses, &OPERATING);
    let financial = group(&inputs.expenses, &FINANCIAL);
    let vat_payable = (inputs.output_vat - inputs.input_vat).max(0.0);
    let net_profit = gross_profit - operating.total - financial.total - vat_payable;

    let gross_margin = round1(ratio_or(gross_profit, inputs.revenue, 0.0) * 100.0);
    let net_margin = round1(ratio_or(net_profit, inputs.revenue, 0.0) * 100.0);

    let comparison = BenchmarkComparison {
        gross_margin,
        benchmark_gross_margin: benchmark.gross_margin,
        gross_below: gross_margin < benchmark.gross_margin,
        net_margin,
        benchmark_net_margin: benchmark.net_margin,
        net_below: net_margin < benchmark.net_margin,
    };

    let leaks = profit_leaks(&inputs.expenses, inputs.revenue);
    let recommendations = recommendations(&leaks, &comparison);

    ProfitStatement {
        revenue: round2(inputs.revenue),
        cogs: round2(inputs.cogs),
        gross_profit: round2(gross_profit),
        gross_margin,
        operating_expenses: operating,
        financial_costs: financial,
        vat_payable: round2(vat_payable),
        net_profit: round2(net_profit),
        net_margin,
        benchmark: comparison,
        leaks,
        recommendations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expenses(entries: &[(&str, f64)]) -> BTreeMap<String, f64> {
        entries
            .iter()
            .map(|(k, v)| (normalize_category(k), *v))
            .collect()
    }

    #[test]
    fn test_normalize_category() {
        assert_eq!(normalize_category("Shop Rent"), "shop_rent");
        assert_eq!(normalize_category(" POS/Card Fees "), "pos/card_fees");
    }

    #[test]
    fn test_profit_statement() {
        let inputs = ProfitInputs {
            revenue: 100_000.0,
            cogs: 70_000.0,
            expenses: expenses(&[("Rent", 8_000.0), ("Salaries", 6_000.0), ("Bank Charges", 500.0)]),
            output_vat: 5_000.0,
            input_vat: 3_500.0,
        };
        let benchmark = MarginBenchmark {
            gross_margin: 25.0,
            net_margin: 8.0,
        };

        let statement = profit_statement(&inputs, benchmark);
        assert_eq!(statement.gross_profit, 30_000.0);
        assert_eq!(statement.gross_margin, 30.0);
        assert_eq!(statement.operating_expenses.total, 14_000.0);
        assert_eq!(statement.financial_costs.total, 500.0);
        assert_eq!(statement.vat_payable, 1_500.0);
        assert_eq!(statement.net_profit, 14_000.0);
        assert_eq!(statement.net_margin, 14.0);
        assert!(!statement.benchmark.gross_below);
        assert!(statement.leaks.is_empty());
        assert!(statement.recommendations.is_empty());
    }

    #[test]
    fn test_refundable_vat_not_deducted() {
        let inputs = ProfitInputs {
            revenue: 1_000.0,
            cogs: 0.0,
            expenses: BTreeMap::new(),
            output_vat: 10.0,
            input_vat: 50.0,
        };
        let statement = profit_statement(&inputs, MarginBenchmark { gross_margin: 0.0, net_margin: 0.0 });
        assert_eq!(statement.vat_payable, 0.0);
        assert_eq!(statement.net_profit, 1_000.0);
    }

    #[test]
    fn test_profit_leaks() {
        let leaks = profit_leaks(
            &expenses(&[("Shop Rent", 16_000.0), ("POS Fees", 3_000.0), ("DEWA", 3_500.0)]),
            100_000.0,
        );
        assert_eq!(leaks.len(), 3);
        assert_eq!(leaks[0].severity, Severity::High);
        assert_eq!(leaks[1].category, "POS/Card Fees");
        assert_eq!(leaks[2].severity, Severity::Low);

        assert!(profit_leaks(&expenses(&[("Rent", 500.0)]), 0.0).is_empty());
    }

    #[test]
    fn test_leak_recommendations() {
        let inputs = ProfitInputs {
            revenue: 100_000.0,
            cogs: 90_000.0,
            expenses: expenses(&[("Rent", 20_000.0), ("POS Fees", 3_000.0)]),
            output_vat: 0.0,
            input_vat: 0.0,
        };
        let statement = profit_statement(
            &inputs,
            MarginBenchmark {
                gross_margin: 20.0,
                net_margin: 8.0,
            },
        );

        let titles: Vec<&str> = statement.recommendations.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(
            titles,
            vec![
                "Negotiate rent or consider relocation",
                "Negotiate POS machine rates",
                "Improve gross margin",
                "Reduce operating costs"
            ]
        );
        assert_eq!(statement.recommendations[0].potential_savings, Some(4_000.0));
        assert_eq!(statement.recommendations[1].potential_savings, Some(900.0));
    }
}
