use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use super::plan::PlanError;

/// One debt being paid down. Balances and payments are in currency units,
/// `annual_rate` is a fraction (0.05 for 5%).
#[derive(Debug, Clone, PartialEq)]
pub struct Debt {
    pub balance: f64,
    pub annual_rate: f64,
    pub min_payment: f64,
}

impl Debt {
    pub fn new(balance: f64, annual_rate: f64, min_payment: f64) -> Self {
        Self {
            balance,
            annual_rate,
            min_payment,
        }
    }

    pub fn monthly_rate(&self) -> f64 {
        self.annual_rate / 12.0
    }

    pub fn is_open(&self) -> bool {
        self.balance > 0.0
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Surplus goes to the highest annual rate first.
    Avalanche,
    /// Surplus goes to the lowest remaining balance first.
    Snowball,
}

impl Strategy {
    pub fn name(self) -> &'static str {
        match self {
            Strategy::Avalanche => "Avalanche",
            Strategy::Snowball => "Snowball",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Strategy {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "avalanche" | "highest-rate" => Ok(Strategy::Avalanche),
            "snowball" | "lowest-balance" => Ok(Strategy::Snowball),
            _ => Err(PlanError::UnknownStrategy(s.to_string())),
        }
    }
}

/// Month-indexed record of a simulation. Every per-debt series has the same
/// length as `months`, and series `i` belongs to input debt `i`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationTrace {
    pub months: Vec<u32>,
    pub payments_by_debt: Vec<Vec<f64>>,
    pub balances_by_debt: Vec<Vec<f64>>,
}

impl SimulationTrace {
    pub(crate) fn with_debts(count: usize) -> Self {
        Self {
            months: Vec::new(),
            payments_by_debt: vec![Vec::new(); count],
            balances_by_debt: vec![Vec::new(); count],
        }
    }

    pub fn total_months(&self) -> u32 {
        self.months.len() as u32
    }

    pub fn total_paid(&self) -> f64 {
        self.payments_by_debt
            .iter()
            .map(|payments| payments.iter().sum::<f64>())
            .sum()
    }

    /// Sum of payments across all debts for a 0-based month offset.
    pub fn paid_in_month(&self, month_index: usize) -> f64 {
        self.payments_by_debt
            .iter()
            .filter_map(|payments| payments.get(month_index))
            .sum()
    }

    /// First month (1-based) at which debt `i` shows a zero balance.
    pub fn payoff_month(&self, debt_index: usize) -> Option<u32> {
        self.balances_by_debt
            .get(debt_index)?
            .iter()
            .position(|balance| *balance <= 0.0)
            .map(|idx| self.months[idx])
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoffSummary {
    pub strategy: Strategy,
    pub total_months: u32,
    pub years: u32,
    pub remaining_months: u32,
    pub total_paid: f64,
    pub total_interest: f64,
    pub payoff_month_by_debt: Vec<Option<u32>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyComparison {
    pub avalanche: PayoffSummary,
    pub snowball: PayoffSummary,
    /// `None` when both strategies finish in the same month with the same cost.
    pub preferred: Option<Strategy>,
    pub months_saved: u32,
    pub interest_saved: f64,
}
