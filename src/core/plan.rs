use thiserror::Error;

use super::engine::{SimulationError, round_cents, simulate_with_limit};
use super::types::{Debt, PayoffSummary, SimulationTrace, Strategy, StrategyComparison};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlanError {
    #[error("Please enter at least one debt with balance and minimum payment")]
    NoDebts,
    #[error("Budget must be at least the sum of minimum payments ({required:.2}), got {budget:.2}")]
    InsufficientBudget { budget: f64, required: f64 },
    #[error("{field} must be a finite, non-negative number")]
    InvalidNumber { field: String },
    #[error("unknown repayment strategy '{0}', expected avalanche or snowball")]
    UnknownStrategy(String),
    #[error(transparent)]
    Simulation(#[from] SimulationError),
}

/// A validated-on-demand set of debts plus the budget and ordering to pay
/// them with.
#[derive(Debug, Clone)]
pub struct DebtPlan {
    pub debts: Vec<Debt>,
    /// Position of each retained debt in the list the plan was built from.
    pub source_indices: Vec<usize>,
    pub budget: f64,
    pub strategy: Strategy,
}

impl DebtPlan {
    /// Keeps only entries with a positive balance and a positive minimum
    /// payment; blank rows are not an error.
    pub fn new(entries: Vec<Debt>, budget: f64, strategy: Strategy) -> Self {
        let (source_indices, debts): (Vec<usize>, Vec<Debt>) = entries
            .into_iter()
            .enumerate()
            .filter(|(_, debt)| debt.balance > 0.0 && debt.min_payment > 0.0)
            .unzip();
        Self {
            debts,
            source_indices,
            budget,
            strategy,
        }
    }

    pub fn with_strategy(&self, strategy: Strategy) -> Self {
        Self {
            strategy,
            ..self.clone()
        }
    }

    pub fn total_minimums(&self) -> f64 {
        self.debts.iter().map(|debt| debt.min_payment).sum()
    }

    pub fn starting_balance(&self) -> f64 {
        self.debts.iter().map(|debt| debt.balance).sum()
    }

    pub fn validate(&self) -> Result<(), PlanError> {
        if !self.budget.is_finite() || self.budget < 0.0 {
            return Err(PlanError::InvalidNumber {
                field: "budget".to_string(),
            });
        }

        for (debt, source) in self.debts.iter().zip(&self.source_indices) {
            for (name, value) in [
                ("balance", debt.balance),
                ("interest rate", debt.annual_rate),
                ("minimum payment", debt.min_payment),
            ] {
                if !value.is_finite() || value < 0.0 {
                    return Err(PlanError::InvalidNumber {
                        field: format!("debt {} {name}", source + 1),
                    });
                }
            }
        }

        if self.debts.is_empty() {
            return Err(PlanError::NoDebts);
        }

        let required = self.total_minimums();
        if self.budget < required {
            return Err(PlanError::InsufficientBudget {
                budget: self.budget,
                required,
            });
        }

        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct PlanOutcome {
    pub trace: SimulationTrace,
    pub summary: PayoffSummary,
}

pub fn run_plan(plan: &DebtPlan, max_months: u32) -> Result<PlanOutcome, PlanError> {
    plan.validate()?;
    let trace = simulate_with_limit(&plan.debts, plan.budget, plan.strategy, max_months)?;
    let summary = summarize(plan, &trace);
    Ok(PlanOutcome { trace, summary })
}

pub fn summarize(plan: &DebtPlan, trace: &SimulationTrace) -> PayoffSummary {
    let total_months = trace.total_months();
    let total_paid = round_cents(trace.total_paid());
    PayoffSummary {
        strategy: plan.strategy,
        total_months,
        years: total_months / 12,
        remaining_months: total_months % 12,
        total_paid,
        total_interest: round_cents(total_paid - plan.starting_balance()).max(0.0),
        payoff_month_by_debt: (0..plan.debts.len())
            .map(|i| trace.payoff_month(i))
            .collect(),
    }
}

/// Runs the same debts through both strategies.
pub fn compare_strategies(
    plan: &DebtPlan,
    max_months: u32,
) -> Result<StrategyComparison, PlanError> {
    let avalanche = run_plan(&plan.with_strategy(Strategy::Avalanche), max_months)?.summary;
    let snowball = run_plan(&plan.with_strategy(Strategy::Snowball), max_months)?.summary;

    let preferred = match (
        avalanche.total_interest.total_cmp(&snowball.total_interest),
        avalanche.total_months.cmp(&snowball.total_months),
    ) {
        (std::cmp::Ordering::Less, _) => Some(Strategy::Avalanche),
        (std::cmp::Ordering::Greater, _) => Some(Strategy::Snowball),
        (_, std::cmp::Ordering::Less) => Some(Strategy::Avalanche),
        (_, std::cmp::Ordering::Greater) => Some(Strategy::Snowball),
        _ => None,
    };

    Ok(StrategyComparison {
        months_saved: avalanche.total_months.abs_diff(snowball.total_months),
        interest_saved: round_cents((avalanche.total_interest - snowball.total_interest).abs()),
        preferred,
        avalanche,
        snowball,
    })
}
