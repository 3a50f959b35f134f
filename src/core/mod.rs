mod engine;
mod plan;
mod types;

pub use engine::{DEFAULT_MAX_MONTHS, SimulationError, simulate, simulate_with_limit};
pub use plan::{DebtPlan, PlanError, PlanOutcome, compare_strategies, run_plan, summarize};
pub use types::{Debt, PayoffSummary, SimulationTrace, Strategy, StrategyComparison};
