use thiserror::Error;
use tracing::debug;

use super::types::{Debt, SimulationTrace, Strategy};

/// Upper bound on simulated months used by [`simulate`] (100 years).
pub const DEFAULT_MAX_MONTHS: u32 = 1_200;

const CENT: f64 = 0.01;
// Keeps a float that should read 0.01 from being snapped away.
const SNAP_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SimulationError {
    #[error("balances did not reach zero within {months} months")]
    DidNotConverge { months: u32 },
}

#[derive(Debug)]
struct MonthSlice {
    balances: Vec<f64>,
    payments: Vec<f64>,
}

impl MonthSlice {
    fn new(debt_count: usize) -> Self {
        Self {
            balances: vec![0.0; debt_count],
            payments: vec![0.0; debt_count],
        }
    }
}

impl SimulationTrace {
    fn push_month(&mut self, month: u32, slice: MonthSlice) {
        self.months.push(month);
        for (series, balance) in self.balances_by_debt.iter_mut().zip(slice.balances) {
            series.push(balance);
        }
        for (series, payment) in self.payments_by_debt.iter_mut().zip(slice.payments) {
            series.push(payment);
        }
    }
}

/// Runs the month-by-month payoff with the default month cap.
///
/// The caller is expected to have checked that `debts` is non-empty and that
/// `budget` covers every minimum payment; an infeasible plan surfaces as
/// [`SimulationError::DidNotConverge`].
///
/// Each month pays out at most `budget`: a debt retiring below its minimum
/// frees only the unused part of that minimum, so totals can differ by cents
/// from tools that add that slack on top of the unspent budget.
pub fn simulate(
    debts: &[Debt],
    budget: f64,
    strategy: Strategy,
) -> Result<SimulationTrace, SimulationError> {
    simulate_with_limit(debts, budget, strategy, DEFAULT_MAX_MONTHS)
}

pub fn simulate_with_limit(
    debts: &[Debt],
    budget: f64,
    strategy: Strategy,
    max_months: u32,
) -> Result<SimulationTrace, SimulationError> {
    let mut working = debts.to_vec();
    let mut trace = SimulationTrace::with_debts(working.len());
    let mut month = 0u32;

    while working.iter().any(Debt::is_open) {
        if month >= max_months {
            debug!(max_months, %strategy, "payoff simulation hit month cap");
            return Err(SimulationError::DidNotConverge { months: max_months });
        }

        let mut slice = MonthSlice::new(working.len());
        let overage = pay_minimums(&mut working, budget, &mut slice);
        distribute_overage(&mut working, strategy, overage, &mut slice);

        month += 1;
        trace.push_month(month, slice);
    }

    Ok(trace)
}

/// Accrues a month of interest and pays each open debt its minimum, or its
/// whole balance when that is smaller. Returns the pool left for overage.
fn pay_minimums(debts: &mut [Debt], budget: f64, slice: &mut MonthSlice) -> f64 {
    let mut slack = 0.0;
    let mut scheduled_minimums = 0.0;

    for (i, debt) in debts.iter_mut().enumerate() {
        if !debt.is_open() {
            continue;
        }

        let tentative = debt.balance + debt.balance * debt.monthly_rate();
        let payment = if tentative >= debt.min_payment {
            debt.min_payment
        } else {
            slack += debt.min_payment - tentative;
            tentative
        };
        scheduled_minimums += debt.min_payment;

        debt.balance = settle(tentative - payment);
        slice.balances[i] = debt.balance;
        slice.payments[i] = payment;
    }

    // Slack from a retiring debt is part of the unspent budget, so this is
    // exactly budget minus what was paid above.
    slack + (budget - scheduled_minimums)
}

fn distribute_overage(
    debts: &mut [Debt],
    strategy: Strategy,
    mut pool: f64,
    slice: &mut MonthSlice,
) {
    while pool > 0.0 {
        let Some(target) = next_target(debts, strategy) else {
            break;
        };

        let debt = &mut debts[target];
        let amount = pool.min(debt.balance);
        debt.balance = settle(debt.balance - amount);
        slice.balances[target] = debt.balance;
        slice.payments[target] += amount;
        pool -= amount;
    }
}

/// Index of the open debt that receives overage next. Ties keep the lowest
/// index.
fn next_target(debts: &[Debt], strategy: Strategy) -> Option<usize> {
    let mut open = debts.iter().enumerate().filter(|(_, debt)| debt.is_open());
    let (mut best_index, mut best) = open.next()?;
    for (i, debt) in open {
        if outranks(debt, best, strategy) {
            best_index = i;
            best = debt;
        }
    }
    Some(best_index)
}

fn outranks(candidate: &Debt, current: &Debt, strategy: Strategy) -> bool {
    match strategy {
        Strategy::Avalanche => candidate.annual_rate > current.annual_rate,
        Strategy::Snowball => candidate.balance < current.balance,
    }
}

/// Rounds to cents; anything below one cent becomes exactly zero.
pub(crate) fn settle(amount: f64) -> f64 {
    if amount < CENT - SNAP_TOLERANCE {
        0.0
    } else {
        round_cents(amount)
    }
}

pub(crate) fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::collection::vec;
    use proptest::prelude::{prop_assert, prop_assert_eq, proptest};

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn two_debts(rate_a: f64, rate_b: f64) -> Vec<Debt> {
        vec![
            Debt::new(1_000.0, rate_a, 50.0),
            Debt::new(1_000.0, rate_b, 50.0),
        ]
    }

    fn assert_trace_shape(trace: &SimulationTrace, debt_count: usize) {
        assert_eq!(trace.balances_by_debt.len(), debt_count);
        assert_eq!(trace.payments_by_debt.len(), debt_count);
        for i in 0..debt_count {
            assert_eq!(trace.balances_by_debt[i].len(), trace.months.len());
            assert_eq!(trace.payments_by_debt[i].len(), trace.months.len());
        }
        for (idx, month) in trace.months.iter().enumerate() {
            assert_eq!(*month, idx as u32 + 1);
        }
    }

    #[test]
    fn settle_snaps_sub_cent_amounts_to_zero() {
        assert_eq!(settle(0.009), 0.0);
        assert_eq!(settle(0.004), 0.0);
        assert_eq!(settle(-0.003), 0.0);
        assert_approx(settle(0.01), 0.01);
        assert_approx(settle(12.345_6), 12.35);
        assert_approx(settle(100.01 - 100.0), 0.01);
    }

    #[test]
    fn single_zero_rate_debt_pays_off_in_twelve_months() {
        let debts = vec![Debt::new(1_200.0, 0.0, 100.0)];
        let trace = simulate(&debts, 100.0, Strategy::Avalanche).expect("converges");

        assert_trace_shape(&trace, 1);
        assert_eq!(trace.months.len(), 12);
        assert_eq!(*trace.balances_by_debt[0].last().expect("non-empty"), 0.0);
        for payment in &trace.payments_by_debt[0] {
            assert_approx(*payment, 100.0);
        }
        assert_approx(trace.balances_by_debt[0][0], 1_100.0);
    }

    #[test]
    fn simulate_leaves_caller_debts_untouched() {
        let debts = two_debts(0.20, 0.05);
        let before = debts.clone();
        simulate(&debts, 200.0, Strategy::Avalanche).expect("converges");
        assert_eq!(debts, before);
    }

    #[test]
    fn avalanche_sends_overage_to_highest_rate_first() {
        let debts = two_debts(0.20, 0.05);
        let trace = simulate(&debts, 200.0, Strategy::Avalanche).expect("converges");
        assert_trace_shape(&trace, 2);

        // Month 1: A accrues 16.67, pays 50 + 100 of overage; B only its minimum.
        assert_approx(trace.payments_by_debt[0][0], 150.0);
        assert_approx(trace.payments_by_debt[1][0], 50.0);
        assert_approx(trace.balances_by_debt[0][0], 866.67);
        assert_approx(trace.balances_by_debt[1][0], 954.17);

        let a_done = trace.payoff_month(0).expect("A is paid off");
        let b_done = trace.payoff_month(1).expect("B is paid off");
        assert!(a_done < b_done, "A done at {a_done}, B done at {b_done}");

        // Once A is gone, B receives the whole budget.
        let after = a_done as usize;
        if after < trace.months.len() - 1 {
            assert_approx(trace.payments_by_debt[1][after], 200.0);
        }
    }

    #[test]
    fn snowball_targets_lowest_balance_after_minimums() {
        // Equal starting balances: B accrues less interest, so it is lower
        // once minimums are paid and takes the overage.
        let debts = two_debts(0.20, 0.05);
        let trace = simulate(&debts, 200.0, Strategy::Snowball).expect("converges");

        assert_approx(trace.payments_by_debt[0][0], 50.0);
        assert_approx(trace.payments_by_debt[1][0], 150.0);
        let a_done = trace.payoff_month(0).expect("A is paid off");
        let b_done = trace.payoff_month(1).expect("B is paid off");
        assert!(b_done < a_done);
    }

    #[test]
    fn snowball_tie_goes_to_lowest_index() {
        let debts = two_debts(0.10, 0.10);
        let trace = simulate(&debts, 200.0, Strategy::Snowball).expect("converges");

        assert_approx(trace.payments_by_debt[0][0], 150.0);
        assert_approx(trace.payments_by_debt[1][0], 50.0);
    }

    #[test]
    fn avalanche_tie_goes_to_lowest_index() {
        let debts = vec![
            Debt::new(500.0, 0.12, 25.0),
            Debt::new(300.0, 0.12, 25.0),
        ];
        let trace = simulate(&debts, 100.0, Strategy::Avalanche).expect("converges");

        assert_approx(trace.payments_by_debt[0][0], 75.0);
        assert_approx(trace.payments_by_debt[1][0], 25.0);
    }

    #[test]
    fn sub_cent_remainder_is_reported_as_zero() {
        let debts = vec![Debt::new(100.009, 0.0, 100.0)];
        let trace = simulate(&debts, 100.0, Strategy::Avalanche).expect("converges");

        assert_eq!(trace.months, vec![1]);
        assert_eq!(trace.balances_by_debt[0], vec![0.0]);
        assert_approx(trace.payments_by_debt[0][0], 100.0);
    }

    #[test]
    fn every_month_but_the_last_spends_the_whole_budget() {
        let debts = two_debts(0.20, 0.05);
        let trace = simulate(&debts, 200.0, Strategy::Avalanche).expect("converges");

        let last = trace.months.len() - 1;
        for month in 0..last {
            assert_approx(trace.paid_in_month(month), 200.0);
        }
        assert!(trace.paid_in_month(last) <= 200.0 + EPS);
    }

    #[test]
    fn retiring_debt_slack_flows_to_other_debt_without_exceeding_budget() {
        let debts = vec![
            Debt::new(30.0, 0.0, 50.0),
            Debt::new(1_000.0, 0.0, 50.0),
        ];
        let trace = simulate(&debts, 100.0, Strategy::Snowball).expect("converges");

        assert_approx(trace.payments_by_debt[0][0], 30.0);
        assert_approx(trace.payments_by_debt[1][0], 70.0);
        assert_approx(trace.paid_in_month(0), 100.0);
        assert_eq!(trace.balances_by_debt[0][0], 0.0);
        assert_approx(trace.balances_by_debt[1][0], 930.0);
    }

    #[test]
    fn paid_off_debt_records_zero_for_later_months() {
        let debts = vec![
            Debt::new(100.0, 0.0, 50.0),
            Debt::new(1_000.0, 0.0, 50.0),
        ];
        let trace = simulate(&debts, 100.0, Strategy::Snowball).expect("converges");

        let done = trace.payoff_month(0).expect("first debt retires") as usize;
        for month in done..trace.months.len() {
            assert_eq!(trace.balances_by_debt[0][month], 0.0);
            assert_eq!(trace.payments_by_debt[0][month], 0.0);
        }
    }

    #[test]
    fn underfunded_plan_reports_did_not_converge() {
        // Interest alone exceeds the minimum payment.
        let debts = vec![Debt::new(10_000.0, 0.24, 100.0)];
        let err = simulate_with_limit(&debts, 100.0, Strategy::Avalanche, 240)
            .expect_err("balance grows forever");
        assert_eq!(err, SimulationError::DidNotConverge { months: 240 });
    }

    #[test]
    fn empty_debt_list_yields_empty_trace() {
        let trace = simulate(&[], 500.0, Strategy::Snowball).expect("nothing to pay");
        assert!(trace.months.is_empty());
        assert!(trace.balances_by_debt.is_empty());
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(64))]

        #[test]
        fn prop_feasible_plans_terminate_with_non_increasing_balances(
            raw_debts in vec((100u32..10_000, 0u32..3_000, 10u32..500), 1..6),
            extra in 0u32..1_000,
            snowball in proptest::bool::ANY,
        ) {
            // Minimum always beats a month of interest, so every debt shrinks.
            let debts: Vec<Debt> = raw_debts
                .iter()
                .map(|(balance, rate_bp, margin)| {
                    let balance = *balance as f64;
                    let annual_rate = *rate_bp as f64 / 10_000.0;
                    let interest = balance * annual_rate / 12.0;
                    Debt::new(balance, annual_rate, (interest + *margin as f64).ceil())
                })
                .collect();
            let budget = debts.iter().map(|d| d.min_payment).sum::<f64>() + extra as f64;
            let strategy = if snowball { Strategy::Snowball } else { Strategy::Avalanche };

            let trace = simulate(&debts, budget, strategy).expect("feasible plan converges");
            prop_assert!(!trace.months.is_empty());

            for (i, balances) in trace.balances_by_debt.iter().enumerate() {
                prop_assert!(balances.iter().all(|b| *b >= 0.0));
                prop_assert_eq!(*balances.last().expect("non-empty"), 0.0);
                let mut previous = debts[i].balance;
                for balance in balances {
                    prop_assert!(*balance <= previous + 0.005, "debt {} rose from {} to {}", i, previous, balance);
                    previous = *balance;
                }
            }

            let last = trace.months.len() - 1;
            for month in 0..trace.months.len() {
                let paid = trace.paid_in_month(month);
                prop_assert!(paid <= budget + 1e-6, "month {} paid {} of {}", month + 1, paid, budget);
                if month < last {
                    prop_assert!((paid - budget).abs() <= 1e-6, "month {} paid {} of {}", month + 1, paid, budget);
                }
            }

            let again = simulate(&debts, budget, strategy).expect("feasible plan converges");
            prop_assert_eq!(trace, again);
        }
    }
}
