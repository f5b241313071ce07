//! Arithmetic scenarios.

use super::{ScenarioContext, ScenarioError, ScenarioRun, run_repeated};
use lockstep_core::{CoreId, FaultInjector, Workload};
use lockstep_logic::{ConsensusChecker, Epsilon};

/// Default operands
pub const OPERANDS: (i32, i32) = (10, 3);

/// Returned by division when the divisor is zero
pub const DIVISION_SENTINEL: i32 = i32::MIN;

/// Two-operand integer operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    /// `a + b`
    Add,
    /// `a - b`
    Sub,
    /// `a * b`
    Mul,
    /// `a / b`
    Div,
}

impl Op {
    /// Wrapping arithmetic; division by zero yields [`DIVISION_SENTINEL`]
    pub fn apply(self, a: i32, b: i32) -> i32 {
        match self {
            Op::Add => a.wrapping_add(b),
            Op::Sub => a.wrapping_sub(b),
            Op::Mul => a.wrapping_mul(b),
            Op::Div => a.checked_div(b).unwrap_or(DIVISION_SENTINEL),
        }
    }
}

/// `Op` on every core, then the core's fault term
#[derive(Debug, Clone)]
pub struct Arithmetic {
    op: Op,
    faults: FaultInjector,
}

impl Arithmetic {
    /// Workload applying `op`, perturbed by `faults`
    pub fn new(op: Op, faults: FaultInjector) -> Self {
        Self { op, faults }
    }
}

impl Workload for Arithmetic {
    type Input = (i32, i32);
    type Output = i32;

    fn step(&self, core: CoreId, (a, b): (i32, i32)) -> i32 {
        self.faults.perturb(core, self.op.apply(a, b))
    }
}

/// Core `n` answers `7.0001 + n * 0.0001`
#[derive(Debug, Clone)]
pub struct Drift {
    faults: FaultInjector,
}

/// Base value of [`Drift`]
pub const DRIFT_BASE: f64 = 7.0001;
/// Per-core increment of [`Drift`]
pub const DRIFT_STEP: f64 = 0.0001;

impl Workload for Drift {
    type Input = ();
    type Output = f64;

    fn step(&self, core: CoreId, _input: ()) -> f64 {
        let value = DRIFT_BASE + core.index() as f64 * DRIFT_STEP;
        value + self.faults.fault_term(core) as f64
    }
}

fn arithmetic(
    ctx: &ScenarioContext,
    id: &str,
    op: Op,
    operands: (i32, i32),
) -> Result<ScenarioRun, ScenarioError> {
    let workload = Arithmetic::new(op, ctx.faults.clone());
    run_repeated(ctx, id, workload, ConsensusChecker::exact(), operands)
}

pub(super) fn addition(ctx: &ScenarioContext) -> Result<ScenarioRun, ScenarioError> {
    arithmetic(ctx, "ops/addition", Op::Add, OPERANDS)
}

pub(super) fn subtraction(ctx: &ScenarioContext) -> Result<ScenarioRun, ScenarioError> {
    arithmetic(ctx, "ops/subtraction", Op::Sub, OPERANDS)
}

pub(super) fn multiplication(ctx: &ScenarioContext) -> Result<ScenarioRun, ScenarioError> {
    arithmetic(ctx, "ops/multiplication", Op::Mul, OPERANDS)
}

pub(super) fn division(ctx: &ScenarioContext) -> Result<ScenarioRun, ScenarioError> {
    arithmetic(ctx, "ops/division", Op::Div, OPERANDS)
}

pub(super) fn division_by_zero(ctx: &ScenarioContext) -> Result<ScenarioRun, ScenarioError> {
    arithmetic(ctx, "ops/division-by-zero", Op::Div, (OPERANDS.0, 0))
}

pub(super) fn tolerance(ctx: &ScenarioContext) -> Result<ScenarioRun, ScenarioError> {
    let checker = ConsensusChecker::new(Epsilon::new(ctx.epsilon)?);
    let workload = Drift {
        faults: ctx.faults.clone(),
    };
    let mut run = run_repeated(ctx, "ops/tolerance", workload, checker, ())?;
    let spread = (ctx.pipeline.cores.saturating_sub(1)) as f64 * DRIFT_STEP;
    if spread > ctx.epsilon {
        run.warnings.push(format!(
            "cores differ by up to {spread:.4}, wider than epsilon {}",
            ctx.epsilon
        ));
    }
    Ok(run)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenarios::tests::context;
    use lockstep_report::ScenarioStatus;

    #[test]
    fn test_op_apply() {
        assert_eq!(Op::Add.apply(10, 3), 13);
        assert_eq!(Op::Sub.apply(10, 3), 7);
        assert_eq!(Op::Mul.apply(10, 3), 30);
        assert_eq!(Op::Div.apply(10, 3), 3);
        assert_eq!(Op::Div.apply(10, 0), DIVISION_SENTINEL);
        assert_eq!(Op::Div.apply(i32::MIN, -1), DIVISION_SENTINEL);
        assert_eq!(Op::Add.apply(i32::MAX, 1), i32::MIN);
    }

    #[test]
    fn test_addition_agrees() {
        let ctx = context(3);
        let run = addition(&ctx).unwrap();
        assert_eq!(run.status, ScenarioStatus::Agreed);
        assert_eq!(run.comparator, "exact");
        assert_eq!(run.summary.stats.rounds, 3);
        assert_eq!(run.summary.stats.attempts, 3);
        assert_eq!(ctx.recorder.last_agreed().as_deref(), Some("13"));
    }

    #[test]
    fn test_division_by_zero_returns_sentinel() {
        let ctx = context(1);
        let run = division_by_zero(&ctx).unwrap();
        assert_eq!(run.status, ScenarioStatus::Agreed);
        assert_eq!(
            ctx.recorder.last_agreed(),
            Some(DIVISION_SENTINEL.to_string())
        );
    }

    #[test]
    fn test_tolerance_uses_epsilon() {
        let ctx = context(2);
        let run = tolerance(&ctx).unwrap();
        assert_eq!(run.status, ScenarioStatus::Agreed);
        assert!(run.comparator.starts_with("epsilon"));
        assert!(run.warnings.is_empty());
        assert_eq!(run.summary.stats.disagreements, 0);
    }

    #[test]
    fn test_faulty_core_terminates_under_cap() {
        let mut ctx = context(1);
        ctx.faults = FaultInjector::new(vec![1.0, 0.0], 1).unwrap();
        ctx.max_attempts = Some(64);
        let run = multiplication(&ctx).unwrap();
        // A drawn term of 0 agrees, so the round may still succeed; with a
        // cap it always terminates either way.
        assert!(matches!(
            run.status,
            ScenarioStatus::Agreed | ScenarioStatus::Abandoned
        ));
        assert!(run.summary.stats.attempts <= 64);
        assert_eq!(
            run.summary.stats.attempts,
            run.summary.stats.disagreements + run.summary.stats.rounds
        );
    }
}
