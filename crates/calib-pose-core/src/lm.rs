//! Levenberg-Marquardt over a subset of free parameters.
//!
//! Problems implement [`ResidualProblem`] on their full parameter vector;
//! [`minimize`] packs the free entries into a
//! [`levenberg_marquardt::LeastSquaresProblem`] and maps the solver report
//! back onto [`LmReport`].

use std::cell::RefCell;

use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt, TerminationReason};
use nalgebra::{storage::Owned, DMatrix, DVector, Dyn};
use serde::{Deserialize, Serialize};

/// A residual function `r(x)`; the solver minimises `|r(x)|²`.
pub trait ResidualProblem {
    /// Residual vector, or `None` when `params` is outside the valid domain
    /// (for example a point projecting behind the camera).
    fn residuals(&self, params: &DVector<f64>) -> Option<DVector<f64>>;

    /// Jacobian restricted to the columns in `free`.
    ///
    /// The default uses central differences.
    fn jacobian(&self, params: &DVector<f64>, free: &[usize]) -> Option<DMatrix<f64>> {
        numeric_jacobian(self, params, free)
    }
}

/// Central-difference Jacobian over the `free` parameter indices.
pub fn numeric_jacobian<P: ResidualProblem + ?Sized>(
    problem: &P,
    params: &DVector<f64>,
    free: &[usize],
) -> Option<DMatrix<f64>> {
    let mut shifted = params.clone();
    let mut jac: Option<DMatrix<f64>> = None;

    for (col, &idx) in free.iter().enumerate() {
        let x0 = params[idx];
        let h = 1e-6 * (1.0 + x0.abs());

        shifted[idx] = x0 + h;
        let plus = problem.residuals(&shifted)?;
        shifted[idx] = x0 - h;
        let minus = problem.residuals(&shifted)?;
        shifted[idx] = x0;

        let j = jac.get_or_insert_with(|| DMatrix::zeros(plus.len(), free.len()));
        if plus.len() != j.nrows() || minus.len() != j.nrows() {
            return None;
        }
        j.set_column(col, &((plus - minus) / (2.0 * h)));
    }

    jac
}

/// Solver settings, forwarded to [`LevenbergMarquardt`].
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LmConfig {
    /// Residual evaluations are capped at `patience * (free + 1)`.
    pub patience: usize,
    /// Relative reduction of the cost that counts as converged.
    pub ftol: f64,
    /// Relative trust-region size that counts as converged.
    pub xtol: f64,
    /// Cosine between residuals and Jacobian columns that counts as converged.
    pub gtol: f64,
    /// Initial trust-region radius, relative to the scaled parameters.
    pub stepbound: f64,
}

impl Default for LmConfig {
    fn default() -> Self {
        Self {
            patience: 100,
            ftol: 1e-12,
            xtol: 1e-12,
            gtol: 1e-12,
            stepbound: 100.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LmTermination {
    ResidualsZero,
    /// `ftol` test passed.
    RelativeDecrease,
    /// `xtol` test passed.
    SmallStep,
    /// `gtol` test passed.
    GradientOrthogonal,
    /// Evaluation budget spent.
    MaxEvaluations,
    /// Tolerances are below what machine precision can resolve.
    MachinePrecision,
    JacobianFailed,
    NumericalFailure,
    NothingToOptimize,
}

impl LmTermination {
    fn from_reason(reason: &TerminationReason) -> Self {
        match reason {
            TerminationReason::ResidualsZero => Self::ResidualsZero,
            TerminationReason::Converged { ftol: true, .. } => Self::RelativeDecrease,
            TerminationReason::Converged { .. } => Self::SmallStep,
            TerminationReason::Orthogonal => Self::GradientOrthogonal,
            TerminationReason::LostPatience => Self::MaxEvaluations,
            TerminationReason::NoImprovementPossible(_) => Self::MachinePrecision,
            TerminationReason::User("jacobian") => Self::JacobianFailed,
            TerminationReason::NoParameters => Self::NothingToOptimize,
            _ => Self::NumericalFailure,
        }
    }

    /// Whether the run ended on a convergence test rather than a cap or a failure.
    pub fn converged(self) -> bool {
        matches!(
            self,
            Self::ResidualsZero
                | Self::RelativeDecrease
                | Self::SmallStep
                | Self::GradientOrthogonal
                | Self::NothingToOptimize
        )
    }
}

#[derive(Clone, Debug)]
pub struct LmReport {
    /// Full parameter vector, fixed entries untouched.
    pub params: DVector<f64>,
    pub initial_cost: f64,
    /// Final sum of squared residuals.
    pub cost: f64,
    /// Residual evaluations spent by the solver.
    pub evaluations: usize,
    pub termination: LmTermination,
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LmError {
    #[error("residuals are not defined at the initial parameters")]
    InvalidStart,
    #[error("parameter mask has {mask} entries for {params} parameters")]
    MaskMismatch { mask: usize, params: usize },
}

/// Adapter exposing the free entries of a [`ResidualProblem`] to the solver.
///
/// Undefined residuals are replaced by a large constant vector so the
/// trust region shrinks instead of aborting; the best defined point seen is
/// kept aside because the solver may stop on a rejected trial.
struct FreeParams<'a, P: ?Sized> {
    problem: &'a P,
    full: DVector<f64>,
    free: Vec<usize>,
    penalty: DVector<f64>,
    best: RefCell<(DVector<f64>, f64)>,
}

impl<P: ResidualProblem + ?Sized> FreeParams<'_, P> {
    fn evaluate(&self) -> Option<DVector<f64>> {
        let r = self.problem.residuals(&self.full)?;
        let cost = r.norm_squared();
        if r.len() != self.penalty.len() || !cost.is_finite() {
            return None;
        }
        let mut best = self.best.borrow_mut();
        if cost < best.1 {
            *best = (self.full.clone(), cost);
        }
        Some(r)
    }
}

impl<P: ResidualProblem + ?Sized> LeastSquaresProblem<f64, Dyn, Dyn> for FreeParams<'_, P> {
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, x: &DVector<f64>) {
        for (&idx, &v) in self.free.iter().zip(x.iter()) {
            self.full[idx] = v;
        }
    }

    fn params(&self) -> DVector<f64> {
        DVector::from_iterator(self.free.len(), self.free.iter().map(|&i| self.full[i]))
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        Some(self.evaluate().unwrap_or_else(|| self.penalty.clone()))
    }

    fn jacobian(&self) -> Option<DMatrix<f64>> {
        self.problem
            .jacobian(&self.full, &self.free)
            .filter(|j| j.iter().all(|v| v.is_finite()))
    }
}

/// Minimise `|r(x)|²` starting at `initial`.
///
/// `free` masks the parameters that may move; `None` frees all of them.
/// The returned parameters never have a higher cost than `initial`.
pub fn minimize<P: ResidualProblem + ?Sized>(
    problem: &P,
    initial: DVector<f64>,
    free: Option<&[bool]>,
    cfg: &LmConfig,
) -> Result<LmReport, LmError> {
    let free: Vec<usize> = match free {
        Some(mask) => {
            if mask.len() != initial.len() {
                return Err(LmError::MaskMismatch {
                    mask: mask.len(),
                    params: initial.len(),
                });
            }
            (0..mask.len()).filter(|&i| mask[i]).collect()
        }
        None => (0..initial.len()).collect(),
    };

    let r0 = problem.residuals(&initial).ok_or(LmError::InvalidStart)?;
    let initial_cost = r0.norm_squared();
    if !initial_cost.is_finite() {
        return Err(LmError::InvalidStart);
    }

    if free.is_empty() || r0.is_empty() {
        return Ok(LmReport {
            params: initial,
            initial_cost,
            cost: initial_cost,
            evaluations: 0,
            termination: LmTermination::NothingToOptimize,
        });
    }

    // At least ten times the starting norm, so the solver rejects the step.
    let penalty_level = 10.0 * (r0.amax() + 1.0);
    let wrapper = FreeParams {
        problem,
        full: initial.clone(),
        free,
        penalty: DVector::from_element(r0.len(), penalty_level),
        best: RefCell::new((initial, initial_cost)),
    };

    let lm = LevenbergMarquardt::new()
        .with_ftol(cfg.ftol.max(0.0))
        .with_xtol(cfg.xtol.max(0.0))
        .with_gtol(cfg.gtol.max(0.0))
        .with_stepbound(if cfg.stepbound > 0.0 { cfg.stepbound } else { 100.0 })
        .with_patience(cfg.patience.max(1));
    let (wrapper, report) = lm.minimize(wrapper);

    let (params, cost) = wrapper.best.into_inner();
    Ok(LmReport {
        params,
        initial_cost,
        cost,
        evaluations: report.number_of_evaluations,
        termination: LmTermination::from_reason(&report.termination),
    })
}
