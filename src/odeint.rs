//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

pub mod dopri5;
pub mod fixed_grid;


use tch::{Kind, Tensor};

use crate::nn::EvalContext;
use crate::{ErrPack, ErrorCode, Result};

//--------------------------------------------------------------------------------------------------

/// Right-hand side of `dy/dt = f(t, y)`.
pub trait Dynamics {
	/// Evaluates the derivative. Implementations are expected to `record()`
	/// the evaluation in `ctx`.
	fn eval(&self, t: f64, y: &Tensor, ctx: &mut EvalContext) -> Result<Tensor>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Method {
	/// Dormand-Prince 5(4) with adaptive step size.
	Dopri5,

	/// Classic 4th order Runge-Kutta on a fixed grid.
	Rk4 { step_size: f64 },

	/// Explicit Euler on a fixed grid. One evaluation per step.
	Euler { step_size: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradientMethod {
	/// Forward pass is recorded for backpropagation through the solver steps.
	Direct,

	/// Forward pass keeps no autograd graph; gradients would be recovered by
	/// solving the adjoint system backwards in time.
	Adjoint,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverOptions {
	pub method: Method,
	pub rtol: f64,
	pub atol: f64,

	/// Upper bound on attempted steps, accepted and rejected.
	pub max_steps: usize,

	pub gradient: GradientMethod,
}

impl SolverOptions {
	pub const DEFAULT_MAX_STEPS: usize = 10_000;

	/// Adaptive Dopri5 with `rtol == atol == tol`.
	pub fn adaptive(tol: f64) -> Self {
		Self {
			method: Method::Dopri5,
			rtol: tol,
			atol: tol,
			max_steps: Self::DEFAULT_MAX_STEPS,
			gradient: GradientMethod::Direct,
		}
	}

	pub fn with_method(mut self, method: Method) -> Self {
		self.method = method;
		self
	}

	pub fn with_gradient(mut self, gradient: GradientMethod) -> Self {
		self.gradient = gradient;
		self
	}
}

pub struct Solution {
	/// State at the end of the interval.
	pub state: Tensor,
	pub accepted: usize,
	pub rejected: usize,
}

//--------------------------------------------------------------------------------------------------

/// Integrates `func` from `span[0]` to `span[1]` starting at `y0`.
///
/// Only the state at `span[1]` is returned.
pub fn odeint(
	func: &impl Dynamics,
	y0: &Tensor,
	span: [f64; 2],
	opts: &SolverOptions,
	ctx: &mut EvalContext,
) -> Result<Solution> {
	let [t0, t1] = span;
	if !t0.is_finite() || !t1.is_finite() || t1 < t0 {
		return Err(invalid_span(t0, t1));
	}
	if t1 == t0 {
		return Ok(Solution { state: y0.shallow_clone(), accepted: 0, rejected: 0 });
	}

	let run = |ctx: &mut EvalContext| match opts.method {
		Method::Dopri5 => dopri5::integrate(func, y0, t0, t1, opts, ctx),
		Method::Rk4 { step_size } => fixed_grid::integrate_rk4(func, y0, t0, t1, step_size, ctx),
		Method::Euler { step_size } => fixed_grid::integrate_euler(func, y0, t0, t1, step_size, ctx),
	};

	let solution = match opts.gradient {
		GradientMethod::Direct => run(ctx)?,
		GradientMethod::Adjoint => tch::no_grad(|| run(ctx))?,
	};
	log::trace!(
		"odeint: t=[{t0}, {t1}], accepted={}, rejected={}, nfe={}",
		solution.accepted,
		solution.rejected,
		ctx.nfe()
	);
	Ok(solution)
}

//--------------------------------------------------------------------------------------------------

/// Root mean square of all elements.
pub(crate) fn rms_norm(x: &Tensor) -> Result<f64> {
	let norm = x.f_square()?.f_mean(Kind::Double)?.f_sqrt()?;
	Ok(norm.f_double_value(&[])?)
}

/// `y + h * sum(coef_i * k_i)`, skipping zero coefficients.
pub(crate) fn axpy_sum(y: &Tensor, h: f64, terms: &[(f64, &Tensor)]) -> Result<Tensor> {
	let mut acc: Option<Tensor> = None;
	for &(coef, k) in terms {
		if coef == 0.0 {
			continue;
		}
		let term = k.f_mul_scalar(coef * h)?;
		acc = Some(match acc {
			None => term,
			Some(acc) => acc.f_add(&term)?,
		});
	}
	match acc {
		None => Ok(y.shallow_clone()),
		Some(acc) => Ok(y.f_add(&acc)?),
	}
}

#[cold]
#[inline(never)]
fn invalid_span(t0: f64, t1: f64) -> ErrPack<ErrorCode> {
	ErrPack::new(ErrorCode::InvalidTimeSpan, format!("cannot integrate from t={t0} to t={t1}"))
}
