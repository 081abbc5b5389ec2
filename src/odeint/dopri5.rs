//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

use tch::Tensor;

use crate::nn::EvalContext;
use crate::{ErrPack, ErrorCode, Result};

use super::{Dynamics, Solution, SolverOptions, axpy_sum, rms_norm};

//--------------------------------------------------------------------------------------------------
// Dormand-Prince tableau

const C: [f64; 5] = [1.0 / 5.0, 3.0 / 10.0, 4.0 / 5.0, 8.0 / 9.0, 1.0];

#[rustfmt::skip]
const A: [&[f64]; 5] = [
	&[1.0 / 5.0],
	&[3.0 / 40.0, 9.0 / 40.0],
	&[44.0 / 45.0, -56.0 / 15.0, 32.0 / 9.0],
	&[19372.0 / 6561.0, -25360.0 / 2187.0, 64448.0 / 6561.0, -212.0 / 729.0],
	&[9017.0 / 3168.0, -355.0 / 33.0, 46732.0 / 5247.0, 49.0 / 176.0, -5103.0 / 18656.0],
];

/// 5th order weights. The last stage is evaluated at the solution, which makes the method FSAL.
const B: [f64; 7] = [35.0 / 384.0, 0.0, 500.0 / 1113.0, 125.0 / 192.0, -2187.0 / 6784.0, 11.0 / 84.0, 0.0];

/// Difference between the 5th and the embedded 4th order weights.
#[rustfmt::skip]
const E: [f64; 7] = [
	35.0 / 384.0 - 1951.0 / 21600.0,
	0.0,
	500.0 / 1113.0 - 22642.0 / 50085.0,
	125.0 / 192.0 - 451.0 / 720.0,
	-2187.0 / 6784.0 + 12231.0 / 42400.0,
	11.0 / 84.0 - 649.0 / 6300.0,
	-1.0 / 60.0,
];

const ORDER: i32 = 5;

const SAFETY: f64 = 0.9;
const MAX_FACTOR: f64 = 10.0;
const MIN_FACTOR: f64 = 0.2;

//--------------------------------------------------------------------------------------------------

struct Step {
	y: Tensor,
	f: Tensor,
	err: Tensor,
}

/// One Dormand-Prince step of size `h` from `(t, y)`, where `f = func(t, y)`.
/// Evaluates the derivative six times.
fn step(func: &impl Dynamics, t: f64, y: &Tensor, f: &Tensor, h: f64, ctx: &mut EvalContext) -> Result<Step> {
	let mut k: Vec<Tensor> = Vec::with_capacity(7);
	k.push(f.shallow_clone());

	// stages 2..6
	for (c, a) in C.iter().zip(A.iter()) {
		let terms: Vec<(f64, &Tensor)> = a.iter().copied().zip(k.iter()).collect();
		let yi = axpy_sum(y, h, &terms)?;
		let ki = func.eval(t + c * h, &yi, ctx)?;
		k.push(ki);
	}

	// the 7th stage is evaluated at the solution
	let terms: Vec<(f64, &Tensor)> = B.iter().copied().zip(k.iter()).collect();
	let y_next = axpy_sum(y, h, &terms)?;
	let f_next = func.eval(t + h, &y_next, ctx)?;
	k.push(f_next.shallow_clone());

	let terms: Vec<(f64, &Tensor)> = E.iter().copied().zip(k.iter()).collect();
	let zero = y.f_zeros_like()?;
	let err = axpy_sum(&zero, h, &terms)?;

	Ok(Step { y: y_next, f: f_next, err })
}

/// RMS of the local error relative to `atol + rtol * max(|y0|, |y1|)`.
fn error_ratio(step: &Step, y0: &Tensor, opts: &SolverOptions) -> Result<f64> {
	let scale = y0
		.f_abs()?
		.f_maximum(&step.y.f_abs()?)?
		.f_mul_scalar(opts.rtol)?
		.f_add_scalar(opts.atol)?;
	rms_norm(&step.err.f_div(&scale)?)
}

/// Next step size given the error ratio of a step of size `h`.
fn optimal_step_size(h: f64, error_ratio: f64) -> f64 {
	if error_ratio == 0.0 {
		return h * MAX_FACTOR;
	}
	let min_factor = if error_ratio < 1.0 { 1.0 } else { MIN_FACTOR };
	let factor = (SAFETY / error_ratio.powf(1.0 / f64::from(ORDER))).max(min_factor).min(MAX_FACTOR);
	h * factor
}

/// Initial step size following Hairer, Norsett & Wanner, "Solving ODEs I", II.4.
/// Evaluates the derivative once.
fn initial_step(
	func: &impl Dynamics,
	t0: f64,
	y0: &Tensor,
	f0: &Tensor,
	opts: &SolverOptions,
	ctx: &mut EvalContext,
) -> Result<f64> {
	let scale = y0.f_abs()?.f_mul_scalar(opts.rtol)?.f_add_scalar(opts.atol)?;

	let d0 = rms_norm(&y0.f_div(&scale)?)?;
	let d1 = rms_norm(&f0.f_div(&scale)?)?;
	let h0 = if d0 < 1e-5 || d1 < 1e-5 { 1e-6 } else { 0.01 * d0 / d1 };

	let y1 = axpy_sum(y0, h0, &[(1.0, f0)])?;
	let f1 = func.eval(t0 + h0, &y1, ctx)?;
	let d2 = rms_norm(&f1.f_sub(f0)?.f_div(&scale)?)? / h0;

	let h1 = if d1 <= 1e-15 && d2 <= 1e-15 {
		(h0 * 1e-3).max(1e-6)
	} else {
		(0.01 / d1.max(d2)).powf(1.0 / f64::from(ORDER))
	};
	Ok((100.0 * h0).min(h1))
}

//--------------------------------------------------------------------------------------------------

pub(super) fn integrate(
	func: &impl Dynamics,
	y0: &Tensor,
	t0: f64,
	t1: f64,
	opts: &SolverOptions,
	ctx: &mut EvalContext,
) -> Result<Solution> {
	let mut t = t0;
	let mut y = y0.shallow_clone();
	let mut f = func.eval(t, &y, ctx)?;
	let mut dt = initial_step(func, t, &y, &f, opts, ctx)?;

	let mut accepted = 0;
	let mut rejected = 0;
	while t < t1 {
		if accepted + rejected >= opts.max_steps {
			return Err(too_many_steps(opts.max_steps, t, t1));
		}

		// don't leave a sliver of the interval for a separate step
		let remaining = t1 - t;
		let last = dt * 1.01 >= remaining;
		let h = if last { remaining } else { dt };
		if !h.is_finite() || h <= f64::EPSILON * t.abs().max(1.0) {
			return Err(step_underflow(h, t));
		}

		let next = step(func, t, &y, &f, h, ctx)?;
		let ratio = error_ratio(&next, &y, opts)?;
		if ratio <= 1.0 {
			t = if last { t1 } else { t + h };
			y = next.y;
			f = next.f;
			accepted += 1;
		} else {
			rejected += 1;
		}

		dt = optimal_step_size(h, ratio);
		if !dt.is_finite() {
			return Err(step_underflow(dt, t));
		}
	}

	Ok(Solution { state: y, accepted, rejected })
}

#[cold]
#[inline(never)]
fn too_many_steps(max_steps: usize, t: f64, t1: f64) -> ErrPack<ErrorCode> {
	ErrPack::new(
		ErrorCode::TooManySteps,
		format!("dopri5: reached {max_steps} steps at t={t} before t1={t1}"),
	)
}

#[cold]
#[inline(never)]
fn step_underflow(h: f64, t: f64) -> ErrPack<ErrorCode> {
	ErrPack::new(ErrorCode::StepSizeUnderflow, format!("dopri5: step size {h} at t={t}"))
}
