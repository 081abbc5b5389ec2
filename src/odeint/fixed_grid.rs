//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

use tch::Tensor;

use crate::nn::EvalContext;
use crate::util::LossyInto;
use crate::{ErrPack, ErrorCode, Result};

use super::{Dynamics, Solution, axpy_sum};

/// Splits `[t0, t1]` into `ceil((t1 - t0) / step_size)` steps. The last one may be shorter.
fn grid(t0: f64, t1: f64, step_size: f64) -> Result<Vec<(f64, f64)>> {
	if !step_size.is_finite() || step_size <= 0.0 {
		return Err(ErrPack::new(
			ErrorCode::InvalidConfig,
			format!("fixed grid: step size must be positive, got {step_size}"),
		));
	}
	#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
	let n = ((t1 - t0) / step_size - 1e-9).ceil().max(1.0) as usize;
	Ok((0..n)
		.map(|i| {
			let start = t0 + i.lossy_into() * step_size;
			let end = if i + 1 == n { t1 } else { t0 + (i + 1).lossy_into() * step_size };
			(start, end - start)
		})
		.collect())
}

pub(super) fn integrate_euler(
	func: &impl Dynamics,
	y0: &Tensor,
	t0: f64,
	t1: f64,
	step_size: f64,
	ctx: &mut EvalContext,
) -> Result<Solution> {
	let steps = grid(t0, t1, step_size)?;
	let mut y = y0.shallow_clone();
	for &(t, h) in &steps {
		let f = func.eval(t, &y, ctx)?;
		y = axpy_sum(&y, h, &[(1.0, &f)])?;
	}
	Ok(Solution { state: y, accepted: steps.len(), rejected: 0 })
}

pub(super) fn integrate_rk4(
	func: &impl Dynamics,
	y0: &Tensor,
	t0: f64,
	t1: f64,
	step_size: f64,
	ctx: &mut EvalContext,
) -> Result<Solution> {
	let steps = grid(t0, t1, step_size)?;
	let mut y = y0.shallow_clone();
	for &(t, h) in &steps {
		let k1 = func.eval(t, &y, ctx)?;
		let k2 = func.eval(t + h / 2.0, &axpy_sum(&y, h / 2.0, &[(1.0, &k1)])?, ctx)?;
		let k3 = func.eval(t + h / 2.0, &axpy_sum(&y, h / 2.0, &[(1.0, &k2)])?, ctx)?;
		let k4 = func.eval(t + h, &axpy_sum(&y, h, &[(1.0, &k3)])?, ctx)?;
		y = axpy_sum(&y, h / 6.0, &[(1.0, &k1), (2.0, &k2), (2.0, &k3), (1.0, &k4)])?;
	}
	Ok(Solution { state: y, accepted: steps.len(), rejected: 0 })
}
