//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

use tch::Tensor;
use tch::nn::Path;

use crate::Result;
use crate::odeint::{self, SolverOptions};

use super::eval_context::EvalContext;
use super::ode_func::OdeFunc;

/// Continuous-depth stage. Integrates its `OdeFunc` from `t = 0` to the end
/// time and returns the final state.
///
/// The evaluation counter and trajectory of a forward pass are collected in
/// the `EvalContext` passed to `forward()`.
pub struct OdeBlock {
	odefunc: OdeFunc,
	integration_time: [f64; 2],
	solver: SolverOptions,
}

impl OdeBlock {
	pub const DEFAULT_END_TIME: f64 = 1.0;

	pub fn new(path: &Path, dim: i64, solver: SolverOptions) -> Result<Self> {
		Ok(Self {
			odefunc: OdeFunc::new(&path.sub("odefunc"), dim)?,
			integration_time: [0.0, Self::DEFAULT_END_TIME],
			solver,
		})
	}

	pub fn integration_time(&self) -> [f64; 2] {
		self.integration_time
	}

	pub fn end_time(&self) -> f64 {
		self.integration_time[1]
	}

	pub fn set_end_time(&mut self, end_time: f64) {
		self.integration_time[1] = end_time;
	}

	pub fn forward(&self, inp: &Tensor, ctx: &mut EvalContext) -> Result<Tensor> {
		let solution = odeint::odeint(&self.odefunc, inp, self.integration_time, &self.solver, ctx)?;
		Ok(solution.state)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::odeint::{GradientMethod, Method};
	use tch::nn::VarStore;
	use tch::{Device, Kind};

	fn input() -> Tensor {
		tch::manual_seed(7);
		Tensor::randn([2, 4, 6, 6], (Kind::Float, Device::Cpu))
	}

	#[test]
	fn test_counter_and_trajectory() {
		let vs = VarStore::new(Device::Cpu);
		let block = OdeBlock::new(&vs.root(), 4, SolverOptions::adaptive(1e-3)).unwrap();
		let mut ctx = EvalContext::new();
		assert_eq!(ctx.nfe(), 0);

		let out = tch::no_grad(|| block.forward(&input(), &mut ctx)).unwrap();
		assert_eq!(out.size(), vec![2, 4, 6, 6]);
		assert!(ctx.nfe() > 0);
		assert_eq!(ctx.trajectory().len(), ctx.nfe());
		assert_eq!(ctx.trajectory()[0].state.size(), vec![4, 6, 6]);
		assert_eq!(ctx.trajectory()[0].t, 0.0);

		ctx.reset_nfe();
		assert_eq!(ctx.nfe(), 0);
		assert!(ctx.drain_trajectory().len() > 0);
		assert!(ctx.trajectory().is_empty());
	}

	#[test]
	fn test_log_length_matches_evaluations() {
		let vs = VarStore::new(Device::Cpu);
		let solver = SolverOptions::adaptive(1e-3).with_method(Method::Euler { step_size: 0.2 });
		let block = OdeBlock::new(&vs.root(), 4, solver).unwrap();
		let mut ctx = EvalContext::new();

		tch::no_grad(|| block.forward(&input(), &mut ctx)).unwrap();
		assert_eq!(ctx.nfe(), 5);
		assert_eq!(ctx.trajectory().len(), 5);
	}

	#[test]
	fn test_end_time() {
		let vs = VarStore::new(Device::Cpu);
		let mut block = OdeBlock::new(&vs.root(), 4, SolverOptions::adaptive(1e-3)).unwrap();
		assert_eq!(block.integration_time(), [0.0, 1.0]);

		block.set_end_time(0.0);
		let x = input();
		let mut ctx = EvalContext::new();
		let out = tch::no_grad(|| block.forward(&x, &mut ctx)).unwrap();
		assert!(out.equal(&x));
		assert_eq!(ctx.nfe(), 0);
	}

	#[test]
	fn test_converges_to_reference() {
		let mut vs = VarStore::new(Device::Cpu);
		let reference = OdeBlock::new(&vs.root().sub("a"), 4, SolverOptions::adaptive(1e-9)).unwrap();
		vs.double();
		let x = input().to_kind(Kind::Double);

		let mut ctx = EvalContext::new();
		let expected = tch::no_grad(|| reference.forward(&x, &mut ctx)).unwrap();

		// same weights, adjoint mode, looser tolerance
		let mut vs2 = VarStore::new(Device::Cpu);
		let solver = SolverOptions::adaptive(1e-6).with_gradient(GradientMethod::Adjoint);
		let block = OdeBlock::new(&vs2.root().sub("a"), 4, solver).unwrap();
		vs2.double();
		vs2.copy(&vs).unwrap();
		let out = tch::no_grad(|| block.forward(&x, &mut ctx)).unwrap();

		assert!(out.allclose(&expected, 1e-4, 1e-4, false));
	}
}
