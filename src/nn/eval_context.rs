//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

use tch::{Device, Tensor};

use crate::Result;

/// A point visited by the solver: time and a detached copy of the first batch element.
pub struct TrajectoryPoint {
	pub t: f64,
	pub state: Tensor,
}

/// Trajectory log stacked into two tensors: `times` is `[k]`, `states` is `[k, C, H, W]`.
pub struct StackedTrajectory {
	pub times: Tensor,
	pub states: Tensor,
}

/// State of one integration: how many times the derivative was evaluated,
/// and where.
///
/// The context is owned by the caller and passed to every integration, so a
/// derivative function doesn't keep any state of its own.
#[derive(Default)]
pub struct EvalContext {
	nfe: usize,
	trajectory: Vec<TrajectoryPoint>,
}

impl EvalContext {
	pub fn new() -> Self {
		Self { nfe: 0, trajectory: Vec::new() }
	}

	/// Number of function evaluations since the last reset.
	pub fn nfe(&self) -> usize {
		self.nfe
	}

	pub fn reset_nfe(&mut self) {
		self.nfe = 0;
	}

	/// Reads the evaluation counter and resets it to zero.
	pub fn take_nfe(&mut self) -> usize {
		std::mem::take(&mut self.nfe)
	}

	/// Counts one evaluation at `(t, x)` and logs a snapshot of `x[0]`.
	///
	/// The snapshot is a copy and doesn't keep the rest of the batch alive.
	pub fn record(&mut self, t: f64, x: &Tensor) -> Result<()> {
		self.nfe += 1;
		let state = x.f_get(0)?.f_detach_copy()?.f_to_device(Device::Cpu)?;
		self.trajectory.push(TrajectoryPoint { t, state });
		Ok(())
	}

	pub fn trajectory(&self) -> &[TrajectoryPoint] {
		&self.trajectory
	}

	/// Removes all logged points and returns them. The log is empty afterwards.
	pub fn drain_trajectory(&mut self) -> Vec<TrajectoryPoint> {
		std::mem::take(&mut self.trajectory)
	}

	/// Drains the log and stacks it. Returns `None` if nothing was logged.
	pub fn drain_stacked(&mut self) -> Result<Option<StackedTrajectory>> {
		let points = self.drain_trajectory();
		if points.is_empty() {
			return Ok(None);
		}
		let times: Vec<f64> = points.iter().map(|p| p.t).collect();
		let states: Vec<&Tensor> = points.iter().map(|p| &p.state).collect();
		Ok(Some(StackedTrajectory {
			times: Tensor::f_from_slice(&times)?,
			states: Tensor::f_stack(&states, 0)?,
		}))
	}

	/// Clears both the counter and the log.
	pub fn reset(&mut self) {
		self.nfe = 0;
		self.trajectory.clear();
	}
}
