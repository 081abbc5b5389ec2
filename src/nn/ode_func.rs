//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

use tch::Tensor;
use tch::nn::Path;

use crate::Result;
use crate::odeint::Dynamics;

use super::eval_context::EvalContext;
use super::layers::{ConcatConv2d, ConcatConvConfig, GroupNorm, Layer, norm};

/// Derivative of the continuous-depth stage:
/// norm -> relu -> concat-conv -> norm -> relu -> concat-conv -> norm.
pub struct OdeFunc {
	norm1: GroupNorm,
	conv1: ConcatConv2d,
	norm2: GroupNorm,
	conv2: ConcatConv2d,
	norm3: GroupNorm,
}

impl OdeFunc {
	pub fn new(path: &Path, dim: i64) -> Result<Self> {
		let conv = ConcatConvConfig { ksize: 3, stride: 1, padding: 1, ..Default::default() };
		Ok(Self {
			norm1: norm(&path.sub("norm1"), dim)?,
			conv1: ConcatConv2d::new(&path.sub("conv1"), dim, dim, conv),
			norm2: norm(&path.sub("norm2"), dim)?,
			conv2: ConcatConv2d::new(&path.sub("conv2"), dim, dim, conv),
			norm3: norm(&path.sub("norm3"), dim)?,
		})
	}
}

impl Dynamics for OdeFunc {
	fn eval(&self, t: f64, x: &Tensor, ctx: &mut EvalContext) -> Result<Tensor> {
		ctx.record(t, x)?;

		let out = self.norm1.forward(x)?.f_relu()?;
		let out = self.conv1.forward(t, &out)?;
		let out = self.norm2.forward(&out)?.f_relu()?;
		let out = self.conv2.forward(t, &out)?;
		self.norm3.forward(&out)
	}
}
