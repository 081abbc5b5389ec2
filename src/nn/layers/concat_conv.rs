//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

use tch::Tensor;
use tch::nn::{Path, init};

use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConcatConvConfig {
	pub ksize: i64,
	pub stride: i64,
	pub padding: i64,
	pub dilation: i64,
	pub groups: i64,
	pub bias: bool,
	pub transpose: bool,
}

impl Default for ConcatConvConfig {
	fn default() -> Self {
		Self {
			ksize: 3,
			stride: 1,
			padding: 0,
			dilation: 1,
			groups: 1,
			bias: true,
			transpose: false,
		}
	}
}

/// Convolution that sees time as one extra input channel.
///
/// The scalar `t` is broadcast to a `[N, 1, H, W]` plane and concatenated in
/// front of the input channels. Variables live under `_layer`.
pub struct ConcatConv2d {
	weight: Tensor,
	bias: Option<Tensor>,
	config: ConcatConvConfig,
}

impl ConcatConv2d {
	pub fn new(path: &Path, dim_in: i64, dim_out: i64, config: ConcatConvConfig) -> Self {
		let path = path.sub("_layer");
		let k = config.ksize;
		let dims = if config.transpose {
			[dim_in + 1, dim_out / config.groups, k, k]
		} else {
			[dim_out, (dim_in + 1) / config.groups, k, k]
		};
		let weight = path.var("weight", &dims, init::DEFAULT_KAIMING_UNIFORM);
		let bias = config.bias.then(|| path.zeros("bias", &[dim_out]));
		Self { weight, bias, config }
	}

	pub fn forward(&self, t: f64, inp: &Tensor) -> Result<Tensor> {
		let tt = inp.f_narrow(1, 0, 1)?.f_full_like(t)?;
		let ttx = Tensor::f_cat(&[&tt, inp], 1)?;

		let c = &self.config;
		let out = if c.transpose {
			ttx.f_conv_transpose2d(
				&self.weight,
				self.bias.as_ref(),
				[c.stride, c.stride],
				[c.padding, c.padding],
				[0, 0],
				c.groups,
				[c.dilation, c.dilation],
			)?
		} else {
			ttx.f_conv2d(
				&self.weight,
				self.bias.as_ref(),
				[c.stride, c.stride],
				[c.padding, c.padding],
				[c.dilation, c.dilation],
				c.groups,
			)?
		};
		Ok(out)
	}
}
