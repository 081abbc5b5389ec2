//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

use tch::Tensor;
use tch::nn::{Path, init};

use crate::Result;

use super::Layer;

//--------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvConfig {
	pub stride: i64,
	pub padding: i64,
	pub bias: bool,
}

impl Default for ConvConfig {
	fn default() -> Self {
		Self { stride: 1, padding: 0, bias: true }
	}
}

//--------------------------------------------------------------------------------------------------

/// 2D convolution with square kernel. Variables are `weight` and optionally `bias`.
pub struct Conv2d {
	weight: Tensor,
	bias: Option<Tensor>,
	stride: i64,
	padding: i64,
	out_channels: i64,
}

impl Conv2d {
	pub fn new(path: &Path, in_channels: i64, out_channels: i64, ksize: i64, config: ConvConfig) -> Self {
		let weight = path.var(
			"weight",
			&[out_channels, in_channels, ksize, ksize],
			init::DEFAULT_KAIMING_UNIFORM,
		);
		let bias = config.bias.then(|| path.zeros("bias", &[out_channels]));
		Self {
			weight,
			bias,
			stride: config.stride,
			padding: config.padding,
			out_channels,
		}
	}

	pub fn out_channels(&self) -> i64 {
		self.out_channels
	}
}

impl Layer for Conv2d {
	fn forward(&self, inp: &Tensor) -> Result<Tensor> {
		let out = inp.f_conv2d(
			&self.weight,
			self.bias.as_ref(),
			[self.stride, self.stride],
			[self.padding, self.padding],
			[1, 1],
			1,
		)?;
		Ok(out)
	}
}

/// 3x3 convolution with padding, no bias.
pub fn conv3x3(path: &Path, in_planes: i64, out_planes: i64, stride: i64) -> Conv2d {
	Conv2d::new(path, in_planes, out_planes, 3, ConvConfig { stride, padding: 1, bias: false })
}

/// 1x1 convolution, no bias.
pub fn conv1x1(path: &Path, in_planes: i64, out_planes: i64, stride: i64) -> Conv2d {
	Conv2d::new(path, in_planes, out_planes, 1, ConvConfig { stride, padding: 0, bias: false })
}
