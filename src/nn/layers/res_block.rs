//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

use tch::Tensor;
use tch::nn::Path;

use crate::{ErrPack, ErrorCode, Result};

use super::{Conv2d, GroupNorm, Layer, conv1x1, conv3x3, norm};

/// Pre-activation residual block.
///
/// ```
///          +------+   +------+   +-------+   +------+   +------+   +-------+   +-----+
/// ---+---->| norm |-->| relu |-+>| conv1 |-->| norm |-->| relu |-->| conv2 |-->| add |--->
///    |     +------+   +------+ | +-------+   +------+   +------+   +-------+   +-----+
///    |                         |                                                  ^
///    |                         +---> downsample (optional) -----------------------+
///    |                                                                            |
///    +------------------------------ (no downsample) -----------------------------+
/// ```
pub struct ResBlock {
	norm1: GroupNorm,
	conv1: Conv2d,
	norm2: GroupNorm,
	conv2: Conv2d,
	downsample: Option<Conv2d>,
}

impl ResBlock {
	/// Block with identity shortcut. Requires `inplanes == planes` and `stride == 1`.
	pub fn new(path: &Path, inplanes: i64, planes: i64, stride: i64) -> Result<Self> {
		if inplanes != planes || stride != 1 {
			return Err(ErrPack::new(
				ErrorCode::InvalidConfig,
				format!(
					"ResBlock: identity shortcut needs matching shapes (inplanes={inplanes}, planes={planes}, stride={stride})"
				),
			));
		}
		Self::build(path, inplanes, planes, stride, None)
	}

	/// Block whose shortcut is a strided 1x1 projection of the normalized input.
	pub fn with_downsample(path: &Path, inplanes: i64, planes: i64, stride: i64) -> Result<Self> {
		let downsample = conv1x1(&path.sub("downsample"), inplanes, planes, stride);
		Self::build(path, inplanes, planes, stride, Some(downsample))
	}

	fn build(
		path: &Path,
		inplanes: i64,
		planes: i64,
		stride: i64,
		downsample: Option<Conv2d>,
	) -> Result<Self> {
		Ok(Self {
			norm1: norm(&path.sub("norm1"), inplanes)?,
			conv1: conv3x3(&path.sub("conv1"), inplanes, planes, stride),
			norm2: norm(&path.sub("norm2"), planes)?,
			conv2: conv3x3(&path.sub("conv2"), planes, planes, 1),
			downsample,
		})
	}
}

impl Layer for ResBlock {
	fn forward(&self, inp: &Tensor) -> Result<Tensor> {
		let out = self.norm1.forward(inp)?.f_relu()?;

		let shortcut = match &self.downsample {
			Some(downsample) => downsample.forward(&out)?,
			None => inp.shallow_clone(),
		};

		let out = self.conv1.forward(&out)?;
		let out = self.norm2.forward(&out)?.f_relu()?;
		let out = self.conv2.forward(&out)?;

		Ok(out.f_add(&shortcut)?)
	}
}
