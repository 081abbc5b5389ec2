//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

use tch::Tensor;
use tch::nn::Path;

use crate::{ErrPack, ErrorCode, Result};

use super::Layer;

pub const MAX_GROUPS: i64 = 32;

pub struct GroupNorm {
	weight: Tensor,
	bias: Tensor,
	num_groups: i64,
	eps: f64,
}

impl GroupNorm {
	pub fn new(path: &Path, num_groups: i64, num_channels: i64) -> Result<Self> {
		if num_groups <= 0 || num_channels % num_groups != 0 {
			return Err(ErrPack::new(
				ErrorCode::InvalidConfig,
				format!("GroupNorm: {num_channels} channels can't be split into {num_groups} groups"),
			));
		}
		Ok(Self {
			weight: path.ones("weight", &[num_channels]),
			bias: path.zeros("bias", &[num_channels]),
			num_groups,
			eps: 1e-5,
		})
	}

	pub fn num_groups(&self) -> i64 {
		self.num_groups
	}
}

impl Layer for GroupNorm {
	fn forward(&self, inp: &Tensor) -> Result<Tensor> {
		let out = inp.f_group_norm(self.num_groups, Some(&self.weight), Some(&self.bias), self.eps, true)?;
		Ok(out)
	}
}

/// Group normalization with at most 32 groups.
pub fn norm(path: &Path, dim: i64) -> Result<GroupNorm> {
	GroupNorm::new(path, dim.min(MAX_GROUPS), dim)
}
