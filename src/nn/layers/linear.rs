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

pub struct Linear {
	weight: Tensor,
	bias: Tensor,
}

impl Linear {
	pub fn new(path: &Path, n_inputs: i64, n_outputs: i64) -> Self {
		Self {
			weight: path.var("weight", &[n_outputs, n_inputs], init::DEFAULT_KAIMING_UNIFORM),
			bias: path.zeros("bias", &[n_outputs]),
		}
	}
}

impl Layer for Linear {
	fn forward(&self, inp: &Tensor) -> Result<Tensor> {
		Ok(inp.f_linear(&self.weight, Some(&self.bias))?)
	}
}
