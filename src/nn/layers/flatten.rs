//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

use tch::Tensor;

use crate::Result;

use super::Layer;

/// Merges all dimensions except the first one.
pub struct Flatten;

impl Layer for Flatten {
	fn forward(&self, inp: &Tensor) -> Result<Tensor> {
		let features: i64 = inp.size().iter().skip(1).product();
		Ok(inp.f_reshape([-1, features])?)
	}
}
