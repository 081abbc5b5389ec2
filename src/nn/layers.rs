//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

pub mod concat_conv;
pub mod conv;
pub mod flatten;
pub mod linear;
pub mod norm;
pub mod res_block;


use tch::Tensor;

use crate::Result;

pub use concat_conv::{ConcatConv2d, ConcatConvConfig};
pub use conv::{Conv2d, ConvConfig, conv1x1, conv3x3};
pub use flatten::Flatten;
pub use linear::Linear;
pub use norm::{GroupNorm, norm};
pub use res_block::ResBlock;

/// A time-independent transform of a feature tensor.
///
/// Layers never modify their input in place. The output is always a new tensor.
pub trait Layer {
	fn forward(&self, inp: &Tensor) -> Result<Tensor>;
}
