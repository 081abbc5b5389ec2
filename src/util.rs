//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

pub mod meter;

pub use meter::RunningAverageMeter;

pub trait LossyInto<T> {
	fn lossy_into(self) -> T;
}

#[allow(clippy::cast_precision_loss)]
impl LossyInto<f64> for usize {
	fn lossy_into(self) -> f64 {
		self as f64
	}
}

#[allow(clippy::cast_precision_loss)]
impl LossyInto<f64> for i64 {
	fn lossy_into(self) -> f64 {
		self as f64
	}
}

/// Converts a count to the `i64` libtorch uses for sizes.
#[allow(clippy::cast_possible_wrap)]
pub fn size_i64(n: usize) -> i64 {
	n as i64
}
