//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

/// Exponential moving average of a scalar.
///
/// The first update sets the average to the value itself.
pub struct RunningAverageMeter {
	momentum: f64,
	val: Option<f64>,
	avg: f64,
}

impl Default for RunningAverageMeter {
	fn default() -> Self {
		Self::new(0.99)
	}
}

impl RunningAverageMeter {
	pub fn new(momentum: f64) -> Self {
		Self { momentum, val: None, avg: 0.0 }
	}

	pub fn reset(&mut self) {
		self.val = None;
		self.avg = 0.0;
	}

	pub fn update(&mut self, val: f64) {
		self.avg = match self.val {
			None => val,
			Some(_) => self.avg * self.momentum + val * (1.0 - self.momentum),
		};
		self.val = Some(val);
	}

	/// The most recent value.
	pub fn val(&self) -> Option<f64> {
		self.val
	}

	pub fn avg(&self) -> f64 {
		self.avg
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use assert_approx_eq::assert_approx_eq;

	#[test]
	fn test_first_update_sets_average() {
		let mut meter = RunningAverageMeter::default();
		meter.update(4.0);
		assert_approx_eq!(meter.avg(), 4.0, 1e-12);
		assert_eq!(meter.val(), Some(4.0));
	}

	#[test]
	fn test_momentum() {
		let mut meter = RunningAverageMeter::new(0.5);
		meter.update(2.0);
		meter.update(4.0);
		assert_approx_eq!(meter.avg(), 3.0, 1e-12);

		meter.reset();
		assert_eq!(meter.val(), None);
		assert_approx_eq!(meter.avg(), 0.0, 1e-12);
	}
}
