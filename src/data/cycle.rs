//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

use super::loader::{Batch, Loader};

/// Endless stream of batches. Starts a new pass over the loader whenever the
/// current one is exhausted, so batches repeat after `loader.len()` items.
///
/// Ends only if a fresh pass yields nothing.
pub struct CyclingBatches<'a> {
	loader: &'a Loader,
	current: Box<dyn Iterator<Item = Batch>>,
	epoch: usize,
}

impl<'a> CyclingBatches<'a> {
	pub fn new(loader: &'a Loader) -> Self {
		Self { loader, current: loader.iter(), epoch: 0 }
	}

	/// Number of completed passes.
	pub fn epoch(&self) -> usize {
		self.epoch
	}
}

impl Iterator for CyclingBatches<'_> {
	type Item = Batch;

	fn next(&mut self) -> Option<Batch> {
		if let Some(batch) = self.current.next() {
			return Some(batch);
		}
		self.epoch += 1;
		self.current = self.loader.iter();
		self.current.next()
	}
}
