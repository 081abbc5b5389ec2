//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

use tch::data::Iter2;
use tch::vision::dataset;
use tch::{Device, Tensor};

use crate::util::size_i64;

/// `(images, labels)`. Images are `[N, C, H, W]` floats, labels `[N]` int64.
pub type Batch = (Tensor, Tensor);

/// Splits a labelled image set into batches. An incomplete last batch is dropped.
pub struct Loader {
	images: Tensor,
	labels: Tensor,
	batch_size: usize,
	shuffle: bool,
	augment: bool,
	device: Device,
}

impl Loader {
	pub fn new(images: &Tensor, labels: &Tensor, batch_size: usize, device: Device) -> Self {
		Self {
			images: images.shallow_clone(),
			labels: labels.shallow_clone(),
			batch_size,
			shuffle: false,
			augment: false,
			device,
		}
	}

	pub fn shuffled(mut self, shuffle: bool) -> Self {
		self.shuffle = shuffle;
		self
	}

	/// Random horizontal flip and a random crop of the image padded by 4 pixels.
	pub fn augmented(mut self, augment: bool) -> Self {
		self.augment = augment;
		self
	}

	pub fn batch_size(&self) -> usize {
		self.batch_size
	}

	/// Number of full batches in one pass.
	pub fn len(&self) -> usize {
		if self.batch_size == 0 {
			return 0;
		}
		usize::try_from(self.images.size().first().copied().unwrap_or(0)).unwrap_or(0) / self.batch_size
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// One pass over the data.
	pub fn iter(&self) -> Box<dyn Iterator<Item = Batch>> {
		if self.is_empty() {
			return Box::new(std::iter::empty());
		}
		let mut iter = Iter2::new(&self.images, &self.labels, size_i64(self.batch_size));
		if self.shuffle {
			iter.shuffle();
		}
		iter.to_device(self.device);
		if self.augment {
			Box::new(iter.map(|(images, labels)| (dataset::augmentation(&images, true, 4, 0), labels)))
		} else {
			Box::new(iter)
		}
	}
}
