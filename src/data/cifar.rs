//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

use std::path::Path;

use tch::vision::dataset::Dataset;
use tch::{Device, Tensor};

use crate::{ErrPack, ErrorCode, Result};

use super::loader::Loader;

/// CIFAR-10 images as `[N, 3, 32, 32]` floats in `[0, 1]` with int64 labels.
pub struct Cifar10 {
	dataset: Dataset,
}

pub struct Loaders {
	/// Shuffled, optionally augmented, `batch_size` images per batch.
	pub train: Loader,

	/// Test set in order, `test_batch_size` images per batch.
	pub test: Loader,

	/// Training set in order and without augmentation, `test_batch_size` images per batch.
	pub train_eval: Loader,
}

impl Cifar10 {
	pub const NUM_CLASSES: i64 = 10;

	/// Reads the binary batches (`data_batch_{1..5}.bin`, `test_batch.bin`) from `dir`.
	pub fn load(dir: &Path) -> Result<Self> {
		let dataset = tch::vision::cifar::load_dir(dir).map_err(|err| {
			ErrPack::with_nested(
				ErrorCode::DatasetUnavailable,
				format!("cannot read CIFAR-10 binary batches from `{}`", dir.display()),
				err,
			)
		})?;
		log::info!(
			"CIFAR-10: {} training and {} test images from {}",
			dataset.train_images.size().first().copied().unwrap_or(0),
			dataset.test_images.size().first().copied().unwrap_or(0),
			dir.display()
		);
		Ok(Self { dataset })
	}

	pub fn from_tensors(train_images: Tensor, train_labels: Tensor, test_images: Tensor, test_labels: Tensor) -> Self {
		Self {
			dataset: Dataset {
				train_images,
				train_labels,
				test_images,
				test_labels,
				labels: Self::NUM_CLASSES,
			},
		}
	}

	pub fn loaders(&self, data_aug: bool, batch_size: usize, test_batch_size: usize, device: Device) -> Loaders {
		let d = &self.dataset;
		Loaders {
			train: Loader::new(&d.train_images, &d.train_labels, batch_size, device)
				.shuffled(true)
				.augmented(data_aug),
			test: Loader::new(&d.test_images, &d.test_labels, test_batch_size, device),
			train_eval: Loader::new(&d.train_images, &d.train_labels, test_batch_size, device),
		}
	}
}
