//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

use clap::Parser;
use tch::nn::VarStore;

use contrast_ode::config::Config;
use contrast_ode::data::{Cifar10, CyclingBatches};
use contrast_ode::nn::{Model, checkpoint};
use contrast_ode::{ErrPack, ErrorCode, logging, robustness};

fn main() -> Result<(), ErrPack<ErrorCode>> {
	let config = Config::parse();
	logging::init(config.verbose, config.quiet)?;
	config.validate()?;

	let device = config.device();
	log::info!("Running on {device:?}");

	let mut vs = VarStore::new(device);
	let mut model = Model::new(&vs.root(), &config.model_config())?;
	checkpoint::load(&mut vs, &config.checkpoint)?;
	vs.freeze();

	let cifar = Cifar10::load(&config.data_dir)?;
	let loaders = cifar.loaders(config.data_aug, config.batch_size, config.test_batch_size, device);
	let batches_per_epoch = loaders.test.len();
	let mut batches = CyclingBatches::new(&loaders.test);

	let sweep = config.sweep(batches_per_epoch);
	log::info!(
		"Sweeping {} contrast factors, {} batches each",
		sweep.factors.len(),
		sweep.iterations
	);
	let results = robustness::evaluate(&mut model, &mut batches, &sweep, batches_per_epoch, device)?;
	results.save_npz(&config.output)?;
	Ok(())
}
