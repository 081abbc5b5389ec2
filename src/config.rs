//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

use std::path::PathBuf;

use clap::{ArgAction, Parser, ValueEnum};
use tch::Device;

use crate::nn::model::ModelConfig;
use crate::nn::{DownsamplingMethod, NetworkKind};
use crate::odeint::{GradientMethod, Method, SolverOptions};
use crate::robustness::ContrastSweep;
use crate::{ErrPack, ErrorCode, Result};

//--------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SolverMethod {
	Dopri5,
	Rk4,
	Euler,
}

/// Measures how the accuracy of a trained CIFAR-10 classifier degrades when
/// the contrast of the test images is scaled down or up.
#[derive(Debug, Clone, Parser)]
#[command(name = "contrast-ode")]
#[command(version, about, long_about = None)]
pub struct Config {
	/// Network kind (resnet, odenet)
	#[arg(long, default_value = "odenet")]
	pub network: NetworkKind,

	/// Absolute and relative tolerance of the adaptive solver
	#[arg(long, default_value_t = 1e-3)]
	pub tol: f64,

	/// Integrate without keeping an autograd graph
	#[arg(long, action = ArgAction::Set, default_value_t = true)]
	pub adjoint: bool,

	/// Downsampling method (conv, res)
	#[arg(long, default_value = "conv")]
	pub downsampling_method: DownsamplingMethod,

	/// Number of passes over the test set per contrast factor
	#[arg(long, default_value_t = 1)]
	pub nepochs: usize,

	/// Augment training batches with random flips and crops
	#[arg(long = "data_aug", action = ArgAction::Set, default_value_t = true)]
	pub data_aug: bool,

	#[arg(long = "batch_size", default_value_t = 128)]
	pub batch_size: usize,

	#[arg(long = "test_batch_size", default_value_t = 1000)]
	pub test_batch_size: usize,

	/// CUDA device index, used when CUDA is available
	#[arg(long, default_value_t = 0)]
	pub gpu: usize,

	/// Trained weights (.safetensors, or a libtorch state dict)
	#[arg(long, default_value = "experiment_cifar10_ode_net/model.safetensors")]
	pub checkpoint: PathBuf,

	/// Directory with the CIFAR-10 binary batches
	#[arg(long, default_value = "cifar-10-batches-bin")]
	pub data_dir: PathBuf,

	/// Output archive
	#[arg(long, default_value = "contrast_ode_net_robust.npz")]
	pub output: PathBuf,

	#[arg(long, value_enum, default_value_t = SolverMethod::Dopri5)]
	pub method: SolverMethod,

	/// Step size of the fixed-grid methods
	#[arg(long, default_value_t = 0.1)]
	pub step_size: f64,

	/// Upper bound on attempted solver steps per integration
	#[arg(long, default_value_t = SolverOptions::DEFAULT_MAX_STEPS)]
	pub max_steps: usize,

	#[arg(long, allow_negative_numbers = true, default_value_t = ContrastSweep::DEFAULT_MIN_EXP)]
	pub contrast_min_exp: f64,

	#[arg(long, allow_negative_numbers = true, default_value_t = ContrastSweep::DEFAULT_MAX_EXP)]
	pub contrast_max_exp: f64,

	#[arg(long, default_value_t = ContrastSweep::DEFAULT_STEPS)]
	pub contrast_steps: usize,

	/// More output per occurrence
	#[arg(short, long, action = ArgAction::Count)]
	pub verbose: u8,

	/// Only report errors
	#[arg(short, long)]
	pub quiet: bool,
}

#[cold]
#[inline(never)]
fn invalid(message: String) -> ErrPack<ErrorCode> {
	ErrPack::new(ErrorCode::InvalidConfig, message)
}

impl Config {
	pub fn validate(&self) -> Result<()> {
		if !(self.tol.is_finite() && self.tol > 0.0) {
			return Err(invalid(format!("--tol must be positive, got {}", self.tol)));
		}
		if self.batch_size == 0 || self.test_batch_size == 0 {
			return Err(invalid(format!(
				"batch sizes must be positive, got --batch_size {} and --test_batch_size {}",
				self.batch_size, self.test_batch_size
			)));
		}
		if self.nepochs == 0 {
			return Err(invalid("--nepochs must be at least 1".to_string()));
		}
		if self.method != SolverMethod::Dopri5 && !(self.step_size.is_finite() && self.step_size > 0.0) {
			return Err(invalid(format!("--step-size must be positive, got {}", self.step_size)));
		}
		if self.max_steps == 0 {
			return Err(invalid("--max-steps must be at least 1".to_string()));
		}
		if self.contrast_steps == 0 {
			return Err(invalid("--contrast-steps must be at least 1".to_string()));
		}
		let (lo, hi) = (self.contrast_min_exp, self.contrast_max_exp);
		if !lo.is_finite() || !hi.is_finite() || lo > hi {
			return Err(invalid(format!("invalid contrast exponent range [{lo}, {hi}]")));
		}
		Ok(())
	}

	pub fn solver_options(&self) -> SolverOptions {
		let method = match self.method {
			SolverMethod::Dopri5 => Method::Dopri5,
			SolverMethod::Rk4 => Method::Rk4 { step_size: self.step_size },
			SolverMethod::Euler => Method::Euler { step_size: self.step_size },
		};
		let gradient = if self.adjoint { GradientMethod::Adjoint } else { GradientMethod::Direct };
		let mut opts = SolverOptions::adaptive(self.tol).with_method(method).with_gradient(gradient);
		opts.max_steps = self.max_steps;
		opts
	}

	pub fn model_config(&self) -> ModelConfig {
		ModelConfig {
			network: self.network,
			downsampling: self.downsampling_method,
			solver: self.solver_options(),
		}
	}

	/// Contrast factors, with `nepochs` passes over `batches_per_epoch` batches each.
	pub fn sweep(&self, batches_per_epoch: usize) -> ContrastSweep {
		ContrastSweep::logspace(
			self.contrast_min_exp,
			self.contrast_max_exp,
			self.contrast_steps,
			self.nepochs * batches_per_epoch,
		)
	}

	pub fn device(&self) -> Device {
		if tch::Cuda::is_available() { Device::Cuda(self.gpu) } else { Device::Cpu }
	}
}

//--------------------------------------------------------------------------------------------------
