//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

use std::path::Path;
use std::time::Instant;

use ndarray::{Array1, Array2};
use tch::{Device, Kind, Tensor};

use crate::data::Batch;
use crate::nn::model_context::FEATURE_STAGES;
use crate::nn::{Model, ModelContext};
use crate::util::{LossyInto, RunningAverageMeter, size_i64};
use crate::{ErrPack, ErrorCode, Result};

//--------------------------------------------------------------------------------------------------

/// Contrast factors to evaluate, in order, and the number of batches per factor.
#[derive(Debug, Clone, PartialEq)]
pub struct ContrastSweep {
	pub factors: Array1<f64>,
	pub iterations: usize,
}

impl ContrastSweep {
	pub const DEFAULT_MIN_EXP: f64 = -3.0;
	pub const DEFAULT_MAX_EXP: f64 = 0.7;
	pub const DEFAULT_STEPS: usize = 30;

	pub fn new(factors: &[f64], iterations: usize) -> Self {
		Self { factors: Array1::from(factors.to_vec()), iterations }
	}

	/// `steps` factors spaced evenly on a log scale from `10^min_exp` to `10^max_exp`, both included.
	pub fn logspace(min_exp: f64, max_exp: f64, steps: usize, iterations: usize) -> Self {
		Self {
			factors: Array1::logspace(10.0, min_exp, max_exp, steps),
			iterations,
		}
	}
}

//--------------------------------------------------------------------------------------------------

pub struct SweepResults {
	pub contrast_list: Array1<f64>,

	/// `[factor, 0]` is the number of correct predictions, `[factor, 1]` the number of examples.
	pub accuracy: Array2<f64>,

	/// Mean number of function evaluations per batch in the first feature stage.
	pub mean_f_nfe: Array1<f64>,

	/// Mean number of function evaluations per batch, `[factor, stage]`.
	/// Not written to the archive.
	pub stage_nfe: Array2<f64>,

	pub batches_per_epoch: usize,
}

impl SweepResults {
	pub fn new(contrast_list: &Array1<f64>, batches_per_epoch: usize) -> Self {
		let n = contrast_list.len();
		Self {
			contrast_list: contrast_list.clone(),
			accuracy: Array2::zeros((n, 2)),
			mean_f_nfe: Array1::zeros(n),
			stage_nfe: Array2::zeros((n, FEATURE_STAGES)),
			batches_per_epoch,
		}
	}

	pub fn len(&self) -> usize {
		self.contrast_list.len()
	}

	pub fn is_empty(&self) -> bool {
		self.contrast_list.is_empty()
	}

	/// Accuracy in percent, or `None` if no example was evaluated at this index.
	pub fn accuracy_percent(&self, index: usize) -> Option<f64> {
		let correct = *self.accuracy.get((index, 0))?;
		let total = *self.accuracy.get((index, 1))?;
		(total > 0.0).then(|| correct / total * 100.0)
	}

	/// Writes `contrast_list`, `accuracy`, `mean_f_nfe` and `batches_per_epoch` to a `.npz` archive.
	pub fn save_npz(&self, path: &Path) -> Result<()> {
		let n = size_i64(self.len());
		let contrast_list = Tensor::f_from_slice(&self.contrast_list.to_vec())?;
		let accuracy = Tensor::f_from_slice(&self.accuracy.iter().copied().collect::<Vec<f64>>())?.f_reshape([n, 2])?;
		let mean_f_nfe = Tensor::f_from_slice(&self.mean_f_nfe.to_vec())?;
		let batches_per_epoch = Tensor::f_scalar_tensor(size_i64(self.batches_per_epoch), (Kind::Int64, Device::Cpu))?;

		Tensor::write_npz(
			&[
				("contrast_list", &contrast_list),
				("accuracy", &accuracy),
				("mean_f_nfe", &mean_f_nfe),
				("batches_per_epoch", &batches_per_epoch),
			],
			path,
		)?;
		log::info!("Results written to {}", path.display());
		Ok(())
	}
}

//--------------------------------------------------------------------------------------------------

/// Scales pixel intensities by the contrast factor `c`.
pub fn rescale_contrast(images: &Tensor, c: f64) -> Result<Tensor> {
	Ok(images.f_mul_scalar(c)?)
}

/// Number of rows of `logits` whose argmax equals the label, and the number of rows.
pub fn count_correct(logits: &Tensor, labels: &Tensor) -> Result<(i64, i64)> {
	let predicted = logits.f_argmax(1, false)?;
	let correct = predicted.f_eq_tensor(labels)?.f_sum(Kind::Int64)?.f_int64_value(&[])?;
	let total = labels.size().first().copied().unwrap_or(0);
	Ok((correct, total))
}

#[cold]
#[inline(never)]
fn batch_stream_ended(factor_index: usize, iteration: usize) -> ErrPack<ErrorCode> {
	ErrPack::new(
		ErrorCode::EmptyBatchStream,
		format!("no batch for contrast factor #{factor_index}, iteration {iteration}"),
	)
}

//--------------------------------------------------------------------------------------------------

/// Runs the contrast sweep.
///
/// For every factor `c`, the end time of the first continuous-depth block is
/// set to `c` times its value before the sweep, and `sweep.iterations` batches
/// scaled by `c` are classified. The end time is restored afterwards.
pub fn evaluate(
	model: &mut Model,
	batches: &mut dyn Iterator<Item = Batch>,
	sweep: &ContrastSweep,
	batches_per_epoch: usize,
	device: Device,
) -> Result<SweepResults> {
	let mut results = SweepResults::new(&sweep.factors, batches_per_epoch);
	let mut ctx = ModelContext::new();
	let mut batch_time = RunningAverageMeter::default();
	let baseline_end_time = model.ode_block_mut(0).map(|block| block.end_time());

	for (ci, &c) in sweep.factors.iter().enumerate() {
		if let (Some(block), Some(end_time)) = (model.ode_block_mut(0), baseline_end_time) {
			block.set_end_time(end_time * c);
		}

		let mut nfe_sums = [0_usize; FEATURE_STAGES];
		for itr in 0..sweep.iterations {
			let (images, labels) = batches.next().ok_or_else(|| batch_stream_ended(ci, itr))?;
			let images = rescale_contrast(&images.f_to_device(device)?, c)?;
			let labels = labels.f_to_device(device)?;

			let start = Instant::now();
			let logits = tch::no_grad(|| model.forward(&images, &mut ctx))?;
			batch_time.update(start.elapsed().as_secs_f64());

			let (correct, total) = count_correct(&logits, &labels)?;
			let counts: [f64; 2] = [correct.lossy_into(), total.lossy_into()];
			for (acc, count) in results.accuracy.row_mut(ci).iter_mut().zip(counts) {
				*acc += count;
			}

			for ((i, stage), sum) in ctx.stages.iter_mut().enumerate().zip(&mut nfe_sums) {
				let nfe = stage.take_nfe();
				*sum += nfe;
				if let Some(trajectory) = stage.drain_stacked()? {
					log::trace!(
						"stage {}: nfe={nfe}, trajectory times {:?}, states {:?}",
						i + 1,
						trajectory.times.size(),
						trajectory.states.size()
					);
				}
			}
			log::debug!(
				"contrast {c:.6}, batch {itr}: {correct}/{total} correct, {:.3}s per batch (avg)",
				batch_time.avg()
			);
		}

		if sweep.iterations > 0 {
			let iterations: f64 = sweep.iterations.lossy_into();
			for (mean, &sum) in results.stage_nfe.row_mut(ci).iter_mut().zip(&nfe_sums) {
				let sum: f64 = sum.lossy_into();
				*mean = sum / iterations;
			}
		}
		let f_nfe = results.stage_nfe.get((ci, 0)).copied().unwrap_or(0.0);
		if let Some(mean) = results.mean_f_nfe.get_mut(ci) {
			*mean = f_nfe;
		}
		log::debug!("contrast {c:.6}: mean nfe per stage {}", results.stage_nfe.row(ci));
		match results.accuracy_percent(ci) {
			Some(acc) => log::info!("contrast {c:.6}: accuracy {acc:.2}%, mean nfe {f_nfe:.2}"),
			None => log::warn!("contrast {c:.6}: no examples evaluated"),
		}
	}

	if let (Some(block), Some(end_time)) = (model.ode_block_mut(0), baseline_end_time) {
		block.set_end_time(end_time);
	}
	Ok(results)
}

//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
	use super::*;
	use crate::data::{CyclingBatches, Loader};
	use crate::nn::model::{DownsamplingMethod, ModelConfig, NetworkKind};
	use crate::odeint::{Method, SolverOptions};
	use assert_approx_eq::assert_approx_eq;
	use tch::nn::VarStore;

	fn model_with_solver(vs: &VarStore, network: NetworkKind, solver: SolverOptions) -> Model {
		let config = ModelConfig { network, downsampling: DownsamplingMethod::Conv, solver };
		Model::new(&vs.root(), &config).unwrap()
	}

	fn model(vs: &VarStore, network: NetworkKind) -> Model {
		model_with_solver(vs, network, SolverOptions::adaptive(1e-3))
	}

	fn test_set(n: i64) -> (Tensor, Tensor) {
		tch::manual_seed(3);
		let images = Tensor::rand([n, 3, 32, 32], (Kind::Float, Device::Cpu));
		let labels = Tensor::arange(n, (Kind::Int64, Device::Cpu)).remainder(10);
		(images, labels)
	}

	#[test]
	fn test_rescale_zero_input() {
		let zeros = Tensor::zeros([2, 3, 4, 4], (Kind::Float, Device::Cpu));
		for c in [1e-3, 0.5, 1.0, 5.01] {
			let scaled = rescale_contrast(&zeros, c).unwrap();
			assert!(scaled.equal(&zeros));
		}
	}

	#[test]
	fn test_default_logspace() {
		let sweep = ContrastSweep::logspace(
			ContrastSweep::DEFAULT_MIN_EXP,
			ContrastSweep::DEFAULT_MAX_EXP,
			ContrastSweep::DEFAULT_STEPS,
			1,
		);
		assert_eq!(sweep.factors.len(), 30);
		assert_approx_eq!(sweep.factors[0], 1e-3, 1e-12);
		assert_approx_eq!(sweep.factors[29], 10.0_f64.powf(0.7), 1e-9);
		assert!(sweep.factors.windows(2).into_iter().all(|w| w[0] < w[1]));
	}

	#[test]
	fn test_count_correct() {
		let logits = Tensor::from_slice(&[0.1_f32, 0.9, 0.8, 0.2, 0.3, 0.7]).reshape([3, 2]);
		let labels = Tensor::from_slice(&[1_i64, 1, 1]);
		assert_eq!(count_correct(&logits, &labels).unwrap(), (2, 3));
	}

	#[test]
	fn test_accuracy_percent() {
		let mut results = SweepResults::new(&Array1::from(vec![0.1, 1.0]), 5);
		results.accuracy[(0, 0)] = 3.0;
		results.accuracy[(0, 1)] = 4.0;
		assert_approx_eq!(results.accuracy_percent(0).unwrap(), 75.0, 1e-12);
		assert_eq!(results.accuracy_percent(1), None);
		assert_eq!(results.accuracy_percent(2), None);
	}

	#[test]
	fn test_two_factor_sweep() {
		let vs = VarStore::new(Device::Cpu);
		let mut model = model(&vs, NetworkKind::OdeNet);
		let (images, labels) = test_set(4);
		let loader = Loader::new(&images, &labels, 2, Device::Cpu);
		let mut batches = CyclingBatches::new(&loader);

		let sweep = ContrastSweep::new(&[0.1, 1.0], 1);
		let results = evaluate(&mut model, &mut batches, &sweep, loader.len(), Device::Cpu).unwrap();

		assert_eq!(results.len(), 2);
		for i in 0..2 {
			assert_approx_eq!(results.accuracy[(i, 1)], 2.0, 1e-12);
			let acc = results.accuracy_percent(i).unwrap();
			assert!((0.0..=100.0).contains(&acc));
			assert!(results.mean_f_nfe[i] > 0.0);
		}
		assert_eq!(model.ode_block_mut(0).map(|block| block.end_time()), Some(1.0));

		let path = std::env::temp_dir().join(format!("contrast_ode_{}_sweep.npz", std::process::id()));
		results.save_npz(&path).unwrap();
		let arrays = Tensor::read_npz(&path).unwrap();
		let get = |name: &str| arrays.iter().find(|(n, _)| n == name).map(|(_, t)| t.size());
		assert_eq!(get("contrast_list"), Some(vec![2]));
		assert_eq!(get("accuracy"), Some(vec![2, 2]));
		assert_eq!(get("mean_f_nfe"), Some(vec![2]));
		assert!(get("batches_per_epoch").is_some());
		std::fs::remove_file(&path).unwrap();
	}

	#[test]
	fn test_only_first_stage_horizon_scales() {
		let vs = VarStore::new(Device::Cpu);
		let solver = SolverOptions::adaptive(1e-3).with_method(Method::Euler { step_size: 0.2 });
		let mut model = model_with_solver(&vs, NetworkKind::OdeNet, solver);
		let (images, labels) = test_set(4);
		let loader = Loader::new(&images, &labels, 2, Device::Cpu);
		let mut batches = CyclingBatches::new(&loader);

		// Euler with step 0.2: 2 evaluations up to t = 0.4, 5 up to t = 1.0
		let sweep = ContrastSweep::new(&[0.4, 1.0], 2);
		let results = evaluate(&mut model, &mut batches, &sweep, loader.len(), Device::Cpu).unwrap();

		assert_approx_eq!(results.mean_f_nfe[0], 2.0, 1e-12);
		assert_approx_eq!(results.mean_f_nfe[1], 5.0, 1e-12);
		for ci in 0..2 {
			assert_approx_eq!(results.stage_nfe[(ci, 1)], 5.0, 1e-12);
			assert_approx_eq!(results.stage_nfe[(ci, 2)], 5.0, 1e-12);
		}
		assert_approx_eq!(results.stage_nfe[(0, 0)], 2.0, 1e-12);
	}

	#[test]
	fn test_resnet_sweep_has_no_evaluations() {
		let vs = VarStore::new(Device::Cpu);
		let mut model = model(&vs, NetworkKind::ResNet);
		let (images, labels) = test_set(6);
		let loader = Loader::new(&images, &labels, 3, Device::Cpu);
		let mut batches = CyclingBatches::new(&loader);

		// 3 iterations over a 2-batch loader wrap around
		let sweep = ContrastSweep::new(&[0.5], 3);
		let results = evaluate(&mut model, &mut batches, &sweep, loader.len(), Device::Cpu).unwrap();
		assert_approx_eq!(results.accuracy[(0, 1)], 9.0, 1e-12);
		assert_approx_eq!(results.mean_f_nfe[0], 0.0, 1e-12);
		assert_eq!(results.batches_per_epoch, 2);
	}

	#[test]
	fn test_stream_ends() {
		let vs = VarStore::new(Device::Cpu);
		let mut model = model(&vs, NetworkKind::ResNet);
		let mut batches = std::iter::empty::<Batch>();
		let sweep = ContrastSweep::new(&[1.0], 1);
		let err = evaluate(&mut model, &mut batches, &sweep, 0, Device::Cpu).err().unwrap();
		assert_eq!(err.code, ErrorCode::EmptyBatchStream);
	}
}
