//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

use std::str::FromStr;

use tch::Tensor;
use tch::nn::Path;

use crate::odeint::SolverOptions;
use crate::{ErrPack, ErrorCode, Result};

use super::eval_context::EvalContext;
use super::layers::{Conv2d, ConvConfig, Flatten, GroupNorm, Layer, Linear, ResBlock, norm};
use super::model_context::{FEATURE_STAGES, ModelContext};
use super::ode_block::OdeBlock;

//--------------------------------------------------------------------------------------------------

pub const IN_CHANNELS: i64 = 3;
pub const NUM_CLASSES: i64 = 10;

/// Channel count of each feature stage.
pub const STAGE_CHANNELS: [i64; FEATURE_STAGES] = [32, 64, 128];

/// Number of residual blocks replacing one continuous-depth block.
pub const RES_BLOCKS_PER_STAGE: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkKind {
	/// Each feature stage is a stack of residual blocks.
	ResNet,

	/// Each feature stage is a continuous-depth block.
	OdeNet,
}

impl FromStr for NetworkKind {
	type Err = ErrPack<ErrorCode>;

	fn from_str(s: &str) -> Result<Self> {
		match s {
			"resnet" => Ok(Self::ResNet),
			"odenet" => Ok(Self::OdeNet),
			_ => Err(ErrPack::new(ErrorCode::InvalidConfig, format!("unknown network kind `{s}`"))),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownsamplingMethod {
	/// norm -> relu -> 4x4 convolution with stride 2
	Conv,

	/// Residual block with stride 2 and a projected shortcut.
	Res,
}

impl FromStr for DownsamplingMethod {
	type Err = ErrPack<ErrorCode>;

	fn from_str(s: &str) -> Result<Self> {
		match s {
			"conv" => Ok(Self::Conv),
			"res" => Ok(Self::Res),
			_ => Err(ErrPack::new(
				ErrorCode::InvalidConfig,
				format!("unknown downsampling method `{s}`"),
			)),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelConfig {
	pub network: NetworkKind,
	pub downsampling: DownsamplingMethod,
	pub solver: SolverOptions,
}

//--------------------------------------------------------------------------------------------------

/// Hands out consecutive module indices, so that variable names match the
/// state dict of a flat sequential model: `0.weight`, `1.odefunc.norm1.weight`, ...
struct SequentialIndex<'a, 'p> {
	path: &'a Path<'p>,
	next: usize,
}

impl<'a, 'p> SequentialIndex<'a, 'p> {
	fn new(path: &'a Path<'p>) -> Self {
		Self { path, next: 0 }
	}

	/// Path of the next module.
	fn module(&mut self) -> Path<'p> {
		let path = self.path.sub(self.next);
		self.next += 1;
		path
	}

	/// Skips a module without parameters, e.g. an activation.
	fn skip(&mut self, n: usize) {
		self.next += n;
	}
}

//--------------------------------------------------------------------------------------------------

pub enum FeatureStage {
	Integrated(OdeBlock),
	FixedDepth(Vec<ResBlock>),
}

impl FeatureStage {
	fn new(seq: &mut SequentialIndex, dim: i64, config: &ModelConfig) -> Result<Self> {
		match config.network {
			NetworkKind::OdeNet => Ok(Self::Integrated(OdeBlock::new(&seq.module(), dim, config.solver)?)),
			NetworkKind::ResNet => {
				let blocks = (0..RES_BLOCKS_PER_STAGE)
					.map(|_| ResBlock::new(&seq.module(), dim, dim, 1))
					.collect::<Result<Vec<_>>>()?;
				Ok(Self::FixedDepth(blocks))
			},
		}
	}

	pub fn forward(&self, inp: &Tensor, ctx: &mut EvalContext) -> Result<Tensor> {
		match self {
			Self::Integrated(block) => block.forward(inp, ctx),
			Self::FixedDepth(blocks) => {
				let mut out = inp.shallow_clone();
				for block in blocks {
					out = block.forward(&out)?;
				}
				Ok(out)
			},
		}
	}

	pub fn ode_block(&self) -> Option<&OdeBlock> {
		match self {
			Self::Integrated(block) => Some(block),
			Self::FixedDepth(_) => None,
		}
	}

	pub fn ode_block_mut(&mut self) -> Option<&mut OdeBlock> {
		match self {
			Self::Integrated(block) => Some(block),
			Self::FixedDepth(_) => None,
		}
	}
}

//--------------------------------------------------------------------------------------------------

pub enum Downsample {
	Conv { norm: GroupNorm, conv: Conv2d },
	Res(ResBlock),
}

impl Downsample {
	fn new(seq: &mut SequentialIndex, dim_in: i64, dim_out: i64, method: DownsamplingMethod) -> Result<Self> {
		match method {
			DownsamplingMethod::Conv => {
				let norm = norm(&seq.module(), dim_in)?;
				seq.skip(1); // relu
				let config = ConvConfig { stride: 2, padding: 1, bias: true };
				let conv = Conv2d::new(&seq.module(), dim_in, dim_out, 4, config);
				Ok(Self::Conv { norm, conv })
			},
			DownsamplingMethod::Res => Ok(Self::Res(ResBlock::with_downsample(&seq.module(), dim_in, dim_out, 2)?)),
		}
	}
}

impl Layer for Downsample {
	fn forward(&self, inp: &Tensor) -> Result<Tensor> {
		match self {
			Self::Conv { norm, conv } => conv.forward(&norm.forward(inp)?.f_relu()?),
			Self::Res(block) => block.forward(inp),
		}
	}
}

//--------------------------------------------------------------------------------------------------

/// norm -> relu -> global average pool -> flatten -> linear
pub struct ClassifierHead {
	norm: GroupNorm,
	flatten: Flatten,
	linear: Linear,
}

impl ClassifierHead {
	fn new(seq: &mut SequentialIndex, dim: i64, num_classes: i64) -> Result<Self> {
		let norm = norm(&seq.module(), dim)?;
		seq.skip(3); // relu, pool, flatten
		let linear = Linear::new(&seq.module(), dim, num_classes);
		Ok(Self { norm, flatten: Flatten, linear })
	}
}

impl Layer for ClassifierHead {
	fn forward(&self, inp: &Tensor) -> Result<Tensor> {
		let out = self.norm.forward(inp)?.f_relu()?;
		let out = out.f_adaptive_avg_pool2d([1, 1])?;
		let out = self.flatten.forward(&out)?;
		self.linear.forward(&out)
	}
}

//--------------------------------------------------------------------------------------------------

/// Image classifier:
/// stem conv -> stage 1 -> downsample -> stage 2 -> downsample -> stage 3 -> head.
pub struct Model {
	config: ModelConfig,
	stem: Conv2d,
	features: [FeatureStage; FEATURE_STAGES],
	downsample: [Downsample; FEATURE_STAGES - 1],
	head: ClassifierHead,
}

impl Model {
	pub fn new(path: &Path, config: &ModelConfig) -> Result<Self> {
		let [c1, c2, c3] = STAGE_CHANNELS;
		let mut seq = SequentialIndex::new(path);

		let stem = Conv2d::new(&seq.module(), IN_CHANNELS, c1, 3, ConvConfig::default());
		let f1 = FeatureStage::new(&mut seq, c1, config)?;
		let d1 = Downsample::new(&mut seq, c1, c2, config.downsampling)?;
		let f2 = FeatureStage::new(&mut seq, c2, config)?;
		let d2 = Downsample::new(&mut seq, c2, c3, config.downsampling)?;
		let f3 = FeatureStage::new(&mut seq, c3, config)?;
		let head = ClassifierHead::new(&mut seq, c3, NUM_CLASSES)?;

		log::debug!(
			"Model: network={:?}, downsampling={:?}, {} sequential modules",
			config.network,
			config.downsampling,
			seq.next
		);
		Ok(Self {
			config: *config,
			stem,
			features: [f1, f2, f3],
			downsample: [d1, d2],
			head,
		})
	}

	pub fn is_odenet(&self) -> bool {
		self.config.network == NetworkKind::OdeNet
	}

	/// Runs the model. Each feature stage records its evaluations in the
	/// matching context of `ctx`.
	pub fn forward(&self, inp: &Tensor, ctx: &mut ModelContext) -> Result<Tensor> {
		let mut out = self.stem.forward(inp)?;
		for (i, (stage, stage_ctx)) in self.features.iter().zip(ctx.stages.iter_mut()).enumerate() {
			out = stage.forward(&out, stage_ctx)?;
			if let Some(downsample) = self.downsample.get(i) {
				out = downsample.forward(&out)?;
			}
		}
		self.head.forward(&out)
	}

	pub fn feature_stage(&self, index: usize) -> Option<&FeatureStage> {
		self.features.get(index)
	}

	/// The continuous-depth block of stage `index`, if the stage is integrated.
	pub fn ode_block_mut(&mut self, index: usize) -> Option<&mut OdeBlock> {
		self.features.get_mut(index).and_then(FeatureStage::ode_block_mut)
	}
}

//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
	use super::*;
	use tch::nn::VarStore;
	use tch::{Device, Kind};

	fn config(network: NetworkKind, downsampling: DownsamplingMethod) -> ModelConfig {
		ModelConfig { network, downsampling, solver: SolverOptions::adaptive(1e-3) }
	}

	fn images(n: i64) -> Tensor {
		tch::manual_seed(42);
		Tensor::rand([n, 3, 32, 32], (Kind::Float, Device::Cpu))
	}

	fn var_size(vs: &VarStore, name: &str) -> Option<Vec<i64>> {
		vs.variables().get(name).map(Tensor::size)
	}

	#[test]
	fn test_odenet_forward() {
		let vs = VarStore::new(Device::Cpu);
		let model = Model::new(&vs.root(), &config(NetworkKind::OdeNet, DownsamplingMethod::Conv)).unwrap();
		let mut ctx = ModelContext::new();

		let logits = tch::no_grad(|| model.forward(&images(4), &mut ctx)).unwrap();
		assert_eq!(logits.size(), vec![4, 10]);

		let predicted = logits.argmax(1, false);
		for j in 0..4 {
			let class = predicted.int64_value(&[j]);
			assert!((0..10).contains(&class));
		}
		for stage in &ctx.stages {
			assert!(stage.nfe() > 0);
			assert_eq!(stage.trajectory().len(), stage.nfe());
		}
	}

	#[test]
	fn test_resnet_forward() {
		let vs = VarStore::new(Device::Cpu);
		let model = Model::new(&vs.root(), &config(NetworkKind::ResNet, DownsamplingMethod::Res)).unwrap();
		let mut ctx = ModelContext::new();

		let logits = tch::no_grad(|| model.forward(&images(2), &mut ctx)).unwrap();
		assert_eq!(logits.size(), vec![2, 10]);
		assert!(ctx.stages.iter().all(|stage| stage.nfe() == 0));
		assert!(!model.is_odenet());
	}

	#[test]
	fn test_odenet_conv_variable_names() {
		let vs = VarStore::new(Device::Cpu);
		let _model = Model::new(&vs.root(), &config(NetworkKind::OdeNet, DownsamplingMethod::Conv)).unwrap();

		assert_eq!(var_size(&vs, "0.weight"), Some(vec![32, 3, 3, 3]));
		assert_eq!(var_size(&vs, "0.bias"), Some(vec![32]));
		assert_eq!(var_size(&vs, "1.odefunc.norm1.weight"), Some(vec![32]));
		assert_eq!(var_size(&vs, "1.odefunc.conv1._layer.weight"), Some(vec![32, 33, 3, 3]));
		assert_eq!(var_size(&vs, "1.odefunc.conv2._layer.bias"), Some(vec![32]));
		assert_eq!(var_size(&vs, "2.weight"), Some(vec![32]));
		assert_eq!(var_size(&vs, "4.weight"), Some(vec![64, 32, 4, 4]));
		assert_eq!(var_size(&vs, "5.odefunc.norm3.bias"), Some(vec![64]));
		assert_eq!(var_size(&vs, "8.weight"), Some(vec![128, 64, 4, 4]));
		assert_eq!(var_size(&vs, "9.odefunc.conv1._layer.weight"), Some(vec![128, 129, 3, 3]));
		assert_eq!(var_size(&vs, "10.weight"), Some(vec![128]));
		assert_eq!(var_size(&vs, "14.weight"), Some(vec![10, 128]));
		assert_eq!(vs.variables().len(), 2 + 3 * 10 + 2 * 4 + 2 + 2);
	}

	#[test]
	fn test_resnet_res_variable_names() {
		let vs = VarStore::new(Device::Cpu);
		let _model = Model::new(&vs.root(), &config(NetworkKind::ResNet, DownsamplingMethod::Res)).unwrap();

		assert_eq!(var_size(&vs, "1.conv1.weight"), Some(vec![32, 32, 3, 3]));
		assert_eq!(var_size(&vs, "6.norm2.bias"), Some(vec![32]));
		assert_eq!(var_size(&vs, "7.downsample.weight"), Some(vec![64, 32, 1, 1]));
		assert_eq!(var_size(&vs, "7.conv1.weight"), Some(vec![64, 32, 3, 3]));
		assert_eq!(var_size(&vs, "14.downsample.weight"), Some(vec![128, 64, 1, 1]));
		assert_eq!(var_size(&vs, "21.weight"), Some(vec![128]));
		assert_eq!(var_size(&vs, "25.weight"), Some(vec![10, 128]));
		assert_eq!(var_size(&vs, "1.conv1.bias"), None);
	}

	#[test]
	fn test_end_time_only_on_integrated_stages() {
		let vs = VarStore::new(Device::Cpu);
		let mut model = Model::new(&vs.root(), &config(NetworkKind::OdeNet, DownsamplingMethod::Conv)).unwrap();
		model.ode_block_mut(0).unwrap().set_end_time(0.5);
		assert_eq!(model.feature_stage(0).and_then(FeatureStage::ode_block).map(OdeBlock::end_time), Some(0.5));
		assert_eq!(model.feature_stage(1).and_then(FeatureStage::ode_block).map(OdeBlock::end_time), Some(1.0));
		assert!(model.ode_block_mut(3).is_none());

		let vs = VarStore::new(Device::Cpu);
		let mut model = Model::new(&vs.root(), &config(NetworkKind::ResNet, DownsamplingMethod::Conv)).unwrap();
		assert!(model.ode_block_mut(0).is_none());
	}

	#[test]
	fn test_parse_selectors() {
		assert_eq!("odenet".parse::<NetworkKind>().unwrap(), NetworkKind::OdeNet);
		assert_eq!("resnet".parse::<NetworkKind>().unwrap(), NetworkKind::ResNet);
		assert_eq!("res".parse::<DownsamplingMethod>().unwrap(), DownsamplingMethod::Res);
		assert_eq!("mlp".parse::<NetworkKind>().err().unwrap().code, ErrorCode::InvalidConfig);
		assert_eq!("pool".parse::<DownsamplingMethod>().err().unwrap().code, ErrorCode::InvalidConfig);
	}
}
