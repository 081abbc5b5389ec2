//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

use std::collections::HashMap;
use std::path::Path;

use safetensors::SafeTensors;
use tch::nn::VarStore;

use crate::{ErrPack, ErrorCode, Result};

//--------------------------------------------------------------------------------------------------

fn is_safetensors(path: &Path) -> bool {
	path.extension().and_then(|ext| ext.to_str()) == Some("safetensors")
}

/// Compares the tensors stored in a safetensors file with the variables of `vs`.
///
/// Every variable must be present with the same shape, and the file must not
/// contain anything else.
pub fn validate_safetensors(vs: &VarStore, path: &Path) -> Result<()> {
	let bytes = std::fs::read(path)?;
	let file = SafeTensors::deserialize(&bytes)?;
	let stored: HashMap<String, Vec<i64>> = file
		.tensors()
		.into_iter()
		.map(|(name, view)| {
			#[allow(clippy::cast_possible_wrap)]
			let shape = view.shape().iter().map(|&d| d as i64).collect();
			(name, shape)
		})
		.collect();

	let variables = vs.variables();
	let mut names: Vec<&String> = variables.keys().collect();
	names.sort();

	let mut problems = Vec::new();
	for name in names {
		let expected = variables.get(name).map(tch::Tensor::size).unwrap_or_default();
		match stored.get(name) {
			None => problems.push(format!("missing `{name}`")),
			Some(shape) if *shape != expected => {
				problems.push(format!("`{name}`: expected shape {expected:?}, found {shape:?}"));
			},
			Some(_) => {},
		}
	}

	let mut unexpected: Vec<&String> = stored.keys().filter(|name| !variables.contains_key(*name)).collect();
	unexpected.sort();
	problems.extend(unexpected.into_iter().map(|name| format!("unexpected `{name}`")));

	if !problems.is_empty() {
		return Err(ErrPack::new(
			ErrorCode::CheckpointMismatch,
			format!("{}: {}", path.display(), problems.join("; ")),
		));
	}
	Ok(())
}

/// Loads a checkpoint into `vs`.
///
/// The format follows the file extension: `.safetensors`, `.pt`/`.bin` (torch
/// zip archive), anything else is read as a libtorch tensor archive.
/// Safetensors files are checked key by key before anything is copied.
pub fn load(vs: &mut VarStore, path: &Path) -> Result<()> {
	if !path.is_file() {
		return Err(ErrPack::new(
			ErrorCode::CheckpointLoad,
			format!("checkpoint `{}` not found", path.display()),
		));
	}
	if is_safetensors(path) {
		validate_safetensors(vs, path)?;
	}
	vs.load(path).map_err(|err| {
		ErrPack::with_nested(
			ErrorCode::CheckpointLoad,
			format!("cannot load checkpoint `{}`", path.display()),
			err,
		)
	})?;
	log::info!("Loaded {} tensors from {}", vs.len(), path.display());
	Ok(())
}

/// Writes all variables of `vs` to a safetensors file.
pub fn save(vs: &VarStore, path: &Path) -> Result<()> {
	if !is_safetensors(path) {
		return Err(ErrPack::new(
			ErrorCode::InvalidConfig,
			format!("checkpoint `{}` must have the .safetensors extension", path.display()),
		));
	}
	vs.save(path)?;
	Ok(())
}

//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
	use super::*;
	use crate::nn::model::{DownsamplingMethod, Model, ModelConfig, NetworkKind};
	use crate::odeint::SolverOptions;
	use std::path::PathBuf;
	use tch::{Device, Kind, Tensor};

	fn temp_path(name: &str) -> PathBuf {
		std::env::temp_dir().join(format!("contrast_ode_{}_{name}", std::process::id()))
	}

	fn config(network: NetworkKind) -> ModelConfig {
		ModelConfig {
			network,
			downsampling: DownsamplingMethod::Conv,
			solver: SolverOptions::adaptive(1e-3),
		}
	}

	#[test]
	fn test_round_trip_into_fresh_model() {
		let path = temp_path("round_trip.safetensors");

		let vs = VarStore::new(Device::Cpu);
		let _model = Model::new(&vs.root(), &config(NetworkKind::OdeNet)).unwrap();
		save(&vs, &path).unwrap();

		let mut vs2 = VarStore::new(Device::Cpu);
		let _model2 = Model::new(&vs2.root(), &config(NetworkKind::OdeNet)).unwrap();
		load(&mut vs2, &path).unwrap();

		let a = vs.variables();
		let b = vs2.variables();
		assert!(a["1.odefunc.conv1._layer.weight"].equal(&b["1.odefunc.conv1._layer.weight"]));
		assert!(a["14.weight"].equal(&b["14.weight"]));

		std::fs::remove_file(&path).unwrap();
	}

	#[test]
	fn test_wrong_architecture() {
		let path = temp_path("resnet.safetensors");

		let vs = VarStore::new(Device::Cpu);
		let _model = Model::new(&vs.root(), &config(NetworkKind::ResNet)).unwrap();
		save(&vs, &path).unwrap();

		let mut vs2 = VarStore::new(Device::Cpu);
		let _model2 = Model::new(&vs2.root(), &config(NetworkKind::OdeNet)).unwrap();
		let err = load(&mut vs2, &path).err().unwrap();
		assert_eq!(err.code, ErrorCode::CheckpointMismatch);
		assert!(err.message().contains("missing `1.odefunc.norm1.weight`"));
		assert!(err.message().contains("unexpected `1.conv1.weight`"));

		std::fs::remove_file(&path).unwrap();
	}

	#[test]
	fn test_shape_mismatch() {
		let path = temp_path("shape.safetensors");

		let vs = VarStore::new(Device::Cpu);
		let _w = vs.root().zeros("w", &[2, 3]);
		save(&vs, &path).unwrap();

		let vs2 = VarStore::new(Device::Cpu);
		let _w = vs2.root().zeros("w", &[3, 2]);
		let err = validate_safetensors(&vs2, &path).err().unwrap();
		assert_eq!(err.code, ErrorCode::CheckpointMismatch);
		assert!(err.message().contains("`w`: expected shape [3, 2], found [2, 3]"));

		std::fs::remove_file(&path).unwrap();
	}

	#[test]
	fn test_missing_file() {
		let mut vs = VarStore::new(Device::Cpu);
		let _w = vs.root().var("w", &[1], tch::nn::Init::Const(0.0));
		let err = load(&mut vs, &temp_path("does_not_exist.safetensors")).err().unwrap();
		assert_eq!(err.code, ErrorCode::CheckpointLoad);
	}

	#[test]
	fn test_loaded_values() {
		let path = temp_path("values.safetensors");

		let vs = VarStore::new(Device::Cpu);
		let mut w = vs.root().zeros("w", &[3]);
		tch::no_grad(|| w.copy_(&Tensor::from_slice(&[1.0_f32, 2.0, 3.0])));
		save(&vs, &path).unwrap();

		let mut vs2 = VarStore::new(Device::Cpu);
		let w2 = vs2.root().zeros("w", &[3]);
		load(&mut vs2, &path).unwrap();
		assert_eq!(w2.to_kind(Kind::Double).double_value(&[2]), 3.0);

		std::fs::remove_file(&path).unwrap();
	}
}
