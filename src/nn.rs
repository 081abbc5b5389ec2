// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.

pub mod checkpoint;
pub mod eval_context;
pub mod layers;
pub mod model;
pub mod model_context;
pub mod ode_block;
pub mod ode_func;

pub use eval_context::{EvalContext, TrajectoryPoint};
pub use model::{DownsamplingMethod, FeatureStage, Model, NetworkKind};
pub use model_context::ModelContext;
pub use ode_block::OdeBlock;
pub use ode_func::OdeFunc;
