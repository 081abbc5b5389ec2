//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

use super::eval_context::EvalContext;

pub const FEATURE_STAGES: usize = 3;

/// One evaluation context per feature stage of the model.
#[derive(Default)]
pub struct ModelContext {
	pub stages: [EvalContext; FEATURE_STAGES],
}

impl ModelContext {
	pub fn new() -> Self {
		Self::default()
	}
}
