//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

use safetensors::SafeTensorError;
use tch::TchError;

use crate::ErrPack;

//--------------------------------------------------------------------------------------------------

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorCode {
	/// A configuration value is out of range, or a block was built with
	/// channel counts that don't fit together.
	InvalidConfig,

	/// The checkpoint file is missing or cannot be parsed.
	CheckpointLoad,

	/// The checkpoint doesn't match the parameters of the assembled model.
	CheckpointMismatch,

	DatasetUnavailable,

	/// An error reported by libtorch.
	Torch,

	IO,

	InvalidTimeSpan,
	StepSizeUnderflow,
	TooManySteps,

	/// The batch iterator ended before the evaluator got the batches it needs.
	EmptyBatchStream,
}

//--------------------------------------------------------------------------------------------------

impl From<TchError> for ErrPack<ErrorCode> {
	#[cold]
	#[inline(never)]
	fn from(err: TchError) -> Self {
		Self::with_nested(ErrorCode::Torch, "", err)
	}
}

impl From<std::io::Error> for ErrPack<ErrorCode> {
	#[cold]
	#[inline(never)]
	fn from(err: std::io::Error) -> Self {
		Self::with_nested(ErrorCode::IO, "", err)
	}
}

impl From<SafeTensorError> for ErrPack<ErrorCode> {
	#[cold]
	#[inline(never)]
	fn from(err: SafeTensorError) -> Self {
		Self::with_nested(ErrorCode::CheckpointLoad, "", err)
	}
}

//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_display_includes_message() {
		let err = ErrPack::new(ErrorCode::InvalidConfig, "tol must be positive");
		assert_eq!(err.to_string(), "(ErrPack: code=InvalidConfig, message=tol must be positive)");
	}

	#[test]
	fn test_io_error_conversion() {
		let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
		let err: ErrPack<ErrorCode> = io.into();
		assert_eq!(err.code, ErrorCode::IO);
		assert!(err.extra.is_some_and(|extra| extra.nested.is_some()));
	}
}
