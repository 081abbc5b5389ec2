//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

use crate::{ErrPack, ErrorCode, Result};

/// `info` when no `-v` is given.
const BASE_VERBOSITY: usize = 2;

/// stderrlog verbosity: 0 is `error`, 4 and above is `trace`.
pub fn verbosity(verbose: u8, quiet: bool) -> usize {
	if quiet { 0 } else { BASE_VERBOSITY + usize::from(verbose) }
}

/// Sends log records of this crate to stderr.
pub fn init(verbose: u8, quiet: bool) -> Result<()> {
	stderrlog::new()
		.module("contrast_ode")
		.verbosity(verbosity(verbose, quiet))
		.timestamp(stderrlog::Timestamp::Millisecond)
		.init()
		.map_err(|err| ErrPack::with_nested(ErrorCode::InvalidConfig, "logger already initialized", err))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_verbosity() {
		assert_eq!(verbosity(0, false), 2);
		assert_eq!(verbosity(2, false), 4);
		assert_eq!(verbosity(3, true), 0);
	}
}
