//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

pub mod cifar;
pub mod cycle;
pub mod loader;

pub use cifar::{Cifar10, Loaders};
pub use cycle::CyclingBatches;
pub use loader::{Batch, Loader};
