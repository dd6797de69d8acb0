// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! strmsync-drivers: the Driver (C1), Writer (C2) and Content builder (C3)
//! abstractions — everything that touches a remote source or the output
//! filesystem tree.

pub mod content_builder;
pub mod driver;
pub mod local;
pub mod remote;
pub mod writer;

#[cfg(any(test, feature = "test-support"))]
pub mod fake;

pub use content_builder::{build as build_strm_content, clean_posix_path, ContentBuilderConfig};
pub use driver::{Driver, ListOptions, RemoteEntry};
pub use local::LocalDriver;
pub use remote::{CloudDrive2Driver, HttpRemoteClient, OpenListDriver, RemoteClient};
pub use writer::{StrmWriter, WriteOutcome};

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeDriver;
