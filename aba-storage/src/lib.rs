// SPDX-FileCopyrightText: 2025 Timothy Pogue
//
// SPDX-License-Identifier: ISC

#[allow(unused_extern_crates)]
extern crate self as aba_storage;

pub mod api;
pub mod backend;
pub mod codec;
pub mod error;
pub mod key;
pub mod predicate;
pub mod store;
pub mod versioner;

pub use error::{Result, StorageError};
pub use store::watch::{Event, WatchStream};
pub use store::EntryStore;
