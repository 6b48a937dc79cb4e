//! Module with pager internals shared by every flavour.
//!
//! The step function of the pager is put inside a macro_rules! because the crate provides
//! different flavours of `PageProvider` and all of them have slightly different bounds despite
//! the function body being the same for them.
//!
//! WARNING: `pager::request_next_result_decl` is magical! It implicitly expects the
//! `PageProvider` trait and the `PageOf`, `PageResultOf` type aliases to be in scope of the
//! calling context, so read its body before calling it in a new flavour module.

pub mod pager;
pub mod single_page;

pub use pager::PagerState;
pub use single_page::{SinglePage, SourceProvider, SourceTrigger};

pub(crate) use pager::request_next_result_decl;
