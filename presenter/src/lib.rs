#![doc = include_str!("../README.md")]
#![warn(
    anonymous_parameters,
    bare_trait_objects,
    clippy::branches_sharing_code,
    clippy::map_unwrap_or,
    clippy::match_wildcard_for_single_variants,
    // clippy::missing_errors_doc,
    clippy::must_use_candidate,
    clippy::needless_for_each,
    clippy::redundant_closure_for_method_calls,
    clippy::semicolon_if_nothing_returned,
    clippy::unreadable_literal,
    clippy::unwrap_used,
    clippy::expect_used,
    deprecated_in_future,
    ellipsis_inclusive_range_patterns,
    future_incompatible,
    missing_copy_implementations,
    missing_debug_implementations,
    // missing_docs,
    nonstandard_style,
    rust_2018_compatibility,
    rust_2018_idioms,
    rust_2021_compatibility,
    rustdoc::bare_urls,
    rustdoc::broken_intra_doc_links,
    rustdoc::invalid_html_tags,
    rustdoc::invalid_rust_codeblocks,
    rustdoc::private_intra_doc_links,
    single_use_lifetimes,
    trivial_casts,
    trivial_numeric_casts,
    unreachable_pub,
    unused,
    variant_size_differences
)]

use backend::DescriptorKind;

mod attachment;
pub mod backend;
pub mod config;
mod descriptor;
mod presenter;
mod registry;
mod submit;
mod surface;
pub mod trace;
pub mod window;

pub use self::{
    config::Config,
    descriptor::Slot,
    presenter::{ActiveTarget, Presenter},
    surface::{SurfaceId, SurfaceInfo},
    window::PhysicalSize,
};

/// Results that can be returned from this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can be returned from this crate.
#[allow(variant_size_differences)]
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("{context}, status: {status:#010x}")]
    Status { context: &'static str, status: u32 },
    #[error("{kind} descriptor slots exhausted, capacity: {capacity}")]
    SlotsExhausted {
        kind: DescriptorKind,
        capacity: u32,
    },
    #[error("presenter error: {0}")]
    Presenter(anyhow::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// The native status code carried by this error, if any.
    #[must_use]
    pub fn status(&self) -> Option<u32> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[macro_export]
macro_rules! presenter_bail {
    ($msg:literal $(,)?) => {
        return ::std::result::Result::Err(
            $crate::Error::Presenter(::anyhow::anyhow!($msg))
        )
    };
    ($err:expr $(,)?) => {
        return ::std::result::Result::Err(
            $crate::Error::Presenter(::anyhow::anyhow!($err))
        )
    };
    ($fmt:expr, $($arg:tt)*) => {
        return ::std::result::Result::Err(
            $crate::Error::Presenter(::anyhow::anyhow!($fmt, $($arg)*))
        )
    };
}

pub mod prelude {
    //! Most commonly used exports for driving presentation surfaces.

    pub use crate::{
        backend::{Backend, CommandList, CommandQueue, Device, SwapChain},
        config::Config,
        presenter::Presenter,
        surface::{SurfaceId, SurfaceInfo},
        window::{PhysicalSize, WindowSystem},
    };
}
