//! # reshive
//!
//! Stable-address resource pools with intrusive reference counting, modeled
//! on the WebGPU texture/buffer lifecycle.
//!
//! A [`ResourceHub`] hands out handles to records stored in a [`Hive`]:
//! segmented storage whose live elements never move, so a handle resolves to
//! the same record from creation until the last reference is released.
//! Each record pairs an atomic strong count with a logical lifecycle state,
//! decoupling logical destruction ([`ResourceHub::destroy`], idempotent,
//! callable any number of times including zero) from physical reclamation,
//! which happens exactly once when the count reaches zero. An injected
//! [`Finalizer`] receives the backend payload at that point; [`RetireQueue`]
//! defers it to a host-chosen drain point instead.
//!
//! Owning [`Resource`] handles add and release references automatically;
//! the [`RawHandle`] facade matches a C-style API, where every handle that
//! crosses an API boundary carries an extra reference the caller balances.
//!
//! ## Quick start
//!
//! ```rust
//! use reshive::{HubConfig, ResourceHub};
//!
//! struct TextureState {
//!     bytes: usize,
//! }
//!
//! let hub = ResourceHub::with_finalizer(
//!     &HubConfig::default(),
//!     Box::new(|state: TextureState| {
//!         // schedule the backend free for `state` here
//!         let _ = state.bytes;
//!     }),
//! );
//!
//! let texture = hub.create(TextureState { bytes: 4096 });
//! texture.destroy(); // logical, idempotent
//! texture.destroy(); // still fine
//! drop(texture); // last reference: finalizer runs exactly once
//! ```

mod config;
mod error;
mod handle;
mod hive;
mod hub;
mod record;
mod retire;

pub use config::HubConfig;
pub use error::HubError;
pub use handle::{RawHandle, Resource};
pub use hive::{Hive, SlotId};
pub use hub::{HubStats, ResourceHub};
pub use record::LifecycleState;
pub use retire::{Finalizer, RetireQueue};
