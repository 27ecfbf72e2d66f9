//! # Relay Providers
//!
//! Vendor adapters for the LLM relay.
//!
//! This crate provides:
//! - Baidu Wenxin workshop (ERNIE) with OAuth client-credential tokens
//! - Zhipu open platform (ChatGLM) with self-signed tokens
//! - Google PaLM with emulated streaming
//!
//! Every adapter implements [`VendorAdapter`]; callers go through the
//! [`Provider`] facade, usually looked up in a [`ProviderRegistry`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod adapter;
pub mod baidu;
pub mod emulator;
pub mod palm;
pub mod provider;
pub mod registry;
pub mod stream;
pub mod zhipu;

// Re-export main types
pub use adapter::{CallContext, VendorAdapter};
pub use baidu::{BaiduConfig, BaiduProvider};
pub use emulator::EmulatedStream;
pub use palm::{PalmConfig, PalmProvider};
pub use provider::Provider;
pub use registry::{ProviderEntry, ProviderRegistry};
pub use stream::{SseTranslation, StreamEvent};
pub use zhipu::{ZhipuConfig, ZhipuProvider};
