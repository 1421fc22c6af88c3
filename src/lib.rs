pub mod config;
pub mod credentials;
pub mod daemon;
pub mod error;
pub mod reference;
pub mod registry;
pub mod resolver;
pub mod service;
pub mod util;

#[macro_use]
extern crate lazy_static;

pub use reference::ImageReference;
pub use resolver::{resolve, PinningDecision, Resolution};
