#![allow(clippy::new_without_default)]

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 50007;

pub mod logging;
pub mod session;
