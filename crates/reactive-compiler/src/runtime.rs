//! The client-side runtime every compiled page embeds. Kept as plain JS
//! so the emitted script stays readable.

pub const RUNTIME_JS: &str = include_str!("runtime.js");
