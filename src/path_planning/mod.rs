// Path Planning algorithms module

pub mod smac;

pub use smac::*;
