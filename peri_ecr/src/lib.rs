pub mod commands;
pub mod constants;
pub mod frame_io;
pub mod generic;
pub mod packets;
pub mod pax;
pub mod sequences;

// Reexport everything so we can just use this crate for importing the internals.
pub use peri_builder::*;
pub use peri_derive::*;
