//! Welds one or more Ogg logical streams into a single page bitstream,
//! exposed as a pull-based output. Page encoding itself is delegated to
//! a [`source::PageSource`] implementation.

pub mod mux;
pub mod packet;
pub mod page;
pub mod reader;
pub mod source;
pub mod stream;
