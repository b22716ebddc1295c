//! Two-tier HTML handling.
//!
//! - [`raw`]: pattern and offset search over the untouched document text.
//!   Used for everything that must survive byte-for-byte (subject paragraph,
//!   body boundaries, charset declarations).
//! - [`dom`]: an `html5ever` tree, only ever built for the display copy of a
//!   document or for a body fragment that has already been cut out of it.

pub mod dom;
pub mod raw;
