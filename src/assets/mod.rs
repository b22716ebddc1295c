//! Asset folder handling: the `<name>_files` store, image reference
//! resolution, and the `filelist.xml` manifest.

pub mod manifest;
pub mod resolver;
pub mod store;
