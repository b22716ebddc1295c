//! `htmedit`: round-trip editing of Outlook-exported HTML emails.
//!
//! This crate provides the core library for opening a `.htm` email and its
//! sibling `_files` folder, handing an editable rendition to a rich-text
//! host, and saving the edited body back without disturbing the Office
//! markup around it.

pub mod assets;
pub mod codec;
pub mod config;
pub mod error;
pub mod html;
pub mod model;
pub mod pipeline;
