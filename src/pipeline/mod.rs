//! Pipeline stages for turning one OCR'd PDF into Markdown + archive.
//!
//! Each submodule implements exactly one step so each can be tested on its
//! own, with no HTTP server and no real OCR provider involved.
//!
//! ## Data Flow
//!
//! ```text
//! document ──▶ extract ──▶ archive
//! (gateway)    (images,    (zip)
//!              markdown)
//! ```
//!
//! 1. [`document`]: drive the OCR gateway for one PDF, snapshot the raw
//!    response, call the extractor, write `{base}_output.md`
//! 2. [`extract`]: decode and save embedded images, inline them into the
//!    page Markdown, join pages
//! 3. [`archive`]: zip the document directory; runs after `document`
//!    succeeded

pub mod archive;
pub mod document;
pub mod extract;
