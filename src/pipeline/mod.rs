//! Pipeline stages for URL-to-workbook conversion.
//!
//! Each submodule implements exactly one transformation step, plus the path
//! guard every stage that writes user-named files goes through.
//!
//! ## Data Flow
//!
//! ```text
//! fetch ──▶ extract ──▶ parse ──▶ write
//! (URL)     (gz/zip)    (csv/tsv)  (xlsx)
//! ```
//!
//! 1. [`fetch`]: stream the response body into the staging directory
//! 2. [`extract`]: gunzip (only when the magic bytes agree), unpack zip
//!    archives, or pass plain text through; runs in `spawn_blocking`
//! 3. [`parse`]: infer the delimiter and build a [`parse::RecordSet`]
//! 4. [`write`]: serialise the records into a one-sheet workbook; runs in
//!    `spawn_blocking`
//!
//! [`guard`] confines URL-derived file names and archive entry names to
//! their base directory.

pub mod extract;
pub mod fetch;
pub mod guard;
pub mod parse;
pub mod write;
