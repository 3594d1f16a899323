//! Frame catalogs
//!
//! A catalog pairs a file of concatenated coded frames with a
//! [`FrameIndex`] describing each of them: where its bytes are and which
//! decoder-state transition it performs. [`CatalogImporter`] builds both
//! from a coded stream; [`FrameIndex::find_decodable`] answers which frames
//! a decoder in a given state can switch to.

pub mod frame_db;
pub mod frame_info;
pub mod importer;

pub use frame_db::{FrameIndex, SharedFrameIndex};
pub use frame_info::FrameInfo;
pub use importer::CatalogImporter;
