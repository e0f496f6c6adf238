//! Overlay stacking over archives.
//!
//! Real installs layer archives: a base distribution, expansions, seasonal
//! drops, user modifications. Each layer is an overlay with an id and a
//! priority; entries in a higher-priority overlay shadow entries with the
//! same content hash below. The mounted stack is an [`OverlaySet`], built
//! once and queried concurrently.
//!
//! | Module       | Responsibility                                  |
//! |--------------|-------------------------------------------------|
//! | `manifest`   | JSON stack declaration                          |
//! | `source`     | One mounted overlay, entry addressing           |
//! | `index`      | Per-overlay content hash index                  |
//! | `dictionary` | Dictionary payload parsing and parent links     |
//! | `set`        | Discovery, mounting, lookup and extraction      |

pub mod dictionary;
pub mod index;
pub mod manifest;
pub mod set;
pub mod source;

pub use dictionary::{DictionaryError, DictionaryTable};
pub use index::{OverlayIndex, DICTIONARY_EXTENSIONS, INDEXABLE_EXTENSIONS};
pub use manifest::{ManifestError, OverlayDecl, OverlayManifest};
pub use set::{BuildReport, OverlayError, OverlaySet, OverlaySetBuilder, SkippedArchive};
pub use source::{Overlay, PackLocation};
