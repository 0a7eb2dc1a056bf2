/* src/server/sourcemap/rust/src/lib.rs */

// Decode v3 source maps emitted by the bundler and translate V8 stack
// frames from the minified server bundle back to original source.

mod error;
mod frame;
mod map;
mod translate;
mod vlq;

pub use error::SourceMapError;
pub use frame::{OriginalLocation, StackFrame, TranslatedFrame};
pub use map::{Mapping, SourceMap, SourcePosition};
pub use translate::Translator;
