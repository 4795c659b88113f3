//! Traversal engine
//!
//! Algorithms over a [`GraphStore`](super::GraphStore):
//!
//! - [`completion`]: breadth-first inverse-relation repair
//! - [`path`]: directed depth-first path discovery
//! - [`matching`]: template-guided subgraph matching against a question graph
//!
//! Each search keeps its visited set and stack in local state owned by the
//! call; nothing is shared between calls.

mod completion;
mod matching;
mod path;

pub use completion::CompletionReport;
