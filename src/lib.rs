//! extree - page-oriented storage for hierarchical documents
//!
//! A document tree is cut into records that each fit one fixed-size page.
//! Records reference each other through proxies; the splitter decides where
//! to cut, the tree engine keeps the cut valid under insertion and removal.
//!
//! Layers, bottom-up:
//! - `node`: in-memory node model
//! - `codec`: record byte format and size arithmetic
//! - `container`: block stores and the record store above them
//! - `split`: page-fit splitter
//! - `tree`: the `EXTree` engine, location queries, export and checks
//! - `loader`: event-driven bulk loading

pub mod cli;
pub mod codec;
pub mod config;
pub mod container;
pub mod error;
pub mod loader;
pub mod node;
pub mod observability;
pub mod split;
pub mod tree;

pub use codec::{Record, RecordId};
pub use config::EngineConfig;
pub use container::{Container, ContainerError, FileContainer, MemoryContainer};
pub use error::{EngineError, EngineResult};
pub use loader::{BulkLoader, LoadEvent};
pub use node::{Literal, LiteralKind, LiteralValue, Markup, Node, Proxy, Scaffold};
pub use split::{SplitPolicy, Splitter};
pub use tree::{ConsistencyReport, EXTree, Location, QueryMatch, TreeQuality};
