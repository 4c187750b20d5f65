//! # STRATA Core
//!
//! The change model shared by the log, the block queues and restoration.
//!
//! ## Design Principles
//!
//! 1. **Immutable values** - A [`Change`] never mutates after it is built
//! 2. **Fail closed** - Builders return a `Result` instead of panicking
//! 3. **Closed subjects** - [`ChangeSubject`] is a sum type, matched exhaustively
//! 4. **Lossless persistence** - Every subject flattens to columns and back
//!
//! ## Example
//!
//! ```rust,ignore
//! use strata_core::{Change, ChangeQuery, ChangeReason, ChangeSource, ChangeSubject};
//!
//! let change = Change::builder()
//!     .source(ChangeSource::new("alice"))
//!     .location(Location::new("world", 10, 64, -3))
//!     .subject(ChangeSubject::block(BlockData::new("minecraft:stone"), BlockData::air()))
//!     .reason(ChangeReason::BlockBreak)
//!     .build()?;
//!
//! let query = ChangeQuery::new()
//!     .at_location(change.location())
//!     .distinct_values()
//!     .build()?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod change;
pub mod changes;
pub mod codec;
pub mod error;
pub mod query;
pub mod region;
pub mod subject;

pub use change::{now_millis, Change, ChangeBuilder, ChangeReason, ChangeSource};
pub use changes::Changes;
pub use codec::{Lz4StateCodec, StateCodec};
pub use error::{CoreError, CoreResult};
pub use query::{ChangeQuery, ResolvedQuery, DEFAULT_LIMIT, NO_LIMIT};
pub use region::{BlockPos, CuboidRegion, Location};
pub use subject::{BlockData, BlockWrapper, ChangeSubject, ChangeType, StateBlob};
