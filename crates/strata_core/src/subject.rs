//! # Change Subjects
//!
//! What a change actually changed. Subjects are a closed sum type so every
//! serialization and reconstruction site matches exhaustively.
//!
//! ## Persisted Form
//!
//! Each subject flattens to four columns plus its type tag:
//!
//! ```text
//! ┌──────────────┬──────────────┬──────────────┬────────────┬────────────┐
//! │ type         │ from         │ to           │ old_state  │ new_state  │
//! ├──────────────┼──────────────┼──────────────┼────────────┼────────────┤
//! │ BLOCK        │ block data   │ block data   │ blob       │ blob       │
//! │ RESTORATION  │ kind name    │ id           │ (empty)    │ (empty)    │
//! └──────────────┴──────────────┴──────────────┴────────────┴────────────┘
//! ```
//!
//! [`ChangeSubject::reconstruct`] is the inverse of that flattening.

use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, CoreResult};

/// String form of a block value, e.g. `minecraft:oak_stairs[facing=east]`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BlockData(String);

impl BlockData {
    /// Block data of an empty cell.
    pub const AIR: &'static str = "minecraft:air";

    /// Wraps a serialized block value.
    #[must_use]
    pub fn new(data: impl Into<String>) -> Self {
        Self(data.into())
    }

    /// The empty cell.
    #[must_use]
    pub fn air() -> Self {
        Self(Self::AIR.to_owned())
    }

    /// Serialized form.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlockData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque out-of-band state (tile data and similar).
///
/// An empty blob means "no extra state".
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct StateBlob(Vec<u8>);

impl StateBlob {
    /// The "no extra state" sentinel.
    #[must_use]
    pub const fn empty() -> Self {
        Self(Vec::new())
    }

    /// Wraps already-encoded bytes.
    #[must_use]
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Returns true for the "no extra state" sentinel.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Encoded bytes.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// A value written into a single cell: block data plus its extra state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockWrapper {
    /// Block value.
    pub data: BlockData,
    /// Extra state written together with the value.
    pub state: StateBlob,
}

impl BlockWrapper {
    /// Creates a wrapper.
    #[must_use]
    pub const fn new(data: BlockData, state: StateBlob) -> Self {
        Self { data, state }
    }

    /// Wraps block data without extra state.
    #[must_use]
    pub const fn plain(data: BlockData) -> Self {
        Self {
            data,
            state: StateBlob::empty(),
        }
    }
}

/// Persisted discriminant of a [`ChangeSubject`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChangeType {
    /// A block value changed.
    Block,
    /// A restoration marker.
    Restoration,
}

impl ChangeType {
    /// Name stored in the `type` column.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Block => "BLOCK",
            Self::Restoration => "RESTORATION",
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ChangeType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BLOCK" => Ok(Self::Block),
            "RESTORATION" => Ok(Self::Restoration),
            other => Err(CoreError::UnknownChangeType(other.to_owned())),
        }
    }
}

/// What a change changed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChangeSubject {
    /// A cell went from one block value to another.
    Block {
        /// Value before the change.
        from: BlockData,
        /// Value after the change.
        to: BlockData,
        /// Extra state before the change.
        old_state: StateBlob,
        /// Extra state after the change.
        new_state: StateBlob,
    },
    /// Marks that a change of `kind` identified by `id` was restored.
    Restoration {
        /// Type of the restored subject.
        kind: ChangeType,
        /// Identifier of the restored subject.
        id: i32,
    },
}

impl ChangeSubject {
    /// A block change without extra state.
    #[must_use]
    pub fn block(from: BlockData, to: BlockData) -> Self {
        Self::Block {
            from,
            to,
            old_state: StateBlob::empty(),
            new_state: StateBlob::empty(),
        }
    }

    /// A block change between two wrapped values.
    #[must_use]
    pub fn from_wrappers(from: BlockWrapper, to: BlockWrapper) -> Self {
        Self::Block {
            from: from.data,
            to: to.data,
            old_state: from.state,
            new_state: to.state,
        }
    }

    /// Persisted type tag.
    #[must_use]
    pub const fn change_type(&self) -> ChangeType {
        match self {
            Self::Block { .. } => ChangeType::Block,
            Self::Restoration { .. } => ChangeType::Restoration,
        }
    }

    /// Indexed string form of the "from" value.
    #[must_use]
    pub fn serialize_from(&self) -> String {
        match self {
            Self::Block { from, .. } => from.as_str().to_owned(),
            Self::Restoration { kind, .. } => kind.name().to_owned(),
        }
    }

    /// Indexed string form of the "to" value.
    #[must_use]
    pub fn serialize_to(&self) -> String {
        match self {
            Self::Block { to, .. } => to.as_str().to_owned(),
            Self::Restoration { id, .. } => id.to_string(),
        }
    }

    /// Blob form of the old state.
    #[must_use]
    pub fn serialize_old_state(&self) -> &[u8] {
        match self {
            Self::Block { old_state, .. } => old_state.as_bytes(),
            Self::Restoration { .. } => &[],
        }
    }

    /// Blob form of the new state.
    #[must_use]
    pub fn serialize_new_state(&self) -> &[u8] {
        match self {
            Self::Block { new_state, .. } => new_state.as_bytes(),
            Self::Restoration { .. } => &[],
        }
    }

    /// The "from" value together with its old state, for block subjects.
    #[must_use]
    pub fn from_wrapper(&self) -> Option<BlockWrapper> {
        match self {
            Self::Block {
                from, old_state, ..
            } => Some(BlockWrapper::new(from.clone(), old_state.clone())),
            Self::Restoration { .. } => None,
        }
    }

    /// The "to" value together with its new state, for block subjects.
    #[must_use]
    pub fn to_wrapper(&self) -> Option<BlockWrapper> {
        match self {
            Self::Block { to, new_state, .. } => {
                Some(BlockWrapper::new(to.clone(), new_state.clone()))
            }
            Self::Restoration { .. } => None,
        }
    }

    /// Rebuilds a subject from its persisted parts.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownChangeType`] for an unknown tag and
    /// [`CoreError::MalformedSubject`] if the parts do not fit the tag.
    pub fn reconstruct(
        kind: &str,
        from: &str,
        to: &str,
        old_state: &[u8],
        new_state: &[u8],
    ) -> CoreResult<Self> {
        match kind.parse::<ChangeType>()? {
            ChangeType::Block => {
                if from.is_empty() || to.is_empty() {
                    return Err(CoreError::MalformedSubject(format!(
                        "block subject with empty value ({from:?} -> {to:?})"
                    )));
                }
                Ok(Self::Block {
                    from: BlockData::new(from),
                    to: BlockData::new(to),
                    old_state: StateBlob::from_bytes(old_state),
                    new_state: StateBlob::from_bytes(new_state),
                })
            }
            ChangeType::Restoration => {
                let restored = from.parse::<ChangeType>()?;
                let id = to.parse::<i32>().map_err(|e| {
                    CoreError::MalformedSubject(format!("restoration id {to:?}: {e}"))
                })?;
                Ok(Self::Restoration { kind: restored, id })
            }
        }
    }
}
