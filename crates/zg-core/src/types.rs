//! Transaction lifecycle notifications and chain events.
//!
//! Contains the status tags pushed by the node for a watched operation,
//! the events emitted in a block, and the raw index pair of a failed
//! dispatch.

use crate::error::{CoreError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle tag carried by a status update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusTag {
    /// Accepted into the node's pool, not yet in a block.
    Queued,
    /// Included in a (not yet final) block.
    InBlock,
    /// Included in a finalized block.
    Finalized,
    /// Removed from the pool without inclusion.
    Dropped,
    /// Rejected by the node as invalid.
    Invalid,
    /// The including block was retracted.
    Retracted,
}

impl StatusTag {
    /// Map a wire key to a tag.
    ///
    /// `future`, `ready` and `broadcast` are all pool states and collapse to
    /// `Queued`; `usurped` and `finalityTimeout` collapse to `Dropped`.
    pub fn from_wire(key: &str) -> Option<Self> {
        match key {
            "future" | "ready" | "broadcast" => Some(Self::Queued),
            "inBlock" => Some(Self::InBlock),
            "finalized" => Some(Self::Finalized),
            "dropped" | "usurped" | "finalityTimeout" => Some(Self::Dropped),
            "invalid" => Some(Self::Invalid),
            "retracted" => Some(Self::Retracted),
            _ => None,
        }
    }

    /// Whether no further updates are expected after this tag.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Finalized | Self::Dropped | Self::Invalid | Self::Retracted
        )
    }

    /// Whether this tag is a terminal failure.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Dropped | Self::Invalid | Self::Retracted)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::InBlock => "in_block",
            Self::Finalized => "finalized",
            Self::Dropped => "dropped",
            Self::Invalid => "invalid",
            Self::Retracted => "retracted",
        }
    }
}

impl std::fmt::Display for StatusTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque block reference (block hash as reported by the node).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockRef(pub String);

impl BlockRef {
    pub fn new(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BlockRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Raw `{subsystem, error}` index pair reported for a failed dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModuleError {
    /// Subsystem (pallet) index.
    pub pallet_index: u32,
    /// Zero-based error variant index within the subsystem's error set.
    pub error_index: u32,
}

impl ModuleError {
    pub fn new(pallet_index: u32, error_index: u32) -> Self {
        Self {
            pallet_index,
            error_index,
        }
    }
}

impl std::fmt::Display for ModuleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "subsystem={} error={}",
            self.pallet_index, self.error_index
        )
    }
}

/// Event emitted in a block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainEvent {
    /// Origin subsystem name (e.g., "Balances").
    pub pallet: String,
    /// Origin subsystem index.
    #[serde(default)]
    pub pallet_index: u32,
    /// Event name (e.g., "Transfer").
    pub name: String,
    /// Event payload, as decoded by the node.
    #[serde(default)]
    pub fields: Value,
    /// Position of the emitting extrinsic in the block. `None` for
    /// block-level events (initialization, finalization) or when the node
    /// does not report phases.
    #[serde(default, alias = "phase", skip_serializing_if = "Option::is_none")]
    pub extrinsic_index: Option<u32>,
}

impl ChainEvent {
    pub fn new(pallet: impl Into<String>, name: impl Into<String>, fields: Value) -> Self {
        Self {
            pallet: pallet.into(),
            pallet_index: 0,
            name: name.into(),
            fields,
            extrinsic_index: None,
        }
    }

    /// Attribute this event to the extrinsic at `index`.
    pub fn at_extrinsic(mut self, index: u32) -> Self {
        self.extrinsic_index = Some(index);
        self
    }

    /// Check whether this event has the given origin and name.
    pub fn is(&self, pallet: &str, name: &str) -> bool {
        self.pallet == pallet && self.name == name
    }

    /// Extract the module error carried by a `System.ExtrinsicFailed` event.
    ///
    /// Returns `None` for any other event, or when the failure is not a
    /// module error (e.g. a bad origin).
    pub fn module_error(&self) -> Option<ModuleError> {
        if !self.is("System", "ExtrinsicFailed") {
            return None;
        }

        let dispatch_error = self.fields.get("dispatch_error")?;
        let module = dispatch_error
            .get("module")
            .or_else(|| dispatch_error.get("Module"))?;

        let pallet_index = module.get("index")?.as_u64()?;
        let error_index = module.get("error")?.as_u64()?;

        Some(ModuleError::new(
            u32::try_from(pallet_index).ok()?,
            u32::try_from(error_index).ok()?,
        ))
    }
}

/// One node-pushed lifecycle notification for a watched operation.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub tag: StatusTag,
    /// Block reference, for in-block / finalized / retracted updates.
    pub block: Option<BlockRef>,
    /// Events emitted by the block, in arrival order.
    pub events: Vec<ChainEvent>,
    /// Position of the watched operation in the block, when reported.
    pub extrinsic_index: Option<u32>,
    /// Local receive timestamp.
    pub received_at: DateTime<Utc>,
}

impl StatusUpdate {
    /// Create an update with no block and no events.
    pub fn new(tag: StatusTag) -> Self {
        Self {
            tag,
            block: None,
            events: Vec::new(),
            extrinsic_index: None,
            received_at: Utc::now(),
        }
    }

    /// Attach a block reference.
    pub fn with_block(mut self, block: BlockRef) -> Self {
        self.block = Some(block);
        self
    }

    /// Attach the block's events.
    pub fn with_events(mut self, events: Vec<ChainEvent>) -> Self {
        self.events = events;
        self
    }

    /// Record the watched operation's position in the block.
    pub fn with_extrinsic_index(mut self, index: u32) -> Self {
        self.extrinsic_index = Some(index);
        self
    }

    /// Parse the `result` field of a status notification.
    ///
    /// Accepts either a bare tag string (`"ready"`) or a single-key object
    /// whose value is a block hash, a `{block, events}` body, or null.
    pub fn from_wire(value: &Value) -> Result<Self> {
        match value {
            Value::String(key) => {
                let tag = StatusTag::from_wire(key)
                    .ok_or_else(|| CoreError::InvalidStatus(format!("unknown tag: {key}")))?;
                Ok(Self::new(tag))
            }
            Value::Object(map) if map.len() == 1 => {
                let Some((key, body)) = map.iter().next() else {
                    return Err(CoreError::InvalidStatus("empty status object".to_string()));
                };
                let tag = StatusTag::from_wire(key)
                    .ok_or_else(|| CoreError::InvalidStatus(format!("unknown tag: {key}")))?;

                let mut update = Self::new(tag);
                match body {
                    Value::Null => {}
                    Value::String(hash) => update.block = Some(BlockRef::new(hash.clone())),
                    Value::Object(fields) => {
                        if let Some(hash) = fields.get("block").and_then(Value::as_str) {
                            update.block = Some(BlockRef::new(hash));
                        }
                        if let Some(index) = fields.get("extrinsic_index") {
                            let index = index
                                .as_u64()
                                .and_then(|i| u32::try_from(i).ok())
                                .ok_or_else(|| {
                                    CoreError::InvalidStatus(format!(
                                        "extrinsic_index must be a u32, got {index}"
                                    ))
                                })?;
                            update.extrinsic_index = Some(index);
                        }
                        if let Some(events) = fields.get("events") {
                            update.events = serde_json::from_value(events.clone())
                                .map_err(|e| CoreError::InvalidEvent(e.to_string()))?;
                        }
                    }
                    // Pool-level statuses such as `broadcast` carry peer lists.
                    Value::Array(_) if tag == StatusTag::Queued => {}
                    other => {
                        return Err(CoreError::InvalidStatus(format!(
                            "unexpected body for {key}: {other}"
                        )))
                    }
                }
                Ok(update)
            }
            other => Err(CoreError::InvalidStatus(format!(
                "expected string or single-key object, got {other}"
            ))),
        }
    }

    /// Events emitted by the watched operation.
    ///
    /// With a known position, only events carrying that position belong to
    /// the operation. Without one, events that carry a position belong to
    /// some other extrinsic and only unphased events are kept.
    pub fn own_events(&self) -> impl Iterator<Item = &ChainEvent> {
        let own = self.extrinsic_index;
        self.events.iter().filter(move |e| e.extrinsic_index == own)
    }

    /// Module error reported for the watched operation, if any.
    ///
    /// `ExtrinsicFailed` events from other extrinsics in the same block are
    /// not this operation's failure.
    pub fn dispatch_error(&self) -> Option<ModuleError> {
        self.own_events().find_map(ChainEvent::module_error)
    }
}
