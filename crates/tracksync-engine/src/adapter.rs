//! Adapter capability contract.
//!
//! An adapter knows how to discover assets in one external system and how
//! to fetch their payloads. The engine holds it as `Box<dyn Adapter>` and
//! never inspects cursors or payloads itself.

use tracksync_types::{AdapterError, Assets, Cursor};

/// One page of newly discovered assets.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetPage {
    /// Identifiers in `Init` state with `data == None`.
    pub assets: Assets,
    /// Cursor to persist if this page is the last one consumed in a cycle.
    pub next_cursor: Cursor,
}

impl AssetPage {
    #[must_use]
    pub fn new(assets: Assets, next_cursor: Cursor) -> Self {
        Self {
            assets,
            next_cursor,
        }
    }
}

/// Lazy sequence of discovery pages.
pub type AssetPages<'a> = Box<dyn Iterator<Item = Result<AssetPage, AdapterError>> + 'a>;

/// Source of assets for a [`GenericSyncer`](crate::GenericSyncer).
pub trait Adapter: Send {
    /// Adapter name used in logs.
    fn name(&self) -> &str;

    /// Starting cursor, used when no checkpoint has been persisted yet.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError`] if the external system can't be queried.
    fn init_cursor(&mut self) -> Result<Cursor, AdapterError>;

    /// Pages of assets discovered after `cursor`, at most `batch_size` per
    /// page. A fresh iterator is requested every cycle; the engine consumes
    /// at most one page from it.
    fn init_assets_for_cursor(&mut self, cursor: &Cursor, batch_size: usize) -> AssetPages<'_>;

    /// Fetch payloads for `assets`.
    ///
    /// Items the adapter failed to fetch come back `FailedRequest`; items
    /// still running on the external system come back `Active`. An empty
    /// request yields an empty [`Assets`].
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError`] when the whole batch failed.
    fn get_assets_data(&mut self, assets: &Assets) -> Result<Assets, AdapterError>;
}
