//! JSON lines adapter.
//!
//! Tracks assets in an append-only file where every line is a JSON object
//! carrying an id and a state. Later lines for the same id supersede earlier
//! ones. The cursor is the number of lines already consumed.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use serde::Deserialize;
use serde_json::{json, Value};
use tracksync_types::{AdapterError, AssetId, AssetState, AssetToState, Assets, Cursor};

use crate::adapter::{Adapter, AssetPage, AssetPages};

pub const NAME: &str = "jsonl";

/// Where a syncer without a checkpoint starts reading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StartFrom {
    /// Skip everything already in the file.
    #[default]
    End,
    Beginning,
}

/// `adapter.config` for `use: jsonl`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JsonlConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub start_from: StartFrom,
    /// Record states that mark an asset as finished.
    #[serde(default = "default_terminal_states")]
    pub terminal_states: Vec<String>,
    #[serde(default = "default_id_field")]
    pub id_field: String,
    #[serde(default = "default_state_field")]
    pub state_field: String,
}

fn default_terminal_states() -> Vec<String> {
    vec!["success".into(), "failed".into(), "finished".into()]
}

fn default_id_field() -> String {
    "id".to_string()
}

fn default_state_field() -> String {
    "state".to_string()
}

impl JsonlConfig {
    /// # Errors
    ///
    /// Returns a config error for empty paths or field names.
    pub fn validate(&self) -> Result<(), AdapterError> {
        if self.path.as_os_str().is_empty() {
            return Err(AdapterError::config("INVALID_CONFIG", "path must not be empty"));
        }
        if self.id_field.is_empty() || self.state_field.is_empty() {
            return Err(AdapterError::config(
                "INVALID_CONFIG",
                "id_field and state_field must not be empty",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct JsonlAdapter {
    config: JsonlConfig,
}

impl JsonlAdapter {
    #[must_use]
    pub fn new(config: JsonlConfig) -> Self {
        Self { config }
    }

    /// Build from the raw `adapter.config` value.
    ///
    /// # Errors
    ///
    /// Returns a config error if the value doesn't deserialize or validate.
    pub fn from_config(config: &Value) -> Result<Self, AdapterError> {
        let config: JsonlConfig = serde_json::from_value(config.clone()).map_err(|e| {
            AdapterError::config("INVALID_CONFIG", format!("jsonl adapter config: {e}"))
        })?;
        config.validate()?;
        Ok(Self::new(config))
    }

    #[must_use]
    pub fn config(&self) -> &JsonlConfig {
        &self.config
    }

    /// Newline-terminated lines only. A trailing line still being written
    /// is left for a later read so the cursor never moves past it.
    fn read_lines(&self) -> Result<Vec<String>, AdapterError> {
        let content = std::fs::read_to_string(&self.config.path).map_err(|e| {
            AdapterError::transient_network(
                "IO",
                format!("failed to read {}: {e}", self.config.path.display()),
            )
        })?;
        Ok(content
            .split_inclusive('\n')
            .filter_map(|line| line.strip_suffix('\n'))
            .map(|line| line.strip_suffix('\r').unwrap_or(line).to_owned())
            .collect())
    }

    /// Id and full record of one line, or `None` for blank or unusable lines.
    fn parse_line(&self, line_no: usize, line: &str) -> Option<(AssetId, Value)> {
        if line.trim().is_empty() {
            return None;
        }
        let record: Value = match serde_json::from_str(line) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(
                    path = %self.config.path.display(),
                    line = line_no + 1,
                    error = %e,
                    "Skipping line that is not valid JSON"
                );
                return None;
            }
        };
        match record.get(&self.config.id_field).and_then(AssetId::from_json) {
            Some(id) => Some((id, record)),
            None => {
                tracing::warn!(
                    path = %self.config.path.display(),
                    line = line_no + 1,
                    id_field = self.config.id_field.as_str(),
                    "Skipping line without a usable id"
                );
                None
            }
        }
    }

    fn is_terminal(&self, record: &Value) -> bool {
        record
            .get(&self.config.state_field)
            .and_then(Value::as_str)
            .is_some_and(|state| self.config.terminal_states.iter().any(|t| t == state))
    }

    fn pages_from(&self, lines: &[String], start: usize, batch_size: usize) -> Vec<AssetPage> {
        let batch_size = batch_size.max(1);
        let mut pages = Vec::new();
        let mut current: Vec<AssetToState> = Vec::new();
        let mut seen: HashSet<AssetId> = HashSet::new();
        let mut consumed_since_page = false;

        for (line_no, line) in lines.iter().enumerate().skip(start) {
            consumed_since_page = true;
            if let Some((id, _)) = self.parse_line(line_no, line) {
                if seen.insert(id.clone()) {
                    current.push(AssetToState::init(id));
                }
            }
            if current.len() == batch_size {
                pages.push(AssetPage::new(
                    Assets::pending(std::mem::take(&mut current)),
                    Cursor::new(line_no + 1),
                ));
                seen.clear();
                consumed_since_page = false;
            }
        }

        // Trailing lines still move the cursor, even if none carried an id.
        if consumed_since_page {
            pages.push(AssetPage::new(Assets::pending(current), Cursor::new(lines.len())));
        }
        pages
    }
}

impl Adapter for JsonlAdapter {
    fn name(&self) -> &str {
        NAME
    }

    fn init_cursor(&mut self) -> Result<Cursor, AdapterError> {
        match self.config.start_from {
            StartFrom::Beginning => Ok(Cursor::new(0)),
            StartFrom::End => Ok(Cursor::new(self.read_lines()?.len())),
        }
    }

    fn init_assets_for_cursor(&mut self, cursor: &Cursor, batch_size: usize) -> AssetPages<'_> {
        let Some(start) = cursor.as_u64().and_then(|c| usize::try_from(c).ok()) else {
            return Box::new(std::iter::once(Err(AdapterError::data(
                "INVALID_CURSOR",
                format!("jsonl cursor must be a line count, got {cursor}"),
            ))));
        };
        let lines = match self.read_lines() {
            Ok(lines) => lines,
            Err(e) => return Box::new(std::iter::once(Err(e))),
        };
        if start > lines.len() {
            tracing::warn!(
                path = %self.config.path.display(),
                cursor = start,
                lines = lines.len(),
                "Cursor is past the end of the file, was it truncated?"
            );
        }
        Box::new(self.pages_from(&lines, start, batch_size).into_iter().map(Ok))
    }

    fn get_assets_data(&mut self, assets: &Assets) -> Result<Assets, AdapterError> {
        if assets.is_empty() {
            return Ok(Assets::default());
        }
        let wanted: HashSet<&AssetId> = assets.ids().collect();
        let lines = self.read_lines()?;

        let mut latest: HashMap<AssetId, Value> = HashMap::with_capacity(wanted.len());
        for (line_no, line) in lines.iter().enumerate() {
            if let Some((id, record)) = self.parse_line(line_no, line) {
                if wanted.contains(&id) {
                    latest.insert(id, record);
                }
            }
        }

        let mut records = Vec::with_capacity(latest.len());
        let states = assets
            .assets_to_state
            .iter()
            .map(|asset| match latest.remove(asset.asset_id()) {
                Some(record) => {
                    let state = if self.is_terminal(&record) {
                        AssetState::Finished
                    } else {
                        AssetState::Active
                    };
                    records.push(record);
                    asset.with_state(state)
                }
                None => asset.with_state(AssetState::FailedRequest),
            })
            .collect();

        if records.is_empty() {
            return Ok(Assets::pending(states));
        }
        Ok(Assets::with_data(json!({ "assets": records }), states))
    }
}
