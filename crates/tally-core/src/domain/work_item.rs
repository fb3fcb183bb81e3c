//! Work items: already-expanded units of text to synthesize.
//!
//! Expanding a declarative set description into items happens upstream; this
//! module only defines the shape the coordinator consumes.

use serde::{Deserialize, Serialize};

use super::ids::SetId;
use super::set::SetMetadata;

/// Number of message groups standard-engine items are spread over.
pub const STANDARD_GROUPS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    Standard,
    Neural,
}

/// Voice parameters passed through to the synthesis service untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SynthesisParams {
    pub engine: Engine,
    pub language_code: String,
    pub output_format: String,
    pub text_type: String,
    pub voice_id: String,
}

impl Default for SynthesisParams {
    fn default() -> Self {
        Self {
            engine: Engine::Standard,
            language_code: "en-US".to_string(),
            output_format: "mp3".to_string(),
            text_type: "text".to_string(),
            voice_id: "Matthew".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItem {
    pub text: String,
    #[serde(flatten)]
    pub params: SynthesisParams,
    /// Final key the artifact is renamed to once synthesized.
    pub output_key: String,
}

impl WorkItem {
    pub fn new(text: impl Into<String>, output_key: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            params: SynthesisParams::default(),
            output_key: output_key.into(),
        }
    }

    pub fn with_params(mut self, params: SynthesisParams) -> Self {
        self.params = params;
        self
    }

    /// Queue group for the item at `index` within its set.
    ///
    /// Neural voices have a much lower service quota, so they all share one
    /// group and are processed serially; standard voices fan out.
    pub fn message_group(&self, index: usize) -> String {
        match self.params.engine {
            Engine::Neural => "neural".to_string(),
            Engine::Standard => format!("standard-{}", index % STANDARD_GROUPS),
        }
    }
}

/// What travels on the work queue between submission and dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkMessage {
    pub set_id: SetId,
    pub group: String,
    /// Deduplication key; the output key is unique within a set.
    pub dedup_id: String,
    pub item: WorkItem,
}

/// A set ready for submission: metadata plus its expanded items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetSubmission {
    pub set_id: SetId,
    pub metadata: SetMetadata,
    pub items: Vec<WorkItem>,
}

impl SetSubmission {
    pub fn new(set_id: SetId, metadata: SetMetadata, items: Vec<WorkItem>) -> Self {
        Self {
            set_id,
            metadata,
            items,
        }
    }

    pub fn messages(&self) -> impl Iterator<Item = WorkMessage> + '_ {
        self.items.iter().enumerate().map(|(index, item)| WorkMessage {
            set_id: self.set_id.clone(),
            group: item.message_group(index),
            dedup_id: item.output_key.clone(),
            item: item.clone(),
        })
    }
}
