//! Generation prompts: the inputs they derive from, the per-song cache, and
//! truncation to the generator's length ceiling.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::order::{OrderForm, SongSpec};
use crate::types::SongIndex;

/// Longest prompt the generation service handles well.
pub const MAX_PROMPT_CHARS: usize = 280;

const ELLIPSIS: &str = "...";

/// The fields a prompt is derived from. Two equal values always produce
/// the same prompt, so the cache compares these structurally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptInputs {
    pub song: SongSpec,
    pub sender_name: Option<String>,
    pub sender_message: Option<String>,
}

impl PromptInputs {
    pub fn from_form(form: &OrderForm, index: SongIndex) -> Option<Self> {
        form.songs.get(usize::from(index)).map(|song| Self {
            song: song.clone(),
            sender_name: form.sender.name.clone(),
            sender_message: form.sender.message.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedPrompt {
    pub inputs: PromptInputs,
    pub prompt: String,
    pub music_style: Option<String>,
}

/// Prompts already generated for an order, keyed by song index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PromptCache(BTreeMap<SongIndex, CachedPrompt>);

impl PromptCache {
    /// Return the cached prompt only if it was built from identical inputs.
    pub fn lookup(&self, index: SongIndex, inputs: &PromptInputs) -> Option<&CachedPrompt> {
        self.0.get(&index).filter(|cached| &cached.inputs == inputs)
    }

    pub fn insert(&mut self, index: SongIndex, cached: CachedPrompt) {
        self.0.insert(index, cached);
    }

    pub fn get(&self, index: SongIndex) -> Option<&CachedPrompt> {
        self.0.get(&index)
    }

    /// Incoming entries win per song.
    pub fn merge_from(&mut self, other: &PromptCache) {
        for (index, cached) in &other.0 {
            self.0.insert(*index, cached.clone());
        }
    }
}

/// Truncate `text` to at most `max_chars` characters, ending in `...` when
/// anything was cut.
pub fn truncate_prompt(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    if max_chars < ELLIPSIS.len() {
        return text.chars().take(max_chars).collect();
    }
    let keep = max_chars - ELLIPSIS.len();
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(ELLIPSIS);
    out
}
