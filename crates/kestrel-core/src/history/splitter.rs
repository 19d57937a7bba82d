//! Text splitters: cut message text into chunks for the search index.

use crate::types::{tags, Tag};

/// Default characters per chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 300;

pub trait TextSplitter: Send + Sync {
    /// Split text into consecutive pieces that concatenate back to `text`.
    fn split_text(&self, text: &str) -> Vec<String>;

    /// Split a message's text and wrap each piece in a chunk tag.
    ///
    /// Spans are character offsets into `text`. Empty text yields no tags.
    fn chunk_tags(&self, block_id: &str, text: &str) -> Vec<Tag> {
        if text.is_empty() {
            return Vec::new();
        }
        let mut start = 0;
        self.split_text(text)
            .into_iter()
            .map(|piece| {
                let len = piece.chars().count();
                let tag = Tag {
                    start_idx: Some(start),
                    end_idx: Some(start + len),
                    text: Some(piece),
                    block_id: Some(block_id.to_string()),
                    ..Tag::new(tags::KIND_CHAT, tags::NAME_CHUNK)
                };
                start += len;
                tag
            })
            .collect()
    }
}

/// Every `chunk_size` characters.
#[derive(Clone, Debug)]
pub struct FixedSizeTextSplitter {
    chunk_size: usize,
}

impl FixedSizeTextSplitter {
    /// A `chunk_size` of zero is treated as one.
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

impl Default for FixedSizeTextSplitter {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl TextSplitter for FixedSizeTextSplitter {
    fn split_text(&self, text: &str) -> Vec<String> {
        if text.is_empty() {
            return vec![String::new()];
        }
        let chars: Vec<char> = text.chars().collect();
        chars
            .chunks(self.chunk_size)
            .map(|c| c.iter().collect())
            .collect()
    }
}
