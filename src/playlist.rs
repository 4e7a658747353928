use crate::extract::MediaRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

#[derive(Debug, Clone, Default)]
pub struct Playlist {
    items: Vec<MediaRef>,
    position: usize,
    paging_cursor: String,
}

impl Playlist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&MediaRef> {
        self.items.get(self.position)
    }

    pub fn advance(&mut self, direction: Direction) {
        match direction {
            Direction::Forward => self.position = self.position.saturating_add(1),
            Direction::Backward => self.position = self.position.saturating_sub(1),
        }
    }

    /// No lookahead left once the cursor sits on the last loaded item.
    pub fn needs_more(&self) -> bool {
        self.position + 1 >= self.items.len()
    }

    pub fn append(&mut self, items: Vec<MediaRef>, cursor: impl Into<String>) {
        self.items.extend(items);
        self.paging_cursor = cursor.into();
    }

    pub fn reset(&mut self) {
        self.items.clear();
        self.position = 0;
        self.paging_cursor.clear();
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn paging_cursor(&self) -> &str {
        &self.paging_cursor
    }

    pub fn items(&self) -> &[MediaRef] {
        &self.items
    }
}
