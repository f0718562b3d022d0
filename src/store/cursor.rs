use bson::Document;

/// Result set of an executed [`MemoryQuery`](super::MemoryQuery).
#[derive(Debug, Clone, Default)]
pub struct Cursor {
    pub docs: Vec<Document>,
    pub pos: usize,
}

impl Cursor {
    pub fn new(docs: Vec<Document>) -> Self {
        Self { docs, pos: 0 }
    }

    pub fn advance(&mut self) -> Option<Document> {
        if self.pos >= self.docs.len() {
            return None;
        }
        let d = self.docs[self.pos].clone();
        self.pos += 1;
        Some(d)
    }

    pub fn remaining(&self) -> usize {
        self.docs.len().saturating_sub(self.pos)
    }

    #[must_use]
    pub fn to_vec(mut self) -> Vec<Document> {
        if self.pos == 0 {
            return self.docs;
        }
        self.docs.split_off(self.pos.min(self.docs.len()))
    }
}

impl Iterator for Cursor {
    type Item = Document;
    fn next(&mut self) -> Option<Self::Item> {
        self.advance()
    }
}
