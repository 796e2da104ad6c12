//! Staging Buffer - Parsed elements waiting to be committed
//!
//! One ordered list per category. An element id is held by at most one
//! category: staging it under another category moves it there. Repeats within
//! a category are kept and resolved by the accumulator at merge time.

use std::collections::BTreeMap;

use tracing::warn;

use crate::domain::entities::Element;
use crate::domain::value_objects::Category;

#[derive(Debug, Default)]
pub struct StagingBuffer {
    buffers: BTreeMap<Category, Vec<Element>>,
}

impl StagingBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage an element under `category`.
    ///
    /// An element lives in at most one buffer: staging an id already held by
    /// another category moves it here.
    pub fn add(&mut self, category: Category, mut element: Element) {
        for (other, staged) in self.buffers.iter_mut() {
            if *other == category {
                continue;
            }
            let before = staged.len();
            staged.retain(|e| e.id != element.id);
            if staged.len() != before {
                warn!(element_id = %element.id, from = %other, to = %category, "Moving staged element between categories");
            }
        }
        self.buffers.retain(|_, staged| !staged.is_empty());

        element.recategorize(category);
        self.buffers.entry(category).or_default().push(element);
    }

    /// Take every buffered element, leaving all buffers empty
    pub fn drain_all(&mut self) -> BTreeMap<Category, Vec<Element>> {
        std::mem::take(&mut self.buffers)
    }

    /// Take the buffered elements of one category
    pub fn drain(&mut self, category: Category) -> Vec<Element> {
        self.buffers.remove(&category).unwrap_or_default()
    }

    pub fn clear(&mut self) {
        self.buffers.clear();
    }

    pub fn staged(&self, category: Category) -> &[Element] {
        self.buffers
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Total number of staged elements
    pub fn len(&self) -> usize {
        self.buffers.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.values().all(Vec::is_empty)
    }
}
