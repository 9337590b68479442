use std::sync::Arc;

/// Passages players race on. `START_TIMER` announces an index into this list.
const BUILTIN_TEXTS: [&str; 7] = [
    "Text for typing #1. The quick brown fox jumps over the lazy dog while the farmer watches from the porch.",
    "Text for typing #2. A journey of a thousand miles begins with a single step, and most of them are uphill.",
    "Text for typing #3. The river carved its way through the valley for ten thousand years before anyone named it.",
    "Text for typing #4. Good code is read far more often than it is written, so write it for the next person.",
    "Text for typing #5. She packed a lantern, two apples and a map that was already out of date.",
    "Text for typing #6. Every morning the baker rose before the sun and every evening the bread was gone.",
    "Text for typing #7. The orchestra tuned for a long minute, then the hall went quiet and the first note rang out.",
];

/// Read-only pool of race texts, cheap to clone into handlers.
#[derive(Debug, Clone)]
pub struct TextPool {
    texts: Arc<Vec<String>>,
}

impl Default for TextPool {
    fn default() -> Self {
        Self::new(BUILTIN_TEXTS.iter().map(ToString::to_string).collect())
    }
}

impl TextPool {
    #[must_use]
    pub fn new(texts: Vec<String>) -> Self {
        Self {
            texts: Arc::new(texts),
        }
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&str> {
        self.texts.get(index).map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.texts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }
}
