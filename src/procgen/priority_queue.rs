//! Unsorted queue that scans for the minimum priority on every dequeue.
//!
//! Priorities are evaluated at dequeue time because a pending segment's `t`
//! can change after it was enqueued.

pub struct PriorityQueue<T, F>
where
    F: Fn(&T) -> f64,
{
    priority: F,
    elements: Vec<T>,
}

impl<T, F> PriorityQueue<T, F>
where
    F: Fn(&T) -> f64,
{
    pub fn new(priority: F) -> Self {
        Self {
            priority,
            elements: Vec::new(),
        }
    }

    pub fn enqueue(&mut self, item: T) {
        self.elements.push(item);
    }

    pub fn enqueue_all(&mut self, items: impl IntoIterator<Item = T>) {
        self.elements.extend(items);
    }

    /// Remove and return the element with the lowest priority. Ties go to
    /// the element enqueued first.
    pub fn dequeue(&mut self) -> Option<T> {
        let mut best: Option<(usize, f64)> = None;
        for (i, item) in self.elements.iter().enumerate() {
            let p = (self.priority)(item);
            match best {
                Some((_, min)) if p >= min => {}
                _ => best = Some((i, p)),
            }
        }
        best.map(|(i, _)| self.elements.remove(i))
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }
}
