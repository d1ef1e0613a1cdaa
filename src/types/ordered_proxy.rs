//! Ordering data by f64 values
use std::cmp::Ordering;

/// A max-heap key pairing an f64 priority with a tie-breaking body.
///
/// Equal priorities compare by the *reversed* body order, so that popping a
/// `BinaryHeap` of proxies yields the highest priority first and, among equal
/// priorities, the smallest body first. NaN sorts below everything.
#[derive(Clone, Debug)]
pub struct OrderedProxy<T: Clone + Ord> {
    pub index: f64,
    pub body: T,
}

impl<T: Clone + Ord> OrderedProxy<T> {
    pub fn new(body: T, index: f64) -> Self {
        OrderedProxy { index, body }
    }
    pub fn to(&self) -> T {
        self.body.clone()
    }
    pub fn value(&self) -> f64 {
        self.index
    }
}

impl<T: Clone + Ord> PartialEq for OrderedProxy<T> {
    fn eq(&self, other: &OrderedProxy<T>) -> bool {
        self.index == other.index && self.body == other.body
    }
}

impl<T: Clone + Ord> Eq for OrderedProxy<T> {}

impl<T: Clone + Ord> PartialOrd for OrderedProxy<T> {
    fn partial_cmp(&self, other: &OrderedProxy<T>) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: Clone + Ord> Ord for OrderedProxy<T> {
    fn cmp(&self, other: &OrderedProxy<T>) -> Ordering {
        if let Some(ord) = self.index.partial_cmp(&other.index) {
            ord.then_with(|| other.body.cmp(&self.body))
        } else {
            match (self.index.is_nan(), other.index.is_nan()) {
                (true, true) => other.body.cmp(&self.body),
                (true, false) => Ordering::Less,
                (false, true) => Ordering::Greater,
                (false, false) => unreachable!(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BinaryHeap;

    #[test]
    fn test_pop_order() {
        let mut heap = BinaryHeap::new();
        heap.push(OrderedProxy::new(2usize, 0.5));
        heap.push(OrderedProxy::new(1usize, 0.5));
        heap.push(OrderedProxy::new(0usize, 0.9));
        assert_eq!(heap.pop().unwrap().to(), 0);
        // equal priorities: smaller body first
        assert_eq!(heap.pop().unwrap().to(), 1);
        assert_eq!(heap.pop().unwrap().to(), 2);
    }
}
