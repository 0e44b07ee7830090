//! 多来源轮转队列：每轮从当前来源取一个，空来源跳过，全部取尽即结束。

use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct RoundRobin<K> {
    lanes: Vec<(K, VecDeque<String>)>,
    cursor: usize,
}

impl<K: Clone> RoundRobin<K> {
    /// 轮转顺序即传入顺序。
    pub fn new<I, L>(lanes: I) -> Self
    where
        I: IntoIterator<Item = (K, L)>,
        L: IntoIterator<Item = String>,
    {
        Self {
            lanes: lanes
                .into_iter()
                .map(|(key, urls)| (key, urls.into_iter().collect()))
                .collect(),
            cursor: 0,
        }
    }

    pub fn remaining(&self) -> usize {
        self.lanes.iter().map(|(_, q)| q.len()).sum()
    }
}

impl<K: Clone> Iterator for RoundRobin<K> {
    type Item = (K, String);

    fn next(&mut self) -> Option<Self::Item> {
        let n = self.lanes.len();
        for _ in 0..n {
            let i = self.cursor;
            self.cursor = (self.cursor + 1) % n;
            let (key, queue) = &mut self.lanes[i];
            if let Some(url) = queue.pop_front() {
                return Some((key.clone(), url));
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.remaining();
        (n, Some(n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urls(prefix: &str, n: usize) -> Vec<String> {
        (0..n).map(|i| format!("{prefix}{i}")).collect()
    }

    #[test]
    fn uneven_lanes_drain_in_rotation() {
        let rr = RoundRobin::new([("A", urls("a", 5)), ("B", urls("b", 1))]);
        let keys: Vec<_> = rr.map(|(k, _)| k).collect();
        assert_eq!(keys, ["A", "B", "A", "A", "A", "A"]);
    }

    #[test]
    fn each_lane_keeps_its_own_order() {
        let rr = RoundRobin::new([("A", urls("a", 3)), ("B", urls("b", 2)), ("C", urls("c", 1))]);
        let items: Vec<_> = rr.map(|(_, u)| u).collect();
        assert_eq!(items, ["a0", "b0", "c0", "a1", "b1", "a2"]);
    }

    #[test]
    fn empty_lanes_are_skipped() {
        let mut rr = RoundRobin::new([("A", vec![]), ("B", urls("b", 2)), ("C", vec![])]);
        assert_eq!(rr.remaining(), 2);
        assert_eq!(rr.next(), Some(("B", "b0".to_string())));
        assert_eq!(rr.next(), Some(("B", "b1".to_string())));
        assert_eq!(rr.next(), None);
        assert_eq!(rr.remaining(), 0);
    }

    #[test]
    fn no_lanes_yields_nothing() {
        let mut rr: RoundRobin<&str> = RoundRobin::new(Vec::<(&str, Vec<String>)>::new());
        assert_eq!(rr.next(), None);
    }
}
