use crate::models::MatchCandidate;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

/// 预算远小于候选数时改用有界堆
const HEAP_SELECTION_FACTOR: usize = 4;

/// 排序键: 分数高者优先, 同分按原始位置 (越靠前越优先)
#[derive(Debug, Clone, Copy)]
struct RankKey {
    score: f64,
    index: usize,
}

impl PartialEq for RankKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for RankKey {}

impl PartialOrd for RankKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RankKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.index.cmp(&self.index))
    }
}

/// 按分数降序稳定排序并截断到 budget 条
pub fn rank(candidates: Vec<MatchCandidate>, budget: usize) -> Vec<MatchCandidate> {
    if budget == 0 || candidates.is_empty() {
        return Vec::new();
    }

    if budget.saturating_mul(HEAP_SELECTION_FACTOR) < candidates.len() {
        select_with_heap(candidates, budget)
    } else {
        select_with_sort(candidates, budget)
    }
}

fn select_with_sort(mut candidates: Vec<MatchCandidate>, budget: usize) -> Vec<MatchCandidate> {
    // sort_by 是稳定排序, 同分保持生成顺序
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
    candidates.truncate(budget);
    candidates
}

fn select_with_heap(candidates: Vec<MatchCandidate>, budget: usize) -> Vec<MatchCandidate> {
    // 小顶堆 (按优先级), 堆顶是当前入选者中最差的
    let mut heap: BinaryHeap<Reverse<RankKey>> = BinaryHeap::with_capacity(budget + 1);
    for (index, candidate) in candidates.iter().enumerate() {
        let key = RankKey {
            score: candidate.score,
            index,
        };
        if heap.len() < budget {
            heap.push(Reverse(key));
        } else if let Some(Reverse(worst)) = heap.peek() {
            if key > *worst {
                heap.pop();
                heap.push(Reverse(key));
            }
        }
    }

    // into_sorted_vec 升序 (对 Reverse 而言即优先级降序)
    let selected: Vec<RankKey> = heap.into_sorted_vec().into_iter().map(|Reverse(k)| k).collect();

    let mut slots: Vec<Option<MatchCandidate>> = candidates.into_iter().map(Some).collect();
    selected
        .into_iter()
        .filter_map(|key| slots[key.index].take())
        .collect()
}
