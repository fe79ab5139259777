use crate::criteria::Criterion;

/// One unit of inference work: a small, fixed group of criteria. The
/// `index` is global across the scan and is the value recorded in
/// checkpoints and cache keys.
#[derive(Debug, Clone, PartialEq)]
pub struct MiniBatch {
    pub index: usize,
    /// Which scheduling batch this mini-batch belongs to.
    pub batch: usize,
    pub criteria: Vec<&'static Criterion>,
}

/// Deterministically partition criteria into mini-batches of
/// `mini_batch_size` (clamped to 1..=10), grouped into scheduling batches
/// of `batch_size` mini-batches. Same inputs, same partition — resume and
/// cache correctness depend on it.
pub fn partition(
    criteria: &[&'static Criterion],
    mini_batch_size: usize,
    batch_size: usize,
) -> Vec<MiniBatch> {
    let mini_batch_size = mini_batch_size.clamp(1, 10);
    let batch_size = batch_size.max(1);

    criteria
        .chunks(mini_batch_size)
        .enumerate()
        .map(|(index, chunk)| MiniBatch {
            index,
            batch: index / batch_size,
            criteria: chunk.to_vec(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::criteria_for_level;
    use a11yscan_core::WcagLevel;

    #[test]
    fn partition_is_deterministic() {
        let criteria = criteria_for_level(WcagLevel::Aaa);
        let first = partition(&criteria, 5, 100);
        let second = partition(&criteria, 5, 100);
        assert_eq!(first, second);
    }

    #[test]
    fn mini_batches_cover_all_criteria_in_order() {
        let criteria = criteria_for_level(WcagLevel::Aa);
        let mini_batches = partition(&criteria, 5, 100);

        assert_eq!(mini_batches.len(), 10); // 50 criteria / 5
        let flattened: Vec<&str> = mini_batches
            .iter()
            .flat_map(|mb| mb.criteria.iter().map(|c| c.id))
            .collect();
        let expected: Vec<&str> = criteria.iter().map(|c| c.id).collect();
        assert_eq!(flattened, expected);

        for (position, mini_batch) in mini_batches.iter().enumerate() {
            assert_eq!(mini_batch.index, position);
        }
    }

    #[test]
    fn trailing_partial_mini_batch_is_kept() {
        let criteria = criteria_for_level(WcagLevel::Aaa); // 78
        let mini_batches = partition(&criteria, 5, 100);
        assert_eq!(mini_batches.len(), 16);
        assert_eq!(mini_batches.last().unwrap().criteria.len(), 3);
    }

    #[test]
    fn mini_batch_size_is_clamped() {
        let criteria = criteria_for_level(WcagLevel::A);
        assert_eq!(partition(&criteria, 0, 100).len(), 30); // clamped to 1
        assert_eq!(partition(&criteria, 99, 100).len(), 3); // clamped to 10
    }

    #[test]
    fn scheduling_batches_group_mini_batches() {
        let criteria = criteria_for_level(WcagLevel::Aaa);
        let mini_batches = partition(&criteria, 5, 4);
        assert_eq!(mini_batches[0].batch, 0);
        assert_eq!(mini_batches[3].batch, 0);
        assert_eq!(mini_batches[4].batch, 1);
    }
}
