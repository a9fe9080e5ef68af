//! The shuffled multiple-choice option set shown by the Solution phase.

use rand::seq::SliceRandom;
use rand::Rng;

/// The primary translation mixed with up to `max_distractors` distractors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChoiceSet {
    options: Vec<String>,
    correct: usize,
}

impl ChoiceSet {
    /// Builds the candidate set and applies a uniform random permutation.
    ///
    /// Only the first `max_distractors` distractors are used. With fewer
    /// available the set is simply smaller.
    pub fn shuffled<R: Rng + ?Sized>(
        primary: &str,
        distractors: &[String],
        max_distractors: usize,
        rng: &mut R,
    ) -> Self {
        let mut candidates: Vec<(bool, &str)> = std::iter::once((true, primary))
            .chain(
                distractors
                    .iter()
                    .take(max_distractors)
                    .map(|d| (false, d.as_str())),
            )
            .collect();
        candidates.shuffle(rng);

        let mut correct = 0;
        let mut options = Vec::with_capacity(candidates.len());
        for (index, (is_primary, text)) in candidates.into_iter().enumerate() {
            if is_primary {
                correct = index;
            }
            options.push(text.to_string());
        }
        Self { options, correct }
    }

    pub fn options(&self) -> &[String] {
        &self.options
    }

    pub fn len(&self) -> usize {
        self.options.len()
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    /// Post-shuffle index of the primary translation.
    pub fn correct_index(&self) -> usize {
        self.correct
    }

    pub fn is_correct(&self, index: usize) -> bool {
        index == self.correct
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn distractors(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("wrong {i}")).collect()
    }

    #[test]
    fn uses_at_most_three_distractors() {
        let mut rng = StdRng::seed_from_u64(7);
        let set = ChoiceSet::shuffled("right", &distractors(5), 3, &mut rng);
        assert_eq!(set.len(), 4);
        assert_eq!(set.options()[set.correct_index()], "right");
        assert!(!set.options().iter().any(|o| o == "wrong 4" || o == "wrong 5"));
    }

    #[test]
    fn fewer_distractors_give_a_smaller_set() {
        let mut rng = StdRng::seed_from_u64(7);
        let set = ChoiceSet::shuffled("right", &distractors(1), 3, &mut rng);
        assert_eq!(set.len(), 2);

        let alone = ChoiceSet::shuffled("right", &[], 3, &mut rng);
        assert_eq!(alone.options(), &["right".to_string()]);
        assert!(alone.is_correct(0));
    }

    #[test]
    fn primary_lands_on_every_index_about_equally() {
        let mut rng = StdRng::seed_from_u64(42);
        let pool = distractors(3);
        let mut hits = [0u32; 4];
        for _ in 0..4000 {
            let set = ChoiceSet::shuffled("right", &pool, 3, &mut rng);
            hits[set.correct_index()] += 1;
        }
        for count in hits {
            assert!((850..=1150).contains(&count), "skewed distribution: {hits:?}");
        }
    }
}
