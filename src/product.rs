//! Lazy Cartesian product over slots of alternatives.
//!
//! Tuples come out in odometer order: the last slot varies fastest. A
//! product over no slots, or over any empty slot, yields nothing.

/// Iterator over every tuple picking one element per slot.
pub struct Product<'a, T> {
    slots: &'a [Vec<T>],
    indices: Vec<usize>,
    done: bool,
}

pub fn product<T>(slots: &[Vec<T>]) -> Product<'_, T> {
    Product {
        slots,
        indices: vec![0; slots.len()],
        done: slots.is_empty() || slots.iter().any(Vec::is_empty),
    }
}

/// Number of tuples [`product`] would yield, saturating at `usize::MAX`.
pub fn count<T>(slots: &[Vec<T>]) -> usize {
    count_lengths(slots.iter().map(Vec::len))
}

/// [`count`] for slots known only by their lengths.
pub fn count_lengths(lengths: impl IntoIterator<Item = usize>) -> usize {
    let mut lengths = lengths.into_iter().peekable();
    if lengths.peek().is_none() {
        return 0;
    }
    lengths.fold(1usize, |acc, len| acc.saturating_mul(len))
}

impl<'a, T> Iterator for Product<'a, T> {
    type Item = Vec<&'a T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let tuple = self
            .indices
            .iter()
            .zip(self.slots)
            .map(|(&i, slot)| &slot[i])
            .collect();

        // Advance the odometer.
        let mut position = self.indices.len();
        loop {
            if position == 0 {
                self.done = true;
                break;
            }
            position -= 1;
            self.indices[position] += 1;
            if self.indices[position] < self.slots[position].len() {
                break;
            }
            self.indices[position] = 0;
        }
        Some(tuple)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_slot_varies_fastest() {
        let slots = vec![vec!['a', 'b'], vec!['x', 'y', 'z']];
        let tuples: Vec<String> = product(&slots)
            .map(|t| t.into_iter().collect())
            .collect();
        assert_eq!(tuples, vec!["ax", "ay", "az", "bx", "by", "bz"]);
    }

    #[test]
    fn count_matches_iteration() {
        let slots = vec![vec![1, 2], vec![3], vec![4, 5, 6]];
        assert_eq!(count(&slots), 6);
        assert_eq!(product(&slots).count(), 6);
    }

    #[test]
    fn single_slot_yields_singletons() {
        let slots = vec![vec![1, 2, 3]];
        let tuples: Vec<Vec<&i32>> = product(&slots).collect();
        assert_eq!(tuples, vec![vec![&1], vec![&2], vec![&3]]);
    }

    #[test]
    fn empty_inputs_yield_nothing() {
        let none: Vec<Vec<u8>> = Vec::new();
        assert_eq!(product(&none).count(), 0);
        assert_eq!(count(&none), 0);

        let hole = vec![vec![1], vec![]];
        assert_eq!(product(&hole).count(), 0);
        assert_eq!(count(&hole), 0);
    }

    #[test]
    fn count_lengths_without_slots_is_zero() {
        assert_eq!(count_lengths(Vec::<usize>::new()), 0);
        assert_eq!(count_lengths([2, 3]), 6);
    }

    #[test]
    fn count_saturates() {
        let slots = vec![vec![(); 1 << 20]; 4];
        assert_eq!(count(&slots), usize::MAX);
    }
}
