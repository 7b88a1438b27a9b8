//! In-memory chunk sorting algorithms.

use std::cmp::Ordering;
use std::convert::Infallible;

use rayon::prelude::*;

use crate::merger::TwoWayMerger;

/// Chunk sorter interface. Reorders a buffer in ascending order according to the compare function.
///
/// Implementations must neither add nor remove elements. Stability is not required.
pub trait ChunkSorter<T> {
    fn sort_by<F>(&self, buffer: &mut Vec<T>, compare: F)
    where
        F: Fn(&T, &T) -> Ordering + Sync;
}

/// Bottom-up merge sort. Runs of doubling width are merged pairwise, pass by pass, until one run is left.
/// Every pass moves the items between two alternating buffers, no per-item allocation is made.
/// The merge is left-biased so the sort is stable.
#[derive(Debug, Clone, Copy, Default)]
pub struct MergeSorter;

impl<T> ChunkSorter<T> for MergeSorter {
    fn sort_by<F>(&self, buffer: &mut Vec<T>, compare: F)
    where
        F: Fn(&T, &T) -> Ordering + Sync,
    {
        let mut source: Vec<Option<T>> = buffer.drain(..).map(Some).collect();
        let mut target: Vec<Option<T>> = Vec::with_capacity(source.len());

        let mut width = 1;
        while width < source.len() {
            for pair in source.chunks_mut(2 * width) {
                let (left, right) = pair.split_at_mut(width.min(pair.len()));
                merge_runs(left, right, &compare, &mut target);
            }
            std::mem::swap(&mut source, &mut target);
            target.clear();
            width *= 2;
        }

        buffer.extend(source.into_iter().flatten());
    }
}

/// Merges two adjacent sorted runs into `merged`, taking the items out of the runs.
fn merge_runs<T, F>(left: &mut [Option<T>], right: &mut [Option<T>], compare: &F, merged: &mut Vec<Option<T>>)
where
    F: Fn(&T, &T) -> Ordering,
{
    let merger = TwoWayMerger::new(take_run(left), take_run(right), compare);
    for item in merger {
        match item {
            Ok(item) => merged.push(Some(item)),
            Err(never) => match never {},
        }
    }
}

fn take_run<T>(run: &mut [Option<T>]) -> impl Iterator<Item = Result<T, Infallible>> + '_ {
    run.iter_mut().filter_map(Option::take).map(Ok)
}

/// In-place partition-exchange sort with a single pivot.
///
/// Worst case time is quadratic (for example when most keys are equal), prefer it for small chunks.
/// Recursion always descends into the smaller partition so the stack depth stays logarithmic.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuickSorter;

impl<T> ChunkSorter<T> for QuickSorter {
    fn sort_by<F>(&self, buffer: &mut Vec<T>, compare: F)
    where
        F: Fn(&T, &T) -> Ordering + Sync,
    {
        quicksort(buffer.as_mut_slice(), &compare);
    }
}

fn quicksort<T, F>(mut data: &mut [T], compare: &F)
where
    F: Fn(&T, &T) -> Ordering,
{
    while data.len() > 1 {
        let pivot = partition(data, compare);
        let (left, right) = std::mem::take(&mut data).split_at_mut(pivot);
        let right = &mut right[1..];

        if left.len() < right.len() {
            quicksort(left, compare);
            data = right;
        } else {
            quicksort(right, compare);
            data = left;
        }
    }
}

/// Partitions non-empty `data` around its middle element.
/// Elements not greater than the pivot are placed before it. Returns the pivot's final index.
fn partition<T, F>(data: &mut [T], compare: &F) -> usize
where
    F: Fn(&T, &T) -> Ordering,
{
    let end = data.len() - 1;
    data.swap(data.len() / 2, end);

    let mut boundary = 0;
    for idx in 0..end {
        if compare(&data[idx], &data[end]) != Ordering::Greater {
            data.swap(boundary, idx);
            boundary += 1;
        }
    }
    data.swap(boundary, end);

    return boundary;
}

/// Standard library stable sort.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdSorter;

impl<T> ChunkSorter<T> for StdSorter {
    fn sort_by<F>(&self, buffer: &mut Vec<T>, compare: F)
    where
        F: Fn(&T, &T) -> Ordering + Sync,
    {
        buffer.sort_by(compare);
    }
}

/// Multi-threaded sort running in a dedicated thread pool.
pub struct ParallelSorter {
    thread_pool: rayon::ThreadPool,
}

impl ParallelSorter {
    /// Creates a parallel sorter.
    ///
    /// # Arguments
    /// * `threads_number` - Number of threads to be used to sort data in parallel. If the parameter is [`None`]
    ///   threads number will be selected based on available CPU core number.
    pub fn new(threads_number: Option<usize>) -> Result<Self, rayon::ThreadPoolBuildError> {
        let mut thread_pool_builder = rayon::ThreadPoolBuilder::new();

        if let Some(threads_number) = threads_number {
            log::info!("initializing thread-pool (threads: {})", threads_number);
            thread_pool_builder = thread_pool_builder.num_threads(threads_number);
        } else {
            log::info!("initializing thread-pool (threads: default)");
        }

        return Ok(ParallelSorter {
            thread_pool: thread_pool_builder.build()?,
        });
    }
}

impl<T: Send> ChunkSorter<T> for ParallelSorter {
    fn sort_by<F>(&self, buffer: &mut Vec<T>, compare: F)
    where
        F: Fn(&T, &T) -> Ordering + Sync,
    {
        let compare = &compare;
        self.thread_pool.install(|| {
            buffer.par_sort_by(compare);
        });
    }
}

#[cfg(test)]
mod test {
    use std::cmp::Ordering;

    use rand::seq::SliceRandom;
    use rstest::*;

    use super::{partition, ChunkSorter, MergeSorter, ParallelSorter, QuickSorter, StdSorter};

    fn check_sorter(sorter: &impl ChunkSorter<i32>, input: &[i32]) {
        let mut expected = input.to_vec();
        expected.sort();

        let mut actual = input.to_vec();
        sorter.sort_by(&mut actual, i32::cmp);
        assert_eq!(actual, expected);

        let mut actual = input.to_vec();
        sorter.sort_by(&mut actual, |a, b| a.cmp(b).reverse());
        expected.reverse();
        assert_eq!(actual, expected);
    }

    fn shuffled(len: i32) -> Vec<i32> {
        let mut input = Vec::from_iter(0..len);
        input.shuffle(&mut rand::thread_rng());
        input
    }

    #[rstest]
    #[case(vec![])]
    #[case(vec![1])]
    #[case(vec![2, 1])]
    #[case(Vec::from_iter(0..100))]
    #[case(Vec::from_iter((0..100).rev()))]
    #[case(vec![3; 50])]
    #[case(vec![5, 1, 5, 2, 5, 1, 0, 5])]
    #[case(shuffled(13))]
    #[case(shuffled(1000))]
    fn test_sorters(#[case] input: Vec<i32>) {
        check_sorter(&MergeSorter, &input);
        check_sorter(&QuickSorter, &input);
        check_sorter(&StdSorter, &input);
        check_sorter(&ParallelSorter::new(Some(2)).unwrap(), &input);
    }

    #[test]
    fn test_merge_sorter_stability() {
        let mut input: Vec<(i32, i32)> = (0..10).flat_map(|x| (0..5).map(move |y| (x, y))).collect();
        input.shuffle(&mut rand::thread_rng());
        // sort input by the second field to check sorting stability
        input.sort_by_key(|item| item.1);

        MergeSorter.sort_by(&mut input, |a: &(i32, i32), b: &(i32, i32)| a.0.cmp(&b.0));

        let expected: Vec<(i32, i32)> = (0..10).flat_map(|x| (0..5).map(move |y| (x, y))).collect();
        assert_eq!(input, expected);
    }

    #[test]
    fn test_sorters_keep_strings() {
        let input: Vec<String> = ["d", "a", "c", "b", "e", "a"].iter().map(|s| s.to_string()).collect();
        let mut expected = input.clone();
        expected.sort();

        let mut actual = input.clone();
        QuickSorter.sort_by(&mut actual, String::cmp);
        assert_eq!(actual, expected);

        let mut actual = input.clone();
        MergeSorter.sort_by(&mut actual, String::cmp);
        assert_eq!(actual, expected);
    }

    #[rstest]
    #[case(vec![4], 0)]
    #[case(vec![1, 9, 2], 2)]
    #[case(vec![7, 3, 5, 1, 6], 2)]
    #[case(vec![2, 2, 2], 2)]
    fn test_partition(#[case] mut data: Vec<i32>, #[case] expected_pivot_idx: usize) {
        let pivot = data[data.len() / 2];
        let idx = partition(&mut data, &i32::cmp);

        assert_eq!(idx, expected_pivot_idx);
        assert_eq!(data[idx], pivot);
        assert!(data[..idx].iter().all(|item| item.cmp(&pivot) != Ordering::Greater));
        assert!(data[idx + 1..].iter().all(|item| item.cmp(&pivot) == Ordering::Greater));
    }
}
