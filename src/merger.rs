//! Pass-based pairwise merger.

use std::cmp::Ordering;
use std::io;

use crate::error::{IoFailure, Phase, PhaseContext};
use crate::format::RunFormat;
use crate::run::{RunHandle, RunStore};

/// Streaming two-way merger.
/// Merges two sorted inputs into a single sorted output keeping only one buffered item per input.
///
/// When the heads of both inputs compare equal the left one is returned first, so merging preserves
/// the relative order of equal items across inputs. The first input error is returned as is
/// after which the merger yields nothing.
pub struct TwoWayMerger<T, E, L, R, F> {
    left: L,
    right: R,
    compare: F,

    left_head: Option<T>,
    right_head: Option<T>,
    /// Error deferred until the item read before it is returned.
    error: Option<E>,
    initiated: bool,
    failed: bool,
}

impl<T, E, L, R, F> TwoWayMerger<T, E, L, R, F>
where
    L: Iterator<Item = Result<T, E>>,
    R: Iterator<Item = Result<T, E>>,
    F: Fn(&T, &T) -> Ordering,
{
    /// Creates an instance of a two-way merger.
    /// Input items should be sorted in ascending order according to `compare` otherwise the result is undefined.
    pub fn new(left: L, right: R, compare: F) -> Self {
        return TwoWayMerger {
            left,
            right,
            compare,
            left_head: None,
            right_head: None,
            error: None,
            initiated: false,
            failed: false,
        };
    }
}

fn pull<T, E>(input: &mut impl Iterator<Item = Result<T, E>>, head: &mut Option<T>) -> Result<(), E> {
    *head = input.next().transpose()?;

    return Ok(());
}

impl<T, E, L, R, F> Iterator for TwoWayMerger<T, E, L, R, F>
where
    L: Iterator<Item = Result<T, E>>,
    R: Iterator<Item = Result<T, E>>,
    F: Fn(&T, &T) -> Ordering,
{
    type Item = Result<T, E>;

    /// Returns the next item from the inputs in ascending order.
    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        if let Some(err) = self.error.take() {
            self.failed = true;
            return Some(Err(err));
        }

        if !self.initiated {
            self.initiated = true;
            let initiated = pull(&mut self.left, &mut self.left_head)
                .and_then(|_| pull(&mut self.right, &mut self.right_head));
            if let Err(err) = initiated {
                self.failed = true;
                return Some(Err(err));
            }
        }

        let take_left = match (&self.left_head, &self.right_head) {
            (Some(left), Some(right)) => (self.compare)(left, right) != Ordering::Greater,
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (None, None) => return None,
        };

        let (item, refilled) = if take_left {
            (self.left_head.take(), pull(&mut self.left, &mut self.left_head))
        } else {
            (self.right_head.take(), pull(&mut self.right, &mut self.right_head))
        };
        if let Err(err) = refilled {
            self.error = Some(err);
        }

        return item.map(Ok);
    }
}

/// Result of reducing runs to one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeOutcome {
    /// The single remaining run.
    pub run: RunHandle,
    /// Number of merge passes executed.
    pub passes: usize,
}

/// Merge engine. Reduces any number of sorted runs to one by repeated passes of pairwise
/// streaming merges.
///
/// Every pass merges adjacent runs in order and carries an unpaired trailing run forward, so `n`
/// runs are reduced to one in `ceil(log2(n))` passes. Consumed runs are deleted right after the
/// merge that consumed them is committed.
pub struct MergeEngine<'a, T, F> {
    store: &'a mut RunStore<T, F>,
}

impl<'a, T, F> MergeEngine<'a, T, F>
where
    F: RunFormat<T>,
{
    pub fn new(store: &'a mut RunStore<T, F>) -> Self {
        MergeEngine { store }
    }

    /// Reduces the runs to a single run.
    ///
    /// # Arguments
    /// * `runs` - Live sorted runs in input order
    /// * `compare` - Function the runs are sorted by
    pub fn reduce_to_one<C>(&mut self, runs: Vec<RunHandle>, compare: C) -> Result<MergeOutcome, IoFailure>
    where
        C: Fn(&T, &T) -> Ordering,
    {
        let mut pass = 0;
        let mut runs = runs;

        if runs.is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "no runs to merge"))
                .during(Phase::Merge { pass: 1 });
        }

        while runs.len() > 1 {
            pass += 1;
            runs = self.merge_pass(pass, runs, &compare)?;
        }

        return Ok(MergeOutcome {
            run: runs[0],
            passes: pass,
        });
    }

    fn merge_pass<C>(&mut self, pass: usize, runs: Vec<RunHandle>, compare: &C) -> Result<Vec<RunHandle>, IoFailure>
    where
        C: Fn(&T, &T) -> Ordering,
    {
        let phase = Phase::Merge { pass };
        log::debug!("merge pass {} started ({} runs)", pass, runs.len());

        let records_before = self.record_total(&runs).during(phase)?;

        let mut merged = Vec::with_capacity((runs.len() + 1) / 2);
        let mut pairs = runs.into_iter();
        let mut seq = 0;
        while let Some(left) = pairs.next() {
            match pairs.next() {
                Some(right) => {
                    let output = RunHandle::new(pass, seq);
                    merged.push(self.merge_pair(left, right, output, compare).during(phase)?);
                    seq += 1;
                }
                None => {
                    log::trace!("{} carried forward", left);
                    merged.push(left);
                }
            }
        }

        let records_after = self.record_total(&merged).during(phase)?;
        if records_before != records_after {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("records count changed from {} to {}", records_before, records_after),
            ))
            .during(phase);
        }

        log::debug!("merge pass {} done ({} runs, {} records)", pass, merged.len(), records_after);

        return Ok(merged);
    }

    fn merge_pair<C>(
        &mut self,
        left: RunHandle,
        right: RunHandle,
        output: RunHandle,
        compare: &C,
    ) -> io::Result<RunHandle>
    where
        C: Fn(&T, &T) -> Ordering,
    {
        log::trace!("merging {} and {} into {}", left, right, output);

        let merger = TwoWayMerger::new(self.store.open_run(left)?, self.store.open_run(right)?, compare);
        let mut writer = self.store.create_writer(output)?;
        for item in merger {
            writer.push(&item?)?;
        }
        let output = self.store.commit(writer)?;

        self.store.delete(left)?;
        self.store.delete(right)?;

        return Ok(output);
    }

    fn record_total(&self, runs: &[RunHandle]) -> io::Result<u64> {
        runs.iter().try_fold(0, |total, &run| match self.store.record_count(run) {
            Some(records) => Ok(total + records),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} is not a live run", run),
            )),
        })
    }
}

#[cfg(test)]
mod test {
    use std::error::Error;
    use std::fs;
    use std::io::{self, ErrorKind};

    use rstest::*;

    use super::{MergeEngine, TwoWayMerger};
    use crate::error::Phase;
    use crate::format::LineFormat;
    use crate::run::{RunHandle, RunStore};

    #[rstest]
    #[case(vec![], vec![], vec![])]
    #[case(vec![Ok(1), Ok(3)], vec![], vec![Ok(1), Ok(3)])]
    #[case(vec![], vec![Ok(2)], vec![Ok(2)])]
    #[case(
        vec![Ok(1), Ok(4), Ok(5), Ok(7)],
        vec![Ok(2), Ok(3), Ok(6)],
        vec![Ok(1), Ok(2), Ok(3), Ok(4), Ok(5), Ok(6), Ok(7)],
    )]
    #[case(
        vec![Result::Err(io::Error::new(ErrorKind::Other, "test error"))],
        vec![Ok(1)],
        vec![Result::Err(io::Error::new(ErrorKind::Other, "test error"))],
    )]
    #[case(
        vec![Ok(3), Result::Err(io::Error::new(ErrorKind::Other, "test error")), Ok(4)],
        vec![Ok(1), Ok(2)],
        vec![
            Ok(1),
            Ok(2),
            Ok(3),
            Result::Err(io::Error::new(ErrorKind::Other, "test error")),
        ],
    )]
    fn test_two_way_merger(
        #[case] left: Vec<Result<i32, io::Error>>,
        #[case] right: Vec<Result<i32, io::Error>>,
        #[case] expected_result: Vec<Result<i32, io::Error>>,
    ) {
        let merger = TwoWayMerger::new(left.into_iter(), right.into_iter(), i32::cmp);
        let actual_result: Vec<Result<i32, io::Error>> = merger.collect();
        assert!(
            compare_vectors_of_result::<_, io::Error>(&actual_result, &expected_result),
            "actual={:?}, expected={:?}",
            actual_result,
            expected_result
        );
    }

    #[test]
    fn test_two_way_merger_prefers_left_on_ties() {
        let left = vec![(1, 'l'), (2, 'l'), (2, 'l')].into_iter().map(Ok::<_, io::Error>);
        let right = vec![(1, 'r'), (2, 'r'), (3, 'r')].into_iter().map(Ok::<_, io::Error>);

        let merger = TwoWayMerger::new(left, right, |a: &(i32, char), b: &(i32, char)| a.0.cmp(&b.0));
        let actual: Vec<(i32, char)> = merger.map(Result::unwrap).collect();

        assert_eq!(
            actual,
            vec![(1, 'l'), (1, 'r'), (2, 'l'), (2, 'l'), (2, 'r'), (3, 'r')]
        );
    }

    fn compare_vectors_of_result<T: PartialEq, E: Error + 'static>(
        actual: &Vec<Result<T, E>>,
        expected: &Vec<Result<T, E>>,
    ) -> bool {
        actual.len() == expected.len()
            && actual
                .into_iter()
                .zip(expected)
                .all(
                    |(actual_result, expected_result)| match (actual_result, expected_result) {
                        (Ok(actual_result), Ok(expected_result)) if actual_result == expected_result => true,
                        (Err(actual_err), Err(expected_err)) => actual_err.to_string() == expected_err.to_string(),
                        _ => false,
                    },
                )
    }

    #[fixture]
    fn working_dir() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    fn create_runs(store: &mut RunStore<String, LineFormat>, runs: &[&[&str]]) -> Vec<RunHandle> {
        runs.iter()
            .enumerate()
            .map(|(seq, items)| {
                let items = items.iter().map(|item| item.to_string());
                store.create_run(RunHandle::new(0, seq), items).unwrap()
            })
            .collect()
    }

    fn read_run(store: &RunStore<String, LineFormat>, handle: RunHandle) -> Vec<String> {
        let items: io::Result<Vec<String>> = store.open_run(handle).unwrap().collect();
        items.unwrap()
    }

    #[rstest]
    #[case(1, 0)]
    #[case(2, 1)]
    #[case(3, 2)]
    #[case(4, 2)]
    #[case(5, 3)]
    #[case(8, 3)]
    #[case(9, 4)]
    fn test_reduce_to_one_passes(
        working_dir: tempfile::TempDir,
        #[case] runs_number: usize,
        #[case] expected_passes: usize,
    ) {
        let mut store: RunStore<String, LineFormat> = RunStore::open(working_dir.path(), None).unwrap();
        let runs: Vec<RunHandle> = (0..runs_number)
            .map(|seq| {
                let item = format!("{:03}", runs_number - seq);
                store.create_run(RunHandle::new(0, seq), vec![item]).unwrap()
            })
            .collect();

        let outcome = MergeEngine::new(&mut store).reduce_to_one(runs, String::cmp).unwrap();

        assert_eq!(outcome.passes, expected_passes);
        assert_eq!(store.live_runs(), vec![outcome.run]);
        let expected: Vec<String> = (1..=runs_number).map(|item| format!("{:03}", item)).collect();
        assert_eq!(read_run(&store, outcome.run), expected);
    }

    #[rstest]
    fn test_single_run_returned_unchanged(working_dir: tempfile::TempDir) {
        let mut store = RunStore::open(working_dir.path(), None).unwrap();
        let runs = create_runs(&mut store, &[&["a", "b"]]);

        let outcome = MergeEngine::new(&mut store).reduce_to_one(runs.clone(), String::cmp).unwrap();
        assert_eq!(outcome.run, runs[0]);
        assert_eq!(outcome.passes, 0);
    }

    #[rstest]
    fn test_pass_layout(working_dir: tempfile::TempDir) {
        let mut store = RunStore::open(working_dir.path(), None).unwrap();
        let runs = create_runs(&mut store, &[&["c", "d"], &["a"], &["b", "b"]]);

        let merged = MergeEngine::new(&mut store).merge_pass(1, runs, &String::cmp).unwrap();

        // adjacent pair merged, trailing run carried forward
        assert_eq!(merged, vec![RunHandle::new(1, 0), RunHandle::new(0, 2)]);
        assert_eq!(read_run(&store, merged[0]), vec!["a", "c", "d"]);
        assert_eq!(store.live_runs(), vec![RunHandle::new(0, 2), RunHandle::new(1, 0)]);
    }

    #[rstest]
    fn test_reduce_keeps_duplicates(working_dir: tempfile::TempDir) {
        let mut store = RunStore::open(working_dir.path(), None).unwrap();
        let runs = create_runs(&mut store, &[&["a", "b"], &["b"], &[], &["a", "c"]]);

        let outcome = MergeEngine::new(&mut store).reduce_to_one(runs, String::cmp).unwrap();
        assert_eq!(read_run(&store, outcome.run), vec!["a", "a", "b", "b", "c"]);
        assert_eq!(store.record_count(outcome.run), Some(5));
    }

    #[rstest]
    fn test_reduce_without_runs(working_dir: tempfile::TempDir) {
        let mut store: RunStore<String, LineFormat> = RunStore::open(working_dir.path(), None).unwrap();

        let err = MergeEngine::new(&mut store).reduce_to_one(vec![], String::cmp).unwrap_err();
        assert_eq!(err.source.kind(), ErrorKind::InvalidInput);
    }

    #[rstest]
    fn test_failed_merge_keeps_inputs(working_dir: tempfile::TempDir) {
        let mut store = RunStore::open(working_dir.path(), None).unwrap();
        let runs = create_runs(&mut store, &[&["a"], &["b"], &["c"], &["d"]]);

        // the second pair can't be read back
        fs::write(store.path().join("pass-0000-run-000003.run"), b"\xff\xfe\n").unwrap();

        let err = MergeEngine::new(&mut store).reduce_to_one(runs, String::cmp).unwrap_err();
        assert_eq!(err.phase, Phase::Merge { pass: 1 });
        assert_eq!(err.source.kind(), ErrorKind::InvalidData);

        assert_eq!(
            store.live_runs(),
            vec![RunHandle::new(0, 2), RunHandle::new(0, 3), RunHandle::new(1, 0)]
        );
    }
}
