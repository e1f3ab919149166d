use std::{collections::HashMap, ops::Range};

use indexmap::IndexSet;
use itertools::Itertools;

use crate::{
    config::BatchConfigError,
    helpers::block_count,
    types::{Criteria, Criterion, SqlValue, ValueMap},
};

/// Splits value maps and criteria lists into blocks bounded by the case and
/// in block sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    case_block_size: usize,
    in_block_size: usize,
}

impl Chunker {
    pub fn new(case_block_size: usize, in_block_size: usize) -> Result<Self, BatchConfigError> {
        if case_block_size == 0 {
            return Err(BatchConfigError::InvalidCaseBlockSize);
        }

        if in_block_size == 0 {
            return Err(BatchConfigError::InvalidInBlockSize);
        }

        Ok(Self { case_block_size, in_block_size })
    }

    pub fn case_block_size(&self) -> usize {
        self.case_block_size
    }

    pub fn in_block_size(&self) -> usize {
        self.in_block_size
    }

    /// Plans the value chunks of `values` against every criteria chunk
    /// combination. An empty map or an empty criteria list yields an empty plan.
    pub fn plan<'a>(&self, values: &'a ValueMap, criteria: Option<&'a Criteria>) -> ChunkPlan<'a> {
        let entries: Vec<(&SqlValue, &SqlValue)> = values.iter().collect();
        let value_blocks = (0..entries.len())
            .step_by(self.case_block_size)
            .map(|start| start..(start + self.case_block_size).min(entries.len()))
            .collect();

        self.build_plan(entries, value_blocks, criteria)
    }

    /// Plans criteria-only statements (deletes): one pseudo value chunk with
    /// no entries, combined with every criteria chunk combination.
    pub fn plan_criteria<'a>(&self, criteria: &'a Criteria) -> ChunkPlan<'a> {
        self.build_plan(Vec::new(), vec![0..0], Some(criteria))
    }

    fn build_plan<'a>(
        &self,
        entries: Vec<(&'a SqlValue, &'a SqlValue)>,
        mut value_blocks: Vec<Range<usize>>,
        criteria: Option<&'a Criteria>,
    ) -> ChunkPlan<'a> {
        let criteria: Vec<PlannedCriterion<'a>> = criteria
            .into_iter()
            .flatten()
            .map(|(column, criterion)| match criterion {
                Criterion::Single(value) => {
                    PlannedCriterion::Equals { column: column.as_str(), value }
                }
                Criterion::Multiple(values) => {
                    // Duplicates spread over two chunks would count the same row twice.
                    let values: IndexSet<&SqlValue> = values.iter().collect();
                    PlannedCriterion::In {
                        column: column.as_str(),
                        values: values.into_iter().collect(),
                    }
                }
            })
            .collect();

        let has_empty_list = criteria
            .iter()
            .any(|criterion| matches!(criterion, PlannedCriterion::In { values, .. } if values.is_empty()));

        if has_empty_list {
            value_blocks.clear();
        }

        ChunkPlan { entries, value_blocks, criteria, in_block_size: self.in_block_size }
    }
}

#[derive(Debug, Clone)]
enum PlannedCriterion<'a> {
    Equals { column: &'a str, value: &'a SqlValue },
    In { column: &'a str, values: Vec<&'a SqlValue> },
}

/// The restartable set of chunk combinations for one call.
#[derive(Debug, Clone)]
pub struct ChunkPlan<'a> {
    entries: Vec<(&'a SqlValue, &'a SqlValue)>,
    value_blocks: Vec<Range<usize>>,
    criteria: Vec<PlannedCriterion<'a>>,
    in_block_size: usize,
}

/// One criterion as it appears in a single statement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CriterionChunk<'p> {
    Equals { column: &'p str, value: &'p SqlValue },
    In { column: &'p str, values: &'p [&'p SqlValue] },
}

/// One value chunk paired with one chunk of every list criterion.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkCombination<'p> {
    pub value_chunk: usize,
    pub values: &'p [(&'p SqlValue, &'p SqlValue)],
    pub criteria: Vec<CriterionChunk<'p>>,
}

impl<'a> ChunkPlan<'a> {
    pub fn is_empty(&self) -> bool {
        self.value_blocks.is_empty()
    }

    pub fn value_chunk_count(&self) -> usize {
        self.value_blocks.len()
    }

    /// Number of chunk combinations per value chunk: the product of every list
    /// criterion's chunk count.
    pub fn criteria_combination_count(&self) -> usize {
        self.list_chunk_counts().iter().product()
    }

    pub fn statement_count(&self) -> usize {
        self.value_chunk_count() * self.criteria_combination_count()
    }

    /// Upper bound of parameters bound by any one statement of the plan.
    pub fn max_parameter_count(&self) -> usize {
        if self.is_empty() {
            return 0;
        }

        let values = self.value_blocks.iter().map(|block| block.len() * 2).max().unwrap_or(0);

        let criteria: usize = self
            .criteria
            .iter()
            .map(|criterion| match criterion {
                PlannedCriterion::Equals { value, .. } => usize::from(!value.is_null()),
                PlannedCriterion::In { values, .. } => values.len().min(self.in_block_size),
            })
            .sum();

        values + criteria
    }

    /// First new value that is also a key of a later value chunk, with the
    /// two chunk indexes. Rows rewritten to that value would be matched and
    /// rewritten again by the later chunk when the target column is the
    /// match column. Null never matches a key, so it is skipped.
    pub fn chained_value(&self) -> Option<(&'a SqlValue, usize, usize)> {
        if self.value_blocks.len() < 2 {
            return None;
        }

        let key_chunks: HashMap<&SqlValue, usize> = self
            .value_blocks
            .iter()
            .enumerate()
            .flat_map(move |(chunk, block)| {
                self.entries[block.clone()].iter().map(move |(key, _)| (*key, chunk))
            })
            .collect();

        self.value_blocks.iter().enumerate().find_map(|(chunk, block)| {
            self.entries[block.clone()].iter().find_map(|(_, new)| match key_chunks.get(*new) {
                Some(&later) if later > chunk && !new.is_null() => Some((*new, chunk, later)),
                _ => None,
            })
        })
    }

    /// Walks every combination, value chunk by value chunk. Can be called
    /// again to restart.
    pub fn iter(&self) -> impl Iterator<Item = ChunkCombination<'_>> + Send + '_ {
        self.value_blocks.iter().enumerate().flat_map(move |(value_chunk, block)| {
            let values = &self.entries[block.clone()];
            self.criteria_combinations()
                .map(move |chunk_indexes| self.combination(value_chunk, values, &chunk_indexes))
        })
    }

    fn list_chunk_counts(&self) -> Vec<usize> {
        self.criteria
            .iter()
            .filter_map(|criterion| match criterion {
                PlannedCriterion::In { values, .. } => {
                    Some(block_count(values.len(), self.in_block_size))
                }
                PlannedCriterion::Equals { .. } => None,
            })
            .collect()
    }

    fn criteria_combinations(&self) -> Box<dyn Iterator<Item = Vec<usize>> + Send> {
        let ranges: Vec<Range<usize>> =
            self.list_chunk_counts().into_iter().map(|count| 0..count).collect();

        if ranges.is_empty() {
            Box::new(std::iter::once(Vec::new()))
        } else {
            Box::new(ranges.into_iter().multi_cartesian_product())
        }
    }

    fn combination<'p>(
        &'p self,
        value_chunk: usize,
        values: &'p [(&'p SqlValue, &'p SqlValue)],
        chunk_indexes: &[usize],
    ) -> ChunkCombination<'p> {
        let mut chunk_indexes = chunk_indexes.iter().copied();

        let criteria = self
            .criteria
            .iter()
            .map(|criterion| match criterion {
                PlannedCriterion::Equals { column, value } => {
                    CriterionChunk::Equals { column: *column, value: *value }
                }
                PlannedCriterion::In { column, values } => {
                    let start = chunk_indexes.next().unwrap_or(0) * self.in_block_size;
                    let end = (start + self.in_block_size).min(values.len());
                    CriterionChunk::In { column: *column, values: &values[start..end] }
                }
            })
            .collect();

        ChunkCombination { value_chunk, values, criteria }
    }
}
