//! Final split of a finished run into clean and abandoned records.

use crate::checkpoint::{write_table_atomic, CheckpointTable};
use crate::error::Result;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::info;

/// Country value meaning the address could not be resolved
pub const UNRESOLVED_COUNTRY: &str = "None";

/// Clean and abandoned views of one table snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    /// Matched rows with a known country, renumbered `1..=N`
    pub clean: CheckpointTable,
    /// Failed rows and rows with an unresolved country, original numbering
    pub abandon: CheckpointTable,
}

/// Split `table` by `failed` row indices and the unresolved-country sentinel.
///
/// Both halves come from the same borrowed snapshot, so every row lands in
/// exactly one of them.
pub fn partition(table: &CheckpointTable, failed: &BTreeSet<usize>) -> Partition {
    let abandoned = |i: usize, country: &str| failed.contains(&i) || country == UNRESOLVED_COUNTRY;

    let mut clean = table.select(|i, row| !abandoned(i, &row.fields.country));
    clean.renumber();
    let abandon = table.select(|i, row| abandoned(i, &row.fields.country));

    info!(
        total = table.len(),
        clean = clean.len(),
        abandon = abandon.len(),
        "Partitioned results"
    );
    Partition { clean, abandon }
}

/// Overwrite both output files, abandon first.
pub fn write_partition(partition: &Partition, clean_path: &Path, abandon_path: &Path) -> Result<()> {
    write_table_atomic(&partition.abandon, abandon_path)?;
    info!(path = %abandon_path.display(), rows = partition.abandon.len(), "Abandon file saved");
    write_table_atomic(&partition.clean, clean_path)?;
    info!(path = %clean_path.display(), rows = partition.clean.len(), "Clean file saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::{load_table, TargetFields};
    use tempfile::TempDir;

    fn fields(country: &str) -> TargetFields {
        TargetFields {
            impact_factor: Some(2.0),
            author_keywords: "k".to_string(),
            keywords_plus: "K".to_string(),
            institution: "Univ".to_string(),
            country: country.to_string(),
            doi: "10.1/x".to_string(),
            abstract_text: "abs".to_string(),
        }
    }

    fn sample() -> Result<CheckpointTable> {
        let mut table = CheckpointTable::from_titles(["t1", "t2", "t3", "t4", "t5"]);
        table.set_fields(0, fields("Japan"))?;
        // row 1 failed: cleared
        table.set_fields(2, fields("None"))?;
        table.set_fields(3, fields("USA"))?;
        table.set_fields(4, fields("China"))?;
        Ok(table)
    }

    #[test]
    fn test_clean_and_abandon_are_disjoint_and_cover() -> Result<()> {
        let table = sample()?;
        let failed = BTreeSet::from([1, 4]);
        let split = partition(&table, &failed);

        let clean: Vec<_> = split.clean.rows().iter().map(|r| r.title.as_str()).collect();
        let abandon: Vec<_> = split.abandon.rows().iter().map(|r| r.title.as_str()).collect();
        assert_eq!(clean, vec!["t1", "t4"]);
        assert_eq!(abandon, vec!["t2", "t3", "t5"]);
        assert_eq!(clean.len() + abandon.len(), table.len());
        assert!(clean.iter().all(|t| !abandon.contains(t)));
        Ok(())
    }

    #[test]
    fn test_clean_is_renumbered_abandon_is_not() -> Result<()> {
        let table = sample()?;
        let split = partition(&table, &BTreeSet::from([1]));

        let clean_seq: Vec<_> = split.clean.rows().iter().map(|r| r.sequence_number).collect();
        assert_eq!(clean_seq, vec![1, 2, 3]);
        let abandon_seq: Vec<_> = split.abandon.rows().iter().map(|r| r.sequence_number).collect();
        assert_eq!(abandon_seq, vec![2, 3]);
        Ok(())
    }

    #[test]
    fn test_write_partition() -> Result<()> {
        let dir = TempDir::new()?;
        let clean_path = dir.path().join("x_publications_clean.csv");
        let abandon_path = dir.path().join("x_publications_abandon.csv");
        let split = partition(&sample()?, &BTreeSet::from([1]));

        write_partition(&split, &clean_path, &abandon_path)?;
        assert_eq!(load_table(&clean_path)?, split.clean);
        assert_eq!(load_table(&abandon_path)?, split.abandon);
        Ok(())
    }
}
