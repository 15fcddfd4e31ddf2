//! Checkpoint table: the durable, resumable state of an enrichment run.
//!
//! One CSV row per publication. Progress is tracked purely through column
//! emptiness: a row is done when all seven target columns hold a value, and a
//! rerun against the same file resumes at the first row that is not done.
//! Every write goes to a sibling `.tmp` file which is then renamed over the
//! destination, so readers only ever see a complete table.

use crate::error::{EnrichError, Result};
use std::collections::HashSet;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Stable ordinal column
pub const SEQUENCE_COLUMN: &str = "Sequence Number";

/// Lookup/identity column
pub const TITLE_COLUMN: &str = "Title";

/// The enrichment columns, in output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetColumn {
    ImpactFactor,
    AuthorKeywords,
    KeywordsPlus,
    Institution,
    Country,
    Doi,
    Abstract,
}

impl TargetColumn {
    pub const ALL: [TargetColumn; 7] = [
        TargetColumn::ImpactFactor,
        TargetColumn::AuthorKeywords,
        TargetColumn::KeywordsPlus,
        TargetColumn::Institution,
        TargetColumn::Country,
        TargetColumn::Doi,
        TargetColumn::Abstract,
    ];

    pub fn header(self) -> &'static str {
        match self {
            TargetColumn::ImpactFactor => "Impact Factor",
            TargetColumn::AuthorKeywords => "Author Keywords",
            TargetColumn::KeywordsPlus => "Keywords Plus",
            TargetColumn::Institution => "Institution",
            TargetColumn::Country => "Country",
            TargetColumn::Doi => "DOI",
            TargetColumn::Abstract => "Abstract",
        }
    }

    fn from_header(header: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.header() == header)
    }
}

/// Enrichment values of one row. Empty string / `None` means "not done".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TargetFields {
    pub impact_factor: Option<f64>,
    pub author_keywords: String,
    pub keywords_plus: String,
    pub institution: String,
    pub country: String,
    pub doi: String,
    pub abstract_text: String,
}

impl TargetFields {
    pub fn is_filled(&self, column: TargetColumn) -> bool {
        match column {
            TargetColumn::ImpactFactor => self.impact_factor.is_some_and(|v| !v.is_nan()),
            _ => !self.text(column).is_empty(),
        }
    }

    pub fn is_complete(&self) -> bool {
        TargetColumn::ALL.into_iter().all(|c| self.is_filled(c))
    }

    pub fn is_blank(&self) -> bool {
        TargetColumn::ALL.into_iter().all(|c| !self.is_filled(c))
    }

    fn text(&self, column: TargetColumn) -> &str {
        match column {
            TargetColumn::ImpactFactor => "",
            TargetColumn::AuthorKeywords => &self.author_keywords,
            TargetColumn::KeywordsPlus => &self.keywords_plus,
            TargetColumn::Institution => &self.institution,
            TargetColumn::Country => &self.country,
            TargetColumn::Doi => &self.doi,
            TargetColumn::Abstract => &self.abstract_text,
        }
    }

    /// CSV cell text for `column`.
    pub fn cell(&self, column: TargetColumn) -> String {
        match column {
            TargetColumn::ImpactFactor => self
                .impact_factor
                .filter(|v| !v.is_nan())
                .map(|v| v.to_string())
                .unwrap_or_default(),
            _ => self.text(column).to_string(),
        }
    }

    fn set_cell(&mut self, column: TargetColumn, raw: &str) {
        let value = raw.to_string();
        match column {
            TargetColumn::ImpactFactor => self.impact_factor = parse_impact_factor(raw),
            TargetColumn::AuthorKeywords => self.author_keywords = value,
            TargetColumn::KeywordsPlus => self.keywords_plus = value,
            TargetColumn::Institution => self.institution = value,
            TargetColumn::Country => self.country = value,
            TargetColumn::Doi => self.doi = value,
            TargetColumn::Abstract => self.abstract_text = value,
        }
    }
}

/// Numeric coercion: anything that is not a finite number becomes null.
pub fn parse_impact_factor(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Abstract cleanup: newlines become spaces, carriage returns vanish, trimmed.
pub fn normalize_abstract(text: &str) -> String {
    text.replace('\n', " ").replace('\r', "").trim().to_string()
}

/// One publication.
#[derive(Debug, Clone, PartialEq)]
pub struct PublicationRow {
    pub sequence_number: u64,
    pub title: String,
    /// Pass-through cells, aligned with `CheckpointTable::extra_columns`
    pub extra: Vec<String>,
    pub fields: TargetFields,
}

impl PublicationRow {
    pub fn is_complete(&self) -> bool {
        self.fields.is_complete()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    Sequence,
    Title,
    Extra(usize),
    Target(TargetColumn),
}

/// Ordered publication rows plus the on-disk column layout.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointTable {
    layout: Vec<Column>,
    extra_columns: Vec<String>,
    rows: Vec<PublicationRow>,
}

impl CheckpointTable {
    /// Build a table with the canonical layout:
    /// sequence, title, extra columns, target columns.
    pub fn new(extra_columns: Vec<String>, rows: Vec<PublicationRow>) -> Self {
        let mut layout = vec![Column::Sequence, Column::Title];
        layout.extend((0..extra_columns.len()).map(Column::Extra));
        layout.extend(TargetColumn::ALL.into_iter().map(Column::Target));
        Self {
            layout,
            extra_columns,
            rows,
        }
    }

    /// Fresh table with sequence numbers `1..=N` and empty target fields.
    pub fn from_titles<I, S>(titles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let rows = titles
            .into_iter()
            .enumerate()
            .map(|(i, title)| PublicationRow {
                sequence_number: i as u64 + 1,
                title: title.into(),
                extra: Vec::new(),
                fields: TargetFields::default(),
            })
            .collect();
        Self::new(Vec::new(), rows)
    }

    /// Parse CSV text.
    ///
    /// A missing sequence column is inserted first and numbered `1..=N`;
    /// missing target columns are appended with empty values.
    pub fn from_reader<R: std::io::Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);

        let headers: Vec<String> = rdr
            .headers()?
            .iter()
            .enumerate()
            .map(|(i, h)| {
                let h = if i == 0 { h.trim_start_matches('\u{feff}') } else { h };
                h.trim().to_string()
            })
            .collect();

        let mut layout = Vec::with_capacity(headers.len() + TargetColumn::ALL.len() + 1);
        let mut extra_columns = Vec::new();
        let mut seen = HashSet::new();
        for header in &headers {
            let column = match header.as_str() {
                SEQUENCE_COLUMN => Column::Sequence,
                TITLE_COLUMN => Column::Title,
                other => match TargetColumn::from_header(other) {
                    Some(target) => Column::Target(target),
                    None => {
                        extra_columns.push(other.to_string());
                        Column::Extra(extra_columns.len() - 1)
                    }
                },
            };
            if !matches!(column, Column::Extra(_)) && !seen.insert(column_key(column)) {
                return Err(EnrichError::Validation(format!(
                    "Duplicate column '{}'",
                    header
                )));
            }
            layout.push(column);
        }

        if !layout.contains(&Column::Title) {
            return Err(EnrichError::Validation(format!(
                "Input table has no '{}' column",
                TITLE_COLUMN
            )));
        }

        let has_sequence = layout.contains(&Column::Sequence);
        let mut rows = Vec::new();
        for (idx, record) in rdr.records().enumerate() {
            let record = record?;
            let mut row = PublicationRow {
                sequence_number: idx as u64 + 1,
                title: String::new(),
                extra: vec![String::new(); extra_columns.len()],
                fields: TargetFields::default(),
            };
            for (column, cell) in layout.iter().zip(record.iter()) {
                match column {
                    Column::Sequence => row.sequence_number = parse_sequence(cell, idx)?,
                    Column::Title => row.title = cell.to_string(),
                    Column::Extra(i) => row.extra[*i] = cell.to_string(),
                    Column::Target(target) => {
                        row.fields.set_cell(*target, cell);
                        if *target == TargetColumn::ImpactFactor
                            && !cell.trim().is_empty()
                            && row.fields.impact_factor.is_none()
                        {
                            warn!(row = idx + 1, value = cell, "Non-numeric impact factor treated as empty");
                        }
                    }
                }
            }
            rows.push(row);
        }

        if !has_sequence {
            layout.insert(0, Column::Sequence);
        }
        for target in TargetColumn::ALL {
            if !layout.contains(&Column::Target(target)) {
                layout.push(Column::Target(target));
            }
        }

        Ok(Self {
            layout,
            extra_columns,
            rows,
        })
    }

    /// Serialize to CSV with a header row.
    pub fn write_to<W: std::io::Write>(&self, writer: W) -> Result<W> {
        let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(writer);
        wtr.write_record(self.layout.iter().map(|c| self.column_name(*c)))?;
        for row in &self.rows {
            wtr.write_record(self.layout.iter().map(|c| cell_for(row, *c)))?;
        }
        wtr.flush()?;
        wtr.into_inner()
            .map_err(|e| EnrichError::Io(std::io::Error::other(e.to_string())))
    }

    fn column_name(&self, column: Column) -> &str {
        match column {
            Column::Sequence => SEQUENCE_COLUMN,
            Column::Title => TITLE_COLUMN,
            Column::Extra(i) => &self.extra_columns[i],
            Column::Target(target) => target.header(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[PublicationRow] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> Option<&PublicationRow> {
        self.rows.get(index)
    }

    pub fn extra_columns(&self) -> &[String] {
        &self.extra_columns
    }

    /// Column headers in file order.
    pub fn headers(&self) -> Vec<&str> {
        self.layout.iter().map(|c| self.column_name(*c)).collect()
    }

    /// Cell text of an extra column by header name.
    pub fn extra_value<'a>(&'a self, row: &'a PublicationRow, column: &str) -> Option<&'a str> {
        self.extra_columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| row.extra.get(i))
            .map(String::as_str)
    }

    /// First row with any empty target column; `0` when every row is complete.
    pub fn resume_index(&self) -> usize {
        self.rows
            .iter()
            .position(|r| !r.is_complete())
            .unwrap_or(0)
    }

    pub fn complete_count(&self) -> usize {
        self.rows.iter().filter(|r| r.is_complete()).count()
    }

    /// Overwrite the target fields of `index`.
    pub fn set_fields(&mut self, index: usize, fields: TargetFields) -> Result<()> {
        let row = self.rows.get_mut(index).ok_or_else(|| {
            EnrichError::Validation(format!("Row index {} out of range", index))
        })?;
        row.fields = fields;
        Ok(())
    }

    /// Empty every target column of `index`.
    pub fn clear_fields(&mut self, index: usize) -> Result<()> {
        self.set_fields(index, TargetFields::default())
    }

    pub fn normalize_abstracts(&mut self) {
        for row in &mut self.rows {
            row.fields.abstract_text = normalize_abstract(&row.fields.abstract_text);
        }
    }

    /// Same layout, keeping the rows `keep` accepts (in table order).
    pub fn select<F>(&self, mut keep: F) -> Self
    where
        F: FnMut(usize, &PublicationRow) -> bool,
    {
        let rows = self
            .rows
            .iter()
            .enumerate()
            .filter(|(i, r)| keep(*i, r))
            .map(|(_, r)| r.clone())
            .collect();
        Self {
            layout: self.layout.clone(),
            extra_columns: self.extra_columns.clone(),
            rows,
        }
    }

    /// Reassign sequence numbers `1..=N` in table order.
    pub fn renumber(&mut self) {
        for (i, row) in self.rows.iter_mut().enumerate() {
            row.sequence_number = i as u64 + 1;
        }
    }
}

fn column_key(column: Column) -> String {
    match column {
        Column::Sequence => SEQUENCE_COLUMN.to_string(),
        Column::Title => TITLE_COLUMN.to_string(),
        Column::Extra(i) => format!("extra:{}", i),
        Column::Target(t) => t.header().to_string(),
    }
}

fn cell_for(row: &PublicationRow, column: Column) -> String {
    match column {
        Column::Sequence => row.sequence_number.to_string(),
        Column::Title => row.title.clone(),
        Column::Extra(i) => row.extra.get(i).cloned().unwrap_or_default(),
        Column::Target(target) => row.fields.cell(target),
    }
}

fn parse_sequence(cell: &str, idx: usize) -> Result<u64> {
    let cell = cell.trim();
    if let Ok(n) = cell.parse::<u64>() {
        return Ok(n);
    }
    // pandas may have written "3.0"
    cell.parse::<f64>()
        .ok()
        .filter(|v| v.fract() == 0.0 && *v >= 0.0)
        .map(|v| v as u64)
        .ok_or_else(|| {
            EnrichError::Validation(format!(
                "Row {}: invalid {} '{}'",
                idx + 1,
                SEQUENCE_COLUMN,
                cell
            ))
        })
}

/// Write `table` to `path` through a sibling temp file and a rename.
///
/// On failure the temp file is removed and `path` keeps its previous content.
pub fn write_table_atomic(table: &CheckpointTable, path: &Path) -> Result<()> {
    let tmp = temp_path(path);
    let result = (|| -> Result<()> {
        let file = File::create(&tmp)?;
        let file = table.write_to(file)?;
        file.sync_all()?;
        fs::rename(&tmp, path)?;
        Ok(())
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&tmp);
        return Err(EnrichError::Storage {
            path: path.display().to_string(),
            source: Box::new(e),
        });
    }
    debug!(path = %path.display(), rows = table.len(), "Table written");
    Ok(())
}

/// `<path>.tmp`, in the same directory so the rename stays atomic.
fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

/// The working table file: load on start, save at every save point.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn load(&self) -> Result<CheckpointTable> {
        load_table(&self.path)
    }

    pub fn save(&self, table: &CheckpointTable) -> Result<()> {
        write_table_atomic(table, &self.path)?;
        info!(path = %self.path.display(), "Progress saved");
        Ok(())
    }
}

/// Read a table from a CSV file.
pub fn load_table(path: &Path) -> Result<CheckpointTable> {
    if !path.exists() {
        return Err(EnrichError::Config(format!(
            "Input file not found: {}",
            path.display()
        )));
    }
    let file = File::open(path)?;
    let table = CheckpointTable::from_reader(file)?;
    info!(
        path = %path.display(),
        rows = table.len(),
        complete = table.complete_count(),
        "Loaded table"
    );
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn complete_fields(country: &str) -> TargetFields {
        TargetFields {
            impact_factor: Some(3.5),
            author_keywords: "qubit, control".to_string(),
            keywords_plus: "Dynamics".to_string(),
            institution: "RIKEN".to_string(),
            country: country.to_string(),
            doi: "10.1000/xyz".to_string(),
            abstract_text: "We study qubits.".to_string(),
        }
    }

    #[test]
    fn test_load_baseline_assigns_sequence_and_target_columns() -> Result<()> {
        let csv = "\u{feff}Title,Publication Year,Authors\nPaper A,2020,X Nori\nPaper B,2021,Y Nori\n";
        let table = CheckpointTable::from_reader(csv.as_bytes())?;

        assert_eq!(table.len(), 2);
        assert_eq!(table.rows()[1].sequence_number, 2);
        assert_eq!(
            table.headers(),
            vec![
                "Sequence Number",
                "Title",
                "Publication Year",
                "Authors",
                "Impact Factor",
                "Author Keywords",
                "Keywords Plus",
                "Institution",
                "Country",
                "DOI",
                "Abstract"
            ]
        );
        assert_eq!(table.extra_value(&table.rows()[0], "Publication Year"), Some("2020"));
        assert_eq!(table.resume_index(), 0);
        Ok(())
    }

    #[test]
    fn test_missing_title_column_rejected() {
        let csv = "Name,Year\nA,2020\n";
        assert!(matches!(
            CheckpointTable::from_reader(csv.as_bytes()),
            Err(EnrichError::Validation(_))
        ));
    }

    #[test]
    fn test_resume_index_is_first_incomplete_row() -> Result<()> {
        let mut table = CheckpointTable::from_titles(["a", "b", "c", "d", "e"]);
        for i in [0, 1, 2, 4] {
            table.set_fields(i, complete_fields("Japan"))?;
        }
        assert_eq!(table.resume_index(), 3);

        // later rows do not matter
        table.clear_fields(4)?;
        assert_eq!(table.resume_index(), 3);

        // a single empty column is enough
        let mut partial = complete_fields("Japan");
        partial.doi.clear();
        table.set_fields(1, partial)?;
        assert_eq!(table.resume_index(), 1);
        Ok(())
    }

    #[test]
    fn test_resume_index_zero_when_complete() -> Result<()> {
        let mut table = CheckpointTable::from_titles(["a", "b"]);
        table.set_fields(0, complete_fields("Japan"))?;
        table.set_fields(1, complete_fields("Japan"))?;
        assert_eq!(table.resume_index(), 0);
        Ok(())
    }

    #[test]
    fn test_null_impact_factor_is_incomplete() {
        let mut fields = complete_fields("Japan");
        fields.impact_factor = None;
        assert!(!fields.is_complete());
        fields.impact_factor = Some(f64::NAN);
        assert!(!fields.is_complete());
    }

    #[test]
    fn test_round_trip_preserves_layout_and_values() -> Result<()> {
        let csv = "Title,Sequence Number,Journal,Impact Factor,Author Keywords,Keywords Plus,Institution,Country,DOI,Abstract\n\
                   \"Paper, A\",7,PRL,9.2,\"a, b\",C,Inst,Japan,10.1/x,\"line one\"\n\
                   Paper B,8,PRA,not-a-number,,,,,,\n";
        let table = CheckpointTable::from_reader(csv.as_bytes())?;
        assert_eq!(table.rows()[0].sequence_number, 7);
        assert_eq!(table.rows()[0].title, "Paper, A");
        assert_eq!(table.rows()[0].fields.impact_factor, Some(9.2));
        assert_eq!(table.rows()[1].fields.impact_factor, None);
        assert_eq!(table.headers()[0], "Title");

        let out = table.write_to(Vec::new())?;
        let reparsed = CheckpointTable::from_reader(out.as_slice())?;
        assert_eq!(reparsed, table);
        Ok(())
    }

    #[test]
    fn test_normalize_abstract() {
        assert_eq!(normalize_abstract("  first\r\nsecond\nthird  "), "first second third");
        assert_eq!(normalize_abstract(""), "");
    }

    #[test]
    fn test_store_save_and_load() -> Result<()> {
        let dir = TempDir::new()?;
        let store = CheckpointStore::new(dir.path().join("nori_all.csv"));
        let mut table = CheckpointTable::from_titles(["a", "b"]);
        table.set_fields(0, complete_fields("Japan"))?;

        store.save(&table)?;
        assert!(!temp_path(store.path()).exists());
        assert_eq!(store.load()?, table);
        Ok(())
    }

    #[test]
    fn test_interrupted_write_leaves_previous_checkpoint() -> Result<()> {
        let dir = TempDir::new()?;
        let store = CheckpointStore::new(dir.path().join("nori_all.csv"));
        let mut table = CheckpointTable::from_titles(["a", "b", "c"]);
        table.set_fields(0, complete_fields("Japan"))?;
        store.save(&table)?;
        let before = fs::read(store.path())?;

        // a crash mid-write leaves only a truncated temp file behind
        fs::write(temp_path(store.path()), b"Sequence Number,Title\n1,a")?;
        assert_eq!(fs::read(store.path())?, before);
        assert_eq!(store.load()?, table);

        // the next save replaces the stale temp file
        table.set_fields(1, complete_fields("China"))?;
        store.save(&table)?;
        assert_eq!(store.load()?.complete_count(), 2);
        assert!(!temp_path(store.path()).exists());
        Ok(())
    }

    #[test]
    fn test_failed_write_reports_storage_error() -> Result<()> {
        let dir = TempDir::new()?;
        let store = CheckpointStore::new(dir.path().join("missing_dir").join("all.csv"));
        let table = CheckpointTable::from_titles(["a"]);
        let err = store.save(&table).expect_err("write into missing directory");
        assert!(err.is_storage());
        Ok(())
    }

    #[test]
    fn test_load_missing_file_is_config_error() {
        let store = CheckpointStore::new("/nonexistent/nori_all.csv");
        assert!(matches!(store.load(), Err(EnrichError::Config(_))));
    }
}
