// src/enaho/table.rs

use anyhow::{anyhow, bail, Result};
use std::collections::HashMap;

/// One materialised survey column.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Numeric(Vec<Option<f64>>),
    Text(Vec<String>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Numeric(v) => v.len(),
            Column::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Column-major raw survey data, one row per household interview.
#[derive(Debug, Clone, Default)]
pub struct SurveyTable {
    names: Vec<String>,
    columns: Vec<Column>,
    lookup: HashMap<String, usize>,
    rows: usize,
}

impl SurveyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a column; every column must have the same length.
    pub fn push_column(&mut self, name: impl Into<String>, column: Column) -> Result<()> {
        let name = name.into();
        if self.lookup.contains_key(&name) {
            bail!("duplicate column {}", name);
        }
        if !self.columns.is_empty() && column.len() != self.rows {
            bail!(
                "column {} has {} rows, table has {}",
                name,
                column.len(),
                self.rows
            );
        }
        self.rows = column.len();
        self.lookup.insert(name.clone(), self.columns.len());
        self.names.push(name);
        self.columns.push(column);
        Ok(())
    }

    pub fn num_rows(&self) -> usize {
        self.rows
    }

    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.lookup.get(name).map(|&i| &self.columns[i])
    }

    /// Check up front that every name is present, so per-row lookups can't fail halfway.
    pub fn require(&self, names: &[&str]) -> Result<()> {
        let missing: Vec<&str> = names
            .iter()
            .copied()
            .filter(|n| !self.lookup.contains_key(*n))
            .collect();
        if !missing.is_empty() {
            return Err(anyhow!("survey table is missing columns: {}", missing.join(", ")));
        }
        Ok(())
    }

    pub fn record(&self, row: usize) -> RawRecord<'_> {
        RawRecord { table: self, row }
    }

    pub fn records(&self) -> impl Iterator<Item = RawRecord<'_>> {
        (0..self.rows).map(move |row| self.record(row))
    }
}

/// Borrowed view of a single survey row.
#[derive(Debug, Clone, Copy)]
pub struct RawRecord<'a> {
    table: &'a SurveyTable,
    row: usize,
}

impl<'a> RawRecord<'a> {
    pub fn row(&self) -> usize {
        self.row
    }

    /// Numeric value of `code`. Text columns are parsed; blanks are missing.
    pub fn num(&self, code: &str) -> Option<f64> {
        match self.table.column(code)? {
            Column::Numeric(v) => v[self.row],
            Column::Text(v) => {
                let s = v[self.row].trim();
                if s.is_empty() {
                    None
                } else {
                    s.parse().ok()
                }
            }
        }
    }

    /// Textual value of `code`. Whole numbers render without a fraction.
    pub fn text(&self, code: &str) -> Option<String> {
        match self.table.column(code)? {
            Column::Text(v) => Some(v[self.row].trim().to_string()),
            Column::Numeric(v) => v[self.row].map(|x| {
                if x.fract() == 0.0 {
                    format!("{}", x as i64)
                } else {
                    x.to_string()
                }
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Result<SurveyTable> {
        let mut t = SurveyTable::new();
        t.push_column("CONGLOME", Column::Text(vec!["005001 ".into(), "".into()]))?;
        t.push_column("HOGAR", Column::Numeric(vec![Some(11.0), None]))?;
        t.push_column("AÑO", Column::Text(vec!["2024".into(), " ".into()]))?;
        Ok(t)
    }

    #[test]
    fn typed_access() -> Result<()> {
        let t = sample()?;
        let r = t.record(0);
        assert_eq!(r.text("CONGLOME").as_deref(), Some("005001"));
        assert_eq!(r.text("HOGAR").as_deref(), Some("11"));
        assert_eq!(r.num("AÑO"), Some(2024.0));

        let r = t.record(1);
        assert_eq!(r.num("HOGAR"), None);
        assert_eq!(r.text("HOGAR"), None);
        assert_eq!(r.num("AÑO"), None);
        Ok(())
    }

    #[test]
    fn rejects_ragged_and_duplicate_columns() -> Result<()> {
        let mut t = sample()?;
        assert!(t.push_column("X", Column::Numeric(vec![Some(1.0)])).is_err());
        assert!(t.push_column("HOGAR", Column::Numeric(vec![None, None])).is_err());
        Ok(())
    }

    #[test]
    fn require_lists_missing() -> Result<()> {
        let t = sample()?;
        assert!(t.require(&["HOGAR", "CONGLOME"]).is_ok());
        let err = t.require(&["HOGAR", "P101", "P102"]).unwrap_err();
        assert!(err.to_string().contains("P101, P102"));
        Ok(())
    }
}
