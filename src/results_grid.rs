use crate::core::db::{QueryResult, Record, RecordPage, Value};
use tabled::builder::Builder;
use tabled::settings::object::{Cell, Rows};
use tabled::settings::{Alignment, Style};

/// Tabular view of rows returned by a query or a record page.
#[derive(Debug, Clone, Default)]
pub struct ResultsGrid {
    headers: Vec<String>,
    rows: Vec<Vec<Value>>,
    /// Offset of the first row and the total number of rows, when the grid
    /// shows one page of a larger table
    window: Option<(usize, usize)>,
}

impl ResultsGrid {
    pub fn new(headers: Vec<String>) -> Self {
        ResultsGrid {
            headers,
            rows: Vec::new(),
            window: None,
        }
    }

    pub fn from_query_result(result: &QueryResult) -> Self {
        ResultsGrid {
            headers: result.columns.clone(),
            rows: result.rows.clone(),
            window: None,
        }
    }

    pub fn from_page(page: &RecordPage) -> Self {
        ResultsGrid {
            headers: page.columns.clone(),
            rows: page.rows.clone(),
            window: None,
        }
    }

    /// One row per field, for showing a single record.
    pub fn from_record(record: &Record) -> Self {
        let mut grid = ResultsGrid::new(vec!["column".to_string(), "value".to_string()]);
        for (name, value) in record {
            grid.add_row(vec![Value::Text(name.clone()), value.clone()]);
        }
        grid
    }

    /// Marks the grid as the page starting at `offset` out of `total` rows.
    pub fn with_window(mut self, offset: usize, total: usize) -> Self {
        self.window = Some((offset, total));
        self
    }

    pub fn add_row(&mut self, row: Vec<Value>) {
        self.rows.push(row);
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Renders the table. Numeric cells are right-aligned, NULL is spelled out.
    pub fn render(&self) -> String {
        if self.headers.is_empty() {
            return String::new();
        }

        let mut builder = Builder::default();
        builder.push_record(self.headers.iter().cloned());

        let mut numeric_cells = Vec::new();
        for (row_index, row) in self.rows.iter().enumerate() {
            let mut cells = Vec::with_capacity(row.len());
            for (column, value) in row.iter().enumerate() {
                if value.is_numeric() {
                    numeric_cells.push(Cell::new(row_index + 1, column));
                }
                cells.push(format_cell(value));
            }
            builder.push_record(cells);
        }

        let mut table = builder.build();
        table.with(Style::ascii());
        table.modify(Rows::first(), Alignment::center());
        for cell in numeric_cells {
            table.modify(cell, Alignment::right());
        }
        table.to_string()
    }

    /// Summary line printed under the table.
    pub fn footer(&self) -> String {
        match self.window {
            Some((_, total)) if self.rows.is_empty() => format!("no rows (of {})", total),
            Some((offset, total)) => format!(
                "rows {}-{} of {}",
                offset + 1,
                offset + self.rows.len(),
                total
            ),
            None if self.rows.len() == 1 => "1 row".to_string(),
            None => format!("{} rows", self.rows.len()),
        }
    }
}

fn format_cell(value: &Value) -> String {
    match value {
        Value::Real(r) if r.fract() != 0.0 => format!("{:.2}", r),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn sample_grid() -> ResultsGrid {
        let mut grid = ResultsGrid::new(vec!["id".to_string(), "label".to_string()]);
        grid.add_row(vec![Value::Integer(7), Value::Text("alpha".to_string())]);
        grid.add_row(vec![Value::Integer(42), Value::Null]);
        grid
    }

    #[test]
    fn test_render_empty_grid() {
        let grid = ResultsGrid::default();
        assert_eq!(grid.render(), "");
    }

    #[test]
    fn test_render_with_headers_and_rows() {
        let expected = indoc! {"
            +----+-------+
            | id | label |
            +----+-------+
            |  7 | alpha |
            +----+-------+
            | 42 | NULL  |
            +----+-------+
        "};
        assert_eq!(sample_grid().render(), expected.trim_end());
    }

    #[test]
    fn test_render_headers_only() {
        let grid = ResultsGrid::new(vec!["id".to_string()]);
        let expected = indoc! {"
            +----+
            | id |
            +----+
        "};
        assert_eq!(grid.render(), expected.trim_end());
        assert_eq!(grid.footer(), "0 rows");
    }

    #[test]
    fn test_reals_are_rounded_for_display() {
        assert_eq!(format_cell(&Value::Real(23.456)), "23.46");
        assert_eq!(format_cell(&Value::Real(60.0)), "60");
        assert_eq!(format_cell(&Value::Null), "NULL");
    }

    #[test]
    fn test_from_record_lists_fields() {
        let mut record = Record::new();
        record.insert("id".to_string(), Value::Integer(1));
        record.insert("name".to_string(), Value::Text("Alice".to_string()));
        let grid = ResultsGrid::from_record(&record);
        assert_eq!(grid.row_count(), 2);
        let rendered = grid.render();
        assert!(rendered.contains("| name   | Alice |"));
        assert!(rendered.contains("| id     |     1 |"));
    }

    #[test]
    fn test_footer() {
        assert_eq!(sample_grid().footer(), "2 rows");
        assert_eq!(sample_grid().with_window(20, 57).footer(), "rows 21-22 of 57");
        assert_eq!(
            ResultsGrid::new(vec!["id".to_string()]).with_window(40, 3).footer(),
            "no rows (of 3)"
        );
    }
}
