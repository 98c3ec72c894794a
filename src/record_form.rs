// Record Form Module for sqldash
//
// Derives an input widget for every column from its declared type and turns
// what the user typed into typed values. The widget choice follows SQLite's
// type affinity rules, so any declared type maps to one of four kinds.

use crate::core::db::{ColumnDescriptor, Record, Value, DATETIME_FORMAT, DATE_FORMAT};
use crate::core::{DashError, Result};
use chrono::{NaiveDate, NaiveDateTime};
use indexmap::IndexMap;

const BOOLEAN_OPTIONS: [&str; 2] = ["true", "false"];

const DATETIME_INPUT_FORMATS: [&str; 3] = [DATETIME_FORMAT, "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

/// What kind of value a column holds, as far as a form is concerned.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnKind {
    Text,
    Number { integer: bool },
    Choice(Vec<String>),
    Date { with_time: bool },
}

/// The input control a form shows for a column.
#[derive(Debug, Clone, PartialEq)]
pub enum InputWidget {
    TextBox,
    NumberBox { integer: bool },
    Select { options: Vec<String> },
    DatePicker { with_time: bool },
}

impl InputWidget {
    /// Short hint shown next to the field prompt.
    pub fn hint(&self) -> String {
        match self {
            InputWidget::TextBox => "text".to_string(),
            InputWidget::NumberBox { integer: true } => "whole number".to_string(),
            InputWidget::NumberBox { integer: false } => "number".to_string(),
            InputWidget::Select { options } => format!("one of: {}", options.join(" | ")),
            InputWidget::DatePicker { with_time: true } => "YYYY-MM-DD HH:MM:SS".to_string(),
            InputWidget::DatePicker { with_time: false } => "YYYY-MM-DD".to_string(),
        }
    }
}

impl ColumnKind {
    /// Classifies a declared column type.
    pub fn from_declared_type(declared_type: &str) -> Self {
        let upper = declared_type.to_ascii_uppercase();
        if upper.contains("BOOL") {
            ColumnKind::Choice(BOOLEAN_OPTIONS.iter().map(|s| s.to_string()).collect())
        } else if upper.contains("DATE") || upper.contains("TIME") {
            ColumnKind::Date {
                with_time: upper.contains("TIME"),
            }
        } else if upper.contains("INT") {
            ColumnKind::Number { integer: true }
        } else if ["REAL", "FLOA", "DOUB", "DEC", "NUM"]
            .iter()
            .any(|marker| upper.contains(marker))
        {
            ColumnKind::Number { integer: false }
        } else {
            ColumnKind::Text
        }
    }

    pub fn input_widget(&self) -> InputWidget {
        match self {
            ColumnKind::Text => InputWidget::TextBox,
            ColumnKind::Number { integer } => InputWidget::NumberBox { integer: *integer },
            ColumnKind::Choice(options) => InputWidget::Select {
                options: options.clone(),
            },
            ColumnKind::Date { with_time } => InputWidget::DatePicker {
                with_time: *with_time,
            },
        }
    }

    fn is_boolean(&self) -> bool {
        matches!(self, ColumnKind::Choice(options) if options.iter().map(String::as_str).eq(BOOLEAN_OPTIONS))
    }

    /// Converts user input into a value of this kind.
    ///
    /// Blank input is NULL for nullable fields and an error otherwise.
    pub fn parse_input(&self, input: &str, nullable: bool) -> Result<Value> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return if nullable {
                Ok(Value::Null)
            } else {
                Err(DashError::data("a value is required"))
            };
        }

        match self {
            ColumnKind::Text => Ok(Value::Text(input.to_string())),
            ColumnKind::Number { integer: true } => trimmed
                .parse::<i64>()
                .map(Value::Integer)
                .map_err(|_| DashError::data(format!("'{}' is not a whole number", trimmed))),
            ColumnKind::Number { integer: false } => match trimmed.parse::<f64>() {
                Ok(number) if number.is_finite() => Ok(Value::Real(number)),
                _ => Err(DashError::data(format!("'{}' is not a number", trimmed))),
            },
            ColumnKind::Choice(options) => {
                let Some(option) = options.iter().find(|o| o.eq_ignore_ascii_case(trimmed)) else {
                    return Err(DashError::data(format!(
                        "'{}' is not one of: {}",
                        trimmed,
                        options.join(", ")
                    )));
                };
                if self.is_boolean() {
                    Ok(Value::Bool(option == "true"))
                } else {
                    Ok(Value::Text(option.clone()))
                }
            }
            ColumnKind::Date { with_time: false } => NaiveDate::parse_from_str(trimmed, DATE_FORMAT)
                .map(Value::Date)
                .map_err(|_| DashError::data(format!("'{}' is not a date (YYYY-MM-DD)", trimmed))),
            ColumnKind::Date { with_time: true } => DATETIME_INPUT_FORMATS
                .iter()
                .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
                .map(Value::DateTime)
                .ok_or_else(|| {
                    DashError::data(format!(
                        "'{}' is not a date and time (YYYY-MM-DD HH:MM:SS)",
                        trimmed
                    ))
                }),
        }
    }
}

/// One field of a record form.
#[derive(Debug, Clone, PartialEq)]
pub struct FormField {
    pub name: String,
    pub declared_type: String,
    pub kind: ColumnKind,
    pub nullable: bool,
    pub has_default: bool,
}

impl FormField {
    pub fn from_column(column: &ColumnDescriptor) -> Self {
        FormField {
            name: column.name.clone(),
            declared_type: column.declared_type.clone(),
            kind: ColumnKind::from_declared_type(&column.declared_type),
            nullable: column.nullable,
            has_default: column.default.is_some(),
        }
    }

    /// A field that may be left out entirely.
    pub fn is_optional(&self) -> bool {
        self.nullable || self.has_default
    }

    pub fn prompt(&self) -> String {
        let marker = if self.is_optional() { "" } else { " *" };
        format!(
            "{}{} ({}, {})",
            self.name,
            marker,
            self.declared_type,
            self.kind.input_widget().hint()
        )
    }

    pub fn parse(&self, input: &str) -> Result<Value> {
        self.kind
            .parse_input(input, self.nullable)
            .map_err(|e| DashError::data(format!("{}: {}", self.name, message_of(&e))))
    }
}

fn message_of(err: &DashError) -> String {
    match err {
        DashError::Data { message, .. } => message.clone(),
        other => other.to_string(),
    }
}

/// An insert form for one table.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordForm {
    pub table: String,
    pub fields: Vec<FormField>,
}

impl RecordForm {
    /// Builds the form for `table`; auto-increment keys are filled by the
    /// database and get no field.
    pub fn for_table(table: &str, columns: &[ColumnDescriptor]) -> Self {
        RecordForm {
            table: table.to_string(),
            fields: columns
                .iter()
                .filter(|c| !c.is_auto_increment())
                .map(FormField::from_column)
                .collect(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&FormField> {
        self.fields.iter().find(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// Builds a record from raw field inputs.
    ///
    /// Blank inputs for fields that are optional are left out so the column
    /// default applies; blank required fields and unknown names are errors.
    pub fn fill(&self, inputs: &IndexMap<String, String>) -> Result<Record> {
        for name in inputs.keys() {
            if self.field(name).is_none() {
                return Err(DashError::data(format!(
                    "'{}' is not a field of the {} form",
                    name, self.table
                )));
            }
        }

        let mut record = Record::new();
        for field in &self.fields {
            let input = inputs
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(&field.name))
                .map(|(_, value)| value.as_str())
                .unwrap_or("");
            if input.trim().is_empty() && field.is_optional() {
                continue;
            }
            record.insert(field.name.clone(), field.parse(input)?);
        }
        Ok(record)
    }

    /// Lists the fields with their prompts, required ones marked with `*`.
    pub fn describe(&self) -> String {
        let mut output = format!("Insert into {}:\n", self.table);
        for field in &self.fields {
            output.push_str(&format!("  {}\n", field.prompt()));
        }
        output
    }
}
