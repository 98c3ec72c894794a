//! Property-based tests for DDL and record access
//!
//! These tests verify, over generated table shapes and row counts, that:
//! - Declared columns read back with the same names, types and key roles
//! - Creating then dropping a table leaves the table list unchanged
//! - Consecutive pages are disjoint and concatenate to one larger page
//! - The identifier grammar accepts and rejects the right names

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rusqlite::Connection;
    use sqldash::core::db::identifier::validate_new_identifier;
    use sqldash::core::db::{ColumnDef, KeyRole, Record, RecordAccessor, SchemaManager, Value};

    // Test infrastructure

    fn memory_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        conn
    }

    fn arb_identifier() -> impl Strategy<Value = String> {
        "[a-z_][a-z0-9_]{0,20}".prop_filter("reserved prefix", |s| !s.starts_with("sqlite_"))
    }

    fn arb_column_type() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("INTEGER".to_string()),
            Just("TEXT".to_string()),
            Just("REAL".to_string()),
            Just("BLOB".to_string()),
            Just("NUMERIC".to_string()),
            Just("BOOLEAN".to_string()),
            Just("DATE".to_string()),
            Just("VARCHAR(50)".to_string()),
            Just("DECIMAL(10,2)".to_string())
        ]
    }

    /// 1 to 6 columns with distinct names; some of them form the primary key.
    fn arb_columns() -> impl Strategy<Value = Vec<ColumnDef>> {
        prop::collection::hash_set(arb_identifier(), 1..=6).prop_flat_map(|names| {
            let names: Vec<String> = names.into_iter().collect();
            let count = names.len();
            (
                prop::collection::vec(arb_column_type(), count),
                prop::collection::vec(any::<bool>(), count),
                prop::collection::vec(any::<bool>(), count),
            )
                .prop_map(move |(types, primary, not_null)| {
                    names
                        .iter()
                        .zip(types)
                        .zip(primary)
                        .zip(not_null)
                        .map(|(((name, type_name), primary), not_null)| {
                            let mut column = ColumnDef::new(name.clone(), type_name);
                            column.is_primary = primary;
                            column.not_null = not_null;
                            column
                        })
                        .collect()
                })
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        #[test]
        fn prop_columns_round_trip(table in arb_identifier(), columns in arb_columns()) {
            let conn = memory_db();
            let schema = SchemaManager::new(&conn);
            schema.create_table(&table, columns.clone()).unwrap();

            let described = schema.get_columns(&table).unwrap();
            prop_assert_eq!(described.len(), columns.len());
            for (declared, read_back) in columns.iter().zip(&described) {
                prop_assert_eq!(&read_back.name, &declared.name);
                prop_assert_eq!(&read_back.declared_type, &declared.type_name);
                let expected_role = if declared.is_primary { KeyRole::Primary } else { KeyRole::None };
                prop_assert_eq!(read_back.key, expected_role);
            }

            let expected_keys: Vec<String> = columns
                .iter()
                .filter(|c| c.is_primary)
                .map(|c| c.name.clone())
                .collect();
            prop_assert_eq!(schema.get_primary_keys(&table).unwrap(), expected_keys);
        }

        #[test]
        fn prop_create_then_drop_leaves_tables_unchanged(
            existing in prop::collection::hash_set(arb_identifier(), 0..4),
            table in arb_identifier(),
        ) {
            prop_assume!(!existing.contains(&table));
            let conn = memory_db();
            let schema = SchemaManager::new(&conn);
            for name in &existing {
                schema.create_table(name, vec![ColumnDef::new("id", "INTEGER").primary()]).unwrap();
            }
            let before = schema.list_tables().unwrap();

            schema.create_table(&table, vec![ColumnDef::new("value", "TEXT")]).unwrap();
            prop_assert!(schema.list_tables().unwrap().contains(&table));
            schema.drop_table(&table).unwrap();

            prop_assert_eq!(schema.list_tables().unwrap(), before);
        }

        #[test]
        fn prop_pages_are_disjoint_and_ordered(rows in 20usize..60, limit in 1usize..15) {
            let conn = memory_db();
            SchemaManager::new(&conn)
                .create_table("items", "id INTEGER PRIMARY KEY AUTOINCREMENT, label TEXT")
                .unwrap();
            let accessor = RecordAccessor::open(&conn, "items").unwrap();
            for i in 0..rows {
                let mut record = Record::new();
                record.insert("label".to_string(), Value::Text(format!("item {}", i)));
                accessor.create(&record).unwrap();
            }

            let first = accessor.read_many(limit, 0).unwrap();
            let second = accessor.read_many(limit, limit).unwrap();
            let both = accessor.read_many(limit * 2, 0).unwrap();

            prop_assert_eq!(first.len(), limit);
            prop_assert!(first.rows.iter().all(|row| !second.rows.contains(row)));
            let concatenated: Vec<Vec<Value>> =
                first.rows.iter().chain(second.rows.iter()).cloned().collect();
            prop_assert_eq!(concatenated, both.rows);
        }

        #[test]
        fn prop_valid_identifiers_are_accepted(name in "[A-Za-z_][A-Za-z0-9_]{0,63}") {
            prop_assume!(!name.to_ascii_lowercase().starts_with("sqlite_"));
            prop_assert_eq!(validate_new_identifier(&name).unwrap(), name.as_str());
        }

        #[test]
        fn prop_names_with_other_characters_are_rejected(
            prefix in "[a-z]{0,5}",
            bad in "[ ;\"'().,*-]",
            suffix in "[a-z]{0,5}",
        ) {
            let name = format!("{}{}{}", prefix, bad, suffix);
            prop_assert!(validate_new_identifier(&name).is_err());
        }
    }

    #[test]
    fn test_overlong_and_reserved_names_are_rejected() {
        assert!(validate_new_identifier(&"a".repeat(65)).is_err());
        assert!(validate_new_identifier("sqlite_master2").is_err());
        assert!(validate_new_identifier("1abc").is_err());
        assert!(validate_new_identifier("").is_err());
    }
}
