// Synthetic Data Mill for sqldash
//
// Creates the five sample tables of the food-delivery dataset and fills them
// with plausible rows. Orders reference existing customers and restaurants,
// deliveries reference existing orders and delivery persons, so the tables
// are filled in that order.

use crate::core::db::identifier::quote;
use crate::core::db::{ColumnDef, Record, SchemaManager, Value};
use crate::core::{DashError, Result};
use chrono::{Duration, Local, NaiveDateTime};
use fake::faker::address::en::CityName;
use fake::faker::company::en::CompanyName;
use fake::faker::internet::en::SafeEmail;
use fake::faker::name::en::Name;
use fake::faker::phone_number::en::PhoneNumber;
use fake::Fake;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rusqlite::{params_from_iter, Connection};
use tracing::{debug, info};

pub const CUSTOMERS: &str = "customers";
pub const RESTAURANTS: &str = "restaurants";
pub const DELIVERY_PERSONS: &str = "delivery_persons";
pub const ORDERS: &str = "orders";
pub const DELIVERIES: &str = "deliveries";

const CUISINES: [&str; 5] = ["Italian", "Chinese", "Indian", "Mexican", "American"];
const ORDER_STATUSES: [&str; 3] = ["Pending", "Delivered", "Cancelled"];
const PAYMENT_MODES: [&str; 3] = ["Credit Card", "Cash", "UPI"];
const VEHICLE_TYPES: [&str; 2] = ["Bike", "Car"];
const DELIVERY_STATUSES: [&str; 2] = ["On the way", "Delivered"];

/// Days of history covered by generated dates.
const HISTORY_DAYS: i64 = 2 * 365;

fn key(name: &str) -> ColumnDef {
    ColumnDef::new(name, "INT").primary().auto_increment().not_null()
}

fn text(name: &str) -> ColumnDef {
    ColumnDef::new(name, "VARCHAR(255)")
}

/// The sample tables in creation order.
pub fn initial_table_schemas() -> Vec<(&'static str, Vec<ColumnDef>)> {
    vec![
        (
            DELIVERY_PERSONS,
            vec![
                key("delivery_person_id"),
                text("name"),
                text("contact_number"),
                text("vehicle_type"),
                ColumnDef::new("total_deliveries", "INT"),
                ColumnDef::new("average_rating", "FLOAT"),
                text("location"),
            ],
        ),
        (
            CUSTOMERS,
            vec![
                key("customer_id"),
                text("name"),
                text("email"),
                text("phone"),
                text("location"),
                ColumnDef::new("signup_date", "DATE"),
                ColumnDef::new("is_premium", "BOOLEAN"),
                text("preferred_cuisine"),
                ColumnDef::new("total_orders", "INT"),
                ColumnDef::new("average_rating", "FLOAT"),
            ],
        ),
        (
            RESTAURANTS,
            vec![
                key("restaurant_id"),
                text("name"),
                text("cuisine_type"),
                text("location"),
                text("owner_name"),
                ColumnDef::new("average_delivery_time", "INT"),
                text("contact_number"),
                ColumnDef::new("rating", "FLOAT"),
                ColumnDef::new("total_orders", "INT"),
                ColumnDef::new("is_active", "BOOLEAN"),
            ],
        ),
        (
            ORDERS,
            vec![
                key("order_id"),
                ColumnDef::new("customer_id", "INT"),
                ColumnDef::new("restaurant_id", "INT"),
                ColumnDef::new("order_date", "DATETIME"),
                ColumnDef::new("delivery_time", "DATETIME"),
                text("status"),
                ColumnDef::new("total_amount", "FLOAT"),
                text("payment_mode"),
                ColumnDef::new("discount_applied", "FLOAT"),
                ColumnDef::new("feedback_rating", "FLOAT"),
            ],
        ),
        (
            DELIVERIES,
            vec![
                key("delivery_id"),
                ColumnDef::new("order_id", "INT"),
                ColumnDef::new("delivery_person_id", "INT"),
                text("delivery_status"),
                ColumnDef::new("distance", "FLOAT"),
                ColumnDef::new("delivery_time", "INT"),
                ColumnDef::new("estimated_time", "INT"),
                ColumnDef::new("delivery_fee", "FLOAT"),
                text("vehicle_type"),
            ],
        ),
    ]
}

/// Creates the sample tables that do not exist yet and returns their names.
pub fn create_initial_tables(schema: &SchemaManager) -> Result<Vec<String>> {
    let existing = schema.list_tables()?;
    let mut created = Vec::new();
    for (table, columns) in initial_table_schemas() {
        if existing.iter().any(|t| t.eq_ignore_ascii_case(table)) {
            debug!("Table '{}' already exists, skipping", table);
            continue;
        }
        schema.create_table(table, columns)?;
        created.push(table.to_string());
    }
    info!("Initial tables ready ({} created).", created.len());
    Ok(created)
}

/// Rows inserted per table by `DataGenerator::insert_data`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GenerationSummary {
    pub counts: Vec<(String, usize)>,
}

impl GenerationSummary {
    pub fn total(&self) -> usize {
        self.counts.iter().map(|(_, n)| n).sum()
    }

    pub fn count_for(&self, table: &str) -> Option<usize> {
        self.counts.iter().find(|(t, _)| t == table).map(|(_, n)| *n)
    }
}

/// Produces synthetic rows for the sample tables.
pub struct DataGenerator {
    record_count: usize,
    rng: StdRng,
    start: NaiveDateTime,
    end: NaiveDateTime,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

impl DataGenerator {
    /// `record_count` rows per table; a seed makes the output reproducible.
    pub fn new(record_count: usize, seed: Option<u64>) -> Self {
        let end = Local::now().naive_local();
        DataGenerator {
            record_count,
            rng: match seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            },
            start: end - Duration::days(HISTORY_DAYS),
            end,
        }
    }

    /// Moves the generated date window so it ends at `end`.
    pub fn ending_at(mut self, end: NaiveDateTime) -> Self {
        self.start = end - Duration::days(HISTORY_DAYS);
        self.end = end;
        self
    }

    pub fn record_count(&self) -> usize {
        self.record_count
    }

    fn pick(&mut self, options: &[&str]) -> Value {
        Value::from(*options.choose(&mut self.rng).unwrap_or(&""))
    }

    fn pick_id(&mut self, ids: &[i64]) -> Value {
        ids.choose(&mut self.rng)
            .map_or(Value::Null, |id| Value::Integer(*id))
    }

    fn rating(&mut self) -> Value {
        Value::Real(round2(self.rng.gen_range(1.0..=5.0)))
    }

    fn datetime(&mut self) -> NaiveDateTime {
        let span = (self.end - self.start).num_seconds().max(0);
        self.start + Duration::seconds(self.rng.gen_range(0..=span))
    }

    fn name(&mut self) -> Value {
        Value::Text(Name().fake_with_rng(&mut self.rng))
    }

    fn phone(&mut self) -> Value {
        Value::Text(PhoneNumber().fake_with_rng(&mut self.rng))
    }

    fn city(&mut self) -> Value {
        Value::Text(CityName().fake_with_rng(&mut self.rng))
    }

    pub fn generate_customers(&mut self) -> Vec<Record> {
        (0..self.record_count)
            .map(|_| {
                let mut row = Record::new();
                row.insert("name".into(), self.name());
                row.insert("email".into(), Value::Text(SafeEmail().fake_with_rng(&mut self.rng)));
                row.insert("phone".into(), self.phone());
                row.insert("location".into(), self.city());
                row.insert("signup_date".into(), Value::Date(self.datetime().date()));
                row.insert("is_premium".into(), Value::Bool(self.rng.gen_bool(0.5)));
                row.insert("preferred_cuisine".into(), self.pick(&CUISINES));
                row.insert("total_orders".into(), Value::Integer(self.rng.gen_range(0..=50)));
                row.insert("average_rating".into(), self.rating());
                row
            })
            .collect()
    }

    pub fn generate_restaurants(&mut self) -> Vec<Record> {
        (0..self.record_count)
            .map(|_| {
                let mut row = Record::new();
                row.insert("name".into(), Value::Text(CompanyName().fake_with_rng(&mut self.rng)));
                row.insert("cuisine_type".into(), self.pick(&CUISINES));
                row.insert("location".into(), self.city());
                row.insert("owner_name".into(), self.name());
                row.insert("average_delivery_time".into(), Value::Integer(self.rng.gen_range(20..=60)));
                row.insert("contact_number".into(), self.phone());
                row.insert("rating".into(), self.rating());
                row.insert("total_orders".into(), Value::Integer(self.rng.gen_range(0..=100)));
                row.insert("is_active".into(), Value::Bool(self.rng.gen_bool(0.5)));
                row
            })
            .collect()
    }

    pub fn generate_delivery_persons(&mut self) -> Vec<Record> {
        (0..self.record_count)
            .map(|_| {
                let mut row = Record::new();
                row.insert("name".into(), self.name());
                row.insert("contact_number".into(), self.phone());
                row.insert("vehicle_type".into(), self.pick(&VEHICLE_TYPES));
                row.insert("total_deliveries".into(), Value::Integer(self.rng.gen_range(0..=200)));
                row.insert("average_rating".into(), self.rating());
                row.insert("location".into(), self.city());
                row
            })
            .collect()
    }

    /// Orders for random existing customers and restaurants.
    pub fn generate_orders(&mut self, customer_ids: &[i64], restaurant_ids: &[i64]) -> Result<Vec<Record>> {
        if self.record_count > 0 && (customer_ids.is_empty() || restaurant_ids.is_empty()) {
            return Err(DashError::data(
                "orders need at least one customer and one restaurant",
            ));
        }
        Ok((0..self.record_count)
            .map(|_| {
                let order_date = self.datetime();
                let delivery_time = order_date + Duration::minutes(self.rng.gen_range(20..=90));
                let mut row = Record::new();
                row.insert("customer_id".into(), self.pick_id(customer_ids));
                row.insert("restaurant_id".into(), self.pick_id(restaurant_ids));
                row.insert("order_date".into(), Value::DateTime(order_date));
                row.insert("delivery_time".into(), Value::DateTime(delivery_time));
                row.insert("status".into(), self.pick(&ORDER_STATUSES));
                row.insert("total_amount".into(), Value::Real(round2(self.rng.gen_range(5.0..=100.0))));
                row.insert("payment_mode".into(), self.pick(&PAYMENT_MODES));
                row.insert("discount_applied".into(), Value::Real(round2(self.rng.gen_range(0.0..=20.0))));
                row.insert("feedback_rating".into(), self.rating());
                row
            })
            .collect())
    }

    /// Deliveries for random existing orders and delivery persons.
    pub fn generate_deliveries(&mut self, order_ids: &[i64], delivery_person_ids: &[i64]) -> Result<Vec<Record>> {
        if self.record_count > 0 && (order_ids.is_empty() || delivery_person_ids.is_empty()) {
            return Err(DashError::data(
                "deliveries need at least one order and one delivery person",
            ));
        }
        Ok((0..self.record_count)
            .map(|_| {
                let actual: i64 = self.rng.gen_range(20..=90);
                let estimated = actual + self.rng.gen_range(-5..=5);
                let mut row = Record::new();
                row.insert("order_id".into(), self.pick_id(order_ids));
                row.insert("delivery_person_id".into(), self.pick_id(delivery_person_ids));
                row.insert("delivery_status".into(), self.pick(&DELIVERY_STATUSES));
                row.insert("distance".into(), Value::Real(round2(self.rng.gen_range(1.0..=20.0))));
                row.insert("delivery_time".into(), Value::Integer(actual));
                row.insert("estimated_time".into(), Value::Integer(estimated));
                row.insert("delivery_fee".into(), Value::Real(round2(self.rng.gen_range(1.0..=10.0))));
                row.insert("vehicle_type".into(), self.pick(&VEHICLE_TYPES));
                row
            })
            .collect())
    }

    /// Generates and inserts rows into all five tables in one transaction.
    ///
    /// The tables must already exist; see `create_initial_tables`.
    pub fn insert_data(&mut self, conn: &Connection) -> Result<GenerationSummary> {
        let schema = SchemaManager::new(conn);
        for (table, _) in initial_table_schemas() {
            schema.resolve_table(table).map_err(|_| {
                DashError::schema(format!(
                    "table '{}' does not exist; create the sample tables first",
                    table
                ))
            })?;
        }

        let tx = conn.unchecked_transaction().map_err(DashError::from_dml)?;
        let mut summary = GenerationSummary::default();

        let customers = self.generate_customers();
        summary.counts.push((CUSTOMERS.to_string(), insert_rows(&tx, CUSTOMERS, &customers)?));
        let restaurants = self.generate_restaurants();
        summary.counts.push((RESTAURANTS.to_string(), insert_rows(&tx, RESTAURANTS, &restaurants)?));
        let persons = self.generate_delivery_persons();
        summary
            .counts
            .push((DELIVERY_PERSONS.to_string(), insert_rows(&tx, DELIVERY_PERSONS, &persons)?));

        let customer_ids = fetch_ids(&tx, CUSTOMERS, "customer_id")?;
        let restaurant_ids = fetch_ids(&tx, RESTAURANTS, "restaurant_id")?;
        let orders = self.generate_orders(&customer_ids, &restaurant_ids)?;
        summary.counts.push((ORDERS.to_string(), insert_rows(&tx, ORDERS, &orders)?));

        let order_ids = fetch_ids(&tx, ORDERS, "order_id")?;
        let person_ids = fetch_ids(&tx, DELIVERY_PERSONS, "delivery_person_id")?;
        let deliveries = self.generate_deliveries(&order_ids, &person_ids)?;
        summary.counts.push((DELIVERIES.to_string(), insert_rows(&tx, DELIVERIES, &deliveries)?));

        tx.commit().map_err(DashError::from_dml)?;
        info!("Data insertion complete: {} rows.", summary.total());
        Ok(summary)
    }
}

fn insert_rows(conn: &Connection, table: &str, rows: &[Record]) -> Result<usize> {
    let Some(first) = rows.first() else {
        return Ok(0);
    };
    info!("Inserting {} rows into {}...", rows.len(), table);
    let columns: Vec<String> = first.keys().map(|k| quote(k)).collect();
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote(table),
        columns.join(", "),
        placeholders.join(", ")
    );
    debug!("Executing SQL: {}", sql);

    let mut stmt = conn.prepare_cached(&sql).map_err(DashError::from_dml)?;
    for row in rows {
        stmt.execute(params_from_iter(row.values()))
            .map_err(DashError::from_dml)?;
    }
    Ok(rows.len())
}

fn fetch_ids(conn: &Connection, table: &str, column: &str) -> Result<Vec<i64>> {
    let sql = format!("SELECT {} FROM {}", quote(column), quote(table));
    let mut stmt = conn.prepare(&sql).map_err(DashError::from_dml)?;
    let ids = stmt
        .query_map([], |row| row.get::<_, i64>(0))
        .map_err(DashError::from_dml)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(DashError::from_dml)?;
    Ok(ids)
}
