// Analytics Catalog for sqldash
//
// Thirty canned questions about the food-delivery sample tables, each a
// read-only query plus the chart that suits its answer.

use crate::core::db::{QueryExecutor, QueryResult};
use crate::core::Result;
use rusqlite::Connection;
use tracing::debug;

/// The chart family an insight's answer is drawn with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartKind {
    Line,
    Bar,
    Histogram,
    Scatter,
}

/// A concrete chart style the user can switch between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartView {
    Line,
    Area,
    Bar,
    Histogram,
    Scatter,
}

impl ChartKind {
    /// The styles offered for this kind, the first one being the default.
    pub fn views(self) -> &'static [ChartView] {
        match self {
            ChartKind::Line => &[ChartView::Line, ChartView::Area],
            ChartKind::Bar => &[ChartView::Bar],
            ChartKind::Histogram => &[ChartView::Histogram],
            ChartKind::Scatter => &[ChartView::Scatter],
        }
    }
}

impl ChartView {
    pub fn name(self) -> &'static str {
        match self {
            ChartView::Line => "line",
            ChartView::Area => "area",
            ChartView::Bar => "bar",
            ChartView::Histogram => "histogram",
            ChartView::Scatter => "scatter",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        [
            ChartView::Line,
            ChartView::Area,
            ChartView::Bar,
            ChartView::Histogram,
            ChartView::Scatter,
        ]
        .into_iter()
        .find(|view| view.name().eq_ignore_ascii_case(name.trim()))
    }
}

/// One entry of the catalog.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Insight {
    pub label: &'static str,
    pub sql: &'static str,
    pub chart: ChartKind,
    pub description: &'static str,
}

// Minutes between order placement and delivery.
macro_rules! delivery_minutes {
    () => {
        "CAST(ROUND((julianday(delivery_time) - julianday(order_date)) * 1440) AS INTEGER)"
    };
}

static CATALOG: [Insight; 30] = [
    Insight {
        label: "Total orders per day",
        sql: "SELECT DATE(order_date) AS order_day, COUNT(*) AS total_orders
              FROM orders
              GROUP BY DATE(order_date)
              ORDER BY order_day",
        chart: ChartKind::Line,
        description: "Total number of orders per day.",
    },
    Insight {
        label: "Total revenue per day",
        sql: "SELECT DATE(order_date) AS order_day, SUM(total_amount) AS total_revenue
              FROM orders
              GROUP BY DATE(order_date)
              ORDER BY order_day",
        chart: ChartKind::Line,
        description: "Total revenue per day.",
    },
    Insight {
        label: "Average order value per day",
        sql: "SELECT DATE(order_date) AS order_day, AVG(total_amount) AS avg_order_value
              FROM orders
              GROUP BY DATE(order_date)
              ORDER BY order_day",
        chart: ChartKind::Line,
        description: "Average order value per day.",
    },
    Insight {
        label: "Total orders per month",
        sql: "SELECT strftime('%Y-%m', order_date) AS order_month, COUNT(*) AS total_orders
              FROM orders
              GROUP BY strftime('%Y-%m', order_date)
              ORDER BY order_month",
        chart: ChartKind::Bar,
        description: "Total orders per month.",
    },
    Insight {
        label: "Total revenue per month",
        sql: "SELECT strftime('%Y-%m', order_date) AS order_month, SUM(total_amount) AS total_revenue
              FROM orders
              GROUP BY strftime('%Y-%m', order_date)
              ORDER BY order_month",
        chart: ChartKind::Bar,
        description: "Total revenue per month.",
    },
    Insight {
        label: "Top 5 restaurants by order count",
        sql: "SELECT restaurant_id, COUNT(*) AS orders_count
              FROM orders
              GROUP BY restaurant_id
              ORDER BY orders_count DESC
              LIMIT 5",
        chart: ChartKind::Bar,
        description: "Top 5 restaurants by order count.",
    },
    Insight {
        label: "Top 5 restaurants by revenue",
        sql: "SELECT restaurant_id, SUM(total_amount) AS revenue
              FROM orders
              GROUP BY restaurant_id
              ORDER BY revenue DESC
              LIMIT 5",
        chart: ChartKind::Bar,
        description: "Top 5 restaurants by revenue.",
    },
    Insight {
        label: "Orders distribution by cuisine type",
        sql: "SELECT r.cuisine_type, COUNT(*) AS orders_count
              FROM orders o
              JOIN restaurants r ON o.restaurant_id = r.restaurant_id
              GROUP BY r.cuisine_type",
        chart: ChartKind::Bar,
        description: "Orders distribution by cuisine type.",
    },
    Insight {
        label: "Average delivery time per restaurant",
        sql: concat!(
            "SELECT restaurant_id, AVG(",
            delivery_minutes!(),
            ") AS avg_delivery_time
              FROM orders
              WHERE LOWER(status) = 'delivered'
              GROUP BY restaurant_id"
        ),
        chart: ChartKind::Bar,
        description: "Average delivery time per restaurant (in minutes).",
    },
    Insight {
        label: "Delivery status distribution",
        sql: "SELECT delivery_status, COUNT(*) AS count
              FROM deliveries
              GROUP BY delivery_status",
        chart: ChartKind::Bar,
        description: "Distribution of delivery statuses.",
    },
    Insight {
        label: "Average feedback rating per restaurant",
        sql: "SELECT restaurant_id, AVG(feedback_rating) AS avg_feedback
              FROM orders
              GROUP BY restaurant_id",
        chart: ChartKind::Bar,
        description: "Average feedback rating per restaurant.",
    },
    Insight {
        label: "Top 5 customers by order count",
        sql: "SELECT customer_id, COUNT(*) AS orders_count
              FROM orders
              GROUP BY customer_id
              ORDER BY orders_count DESC
              LIMIT 5",
        chart: ChartKind::Bar,
        description: "Top 5 customers by order count.",
    },
    Insight {
        label: "Order status distribution",
        sql: "SELECT status, COUNT(*) AS count
              FROM orders
              GROUP BY status",
        chart: ChartKind::Bar,
        description: "Order status distribution.",
    },
    Insight {
        label: "Average discount per payment mode",
        sql: "SELECT payment_mode, AVG(discount_applied) AS avg_discount
              FROM orders
              GROUP BY payment_mode",
        chart: ChartKind::Bar,
        description: "Average discount per payment mode.",
    },
    Insight {
        label: "Delivery fee distribution",
        sql: "SELECT delivery_fee, COUNT(*) AS frequency
              FROM deliveries
              GROUP BY delivery_fee
              ORDER BY delivery_fee",
        chart: ChartKind::Bar,
        description: "Delivery fee distribution.",
    },
    Insight {
        label: "Average order value by customer type",
        sql: "SELECT c.is_premium, AVG(o.total_amount) AS avg_order_value
              FROM orders o
              JOIN customers c ON o.customer_id = c.customer_id
              GROUP BY c.is_premium",
        chart: ChartKind::Bar,
        description: "Average order value by customer type (premium vs non-premium).",
    },
    Insight {
        label: "Daily customer sign-ups",
        sql: "SELECT DATE(signup_date) AS signup_day, COUNT(*) AS signups
              FROM customers
              GROUP BY DATE(signup_date)
              ORDER BY signup_day",
        chart: ChartKind::Line,
        description: "Daily customer sign-ups.",
    },
    Insight {
        label: "Orders by payment mode",
        sql: "SELECT payment_mode, COUNT(*) AS orders_count
              FROM orders
              GROUP BY payment_mode",
        chart: ChartKind::Bar,
        description: "Orders by payment mode.",
    },
    Insight {
        label: "Average feedback rating per day",
        sql: "SELECT DATE(order_date) AS order_day, AVG(feedback_rating) AS avg_feedback
              FROM orders
              GROUP BY DATE(order_date)
              ORDER BY order_day",
        chart: ChartKind::Line,
        description: "Average feedback rating per day.",
    },
    Insight {
        label: "Orders by customer location",
        sql: "SELECT c.location, COUNT(*) AS orders_count
              FROM orders o
              JOIN customers c ON o.customer_id = c.customer_id
              GROUP BY c.location
              ORDER BY orders_count DESC",
        chart: ChartKind::Bar,
        description: "Orders by customer location.",
    },
    Insight {
        label: "Average delivery distance per order",
        sql: "SELECT order_id, AVG(distance) AS avg_distance
              FROM deliveries
              GROUP BY order_id",
        chart: ChartKind::Line,
        description: "Average delivery distance per order.",
    },
    Insight {
        label: "Top 5 delivery persons by deliveries",
        sql: "SELECT delivery_person_id, COUNT(*) AS total_deliveries
              FROM deliveries
              GROUP BY delivery_person_id
              ORDER BY total_deliveries DESC
              LIMIT 5",
        chart: ChartKind::Bar,
        description: "Top 5 delivery persons by number of deliveries.",
    },
    Insight {
        label: "Average feedback rating for delivery persons",
        sql: "SELECT d.delivery_person_id, AVG(o.feedback_rating) AS avg_rating
              FROM deliveries d
              JOIN orders o ON d.order_id = o.order_id
              GROUP BY d.delivery_person_id",
        chart: ChartKind::Bar,
        description: "Average feedback rating for delivery persons.",
    },
    Insight {
        label: "Order delivery status ratio",
        sql: "SELECT status, COUNT(*) AS count
              FROM orders
              GROUP BY status",
        chart: ChartKind::Bar,
        description: "Order delivery status ratio.",
    },
    Insight {
        label: "Average difference between estimated and actual delivery time",
        sql: "SELECT order_id, (SUM(estimated_time) - SUM(delivery_time)) AS time_diff
              FROM deliveries
              GROUP BY order_id",
        chart: ChartKind::Line,
        description: "Average difference (in minutes) between estimated and actual delivery time.",
    },
    Insight {
        label: "Total revenue by restaurant cuisine type",
        sql: "SELECT r.cuisine_type, SUM(o.total_amount) AS total_revenue
              FROM orders o
              JOIN restaurants r ON o.restaurant_id = r.restaurant_id
              GROUP BY r.cuisine_type",
        chart: ChartKind::Bar,
        description: "Total revenue by restaurant cuisine type.",
    },
    Insight {
        label: "Customer order frequency distribution",
        sql: "SELECT customer_id, total_orders
              FROM customers
              ORDER BY total_orders DESC",
        chart: ChartKind::Histogram,
        description: "Customer order frequency distribution.",
    },
    Insight {
        label: "Correlation between order value and feedback",
        sql: "SELECT total_amount, feedback_rating
              FROM orders
              WHERE feedback_rating IS NOT NULL",
        chart: ChartKind::Scatter,
        description: "Correlation between order value and feedback rating.",
    },
    Insight {
        label: "Comparison of on-time vs delayed deliveries",
        sql: concat!(
            "SELECT CASE WHEN ",
            delivery_minutes!(),
            " <= 60 THEN 'On Time' ELSE 'Delayed' END AS delivery_performance,
                    COUNT(*) AS count
              FROM orders
              WHERE LOWER(status) = 'delivered'
              GROUP BY delivery_performance"
        ),
        chart: ChartKind::Bar,
        description: "Comparison of on-time versus delayed deliveries.",
    },
    Insight {
        label: "Daily average delivery time",
        sql: concat!(
            "SELECT DATE(order_date) AS order_day, AVG(",
            delivery_minutes!(),
            ") AS avg_delivery_time
              FROM orders
              WHERE LOWER(status) = 'delivered'
              GROUP BY DATE(order_date)
              ORDER BY order_day"
        ),
        chart: ChartKind::Line,
        description: "Daily average delivery time.",
    },
];

pub fn catalog() -> &'static [Insight] {
    &CATALOG
}

/// Looks an insight up by its 1-based number or by a case-insensitive
/// fragment of its label. Returns the zero-based index.
pub fn find_insight(query: &str) -> Option<usize> {
    let query = query.trim();
    if let Ok(number) = query.parse::<usize>() {
        return (1..=CATALOG.len()).contains(&number).then(|| number - 1);
    }
    let needle = query.to_lowercase();
    if needle.is_empty() {
        return None;
    }
    CATALOG
        .iter()
        .position(|insight| insight.label.to_lowercase().contains(&needle))
}

/// `order_day` -> `Order Day`.
pub fn convert_to_title(snake: &str) -> String {
    snake
        .split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Runs an insight's query and title-cases the column headers.
pub fn run_insight(conn: &Connection, insight: &Insight) -> Result<QueryResult> {
    debug!("Running insight '{}'", insight.label);
    let mut result = QueryExecutor::new(conn).execute(insight.sql)?;
    result.columns = result.columns.iter().map(|c| convert_to_title(c)).collect();
    Ok(result)
}

/// Current position in the catalog, moving with wrap-around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InsightCursor {
    index: usize,
}

impl InsightCursor {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn current(&self) -> &'static Insight {
        &CATALOG[self.index]
    }

    pub fn select(&mut self, index: usize) -> Option<&'static Insight> {
        if index < CATALOG.len() {
            self.index = index;
            Some(self.current())
        } else {
            None
        }
    }

    pub fn next(&mut self) -> &'static Insight {
        self.index = (self.index + 1) % CATALOG.len();
        self.current()
    }

    pub fn prev(&mut self) -> &'static Insight {
        self.index = (self.index + CATALOG.len() - 1) % CATALOG.len();
        self.current()
    }

    /// `Insight 3 of 30: Average order value per day`
    pub fn heading(&self) -> String {
        format!(
            "Insight {} of {}: {}",
            self.index + 1,
            CATALOG.len(),
            self.current().label
        )
    }
}
