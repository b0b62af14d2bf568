//! Walkthrough of the fluent builder on a `users` / `orders` schema.
//!
//! Run with: cargo run --example users -p fluentdb
//!
//! Set the connection in a .env file or the environment:
//! FLUENTDB_HOST=localhost
//! FLUENTDB_USER=postgres
//! FLUENTDB_PASSWORD=postgres
//! FLUENTDB_DATABASE=fluentdb_example

use colored::Colorize;
use comfy_table::{Attribute, Cell, Color, ContentArrangement, Table, presets::UTF8_FULL};
use fluentdb::{DbError, Direction, Row, Session, SessionConfig, Value, record};

fn print_header(title: &str) {
    println!();
    println!("{}", format!("== {title} ==").bold().cyan());
}

fn print_info(message: &str) {
    println!("{} {message}", "->".blue());
}

fn cell_text(value: &Value) -> String {
    match value.as_str() {
        Some(s) => s.to_string(),
        None => value.to_string(),
    }
}

fn rows_table(rows: &[Row]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    if let Some(first) = rows.first() {
        table.set_header(
            first
                .column_names()
                .map(|name| Cell::new(name).add_attribute(Attribute::Bold).fg(Color::Cyan))
                .collect::<Vec<_>>(),
        );
    }
    for row in rows {
        table.add_row(
            row.iter()
                .map(|(_, value)| Cell::new(cell_text(value)))
                .collect::<Vec<_>>(),
        );
    }
    table
}

async fn setup_schema(session: &Session) -> Result<(), DbError> {
    for statement in [
        "DROP TABLE IF EXISTS orders",
        "DROP TABLE IF EXISTS users",
        "CREATE TABLE users (
            id SERIAL PRIMARY KEY,
            name TEXT NOT NULL,
            age INT,
            status TEXT NOT NULL DEFAULT 'active',
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )",
        "CREATE TABLE orders (
            id SERIAL PRIMARY KEY,
            user_id INT NOT NULL REFERENCES users (id),
            total NUMERIC(10, 2) NOT NULL
        )",
    ] {
        session.raw_query(statement).await?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), DbError> {
    dotenvy::dotenv().ok();

    let session = Session::connect(SessionConfig::from_env()?.debug(true)).await?;
    setup_schema(&session).await?;

    print_header("Insert");
    let mut ids = Vec::new();
    for (name, age) in [("Jane", 30), ("John", 25), ("Maria", 41), ("Omar", 67)] {
        let id = session
            .table("users")
            .insert(record! { "name" => name, "age" => age })
            .await?;
        print_info(&format!("inserted {name} with id {id}"));
        ids.push(id);
    }
    for (user, total) in [(0, "19.90"), (0, "5.00"), (2, "42.50")] {
        session
            .table("orders")
            .insert(record! { "user_id" => &ids[user], "total" => total })
            .await?;
    }

    print_header("Find by primary key");
    if let Some(row) = session.table("users").find(&ids[0]).await? {
        println!("{}", rows_table(&[row]));
    }

    print_header("Filtered, ordered, limited");
    let rows = session
        .table("users")
        .select(["id", "name", "age"])
        .eq("status", "active")
        .gt("age", 25)
        .lt("age", 65)
        .order_by("age", Direction::Desc)
        .limit(10)
        .find_many()
        .await?;
    println!("{}", rows_table(&rows));

    print_header("Update and delete");
    let updated = session
        .table("users")
        .eq("name", "Omar")
        .update(record! { "status" => "inactive" })
        .await?;
    print_info(&format!("updated {updated} row(s)"));

    let deleted = session.table("users").eq("status", "inactive").delete().await?;
    print_info(&format!("deleted {deleted} row(s)"));

    print_header("Aggregates");
    let users = || session.table("users");
    print_info(&format!("max age: {}", users().max("age").await?));
    print_info(&format!("avg age: {:.1}", users().avg("age").await?));
    print_info(&format!("sum age: {}", users().sum("age").await?));
    print_info(&format!("users older than 26: {}", users().gt("age", 26).count().await?));

    print_header("Join and group");
    let rows = session
        .table("users")
        .select(["users.name", "COUNT(orders.id) AS orders", "SUM(orders.total) AS spent"])
        .join("orders", "orders.user_id", "users.id")
        .group_by("users.name")
        .find_many()
        .await?;
    println!("{}", rows_table(&rows));

    print_header("Transaction");
    let result = fluentdb::transaction!(session, {
        session
            .table("users")
            .insert(record! { "name" => "Temp", "age" => 99 })
            .await?;
        Err::<(), DbError>(DbError::config("rolled back on purpose"))
    });
    if let Err(err) = result {
        print_info(&format!("transaction aborted: {err}"));
    }
    print_info(&format!(
        "users named Temp: {}",
        session.table("users").eq("name", "Temp").count().await?
    ));

    print_header("Query log");
    for (i, sql) in session.query_log().iter().enumerate() {
        println!("{:>3}. {}", i + 1, sql.as_str().dimmed());
    }

    session.close().await
}
