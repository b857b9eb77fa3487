//! Database tools exposed over MCP
//!
//! Five tools with explicit input schemas. Every failure is returned as a
//! `{"success": false, "error": ...}` payload so the model can see it and
//! react; protocol errors are reserved for malformed requests.

use serde_json::{json, Value};

use dbchat_mcp::server::McpHandler;
use dbchat_mcp::McpTool;

use crate::database::{query_rows, Database};

/// The tool catalog this backend advertises.
pub fn tool_definitions() -> Vec<McpTool> {
    vec![
        McpTool {
            name: "execute_sql_query".to_string(),
            description: "Run a SQL query against the database. SELECT and PRAGMA \
                          statements return rows; other statements return the \
                          affected row count."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "SQL statement to execute"},
                    "parameters": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Positional parameters bound to ? placeholders"
                    }
                },
                "required": ["query"]
            }),
        },
        McpTool {
            name: "get_database_schema".to_string(),
            description: "Get the database structure: every table with its DDL and columns."
                .to_string(),
            input_schema: json!({"type": "object", "properties": {}}),
        },
        McpTool {
            name: "get_table_info".to_string(),
            description: "Analyze one table: columns, column count and row count.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "table_name": {"type": "string", "description": "Name of the table"}
                },
                "required": ["table_name"]
            }),
        },
        McpTool {
            name: "insert_user".to_string(),
            description: "Add a new user with validation (non-empty name, valid email, \
                          age between 1 and 150)."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "name": {"type": "string"},
                    "email": {"type": "string"},
                    "age": {"type": "integer"}
                },
                "required": ["name", "email", "age"]
            }),
        },
        McpTool {
            name: "search_users".to_string(),
            description: "Find users by name/email substring and age bounds, ordered by \
                          name. Limit defaults to 10, capped at 100."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "search_term": {"type": "string", "description": "Substring matched against name and email"},
                    "min_age": {"type": "integer"},
                    "max_age": {"type": "integer"},
                    "limit": {"type": "integer"}
                }
            }),
        },
    ]
}

pub fn execute_sql_query(db: &Database, query: &str, parameters: &[String]) -> Value {
    let conn = db.conn();
    let head = query.trim_start().to_uppercase();

    if head.starts_with("SELECT") || head.starts_with("PRAGMA") {
        match query_rows(&conn, query, rusqlite::params_from_iter(parameters.iter())) {
            Ok(data) => {
                let row_count = data.len();
                json!({
                    "success": true,
                    "data": data,
                    "row_count": row_count,
                    "query": query,
                    "parameters": parameters,
                })
            }
            Err(e) => sql_error(e, query, parameters),
        }
    } else {
        match conn.execute(query, rusqlite::params_from_iter(parameters.iter())) {
            Ok(affected) => json!({
                "success": true,
                "rows_affected": affected,
                "message": "Query executed successfully",
                "query": query,
                "parameters": parameters,
            }),
            Err(e) => sql_error(e, query, parameters),
        }
    }
}

fn sql_error(e: rusqlite::Error, query: &str, parameters: &[String]) -> Value {
    json!({
        "success": false,
        "error": format!("SQLite error: {}", e),
        "query": query,
        "parameters": parameters,
    })
}

pub fn get_database_schema(db: &Database) -> Value {
    let conn = db.conn();

    let tables = query_rows(
        &conn,
        "SELECT name, sql FROM sqlite_master
         WHERE type='table' AND name NOT LIKE 'sqlite_%'
         ORDER BY name",
        [],
    );
    let tables = match tables {
        Ok(rows) => rows,
        Err(e) => return json!({"success": false, "error": format!("Error getting schema: {}", e)}),
    };

    let mut described = Vec::with_capacity(tables.len());
    for table in tables {
        let name = table["name"].as_str().unwrap_or_default().to_string();
        let columns = match query_rows(&conn, &format!("PRAGMA table_info({})", name), []) {
            Ok(columns) => columns,
            Err(e) => {
                return json!({"success": false, "error": format!("Error getting schema: {}", e)})
            }
        };
        described.push(json!({
            "name": name,
            "sql": table["sql"],
            "columns": columns,
        }));
    }

    json!({
        "success": true,
        "database_path": db.path(),
        "table_count": described.len(),
        "tables": described,
    })
}

pub fn get_table_info(db: &Database, table_name: &str) -> Value {
    let conn = db.conn();

    let exists: bool = conn
        .query_row(
            "SELECT name FROM sqlite_master WHERE type='table' AND name=?",
            [table_name],
            |_| Ok(true),
        )
        .unwrap_or(false);
    if !exists {
        return json!({
            "success": false,
            "error": format!("Table '{}' does not exist", table_name),
        });
    }

    let columns = match query_rows(&conn, &format!("PRAGMA table_info({})", table_name), []) {
        Ok(columns) => columns,
        Err(e) => {
            return json!({
                "success": false,
                "error": format!("Error getting table info: {}", e),
                "table_name": table_name,
            })
        }
    };

    let row_count: i64 = match conn.query_row(
        &format!("SELECT COUNT(*) FROM {}", table_name),
        [],
        |row| row.get(0),
    ) {
        Ok(count) => count,
        Err(e) => {
            return json!({
                "success": false,
                "error": format!("Error getting table info: {}", e),
                "table_name": table_name,
            })
        }
    };

    json!({
        "success": true,
        "table_name": table_name,
        "column_count": columns.len(),
        "columns": columns,
        "row_count": row_count,
    })
}

pub fn insert_user(db: &Database, name: &str, email: &str, age: i64) -> Value {
    let name = name.trim();
    let email = email.trim();

    if name.is_empty() {
        return json!({"success": false, "error": "Name cannot be empty"});
    }
    if email.is_empty() || !email.contains('@') {
        return json!({"success": false, "error": "Invalid email address"});
    }
    if !(1..=150).contains(&age) {
        return json!({"success": false, "error": "Age must be between 1 and 150"});
    }

    let conn = db.conn();
    match conn.execute(
        "INSERT INTO users (name, email, age) VALUES (?, ?, ?)",
        rusqlite::params![name, email, age],
    ) {
        Ok(_) => {
            let user_id = conn.last_insert_rowid();
            json!({
                "success": true,
                "message": "User created successfully",
                "user_id": user_id,
                "user": {"id": user_id, "name": name, "email": email, "age": age},
            })
        }
        Err(e) => {
            let message = e.to_string();
            if message.contains("UNIQUE constraint failed") {
                json!({
                    "success": false,
                    "error": format!("Email '{}' is already registered", email),
                })
            } else {
                json!({"success": false, "error": format!("Database error: {}", message)})
            }
        }
    }
}

pub fn search_users(
    db: &Database,
    search_term: Option<&str>,
    min_age: Option<i64>,
    max_age: Option<i64>,
    limit: i64,
) -> Value {
    use rusqlite::types::Value as SqlValue;

    let limit = limit.min(100);
    let mut conditions: Vec<&str> = Vec::new();
    let mut params: Vec<SqlValue> = Vec::new();

    if let Some(term) = search_term {
        conditions.push("(name LIKE ? OR email LIKE ?)");
        let pattern = format!("%{}%", term);
        params.push(SqlValue::Text(pattern.clone()));
        params.push(SqlValue::Text(pattern));
    }
    if let Some(min) = min_age {
        conditions.push("age >= ?");
        params.push(SqlValue::Integer(min));
    }
    if let Some(max) = max_age {
        conditions.push("age <= ?");
        params.push(SqlValue::Integer(max));
    }

    let mut query = "SELECT * FROM users".to_string();
    if !conditions.is_empty() {
        query.push_str(" WHERE ");
        query.push_str(&conditions.join(" AND "));
    }
    query.push_str(" ORDER BY name LIMIT ?");
    params.push(SqlValue::Integer(limit));

    let conn = db.conn();
    match query_rows(&conn, &query, rusqlite::params_from_iter(params)) {
        Ok(users) => {
            let count = users.len();
            json!({
                "success": true,
                "count": count,
                "users": users,
                "search_criteria": {
                    "search_term": search_term,
                    "min_age": min_age,
                    "max_age": max_age,
                    "limit": limit,
                },
            })
        }
        Err(e) => json!({"success": false, "error": format!("Search error: {}", e)}),
    }
}

/// MCP handler dispatching tool calls to the database.
pub struct DatabaseHandler {
    db: Database,
}

impl DatabaseHandler {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

impl McpHandler for DatabaseHandler {
    async fn list_tools(&self) -> Vec<McpTool> {
        tool_definitions()
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, String> {
        match name {
            "execute_sql_query" => {
                let query = require_str(&arguments, "query")?;
                let parameters: Vec<String> = arguments
                    .get("parameters")
                    .and_then(|v| serde_json::from_value(v.clone()).ok())
                    .unwrap_or_default();
                Ok(execute_sql_query(&self.db, query, &parameters))
            }
            "get_database_schema" => Ok(get_database_schema(&self.db)),
            "get_table_info" => {
                let table_name = require_str(&arguments, "table_name")?;
                Ok(get_table_info(&self.db, table_name))
            }
            "insert_user" => {
                let user_name = require_str(&arguments, "name")?;
                let email = require_str(&arguments, "email")?;
                let age = arguments
                    .get("age")
                    .and_then(|v| v.as_i64())
                    .ok_or("missing required argument: age")?;
                Ok(insert_user(&self.db, user_name, email, age))
            }
            "search_users" => {
                let search_term = arguments.get("search_term").and_then(|v| v.as_str());
                let min_age = arguments.get("min_age").and_then(|v| v.as_i64());
                let max_age = arguments.get("max_age").and_then(|v| v.as_i64());
                let limit = arguments
                    .get("limit")
                    .and_then(|v| v.as_i64())
                    .unwrap_or(10);
                Ok(search_users(&self.db, search_term, min_age, max_age, limit))
            }
            other => Err(format!("Unknown tool: {}", other)),
        }
    }
}

fn require_str<'a>(arguments: &'a Value, key: &str) -> Result<&'a str, String> {
    arguments
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| format!("missing required argument: {}", key))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> Database {
        let db = Database::in_memory().unwrap();
        db.initialize().unwrap();
        db
    }

    #[test]
    fn select_returns_rows_and_count() {
        let db = seeded();
        let result = execute_sql_query(&db, "SELECT * FROM users ORDER BY name", &[]);

        assert_eq!(result["success"], true);
        assert_eq!(result["row_count"], 5);
        assert_eq!(result["data"][0]["name"], "Alice Johnson");
    }

    #[test]
    fn parameterized_select_binds_values() {
        let db = seeded();
        let result = execute_sql_query(
            &db,
            "SELECT name FROM users WHERE email = ?",
            &["bob@example.com".to_string()],
        );

        assert_eq!(result["row_count"], 1);
        assert_eq!(result["data"][0]["name"], "Bob Smith");
    }

    #[test]
    fn write_statements_report_rows_affected() {
        let db = seeded();
        let result = execute_sql_query(&db, "UPDATE users SET age = age + 1", &[]);

        assert_eq!(result["success"], true);
        assert_eq!(result["rows_affected"], 5);
    }

    #[test]
    fn sql_errors_become_payloads() {
        let db = seeded();
        let result = execute_sql_query(&db, "SELECT * FROM missing_table", &[]);

        assert_eq!(result["success"], false);
        assert!(result["error"].as_str().unwrap().contains("SQLite error"));
        assert_eq!(result["query"], "SELECT * FROM missing_table");
    }

    #[test]
    fn schema_lists_users_table() {
        let db = seeded();
        let result = get_database_schema(&db);

        assert_eq!(result["success"], true);
        assert_eq!(result["table_count"], 1);
        assert_eq!(result["tables"][0]["name"], "users");
        assert!(!result["tables"][0]["columns"].as_array().unwrap().is_empty());
    }

    #[test]
    fn table_info_reports_columns_and_rows() {
        let db = seeded();
        let result = get_table_info(&db, "users");

        assert_eq!(result["success"], true);
        assert_eq!(result["column_count"], 5);
        assert_eq!(result["row_count"], 5);
    }

    #[test]
    fn table_info_for_missing_table_is_an_error() {
        let db = seeded();
        let result = get_table_info(&db, "orders");

        assert_eq!(result["success"], false);
        assert!(result["error"].as_str().unwrap().contains("does not exist"));
    }

    #[test]
    fn insert_user_validates_and_inserts() {
        let db = seeded();

        let result = insert_user(&db, "  Frank Green  ", "frank@example.com", 50);
        assert_eq!(result["success"], true);
        assert_eq!(result["user"]["name"], "Frank Green");

        assert_eq!(insert_user(&db, "", "x@example.com", 30)["error"], "Name cannot be empty");
        assert_eq!(
            insert_user(&db, "X", "not-an-email", 30)["error"],
            "Invalid email address"
        );
        assert_eq!(
            insert_user(&db, "X", "x@example.com", 0)["error"],
            "Age must be between 1 and 150"
        );
        assert_eq!(
            insert_user(&db, "X", "x@example.com", 151)["error"],
            "Age must be between 1 and 150"
        );
    }

    #[test]
    fn duplicate_email_gets_a_friendly_error() {
        let db = seeded();
        let result = insert_user(&db, "Another Alice", "alice@example.com", 30);

        assert_eq!(result["success"], false);
        assert!(result["error"]
            .as_str()
            .unwrap()
            .contains("already registered"));
    }

    #[test]
    fn search_filters_by_term_and_age() {
        let db = seeded();

        let result = search_users(&db, Some("alice"), None, None, 10);
        assert_eq!(result["count"], 1);
        assert_eq!(result["users"][0]["email"], "alice@example.com");

        let result = search_users(&db, None, Some(30), Some(40), 10);
        assert_eq!(result["count"], 2);

        let result = search_users(&db, None, None, None, 2);
        assert_eq!(result["count"], 2);
        // Ordered by name.
        assert_eq!(result["users"][0]["name"], "Alice Johnson");

        let result = search_users(&db, None, None, None, 1000);
        assert_eq!(result["search_criteria"]["limit"], 100);
    }

    #[tokio::test]
    async fn handler_dispatches_and_rejects_unknown_tools() {
        let handler = DatabaseHandler::new(seeded());

        let tools = handler.list_tools().await;
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "execute_sql_query",
                "get_database_schema",
                "get_table_info",
                "insert_user",
                "search_users"
            ]
        );

        let result = handler
            .call_tool(
                "execute_sql_query",
                serde_json::json!({"query": "SELECT COUNT(*) AS n FROM users"}),
            )
            .await
            .unwrap();
        assert_eq!(result["data"][0]["n"], 5);

        let err = handler
            .call_tool("drop_everything", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(err.contains("Unknown tool"));

        let err = handler
            .call_tool("get_table_info", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(err.contains("table_name"));
    }
}
