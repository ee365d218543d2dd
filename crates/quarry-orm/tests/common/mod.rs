//! Scripted repository for end-to-end tests: every statement the engine
//! issues must match a canned response exactly, and the full statement log
//! is kept in order for assertions.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use quarry_orm::{CellValue, ExecOutcome, OrmError, Repository, Result, Row};

#[derive(Default)]
pub struct MockRepository {
    responses: HashMap<String, Vec<Row>>,
    log: Mutex<Vec<String>>,
}

impl MockRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(mut self, sql: &str, rows: Vec<Row>) -> Self {
        self.responses.insert(sql.to_string(), rows);
        self
    }

    /// Every statement issued so far, in order.
    pub fn statements(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl Repository for MockRepository {
    async fn query(&self, sql: &str) -> Result<Vec<Row>> {
        self.log.lock().unwrap().push(sql.to_string());
        self.responses
            .get(sql)
            .cloned()
            .ok_or_else(|| OrmError::RepositoryContract(format!("unscripted statement: {sql}")))
    }

    async fn execute_in_transaction(&self, statements: &[String]) -> Result<Vec<ExecOutcome>> {
        let mut log = self.log.lock().unwrap();
        let mut outcomes = Vec::with_capacity(statements.len());
        for statement in statements {
            log.push(statement.clone());
            outcomes.push(ExecOutcome {
                last_insert_id: 0,
                rows_affected: 1,
            });
        }
        Ok(outcomes)
    }
}

pub fn row(pairs: &[(&str, Value)]) -> Row {
    pairs
        .iter()
        .map(|(key, value)| ((*key).to_string(), CellValue::Scalar(value.clone())))
        .collect()
}
