//! Translate [`Condition`] values into DynamoDB expressions
//!
//! DynamoDB rejects placeholders that a request declares but never uses, so
//! names and values are only registered as the expression text references
//! them.

use super::schema::{ATTR_HEALTH_CODE, ATTR_IDENTIFIER, ATTR_RESERVATION, ATTR_STUDY_ID};
use aws_sdk_dynamodb::types::AttributeValue;
use extid_core::{Condition, Predicate};
use std::collections::HashMap;

/// Accumulates expression attribute names and values for one request
#[derive(Debug, Default)]
pub(crate) struct ExpressionBuilder {
    names: HashMap<String, String>,
    values: HashMap<String, AttributeValue>,
}

fn placeholder(attr: &str) -> &'static str {
    match attr {
        ATTR_STUDY_ID => "#sid",
        ATTR_IDENTIFIER => "#id",
        ATTR_HEALTH_CODE => "#hc",
        _ => "#res",
    }
}

impl ExpressionBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Reference an attribute name
    fn name(&mut self, attr: &str) -> &'static str {
        let ph = placeholder(attr);
        self.names.insert(ph.to_string(), attr.to_string());
        ph
    }

    /// Bind a value, returning its placeholder
    fn value(&mut self, value: AttributeValue) -> String {
        let ph = format!(":v{}", self.values.len());
        self.values.insert(ph.clone(), value);
        ph
    }

    /// Key condition selecting one study, optionally narrowed to an identifier prefix
    pub(crate) fn key_condition(&mut self, study_id: &str, prefix: Option<&str>) -> String {
        let sid = self.name(ATTR_STUDY_ID);
        let sid_value = self.value(AttributeValue::S(study_id.to_string()));
        match prefix {
            Some(prefix) => {
                let id = self.name(ATTR_IDENTIFIER);
                let prefix_value = self.value(AttributeValue::S(prefix.to_string()));
                format!("{} = {} AND begins_with({}, {})", sid, sid_value, id, prefix_value)
            }
            None => format!("{} = {}", sid, sid_value),
        }
    }

    fn predicate(&mut self, predicate: &Predicate) -> String {
        match *predicate {
            Predicate::Exists => format!("attribute_exists({})", self.name(ATTR_STUDY_ID)),
            Predicate::HealthCodeAbsent => {
                format!("attribute_not_exists({})", self.name(ATTR_HEALTH_CODE))
            }
            Predicate::HealthCodePresent => {
                format!("attribute_exists({})", self.name(ATTR_HEALTH_CODE))
            }
            Predicate::LeaseTakenBefore(threshold) => {
                let res = self.name(ATTR_RESERVATION);
                let t = self.value(AttributeValue::N(threshold.to_string()));
                format!("(attribute_not_exists({res}) OR {res} < {t})")
            }
            Predicate::LeaseTakenSince(threshold) => {
                let res = self.name(ATTR_RESERVATION);
                let t = self.value(AttributeValue::N(threshold.to_string()));
                format!("{res} >= {t}")
            }
        }
    }

    /// Render a condition. `None` means "always true", which DynamoDB
    /// expresses by omitting the expression.
    pub(crate) fn condition(&mut self, condition: &Condition) -> Option<String> {
        let (joiner, predicates) = match condition {
            Condition::All(predicates) => (" AND ", predicates),
            Condition::Any(predicates) => (" OR ", predicates),
        };
        if predicates.is_empty() {
            return match condition {
                Condition::All(_) => None,
                // Unsatisfiable
                Condition::Any(_) => {
                    let sid = self.name(ATTR_STUDY_ID);
                    Some(format!(
                        "(attribute_exists({sid}) AND attribute_not_exists({sid}))"
                    ))
                }
            };
        }
        let parts: Vec<String> = predicates.iter().map(|p| self.predicate(p)).collect();
        if parts.len() == 1 {
            return parts.into_iter().next();
        }
        Some(format!("({})", parts.join(joiner)))
    }

    /// Names for `set_expression_attribute_names`; `None` when empty
    pub(crate) fn names(&self) -> Option<HashMap<String, String>> {
        (!self.names.is_empty()).then(|| self.names.clone())
    }

    /// Values for `set_expression_attribute_values`; `None` when empty
    pub(crate) fn values(&self) -> Option<HashMap<String, AttributeValue>> {
        (!self.values.is_empty()).then(|| self.values.clone())
    }
}
