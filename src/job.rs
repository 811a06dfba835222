//! Relation jobs parsed from input lines.

use crate::graph::EntityType;
use crate::{RelmapError, Result};

/// One unit of work: resolve the accounts related to `entity_type`/`entity_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationJob {
    pub entity_type: EntityType,
    pub entity_id: String,
}

impl RelationJob {
    /// Parse `type,id`. Exactly two comma-separated fields are required.
    pub fn parse(line: &str) -> Result<Self> {
        let fields: Vec<&str> = line.split(',').collect();
        let [entity_type, entity_id] = fields.as_slice() else {
            return Err(RelmapError::MalformedLine(line.to_string()));
        };

        Ok(Self {
            entity_type: entity_type.parse()?,
            entity_id: entity_id.to_string(),
        })
    }

    /// Output record for one resolved account: `type,id,accountId`.
    pub fn relation_line(&self, account_id: &str) -> String {
        format!("{},{},{}", self.entity_type, self.entity_id, account_id)
    }
}
