//! Node-id-set stability between the stored document and a proposed one.
//!
//! Bulk document saves may rewire nodes but not add or remove them; that goes
//! through node creation and deletion.

use std::collections::BTreeSet;

use uuid::Uuid;

use crate::error::ValidationError;
use crate::parse::node_id_strings;

/// Compare node id sets. A missing, empty, or malformed document on either
/// side is not compared.
pub fn check_id_stability(proposed: &[u8], current: &[u8]) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if current.iter().all(u8::is_ascii_whitespace) {
        return errors;
    }
    let (Some(proposed), Some(current)) = (node_id_strings(proposed), node_id_strings(current))
    else {
        return errors;
    };
    if current.is_empty() {
        return errors;
    }

    let proposed: BTreeSet<String> = proposed.into_iter().collect();
    let current: BTreeSet<String> = current.into_iter().collect();

    for added in proposed.difference(&current) {
        errors.push(ValidationError::stability(
            "S001",
            format!("Node '{}' was added outside node creation", added),
            Uuid::parse_str(added).ok(),
        ));
    }
    for removed in current.difference(&proposed) {
        errors.push(ValidationError::stability(
            "S002",
            format!("Node '{}' was removed outside node deletion", removed),
            Uuid::parse_str(removed).ok(),
        ));
    }

    errors
}
