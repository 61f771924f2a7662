//! Family address terms for the prompt.

use serde::Serialize;
use tracing::warn;

use crate::error::Degradation;
use crate::records::RecordStore;

/// Most relationship rows used per request.
pub const FAMILY_LIMIT: usize = 10;

/// Rendered in place of family lines when none are known.
pub const NO_FAMILY_PLACEHOLDER: &str = "no information available";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FamilyMember {
    pub relation: String,
    pub calling_name: String,
}

/// Up to [`FAMILY_LIMIT`] members for the pair, in storage order.
///
/// A storage failure yields an empty list plus [`Degradation::Relationship`].
pub async fn resolve_family(
    store: &dyn RecordStore,
    family_id: i64,
    user_id: i64,
) -> (Vec<FamilyMember>, Option<Degradation>) {
    match store.relationships(family_id, user_id, FAMILY_LIMIT).await {
        Ok(rows) => (
            rows.into_iter()
                .map(|r| FamilyMember {
                    relation: r.relation,
                    calling_name: r.calling_name,
                })
                .collect(),
            None,
        ),
        Err(e) => {
            warn!(family_id, user_id, error = %e, "relationship lookup failed");
            (Vec::new(), Some(Degradation::Relationship))
        }
    }
}

pub fn render_family_lines(members: &[FamilyMember]) -> String {
    if members.is_empty() {
        return NO_FAMILY_PLACEHOLDER.to_string();
    }
    members
        .iter()
        .map(|m| format!("{} is called \"{}\"", m.relation, m.calling_name))
        .collect::<Vec<_>>()
        .join("\n")
}
