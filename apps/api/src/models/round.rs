use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of pipeline stage. Only SCREENING rounds trigger background batch
/// evaluation; other kinds rely on manual re-evaluation sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoundType {
    Screening,
    Interview,
    Project,
    #[serde(other)]
    Other,
}

/// One ordered stage definition in a job's hiring pipeline.
///
/// `order_index` is unique, ascending, and gap-free within a job; exactly one
/// template has `order_index = 1`, and advancement only ever moves to
/// `order_index + 1`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundTemplate {
    pub id: Uuid,
    pub job_opening_id: Uuid,
    pub name: String,
    pub order_index: i32,
    pub round_type: RoundType,
    pub is_active: bool,
    pub is_required: bool,
}

/// Finds the template directly after `current` in pipeline order, if any.
pub fn next_template<'a>(
    templates: &'a [RoundTemplate],
    current: &RoundTemplate,
) -> Option<&'a RoundTemplate> {
    templates
        .iter()
        .find(|t| t.job_opening_id == current.job_opening_id && t.order_index == current.order_index + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_template(job: Uuid, order_index: i32, round_type: RoundType) -> RoundTemplate {
        RoundTemplate {
            id: Uuid::new_v4(),
            job_opening_id: job,
            name: format!("Stage {order_index}"),
            order_index,
            round_type,
            is_active: order_index == 1,
            is_required: true,
        }
    }

    #[test]
    fn test_next_template_is_order_index_plus_one() {
        let job = Uuid::new_v4();
        let templates = vec![
            make_template(job, 1, RoundType::Screening),
            make_template(job, 2, RoundType::Interview),
            make_template(job, 3, RoundType::Project),
        ];
        let next = next_template(&templates, &templates[0]).unwrap();
        assert_eq!(next.order_index, 2);
        assert_eq!(next.round_type, RoundType::Interview);
    }

    #[test]
    fn test_last_stage_has_no_next_template() {
        let job = Uuid::new_v4();
        let templates = vec![
            make_template(job, 1, RoundType::Screening),
            make_template(job, 2, RoundType::Interview),
        ];
        assert!(next_template(&templates, &templates[1]).is_none());
    }

    #[test]
    fn test_round_type_wire_format() {
        assert_eq!(
            serde_json::to_value(RoundType::Screening).unwrap(),
            serde_json::json!("SCREENING")
        );
        let parsed: RoundType = serde_json::from_value(serde_json::json!("CULTURE_FIT")).unwrap();
        assert_eq!(parsed, RoundType::Other);
    }
}
