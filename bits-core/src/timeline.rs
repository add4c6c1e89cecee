//! Month grouping for timeline display.

use std::collections::HashMap;

use serde::Serialize;

use crate::models::Bit;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthGroup {
    /// "Month Year", e.g. "March 2024"
    pub label: String,
    pub bits: Vec<Bit>,
}

/// Partition a sequence into one group per month label.
///
/// Groups appear in order of their label's first occurrence and each keeps
/// its bits in input order. For input already in timeline order, concatenating
/// the groups reproduces the input exactly. The label comes from the
/// effective date, so a bit without `bit_date` joins the month of its
/// `created_at`.
pub fn group_by_month<'a>(bits: impl IntoIterator<Item = &'a Bit>) -> Vec<MonthGroup> {
    let mut groups: Vec<MonthGroup> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for bit in bits {
        let label = bit.month_label();
        match index.get(&label) {
            Some(&i) => groups[i].bits.push(bit.clone()),
            None => {
                index.insert(label.clone(), groups.len());
                groups.push(MonthGroup {
                    label,
                    bits: vec![bit.clone()],
                });
            }
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, NaiveDate, TimeZone, Utc};
    use uuid::Uuid;

    fn bit(bit_date: Option<(i32, u32, u32)>, created: DateTime<Utc>) -> Bit {
        Bit {
            id: Uuid::new_v4(),
            user_id: Uuid::nil(),
            child_id: None,
            text: "moment".into(),
            context: None,
            photo_url: None,
            bit_date: bit_date.and_then(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d)),
            created_at: created,
            updated_at: created,
            child: None,
        }
    }

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_missing_bit_date_merges_with_same_month() {
        let bits = vec![
            bit(Some((2024, 3, 31)), at(2024, 4, 2)),
            bit(None, at(2024, 3, 15)),
            bit(Some((2024, 3, 1)), at(2024, 3, 1)),
        ];
        let groups = group_by_month(&bits);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].label, "March 2024");
        assert_eq!(groups[0].bits.len(), 3);
    }

    #[test]
    fn test_groups_follow_input_order() {
        let bits = vec![
            bit(Some((2024, 5, 20)), at(2024, 5, 20)),
            bit(Some((2024, 5, 2)), at(2024, 5, 2)),
            bit(Some((2024, 4, 30)), at(2024, 4, 30)),
            bit(Some((2023, 12, 25)), at(2023, 12, 25)),
        ];
        let groups = group_by_month(&bits);
        let labels: Vec<_> = groups.iter().map(|g| g.label.as_str()).collect();
        assert_eq!(labels, vec!["May 2024", "April 2024", "December 2023"]);
    }

    #[test]
    fn test_concatenated_groups_reproduce_input() {
        let bits: Vec<Bit> = (0..40)
            .map(|i| bit(None, at(2024, 12, 31) - chrono::Duration::days(i * 9)))
            .collect();
        let groups = group_by_month(&bits);
        let flattened: Vec<Uuid> = groups.iter().flat_map(|g| g.bits.iter().map(|b| b.id)).collect();
        let original: Vec<Uuid> = bits.iter().map(|b| b.id).collect();
        assert_eq!(flattened, original);
        assert!(groups.len() > 1);
    }

    #[test]
    fn test_interleaved_labels_share_one_group() {
        let march_late = bit(Some((2024, 3, 20)), at(2024, 3, 20));
        let february = bit(Some((2024, 2, 10)), at(2024, 2, 10));
        let march_early = bit(Some((2024, 3, 5)), at(2024, 3, 5));
        let groups = group_by_month(&vec![march_late.clone(), february.clone(), march_early.clone()]);

        let labels: Vec<_> = groups.iter().map(|g| g.label.as_str()).collect();
        assert_eq!(labels, vec!["March 2024", "February 2024"]);
        assert_eq!(groups[0].bits, vec![march_late, march_early]);
        assert_eq!(groups[1].bits, vec![february]);
    }

    #[test]
    fn test_same_month_different_year_is_separate() {
        let bits = vec![
            bit(Some((2024, 3, 1)), at(2024, 3, 1)),
            bit(Some((2023, 3, 1)), at(2023, 3, 1)),
        ];
        assert_eq!(group_by_month(&bits).len(), 2);
    }

    #[test]
    fn test_empty_input() {
        assert!(group_by_month(&Vec::new()).is_empty());
    }
}
