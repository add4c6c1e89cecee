//! Timeline filters.
//!
//! A [`BitFilter`] is the client-held filter value. It lowers to a list of
//! [`Clause`]s which are ANDed together. The same clauses are evaluated
//! in-memory here and rendered as query constraints by each store, so every
//! backend agrees on membership:
//! - `search_text`: case-insensitive substring of `text`
//! - `child_id`: exact match
//! - `date_from`/`date_to`: inclusive whole-day bounds on `created_at` (UTC)
//! - `has_photo`: `Some(true)` requires a photo, `Some(false)` forbids one

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Bit;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_from: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_to: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_photo: Option<bool>,
}

/// One AND-ed constraint of a filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Clause {
    TextContains(String),
    ChildIs(Uuid),
    CreatedOnOrAfter(NaiveDate),
    CreatedOnOrBefore(NaiveDate),
    HasPhoto(bool),
}

impl Clause {
    pub fn matches(&self, bit: &Bit) -> bool {
        match self {
            Clause::TextContains(query) => bit.text.to_lowercase().contains(&query.to_lowercase()),
            Clause::ChildIs(id) => bit.child_id == Some(*id),
            Clause::CreatedOnOrAfter(from) => bit.created_at.date_naive() >= *from,
            Clause::CreatedOnOrBefore(to) => bit.created_at.date_naive() <= *to,
            Clause::HasPhoto(wanted) => bit.has_photo() == *wanted,
        }
    }
}

/// Midnight UTC starting `date`.
pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// Midnight UTC ending `date` (exclusive upper bound).
pub fn end_of_day(date: NaiveDate) -> DateTime<Utc> {
    start_of_day(date.succ_opt().unwrap_or(NaiveDate::MAX))
}

/// Escape `LIKE` wildcards so user text matches literally.
pub fn escape_like(query: &str) -> String {
    let mut out = String::with_capacity(query.len());
    for c in query.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

impl BitFilter {
    pub fn is_empty(&self) -> bool {
        self.clauses().is_empty()
    }

    /// Lower the filter into clauses. Absent fields contribute nothing and a
    /// blank search string counts as absent.
    pub fn clauses(&self) -> Vec<Clause> {
        let mut clauses = Vec::new();
        if let Some(q) = self.search_text.as_deref().map(str::trim) {
            if !q.is_empty() {
                clauses.push(Clause::TextContains(q.to_string()));
            }
        }
        if let Some(id) = self.child_id {
            clauses.push(Clause::ChildIs(id));
        }
        if let Some(from) = self.date_from {
            clauses.push(Clause::CreatedOnOrAfter(from));
        }
        if let Some(to) = self.date_to {
            clauses.push(Clause::CreatedOnOrBefore(to));
        }
        if let Some(wanted) = self.has_photo {
            clauses.push(Clause::HasPhoto(wanted));
        }
        clauses
    }

    pub fn matches(&self, bit: &Bit) -> bool {
        self.clauses().iter().all(|c| c.matches(bit))
    }

    /// Keep the bits matching this filter, preserving order.
    pub fn apply<'a>(&self, bits: impl IntoIterator<Item = &'a Bit>) -> Vec<&'a Bit> {
        let clauses = self.clauses();
        bits.into_iter()
            .filter(|bit| clauses.iter().all(|c| c.matches(bit)))
            .collect()
    }
}
