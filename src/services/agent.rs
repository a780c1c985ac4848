use std::collections::HashMap;

use chrono::{Datelike, TimeZone, Utc};
use log::debug;
use mongodb::bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::FindOptions;
use mongodb::Database;
use rocket::futures::TryStreamExt;

use crate::db::{BOOKINGS, USERS};
use crate::models::User;
use crate::utils::ApiError;

/// `[first day of this month, first day of next month)` in UTC.
pub fn month_window(now: chrono::DateTime<Utc>) -> (chrono::DateTime<Utc>, chrono::DateTime<Utc>) {
    let (year, month) = (now.year(), now.month());
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };

    let start = Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).single().unwrap_or(now);
    let end = Utc
        .with_ymd_and_hms(next_year, next_month, 1, 0, 0, 0)
        .single()
        .unwrap_or(now);
    (start, end)
}

/// Agent with the fewest bookings; the earliest one in `agents` wins a tie.
pub fn pick_least_loaded(agents: &[ObjectId], counts: &HashMap<ObjectId, u64>) -> Option<ObjectId> {
    let mut best: Option<(ObjectId, u64)> = None;
    for agent in agents {
        let count = counts.get(agent).copied().unwrap_or(0);
        match best {
            Some((_, min)) if count >= min => {}
            _ => best = Some((*agent, count)),
        }
    }
    best.map(|(agent, _)| agent)
}

pub struct AgentService;

impl AgentService {
    /// Picks the active agent with the lightest load this month.
    pub async fn assign(db: &Database) -> Result<ObjectId, ApiError> {
        let options = FindOptions::builder().sort(doc! { "_id": 1 }).build();
        let agents: Vec<User> = db
            .collection::<User>(USERS)
            .find(doc! { "is_active": true }, options)
            .await?
            .try_collect()
            .await?;

        let agent_ids: Vec<ObjectId> = agents.iter().filter_map(|a| a.id).collect();
        if agent_ids.is_empty() {
            return Err(ApiError::internal_error("No Active Agents Available"));
        }

        let (start, end) = month_window(Utc::now());
        let pipeline = vec![
            doc! { "$match": {
                "assigned_agent_id": { "$in": agent_ids.clone() },
                "created_at": {
                    "$gte": DateTime::from_millis(start.timestamp_millis()),
                    "$lt": DateTime::from_millis(end.timestamp_millis()),
                },
            }},
            doc! { "$group": { "_id": "$assigned_agent_id", "count": { "$sum": 1 } } },
        ];

        let rows: Vec<Document> = db
            .collection::<Document>(BOOKINGS)
            .aggregate(pipeline, None)
            .await?
            .try_collect()
            .await?;

        let counts: HashMap<ObjectId, u64> = rows
            .iter()
            .filter_map(|row| {
                let id = row.get_object_id("_id").ok()?;
                let count = row.get_i32("count").map(i64::from).or_else(|_| row.get_i64("count")).ok()?;
                Some((id, count.max(0) as u64))
            })
            .collect();

        let agent = pick_least_loaded(&agent_ids, &counts)
            .ok_or_else(|| ApiError::internal_error("No Active Agents Available"))?;
        debug!("Assigned agent {} ({} bookings this month)", agent, counts.get(&agent).unwrap_or(&0));
        Ok(agent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn least_loaded_agent_is_chosen() {
        let (a, b, c) = (ObjectId::new(), ObjectId::new(), ObjectId::new());
        let counts = HashMap::from([(a, 2), (c, 1)]);
        assert_eq!(pick_least_loaded(&[a, b, c], &counts), Some(b));
    }

    #[test]
    fn tie_goes_to_first_agent() {
        let (a, b) = (ObjectId::new(), ObjectId::new());
        let counts = HashMap::from([(a, 3), (b, 3)]);
        assert_eq!(pick_least_loaded(&[a, b], &counts), Some(a));
        assert_eq!(pick_least_loaded(&[b, a], &HashMap::new()), Some(b));
    }

    #[test]
    fn no_agents_means_none() {
        assert_eq!(pick_least_loaded(&[], &HashMap::new()), None);
    }

    #[test]
    fn month_window_rolls_over_december() {
        let now = Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 59).unwrap();
        let (start, end) = month_window(now);
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 12, 1, 0, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn month_window_contains_now() {
        let now = Utc.with_ymd_and_hms(2025, 2, 14, 10, 0, 0).unwrap();
        let (start, end) = month_window(now);
        assert!(start <= now && now < end);
        assert_eq!(end, Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap());
    }
}
