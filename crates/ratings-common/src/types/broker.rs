use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{RatingsError, Result};

/// Credibility assigned to a brokerage the first time it is seen.
pub const DEFAULT_CREDIBILITY_SCORE: f64 = 0.60;

/// A brokerage firm issuing analyst ratings.
///
/// `name` is matched verbatim (case-sensitive) against the provider's
/// brokerage strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Broker {
    pub id: Uuid,
    pub name: String,
    /// Bounded to `[0.0, 1.0]`
    pub credibility_score: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Broker {
    pub fn new(name: impl Into<String>, credibility_score: f64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            credibility_score,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(RatingsError::validation("name", "must not be empty"));
        }
        if self.name.len() > 255 {
            return Err(RatingsError::validation("name", "must be at most 255 characters"));
        }
        if !(0.0..=1.0).contains(&self.credibility_score) {
            return Err(RatingsError::validation(
                "credibility_score",
                format!("{} is outside [0, 1]", self.credibility_score),
            ));
        }
        Ok(())
    }
}
