//! Poll creation and voting
//!
//! Vote uniqueness is enforced by the store's (poll, user) constraint inside
//! the same unit of work as the counter increment. There is no existence
//! pre-check to race against.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use super::require_user;
use crate::db::{ContentStore, NewPoll, StoreError};
use crate::error::{AppError, Result};
use crate::metrics::polls as metrics;
use crate::models::{Poll, PollOption, PollVote};

pub const MIN_OPTIONS: usize = 2;
pub const MAX_OPTIONS: usize = 4;
pub const MAX_QUESTION_LENGTH: usize = 255;
pub const MAX_OPTION_LENGTH: usize = 255;
pub const MAX_DURATION_DAYS: i32 = 365;

#[derive(Debug, Clone)]
pub struct PollDraft {
    pub question: String,
    pub options: Vec<String>,
    pub duration_days: i32,
    pub duration_hours: i32,
    pub duration_minutes: i32,
}

/// Poll with live counts and the viewer's vote state
#[derive(Debug, Clone, Serialize)]
pub struct PollView {
    #[serde(flatten)]
    pub poll: Poll,
    pub expires_at: DateTime<Utc>,
    pub is_active: bool,
    pub options: Vec<PollOption>,
    pub has_voted: bool,
}

impl PollDraft {
    /// Trimmed, validated copy ready for insertion
    fn validated(&self) -> Result<(String, Vec<String>)> {
        let question = self.question.trim();
        if question.is_empty() {
            return Err(AppError::Validation("Poll question cannot be empty".to_string()));
        }
        if question.chars().count() > MAX_QUESTION_LENGTH {
            return Err(AppError::Validation(format!(
                "Poll question must be at most {} characters",
                MAX_QUESTION_LENGTH
            )));
        }

        let options: Vec<String> = self
            .options
            .iter()
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect();
        if options.len() < MIN_OPTIONS || options.len() > MAX_OPTIONS {
            return Err(AppError::Validation(format!(
                "A poll needs between {} and {} options",
                MIN_OPTIONS, MAX_OPTIONS
            )));
        }
        if options.iter().any(|o| o.chars().count() > MAX_OPTION_LENGTH) {
            return Err(AppError::Validation(format!(
                "Poll options must be at most {} characters",
                MAX_OPTION_LENGTH
            )));
        }

        if !(0..=MAX_DURATION_DAYS).contains(&self.duration_days)
            || !(0..=23).contains(&self.duration_hours)
            || !(0..=59).contains(&self.duration_minutes)
        {
            return Err(AppError::Validation(
                format!(
                "Poll duration must use days 0-{}, hours 0-23 and minutes 0-59",
                MAX_DURATION_DAYS
            ),
            ));
        }
        if self.duration_days == 0 && self.duration_hours == 0 && self.duration_minutes == 0 {
            return Err(AppError::Validation(
                "Poll duration must be longer than zero".to_string(),
            ));
        }

        Ok((question.to_string(), options))
    }
}

pub struct PollService {
    store: Arc<dyn ContentStore>,
}

impl PollService {
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self { store }
    }

    pub async fn create_poll(
        &self,
        user_id: i64,
        draft: PollDraft,
        now: DateTime<Utc>,
    ) -> Result<PollView> {
        let (question, options) = draft.validated()?;
        require_user(&*self.store, user_id).await?;
        let (poll, options) = self
            .store
            .create_poll(&NewPoll {
                user_id,
                question,
                created_at: now,
                duration_days: draft.duration_days,
                duration_hours: draft.duration_hours,
                duration_minutes: draft.duration_minutes,
                options,
            })
            .await?;

        metrics::record_poll_created();
        info!(poll_id = poll.id, user_id, options = options.len(), "Poll created");

        Ok(PollView {
            expires_at: poll.expires_at(),
            is_active: poll.is_active(now),
            poll,
            options,
            has_voted: false,
        })
    }

    /// Cast `user_id`'s vote for `option_id`
    ///
    /// `option_id` is optional at the boundary so a missing selection maps
    /// to its own validation message.
    pub async fn vote(
        &self,
        poll_id: i64,
        option_id: Option<i64>,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<PollVote> {
        let option_id = option_id.ok_or_else(|| {
            metrics::record_vote("missing_option");
            AppError::Validation("You must select an option to vote".to_string())
        })?;

        let poll = self.poll(poll_id).await?;
        let option = self
            .store
            .option_by_id(option_id)
            .await?
            .filter(|o| o.poll_id == poll.id)
            .ok_or_else(|| {
                metrics::record_vote("unknown_option");
                AppError::NotFound("Poll option not found".to_string())
            })?;

        if !poll.is_active(now) {
            metrics::record_vote("closed");
            return Err(AppError::PollClosed);
        }

        match self.store.record_vote(poll.id, option.id, user_id, now).await {
            Ok(vote) => {
                metrics::record_vote("accepted");
                info!(poll_id, option_id, user_id, "Vote recorded");
                Ok(vote)
            }
            Err(StoreError::Duplicate(_)) => {
                metrics::record_vote("duplicate");
                Err(AppError::AlreadyVoted)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn poll_view(
        &self,
        poll_id: i64,
        viewer: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<PollView> {
        let poll = self.poll(poll_id).await?;
        let options = self.store.options_for_polls(&[poll.id]).await?;
        let has_voted = match viewer {
            Some(user_id) => !self
                .store
                .voted_poll_ids(user_id, &[poll.id])
                .await?
                .is_empty(),
            None => false,
        };

        Ok(PollView {
            expires_at: poll.expires_at(),
            is_active: poll.is_active(now),
            poll,
            options,
            has_voted,
        })
    }

    async fn poll(&self, poll_id: i64) -> Result<Poll> {
        self.store
            .poll_by_id(poll_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Poll not found".to_string()))
    }
}
