//! Vacating notices. An active notice is what lets a new tenant book a unit
//! that is still occupied.

use crate::models::{new_id, Notice, NoticeStatus, Occupation, OccupationChange, OccupationStatus};
use crate::services::metrics::OCCUPATIONS_TOTAL;
use crate::services::store::{NoticeStore, OccupationStore};
use anyhow::anyhow;
use chrono::{NaiveDate, Utc};
use service_core::error::AppError;
use std::sync::Arc;
use tracing::{info, instrument, warn};

#[derive(Clone)]
pub struct NoticeService {
    notices: Arc<dyn NoticeStore>,
    occupations: Arc<dyn OccupationStore>,
}

impl NoticeService {
    pub fn new(notices: Arc<dyn NoticeStore>, occupations: Arc<dyn OccupationStore>) -> Self {
        Self {
            notices,
            occupations,
        }
    }

    pub async fn find_active_notice_for(
        &self,
        occupation_id: &str,
    ) -> Result<Option<Notice>, AppError> {
        self.notices.find_active_notice(occupation_id).await
    }

    /// File a notice on a current tenancy and move it to PENDING_VACATING.
    #[instrument(skip(self))]
    pub async fn give_notice(
        &self,
        occupation_id: &str,
        notice_date: NaiveDate,
        vacating_date: NaiveDate,
    ) -> Result<(Occupation, Notice), AppError> {
        let occupation = self
            .occupations
            .find_occupation(occupation_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(anyhow!(
                    "Occupation with id {} does not exist!",
                    occupation_id
                ))
            })?;

        if occupation.status != OccupationStatus::Current {
            return Err(AppError::BadRequest(anyhow!(
                "Occupation {} is {} and cannot give notice!",
                occupation.id,
                occupation.status
            )));
        }
        if vacating_date < notice_date {
            return Err(AppError::BadRequest(anyhow!(
                "Vacating date {} cannot be before notice date {}!",
                vacating_date,
                notice_date
            )));
        }
        if self
            .notices
            .find_active_notice(&occupation.id)
            .await?
            .is_some()
        {
            return Err(AppError::BadRequest(anyhow!(
                "Occupation {} already has an active notice!",
                occupation.id
            )));
        }

        let notice = Notice {
            id: new_id(),
            occupation_id: occupation.id.clone(),
            status: NoticeStatus::AwaitingExit,
            notice_date,
            vacating_date,
            created_on: Utc::now(),
            modified_on: None,
        };
        self.notices.insert_notice(&notice).await?;

        let moved = self
            .occupations
            .transition_occupation(
                &occupation.id,
                &[OccupationStatus::Current],
                &OccupationChange::notice_given(&occupation.unit_id),
            )
            .await?;

        let Some(occupation) = moved else {
            warn!(notice_id = %notice.id, "Occupation changed while notice was filed");
            self.notices
                .set_notice_status(&notice.id, NoticeStatus::Cancelled)
                .await?;
            return Err(AppError::RaceLost(anyhow!(
                "Occupation {} changed while the notice was filed, try again!",
                occupation_id
            )));
        };

        OCCUPATIONS_TOTAL.with_label_values(&["notice"]).inc();
        info!(notice_id = %notice.id, vacating_date = %notice.vacating_date, "Notice given");
        Ok((occupation, notice))
    }

    /// Move the occupation's active notice, if it has one, to `status`.
    pub async fn settle_active_notice(
        &self,
        occupation_id: &str,
        status: NoticeStatus,
    ) -> Result<(), AppError> {
        if let Some(notice) = self.notices.find_active_notice(occupation_id).await? {
            self.notices.set_notice_status(&notice.id, status).await?;
            info!(notice_id = %notice.id, status = status.as_str(), "Notice settled");
        }
        Ok(())
    }
}
