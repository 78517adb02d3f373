// src/services/campaigns.rs

use std::collections::{BTreeSet, HashSet};

use uuid::Uuid;

use super::Platform;
use crate::{
    campaign::{render_body, Audience, CampaignStatus, EmailCampaign, NewCampaign},
    error::{Error, Result},
    lifecycle::CertificateStatus,
    mailer::OutgoingEmail,
    month::Month,
    store::{CertificateFilter, QualificationFilter},
    user::Role,
};

impl Platform {
    pub async fn create_campaign(&self, admin_id: Uuid, input: NewCampaign) -> Result<EmailCampaign> {
        for (field, value) in [("name", &input.name), ("subject", &input.subject), ("body", &input.body)] {
            if value.trim().is_empty() {
                return Err(Error::invalid(format!("campaign {} is required", field)));
            }
        }

        let campaign = EmailCampaign {
            id: Uuid::new_v4(),
            name: input.name.trim().to_string(),
            subject: input.subject.trim().to_string(),
            body: input.body,
            audience: input.audience,
            status: CampaignStatus::Draft,
            recipient_count: 0,
            failed_count: 0,
            created_by: admin_id,
            created_at: self.now(),
            sent_at: None,
        };
        self.store().save_campaign(&campaign).await?;

        tracing::info!(campaign_id = %campaign.id, name = %campaign.name, "campaign drafted");
        Ok(campaign)
    }

    pub async fn list_campaigns(&self) -> Result<Vec<EmailCampaign>> {
        self.store().list_campaigns().await
    }

    /// Delivers a draft to its audience. Individual delivery failures are
    /// counted, not fatal.
    pub async fn send_campaign(&self, campaign_id: Uuid) -> Result<EmailCampaign> {
        let mut campaign = self
            .store()
            .get_campaign(campaign_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("campaign {}", campaign_id)))?;
        if campaign.status != CampaignStatus::Draft {
            return Err(Error::conflict("campaign was already sent"));
        }

        let recipients = self.recipients(&campaign.audience).await?;
        let mut failed = 0;
        for email in &recipients {
            let message = OutgoingEmail::new(email.as_str(), campaign.subject.as_str(), render_body(&campaign.body, email));
            if let Err(e) = self.mailer.send(&message).await {
                tracing::warn!(campaign_id = %campaign.id, to = %email, error = %e, "campaign delivery failed");
                failed += 1;
            }
        }

        campaign.status = CampaignStatus::Sent;
        campaign.recipient_count = recipients.len() as i64;
        campaign.failed_count = failed;
        campaign.sent_at = Some(self.now());
        self.store().save_campaign(&campaign).await?;

        tracing::info!(
            campaign_id = %campaign.id,
            recipients = campaign.recipient_count,
            failed,
            "campaign sent"
        );
        Ok(campaign)
    }

    async fn recipients(&self, audience: &Audience) -> Result<BTreeSet<String>> {
        match audience {
            Audience::AllMembers => self.emails_of(Role::Member).await,
            Audience::AllMerchants => self.emails_of(Role::Merchant).await,
            Audience::MembersMissingSurvey { month } => self.members_missing_survey(*month).await,
        }
    }

    async fn emails_of(&self, role: Role) -> Result<BTreeSet<String>> {
        Ok(self
            .store()
            .list_users(Some(role))
            .await?
            .into_iter()
            .map(|u| u.email)
            .collect())
    }

    async fn members_missing_survey(&self, month: Month) -> Result<BTreeSet<String>> {
        let answered: HashSet<Uuid> = self
            .store()
            .list_qualifications(&QualificationFilter {
                month: Some(month),
                ..Default::default()
            })
            .await?
            .into_iter()
            .filter(|q| q.survey_completed)
            .map(|q| q.certificate_id)
            .collect();

        let registered = self
            .store()
            .list_certificates(&CertificateFilter {
                status: Some(CertificateStatus::Registered),
                ..Default::default()
            })
            .await?;

        let mut emails = BTreeSet::new();
        for certificate in registered {
            if answered.contains(&certificate.id)
                || certificate.registered_month.is_some_and(|registered| registered > month)
            {
                continue;
            }
            if let Some(member_id) = certificate.member_id {
                if let Some(email) = self.member_email(member_id).await? {
                    emails.insert(email);
                }
            }
        }
        Ok(emails)
    }
}
