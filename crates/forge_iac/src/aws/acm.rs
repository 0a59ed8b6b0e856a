//! Certificate lookups.

use aws_sdk_acm::types::CertificateStatus;
use tracing::debug;

use super::error::sdk_error;
use super::AwsCloud;
use crate::error::IacResult;
use crate::lookup::{select_single, CertificateQuery, CertificateRef};

impl AwsCloud {
    /// Find the certificate whose primary domain matches exactly.
    pub(super) async fn list_certificate(&self, query: &CertificateQuery) -> IacResult<CertificateRef> {
        let statuses: Vec<CertificateStatus> = query
            .statuses
            .iter()
            .map(|s| CertificateStatus::from(s.as_str()))
            .collect();

        let mut matches = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let response = self
                .acm
                .list_certificates()
                .set_certificate_statuses(Some(statuses.clone()))
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| sdk_error("ListCertificates", &e))?;

            for summary in response.certificate_summary_list() {
                if summary.domain_name() != Some(query.domain.as_str()) {
                    continue;
                }
                if let Some(arn) = summary.certificate_arn() {
                    matches.push(CertificateRef {
                        arn: arn.to_string(),
                        domain: query.domain.clone(),
                    });
                }
            }

            match response.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }

        debug!(domain = %query.domain, matches = matches.len(), "Listed certificates");
        select_single("certificate", query.to_string(), matches)
    }
}
