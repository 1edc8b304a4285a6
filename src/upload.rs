//! Pushes captured scans to the remote archive API. Failures are reported
//! per scan, never as one global error, so a flaky network leaves a retryable
//! remainder rather than a half-trusted batch.

use chrono::Utc;
use diesel_async::AsyncPgConnection;
use futures::StreamExt;
use reqwest::Client;
use serde::Serialize;
use url::Url;
use uuid::Uuid;

use crate::db::{
    error,
    model::{
        FetchByQuery,
        scan::{Scan, ScanQuery, mark_uploaded},
    },
};

/// How many scans are in flight against the remote API at once.
const UPLOAD_CONCURRENCY: usize = 4;

pub struct ScanUploader {
    http_client: Client,
    base_url: Url,
    token: String,
}

#[derive(Serialize, Debug)]
pub struct ScanUploadOutcome {
    pub scan_id: Uuid,
    pub uploaded: bool,
    pub error: Option<String>,
}

impl ScanUploader {
    #[must_use]
    pub fn new(http_client: Client, base_url: Url, token: String) -> Self {
        Self {
            http_client,
            base_url,
            token,
        }
    }

    /// Uploads the given scans, stamping `uploaded_at` on every success.
    /// Unknown or soft-deleted ids come back as failed outcomes. The outcome
    /// order follows the requested id order.
    pub async fn upload_scans(
        &self,
        scan_ids: &[Uuid],
        db_conn: &mut AsyncPgConnection,
    ) -> error::Result<Vec<ScanUploadOutcome>> {
        let query = ScanQuery {
            ids: scan_ids.to_vec(),
            ..Default::default()
        };
        let scans = Scan::fetch_by_query(&query, db_conn).await?;

        let mut outcomes: Vec<_> = futures::stream::iter(scans)
            .map(|scan| self.upload_one(scan))
            .buffer_unordered(UPLOAD_CONCURRENCY)
            .collect()
            .await;

        for id in scan_ids {
            if !outcomes.iter().any(|o| o.scan_id == *id) {
                outcomes.push(ScanUploadOutcome {
                    scan_id: *id,
                    uploaded: false,
                    error: Some("scan not found".to_string()),
                });
            }
        }
        outcomes.sort_by_key(|outcome| {
            scan_ids
                .iter()
                .position(|id| *id == outcome.scan_id)
                .unwrap_or(usize::MAX)
        });

        let uploaded_ids: Vec<_> = outcomes
            .iter()
            .filter(|o| o.uploaded)
            .map(|o| o.scan_id)
            .collect();
        mark_uploaded(&uploaded_ids, Utc::now(), db_conn).await?;

        Ok(outcomes)
    }

    async fn upload_one(&self, scan: Scan) -> ScanUploadOutcome {
        let scan_id = scan.id;

        let result = async {
            let endpoint = self
                .base_url
                .join("scans")
                .map_err(|err| err.to_string())?;

            self.http_client
                .post(endpoint)
                .bearer_auth(&self.token)
                .json(&scan)
                .send()
                .await
                .and_then(reqwest::Response::error_for_status)
                .map_err(|err| err.to_string())?;

            Ok::<_, String>(())
        }
        .await;

        match result {
            Ok(()) => ScanUploadOutcome {
                scan_id,
                uploaded: true,
                error: None,
            },
            Err(error) => ScanUploadOutcome {
                scan_id,
                uploaded: false,
                error: Some(error),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use diesel_async::{AsyncConnection, scoped_futures::ScopedFutureExt};
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;
    use crate::db::{
        model::{FetchById, Write},
        test_util::{DbConnection, db_conn, new_scan, some_experiment, some_phenotyper},
    };

    #[rstest]
    #[awt]
    #[tokio::test]
    async fn unreachable_api_reports_per_scan_failures(#[future] mut db_conn: DbConnection) {
        db_conn
            .test_transaction::<_, crate::db::error::Error, _>(|conn| {
                async move {
                    let experiment = some_experiment(conn).await;
                    let phenotyper = some_phenotyper(conn).await;

                    let scan = new_scan("PLANT_001", &experiment, &phenotyper, Utc::now())
                        .write(conn)
                        .await?;

                    // Nothing is listening on this port
                    let uploader = ScanUploader::new(
                        Client::new(),
                        Url::parse("http://127.0.0.1:9").unwrap(),
                        "token".to_string(),
                    );

                    let unknown_id = Uuid::now_v7();
                    let outcomes = uploader
                        .upload_scans(&[scan.id, unknown_id], conn)
                        .await?;

                    assert_eq!(outcomes.len(), 2);
                    assert_eq!(outcomes[0].scan_id, scan.id);
                    assert!(!outcomes[0].uploaded);
                    assert!(outcomes[0].error.is_some());
                    assert_eq!(outcomes[1].scan_id, unknown_id);
                    assert_eq!(outcomes[1].error.as_deref(), Some("scan not found"));

                    // A failed upload leaves the scan unstamped for retry
                    let scan = Scan::fetch_by_id(&scan.id, conn).await?;
                    assert_eq!(scan.uploaded_at, None);

                    Ok(())
                }
                .scope_boxed()
            })
            .await;
    }
}
