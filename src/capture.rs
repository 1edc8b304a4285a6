//! Validation that runs while a phenotyper types a plant barcode during a
//! capture session: input sanitization, accession-membership lookup, the
//! same-day duplicate warning, and autocomplete suggestions.

use std::sync::LazyLock;

use chrono::{DateTime, TimeZone, Utc};
use diesel_async::AsyncPgConnection;
use regex::Regex;
use serde::Serialize;
use uuid::Uuid;

use crate::db::{
    error,
    model::{accession, experiment, scan},
};

/// Autocomplete never surfaces more than this many suggestions.
pub const MAX_SUGGESTIONS: usize = 10;

static DISALLOWED_CHARS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_-]").unwrap());

/// Normalizes raw barcode input: `+` and spaces become underscores, every
/// other character outside `[A-Za-z0-9_-]` is dropped, dashes survive
/// untouched. Idempotent, and independent of any database state.
pub fn sanitize_barcode(raw: &str) -> String {
    let replaced = raw.replace(['+', ' '], "_");

    DISALLOWED_CHARS.replace_all(&replaced, "").into_owned()
}

/// Whether two instants fall on the same calendar day of the given timezone.
///
/// Scans are stored in UTC, but "already scanned today" is a question about
/// the phenotyper's wall clock; comparing UTC date strings misclassifies
/// scans taken near midnight.
pub fn same_local_day<Tz: TimeZone>(a: DateTime<Utc>, b: DateTime<Utc>, tz: &Tz) -> bool {
    a.with_timezone(tz).date_naive() == b.with_timezone(tz).date_naive()
}

/// Case-sensitive autocomplete over an accession's barcode list: prefix
/// matches rank ahead of substring matches, list order is otherwise kept,
/// and the result is capped at `limit`.
pub fn suggest_barcodes(input: &str, barcodes: &[String], limit: usize) -> Vec<String> {
    if input.is_empty() {
        return Vec::new();
    }

    let (prefixed, contained): (Vec<_>, Vec<_>) = barcodes
        .iter()
        .filter(|barcode| barcode.contains(input))
        .partition(|barcode| barcode.starts_with(input));

    prefixed
        .into_iter()
        .chain(contained)
        .take(limit)
        .cloned()
        .collect()
}

/// The outcome of a blur-time barcode check. Everything here is advisory;
/// nothing blocks submission.
#[derive(Serialize, Debug)]
pub struct CaptureCheck {
    /// The sanitized barcode the checks ran against.
    pub plant_barcode: String,
    /// Whether the experiment has an accession attached at all. When false,
    /// membership validation is unavailable and `genotype` is meaningless.
    pub accession_attached: bool,
    /// The mapped genotype. `None` with an attached accession means the
    /// barcode is not in the accession file.
    pub genotype: Option<String>,
    /// True when a non-deleted scan of this plant already exists today, by
    /// the local calendar.
    pub scanned_today: bool,
}

/// Runs the blur-time checks for one barcode. The genotype result is meant
/// to overwrite any manually entered genotype in the capture form.
pub async fn check_barcode<Tz: TimeZone>(
    experiment_id: &Uuid,
    raw_input: &str,
    now: DateTime<Utc>,
    tz: &Tz,
    db_conn: &mut AsyncPgConnection,
) -> error::Result<CaptureCheck> {
    let plant_barcode = sanitize_barcode(raw_input);

    let attached = experiment::attached_accession(experiment_id, db_conn).await?;
    let genotype = match &attached {
        Some(accession_id) => {
            accession::genotype_in_accession(accession_id, &plant_barcode, db_conn).await?
        }
        None => None,
    };

    let scanned_today = scan::latest_scan(&plant_barcode, experiment_id, db_conn)
        .await?
        .is_some_and(|scan| same_local_day(scan.captured_at, now, tz));

    Ok(CaptureCheck {
        plant_barcode,
        accession_attached: attached.is_some(),
        genotype,
        scanned_today,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{FixedOffset, TimeZone};
    use diesel_async::{AsyncConnection, scoped_futures::ScopedFutureExt};
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;
    use crate::db::{
        model::{
            Write,
            accession::{NewAccession, NewAccessionWithMappings, NewMapping},
            experiment::ExperimentUpdate,
        },
        test_util::{DbConnection, db_conn, new_scan, some_experiment, some_phenotyper},
    };

    #[rstest]
    #[case("PLANT+001", "PLANT_001")]
    #[case("PLANT 001 TEST", "PLANT_001_TEST")]
    #[case("PLANT-001-A", "PLANT-001-A")]
    #[case("PLANT@001#TEST!", "PLANT001TEST")]
    #[case("", "")]
    fn sanitization(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(sanitize_barcode(raw), expected);
    }

    #[rstest]
    #[case("PLANT+001")]
    #[case("PLANT 001 TEST")]
    #[case("PLANT@001#TEST!")]
    fn sanitization_is_idempotent(#[case] raw: &str) {
        let once = sanitize_barcode(raw);
        assert_eq!(sanitize_barcode(&once), once);
    }

    #[test]
    fn same_local_day_uses_the_local_calendar() {
        let tz = FixedOffset::west_opt(5 * 3600).unwrap(); // UTC-5

        // 23:59:59 vs 00:00:01 the next local day: not the same day
        let scan = tz.with_ymd_and_hms(2026, 3, 9, 23, 59, 59).unwrap().to_utc();
        let check = tz.with_ymd_and_hms(2026, 3, 10, 0, 0, 1).unwrap().to_utc();
        assert!(!same_local_day(scan, check, &tz));

        // 23:58 and 00:02 the next UTC day, but the same local evening
        let scan = tz.with_ymd_and_hms(2026, 3, 9, 18, 58, 0).unwrap().to_utc();
        let check = tz.with_ymd_and_hms(2026, 3, 9, 19, 2, 0).unwrap().to_utc();
        assert_ne!(scan.date_naive(), check.date_naive());
        assert!(same_local_day(scan, check, &tz));
    }

    #[test]
    fn suggestions_rank_prefix_matches_first_and_are_bounded() {
        let barcodes: Vec<String> = ["PLANT_001", "PLANT_010", "XPLANT_0", "OTHER"]
            .iter()
            .map(ToString::to_string)
            .collect();

        assert_eq!(
            suggest_barcodes("PLANT_0", &barcodes, MAX_SUGGESTIONS),
            vec!["PLANT_001", "PLANT_010", "XPLANT_0"]
        );
        assert_eq!(
            suggest_barcodes("PLANT_0", &barcodes, 2),
            vec!["PLANT_001", "PLANT_010"]
        );
        // Case-sensitive: no fuzzy matching of lowercase input
        assert_eq!(suggest_barcodes("plant", &barcodes, MAX_SUGGESTIONS).len(), 0);
        assert_eq!(suggest_barcodes("", &barcodes, MAX_SUGGESTIONS).len(), 0);
    }

    #[rstest]
    #[awt]
    #[tokio::test]
    async fn check_reports_membership_and_same_day_duplicate(#[future] mut db_conn: DbConnection) {
        db_conn
            .test_transaction::<_, crate::db::error::Error, _>(|conn| {
                async move {
                    let experiment = some_experiment(conn).await;
                    let phenotyper = some_phenotyper(conn).await;
                    let tz = FixedOffset::east_opt(2 * 3600).unwrap();
                    let now = Utc::now();

                    // No accession attached yet: validation is unavailable
                    let check =
                        check_barcode(&experiment.id, "PLANT+001", now, &tz, conn).await?;
                    assert_eq!(check.plant_barcode, "PLANT_001");
                    assert!(!check.accession_attached);
                    assert_eq!(check.genotype, None);
                    assert!(!check.scanned_today);

                    let imported = NewAccessionWithMappings {
                        accession: NewAccession {
                            name: "capture check".to_string(),
                        },
                        mappings: vec![NewMapping {
                            plant_barcode: "PLANT_001".to_string(),
                            genotype_id: "GT-1".to_string(),
                        }],
                    }
                    .write(conn)
                    .await?;
                    ExperimentUpdate {
                        id: experiment.id,
                        name: None,
                        species: None,
                        accession_id: Some(imported.accession.id),
                    }
                    .write(conn)
                    .await?;

                    // Raw input sanitizes into a barcode the accession knows
                    let check =
                        check_barcode(&experiment.id, "PLANT+001", now, &tz, conn).await?;
                    assert!(check.accession_attached);
                    assert_eq!(check.genotype.as_deref(), Some("GT-1"));
                    assert!(!check.scanned_today);

                    // An unknown barcode is a membership miss, not an error
                    let check =
                        check_barcode(&experiment.id, "PLANT_999", now, &tz, conn).await?;
                    assert!(check.accession_attached);
                    assert_eq!(check.genotype, None);

                    // A scan from earlier today trips the duplicate warning...
                    let scan = new_scan("PLANT_001", &experiment, &phenotyper, now)
                        .write(conn)
                        .await?;
                    let check =
                        check_barcode(&experiment.id, "PLANT_001", now, &tz, conn).await?;
                    assert!(check.scanned_today);

                    // ...unless it has been soft-deleted
                    crate::db::model::scan::soft_delete(&scan.id, conn).await?;
                    let check =
                        check_barcode(&experiment.id, "PLANT_001", now, &tz, conn).await?;
                    assert!(!check.scanned_today);

                    Ok(())
                }
                .scope_boxed()
            })
            .await;
    }

    #[rstest]
    #[awt]
    #[tokio::test]
    async fn yesterdays_scan_is_not_a_same_day_duplicate(#[future] mut db_conn: DbConnection) {
        db_conn
            .test_transaction::<_, crate::db::error::Error, _>(|conn| {
                async move {
                    let experiment = some_experiment(conn).await;
                    let phenotyper = some_phenotyper(conn).await;
                    let tz = FixedOffset::west_opt(5 * 3600).unwrap();

                    let scanned = tz.with_ymd_and_hms(2026, 3, 9, 23, 59, 59).unwrap().to_utc();
                    let now = tz.with_ymd_and_hms(2026, 3, 10, 0, 0, 1).unwrap().to_utc();

                    new_scan("PLANT_077", &experiment, &phenotyper, scanned)
                        .write(conn)
                        .await?;

                    let check =
                        check_barcode(&experiment.id, "PLANT_077", now, &tz, conn).await?;
                    assert!(!check.scanned_today);

                    Ok(())
                }
                .scope_boxed()
            })
            .await;
    }
}
