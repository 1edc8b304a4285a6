use chrono::{DateTime, Utc};
use diesel::{pg::Pg, prelude::*};
use diesel_async::RunQueryDsl;
use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use valuable::Valuable;

use crate::{
    db::{
        model::{self, AsDieselQueryBase, Pagination, non_blank},
        util::{BoxedDieselExpression, DieselExpressionBuilder},
    },
    fetch_by_query,
    schema::{
        self,
        scan::{self, captured_at as captured_at_col, id as id_col, plant_barcode as plant_barcode_col},
    },
};

/// Instrument settings recorded with every capture, mirroring the scanner's
/// configuration at the time the turntable ran.
#[derive(Insertable, Deserialize, Serialize, Clone, Valuable, Validate)]
#[diesel(table_name = schema::scan, check_for_backend(Pg))]
#[garde(allow_unvalidated)]
pub struct NewScan {
    #[garde(custom(non_blank))]
    pub plant_barcode: String,
    #[valuable(skip)]
    pub experiment_id: Uuid,
    #[valuable(skip)]
    pub phenotyper_id: Uuid,
    #[valuable(skip)]
    pub captured_at: DateTime<Utc>,
    pub exposure_time: f32,
    pub gain: f32,
    pub gamma: f32,
    #[garde(range(min = 1))]
    pub num_frames: i32,
    pub seconds_per_rot: f32,
    #[garde(custom(non_blank))]
    pub capture_path: String,
}

impl model::Write for NewScan {
    type Returns = Scan;

    async fn write(
        self,
        db_conn: &mut diesel_async::AsyncPgConnection,
    ) -> super::error::Result<Self::Returns> {
        let inserted = diesel::insert_into(scan::table)
            .values((id_col.eq(Uuid::now_v7()), &self))
            .returning(Scan::as_returning())
            .get_result(db_conn)
            .await?;

        Ok(inserted)
    }
}

#[derive(Queryable, Selectable, Serialize, Deserialize, Debug, Clone)]
#[diesel(table_name = schema::scan, check_for_backend(Pg))]
pub struct Scan {
    pub id: Uuid,
    pub plant_barcode: String,
    pub experiment_id: Uuid,
    pub phenotyper_id: Uuid,
    pub captured_at: DateTime<Utc>,
    pub deleted: bool,
    pub uploaded_at: Option<DateTime<Utc>>,
    pub exposure_time: f32,
    pub gain: f32,
    pub gamma: f32,
    pub num_frames: i32,
    pub seconds_per_rot: f32,
    pub capture_path: String,
}

impl AsDieselQueryBase for Scan {
    type QueryBase = scan::table;

    fn as_diesel_query_base() -> Self::QueryBase {
        scan::table
    }
}

impl model::FetchById for Scan {
    type Id = Uuid;

    async fn fetch_by_id(
        id: &Self::Id,
        db_conn: &mut diesel_async::AsyncPgConnection,
    ) -> super::error::Result<Self> {
        Ok(Self::as_diesel_query_base()
            .find(id)
            .select(Self::as_select())
            .first(db_conn)
            .await?)
    }
}

/// Marks a scan deleted. Scans are never hard-deleted; every read path
/// filters on the flag instead. Repeating the call is a no-op.
pub async fn soft_delete(
    scan_id: &Uuid,
    db_conn: &mut diesel_async::AsyncPgConnection,
) -> super::error::Result<Scan> {
    Ok(diesel::update(scan::table.find(scan_id))
        .set(scan::deleted.eq(true))
        .returning(Scan::as_returning())
        .get_result(db_conn)
        .await?)
}

/// The most recent non-deleted scan of a plant within an experiment.
pub async fn latest_scan(
    plant_barcode: &str,
    experiment_id: &Uuid,
    db_conn: &mut diesel_async::AsyncPgConnection,
) -> super::error::Result<Option<Scan>> {
    let latest = scan::table
        .filter(
            scan::experiment_id
                .eq(experiment_id)
                .and(scan::plant_barcode.eq(plant_barcode))
                .and(scan::deleted.eq(false)),
        )
        .select(Scan::as_select())
        .order(captured_at_col.desc())
        .first(db_conn)
        .await
        .optional()?;

    Ok(latest)
}

/// Stamps the given scans as uploaded. Scans that failed to upload are left
/// untouched so a retry picks them up again.
pub async fn mark_uploaded(
    scan_ids: &[Uuid],
    uploaded_at: DateTime<Utc>,
    db_conn: &mut diesel_async::AsyncPgConnection,
) -> super::error::Result<usize> {
    if scan_ids.is_empty() {
        return Ok(0);
    }

    Ok(diesel::update(scan::table.filter(id_col.eq_any(scan_ids)))
        .set(scan::uploaded_at.eq(uploaded_at))
        .execute(db_conn)
        .await?)
}

#[derive(Deserialize, Serialize, Clone, Copy, Default, Valuable, Debug)]
#[serde(rename_all = "snake_case")]
pub enum ScanOrdinalColumn {
    #[default]
    CapturedAt,
    PlantBarcode,
}

#[derive(Deserialize, Serialize, Clone, Copy, Valuable, Debug)]
pub struct ScanOrdering {
    #[serde(default)]
    pub column: ScanOrdinalColumn,
    #[serde(default)]
    pub descending: bool,
}

#[derive(Deserialize, Serialize, Default, Valuable, Validate, Debug)]
#[garde(allow_unvalidated)]
pub struct ScanQuery {
    #[serde(default)]
    #[valuable(skip)]
    pub ids: Vec<Uuid>,
    #[serde(default)]
    pub plant_barcode: Option<String>,
    #[serde(default)]
    #[valuable(skip)]
    pub experiment_id: Option<Uuid>,
    #[serde(default)]
    #[valuable(skip)]
    pub phenotyper_id: Option<Uuid>,
    /// Soft-deleted scans are hidden unless explicitly requested.
    #[serde(default)]
    pub include_deleted: bool,
    #[serde(default)]
    pub order_by: Vec<ScanOrdering>,
    #[serde(default)]
    pub pagination: Pagination,
}

impl<QuerySource> model::AsDieselFilter<QuerySource> for ScanQuery
where
    id_col: SelectableExpression<QuerySource>,
    scan::plant_barcode: SelectableExpression<QuerySource>,
    scan::experiment_id: SelectableExpression<QuerySource>,
    scan::phenotyper_id: SelectableExpression<QuerySource>,
    scan::deleted: SelectableExpression<QuerySource>,
{
    fn as_diesel_filter<'a>(&'a self) -> Option<BoxedDieselExpression<'a, QuerySource>>
    where
        QuerySource: 'a,
    {
        let Self {
            ids,
            plant_barcode,
            experiment_id,
            phenotyper_id,
            include_deleted,
            ..
        } = self;

        let mut query = DieselExpressionBuilder::default();

        if !ids.is_empty() {
            query = query.and(id_col.eq_any(ids));
        }

        if let Some(plant_barcode) = plant_barcode {
            query = query.and(scan::plant_barcode.eq(plant_barcode));
        }

        if let Some(experiment_id) = experiment_id {
            query = query.and(scan::experiment_id.eq(experiment_id));
        }

        if let Some(phenotyper_id) = phenotyper_id {
            query = query.and(scan::phenotyper_id.eq(phenotyper_id));
        }

        if !include_deleted {
            query = query.and(scan::deleted.eq(false));
        }

        query.build()
    }
}

impl model::FetchByQuery for Scan {
    type QueryParams = ScanQuery;

    async fn fetch_by_query(
        query: &Self::QueryParams,
        db_conn: &mut diesel_async::AsyncPgConnection,
    ) -> super::error::Result<Vec<Self>> {
        use ScanOrdinalColumn::{CapturedAt, PlantBarcode};

        fetch_by_query!(
            query,
            [(CapturedAt, captured_at_col), (PlantBarcode, plant_barcode_col)],
            db_conn
        )
    }
}
