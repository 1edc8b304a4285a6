use axum::{
    Json,
    extract::{FromRequest, Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_extra::extract::Query;
use bytes::Bytes;
use chrono::{Local, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use valuable::Valuable;

use super::error::{Error, Result};
use crate::{
    capture::{self, CaptureCheck, MAX_SUGGESTIONS},
    db::model::{
        FetchById, FetchByQuery, FetchRelatives, Write,
        accession::{self, ImportedAccession, Mapping, NewAccession, NewAccessionWithMappings},
        experiment, scan,
        scan::Scan,
    },
    import::{
        batch::build_mappings,
        sheet::{SheetPreview, SpreadsheetFile},
    },
    server::AppState,
    upload::ScanUploadOutcome,
};

pub(super) struct ValidJson<T>(T);

impl<S, T> FromRequest<S> for ValidJson<T>
where
    axum::Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
    T: Validate,
    <T as Validate>::Context: std::default::Default,
{
    type Rejection = Error;

    async fn from_request(
        req: axum::extract::Request,
        state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        let axum::Json(data) = axum::Json::<T>::from_request(req, state).await?;
        data.validate()?;

        Ok(Self(data))
    }
}

impl<T: Serialize> IntoResponse for ValidJson<T> {
    fn into_response(self) -> Response {
        let Self(inner) = self;

        axum::Json(inner).into_response()
    }
}

pub(super) async fn write<Data>(
    State(app_state): State<AppState>,
    ValidJson(data): ValidJson<Data>,
) -> Result<Json<Data::Returns>>
where
    Data: Write + Send + Valuable,
    Data::Returns: Send + Serialize,
{
    tracing::info!(deserialized_data = data.as_value());

    let mut db_conn = app_state.db_conn().await?;

    Ok(Json(data.write(&mut db_conn).await?))
}

pub(super) async fn by_id<Resource>(
    State(app_state): State<AppState>,
    Path(resource_id): Path<Resource::Id>,
) -> Result<Json<Resource>>
where
    Resource: FetchById + Send + Serialize,
    Resource::Id: Send + Sync + std::fmt::Display,
{
    tracing::info!(deserialized_id = %resource_id);

    let mut db_conn = app_state.db_conn().await?;

    Ok(Json(Resource::fetch_by_id(&resource_id, &mut db_conn).await?))
}

pub(super) async fn by_query<Resource>(
    State(app_state): State<AppState>,
    ValidJson(query): ValidJson<Resource::QueryParams>,
) -> Result<Json<Vec<Resource>>>
where
    Resource: FetchByQuery + Send + Serialize,
    Resource::QueryParams: Send + Valuable,
{
    tracing::info!(deserialized_query = query.as_value());

    let mut db_conn = app_state.db_conn().await?;

    Ok(Json(Resource::fetch_by_query(&query, &mut db_conn).await?))
}

#[derive(Deserialize, Valuable)]
pub(super) struct PreviewParams {
    filename: String,
    sheet: Option<String>,
}

#[derive(Serialize, Debug)]
pub(super) struct SpreadsheetSummary {
    sheet_names: Vec<String>,
    preview: SheetPreview,
}

/// Decodes an uploaded workbook far enough for the user to pick a sheet and
/// its columns. Nothing is persisted here.
pub(super) async fn preview_spreadsheet(
    Query(params): Query<PreviewParams>,
    body: Bytes,
) -> Result<Json<SpreadsheetSummary>> {
    tracing::info!(preview_params = params.as_value(), file_size = body.len());

    let PreviewParams { filename, sheet } = params;

    let file = SpreadsheetFile::parse(&filename, &body)?;
    let sheet = match &sheet {
        Some(name) => file.sheet(name)?,
        None => file.first_sheet()?,
    };

    Ok(Json(SpreadsheetSummary {
        sheet_names: file.sheet_names().iter().map(ToString::to_string).collect(),
        preview: sheet.preview(),
    }))
}

#[derive(Deserialize, Valuable)]
pub(super) struct ImportParams {
    filename: String,
    sheet: Option<String>,
    name: String,
    /// Both column roles must be named explicitly; the preview's suggestions
    /// never stand in for a selection.
    barcode_column: String,
    genotype_column: String,
}

pub(super) async fn import_accession(
    State(app_state): State<AppState>,
    Query(params): Query<ImportParams>,
    body: Bytes,
) -> Result<Json<ImportedAccession>> {
    tracing::info!(import_params = params.as_value(), file_size = body.len());

    let ImportParams {
        filename,
        sheet,
        name,
        barcode_column,
        genotype_column,
    } = params;

    let file = SpreadsheetFile::parse(&filename, &body)?;
    let sheet = match &sheet {
        Some(name) => file.sheet(name)?,
        None => file.first_sheet()?,
    };

    let mappings = build_mappings(sheet, &barcode_column, &genotype_column)?;

    let import = NewAccessionWithMappings {
        accession: NewAccession { name },
        mappings,
    };
    import.validate()?;

    let mut db_conn = app_state.db_conn().await?;

    Ok(Json(import.write(&mut db_conn).await?))
}

pub(super) async fn accession_mappings(
    State(app_state): State<AppState>,
    Path(accession_id): Path<Uuid>,
) -> Result<Json<Vec<Mapping>>> {
    let mut db_conn = app_state.db_conn().await?;

    let mappings: Vec<Mapping> =
        crate::schema::accession::table::fetch_relatives(&accession_id, &mut db_conn).await?;

    Ok(Json(mappings))
}

pub(super) async fn accession_barcodes(
    State(app_state): State<AppState>,
    Path(accession_id): Path<Uuid>,
) -> Result<Json<Vec<String>>> {
    let mut db_conn = app_state.db_conn().await?;

    Ok(Json(
        accession::plant_barcodes(&accession_id, &mut db_conn).await?,
    ))
}

pub(super) async fn delete_accession(
    State(app_state): State<AppState>,
    Path(accession_id): Path<Uuid>,
) -> Result<StatusCode> {
    tracing::info!(deleted_accession = accession_id.to_string());

    let mut db_conn = app_state.db_conn().await?;

    accession::delete_accession(&accession_id, &mut db_conn).await?;

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize, Valuable)]
pub(super) struct GenotypeParams {
    barcode: String,
}

/// Nullable by design: an experiment without an accession, or a barcode
/// without a mapping, is a `null` body with status 200.
pub(super) async fn experiment_genotype(
    State(app_state): State<AppState>,
    Path(experiment_id): Path<Uuid>,
    Query(params): Query<GenotypeParams>,
) -> Result<Json<Option<String>>> {
    let GenotypeParams { barcode } = params;

    let mut db_conn = app_state.db_conn().await?;

    Ok(Json(
        accession::genotype_for_barcode(&barcode, &experiment_id, &mut db_conn).await?,
    ))
}

#[derive(Deserialize, Valuable)]
pub(super) struct SuggestionParams {
    input: String,
}

pub(super) async fn barcode_suggestions(
    State(app_state): State<AppState>,
    Path(experiment_id): Path<Uuid>,
    Query(params): Query<SuggestionParams>,
) -> Result<Json<Vec<String>>> {
    let SuggestionParams { input } = params;

    let mut db_conn = app_state.db_conn().await?;

    let Some(accession_id) = experiment::attached_accession(&experiment_id, &mut db_conn).await?
    else {
        return Ok(Json(Vec::new()));
    };

    let barcodes = accession::plant_barcodes(&accession_id, &mut db_conn).await?;

    Ok(Json(capture::suggest_barcodes(
        &input,
        &barcodes,
        MAX_SUGGESTIONS,
    )))
}

#[derive(Deserialize, Valuable, Validate)]
#[garde(allow_unvalidated)]
pub(super) struct CaptureCheckRequest {
    #[valuable(skip)]
    experiment_id: Uuid,
    plant_barcode: String,
}

/// The blur-time validation bundle: sanitized barcode, membership result,
/// and the same-day duplicate warning, computed against this machine's
/// local calendar.
pub(super) async fn capture_check(
    State(app_state): State<AppState>,
    ValidJson(request): ValidJson<CaptureCheckRequest>,
) -> Result<Json<CaptureCheck>> {
    tracing::debug!(capture_check = request.as_value());

    let CaptureCheckRequest {
        experiment_id,
        plant_barcode,
    } = request;

    let mut db_conn = app_state.db_conn().await?;

    Ok(Json(
        capture::check_barcode(
            &experiment_id,
            &plant_barcode,
            Utc::now(),
            &Local,
            &mut db_conn,
        )
        .await?,
    ))
}

pub(super) async fn delete_scan(
    State(app_state): State<AppState>,
    Path(scan_id): Path<Uuid>,
) -> Result<Json<Scan>> {
    tracing::info!(deleted_scan = scan_id.to_string());

    let mut db_conn = app_state.db_conn().await?;

    Ok(Json(scan::soft_delete(&scan_id, &mut db_conn).await?))
}

#[derive(Deserialize, Valuable, Validate)]
#[garde(allow_unvalidated)]
pub(super) struct UploadRequest {
    #[valuable(skip)]
    scan_ids: Vec<Uuid>,
}

pub(super) async fn upload_scans(
    State(app_state): State<AppState>,
    ValidJson(request): ValidJson<UploadRequest>,
) -> Result<Json<Vec<ScanUploadOutcome>>> {
    let UploadRequest { scan_ids } = request;

    let uploader = app_state.uploader().ok_or(Error::UploadNotConfigured)?;

    let mut db_conn = app_state.db_conn().await?;

    Ok(Json(uploader.upload_scans(&scan_ids, &mut db_conn).await?))
}
