use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, patch, post},
};

use super::AppState;
use crate::{
    db::model::{
        accession::{Accession, AccessionUpdate, MappingUpdate, NewAccession},
        experiment::{Experiment, ExperimentUpdate, NewExperiment},
        phenotyper::{NewPhenotyper, Phenotyper, PhenotyperUpdate},
        scan::{NewScan, Scan},
        scientist::{NewScientist, Scientist, ScientistUpdate},
    },
    import::MAX_SPREADSHEET_BYTES,
};
use handler::{by_id, by_query, write};

mod error;
mod handler;

pub(super) fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(async || {}))
        .route(
            "/scientists",
            post(write::<NewScientist>).patch(write::<ScientistUpdate>),
        )
        .route("/scientists/{scientist_id}", get(by_id::<Scientist>))
        .route("/scientists/search", post(by_query::<Scientist>))
        .route(
            "/phenotypers",
            post(write::<NewPhenotyper>).patch(write::<PhenotyperUpdate>),
        )
        .route("/phenotypers/{phenotyper_id}", get(by_id::<Phenotyper>))
        .route("/phenotypers/search", post(by_query::<Phenotyper>))
        .route(
            "/experiments",
            post(write::<NewExperiment>).patch(write::<ExperimentUpdate>),
        )
        .route("/experiments/{experiment_id}", get(by_id::<Experiment>))
        .route("/experiments/search", post(by_query::<Experiment>))
        .route(
            "/experiments/{experiment_id}/genotype",
            get(handler::experiment_genotype),
        )
        .route(
            "/experiments/{experiment_id}/barcode-suggestions",
            get(handler::barcode_suggestions),
        )
        .route(
            "/accessions",
            post(write::<NewAccession>).patch(write::<AccessionUpdate>),
        )
        .route(
            "/accessions/{accession_id}",
            get(by_id::<Accession>).delete(handler::delete_accession),
        )
        .route("/accessions/search", post(by_query::<Accession>))
        .route(
            "/accessions/{accession_id}/mappings",
            get(handler::accession_mappings),
        )
        .route(
            "/accessions/{accession_id}/barcodes",
            get(handler::accession_barcodes),
        )
        .route("/accessions/import", post(handler::import_accession))
        .route("/mappings", patch(write::<MappingUpdate>))
        .route("/spreadsheets/preview", post(handler::preview_spreadsheet))
        .route("/capture/check", post(handler::capture_check))
        .route("/scans", post(write::<NewScan>))
        .route(
            "/scans/{scan_id}",
            get(by_id::<Scan>).delete(handler::delete_scan),
        )
        .route("/scans/search", post(by_query::<Scan>))
        .route("/scans/upload", post(handler::upload_scans))
        // Spreadsheet uploads outgrow axum's default 2 MiB body cap
        .layer(DefaultBodyLimit::max(MAX_SPREADSHEET_BYTES + 1024))
}
