use bloom_backend::{config::Config, serve_prod_app, server::util::DevPostgres};
use pretty_assertions::assert_eq;
use serde_json::json;
use uuid::Uuid;

const FIXTURE: &[u8] = include_bytes!("fixtures/mappings.xlsx");

#[tokio::test]
async fn prod_api() {
    let container = DevPostgres::new("bloom-backend_integration_test")
        .await
        .unwrap();
    let (db_host, db_port) = container.host_port().await.unwrap();

    let config = json!({
        "db_user": "postgres",
        "db_password": "",
        "db_host": db_host,
        "db_port": db_port,
        "db_name": "postgres",
        "host": "localhost",
        "port": 8113,
    });
    let config: Config = serde_json::from_value(config).unwrap();
    let app_address = format!("http://{}", config.app_address());

    let _server_handle = tokio::spawn(serve_prod_app(config, None));

    let client = reqwest::Client::new();

    tokio::time::sleep(tokio::time::Duration::from_secs(2)).await;

    let response = client
        .get(format!("{app_address}/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    // CRUD entities the capture flow hangs off of
    let scientist: serde_json::Value = client
        .post(format!("{app_address}/scientists"))
        .json(&json!({"name": "Barbara McClintock", "email": "barbara@example.org"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(scientist["name"], "Barbara McClintock");

    let phenotyper: serde_json::Value = client
        .post(format!("{app_address}/phenotypers"))
        .json(&json!({"name": "Pat Phenotyper", "email": "pat@example.org"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let experiment: serde_json::Value = client
        .post(format!("{app_address}/experiments"))
        .json(&json!({
            "name": "maize drought trial",
            "species": "Zea mays",
            "scientist_id": scientist["id"],
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let experiment_id = experiment["id"].as_str().unwrap();

    // A blank name never touches the store
    let response = client
        .post(format!("{app_address}/accessions"))
        .json(&json!({"name": "   "}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 422);

    // Unknown ids are 404s on fetch-by-id endpoints
    let response = client
        .get(format!("{app_address}/scientists/{}", Uuid::now_v7()))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    // Preview, then import, the mapping spreadsheet
    let preview: serde_json::Value = client
        .post(format!("{app_address}/spreadsheets/preview"))
        .query(&[("filename", "mappings.xlsx")])
        .body(FIXTURE.to_vec())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(preview["sheet_names"], json!(["Sheet1"]));
    assert_eq!(preview["preview"]["suggested_columns"]["barcode"], json!(0));
    assert_eq!(preview["preview"]["suggested_columns"]["genotype"], json!(1));
    assert_eq!(preview["preview"]["total_rows"], json!(10));

    let response = client
        .post(format!("{app_address}/spreadsheets/preview"))
        .query(&[("filename", "mappings.txt")])
        .body(FIXTURE.to_vec())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 422);

    let imported: serde_json::Value = client
        .post(format!("{app_address}/accessions/import"))
        .query(&[
            ("filename", "mappings.xlsx"),
            ("sheet", "Sheet1"),
            ("name", "maize panel 2026"),
            ("barcode_column", "PlantBarcode"),
            ("genotype_column", "GenotypeID"),
        ])
        .body(FIXTURE.to_vec())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(imported["n_mappings"], json!(10));
    let accession_id = imported["accession"]["id"].as_str().unwrap();

    let mappings: serde_json::Value = client
        .get(format!("{app_address}/accessions/{accession_id}/mappings"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let mappings = mappings.as_array().unwrap();
    assert_eq!(mappings.len(), 10);
    assert_eq!(mappings[0]["plant_barcode"], json!("PLANT_001"));
    assert_eq!(mappings[9]["plant_barcode"], json!("PLANT_010"));

    let barcodes: serde_json::Value = client
        .get(format!("{app_address}/accessions/{accession_id}/barcodes"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(barcodes.as_array().unwrap().len(), 10);

    // Attach the accession, then the capture-time checks come alive
    let genotype: serde_json::Value = client
        .get(format!("{app_address}/experiments/{experiment_id}/genotype"))
        .query(&[("barcode", "PLANT_001")])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(genotype, serde_json::Value::Null);

    client
        .patch(format!("{app_address}/experiments"))
        .json(&json!({"id": experiment_id, "accession_id": accession_id}))
        .send()
        .await
        .unwrap()
        .error_for_status()
        .unwrap();

    let genotype: serde_json::Value = client
        .get(format!("{app_address}/experiments/{experiment_id}/genotype"))
        .query(&[("barcode", "PLANT_001")])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(genotype, json!("GT-101"));

    let suggestions: serde_json::Value = client
        .get(format!(
            "{app_address}/experiments/{experiment_id}/barcode-suggestions"
        ))
        .query(&[("input", "PLANT_01")])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(suggestions, json!(["PLANT_010"]));

    let check: serde_json::Value = client
        .post(format!("{app_address}/capture/check"))
        .json(&json!({"experiment_id": experiment_id, "plant_barcode": "PLANT+001"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(check["plant_barcode"], json!("PLANT_001"));
    assert_eq!(check["accession_attached"], json!(true));
    assert_eq!(check["genotype"], json!("GT-101"));
    assert_eq!(check["scanned_today"], json!(false));

    // Capture a scan; the same-day duplicate warning switches on
    let scan: serde_json::Value = client
        .post(format!("{app_address}/scans"))
        .json(&json!({
            "plant_barcode": "PLANT_001",
            "experiment_id": experiment_id,
            "phenotyper_id": phenotyper["id"],
            "captured_at": chrono::Utc::now().to_rfc3339(),
            "exposure_time": 1200.0,
            "gain": 2.5,
            "gamma": 1.0,
            "num_frames": 72,
            "seconds_per_rot": 36.0,
            "capture_path": "./scans/PLANT_001",
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let scan_id = scan["id"].as_str().unwrap();

    let check: serde_json::Value = client
        .post(format!("{app_address}/capture/check"))
        .json(&json!({"experiment_id": experiment_id, "plant_barcode": "PLANT_001"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(check["scanned_today"], json!(true));

    // Soft-deleting the scan clears the warning
    client
        .delete(format!("{app_address}/scans/{scan_id}"))
        .send()
        .await
        .unwrap()
        .error_for_status()
        .unwrap();

    let check: serde_json::Value = client
        .post(format!("{app_address}/capture/check"))
        .json(&json!({"experiment_id": experiment_id, "plant_barcode": "PLANT_001"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(check["scanned_today"], json!(false));

    // No upload API is configured in this deployment
    let response = client
        .post(format!("{app_address}/scans/upload"))
        .json(&json!({"scan_ids": [scan_id]}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 503);

    // Cascade delete: the accession takes its mappings with it
    let response = client
        .delete(format!("{app_address}/accessions/{accession_id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 204);

    let mappings: serde_json::Value = client
        .get(format!("{app_address}/accessions/{accession_id}/mappings"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(mappings, json!([]));
}
