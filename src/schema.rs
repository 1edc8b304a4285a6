diesel::table! {
    accession (id) {
        id -> Uuid,
        name -> Text,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    accession_mapping (id) {
        id -> Uuid,
        accession_id -> Uuid,
        plant_barcode -> Text,
        genotype_id -> Text,
    }
}

diesel::table! {
    experiment (id) {
        id -> Uuid,
        name -> Text,
        species -> Text,
        scientist_id -> Uuid,
        accession_id -> Nullable<Uuid>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    phenotyper (id) {
        id -> Uuid,
        name -> Text,
        email -> Text,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    scan (id) {
        id -> Uuid,
        plant_barcode -> Text,
        experiment_id -> Uuid,
        phenotyper_id -> Uuid,
        captured_at -> Timestamptz,
        deleted -> Bool,
        uploaded_at -> Nullable<Timestamptz>,
        exposure_time -> Float4,
        gain -> Float4,
        gamma -> Float4,
        num_frames -> Int4,
        seconds_per_rot -> Float4,
        capture_path -> Text,
    }
}

diesel::table! {
    scientist (id) {
        id -> Uuid,
        name -> Text,
        email -> Text,
        created_at -> Timestamptz,
    }
}

diesel::joinable!(accession_mapping -> accession (accession_id));
diesel::joinable!(experiment -> accession (accession_id));
diesel::joinable!(experiment -> scientist (scientist_id));
diesel::joinable!(scan -> experiment (experiment_id));
diesel::joinable!(scan -> phenotyper (phenotyper_id));

diesel::allow_tables_to_appear_in_same_query!(
    accession,
    accession_mapping,
    experiment,
    phenotyper,
    scan,
    scientist,
);
